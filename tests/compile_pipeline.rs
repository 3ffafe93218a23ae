//! Resource mutations flowing through compile → write → reload.

use libproxy_gateway::gateway::GatewayError;
use libproxy_gateway::model::{NewResource, ResourcePatch, ValidationError};

mod common;
use common::{acme, Harness};

fn count_prefixed(text: &str, prefix: &str) -> usize {
    text.lines().filter(|l| l.trim_start().starts_with(prefix)).count()
}

#[tokio::test]
async fn test_create_publishes_acme_backend() {
    let h = Harness::new("acme");
    let mutation = h.gateway.resources.create(acme()).await.unwrap();

    assert_eq!(mutation.data.id, 1);
    assert_eq!(mutation.warning, None);

    let text = h.published();
    assert!(text.contains("    acl is_acme path /acme\n"));
    assert!(text.contains("    acl is_acme path_beg /acme/\n"));
    assert!(text.contains("    server acme_server upstream.example:443 check ssl verify none\n"));
    assert!(text.contains("    http-check expect status 200\n"));
    assert!(text.contains("    http-request set-path / if { path /acme }\n"));
    assert!(text.contains(
        "    http-request set-path %[path,regsub(^/acme/,/)] if { path_beg /acme/ }\n"
    ));
}

#[tokio::test]
async fn test_one_backend_and_rule_per_resource() {
    let h = Harness::new("count");
    for (slug, url) in [
        ("alpha", "https://a.example"),
        ("beta", "http://b.example:8080"),
        ("gamma", "https://g.example"),
    ] {
        h.gateway
            .resources
            .create(NewResource::new(slug, slug, slug, url))
            .await
            .unwrap();
    }

    let text = h.published();
    // N resource backends + the default backend
    assert_eq!(count_prefixed(&text, "backend "), 4);
    assert_eq!(count_prefixed(&text, "use_backend "), 3);
    for slug in ["alpha", "beta", "gamma"] {
        assert_eq!(text.matches(&format!("backend {}_backend\n", slug)).count(), 1);
        assert_eq!(
            text.matches(&format!("use_backend {}_backend if is_{}\n", slug, slug)).count(),
            1
        );
    }
}

#[tokio::test]
async fn test_recompile_is_idempotent() {
    let h = Harness::new("idem");
    h.gateway.resources.create(acme()).await.unwrap();
    let first = h.published();

    let outcome = h.gateway.publisher().publish("again").await;
    assert!(outcome.is_applied());
    assert_eq!(h.published(), first);
    assert_eq!(
        h.gateway.publisher().preview().unwrap().text,
        h.gateway.publisher().preview().unwrap().text
    );
}

#[tokio::test]
async fn test_soft_delete_and_reactivate_restore_identical_output() {
    let h = Harness::new("soft");
    h.gateway.resources.create(acme()).await.unwrap();
    let with_acme = h.published();

    h.clock.advance(60);
    let deleted = h.gateway.resources.soft_delete(1).await.unwrap();
    assert!(!deleted.data.is_active);
    let without = h.published();
    assert!(!without.contains("acme"));

    h.clock.advance(60);
    let restored = h.gateway.resources.activate(1).await.unwrap();
    assert!(restored.data.is_active);
    assert_eq!(h.published(), with_acme);
}

#[tokio::test]
async fn test_update_changes_backend_and_keeps_slug() {
    let h = Harness::new("update");
    h.gateway.resources.create(acme()).await.unwrap();

    let patch: ResourcePatch =
        serde_json::from_str(r#"{"base_url": "http://mirror.example:8080/", "timeout_secs": 90}"#)
            .unwrap();
    let updated = h.gateway.resources.update(1, patch).await.unwrap();
    assert_eq!(updated.data.base_url, "http://mirror.example:8080");
    assert_eq!(updated.data.slug, "acme");

    let text = h.published();
    assert!(text.contains("    server acme_server mirror.example:8080 check\n"));
    assert!(text.contains("    timeout server 90s\n"));
}

#[tokio::test]
async fn test_validation_rejected_before_persistence() {
    let h = Harness::new("invalid");
    let mut bad = acme();
    bad.base_url = "ftp://nowhere".into();

    let err = h.gateway.resources.create(bad).await.unwrap_err();
    assert!(matches!(err, GatewayError::Validation(ValidationError::InvalidBaseUrl { .. })));
    assert!(h.gateway.resources.list(true).is_empty());
    assert!(!h.config.haproxy.config_path.exists());
}

#[tokio::test]
async fn test_duplicates_rejected() {
    let h = Harness::new("dup");
    h.gateway.resources.create(acme()).await.unwrap();

    let same_slug = NewResource::new("Other", "acme", "other", "https://o.example");
    let err = h.gateway.resources.create(same_slug).await.unwrap_err();
    assert!(matches!(err, GatewayError::Validation(ValidationError::DuplicateSlug(_))));

    let same_path = NewResource::new("Other", "other", "acme", "https://o.example");
    let err = h.gateway.resources.create(same_path).await.unwrap_err();
    assert!(matches!(err, GatewayError::Validation(ValidationError::DuplicateProxyPath(_))));
}

#[tokio::test]
async fn test_reload_failure_keeps_persisted_state() {
    let dir = common::scratch_dir("stale");
    let mut config = common::test_config(&dir);
    config.haproxy.binary = "false".into();
    let h = Harness::with_config(dir, config);

    let mutation = h.gateway.resources.create(acme()).await.unwrap();
    let warning = mutation.warning.expect("staleness warning");
    assert!(warning.contains("live proxy may be stale"));

    // persisted and compiled, but never confirmed by the proxy
    assert!(h.gateway.resources.get(1).is_ok());
    let status = h.gateway.status().await;
    assert!(status.publish.stale);
    assert!(status.publish.last_applied.is_none());
}

#[tokio::test]
async fn test_hard_delete_removes_resource_and_grants() {
    let h = Harness::new("hard");
    h.gateway.resources.create(acme()).await.unwrap();
    h.gateway.grants.request_access(1, 42).await.unwrap();

    h.gateway.delete_resource(1).await.unwrap();
    assert!(h.gateway.resources.get(1).is_err());
    assert!(h.gateway.grants.list_all().is_empty());
    assert!(!h.published().contains("acme_backend"));
}

#[tokio::test]
async fn test_compiler_settings_hot_swap() {
    let h = Harness::new("hot");
    h.gateway.resources.create(acme()).await.unwrap();

    let mut settings = h.config.compiler.clone();
    assert!(!h.gateway.apply_compiler_settings(&settings));

    settings.frontend_port = 8080;
    assert!(h.gateway.apply_compiler_settings(&settings));
    assert!(h.gateway.status().await.publish.stale);

    h.gateway.publisher().publish("config reloaded").await;
    assert!(h.published().contains("    bind *:8080\n"));
    assert!(!h.gateway.status().await.publish.stale);
}

#[tokio::test]
async fn test_hot_swap_keeps_reloader_socket_path() {
    let h = Harness::new("hotsock");
    let socket = h.config.haproxy.socket_path.display().to_string();

    let mut settings = h.config.compiler.clone();
    settings.stats_port = 9404;
    assert!(h.gateway.apply_compiler_settings(&settings));
    h.gateway.publisher().publish("config reloaded").await;

    let text = h.published();
    assert!(text.contains(&socket), "{}", text);
    assert!(text.contains("9404"));
}

#[tokio::test]
async fn test_unwritable_snapshot_rejects_mutation() {
    let dir = common::scratch_dir("snapfail");
    let blocker = dir.join("blocker");
    std::fs::write(&blocker, b"file, not a directory").unwrap();
    let mut config = common::test_config(&dir);
    config.store.snapshot_path = Some(blocker.join("store.json"));
    let h = Harness::with_config(dir, config);

    let err = h.gateway.resources.create(acme()).await.unwrap_err();
    assert!(matches!(err, GatewayError::Store(_)), "{:?}", err);
    assert!(h.gateway.resources.list(true).is_empty());
    assert!(!h.config.haproxy.config_path.exists());
}

#[tokio::test]
async fn test_nested_proxy_path_rejected() {
    let h = Harness::new("nested");
    h.gateway.resources.create(acme()).await.unwrap();

    let nested = NewResource::new("Acme v2", "acme-v2", "acme/v2", "https://v2.example");
    let err = h.gateway.resources.create(nested).await.unwrap_err();
    assert!(matches!(
        err,
        GatewayError::Validation(ValidationError::OverlappingProxyPath { .. })
    ));
}
