//! Rule-text helpers shared by the compiler and grant fragments.
//!
//! A resource mounted at `/acme` matches exactly `/acme` or anything under
//! `/acme/`, so `/acmefoo` never reaches it.

use crate::compiler::escape::ident;
use crate::model::{Resource, SubjectId};

pub fn backend_name(slug: &str) -> String {
    format!("{}_backend", ident(slug))
}

pub fn server_name(slug: &str) -> String {
    format!("{}_server", ident(slug))
}

pub fn path_acl_name(slug: &str) -> String {
    format!("is_{}", ident(slug))
}

pub fn subject_acl_name(subject: SubjectId) -> String {
    format!("user_{}", subject)
}

/// Two lines under one ACL name; the proxy ORs repeated declarations.
pub fn path_acls(resource: &Resource) -> [String; 2] {
    let acl = path_acl_name(&resource.slug);
    let prefix = resource.route_prefix();
    [
        format!("acl {} path {}", acl, prefix),
        format!("acl {} path_beg {}/", acl, prefix),
    ]
}

/// Header predicate identifying one subject.
pub fn subject_acl(subject: SubjectId, header: &str) -> String {
    format!(
        "acl {} hdr({}) {}",
        subject_acl_name(subject),
        ident(header),
        subject
    )
}

/// `use_backend` with the listed ACL names ANDed together.
pub fn use_backend(slug: &str, conditions: &[String]) -> String {
    if conditions.is_empty() {
        format!("use_backend {}", backend_name(slug))
    } else {
        format!("use_backend {} if {}", backend_name(slug), conditions.join(" "))
    }
}

/// `/acme` → `/`, `/acme/rest` → `/rest`.
pub fn path_rewrites(resource: &Resource) -> [String; 2] {
    let prefix = resource.route_prefix();
    [
        format!("http-request set-path / if {{ path {} }}", prefix),
        format!(
            "http-request set-path %[path,regsub(^{}/,/)] if {{ path_beg {}/ }}",
            prefix, prefix
        ),
    ]
}

/// Rule fragment persisted with a grant.
///
/// The subject header predicate is only added when the resource requires
/// authentication and a subject is given.
pub fn grant_rule(resource: &Resource, subject: Option<SubjectId>, header: &str) -> String {
    let mut lines: Vec<String> = path_acls(resource).into();
    let mut conditions = vec![path_acl_name(&resource.slug)];

    if let Some(subject) = subject.filter(|_| resource.requires_auth) {
        lines.push(subject_acl(subject, header));
        conditions.push(subject_acl_name(subject));
    }

    lines.push(use_backend(&resource.slug, &conditions));
    lines.join("\n")
}
