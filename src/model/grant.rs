//! Access grants tying a subject (or everyone) to a resource.

use serde::{Deserialize, Serialize};

use crate::model::resource::{ResourceId, SubjectId};

pub type GrantId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantKind {
    /// Scoped to one subject, usually time bounded.
    Subject,
    /// Open to everyone; never expires.
    Global,
}

impl GrantKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrantKind::Subject => "subject",
            GrantKind::Global => "global",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessGrant {
    pub id: GrantId,
    pub resource_id: ResourceId,
    /// `None` marks a global grant.
    pub subject_id: Option<SubjectId>,
    /// Stable name, also used for the legacy side file.
    pub config_name: String,
    /// Rendered rule fragment.
    pub rule: String,
    pub is_active: bool,
    pub expires_at: Option<u64>,
    pub usage_count: u64,
    pub last_used: Option<u64>,
    pub created_at: u64,
}

impl AccessGrant {
    pub fn kind(&self) -> GrantKind {
        match self.subject_id {
            Some(_) => GrantKind::Subject,
            None => GrantKind::Global,
        }
    }

    /// True iff an expiry is set and `now` is strictly past it.
    pub fn is_expired_at(&self, now: u64) -> bool {
        matches!(self.expires_at, Some(expires_at) if now > expires_at)
    }

    /// Active and not expired. Whether the resource is live is checked by the caller.
    pub fn is_live_at(&self, now: u64) -> bool {
        self.is_active && !self.is_expired_at(now)
    }

    pub fn record_usage(&mut self, now: u64) {
        self.usage_count += 1;
        self.last_used = Some(now);
    }
}

/// Input for persisting a grant.
#[derive(Debug, Clone)]
pub struct NewGrant {
    pub resource_id: ResourceId,
    pub subject_id: Option<SubjectId>,
    pub config_name: String,
    pub rule: String,
    pub expires_at: Option<u64>,
    pub created_at: u64,
}

impl NewGrant {
    pub fn into_grant(self, id: GrantId) -> AccessGrant {
        AccessGrant {
            id,
            resource_id: self.resource_id,
            subject_id: self.subject_id,
            config_name: self.config_name,
            rule: self.rule,
            is_active: true,
            expires_at: self.expires_at,
            usage_count: 0,
            last_used: None,
            created_at: self.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: u64 = 1_700_000_000;
    const DAY: u64 = 24 * 60 * 60;

    fn grant(expires_at: Option<u64>) -> AccessGrant {
        NewGrant {
            resource_id: 1,
            subject_id: Some(42),
            config_name: "acme_42_1700000000".into(),
            rule: String::new(),
            expires_at,
            created_at: T,
        }
        .into_grant(1)
    }

    #[test]
    fn test_expiry_boundary() {
        let g = grant(Some(T + DAY));
        assert!(!g.is_expired_at(T + DAY - 60));
        assert!(!g.is_expired_at(T + DAY));
        assert!(g.is_expired_at(T + DAY + 1));
    }

    #[test]
    fn test_permanent_grant_never_expires() {
        let g = grant(None);
        assert!(!g.is_expired_at(u64::MAX));
    }

    #[test]
    fn test_usage_and_kind() {
        let mut g = grant(None);
        g.record_usage(T + 5);
        g.record_usage(T + 9);
        assert_eq!(g.usage_count, 2);
        assert_eq!(g.last_used, Some(T + 9));
        assert_eq!(g.kind(), GrantKind::Subject);

        g.subject_id = None;
        assert_eq!(g.kind(), GrantKind::Global);
    }

    #[test]
    fn test_inactive_grant_is_not_live() {
        let mut g = grant(Some(T + DAY));
        assert!(g.is_live_at(T));
        g.is_active = false;
        assert!(!g.is_live_at(T));
    }
}
