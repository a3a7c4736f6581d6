//! Administrator authorization.
//!
//! Privileged commands (`af`, `rf`, `if`, `scan`, `reload`) ask an
//! [`Authorizer`] whether the issuer's hostmask belongs to an administrator.
//! Every decision is logged for audit.

use crate::mask;
use tracing::{debug, trace};

/// Decides whether a hostmask belongs to an administrator.
pub trait Authorizer: Send + Sync {
    fn is_admin(&self, hostmask: &str) -> bool;

    /// Whether the issuer may run admin commands; unknown issuers never may.
    fn authorize(&self, hostmask: Option<&str>) -> bool {
        hostmask.is_some_and(|h| self.is_admin(h))
    }
}

/// Administrators identified by glob hostmask patterns from the config file.
#[derive(Debug, Clone, Default)]
pub struct AdminMasks {
    patterns: Vec<String>,
}

impl AdminMasks {
    pub fn new(patterns: Vec<String>) -> Self {
        Self { patterns }
    }
}

impl Authorizer for AdminMasks {
    fn is_admin(&self, hostmask: &str) -> bool {
        let granted = mask::match_any(hostmask, &self.patterns);
        if granted {
            debug!(hostmask = %hostmask, "Administrator recognized");
        } else {
            trace!(hostmask = %hostmask, "Not an administrator");
        }
        granted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_masks() {
        let admins = AdminMasks::new(vec!["*!*@admin.example.com".into()]);
        assert!(admins.is_admin("root!r@admin.example.com"));
        assert!(!admins.is_admin("bob!b@friend.net"));
        assert!(!admins.authorize(None));
        assert!(admins.authorize(Some("root!r@admin.example.com")));
    }

    #[test]
    fn test_no_masks_means_no_admins() {
        assert!(!AdminMasks::default().is_admin("root!r@admin.example.com"));
    }
}
