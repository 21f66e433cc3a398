//! Caller identity and access rules.
//!
//! Every mutating operation consults [`AccessPolicy`] with an explicit
//! [`CallerContext`] before touching the ledger. The admin bit on the
//! context has exactly one source per caller origin:
//!
//! - [`CallerOrigin::Account`] - the persisted `is_admin` flag of the
//!   caller's own account, snapshotted when the account was created.
//! - [`CallerOrigin::Bootstrap`] - the break-glass operator login, which is
//!   always admin and never has an account.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::types::{EmailClaim, UserId};

/// How a caller was authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallerOrigin {
    /// Verified identity backed by a ledger account.
    Account,
    /// Break-glass operator credential.
    Bootstrap,
}

/// The authenticated caller of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerContext {
    /// Verified subject. Equals the caller's account id for `Account` callers.
    pub subject: UserId,
    /// Email claim, if the credential carried one.
    pub email: Option<EmailClaim>,
    /// Admin bit from the single source of truth for this origin.
    pub is_admin: bool,
    /// How the caller was authenticated.
    pub origin: CallerOrigin,
}

impl CallerContext {
    /// Context for an identity-verified caller with a persisted account.
    #[must_use]
    pub const fn account(subject: UserId, email: Option<EmailClaim>, is_admin: bool) -> Self {
        Self {
            subject,
            email,
            is_admin,
            origin: CallerOrigin::Account,
        }
    }

    /// Context for the break-glass operator.
    #[must_use]
    pub const fn bootstrap(subject: UserId) -> Self {
        Self {
            subject,
            email: None,
            is_admin: true,
            origin: CallerOrigin::Bootstrap,
        }
    }
}

/// Static set of email claims granted admin on account creation.
#[derive(Debug, Clone, Default)]
pub struct AdminAllowList {
    emails: HashSet<String>,
}

impl AdminAllowList {
    /// Build an allow-list from raw email strings.
    ///
    /// Entries are trimmed and lowercased; blank entries are skipped.
    pub fn new<I, S>(emails: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let emails = emails
            .into_iter()
            .map(|e| e.as_ref().trim().to_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        Self { emails }
    }

    /// Parse a comma-separated list, e.g. from an environment variable.
    #[must_use]
    pub fn from_csv(raw: &str) -> Self {
        Self::new(raw.split(','))
    }

    /// Membership test for an optional claim. No claim is never admin.
    #[must_use]
    pub fn contains(&self, claim: Option<&EmailClaim>) -> bool {
        claim.is_some_and(|c| self.emails.contains(&c.normalized()))
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.emails.len()
    }

    /// Whether the list has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.emails.is_empty()
    }
}

/// Outcome of an access check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// The caller may proceed.
    Allowed,
    /// The caller is authenticated but not permitted.
    Denied,
}

impl Access {
    /// Whether access was granted.
    #[must_use]
    pub const fn is_allowed(self) -> bool {
        matches!(self, Self::Allowed)
    }

    const fn from_bool(allowed: bool) -> Self {
        if allowed { Self::Allowed } else { Self::Denied }
    }
}

/// The named access rules.
pub struct AccessPolicy;

impl AccessPolicy {
    /// Allowed iff the caller targets their own account or is admin.
    #[must_use]
    pub fn self_or_admin(caller: &CallerContext, target: &UserId) -> Access {
        Access::from_bool(caller.is_admin || caller.subject == *target)
    }

    /// Allowed iff the caller is admin.
    #[must_use]
    pub const fn admin_only(caller: &CallerContext) -> Access {
        Access::from_bool(caller.is_admin)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn uid(s: &str) -> UserId {
        UserId::parse(s).unwrap()
    }

    fn user(id: &str, is_admin: bool) -> CallerContext {
        CallerContext::account(uid(id), None, is_admin)
    }

    #[test]
    fn test_self_or_admin_self() {
        assert_eq!(
            AccessPolicy::self_or_admin(&user("u1", false), &uid("u1")),
            Access::Allowed
        );
    }

    #[test]
    fn test_self_or_admin_other_user_denied() {
        assert_eq!(
            AccessPolicy::self_or_admin(&user("u3", false), &uid("u4")),
            Access::Denied
        );
    }

    #[test]
    fn test_self_or_admin_admin_on_other_user() {
        assert!(AccessPolicy::self_or_admin(&user("root", true), &uid("u4")).is_allowed());
    }

    #[test]
    fn test_admin_only() {
        assert_eq!(AccessPolicy::admin_only(&user("u1", false)), Access::Denied);
        assert_eq!(AccessPolicy::admin_only(&user("u1", true)), Access::Allowed);
        assert_eq!(
            AccessPolicy::admin_only(&CallerContext::bootstrap(uid("bootstrap:ops"))),
            Access::Allowed
        );
    }

    #[test]
    fn test_allow_list_is_case_insensitive() {
        let list = AdminAllowList::from_csv(" Ops@Example.com ,, boss@example.com");
        assert_eq!(list.len(), 2);
        let claim = EmailClaim::parse("OPS@example.COM").unwrap();
        assert!(list.contains(Some(&claim)));
        let other = EmailClaim::parse("intern@example.com").unwrap();
        assert!(!list.contains(Some(&other)));
        assert!(!list.contains(None));
    }

    #[test]
    fn test_empty_allow_list() {
        let list = AdminAllowList::from_csv("");
        assert!(list.is_empty());
    }
}
