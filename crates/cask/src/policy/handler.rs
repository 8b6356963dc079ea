//! Policy handler trait and implementations.

/// The storage operation being performed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    /// Storing a value
    Put,
    /// Checking whether a key exists
    Has,
    /// Reading a value
    Get,
}

impl Operation {
    /// Returns true if this is a read-only operation.
    pub fn is_read_only(&self) -> bool {
        matches!(self, Operation::Has | Operation::Get)
    }

    /// Returns true if this is a write operation.
    pub fn is_write(&self) -> bool {
        !self.is_read_only()
    }
}

const READ_OPERATIONS: &[Operation] = &[Operation::Has, Operation::Get];
const WRITE_OPERATIONS: &[Operation] = &[Operation::Put];

/// The result of a policy check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PolicyDecision {
    /// The operation is allowed.
    Allow,
    /// The operation is denied with a reason.
    Deny(String),
}

impl PolicyDecision {
    /// Returns true if the operation is allowed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, PolicyDecision::Allow)
    }

    /// Returns the denial reason if denied, None if allowed.
    pub fn denial_reason(&self) -> Option<&str> {
        match self {
            PolicyDecision::Allow => None,
            PolicyDecision::Deny(reason) => Some(reason),
        }
    }
}

/// Trait for policy handlers that check key access.
///
/// Policy checks run synchronously inside every storage command, while the
/// guest is suspended, so implementations should be fast.
pub trait PolicyHandler: Send + Sync {
    /// Check if `operation` on `key` is allowed.
    fn check_access(&self, key: &str, operation: Operation) -> PolicyDecision;
}

impl PolicyHandler for std::sync::Arc<dyn PolicyHandler> {
    fn check_access(&self, key: &str, operation: Operation) -> PolicyDecision {
        (**self).check_access(key, operation)
    }
}

/// A policy that allows all operations.
#[derive(Clone, Debug, Default)]
pub struct AllowAllPolicy;

impl PolicyHandler for AllowAllPolicy {
    fn check_access(&self, _key: &str, _operation: Operation) -> PolicyDecision {
        PolicyDecision::Allow
    }
}

/// A policy that denies all operations.
#[derive(Clone, Debug, Default)]
pub struct DenyAllPolicy;

impl PolicyHandler for DenyAllPolicy {
    fn check_access(&self, key: &str, operation: Operation) -> PolicyDecision {
        PolicyDecision::Deny(format!("{:?} access to {} denied by policy", operation, key))
    }
}

/// A rule in a policy.
#[derive(Clone, Debug)]
struct PolicyRule {
    /// Glob pattern to match keys
    pattern: glob::Pattern,
    /// Operations this rule applies to (None = all operations)
    operations: Option<&'static [Operation]>,
    /// Whether this rule allows or denies
    allow: bool,
}

impl PolicyRule {
    fn matches(&self, key: &str, operation: Operation) -> bool {
        if !self.pattern.matches(key) {
            return false;
        }

        match self.operations {
            Some(ops) => ops.contains(&operation),
            None => true,
        }
    }
}

/// A configurable policy built from rules.
///
/// Rules are evaluated in order - the first matching rule determines the decision.
/// If no rules match, the default decision is used (deny by default).
#[derive(Clone, Debug)]
pub struct Policy {
    rules: Vec<PolicyRule>,
    default_decision: PolicyDecision,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            default_decision: PolicyDecision::Deny("no matching policy rule".to_string()),
        }
    }
}

impl Policy {
    /// Create a new empty policy with deny-by-default.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a policy that allows everything.
    pub fn allow_all() -> Self {
        Self {
            rules: Vec::new(),
            default_decision: PolicyDecision::Allow,
        }
    }
}

impl PolicyHandler for Policy {
    fn check_access(&self, key: &str, operation: Operation) -> PolicyDecision {
        for rule in &self.rules {
            if rule.matches(key, operation) {
                return if rule.allow {
                    PolicyDecision::Allow
                } else {
                    PolicyDecision::Deny(format!(
                        "{:?} access to {} denied by policy rule",
                        operation, key
                    ))
                };
            }
        }

        self.default_decision.clone()
    }
}

/// Builder for creating policies with a fluent API.
///
/// Keys are matched with glob patterns, so `/` has no special meaning unless
/// a bundle chooses to namespace its keys that way.
///
/// # Example
///
/// ```rust
/// use cask::policy::{Operation, PolicyBuilder, PolicyHandler};
///
/// let policy = PolicyBuilder::new()
///     .deny_read("secret/*")
///     .allow_read("*")
///     .allow_write("scratch/*")
///     .build();
///
/// assert!(policy.check_access("user/1", Operation::Get).is_allowed());
/// assert!(!policy.check_access("user/1", Operation::Put).is_allowed());
/// assert!(!policy.check_access("secret/token", Operation::Has).is_allowed());
/// ```
#[derive(Clone, Debug, Default)]
pub struct PolicyBuilder {
    rules: Vec<PolicyRule>,
    default_allow: bool,
}

impl PolicyBuilder {
    /// Create a new policy builder with deny-by-default.
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            default_allow: false,
        }
    }

    /// Create a new policy builder with allow-by-default.
    ///
    /// Use this when you only want to specify what to deny.
    pub fn allow_by_default() -> Self {
        Self {
            rules: Vec::new(),
            default_allow: true,
        }
    }

    fn rule(mut self, pattern: &str, operations: Option<&'static [Operation]>, allow: bool) -> Self {
        match glob::Pattern::new(pattern) {
            Ok(pattern) => self.rules.push(PolicyRule {
                pattern,
                operations,
                allow,
            }),
            Err(err) => {
                tracing::warn!(pattern = %pattern, error = %err, "ignoring invalid policy pattern");
            }
        }
        self
    }

    /// Allow `Has` and `Get` on keys matching the given glob pattern.
    pub fn allow_read(self, pattern: &str) -> Self {
        self.rule(pattern, Some(READ_OPERATIONS), true)
    }

    /// Allow `Put` on keys matching the given glob pattern.
    pub fn allow_write(self, pattern: &str) -> Self {
        self.rule(pattern, Some(WRITE_OPERATIONS), true)
    }

    /// Allow all operations on keys matching the given glob pattern.
    pub fn allow_all(self, pattern: &str) -> Self {
        self.rule(pattern, None, true)
    }

    /// Deny `Has` and `Get` on keys matching the given glob pattern.
    pub fn deny_read(self, pattern: &str) -> Self {
        self.rule(pattern, Some(READ_OPERATIONS), false)
    }

    /// Deny `Put` on keys matching the given glob pattern.
    pub fn deny_write(self, pattern: &str) -> Self {
        self.rule(pattern, Some(WRITE_OPERATIONS), false)
    }

    /// Deny all operations on keys matching the given glob pattern.
    pub fn deny_all(self, pattern: &str) -> Self {
        self.rule(pattern, None, false)
    }

    /// Build the policy.
    pub fn build(self) -> Policy {
        Policy {
            rules: self.rules,
            default_decision: if self.default_allow {
                PolicyDecision::Allow
            } else {
                PolicyDecision::Deny("no matching policy rule".to_string())
            },
        }
    }
}

/// Policy with full read access and no writes.
pub fn read_only_policy() -> Policy {
    PolicyBuilder::new().allow_read("*").build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_all_policy() {
        let policy = AllowAllPolicy;
        assert!(policy.check_access("any", Operation::Get).is_allowed());
        assert!(policy.check_access("any", Operation::Put).is_allowed());
    }

    #[test]
    fn test_deny_all_policy() {
        let policy = DenyAllPolicy;
        let decision = policy.check_access("any", Operation::Has);
        assert!(!decision.is_allowed());
        assert_eq!(
            decision.denial_reason(),
            Some("Has access to any denied by policy")
        );
    }

    #[test]
    fn test_policy_builder_allow_read() {
        let policy = PolicyBuilder::new().allow_read("user/*").build();

        assert!(policy.check_access("user/1", Operation::Get).is_allowed());
        assert!(policy.check_access("user/1", Operation::Has).is_allowed());
        assert!(!policy.check_access("order/1", Operation::Get).is_allowed());
        // Write should be denied
        assert!(!policy.check_access("user/1", Operation::Put).is_allowed());
    }

    #[test]
    fn test_policy_builder_allow_write() {
        let policy = PolicyBuilder::new()
            .allow_read("*")
            .allow_write("scratch/*")
            .build();

        assert!(policy.check_access("config", Operation::Get).is_allowed());
        assert!(policy.check_access("scratch/tmp", Operation::Put).is_allowed());
        assert!(!policy.check_access("config", Operation::Put).is_allowed());
    }

    #[test]
    fn test_policy_rule_order() {
        // Deny specific key, allow the rest
        let policy = PolicyBuilder::new()
            .deny_read("secrets")
            .allow_read("*")
            .build();

        assert!(!policy.check_access("secrets", Operation::Get).is_allowed());
        assert!(policy.check_access("params", Operation::Get).is_allowed());
    }

    #[test]
    fn test_allow_by_default_with_deny_rule() {
        let policy = PolicyBuilder::allow_by_default()
            .deny_write("locked/*")
            .build();

        assert!(policy.check_access("anything", Operation::Put).is_allowed());
        assert!(policy.check_access("locked/a", Operation::Get).is_allowed());
        assert!(!policy.check_access("locked/a", Operation::Put).is_allowed());
    }

    #[test]
    fn test_invalid_pattern_is_ignored() {
        let policy = PolicyBuilder::new().allow_all("[unclosed").build();
        assert!(!policy.check_access("[unclosed", Operation::Get).is_allowed());
    }

    #[test]
    fn test_read_only_policy() {
        let policy = read_only_policy();

        assert!(policy.check_access("k", Operation::Get).is_allowed());
        assert!(policy.check_access("k", Operation::Has).is_allowed());
        assert!(!policy.check_access("k", Operation::Put).is_allowed());
    }

    #[test]
    fn test_operation_classification() {
        assert!(Operation::Get.is_read_only());
        assert!(Operation::Has.is_read_only());
        assert!(Operation::Put.is_write());
    }
}
