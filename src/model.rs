//! Data model shared by the fetcher, the planner and the policy store.

use std::fmt;

/// Maximum number of source ranges a single Cloud Armor rule may carry.
pub const BATCH_SIZE: usize = 10;

/// Description that marks a rule as owned by flaresync.
pub const DEFAULT_RULE_DESCRIPTION: &str = "cloudflare - dont change";

/// Identifies the security policy being reconciled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyRef {
    pub project: String,
    pub policy: String,
}

impl PolicyRef {
    pub fn new(project: impl Into<String>, policy: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            policy: policy.into(),
        }
    }
}

impl fmt::Display for PolicyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.project, self.policy)
    }
}

/// Snapshot of the published ranges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredState {
    /// Opaque token that changes whenever the published list changes
    pub version_tag: String,
    /// IPv4 ranges, in published order
    pub entries: Vec<String>,
    /// IPv6 ranges (carried through, not reconciled)
    pub ipv6_entries: Vec<String>,
}

/// A single rule in the policy, managed or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleBatch {
    pub priority: u32,
    pub cidrs: Vec<String>,
    pub description: String,
}

impl RuleBatch {
    pub fn is_managed(&self, sentinel: &str) -> bool {
        self.description == sentinel
    }
}

/// Current state of the security policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicySnapshot {
    /// Concurrency token; must be echoed back on policy writes
    pub fingerprint: String,
    /// Version tag stamped by the last successful run
    pub version_marker: String,
    /// Every rule in the policy, including ones flaresync does not own
    pub rules: Vec<RuleBatch>,
}

impl PolicySnapshot {
    /// Rules carrying the sentinel description, ordered by priority.
    pub fn managed_rules(&self, sentinel: &str) -> Vec<RuleBatch> {
        let mut managed: Vec<RuleBatch> = self
            .rules
            .iter()
            .filter(|r| r.is_managed(sentinel))
            .cloned()
            .collect();
        managed.sort_by_key(|r| r.priority);
        managed
    }
}

/// One mutation the executor must apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannedOperation {
    Add { priority: u32, cidrs: Vec<String> },
    Patch { priority: u32, cidrs: Vec<String> },
    Remove { priority: u32 },
}

impl PlannedOperation {
    pub fn priority(&self) -> u32 {
        match self {
            PlannedOperation::Add { priority, .. }
            | PlannedOperation::Patch { priority, .. }
            | PlannedOperation::Remove { priority } => *priority,
        }
    }

    /// Ranges carried by the operation (empty for removals).
    pub fn cidrs(&self) -> &[String] {
        match self {
            PlannedOperation::Add { cidrs, .. } | PlannedOperation::Patch { cidrs, .. } => cidrs,
            PlannedOperation::Remove { .. } => &[],
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PlannedOperation::Add { .. } => "add-rule",
            PlannedOperation::Patch { .. } => "patch-rule",
            PlannedOperation::Remove { .. } => "remove-rule",
        }
    }
}

impl fmt::Display for PlannedOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlannedOperation::Add { priority, cidrs } => {
                write!(f, "add    priority {:>3}: {}", priority, cidrs.join(", "))
            }
            PlannedOperation::Patch { priority, cidrs } => {
                write!(f, "patch  priority {:>3}: {}", priority, cidrs.join(", "))
            }
            PlannedOperation::Remove { priority } => write!(f, "remove priority {:>3}", priority),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(priority: u32, description: &str) -> RuleBatch {
        RuleBatch {
            priority,
            cidrs: vec!["10.0.0.0/8".to_string()],
            description: description.to_string(),
        }
    }

    #[test]
    fn test_managed_rules_filters_and_sorts() {
        let snapshot = PolicySnapshot {
            fingerprint: "fp".to_string(),
            version_marker: String::new(),
            rules: vec![
                rule(2, DEFAULT_RULE_DESCRIPTION),
                rule(2_147_483_647, "default rule"),
                rule(0, DEFAULT_RULE_DESCRIPTION),
                rule(1000, "office vpn"),
            ],
        };

        let managed = snapshot.managed_rules(DEFAULT_RULE_DESCRIPTION);
        let priorities: Vec<u32> = managed.iter().map(|r| r.priority).collect();
        assert_eq!(priorities, vec![0, 2]);
    }

    #[test]
    fn test_managed_match_is_exact() {
        let r = rule(0, "Cloudflare - dont change");
        assert!(!r.is_managed(DEFAULT_RULE_DESCRIPTION));
    }

    #[test]
    fn test_operation_accessors() {
        let add = PlannedOperation::Add {
            priority: 1,
            cidrs: vec!["1.1.1.0/24".to_string()],
        };
        let remove = PlannedOperation::Remove { priority: 4 };

        assert_eq!(add.priority(), 1);
        assert_eq!(add.kind(), "add-rule");
        assert_eq!(add.cidrs().len(), 1);
        assert_eq!(remove.priority(), 4);
        assert_eq!(remove.kind(), "remove-rule");
        assert!(remove.cidrs().is_empty());
    }

    #[test]
    fn test_operation_display() {
        let patch = PlannedOperation::Patch {
            priority: 2,
            cidrs: vec!["1.1.1.0/24".to_string(), "1.0.0.0/24".to_string()],
        };
        assert_eq!(
            patch.to_string(),
            "patch  priority   2: 1.1.1.0/24, 1.0.0.0/24"
        );
    }

    #[test]
    fn test_policy_ref_display() {
        let p = PolicyRef::new("my-project", "edge-allow");
        assert_eq!(p.to_string(), "my-project/edge-allow");
    }
}
