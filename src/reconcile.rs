//! One reconciliation pass: fetch, read, detect, plan, execute, stamp.

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::Result;
use crate::executor::{execute, stamp_version};
use crate::fetcher::Fetcher;
use crate::model::{DesiredState, PlannedOperation, PolicyRef};
use crate::planner::{batches_needed, plan, should_reconcile, Comparison};
use crate::policy::PolicyStore;

/// Source of the published ranges.
#[async_trait]
pub trait RangesSource: Send + Sync {
    async fn fetch_desired_state(&self) -> Result<DesiredState>;
}

#[async_trait]
impl RangesSource for Fetcher {
    async fn fetch_desired_state(&self) -> Result<DesiredState> {
        Fetcher::fetch_desired_state(self).await
    }
}

/// Per-run settings
#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    /// Description identifying managed rules
    pub rule_description: String,
    pub comparison: Comparison,
    /// Plan only, never mutate
    pub dry_run: bool,
}

/// What a run did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The policy already carries the published version
    Unchanged { version: String },
    /// Rules were brought in line and the version stamped
    Reconciled { version: String, applied: usize },
    /// Dry run: the operations that would have been applied
    Planned {
        version: String,
        ops: Vec<PlannedOperation>,
    },
}

pub struct Reconciler<R, S> {
    source: R,
    store: S,
    options: ReconcileOptions,
}

impl<R: RangesSource, S: PolicyStore> Reconciler<R, S> {
    pub fn new(source: R, store: S, options: ReconcileOptions) -> Self {
        Self {
            source,
            store,
            options,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Run a single pass against `policy`.
    pub async fn run(&self, policy: &PolicyRef) -> Result<RunOutcome> {
        let desired = self.source.fetch_desired_state().await?;
        for cidr in &desired.entries {
            debug!("Published range {}", cidr);
        }

        let snapshot = self.store.get_policy(policy).await?;
        info!("Version marker on policy: {:?}", snapshot.version_marker);

        if !should_reconcile(&desired.version_tag, &snapshot.version_marker) {
            info!("Policy already at version {}, nothing to do", desired.version_tag);
            return Ok(RunOutcome::Unchanged {
                version: desired.version_tag,
            });
        }

        let managed = snapshot.managed_rules(&self.options.rule_description);
        debug!(
            "Found {} managed rules, {} needed",
            managed.len(),
            batches_needed(desired.entries.len())
        );

        let ops = plan(&desired.entries, &managed, self.options.comparison);
        info!("Planned {} operation(s)", ops.len());

        if self.options.dry_run {
            return Ok(RunOutcome::Planned {
                version: desired.version_tag,
                ops,
            });
        }

        let applied = execute(&self.store, policy, &ops).await?;
        stamp_version(&self.store, policy, &desired.version_tag).await?;

        Ok(RunOutcome::Reconciled {
            version: desired.version_tag,
            applied,
        })
    }
}
