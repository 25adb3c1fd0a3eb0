//! Sequential application of planned operations and version stamping.

use tracing::{error, info};

use crate::error::Result;
use crate::model::{PlannedOperation, PolicyRef};
use crate::policy::PolicyStore;

/// Apply `ops` in order, stopping at the first failure.
///
/// Returns the number of operations applied.
pub async fn execute<S: PolicyStore + ?Sized>(
    store: &S,
    policy: &PolicyRef,
    ops: &[PlannedOperation],
) -> Result<usize> {
    for (index, op) in ops.iter().enumerate() {
        info!("[{}/{}] {}", index + 1, ops.len(), op);

        let result = match op {
            PlannedOperation::Add { priority, cidrs } => {
                store.add_rule(policy, *priority, cidrs).await
            }
            PlannedOperation::Patch { priority, cidrs } => {
                store.patch_rule(policy, *priority, cidrs).await
            }
            PlannedOperation::Remove { priority } => store.remove_rule(policy, *priority).await,
        };

        if let Err(e) = result {
            error!(
                "{} at priority {} failed, {} operation(s) not attempted",
                op.kind(),
                op.priority(),
                ops.len() - index - 1
            );
            return Err(e);
        }
    }
    Ok(ops.len())
}

/// Record `version_tag` on the policy using its latest fingerprint.
pub async fn stamp_version<S: PolicyStore + ?Sized>(
    store: &S,
    policy: &PolicyRef,
    version_tag: &str,
) -> Result<()> {
    let snapshot = store.get_policy(policy).await?;
    info!("Updating the policy description with version {}", version_tag);
    store
        .patch_description(policy, &snapshot.fingerprint, version_tag)
        .await
}
