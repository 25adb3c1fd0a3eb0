//! Policy store abstraction (Cloud Armor).

mod auth;
mod cloud_armor;

use async_trait::async_trait;

pub use auth::{resolve_access_token, METADATA_TOKEN_URL};
pub use cloud_armor::{classify_status, decode_snapshot, CloudArmorStore, RuleTemplate};

#[cfg(test)]
use mockall::automock;

use crate::error::Result;
use crate::model::{PolicyRef, PolicySnapshot};

/// Operations flaresync needs from the policy store.
///
/// Every mutating call resolves only once the store has finished applying
/// it, so the next call always sees the resulting fingerprint.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Read the policy with all of its rules
    async fn get_policy(&self, policy: &PolicyRef) -> Result<PolicySnapshot>;

    /// Replace the policy description, guarded by `fingerprint`
    async fn patch_description(
        &self,
        policy: &PolicyRef,
        fingerprint: &str,
        description: &str,
    ) -> Result<()>;

    /// Insert a managed rule at `priority`
    async fn add_rule(&self, policy: &PolicyRef, priority: u32, cidrs: &[String]) -> Result<()>;

    /// Replace the ranges of the managed rule at `priority`
    async fn patch_rule(&self, policy: &PolicyRef, priority: u32, cidrs: &[String])
        -> Result<()>;

    /// Delete the rule at `priority`
    async fn remove_rule(&self, policy: &PolicyRef, priority: u32) -> Result<()>;
}
