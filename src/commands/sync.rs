//! Sync command implementation.

use anyhow::{Context, Result};
use tracing::{info, info_span, Instrument};

use crate::cli::Cli;
use crate::config::Config;
use crate::error::SyncError;
use crate::fetcher::Fetcher;
use crate::lock::LockGuard;
use crate::model::PolicyRef;
use crate::policy::CloudArmorStore;
use crate::reconcile::{ReconcileOptions, Reconciler, RunOutcome};

/// Run one reconciliation pass for the policy named on the command line
pub async fn run(cli: &Cli) -> Result<()> {
    let config = Config::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load config from {:?}", cli.config))?;

    let _lock = match &config.lock_file {
        Some(path) => Some(LockGuard::acquire(path)?),
        None => None,
    };

    let policy = PolicyRef::new(cli.project.clone(), cli.policy.clone());
    let span = info_span!("sync", project = %policy.project, policy = %policy.policy);

    let run = sync_once(&config, &policy, cli.dry_run);
    let outcome = tokio::time::timeout(config.run_timeout(), run)
        .instrument(span)
        .await
        .map_err(|_| SyncError::Timeout(config.run_timeout_secs))??;

    report(&outcome);
    Ok(())
}

async fn sync_once(config: &Config, policy: &PolicyRef, dry_run: bool) -> Result<RunOutcome> {
    info!("Starting flaresync for policy {}", policy);

    let fetcher = Fetcher::new(config.source_url.clone(), config.http_timeout())?;
    let store = CloudArmorStore::connect(config).await?;

    let reconciler = Reconciler::new(
        fetcher,
        store,
        ReconcileOptions {
            rule_description: config.rule_description.clone(),
            comparison: config.comparison,
            dry_run,
        },
    );

    let outcome = reconciler
        .run(policy)
        .await
        .with_context(|| format!("Failed to sync policy {}", policy))?;

    info!("Stopping flaresync");
    Ok(outcome)
}

fn report(outcome: &RunOutcome) {
    match outcome {
        RunOutcome::Unchanged { version } => {
            println!("[OK] Policy already at version {}", version);
        }
        RunOutcome::Reconciled { version, applied } => {
            println!(
                "[OK] Policy updated to version {} ({} rule operation(s))",
                version, applied
            );
        }
        RunOutcome::Planned { version, ops } => {
            println!("[DRY RUN] Plan for version {}:", version);
            if ops.is_empty() {
                println!("  no rule changes, version marker only");
            }
            for op in ops {
                println!("  {}", op);
            }
        }
    }
}
