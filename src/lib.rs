//! # flaresync - Cloud Armor allowlist sync for Cloudflare IP ranges
//!
//! Keeps the allow rules of a Google Cloud Armor security policy identical to
//! the IPv4 ranges Cloudflare publishes, touching the policy only when the
//! published list actually changed.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        flaresync                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  CLI (clap)                                                 │
//! │    └── --project, --policy, --debug, --dry-run              │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Config (serde_yaml)                                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Fetcher (reqwest + rustls)                                 │
//! │    └── Cloudflare /client/v4/ips (etag + ranges)            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Planner                                                    │
//! │    ├── Change gate (etag vs. policy description)            │
//! │    └── Batching (10 ranges per rule) and rule diff          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Executor                                                   │
//! │    ├── add / patch / remove, sequential, fail fast          │
//! │    └── Version stamp with the latest fingerprint            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Policy store (PolicyStore trait)                           │
//! │    └── CloudArmorStore (Compute Engine REST)                │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```no_run
//! use flaresync::config::Config;
//! use flaresync::fetcher::Fetcher;
//! use flaresync::model::PolicyRef;
//! use flaresync::policy::CloudArmorStore;
//! use flaresync::reconcile::{ReconcileOptions, Reconciler};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     let fetcher = Fetcher::new(config.source_url.clone(), config.http_timeout())?;
//!     let store = CloudArmorStore::connect(&config).await?;
//!
//!     let reconciler = Reconciler::new(
//!         fetcher,
//!         store,
//!         ReconcileOptions {
//!             rule_description: config.rule_description.clone(),
//!             comparison: config.comparison,
//!             dry_run: false,
//!         },
//!     );
//!     let outcome = reconciler.run(&PolicyRef::new("my-project", "edge-allow")).await?;
//!     println!("{:?}", outcome);
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`cli`] - Command-line interface definitions
//! - [`commands`] - CLI command implementations
//! - [`config`] - Configuration parsing and validation
//! - [`error`] - Error taxonomy
//! - [`executor`] - Sequential operation executor and version stamper
//! - [`fetcher`] - HTTP client for the published ranges
//! - [`lock`] - File locking against overlapping runs
//! - [`model`] - Desired state, policy snapshot and planned operations
//! - [`planner`] - Change detection and rule planning
//! - [`policy`] - Policy store abstraction and Cloud Armor client
//! - [`reconcile`] - One full reconciliation pass

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod executor;
pub mod fetcher;
pub mod lock;
pub mod model;
pub mod planner;
pub mod policy;
pub mod reconcile;

pub use cli::Cli;
pub use config::Config;
pub use error::SyncError;
