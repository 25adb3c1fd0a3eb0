//! CLI argument parsing with clap.

use clap::builder::NonEmptyStringValueParser;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::config::DEFAULT_CONFIG_PATH;

#[derive(Parser, Debug)]
#[command(name = "flaresync")]
#[command(
    author,
    version,
    about = "Sync a Cloud Armor allowlist with the published Cloudflare IP ranges"
)]
pub struct Cli {
    /// Google Cloud project
    #[arg(long, env = "FLARESYNC_PROJECT", value_parser = NonEmptyStringValueParser::new())]
    pub project: String,

    /// Cloud Armor policy name
    #[arg(long, env = "FLARESYNC_POLICY", value_parser = NonEmptyStringValueParser::new())]
    pub policy: String,

    /// Config file path (defaults are used when it does not exist)
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Add additional debugging output
    #[arg(short, long, visible_alias = "verbose")]
    pub debug: bool,

    /// Only log errors (for cron)
    #[arg(short, long, conflicts_with = "debug")]
    pub quiet: bool,

    /// Compute and print the plan without changing the policy
    #[arg(long)]
    pub dry_run: bool,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines
    Text,
    /// One JSON object per line
    Json,
}
