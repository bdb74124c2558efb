pub mod guard;
pub mod init;
pub mod simulate;
pub mod validate;

use crate::config::{expand_path, Config};
use anyhow::{Context, Result};
use std::path::PathBuf;
use tramlines_guardrail::{load_policies, Policy};

/// Policy files named on the command line, else those in the config
pub fn policy_paths(cli_paths: &[PathBuf], config: &Config) -> Vec<PathBuf> {
    if cli_paths.is_empty() {
        config.guardrail.policies.clone()
    } else {
        cli_paths.iter().map(|p| expand_path(p, None)).collect()
    }
}

/// Load and combine the active policies. `None` when no rules are configured.
pub fn load_active_policy(cli_paths: &[PathBuf], config: &Config) -> Result<Option<Policy>> {
    let registry = config.registry()?;
    let paths = policy_paths(cli_paths, config);
    load_policies(&paths, &registry).context("Failed to load policies")
}
