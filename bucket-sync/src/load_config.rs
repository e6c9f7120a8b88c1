/// `load_config` module: loads a static YAML config and injects secrets from the environment
/// into the core's [`SynchroniseConfig`].
///
/// This module is the only place where user-supplied YAML is parsed.
///
/// # Responsibilities
/// - Parse the YAML file into the strongly-typed core configuration
/// - Inject host API tokens (`GITHUB_TOKEN`, `GITLAB_TOKEN`) for the enabled hosts
/// - Produce clear diagnostics: any failure in loading is an error with the offending path
///
/// Tokens are never read from the file itself.
use anyhow::{Context, Result};
use bucket_sync_core::config::SynchroniseConfig;
use std::env;
use std::fs;
use std::path::Path;
use tracing::{debug, error, info};

pub const GITHUB_TOKEN_ENV: &str = "GITHUB_TOKEN";
pub const GITLAB_TOKEN_ENV: &str = "GITLAB_TOKEN";

/// Loads a static YAML config file and injects host tokens from the environment.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<SynchroniseConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = fs::read_to_string(path_ref)
        .inspect_err(|e| error!(error = ?e, config_path = ?path_ref, "Failed to read config file"))
        .with_context(|| format!("Failed to read config file {}", path_ref.display()))?;

    let mut config: SynchroniseConfig = serde_yaml::from_str(&config_content)
        .inspect_err(|e| error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML"))
        .with_context(|| format!("Failed to parse config YAML {}", path_ref.display()))?;

    if let Some(github) = config.github.as_mut() {
        github.token = token_from_env(GITHUB_TOKEN_ENV);
    }
    if let Some(gitlab) = config.gitlab.as_mut() {
        gitlab.token = token_from_env(GITLAB_TOKEN_ENV);
    }

    config.trace_loaded();
    Ok(config)
}

fn token_from_env(name: &str) -> Option<String> {
    match env::var(name) {
        Ok(token) if !token.trim().is_empty() => {
            debug!(variable = name, "Injected host token from environment");
            Some(token.trim().to_string())
        }
        _ => {
            debug!(variable = name, "No host token in environment, using anonymous access");
            None
        }
    }
}
