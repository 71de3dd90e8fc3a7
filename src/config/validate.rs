// src/config/validate.rs

use anyhow::{Result, anyhow};

use crate::config::model::ConfigFile;

/// Run semantic validation against a loaded configuration.
///
/// This checks:
/// - there is at least one `[source.<name>]` section
/// - `poll.interval_secs >= 1`, `poll.max_workers >= 1`,
///   `poll.source_timeout_secs >= 1`
/// - every action has a non-empty command
/// - every action name referenced by the execution map exists
///
/// Failures here are fatal at startup. An execution-map reference that
/// somehow slips past is skipped with a warning at dispatch time instead.
pub fn validate_config(cfg: &ConfigFile) -> Result<()> {
    ensure_has_sources(cfg)?;
    validate_poll_limits(cfg)?;
    validate_actions(cfg)?;
    validate_execution_map(cfg)?;
    Ok(())
}

fn ensure_has_sources(cfg: &ConfigFile) -> Result<()> {
    if cfg.source.is_empty() {
        return Err(anyhow!(
            "config must contain at least one [source.\"<name>\"] section"
        ));
    }
    Ok(())
}

fn validate_poll_limits(cfg: &ConfigFile) -> Result<()> {
    if cfg.poll.interval_secs == 0 {
        return Err(anyhow!("[poll].interval_secs must be >= 1 (got 0)"));
    }
    if cfg.poll.max_workers == 0 {
        return Err(anyhow!("[poll].max_workers must be >= 1 (got 0)"));
    }
    if cfg.poll.source_timeout_secs == 0 {
        return Err(anyhow!("[poll].source_timeout_secs must be >= 1 (got 0)"));
    }
    Ok(())
}

fn validate_actions(cfg: &ConfigFile) -> Result<()> {
    for (name, action) in cfg.action.iter() {
        if action.command.trim().is_empty() {
            return Err(anyhow!("action '{}' has an empty command", name));
        }
        if let Some(0) = action.timeout_secs {
            return Err(anyhow!("action '{}' has timeout_secs = 0", name));
        }
    }
    Ok(())
}

fn validate_execution_map(cfg: &ConfigFile) -> Result<()> {
    for (source, branches) in cfg.execution.iter() {
        if source != "*" && !cfg.source.contains_key(source) {
            return Err(anyhow!(
                "execution map entry '{}' does not match any [source.\"<name>\"] section",
                source
            ));
        }
        for (branch, actions) in branches.iter() {
            for action in actions.iter() {
                if !cfg.action.contains_key(action) {
                    return Err(anyhow!(
                        "execution map [execution.\"{}\"].\"{}\" references unknown action '{}'",
                        source,
                        branch,
                        action
                    ));
                }
            }
        }
    }
    Ok(())
}
