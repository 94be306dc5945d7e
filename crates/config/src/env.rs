// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the supervisor.
//!
//! All variables are optional and defaulted; values that must be positive
//! fail startup when set to zero or garbage.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnvError {
    #[error("{var} must be a positive integer, got {value:?}")]
    NotPositive { var: &'static str, value: String },

    #[error("{var} must be a non-negative integer, got {value:?}")]
    NotAnInteger { var: &'static str, value: String },
}

/// Environment-derived supervisor configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    /// debug | info | warning | error | critical
    pub log_level: String,
    /// Main-loop tick interval.
    pub interval: Duration,
    pub max_concurrent_global: usize,
    pub max_concurrent_per_server: usize,
    /// 0 means unbounded.
    pub max_cycles: u64,
    pub max_retries: u32,
    /// 0 disables the status monitor.
    pub status_monitor_interval: Duration,
    /// 0 disables the concurrency monitor.
    pub concurrency_monitor_interval: Duration,
    pub truncate_max_lines: usize,
    pub truncate_max_line_length: usize,
    /// Path to the repos-to-convert manifest.
    pub repos_to_convert: PathBuf,
    /// Root of the shared storage the Git server serves from.
    pub serve_root: PathBuf,
    /// BUILD_* passthrough, logged at startup.
    pub build_metadata: Vec<(String, String)>,
}

impl EnvConfig {
    /// Load from the process environment.
    pub fn load() -> Result<Self, EnvError> {
        Ok(Self {
            log_level: var_or("LOG_LEVEL", "info").to_lowercase(),
            interval: Duration::from_secs(positive("REPO_CONVERTER_INTERVAL_SECONDS", 3600)?),
            max_concurrent_global: positive("MAX_CONCURRENT_CONVERSIONS_GLOBAL", 10)? as usize,
            max_concurrent_per_server: positive("MAX_CONCURRENT_CONVERSIONS_PER_SERVER", 10)?
                as usize,
            max_cycles: non_negative("MAX_CYCLES", 0)?,
            max_retries: non_negative("MAX_RETRIES", 3)? as u32,
            status_monitor_interval: Duration::from_secs(non_negative(
                "STATUS_MONITOR_INTERVAL",
                60,
            )?),
            concurrency_monitor_interval: Duration::from_secs(non_negative(
                "CONCURRENCY_MONITOR_INTERVAL",
                30,
            )?),
            truncate_max_lines: positive("TRUNCATED_OUTPUT_MAX_LINES", 20)? as usize,
            truncate_max_line_length: positive("TRUNCATED_OUTPUT_MAX_LINE_LENGTH", 200)? as usize,
            repos_to_convert: PathBuf::from(var_or("REPOS_TO_CONVERT", "/sg/repos-to-convert.yaml")),
            serve_root: PathBuf::from(var_or("SRC_SERVE_ROOT", "/sg/src-serve-root")),
            build_metadata: build_metadata(),
        })
    }

    /// `LOG_LEVEL` expressed as a tracing env-filter directive.
    /// "warning" and "critical" are the manifest's spellings for
    /// tracing's "warn" and "error".
    pub fn tracing_directive(&self) -> &'static str {
        match self.log_level.as_str() {
            "debug" => "debug",
            "warning" | "warn" => "warn",
            "error" | "critical" => "error",
            _ => "info",
        }
    }
}

fn var_or(key: &str, default: &str) -> String {
    std::env::var(key).ok().filter(|v| !v.is_empty()).unwrap_or_else(|| default.to_string())
}

fn positive(var: &'static str, default: u64) -> Result<u64, EnvError> {
    match std::env::var(var) {
        Ok(raw) if !raw.is_empty() => match raw.parse::<u64>() {
            Ok(v) if v > 0 => Ok(v),
            _ => Err(EnvError::NotPositive { var, value: raw }),
        },
        _ => Ok(default),
    }
}

fn non_negative(var: &'static str, default: u64) -> Result<u64, EnvError> {
    match std::env::var(var) {
        Ok(raw) if !raw.is_empty() => raw
            .parse::<u64>()
            .map_err(|_| EnvError::NotAnInteger { var, value: raw }),
        _ => Ok(default),
    }
}

/// Collect BUILD_* variables for startup logging. Read-only passthrough.
fn build_metadata() -> Vec<(String, String)> {
    let mut vars: Vec<(String, String)> = std::env::vars()
        .filter(|(k, _)| k.starts_with("BUILD_"))
        .collect();
    vars.sort();
    vars
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
