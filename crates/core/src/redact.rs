// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential redaction sink.
//!
//! Secrets are registered the moment the manifest is read; every string
//! that might reach a log flows through [`Redactor::redact`] first.

use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Stable placeholder substituted for every registered secret.
pub const PLACEHOLDER: &str = "REDACTED_SECRET";

/// Process-wide set of secret substrings to scrub from log output.
///
/// Cheap to clone; all clones share the same set. Registration is
/// idempotent. Empty and whitespace-only strings are ignored so a blank
/// password in the manifest cannot turn redaction into string mangling.
#[derive(Debug, Clone, Default)]
pub struct Redactor {
    secrets: Arc<RwLock<BTreeSet<String>>>,
}

impl Redactor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one secret. No-op for blank strings.
    pub fn register(&self, secret: &str) {
        if secret.trim().is_empty() {
            return;
        }
        self.secrets.write().insert(secret.to_string());
    }

    /// Number of registered secrets.
    pub fn len(&self) -> usize {
        self.secrets.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.read().is_empty()
    }

    /// Replace every occurrence of every registered secret.
    pub fn redact(&self, input: &str) -> String {
        let secrets = self.secrets.read();
        if secrets.is_empty() {
            return input.to_string();
        }
        let mut out = input.to_string();
        // Longest first, so a secret that is a substring of another
        // cannot leave a recognisable fragment behind.
        let mut ordered: Vec<&String> = secrets.iter().collect();
        ordered.sort_by_key(|s| std::cmp::Reverse(s.len()));
        for secret in ordered {
            if out.contains(secret.as_str()) {
                out = out.replace(secret.as_str(), PLACEHOLDER);
            }
        }
        out
    }

    /// Redact each element of an argv, returning the joined display form.
    pub fn redact_argv(&self, argv: &[String]) -> String {
        self.redact(&argv.join(" "))
    }
}

#[cfg(test)]
#[path = "redact_tests.rs"]
mod tests;
