// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Deferred environment overrides applied at specialization.

use std::sync::{Arc, Mutex};

use fnhost_protocol::worker_proto::FunctionEnvironmentReloadRequest;
use tracing::{debug, warn};

/// Ordered name/value overrides taken from a reload request.
///
/// Duplicate names are kept; applying them in order makes the last one win.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentSnapshot {
    entries: Vec<(String, String)>,
}

impl EnvironmentSnapshot {
    pub fn new(entries: Vec<(String, String)>) -> Self {
        Self { entries }
    }

    pub fn from_request(request: &FunctionEnvironmentReloadRequest) -> Self {
        Self {
            entries: request
                .environment_variables
                .iter()
                .map(|v| (v.name.clone(), v.value.clone()))
                .collect(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn into_entries(self) -> Vec<(String, String)> {
        self.entries
    }
}

/// Outcome of applying a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Number of assignments performed, duplicates included.
    pub applied: usize,
    /// Names rejected because the platform cannot hold them.
    pub skipped: Vec<String>,
}

/// Applies a snapshot to whatever environment the application will observe.
pub trait EnvironmentApplier: Send + Sync {
    /// Apply every entry in order. Must finish before the application starts.
    fn apply(&self, snapshot: EnvironmentSnapshot) -> ApplyReport;
}

/// Check that a name/value pair can be stored in a process environment.
///
/// Empty names, names containing `=`, and NUL bytes anywhere are rejected.
pub fn is_assignable(name: &str, value: &str) -> bool {
    !name.is_empty() && !name.contains(['=', '\0']) && !value.contains('\0')
}

/// Writes overrides into this process's environment.
///
/// Child processes spawned afterwards inherit the result.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnvironment;

impl EnvironmentApplier for ProcessEnvironment {
    fn apply(&self, snapshot: EnvironmentSnapshot) -> ApplyReport {
        let mut report = ApplyReport::default();
        for (name, value) in snapshot.into_entries() {
            if !is_assignable(&name, &value) {
                warn!(name = %name, "Skipping environment variable that cannot be assigned");
                report.skipped.push(name);
                continue;
            }
            // SAFETY: called only from the specialization sequence while the router
            // holds its state lock, before the application starts. No other host
            // task writes or reads the environment during that window.
            unsafe { std::env::set_var(&name, &value) };
            debug!(name = %name, "Applied environment variable");
            report.applied += 1;
        }
        report
    }
}

/// Records overrides in memory instead of touching the process environment.
#[derive(Debug, Clone, Default)]
pub struct MemoryEnvironment {
    vars: Arc<Mutex<Vec<(String, String)>>>,
}

impl MemoryEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of `name`, honouring last-write-wins.
    pub fn get(&self, name: &str) -> Option<String> {
        let vars = self.vars.lock().unwrap_or_else(|p| p.into_inner());
        vars.iter()
            .rev()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
    }

    /// Every assignment in the order it was applied.
    pub fn assignments(&self) -> Vec<(String, String)> {
        self.vars.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

impl EnvironmentApplier for MemoryEnvironment {
    fn apply(&self, snapshot: EnvironmentSnapshot) -> ApplyReport {
        let mut vars = self.vars.lock().unwrap_or_else(|p| p.into_inner());
        let mut report = ApplyReport::default();
        for (name, value) in snapshot.into_entries() {
            if !is_assignable(&name, &value) {
                report.skipped.push(name);
                continue;
            }
            vars.push((name, value));
            report.applied += 1;
        }
        report
    }
}
