//! Process tree sampling.
//!
//! Used both to find the real command beneath a shell and to sweep
//! descendants when a session is aborted.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use sysinfo::System;

use crate::error::{ProcessError, Result};

/// One entry of a process table snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    /// Process ID
    pub pid: u32,
    /// Parent process ID, if known
    pub parent: Option<u32>,
    /// Executable name (e.g. `sleep`, `conhost.exe`)
    pub name: String,
    /// Start time in seconds since the epoch
    pub start_time: u64,
}

impl ProcessInfo {
    /// Create a snapshot entry
    pub fn new(pid: u32, parent: Option<u32>, name: impl Into<String>) -> Self {
        Self {
            pid,
            parent,
            name: name.into(),
            start_time: 0,
        }
    }
}

/// Source of process tree snapshots
pub trait ProcessTree: Send + Sync {
    /// All descendants of `root`, direct children first.
    fn descendants(&self, root: u32) -> Result<Vec<ProcessInfo>>;
}

/// [`ProcessTree`] backed by the OS process table via `sysinfo`
#[derive(Debug, Default, Clone, Copy)]
pub struct SysinfoProcessTree;

impl SysinfoProcessTree {
    /// Create a new sampler
    pub fn new() -> Self {
        Self
    }
}

impl ProcessTree for SysinfoProcessTree {
    fn descendants(&self, root: u32) -> Result<Vec<ProcessInfo>> {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return Err(ProcessError::ProcessTree {
                pid: root,
                reason: "process listing is not supported on this platform".to_string(),
            });
        }

        let mut system = System::new();
        system.refresh_processes();

        let table: Vec<ProcessInfo> = system
            .processes()
            .iter()
            .map(|(pid, process)| ProcessInfo {
                pid: pid.as_u32(),
                parent: process.parent().map(|p| p.as_u32()),
                name: process.name().to_string(),
                start_time: process.start_time(),
            })
            .collect();

        Ok(collect_descendants(&table, root))
    }
}

/// Walk a process table breadth-first from `root`.
///
/// Siblings are ordered by start time, then PID.
pub fn collect_descendants(table: &[ProcessInfo], root: u32) -> Vec<ProcessInfo> {
    let mut children: HashMap<u32, Vec<&ProcessInfo>> = HashMap::new();
    for info in table {
        if let Some(parent) = info.parent {
            if parent != info.pid {
                children.entry(parent).or_default().push(info);
            }
        }
    }
    for siblings in children.values_mut() {
        siblings.sort_by_key(|p| (p.start_time, p.pid));
    }

    let mut result = Vec::new();
    let mut seen = HashSet::from([root]);
    let mut queue = VecDeque::from([root]);

    while let Some(pid) = queue.pop_front() {
        let Some(kids) = children.get(&pid) else {
            continue;
        };
        for kid in kids {
            if seen.insert(kid.pid) {
                result.push((*kid).clone());
                queue.push_back(kid.pid);
            }
        }
    }

    result
}

/// Sample descendants without blocking the async runtime
pub async fn sample_descendants(tree: Arc<dyn ProcessTree>, root: u32) -> Result<Vec<ProcessInfo>> {
    tokio::task::spawn_blocking(move || tree.descendants(root))
        .await
        .map_err(|e| ProcessError::ProcessTree {
            pid: root,
            reason: e.to_string(),
        })?
}
