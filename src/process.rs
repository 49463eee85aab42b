use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use log::debug;
use crate::data::{CanonicalConnection, EnrichedConnection, Pid, ProcessInfo};
use crate::source::Observation;

/// Owning processes of a scan, keyed by pid.
#[derive(Debug, Default)]
pub struct ProcessTable {
    table: HashMap<Pid, Arc<ProcessInfo>>,
}

impl ProcessTable {
    /// Processes of a live host. Pids that have already exited fall back
    /// to what the native tool printed about them.
    pub fn live(observation: &Observation) -> Self {
        let resolved = lookup(&observation.pids);
        let table    = Self::merge(&observation.processes, resolved);

        debug!("resolved {} live processes", table.len());

        table
    }

    /// Processes the tool described, overridden by those resolved from
    /// the host. A resolved process without a user keeps the printed one.
    pub fn merge(printed: &BTreeMap<Pid, ProcessInfo>, resolved: Vec<ProcessInfo>) -> Self {
        let mut table = Self::default();

        for process in printed.values() {
            table.insert(process.clone());
        }

        for mut process in resolved {
            if process.username.is_empty() {
                if let Some(p) = printed.get(&process.pid) {
                    process.username = p.username.clone();
                }
            }
            table.insert(process);
        }

        table
    }

    /// A replayed capture has no process table to consult.
    pub fn placeholders(pids: &BTreeSet<Pid>) -> Self {
        let mut table = Self::default();
        for &pid in pids {
            table.insert(ProcessInfo::placeholder(pid));
        }
        table
    }

    pub fn insert(&mut self, process: ProcessInfo) {
        self.table.insert(process.pid, Arc::new(process));
    }

    pub fn get(&self, pid: Pid) -> Option<Arc<ProcessInfo>> {
        self.table.get(&pid).cloned()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

/// Left join on pid; a connection without a known process keeps `None`.
pub fn enrich(connections: Vec<CanonicalConnection>, processes: &ProcessTable) -> Vec<EnrichedConnection> {
    connections.into_iter().map(|c| {
        let process = c.pid().and_then(|pid| processes.get(pid));
        EnrichedConnection::new(c, process)
    }).collect()
}

#[cfg(target_os = "linux")]
fn lookup(pids: &BTreeSet<Pid>) -> Vec<ProcessInfo> {
    use std::convert::TryFrom;
    use procfs::process::Process;

    pids.iter().filter_map(|&pid| {
        let proc = Process::new(i32::try_from(pid).ok()?).ok()?;
        let user = match uzers::get_user_by_uid(proc.owner) {
            Some(user) => user.name().to_string_lossy().into_owned(),
            None       => proc.owner.to_string(),
        };
        Some(ProcessInfo {
            pid:      pid,
            name:     proc.stat.comm.clone(),
            username: user,
        })
    }).collect()
}

#[cfg(not(target_os = "linux"))]
fn lookup(pids: &BTreeSet<Pid>) -> Vec<ProcessInfo> {
    use sysinfo::{System, Users};

    let mut system = System::new();
    system.refresh_processes();
    let users = Users::new_with_refreshed_list();

    pids.iter().filter_map(|&pid| {
        let proc = system.process(sysinfo::Pid::from_u32(pid))?;
        let user = proc.user_id().and_then(|uid| users.get_user_by_id(uid));
        Some(ProcessInfo {
            pid:      pid,
            name:     proc.name().to_owned(),
            username: user.map(|u| u.name().to_owned()).unwrap_or_default(),
        })
    }).collect()
}
