use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use log::{debug, warn};
use tokio::fs;
use tokio::process::Command;
use tokio::time::timeout;
use crate::data::{Pid, ProcessInfo, RawRow};
use crate::error::{Error, Result};
use crate::platform::Flavor;

#[derive(Clone, Debug)]
pub enum Source {
    Live,
    Dump(PathBuf),
}

/// Rows of one scan plus every pid they mention, and what the tool
/// printed about the processes behind those pids.
#[derive(Debug, Default)]
pub struct Observation {
    pub rows:      Vec<RawRow>,
    pub pids:      BTreeSet<Pid>,
    pub processes: BTreeMap<Pid, ProcessInfo>,
}

impl Source {
    pub async fn observe(&self, flavor: &dyn Flavor, limit: Duration) -> Result<Observation> {
        let text = match self {
            Self::Live       => run(flavor, limit).await?,
            Self::Dump(path) => {
                let bytes = fs::read(path).await?;
                String::from_utf8_lossy(&bytes).into_owned()
            }
        };

        let observation = parse(&text, flavor);
        debug!("observed {} rows from {} processes", observation.rows.len(), observation.pids.len());

        Ok(observation)
    }
}

/// Split each line into the platform's columns and keep the active TCP
/// rows, collecting the pid of each row.
pub fn parse(text: &str, flavor: &dyn Flavor) -> Observation {
    let columns = flavor.headers().len();
    let mut observation = Observation::default();

    for line in text.lines() {
        let row = RawRow::split(line, columns);

        if !flavor.is_active(&row) {
            continue;
        }

        if let Some(pid) = flavor.pid(&row).filter(|&pid| pid != 0) {
            observation.pids.insert(pid);
            if let Some(process) = flavor.process(&row) {
                observation.processes.entry(pid).or_insert(process);
            }
        }

        observation.rows.push(row);
    }

    observation
}

async fn run(flavor: &dyn Flavor, limit: Duration) -> Result<String> {
    let (program, args) = match flavor.command() {
        Some(command) => command,
        None          => return Err(Error::UnsupportedPlatform(flavor.platform().to_string())),
    };

    let command = format!("{} {}", program, args.join(" "));

    let mut child = Command::new(program);
    child.args(args).stdin(Stdio::null()).kill_on_drop(true);

    let output = match timeout(limit, child.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e))     => return Err(Error::Command { command, source: e }),
        Err(_)         => return Err(Error::Timeout { command, timeout: limit }),
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!("{} exited with {}: {}", command, output.status, stderr.trim());
        return Ok(String::new());
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
