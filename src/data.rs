use std::fmt;
use std::sync::Arc;
use serde::{Deserialize, Serialize};
use crate::geo::GeoRecord;

pub type Pid = u32;

/// Whitespace-delimited tokens of one line of native tool output, in the
/// column order of the platform that produced it.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RawRow(pub Vec<String>);

impl RawRow {
    /// Split `line` into at most `columns` tokens. The final token keeps
    /// any embedded whitespace, so trailing free-text columns survive.
    pub fn split(line: &str, columns: usize) -> Self {
        let mut tokens = Vec::with_capacity(columns);
        let mut rest   = line.trim();

        while !rest.is_empty() && tokens.len() + 1 < columns {
            match rest.find(char::is_whitespace) {
                Some(n) => {
                    tokens.push(rest[..n].to_owned());
                    rest = rest[n..].trim_start();
                }
                None => break,
            }
        }

        if !rest.is_empty() {
            tokens.push(rest.to_owned());
        }

        Self(tokens)
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.0.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalConnection {
    pub state:           String,
    pub local_address:   String,
    pub local_port:      String,
    pub foreign_address: String,
    pub foreign_port:    String,
    pub pid_name:        String,
}

impl CanonicalConnection {
    /// Leading pid of `pid_name`, which is `pid/name`, a bare pid, or `-`.
    pub fn pid(&self) -> Option<Pid> {
        let pid = self.pid_name.split('/').next()?;
        pid.parse().ok()
    }

    /// Program name following the pid, when the platform reports one.
    pub fn program(&self) -> Option<&str> {
        let (_, name) = self.pid_name.split_once('/')?;
        match name.trim() {
            ""   => None,
            name => Some(name),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ProcessInfo {
    pub pid:      Pid,
    pub name:     String,
    pub username: String,
}

impl ProcessInfo {
    pub const UNKNOWN: &'static str = "unknown";

    pub fn placeholder(pid: Pid) -> Self {
        Self {
            pid:      pid,
            name:     Self::UNKNOWN.to_owned(),
            username: Self::UNKNOWN.to_owned(),
        }
    }
}

impl fmt::Display for ProcessInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.pid, self.name)
    }
}

#[derive(Clone, Debug)]
pub struct EnrichedConnection {
    pub connection: CanonicalConnection,
    pub process:    Option<Arc<ProcessInfo>>,
    pub geo:        Option<GeoRecord>,
}

impl EnrichedConnection {
    pub fn new(connection: CanonicalConnection, process: Option<Arc<ProcessInfo>>) -> Self {
        Self { connection, process, geo: None }
    }

    pub fn coordinates(&self) -> Option<(f64, f64)> {
        self.geo.as_ref()?.coordinates()
    }

    /// One human readable line for the marker popup.
    pub fn describe(&self) -> String {
        let c    = &self.connection;
        let line = format!("{} {} {}", c.state, c.pid_name, c.foreign_address);

        match self.geo.as_ref().map(|g| g.org.as_str()) {
            Some(org) if !org.is_empty() => format!("{} ({})", line, org),
            _                            => line,
        }
    }
}
