use std::borrow::Cow;
use std::env::consts::OS;
use std::fmt;
use std::str::FromStr;
use crate::data::{CanonicalConnection, Pid, ProcessInfo, RawRow};
use crate::error::{Error, Result};

/// States worth mapping: open, opening or recently closed sessions, in
/// English and the localized netstat builds seen in the wild. Matched
/// as substrings of the upper-cased state column.
const ACTIVE_STATES: &[&str] = &[
    "ESTABLISHED",
    "SYN_SENT",
    "SYN_RECV",
    "SYN_RECEIVED",
    "FIN_WAIT",
    "TIME_WAIT",
    "CLOSE_WAIT",
    "LAST_ACK",
    "CLOSING",
    "HERGESTELLT",
    "WARTEND",
    "ESTABLECIDO",
    "ÉTABLI",
    "УСТАНОВЛЕНО",
    "ОЖИДАНИ",
];

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Platform {
    Linux,
    Windows,
    Darwin,
    Canonical,
}

/// Columns picked out of a raw row, before address:port splitting.
#[derive(Debug, Eq, PartialEq)]
pub struct Columns<'a> {
    pub state:    &'a str,
    pub local:    &'a str,
    pub foreign:  &'a str,
    pub pid_name: Cow<'a, str>,
}

/// Command, column grammar and column selection of one native
/// connection-listing tool.
pub trait Flavor: Send + Sync {
    fn platform(&self) -> Platform;

    fn command(&self) -> Option<(&'static str, &'static [&'static str])>;

    fn headers(&self) -> &'static [&'static str];

    /// Index of the column carrying the owning pid.
    fn pid_column(&self) -> usize;

    /// Index of the column carrying the connection state.
    fn state_column(&self) -> usize;

    /// Index of the protocol column, for tools that print one.
    fn protocol_column(&self) -> Option<usize>;

    fn select<'a>(&self, row: &'a RawRow) -> Option<Columns<'a>>;

    fn pid(&self, row: &RawRow) -> Option<Pid> {
        let column = row.get(self.pid_column())?;
        let digits = column.split('/').next()?;
        digits.parse().ok()
    }

    /// A TCP row in one of the active states. Header and banner lines
    /// fail the protocol check, or the state check when there is no
    /// protocol column.
    fn is_active(&self, row: &RawRow) -> bool {
        if let Some(n) = self.protocol_column() {
            match row.get(n) {
                Some(proto) if proto.to_ascii_uppercase().starts_with("TCP") => (),
                _                                                            => return false,
            }
        }
        row.get(self.state_column()).map_or(false, is_active_state)
    }

    /// Whatever the tool itself says about the owning process.
    fn process(&self, row: &RawRow) -> Option<ProcessInfo> {
        let column      = row.get(self.pid_column())?;
        let (pid, name) = column.split_once('/')?;
        Some(ProcessInfo {
            pid:      pid.parse().ok()?,
            name:     name.to_owned(),
            username: String::new(),
        })
    }
}

pub fn is_active_state(state: &str) -> bool {
    let state = state.to_uppercase();
    ACTIVE_STATES.iter().any(|active| state.contains(active))
}

impl Platform {
    pub fn detect() -> Result<Self> {
        match OS {
            "linux"   => Ok(Self::Linux),
            "windows" => Ok(Self::Windows),
            "macos"   => Ok(Self::Darwin),
            other     => Err(Error::UnsupportedPlatform(other.to_owned())),
        }
    }

    pub fn flavor(self) -> &'static dyn Flavor {
        match self {
            Self::Linux     => &Linux,
            Self::Windows   => &Windows,
            Self::Darwin    => &Darwin,
            Self::Canonical => &Canonical,
        }
    }
}

impl FromStr for Platform {
    type Err = Error;

    fn from_str(arg: &str) -> Result<Self> {
        match arg.to_ascii_lowercase().as_str() {
            "linux"           => Ok(Self::Linux),
            "windows"         => Ok(Self::Windows),
            "darwin" | "macos" => Ok(Self::Darwin),
            "canonical"       => Ok(Self::Canonical),
            _                 => Err(Error::UnsupportedPlatform(arg.to_owned())),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Linux     => "linux",
            Self::Windows   => "windows",
            Self::Darwin    => "darwin",
            Self::Canonical => "canonical",
        };
        f.write_str(name)
    }
}

/// `netstat -tupn`
pub struct Linux;

impl Flavor for Linux {
    fn platform(&self) -> Platform {
        Platform::Linux
    }

    fn command(&self) -> Option<(&'static str, &'static [&'static str])> {
        Some(("netstat", &["-tupn"]))
    }

    fn headers(&self) -> &'static [&'static str] {
        &["Proto", "Recv-Q", "Send-Q", "LocalAddress", "ForeignAddress", "State", "PIDName"]
    }

    fn pid_column(&self) -> usize {
        6
    }

    fn state_column(&self) -> usize {
        5
    }

    fn protocol_column(&self) -> Option<usize> {
        Some(0)
    }

    fn select<'a>(&self, row: &'a RawRow) -> Option<Columns<'a>> {
        Some(Columns {
            state:    row.get(5)?,
            local:    row.get(3)?,
            foreign:  row.get(4)?,
            pid_name: Cow::Borrowed(row.get(6)?),
        })
    }
}

/// `netstat /ano`
pub struct Windows;

impl Flavor for Windows {
    fn platform(&self) -> Platform {
        Platform::Windows
    }

    fn command(&self) -> Option<(&'static str, &'static [&'static str])> {
        Some(("netstat", &["/ano"]))
    }

    fn headers(&self) -> &'static [&'static str] {
        &["Proto", "LocalAddress", "ForeignAddress", "State", "PIDName"]
    }

    fn pid_column(&self) -> usize {
        4
    }

    fn state_column(&self) -> usize {
        3
    }

    fn protocol_column(&self) -> Option<usize> {
        Some(0)
    }

    fn select<'a>(&self, row: &'a RawRow) -> Option<Columns<'a>> {
        Some(Columns {
            state:    row.get(3)?,
            local:    row.get(1)?,
            foreign:  row.get(2)?,
            pid_name: Cow::Borrowed(row.get(4)?),
        })
    }
}

/// `lsof -i -n -P`, where NAME reads `local->foreign (STATE)`.
pub struct Darwin;

impl Flavor for Darwin {
    fn platform(&self) -> Platform {
        Platform::Darwin
    }

    fn command(&self) -> Option<(&'static str, &'static [&'static str])> {
        Some(("lsof", &["-i", "-n", "-P"]))
    }

    fn headers(&self) -> &'static [&'static str] {
        &["COMMAND", "PID", "USER", "FD", "TYPE", "DEVICE", "SIZE/OFF", "NODE", "NAME"]
    }

    fn pid_column(&self) -> usize {
        1
    }

    fn state_column(&self) -> usize {
        8
    }

    fn protocol_column(&self) -> Option<usize> {
        Some(7)
    }

    fn select<'a>(&self, row: &'a RawRow) -> Option<Columns<'a>> {
        let command = row.get(0)?;
        let pid     = row.get(1)?;
        let name    = row.get(8)?;

        let (local, rest)    = name.split_once("->")?;
        let (foreign, state) = rest.trim().split_once(char::is_whitespace)?;
        let state = state.trim().trim_start_matches('(').trim_end_matches(')');

        Some(Columns {
            state:    state,
            local:    local,
            foreign:  foreign,
            pid_name: Cow::Owned(format!("{}/{}", pid, command)),
        })
    }

    fn process(&self, row: &RawRow) -> Option<ProcessInfo> {
        Some(ProcessInfo {
            pid:      row.get(1)?.parse().ok()?,
            name:     row.get(0)?.to_owned(),
            username: row.get(2)?.to_owned(),
        })
    }
}

/// Rows already in canonical order: `state local foreign pidName`.
pub struct Canonical;

impl Canonical {
    pub fn row(c: &CanonicalConnection) -> RawRow {
        RawRow(vec![
            c.state.clone(),
            format!("{}:{}", c.local_address, c.local_port),
            format!("{}:{}", c.foreign_address, c.foreign_port),
            c.pid_name.clone(),
        ])
    }
}

impl Flavor for Canonical {
    fn platform(&self) -> Platform {
        Platform::Canonical
    }

    fn command(&self) -> Option<(&'static str, &'static [&'static str])> {
        None
    }

    fn headers(&self) -> &'static [&'static str] {
        &["State", "LocalAddress", "ForeignAddress", "PIDName"]
    }

    fn pid_column(&self) -> usize {
        3
    }

    fn state_column(&self) -> usize {
        0
    }

    fn protocol_column(&self) -> Option<usize> {
        None
    }

    fn select<'a>(&self, row: &'a RawRow) -> Option<Columns<'a>> {
        Some(Columns {
            state:    row.get(0)?,
            local:    row.get(1)?,
            foreign:  row.get(2)?,
            pid_name: Cow::Borrowed(row.get(3)?),
        })
    }
}
