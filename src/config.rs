use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::Deserialize;
use crate::error::{Error, Result};
use crate::geo::{IpApi, Locator, Offline};
use crate::marker::Variant;

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Marker table carried between scans.
    pub table:           PathBuf,
    pub geo_endpoint:    String,
    pub geo_timeout:     u64,
    pub command_timeout: u64,
    pub variant:         Variant,
    /// Saved batch response to answer lookups from instead of the network.
    pub offline_geo:     Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            table:           PathBuf::from("lastscan.csv"),
            geo_endpoint:    "http://ip-api.com".to_owned(),
            geo_timeout:     10,
            command_timeout: 30,
            variant:         Variant::Location,
            offline_geo:     None,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let json   = fs::read(path)?;
        let config = serde_json::from_slice::<Self>(&json)?;

        if config.geo_timeout == 0 || config.command_timeout == 0 {
            return Err(Error::Config("timeouts must be positive".to_owned()));
        }

        Ok(config)
    }

    pub fn geo_timeout(&self) -> Duration {
        Duration::from_secs(self.geo_timeout)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout)
    }

    pub fn locator(&self) -> Result<Locator> {
        Ok(match &self.offline_geo {
            Some(path) => Locator::Offline(Offline::load(path)?),
            None       => Locator::IpApi(IpApi::new(&self.geo_endpoint, self.geo_timeout())?),
        })
    }
}
