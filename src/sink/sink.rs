use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use anyhow::{Error, Result, anyhow};
use log::debug;
use serde::Serialize;
use super::Args;

/// Where a scan's output document goes.
#[derive(Debug, PartialEq)]
pub enum Sink {
    File(PathBuf),
    Stdout,
}

impl Sink {
    pub fn send<T: Serialize>(&self, document: &T) -> Result<()> {
        let json = serde_json::to_string_pretty(document)?;
        match self {
            Self::File(path) => {
                fs::write(path, json)?;
                debug!("wrote {}", path.display());
            }
            Self::Stdout => println!("{}", json),
        }
        Ok(())
    }
}

impl Default for Sink {
    fn default() -> Self {
        Self::Stdout
    }
}

impl FromStr for Sink {
    type Err = Error;

    fn from_str(arg: &str) -> Result<Self, Self::Err> {
        match Args::parse(arg) {
            ("file",   args) => file(args),
            ("stdout", _args) => Ok(Self::Stdout),
            _                 => Err(anyhow!("invalid sink: {}", arg)),
        }
    }
}

fn file(args: Args) -> Result<Sink> {
    Ok(Sink::File(PathBuf::from(args.get("path")?)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_sinks() {
        assert_eq!("stdout".parse::<Sink>().unwrap(), Sink::Stdout);
        assert_eq!("file,path=out.json".parse::<Sink>().unwrap(), Sink::File("out.json".into()));
        assert!("file".parse::<Sink>().is_err());
        assert!("newrelic,key=x".parse::<Sink>().is_err());
    }

    #[test]
    fn file_sink_writes_json() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("markers.json");

        Sink::File(path.clone()).send(&vec!["ab12cd"]).unwrap();

        let written = fs::read_to_string(&path).unwrap();
        assert_eq!(serde_json::from_str::<Vec<String>>(&written).unwrap(), vec!["ab12cd"]);
    }
}
