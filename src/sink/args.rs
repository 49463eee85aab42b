use std::collections::HashMap;
use anyhow::{anyhow, Result};

/// `name,key=value,...` as given on the command line.
#[derive(Debug)]
pub struct Args {
    args: HashMap<String, String>,
}

impl Args {
    pub fn parse(arg: &str) -> (&str, Self) {
        let (name, rest) = arg.split_once(',').unwrap_or((arg, ""));

        let args = rest.split(',').flat_map(|pair| {
            let (k, v) = pair.split_once('=')?;
            Some((k.trim().to_owned(), v.trim().to_owned()))
        }).collect::<HashMap<_, _>>();

        (name.trim(), Self { args })
    }

    pub fn get(&self, name: &str) -> Result<&str> {
        self.opt(name).ok_or_else(|| anyhow!("missing sink arg '{}'", name))
    }

    pub fn opt(&self, name: &str) -> Option<&str> {
        self.args.get(name).map(String::as_str)
    }
}
