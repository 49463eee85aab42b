use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;
use log::{debug, info};
use crate::emit::{emit, persist, Payload};
use crate::error::Result;
use crate::filter::is_routable;
use crate::geo::Locator;
use crate::marker::{aggregate, Variant};
use crate::normalize::{normalize, Dropped};
use crate::platform::Platform;
use crate::process::{enrich, ProcessTable};
use crate::source::Source;
use crate::table::MarkerTable;

/// One snapshot of the host's connections, start to finish.
pub struct Scan {
    pub platform: Platform,
    pub source:   Source,
    pub locator:  Locator,
    pub variant:  Variant,
    pub table:    PathBuf,
    pub timeout:  Duration,
}

#[derive(Debug)]
pub struct Report {
    pub payload:  Payload,
    pub observed: usize,
    pub dropped:  Dropped,
    pub routable: usize,
}

impl Scan {
    /// Run every stage in order. Nothing is persisted unless all stages
    /// succeed, so an aborted scan leaves the previous table in place.
    pub async fn run(&self) -> Result<Report> {
        let flavor = self.platform.flavor();

        let observation = self.source.observe(flavor, self.timeout).await?;
        let normalized  = normalize(&observation.rows, flavor);

        if normalized.dropped.total() > 0 {
            info!("dropped {} malformed rows", normalized.dropped.total());
        }

        let processes = match self.source {
            Source::Live    => ProcessTable::live(&observation),
            Source::Dump(_) => ProcessTable::placeholders(&observation.pids),
        };

        let mut rows = enrich(normalized.connections, &processes);
        rows.retain(|row| is_routable(&row.connection.foreign_address));

        let addresses = rows.iter().map(|row| {
            row.connection.foreign_address.clone()
        }).collect::<BTreeSet<_>>();

        debug!("{} routable connections to {} addresses", rows.len(), addresses.len());

        let located = self.locator.locate(&addresses).await?;
        for row in &mut rows {
            row.geo = located.get(&row.connection.foreign_address).cloned();
        }

        let previous  = MarkerTable::load(&self.table);
        let aggregate = aggregate(&rows, self.variant, &previous);

        persist(&aggregate.table, &self.table)?;

        Ok(Report {
            payload:  emit(aggregate, self.variant),
            observed: observation.rows.len(),
            dropped:  normalized.dropped,
            routable: rows.len(),
        })
    }
}
