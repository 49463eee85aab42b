use std::path::Path;
use serde::Serialize;
use crate::error::Result;
use crate::geo::HomeLocation;
use crate::marker::{Aggregate, Marker, ProcessEntry, Variant};
use crate::table::MarkerTable;

/// What a scan hands to the map front end: markers alone, or a
/// `[markers, processes]` pair when markers follow processes.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Payload {
    Static(Vec<Marker>),
    Live(Vec<Marker>, Vec<ProcessEntry>),
}

impl Payload {
    pub fn markers(&self) -> &[Marker] {
        match self {
            Self::Static(markers)  => markers,
            Self::Live(markers, _) => markers,
        }
    }
}

/// Payload plus the context of the host that produced it.
#[derive(Debug, Serialize)]
pub struct Document<'a> {
    pub hostname: &'a str,
    pub home:     Option<&'a HomeLocation>,
    pub payload:  &'a Payload,
}

pub fn emit(aggregate: Aggregate, variant: Variant) -> Payload {
    match variant {
        Variant::Location => Payload::Static(aggregate.markers),
        Variant::Process  => Payload::Live(aggregate.markers, aggregate.processes),
    }
}

/// Store `table` as the previous state of the next scan.
pub fn persist(table: &MarkerTable, path: &Path) -> Result<()> {
    table.save(path)
}
