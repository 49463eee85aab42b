use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use log::{debug, trace};
use rand::Rng;
use serde::{Deserialize, Serialize};
use crate::data::{EnrichedConnection, Pid, ProcessInfo};
use crate::error::{Error, Result};
use crate::table::{MarkerTable, TableEntry};

/// Decimal places kept in a location key, the precision ip-api reports.
pub const PRECISION: i32 = 4;

/// Separator between the per-connection lines of one marker.
pub const LINE_BREAK: &str = "<br>";

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum IdentityKey {
    /// Coordinates scaled by 10^PRECISION and rounded.
    Location { lat: i64, lon: i64 },
    Process { name: String, pid: Pid },
}

impl IdentityKey {
    pub fn location(lat: f64, lon: f64) -> Self {
        Self::Location { lat: scaled(lat), lon: scaled(lon) }
    }

    pub fn process(name: &str, pid: Pid) -> Self {
        Self::Process { name: name.to_owned(), pid }
    }
}

fn scaled(degrees: f64) -> i64 {
    (degrees * 10f64.powi(PRECISION)).round() as i64
}

/// What makes two markers "the same" across scans.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    Location,
    Process,
}

impl Default for Variant {
    fn default() -> Self {
        Self::Location
    }
}

impl FromStr for Variant {
    type Err = Error;

    fn from_str(arg: &str) -> Result<Self> {
        match arg {
            "location" => Ok(Self::Location),
            "process"  => Ok(Self::Process),
            other      => Err(Error::Config(format!("unknown marker variant: {}", other))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Marker {
    #[serde(skip)]
    pub key:         IdentityKey,
    pub lat:         f64,
    pub lon:         f64,
    pub city:        String,
    pub country:     String,
    pub marker_hash: String,
    pub desc:        String,
}

/// A process seen in this scan with its stable hash.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessEntry {
    pub global_process_id: String,
    pub proc_hash:         String,
}

#[derive(Debug)]
pub struct Aggregate {
    pub markers:   Vec<Marker>,
    pub processes: Vec<ProcessEntry>,
    pub table:     MarkerTable,
}

/// Group located connections into markers and carry hashes over from
/// the previous table. Groups and their lines keep first-seen order.
pub fn aggregate(rows: &[EnrichedConnection], variant: Variant, previous: &MarkerTable) -> Aggregate {
    let mut reconciler = Reconciler::new(previous);
    let mut table      = previous.clone();
    let mut processes  = Vec::new();

    if variant == Variant::Process {
        let mut seen = HashSet::new();
        for (name, pid) in rows.iter().filter_map(owner) {
            let key = IdentityKey::process(&name, pid);
            if seen.insert(key.clone()) {
                let hash = reconciler.hash(&key);
                table.upsert(TableEntry {
                    lat:         None,
                    lon:         None,
                    process:     Some(name.clone()),
                    pid:         Some(pid),
                    marker_hash: hash.clone(),
                    city:        String::new(),
                    country:     String::new(),
                    desc:        String::new(),
                });
                processes.push(ProcessEntry {
                    global_process_id: format!("{}/{}", pid, name),
                    proc_hash:         hash,
                });
            }
        }
    }

    let mut groups: Vec<(IdentityKey, Vec<&EnrichedConnection>)> = Vec::new();
    let mut index:  HashMap<IdentityKey, usize> = HashMap::new();

    for row in rows {
        let (lat, lon) = match row.coordinates() {
            Some(coordinates) => coordinates,
            None              => continue,
        };

        let key = match variant {
            Variant::Location => IdentityKey::location(lat, lon),
            Variant::Process  => match owner(row) {
                Some((name, pid)) => IdentityKey::process(&name, pid),
                None              => continue,
            },
        };

        match index.get(&key) {
            Some(&n) => groups[n].1.push(row),
            None     => {
                index.insert(key.clone(), groups.len());
                groups.push((key, vec![row]));
            }
        }
    }

    let mut markers = Vec::with_capacity(groups.len());

    for (key, rows) in groups {
        let first = rows[0];
        let geo   = first.geo.as_ref();
        let (lat, lon) = first.coordinates().unwrap_or_default();

        let desc = rows.iter().map(|r| r.describe()).collect::<Vec<_>>().join(LINE_BREAK);
        let hash = reconciler.hash(&key);

        let marker = Marker {
            key:         key,
            lat:         lat,
            lon:         lon,
            city:        geo.map(|g| g.city.clone()).unwrap_or_default(),
            country:     geo.map(|g| g.country.clone()).unwrap_or_default(),
            marker_hash: hash,
            desc:        desc,
        };

        trace!("{:?}", marker);

        let (process, pid) = match &marker.key {
            IdentityKey::Process { name, pid } => (Some(name.clone()), Some(*pid)),
            IdentityKey::Location { .. }       => (None, None),
        };

        table.upsert(TableEntry {
            lat:         Some(marker.lat),
            lon:         Some(marker.lon),
            process:     process,
            pid:         pid,
            marker_hash: marker.marker_hash.clone(),
            city:        marker.city.clone(),
            country:     marker.country.clone(),
            desc:        marker.desc.clone(),
        });

        markers.push(marker);
    }

    debug!(
        "{} markers, {} processes: {} hashes reused, {} minted",
        markers.len(),
        processes.len(),
        reconciler.reused,
        reconciler.minted,
    );

    Aggregate { markers, processes, table }
}

/// Process name and pid owning a row. Rows whose pid the tool hid have
/// no owner to group under.
fn owner(row: &EnrichedConnection) -> Option<(String, Pid)> {
    let pid  = row.connection.pid().filter(|&pid| pid != 0)?;
    let name = match (&row.process, row.connection.program()) {
        (Some(p), _)    => p.name.clone(),
        (None, Some(n)) => n.to_owned(),
        (None, None)    => ProcessInfo::UNKNOWN.to_owned(),
    };
    Some((name, pid))
}

struct Reconciler<'a> {
    previous: HashMap<IdentityKey, &'a str>,
    current:  HashMap<IdentityKey, String>,
    taken:    HashSet<String>,
    reused:   usize,
    minted:   usize,
}

impl<'a> Reconciler<'a> {
    fn new(table: &'a MarkerTable) -> Self {
        let taken = table.entries().iter().map(|e| e.marker_hash.clone()).collect();
        Self {
            previous: table.index(),
            current:  HashMap::new(),
            taken:    taken,
            reused:   0,
            minted:   0,
        }
    }

    fn hash(&mut self, key: &IdentityKey) -> String {
        if let Some(hash) = self.current.get(key) {
            return hash.clone();
        }

        let hash = match self.previous.get(key) {
            Some(hash) => {
                self.reused += 1;
                hash.to_string()
            }
            None => {
                self.minted += 1;
                self.mint()
            }
        };

        self.current.insert(key.clone(), hash.clone());
        hash
    }

    fn mint(&mut self) -> String {
        let mut rng = rand::thread_rng();
        loop {
            let [a, b, c] = rng.gen::<[u8; 3]>();
            let hash = format!("{:02x}{:02x}{:02x}", a, b, c);
            if self.taken.insert(hash.clone()) {
                return hash;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use super::*;
    use crate::data::CanonicalConnection;
    use crate::geo::{GeoRecord, Status};

    fn located(pid_name: &str, foreign: &str, coords: Option<(f64, f64)>) -> EnrichedConnection {
        let connection = CanonicalConnection {
            state:           "ESTABLISHED".into(),
            local_address:   "192.168.1.5".into(),
            local_port:      "50000".into(),
            foreign_address: foreign.into(),
            foreign_port:    "443".into(),
            pid_name:        pid_name.into(),
        };

        let mut geo = GeoRecord::failed(foreign, "reserved range");
        if let Some((lat, lon)) = coords {
            geo.status  = Status::Success;
            geo.lat     = Some(lat);
            geo.lon     = Some(lon);
            geo.city    = "London".into();
            geo.country = "United Kingdom".into();
            geo.message = None;
        }

        EnrichedConnection { connection, process: None, geo: Some(geo) }
    }

    fn hashes(markers: &[Marker]) -> Vec<&str> {
        markers.iter().map(|m| m.marker_hash.as_str()).collect()
    }

    #[test]
    fn one_marker_per_location() {
        let rows = vec![
            located("proc1", "1.2.3.4", Some((51.5, -0.1))),
            located("proc2", "1.2.3.4", Some((51.5, -0.1))),
        ];

        let out = aggregate(&rows, Variant::Location, &MarkerTable::default());

        assert_eq!(out.markers.len(), 1);
        let marker = &out.markers[0];
        assert_eq!((marker.lat, marker.lon), (51.5, -0.1));
        assert_eq!(marker.desc, "ESTABLISHED proc1 1.2.3.4<br>ESTABLISHED proc2 1.2.3.4");
        assert_eq!(marker.marker_hash.len(), 6);
        assert!(marker.marker_hash.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(out.processes.is_empty());
    }

    #[test]
    fn hashes_are_stable_across_runs() {
        let rows = vec![
            located("1/a", "1.2.3.4", Some((51.5074, -0.1278))),
            located("2/b", "5.6.7.8", Some((48.8566, 2.3522))),
            located("3/c", "9.9.9.9", Some((37.7749, -122.4194))),
        ];

        let first  = aggregate(&rows, Variant::Location, &MarkerTable::default());
        let second = aggregate(&rows, Variant::Location, &first.table);

        assert_eq!(hashes(&first.markers), hashes(&second.markers));
        assert_eq!(second.table.len(), 3);
    }

    #[test]
    fn new_identity_gets_unused_hash() {
        let before = aggregate(&[located("1/a", "1.2.3.4", Some((10.0, 10.0)))], Variant::Location, &MarkerTable::default());
        let after  = aggregate(&[located("1/a", "5.6.7.8", Some((20.0, 20.0)))], Variant::Location, &before.table);

        let old = before.table.entries().iter().map(|e| e.marker_hash.as_str()).collect::<HashSet<_>>();
        assert!(!old.contains(after.markers[0].marker_hash.as_str()));
    }

    #[test]
    fn failed_lookups_never_become_markers() {
        let rows = vec![
            located("1/a", "1.2.3.4", Some((51.5, -0.1))),
            located("1/a", "6.6.6.6", None),
        ];

        let out = aggregate(&rows, Variant::Location, &MarkerTable::default());

        assert_eq!(out.markers.len(), 1);
        assert!(out.markers.iter().all(|m| !m.desc.contains("6.6.6.6")));
    }

    #[test]
    fn stale_entries_are_kept_but_not_emitted() {
        let seeded = MarkerTable::new(vec![TableEntry {
            lat:         Some(51.5),
            lon:         Some(-0.1),
            process:     None,
            pid:         None,
            marker_hash: "ab12cd".into(),
            city:        "London".into(),
            country:     "United Kingdom".into(),
            desc:        String::new(),
        }]);

        let recurring = aggregate(&[located("1/a", "1.2.3.4", Some((51.5, -0.1)))], Variant::Location, &seeded);
        assert_eq!(hashes(&recurring.markers), vec!["ab12cd"]);

        let elsewhere = aggregate(&[located("1/a", "5.6.7.8", Some((35.68, 139.69)))], Variant::Location, &seeded);
        assert_eq!(elsewhere.markers.len(), 1);
        assert_ne!(elsewhere.markers[0].marker_hash, "ab12cd");
        assert_eq!(elsewhere.table.len(), 2);
        assert_eq!(elsewhere.table.entries()[0].marker_hash, "ab12cd");

        let nothing = aggregate(&[], Variant::Location, &seeded);
        assert!(nothing.markers.is_empty());
        assert_eq!(nothing.table, seeded);
    }

    #[test]
    fn rounding_drift_reuses_first_match() {
        let seeded = MarkerTable::new(vec![
            TableEntry {
                lat:         Some(51.50001),
                lon:         Some(-0.09999),
                process:     None,
                pid:         None,
                marker_hash: "111111".into(),
                city:        String::new(),
                country:     String::new(),
                desc:        String::new(),
            },
            TableEntry {
                lat:         Some(51.5),
                lon:         Some(-0.1),
                process:     None,
                pid:         None,
                marker_hash: "222222".into(),
                city:        String::new(),
                country:     String::new(),
                desc:        String::new(),
            },
        ]);

        let out = aggregate(&[located("1/a", "1.2.3.4", Some((51.5, -0.1)))], Variant::Location, &seeded);
        assert_eq!(hashes(&out.markers), vec!["111111"]);
    }

    #[test]
    fn process_variant_groups_by_owner() {
        let mut rows = vec![
            located("10/curl", "1.2.3.4", Some((51.5, -0.1))),
            located("10/curl", "5.6.7.8", Some((48.85, 2.35))),
            located("20/wget", "9.9.9.9", None),
        ];
        rows[0].process = Some(Arc::new(ProcessInfo {
            pid:      10,
            name:     "curl".into(),
            username: "alice".into(),
        }));

        let first = aggregate(&rows, Variant::Process, &MarkerTable::default());

        assert_eq!(first.markers.len(), 1);
        assert_eq!(first.markers[0].key, IdentityKey::process("curl", 10));
        assert_eq!(first.markers[0].desc.matches(LINE_BREAK).count(), 1);

        let ids = first.processes.iter().map(|p| p.global_process_id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["10/curl", "20/wget"]);
        assert_eq!(first.processes[0].proc_hash, first.markers[0].marker_hash);

        let second = aggregate(&rows, Variant::Process, &first.table);
        assert_eq!(first.processes, second.processes);
        assert_eq!(hashes(&first.markers), hashes(&second.markers));
    }

    #[test]
    fn process_variant_skips_rows_without_pid() {
        let rows = vec![
            located("-", "1.2.3.4", Some((51.5, -0.1))),
            located("0", "5.6.7.8", Some((48.85, 2.35))),
            located("30", "9.9.9.9", Some((35.68, 139.69))),
        ];

        let out = aggregate(&rows, Variant::Process, &MarkerTable::default());

        let ids = out.processes.iter().map(|p| p.global_process_id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["30/unknown"]);
        assert_eq!(out.markers.len(), 1);
        assert_eq!(out.markers[0].key, IdentityKey::process(ProcessInfo::UNKNOWN, 30));
        assert_eq!(out.table.len(), 1);

        let by_location = aggregate(&rows, Variant::Location, &MarkerTable::default());
        assert_eq!(by_location.markers.len(), 3);
    }
}
