use std::net::IpAddr;
use log::{debug, trace};
use crate::data::{CanonicalConnection, RawRow};
use crate::platform::Flavor;

/// Rows discarded while normalizing, by reason.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Dropped {
    pub columns: usize,
    pub sockets: usize,
}

impl Dropped {
    pub fn total(&self) -> usize {
        self.columns + self.sockets
    }
}

#[derive(Debug, Default)]
pub struct Normalized {
    pub connections: Vec<CanonicalConnection>,
    pub dropped:     Dropped,
}

pub fn normalize(rows: &[RawRow], flavor: &dyn Flavor) -> Normalized {
    let width = flavor.headers().len();
    let mut normalized = Normalized::default();

    for row in rows {
        let columns = match flavor.select(row) {
            Some(columns) if row.len() == width => columns,
            _ => {
                trace!("wrong column count: {:?}", row);
                normalized.dropped.columns += 1;
                continue;
            }
        };

        let local   = split_socket(columns.local);
        let foreign = split_socket(columns.foreign).filter(|(addr, _)| is_literal(addr));

        let ((local_address, local_port), (foreign_address, foreign_port)) = match local.zip(foreign) {
            Some(sockets) => sockets,
            None          => {
                trace!("unsplittable socket: {:?}", row);
                normalized.dropped.sockets += 1;
                continue;
            }
        };

        normalized.connections.push(CanonicalConnection {
            state:           columns.state.to_owned(),
            local_address:   local_address.to_owned(),
            local_port:      local_port.to_owned(),
            foreign_address: foreign_address.to_owned(),
            foreign_port:    foreign_port.to_owned(),
            pid_name:        columns.pid_name.into_owned(),
        });
    }

    debug!(
        "normalized {} {} rows, dropped {} ({} short, {} bad socket)",
        normalized.connections.len(),
        flavor.platform(),
        normalized.dropped.total(),
        normalized.dropped.columns,
        normalized.dropped.sockets,
    );

    normalized
}

/// Split `address:port` at the last colon. The port must be numeric,
/// which also rejects an IPv6 literal with no port attached.
pub fn split_socket(socket: &str) -> Option<(&str, &str)> {
    let (address, port) = socket.rsplit_once(':')?;

    if address.is_empty() || port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    Some((address, port))
}

fn is_literal(address: &str) -> bool {
    let address = address.trim_start_matches('[').trim_end_matches(']');
    let address = address.split('%').next().unwrap_or(address);
    address.parse::<IpAddr>().is_ok()
}
