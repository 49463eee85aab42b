use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::Path;
use std::time::Duration;
use log::{debug, info, warn};
use reqwest::Client as HttpClient;
use reqwest::header::{self, HeaderMap};
use serde::{Deserialize, Serialize};
use crate::error::Result;

/// ip-api rejects batches above this size.
const BATCH_LIMIT: usize = 100;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Fail,
}

/// One entry of the provider's batch response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoRecord {
    pub status:       Status,
    pub lat:          Option<f64>,
    pub lon:          Option<f64>,
    #[serde(default)]
    pub country:      String,
    #[serde(default)]
    pub country_code: String,
    #[serde(default)]
    pub city:         String,
    #[serde(default)]
    pub isp:          String,
    #[serde(default)]
    pub org:          String,
    #[serde(default)]
    pub query:        String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message:      Option<String>,
}

impl GeoRecord {
    pub fn failed(query: &str, message: &str) -> Self {
        Self {
            status:       Status::Fail,
            lat:          None,
            lon:          None,
            country:      String::new(),
            country_code: String::new(),
            city:         String::new(),
            isp:          String::new(),
            org:          String::new(),
            query:        query.to_owned(),
            message:      Some(message.to_owned()),
        }
    }

    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match self.status {
            Status::Success => self.lat.zip(self.lon),
            Status::Fail    => None,
        }
    }
}

/// Position of the observing host itself.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HomeLocation {
    pub lat:     f64,
    pub lon:     f64,
    #[serde(default)]
    pub city:    String,
    #[serde(default)]
    pub region:  String,
    #[serde(default)]
    pub country: String,
}

pub enum Locator {
    IpApi(IpApi),
    Offline(Offline),
}

impl Locator {
    /// Resolve every address in one logical batch. A failed transport
    /// call fails the whole batch; per-address failures come back as
    /// `Status::Fail` records.
    pub async fn locate(&self, addresses: &BTreeSet<String>) -> Result<HashMap<String, GeoRecord>> {
        if addresses.is_empty() {
            return Ok(HashMap::new());
        }

        let records = match self {
            Self::IpApi(c)   => c.locate(addresses).await?,
            Self::Offline(t) => t.locate(addresses),
        };

        let failed = records.values().filter(|r| r.status == Status::Fail).count();
        info!("geolocated {} addresses: {} success, {} fail", records.len(), records.len() - failed, failed);

        for (address, record) in records.iter().filter(|(_, r)| r.status == Status::Fail) {
            debug!("lookup failed for {}: {}", address, record.message.as_deref().unwrap_or("?"));
        }

        Ok(records)
    }

    pub async fn home(&self) -> Result<Option<HomeLocation>> {
        match self {
            Self::IpApi(c)   => Ok(Some(c.home().await?)),
            Self::Offline(_) => Ok(None),
        }
    }
}

pub struct IpApi {
    client:   HttpClient,
    endpoint: String,
}

impl IpApi {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(header::USER_AGENT, header::HeaderValue::from_static(env!("CARGO_PKG_NAME")));

        let client = HttpClient::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        let endpoint = endpoint.trim_end_matches('/').to_owned();

        Ok(Self { client, endpoint })
    }

    async fn home(&self) -> Result<HomeLocation> {
        let url = format!("{}/json/", self.endpoint);
        let res = self.client.get(url).send().await?.error_for_status()?;
        Ok(res.json::<HomeLocation>().await?)
    }

    async fn locate(&self, addresses: &BTreeSet<String>) -> Result<HashMap<String, GeoRecord>> {
        let addresses = addresses.iter().collect::<Vec<_>>();
        let mut records = HashMap::with_capacity(addresses.len());

        for chunk in addresses.chunks(BATCH_LIMIT) {
            let query = chunk.iter().map(|a| bare(a)).collect::<Vec<_>>();
            let batch = self.batch(&query).await?;
            records.extend(collate(chunk, batch));
        }

        Ok(records)
    }

    async fn batch(&self, query: &[&str]) -> Result<Vec<GeoRecord>> {
        let url = format!("{}/batch", self.endpoint);

        debug!("looking up {} addresses", query.len());

        let res  = self.client.post(url).json(query).send().await?.error_for_status()?;
        let body = res.bytes().await?;

        Ok(serde_json::from_slice(&body)?)
    }
}

/// Geolocation answered from a saved batch response, keyed by `query`.
#[derive(Debug, Default)]
pub struct Offline {
    records: HashMap<String, GeoRecord>,
}

impl Offline {
    pub fn load(path: &Path) -> Result<Self> {
        let json    = fs::read(path)?;
        let records = serde_json::from_slice::<Vec<GeoRecord>>(&json)?;
        Ok(Self::from_records(records))
    }

    pub fn from_records(records: Vec<GeoRecord>) -> Self {
        let records = records.into_iter().map(|r| {
            (r.query.clone(), r)
        }).collect();
        Self { records }
    }

    fn locate(&self, addresses: &BTreeSet<String>) -> HashMap<String, GeoRecord> {
        addresses.iter().map(|address| {
            let query  = bare(address);
            let record = match self.records.get(query) {
                Some(record) => record.clone(),
                None         => GeoRecord::failed(query, "not in offline table"),
            };
            (address.clone(), record)
        }).collect()
    }
}

/// Pair a batch response with its request, in request order. Addresses
/// past the end of a short response come back failed.
fn collate(chunk: &[&String], batch: Vec<GeoRecord>) -> Vec<(String, GeoRecord)> {
    if batch.len() != chunk.len() {
        warn!("sent {} addresses, got {} results", chunk.len(), batch.len());
    }

    let mut batch = batch.into_iter();

    chunk.iter().map(|&address| {
        let record = match batch.next() {
            Some(record) => record,
            None         => GeoRecord::failed(bare(address), "missing from batch response"),
        };
        (address.clone(), record)
    }).collect()
}

/// Address as the provider expects it: no brackets, no zone.
fn bare(address: &str) -> &str {
    let address = address.trim_start_matches('[').trim_end_matches(']');
    address.split('%').next().unwrap_or(address)
}
