use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use geonetstat::geo::{IpApi, Locator, Status};

/// Minimal `/batch` endpoint: answers each query in order, leaving off
/// the last `short` records, and records the size of every request.
async fn serve(short: usize) -> (String, Arc<Mutex<Vec<usize>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("http://{}", listener.local_addr().unwrap());
    let sizes    = Arc::new(Mutex::new(Vec::new()));

    let seen = sizes.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(respond(stream, short, seen.clone()));
        }
    });

    (endpoint, sizes)
}

async fn respond(mut stream: TcpStream, short: usize, sizes: Arc<Mutex<Vec<usize>>>) {
    let mut buf = Vec::new();

    loop {
        let head = loop {
            if let Some(n) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break n + 4;
            }
            if !fill(&mut stream, &mut buf).await {
                return;
            }
        };

        let header = String::from_utf8_lossy(&buf[..head]).to_ascii_lowercase();
        let length = header.lines().find_map(|line| {
            line.strip_prefix("content-length:")?.trim().parse::<usize>().ok()
        }).unwrap_or(0);

        while buf.len() < head + length {
            if !fill(&mut stream, &mut buf).await {
                return;
            }
        }

        let query = serde_json::from_slice::<Vec<String>>(&buf[head..head + length]).unwrap();
        buf.drain(..head + length);

        sizes.lock().unwrap().push(query.len());

        let answered = query.len().saturating_sub(short);
        let records  = query.iter().take(answered).enumerate().map(|(n, q)| json!({
            "status": "success",
            "lat":    n as f64,
            "lon":    -(n as f64),
            "city":   "Testville",
            "query":  q,
        })).collect::<Vec<_>>();

        let body = serde_json::to_vec(&records).unwrap();
        let head = format!(
            "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\n\r\n",
            body.len(),
        );

        if stream.write_all(head.as_bytes()).await.is_err() || stream.write_all(&body).await.is_err() {
            return;
        }
    }
}

async fn fill(stream: &mut TcpStream, buf: &mut Vec<u8>) -> bool {
    let mut chunk = [0u8; 4096];
    match stream.read(&mut chunk).await {
        Ok(0) | Err(_) => false,
        Ok(n)          => {
            buf.extend_from_slice(&chunk[..n]);
            true
        }
    }
}

fn addresses(count: usize) -> BTreeSet<String> {
    (0..count).map(|n| format!("81.2.{}.{}", n / 250, n % 250 + 1)).collect()
}

#[tokio::test]
async fn batches_are_chunked_and_zipped_in_order() {
    let (endpoint, sizes) = serve(0).await;
    let locator = Locator::IpApi(IpApi::new(&endpoint, Duration::from_secs(5)).unwrap());

    let addresses = addresses(250);
    let located   = locator.locate(&addresses).await.unwrap();

    assert_eq!(*sizes.lock().unwrap(), vec![100, 100, 50]);
    assert_eq!(located.len(), 250);
    assert!(located.values().all(|r| r.status == Status::Success));
    assert!(located.iter().all(|(address, record)| *address == record.query));
}

#[tokio::test]
async fn short_response_fails_the_missing_addresses() {
    let (endpoint, sizes) = serve(1).await;
    let locator = Locator::IpApi(IpApi::new(&endpoint, Duration::from_secs(5)).unwrap());

    let addresses = addresses(150);
    let located   = locator.locate(&addresses).await.unwrap();

    assert_eq!(*sizes.lock().unwrap(), vec![100, 50]);
    assert_eq!(located.len(), 150);

    let failed = located.iter().filter(|(_, r)| r.status == Status::Fail).collect::<Vec<_>>();
    assert_eq!(failed.len(), 2);
    for (address, record) in failed {
        assert_eq!(*address, record.query);
        assert_eq!(record.message.as_deref(), Some("missing from batch response"));
    }
}
