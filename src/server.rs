//! HTTP surface: recordings, player lookup and derived statistics.
//!
//! Endpoints:
//!   GET /recordings/<path>             - recorded session bytes
//!   GET /api/player/<path>?benchmark=N - benchmark record for the player view
//!   GET /api/stats                     - derived statistics (query narrows them)
//!   GET /api/leaderboard               - per-agent advantage table
//!   GET /api/health                    - health check

use anyhow::{bail, Context, Result};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader, Take};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;
use url::Url;

use crate::assets::AssetStore;
use crate::filter::{FilterCriteria, SpeedupRange};
use crate::logging::{log, log_request, obj, v_str, Domain, Level, ProfileScope};
use crate::stats::Thresholds;
use crate::store::{DerivedStats, Explorer};

/// Upper bound on the request line plus headers.
const MAX_HEAD_BYTES: u64 = 8 * 1024;
const HEAD_TIMEOUT: Duration = Duration::from_secs(10);

pub struct AppState {
    pub explorer: RwLock<Explorer>,
    pub assets: Box<dyn AssetStore>,
}

impl AppState {
    pub fn new(explorer: Explorer, assets: impl AssetStore + 'static) -> Arc<Self> {
        Arc::new(Self {
            explorer: RwLock::new(explorer),
            assets: Box::new(assets),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl Response {
    pub fn text(status: u16, body: &str) -> Self {
        Self {
            status,
            content_type: "text/plain; charset=utf-8",
            body: body.as_bytes().to_vec(),
        }
    }

    pub fn json(value: &impl serde::Serialize) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => Self {
                status: 200,
                content_type: "application/json",
                body,
            },
            Err(_) => Self::text(500, "Internal Server Error"),
        }
    }

    fn reason(&self) -> &'static str {
        match self.status {
            200 => "OK",
            400 => "BAD REQUEST",
            403 => "FORBIDDEN",
            404 => "NOT FOUND",
            405 => "METHOD NOT ALLOWED",
            _ => "INTERNAL SERVER ERROR",
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = format!(
            "HTTP/1.1 {} {}\r\n\
             Content-Type: {}\r\n\
             Access-Control-Allow-Origin: *\r\n\
             Content-Length: {}\r\n\
             Connection: close\r\n\r\n",
            self.status,
            self.reason(),
            self.content_type,
            self.body.len(),
        )
        .into_bytes();
        out.extend_from_slice(&self.body);
        out
    }
}

/// Decodes `%XX` escapes; malformed escapes are kept verbatim.
fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let Ok(decoded) = hex::decode(&bytes[i + 1..i + 3]) {
                out.extend_from_slice(&decoded);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn parse_range(value: &str) -> Option<SpeedupRange> {
    let (min, max) = value.split_once(',')?;
    Some(SpeedupRange::new(min.trim().parse().ok()?, max.trim().parse().ok()?))
}

/// Criteria and thresholds carried in a stats query. Repeated keys
/// accumulate into the selection sets.
pub fn query_inputs(url: &Url, base: Thresholds) -> (FilterCriteria, Thresholds) {
    let mut criteria = FilterCriteria::default();
    let mut t = base;
    for (key, value) in url.query_pairs() {
        match &*key {
            "agent" => {
                criteria.agents.insert(value.into_owned());
            }
            "type" => {
                criteria.types.insert(value.into_owned());
            }
            "level" => {
                criteria.levels.insert(value.into_owned());
            }
            "search" => criteria = criteria.with_search(&value),
            "agent_range" => criteria.agent_range = parse_range(&value),
            "oracle_range" => criteria.oracle_range = parse_range(&value),
            "agent_thresh" => t.agent = value.parse().unwrap_or(t.agent),
            "oracle_thresh" => t.oracle = value.parse().unwrap_or(t.oracle),
            _ => {}
        }
    }
    (criteria, t)
}

pub async fn handle(state: &AppState, method: &str, target: &str) -> Response {
    if method != "GET" {
        return Response::text(405, "Method Not Allowed");
    }
    let url = match Url::parse("http://localhost/").and_then(|base| base.join(target)) {
        Ok(url) => url,
        Err(_) => return Response::text(400, "Bad Request"),
    };
    let path = url.path();

    if let Some(rest) = path.strip_prefix("/recordings/") {
        return match state.assets.fetch(&percent_decode(rest)).await {
            Ok(asset) => Response {
                status: 200,
                content_type: asset.content_type,
                body: asset.bytes,
            },
            Err(err) => Response::text(err.status(), err.public_message()),
        };
    }

    if let Some(rest) = path.strip_prefix("/api/player/") {
        let recording_path = percent_decode(rest);
        let benchmark = url
            .query_pairs()
            .find(|(k, _)| k == "benchmark")
            .map(|(_, v)| v.into_owned());
        let explorer = state.explorer.read().await;
        let record = explorer
            .dataset()
            .lookup_player(&recording_path, benchmark.as_deref());
        return Response::json(&json!({
            "recording_path": recording_path,
            "benchmark": record,
        }));
    }

    match path {
        "/api/health" => Response::json(&json!({"status": "ok"})),
        "/api/stats" => {
            let explorer = state.explorer.read().await;
            if url.query().map_or(true, str::is_empty) {
                Response::json(explorer.derived())
            } else {
                let (criteria, t) = query_inputs(&url, explorer.thresholds());
                Response::json(&DerivedStats::compute(explorer.dataset(), &criteria, t))
            }
        }
        "/api/leaderboard" => {
            let explorer = state.explorer.read().await;
            Response::json(&explorer.leaderboard())
        }
        _ => Response::text(404, "Not Found"),
    }
}

async fn read_head_lines<R>(reader: &mut Take<BufReader<R>>) -> Result<Option<String>>
where
    R: AsyncRead + Unpin,
{
    let mut request_line = String::new();
    if reader.read_line(&mut request_line).await? == 0 {
        return Ok(None);
    }
    if reader.limit() == 0 && !request_line.ends_with('\n') {
        bail!("request line exceeds {} bytes", MAX_HEAD_BYTES);
    }
    // drain headers; bodies are not accepted
    loop {
        let mut header = String::new();
        let n = reader.read_line(&mut header).await?;
        if n == 0 || header.trim().is_empty() {
            break;
        }
    }
    Ok(Some(request_line))
}

/// Reads the request line and drains the headers, bounded in size and
/// time. `Ok(None)` when the peer closes before sending anything.
async fn read_head<R>(reader: R, deadline: Duration) -> Result<Option<String>>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader).take(MAX_HEAD_BYTES);
    tokio::time::timeout(deadline, read_head_lines(&mut reader))
        .await
        .context("timed out reading request head")?
}

async fn handle_connection(stream: TcpStream, state: Arc<AppState>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();

    let request_line = match read_head(reader, HEAD_TIMEOUT).await {
        Ok(Some(line)) => line,
        Ok(None) => return Ok(()),
        Err(err) => {
            let _ = writer.write_all(&Response::text(400, "Bad Request").to_bytes()).await;
            return Err(err);
        }
    };

    let mut parts = request_line.split_whitespace();
    let (method, target) = match (parts.next(), parts.next()) {
        (Some(m), Some(t)) => (m.to_string(), t.to_string()),
        _ => {
            writer.write_all(&Response::text(400, "Bad Request").to_bytes()).await?;
            return Ok(());
        }
    };

    let scope = ProfileScope::new("server.request");
    let response = handle(&state, &method, &target).await;
    log_request(&method, &target, response.status, scope.elapsed_ms());

    writer.write_all(&response.to_bytes()).await?;
    writer.shutdown().await?;
    Ok(())
}

pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> Result<()> {
    loop {
        let (stream, peer) = listener.accept().await.context("accepting connection")?;
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            if let Err(err) = handle_connection(stream, state).await {
                log(
                    Level::Warn,
                    Domain::Server,
                    "connection_error",
                    obj(&[
                        ("peer", v_str(&peer.to_string())),
                        ("error", v_str(&err.to_string())),
                    ]),
                );
            }
        });
    }
}

pub async fn run(bind_addr: &str, state: Arc<AppState>) -> Result<()> {
    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("binding {}", bind_addr))?;
    log(
        Level::Info,
        Domain::System,
        "listening",
        obj(&[("addr", v_str(bind_addr))]),
    );
    serve(listener, state).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_decoding() {
        assert_eq!(percent_decode("run%201.cast"), "run 1.cast");
        assert_eq!(percent_decode("100%"), "100%");
        assert_eq!(percent_decode("%zz"), "%zz");
        assert_eq!(percent_decode("%2E%2E"), "..");
    }

    #[test]
    fn query_builds_criteria_and_thresholds() {
        let url = Url::parse(
            "http://localhost/api/stats?agent=t%2Cclaude&agent=t%2Cgpt-5&level=func-level&agent_range=0.5,2&oracle_thresh=2",
        )
        .unwrap();
        let (criteria, t) = query_inputs(&url, Thresholds::default());
        assert_eq!(criteria.agents.len(), 2);
        assert!(criteria.levels.contains("func-level"));
        assert_eq!(criteria.agent_range, Some(SpeedupRange::new(0.5, 2.0)));
        assert_eq!(t, Thresholds::new(1.0, 2.0));
    }

    #[tokio::test]
    async fn head_returns_request_line_and_skips_headers() {
        let raw = b"GET /api/health HTTP/1.1\r\nHost: localhost\r\n\r\n";
        let line = read_head(&raw[..], Duration::from_secs(1)).await.unwrap();
        assert_eq!(line.as_deref(), Some("GET /api/health HTTP/1.1\r\n"));
        assert_eq!(read_head(&b""[..], Duration::from_secs(1)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn oversized_request_line_is_rejected() {
        let mut raw = b"GET /".to_vec();
        raw.extend(std::iter::repeat(b'a').take(MAX_HEAD_BYTES as usize));
        raw.extend_from_slice(b" HTTP/1.1\r\n\r\n");
        assert!(read_head(raw.as_slice(), Duration::from_secs(1)).await.is_err());
    }

    #[tokio::test]
    async fn silent_client_times_out() {
        let (_client, server) = tokio::io::duplex(64);
        let err = read_head(server, Duration::from_millis(20)).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn response_head_carries_length() {
        let bytes = Response::text(404, "Recording not found").to_bytes();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("HTTP/1.1 404 NOT FOUND\r\n"));
        assert!(text.contains("Content-Length: 19\r\n"));
        assert!(text.ends_with("\r\n\r\nRecording not found"));
    }
}
