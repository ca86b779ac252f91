//! HTTP API.
//!
//! A small HTTP/1.1 server on `std::net`. The accept loop polls a non-blocking
//! listener and hands each connection to its own thread, since `/video_feed1`
//! holds its connection for as long as the stream runs while the JSON endpoints
//! keep answering alongside it.
//!
//! Routes:
//! - `GET /video_feed1`: `multipart/x-mixed-replace` JPEG stream
//! - `GET /api/test`: server liveness plus a camera probe
//! - `GET /api/detection-counts`: running counters and the recent event window
//! - `GET /api/end-interview`: final report; resets the counters
//! - `GET /health`: liveness only

use crate::error::MonitorError;
use crate::monitor::Monitor;
use crate::stream::STREAM_CONTENT_TYPE;
use anyhow::{anyhow, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

const MAX_REQUEST_BYTES: usize = 8192;
/// A stream client that accepts nothing for this long is treated as gone.
const STREAM_WRITE_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiConfig {
    pub addr: String,
    /// Value of `Access-Control-Allow-Origin` on every response.
    pub allowed_origin: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:6500".to_string(),
            allowed_origin: "http://localhost:5173".to_string(),
        }
    }
}

#[derive(Debug)]
pub struct ApiHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ApiHandle {
    /// Stop accepting, cancel open streams, and wait for in-flight requests.
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("api server thread panicked"))?;
        }
        Ok(())
    }
}

pub struct ApiServer {
    cfg: ApiConfig,
    monitor: Arc<Monitor>,
}

impl ApiServer {
    pub fn new(cfg: ApiConfig, monitor: Arc<Monitor>) -> Self {
        Self { cfg, monitor }
    }

    pub fn spawn(self) -> Result<ApiHandle> {
        let configured_addr: SocketAddr = self
            .cfg
            .addr
            .parse()
            .map_err(|e| anyhow!("invalid api address '{}': {}", self.cfg.addr, e))?;
        let listener = TcpListener::bind(configured_addr)?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;
        log::info!("api listening on {}", addr);

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let cfg = Arc::new(self.cfg);
        let monitor = self.monitor;
        let join = std::thread::spawn(move || {
            if let Err(err) = run_api(listener, cfg, monitor, shutdown_thread) {
                log::error!("api stopped: {}", err);
            }
        });

        Ok(ApiHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_api(
    listener: TcpListener,
    cfg: Arc<ApiConfig>,
    monitor: Arc<Monitor>,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    let mut workers: Vec<JoinHandle<()>> = Vec::new();
    let result = loop {
        if shutdown.load(Ordering::SeqCst) {
            break Ok(());
        }
        workers.retain(|worker| !worker.is_finished());
        match listener.accept() {
            Ok((stream, peer)) => {
                let cfg = cfg.clone();
                let monitor = monitor.clone();
                workers.push(std::thread::spawn(move || {
                    if let Err(err) = handle_connection(stream, &cfg, &monitor) {
                        log::warn!("api request from {} failed: {:#}", peer, err);
                    }
                }));
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }
            Err(err) => break Err(err.into()),
        }
    };

    monitor.shutdown();
    for worker in workers {
        if worker.join().is_err() {
            log::error!("api connection thread panicked");
        }
    }
    result
}

fn handle_connection(mut stream: TcpStream, cfg: &ApiConfig, monitor: &Monitor) -> Result<()> {
    stream.set_nonblocking(false)?;
    let request = read_request(&mut stream)?;
    let origin = cfg.allowed_origin.as_str();
    log::debug!(
        "{} {} ({})",
        request.method,
        request.path,
        request.header("user-agent").unwrap_or("-")
    );

    if request.method == "OPTIONS" {
        return write_response(&mut stream, origin, 204, "text/plain", b"");
    }
    if request.method != "GET" {
        return write_json_response(
            &mut stream,
            origin,
            405,
            r#"{"error":"method_not_allowed"}"#,
        );
    }

    match request.path.as_str() {
        "/health" => write_json_response(&mut stream, origin, 200, r#"{"status":"ok"}"#),
        "/video_feed1" => serve_video_feed(&mut stream, origin, monitor),
        "/api/test" => serve_test(&mut stream, origin, monitor),
        "/api/detection-counts" => match monitor.detection_counts() {
            Ok(snapshot) => write_serialized(&mut stream, origin, 200, &snapshot),
            Err(err) => write_error(&mut stream, origin, "detection counts", &err),
        },
        "/api/end-interview" => match monitor.end_session() {
            Ok(report) => write_serialized(&mut stream, origin, 200, &report),
            Err(err) => write_error(&mut stream, origin, "end interview", &err),
        },
        _ => write_json_response(&mut stream, origin, 404, r#"{"error":"not_found"}"#),
    }
}

fn serve_video_feed(stream: &mut TcpStream, origin: &str, monitor: &Monitor) -> Result<()> {
    log::info!("received request for video_feed1");
    let mut driver = match monitor.open_stream() {
        Ok(driver) => driver,
        Err(err) => return write_error(stream, origin, "video_feed1", &err),
    };

    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: {}\r\n{}Cache-Control: no-store\r\nConnection: close\r\n\r\n",
        STREAM_CONTENT_TYPE,
        cors_headers(origin)
    );
    stream.set_write_timeout(Some(STREAM_WRITE_TIMEOUT))?;
    stream.write_all(header.as_bytes())?;

    let mut sent = 0u64;
    for chunk in driver.by_ref() {
        if chunk.is_empty() {
            continue;
        }
        if let Err(err) = stream.write_all(&chunk).and_then(|_| stream.flush()) {
            log::info!("video_feed1 client went away after {} frames: {}", sent, err);
            break;
        }
        sent += 1;
    }
    let stats = driver.source_stats();
    match driver.ended() {
        Some(end) => log::debug!(
            "video_feed1 ended after {} frames ({} captured from {}): {:?}",
            sent,
            stats.frames_captured,
            stats.device,
            end
        ),
        None => log::debug!(
            "video_feed1 closed after {} frames ({} captured from {})",
            sent,
            stats.frames_captured,
            stats.device
        ),
    }
    Ok(())
}

#[derive(Serialize)]
struct TestResponse {
    status: &'static str,
    camera: String,
    timestamp: String,
}

fn serve_test(stream: &mut TcpStream, origin: &str, monitor: &Monitor) -> Result<()> {
    let (status, camera) = match monitor.probe_camera() {
        Ok(()) => (200, "Camera is accessible".to_string()),
        Err(err) => {
            log::error!("test endpoint error: {}", err);
            let reason = match err {
                MonitorError::CameraUnavailable(reason) => reason,
                other => other.to_string(),
            };
            (500, format!("Camera error: {}", reason))
        }
    };
    let body = TestResponse {
        status: "Server is running",
        camera,
        timestamp: crate::iso_timestamp(),
    };
    write_serialized(stream, origin, status, &body)
}

fn write_error(
    stream: &mut TcpStream,
    origin: &str,
    context: &str,
    err: &MonitorError,
) -> Result<()> {
    log::error!("{}: {}", context, err);
    let body = serde_json::json!({ "error": err.to_string() });
    write_serialized(stream, origin, 500, &body)
}

fn write_serialized<T: Serialize>(
    stream: &mut TcpStream,
    origin: &str,
    status: u16,
    body: &T,
) -> Result<()> {
    match serde_json::to_vec(body) {
        Ok(payload) => write_response(stream, origin, status, "application/json", &payload),
        Err(err) => {
            let err = MonitorError::AggregateCompute(format!("serialize response: {}", err));
            log::error!("{}", err);
            let payload = serde_json::json!({ "error": err.to_string() }).to_string();
            write_json_response(stream, origin, 500, &payload)
        }
    }
}

/// Read up to the end of the request head and parse it. Bodies are ignored;
/// every route is a GET.
fn read_request(stream: &mut TcpStream) -> Result<HttpRequest> {
    stream.set_read_timeout(Some(Duration::from_secs(2)))?;
    let mut head: Vec<u8> = Vec::with_capacity(512);
    let mut chunk = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        let read = stream.read(&mut chunk)?;
        if read == 0 {
            break;
        }
        head.extend_from_slice(&chunk[..read]);
        if head.len() > MAX_REQUEST_BYTES {
            return Err(anyhow!("request head exceeds {} bytes", MAX_REQUEST_BYTES));
        }
    }
    HttpRequest::parse(&head)
}

fn cors_headers(origin: &str) -> String {
    format!(
        "Access-Control-Allow-Origin: {}\r\nAccess-Control-Allow-Credentials: true\r\nAccess-Control-Allow-Methods: GET, OPTIONS\r\nAccess-Control-Allow-Headers: Content-Type\r\n",
        origin
    )
}

fn write_json_response(
    stream: &mut TcpStream,
    origin: &str,
    status: u16,
    body: &str,
) -> Result<()> {
    write_response(stream, origin, status, "application/json", body.as_bytes())
}

fn write_response(
    stream: &mut TcpStream,
    origin: &str,
    status: u16,
    content_type: &str,
    body: &[u8],
) -> Result<()> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        204 => "HTTP/1.1 204 No Content",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\n{cors}Cache-Control: no-store\r\nConnection: close\r\n\r\n",
        status_line = status_line,
        content_type = content_type,
        len = body.len(),
        cors = cors_headers(origin)
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    Ok(())
}

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
    headers: HashMap<String, String>,
}

impl HttpRequest {
    fn parse(head: &[u8]) -> Result<Self> {
        let text = String::from_utf8_lossy(head);
        let mut lines = text.split("\r\n");
        let (method, target) = lines
            .next()
            .and_then(|line| {
                let mut fields = line.split_whitespace();
                Some((fields.next()?, fields.next()?))
            })
            .ok_or_else(|| anyhow!("malformed request line"))?;
        let headers = lines
            .take_while(|line| !line.is_empty())
            .filter_map(|line| line.split_once(':'))
            .map(|(name, value)| (name.trim().to_ascii_lowercase(), value.trim().to_string()))
            .collect();
        let path = target.split_once('?').map_or(target, |(path, _)| path);
        Ok(Self {
            method: method.to_string(),
            path: path.to_string(),
            headers,
        })
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}
