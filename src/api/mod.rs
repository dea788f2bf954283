//! HTTP adapter for the command surface.
//!
//! A deliberately small HTTP/1.1 server: one accept loop polling a shutdown
//! flag, one short-lived thread per connection, JSON in and out. The only
//! long-lived response is `/video_feed`, a multipart MJPEG stream of the
//! latest published frame.

use anyhow::{anyhow, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::commands::{CommandReply, CommandSurface};

const MAX_REQUEST_BYTES: usize = 8192;
const STREAM_POLL: Duration = Duration::from_millis(50);
const STREAM_BOUNDARY: &str = "frame";

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub addr: String,
    /// Longest a single socket write may block. A `/video_feed` client that
    /// stops reading is dropped once this elapses.
    pub write_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:5000".to_string(),
            write_timeout: Duration::from_secs(5),
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
    surface: CommandSurface,
}

impl ApiServer {
    pub fn new(cfg: ApiConfig, surface: CommandSurface) -> Self {
        Self { cfg, surface }
    }

    pub fn spawn(self) -> Result<ApiHandle> {
        let configured_addr: SocketAddr = self.cfg.addr.parse()?;
        let listener = TcpListener::bind(configured_addr)?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let surface = self.surface;
        let write_timeout = self.cfg.write_timeout;
        let join = thread::Builder::new()
            .name("api".to_string())
            .spawn(move || {
                if let Err(err) = run_api(listener, surface, shutdown_thread, write_timeout) {
                    log::error!("command api stopped: {}", err);
                }
            })?;

        Ok(ApiHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_api(
    listener: TcpListener,
    surface: CommandSurface,
    shutdown: Arc<AtomicBool>,
    write_timeout: Duration,
) -> Result<()> {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, peer)) => {
                let surface = surface.clone();
                let shutdown = shutdown.clone();
                let spawned = thread::Builder::new()
                    .name("api-conn".to_string())
                    .spawn(move || {
                        if let Err(err) =
                            handle_connection(stream, &surface, &shutdown, write_timeout)
                        {
                            log::debug!("api request from {} dropped: {}", peer, err);
                        }
                    });
                if let Err(err) = spawned {
                    log::warn!("api could not spawn connection thread: {}", err);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(50));
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

#[derive(Deserialize)]
struct SetModeBody {
    mode: String,
}

#[derive(Deserialize)]
struct ManualBody {
    command: String,
    #[serde(default)]
    speed: Option<f64>,
}

#[derive(Deserialize)]
struct ServoBody {
    servo: String,
    action: String,
}

#[derive(Deserialize)]
struct InstructionsBody {
    instructions: String,
}

#[derive(Deserialize)]
struct LineColorBody {
    #[serde(default = "default_line_color")]
    color: String,
}

fn default_line_color() -> String {
    "black".to_string()
}

fn handle_connection(
    mut stream: TcpStream,
    surface: &CommandSurface,
    shutdown: &AtomicBool,
    write_timeout: Duration,
) -> Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_write_timeout(Some(write_timeout))?;
    let request = read_request(&mut stream)?;

    let reply = match (request.method.as_str(), request.path.as_str()) {
        ("GET", "/health") => {
            return write_json_response(&mut stream, 200, br#"{"status":"ok"}"#);
        }
        ("GET", "/status") => {
            return match surface.status() {
                Ok(snapshot) => {
                    write_json_response(&mut stream, 200, &serde_json::to_vec(&snapshot)?)
                }
                Err(err) => {
                    let reply = CommandReply::failed(format!("{:#}", err));
                    write_json_response(&mut stream, 500, &serde_json::to_vec(&reply)?)
                }
            };
        }
        ("GET", "/video_feed") => return stream_frames(stream, surface, shutdown),
        ("POST", "/set_mode") => {
            with_body(&request, |body: SetModeBody| surface.set_mode(&body.mode))
        }
        ("POST", "/manual_control") => with_body(&request, |body: ManualBody| {
            surface.manual(&body.command, body.speed.map(|s| s.round() as i64))
        }),
        ("POST", "/servo_control") => with_body(&request, |body: ServoBody| {
            surface.adjust_servo(&body.servo, &body.action)
        }),
        ("POST", "/run_instructions") => with_body(&request, |body: InstructionsBody| {
            surface.submit_instructions(&body.instructions)
        }),
        ("POST", "/set_line_color") => with_body(&request, |body: LineColorBody| {
            surface.set_line_color(&body.color)
        }),
        (_, "/health" | "/status" | "/video_feed" | "/set_mode" | "/manual_control"
        | "/servo_control" | "/run_instructions" | "/set_line_color") => {
            return write_json_response(&mut stream, 405, br#"{"error":"method_not_allowed"}"#);
        }
        _ => {
            return write_json_response(&mut stream, 404, br#"{"error":"not_found"}"#);
        }
    };

    let (status, reply) = match reply {
        Ok(reply) => (200, reply),
        Err(reply) => (400, reply),
    };
    write_json_response(&mut stream, status, &serde_json::to_vec(&reply)?)
}

/// Decode the JSON body and run `handler`. A body that does not decode is
/// answered with a `failed` reply as `Err`.
fn with_body<T, F>(request: &HttpRequest, handler: F) -> Result<CommandReply, CommandReply>
where
    T: DeserializeOwned,
    F: FnOnce(T) -> CommandReply,
{
    match serde_json::from_slice::<T>(&request.body) {
        Ok(body) => Ok(handler(body)),
        Err(err) => Err(CommandReply::failed(format!("invalid request body: {}", err))),
    }
}

fn stream_frames(mut stream: TcpStream, surface: &CommandSurface, shutdown: &AtomicBool) -> Result<()> {
    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: multipart/x-mixed-replace; boundary={}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n",
        STREAM_BOUNDARY
    );
    stream.write_all(header.as_bytes())?;

    let state = surface.state();
    let mut seen = 0u64;
    while !shutdown.load(Ordering::SeqCst) {
        let Some(frame) = state.latest_frame_after(seen) else {
            thread::sleep(STREAM_POLL);
            continue;
        };
        let part = format!(
            "--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
            STREAM_BOUNDARY,
            frame.jpeg.len()
        );
        stream.write_all(part.as_bytes())?;
        stream.write_all(&frame.jpeg)?;
        stream.write_all(b"\r\n")?;
        stream.flush()?;
        seen = frame.sequence;
    }
    Ok(())
}

fn read_request(stream: &mut TcpStream) -> Result<HttpRequest> {
    stream.set_read_timeout(Some(Duration::from_secs(2)))?;
    let mut buf = [0u8; 1024];
    let mut data = Vec::new();
    let header_end = loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(anyhow!("connection closed before headers"));
        }
        data.extend_from_slice(&buf[..n]);
        if data.len() > MAX_REQUEST_BYTES {
            return Err(anyhow!("request too large"));
        }
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let text = String::from_utf8_lossy(&data[..header_end]).to_string();
    let mut lines = text.split("\r\n");
    let request_line = lines.next().ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
    let raw_path = parts.next().ok_or_else(|| anyhow!("missing path"))?;
    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        if let Some((k, v)) = line.split_once(':') {
            headers.insert(k.trim().to_lowercase(), v.trim().to_string());
        }
    }

    let content_length: usize = match headers.get("content-length") {
        Some(value) => value
            .parse()
            .map_err(|_| anyhow!("invalid content-length '{}'", value))?,
        None => 0,
    };
    if header_end + content_length > MAX_REQUEST_BYTES {
        return Err(anyhow!("request too large"));
    }
    let mut body = data[header_end..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(anyhow!("connection closed mid-body"));
        }
        body.extend_from_slice(&buf[..n]);
    }
    body.truncate(content_length);

    let path = raw_path.split('?').next().unwrap_or(raw_path).to_string();
    Ok(HttpRequest {
        method: method.to_string(),
        path,
        body,
    })
}

fn write_json_response(stream: &mut TcpStream, status: u16, body: &[u8]) -> Result<()> {
    write_response(stream, status, "application/json", body)
}

fn write_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: &str,
    body: &[u8],
) -> Result<()> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        400 => "HTTP/1.1 400 Bad Request",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n",
        status_line = status_line,
        content_type = content_type,
        len = body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    Ok(())
}

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
    body: Vec<u8>,
}
