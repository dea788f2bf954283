use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use serde_json::{json, Value};

use rover_pilot::api::{ApiConfig, ApiHandle, ApiServer};
use rover_pilot::{
    ActuatorCall, CommandSettings, CommandSurface, Frame, Mode, MotionCommand,
    RecordingActuator, SharedActuator, SharedState,
};

struct Served {
    handle: ApiHandle,
    state: Arc<SharedState>,
    recorder: RecordingActuator,
}

fn serve() -> Result<Served> {
    serve_with(ApiConfig::default().write_timeout)
}

fn serve_with(write_timeout: Duration) -> Result<Served> {
    let recorder = RecordingActuator::new();
    let state = SharedState::default().shared();
    let surface = CommandSurface::new(
        state.clone(),
        Some(SharedActuator::new(recorder.clone())),
        CommandSettings::default(),
    );
    let handle = ApiServer::new(
        ApiConfig {
            addr: "127.0.0.1:0".to_string(),
            write_timeout,
        },
        surface,
    )
    .spawn()?;
    Ok(Served {
        handle,
        state,
        recorder,
    })
}

fn send(addr: SocketAddr, method: &str, path: &str, body: Option<&str>) -> Result<(u16, String)> {
    let mut stream = TcpStream::connect(addr)?;
    stream.set_read_timeout(Some(Duration::from_secs(5)))?;
    let body = body.unwrap_or("");
    let request = format!(
        "{method} {path} HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {len}\r\nConnection: close\r\n\r\n{body}",
        method = method,
        path = path,
        len = body.len(),
        body = body
    );
    stream.write_all(request.as_bytes())?;

    let mut response = String::new();
    stream.read_to_string(&mut response)?;
    let status: u16 = response
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| anyhow!("missing status line"))?
        .parse()?;
    let body = response
        .split_once("\r\n\r\n")
        .map(|(_, body)| body.to_string())
        .unwrap_or_default();
    Ok((status, body))
}

fn post(addr: SocketAddr, path: &str, body: Value) -> Result<(u16, Value)> {
    let (status, body) = send(addr, "POST", path, Some(&body.to_string()))?;
    Ok((status, serde_json::from_str(&body)?))
}

#[test]
fn health_and_status() -> Result<()> {
    let served = serve()?;
    let addr = served.handle.addr;

    let (status, body) = send(addr, "GET", "/health", None)?;
    assert_eq!(status, 200);
    assert_eq!(serde_json::from_str::<Value>(&body)?, json!({"status": "ok"}));

    let (status, body) = send(addr, "GET", "/status", None)?;
    assert_eq!(status, 200);
    let snapshot: Value = serde_json::from_str(&body)?;
    assert_eq!(snapshot["mode"], "IDLE");
    assert_eq!(snapshot["servo"], json!({"pan": 70, "tilt": 0}));
    assert_eq!(snapshot["queue_len"], 0);

    served.handle.stop()?;
    Ok(())
}

#[test]
fn set_mode_round_trip() -> Result<()> {
    let served = serve()?;
    let addr = served.handle.addr;

    let (status, reply) = post(addr, "/set_mode", json!({"mode": "LINE_FOLLOW"}))?;
    assert_eq!(status, 200);
    assert_eq!(reply, json!({"status": "mode_set", "mode": "LINE_FOLLOW"}));
    assert_eq!(served.state.mode(), Mode::LineFollow);

    let (_, reply) = post(addr, "/set_mode", json!({"mode": "WARP"}))?;
    assert_eq!(reply["status"], "failed");
    assert_eq!(served.state.mode(), Mode::LineFollow);

    let (_, reply) = post(addr, "/set_mode", json!({"mode": "SEQUENTIAL"}))?;
    assert_eq!(reply["status"], "failed");

    served.handle.stop()?;
    Ok(())
}

#[test]
fn manual_control_actuates_immediately() -> Result<()> {
    let served = serve()?;
    let addr = served.handle.addr;

    let (status, reply) = post(
        addr,
        "/manual_control",
        json!({"command": "forward", "speed": 250}),
    )?;
    assert_eq!(status, 200);
    assert_eq!(reply["status"], "ok");
    assert_eq!(served.state.mode(), Mode::Manual);
    assert_eq!(
        served.recorder.last_motion(),
        Some(MotionCommand::forward(100, Duration::ZERO))
    );

    let (_, reply) = post(addr, "/manual_control", json!({"command": "stop"}))?;
    assert_eq!(reply["status"], "ok");
    assert_eq!(served.state.mode(), Mode::Idle);

    served.handle.stop()?;
    Ok(())
}

#[test]
fn servo_control_forwards_clamped_angles() -> Result<()> {
    let served = serve()?;
    let addr = served.handle.addr;

    let (_, reply) = post(
        addr,
        "/servo_control",
        json!({"servo": "tilt", "action": "decrement"}),
    )?;
    assert_eq!(reply, json!({"status": "ok", "pan": 70, "tilt": 0}));

    let (_, reply) = post(
        addr,
        "/servo_control",
        json!({"servo": "pan", "action": "increment"}),
    )?;
    assert_eq!(reply["pan"], 75);
    assert!(served
        .recorder
        .calls()
        .contains(&ActuatorCall::Servo { channel: 10, angle: 75 }));

    let (_, reply) = post(
        addr,
        "/servo_control",
        json!({"servo": "roll", "action": "increment"}),
    )?;
    assert_eq!(reply["status"], "failed");

    served.handle.stop()?;
    Ok(())
}

#[test]
fn run_instructions_queues_and_enters_sequential() -> Result<()> {
    let served = serve()?;
    let addr = served.handle.addr;

    let (_, reply) = post(
        addr,
        "/run_instructions",
        json!({"instructions": "t_up:1,turnRight:0.5,nonsense"}),
    )?;
    assert_eq!(reply, json!({"status": "running", "mode": "SEQUENTIAL", "count": 2}));
    assert_eq!(served.state.queue_len()?, 2);
    assert_eq!(served.state.mode(), Mode::Sequential);

    let (_, reply) = post(addr, "/run_instructions", json!({"instructions": "junk"}))?;
    assert_eq!(reply["status"], "failed");
    assert_eq!(served.state.queue_len()?, 2);

    served.handle.stop()?;
    Ok(())
}

#[test]
fn set_line_color_echoes_bounds() -> Result<()> {
    let served = serve()?;
    let addr = served.handle.addr;

    let (_, reply) = post(addr, "/set_line_color", json!({"color": "blue"}))?;
    assert_eq!(
        reply,
        json!({"status": "color_set", "color": "blue", "lower": [100, 100, 50], "upper": [130, 255, 255]})
    );
    assert_eq!(served.state.line_color()?.name, "blue");

    let (_, reply) = post(addr, "/set_line_color", json!({"color": "plaid"}))?;
    assert_eq!(reply["status"], "failed");
    assert_eq!(served.state.line_color()?.name, "blue");

    served.handle.stop()?;
    Ok(())
}

#[test]
fn malformed_requests_are_rejected() -> Result<()> {
    let served = serve()?;
    let addr = served.handle.addr;

    let (status, body) = send(addr, "POST", "/set_mode", Some("{not json"))?;
    assert_eq!(status, 400);
    assert_eq!(serde_json::from_str::<Value>(&body)?["status"], "failed");

    let (status, _) = send(addr, "GET", "/teleport", None)?;
    assert_eq!(status, 404);

    let (status, _) = send(addr, "GET", "/set_mode", None)?;
    assert_eq!(status, 405);

    served.handle.stop()?;
    Ok(())
}

#[test]
fn video_feed_streams_the_latest_frame() -> Result<()> {
    let served = serve()?;
    let jpeg = Frame::filled(32, 24, [90, 120, 30]).encode_jpeg(80)?;
    served.state.publish_frame(jpeg.clone());

    let mut stream = TcpStream::connect(served.handle.addr)?;
    stream.set_read_timeout(Some(Duration::from_secs(5)))?;
    stream.write_all(b"GET /video_feed HTTP/1.1\r\nHost: localhost\r\n\r\n")?;

    // Read until the response header, one part header and the whole JPEG arrived.
    let part_complete = |data: &[u8]| {
        let mut ends = data
            .windows(4)
            .enumerate()
            .filter(|(_, w)| *w == b"\r\n\r\n")
            .map(|(i, _)| i + 4);
        match (ends.next(), ends.next()) {
            (Some(_), Some(part_start)) => data.len() >= part_start + jpeg.len(),
            _ => false,
        }
    };
    let mut received = Vec::new();
    let mut buf = [0u8; 4096];
    while !part_complete(&received) {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            break;
        }
        received.extend_from_slice(&buf[..n]);
    }
    let text = String::from_utf8_lossy(&received);
    assert!(text.starts_with("HTTP/1.1 200 OK"));
    assert!(text.contains("multipart/x-mixed-replace; boundary=frame"));
    assert!(text.contains("--frame\r\nContent-Type: image/jpeg"));
    assert!(text.contains(&format!("Content-Length: {}", jpeg.len())));
    assert!(received.windows(jpeg.len()).any(|w| w == jpeg.as_slice()));
    drop(stream);

    served.handle.stop()?;
    Ok(())
}

#[test]
fn video_feed_drops_a_client_that_stops_reading() -> Result<()> {
    let served = serve_with(Duration::from_millis(100))?;
    let mut stream = TcpStream::connect(served.handle.addr)?;
    stream.write_all(b"GET /video_feed HTTP/1.1\r\nHost: localhost\r\n\r\n")?;

    // Far more than the loopback socket buffers hold while nobody reads.
    for _ in 0..12 {
        served.state.publish_frame(vec![0xAB; 8 * 1024 * 1024]);
        std::thread::sleep(Duration::from_millis(60));
    }

    // The server gave up on the stalled writer, so draining ends in EOF
    // instead of a stream that keeps going.
    stream.set_read_timeout(Some(Duration::from_secs(2)))?;
    let deadline = Instant::now() + Duration::from_secs(10);
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        assert!(Instant::now() < deadline, "stalled stream was never closed");
        if stream.read(&mut buf)? == 0 {
            break;
        }
    }

    served.handle.stop()?;
    Ok(())
}
