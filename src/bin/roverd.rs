//! roverd - rover control daemon
//!
//! This daemon:
//! 1. Loads configuration (JSON file + environment + flags)
//! 2. Opens the camera, the motor/servo driver and the face locator
//! 3. Runs the control loop on its own thread
//! 4. Serves the command API and the MJPEG stream
//! 5. Stops the robot and releases the camera on Ctrl-C
//!
//! If hardware initialisation fails the API still comes up, but no control
//! loop runs and commands actuate nothing.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::mpsc;

use rover_pilot::{
    api::{ApiConfig, ApiServer},
    config::RoverdConfig,
    detect::load_face_locator,
    ingest::open_source,
    CommandSurface, FaceLocator, FrameSource, Scheduler, SchedulerHandle, ServoAxis,
    SharedActuator, SharedState, SimulatedActuator,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Rover control daemon")]
struct Args {
    /// JSON configuration file.
    #[arg(long, env = "ROVER_CONFIG")]
    config: Option<PathBuf>,

    /// Override the API listen address.
    #[arg(long)]
    api_addr: Option<String>,

    /// Override the camera source (`stub://line`, `/dev/video0`, `a.jpg,b.jpg`).
    #[arg(long)]
    camera: Option<String>,
}

struct Hardware {
    source: Box<dyn FrameSource>,
    actuator: SharedActuator,
    face: Option<Box<dyn FaceLocator>>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut cfg = RoverdConfig::load_from(args.config.as_deref())?;
    if let Some(addr) = args.api_addr {
        cfg.api_addr = addr;
    }
    if let Some(camera) = args.camera {
        cfg.camera.source = camera;
    }

    let state = SharedState::new(cfg.servo, cfg.line_color.clone()).shared();
    let settings = cfg.command_settings();

    let scheduler = match init_hardware(&cfg) {
        Ok(hardware) => {
            push_servo_angles(&hardware.actuator, &cfg);
            let actuator = hardware.actuator.clone();
            let handle = Scheduler::new(
                hardware.source,
                hardware.actuator,
                state.clone(),
                hardware.face,
                cfg.scheduler_config(),
            )
            .with_line_follower(cfg.line_follower())
            .spawn()?;
            Some((handle, actuator))
        }
        Err(err) => {
            log::error!(
                "FATAL: hardware initialisation failed, autonomous operation disabled: {:#}",
                err
            );
            None
        }
    };

    let actuator = scheduler.as_ref().map(|(_, actuator)| actuator.clone());
    let surface = CommandSurface::new(state.clone(), actuator, settings);
    let api_handle = ApiServer::new(
        ApiConfig {
            addr: cfg.api_addr.clone(),
            ..ApiConfig::default()
        },
        surface,
    )
    .spawn()?;
    log::info!("command api listening on {}", api_handle.addr);
    log::info!(
        "roverd running: camera={}, line_color={}, face_tracking={}",
        cfg.camera.source,
        cfg.line_color.name,
        state.face_tracking_available()
    );

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })?;
    let _ = rx.recv();
    log::info!("shutdown requested");

    if let Some((handle, _)) = scheduler {
        stop_scheduler(handle);
    }
    api_handle.stop()?;
    log::info!("roverd stopped");
    Ok(())
}

fn init_hardware(cfg: &RoverdConfig) -> Result<Hardware> {
    let source = open_source(&cfg.camera)?;
    let actuator = SharedActuator::new(SimulatedActuator::new());
    let face = match load_face_locator(
        cfg.face_model.as_deref(),
        cfg.camera.width,
        cfg.camera.height,
    ) {
        Ok(face) => face,
        Err(err) => {
            log::warn!("face locator unavailable, FACE_TRACK disabled: {:#}", err);
            None
        }
    };
    Ok(Hardware {
        source,
        actuator,
        face,
    })
}

fn push_servo_angles(actuator: &SharedActuator, cfg: &RoverdConfig) {
    for (axis, channel) in [
        (ServoAxis::Pan, cfg.pan_channel),
        (ServoAxis::Tilt, cfg.tilt_channel),
    ] {
        if let Err(err) = actuator.set_servo_angle(channel, cfg.servo.get(axis)) {
            log::warn!("initial {:?} angle not applied: {:#}", axis, err);
        }
    }
}

fn stop_scheduler(handle: SchedulerHandle) {
    if let Err(err) = handle.stop() {
        log::error!("scheduler did not stop cleanly: {:#}", err);
    }
}
