//! guardiand - Guardian Agent daemon
//!
//! This daemon:
//! 1. Acquires the configured frame source (HTTP capture device or looping
//!    clip; stub:// for demos)
//! 2. Drives the monitor tick loop: overlay rendering, the detection
//!    scheduler gate, evidence capture, and the remote inference call
//! 3. Synthesizes positive detections into incident records in the event
//!    store
//! 4. Optionally pages the notification endpoint for each new incident

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use guardian_agent::{
    config::GuardianConfig, now_ms, CameraDirectory, ClipConfig, ClipSource, DeviceConfig,
    DeviceSource, EventStore, FrameSource, HttpDetectionService, IncidentEvent, Monitor,
    MonitorSettings, MonitorState, Notifier, Severity, StubPoseEstimator,
};

#[derive(Parser, Debug)]
#[command(name = "guardiand", about = "Guardian Agent safety-monitoring daemon")]
struct Args {
    /// Config file path (JSON).
    #[arg(long, env = "GUARDIAN_CONFIG")]
    config: Option<PathBuf>,

    /// Camera id to monitor (overrides config).
    #[arg(long)]
    camera: Option<String>,

    /// Stop after this many ticks (unbounded when omitted).
    #[arg(long)]
    ticks: Option<u64>,

    /// Page the notification endpoint for each new incident.
    #[arg(long)]
    notify: bool,

    /// Run without detection: frames and overlay only.
    #[arg(long)]
    feed_only: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if let Some(path) = &args.config {
        std::env::set_var("GUARDIAN_CONFIG", path);
    }
    let mut cfg = GuardianConfig::load()?;
    if let Some(camera) = args.camera {
        cfg.camera_id = camera;
    }

    let directory = CameraDirectory::seeded(now_ms());
    let camera = directory
        .get(&cfg.camera_id)
        .ok_or_else(|| anyhow!("unknown camera id '{}'", cfg.camera_id))?
        .clone();

    let store = Arc::new(Mutex::new(seeded_store()));

    let source: Box<dyn FrameSource> = if cfg.source_is_clip() {
        Box::new(ClipSource::new(ClipConfig {
            path: cfg.source.url.clone(),
            target_fps: cfg.source.target_fps,
        })?)
    } else {
        Box::new(DeviceSource::new(DeviceConfig {
            url: cfg.source.url.clone(),
            target_fps: cfg.source.target_fps,
        })?)
    };

    let service = if args.feed_only {
        None
    } else {
        Some(Box::new(HttpDetectionService::new(
            &cfg.detection.endpoint,
            cfg.detection.timeout,
        )) as Box<dyn guardian_agent::DetectionService>)
    };

    let frame_budget = Duration::from_millis((1000 / cfg.source.target_fps.max(1)) as u64);
    let settings = MonitorSettings {
        min_interval: cfg.detection.min_interval,
        overlay_enabled: cfg.overlay_enabled,
        frame_budget,
    };

    let mut monitor = Monitor::new(
        camera.clone(),
        source,
        Some(Box::new(StubPoseEstimator::new())),
        service,
        settings,
        store.clone(),
    );

    let notifier = args
        .notify
        .then(|| Notifier::new(&cfg.notify_endpoint, cfg.detection.timeout));

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_handler = shutdown.clone();
    ctrlc::set_handler(move || {
        shutdown_handler.store(true, Ordering::SeqCst);
    })?;

    monitor.start()?;
    if monitor.state() == MonitorState::AccessDenied {
        return Err(anyhow!(
            "capture device denied access for '{}'; fix permissions and restart to retry",
            cfg.source.url
        ));
    }

    log::info!(
        "guardiand running. camera={} location={} source={}",
        camera.id,
        camera.location,
        cfg.source.url
    );
    log::info!(
        "detection endpoint={} min_interval={}ms overlay={}",
        cfg.detection.endpoint,
        cfg.detection.min_interval.as_millis(),
        cfg.overlay_enabled
    );

    let mut last_health_log = Instant::now();
    let mut ticks = 0u64;

    while !shutdown.load(Ordering::SeqCst) {
        if let Some(max) = args.ticks {
            if ticks >= max {
                break;
            }
        }
        if monitor.state() != MonitorState::Running {
            break;
        }

        let tick_start = Instant::now();
        match monitor.tick() {
            Ok(report) => {
                for id in &report.appended {
                    notify_incident(&notifier, &store, id);
                }
            }
            Err(e) => log::error!("tick failed: {}", e),
        }
        ticks += 1;

        if last_health_log.elapsed() >= Duration::from_secs(5) {
            let health = monitor.health();
            log::info!(
                "health={} ticks={} incidents={}",
                health.status,
                ticks,
                store.lock().map(|s| s.len()).unwrap_or(0)
            );
            last_health_log = Instant::now();
        }

        let elapsed = tick_start.elapsed();
        if elapsed < frame_budget {
            std::thread::sleep(frame_budget - elapsed);
        }
    }

    monitor.shutdown();
    log::info!("guardiand stopped after {} ticks", ticks);
    Ok(())
}

fn notify_incident(notifier: &Option<Notifier>, store: &Arc<Mutex<EventStore>>, id: &str) {
    let Some(notifier) = notifier else {
        return;
    };
    let Ok(store) = store.lock() else {
        return;
    };
    let Some(event) = store.get(id) else {
        return;
    };
    match notifier.notify_incident(event) {
        Ok(true) => log::info!("notification sent for {}", id),
        Ok(false) => {}
        Err(e) => log::warn!("notification failed for {}: {}", id, e),
    }
}

/// Demo incidents the dashboard ships with.
fn seeded_store() -> EventStore {
    let now = now_ms();
    let mut store = EventStore::new();
    store.append(IncidentEvent::seeded(
        "seed-1",
        "Water Spill Detected",
        Severity::High,
        now.saturating_sub(5 * 60 * 1000),
        "Living Room",
        "Slippery surface detected - potential fall risk",
        "cam1",
        vec![
            "Clean up the spill immediately to avoid slip-and-fall injuries".to_string(),
            "Place warning signs around the affected area".to_string(),
        ],
    ));
    store.append(IncidentEvent::seeded(
        "seed-2",
        "Person Fall Incident",
        Severity::Critical,
        now.saturating_sub(10 * 60 * 1000),
        "Kitchen",
        "Fall detected - immediate attention required",
        "cam2",
        vec![
            "Contact emergency services immediately (911)".to_string(),
            "Do not move the person unless in immediate danger".to_string(),
        ],
    ));
    store.append(IncidentEvent::seeded(
        "seed-3",
        "Medical Emergency",
        Severity::Medium,
        now.saturating_sub(15 * 60 * 1000),
        "Bedroom",
        "Unusual movement pattern detected",
        "cam3",
        vec!["Approach the person calmly and assess their condition".to_string()],
    ));
    store
}
