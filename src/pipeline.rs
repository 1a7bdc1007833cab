//! The monitoring pipeline.
//!
//! `Monitor` owns one frame source and drives the tick loop that sits
//! between it and the rate-limited inference service:
//!
//! ```text
//! source --(tick)--> overlay render        (synchronous, optional)
//!                \-> scheduler gate        (synchronous)
//!                      \-> evidence capture -> worker thread -> inference
//!                                                  \-> synthesize -> store
//! ```
//!
//! Ticks are strictly sequential; the synchronous portion of a tick
//! completes before the next is scheduled. An eligible detection call is
//! dispatched to a dedicated worker thread and its reply drained on a later
//! tick, so the call never blocks ticking; the scheduler's single-flight
//! phase keeps at most one call outstanding. Every reply carries the
//! generation it was dispatched under; teardown bumps the generation so a
//! late reply is discarded instead of mutating state.

use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, SyncSender, TrySendError};
use std::sync::{mpsc, Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::cameras::CameraRecord;
use crate::events::EventStore;
use crate::evidence::{ClipRecorder, Evidence, SnapshotCapturer};
use crate::inference::{DetectionOutcome, DetectionService};
use crate::ingest::{AccessDeniedError, FrameSource};
use crate::now_ms;
use crate::overlay::PoseOverlay;
use crate::pose::PoseEstimator;
use crate::scheduler::DetectionScheduler;
use crate::synth::EventSynthesizer;

/// Lifecycle state of one monitor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MonitorState {
    /// Source not yet acquired.
    Idle,
    Running,
    /// Capture device denied access; waiting for an explicit retry.
    AccessDenied,
    Stopped,
}

#[derive(Clone, Debug)]
pub struct MonitorSettings {
    pub min_interval: Duration,
    pub overlay_enabled: bool,
    /// Per-tick time budget (1/fps).
    pub frame_budget: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(5000),
            overlay_enabled: true,
            frame_budget: Duration::from_millis(100),
        }
    }
}

/// What one tick did; consumed by the daemon's logging and by tests.
#[derive(Clone, Debug, Default)]
pub struct TickReport {
    pub overlay_drawn: bool,
    pub triggered: bool,
    /// Ids of incidents appended while draining inference replies.
    pub appended: Vec<String>,
}

/// Health snapshot for the dashboard shell.
#[derive(Clone, Debug, serde::Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub timestamp_ms: u64,
}

struct InferenceJob {
    image: Vec<u8>,
    location: String,
    time_ms: u64,
    generation: u64,
    evidence: Evidence,
}

struct InferenceReply {
    outcome: Result<DetectionOutcome>,
    time_ms: u64,
    generation: u64,
    evidence: Evidence,
}

/// Dedicated thread running the detection service. One worker per monitor;
/// the bounded job channel plus the scheduler's single-flight phase keep at
/// most one job outstanding.
struct InferenceWorker {
    job_tx: SyncSender<InferenceJob>,
    reply_rx: Receiver<InferenceReply>,
    join: Option<JoinHandle<()>>,
}

impl InferenceWorker {
    fn spawn(service: Box<dyn DetectionService>) -> Self {
        let (job_tx, job_rx) = mpsc::sync_channel::<InferenceJob>(1);
        let (reply_tx, reply_rx) = mpsc::channel::<InferenceReply>();
        let join = std::thread::spawn(move || {
            while let Ok(job) = job_rx.recv() {
                let outcome = service.analyze(&job.image, &job.location, job.time_ms);
                // Receiver may be gone during teardown; nothing to do then.
                let _ = reply_tx.send(InferenceReply {
                    outcome,
                    time_ms: job.time_ms,
                    generation: job.generation,
                    evidence: job.evidence,
                });
            }
        });
        Self {
            job_tx,
            reply_rx,
            join: Some(join),
        }
    }

    fn stop(self) {
        let Self {
            job_tx,
            reply_rx,
            join,
        } = self;
        // Dropping the job sender ends the worker loop; dropping the reply
        // receiver means a late result has nowhere to land.
        drop(job_tx);
        drop(reply_rx);
        if let Some(join) = join {
            if join.join().is_err() {
                log::error!("inference worker thread panicked");
            }
        }
    }
}

pub struct Monitor {
    camera: CameraRecord,
    source: Box<dyn FrameSource>,
    estimator: Option<Box<dyn PoseEstimator>>,
    overlay: PoseOverlay,
    scheduler: DetectionScheduler,
    capturer: SnapshotCapturer,
    recorder: Option<ClipRecorder>,
    worker: Option<InferenceWorker>,
    synthesizer: EventSynthesizer,
    store: Arc<Mutex<EventStore>>,
    settings: MonitorSettings,
    state: MonitorState,
    generation: u64,
    /// Set when the detection capability is unavailable: frames and overlay
    /// keep flowing, sampling is skipped.
    feed_only: bool,
}

impl Monitor {
    pub fn new(
        camera: CameraRecord,
        source: Box<dyn FrameSource>,
        estimator: Option<Box<dyn PoseEstimator>>,
        service: Option<Box<dyn DetectionService>>,
        settings: MonitorSettings,
        store: Arc<Mutex<EventStore>>,
    ) -> Self {
        let recorder = source.is_live().then(ClipRecorder::new);
        let feed_only = service.is_none();
        if feed_only {
            log::warn!(
                "camera {}: detection capability unavailable; running feed-only",
                camera.id
            );
        }
        let worker = service.map(InferenceWorker::spawn);
        let mut overlay = PoseOverlay::new(640, 480);
        overlay.set_enabled(settings.overlay_enabled);
        Self {
            camera,
            source,
            estimator,
            overlay,
            scheduler: DetectionScheduler::new(settings.min_interval),
            capturer: SnapshotCapturer::new(),
            recorder,
            worker,
            synthesizer: EventSynthesizer::new(),
            store,
            settings,
            state: MonitorState::Idle,
            generation: 0,
            feed_only,
        }
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub fn is_feed_only(&self) -> bool {
        self.feed_only
    }

    pub fn overlay(&self) -> &PoseOverlay {
        &self.overlay
    }

    pub fn set_overlay_enabled(&mut self, enabled: bool) {
        self.overlay.set_enabled(enabled);
    }

    pub fn health(&self) -> HealthStatus {
        let status = match self.state {
            MonitorState::Running if self.source.is_healthy() => "ok",
            MonitorState::Running => "degraded",
            MonitorState::AccessDenied => "access_denied",
            MonitorState::Idle | MonitorState::Stopped => "stopped",
        };
        HealthStatus {
            status,
            timestamp_ms: now_ms(),
        }
    }

    /// Acquire the source. Access denial is a recoverable state, not an
    /// error: the monitor parks in `AccessDenied` until `retry_access()`.
    pub fn start(&mut self) -> Result<()> {
        match self.source.connect() {
            Ok(()) => {
                self.state = MonitorState::Running;
                Ok(())
            }
            Err(e) if e.downcast_ref::<AccessDeniedError>().is_some() => {
                log::warn!("camera {}: {}", self.camera.id, e);
                self.state = MonitorState::AccessDenied;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Explicit manual retry after an access denial. Never called in a
    /// loop by the pipeline itself.
    pub fn retry_access(&mut self) -> Result<()> {
        if self.state != MonitorState::AccessDenied {
            return Ok(());
        }
        self.start()
    }

    /// One tick: drain inference replies, render the overlay, run the
    /// scheduler gate, and dispatch an eligible detection call.
    pub fn tick(&mut self) -> Result<TickReport> {
        let mut report = TickReport::default();
        if self.state != MonitorState::Running {
            return Ok(report);
        }

        // Replies first, so a completed call frees the single-flight slot
        // for this tick's gate check.
        report.appended = self.drain_replies();

        let frame = self.source.next_frame()?;
        self.overlay.resize(frame.width, frame.height);

        if let Some(recorder) = self.recorder.as_mut() {
            recorder.record(&frame);
        }

        // Overlay rendering is independent of the detection path: estimator
        // errors clear the overlay and sampling continues regardless.
        if self.overlay.is_enabled() {
            match self.estimator.as_mut().map(|e| e.estimate(&frame)) {
                Some(Ok(Some(keypoints))) => {
                    self.overlay.render(&keypoints);
                    report.overlay_drawn = true;
                }
                Some(Ok(None)) => self.overlay.clear(),
                Some(Err(e)) => {
                    log::warn!("camera {}: pose estimation failed: {}", self.camera.id, e);
                    self.overlay.clear();
                }
                None => {}
            }
        }

        if self.feed_only {
            return Ok(report);
        }
        let Some(worker) = self.worker.as_ref() else {
            return Ok(report);
        };
        let job_tx = worker.job_tx.clone();

        let now = Instant::now();
        if self.scheduler.should_trigger(now) {
            let snapshot = self.capturer.capture(&frame);
            let evidence = match self.recorder.as_mut() {
                Some(recorder) => {
                    log::debug!(
                        "camera {}: clip buffer {} chunks ~{} KB",
                        self.camera.id,
                        recorder.len(),
                        recorder.memory_bytes() / 1024
                    );
                    let clip = recorder.take();
                    if clip.is_empty() {
                        snapshot.clone()
                    } else {
                        clip
                    }
                }
                None => snapshot.clone(),
            };

            // In-flight is claimed before the job leaves this tick, so a
            // subsequent tick cannot double-trigger.
            self.scheduler.begin(now);
            report.triggered = true;

            let job = InferenceJob {
                image: snapshot.bytes().to_vec(),
                location: self.camera.location.clone(),
                time_ms: frame.captured_at_ms,
                generation: self.generation,
                evidence,
            };
            match job_tx.try_send(job) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    // Single-flight should make this unreachable; release
                    // the slot rather than wedging the scheduler.
                    log::error!("camera {}: inference worker busy", self.camera.id);
                    self.scheduler.finish();
                }
                Err(TrySendError::Disconnected(_)) => {
                    log::error!(
                        "camera {}: inference worker gone; entering feed-only mode",
                        self.camera.id
                    );
                    self.scheduler.finish();
                    self.feed_only = true;
                }
            }
        }

        Ok(report)
    }

    /// Drain completed inference replies, synthesizing incidents from
    /// current-generation positives and discarding stale ones.
    fn drain_replies(&mut self) -> Vec<String> {
        use std::sync::mpsc::TryRecvError;

        let mut appended = Vec::new();
        let Some(worker) = self.worker.as_ref() else {
            return appended;
        };
        loop {
            let reply = match worker.reply_rx.try_recv() {
                Ok(reply) => reply,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    // Worker died mid-call; free the single-flight slot so
                    // the monitor degrades instead of wedging.
                    log::error!(
                        "camera {}: inference worker gone; entering feed-only mode",
                        self.camera.id
                    );
                    self.scheduler.finish();
                    self.feed_only = true;
                    break;
                }
            };
            if reply.generation != self.generation {
                log::debug!("camera {}: discarding stale inference reply", self.camera.id);
                continue;
            }
            self.scheduler.finish();
            match reply.outcome {
                Ok(outcome) => {
                    if outcome.is_positive() {
                        let mut store = match self.store.lock() {
                            Ok(store) => store,
                            Err(poisoned) => poisoned.into_inner(),
                        };
                        let ids = self.synthesizer.synthesize(
                            &outcome,
                            &self.camera,
                            reply.evidence,
                            reply.time_ms,
                            &mut store,
                        );
                        for id in &ids {
                            log::info!(
                                "camera {}: incident {} appended ({} total)",
                                self.camera.id,
                                id,
                                store.len()
                            );
                        }
                        appended.extend(ids);
                    }
                }
                Err(e) => {
                    // Failed attempt still counts as the last invocation;
                    // the rate limit is unaffected.
                    log::warn!("camera {}: inference call failed: {}", self.camera.id, e);
                }
            }
        }
        appended
    }

    /// Drive the tick loop until the shutdown flag flips or `max_ticks`
    /// elapse. Each tick sleeps out the remainder of its frame budget.
    pub fn run(&mut self, shutdown: &AtomicBool, max_ticks: Option<u64>) -> Result<u64> {
        let mut ticks = 0u64;
        while !shutdown.load(Ordering::SeqCst) {
            if let Some(max) = max_ticks {
                if ticks >= max {
                    break;
                }
            }
            if self.state != MonitorState::Running {
                break;
            }

            let tick_start = Instant::now();
            if let Err(e) = self.tick() {
                log::error!("camera {}: tick failed: {}", self.camera.id, e);
            }
            ticks += 1;

            let elapsed = tick_start.elapsed();
            if elapsed < self.settings.frame_budget {
                std::thread::sleep(self.settings.frame_budget - elapsed);
            }
        }
        Ok(ticks)
    }

    /// Deterministic teardown: no further overlay draws, scheduler checks,
    /// or store mutations happen after this returns, even if an in-flight
    /// call resolves later.
    pub fn shutdown(&mut self) {
        if self.state == MonitorState::Stopped {
            return;
        }
        self.state = MonitorState::Stopped;

        // Anything still in flight is stale from here on.
        self.generation = self.generation.wrapping_add(1);
        self.scheduler.reset();

        if let Some(recorder) = self.recorder.as_mut() {
            recorder.stop();
        }
        self.source.release();
        self.overlay.clear();

        if let Some(worker) = self.worker.take() {
            worker.stop();
        }
        log::info!("camera {}: monitor stopped", self.camera.id);
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.shutdown();
    }
}
