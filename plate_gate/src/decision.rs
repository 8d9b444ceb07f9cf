//! The scan loop: frame in, status and access decision out.
//!
//! Each iteration forwards the frame to the preview, then, at most once per
//! debounce interval, runs region extraction, preprocessing, recognition and a
//! registry lookup. Granted and Denied are published and the loop drops back
//! to Scanning on the next iteration.

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;
use std::time::SystemTime;

use crossbeam::atomic::AtomicCell;
use crossbeam::channel;
use crossbeam::channel::Receiver;
use crossbeam::channel::Sender;
use crossbeam::channel::TrySendError;
use opencv::prelude::Mat;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::trace;
use tracing::warn;

use crate::error::PlateError;
use crate::metrics;
use crate::plate_detection::extract_region;
use crate::plate_detection::normalize_plate;
use crate::plate_detection::preprocess;
use crate::plate_detection::FrameDisplay;
use crate::plate_detection::FrameSource;
use crate::plate_detection::PlateIdentifier;
use crate::plate_detection::PreprocessParams;
use crate::plate_detection::Region;
use crate::plate_detection::RegionGeometry;
use crate::plate_detection::TextRecognizer;
use crate::registry::PlateRegistry;
use crate::session::CancellationToken;
use crate::status::LoopState;
use crate::status::Severity;
use crate::status::Status;
use crate::status::StatusPublisher;
use crate::utils::Clock;
use crate::utils::Debouncer;
use crate::utils::SystemClock;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(600);
const EVENT_BACKLOG: usize = 64;

pub type SharedRecognizer = Arc<Mutex<Box<dyn TextRecognizer>>>;

pub fn shared_recognizer(recognizer: impl TextRecognizer + 'static) -> SharedRecognizer {
    let recognizer: Box<dyn TextRecognizer> = Box::new(recognizer);
    Arc::new(Mutex::new(recognizer))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Granted,
    Denied,
}

impl Outcome {
    fn label(self) -> &'static str {
        match self {
            Outcome::Granted => "granted",
            Outcome::Denied => "denied",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionEvent {
    pub identifier: PlateIdentifier,
    pub timestamp: SystemTime,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The frame was only displayed.
    Debounced,
    /// Recognition ran but produced no identifier.
    NoPlate,
    Decided(RecognitionEvent),
}

#[derive(Debug)]
pub enum SessionExit {
    Stopped,
    Quit,
    Failed(PlateError),
    Panicked,
}

/// Devices owned by one session, released when it ends.
pub struct SessionDevices {
    pub source: Box<dyn FrameSource>,
    pub display: Box<dyn FrameDisplay>,
}

/// Everything a session needs besides its devices. Cheap to clone.
#[derive(Clone)]
pub struct ScanContext {
    recognizer: SharedRecognizer,
    registry: Arc<dyn PlateRegistry>,
    clock: Arc<dyn Clock>,
    geometry: RegionGeometry,
    params: PreprocessParams,
    debounce: Duration,
    status: StatusPublisher,
    pub(crate) state: Arc<AtomicCell<LoopState>>,
    events_tx: Sender<RecognitionEvent>,
    events_rx: Receiver<RecognitionEvent>,
}

impl ScanContext {
    pub fn new(
        recognizer: SharedRecognizer,
        registry: Arc<dyn PlateRegistry>,
        status: StatusPublisher,
    ) -> Self {
        let (events_tx, events_rx) = channel::bounded(EVENT_BACKLOG);
        Self {
            recognizer,
            registry,
            clock: Arc::new(SystemClock),
            geometry: RegionGeometry::default(),
            params: PreprocessParams::default(),
            debounce: DEFAULT_DEBOUNCE,
            status,
            state: Arc::new(AtomicCell::new(LoopState::Idle)),
            events_tx,
            events_rx,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_geometry(mut self, geometry: RegionGeometry) -> Self {
        self.geometry = geometry;
        self
    }

    pub fn with_params(mut self, params: PreprocessParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn state(&self) -> LoopState {
        self.state.load()
    }

    /// Decisions as they are made. Events nobody reads are dropped.
    pub fn events(&self) -> Receiver<RecognitionEvent> {
        self.events_rx.clone()
    }

    pub(crate) fn set_state(&self, state: LoopState) {
        let previous = self.state.swap(state);
        if previous != state {
            trace!(?previous, ?state, "State change");
        }
    }

    pub(crate) fn publish(&self, status: Status) {
        info!(state = ?status.state, severity = ?status.severity, "{status}");
        self.set_state(status.state);
        self.status.publish(status);
    }

    pub(crate) fn fail(&self, prefix: &str, err: &PlateError) {
        error!(kind = err.kind(), %err, "{prefix}");
        metrics::CYCLE_ERRORS.with_label_values(&[err.kind()]).inc();
        self.publish(Status::new(
            LoopState::Error,
            Severity::Error,
            format!("{prefix}: {err}"),
        ));
    }
}

pub struct ScanLoop {
    ctx: ScanContext,
    devices: SessionDevices,
    debouncer: Debouncer,
}

impl ScanLoop {
    pub fn new(ctx: ScanContext, devices: SessionDevices) -> Self {
        let debouncer = Debouncer::new(ctx.debounce);
        Self {
            ctx,
            devices,
            debouncer,
        }
    }

    /// Runs until the token is cancelled, the operator quits, or a fatal error.
    pub fn run(&mut self, token: &CancellationToken) -> Result<SessionExit, PlateError> {
        self.ctx.set_state(LoopState::Scanning);
        let result = self.run_frames(token);
        if let Err(err) = &result {
            self.ctx.fail("Scanning stopped", err);
        }
        result
    }

    fn run_frames(&mut self, token: &CancellationToken) -> Result<SessionExit, PlateError> {
        loop {
            if token.is_cancelled() {
                info!("Stop requested");
                return Ok(SessionExit::Stopped);
            }

            let frame = self.devices.source.read()?;
            self.step(&frame)?;

            if self.devices.display.quit_requested()? {
                info!("Quit requested from the preview");
                return Ok(SessionExit::Quit);
            }
        }
    }

    /// One iteration on an already captured frame.
    pub fn step(&mut self, frame: &Mat) -> Result<CycleOutcome, PlateError> {
        self.ctx.set_state(LoopState::Scanning);

        let region = Region::for_frame(frame, self.ctx.geometry);
        self.devices.display.show(frame, region.as_ref().ok())?;
        metrics::FRAMES_DISPLAYED.inc();

        if !self.debouncer.ready(self.ctx.clock.now()) {
            return Ok(CycleOutcome::Debounced);
        }
        metrics::RECOGNITION_ATTEMPTS.inc();

        let image = match region
            .and_then(|region| extract_region(frame, &region))
            .and_then(|roi| preprocess(&roi, &self.ctx.params))
        {
            Ok(image) => image,
            Err(err) if !err.is_fatal() => {
                warn!(kind = err.kind(), %err, "Skipping cycle");
                metrics::CYCLE_ERRORS.with_label_values(&[err.kind()]).inc();
                return Ok(CycleOutcome::NoPlate);
            }
            Err(err) => return Err(err),
        };

        let raw = self.recognize(&image)?;
        let identifier = normalize_plate(Some(&raw));
        if identifier.is_empty() {
            trace!(raw = raw.as_str(), "No plate in window");
            return Ok(CycleOutcome::NoPlate);
        }

        Ok(CycleOutcome::Decided(self.decide(identifier)))
    }

    fn recognize(&mut self, image: &Mat) -> Result<String, PlateError> {
        let mut recognizer = self
            .ctx
            .recognizer
            .lock()
            .map_err(|_| PlateError::recognition("recognizer lock poisoned"))?;
        let started = Instant::now();
        let raw = recognizer.recognize(image);
        metrics::RECOGNITION_SECONDS.observe(started.elapsed().as_secs_f64());
        raw
    }

    fn decide(&mut self, identifier: PlateIdentifier) -> RecognitionEvent {
        let (outcome, status) = match self.ctx.registry.lookup(&identifier) {
            Ok(Some(record)) => {
                debug!(plate = %identifier, owner = record.owner.as_str(), "Registered plate");
                (
                    Outcome::Granted,
                    Status::new(
                        LoopState::Granted,
                        Severity::Granted,
                        format!("GRANTED ({identifier})"),
                    ),
                )
            }
            Ok(None) => (
                Outcome::Denied,
                Status::new(
                    LoopState::Denied,
                    Severity::Denied,
                    format!("NOT RECOGNIZED ({identifier})"),
                ),
            ),
            Err(err) => {
                warn!(plate = %identifier, %err, "Lookup failed, denying");
                metrics::CYCLE_ERRORS.with_label_values(&["registry"]).inc();
                (
                    Outcome::Denied,
                    Status::new(
                        LoopState::Error,
                        Severity::Error,
                        format!("REGISTRY UNAVAILABLE ({identifier}): {err}"),
                    ),
                )
            }
        };

        metrics::DECISIONS.with_label_values(&[outcome.label()]).inc();
        self.ctx.publish(status);

        let event = RecognitionEvent {
            identifier,
            timestamp: SystemTime::now(),
            outcome,
        };
        match self.ctx.events_tx.try_send(event.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => debug!("Event backlog full, dropping event"),
            Err(TrySendError::Disconnected(_)) => {}
        }
        event
    }
}
