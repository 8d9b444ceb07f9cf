#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use opencv::core::Scalar;
use opencv::core::CV_8UC3;
use opencv::prelude::Mat;
use plate_gate::plate_detection::FrameDisplay;
use plate_gate::plate_detection::FrameSource;
use plate_gate::plate_detection::PlateIdentifier;
use plate_gate::plate_detection::Region;
use plate_gate::plate_detection::TextRecognizer;
use plate_gate::utils::Clock;
use plate_gate::DeviceOpener;
use plate_gate::PlateEntry;
use plate_gate::PlateError;
use plate_gate::PlateRecord;
use plate_gate::PlateRegistry;
use plate_gate::RegistryError;
use plate_gate::SessionDevices;

pub fn frame() -> Mat {
    Mat::new_rows_cols_with_default(480, 640, CV_8UC3, Scalar::all(128.0)).unwrap()
}

pub fn frame_of(rows: i32, cols: i32, typ: i32) -> Mat {
    Mat::new_rows_cols_with_default(rows, cols, typ, Scalar::all(128.0)).unwrap()
}

pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(Instant::now()),
        })
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap()
    }
}

/// Hands out `count` frames, then reports the device as lost.
pub struct ScriptedSource {
    remaining: usize,
    clock: Option<Arc<ManualClock>>,
    step: Duration,
    pause: Duration,
}

impl ScriptedSource {
    pub fn frames(count: usize) -> Self {
        Self {
            remaining: count,
            clock: None,
            step: Duration::ZERO,
            pause: Duration::ZERO,
        }
    }

    pub fn endless() -> Self {
        Self::frames(usize::MAX).pausing(Duration::from_millis(2))
    }

    /// Advances `clock` by `step` before every frame.
    pub fn on_clock(mut self, clock: Arc<ManualClock>, step: Duration) -> Self {
        self.clock = Some(clock);
        self.step = step;
        self
    }

    pub fn pausing(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }
}

impl FrameSource for ScriptedSource {
    fn read(&mut self) -> Result<Mat, PlateError> {
        if self.remaining == 0 {
            return Err(PlateError::capture("camera unplugged"));
        }
        self.remaining -= 1;
        if let Some(clock) = &self.clock {
            clock.advance(self.step);
        }
        if !self.pause.is_zero() {
            thread::sleep(self.pause);
        }
        Ok(frame())
    }
}

#[derive(Clone, Default)]
pub struct DisplayProbe {
    pub shown: Arc<AtomicUsize>,
    pub annotated: Arc<AtomicUsize>,
}

impl DisplayProbe {
    pub fn shown(&self) -> usize {
        self.shown.load(Ordering::SeqCst)
    }

    pub fn annotated(&self) -> usize {
        self.annotated.load(Ordering::SeqCst)
    }
}

pub struct CountingDisplay {
    probe: DisplayProbe,
    quit_after: Option<usize>,
}

impl CountingDisplay {
    pub fn new(probe: DisplayProbe) -> Self {
        Self {
            probe,
            quit_after: None,
        }
    }

    pub fn quitting_after(probe: DisplayProbe, frames: usize) -> Self {
        Self {
            probe,
            quit_after: Some(frames),
        }
    }
}

impl FrameDisplay for CountingDisplay {
    fn show(&mut self, _frame: &Mat, region: Option<&Region>) -> Result<(), PlateError> {
        self.probe.shown.fetch_add(1, Ordering::SeqCst);
        if region.is_some() {
            self.probe.annotated.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn quit_requested(&mut self) -> Result<bool, PlateError> {
        Ok(self
            .quit_after
            .is_some_and(|limit| self.probe.shown() >= limit))
    }
}

/// Replays scripted results, then keeps returning `fallback`.
pub struct ScriptedRecognizer {
    script: VecDeque<Result<String, PlateError>>,
    fallback: String,
    calls: Arc<AtomicUsize>,
}

impl ScriptedRecognizer {
    pub fn always(text: &str) -> (Self, Arc<AtomicUsize>) {
        Self::script(text, Vec::new())
    }

    pub fn script(
        fallback: &str,
        script: Vec<Result<String, PlateError>>,
    ) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                script: script.into(),
                fallback: fallback.to_string(),
                calls: calls.clone(),
            },
            calls,
        )
    }
}

impl TextRecognizer for ScriptedRecognizer {
    fn recognize(&mut self, image: &Mat) -> Result<String, PlateError> {
        use opencv::prelude::MatTraitConst;
        assert_eq!(image.channels(), 1, "recognizer expects a binarized image");
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .pop_front()
            .unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}

/// Registry whose backing store is gone.
pub struct OfflineRegistry;

impl PlateRegistry for OfflineRegistry {
    fn lookup(&self, _plate: &PlateIdentifier) -> Result<Option<PlateRecord>, RegistryError> {
        Err(RegistryError::Unavailable("database offline".to_string()))
    }

    fn insert(&self, _entry: PlateEntry) -> Result<u64, RegistryError> {
        Err(RegistryError::Unavailable("database offline".to_string()))
    }

    fn update(&self, _id: u64, _entry: PlateEntry) -> Result<(), RegistryError> {
        Err(RegistryError::Unavailable("database offline".to_string()))
    }

    fn delete(&self, _id: u64) -> Result<(), RegistryError> {
        Err(RegistryError::Unavailable("database offline".to_string()))
    }

    fn list_all(&self) -> Result<Vec<PlateRecord>, RegistryError> {
        Err(RegistryError::Unavailable("database offline".to_string()))
    }
}

/// Hands out prepared devices in order; fails to open once they run out.
#[derive(Default)]
pub struct QueuedOpener {
    devices: Mutex<VecDeque<SessionDevices>>,
}

impl QueuedOpener {
    pub fn push(&self, source: impl FrameSource + 'static, display: impl FrameDisplay + 'static) {
        self.devices.lock().unwrap().push_back(SessionDevices {
            source: Box::new(source),
            display: Box::new(display),
        });
    }
}

impl DeviceOpener for QueuedOpener {
    fn open(&self) -> Result<SessionDevices, PlateError> {
        self.devices
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| PlateError::capture("camera 0 is not available"))
    }
}
