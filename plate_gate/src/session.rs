use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::thread;
use std::thread::JoinHandle;

use crossbeam::atomic::AtomicCell;
use crossbeam::channel::Receiver;
use tracing::error;
use tracing::info;

use crate::decision::RecognitionEvent;
use crate::decision::ScanContext;
use crate::decision::ScanLoop;
use crate::decision::SessionDevices;
use crate::decision::SessionExit;
use crate::error::PlateError;
use crate::status::LoopState;
use crate::status::Severity;
use crate::status::Status;

/// Cooperative stop flag, checked once per loop iteration.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Opens the capture device and preview for a new session.
pub trait DeviceOpener: Send + Sync {
    fn open(&self) -> Result<SessionDevices, PlateError>;
}

pub enum StartOutcome {
    Started(SessionHandle),
    AlreadyRunning,
    SpawnFailed(std::io::Error),
}

pub struct SessionHandle {
    token: CancellationToken,
    worker: JoinHandle<SessionExit>,
}

impl SessionHandle {
    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn join(self) -> SessionExit {
        self.worker.join().unwrap_or(SessionExit::Panicked)
    }
}

/// Runs at most one scanning session at a time on a background thread.
pub struct Gate {
    ctx: ScanContext,
    opener: Arc<dyn DeviceOpener>,
    active: Arc<AtomicBool>,
    current: Mutex<Option<CancellationToken>>,
}

impl Gate {
    pub fn new(ctx: ScanContext, opener: Arc<dyn DeviceOpener>) -> Self {
        Self {
            ctx,
            opener,
            active: Arc::new(AtomicBool::new(false)),
            current: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> LoopState {
        self.ctx.state()
    }

    pub fn events(&self) -> Receiver<RecognitionEvent> {
        self.ctx.events()
    }

    pub fn start(&self) -> StartOutcome {
        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            info!("Scanner is already running");
            return StartOutcome::AlreadyRunning;
        }

        let token = CancellationToken::default();
        let guard = ActiveGuard {
            active: self.active.clone(),
            state: self.ctx.state.clone(),
        };
        let ctx = self.ctx.clone();
        let opener = self.opener.clone();
        let session_token = token.clone();
        let spawned = thread::Builder::new()
            .name("plate-scanner".to_string())
            .spawn(move || {
                let _guard = guard;
                run_session(&ctx, opener.as_ref(), &session_token)
            });

        match spawned {
            Ok(worker) => {
                if let Ok(mut current) = self.current.lock() {
                    *current = Some(token.clone());
                }
                StartOutcome::Started(SessionHandle { token, worker })
            }
            Err(err) => {
                error!(%err, "Cannot spawn scanner thread");
                self.ctx.publish(Status::new(
                    LoopState::Error,
                    Severity::Error,
                    format!("Cannot start scanner: {err}"),
                ));
                StartOutcome::SpawnFailed(err)
            }
        }
    }

    /// Asks the running session, if any, to stop after its current iteration.
    pub fn stop(&self) {
        if let Ok(mut current) = self.current.lock() {
            if let Some(token) = current.take() {
                token.cancel();
            }
        }
    }
}

fn run_session(
    ctx: &ScanContext,
    opener: &dyn DeviceOpener,
    token: &CancellationToken,
) -> SessionExit {
    ctx.publish(Status::new(
        LoopState::Starting,
        Severity::Info,
        "Starting camera...",
    ));

    let devices = match opener.open() {
        Ok(devices) => devices,
        Err(err) => {
            ctx.fail("Cannot access camera", &err);
            return SessionExit::Failed(err);
        }
    };

    ctx.publish(Status::new(
        LoopState::Scanning,
        Severity::Info,
        "Camera on. Show the plate...",
    ));

    let exit = {
        let mut scan = ScanLoop::new(ctx.clone(), devices);
        match scan.run(token) {
            Ok(exit) => exit,
            Err(err) => SessionExit::Failed(err),
        }
    };

    if !matches!(exit, SessionExit::Failed(_)) {
        ctx.publish(Status::new(LoopState::Idle, Severity::Info, "Camera off."));
    }
    exit
}

/// Clears the run flag however the session thread ends.
struct ActiveGuard {
    active: Arc<AtomicBool>,
    state: Arc<AtomicCell<LoopState>>,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.state.store(LoopState::Idle);
        self.active.store(false, Ordering::SeqCst);
    }
}
