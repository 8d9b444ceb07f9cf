//! License plate access gate: reads plates from a live feed and grants or
//! denies access against a registry of authorized plates.

pub mod decision;
pub mod devices;
pub mod error;
pub mod metrics;
pub mod plate_detection;
pub mod registry;
pub mod session;
pub mod settings;
pub mod status;
pub mod utils;

pub use decision::shared_recognizer;
pub use decision::CycleOutcome;
pub use decision::Outcome;
pub use decision::RecognitionEvent;
pub use decision::ScanContext;
pub use decision::ScanLoop;
pub use decision::SessionDevices;
pub use decision::SessionExit;
pub use decision::SharedRecognizer;
pub use error::PlateError;
pub use error::RegistryError;
pub use registry::FileRegistry;
pub use registry::MemoryRegistry;
pub use registry::PlateEntry;
pub use registry::PlateRecord;
pub use registry::PlateRegistry;
pub use session::CancellationToken;
pub use session::DeviceOpener;
pub use session::Gate;
pub use session::SessionHandle;
pub use session::StartOutcome;
pub use status::status_channel;
pub use status::LoopState;
pub use status::Severity;
pub use status::Status;
pub use status::StatusPublisher;
pub use status::StatusReader;
