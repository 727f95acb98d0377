//! Traffic interception
//!
//! The installer hooks session construction, sessions send through a
//! [`RecordingTransport`], and the recorder turns each exchange into a log entry.

mod installer;
mod recorder;
mod session;
mod transport;

pub use installer::{InterceptionInstaller, DEFAULT_OPT_OUT_MARKER};
pub use recorder::{ExchangeRecorder, RecordHandle};
pub use session::{
    EntryPoint, InstallError, Session, SessionConfig, SessionConstructor, SessionFactory,
    SessionHook,
};
pub use transport::{
    RecordingTransport, ReqwestTransport, Transport, TransportError, TransportFuture,
    TransportResult,
};
