pub mod backend;
pub mod bridge;
pub mod cdp;
pub mod error;
pub mod remote_value;
pub mod signal;

pub use backend::HeadlessHost;
pub use error::HostBackendError;
pub use signal::{PageSignal, SignalDispatcher};
