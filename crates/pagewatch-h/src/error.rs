use thiserror::Error;

#[derive(Debug, Error)]
pub enum HostBackendError {
    #[error("Failed to launch browser: {0}")]
    Launch(String),
    #[error("CDP error: {0}")]
    Cdp(#[from] chromiumoxide::error::CdpError),
    #[error("Navigation failed: {0}")]
    Navigation(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Headless host is not running")]
    NotReady,
}
