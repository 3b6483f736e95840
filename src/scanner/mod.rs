//! BLE scanner backends.
//!
//! Both backends deliver [`AdFields`] through a channel; decoding against
//! vendor layouts happens downstream, keyed by the configured brand of the
//! advertiser. A [`Scan`] also carries a control handle so the reporting
//! loop can nudge the radio back into scanning once per period.

#[cfg(feature = "bluer")]
pub mod bluer;

#[cfg(feature = "hci")]
pub mod hci;

use crate::gap::AdFields;
use thiserror::Error;
use tokio::sync::mpsc;

/// Error type for scanner operations.
#[derive(Error, Debug)]
pub enum ScanError {
    /// Bluetooth/adapter related error
    #[error("Bluetooth error: {0}")]
    Bluetooth(String),
    /// Backend not available (not compiled in)
    #[allow(dead_code)]
    #[error("Backend '{0}' not available (not compiled in)")]
    BackendNotAvailable(String),
}

/// Channel buffer size for advertisement events.
pub const EVENT_CHANNEL_BUFFER_SIZE: usize = 100;

/// Handle for keeping a scan alive across reporting periods.
///
/// Some controllers silently stop reporting advertisements after a while;
/// re-issuing the scan-enable sequence each period recovers them. A failed
/// restart is worth logging but never fatal.
pub trait ScanControl: Send {
    fn restart(&self) -> Result<(), ScanError>;
}

/// An active scan: the advertisement stream plus its control handle.
pub struct Scan {
    pub events: mpsc::Receiver<AdFields>,
    pub control: Box<dyn ScanControl>,
}

/// Available scanner backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Backend {
    /// BlueZ D-Bus backend (requires bluetoothd daemon)
    #[cfg(feature = "bluer")]
    Bluer,
    /// Raw HCI socket backend (direct kernel access, no daemon required)
    #[cfg(feature = "hci")]
    Hci,
}

impl Default for Backend {
    fn default() -> Self {
        #[cfg(feature = "bluer")]
        return Backend::Bluer;
        #[cfg(all(feature = "hci", not(feature = "bluer")))]
        return Backend::Hci;
        #[cfg(not(any(feature = "bluer", feature = "hci")))]
        compile_error!("At least one backend feature must be enabled");
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            #[cfg(feature = "bluer")]
            Backend::Bluer => write!(f, "bluer"),
            #[cfg(feature = "hci")]
            Backend::Hci => write!(f, "hci"),
            #[cfg(not(any(feature = "bluer", feature = "hci")))]
            _ => unreachable!("Backend enum has no variants when no backend features are enabled"),
        }
    }
}

impl std::str::FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            #[cfg(feature = "bluer")]
            "bluer" | "bluez" => Ok(Backend::Bluer),
            #[cfg(feature = "hci")]
            "hci" | "raw" => Ok(Backend::Hci),
            _ => Err(format!("Unknown backend: {}", s)),
        }
    }
}

/// Start scanning on the given adapter using the specified backend.
///
/// This is the main entry point for creating a scanner. It dispatches to
/// the appropriate backend implementation based on the `backend` parameter.
pub async fn start_scan(backend: Backend, adapter: u16) -> Result<Scan, ScanError> {
    match backend {
        #[cfg(feature = "bluer")]
        Backend::Bluer => bluer::start_scan(adapter).await,
        #[cfg(feature = "hci")]
        Backend::Hci => hci::start_scan(adapter).await,
    }
}
