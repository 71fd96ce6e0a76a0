//! # Error Types
//!
//! This module defines error types used throughout the panelstream library.
//!
//! ## Propagation Policy
//!
//! - [`PanelError::Connection`] is surfaced synchronously from
//!   `DeviceManager::connect` and nowhere else.
//! - Transmit failures inside one scheduler tick are logged and absorbed;
//!   the next tick is attempted regardless.
//! - Sensor decode failures never escape the poller loop iteration; the
//!   snapshot keeps its last-known-good values.

use thiserror::Error;

/// Main error type for panelstream operations
#[derive(Debug, Error)]
pub enum PanelError {
    /// Device open or handshake failure (recoverable, connection abandoned)
    #[error("Connection error: {0}")]
    Connection(String),

    /// Protocol violation, or an operation attempted on an unverified driver
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// HID layer error wrapper
    #[error("HID error: {0}")]
    Hid(#[from] hidapi::HidError),

    /// Sensor subprocess produced undecodable data
    #[error("Decode error: {0}")]
    Decode(String),

    /// Frame rendering or encoding error
    #[error("Render error: {0}")]
    Render(String),

    /// I/O error wrapper (mid-stream transmit failures land here)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, PanelError>;
