//! Error types for the bridge.

use crate::bridge::BridgeState;
use thiserror::Error;

/// Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Errors that can occur in bridge operations.
///
/// Startup-phase errors (`Resolution`, `Enrollment`) are fatal to `start()`
/// and leave the bridge in `Failed`. Steady-state errors (`SyncIo`, `Codec`)
/// are contained to the failing item and never surface on the lifecycle API.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Device model lookup failed (unreachable endpoint, unknown urn, or
    /// the activation is not yet authorized).
    #[error("model resolution failed: {0}")]
    Resolution(String),

    /// Identity enrollment was rejected by the remote registry.
    #[error("enrollment failed: {0}")]
    Enrollment(String),

    /// A single read/write/invoke/batch-send failed during steady state.
    #[error("sync I/O error: {0}")]
    SyncIo(String),

    /// Content could not be decoded or encoded at the codec boundary.
    #[error("codec error: {0}")]
    Codec(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A lifecycle operation was called in the wrong state.
    #[error("bridge is {actual}, expected {expected}")]
    InvalidState {
        /// The state the operation requires.
        expected: BridgeState,
        /// The state the bridge is actually in.
        actual: BridgeState,
    },

    /// Channel closed.
    #[error("channel closed")]
    ChannelClosed,
}
