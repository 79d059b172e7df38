//! Error types for the event bus.

use thiserror::Error;

/// Errors surfaced by bus construction.
///
/// Registration, publishing and delivery never fail from the caller's point
/// of view; delivery problems are reported as [`DeliveryError`] on the
/// dispatch thread and handled there.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("Failed to spawn dispatch thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Failure returned by a receiver while handling one event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// The receiver cannot accept the delivered payload shape.
    /// The receiver stays registered.
    #[error("Payload mismatch: {0}")]
    Mismatch(String),

    /// The receiver failed internally. The receiver is evicted.
    #[error("Receiver fault: {0}")]
    Fault(String),

    /// The receiver's target has been dropped. The receiver is evicted.
    #[error("Receiver target is gone")]
    TargetGone,
}

impl DeliveryError {
    /// Build a [`DeliveryError::Mismatch`] from anything printable.
    pub fn mismatch(msg: impl std::fmt::Display) -> Self {
        DeliveryError::Mismatch(msg.to_string())
    }

    /// Build a [`DeliveryError::Fault`] from anything printable.
    pub fn fault(msg: impl std::fmt::Display) -> Self {
        DeliveryError::Fault(msg.to_string())
    }

    /// Whether this failure should evict the receiver.
    pub fn is_fault(&self) -> bool {
        !matches!(self, DeliveryError::Mismatch(_))
    }

    /// Short label used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            DeliveryError::Mismatch(_) => "mismatch",
            DeliveryError::Fault(_) => "fault",
            DeliveryError::TargetGone => "target_gone",
        }
    }
}

impl From<serde_json::Error> for DeliveryError {
    fn from(e: serde_json::Error) -> Self {
        DeliveryError::Mismatch(e.to_string())
    }
}

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;
