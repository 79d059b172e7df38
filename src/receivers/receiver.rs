//! The receiver capability.

use crate::error::DeliveryError;
use crate::types::EventData;
use std::fmt;
use std::sync::Arc;

/// Something that can be handed events by the bus.
///
/// Receivers are always invoked on the bus's dispatch thread, one at a time,
/// so an implementation never races another receiver. Keep `on_event` short:
/// a receiver that blocks stalls delivery for every later event.
pub trait Receiver: Send + Sync + 'static {
    /// Handle one event.
    ///
    /// Return [`DeliveryError::Mismatch`] to decline a payload shape and stay
    /// registered. Any other error unregisters the receiver.
    fn on_event(&self, name: &str, data: &EventData) -> Result<(), DeliveryError>;

    /// Name used in log fields. Defaults to the type name.
    fn label(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }

    /// Whether the receiver can no longer deliver anything.
    ///
    /// Stale receivers are removed by [`EventBus::purge_stale`](crate::EventBus::purge_stale).
    fn is_stale(&self) -> bool {
        false
    }
}

/// Shared handle to a registered receiver.
pub type ReceiverRef = Arc<dyn Receiver>;

/// A receiver backed by a closure.
pub struct FnReceiver<F> {
    f: F,
    label: String,
}

impl<F> FnReceiver<F>
where
    F: Fn(&str, &EventData) -> Result<(), DeliveryError> + Send + Sync + 'static,
{
    pub fn new(label: impl Into<String>, f: F) -> Self {
        Self {
            f,
            label: label.into(),
        }
    }
}

impl<F> Receiver for FnReceiver<F>
where
    F: Fn(&str, &EventData) -> Result<(), DeliveryError> + Send + Sync + 'static,
{
    fn on_event(&self, name: &str, data: &EventData) -> Result<(), DeliveryError> {
        (self.f)(name, data)
    }

    fn label(&self) -> String {
        self.label.clone()
    }
}

impl<F> fmt::Debug for FnReceiver<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnReceiver")
            .field("label", &self.label)
            .finish()
    }
}

/// Wrap a closure as a shareable receiver.
pub fn receiver_fn<F>(label: impl Into<String>, f: F) -> ReceiverRef
where
    F: Fn(&str, &EventData) -> Result<(), DeliveryError> + Send + Sync + 'static,
{
    Arc::new(FnReceiver::new(label, f))
}
