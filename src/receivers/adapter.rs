//! Receivers built from callbacks declared on a target object.

use super::receiver::Receiver;
use crate::error::DeliveryError;
use crate::types::{EventData, EventName, TargetKey};
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::{Arc, Weak};

type NameOnlyFn<T> = dyn Fn(&T, &str) -> Result<(), DeliveryError> + Send + Sync;
type NameAndPayloadFn<T> = dyn Fn(&T, &str, &EventData) -> Result<(), DeliveryError> + Send + Sync;

/// A callback declared on a target, tagged by how many arguments it takes.
pub enum Callback<T> {
    /// Receives only the event name.
    NameOnly(Arc<NameOnlyFn<T>>),
    /// Receives the event name and payload.
    NameAndPayload(Arc<NameAndPayloadFn<T>>),
}

impl<T> Callback<T> {
    /// 1 for name-only callbacks, 2 for name-and-payload callbacks.
    pub fn arity(&self) -> usize {
        match self {
            Callback::NameOnly(_) => 1,
            Callback::NameAndPayload(_) => 2,
        }
    }
}

impl<T> Clone for Callback<T> {
    fn clone(&self) -> Self {
        match self {
            Callback::NameOnly(f) => Callback::NameOnly(Arc::clone(f)),
            Callback::NameAndPayload(f) => Callback::NameAndPayload(Arc::clone(f)),
        }
    }
}

impl<T> fmt::Debug for Callback<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callback(arity={})", self.arity())
    }
}

/// One callback declaration: which events it wants and what to call.
///
/// An empty `names` list subscribes the callback to every event.
pub struct CallbackSpec<T> {
    pub names: Vec<EventName>,
    pub callback: Callback<T>,
}

impl<T: Send + Sync + 'static> CallbackSpec<T> {
    /// A callback that only receives the event name.
    pub fn name_only<I, S, F>(names: I, f: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<EventName>,
        F: Fn(&T, &str) -> Result<(), DeliveryError> + Send + Sync + 'static,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            callback: Callback::NameOnly(Arc::new(f)),
        }
    }

    /// A callback that receives the event name and raw payload.
    pub fn with_payload<I, S, F>(names: I, f: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<EventName>,
        F: Fn(&T, &str, &EventData) -> Result<(), DeliveryError> + Send + Sync + 'static,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            callback: Callback::NameAndPayload(Arc::new(f)),
        }
    }

    /// A callback whose payload is decoded into `P` before the call.
    ///
    /// Payloads that do not decode are declined as a mismatch, so the
    /// callback stays registered for events it can accept.
    pub fn typed<P, I, S, F>(names: I, f: F) -> Self
    where
        P: DeserializeOwned,
        I: IntoIterator<Item = S>,
        S: Into<EventName>,
        F: Fn(&T, &str, P) -> Result<(), DeliveryError> + Send + Sync + 'static,
    {
        Self::with_payload(names, move |target: &T, name: &str, data: &EventData| {
            let arg = data.decode::<P>()?;
            f(target, name, arg)
        })
    }
}

impl<T> fmt::Debug for CallbackSpec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackSpec")
            .field("names", &self.names)
            .field("callback", &self.callback)
            .finish()
    }
}

/// An object that declares its own event callbacks.
///
/// The declared list must be deterministic for a given object: the bus uses
/// the position of each `CallbackSpec` to keep re-registration idempotent.
pub trait EventTarget: Send + Sync + Sized + 'static {
    fn event_callbacks(&self) -> Vec<CallbackSpec<Self>>;
}

/// Receiver that forwards to a callback on a weakly held target.
///
/// Being registered never keeps the target alive. Once the target is dropped
/// every invocation fails with [`DeliveryError::TargetGone`] and the bus
/// evicts the receiver.
pub struct CallbackReceiver<T> {
    target: Weak<T>,
    callback: Callback<T>,
    label: String,
}

impl<T: Send + Sync + 'static> CallbackReceiver<T> {
    pub fn new(target: &Arc<T>, callback: Callback<T>) -> Self {
        Self {
            target: Arc::downgrade(target),
            label: format!("{}/{}", std::any::type_name::<T>(), callback.arity()),
            callback,
        }
    }

    /// Override the label used in log fields.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Identity of the wrapped target, valid even after it is dropped.
    pub fn target_key(&self) -> TargetKey {
        TargetKey::of_weak(&self.target)
    }

    /// The target, if it is still alive.
    pub fn target(&self) -> Option<Arc<T>> {
        self.target.upgrade()
    }

    pub fn arity(&self) -> usize {
        self.callback.arity()
    }
}

impl<T: Send + Sync + 'static> Receiver for CallbackReceiver<T> {
    fn on_event(&self, name: &str, data: &EventData) -> Result<(), DeliveryError> {
        let target = self.target.upgrade().ok_or(DeliveryError::TargetGone)?;
        match &self.callback {
            Callback::NameOnly(f) => f(&*target, name),
            Callback::NameAndPayload(f) => f(&*target, name, data),
        }
    }

    fn label(&self) -> String {
        self.label.clone()
    }

    fn is_stale(&self) -> bool {
        self.target.strong_count() == 0
    }
}

impl<T> fmt::Debug for CallbackReceiver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackReceiver")
            .field("label", &self.label)
            .field("callback", &self.callback)
            .field("alive", &(self.target.strong_count() > 0))
            .finish()
    }
}
