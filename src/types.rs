//! Core types for the event bus.

use crate::error::DeliveryError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Weak};

/// An opaque payload value.
pub type Value = serde_json::Value;

/// Event names are case-sensitive and never normalized.
pub type EventName = String;

/// Values attached to one publish call.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Payload(pub Vec<Value>);

impl Payload {
    /// A payload with no values.
    pub fn empty() -> Self {
        Payload(Vec::new())
    }

    pub fn new(values: Vec<Value>) -> Self {
        Payload(values)
    }

    /// Number of attached values.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Convert into the shape handed to receivers.
    pub fn into_data(self) -> EventData {
        let mut values = self.0;
        match values.len() {
            0 => EventData::None,
            1 => EventData::One(values.remove(0)),
            _ => EventData::Many(values),
        }
    }
}

impl From<()> for Payload {
    fn from(_: ()) -> Self {
        Payload::empty()
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload(vec![value])
    }
}

/// Each element of the vector becomes one payload value.
impl From<Vec<Value>> for Payload {
    fn from(values: Vec<Value>) -> Self {
        Payload(values)
    }
}

impl<const N: usize> From<[Value; N]> for Payload {
    fn from(values: [Value; N]) -> Self {
        Payload(values.into())
    }
}

/// Build a [`Payload`] from zero or more serializable expressions.
///
/// ```
/// use herald::{payload, EventData};
///
/// assert_eq!(payload!().into_data(), EventData::None);
/// assert_eq!(payload!(42).len(), 1);
/// assert_eq!(payload!("x", 1).len(), 2);
/// ```
#[macro_export]
macro_rules! payload {
    () => {
        $crate::Payload::empty()
    };
    ($($value:expr),+ $(,)?) => {
        $crate::Payload::new(vec![$($crate::serde_json::json!($value)),+])
    };
}

/// The payload as delivered to a receiver.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", content = "value", rename_all = "snake_case")]
pub enum EventData {
    /// Published without values.
    None,
    /// Published with exactly one value, delivered unwrapped.
    One(Value),
    /// Published with two or more values, delivered as the sequence.
    Many(Vec<Value>),
}

impl EventData {
    pub fn is_none(&self) -> bool {
        matches!(self, EventData::None)
    }

    /// The unwrapped value, if exactly one was published.
    pub fn as_one(&self) -> Option<&Value> {
        match self {
            EventData::One(v) => Some(v),
            _ => None,
        }
    }

    /// The value sequence, if two or more were published.
    pub fn as_many(&self) -> Option<&[Value]> {
        match self {
            EventData::Many(vs) => Some(vs),
            _ => None,
        }
    }

    /// Number of published values.
    pub fn arity(&self) -> usize {
        match self {
            EventData::None => 0,
            EventData::One(_) => 1,
            EventData::Many(vs) => vs.len(),
        }
    }

    /// Shape label used in log fields.
    pub fn shape(&self) -> &'static str {
        match self {
            EventData::None => "none",
            EventData::One(_) => "single",
            EventData::Many(_) => "sequence",
        }
    }

    /// Collapse into one JSON value: `null`, the value, or an array.
    pub fn to_value(&self) -> Value {
        match self {
            EventData::None => Value::Null,
            EventData::One(v) => v.clone(),
            EventData::Many(vs) => Value::Array(vs.clone()),
        }
    }

    /// Decode into a typed argument. A shape the type cannot accept is a
    /// [`DeliveryError::Mismatch`].
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, DeliveryError> {
        Ok(serde_json::from_value(self.to_value())?)
    }
}

impl From<Payload> for EventData {
    fn from(payload: Payload) -> Self {
        payload.into_data()
    }
}

/// Identity of a callback target: the address of its shared allocation.
///
/// Stays unique for as long as any `Arc` or `Weak` to the allocation exists.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetKey(usize);

impl TargetKey {
    pub fn of<T: ?Sized>(target: &Arc<T>) -> Self {
        TargetKey(Arc::as_ptr(target) as *const () as usize)
    }

    pub fn of_weak<T>(target: &Weak<T>) -> Self {
        TargetKey(Weak::as_ptr(target) as *const () as usize)
    }
}

impl fmt::Debug for TargetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TargetKey({:#x})", self.0)
    }
}

/// Identity of a registration in the registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReceiverKey {
    /// A receiver registered directly, keyed by its allocation.
    Instance(usize),
    /// The `index`-th callback declared by a target.
    Callback { target: TargetKey, index: usize },
}

impl ReceiverKey {
    pub fn of<R: ?Sized>(receiver: &Arc<R>) -> Self {
        ReceiverKey::Instance(Arc::as_ptr(receiver) as *const () as usize)
    }

    /// The owning target, for callback registrations.
    pub fn target(&self) -> Option<TargetKey> {
        match self {
            ReceiverKey::Instance(_) => None,
            ReceiverKey::Callback { target, .. } => Some(*target),
        }
    }
}

/// Counters describing bus activity since construction.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusStats {
    /// Publish calls accepted onto the dispatch queue.
    pub published: u64,
    /// Successful receiver invocations, replays included.
    pub delivered: u64,
    /// Invocations declined with a payload mismatch.
    pub mismatches: u64,
    /// Invocations that faulted or panicked.
    pub faults: u64,
    /// Registrations removed by the bus itself.
    pub evicted: u64,
    /// Commands dropped because the bounded queue was full.
    pub dropped: u64,
}
