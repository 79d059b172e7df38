//! # Herald
//!
//! An in-process publish/subscribe event bus.
//!
//! ## Core Concepts
//!
//! - **Receivers**: anything implementing [`Receiver`], registered for named
//!   events or for every event
//! - **Targets**: objects declaring callbacks through [`EventTarget`]; the bus
//!   holds them weakly and drops their callbacks once they are gone
//! - **Sticky events**: the last payload is kept and replayed to receivers
//!   that register later
//! - **Dispatch**: delivery runs on one dedicated thread, one event at a time,
//!   whichever thread published it
//!
//! ## Example
//!
//! ```
//! use herald::{payload, receiver_fn, EventBus};
//!
//! let bus = EventBus::new()?;
//!
//! bus.publish_sticky("theme", payload!("dark"));
//!
//! // Registering late still sees the sticky payload.
//! bus.register(
//!     receiver_fn("printer", |name, data| {
//!         println!("{name}: {:?}", data);
//!         Ok(())
//!     }),
//!     &["theme"],
//! );
//!
//! bus.publish("theme", payload!("light"));
//! bus.flush();
//! # Ok::<(), herald::BusError>(())
//! ```

pub mod bus;
pub mod dispatch;
pub mod error;
pub mod receivers;
pub mod registry;
pub mod types;

#[doc(hidden)]
pub use serde_json;

// Re-exports
pub use bus::{BusConfig, EventBus};
pub use dispatch::Dispatcher;
pub use error::{BusError, DeliveryError, Result};
pub use receivers::{
    receiver_fn, Callback, CallbackReceiver, CallbackSpec, EventTarget, FnReceiver, Receiver,
    ReceiverRef,
};
pub use registry::{StickyStore, SubscriptionRegistry};
pub use types::*;
