//! Receivers: the things events are delivered to.
//!
//! Two kinds of receiver can be registered:
//! - any [`Receiver`] implementation, held strongly by the bus until it is
//!   unregistered or evicted;
//! - [`CallbackReceiver`]s built from the [`CallbackSpec`]s an
//!   [`EventTarget`] declares, which hold their target weakly.
//!
//! # Example
//!
//! ```ignore
//! struct Screen { title: Mutex<String> }
//!
//! impl EventTarget for Screen {
//!     fn event_callbacks(&self) -> Vec<CallbackSpec<Self>> {
//!         vec![CallbackSpec::typed(["title"], |s: &Screen, _, t: String| {
//!             *s.title.lock() = t;
//!             Ok(())
//!         })]
//!     }
//! }
//!
//! let screen = Arc::new(Screen { title: Mutex::new(String::new()) });
//! bus.register_target(&screen);
//! ```

mod adapter;
mod receiver;

pub use adapter::{Callback, CallbackReceiver, CallbackSpec, EventTarget};
pub use receiver::{receiver_fn, FnReceiver, Receiver, ReceiverRef};
