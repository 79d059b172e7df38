//! Dispatcher: serialized delivery on one dedicated thread.
//!
//! ```text
//! publish (any thread) ──► audience snapshot ──► [queue] ──► dispatch thread
//!                                                               │
//!                                    for each receiver: still registered?
//!                                                               │
//!                                           receiver.on_event(name, data)
//!                                             ├─ Ok       → delivered
//!                                             ├─ Mismatch → logged, kept
//!                                             └─ Fault / TargetGone / panic
//!                                                         → logged, evicted
//! ```
//!
//! Commands are handled strictly in queue order, and each publish is fanned
//! out to its whole audience before the next command starts.
//!
//! A queue capacity only limits pending publishes. Sticky replays, flushes and
//! shutdown are always accepted, since dropping a replay would lose it for
//! good.

use crate::bus::BusConfig;
use crate::error::{DeliveryError, Result};
use crate::receivers::ReceiverRef;
use crate::registry::SubscriptionRegistry;
use crate::types::{BusStats, EventData, ReceiverKey};
use crossbeam_channel::{bounded, unbounded, Receiver, SendError, Sender};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;
use tracing::{debug, warn};

enum Command {
    Publish {
        name: Arc<str>,
        data: Arc<EventData>,
        audience: Vec<(ReceiverKey, ReceiverRef)>,
    },
    Replay {
        name: Arc<str>,
        data: Arc<EventData>,
        key: ReceiverKey,
        receiver: ReceiverRef,
    },
    Flush(Sender<()>),
    Shutdown,
}

impl Command {
    fn label(&self) -> &'static str {
        match self {
            Command::Publish { .. } => "publish",
            Command::Replay { .. } => "replay",
            Command::Flush(_) => "flush",
            Command::Shutdown => "shutdown",
        }
    }
}

#[derive(Default)]
struct Counters {
    /// Publishes queued but not yet taken by the dispatch thread.
    pending: AtomicUsize,
    published: AtomicU64,
    delivered: AtomicU64,
    mismatches: AtomicU64,
    faults: AtomicU64,
    evicted: AtomicU64,
    dropped: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> BusStats {
        BusStats {
            published: self.published.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            mismatches: self.mismatches.load(Ordering::Relaxed),
            faults: self.faults.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Owns the dispatch thread and the queue feeding it.
pub struct Dispatcher {
    tx: Sender<Command>,
    capacity: Option<usize>,
    thread_id: ThreadId,
    worker: Option<JoinHandle<()>>,
    counters: Arc<Counters>,
}

impl Dispatcher {
    /// Spawn the dispatch thread.
    ///
    /// The thread evicts faulting receivers from `registry`.
    pub fn spawn(config: &BusConfig, registry: Arc<SubscriptionRegistry>) -> Result<Self> {
        let (tx, rx) = unbounded();
        let counters = Arc::new(Counters::default());

        let worker = Worker {
            rx,
            registry,
            counters: Arc::clone(&counters),
            bounded: config.queue_capacity.is_some(),
            catch_panics: config.catch_panics,
        };
        let handle = thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || worker.run())?;

        Ok(Self {
            tx,
            capacity: config.queue_capacity.map(|capacity| capacity.max(1)),
            thread_id: handle.thread().id(),
            worker: Some(handle),
            counters,
        })
    }

    /// Queue delivery of one event to a snapshotted audience.
    pub fn publish(
        &self,
        name: &str,
        data: Arc<EventData>,
        audience: Vec<(ReceiverKey, ReceiverRef)>,
    ) {
        if let Some(capacity) = self.capacity {
            let pending = self.counters.pending.fetch_add(1, Ordering::AcqRel);
            if pending >= capacity {
                self.counters.pending.fetch_sub(1, Ordering::AcqRel);
                Counters::bump(&self.counters.dropped);
                warn!(event = name, capacity, "Dispatch queue full, dropping publish");
                return;
            }
        }
        let command = Command::Publish {
            name: name.into(),
            data,
            audience,
        };
        match self.submit(command) {
            Ok(()) => Counters::bump(&self.counters.published),
            Err(_) if self.capacity.is_some() => {
                self.counters.pending.fetch_sub(1, Ordering::AcqRel);
            }
            Err(_) => {}
        }
    }

    /// Queue delivery of a sticky payload to one newly registered receiver.
    pub fn replay(
        &self,
        name: &str,
        data: Arc<EventData>,
        key: ReceiverKey,
        receiver: ReceiverRef,
    ) {
        let _ = self.submit(Command::Replay {
            name: name.into(),
            data,
            key,
            receiver,
        });
    }

    /// Never blocks: the channel itself is unbounded.
    fn submit(&self, command: Command) -> std::result::Result<(), SendError<Command>> {
        self.tx.send(command).map_err(|err| {
            Counters::bump(&self.counters.dropped);
            warn!(command = err.0.label(), "Dispatch thread stopped, dropping command");
            err
        })
    }

    /// Wait until every command queued before this call has been handled.
    ///
    /// Returns false on timeout, when the dispatch thread is gone, or when
    /// called from the dispatch thread itself (which would wait on itself).
    pub fn flush(&self, timeout: Option<Duration>) -> bool {
        if self.is_dispatch_thread() {
            debug!("flush called from the dispatch thread, not waiting");
            return false;
        }
        let (ack_tx, ack_rx) = bounded(1);
        if self.tx.send(Command::Flush(ack_tx)).is_err() {
            return false;
        }
        match timeout {
            Some(timeout) => ack_rx.recv_timeout(timeout).is_ok(),
            None => ack_rx.recv().is_ok(),
        }
    }

    pub fn is_dispatch_thread(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    pub fn stats(&self) -> BusStats {
        self.counters.snapshot()
    }

    /// Commands waiting to be handled.
    pub fn queued(&self) -> usize {
        self.tx.len()
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        // On the dispatch thread the sender drops with us and the loop ends
        // after draining; joining here would wait on ourselves.
        if self.is_dispatch_thread() {
            return;
        }
        let _ = self.tx.send(Command::Shutdown);
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                warn!("Dispatch thread panicked");
            }
        }
    }
}

/// State owned by the dispatch thread.
struct Worker {
    rx: Receiver<Command>,
    registry: Arc<SubscriptionRegistry>,
    counters: Arc<Counters>,
    bounded: bool,
    catch_panics: bool,
}

impl Worker {
    fn run(self) {
        debug!("Dispatch thread started");
        for command in self.rx.iter() {
            match command {
                Command::Publish {
                    name,
                    data,
                    audience,
                } => {
                    if self.bounded {
                        self.counters.pending.fetch_sub(1, Ordering::AcqRel);
                    }
                    for (key, receiver) in &audience {
                        self.deliver(&name, &data, *key, receiver);
                    }
                }
                Command::Replay {
                    name,
                    data,
                    key,
                    receiver,
                } => self.deliver(&name, &data, key, &receiver),
                Command::Flush(ack) => {
                    let _ = ack.send(());
                }
                Command::Shutdown => break,
            }
        }
        debug!("Dispatch thread stopped");
    }

    fn deliver(&self, name: &str, data: &EventData, key: ReceiverKey, receiver: &ReceiverRef) {
        // Unregistered (or evicted) since the snapshot was taken.
        if !self.registry.contains(name, &key) {
            return;
        }

        match self.invoke(receiver, name, data) {
            Ok(()) => Counters::bump(&self.counters.delivered),
            Err(err) if !err.is_fault() => {
                Counters::bump(&self.counters.mismatches);
                warn!(
                    event = name,
                    receiver = %self.label(receiver),
                    kind = err.kind(),
                    error = %err,
                    "Failed to deliver event"
                );
            }
            Err(err) => {
                Counters::bump(&self.counters.faults);
                warn!(
                    event = name,
                    receiver = %self.label(receiver),
                    kind = err.kind(),
                    error = %err,
                    "Receiver failed, unregistering"
                );
                if self.registry.remove(&key) > 0 {
                    Counters::bump(&self.counters.evicted);
                }
            }
        }
    }

    fn invoke(
        &self,
        receiver: &ReceiverRef,
        name: &str,
        data: &EventData,
    ) -> std::result::Result<(), DeliveryError> {
        if !self.catch_panics {
            return receiver.on_event(name, data);
        }
        match panic::catch_unwind(AssertUnwindSafe(|| receiver.on_event(name, data))) {
            Ok(result) => result,
            Err(panic) => Err(DeliveryError::Fault(format!(
                "panicked: {}",
                panic_message(panic.as_ref())
            ))),
        }
    }

    /// Receiver label for logging; a panicking `label()` is contained like
    /// a panicking `on_event`.
    fn label(&self, receiver: &ReceiverRef) -> String {
        if !self.catch_panics {
            return receiver.label();
        }
        panic::catch_unwind(AssertUnwindSafe(|| receiver.label()))
            .unwrap_or_else(|panic| format!("<label panicked: {}>", panic_message(panic.as_ref())))
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
