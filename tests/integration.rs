//! Integration tests for the event bus.

use herald::{
    payload, receiver_fn, CallbackSpec, EventBus, EventData, EventTarget, ReceiverRef,
};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;

type Log = Arc<Mutex<Vec<(String, EventData)>>>;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn recorder(log: &Log) -> ReceiverRef {
    let log = Arc::clone(log);
    receiver_fn("recorder", move |name, data| {
        log.lock().push((name.to_string(), data.clone()));
        Ok(())
    })
}

fn entries(log: &Log) -> Vec<(String, EventData)> {
    log.lock().clone()
}

fn one(value: serde_json::Value) -> EventData {
    EventData::One(value)
}

// --- Realistic Workflow Tests ---

#[test]
fn test_sticky_scenario_late_subscriber() {
    init_tracing();
    let bus = EventBus::new().unwrap();
    let (log1, log2, log3): (Log, Log, Log) = Default::default();

    bus.register(recorder(&log1), &["A"]);
    bus.register(recorder(&log2), &[]);
    bus.publish_sticky("A", payload!(42));
    bus.flush();

    assert_eq!(entries(&log1), vec![("A".to_string(), one(json!(42)))]);
    assert_eq!(entries(&log2), vec![("A".to_string(), one(json!(42)))]);

    // No new publish: R3 is served from the sticky store.
    bus.register(recorder(&log3), &["A"]);
    bus.flush();

    assert_eq!(entries(&log3), vec![("A".to_string(), one(json!(42)))]);
    assert_eq!(log1.lock().len(), 1);
    assert_eq!(log2.lock().len(), 1);
}

#[test]
fn test_catch_all_replays_every_sticky_event() {
    let bus = EventBus::new().unwrap();
    let log: Log = Arc::default();

    bus.publish_sticky("a", payload!(1));
    bus.publish_sticky("b", payload!(2));
    bus.publish_sticky("b", payload!(3));
    bus.publish("c", payload!(4));

    bus.register(recorder(&log), &[]);
    bus.flush();

    let mut seen = entries(&log);
    seen.sort_by(|x, y| x.0.cmp(&y.0));
    assert_eq!(
        seen,
        vec![
            ("a".to_string(), one(json!(1))),
            ("b".to_string(), one(json!(3))),
        ]
    );

    // And it now sees everything published.
    bus.publish("c", ());
    bus.publish("anything", ());
    bus.flush();
    assert_eq!(log.lock().len(), 4);
}

#[test]
fn test_catch_all_and_named_registration_delivers_once() {
    let bus = EventBus::new().unwrap();
    let log: Log = Arc::default();
    let r = recorder(&log);

    bus.register(Arc::clone(&r), &["a"]);
    bus.register(Arc::clone(&r), &[]);
    bus.publish("a", payload!(1));
    bus.flush();

    assert_eq!(log.lock().len(), 1);
}

#[test]
fn test_clear_sticky_stops_replay() {
    let bus = EventBus::new().unwrap();
    let log: Log = Arc::default();

    bus.publish_sticky("a", payload!(1));
    bus.publish_sticky("b", payload!(2));
    assert_eq!(bus.sticky_count(), 2);
    assert_eq!(bus.clear_sticky(&[]), 2);

    bus.register(recorder(&log), &["a", "b"]);
    bus.flush();

    assert!(log.lock().is_empty());
    assert!(bus.sticky_names().is_empty());
    assert_eq!(bus.sticky_count(), 0);
}

#[test]
fn test_clear_sticky_by_name_clears_all_given_names() {
    let bus = EventBus::new().unwrap();
    let log: Log = Arc::default();

    bus.publish_sticky("a", payload!(1));
    bus.publish_sticky("b", payload!(2));
    bus.publish_sticky("c", payload!(3));
    let r = recorder(&log);
    bus.register(Arc::clone(&r), &["a"]);

    assert_eq!(bus.clear_sticky(&["a", "b"]), 2);
    assert_eq!(bus.sticky_names(), vec!["c".to_string()]);
    // Registrations survive the clear.
    assert!(bus.is_registered(&r));
    assert_eq!(bus.receiver_count("a"), 1);
}

#[test]
fn test_payload_arity_mapping() {
    let bus = EventBus::new().unwrap();
    let log: Log = Arc::default();
    bus.register(recorder(&log), &["n"]);

    bus.publish("n", ());
    bus.publish("n", payload!("x"));
    bus.publish("n", payload!("x", "y"));
    bus.flush();

    let data: Vec<EventData> = entries(&log).into_iter().map(|(_, d)| d).collect();
    assert_eq!(
        data,
        vec![
            EventData::None,
            one(json!("x")),
            EventData::Many(vec![json!("x"), json!("y")]),
        ]
    );
}

#[test]
fn test_event_names_are_case_sensitive() {
    let bus = EventBus::new().unwrap();
    let log: Log = Arc::default();
    bus.register(recorder(&log), &["Saved"]);

    bus.publish("saved", ());
    bus.publish("Saved", ());
    bus.flush();

    assert_eq!(entries(&log), vec![("Saved".to_string(), EventData::None)]);
}

#[test]
fn test_unregister_stops_delivery() {
    let bus = EventBus::new().unwrap();
    let log: Log = Arc::default();
    let r = recorder(&log);
    bus.register(Arc::clone(&r), &["a", "b"]);
    bus.register(Arc::clone(&r), &[]);

    assert!(bus.unregister(&r));
    assert!(!bus.is_registered(&r));
    assert!(bus.event_names().is_empty());

    bus.publish("a", ());
    bus.publish("z", ());
    bus.flush();
    assert!(log.lock().is_empty());
}

// --- Callback Targets ---

#[derive(Default)]
struct Screen {
    title: Mutex<String>,
    refreshes: Mutex<u32>,
    everything: Mutex<Vec<String>>,
}

impl EventTarget for Screen {
    fn event_callbacks(&self) -> Vec<CallbackSpec<Self>> {
        vec![
            CallbackSpec::typed(["title"], |s: &Screen, _: &str, title: String| {
                *s.title.lock() = title;
                Ok(())
            }),
            CallbackSpec::name_only(["refresh", "title"], |s: &Screen, _: &str| {
                *s.refreshes.lock() += 1;
                Ok(())
            }),
            CallbackSpec::name_only(Vec::<String>::new(), |s: &Screen, name: &str| {
                s.everything.lock().push(name.to_string());
                Ok(())
            }),
        ]
    }
}

#[test]
fn test_target_callbacks_by_arity() {
    let bus = EventBus::new().unwrap();
    let screen = Arc::new(Screen::default());

    assert_eq!(bus.register_target(&screen), 4);
    bus.publish("title", payload!("Inbox"));
    bus.publish("refresh", ());
    bus.flush();

    assert_eq!(*screen.title.lock(), "Inbox");
    assert_eq!(*screen.refreshes.lock(), 2);
    assert_eq!(
        *screen.everything.lock(),
        vec!["title".to_string(), "refresh".to_string()]
    );
}

#[test]
fn test_target_receives_sticky_on_registration() {
    let bus = EventBus::new().unwrap();
    bus.publish_sticky("title", payload!("Drafts"));

    let screen = Arc::new(Screen::default());
    bus.register_target(&screen);
    bus.flush();

    assert_eq!(*screen.title.lock(), "Drafts");
    // Name-only callback for "title" and the catch-all one were replayed too.
    assert_eq!(*screen.refreshes.lock(), 1);
    assert_eq!(*screen.everything.lock(), vec!["title".to_string()]);
}

#[test]
fn test_subscription_does_not_keep_target_alive() {
    let bus = EventBus::new().unwrap();
    let screen = Arc::new(Screen::default());
    let weak = Arc::downgrade(&screen);

    bus.register_target(&screen);
    drop(screen);

    assert!(weak.upgrade().is_none());
}

#[test]
fn test_dropped_target_self_evicts_on_delivery() {
    let bus = EventBus::new().unwrap();
    let screen = Arc::new(Screen::default());
    bus.register_target(&screen);
    assert_eq!(bus.receiver_count("title"), 2);

    drop(screen);
    bus.publish("title", payload!("gone"));
    bus.flush();

    // Every callback in the audience failed and was removed everywhere,
    // including the "refresh" slot of the second callback.
    assert_eq!(bus.receiver_count("title"), 0);
    assert_eq!(bus.receiver_count("refresh"), 0);
    assert_eq!(bus.catch_all_count(), 0);
    let stats = bus.stats();
    assert_eq!(stats.faults, 3);
    assert_eq!(stats.evicted, 3);
}

#[test]
fn test_purge_stale_without_delivery() {
    let bus = EventBus::new().unwrap();
    let screen = Arc::new(Screen::default());
    let survivor = Arc::new(Screen::default());
    bus.register_target(&screen);
    bus.register_target(&survivor);

    drop(screen);
    assert_eq!(bus.purge_stale(), 4);
    assert_eq!(bus.receiver_count("title"), 2);
    assert_eq!(bus.purge_stale(), 0);
}

#[test]
fn test_unregister_target_by_identity() {
    let bus = EventBus::new().unwrap();
    let first = Arc::new(Screen::default());
    let second = Arc::new(Screen::default());
    bus.register_target(&first);
    bus.register_target(&second);

    assert_eq!(bus.unregister_target(&first), 4);
    bus.publish("title", payload!("only second"));
    bus.flush();

    assert_eq!(*first.title.lock(), "");
    assert_eq!(*second.title.lock(), "only second");
}

#[test]
fn test_global_bus_is_shared() {
    let a = EventBus::global();
    let b = EventBus::global();
    assert!(std::ptr::eq(a, b));

    let log: Log = Arc::default();
    let r = recorder(&log);
    a.register(Arc::clone(&r), &["integration.global"]);
    b.publish("integration.global", payload!(true));
    a.flush();
    a.unregister(&r);

    assert_eq!(
        entries(&log),
        vec![("integration.global".to_string(), one(json!(true)))]
    );
}
