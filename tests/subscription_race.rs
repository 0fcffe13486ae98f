//! Subscribe and unsubscribe racing on the same filter from real threads.

use bytes::Bytes;
use dropwire::{
    Client, Delivery, EventSink, Result, SessionConfig, SessionEvent, Transport, TransportSession,
};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Hands out a single session whose `unsubscribe` can be held open.
#[derive(Clone, Default)]
struct GatedTransport {
    session: Arc<GatedSession>,
}

#[derive(Default)]
struct GatedSession {
    events: Mutex<Option<EventSink>>,
    filters: Mutex<HashSet<String>>,
    /// Signals entry into `unsubscribe`, then waits for release.
    gate: Mutex<Option<(Sender<()>, Receiver<()>)>>,
}

impl GatedSession {
    fn has_filter(&self, filter: &str) -> bool {
        self.filters.lock().contains(filter)
    }
}

impl Transport for GatedTransport {
    fn create_session(
        &self,
        _config: &SessionConfig,
        events: EventSink,
    ) -> Result<Arc<dyn TransportSession>> {
        *self.session.events.lock() = Some(events);
        Ok(self.session.clone())
    }
}

impl TransportSession for GatedSession {
    fn connect(&self) -> Result<()> {
        let events = self.events.lock().clone();
        if let Some(events) = events {
            events.emit(SessionEvent::Up);
        }
        Ok(())
    }

    fn subscribe(&self, filter: &str) -> Result<()> {
        self.filters.lock().insert(filter.to_string());
        Ok(())
    }

    fn unsubscribe(&self, filter: &str) -> Result<()> {
        let gate = self.gate.lock().take();
        if let Some((entered, release)) = gate {
            entered.send(()).unwrap();
            release.recv().unwrap();
        }
        self.filters.lock().remove(filter);
        Ok(())
    }

    fn send(&self, _topic: &str, _payload: Bytes) -> Result<()> {
        Ok(())
    }

    fn close(&self) {}
}

#[test]
fn test_subscribe_during_unsubscribe_keeps_transport_filter() {
    let transport = GatedTransport::default();
    let session = transport.session.clone();
    let client = Client::new(SessionConfig::default(), transport).unwrap();
    tokio_test::block_on(client.connect()).unwrap();

    let first = tokio_test::block_on(client.subscribe("a/b", |_: &Delivery<'_>| {})).unwrap();

    let (entered_tx, entered_rx) = channel();
    let (release_tx, release_rx) = channel();
    *session.gate.lock() = Some((entered_tx, release_rx));

    let unsubscriber = {
        let client = client.clone();
        thread::spawn(move || tokio_test::block_on(client.unsubscribe(first)))
    };
    // the last callback is gone and the transport call is parked
    entered_rx.recv().unwrap();

    let subscriber = {
        let client = client.clone();
        thread::spawn(move || {
            tokio_test::block_on(client.subscribe("a/b", |_: &Delivery<'_>| {}))
        })
    };
    thread::sleep(Duration::from_millis(50));
    release_tx.send(()).unwrap();

    assert!(unsubscriber.join().unwrap().unwrap());
    subscriber.join().unwrap().unwrap();

    let stats = client.stats();
    assert_eq!(stats.callbacks, 1);
    assert_eq!(stats.subscribed_filters, 1);
    assert!(
        session.has_filter("a/b"),
        "registry holds a callback on a/b but the transport dropped the filter"
    );
}

#[test]
fn test_unsubscribe_then_subscribe_restores_transport_filter() {
    let transport = GatedTransport::default();
    let session = transport.session.clone();
    let client = Client::new(SessionConfig::default(), transport).unwrap();
    tokio_test::block_on(client.connect()).unwrap();

    let id = tokio_test::block_on(client.subscribe("a/*", |_: &Delivery<'_>| {})).unwrap();
    assert!(tokio_test::block_on(client.unsubscribe(id)).unwrap());
    assert!(!session.has_filter("a/*"));

    tokio_test::block_on(client.subscribe("a/*", |_: &Delivery<'_>| {})).unwrap();
    assert!(session.has_filter("a/*"));
    assert_eq!(client.stats().callbacks, 1);
}
