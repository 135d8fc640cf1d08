#![allow(dead_code)]

use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use crawlwatch_engine::{
    ChannelConnection, EngineEvent, EventSink, MessageHandler, SubscriptionId, TrackerUpdate,
};
use tokio::sync::mpsc;

pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(crawlwatch_logging::initialize_for_tests);
}

#[derive(Default)]
struct FakeState {
    online: bool,
    connected: bool,
    sink: Option<Arc<dyn EventSink>>,
    next_id: u64,
    routes: Vec<(SubscriptionId, String, MessageHandler)>,
    subscribe_log: Vec<String>,
    disconnects: usize,
}

/// In-memory channel: delivers whatever the test publishes, synchronously.
#[derive(Default)]
pub struct FakeConnection {
    state: Mutex<FakeState>,
}

impl FakeConnection {
    /// A channel whose handshake succeeds on `connect`.
    pub fn online() -> Arc<Self> {
        let fake = Self::default();
        fake.state.lock().unwrap().online = true;
        Arc::new(fake)
    }

    /// A channel that never completes a handshake until `reconnect`.
    pub fn offline() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Delivers `payload` to every handler bound to `destination`.
    pub fn publish(&self, destination: &str, payload: &str) -> usize {
        let handlers = {
            let state = self.state.lock().unwrap();
            state
                .routes
                .iter()
                .filter(|(_, dest, _)| dest == destination)
                .map(|(_, _, handler)| handler.clone())
                .collect::<Vec<_>>()
        };
        for handler in &handlers {
            handler(payload);
        }
        handlers.len()
    }

    /// Simulates the server going away: bindings are lost.
    pub fn drop_connection(&self) {
        let sink = {
            let mut state = self.state.lock().unwrap();
            state.connected = false;
            state.routes.clear();
            state.sink.clone()
        };
        if let Some(sink) = sink {
            sink.emit(EngineEvent::Disconnected);
        }
    }

    pub fn reconnect(&self) {
        let sink = {
            let mut state = self.state.lock().unwrap();
            state.online = true;
            state.connected = true;
            state.sink.clone()
        };
        if let Some(sink) = sink {
            sink.emit(EngineEvent::Connected);
        }
    }

    pub fn subscribe_log(&self) -> Vec<String> {
        self.state.lock().unwrap().subscribe_log.clone()
    }

    pub fn bound_destinations(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .routes
            .iter()
            .map(|(_, dest, _)| dest.clone())
            .collect()
    }

    pub fn disconnects(&self) -> usize {
        self.state.lock().unwrap().disconnects
    }
}

impl ChannelConnection for FakeConnection {
    fn connect(&self, sink: Arc<dyn EventSink>) {
        let announce = {
            let mut state = self.state.lock().unwrap();
            state.sink = Some(sink.clone());
            if state.online && !state.connected {
                state.connected = true;
                true
            } else {
                false
            }
        };
        if announce {
            sink.emit(EngineEvent::Connected);
        }
    }

    fn disconnect(&self) {
        let mut state = self.state.lock().unwrap();
        state.disconnects += 1;
        state.connected = false;
        state.routes.clear();
        state.sink = None;
    }

    fn is_connected(&self) -> bool {
        self.state.lock().unwrap().connected
    }

    fn subscribe(&self, destination: &str, handler: MessageHandler) -> Option<SubscriptionId> {
        let mut state = self.state.lock().unwrap();
        if !state.connected {
            return None;
        }
        let id = SubscriptionId::new(state.next_id);
        state.next_id += 1;
        state.subscribe_log.push(destination.to_string());
        state.routes.push((id, destination.to_string(), handler));
        Some(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.state
            .lock()
            .unwrap()
            .routes
            .retain(|(bound, _, _)| *bound != id);
    }
}

/// Collects engine events for assertions.
#[derive(Default)]
pub struct TestSink {
    events: Arc<Mutex<Vec<EngineEvent>>>,
}

impl TestSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn take(&self) -> Vec<EngineEvent> {
        self.events.lock().unwrap().drain(..).collect()
    }
}

impl EventSink for TestSink {
    fn emit(&self, event: EngineEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Waits for the next notice, skipping view updates.
pub async fn next_notice(rx: &mut mpsc::UnboundedReceiver<TrackerUpdate>) -> String {
    loop {
        let update = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("tracker update in time")
            .expect("tracker channel open");
        if let TrackerUpdate::Notice(notice) = update {
            return notice.text;
        }
    }
}

/// Drains whatever is queued and returns the percentages of the view updates.
pub fn drain_percentages(rx: &mut mpsc::UnboundedReceiver<TrackerUpdate>) -> Vec<Option<u8>> {
    let mut out = Vec::new();
    while let Ok(update) = rx.try_recv() {
        if let TrackerUpdate::View(view) = update {
            out.push(view.percentage);
        }
    }
    out
}
