//! The tracking client: feeds channel and command outcomes through the core
//! reducer and executes the effects it returns.

use std::future::Future;
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crawlwatch_core::{
    update, CrawlConfig, Effect, Msg, Notification, SessionHandle, StopReason, TrackerState,
    TrackerView,
};
use crawlwatch_logging::{crawl_debug, crawl_error, crawl_info, crawl_warn};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::{
    ChannelConnection, EngineEvent, EventSink, JobControl, ProgressSubscriber, StopOutcome,
};

/// Output of the tracker for a presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerUpdate {
    /// Re-render with this snapshot.
    View(TrackerView),
    /// Show once (a toast).
    Notice(Notification),
}

struct Inner {
    state: Mutex<TrackerState>,
    connection: Arc<dyn ChannelConnection>,
    control: Arc<dyn JobControl>,
    subscriber: ProgressSubscriber,
    updates: mpsc::UnboundedSender<TrackerUpdate>,
    runtime: Option<Handle>,
    sink: Arc<dyn EventSink>,
    abandoned_stop: Mutex<Option<JoinHandle<()>>>,
}

/// Routes channel events back into the tracker without keeping it alive.
struct TrackerSink {
    inner: Weak<Inner>,
}

impl EventSink for TrackerSink {
    fn emit(&self, event: EngineEvent) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        let msg = match event {
            EngineEvent::Connected => Msg::ConnectionChanged { connected: true },
            EngineEvent::Disconnected => Msg::ConnectionChanged { connected: false },
            EngineEvent::ConnectionFailed { message } => Msg::ConnectionFailed { message },
            EngineEvent::Frame { session, frame } => Msg::FrameReceived { session, frame },
        };
        Inner::dispatch(&inner, msg);
    }
}

/// Explicit tracking client for one crawl job at a time.
///
/// Call [`CrawlTracker::close`] when the operator leaves; if the job is still
/// in progress a single best-effort stop is sent. Dropping the tracker closes it.
pub struct CrawlTracker {
    inner: Arc<Inner>,
}

impl CrawlTracker {
    pub fn new(
        connection: Arc<dyn ChannelConnection>,
        control: Arc<dyn JobControl>,
        config: CrawlConfig,
    ) -> (Self, mpsc::UnboundedReceiver<TrackerUpdate>) {
        let (updates, rx) = mpsc::unbounded_channel();
        let inner = Arc::new_cyclic(|weak: &Weak<Inner>| {
            let sink: Arc<dyn EventSink> = Arc::new(TrackerSink {
                inner: weak.clone(),
            });
            Inner {
                state: Mutex::new(TrackerState::with_config(config)),
                subscriber: ProgressSubscriber::new(connection.clone()),
                connection,
                control,
                updates,
                runtime: Handle::try_current().ok(),
                sink,
                abandoned_stop: Mutex::new(None),
            }
        });
        (Self { inner }, rx)
    }

    /// Starts the push channel; progress flows once it reports connected.
    pub fn open(&self) {
        let connected = self.inner.connection.is_connected();
        self.inner.connection.connect(self.inner.sink.clone());
        if connected {
            Inner::dispatch(&self.inner, Msg::ConnectionChanged { connected: true });
        }
    }

    pub fn configure(&self, config: CrawlConfig) {
        Inner::dispatch(&self.inner, Msg::ConfigChanged(config));
    }

    pub fn start(&self) {
        Inner::dispatch(&self.inner, Msg::StartRequested);
    }

    pub fn stop(&self) {
        Inner::dispatch(&self.inner, Msg::StopRequested);
    }

    pub fn view(&self) -> TrackerView {
        self.inner.lock_state().view()
    }

    /// Tears the tracking view down and disconnects the channel.
    ///
    /// Returns the best-effort stop task when one was fired so callers may
    /// wait for it with their own deadline. Later calls return `None`.
    pub fn close(&self) -> Option<JoinHandle<()>> {
        Inner::dispatch(&self.inner, Msg::ViewClosed);
        self.inner.connection.disconnect();
        self.inner
            .abandoned_stop
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

impl Drop for CrawlTracker {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn dispatch(this: &Arc<Inner>, msg: Msg) {
        let effects = {
            let mut guard = this.lock_state();
            let (next, effects) = update(mem::take(&mut *guard), msg);
            *guard = next;
            if guard.consume_dirty() {
                let _ = this.updates.send(TrackerUpdate::View(guard.view()));
            }
            effects
        };
        for effect in effects {
            Inner::run_effect(this, effect);
        }
    }

    fn run_effect(this: &Arc<Inner>, effect: Effect) {
        match effect {
            Effect::StartCrawl { config } => {
                let inner = this.clone();
                this.spawn(async move {
                    let msg = match inner.control.start_crawling(&config).await {
                        Ok(session) => Msg::StartSucceeded { session },
                        Err(err) => Msg::StartFailed {
                            message: err.to_string(),
                        },
                    };
                    Inner::dispatch(&inner, msg);
                });
            }
            Effect::Subscribe { session } => {
                if !this.subscriber.subscribe(&session, this.sink.clone()) {
                    Inner::dispatch(this, Msg::SubscribeFailed { session });
                }
            }
            Effect::ReleaseSubscription => this.subscriber.unsubscribe(),
            Effect::FetchStatus { session } => {
                let inner = this.clone();
                this.spawn(async move {
                    match inner.control.fetch_status(&session).await {
                        Ok(Some(frame)) => {
                            Inner::dispatch(&inner, Msg::SnapshotReceived { session, frame })
                        }
                        Ok(None) => crawl_debug!("Server holds no status for session {}", session),
                        Err(err) => crawl_warn!("Status refresh for {} failed: {}", session, err),
                    }
                });
            }
            Effect::StopCrawl {
                session,
                reason: StopReason::Operator,
            } => {
                let inner = this.clone();
                this.spawn(async move {
                    let msg = match inner.control.stop_crawling(Some(&session)).await {
                        Ok(StopOutcome::Stopped(stopped)) => Msg::StopSucceeded { session: stopped },
                        Ok(StopOutcome::NoActiveSession) => Msg::StopSucceeded { session },
                        Err(err) => Msg::StopFailed {
                            session,
                            message: err.to_string(),
                        },
                    };
                    Inner::dispatch(&inner, msg);
                });
            }
            Effect::StopCrawl {
                session,
                reason: StopReason::Abandoned,
            } => {
                crawl_info!("Firing abandonment stop for session {}", session);
                let control = this.control.clone();
                let task = this.spawn(abandon(control, session));
                *this
                    .abandoned_stop
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = task;
            }
            Effect::Notify(notice) => {
                let _ = this.updates.send(TrackerUpdate::Notice(notice));
            }
        }
    }

    fn spawn<F>(&self, task: F) -> Option<JoinHandle<()>>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match self.runtime.clone().or_else(|| Handle::try_current().ok()) {
            Some(handle) => Some(handle.spawn(task)),
            None => {
                crawl_error!("No async runtime available; background command dropped");
                None
            }
        }
    }
}

// Best effort: the outcome is only logged and never retried.
async fn abandon(control: Arc<dyn JobControl>, session: SessionHandle) {
    match control.stop_crawling(Some(&session)).await {
        Ok(_) => crawl_info!("Abandoned session {} stopped", session),
        Err(err) => crawl_warn!("Abandonment stop for session {} failed: {}", session, err),
    }
}
