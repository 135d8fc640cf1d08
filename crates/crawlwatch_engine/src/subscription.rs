use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crawlwatch_core::{decode_frame, topic_for, SessionHandle};
use crawlwatch_logging::{crawl_debug, crawl_info, crawl_warn};

use crate::{ChannelConnection, EngineEvent, EventSink, MessageHandler, SubscriptionId};

struct Binding {
    session: SessionHandle,
    id: SubscriptionId,
}

/// Binds at most one session's progress topic at a time.
///
/// Every decoded frame is forwarded as [`EngineEvent::Frame`] tagged with the
/// session the topic belongs to; undecodable payloads are logged and dropped.
pub struct ProgressSubscriber {
    channel: Arc<dyn ChannelConnection>,
    binding: Mutex<Option<Binding>>,
}

impl ProgressSubscriber {
    pub fn new(channel: Arc<dyn ChannelConnection>) -> Self {
        Self {
            channel,
            binding: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Binding>> {
        self.binding.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns `false` when the channel is down or `session` is blank.
    pub fn subscribe(&self, session: &SessionHandle, sink: Arc<dyn EventSink>) -> bool {
        if session.is_empty() || !self.channel.is_connected() {
            crawl_debug!("Cannot subscribe to {:?}: channel down or blank id", session.as_str());
            return false;
        }

        let mut binding = self.lock();
        if let Some(previous) = binding.take() {
            self.channel.unsubscribe(previous.id);
        }

        let topic = topic_for(session);
        let owner = session.clone();
        let handler: MessageHandler = Arc::new(move |payload: &str| match decode_frame(payload) {
            Ok(frame) => sink.emit(EngineEvent::Frame {
                session: owner.clone(),
                frame,
            }),
            Err(err) => crawl_warn!("Dropping frame for session {}: {}", owner, err),
        });

        match self.channel.subscribe(&topic, handler) {
            Some(id) => {
                crawl_info!("Subscribed to {} as {}", topic, id);
                *binding = Some(Binding {
                    session: session.clone(),
                    id,
                });
                true
            }
            None => {
                crawl_warn!("Channel refused subscription to {}", topic);
                false
            }
        }
    }

    pub fn unsubscribe(&self) {
        if let Some(previous) = self.lock().take() {
            self.channel.unsubscribe(previous.id);
            crawl_info!("Unsubscribed from session {}", previous.session);
        }
    }

    pub fn active_session(&self) -> Option<SessionHandle> {
        self.lock().as_ref().map(|binding| binding.session.clone())
    }
}
