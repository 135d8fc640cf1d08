use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crawlwatch_core::{CrawlConfig, ProgressFrame, SessionHandle};
use crawlwatch_logging::{crawl_debug, crawl_info, crawl_warn};
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::{ChannelConnection, ControlError, StopOutcome};

#[derive(Debug, Clone)]
pub struct ControlSettings {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Request/response commands against the server's job-control endpoints.
#[async_trait::async_trait]
pub trait JobControl: Send + Sync {
    async fn start_crawling(&self, config: &CrawlConfig) -> Result<SessionHandle, ControlError>;

    /// Stops `session`, or the current session when `None`.
    async fn stop_crawling(
        &self,
        session: Option<&SessionHandle>,
    ) -> Result<StopOutcome, ControlError>;

    /// Latest snapshot the server holds for `session`, if any.
    async fn fetch_status(
        &self,
        session: &SessionHandle,
    ) -> Result<Option<ProgressFrame>, ControlError>;
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    status: Option<i32>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<Value>,
}

impl Envelope {
    fn is_success(&self) -> bool {
        self.status == Some(200) || self.code.as_deref() == Some("SUCCESS")
    }

    fn rejection(self, http_status: u16) -> ControlError {
        let status = self.status.unwrap_or(i32::from(http_status));
        ControlError::Rejected {
            status,
            message: self
                .message
                .or(self.code)
                .unwrap_or_else(|| "request rejected".to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartData {
    #[serde(default)]
    session_id: Option<SessionHandle>,
}

/// HTTP implementation of [`JobControl`] that remembers the one session it started.
pub struct SessionController {
    base_url: Url,
    client: reqwest::Client,
    channel: Option<Arc<dyn ChannelConnection>>,
    current: Mutex<Option<SessionHandle>>,
}

impl SessionController {
    pub fn new(base_url: &str, settings: ControlSettings) -> Result<Self, ControlError> {
        let base_url =
            Url::parse(base_url).map_err(|err| ControlError::InvalidBaseUrl(err.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(ControlError::InvalidBaseUrl(base_url.to_string()));
        }
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .build()
            .map_err(|err| ControlError::Network(err.to_string()))?;
        Ok(Self {
            base_url,
            client,
            channel: None,
            current: Mutex::new(None),
        })
    }

    /// Gates `start_crawling` on this channel being connected.
    pub fn with_channel(mut self, channel: Arc<dyn ChannelConnection>) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn current_session(&self) -> Option<SessionHandle> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_current(&self, session: Option<SessionHandle>) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = session;
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ControlError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ControlError::InvalidBaseUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn read_envelope(response: reqwest::Response) -> Result<(u16, Envelope), ControlError> {
        let http_status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| ControlError::Network(err.to_string()))?;
        match serde_json::from_str::<Envelope>(&body) {
            Ok(envelope) => Ok((http_status.as_u16(), envelope)),
            Err(_) if !http_status.is_success() => Err(ControlError::Rejected {
                status: i32::from(http_status.as_u16()),
                message: http_status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string(),
            }),
            Err(err) => Err(ControlError::InvalidResponse(err.to_string())),
        }
    }
}

#[async_trait::async_trait]
impl JobControl for SessionController {
    async fn start_crawling(&self, config: &CrawlConfig) -> Result<SessionHandle, ControlError> {
        if let Some(channel) = &self.channel {
            if !channel.is_connected() {
                crawl_warn!("Refusing to start crawl while the push channel is down");
                return Err(ControlError::NotConnected);
            }
        }

        let url = self.endpoint(&["crawler", "start"])?;
        crawl_debug!(
            "POST {} pages {}..{}",
            url,
            config.start_page(),
            config.end_page()
        );
        let response = self
            .client
            .post(url)
            .json(config)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let (http_status, envelope) = Self::read_envelope(response).await?;
        if !envelope.is_success() {
            let err = envelope.rejection(http_status);
            crawl_warn!("Start rejected: {}", err);
            return Err(err);
        }

        let data = envelope
            .data
            .ok_or_else(|| ControlError::InvalidResponse("missing data".to_string()))?;
        let session = serde_json::from_value::<StartData>(data)
            .map_err(|err| ControlError::InvalidResponse(err.to_string()))?
            .session_id
            .filter(|session| !session.is_empty())
            .ok_or_else(|| ControlError::InvalidResponse("missing sessionId".to_string()))?;

        crawl_info!("Crawl started with session {}", session);
        self.set_current(Some(session.clone()));
        Ok(session)
    }

    async fn stop_crawling(
        &self,
        session: Option<&SessionHandle>,
    ) -> Result<StopOutcome, ControlError> {
        let session = match session.cloned().or_else(|| self.current_session()) {
            Some(session) if !session.is_empty() => session,
            _ => {
                crawl_debug!("Stop requested with no active session");
                return Ok(StopOutcome::NoActiveSession);
            }
        };

        let url = self.endpoint(&["crawler", "stop", session.as_str()])?;
        let response = self
            .client
            .post(url)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let (http_status, envelope) = Self::read_envelope(response).await?;
        if !envelope.is_success() {
            let err = envelope.rejection(http_status);
            crawl_warn!("Stop for session {} rejected: {}", session, err);
            return Err(err);
        }

        crawl_info!("Crawl session {} stopped", session);
        Ok(StopOutcome::Stopped(session))
    }

    async fn fetch_status(
        &self,
        session: &SessionHandle,
    ) -> Result<Option<ProgressFrame>, ControlError> {
        let url = self.endpoint(&["crawler", "status", session.as_str()])?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let (http_status, envelope) = Self::read_envelope(response).await?;
        if !envelope.is_success() {
            return Err(envelope.rejection(http_status));
        }
        match envelope.data {
            None | Some(Value::Null) => Ok(None),
            Some(data) => serde_json::from_value(data)
                .map(Some)
                .map_err(|err| ControlError::InvalidResponse(err.to_string())),
        }
    }
}

fn map_reqwest_error(err: reqwest::Error) -> ControlError {
    if err.is_timeout() {
        ControlError::Network(format!("request timed out: {err}"))
    } else {
        ControlError::Network(err.to_string())
    }
}
