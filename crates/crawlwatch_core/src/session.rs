use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque server-assigned identifier of one crawl job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionHandle(String);

impl SessionHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionHandle {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Push-channel destination that carries the frames of exactly one session.
pub fn topic_for(session: &SessionHandle) -> String {
    format!("/topic/crawler/{}", session.as_str())
}
