//! Minimal STOMP 1.2 text-frame codec.
//!
//! One WebSocket text message carries at most one frame. A message made only
//! of end-of-line characters is a heartbeat.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StompError {
    #[error("frame is missing its header terminator or NUL byte")]
    Truncated,
    #[error("unknown command {0:?}")]
    UnknownCommand(String),
    #[error("malformed header line {0:?}")]
    MalformedHeader(String),
    #[error("undefined escape sequence in {0:?}")]
    BadEscape(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Connect,
    Connected,
    Subscribe,
    Unsubscribe,
    Disconnect,
    Message,
    Receipt,
    Error,
}

impl Command {
    fn as_str(self) -> &'static str {
        match self {
            Command::Connect => "CONNECT",
            Command::Connected => "CONNECTED",
            Command::Subscribe => "SUBSCRIBE",
            Command::Unsubscribe => "UNSUBSCRIBE",
            Command::Disconnect => "DISCONNECT",
            Command::Message => "MESSAGE",
            Command::Receipt => "RECEIPT",
            Command::Error => "ERROR",
        }
    }

    fn parse(raw: &str) -> Result<Self, StompError> {
        Ok(match raw {
            "CONNECT" | "STOMP" => Command::Connect,
            "CONNECTED" => Command::Connected,
            "SUBSCRIBE" => Command::Subscribe,
            "UNSUBSCRIBE" => Command::Unsubscribe,
            "DISCONNECT" => Command::Disconnect,
            "MESSAGE" => Command::Message,
            "RECEIPT" => Command::Receipt,
            "ERROR" => Command::Error,
            other => return Err(StompError::UnknownCommand(other.to_string())),
        })
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StompFrame {
    pub command: Command,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Heartbeat,
    Frame(StompFrame),
}

impl StompFrame {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// First value of `name`; repeated headers keep the earliest occurrence.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(64 + self.body.len());
        out.push_str(self.command.as_str());
        out.push('\n');
        for (name, value) in &self.headers {
            // CONNECT headers are sent verbatim.
            if self.command == Command::Connect {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            } else {
                out.push_str(&escape(name));
                out.push(':');
                out.push_str(&escape(value));
            }
            out.push('\n');
        }
        if !self.body.is_empty() && self.get("content-length").is_none() {
            out.push_str(&format!("content-length:{}\n", self.body.len()));
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }
}

pub fn decode_frame(text: &str) -> Result<Inbound, StompError> {
    let text = text.trim_start_matches(['\r', '\n']);
    if text.is_empty() {
        return Ok(Inbound::Heartbeat);
    }

    let mut lines = Vec::new();
    let mut pos = 0;
    loop {
        let Some(offset) = text[pos..].find('\n') else {
            return Err(StompError::Truncated);
        };
        let raw = &text[pos..pos + offset];
        let line = raw.strip_suffix('\r').unwrap_or(raw);
        pos += offset + 1;
        if line.is_empty() {
            break;
        }
        lines.push(line);
    }

    let mut lines = lines.into_iter();
    let command = Command::parse(lines.next().ok_or(StompError::Truncated)?)?;
    let mut headers = Vec::new();
    for line in lines {
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| StompError::MalformedHeader(line.to_string()))?;
        if command == Command::Connected {
            headers.push((name.to_string(), value.to_string()));
        } else {
            headers.push((unescape(name)?, unescape(value)?));
        }
    }

    let rest = &text[pos..];
    let declared_len = headers
        .iter()
        .find(|(name, _)| name == "content-length")
        .and_then(|(_, value)| value.trim().parse::<usize>().ok());
    let body = match declared_len {
        Some(len) if rest.len() > len && rest.is_char_boundary(len) => &rest[..len],
        _ => {
            let end = rest.find('\0').ok_or(StompError::Truncated)?;
            &rest[..end]
        }
    };

    Ok(Inbound::Frame(StompFrame {
        command,
        headers,
        body: body.to_string(),
    }))
}

/// Heartbeat periods in force once the server has answered CONNECT.
///
/// `None` means that direction carries no heartbeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Heartbeats {
    pub outgoing: Option<Duration>,
    pub incoming: Option<Duration>,
}

/// Combines the `offered` period (sent as `heart-beat:<ms>,<ms>`) with the
/// server's `heart-beat` header from CONNECTED. A missing or garbled header
/// counts as `0,0`.
pub fn negotiate_heartbeats(offered: Duration, server: Option<&str>) -> Heartbeats {
    let (server_sends, server_wants) = server
        .and_then(|raw| {
            let (sx, sy) = raw.split_once(',')?;
            Some((sx.trim().parse::<u64>().ok()?, sy.trim().parse::<u64>().ok()?))
        })
        .unwrap_or((0, 0));
    let agree = |server_ms: u64| {
        if offered.is_zero() || server_ms == 0 {
            None
        } else {
            Some(offered.max(Duration::from_millis(server_ms)))
        }
    };
    Heartbeats {
        outgoing: agree(server_wants),
        incoming: agree(server_sends),
    }
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

fn unescape(raw: &str) -> Result<String, StompError> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            _ => return Err(StompError::BadEscape(raw.to_string())),
        }
    }
    Ok(out)
}
