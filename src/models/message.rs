use anyhow::{Error, Result, anyhow};
use serde::{Deserialize, Serialize};

/// A message handed out by the broker and not yet acked or rejected.
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerMessage {
    pub delivery_tag: u64,
    pub exchange: String,
    pub routing_key: String,
    pub body: Vec<u8>,
    pub redelivered: bool,
}

impl BrokerMessage {
    pub fn body_str(&self) -> Result<&str, Error> {
        std::str::from_utf8(&self.body)
            .map_err(|e| anyhow!("Message body is not valid UTF-8: {}", e))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Empty,
    Acked,
    Rejected,
    /// The broker could not hand out a message; nothing to settle.
    FetchFailed,
    /// The message was processed but the ack or reject did not reach the
    /// broker, so it will be redelivered.
    SettleFailed,
}

impl PollOutcome {
    pub fn took_message(&self) -> bool {
        matches!(self, Self::Acked | Self::Rejected | Self::SettleFailed)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayReport {
    pub replayed: usize,
    pub discarded: usize,
}
