use std::fmt::{Display, Formatter, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdempotencyStatus {
    NotFound,
    Processing,
    Sent,
    Failed,
}

impl IdempotencyStatus {
    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "processing" => Some(IdempotencyStatus::Processing),
            "sent" => Some(IdempotencyStatus::Sent),
            "failed" => Some(IdempotencyStatus::Failed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            IdempotencyStatus::NotFound => "not_found",
            IdempotencyStatus::Processing => "processing",
            IdempotencyStatus::Sent => "sent",
            IdempotencyStatus::Failed => "failed",
        }
    }
}

impl Display for IdempotencyStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "{}", self.as_str())
    }
}
