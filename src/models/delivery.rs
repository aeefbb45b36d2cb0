use std::fmt::{Display, Formatter, Result};

/// What happened to a notification once a processor was done with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// The recipient opted out of this notification type.
    Suppressed,
    Failed(String),
}

impl DeliveryOutcome {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }

    pub fn should_ack(&self) -> bool {
        matches!(self, Self::Delivered | Self::Suppressed)
    }
}

impl Display for DeliveryOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            DeliveryOutcome::Delivered => write!(f, "delivered"),
            DeliveryOutcome::Suppressed => write!(f, "suppressed"),
            DeliveryOutcome::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}
