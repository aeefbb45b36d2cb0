use std::{
    collections::HashMap,
    fmt::{Display, Formatter},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::NotificationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    AgentRun,
    ZeroBalance,
    LowBalance,
    BlockExecutionFailed,
    ContinuousAgentError,
    DailySummary,
    WeeklySummary,
    MonthlySummary,
    ImmediateEmail,
}

impl NotificationType {
    pub const ALL: [NotificationType; 9] = [
        NotificationType::AgentRun,
        NotificationType::ZeroBalance,
        NotificationType::LowBalance,
        NotificationType::BlockExecutionFailed,
        NotificationType::ContinuousAgentError,
        NotificationType::DailySummary,
        NotificationType::WeeklySummary,
        NotificationType::MonthlySummary,
        NotificationType::ImmediateEmail,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::AgentRun => "agent_run",
            NotificationType::ZeroBalance => "zero_balance",
            NotificationType::LowBalance => "low_balance",
            NotificationType::BlockExecutionFailed => "block_execution_failed",
            NotificationType::ContinuousAgentError => "continuous_agent_error",
            NotificationType::DailySummary => "daily_summary",
            NotificationType::WeeklySummary => "weekly_summary",
            NotificationType::MonthlySummary => "monthly_summary",
            NotificationType::ImmediateEmail => "immediate_email",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|ty| ty.as_str() == s)
    }

    /// Strategy used when a producer does not pick one explicitly.
    pub fn default_strategy(&self) -> BatchingStrategy {
        match self {
            NotificationType::AgentRun
            | NotificationType::LowBalance
            | NotificationType::ImmediateEmail => BatchingStrategy::Immediate,
            NotificationType::ZeroBalance
            | NotificationType::BlockExecutionFailed
            | NotificationType::ContinuousAgentError => BatchingStrategy::Backoff,
            NotificationType::DailySummary
            | NotificationType::WeeklySummary
            | NotificationType::MonthlySummary => BatchingStrategy::Daily,
        }
    }
}

impl Display for NotificationType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchingStrategy {
    Immediate,
    Backoff,
    Hourly,
    Daily,
}

/// Type-erased transport form of a notification. `data` is only checked
/// against the schema for `type` when converted into a [`NotificationEvent`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationEventDto {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,

    #[serde(rename = "type")]
    pub notification_type: NotificationType,

    pub user_id: String,

    pub strategy: BatchingStrategy,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub data: JsonValue,
}

impl NotificationEventDto {
    pub fn new(notification_type: NotificationType, user_id: &str, data: JsonValue) -> Self {
        Self {
            id: Uuid::new_v4(),
            notification_type,
            user_id: user_id.to_string(),
            strategy: notification_type.default_strategy(),
            created_at: Utc::now(),
            data,
        }
    }

    pub fn with_strategy(mut self, strategy: BatchingStrategy) -> Self {
        self.strategy = strategy;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRunData {
    pub agent_name: String,
    pub credits_used: f64,
    pub execution_time: f64,
    pub node_count: i64,
    pub graph_id: String,
    #[serde(default)]
    pub outputs: Vec<HashMap<String, JsonValue>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZeroBalanceData {
    pub last_transaction: f64,
    pub last_transaction_time: DateTime<Utc>,
    pub top_up_link: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LowBalanceData {
    pub current_balance: f64,
    pub threshold_amount: f64,
    pub top_up_link: String,
    pub recent_usage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockExecutionFailedData {
    pub block_name: String,
    pub block_id: String,
    pub error_message: String,
    pub graph_id: String,
    pub node_id: String,
    pub execution_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContinuousAgentErrorData {
    pub agent_name: String,
    pub error_message: String,
    pub graph_id: String,
    pub execution_id: String,
    pub start_time: DateTime<Utc>,
    pub error_time: DateTime<Utc>,
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryData {
    pub total_credits_used: f64,
    pub total_executions: u64,
    pub most_used_agent: String,
    pub total_execution_time: f64,
    pub successful_runs: u64,
    pub failed_runs: u64,
    pub average_execution_time: f64,
    #[serde(default)]
    pub cost_breakdown: HashMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySummaryData {
    #[serde(flatten)]
    pub summary: SummaryData,
    pub date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklySummaryData {
    #[serde(flatten)]
    pub summary: SummaryData,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlySummaryData {
    #[serde(flatten)]
    pub summary: SummaryData,
    pub month: u32,
    pub year: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImmediateEmailData {
    pub subject: String,
    pub body: String,
}

/// One variant per notification type, each carrying its own payload schema.
#[derive(Debug, Clone, PartialEq)]
pub enum NotificationPayload {
    AgentRun(AgentRunData),
    ZeroBalance(ZeroBalanceData),
    LowBalance(LowBalanceData),
    BlockExecutionFailed(BlockExecutionFailedData),
    ContinuousAgentError(ContinuousAgentErrorData),
    DailySummary(DailySummaryData),
    WeeklySummary(WeeklySummaryData),
    MonthlySummary(MonthlySummaryData),
    ImmediateEmail(ImmediateEmailData),
}

impl NotificationPayload {
    pub fn decode(
        notification_type: NotificationType,
        data: JsonValue,
    ) -> Result<Self, NotificationError> {
        let payload = match notification_type {
            NotificationType::AgentRun => Self::AgentRun(parse(notification_type, data)?),
            NotificationType::ZeroBalance => Self::ZeroBalance(parse(notification_type, data)?),
            NotificationType::LowBalance => Self::LowBalance(parse(notification_type, data)?),
            NotificationType::BlockExecutionFailed => {
                Self::BlockExecutionFailed(parse(notification_type, data)?)
            }
            NotificationType::ContinuousAgentError => {
                Self::ContinuousAgentError(parse(notification_type, data)?)
            }
            NotificationType::DailySummary => Self::DailySummary(parse(notification_type, data)?),
            NotificationType::WeeklySummary => {
                Self::WeeklySummary(parse(notification_type, data)?)
            }
            NotificationType::MonthlySummary => {
                Self::MonthlySummary(parse(notification_type, data)?)
            }
            NotificationType::ImmediateEmail => {
                Self::ImmediateEmail(parse(notification_type, data)?)
            }
        };

        Ok(payload)
    }

    pub fn notification_type(&self) -> NotificationType {
        match self {
            Self::AgentRun(_) => NotificationType::AgentRun,
            Self::ZeroBalance(_) => NotificationType::ZeroBalance,
            Self::LowBalance(_) => NotificationType::LowBalance,
            Self::BlockExecutionFailed(_) => NotificationType::BlockExecutionFailed,
            Self::ContinuousAgentError(_) => NotificationType::ContinuousAgentError,
            Self::DailySummary(_) => NotificationType::DailySummary,
            Self::WeeklySummary(_) => NotificationType::WeeklySummary,
            Self::MonthlySummary(_) => NotificationType::MonthlySummary,
            Self::ImmediateEmail(_) => NotificationType::ImmediateEmail,
        }
    }

    pub fn to_value(&self) -> Result<JsonValue, serde_json::Error> {
        match self {
            Self::AgentRun(data) => serde_json::to_value(data),
            Self::ZeroBalance(data) => serde_json::to_value(data),
            Self::LowBalance(data) => serde_json::to_value(data),
            Self::BlockExecutionFailed(data) => serde_json::to_value(data),
            Self::ContinuousAgentError(data) => serde_json::to_value(data),
            Self::DailySummary(data) => serde_json::to_value(data),
            Self::WeeklySummary(data) => serde_json::to_value(data),
            Self::MonthlySummary(data) => serde_json::to_value(data),
            Self::ImmediateEmail(data) => serde_json::to_value(data),
        }
    }
}

fn parse<T: DeserializeOwned>(
    notification_type: NotificationType,
    data: JsonValue,
) -> Result<T, NotificationError> {
    serde_json::from_value(data).map_err(|e| NotificationError::Validation {
        notification_type,
        reason: e.to_string(),
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct NotificationEvent {
    pub id: Uuid,
    pub user_id: String,
    pub strategy: BatchingStrategy,
    pub created_at: DateTime<Utc>,
    pub payload: NotificationPayload,
}

impl NotificationEvent {
    pub fn notification_type(&self) -> NotificationType {
        self.payload.notification_type()
    }

    /// Parses the wire envelope and validates the payload for its type.
    pub fn from_json(raw: &str) -> Result<Self, NotificationError> {
        let dto = serde_json::from_str::<NotificationEventDto>(raw)
            .map_err(|e| NotificationError::Malformed(e.to_string()))?;
        Self::try_from(dto)
    }

    pub fn to_dto(&self) -> Result<NotificationEventDto, NotificationError> {
        Ok(NotificationEventDto {
            id: self.id,
            notification_type: self.notification_type(),
            user_id: self.user_id.clone(),
            strategy: self.strategy,
            created_at: self.created_at,
            data: self.payload.to_value()?,
        })
    }

    pub fn to_json(&self) -> Result<String, NotificationError> {
        Ok(serde_json::to_string(&self.to_dto()?)?)
    }
}

impl TryFrom<NotificationEventDto> for NotificationEvent {
    type Error = NotificationError;

    fn try_from(dto: NotificationEventDto) -> Result<Self, Self::Error> {
        if dto.user_id.trim().is_empty() {
            return Err(NotificationError::Validation {
                notification_type: dto.notification_type,
                reason: "user_id cannot be empty".to_string(),
            });
        }

        let payload = NotificationPayload::decode(dto.notification_type, dto.data)?;

        Ok(Self {
            id: dto.id,
            user_id: dto.user_id,
            strategy: dto.strategy,
            created_at: dto.created_at,
            payload,
        })
    }
}

/// Synchronous answer to a publishing caller. Only reflects whether the
/// notification was enqueued, never whether it was delivered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationResult {
    pub success: bool,
    pub message: String,
}

impl NotificationResult {
    pub fn queued(routing_key: &str) -> Self {
        Self {
            success: true,
            message: format!("Notification queued with routing key: {}", routing_key),
        }
    }

    pub fn failed(message: String) -> Self {
        Self {
            success: false,
            message,
        }
    }
}
