use crate::error::SettingsError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stored bot settings, as the external settings store holds them
///
/// Any field may still be unset while the user is configuring the bot.
/// The engine only reads this; user actions mutate it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BotConfiguration {
    pub purchase_amount: Option<f64>,
    pub purchase_interval_minutes: Option<f64>,
    pub credentials_ref: Option<String>,
    pub is_active: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

impl BotConfiguration {
    /// Amount and interval, if both are set
    pub fn purchase_settings(&self) -> Option<PurchaseSettings> {
        match (self.purchase_amount, self.purchase_interval_minutes) {
            (Some(amount), Some(interval_minutes)) => Some(PurchaseSettings {
                amount,
                interval_minutes,
            }),
            _ => None,
        }
    }
}

/// Complete purchase settings: notional per tick and interval in minutes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PurchaseSettings {
    pub amount: f64,
    pub interval_minutes: f64,
}

impl PurchaseSettings {
    pub fn validate(&self, min_notional: f64) -> Result<(), SettingsError> {
        if !self.amount.is_finite() {
            return Err(SettingsError::InvalidAmount(self.amount));
        }
        if self.amount < min_notional {
            return Err(SettingsError::AmountBelowMinimum {
                amount: self.amount,
                min_notional,
            });
        }
        if !self.interval_minutes.is_finite() || self.interval_minutes <= 0.0 {
            return Err(SettingsError::InvalidInterval(self.interval_minutes));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AttemptStatus {
    Success,
    Failed,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::Success => "success",
            AttemptStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "success" => Some(AttemptStatus::Success),
            "failed" => Some(AttemptStatus::Failed),
            _ => None,
        }
    }
}

/// Order side. The engine only ever buys.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
        }
    }
}

/// Result of a filled market order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderFill {
    pub order_id: String,
    pub filled_quantity: f64,
    pub avg_price: f64,
}

/// One executed tick, successful or not
///
/// Append-only: created once per tick that actually runs, never mutated.
/// `order_id` is set iff `status == Success`, `failure_reason` iff `status == Failed`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PurchaseAttempt {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub requested_amount: f64,
    pub status: AttemptStatus,
    pub filled_quantity: f64,
    pub fill_price: f64,
    pub order_id: Option<String>,
    pub failure_reason: Option<String>,
}

impl PurchaseAttempt {
    pub fn succeeded(timestamp: DateTime<Utc>, requested_amount: f64, fill: &OrderFill) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp,
            requested_amount,
            status: AttemptStatus::Success,
            filled_quantity: fill.filled_quantity,
            fill_price: fill.avg_price,
            order_id: Some(fill.order_id.clone()),
            failure_reason: None,
        }
    }

    pub fn failed(
        timestamp: DateTime<Utc>,
        requested_amount: f64,
        failure_reason: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp,
            requested_amount,
            status: AttemptStatus::Failed,
            filled_quantity: 0.0,
            fill_price: 0.0,
            order_id: None,
            failure_reason: Some(failure_reason.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == AttemptStatus::Success
    }

    /// Check the orderId / failureReason exclusivity
    pub fn check_consistency(&self) -> Result<(), String> {
        match (self.status, &self.order_id, &self.failure_reason) {
            (AttemptStatus::Success, Some(_), None) => Ok(()),
            (AttemptStatus::Failed, None, Some(_)) => Ok(()),
            (status, order_id, reason) => Err(format!(
                "attempt {} has status {} with order_id={:?} failure_reason={:?}",
                self.id,
                status.as_str(),
                order_id,
                reason
            )),
        }
    }
}

/// Aggregate view over the purchase history
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PurchaseStats {
    pub total_attempts: u64,
    pub successful: u64,
    pub failed: u64,
    pub total_spent: f64,
    pub total_quantity: f64,
    pub avg_price: f64,
    /// Percentage of successful attempts, 0 when there are none
    pub success_rate: f64,
}

impl PurchaseStats {
    pub fn from_attempts(attempts: &[PurchaseAttempt]) -> Self {
        let successes: Vec<&PurchaseAttempt> = attempts.iter().filter(|a| a.is_success()).collect();

        let total_attempts = attempts.len() as u64;
        let successful = successes.len() as u64;
        let avg_price = if successes.is_empty() {
            0.0
        } else {
            successes.iter().map(|a| a.fill_price).sum::<f64>() / successes.len() as f64
        };

        Self {
            total_attempts,
            successful,
            failed: total_attempts - successful,
            total_spent: successes.iter().map(|a| a.requested_amount).sum(),
            total_quantity: successes.iter().map(|a| a.filled_quantity).sum(),
            avg_price,
            success_rate: Self::rate(successful, total_attempts),
        }
    }

    pub fn rate(successful: u64, total: u64) -> f64 {
        if total == 0 {
            0.0
        } else {
            successful as f64 / total as f64 * 100.0
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ScheduleState {
    Stopped,
    Running,
}

/// Snapshot reported by the `status` command
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BotStatus {
    pub is_running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_execution_estimate: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings: Option<BotConfiguration>,
    /// Timer fires since start, including the skipped ones
    pub fires: u64,
    /// Fires dropped because a previous tick was still running
    pub skipped_fires: u64,
}

impl BotStatus {
    pub fn state(&self) -> ScheduleState {
        if self.is_running {
            ScheduleState::Running
        } else {
            ScheduleState::Stopped
        }
    }
}

/// Reply to `start` / `stop`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ControlResponse {
    pub success: bool,
    pub message: String,
}

impl ControlResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}
