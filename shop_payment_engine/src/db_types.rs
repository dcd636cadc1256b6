use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

//--------------------------------------        OrderCode       ------------------------------------------------------
/// The order identifier shared with the payment gateway. Opaque to this crate; the only requirement is that it is not
/// empty, which callers at the system boundary check with [`OrderCode::is_valid`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct OrderCode(pub String);

impl OrderCode {
    pub fn new<S: Into<String>>(code: S) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_valid(&self) -> bool {
        !self.0.trim().is_empty()
    }
}

impl FromStr for OrderCode {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderCode {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OrderCode {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Display for OrderCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

//--------------------------------------     PaymentStatus       -----------------------------------------------------
/// The payment status as seen by the storefront.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    /// A payment link exists, or the gateway has reported a payment in progress.
    Pending,
    /// The gateway has confirmed the payment.
    Done,
    /// The payment was cancelled, expired or rejected by the gateway.
    Failed,
}

impl PaymentStatus {
    /// `Pending` is the only status that can still change.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentStatus::Pending => write!(f, "pending"),
            PaymentStatus::Done => write!(f, "done"),
            PaymentStatus::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid payment status: {0}")]
pub struct ConversionError(String);

impl FromStr for PaymentStatus {
    type Err = ConversionError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "done" => Ok(Self::Done),
            "failed" => Ok(Self::Failed),
            s => Err(ConversionError(s.to_string())),
        }
    }
}

//--------------------------------------  GatewayPaymentStatus   -----------------------------------------------------
/// The status field exactly as the payment gateway reports it in a webhook callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GatewayPaymentStatus {
    Paid,
    Success,
    Pending,
    Processing,
    Cancelled,
    Failed,
    Expired,
}

impl GatewayPaymentStatus {
    /// Maps the gateway's own status onto the storefront status. Every gateway status has exactly one mapping, and a
    /// stored webhook row never implies `Done` on its own.
    pub fn payment_status(&self) -> PaymentStatus {
        match self {
            Self::Paid | Self::Success => PaymentStatus::Done,
            Self::Pending | Self::Processing => PaymentStatus::Pending,
            Self::Cancelled | Self::Failed | Self::Expired => PaymentStatus::Failed,
        }
    }
}

impl From<GatewayPaymentStatus> for PaymentStatus {
    fn from(value: GatewayPaymentStatus) -> Self {
        value.payment_status()
    }
}

impl Display for GatewayPaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Paid => "PAID",
            Self::Success => "SUCCESS",
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Cancelled => "CANCELLED",
            Self::Failed => "FAILED",
            Self::Expired => "EXPIRED",
        };
        write!(f, "{s}")
    }
}

impl FromStr for GatewayPaymentStatus {
    type Err = ConversionError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PAID" => Ok(Self::Paid),
            "SUCCESS" => Ok(Self::Success),
            "PENDING" => Ok(Self::Pending),
            "PROCESSING" => Ok(Self::Processing),
            "CANCELLED" => Ok(Self::Cancelled),
            "FAILED" => Ok(Self::Failed),
            "EXPIRED" => Ok(Self::Expired),
            s => Err(ConversionError(s.to_string())),
        }
    }
}

impl TryFrom<String> for GatewayPaymentStatus {
    type Error = ConversionError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

//--------------------------------------  GatewayNotification    -----------------------------------------------------
/// A webhook callback from the payment gateway. Signature checks happen before this object is constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayNotification {
    pub order_code: OrderCode,
    pub status: GatewayPaymentStatus,
    #[serde(default)]
    pub amount: Option<i64>,
    /// The gateway's unique reference for this callback. Retries of the same callback carry the same reference.
    pub reference: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl GatewayNotification {
    pub fn new<S: Into<String>>(order_code: OrderCode, status: GatewayPaymentStatus, reference: S) -> Self {
        Self { order_code, status, amount: None, reference: reference.into(), description: None }
    }

    pub fn with_amount(mut self, amount: i64) -> Self {
        self.amount = Some(amount);
        self
    }
}

//--------------------------------------      WebhookEvent       -----------------------------------------------------
/// A gateway callback as it was stored in the webhook log.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub id: i64,
    pub order_code: OrderCode,
    pub reference: String,
    #[sqlx(try_from = "String")]
    pub gateway_status: GatewayPaymentStatus,
    pub amount: Option<i64>,
    pub description: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl WebhookEvent {
    pub fn payment_status(&self) -> PaymentStatus {
        self.gateway_status.payment_status()
    }
}
