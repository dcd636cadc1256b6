use std::fmt::Display;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Display>(message: S) -> Self {
        Self { success: true, message: message.to_string() }
    }
}

/// Body of `POST /api/payment/{order_code}/link`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentLinkRequest {
    #[serde(default)]
    pub amount: Option<i64>,
}
