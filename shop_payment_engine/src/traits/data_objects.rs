use crate::db_types::WebhookEvent;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertEventResult {
    Inserted(WebhookEvent),
    AlreadyExists(WebhookEvent),
}

impl InsertEventResult {
    pub fn event(&self) -> &WebhookEvent {
        match self {
            Self::Inserted(e) | Self::AlreadyExists(e) => e,
        }
    }
}
