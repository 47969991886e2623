use async_trait::async_trait;

use crate::error::Result;

/// Plain-text message to one or more recipients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub text: String,
}

/// Per-recipient result reported by the messaging API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub recipient: String,
    /// HTTP status returned for this recipient's message.
    pub status: u16,
}

impl Delivery {
    pub fn accepted(&self) -> bool {
        self.status == 200
    }
}

/// Outbound notification channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    /// Send `email` to every recipient. A rejected recipient is reported in
    /// its [`Delivery`], not as an error.
    async fn send(&self, email: &Email) -> Result<Vec<Delivery>>;
}
