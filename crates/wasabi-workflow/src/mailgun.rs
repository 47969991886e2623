//! Mailgun HTTP API notifier.
//!
//! Credentials come from the secret store on every send, so a rotated key is
//! picked up on the next daily run without a restart.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::Result;
use crate::notify::{Delivery, Email, Notifier};
use crate::secrets::{MailgunCredentials, SecretStore};

pub struct MailgunNotifier {
    client: reqwest::Client,
    secrets: Arc<dyn SecretStore>,
    secret_name: String,
}

impl MailgunNotifier {
    pub fn new(secrets: Arc<dyn SecretStore>, secret_name: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            secrets,
            secret_name: secret_name.to_string(),
        }
    }

    async fn credentials(&self) -> Result<MailgunCredentials> {
        let raw = self.secrets.get_secret(&self.secret_name).await?;
        MailgunCredentials::from_secret(&self.secret_name, &raw)
    }
}

/// Form fields for one recipient's message.
fn message_form<'a>(email: &'a Email, recipient: &'a str) -> [(&'static str, &'a str); 4] {
    [
        ("from", email.from.as_str()),
        ("to", recipient),
        ("subject", email.subject.as_str()),
        ("text", email.text.as_str()),
    ]
}

#[async_trait]
impl Notifier for MailgunNotifier {
    fn name(&self) -> &str {
        "mailgun"
    }

    async fn send(&self, email: &Email) -> Result<Vec<Delivery>> {
        if email.to.is_empty() {
            return Ok(Vec::new());
        }

        let creds = self.credentials().await?;
        let url = creds.messages_url();

        let mut deliveries = Vec::with_capacity(email.to.len());
        for recipient in &email.to {
            info!(%recipient, "sending email");
            let resp = self
                .client
                .post(&url)
                .basic_auth("api", Some(&creds.api_key))
                .form(&message_form(email, recipient))
                .send()
                .await?;

            let status = resp.status().as_u16();
            if status != 200 {
                warn!(%recipient, status, "mailgun status code expected 200 got {status}");
            }
            deliveries.push(Delivery {
                recipient: recipient.clone(),
                status,
            });
        }
        Ok(deliveries)
    }
}
