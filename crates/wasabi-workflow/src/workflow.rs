use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{info, warn};
use wasabi_core::WasabiConfig;

use crate::blob::{find_first, BlobStore, FileSearch};
use crate::error::Result;
use crate::notify::{Delivery, Email, Notifier};
use crate::tabular::distinct_column_values;

/// What the report looks for and who hears about it.
#[derive(Debug, Clone)]
pub struct ReportSettings {
    /// Folder under the day's `YYYY/MM/DD/` path.
    pub folder: String,
    /// File name prefix inside `folder`.
    pub file_name: String,
    /// Column whose distinct values go into the body.
    pub date_column: String,
    pub subject_prefix: String,
    pub from: String,
    pub recipients: Vec<String>,
}

impl ReportSettings {
    pub fn from_config(config: &WasabiConfig) -> Self {
        Self {
            folder: config.blob.folder.clone(),
            file_name: config.blob.file_name.clone(),
            date_column: config.blob.date_column.clone(),
            subject_prefix: config.email.subject_prefix.clone(),
            from: config.email.from.clone(),
            recipients: config.email.recipients.clone(),
        }
    }
}

/// Result of one completed report run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportOutcome {
    pub subject: String,
    pub body: String,
    /// Name of the file the body was built from, if one was found.
    pub file: Option<String>,
    pub deliveries: Vec<Delivery>,
}

/// The daily catch-all file report: find the day's file, collect the
/// distinct dates it covers, and mail a one-line summary.
pub struct ReportWorkflow {
    blobs: Arc<dyn BlobStore>,
    notifier: Arc<dyn Notifier>,
    settings: ReportSettings,
}

impl ReportWorkflow {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        notifier: Arc<dyn Notifier>,
        settings: ReportSettings,
    ) -> Self {
        Self {
            blobs,
            notifier,
            settings,
        }
    }

    pub fn settings(&self) -> &ReportSettings {
        &self.settings
    }

    /// `{YYYY/MM/DD}/{folder}/{file_name}`
    pub fn prefix_for(&self, date: NaiveDate) -> String {
        format!(
            "{}/{}/{}",
            date.format("%Y/%m/%d"),
            self.settings.folder,
            self.settings.file_name
        )
    }

    /// Report on the file dropped for `date`.
    pub async fn run(&self, date: NaiveDate) -> Result<ReportOutcome> {
        let day = date.format("%Y/%m/%d").to_string();
        let prefix = self.prefix_for(date);

        let (file, body) = match find_first(self.blobs.as_ref(), &prefix).await? {
            FileSearch::Found(blob) => {
                let data = self.blobs.read_object(&blob).await?;
                let dates = distinct_column_values(&data, &self.settings.date_column)?;
                info!(filename = %blob.name, count = dates.len(), "collected dates");
                let listed: Vec<String> = dates.into_iter().collect();
                (Some(blob.name), format!("Found dates: {}", listed.join(", ")))
            }
            FileSearch::NotFound => (None, format!("File for {day} not found")),
        };
        let subject = format!("{} {day}", self.settings.subject_prefix);

        warn!(%subject, %body, "Sending email");
        let deliveries = if self.settings.recipients.is_empty() {
            warn!("no recipients configured, email not sent");
            Vec::new()
        } else {
            let email = Email {
                from: self.settings.from.clone(),
                to: self.settings.recipients.clone(),
                subject: subject.clone(),
                text: body.clone(),
            };
            self.notifier.send(&email).await?
        };

        Ok(ReportOutcome {
            subject,
            body,
            file,
            deliveries,
        })
    }
}
