use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use serde::Serialize;
use tracing::info;

use super::blueprint::FormBlueprint;
use super::domain::{ApplicationState, FieldKey};
use super::payment::TransactionId;

const NOT_PROVIDED: &str = "N/A";

/// Shown to the applicant when payment succeeded but the admin notice did not go out.
pub const NOTIFICATION_WARNING: &str = "Your application and payment were successful. However, there was an issue sending the admin notification email. Please contact support if you don't receive a confirmation soon.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryRow {
    pub key: FieldKey,
    pub label: String,
    pub value: String,
}

/// Administrative digest of a paid application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplicationSummary {
    pub subject: String,
    pub applicant_name: String,
    pub email: String,
    pub nationality: String,
    pub purpose_of_visit: String,
    pub transaction_id: TransactionId,
    pub rows: Vec<SummaryRow>,
}

impl ApplicationSummary {
    pub fn from_state(
        blueprint: &FormBlueprint,
        state: &ApplicationState,
        transaction_id: TransactionId,
    ) -> Self {
        let text = |key: FieldKey| state.text(key).unwrap_or(NOT_PROVIDED).to_string();

        let rows = blueprint
            .fields()
            .iter()
            .filter(|spec| !matches!(spec.key, FieldKey::PassportCopy | FieldKey::AcceptTerms))
            .map(|spec| SummaryRow {
                key: spec.key,
                label: spec.label.to_string(),
                value: state
                    .get(spec.key)
                    .display()
                    .unwrap_or_else(|| NOT_PROVIDED.to_string()),
            })
            .collect();

        let applicant_name = format!(
            "{} {}",
            state.text(FieldKey::GivenNames).unwrap_or_default(),
            state.text(FieldKey::Surname).unwrap_or_default()
        )
        .trim()
        .to_string();

        Self {
            subject: format!(
                "New Visa Application Received - Applicant: {}",
                state.text(FieldKey::Surname).unwrap_or("Unknown")
            ),
            applicant_name: if applicant_name.is_empty() {
                NOT_PROVIDED.to_string()
            } else {
                applicant_name
            },
            email: text(FieldKey::EmailAddress),
            nationality: text(FieldKey::Nationality),
            purpose_of_visit: text(FieldKey::PurposeOfVisit),
            transaction_id,
            rows,
        }
    }

    pub fn row(&self, key: FieldKey) -> Option<&SummaryRow> {
        self.rows.iter().find(|row| row.key == key)
    }

    /// Minimal HTML body for mail-style notifiers. All applicant input is escaped.
    pub fn html_body(&self) -> String {
        let mut body = String::from("<h1>New Visa Application</h1>\n<ul>\n");
        body.push_str(&format!(
            "<li><strong>Transaction ID:</strong> {}</li>\n",
            escape_html(&self.transaction_id.0)
        ));
        for row in &self.rows {
            body.push_str(&format!(
                "<li><strong>{}:</strong> {}</li>\n",
                escape_html(&row.label),
                escape_html(&row.value)
            ));
        }
        body.push_str("</ul>\n");
        body
    }
}

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationOutcome {
    Sent { receipt: Option<String> },
    Failed(String),
}

/// Outbound hook for the administrative notice sent after a successful payment.
pub trait Notifier: Send + Sync {
    fn send(
        &self,
        summary: &ApplicationSummary,
    ) -> impl Future<Output = NotificationOutcome> + Send;
}

/// Writes the summary to the log stream; stands in for a mail relay.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    async fn send(&self, summary: &ApplicationSummary) -> NotificationOutcome {
        info!(
            subject = %summary.subject,
            transaction = %summary.transaction_id,
            fields = summary.rows.len(),
            "application notification dispatched"
        );
        NotificationOutcome::Sent {
            receipt: Some(format!("log://{}", summary.transaction_id)),
        }
    }
}

/// Keeps every summary it is handed. Can be switched to fail for exercising warning paths.
#[derive(Debug, Default)]
pub struct OutboxNotifier {
    sent: Mutex<Vec<ApplicationSummary>>,
    failing: AtomicBool,
}

impl OutboxNotifier {
    pub fn failing() -> Self {
        let notifier = Self::default();
        notifier.set_failing(true);
        notifier
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<ApplicationSummary> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }
}

impl Notifier for OutboxNotifier {
    async fn send(&self, summary: &ApplicationSummary) -> NotificationOutcome {
        if self.failing.load(Ordering::SeqCst) {
            return NotificationOutcome::Failed("outbox rejected notification".to_string());
        }

        match self.sent.lock() {
            Ok(mut sent) => {
                sent.push(summary.clone());
                NotificationOutcome::Sent {
                    receipt: Some(format!("outbox://{}", sent.len())),
                }
            }
            Err(_) => NotificationOutcome::Failed("outbox unavailable".to_string()),
        }
    }
}
