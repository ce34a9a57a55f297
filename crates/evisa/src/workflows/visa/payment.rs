use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::blueprint::StepId;
use super::domain::{ApplicationState, FieldKey};
use crate::config::PaymentConfig;

/// Amount and labelling for the application fee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentCharge {
    pub amount_minor_units: u64,
    pub currency: String,
    pub description: String,
}

impl PaymentCharge {
    pub fn application_fee(config: &PaymentConfig) -> Self {
        Self {
            amount_minor_units: config.fee_minor_units,
            currency: config.currency.clone(),
            description: config.description.clone(),
        }
    }

    /// e.g. `$59.00 USD`.
    pub fn display_amount(&self) -> String {
        let major = self.amount_minor_units / 100;
        let minor = self.amount_minor_units % 100;
        let currency = self.currency.to_ascii_uppercase();
        let symbol = if currency == "USD" { "$" } else { "" };
        format!("{symbol}{major}.{minor:02} {currency}")
    }
}

impl Default for PaymentCharge {
    fn default() -> Self {
        Self::application_fee(&PaymentConfig::default())
    }
}

/// Provider-side reference to a pending charge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentHandle {
    pub id: String,
    #[serde(skip)]
    pub client_secret: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(pub String);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    Succeeded(TransactionId),
    Failed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("payment provider unavailable: {0}")]
    Unavailable(String),
    #[error("payment provider rejected the charge: {0}")]
    Rejected(String),
}

/// Card-processing collaborator. Confirmation reports declines as [`PaymentOutcome::Failed`];
/// only handle creation surfaces transport errors.
pub trait PaymentProvider: Send + Sync {
    fn create_handle(
        &self,
        charge: &PaymentCharge,
    ) -> impl Future<Output = Result<PaymentHandle, PaymentError>> + Send;

    fn confirm(
        &self,
        handle: &PaymentHandle,
        billing_name: &str,
        billing_email: &str,
    ) -> impl Future<Output = PaymentOutcome> + Send;
}

/// Whether checkout may be offered for the current answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PaymentReadiness {
    Ready {
        billing_name: String,
        billing_email: String,
    },
    TermsNotAccepted,
    IncompleteSteps {
        steps: Vec<StepId>,
    },
    MissingBillingContact,
}

impl PaymentReadiness {
    /// Gate checkout on accepted terms, valid earlier steps, and a billing contact.
    pub fn assess(state: &ApplicationState, failing_steps: Vec<StepId>) -> Self {
        if !state.flag(FieldKey::AcceptTerms) {
            return PaymentReadiness::TermsNotAccepted;
        }
        if !failing_steps.is_empty() {
            return PaymentReadiness::IncompleteSteps {
                steps: failing_steps,
            };
        }

        let billing_name = billing_name(state);
        match (billing_name, state.text(FieldKey::EmailAddress)) {
            (Some(name), Some(email)) => PaymentReadiness::Ready {
                billing_name: name,
                billing_email: email.to_string(),
            },
            _ => PaymentReadiness::MissingBillingContact,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, PaymentReadiness::Ready { .. })
    }

    pub fn message(&self) -> String {
        match self {
            PaymentReadiness::Ready { .. } => "Payment can proceed.".to_string(),
            PaymentReadiness::TermsNotAccepted => {
                "You must accept the terms and conditions to proceed.".to_string()
            }
            PaymentReadiness::IncompleteSteps { steps } => {
                let listed: Vec<String> = steps.iter().map(StepId::to_string).collect();
                format!(
                    "Please ensure all fields in this and previous steps are correctly filled and valid before payment can be shown (steps: {}).",
                    listed.join(", ")
                )
            }
            PaymentReadiness::MissingBillingContact => {
                "Your name and email from Step 2 must be filled to proceed with payment."
                    .to_string()
            }
        }
    }
}

impl fmt::Display for PaymentReadiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

/// `"<given names> <surname>"`, trimmed; `None` when both are blank.
pub fn billing_name(state: &ApplicationState) -> Option<String> {
    let joined = format!(
        "{} {}",
        state.text(FieldKey::GivenNames).unwrap_or_default(),
        state.text(FieldKey::Surname).unwrap_or_default()
    );
    let trimmed = joined.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Deterministic in-process provider. Each handle can be confirmed once; billing e-mails on
/// the decline list fail like a declined card.
#[derive(Debug, Default)]
pub struct SimulatedPaymentProvider {
    pending: Mutex<HashMap<String, PaymentCharge>>,
    declined_emails: HashSet<String>,
}

impl SimulatedPaymentProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declining<I, S>(emails: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            pending: Mutex::new(HashMap::new()),
            declined_emails: emails
                .into_iter()
                .map(|email| email.as_ref().trim().to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn pending_handles(&self) -> usize {
        self.pending.lock().map(|pending| pending.len()).unwrap_or(0)
    }
}

impl PaymentProvider for SimulatedPaymentProvider {
    async fn create_handle(&self, charge: &PaymentCharge) -> Result<PaymentHandle, PaymentError> {
        if charge.amount_minor_units == 0 {
            return Err(PaymentError::Rejected("amount must be positive".to_string()));
        }

        let id = format!("pi_{}", uuid::Uuid::new_v4().simple());
        let client_secret = format!("{id}_secret_{}", uuid::Uuid::new_v4().simple());
        self.pending
            .lock()
            .map_err(|_| PaymentError::Unavailable("payment ledger poisoned".to_string()))?
            .insert(id.clone(), charge.clone());

        info!(
            handle = %id,
            amount = charge.amount_minor_units,
            currency = %charge.currency,
            "created payment handle"
        );
        Ok(PaymentHandle { id, client_secret })
    }

    async fn confirm(
        &self,
        handle: &PaymentHandle,
        _billing_name: &str,
        billing_email: &str,
    ) -> PaymentOutcome {
        let charge = match self.pending.lock() {
            Ok(mut pending) => pending.remove(&handle.id),
            Err(_) => return PaymentOutcome::Failed("payment ledger unavailable".to_string()),
        };

        if charge.is_none() {
            return PaymentOutcome::Failed("Payment status: unknown. Please try again.".to_string());
        }

        if self
            .declined_emails
            .contains(&billing_email.trim().to_ascii_lowercase())
        {
            return PaymentOutcome::Failed("Your card was declined.".to_string());
        }

        PaymentOutcome::Succeeded(TransactionId(handle.id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::visa::domain::FieldValue;

    fn ready_state() -> ApplicationState {
        let mut state = ApplicationState::initial();
        state.set(FieldKey::GivenNames, FieldValue::text("Leyla"));
        state.set(FieldKey::Surname, FieldValue::text("Huseynova"));
        state.set(FieldKey::EmailAddress, FieldValue::text("leyla@example.com"));
        state.set(FieldKey::AcceptTerms, FieldValue::Flag(true));
        state
    }

    #[test]
    fn readiness_requires_terms_first() {
        let mut state = ready_state();
        state.set(FieldKey::AcceptTerms, FieldValue::Flag(false));
        assert_eq!(
            PaymentReadiness::assess(&state, vec![StepId(2)]),
            PaymentReadiness::TermsNotAccepted
        );
    }

    #[test]
    fn readiness_reports_failing_steps() {
        assert_eq!(
            PaymentReadiness::assess(&ready_state(), vec![StepId(1), StepId(3)]),
            PaymentReadiness::IncompleteSteps {
                steps: vec![StepId(1), StepId(3)]
            }
        );
    }

    #[test]
    fn readiness_needs_billing_contact() {
        let mut state = ready_state();
        state.set(FieldKey::EmailAddress, FieldValue::text("  "));
        assert_eq!(
            PaymentReadiness::assess(&state, Vec::new()),
            PaymentReadiness::MissingBillingContact
        );

        assert_eq!(
            PaymentReadiness::assess(&ready_state(), Vec::new()),
            PaymentReadiness::Ready {
                billing_name: "Leyla Huseynova".to_string(),
                billing_email: "leyla@example.com".to_string(),
            }
        );
    }

    #[test]
    fn billing_name_tolerates_one_missing_part() {
        let mut state = ApplicationState::initial();
        state.set(FieldKey::Surname, FieldValue::text("Huseynova"));
        assert_eq!(billing_name(&state).as_deref(), Some("Huseynova"));
        assert_eq!(billing_name(&ApplicationState::initial()), None);
    }

    #[test]
    fn fee_renders_like_the_pay_button() {
        assert_eq!(PaymentCharge::default().display_amount(), "$59.00 USD");
    }

    #[tokio::test]
    async fn handles_confirm_exactly_once() {
        let provider = SimulatedPaymentProvider::new();
        let handle = provider
            .create_handle(&PaymentCharge::default())
            .await
            .expect("handle created");
        assert_eq!(provider.pending_handles(), 1);

        let first = provider
            .confirm(&handle, "Leyla Huseynova", "leyla@example.com")
            .await;
        assert_eq!(first, PaymentOutcome::Succeeded(TransactionId(handle.id.clone())));

        let second = provider
            .confirm(&handle, "Leyla Huseynova", "leyla@example.com")
            .await;
        assert!(matches!(second, PaymentOutcome::Failed(_)));
        assert_eq!(provider.pending_handles(), 0);
    }

    #[tokio::test]
    async fn declined_emails_fail_confirmation() {
        let provider = SimulatedPaymentProvider::declining(["Declined@Example.com"]);
        let handle = provider
            .create_handle(&PaymentCharge::default())
            .await
            .expect("handle created");
        assert_eq!(
            provider
                .confirm(&handle, "Any Name", "declined@example.com")
                .await,
            PaymentOutcome::Failed("Your card was declined.".to_string())
        );
    }
}
