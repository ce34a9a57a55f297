use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use serde::Serialize;
use tokio::sync::Mutex as SessionLock;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;

use super::blueprint::{FormBlueprint, StepId};
use super::clock::{Clock, LocalClock};
use super::domain::{ApplicationState, FieldKey, FieldValue, SessionId};
use super::draft::{
    persist_draft, restore_draft, DraftError, DraftKey, DraftRestoreKind, DraftStore,
};
use super::flow::{FieldErrors, QueryStep, StepFlowController, StepLookup, TransitionOutcome};
use super::notify::{ApplicationSummary, NotificationOutcome, Notifier, NOTIFICATION_WARNING};
use super::payment::{
    PaymentCharge, PaymentError, PaymentOutcome, PaymentProvider, PaymentReadiness, TransactionId,
};
use super::rules::{check_value_kind, failing_steps_before, FieldRuleValidator};

struct ApplicationSession {
    draft_key: DraftKey,
    restore: DraftRestoreKind,
    state: ApplicationState,
    flow: StepFlowController<QueryStep>,
    errors: FieldErrors,
}

type SessionHandle = Arc<SessionLock<ApplicationSession>>;
type RegistryGuard<'a> = std::sync::MutexGuard<'a, HashMap<SessionId, SessionEntry>>;

struct SessionEntry {
    handle: SessionHandle,
    last_touched: Instant,
}

impl SessionEntry {
    fn new(session: ApplicationSession) -> Self {
        Self {
            handle: Arc::new(SessionLock::new(session)),
            last_touched: Instant::now(),
        }
    }

    /// Idle past `timeout` and not in the middle of a request.
    fn is_stale(&self, timeout: Duration) -> bool {
        self.last_touched.elapsed() >= timeout && self.handle.try_lock().is_ok()
    }
}

/// Service owning live application sessions and their collaborators.
///
/// Each session sits behind its own async lock. Mutating calls use `try_lock`, so a second
/// transition that arrives while one is still awaiting validation or payment is rejected
/// with [`ApplicationServiceError::SessionBusy`] instead of queueing.
///
/// Sessions leave the registry after checkout, on [`abandon`](Self::abandon), or when they sit
/// idle longer than the configured timeout (swept whenever a new session starts). Drafts are
/// kept in every case but checkout.
pub struct VisaApplicationService<D, P, N> {
    blueprint: Arc<FormBlueprint>,
    drafts: Arc<D>,
    payments: Arc<P>,
    notifier: Arc<N>,
    clock: Arc<dyn Clock>,
    charge: PaymentCharge,
    idle_timeout: Duration,
    sessions: Mutex<HashMap<SessionId, SessionEntry>>,
}

impl<D, P, N> VisaApplicationService<D, P, N>
where
    D: DraftStore + 'static,
    P: PaymentProvider + 'static,
    N: Notifier + 'static,
{
    pub fn new(
        blueprint: Arc<FormBlueprint>,
        drafts: Arc<D>,
        payments: Arc<P>,
        notifier: Arc<N>,
        charge: PaymentCharge,
    ) -> Self {
        Self {
            blueprint,
            drafts,
            payments,
            notifier,
            clock: Arc::new(LocalClock),
            charge,
            idle_timeout: SessionConfig::DEFAULT_IDLE_TIMEOUT,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Evaluate date rules against `clock` instead of the local calendar.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Drop sessions untouched for longer than `timeout`.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn blueprint(&self) -> &FormBlueprint {
        &self.blueprint
    }

    pub fn charge(&self) -> &PaymentCharge {
        &self.charge
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    pub fn session_count(&self) -> usize {
        self.sessions
            .lock()
            .map(|sessions| sessions.len())
            .unwrap_or(0)
    }

    /// Open a session, restoring the draft stored under `draft_id` when one exists.
    pub async fn start(
        &self,
        draft_id: Option<String>,
        step: Option<String>,
    ) -> Result<SessionView, ApplicationServiceError> {
        let draft_key = draft_id
            .filter(|id| !id.trim().is_empty())
            .map(DraftKey::new)
            .unwrap_or_else(DraftKey::generate);

        let restored = restore_draft(self.drafts.as_ref(), &draft_key, &self.blueprint)?;
        let flow = StepFlowController::start(Arc::clone(&self.blueprint), QueryStep::new(step));

        let session_id = SessionId::generate();
        let session = ApplicationSession {
            draft_key,
            restore: restored.kind,
            state: restored.state,
            flow,
            errors: FieldErrors::new(),
        };

        info!(
            session = %session_id,
            draft = session.draft_key.draft_id(),
            step = %session.flow.current_step(),
            restore = ?session.restore,
            "application session started"
        );

        let view = self.render(&session_id, &session);
        let mut registry = self.registry()?;
        let before = registry.len();
        registry.retain(|_, entry| !entry.is_stale(self.idle_timeout));
        let evicted = before - registry.len();
        if evicted > 0 {
            info!(evicted, "evicted idle application sessions");
        }
        registry.insert(session_id, SessionEntry::new(session));
        Ok(view)
    }

    pub async fn view(
        &self,
        session_id: &SessionId,
    ) -> Result<SessionView, ApplicationServiceError> {
        let handle = self.session(session_id)?;
        let session = handle.lock().await;
        Ok(self.render(session_id, &session))
    }

    /// Merge field values into the session. Validation results from the earliest affected
    /// step onward are forgotten and the draft is rewritten.
    pub async fn update_fields(
        &self,
        session_id: &SessionId,
        updates: BTreeMap<FieldKey, FieldValue>,
    ) -> Result<SessionView, ApplicationServiceError> {
        if let Some((key, _)) = updates
            .iter()
            .find(|(key, value)| !check_value_kind(&self.blueprint, **key, value))
        {
            return Err(ApplicationServiceError::FieldKindMismatch(*key));
        }

        let handle = self.session(session_id)?;
        let mut guard = self.try_claim(session_id, &handle)?;
        let session = &mut *guard;

        let changed = session.state.merge(updates);
        if let Some(step) = changed
            .iter()
            .filter_map(|key| self.blueprint.step_for_field(*key))
            .min()
        {
            session.flow.invalidate_from(step);
        }
        for key in &changed {
            session.errors.remove(key);
        }

        if !changed.is_empty() {
            debug!(session = %session_id, changed = changed.len(), "application fields updated");
            let snapshot = session.state.clone().without_transient_files();
            if let Err(err) = persist_draft(self.drafts.as_ref(), &session.draft_key, &snapshot) {
                warn!(
                    session = %session_id,
                    error = %err,
                    "failed to persist application draft"
                );
            }
        }

        Ok(self.render(session_id, session))
    }

    pub async fn next(
        &self,
        session_id: &SessionId,
    ) -> Result<TransitionView, ApplicationServiceError> {
        let handle = self.session(session_id)?;
        let mut guard = self.try_claim(session_id, &handle)?;
        let session = &mut *guard;

        let validator = FieldRuleValidator::new(&self.blueprint, &session.state, self.today());
        let transition = session.flow.go_next(&validator).await;

        session.errors = match &transition {
            TransitionOutcome::Blocked { errors, .. } => errors.clone(),
            _ => FieldErrors::new(),
        };

        info!(session = %session_id, outcome = ?transition, "next step requested");
        Ok(TransitionView {
            transition,
            session: self.render(session_id, session),
        })
    }

    pub async fn previous(
        &self,
        session_id: &SessionId,
    ) -> Result<TransitionView, ApplicationServiceError> {
        let handle = self.session(session_id)?;
        let mut guard = self.try_claim(session_id, &handle)?;
        let session = &mut *guard;

        let transition = session.flow.go_previous();
        if transition.moved() {
            session.errors.clear();
        }

        debug!(session = %session_id, outcome = ?transition, "previous step requested");
        Ok(TransitionView {
            transition,
            session: self.render(session_id, session),
        })
    }

    /// Discard a session the applicant walked away from. The draft stays so the form can be
    /// resumed later under the same draft id.
    pub async fn abandon(&self, session_id: &SessionId) -> Result<(), ApplicationServiceError> {
        let handle = self.session(session_id)?;
        let guard = self.try_claim(session_id, &handle)?;
        let draft = guard.draft_key.draft_id().to_string();
        drop(guard);

        self.registry()?.remove(session_id);
        info!(session = %session_id, %draft, "application session abandoned");
        Ok(())
    }

    /// Re-run the rules of every step before the last and gate on terms and billing contact.
    pub async fn payment_readiness(
        &self,
        session_id: &SessionId,
    ) -> Result<PaymentReadiness, ApplicationServiceError> {
        let handle = self.session(session_id)?;
        let session = handle.lock().await;
        Ok(self.assess_payment(&session.state))
    }

    /// Charge the application fee, notify administrators, and close the session.
    ///
    /// A declined payment is an outcome, not an error: the session stays open for a retry.
    /// A failed notification downgrades the receipt to a warning but never undoes the charge.
    pub async fn checkout(
        &self,
        session_id: &SessionId,
    ) -> Result<CheckoutOutcome, ApplicationServiceError> {
        let handle = self.session(session_id)?;
        let guard = self.try_claim(session_id, &handle)?;

        let (billing_name, billing_email) = match self.assess_payment(&guard.state) {
            PaymentReadiness::Ready {
                billing_name,
                billing_email,
            } => (billing_name, billing_email),
            other => return Err(ApplicationServiceError::PaymentNotReady(other)),
        };
        if !guard.flow.state().final_validation_passed {
            return Err(ApplicationServiceError::FinalValidationPending);
        }

        let payment = self.payments.create_handle(&self.charge).await?;
        let transaction_id = match self
            .payments
            .confirm(&payment, &billing_name, &billing_email)
            .await
        {
            PaymentOutcome::Succeeded(transaction_id) => transaction_id,
            PaymentOutcome::Failed(reason) => {
                warn!(session = %session_id, %reason, "payment was not completed");
                return Ok(CheckoutOutcome::PaymentFailed { reason });
            }
        };
        info!(session = %session_id, transaction = %transaction_id, "payment succeeded");

        let summary =
            ApplicationSummary::from_state(&self.blueprint, &guard.state, transaction_id.clone());
        let notification = match self.notifier.send(&summary).await {
            NotificationOutcome::Sent { receipt } => NotificationStatus::Delivered { receipt },
            NotificationOutcome::Failed(reason) => {
                warn!(
                    session = %session_id,
                    transaction = %transaction_id,
                    %reason,
                    "admin notification failed after payment"
                );
                NotificationStatus::Warning {
                    message: NOTIFICATION_WARNING.to_string(),
                }
            }
        };

        if let Err(err) = self.drafts.clear(&guard.draft_key) {
            warn!(session = %session_id, error = %err, "failed to clear application draft");
        }
        drop(guard);
        self.registry()?.remove(session_id);

        Ok(CheckoutOutcome::Completed(CheckoutReceipt {
            transaction_id,
            amount: self.charge.display_amount(),
            notification,
        }))
    }

    fn assess_payment(&self, state: &ApplicationState) -> PaymentReadiness {
        let failing = failing_steps_before(
            &self.blueprint,
            self.blueprint.last_step(),
            state,
            self.today(),
        );
        PaymentReadiness::assess(state, failing)
    }

    fn registry(&self) -> Result<RegistryGuard<'_>, ApplicationServiceError> {
        self.sessions
            .lock()
            .map_err(|_| ApplicationServiceError::RegistryUnavailable)
    }

    fn session(&self, session_id: &SessionId) -> Result<SessionHandle, ApplicationServiceError> {
        let mut registry = self.registry()?;
        let entry = registry
            .get_mut(session_id)
            .ok_or_else(|| ApplicationServiceError::SessionNotFound(session_id.clone()))?;
        entry.last_touched = Instant::now();
        Ok(Arc::clone(&entry.handle))
    }

    fn try_claim<'a>(
        &self,
        session_id: &SessionId,
        handle: &'a SessionHandle,
    ) -> Result<tokio::sync::MutexGuard<'a, ApplicationSession>, ApplicationServiceError> {
        handle.try_lock().map_err(|_| {
            debug!(session = %session_id, "rejecting overlapping transition");
            ApplicationServiceError::SessionBusy(session_id.clone())
        })
    }

    fn render(&self, session_id: &SessionId, session: &ApplicationSession) -> SessionView {
        let flow = &session.flow;
        let title = match flow.current_step_definition() {
            StepLookup::Known(step) => Some(step.title.clone()),
            StepLookup::Unknown(_) => None,
        };

        SessionView {
            session_id: session_id.clone(),
            draft_id: session.draft_key.draft_id().to_string(),
            draft: session.restore,
            step: flow.current_step(),
            step_count: self.blueprint.step_count(),
            title,
            progress: flow.progress_ratio(),
            step_query: flow.indicator().to_query(),
            step_validity: flow.state().step_validity.clone(),
            final_validation_passed: flow.state().final_validation_passed,
            fields: session.state.clone(),
            errors: session.errors.clone(),
        }
    }
}

/// Snapshot of a session for API responses.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionView {
    pub session_id: SessionId,
    pub draft_id: String,
    pub draft: DraftRestoreKind,
    pub step: StepId,
    pub step_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub progress: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_query: Option<String>,
    pub step_validity: BTreeMap<StepId, Option<bool>>,
    pub final_validation_passed: bool,
    pub fields: ApplicationState,
    pub errors: FieldErrors,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionView {
    pub transition: TransitionOutcome,
    pub session: SessionView,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NotificationStatus {
    Delivered { receipt: Option<String> },
    Warning { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutReceipt {
    pub transaction_id: TransactionId,
    pub amount: String,
    pub notification: NotificationStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutOutcome {
    Completed(CheckoutReceipt),
    PaymentFailed { reason: String },
}

/// Error raised by the application service.
#[derive(Debug, thiserror::Error)]
pub enum ApplicationServiceError {
    #[error("application session {0} not found")]
    SessionNotFound(SessionId),
    #[error("another request is still being processed for session {0}")]
    SessionBusy(SessionId),
    #[error("field '{0}' does not accept a value of that shape")]
    FieldKindMismatch(FieldKey),
    #[error("the final step must pass validation before checkout")]
    FinalValidationPending,
    #[error("{0}")]
    PaymentNotReady(PaymentReadiness),
    #[error(transparent)]
    Draft(#[from] DraftError),
    #[error(transparent)]
    Payment(#[from] PaymentError),
    #[error("session registry unavailable")]
    RegistryUnavailable,
}
