//! Multi-step e-visa application: field schema, step sequencing, passport eligibility,
//! draft persistence, and checkout.

pub mod blueprint;
pub mod clock;
pub mod domain;
pub mod draft;
pub mod eligibility;
pub mod flow;
pub mod notify;
pub mod payment;
pub(crate) mod rules;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use blueprint::{BlueprintError, FieldKind, FieldSpec, FormBlueprint, StepDefinition, StepId};
pub use clock::{Clock, FixedClock, LocalClock};
pub use domain::{ApplicationState, FieldKey, FieldValue, FileReference, SessionId};
pub use draft::{
    DraftError, DraftKey, DraftRestoreKind, DraftStore, FileDraftStore, InMemoryDraftStore,
};
pub use eligibility::{
    validate_passport_expiry, validate_passport_expiry_today, EligibilityResult,
    PASSPORT_VALIDITY_AFTER_ARRIVAL_DAYS,
};
pub use flow::{
    FieldErrors, PositionIndicator, QueryStep, StepFlowController, StepValidator, StepVerdict,
    TransitionOutcome,
};
pub use notify::{ApplicationSummary, Notifier, OutboxNotifier, TracingNotifier};
pub use payment::{
    PaymentCharge, PaymentError, PaymentProvider, PaymentReadiness, SimulatedPaymentProvider,
};
pub use router::application_router;
pub use service::{
    ApplicationServiceError, CheckoutOutcome, CheckoutReceipt, NotificationStatus, SessionView,
    TransitionView, VisaApplicationService,
};
