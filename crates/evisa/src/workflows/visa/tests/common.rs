use std::collections::BTreeMap;
use std::sync::Arc;

use axum::response::Response;
use chrono::{Duration, NaiveDate};
use serde_json::Value;
use tokio::sync::Notify;

use crate::workflows::visa::blueprint::{FormBlueprint, StepId};
use crate::workflows::visa::clock::FixedClock;
use crate::workflows::visa::domain::{
    ApplicationState, FieldKey, FieldValue, FileReference, SessionId,
};
use crate::workflows::visa::draft::InMemoryDraftStore;
use crate::workflows::visa::notify::OutboxNotifier;
use crate::workflows::visa::payment::{
    PaymentCharge, PaymentError, PaymentHandle, PaymentOutcome, PaymentProvider,
    SimulatedPaymentProvider,
};
use crate::workflows::visa::{application_router, TransitionOutcome, VisaApplicationService};

pub(super) type TestService =
    VisaApplicationService<InMemoryDraftStore, SimulatedPaymentProvider, OutboxNotifier>;

pub(super) fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 10).expect("valid date")
}

pub(super) fn iso(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub(super) fn arrival() -> NaiveDate {
    today() + Duration::days(30)
}

pub(super) fn passport_scan() -> FieldValue {
    FieldValue::File(FileReference {
        name: "passport.pdf".to_string(),
        size_bytes: 512_000,
        content_type: Some("application/pdf".to_string()),
    })
}

/// Answers that satisfy every rule as of [`today`].
pub(super) fn complete_answers() -> BTreeMap<FieldKey, FieldValue> {
    use FieldKey::*;

    let mut answers = BTreeMap::new();
    answers.insert(Nationality, FieldValue::text("usa"));
    answers.insert(TravelDocumentType, FieldValue::text("ordinary_passport"));
    answers.insert(PurposeOfVisit, FieldValue::text("tourism"));
    answers.insert(DateOfArrival, FieldValue::text(iso(arrival())));
    answers.insert(Surname, FieldValue::text("Aliyeva"));
    answers.insert(GivenNames, FieldValue::text("Nigar"));
    answers.insert(DateOfBirth, FieldValue::text("1990-05-12"));
    answers.insert(CountryOfBirth, FieldValue::text("aze"));
    answers.insert(PlaceOfBirth, FieldValue::text("Baku"));
    answers.insert(Sex, FieldValue::text("female"));
    answers.insert(Occupation, FieldValue::text("employed"));
    answers.insert(MobileNumber, FieldValue::text("+994501234567"));
    answers.insert(PermanentAddress, FieldValue::text("12 Nizami St, Baku"));
    answers.insert(EmailAddress, FieldValue::text("nigar@example.com"));
    answers.insert(PassportNumber, FieldValue::text("C01X00T47"));
    answers.insert(PassportIssueDate, FieldValue::text("2020-01-15"));
    answers.insert(
        PassportExpiryDate,
        FieldValue::text(iso(arrival() + Duration::days(400))),
    );
    answers.insert(PassportCopy, passport_scan());
    answers.insert(
        AddressInAzerbaijan,
        FieldValue::text("Hilton Baku, 1B Azadliq Ave"),
    );
    answers.insert(AcceptTerms, FieldValue::Flag(true));
    answers
}

pub(super) fn complete_state() -> ApplicationState {
    ApplicationState::from_values(complete_answers())
}

/// The subset of [`complete_answers`] belonging to `step` of the standard form.
pub(super) fn answers_for_step(step: u32) -> BTreeMap<FieldKey, FieldValue> {
    let blueprint = FormBlueprint::standard();
    let keys = blueprint
        .step(StepId(step))
        .map(|definition| definition.fields.clone())
        .unwrap_or_default();
    complete_answers()
        .into_iter()
        .filter(|(key, _)| keys.contains(key))
        .collect()
}

pub(super) fn build_service_with<P>(
    payments: Arc<P>,
) -> (
    VisaApplicationService<InMemoryDraftStore, P, OutboxNotifier>,
    Arc<InMemoryDraftStore>,
    Arc<OutboxNotifier>,
)
where
    P: PaymentProvider + 'static,
{
    let drafts = Arc::new(InMemoryDraftStore::default());
    let notifier = Arc::new(OutboxNotifier::default());
    let service = VisaApplicationService::new(
        Arc::new(FormBlueprint::standard()),
        drafts.clone(),
        payments,
        notifier.clone(),
        PaymentCharge::default(),
    )
    .with_clock(Arc::new(FixedClock(today())));
    (service, drafts, notifier)
}

pub(super) fn build_service() -> (TestService, Arc<InMemoryDraftStore>, Arc<OutboxNotifier>) {
    build_service_with(Arc::new(SimulatedPaymentProvider::new()))
}

/// Start a session, answer everything, and walk it through final validation.
pub(super) async fn finalized_session<P>(
    service: &VisaApplicationService<InMemoryDraftStore, P, OutboxNotifier>,
) -> SessionId
where
    P: PaymentProvider + 'static,
{
    let view = service
        .start(Some("draft-finalized".to_string()), None)
        .await
        .expect("session starts");
    let session_id = view.session_id;
    service
        .update_fields(&session_id, complete_answers())
        .await
        .expect("answers accepted");

    let mut last = None;
    for _ in 0..4 {
        last = Some(
            service
                .next(&session_id)
                .await
                .expect("transition runs")
                .transition,
        );
    }
    assert_eq!(
        last,
        Some(TransitionOutcome::FinalValidationPassed { step: StepId(4) })
    );
    session_id
}

/// Provider that parks inside `create_handle` until the test opens the gate.
#[derive(Default)]
pub(super) struct GatedPayments {
    pub(super) entered: Notify,
    pub(super) gate: Notify,
    inner: SimulatedPaymentProvider,
}

impl PaymentProvider for GatedPayments {
    async fn create_handle(&self, charge: &PaymentCharge) -> Result<PaymentHandle, PaymentError> {
        self.entered.notify_one();
        self.gate.notified().await;
        self.inner.create_handle(charge).await
    }

    async fn confirm(
        &self,
        handle: &PaymentHandle,
        billing_name: &str,
        billing_email: &str,
    ) -> PaymentOutcome {
        self.inner.confirm(handle, billing_name, billing_email).await
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

pub(super) fn application_router_with_service(service: Arc<TestService>) -> axum::Router {
    application_router(service)
}
