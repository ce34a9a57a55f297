use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use evisa::workflows::visa::{
    CheckoutOutcome, DraftRestoreKind, FieldKey, FieldValue, FileDraftStore, FileReference,
    FixedClock, FormBlueprint, OutboxNotifier, PaymentCharge, SimulatedPaymentProvider, StepId,
    TransitionOutcome, VisaApplicationService,
};

mod common {
    use super::*;

    pub fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 2).expect("valid date")
    }

    pub fn iso(date: NaiveDate) -> String {
        date.format("%Y-%m-%d").to_string()
    }

    pub fn step_one() -> BTreeMap<FieldKey, FieldValue> {
        BTreeMap::from([
            (FieldKey::Nationality, FieldValue::text("can")),
            (FieldKey::TravelDocumentType, FieldValue::text("ordinary_passport")),
            (FieldKey::PurposeOfVisit, FieldValue::text("business")),
            (
                FieldKey::DateOfArrival,
                FieldValue::text(iso(today() + Duration::days(14))),
            ),
        ])
    }

    pub fn remaining_steps() -> BTreeMap<FieldKey, FieldValue> {
        BTreeMap::from([
            (FieldKey::Surname, FieldValue::text("Tremblay")),
            (FieldKey::GivenNames, FieldValue::text("Julie")),
            (FieldKey::DateOfBirth, FieldValue::text("1985-11-30")),
            (FieldKey::CountryOfBirth, FieldValue::text("can")),
            (FieldKey::PlaceOfBirth, FieldValue::text("Montreal")),
            (FieldKey::Sex, FieldValue::text("female")),
            (FieldKey::Occupation, FieldValue::text("employed")),
            (FieldKey::MobileNumber, FieldValue::text("+15145550123")),
            (FieldKey::PermanentAddress, FieldValue::text("1 Rue Sainte-Catherine")),
            (FieldKey::EmailAddress, FieldValue::text("julie@example.ca")),
            (FieldKey::PassportNumber, FieldValue::text("AB123456")),
            (FieldKey::PassportIssueDate, FieldValue::text("2021-04-01")),
            (FieldKey::PassportExpiryDate, FieldValue::text("2031-03-31")),
            (
                FieldKey::PassportCopy,
                FieldValue::File(FileReference {
                    name: "passport.jpg".to_string(),
                    size_bytes: 800_000,
                    content_type: Some("image/jpeg".to_string()),
                }),
            ),
            (
                FieldKey::AddressInAzerbaijan,
                FieldValue::text("Four Seasons Baku, 1 Neftchilar Ave"),
            ),
            (FieldKey::AcceptTerms, FieldValue::Flag(true)),
        ])
    }

    pub fn service(
        drafts: Arc<FileDraftStore>,
        notifier: Arc<OutboxNotifier>,
    ) -> VisaApplicationService<FileDraftStore, SimulatedPaymentProvider, OutboxNotifier> {
        VisaApplicationService::new(
            Arc::new(FormBlueprint::standard()),
            drafts,
            Arc::new(SimulatedPaymentProvider::new()),
            notifier,
            PaymentCharge::default(),
        )
        .with_clock(Arc::new(FixedClock(today())))
    }
}

#[tokio::test]
async fn drafts_survive_across_sessions_and_are_cleared_after_checkout() {
    let dir = tempfile::tempdir().expect("temp dir");
    let drafts = Arc::new(FileDraftStore::open(dir.path().join("drafts")).expect("store opens"));
    let notifier = Arc::new(OutboxNotifier::default());
    let service = common::service(drafts.clone(), notifier.clone());

    let first = service
        .start(Some("julie".to_string()), None)
        .await
        .expect("session starts");
    assert_eq!(first.draft, DraftRestoreKind::Fresh);
    service
        .update_fields(&first.session_id, common::step_one())
        .await
        .expect("update accepted");

    let resumed = service
        .start(Some("julie".to_string()), Some("1".to_string()))
        .await
        .expect("session resumes");
    assert_eq!(resumed.draft, DraftRestoreKind::Restored);
    assert_eq!(resumed.fields.text(FieldKey::Nationality), Some("can"));

    let id = resumed.session_id;
    let advanced = service.next(&id).await.expect("transition runs");
    assert_eq!(
        advanced.transition,
        TransitionOutcome::Advanced {
            from: StepId(1),
            to: StepId(2)
        }
    );

    service
        .update_fields(&id, common::remaining_steps())
        .await
        .expect("update accepted");
    for _ in 0..3 {
        service.next(&id).await.expect("transition runs");
    }
    let view = service.view(&id).await.expect("session view");
    assert!(view.final_validation_passed);
    assert_eq!(view.progress, 1.0);

    match service.checkout(&id).await.expect("checkout runs") {
        CheckoutOutcome::Completed(receipt) => {
            assert!(receipt.transaction_id.0.starts_with("pi_"));
        }
        other => panic!("expected completed checkout, got {other:?}"),
    }

    let summary = notifier.sent().pop().expect("summary sent");
    assert_eq!(summary.applicant_name, "Julie Tremblay");
    assert_eq!(summary.nationality, "can");

    let fresh = service
        .start(Some("julie".to_string()), None)
        .await
        .expect("session starts");
    assert_eq!(fresh.draft, DraftRestoreKind::Fresh);
}

#[tokio::test]
async fn corrupt_draft_files_are_discarded() {
    let dir = tempfile::tempdir().expect("temp dir");
    let drafts = Arc::new(FileDraftStore::open(dir.path()).expect("store opens"));
    std::fs::write(dir.path().join("visaFormData-broken.json"), "{\"surname\": 42")
        .expect("write corrupt draft");

    let service = common::service(drafts, Arc::new(OutboxNotifier::default()));
    let view = service
        .start(Some("broken".to_string()), None)
        .await
        .expect("session starts");

    assert_eq!(view.draft, DraftRestoreKind::Discarded);
    assert_eq!(view.fields.get(FieldKey::Surname), &FieldValue::Empty);
    assert!(!dir.path().join("visaFormData-broken.json").exists());
}
