use chrono::{Duration, Local, NaiveDate};
use clap::Args;
use evisa::error::AppError;
use evisa::workflows::visa::{
    ApplicationServiceError, CheckoutOutcome, FieldKey, FieldValue, FileReference, FixedClock,
    FormBlueprint, InMemoryDraftStore, NotificationStatus, OutboxNotifier, PaymentCharge,
    SimulatedPaymentProvider, TransitionOutcome, VisaApplicationService,
};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Evaluation date for date rules (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) today: Option<NaiveDate>,
    /// Make the simulated card decline to show the retry path.
    #[arg(long)]
    pub(crate) decline_payment: bool,
}

type DemoService =
    VisaApplicationService<InMemoryDraftStore, SimulatedPaymentProvider, OutboxNotifier>;

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        today,
        decline_payment,
    } = args;
    let today = today.unwrap_or_else(|| Local::now().date_naive());

    let payments = if decline_payment {
        SimulatedPaymentProvider::declining(["sabina.karimova@example.com"])
    } else {
        SimulatedPaymentProvider::new()
    };
    let notifier = Arc::new(OutboxNotifier::default());
    let service: DemoService = VisaApplicationService::new(
        Arc::new(FormBlueprint::standard()),
        Arc::new(InMemoryDraftStore::default()),
        Arc::new(payments),
        notifier.clone(),
        PaymentCharge::default(),
    )
    .with_clock(Arc::new(FixedClock(today)));

    println!("E-visa application demo (evaluated on {today})");

    let view = service
        .start(Some("demo".to_string()), Some("7".to_string()))
        .await
        .map_err(demo_error)?;
    println!(
        "Session {} opened at step {} of {} (requested step 7, indicator now {})",
        view.session_id,
        view.step,
        view.step_count,
        view.step_query.as_deref().unwrap_or("unset")
    );
    let session_id = view.session_id;

    let blocked = service.next(&session_id).await.map_err(demo_error)?;
    if let TransitionOutcome::Blocked { step, errors } = &blocked.transition {
        println!("\nStep {step} blocked with {} issue(s):", errors.len());
        for (field, message) in errors {
            println!("  - {field}: {message}");
        }
    }

    let blueprint = FormBlueprint::standard();
    let answers = demo_answers(today);
    for step in blueprint.steps() {
        let updates: BTreeMap<FieldKey, FieldValue> = answers
            .iter()
            .filter(|(key, _)| step.contains(**key))
            .map(|(key, value)| (*key, value.clone()))
            .collect();
        service
            .update_fields(&session_id, updates)
            .await
            .map_err(demo_error)?;

        let transition = service.next(&session_id).await.map_err(demo_error)?;
        println!(
            "\n[{:>3.0}%] {}: {}",
            transition.session.progress * 100.0,
            step.title,
            describe(&transition.transition)
        );
    }

    let readiness = service
        .payment_readiness(&session_id)
        .await
        .map_err(demo_error)?;
    println!(
        "\nPayment: {} ({})",
        readiness.message(),
        service.charge().display_amount()
    );

    match service.checkout(&session_id).await.map_err(demo_error)? {
        CheckoutOutcome::Completed(receipt) => {
            println!("Checkout complete, transaction {}", receipt.transaction_id);
            match receipt.notification {
                NotificationStatus::Delivered { receipt } => println!(
                    "Admin notified ({})",
                    receipt.as_deref().unwrap_or("no receipt")
                ),
                NotificationStatus::Warning { message } => println!("Warning: {message}"),
            }
        }
        CheckoutOutcome::PaymentFailed { reason } => {
            println!("Payment failed: {reason}");
            println!("The session stays open so the applicant can retry.");
        }
    }

    for summary in notifier.sent() {
        println!("\n{}", summary.subject);
        for row in &summary.rows {
            println!("  {}: {}", row.label, row.value);
        }
    }

    Ok(())
}

fn describe(transition: &TransitionOutcome) -> String {
    match transition {
        TransitionOutcome::Advanced { to, .. } => format!("validated, moved to step {to}"),
        TransitionOutcome::FinalValidationPassed { .. } => {
            "validated, ready for payment".to_string()
        }
        TransitionOutcome::Blocked { errors, .. } => {
            format!("{} field(s) need attention", errors.len())
        }
        TransitionOutcome::Retreated { to, .. } => format!("moved back to step {to}"),
        TransitionOutcome::AtFirstStep => "already at the first step".to_string(),
    }
}

fn demo_error(err: ApplicationServiceError) -> AppError {
    AppError::InvalidRequest(err.to_string())
}

fn demo_answers(today: NaiveDate) -> BTreeMap<FieldKey, FieldValue> {
    let arrival = today + Duration::days(21);
    let expiry = arrival + Duration::days(365);
    let iso = |date: NaiveDate| date.format("%Y-%m-%d").to_string();

    BTreeMap::from([
        (FieldKey::Nationality, FieldValue::text("uk")),
        (FieldKey::TravelDocumentType, FieldValue::text("ordinary_passport")),
        (FieldKey::PurposeOfVisit, FieldValue::text("tourism")),
        (FieldKey::DateOfArrival, FieldValue::text(iso(arrival))),
        (FieldKey::Surname, FieldValue::text("Karimova")),
        (FieldKey::GivenNames, FieldValue::text("Sabina")),
        (FieldKey::DateOfBirth, FieldValue::text("1992-02-14")),
        (FieldKey::CountryOfBirth, FieldValue::text("uk")),
        (FieldKey::PlaceOfBirth, FieldValue::text("Manchester")),
        (FieldKey::Sex, FieldValue::text("female")),
        (FieldKey::Occupation, FieldValue::text("employed")),
        (FieldKey::MobileNumber, FieldValue::text("+447700900123")),
        (FieldKey::PermanentAddress, FieldValue::text("221 Deansgate, Manchester")),
        (FieldKey::EmailAddress, FieldValue::text("sabina.karimova@example.com")),
        (FieldKey::PassportNumber, FieldValue::text("533380006")),
        (
            FieldKey::PassportIssueDate,
            FieldValue::text(iso(today - Duration::days(700))),
        ),
        (FieldKey::PassportExpiryDate, FieldValue::text(iso(expiry))),
        (
            FieldKey::PassportCopy,
            FieldValue::File(FileReference {
                name: "passport-main-page.png".to_string(),
                size_bytes: 1_250_000,
                content_type: Some("image/png".to_string()),
            }),
        ),
        (
            FieldKey::AddressInAzerbaijan,
            FieldValue::text("Fairmont Baku, Flame Towers, 1A Mehdi Huseyn St"),
        ),
        (FieldKey::AcceptTerms, FieldValue::Flag(true)),
    ])
}
