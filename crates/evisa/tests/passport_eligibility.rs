use chrono::{Duration, NaiveDate};
use evisa::workflows::visa::{
    validate_passport_expiry, EligibilityResult, PASSPORT_VALIDITY_AFTER_ARRIVAL_DAYS,
};

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 12, 20).expect("valid date")
}

fn iso(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

#[test]
fn validity_window_crosses_the_year_boundary() {
    let arrival = NaiveDate::from_ymd_opt(2026, 1, 5).expect("valid date");
    let threshold = arrival + Duration::days(PASSPORT_VALIDITY_AFTER_ARRIVAL_DAYS as i64);
    assert_eq!(threshold, NaiveDate::from_ymd_opt(2026, 7, 4).expect("valid date"));

    let rejected = validate_passport_expiry(&iso(threshold), Some(&iso(arrival)), today());
    assert_eq!(
        rejected.reason(),
        Some(
            "Passport must be valid for at least 6 months after your planned arrival date. Minimum required expiry: 7/4/2026."
        )
    );

    let accepted = validate_passport_expiry(
        &iso(threshold + Duration::days(1)),
        Some(&iso(arrival)),
        today(),
    );
    assert_eq!(accepted, EligibilityResult::Valid);
}

#[test]
fn expiry_checks_run_before_arrival_parsing() {
    let result = validate_passport_expiry(&iso(today()), Some("garbage"), today());
    assert_eq!(
        result.reason(),
        Some("Passport has already expired or expires today.")
    );
}

#[test]
fn results_serialize_with_a_status_tag() {
    let invalid = EligibilityResult::Invalid("Passport expiry date is required.".to_string());
    assert_eq!(
        serde_json::to_value(&invalid).expect("serializes"),
        serde_json::json!({
            "status": "invalid",
            "reason": "Passport expiry date is required."
        })
    );
    assert_eq!(
        serde_json::to_value(EligibilityResult::Valid).expect("serializes"),
        serde_json::json!({ "status": "valid" })
    );
}
