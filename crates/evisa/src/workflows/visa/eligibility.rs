//! Passport validity rules relative to the planned arrival date.
//!
//! Everything here is pure: callers pass `today` explicitly, and
//! [`validate_passport_expiry_today`] is the only entry point that reads the clock.

use chrono::{DateTime, Days, Local, NaiveDate, NaiveDateTime};
use serde::Serialize;

/// Days past arrival the passport must stay valid: 90 days of visa validity plus a 90 day
/// buffer. The comparison against this threshold is strict; expiring exactly on
/// `arrival + 180 days` is rejected.
pub const PASSPORT_VALIDITY_AFTER_ARRIVAL_DAYS: u64 = 180;

pub const EXPIRY_REQUIRED: &str = "Passport expiry date is required.";
pub const EXPIRY_MALFORMED: &str = "Invalid passport expiry date format.";
pub const EXPIRY_NOT_IN_FUTURE: &str = "Passport has already expired or expires today.";
pub const ARRIVAL_MALFORMED: &str = "Invalid date of arrival format for validation.";

/// Outcome of an eligibility check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum EligibilityResult {
    Valid,
    Invalid(String),
}

impl EligibilityResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, EligibilityResult::Valid)
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            EligibilityResult::Valid => None,
            EligibilityResult::Invalid(reason) => Some(reason),
        }
    }

    pub fn into_result(self) -> Result<(), String> {
        match self {
            EligibilityResult::Valid => Ok(()),
            EligibilityResult::Invalid(reason) => Err(reason),
        }
    }

    fn invalid(reason: impl Into<String>) -> Self {
        EligibilityResult::Invalid(reason.into())
    }
}

/// Parse a form date string. Accepts `YYYY-MM-DD` and timestamps whose time of day is dropped.
pub fn parse_calendar_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(trimmed)
                .ok()
                .map(|timestamp| timestamp.date_naive())
        })
        .or_else(|| {
            NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S")
                .ok()
                .map(|timestamp| timestamp.date())
        })
}

/// Latest expiry date that is still rejected for a given arrival.
pub fn minimum_expiry_for(arrival: NaiveDate) -> Option<NaiveDate> {
    arrival.checked_add_days(Days::new(PASSPORT_VALIDITY_AFTER_ARRIVAL_DAYS))
}

/// Month/day/year without padding, as the form's locale renders dates.
pub fn format_display_date(date: NaiveDate) -> String {
    date.format("%-m/%-d/%Y").to_string()
}

pub fn validate_passport_expiry(
    expiry: &str,
    arrival: Option<&str>,
    today: NaiveDate,
) -> EligibilityResult {
    if expiry.is_empty() {
        return EligibilityResult::invalid(EXPIRY_REQUIRED);
    }

    let Some(expiry) = parse_calendar_date(expiry) else {
        return EligibilityResult::invalid(EXPIRY_MALFORMED);
    };

    if expiry <= today {
        return EligibilityResult::invalid(EXPIRY_NOT_IN_FUTURE);
    }

    let Some(arrival) = arrival.filter(|raw| !raw.is_empty()) else {
        return EligibilityResult::Valid;
    };

    let Some(minimum) = parse_calendar_date(arrival).and_then(minimum_expiry_for) else {
        return EligibilityResult::invalid(ARRIVAL_MALFORMED);
    };

    // `<=` keeps the historical behaviour: exactly 180 days after arrival does not pass.
    if expiry <= minimum {
        return EligibilityResult::Invalid(format!(
            "Passport must be valid for at least 6 months after your planned arrival date. \
             Minimum required expiry: {}.",
            format_display_date(minimum)
        ));
    }

    EligibilityResult::Valid
}

pub fn validate_passport_expiry_today(expiry: &str, arrival: Option<&str>) -> EligibilityResult {
    validate_passport_expiry(expiry, arrival, Local::now().date_naive())
}
