use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;

use super::blueprint::{FieldKind, FieldSpec, FormBlueprint, StepDefinition, StepId};
use super::domain::{ApplicationState, FieldKey, FieldValue, FileReference};
use super::eligibility::{parse_calendar_date, validate_passport_expiry};
use super::flow::{FieldErrors, StepValidator, StepVerdict};

pub const MAX_UPLOAD_BYTES: u64 = 6 * 1024 * 1024;
pub const ACCEPTED_UPLOAD_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".pdf"];

fn mobile_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\+?[1-9]\d{1,14}$").expect("mobile pattern compiles"))
}

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^[A-Z0-9._%+-]+@[A-Z0-9.-]+\.[A-Z]{2,}$").expect("email pattern compiles")
    })
}

fn passport_number_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9]+$").expect("passport pattern compiles"))
}

/// Validate a single field against its schema entry and any cross-field rule.
pub fn validate_field(
    spec: &FieldSpec,
    state: &ApplicationState,
    today: NaiveDate,
) -> Result<(), String> {
    match spec.kind {
        FieldKind::Flag => {
            return if state.flag(spec.key) {
                Ok(())
            } else {
                Err(spec.required_message.to_string())
            };
        }
        FieldKind::File => {
            return match state.file(spec.key) {
                Some(file) => validate_upload(file),
                None => Err(spec.required_message.to_string()),
            };
        }
        _ => {}
    }

    let Some(text) = state.text(spec.key) else {
        return Err(spec.required_message.to_string());
    };

    if let FieldKind::Choice(options) = spec.kind {
        if !options.iter().any(|option| option.value == text) {
            return Err(format!("Please select a valid {}", spec.label.to_lowercase()));
        }
    }

    match spec.key {
        FieldKey::DateOfArrival => match parse_calendar_date(text) {
            Some(arrival) if arrival >= today => Ok(()),
            _ => Err("Arrival date cannot be in the past".to_string()),
        },
        FieldKey::DateOfBirth => match parse_calendar_date(text) {
            Some(birth) if birth < today => Ok(()),
            _ => Err("Date of birth must be in the past.".to_string()),
        },
        FieldKey::PassportIssueDate => match parse_calendar_date(text) {
            Some(issued) if issued <= today => Ok(()),
            _ => Err("Issue date cannot be in the future.".to_string()),
        },
        FieldKey::PassportExpiryDate => {
            validate_passport_expiry(text, state.text(FieldKey::DateOfArrival), today)
                .into_result()
        }
        FieldKey::MobileNumber if !mobile_pattern().is_match(text) => {
            Err("Invalid phone number format (e.g., +1234567890)".to_string())
        }
        FieldKey::EmailAddress if !email_pattern().is_match(text) => {
            Err("Invalid email address".to_string())
        }
        FieldKey::PassportNumber if !passport_number_pattern().is_match(text) => {
            Err("Passport number should not contain symbols or spaces".to_string())
        }
        _ => Ok(()),
    }
}

fn validate_upload(file: &FileReference) -> Result<(), String> {
    if file.size_bytes > MAX_UPLOAD_BYTES {
        return Err(format!(
            "File size must be less than {}MB.",
            MAX_UPLOAD_BYTES / (1024 * 1024)
        ));
    }

    let extension = match file.name.rsplit_once('.') {
        Some((_, ext)) => format!(".{}", ext.to_ascii_lowercase()),
        None => format!(".{}", file.name.to_ascii_lowercase()),
    };
    if !ACCEPTED_UPLOAD_EXTENSIONS.contains(&extension.as_str()) {
        return Err(format!(
            "Invalid file type. Accepted formats: {}.",
            ACCEPTED_UPLOAD_EXTENSIONS.join(",")
        ));
    }

    Ok(())
}

/// Run every rule for `keys`, collecting one message per failing field.
pub fn validate_fields(
    blueprint: &FormBlueprint,
    keys: &[FieldKey],
    state: &ApplicationState,
    today: NaiveDate,
) -> FieldErrors {
    keys.iter()
        .filter_map(|key| blueprint.field(*key))
        .filter_map(|spec| {
            validate_field(spec, state, today)
                .err()
                .map(|message| (spec.key, message))
        })
        .collect()
}

/// Steps before `step` whose fields do not currently validate.
pub fn failing_steps_before(
    blueprint: &FormBlueprint,
    step: StepId,
    state: &ApplicationState,
    today: NaiveDate,
) -> Vec<StepId> {
    blueprint
        .steps()
        .iter()
        .take_while(|definition| definition.id < step)
        .filter(|definition| {
            !validate_fields(blueprint, &definition.fields, state, today).is_empty()
        })
        .map(|definition| definition.id)
        .collect()
}

/// Step validator over the live form state, evaluated as of `today`.
pub struct FieldRuleValidator<'a> {
    blueprint: &'a FormBlueprint,
    state: &'a ApplicationState,
    today: NaiveDate,
}

impl<'a> FieldRuleValidator<'a> {
    pub fn new(
        blueprint: &'a FormBlueprint,
        state: &'a ApplicationState,
        today: NaiveDate,
    ) -> Self {
        Self {
            blueprint,
            state,
            today,
        }
    }
}

impl StepValidator for FieldRuleValidator<'_> {
    async fn validate_step(&self, step: &StepDefinition) -> StepVerdict {
        StepVerdict::from_errors(validate_fields(
            self.blueprint,
            &step.fields,
            self.state,
            self.today,
        ))
    }
}

/// Shape check used before accepting updates into the form state.
pub fn check_value_kind(blueprint: &FormBlueprint, key: FieldKey, value: &FieldValue) -> bool {
    blueprint
        .field(key)
        .map(|spec| spec.kind.accepts(value))
        .unwrap_or(false)
}
