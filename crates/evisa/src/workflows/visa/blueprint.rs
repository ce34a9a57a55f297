use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::domain::{FieldKey, FieldValue};

/// One-based position of a step within the form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepId(pub u32);

impl StepId {
    pub const FIRST: StepId = StepId(1);

    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChoiceOption {
    pub value: &'static str,
    pub label: &'static str,
}

/// Input shape of a field; drives both rendering and validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "options", rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Choice(&'static [ChoiceOption]),
    Date,
    File,
    Flag,
}

impl FieldKind {
    /// Whether `value` has a shape this kind can hold. Blank values are always accepted.
    pub fn accepts(&self, value: &FieldValue) -> bool {
        match (self, value) {
            (_, FieldValue::Empty) => true,
            (FieldKind::Flag, FieldValue::Flag(_)) => true,
            (FieldKind::File, FieldValue::File(_)) => true,
            (FieldKind::Text | FieldKind::Choice(_) | FieldKind::Date, FieldValue::Text(_)) => {
                true
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldSpec {
    pub key: FieldKey,
    pub kind: FieldKind,
    pub label: &'static str,
    #[serde(skip)]
    pub required_message: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepDefinition {
    pub id: StepId,
    pub title: String,
    pub fields: Vec<FieldKey>,
}

impl StepDefinition {
    pub fn new(id: u32, title: impl Into<String>, fields: impl Into<Vec<FieldKey>>) -> Self {
        Self {
            id: StepId(id),
            title: title.into(),
            fields: fields.into(),
        }
    }

    pub fn contains(&self, key: FieldKey) -> bool {
        self.fields.contains(&key)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BlueprintError {
    #[error("a form needs at least one step")]
    NoSteps,
    #[error("step ids must run 1..=N in order (expected {expected}, found {found})")]
    NonContiguousStep { expected: u32, found: u32 },
    #[error("step {step} references field '{field}' missing from the schema")]
    UnknownField { step: StepId, field: FieldKey },
    #[error("field '{0}' is declared more than once in the schema")]
    DuplicateField(FieldKey),
}

/// Immutable field schema plus the ordered steps that partition it.
#[derive(Debug, Clone)]
pub struct FormBlueprint {
    fields: Vec<FieldSpec>,
    steps: Vec<StepDefinition>,
}

impl FormBlueprint {
    pub fn new(fields: Vec<FieldSpec>, steps: Vec<StepDefinition>) -> Result<Self, BlueprintError> {
        if steps.is_empty() {
            return Err(BlueprintError::NoSteps);
        }

        let mut declared = BTreeSet::new();
        for spec in &fields {
            if !declared.insert(spec.key) {
                return Err(BlueprintError::DuplicateField(spec.key));
            }
        }

        for (index, step) in steps.iter().enumerate() {
            let expected = index as u32 + 1;
            if step.id.0 != expected {
                return Err(BlueprintError::NonContiguousStep {
                    expected,
                    found: step.id.0,
                });
            }
            if let Some(field) = step.fields.iter().find(|key| !declared.contains(*key)) {
                return Err(BlueprintError::UnknownField {
                    step: step.id,
                    field: *field,
                });
            }
        }

        Ok(Self { fields, steps })
    }

    /// The four-step e-visa application.
    pub fn standard() -> Self {
        Self {
            fields: standard_fields(),
            steps: standard_steps(),
        }
    }

    /// The standard schema split into caller-supplied steps.
    pub fn with_steps(steps: Vec<StepDefinition>) -> Result<Self, BlueprintError> {
        Self::new(standard_fields(), steps)
    }

    pub fn steps(&self) -> &[StepDefinition] {
        &self.steps
    }

    pub fn step(&self, id: StepId) -> Option<&StepDefinition> {
        self.steps.iter().find(|step| step.id == id)
    }

    pub fn step_count(&self) -> u32 {
        self.steps.len() as u32
    }

    pub fn last_step(&self) -> StepId {
        StepId(self.step_count())
    }

    pub fn contains_step(&self, id: StepId) -> bool {
        (1..=self.step_count()).contains(&id.0)
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn field(&self, key: FieldKey) -> Option<&FieldSpec> {
        self.fields.iter().find(|spec| spec.key == key)
    }

    /// First step that owns `key`, if any.
    pub fn step_for_field(&self, key: FieldKey) -> Option<StepId> {
        self.steps
            .iter()
            .find(|step| step.contains(key))
            .map(|step| step.id)
    }
}

const fn option(value: &'static str, label: &'static str) -> ChoiceOption {
    ChoiceOption { value, label }
}

const NATIONALITY_OPTIONS: &[ChoiceOption] = &[
    option("usa", "USA"),
    option("uk", "United Kingdom"),
    option("can", "Canada"),
    option("other", "Other"),
];

const TRAVEL_DOCUMENT_OPTIONS: &[ChoiceOption] = &[
    option("ordinary_passport", "Ordinary Passport"),
    option("diplomatic_passport", "Diplomatic Passport"),
    option("service_passport", "Service Passport"),
];

const PURPOSE_OF_VISIT_OPTIONS: &[ChoiceOption] = &[
    option("tourism", "Tourism"),
    option("business", "Business"),
    option("education", "Education"),
    option("family_visit", "Family Visit"),
    option("other", "Other"),
];

const COUNTRY_OF_BIRTH_OPTIONS: &[ChoiceOption] = &[
    option("usa", "USA"),
    option("uk", "United Kingdom"),
    option("can", "Canada"),
    option("aze", "Azerbaijan"),
    option("tur", "Turkey"),
    option("other", "Other"),
];

const SEX_OPTIONS: &[ChoiceOption] = &[
    option("male", "Male"),
    option("female", "Female"),
    option("other", "Other"),
];

const OCCUPATION_OPTIONS: &[ChoiceOption] = &[
    option("employed", "Employed"),
    option("student", "Student"),
    option("unemployed", "Unemployed"),
    option("retired", "Retired"),
    option("other", "Other"),
];

fn standard_fields() -> Vec<FieldSpec> {
    use FieldKey::*;

    vec![
        FieldSpec {
            key: Nationality,
            kind: FieldKind::Choice(NATIONALITY_OPTIONS),
            label: "Nationality / Citizenship",
            required_message: "Nationality is required",
        },
        FieldSpec {
            key: TravelDocumentType,
            kind: FieldKind::Choice(TRAVEL_DOCUMENT_OPTIONS),
            label: "Travel Document Type",
            required_message: "Travel document type is required",
        },
        FieldSpec {
            key: PurposeOfVisit,
            kind: FieldKind::Choice(PURPOSE_OF_VISIT_OPTIONS),
            label: "Purpose of Visit",
            required_message: "Purpose of visit is required",
        },
        FieldSpec {
            key: DateOfArrival,
            kind: FieldKind::Date,
            label: "Date of Arrival in Azerbaijan",
            required_message: "Date of arrival is required",
        },
        FieldSpec {
            key: Surname,
            kind: FieldKind::Text,
            label: "Surname (as per travel document)",
            required_message: "Surname is required",
        },
        FieldSpec {
            key: GivenNames,
            kind: FieldKind::Text,
            label: "Other Names / Given Name(s) (as per travel document)",
            required_message: "Given name(s) is required",
        },
        FieldSpec {
            key: DateOfBirth,
            kind: FieldKind::Date,
            label: "Date of Birth",
            required_message: "Date of birth is required",
        },
        FieldSpec {
            key: CountryOfBirth,
            kind: FieldKind::Choice(COUNTRY_OF_BIRTH_OPTIONS),
            label: "Country of Birth",
            required_message: "Country of birth is required",
        },
        FieldSpec {
            key: PlaceOfBirth,
            kind: FieldKind::Text,
            label: "Place of Birth (City/Town)",
            required_message: "Place of birth is required",
        },
        FieldSpec {
            key: Sex,
            kind: FieldKind::Choice(SEX_OPTIONS),
            label: "Sex",
            required_message: "Sex is required",
        },
        FieldSpec {
            key: Occupation,
            kind: FieldKind::Choice(OCCUPATION_OPTIONS),
            label: "Occupation",
            required_message: "Occupation is required",
        },
        FieldSpec {
            key: MobileNumber,
            kind: FieldKind::Text,
            label: "Mobile Number (with country code)",
            required_message: "Mobile number is required",
        },
        FieldSpec {
            key: PermanentAddress,
            kind: FieldKind::Text,
            label: "Permanent Residential Address",
            required_message: "Permanent address is required",
        },
        FieldSpec {
            key: EmailAddress,
            kind: FieldKind::Text,
            label: "E-mail Address",
            required_message: "Email address is required",
        },
        FieldSpec {
            key: PassportNumber,
            kind: FieldKind::Text,
            label: "Passport Number",
            required_message: "Passport number is required",
        },
        FieldSpec {
            key: PassportIssueDate,
            kind: FieldKind::Date,
            label: "Passport Issue Date",
            required_message: "Passport issue date is required",
        },
        FieldSpec {
            key: PassportExpiryDate,
            kind: FieldKind::Date,
            label: "Passport Expiry Date",
            required_message: "Passport expiry date is required",
        },
        FieldSpec {
            key: PassportCopy,
            kind: FieldKind::File,
            label: "Copy of Passport (Main Page)",
            required_message: "Passport copy is required.",
        },
        FieldSpec {
            key: AddressInAzerbaijan,
            kind: FieldKind::Text,
            label: "Address in Azerbaijan (Hotel Name, Full Address, etc.)",
            required_message: "Address in Azerbaijan is required",
        },
        FieldSpec {
            key: AcceptTerms,
            kind: FieldKind::Flag,
            label: "I have read and accept the Terms and Conditions",
            required_message: "You must accept the terms and conditions to proceed.",
        },
    ]
}

fn standard_steps() -> Vec<StepDefinition> {
    use FieldKey::*;

    vec![
        StepDefinition::new(
            1,
            "Basic Information & Travel Details",
            [Nationality, TravelDocumentType, PurposeOfVisit, DateOfArrival],
        ),
        StepDefinition::new(
            2,
            "Personal Details",
            [
                Surname,
                GivenNames,
                DateOfBirth,
                CountryOfBirth,
                PlaceOfBirth,
                Sex,
                Occupation,
                MobileNumber,
                PermanentAddress,
                EmailAddress,
            ],
        ),
        StepDefinition::new(
            3,
            "Passport Information & Upload",
            [
                PassportNumber,
                PassportIssueDate,
                PassportExpiryDate,
                PassportCopy,
                AddressInAzerbaijan,
            ],
        ),
        StepDefinition::new(4, "Review & Terms", [AcceptTerms]),
    ]
}
