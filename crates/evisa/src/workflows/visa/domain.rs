use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Every field captured by the application form, in schema order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldKey {
    Nationality,
    TravelDocumentType,
    PurposeOfVisit,
    DateOfArrival,
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
    PassportNumber,
    PassportIssueDate,
    PassportExpiryDate,
    PassportCopy,
    AddressInAzerbaijan,
    AcceptTerms,
}

impl FieldKey {
    pub const ALL: [FieldKey; 20] = [
        FieldKey::Nationality,
        FieldKey::TravelDocumentType,
        FieldKey::PurposeOfVisit,
        FieldKey::DateOfArrival,
        FieldKey::Surname,
        FieldKey::GivenNames,
        FieldKey::DateOfBirth,
        FieldKey::CountryOfBirth,
        FieldKey::PlaceOfBirth,
        FieldKey::Sex,
        FieldKey::Occupation,
        FieldKey::MobileNumber,
        FieldKey::PermanentAddress,
        FieldKey::EmailAddress,
        FieldKey::PassportNumber,
        FieldKey::PassportIssueDate,
        FieldKey::PassportExpiryDate,
        FieldKey::PassportCopy,
        FieldKey::AddressInAzerbaijan,
        FieldKey::AcceptTerms,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            FieldKey::Nationality => "nationality",
            FieldKey::TravelDocumentType => "travelDocumentType",
            FieldKey::PurposeOfVisit => "purposeOfVisit",
            FieldKey::DateOfArrival => "dateOfArrival",
            FieldKey::Surname => "surname",
            FieldKey::GivenNames => "givenNames",
            FieldKey::DateOfBirth => "dateOfBirth",
            FieldKey::CountryOfBirth => "countryOfBirth",
            FieldKey::PlaceOfBirth => "placeOfBirth",
            FieldKey::Sex => "sex",
            FieldKey::Occupation => "occupation",
            FieldKey::MobileNumber => "mobileNumber",
            FieldKey::PermanentAddress => "permanentAddress",
            FieldKey::EmailAddress => "emailAddress",
            FieldKey::PassportNumber => "passportNumber",
            FieldKey::PassportIssueDate => "passportIssueDate",
            FieldKey::PassportExpiryDate => "passportExpiryDate",
            FieldKey::PassportCopy => "passportCopy",
            FieldKey::AddressInAzerbaijan => "addressInAzerbaijan",
            FieldKey::AcceptTerms => "acceptTerms",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|key| key.as_str() == raw.trim())
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Uploaded document handle. Only meaningful for the lifetime of the session that received it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileReference {
    pub name: String,
    pub size_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

/// Value held for a single form field.
///
/// Serialized untagged so drafts and API payloads read like plain form JSON:
/// `null`, `true`, `"text"`, or `{ "name": .., "size_bytes": .. }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Empty,
    Flag(bool),
    Text(String),
    File(FileReference),
}

impl FieldValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// True when the value carries nothing a required-field check would accept.
    pub fn is_blank(&self) -> bool {
        match self {
            FieldValue::Empty => true,
            FieldValue::Flag(_) => false,
            FieldValue::Text(text) => text.trim().is_empty(),
            FieldValue::File(_) => false,
        }
    }

    /// Human readable rendering used by summaries.
    pub fn display(&self) -> Option<String> {
        match self {
            FieldValue::Empty => None,
            FieldValue::Flag(flag) => Some(if *flag { "Yes" } else { "No" }.to_string()),
            FieldValue::Text(text) if text.trim().is_empty() => None,
            FieldValue::Text(text) => Some(text.trim().to_string()),
            FieldValue::File(file) => Some(file.name.clone()),
        }
    }
}

static EMPTY_VALUE: FieldValue = FieldValue::Empty;

/// Field values for one application. Every [`FieldKey`] is always present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicationState {
    values: BTreeMap<FieldKey, FieldValue>,
}

impl ApplicationState {
    pub fn initial() -> Self {
        let values = FieldKey::ALL
            .into_iter()
            .map(|key| (key, Self::default_value(key)))
            .collect();
        Self { values }
    }

    /// Build a state from a partial map, filling absent keys with their defaults.
    pub fn from_values(values: BTreeMap<FieldKey, FieldValue>) -> Self {
        let mut state = Self::initial();
        state.values.extend(values);
        state
    }

    fn default_value(key: FieldKey) -> FieldValue {
        match key {
            FieldKey::AcceptTerms => FieldValue::Flag(false),
            _ => FieldValue::Empty,
        }
    }

    pub fn get(&self, key: FieldKey) -> &FieldValue {
        self.values.get(&key).unwrap_or(&EMPTY_VALUE)
    }

    /// Trimmed text for `key`, or `None` when the field is blank or not text.
    pub fn text(&self, key: FieldKey) -> Option<&str> {
        match self.get(key) {
            FieldValue::Text(text) => Some(text.trim()).filter(|text| !text.is_empty()),
            _ => None,
        }
    }

    pub fn flag(&self, key: FieldKey) -> bool {
        matches!(self.get(key), FieldValue::Flag(true))
    }

    pub fn file(&self, key: FieldKey) -> Option<&FileReference> {
        match self.get(key) {
            FieldValue::File(file) => Some(file),
            _ => None,
        }
    }

    pub fn set(&mut self, key: FieldKey, value: FieldValue) {
        self.values.insert(key, value);
    }

    /// Apply updates and report which keys actually changed.
    pub fn merge(&mut self, updates: BTreeMap<FieldKey, FieldValue>) -> Vec<FieldKey> {
        let mut changed = Vec::new();
        for (key, value) in updates {
            if self.get(key) != &value {
                self.values.insert(key, value);
                changed.push(key);
            }
        }
        changed
    }

    /// Drop uploaded file handles; they cannot outlive the session that received them.
    pub fn without_transient_files(mut self) -> Self {
        for value in self.values.values_mut() {
            if matches!(value, FieldValue::File(_)) {
                *value = FieldValue::Empty;
            }
        }
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (FieldKey, &FieldValue)> {
        self.values.iter().map(|(key, value)| (*key, value))
    }
}

impl Default for ApplicationState {
    fn default() -> Self {
        Self::initial()
    }
}

/// Identifier for an in-progress application session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
