use serde::{Deserialize, Serialize}; // For entry (de)serialization to store documents
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// --- Domain Errors ---
#[derive(Error, Debug, PartialEq)]
pub enum DomainError {
    #[error("Field '{0}' is not a known entry field")]
    UnknownField(String),
    #[error("Invalid field value for field '{field}': {reason}")]
    InvalidFieldValue { field: String, reason: String },
    #[error("Unknown access level '{0}' (expected Full, Basic or None)")]
    InvalidAccessLevel(String),
}

// --- RFID ---

/// Tag value identifying an entry. Acts as the lookup key in the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rfid(String);

impl Rfid {
    pub fn new(rfid: impl Into<String>) -> Self {
        Self(rfid.into())
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}
impl From<String> for Rfid {
    fn from(rfid: String) -> Self {
        Self(rfid)
    }
}
impl From<&str> for Rfid {
    fn from(rfid: &str) -> Self {
        Self(rfid.to_string())
    }
}
impl From<Rfid> for String {
    fn from(rfid: Rfid) -> Self {
        rfid.0
    }
}
impl fmt::Display for Rfid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// --- Access Level ---

/// Permission tier of an entry.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessLevel {
    Full,
    Basic,
    None,
}

impl AccessLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessLevel::Full => "Full",
            AccessLevel::Basic => "Basic",
            AccessLevel::None => "None",
        }
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessLevel {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Full" => Ok(AccessLevel::Full),
            "Basic" => Ok(AccessLevel::Basic),
            "None" => Ok(AccessLevel::None),
            other => Err(DomainError::InvalidAccessLevel(other.to_string())),
        }
    }
}

// --- Entry ---

/// An access-control record keyed by its RFID.
///
/// Stored documents may carry store-owned keys (such as `_id`); they are
/// ignored when reading an entry back.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub rfid: Rfid,
    pub name: String,
    #[serde(rename = "accessLevel")] // Stored key used by existing collections
    pub access_level: AccessLevel,
}

impl Entry {
    pub fn new(rfid: impl Into<Rfid>, name: impl Into<String>, access_level: AccessLevel) -> Self {
        Self {
            rfid: rfid.into(),
            name: name.into(),
            access_level,
        }
    }
}

// --- Entry Fields ---

/// The closed set of fields an entry has.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryField {
    Rfid,
    Name,
    AccessLevel,
}

impl EntryField {
    pub const ALL: [EntryField; 3] = [EntryField::Rfid, EntryField::Name, EntryField::AccessLevel];

    /// Key under which the field is stored in a document.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryField::Rfid => "rfid",
            EntryField::Name => "name",
            EntryField::AccessLevel => "accessLevel",
        }
    }
}

impl fmt::Display for EntryField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryField {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntryField::ALL
            .into_iter()
            .find(|field| field.as_str() == s)
            .ok_or_else(|| DomainError::UnknownField(s.to_string()))
    }
}

// --- Entry Patch ---

/// Partial update of an entry. Unset fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryPatch {
    pub rfid: Option<Rfid>,
    pub name: Option<String>,
    pub access_level: Option<AccessLevel>,
}

impl EntryPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rfid(mut self, rfid: impl Into<Rfid>) -> Self {
        self.rfid = Some(rfid.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_access_level(mut self, access_level: AccessLevel) -> Self {
        self.access_level = Some(access_level);
        self
    }

    /// Set fields with their stored values, in declaration order.
    pub fn fields(&self) -> Vec<(EntryField, Value)> {
        let mut fields = Vec::with_capacity(3);
        if let Some(rfid) = &self.rfid {
            fields.push((EntryField::Rfid, Value::String(rfid.as_str().to_string())));
        }
        if let Some(name) = &self.name {
            fields.push((EntryField::Name, Value::String(name.clone())));
        }
        if let Some(level) = self.access_level {
            fields.push((EntryField::AccessLevel, Value::String(level.as_str().to_string())));
        }
        fields
    }

    /// Document containing only the set fields, keyed by their stored names.
    pub fn to_document(&self) -> Map<String, Value> {
        self.fields()
            .into_iter()
            .map(|(field, value)| (field.as_str().to_string(), value))
            .collect()
    }

    /// Builds a patch from an untyped document, rejecting keys that are not
    /// entry fields and values of the wrong type.
    pub fn from_document(document: &Map<String, Value>) -> Result<Self, DomainError> {
        let mut patch = EntryPatch::new();
        for (key, value) in document {
            let field: EntryField = key.parse()?;
            let text = value.as_str().ok_or_else(|| DomainError::InvalidFieldValue {
                field: key.clone(),
                reason: format!("Expected a text string, got {:?}", value),
            })?;
            match field {
                EntryField::Rfid => patch.rfid = Some(Rfid::new(text)),
                EntryField::Name => patch.name = Some(text.to_string()),
                EntryField::AccessLevel => {
                    let level = text.parse().map_err(|_| DomainError::InvalidFieldValue {
                        field: key.clone(),
                        reason: format!("'{}' is not an access level", text),
                    })?;
                    patch.access_level = Some(level);
                }
            }
        }
        Ok(patch)
    }
}
