//! Villain record and write payload.
//!
//! # Responsibility
//! - Define the canonical `Villain` row and its wire field names.
//! - Convert optional payload fields into a full record with defaults.
//!
//! # Invariants
//! - `id` is never negative.
//! - `id == 0` means "unassigned"; the store generates a fresh id on insert.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Row identifier assigned by the store.
pub type VillainId = i64;

/// Id value carried by unsaved records.
pub const UNASSIGNED_ID: VillainId = 0;

/// Table holding every villain row.
pub const TABLE_NAME: &str = "villains";
/// Primary key column.
pub const COLUMN_ID: &str = "_id";
/// Name column, also the payload key for the name field.
pub const COLUMN_NAME: &str = "villain_name";
/// Series column, also the payload key for the series field.
pub const COLUMN_SERIES: &str = "series";
/// Payload key for an explicit id.
pub const FIELD_ID: &str = "id";

/// Seed rows loaded by `VillainRepository::seed_samples`.
pub const SAMPLE_VILLAINS: &[(&str, &str)] = &[
    ("Joker", "Batman"),
    ("DeathStroke", "Arrow"),
    ("Reverse Flash", "Flash"),
    ("Lex Luthor", "Superman"),
    ("Harley Quinn", "Suicide Squad"),
];

/// Persisted villain record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Villain {
    #[serde(default)]
    pub id: VillainId,
    #[serde(rename = "villain_name")]
    pub name: String,
    pub series: String,
}

impl Villain {
    /// Creates an unsaved villain; the store assigns the id on insert.
    pub fn new(name: impl Into<String>, series: impl Into<String>) -> Self {
        Self {
            id: UNASSIGNED_ID,
            name: name.into(),
            series: series.into(),
        }
    }

    /// Creates a villain bound to a caller-provided id.
    ///
    /// Inserting such a record upserts: an existing row with the same id is
    /// fully overwritten.
    pub fn with_id(
        id: VillainId,
        name: impl Into<String>,
        series: impl Into<String>,
    ) -> Result<Self, VillainValidationError> {
        let villain = Self {
            id,
            name: name.into(),
            series: series.into(),
        };
        villain.validate()?;
        Ok(villain)
    }

    /// Returns a copy of this record rebound to `id`.
    pub fn rebind(&self, id: VillainId) -> Self {
        Self {
            id,
            ..self.clone()
        }
    }

    /// Whether the record carries a store-assigned id.
    pub fn is_persisted(&self) -> bool {
        self.id > UNASSIGNED_ID
    }

    pub fn validate(&self) -> Result<(), VillainValidationError> {
        if self.id < UNASSIGNED_ID {
            return Err(VillainValidationError::NegativeId(self.id));
        }
        Ok(())
    }
}

/// Typed write payload for insert/update.
///
/// Absent fields take defaults: `id = 0`, `villain_name = ""`, `series = ""`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VillainValues {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<VillainId>,
    #[serde(
        rename = "villain_name",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series: Option<String>,
}

impl VillainValues {
    pub fn new(name: impl Into<String>, series: impl Into<String>) -> Self {
        Self {
            id: None,
            name: Some(name.into()),
            series: Some(series.into()),
        }
    }

    pub fn id(mut self, id: VillainId) -> Self {
        self.id = Some(id);
        self
    }

    /// Builds a full record, filling absent fields with defaults.
    pub fn to_villain(&self) -> Result<Villain, VillainValidationError> {
        let villain = Villain {
            id: self.id.unwrap_or(UNASSIGNED_ID),
            name: self.name.clone().unwrap_or_default(),
            series: self.series.clone().unwrap_or_default(),
        };
        villain.validate()?;
        Ok(villain)
    }
}

impl From<&Villain> for VillainValues {
    fn from(value: &Villain) -> Self {
        Self {
            id: Some(value.id),
            name: Some(value.name.clone()),
            series: Some(value.series.clone()),
        }
    }
}

/// Record-level validation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VillainValidationError {
    NegativeId(VillainId),
}

impl Display for VillainValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NegativeId(id) => write!(f, "villain id must not be negative, got {id}"),
        }
    }
}

impl Error for VillainValidationError {}
