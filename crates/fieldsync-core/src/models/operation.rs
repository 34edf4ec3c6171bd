//! Outbox operation model

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::Error;

/// A unique identifier for an operation, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(Uuid);

impl OperationId {
    /// Create a new unique operation ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for OperationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s.trim())?))
    }
}

/// Kind of record an operation targets (`inspection`, `template`, `user`, ...).
///
/// Open-ended on purpose: the engine routes on the name and never needs to
/// know the full set. Names are stored trimmed and lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityType(String);

impl EntityType {
    pub const INSPECTION: &'static str = "inspection";
    pub const TEMPLATE: &'static str = "template";
    pub const USER: &'static str = "user";

    pub fn new(name: impl AsRef<str>) -> Result<Self, Error> {
        let name = name.as_ref().trim().to_ascii_lowercase();
        if name.is_empty() {
            return Err(Error::InvalidInput("entity type cannot be empty".into()));
        }
        if name.chars().any(char::is_whitespace) {
            return Err(Error::InvalidInput(format!(
                "entity type cannot contain whitespace: {name:?}"
            )));
        }
        Ok(Self(name))
    }

    #[must_use]
    pub fn inspection() -> Self {
        Self(Self::INSPECTION.to_string())
    }

    #[must_use]
    pub fn template() -> Self {
        Self(Self::TEMPLATE.to_string())
    }

    #[must_use]
    pub fn user() -> Self {
        Self(Self::USER.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for EntityType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for EntityType {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<EntityType> for String {
    fn from(value: EntityType) -> Self {
        value.0
    }
}

/// Mutation kind carried by an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Update,
    Delete,
}

impl Action {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(Error::InvalidInput(format!(
                "unknown action {other:?} (expected create, update or delete)"
            ))),
        }
    }
}

/// A single durable record of one local mutation awaiting transmission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    /// Unique identifier, fixed at enqueue time
    pub id: OperationId,
    /// Kind of record the mutation applies to
    pub entity_type: EntityType,
    /// Mutation kind
    pub action: Action,
    /// Opaque data handed to the remote API as-is
    pub payload: Value,
    /// Enqueue timestamp (Unix ms)
    pub created_at: i64,
    /// Set once the remote API confirmed the mutation; never cleared
    pub synced: bool,
    /// Number of failed delivery attempts
    #[serde(default)]
    pub attempts: u32,
    /// Message from the most recent failed attempt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// When the operation was parked after a permanent failure (Unix ms)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dead_lettered_at: Option<i64>,
}

impl Operation {
    /// Create a new, unsynced operation stamped with `created_at`
    #[must_use]
    pub fn new(entity_type: EntityType, action: Action, payload: Value, created_at: i64) -> Self {
        Self {
            id: OperationId::new(),
            entity_type,
            action,
            payload,
            created_at,
            synced: false,
            attempts: 0,
            last_error: None,
            dead_lettered_at: None,
        }
    }

    /// Eligible for the next sync pass
    pub const fn is_pending(&self) -> bool {
        !self.synced && self.dead_lettered_at.is_none()
    }

    pub const fn is_dead_lettered(&self) -> bool {
        !self.synced && self.dead_lettered_at.is_some()
    }

    /// Age relative to `now_ms`, never negative
    pub const fn age_ms(&self, now_ms: i64) -> i64 {
        let age = now_ms.saturating_sub(self.created_at);
        if age < 0 {
            0
        } else {
            age
        }
    }
}
