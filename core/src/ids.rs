use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Prefix of every locally generated correlation id.
pub const TEMP_ID_PREFIX: &str = "tmp-";

static NEXT_TEMP_ID: AtomicU64 = AtomicU64::new(1);

/// Client-generated correlation id for an optimistic entity.
///
/// Unique for the lifetime of the process and never reused. Never issued by
/// the server: the `tmp-` prefix keeps it visually distinct and `EntityId`
/// keeps it in a separate namespace from server ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TempId(u64);

impl TempId {
    pub fn next() -> Self {
        TempId(NEXT_TEMP_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn counter(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TempId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{TEMP_ID_PREFIX}{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{0}' is not a temp id")]
pub struct ParseTempIdError(String);

impl FromStr for TempId {
    type Err = ParseTempIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_prefix(TEMP_ID_PREFIX)
            .and_then(|n| n.parse::<u64>().ok())
            .map(TempId)
            .ok_or_else(|| ParseTempIdError(s.to_string()))
    }
}

impl Serialize for TempId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TempId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Identity of a visible entity: the temp id while optimistic, the canonical
/// server id once confirmed. The two variants never compare equal.
/// Serializes as the bare id string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityId {
    Temp(TempId),
    Server(String),
}

impl EntityId {
    pub fn temp(&self) -> Option<TempId> {
        match self {
            EntityId::Temp(id) => Some(*id),
            EntityId::Server(_) => None,
        }
    }

    pub fn server(&self) -> Option<&str> {
        match self {
            EntityId::Temp(_) => None,
            EntityId::Server(id) => Some(id),
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Temp(id) => fmt::Display::fmt(id, f),
            EntityId::Server(id) => f.write_str(id),
        }
    }
}

impl Serialize for EntityId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl From<TempId> for EntityId {
    fn from(id: TempId) -> Self {
        EntityId::Temp(id)
    }
}
