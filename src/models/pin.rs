use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;

use crate::pagination::Timestamped;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PinStatus {
    Queued,
    Pinning,
    Pinned,
    PinError,
}

#[derive(Debug, Error)]
#[error("unknown pin status '{0}'")]
pub struct UnknownPinStatus(pub String);

impl PinStatus {
    pub const ALL: [PinStatus; 4] = [
        PinStatus::Queued,
        PinStatus::Pinning,
        PinStatus::Pinned,
        PinStatus::PinError,
    ];

    /// Stored representation.
    pub fn as_str(self) -> &'static str {
        match self {
            PinStatus::Queued => "Queued",
            PinStatus::Pinning => "Pinning",
            PinStatus::Pinned => "Pinned",
            PinStatus::PinError => "PinError",
        }
    }
}

impl fmt::Display for PinStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepts both the stored names and the lowercase pinning-service names
/// (`queued`, `pinning`, `pinned`, `failed`).
impl FromStr for PinStatus {
    type Err = UnknownPinStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "queued" => Ok(PinStatus::Queued),
            "pinning" => Ok(PinStatus::Pinning),
            "pinned" => Ok(PinStatus::Pinned),
            "failed" | "pinerror" => Ok(PinStatus::PinError),
            _ => Err(UnknownPinStatus(s.to_string())),
        }
    }
}

impl TryFrom<String> for PinStatus {
    type Error = UnknownPinStatus;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Pin {
    pub id: i64,
    pub cid: String,
    pub name: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: PinStatus,
    pub location: String,
    pub created: String,
    pub updated: String,
}

impl Timestamped for Pin {
    fn created(&self) -> &str {
        &self.created
    }

    fn id(&self) -> i64 {
        self.id
    }
}
