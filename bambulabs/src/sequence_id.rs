//! Sequence ids correlate a request on `device/{serial}/request` with the
//! printer's answer on `device/{serial}/report`.

use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::Result;
use parse_display::{Display, FromStr};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

static NEXT_SEQUENCE_ID: AtomicU32 = AtomicU32::new(1);

/// Key under which the most recent `push_status` report is stored.
const STATUS_KEY: &str = "status";

/// A request/response correlation id. Printers echo it back either as a
/// number or as a quoted string depending on firmware.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema, Display, FromStr)]
#[serde(untagged)]
#[display("{0}")]
pub enum SequenceId {
    /// A string sequence id.
    String(String),
    /// An integer sequence id.
    Integer(u32),
}

impl SequenceId {
    /// Allocate the next process-wide sequence id.
    pub fn new() -> Self {
        Self::Integer(NEXT_SEQUENCE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// The slot holding the latest status push, which printers send with
    /// their own unrelated sequence ids.
    pub fn status() -> Self {
        Self::String(STATUS_KEY.to_owned())
    }

    /// Normalize to the integer form, so `"12"` and `12` compare equal.
    pub fn as_u32(&self) -> Result<u32> {
        match self {
            Self::String(s) => s.parse().map_err(Into::into),
            Self::Integer(i) => Ok(*i),
        }
    }
}

impl Default for SequenceId {
    fn default() -> Self {
        Self::new()
    }
}
