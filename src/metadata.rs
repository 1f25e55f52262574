//! The variable-length metadata section.
//!
//! Serialized as compact UTF-8 JSON (no insignificant whitespace) with a
//! bounded key set; unknown keys are rejected on read so future versions
//! can gate cleanly instead of being silently half-understood.  The
//! algorithm histogram is a `BTreeMap` so the serialized bytes do not
//! depend on hash-map iteration order.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::analyzer::AnalysisReport;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Metadata {
    /// Profile name the file was produced with.
    pub profile: String,
    /// The global analysis the plan and strategies were derived from.
    pub analysis: AnalysisReport,
    /// Block count per algorithm name.
    pub algorithms: BTreeMap<String, u32>,
}

impl Metadata {
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
