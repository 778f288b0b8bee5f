//! Provenance block shared by every artifact.

use std::time::{SystemTime, UNIX_EPOCH};

use dl_core::Result;
use serde::Serialize;

/// Tool name recorded in artifacts.
pub const TOOL: &str = "didlab";

/// Who produced an artifact and when.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtifactMeta {
    /// Producing tool.
    pub tool: String,
    /// Tool version.
    pub tool_version: String,
    /// Creation time (ms since the Unix epoch).
    pub created_unix_ms: u128,
}

impl ArtifactMeta {
    /// Meta stamped with the current time.
    pub fn now() -> Result<Self> {
        Ok(Self {
            tool: TOOL.to_string(),
            tool_version: dl_core::VERSION.to_string(),
            created_unix_ms: now_unix_ms()?,
        })
    }
}

fn now_unix_ms() -> Result<u128> {
    let d = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| dl_core::Error::Computation(format!("system time error: {}", e)))?;
    Ok(d.as_millis())
}
