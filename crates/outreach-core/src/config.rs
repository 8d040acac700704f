use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

use crate::context::ContextCaps;
use crate::error::EngineError;
use crate::pagination::DEFAULT_PAGE_SIZE;

pub const DEFAULT_GENERATION_MODEL: &str = "gpt-4o-mini";

fn missing_fields_error(what: &str, missing: &[&str]) -> Result<(), EngineError> {
    if missing.is_empty() {
        Ok(())
    } else {
        Err(EngineError::ConfigIncomplete(format!("{what} is missing {}", missing.join(", "))))
    }
}

/// Mask all but the last four characters of a secret.
#[must_use]
pub fn redact_secret(secret: &str) -> String {
    let chars = secret.chars().collect::<Vec<_>>();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let visible = chars[chars.len() - 4..].iter().collect::<String>();
    format!("{}{visible}", "*".repeat(chars.len() - 4))
}

/// Connection details for the remote table records are imported from.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct SourceProfile {
    pub api_key: String,
    pub base_id: String,
    pub table_name: String,
}

impl SourceProfile {
    /// # Errors
    /// Returns `ConfigIncomplete` listing every blank field.
    pub fn validate(&self) -> Result<(), EngineError> {
        let missing = [("api_key", &self.api_key), ("base_id", &self.base_id), ("table_name", &self.table_name)]
            .into_iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| name)
            .collect::<Vec<_>>();
        missing_fields_error("source profile", &missing)
    }

    #[must_use]
    pub fn redacted(&self) -> Self {
        Self { api_key: redact_secret(&self.api_key), ..self.clone() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct GenerationCredential {
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
}

fn default_model() -> String {
    DEFAULT_GENERATION_MODEL.to_string()
}

impl Default for GenerationCredential {
    fn default() -> Self {
        Self { api_key: String::new(), model: default_model() }
    }
}

impl GenerationCredential {
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self { api_key: api_key.into(), model: default_model() }
    }

    /// # Errors
    /// Returns `ConfigIncomplete` when the key or model is blank.
    pub fn validate(&self) -> Result<(), EngineError> {
        let missing = [("api_key", &self.api_key), ("model", &self.model)]
            .into_iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| name)
            .collect::<Vec<_>>();
        missing_fields_error("generation credential", &missing)
    }

    #[must_use]
    pub fn redacted(&self) -> Self {
        Self { api_key: redact_secret(&self.api_key), ..self.clone() }
    }
}

/// Fixed engine constants.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct EngineConfig {
    pub page_size: NonZeroUsize,
    pub context_caps: ContextCaps,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { page_size: DEFAULT_PAGE_SIZE, context_caps: ContextCaps::default() }
    }
}
