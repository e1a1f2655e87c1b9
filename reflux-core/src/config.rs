//! Runtime configuration.
//!
//! Configuration can be built in code or loaded from JSON. Missing fields fall
//! back to their defaults.
//!
//! ```json
//! { "name": "checkout-form", "max_flush_passes": 32, "trace_evaluations": true }
//! ```

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Tunables for a [`Runtime`](crate::reactive::Runtime).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Name attached to every log line emitted by the runtime.
    pub name: String,

    /// Upper bound on follow-up passes a single flush may run when effects
    /// write to signals that other effects depend on.
    pub max_flush_passes: usize,

    /// Emit a `trace` event for every memo and effect evaluation.
    pub trace_evaluations: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            name: "reflux".to_string(),
            max_flush_passes: 100,
            trace_evaluations: false,
        }
    }
}

impl RuntimeConfig {
    /// Parse and validate a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_flush_passes == 0 {
            return Err(ConfigError::Invalid(
                "max_flush_passes must be at least 1".to_string(),
            ));
        }
        if self.name.trim().is_empty() {
            return Err(ConfigError::Invalid("name must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_max_flush_passes(mut self, passes: usize) -> Self {
        self.max_flush_passes = passes;
        self
    }

    pub fn with_trace_evaluations(mut self, enabled: bool) -> Self {
        self.trace_evaluations = enabled;
        self
    }
}
