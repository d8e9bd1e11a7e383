//! Deployment settings loaded from TOML.
//!
//! ```toml
//! verbosity = "debug"        # or "production" (default)
//! inheritance = "override"   # or "stack"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use bastion_contracts::error::{BastionError, BastionResult};

use crate::context::{ContextConfig, RequestContext, Verbosity};
use crate::visitor::InheritanceMode;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub verbosity: Verbosity,
    pub inheritance: InheritanceMode,
}

impl Settings {
    /// Parse `s` as TOML.
    ///
    /// Returns `BastionError::ConfigError` if the TOML is malformed or has
    /// keys other than the ones above.
    pub fn from_toml_str(s: &str) -> BastionResult<Self> {
        toml::from_str(s).map_err(|e| BastionError::ConfigError {
            reason: format!("failed to parse settings TOML: {}", e),
        })
    }

    pub fn from_file(path: &Path) -> BastionResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| BastionError::ConfigError {
            reason: format!("failed to read settings file '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }

    /// Context configuration with this deployment's strategy pair.
    pub fn context_config(&self) -> ContextConfig {
        ContextConfig::new().verbosity(self.verbosity)
    }

    /// A fresh request context. `granted` of `None` means the caller has no
    /// permission set at all.
    pub fn context<I, S>(&self, granted: Option<I>) -> RequestContext
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let config = match granted {
            Some(granted) => self.context_config().granted(granted),
            None => self.context_config(),
        };
        RequestContext::new(config)
    }
}
