//! Localized caller-facing messages
//!
//! The failure boundary never shows the text of an unexpected failure. It
//! answers with a generic message in the caller's preferred language instead,
//! falling back to the configured default locale.

use std::collections::HashMap;

use crate::config::MessagesConfig;

/// Used when neither the caller's locale nor the default locale has a message
const BUILTIN_GENERIC_FAILURE: &str = "An unexpected error occurred. Please try again later.";

/// Lookup table for generic failure messages
#[derive(Debug, Clone)]
pub struct MessageCatalog {
    default_locale: String,
    generic_failure: HashMap<String, String>,
}

impl MessageCatalog {
    /// Build the catalog from configuration
    pub fn from_config(config: &MessagesConfig) -> Self {
        Self {
            default_locale: config.default_locale.to_ascii_lowercase(),
            generic_failure: config
                .generic_failure
                .iter()
                .map(|(locale, text)| (locale.to_ascii_lowercase(), text.clone()))
                .collect(),
        }
    }

    /// Generic failure message for the given locale
    ///
    /// Tries the full tag (`pt-br`), then its primary subtag (`pt`), then the
    /// default locale.
    ///
    /// # Example
    ///
    /// ```rust
    /// use api_pipeline::messages::MessageCatalog;
    ///
    /// let catalog = MessageCatalog::default();
    /// assert!(catalog.generic_failure(Some("fr-CA")).starts_with("Une erreur"));
    /// assert!(catalog.generic_failure(None).starts_with("An unexpected"));
    /// ```
    pub fn generic_failure(&self, locale: Option<&str>) -> &str {
        locale
            .map(str::to_ascii_lowercase)
            .and_then(|tag| {
                let primary = tag.split('-').next().unwrap_or_default().to_string();
                self.generic_failure
                    .get(&tag)
                    .or_else(|| self.generic_failure.get(&primary))
            })
            .or_else(|| self.generic_failure.get(&self.default_locale))
            .map_or(BUILTIN_GENERIC_FAILURE, String::as_str)
    }
}

impl Default for MessageCatalog {
    fn default() -> Self {
        Self::from_config(&MessagesConfig::default())
    }
}
