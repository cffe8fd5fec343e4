//! Configuration types for upload-orchestrator
//!
//! [`Config`] holds the plain, serializable settings. Behaviour that needs code
//! (dynamic limits, request factories, lifecycle callbacks) lives in
//! [`Hooks`](crate::hooks::Hooks).

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::request::{BodyMode, RequestOptions};

/// Bytes per mebibyte, the unit used by [`Config::max_file_size_mib`]
pub const MIB: u64 = 1024 * 1024;

/// Main configuration for an [`Uploader`](crate::Uploader) session
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Accepted content types (default: `["*"]`)
    ///
    /// `*` and `*/*` accept everything, `image/*` accepts a whole family,
    /// anything else must match the file's declared type exactly
    /// (case-insensitive, parameters ignored).
    #[serde(default = "default_allowed_types")]
    pub allowed_types: Vec<String>,

    /// Maximum number of files in the accumulated collection (0 = unlimited)
    ///
    /// Superseded by [`Hooks::file_count_limit`](crate::hooks::Hooks) when that is set.
    #[serde(default)]
    pub max_files: usize,

    /// Files whose size meets or exceeds this many bytes are rejected (None = unlimited)
    #[serde(default)]
    pub max_file_size: Option<u64>,

    /// Request options every new upload starts with
    #[serde(default)]
    pub request_options: RequestOptions,

    /// How the file is placed in the request body
    #[serde(default)]
    pub body: BodyMode,

    /// Capacity of the event and error broadcast channels (default: 1000)
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            allowed_types: default_allowed_types(),
            max_files: 0,
            max_file_size: None,
            request_options: RequestOptions::default(),
            body: BodyMode::default(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl Config {
    /// Set the size limit in mebibytes (1 MiB = 1024 * 1024 bytes)
    pub fn max_file_size_mib(mut self, mib: u64) -> Self {
        self.max_file_size = Some(mib.saturating_mul(MIB));
        self
    }

    /// Check the configuration for values the session cannot work with
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the offending key.
    pub fn validate(&self) -> Result<()> {
        if self.allowed_types.is_empty() {
            return Err(config_error(
                "allowed_types must contain at least one entry (use \"*\" to accept everything)",
                "allowed_types",
            ));
        }

        if let Some(bad) = self.allowed_types.iter().find(|t| t.trim().is_empty()) {
            return Err(config_error(
                format!("allowed_types contains an empty entry: {bad:?}"),
                "allowed_types",
            ));
        }

        if self.max_file_size == Some(0) {
            return Err(config_error(
                "max_file_size of 0 would reject every file; leave it unset for no limit",
                "max_file_size",
            ));
        }

        if let Some(url) = &self.request_options.url {
            url::Url::parse(url).map_err(|e| {
                config_error(
                    format!("request_options.url is not a valid URL: {e}"),
                    "request_options.url",
                )
            })?;
        }

        if let BodyMode::Multipart { file_field } = &self.body
            && file_field.is_empty()
        {
            return Err(config_error(
                "multipart file_field must not be empty",
                "body.file_field",
            ));
        }

        if self.event_buffer == 0 {
            return Err(config_error(
                "event_buffer must be greater than zero",
                "event_buffer",
            ));
        }

        Ok(())
    }
}

fn config_error(message: impl Into<String>, key: &str) -> Error {
    Error::Config {
        message: message.into(),
        key: Some(key.to_string()),
    }
}

fn default_allowed_types() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_event_buffer() -> usize {
    1000
}
