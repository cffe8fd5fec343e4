//! Admission policy for raw files (size and content type)

use crate::config::Config;
use crate::error::UploadError;
use crate::hooks::{Hooks, SizeMessageFn, TypeMessageFn};
use crate::types::RawFile;

/// Screens raw files before they become uploads
///
/// Checks run in a fixed order: size first, then content type. The first
/// violation wins and is returned as an [`UploadError`] carrying a formatted
/// message.
#[derive(Clone)]
pub struct PolicyFilter {
    allowed_types: Vec<String>,
    accepts_any: bool,
    max_file_size: Option<u64>,
    type_message: Option<TypeMessageFn>,
    size_message: Option<SizeMessageFn>,
}

impl PolicyFilter {
    /// Build the filter from session configuration
    pub fn new(config: &Config, hooks: &Hooks) -> Self {
        let allowed_types: Vec<String> = config
            .allowed_types
            .iter()
            .map(|t| normalize_mime(t))
            .collect();
        let accepts_any = allowed_types.iter().any(|t| t == "*" || t == "*/*");

        Self {
            allowed_types,
            accepts_any,
            max_file_size: config.max_file_size,
            type_message: hooks.disallowed_type_message.clone(),
            size_message: hooks.file_size_message.clone(),
        }
    }

    /// Admit or reject one file
    pub fn check(&self, file: &RawFile) -> Result<(), UploadError> {
        if let Some(limit) = self.max_file_size
            && file.size >= limit
        {
            let message = match &self.size_message {
                Some(format) => format(file, limit),
                None => format!(
                    "File \"{}\" is {} bytes, which meets or exceeds the limit of {} bytes",
                    file.name, file.size, limit
                ),
            };
            return Err(UploadError::FileSizeLimitExceeded {
                file_name: file.name.clone(),
                size: file.size,
                limit,
                message,
            });
        }

        if !self.allows_type(&file.mime_type) {
            let message = match &self.type_message {
                Some(format) => format(file),
                None => format!(
                    "File \"{}\" has content type \"{}\", which is not allowed",
                    file.name, file.mime_type
                ),
            };
            return Err(UploadError::DisallowedContentType {
                file_name: file.name.clone(),
                mime_type: file.mime_type.clone(),
                message,
            });
        }

        Ok(())
    }

    /// Whether the content type passes the allowed-type set
    pub fn allows_type(&self, mime_type: &str) -> bool {
        if self.accepts_any {
            return true;
        }
        let mime = normalize_mime(mime_type);
        self.allowed_types
            .iter()
            .any(|pattern| mime_matches(pattern, &mime))
    }
}

impl std::fmt::Debug for PolicyFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyFilter")
            .field("allowed_types", &self.allowed_types)
            .field("max_file_size", &self.max_file_size)
            .finish_non_exhaustive()
    }
}

/// Lowercase and strip parameters (`text/plain; charset=utf-8` → `text/plain`)
fn normalize_mime(mime: &str) -> String {
    mime.split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Match a normalized type against a normalized pattern (`image/*` covers a family)
fn mime_matches(pattern: &str, mime: &str) -> bool {
    if pattern == mime {
        return true;
    }
    match pattern.strip_suffix("/*") {
        Some(family) => mime
            .split_once('/')
            .is_some_and(|(top, _)| top == family),
        None => false,
    }
}
