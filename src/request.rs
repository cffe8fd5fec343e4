//! Request options and transport-ready requests

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::types::{RawFile, Upload};

/// HTTP method used for an upload
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// POST (default)
    #[default]
    Post,
    /// PUT
    Put,
    /// PATCH
    Patch,
}

impl HttpMethod {
    /// Method name as sent on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
        }
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
        }
    }
}

/// Options an upload's request is built from
///
/// Every key is optional so that options can be layered: session defaults, the
/// upload's own options, the per-upload factory result and finally the session
/// override.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestOptions {
    /// Target URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// HTTP method (POST when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<HttpMethod>,

    /// Extra request headers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,

    /// Extra multipart fields (ignored for raw bodies)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form_data: Option<HashMap<String, String>>,
}

impl RequestOptions {
    /// Options with only a URL set
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Default::default()
        }
    }

    /// Set the method
    pub fn method(mut self, method: HttpMethod) -> Self {
        self.method = Some(method);
        self
    }

    /// Add one header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .get_or_insert_with(HashMap::new)
            .insert(name.into(), value.into());
        self
    }

    /// Add one multipart field
    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.form_data
            .get_or_insert_with(HashMap::new)
            .insert(name.into(), value.into());
        self
    }

    /// Shallow merge: every key set in `patch` replaces the current value wholesale
    pub fn patch(&mut self, patch: RequestOptions) {
        if patch.url.is_some() {
            self.url = patch.url;
        }
        if patch.method.is_some() {
            self.method = patch.method;
        }
        if patch.headers.is_some() {
            self.headers = patch.headers;
        }
        if patch.form_data.is_some() {
            self.form_data = patch.form_data;
        }
    }

    /// Layer `overrides` on top of these options.
    ///
    /// Top-level keys in `overrides` win; header and field maps are merged key by
    /// key with the override's entries winning on conflict.
    pub fn merged_with(&self, overrides: &RequestOptions) -> RequestOptions {
        RequestOptions {
            url: overrides.url.clone().or_else(|| self.url.clone()),
            method: overrides.method.or(self.method),
            headers: merge_maps(self.headers.as_ref(), overrides.headers.as_ref()),
            form_data: merge_maps(self.form_data.as_ref(), overrides.form_data.as_ref()),
        }
    }

    /// Whether a request can be built from these options
    pub fn is_ready(&self) -> bool {
        self.url.as_deref().is_some_and(|u| !u.is_empty())
    }
}

fn merge_maps(
    base: Option<&HashMap<String, String>>,
    overrides: Option<&HashMap<String, String>>,
) -> Option<HashMap<String, String>> {
    match (base, overrides) {
        (None, None) => None,
        (Some(b), None) => Some(b.clone()),
        (None, Some(o)) => Some(o.clone()),
        (Some(b), Some(o)) => {
            let mut merged = b.clone();
            merged.extend(o.iter().map(|(k, v)| (k.clone(), v.clone())));
            Some(merged)
        }
    }
}

/// How the file is placed in the request body
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum BodyMode {
    /// `multipart/form-data` with the extra fields plus the file under `file_field`
    Multipart {
        /// Name of the form field carrying the file
        #[serde(default = "default_file_field")]
        file_field: String,
    },
    /// The file bytes are the whole body
    Raw,
}

impl Default for BodyMode {
    fn default() -> Self {
        BodyMode::Multipart {
            file_field: default_file_field(),
        }
    }
}

fn default_file_field() -> String {
    "file".to_string()
}

/// Request body as handed to a transport
#[derive(Clone, Debug)]
pub enum RequestBody {
    /// Multipart fields plus the file
    Multipart {
        /// Extra text fields
        fields: HashMap<String, String>,
        /// Field name carrying the file
        file_field: String,
        /// The file
        file: RawFile,
    },
    /// Raw file bytes
    Raw(RawFile),
}

impl RequestBody {
    /// The file carried by this body
    pub fn file(&self) -> &RawFile {
        match self {
            RequestBody::Multipart { file, .. } | RequestBody::Raw(file) => file,
        }
    }
}

/// A transport-ready request
#[derive(Clone, Debug)]
pub struct UploadRequest {
    /// HTTP method
    pub method: HttpMethod,
    /// Target URL
    pub url: String,
    /// Request headers
    pub headers: HashMap<String, String>,
    /// Request body
    pub body: RequestBody,
}

impl Upload {
    /// Assemble the request for the current request options
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingRequestOptions`] when no URL has been set.
    pub fn create_request(&self, body_mode: &BodyMode) -> Result<UploadRequest> {
        let url = match self.request_options.url.as_deref() {
            Some(url) if !url.is_empty() => url.to_string(),
            _ => return Err(Error::MissingRequestOptions { id: self.id }),
        };

        let body = match body_mode {
            BodyMode::Multipart { file_field } => RequestBody::Multipart {
                fields: self.request_options.form_data.clone().unwrap_or_default(),
                file_field: file_field.clone(),
                file: self.file.clone(),
            },
            BodyMode::Raw => RequestBody::Raw(self.file.clone()),
        };

        Ok(UploadRequest {
            method: self.request_options.method.unwrap_or_default(),
            url,
            headers: self.request_options.headers.clone().unwrap_or_default(),
            body,
        })
    }
}
