use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::test_helpers::*;
use super::*;
use crate::error::UploadError;
use crate::hooks::Hooks;
use crate::request::RequestOptions;
use crate::source::{DragEvent, DropItem, DropPayload};
use crate::transport::TransportEvent;
use crate::types::{Event, RawFile, UploadResponse, UploadState};

mod control;
