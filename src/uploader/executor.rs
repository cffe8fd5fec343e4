//! Upload execution -- transport lifecycle for a single upload and per-round hooks.

use std::collections::HashMap;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;

use crate::error::UploadError;
use crate::request::{RequestOptions, UploadRequest};
use crate::transport::TransportEvent;
use crate::types::{Event, Progress, Upload, UploadId, UploadResponse, UploadState};

use super::{ActiveTransfer, Pipeline, WriteBack};

/// How a transfer ended, if it was not aborted
enum Outcome {
    Response(UploadResponse),
    TransportError(String),
}

impl Pipeline {
    /// Run the pre-flight hook over `ids`, then execute what it hands back
    pub(crate) async fn run_round(&self, ids: Vec<UploadId>) {
        let ids = self.preflight(ids).await;
        if !ids.is_empty() {
            self.execute(ids).await;
        }
    }

    /// Pre-flight: the hook sees the not-yet-started uploads and returns the set to run
    async fn preflight(&self, ids: Vec<UploadId>) -> Vec<UploadId> {
        let Some(on_queued) = self.hooks.on_queued.clone() else {
            return ids;
        };

        let queued: Vec<Upload> = {
            let state = self.state.lock().await;
            ids.iter()
                .filter_map(|id| state.registry.get(id))
                .filter(|u| !u.marked_for_removal && !u.upload_has_started)
                .cloned()
                .collect()
        };
        if queued.is_empty() {
            return Vec::new();
        }
        let attempts: HashMap<UploadId, u32> = queued.iter().map(|u| (u.id, u.attempt)).collect();

        let returned = on_queued(queued).await;

        let mut state = self.state.lock().await;
        let mut handed = Vec::with_capacity(returned.len());
        let mut removed = Vec::new();
        for upload in returned {
            let id = upload.id;
            let Some(&attempt) = attempts.get(&id) else {
                continue;
            };
            // started by a retry while the hook ran
            if handed.contains(&id)
                || state
                    .registry
                    .get(&id)
                    .is_none_or(|entry| entry.upload_has_started)
            {
                continue;
            }
            match state.write_back(upload, attempt) {
                WriteBack::Absorbed => handed.push(id),
                WriteBack::Removed => removed.push(id),
                WriteBack::Stale => {}
            }
        }
        self.publish(&state);
        drop(state);

        self.retire(removed).await;
        handed
    }

    /// Execute every upload concurrently and run the all-uploaded hook once all
    /// of them are terminal
    pub(crate) async fn execute(&self, ids: Vec<UploadId>) {
        let runs = ids.into_iter().map(|id| self.execute_one(id));
        let finished: Vec<Upload> = join_all(runs).await.into_iter().flatten().collect();

        if finished.is_empty() {
            return;
        }

        let uploads = match self.hooks.on_all_uploaded.clone() {
            Some(on_all_uploaded) => {
                let attempts: HashMap<UploadId, u32> =
                    finished.iter().map(|u| (u.id, u.attempt)).collect();
                let returned = on_all_uploaded(finished).await;

                let mut state = self.state.lock().await;
                let mut kept = Vec::with_capacity(returned.len());
                let mut removed = Vec::new();
                for upload in returned {
                    let Some(&attempt) = attempts.get(&upload.id) else {
                        continue;
                    };
                    let id = upload.id;
                    match state.write_back(upload.clone(), attempt) {
                        WriteBack::Removed => removed.push(id),
                        WriteBack::Absorbed | WriteBack::Stale => kept.push(upload),
                    }
                }
                self.publish(&state);
                drop(state);

                self.retire(removed).await;
                kept
            }
            None => finished,
        };

        tracing::info!(count = uploads.len(), "all uploads of round finished");
        self.emit(Event::AllUploaded { uploads });
    }

    /// Drive one upload from not-started to a terminal state
    ///
    /// Returns the final snapshot, or `None` when the upload was skipped, could not
    /// be started, or was aborted.
    pub(crate) async fn execute_one(&self, id: UploadId) -> Option<Upload> {
        // Phase 1: claim the upload
        let mut prepared = {
            let mut state = self.state.lock().await;
            let upload = state.registry.get_mut(&id)?;
            if upload.marked_for_removal || upload.upload_has_started {
                return None;
            }
            upload.upload_has_started = true;
            upload.clone()
        };

        // Phase 2: resolve request options and build the request
        prepared.request_options = self.resolve_options(&prepared).await;
        let request = match prepared.create_request(&self.config.body) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(upload_id = id.0, error = %e, "cannot start upload");
                if let Some(upload) = self.state.lock().await.registry.get_mut(&id) {
                    upload.upload_has_started = false;
                }
                self.report(UploadError::MissingRequestOptions { id });
                return None;
            }
        };

        // Phase 3: open transport
        let (attempt, token) = self.begin(id).await?;
        let outcome = self.transfer(id, attempt, &token, request).await;

        {
            let mut active = self.active.lock().await;
            if active.get(&id).is_some_and(|t| t.attempt == attempt) {
                active.remove(&id);
            }
        }

        // Phase 4: record the result
        let finished = self.finish(id, attempt, outcome?).await?;
        if !finished.succeeded() {
            return Some(finished);
        }

        match self.hooks.on_uploaded.clone() {
            Some(on_uploaded) => {
                let returned = on_uploaded(finished.clone()).await;
                let mut state = self.state.lock().await;
                match state.write_back(returned, attempt) {
                    WriteBack::Absorbed => {
                        let snapshot = state.registry.get(&id).cloned();
                        self.publish(&state);
                        snapshot
                    }
                    WriteBack::Removed => {
                        drop(state);
                        self.retire(vec![id]).await;
                        None
                    }
                    WriteBack::Stale => None,
                }
            }
            None => Some(finished),
        }
    }

    /// Entity options, patched by the factory result, with the session override merged last
    pub(crate) async fn resolve_options(&self, upload: &Upload) -> RequestOptions {
        let mut options = upload.request_options.clone();
        if let Some(factory) = &self.hooks.request_options_factory {
            options.patch(factory(upload.clone()).await);
        }
        let overrides = self.overrides.read().await;
        options.merged_with(&overrides)
    }

    /// Move the upload to `InProgress` and register its cancellation token
    async fn begin(&self, id: UploadId) -> Option<(u32, CancellationToken)> {
        let mut state = self.state.lock().await;
        let upload = state.registry.get_mut(&id)?;
        if upload.marked_for_removal || !upload.upload_has_started {
            return None;
        }

        upload.attempt += 1;
        upload.progress = Progress {
            percent: 0.0,
            state: UploadState::InProgress,
        };
        upload.response = None;
        upload.rejected = false;
        let attempt = upload.attempt;

        let token = CancellationToken::new();
        self.active.lock().await.insert(
            id,
            ActiveTransfer {
                attempt,
                token: token.clone(),
            },
        );
        self.publish(&state);
        drop(state);

        tracing::info!(upload_id = id.0, attempt, "upload started");
        self.emit(Event::Started { id });
        Some((attempt, token))
    }

    /// Consume transport events until completion, error or abort
    async fn transfer(
        &self,
        id: UploadId,
        attempt: u32,
        token: &CancellationToken,
        request: UploadRequest,
    ) -> Option<Outcome> {
        let mut operation = match self.transport.open(request).await {
            Ok(operation) => operation,
            Err(e) => return Some(Outcome::TransportError(e.to_string())),
        };

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    operation.abort();
                    tracing::debug!(upload_id = id.0, attempt, "upload aborted");
                    return None;
                }
                event = operation.next_event() => match event {
                    Some(TransportEvent::Progress { loaded, total }) => {
                        self.apply_progress(id, attempt, loaded, total).await;
                    }
                    Some(TransportEvent::Complete(response)) => {
                        return Some(Outcome::Response(response));
                    }
                    Some(TransportEvent::Error(message)) => {
                        return Some(Outcome::TransportError(message));
                    }
                    None => {
                        return Some(Outcome::TransportError(
                            "transport closed without a response".to_string(),
                        ));
                    }
                },
            }
        }
    }

    /// Apply a progress report if it moves the percentage forward
    async fn apply_progress(&self, id: UploadId, attempt: u32, loaded: u64, total: Option<u64>) {
        let Some(total) = total.filter(|t| *t > 0) else {
            return;
        };
        let percent = ((loaded as f64 / total as f64) * 100.0).min(100.0) as f32;

        let mut state = self.state.lock().await;
        let Some(upload) = state.registry.get_mut(&id) else {
            return;
        };
        if upload.attempt != attempt
            || upload.marked_for_removal
            || upload.progress.state != UploadState::InProgress
            || percent <= upload.progress.percent
        {
            return;
        }
        upload.progress.percent = percent;
        self.publish(&state);
        drop(state);

        self.emit(Event::Progress { id, percent });
    }

    /// Record the terminal state of an attempt that is still current
    async fn finish(&self, id: UploadId, attempt: u32, outcome: Outcome) -> Option<Upload> {
        let mut state = self.state.lock().await;
        let upload = state.registry.get_mut(&id)?;
        if upload.attempt != attempt || upload.marked_for_removal {
            return None;
        }

        let (event, error) = match outcome {
            Outcome::Response(response) if response.is_success() => {
                tracing::info!(upload_id = id.0, status = response.status_code, "upload completed");
                let status_code = response.status_code;
                upload.progress = Progress {
                    percent: 100.0,
                    state: UploadState::Completed,
                };
                upload.response = Some(response);
                (Event::Completed { id, status_code }, None)
            }
            Outcome::Response(response) => {
                upload.progress.state = UploadState::Failed;
                upload.reject(Some(response));
                let error = upload.rejection_error();
                (
                    Event::Failed {
                        id,
                        error: error.clone(),
                    },
                    Some(error),
                )
            }
            Outcome::TransportError(message) => {
                upload.progress.state = UploadState::Failed;
                let error = UploadError::TransportError { id, message };
                (
                    Event::Failed {
                        id,
                        error: error.clone(),
                    },
                    Some(error),
                )
            }
        };

        let snapshot = upload.clone();
        self.publish(&state);
        drop(state);

        self.emit(event);
        if let Some(error) = error {
            self.report(error);
        }
        Some(snapshot)
    }
}
