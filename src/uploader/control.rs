//! Upload lifecycle control -- remove, retry, reset, reject, request options, clear, shutdown.

use std::sync::atomic::Ordering;

use tokio::sync::oneshot;

use crate::error::{Error, Result};
use crate::request::RequestOptions;
use crate::types::{Event, UploadId, UploadResponse};

use super::{Command, Uploader};

impl Uploader {
    /// Remove an upload
    ///
    /// Marks the upload for removal, aborts its transfer if one is running and asks
    /// the session loop to prune it from the collection. Does not wait for the
    /// transport to confirm the abort; anything the transport reports afterwards is
    /// ignored. Removing an upload that is already marked is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the upload is not in the session.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use upload_orchestrator::*;
    /// # async fn example(uploader: Uploader, id: UploadId) -> Result<()> {
    /// uploader.remove(id).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn remove(&self, id: UploadId) -> Result<()> {
        {
            let mut state = self.pipeline.state.lock().await;
            let upload = state.registry.get_mut(&id).ok_or(Error::NotFound(id))?;
            if upload.marked_for_removal {
                return Ok(());
            }
            upload.mark_for_removal();
            upload.attempt += 1;
        }

        self.pipeline.cancel(id).await;

        if self.send(Command::Prune).is_err() {
            self.pipeline.prune().await;
        }

        tracing::info!(upload_id = id.0, "upload removed");
        self.pipeline.emit(Event::Removed { id });
        Ok(())
    }

    /// Run an upload again
    ///
    /// Aborts a running transfer of the same upload and starts a fresh one; other
    /// state is left as it is until the new transfer opens.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the upload is not in the session
    /// - [`Error::MissingRequestOptions`] if no URL can be resolved and no request
    ///   options factory is configured to supply one
    /// - [`Error::ShuttingDown`] after [`shutdown`](Self::shutdown)
    pub async fn retry(&self, id: UploadId) -> Result<()> {
        self.ensure_accepting()?;

        {
            let mut state = self.pipeline.state.lock().await;
            let upload = state
                .registry
                .get_mut(&id)
                .filter(|u| !u.marked_for_removal)
                .ok_or(Error::NotFound(id))?;

            if self.pipeline.hooks.request_options_factory.is_none() {
                let overrides = self.pipeline.overrides.read().await;
                if !upload.request_options.merged_with(&overrides).is_ready() {
                    return Err(Error::MissingRequestOptions { id });
                }
            }

            upload.upload_has_started = false;
            upload.attempt += 1;
        }

        self.pipeline.cancel(id).await;

        tracing::info!(upload_id = id.0, "retrying upload");
        let pipeline = self.pipeline.clone();
        tokio::spawn(async move { pipeline.execute(vec![id]).await });
        Ok(())
    }

    /// Return an upload to its just-created state, aborting any running transfer
    ///
    /// The upload stays in the collection as not started and is picked up again by
    /// the next execution round (or by [`retry`](Self::retry)).
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the upload is not in the session.
    pub async fn reset(&self, id: UploadId) -> Result<()> {
        {
            let mut state = self.pipeline.state.lock().await;
            let upload = state.registry.get_mut(&id).ok_or(Error::NotFound(id))?;
            upload.reset();
            upload.attempt += 1;
            self.pipeline.publish(&state);
        }

        self.pipeline.cancel(id).await;
        tracing::debug!(upload_id = id.0, "upload reset");
        Ok(())
    }

    /// Mark an upload as rejected, optionally recording the response that caused it
    ///
    /// The rejection is reported on the error stream as `UploadRejected`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the upload is not in the session.
    pub async fn reject(&self, id: UploadId, response: Option<UploadResponse>) -> Result<()> {
        let error = {
            let mut state = self.pipeline.state.lock().await;
            let upload = state.registry.get_mut(&id).ok_or(Error::NotFound(id))?;
            upload.reject(response);
            let error = upload.rejection_error();
            self.pipeline.publish(&state);
            error
        };

        self.pipeline.report(error);
        Ok(())
    }

    /// Shallow-merge `patch` into one upload's request options
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the upload is not in the session.
    pub async fn set_request_options(&self, id: UploadId, patch: RequestOptions) -> Result<()> {
        let mut state = self.pipeline.state.lock().await;
        let upload = state.registry.get_mut(&id).ok_or(Error::NotFound(id))?;
        upload.set_request_options(patch);
        self.pipeline.publish(&state);
        Ok(())
    }

    /// Patch the session-level request options, merged over every upload's own
    /// options when its request is built
    pub async fn patch_request_options(&self, patch: RequestOptions) {
        self.pipeline.overrides.write().await.patch(patch);
    }

    /// The session-level request options
    pub async fn request_options(&self) -> RequestOptions {
        self.pipeline.overrides.read().await.clone()
    }

    /// Empty the session
    ///
    /// Aborts every running transfer, stops every source listener, drops every
    /// upload, calls `clear()` on each registered source and resets drag-over.
    /// Sources have to be registered again afterwards.
    pub async fn clear(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        match self.send(Command::Reset { ack: ack_tx }) {
            Ok(()) => {
                ack_rx.await.ok();
            }
            Err(_) => self.pipeline.reset_session().await,
        }

        self.detach_sources().await;
        self.pipeline.set_drag_over(false);
        self.pipeline.emit(Event::Cleared);
    }

    /// Gracefully shut the session down
    ///
    /// Stops accepting files, clears the session and stops the session loop. Later
    /// calls to [`add_files`](Self::add_files) and [`retry`](Self::retry) fail with
    /// [`Error::ShuttingDown`].
    pub async fn shutdown(&self) {
        tracing::info!("Initiating upload session shutdown");

        self.accepting_new.store(false, Ordering::SeqCst);
        self.clear().await;
        self.pipeline.emit(Event::Shutdown);
        self.shutdown_token.cancel();

        tracing::info!("Upload session shutdown complete");
    }
}
