//! Batch accumulation and the session loop.
//!
//! Batches are folded strictly in arrival order by a single task, so the
//! collection is always the left fold of every batch, removal and reset seen so
//! far.

use std::collections::HashSet;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::types::{Event, UploadId};

use super::{Command, Pipeline, SessionState};

/// One step of the fold
#[derive(Debug)]
pub(crate) enum Batch {
    /// Empty the collection and the registry
    Reset,
    /// Ids of registered uploads, in source order
    Uploads(Vec<UploadId>),
}

/// What a fold step changed
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct FoldOutcome {
    /// Ids that entered the collection
    pub(crate) added: Vec<UploadId>,
    /// Ids dropped from the registry because they were marked for removal
    pub(crate) evicted: Vec<UploadId>,
    /// Ids of a batch rejected by the count limit
    pub(crate) rolled_back: Vec<UploadId>,
    /// The limit that rejected the batch
    pub(crate) limit_exceeded: Option<usize>,
}

/// Fold one batch into the session state (`limit == 0` means unlimited)
pub(crate) fn fold(state: &mut SessionState, batch: Batch, limit: usize) -> FoldOutcome {
    let mut outcome = FoldOutcome::default();

    let incoming = match batch {
        Batch::Reset => {
            outcome.evicted = state.registry.keys().copied().collect();
            outcome.evicted.sort();
            state.registry.clear();
            state.collection.clear();
            return outcome;
        }
        Batch::Uploads(ids) => ids,
    };
    let attempted = incoming.len();

    let mut seen = HashSet::new();
    let mut candidate = Vec::with_capacity(state.collection.len() + incoming.len());
    let mut removed = Vec::new();

    let previous = std::mem::take(&mut state.collection);
    let mut keep = |id: UploadId, candidate: &mut Vec<UploadId>| {
        let live = state
            .registry
            .get(&id)
            .is_some_and(|u| !u.marked_for_removal);
        if !live {
            removed.push(id);
        } else if seen.insert(id) {
            candidate.push(id);
        }
    };
    for id in previous {
        keep(id, &mut candidate);
    }
    let kept_previous = candidate.len();
    for id in incoming {
        keep(id, &mut candidate);
    }

    for id in removed {
        if state.registry.remove(&id).is_some() {
            outcome.evicted.push(id);
        }
    }

    let added = candidate.split_off(kept_previous);
    let total = kept_previous + added.len();
    if limit > 0 && (attempted > limit || total > limit) {
        for id in &added {
            state.registry.remove(id);
        }
        outcome.rolled_back = added;
        outcome.limit_exceeded = Some(limit);
    } else {
        candidate.extend(added.iter().copied());
        outcome.added = added;
    }

    state.collection = candidate;
    outcome
}

/// Session loop: apply commands one at a time until shutdown
pub(crate) async fn run(
    pipeline: Pipeline,
    mut commands: mpsc::UnboundedReceiver<Command>,
    shutdown: CancellationToken,
) {
    tracing::debug!("session loop started");

    loop {
        let command = tokio::select! {
            biased;
            command = commands.recv() => match command {
                Some(command) => command,
                None => break,
            },
            _ = shutdown.cancelled() => break,
        };

        match command {
            Command::Batch { ids, replace, ack } => {
                pipeline.apply_batch(ids, replace, ack).await;
            }
            Command::Prune => pipeline.prune().await,
            Command::Reset { ack } => {
                pipeline.reset_session().await;
                ack.send(()).ok();
            }
        }
    }

    tracing::debug!("session loop stopped");
}

impl Pipeline {
    /// Fold a batch, publish, and start a round for anything not yet started
    pub(crate) async fn apply_batch(
        &self,
        ids: Vec<UploadId>,
        replace: bool,
        ack: Option<oneshot::Sender<Vec<UploadId>>>,
    ) {
        let attempted = ids.len();
        let mut state = self.state.lock().await;

        let mut replaced = Vec::new();
        if replace {
            for id in state.collection.clone() {
                if let Some(upload) = state.registry.get_mut(&id)
                    && !upload.marked_for_removal
                {
                    upload.mark_for_removal();
                    upload.attempt += 1;
                    replaced.push(id);
                }
            }
        }

        let limit = self.count_limit();
        let outcome = fold(&mut state, Batch::Uploads(ids), limit);
        self.publish(&state);

        let queued: Vec<(UploadId, String)> = outcome
            .added
            .iter()
            .filter_map(|id| state.registry.get(id).map(|u| (*id, u.name.clone())))
            .collect();
        let pending = state.pending();
        drop(state);

        for id in &replaced {
            self.cancel(*id).await;
            self.emit(Event::Removed { id: *id });
        }

        if let Some(limit) = outcome.limit_exceeded {
            tracing::warn!(
                limit,
                attempted,
                rolled_back = outcome.rolled_back.len(),
                "batch rejected by file count limit"
            );
            if let Some(on_limit_exceeded) = &self.hooks.on_limit_exceeded {
                on_limit_exceeded(limit);
            }
            self.emit(Event::LimitExceeded { limit, attempted });
        }

        for (id, name) in queued {
            tracing::debug!(upload_id = id.0, name = %name, "upload queued");
            self.emit(Event::Queued { id, name });
        }

        if let Some(ack) = ack {
            ack.send(outcome.added).ok();
        }

        if !pending.is_empty() {
            let round = self.clone();
            tokio::spawn(async move { round.run_round(pending).await });
        }
    }

    /// Drop removed entries and republish
    pub(crate) async fn prune(&self) {
        let mut state = self.state.lock().await;
        let outcome = fold(&mut state, Batch::Uploads(Vec::new()), 0);
        if !outcome.evicted.is_empty() {
            tracing::debug!(evicted = outcome.evicted.len(), "pruned removed uploads");
        }
        self.publish(&state);
    }

    /// Cancel all transfers and empty the session
    pub(crate) async fn reset_session(&self) {
        let mut state = self.state.lock().await;
        self.cancel_all().await;
        let outcome = fold(&mut state, Batch::Reset, 0);
        tracing::info!(evicted = outcome.evicted.len(), "upload session cleared");
        self.publish(&state);
    }
}
