//! # Live Queries
//!
//! Keeps a query's results current while its inputs change. One driver task
//! owns one live query and reacts to three inputs:
//!
//! - the query definition (compared structurally)
//! - a revision signal fired after every committed write
//! - the acting user's identity
//!
//! Every trigger (re)arms a single debounce deadline, so bursts coalesce
//! into one evaluation and a superseded evaluation is simply never started.
//! When the deadline fires the driver evaluates the latest definition it
//! has seen and commits the result only if no newer definition arrived
//! while it was evaluating.
//!
//! Callers without change notification use `run_once`.

use crate::executor::Row;
use crate::graph::SemanticGraph;
use crate::primitives::DEFAULT_DEBOUNCE_MS;
use crate::query::QueryDef;
use crate::types::UserId;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, watch};
use tokio::time::Instant;

/// Observable state of a live query.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum LiveState {
    /// No result for the current definition yet.
    #[default]
    Loading,
    Ready(Vec<Row>),
    /// The definition did not compile.
    Failed(String),
}

impl LiveState {
    #[must_use]
    pub fn rows(&self) -> Option<&[Row]> {
        match self {
            LiveState::Ready(rows) => Some(rows),
            _ => None,
        }
    }
}

/// Driver for one live query over a shared graph.
#[derive(Debug, Clone)]
pub struct LiveQuery {
    graph: Arc<RwLock<SemanticGraph>>,
    debounce: Duration,
}

impl LiveQuery {
    #[must_use]
    pub fn new(graph: Arc<RwLock<SemanticGraph>>) -> Self {
        Self {
            graph,
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
        }
    }

    #[must_use]
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    #[must_use]
    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    /// Evaluate `def` exactly once.
    pub async fn run_once(&self, def: Option<&QueryDef>, user: Option<&UserId>) -> LiveState {
        self.evaluate(def, user).await
    }

    /// Drive the live query until the definition sender or every output
    /// receiver is dropped.
    pub async fn run(
        self,
        mut definitions: watch::Receiver<Option<QueryDef>>,
        mut changes: watch::Receiver<u64>,
        mut session: watch::Receiver<Option<UserId>>,
        out: watch::Sender<LiveState>,
    ) {
        let mut current = definitions.borrow_and_update().clone();
        let mut user = session.borrow_and_update().clone();
        changes.borrow_and_update();

        let mut changes_open = true;
        let mut session_open = true;
        let mut deadline = Some(Instant::now() + self.debounce);
        out.send_replace(LiveState::Loading);

        loop {
            let wake = deadline.unwrap_or_else(Instant::now);
            tokio::select! {
                changed = definitions.changed() => {
                    if changed.is_err() {
                        tracing::debug!("definition channel closed, live query stopped");
                        break;
                    }
                    let next = definitions.borrow_and_update().clone();
                    if next != current {
                        current = next;
                        out.send_replace(LiveState::Loading);
                        deadline = Some(Instant::now() + self.debounce);
                    }
                }
                changed = changes.changed(), if changes_open => {
                    if changed.is_err() {
                        changes_open = false;
                        continue;
                    }
                    let revision = *changes.borrow_and_update();
                    tracing::trace!(revision, "store changed, re-evaluation scheduled");
                    deadline = Some(Instant::now() + self.debounce);
                }
                changed = session.changed(), if session_open => {
                    if changed.is_err() {
                        session_open = false;
                        continue;
                    }
                    let next = session.borrow_and_update().clone();
                    if next != user {
                        user = next;
                        deadline = Some(Instant::now() + self.debounce);
                    }
                }
                () = tokio::time::sleep_until(wake), if deadline.is_some() => {
                    deadline = None;
                    let snapshot = current.clone();
                    let state = self.evaluate(snapshot.as_ref(), user.as_ref()).await;
                    if *definitions.borrow() == snapshot {
                        out.send_replace(state);
                    } else {
                        tracing::debug!("definition changed during evaluation, result discarded");
                    }
                }
                () = out.closed() => {
                    tracing::debug!("no live query observers left, stopped");
                    break;
                }
            }
        }
    }

    async fn evaluate(&self, def: Option<&QueryDef>, user: Option<&UserId>) -> LiveState {
        let Some(def) = def else {
            return LiveState::Ready(Vec::new());
        };
        let graph = self.graph.read().await;
        match graph.query(def, user) {
            Ok(rows) => {
                tracing::debug!(rows = rows.len(), revision = graph.revision(), "live query evaluated");
                LiveState::Ready(rows)
            }
            Err(e) => {
                tracing::warn!(error = %e, "live query failed");
                LiveState::Failed(e.to_string())
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
