//! # Session Registry
//!
//! Per-session project contexts. Sessions are keyed by the RPC layer's
//! session id (a null id maps to a process-wide default entry with the
//! same semantics, minus isolation). Entry mutation is guarded per entry
//! by the concurrent map; setting a workspace restarts that session's
//! file watcher, which feeds debounced incremental builds.
//!
//! Engines never hold a session's index: callers fetch the current view
//! through [`SessionRegistry::index_for`] on every call.

use crate::constants::build::WATCH_DEBOUNCE_MS;
use crate::error::{Error, Result};
use crate::index::{IndexRegistry, SharedIndex};
use crate::orchestrator::GraphOrchestrator;
use crate::store::GraphStore;
use crate::types::{BuildMode, ProjectContext};
use dashmap::DashMap;
use notify::{RecursiveMode, Watcher};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Key used for the null session
const DEFAULT_SESSION: &str = "default";

/// Result of a workspace-set call
#[derive(Debug, Clone, Serialize)]
pub struct WorkspaceStatus {
    pub project_context: ProjectContext,
    /// `ready` on first set, `switched` when the project changed
    pub status: &'static str,
}

struct SessionEntry {
    context: ProjectContext,
    watcher: Option<FileWatcher>,
}

/// Concurrent session-id → project-context map with scoped views
pub struct SessionRegistry {
    sessions: DashMap<String, SessionEntry>,
    indexes: Arc<IndexRegistry>,
    orchestrator: Arc<GraphOrchestrator>,
    graph: Arc<dyn GraphStore>,
    /// Watchers can be disabled for tests and one-shot runs
    watch_enabled: bool,
}

impl SessionRegistry {
    /// Registry over the shared index registry and orchestrator
    pub fn new(
        indexes: Arc<IndexRegistry>,
        orchestrator: Arc<GraphOrchestrator>,
        graph: Arc<dyn GraphStore>,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            indexes,
            orchestrator,
            graph,
            watch_enabled: true,
        }
    }

    /// Disable file watchers (tests, batch runs)
    #[must_use]
    pub fn without_watchers(mut self) -> Self {
        self.watch_enabled = false;
        self
    }

    /// Bind a session to a project context.
    ///
    /// On a project change the new project's in-memory index is cleared
    /// and the session's watcher is restarted on the new source root.
    pub fn set_workspace(
        &self,
        session_id: Option<&str>,
        context: ProjectContext,
    ) -> Result<WorkspaceStatus> {
        let key = session_key(session_id);
        let mut status = "ready";

        {
            let mut entry = self.sessions.entry(key.clone()).or_insert_with(|| SessionEntry {
                context: context.clone(),
                watcher: None,
            });
            if entry.context != context {
                status = "switched";
                self.indexes.clear_project(&context.project_id);
                entry.context = context.clone();
            }
            // Old watcher (if any) stops on drop
            entry.watcher = if self.watch_enabled {
                match FileWatcher::start(context.clone(), Arc::clone(&self.orchestrator)) {
                    Ok(watcher) => Some(watcher),
                    Err(err) => {
                        warn!(project_id = %context.project_id, %err, "file watcher unavailable");
                        None
                    }
                }
            } else {
                None
            };
        }

        info!(session = %key, project_id = %context.project_id, status, "workspace set");
        Ok(WorkspaceStatus {
            project_context: context,
            status,
        })
    }

    /// The session's project context
    pub fn resolve(&self, session_id: Option<&str>) -> Result<ProjectContext> {
        let key = session_key(session_id);
        self.sessions
            .get(&key)
            .map(|entry| entry.context.clone())
            .ok_or_else(|| {
                Error::InvalidArguments(format!("no workspace set for session '{key}'"))
            })
    }

    /// Current index view for a context, reloading after eviction
    pub async fn index_for(&self, context: &ProjectContext) -> Result<SharedIndex> {
        self.indexes
            .get_or_reload(&context.project_id, self.graph.as_ref())
            .await
    }

    /// Drop a session and its watcher
    pub fn remove_session(&self, session_id: Option<&str>) {
        let key = session_key(session_id);
        if self.sessions.remove(&key).is_some() {
            debug!(session = %key, "session removed");
        }
    }

    /// Number of bound sessions
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

fn session_key(session_id: Option<&str>) -> String {
    match session_id {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => DEFAULT_SESSION.to_string(),
    }
}

/// Filesystem watcher feeding debounced incremental builds
struct FileWatcher {
    /// Kept alive for the watch registration; dropping stops events
    _watcher: notify::RecommendedWatcher,
    handle: tokio::task::JoinHandle<()>,
}

impl FileWatcher {
    fn start(context: ProjectContext, orchestrator: Arc<GraphOrchestrator>) -> Result<Self> {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<()>();
        let mut watcher = notify::recommended_watcher(move |event: notify::Result<notify::Event>| {
            if let Ok(event) = event
                && matches!(
                    event.kind,
                    notify::EventKind::Create(_)
                        | notify::EventKind::Modify(_)
                        | notify::EventKind::Remove(_)
                )
            {
                let _ = tx.send(());
            }
        })
        .map_err(|e| Error::StoreUnavailable(format!("watcher: {e}")))?;

        let root = context.source_root();
        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|e| Error::StoreUnavailable(format!("watch {}: {e}", root.display())))?;

        let handle = tokio::spawn(async move {
            while rx.recv().await.is_some() {
                // Debounce: drain the burst, then rebuild once
                tokio::time::sleep(Duration::from_millis(WATCH_DEBOUNCE_MS)).await;
                while rx.try_recv().is_ok() {}
                let ack =
                    Arc::clone(&orchestrator).request_build(context.clone(), BuildMode::Incremental);
                debug!(
                    project_id = %context.project_id,
                    status = ?ack.status,
                    "watcher triggered incremental build"
                );
            }
        });

        Ok(Self {
            _watcher: watcher,
            handle,
        })
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
