//! Session manager for upstream connections
//!
//! Stateless servers get a fresh session per call, closed when the call
//! returns. Stateful servers share one cached session per server name:
//! concurrent first callers are collapsed into a single initialization, an
//! idle ticker evicts sessions that have gone unused, and a transport-level
//! call failure evicts the session so the next call starts a fresh one.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rmcp::model::{CallToolResult, GetPromptResult, JsonObject};
use tokio::sync::{Mutex, OnceCell};
use tokio_util::sync::CancellationToken;

use canopy_store::{McpServerRecord, SessionMode};

use crate::upstream::{SessionFailure, UpstreamSession};
use crate::McpError;

struct SessionSlot {
    cell: OnceCell<Arc<UpstreamSession>>,
    last_used: std::sync::Mutex<Instant>,
}

impl SessionSlot {
    fn new() -> Self {
        Self {
            cell: OnceCell::new(),
            last_used: std::sync::Mutex::new(Instant::now()),
        }
    }

    fn touch(&self) {
        *self.last_used.lock().expect("last_used lock poisoned") = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.last_used.lock().expect("last_used lock poisoned").elapsed()
    }
}

/// Cache of long-lived sessions keyed by server name
pub struct SessionManager {
    slots: Mutex<HashMap<String, Arc<SessionSlot>>>,
    init_timeout: Duration,
    idle_timeout: Option<Duration>,
}

impl SessionManager {
    pub fn new(init_timeout: Duration, idle_timeout: Option<Duration>) -> Arc<Self> {
        Arc::new(Self {
            slots: Mutex::new(HashMap::new()),
            init_timeout,
            idle_timeout,
        })
    }

    /// Call a tool on the given upstream, managing session lifetime by mode
    pub async fn call_tool(
        &self,
        record: &McpServerRecord,
        tool_name: &str,
        arguments: Option<JsonObject>,
    ) -> Result<CallToolResult, McpError> {
        match record.session_mode {
            SessionMode::Stateless => {
                let session = UpstreamSession::connect(record, self.init_timeout).await?;
                let result = session.call_tool(tool_name, arguments).await;
                session.close().await;
                result.map_err(SessionFailure::into_error)
            }
            SessionMode::Stateful => {
                let session = self.acquire(record).await?;
                match session.call_tool(tool_name, arguments).await {
                    Ok(result) => Ok(result),
                    Err(SessionFailure::Call(e)) => Err(e),
                    Err(SessionFailure::Transport(e)) => {
                        // The next call will initiate a fresh session; this
                        // one surfaces the error without retrying.
                        tracing::warn!(server = %record.name, "stateful session failed, evicting");
                        self.invalidate(&record.name).await;
                        Err(e)
                    }
                }
            }
        }
    }

    /// Render a prompt on the given upstream, managing session lifetime by mode
    pub async fn get_prompt(
        &self,
        record: &McpServerRecord,
        prompt_name: &str,
        arguments: Option<JsonObject>,
    ) -> Result<GetPromptResult, McpError> {
        match record.session_mode {
            SessionMode::Stateless => {
                let session = UpstreamSession::connect(record, self.init_timeout).await?;
                let result = session.get_prompt(prompt_name, arguments).await;
                session.close().await;
                result.map_err(SessionFailure::into_error)
            }
            SessionMode::Stateful => {
                let session = self.acquire(record).await?;
                match session.get_prompt(prompt_name, arguments).await {
                    Ok(result) => Ok(result),
                    Err(SessionFailure::Call(e)) => Err(e),
                    Err(SessionFailure::Transport(e)) => {
                        tracing::warn!(server = %record.name, "stateful session failed, evicting");
                        self.invalidate(&record.name).await;
                        Err(e)
                    }
                }
            }
        }
    }

    /// Get or create the shared session for a stateful server
    ///
    /// Concurrent callers for the same server observe a single
    /// initialization; waiters share its outcome.
    async fn acquire(&self, record: &McpServerRecord) -> Result<Arc<UpstreamSession>, McpError> {
        let slot = {
            let mut slots = self.slots.lock().await;
            Arc::clone(slots.entry(record.name.clone()).or_insert_with(|| Arc::new(SessionSlot::new())))
        };

        let session = slot
            .cell
            .get_or_try_init(|| async {
                tracing::info!(server = %record.name, "opening stateful session");
                UpstreamSession::connect(record, self.init_timeout).await.map(Arc::new)
            })
            .await?;

        slot.touch();
        Ok(Arc::clone(session))
    }

    /// Close and forget the session for a server, if any
    pub async fn invalidate(&self, server_name: &str) {
        let slot = self.slots.lock().await.remove(server_name);
        if let Some(slot) = slot {
            if let Some(session) = slot.cell.get() {
                session.close().await;
            }
        }
    }

    /// Close every cached session
    pub async fn close_all(&self) {
        let slots: Vec<_> = self.slots.lock().await.drain().collect();
        for (name, slot) in slots {
            if let Some(session) = slot.cell.get() {
                tracing::debug!(server = %name, "closing stateful session on shutdown");
                session.close().await;
            }
        }
    }

    /// Start the background idle-eviction ticker
    ///
    /// No-op when idle eviction is disabled. The ticker stops when the
    /// cancellation token fires.
    pub fn spawn_idle_reaper(self: &Arc<Self>, shutdown: CancellationToken) {
        let Some(idle_timeout) = self.idle_timeout else {
            return;
        };

        let manager = Arc::clone(self);
        let sweep_interval = (idle_timeout / 2).max(Duration::from_secs(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweep_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => manager.evict_idle(idle_timeout).await,
                    () = shutdown.cancelled() => break,
                }
            }
        });
    }

    async fn evict_idle(&self, idle_timeout: Duration) {
        let expired: Vec<(String, Arc<SessionSlot>)> = {
            let mut slots = self.slots.lock().await;
            let names: Vec<String> = slots
                .iter()
                .filter(|(_, slot)| slot.cell.initialized() && slot.idle_for() > idle_timeout)
                .map(|(name, _)| name.clone())
                .collect();
            names
                .into_iter()
                .filter_map(|name| slots.remove(&name).map(|slot| (name, slot)))
                .collect()
        };

        for (name, slot) in expired {
            tracing::info!(server = %name, "evicting idle stateful session");
            if let Some(session) = slot.cell.get() {
                session.close().await;
            }
        }
    }

    #[cfg(test)]
    async fn slot_count(&self) -> usize {
        self.slots.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(idle: Option<Duration>) -> Arc<SessionManager> {
        SessionManager::new(Duration::from_secs(1), idle)
    }

    #[tokio::test]
    async fn invalidate_unknown_server_is_a_noop() {
        let manager = manager(None);
        manager.invalidate("ghost").await;
        assert_eq!(manager.slot_count().await, 0);
    }

    #[tokio::test]
    async fn slots_track_idle_time() {
        let slot = SessionSlot::new();
        assert!(slot.idle_for() < Duration::from_secs(1));
        slot.touch();
        assert!(slot.idle_for() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn eviction_skips_uninitialized_slots() {
        let manager = manager(Some(Duration::from_millis(1)));
        // a slot whose initialization never completed must not be reaped
        manager
            .slots
            .lock()
            .await
            .insert("pending".to_string(), Arc::new(SessionSlot::new()));

        tokio::time::sleep(Duration::from_millis(5)).await;
        manager.evict_idle(Duration::from_millis(1)).await;
        assert_eq!(manager.slot_count().await, 1);
    }

    #[tokio::test]
    async fn reaper_is_disabled_without_idle_timeout() {
        let manager = manager(None);
        let shutdown = CancellationToken::new();
        manager.spawn_idle_reaper(shutdown.clone());
        shutdown.cancel();
        assert_eq!(manager.slot_count().await, 0);
    }
}
