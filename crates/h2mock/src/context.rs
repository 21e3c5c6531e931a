//! Shared state threaded through every engine call.

use crate::config::EngineSettings;
use crate::events::EventStore;
use crate::persistence::Persistence;
use crate::vars::GlobalVariables;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Everything the server and client roles share: variables, event stores,
/// the receive-sequence counter and the persistence collaborator.
///
/// Each test builds its own context, so nothing leaks between them.
pub struct SharedContext {
    vars: GlobalVariables,
    server_events: EventStore,
    client_events: EventStore,
    sequence: AtomicU64,
    persistence: Option<Arc<dyn Persistence>>,
    settings: EngineSettings,
}

impl SharedContext {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            vars: GlobalVariables::new(),
            server_events: EventStore::new(settings.retention),
            client_events: EventStore::new(settings.retention),
            sequence: AtomicU64::new(0),
            persistence: None,
            settings,
        }
    }

    pub fn with_persistence(mut self, persistence: Arc<dyn Persistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    pub fn vars(&self) -> &GlobalVariables {
        &self.vars
    }

    /// Inbound (server role) history.
    pub fn server_events(&self) -> &EventStore {
        &self.server_events
    }

    /// Outbound (client role) history.
    pub fn client_events(&self) -> &EventStore {
        &self.client_events
    }

    pub fn persistence(&self) -> Option<&dyn Persistence> {
        self.persistence.as_deref()
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Next receive sequence (starts at 1).
    pub fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Last sequence handed out (0 before any transaction).
    pub fn current_sequence(&self) -> u64 {
        self.sequence.load(Ordering::Relaxed)
    }
}

impl Default for SharedContext {
    fn default() -> Self {
        Self::new(EngineSettings::default())
    }
}

impl std::fmt::Debug for SharedContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedContext")
            .field("vars", &self.vars.len())
            .field("server_keys", &self.server_events.key_count())
            .field("client_keys", &self.client_events.key_count())
            .field("sequence", &self.current_sequence())
            .field("persistence", &self.persistence.is_some())
            .finish()
    }
}

/// Microseconds since the Unix epoch.
pub fn now_us() -> u64 {
    chrono::Utc::now().timestamp_micros().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RetentionPolicy;

    #[test]
    fn test_sequence_is_monotonic() {
        let ctx = SharedContext::default();
        assert_eq!(ctx.current_sequence(), 0);
        assert_eq!(ctx.next_sequence(), 1);
        assert_eq!(ctx.next_sequence(), 2);
        assert_eq!(ctx.current_sequence(), 2);
    }

    #[test]
    fn test_settings_drive_retention() {
        let ctx = SharedContext::new(EngineSettings {
            retention: RetentionPolicy::LatestOnly,
            ..EngineSettings::default()
        });
        assert_eq!(ctx.server_events().retention(), RetentionPolicy::LatestOnly);
        assert_eq!(ctx.client_events().retention(), RetentionPolicy::LatestOnly);
        assert!(ctx.persistence().is_none());
    }

    #[test]
    fn test_now_us_is_positive() {
        assert!(now_us() > 1_600_000_000_000_000);
    }
}
