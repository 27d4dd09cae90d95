use std::time::Duration;

use tokio::sync::RwLock;

use crate::credential::CredentialStore;
use crate::group_registry::GroupRegistry;
use crate::position_tracker::PositionTracker;
use crate::session_registry::SessionRegistry;
use crate::settings::ServerSettings;

/// Everything a transport needs to authenticate a peer, track its position,
/// and route audio — the set of collaborators `AudioRouter::route` reads.
pub struct AppState {
    pub sessions: SessionRegistry,
    pub positions: PositionTracker,
    pub groups: GroupRegistry,
    pub credentials: Box<dyn CredentialStore>,
    pub settings: RwLock<ServerSettings>,
}

impl AppState {
    pub fn new(credentials: Box<dyn CredentialStore>, settings: ServerSettings) -> Self {
        let heartbeat_interval = Duration::from_millis(settings.heartbeat_interval_ms);
        let resume_window = Duration::from_millis(settings.resume_window_ms);
        let max_group_count = settings.max_group_count;
        Self {
            sessions: SessionRegistry::new(heartbeat_interval, resume_window),
            positions: PositionTracker::new(),
            groups: GroupRegistry::new(max_group_count),
            credentials,
            settings: RwLock::new(settings),
        }
    }

    pub async fn settings_snapshot(&self) -> ServerSettings {
        self.settings.read().await.clone()
    }

    /// Replaces the in-memory settings, applied by the next reload tick
    /// (`main.rs`'s settings-watch task). Does not retroactively resize
    /// heartbeat/resume windows on existing sessions.
    pub async fn reload_settings(&self, settings: ServerSettings) {
        *self.settings.write().await = settings;
    }
}
