use std::time::{Duration, Instant};

use dashmap::DashMap;
use rand::RngCore;
use tokio::sync::mpsc;
use voice_protocol::ids::{ObfuscatedId, PlayerId, SessionId};
use voice_protocol::signaling::ServerMessage;

use crate::audio_sink::AudioEgress;

/// Why a session was torn down; distinguishes the close code sent to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    ClientDisconnect,
    HeartbeatTimeout,
    Preempted,
    PendingGraceExpired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Pending,
    Active,
}

/// Live per-client session state. `signal_tx` is unbounded: signalling must
/// never be dropped, only audio frames may be head-dropped (see `router.rs`).
pub struct ClientSession {
    pub session_id: SessionId,
    pub obfuscated_id: ObfuscatedId,
    pub username: String,
    pub player_id: Option<PlayerId>,
    pub status: SessionStatus,
    pub resume_token: String,
    pub mic_muted: bool,
    pub heartbeat_deadline: Instant,
    pub pending_until: Option<Instant>,
    pub signal_tx: mpsc::UnboundedSender<ServerMessage>,
    /// Set once the session's transport is known to carry audio (UDP bind,
    /// DataChannel open, or WebSocket-fallback activation). `None` until
    /// then — a sender with no audio yet simply can't be routed to.
    pub audio_egress: Option<AudioEgress>,
}

fn random_token() -> String {
    let mut bytes = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn random_obfuscated_id() -> ObfuscatedId {
    let mut bytes = [0u8; 12];
    rand::thread_rng().fill_bytes(&mut bytes);
    ObfuscatedId::from_bytes(bytes)
}

pub struct SessionRegistry {
    sessions: DashMap<SessionId, ClientSession>,
    by_player: DashMap<PlayerId, SessionId>,
    by_resume_token: DashMap<String, SessionId>,
    by_obfuscated_id: DashMap<ObfuscatedId, SessionId>,
    heartbeat_interval: Duration,
    resume_window: Duration,
}

impl SessionRegistry {
    pub fn new(heartbeat_interval: Duration, resume_window: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            by_player: DashMap::new(),
            by_resume_token: DashMap::new(),
            by_obfuscated_id: DashMap::new(),
            heartbeat_interval,
            resume_window,
        }
    }

    pub fn new_session(&self, username: String, signal_tx: mpsc::UnboundedSender<ServerMessage>) -> SessionId {
        let session_id = SessionId::new_random();
        let obfuscated_id = random_obfuscated_id();
        let resume_token = random_token();
        let session = ClientSession {
            session_id,
            obfuscated_id,
            username,
            player_id: None,
            status: SessionStatus::Pending,
            resume_token: resume_token.clone(),
            mic_muted: false,
            heartbeat_deadline: Instant::now() + self.heartbeat_interval * 2,
            pending_until: None,
            signal_tx,
            audio_egress: None,
        };
        self.by_obfuscated_id.insert(obfuscated_id, session_id);
        self.by_resume_token.insert(resume_token, session_id);
        self.sessions.insert(session_id, session);
        session_id
    }

    /// Promotes a pending session to active. Evicts any prior session bound
    /// to the same player, returning its `session_id` so the caller can send
    /// it a `preempted` close.
    pub fn bind_player(&self, session_id: SessionId, player_id: PlayerId) -> Option<SessionId> {
        let evicted = self.by_player.insert(player_id, session_id);
        if let Some(mut session) = self.sessions.get_mut(&session_id) {
            session.player_id = Some(player_id);
            session.status = SessionStatus::Active;
            session.pending_until = None;
        }
        evicted.filter(|prior| *prior != session_id)
    }

    /// Attaches (or replaces) the recipient-side audio egress for a session,
    /// called once a transport learns how to actually reach this session's
    /// client with audio.
    pub fn set_audio_egress(&self, session_id: SessionId, egress: AudioEgress) {
        if let Some(mut session) = self.sessions.get_mut(&session_id) {
            session.audio_egress = Some(egress);
        }
    }

    /// Repoints a session's signalling channel at a new connection, used when
    /// a client resumes over a fresh socket after the old one dropped.
    pub fn set_signal_tx(&self, session_id: SessionId, signal_tx: mpsc::UnboundedSender<ServerMessage>) {
        if let Some(mut session) = self.sessions.get_mut(&session_id) {
            session.signal_tx = signal_tx;
        }
    }

    pub fn set_mic_muted(&self, session_id: SessionId, muted: bool) {
        if let Some(mut session) = self.sessions.get_mut(&session_id) {
            session.mic_muted = muted;
        }
    }

    pub fn mark_pending(&self, session_id: SessionId, until: Instant) {
        if let Some(mut session) = self.sessions.get_mut(&session_id) {
            session.pending_until = Some(until);
        }
    }

    pub fn clear_pending(&self, session_id: SessionId) {
        if let Some(mut session) = self.sessions.get_mut(&session_id) {
            session.pending_until = None;
        }
    }

    pub fn heartbeat(&self, session_id: SessionId) -> Option<Instant> {
        let mut session = self.sessions.get_mut(&session_id)?;
        let deadline = Instant::now() + self.heartbeat_interval * 2;
        session.heartbeat_deadline = deadline;
        Some(deadline)
    }

    /// Re-attaches a fresh connection to an existing session if the token
    /// matches and the session hasn't been swept. Rotates the resume token.
    pub fn resume(&self, session_id: SessionId, resume_token: &str) -> Option<String> {
        let mut session = self.sessions.get_mut(&session_id)?;
        if session.resume_token != resume_token {
            return None;
        }
        self.by_resume_token.remove(resume_token);
        let new_token = random_token();
        session.resume_token = new_token.clone();
        session.heartbeat_deadline = Instant::now() + self.heartbeat_interval * 2;
        drop(session);
        self.by_resume_token.insert(new_token.clone(), session_id);
        Some(new_token)
    }

    pub fn get(&self, session_id: SessionId) -> Option<dashmap::mapref::one::Ref<'_, SessionId, ClientSession>> {
        self.sessions.get(&session_id)
    }

    pub fn session_for_player(&self, player_id: PlayerId) -> Option<SessionId> {
        self.by_player.get(&player_id).map(|e| *e.value())
    }

    pub fn session_for_resume_token(&self, token: &str) -> Option<SessionId> {
        self.by_resume_token.get(token).map(|e| *e.value())
    }

    pub fn session_for_obfuscated_id(&self, id: ObfuscatedId) -> Option<SessionId> {
        self.by_obfuscated_id.get(&id).map(|e| *e.value())
    }

    /// `(session_id, player_id)` pairs for every active, player-bound session.
    /// Used by the router's degraded broadcast fallback.
    pub fn active_sessions(&self) -> Vec<(SessionId, PlayerId)> {
        self.sessions
            .iter()
            .filter(|e| e.value().status == SessionStatus::Active)
            .filter_map(|e| e.value().player_id.map(|player_id| (e.value().session_id, player_id)))
            .collect()
    }

    pub fn remove(&self, session_id: SessionId) -> Option<ClientSession> {
        let (_, session) = self.sessions.remove(&session_id)?;
        self.by_obfuscated_id.remove(&session.obfuscated_id);
        self.by_resume_token.remove(&session.resume_token);
        if let Some(player_id) = session.player_id {
            self.by_player.remove_if(&player_id, |_, sid| *sid == session_id);
        }
        Some(session)
    }

    /// Evicts sessions whose heartbeat deadline or pending grace has
    /// expired. Returns `(session_id, reason, player_id)` for each eviction so
    /// the caller can also release the player's group membership and
    /// position entry, which this registry has no knowledge of.
    pub fn sweep(&self, now: Instant) -> Vec<(SessionId, CloseReason, Option<PlayerId>)> {
        let expired: Vec<(SessionId, CloseReason)> = self
            .sessions
            .iter()
            .filter_map(|e| {
                let s = e.value();
                if s.heartbeat_deadline < now {
                    Some((s.session_id, CloseReason::HeartbeatTimeout))
                } else if let Some(pending_until) = s.pending_until {
                    if pending_until < now {
                        Some((s.session_id, CloseReason::PendingGraceExpired))
                    } else {
                        None
                    }
                } else {
                    None
                }
            })
            .collect();
        expired
            .into_iter()
            .map(|(session_id, reason)| {
                let player_id = self.remove(session_id).and_then(|s| s.player_id);
                (session_id, reason, player_id)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> SessionRegistry {
        SessionRegistry::new(Duration::from_millis(50), Duration::from_millis(200))
    }

    fn channel() -> mpsc::UnboundedSender<ServerMessage> {
        let (tx, _rx) = mpsc::unbounded_channel();
        tx
    }

    #[test]
    fn new_session_is_pending() {
        let reg = registry();
        let sid = reg.new_session("alice".into(), channel());
        assert_eq!(reg.get(sid).unwrap().status, SessionStatus::Pending);
    }

    #[test]
    fn bind_player_promotes_to_active() {
        let reg = registry();
        let sid = reg.new_session("alice".into(), channel());
        let player_id = PlayerId::new_random();
        let evicted = reg.bind_player(sid, player_id);
        assert!(evicted.is_none());
        assert_eq!(reg.get(sid).unwrap().status, SessionStatus::Active);
        assert_eq!(reg.session_for_player(player_id), Some(sid));
    }

    #[test]
    fn binding_same_player_to_new_session_evicts_prior() {
        let reg = registry();
        let player_id = PlayerId::new_random();
        let first = reg.new_session("alice".into(), channel());
        reg.bind_player(first, player_id);
        let second = reg.new_session("alice".into(), channel());
        let evicted = reg.bind_player(second, player_id);
        assert_eq!(evicted, Some(first));
        assert_eq!(reg.session_for_player(player_id), Some(second));
    }

    #[test]
    fn resume_with_valid_token_rotates_it() {
        let reg = registry();
        let sid = reg.new_session("alice".into(), channel());
        let old_token = reg.get(sid).unwrap().resume_token.clone();
        let new_token = reg.resume(sid, &old_token).unwrap();
        assert_ne!(old_token, new_token);
        assert_eq!(reg.session_for_resume_token(&new_token), Some(sid));
        assert_eq!(reg.session_for_resume_token(&old_token), None);
    }

    #[test]
    fn resume_with_wrong_token_fails() {
        let reg = registry();
        let sid = reg.new_session("alice".into(), channel());
        assert!(reg.resume(sid, "not-the-token").is_none());
    }

    #[test]
    fn heartbeat_extends_deadline() {
        let reg = registry();
        let sid = reg.new_session("alice".into(), channel());
        let before = reg.get(sid).unwrap().heartbeat_deadline;
        std::thread::sleep(Duration::from_millis(5));
        let after = reg.heartbeat(sid).unwrap();
        assert!(after > before);
    }

    #[test]
    fn sweep_evicts_expired_heartbeats() {
        let reg = registry();
        let sid = reg.new_session("alice".into(), channel());
        let future = Instant::now() + Duration::from_millis(200);
        let evicted = reg.sweep(future);
        assert_eq!(evicted, vec![(sid, CloseReason::HeartbeatTimeout, None)]);
        assert!(reg.get(sid).is_none());
    }

    #[test]
    fn sweep_leaves_live_sessions_alone() {
        let reg = registry();
        let sid = reg.new_session("alice".into(), channel());
        let evicted = reg.sweep(Instant::now());
        assert!(evicted.is_empty());
        assert!(reg.get(sid).is_some());
    }

    #[test]
    fn remove_clears_all_secondary_indices() {
        let reg = registry();
        let sid = reg.new_session("alice".into(), channel());
        let player_id = PlayerId::new_random();
        reg.bind_player(sid, player_id);
        let obfuscated_id = reg.get(sid).unwrap().obfuscated_id;
        reg.remove(sid);
        assert!(reg.get(sid).is_none());
        assert!(reg.session_for_player(player_id).is_none());
        assert!(reg.session_for_obfuscated_id(obfuscated_id).is_none());
    }
}
