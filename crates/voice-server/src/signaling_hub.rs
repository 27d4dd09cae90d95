//! Browser/native signalling over one WebSocket per session at `/voice`.
//!
//! The socket is split once per connection: the read half feeds a plain
//! message-dispatch loop, the write half is owned exclusively by a drain task
//! fed from an unbounded `mpsc` channel. Every other piece of the server that
//! wants to talk to this client — group broadcasts, the session sweeper, the
//! WebRTC transport's ICE callbacks — sends into that same channel via the
//! session's `signal_tx` rather than ever touching the socket directly.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use voice_protocol::group::GroupSettings;
use voice_protocol::ids::{GroupId, ObfuscatedId, PlayerId, SessionId};
use voice_protocol::session::{negotiate_codec, AudioCodec};
use voice_protocol::signaling::*;

use crate::app_state::AppState;
use crate::audio_sink::{AudioEgress, AudioSink};
use crate::group_registry::GroupEvent;
use crate::router;
use crate::session_registry::CloseReason;
use crate::webrtc_transport::WebRtcTransport;

/// Everything a `/voice` connection needs: the shared registries plus the
/// WebRTC transport, which lives alongside rather than inside `AppState`
/// since only the signalling hub drives it.
#[derive(Clone)]
pub struct SignalingState {
    pub app: Arc<AppState>,
    pub webrtc: Arc<WebRtcTransport>,
}

pub fn router(state: SignalingState) -> Router {
    Router::new().route("/voice", get(ws_handler)).with_state(state)
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<SignalingState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: SignalingState) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let Ok(json) = serde_json::to_string(&msg) else {
                continue;
            };
            if ws_tx.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    let settings = state.app.settings_snapshot().await;
    let _ = tx.send(ServerMessage::Hello(HelloData {
        heartbeat_interval_ms: settings.heartbeat_interval_ms,
        resume_window_ms: settings.resume_window_ms,
        audio_codecs: AudioCodec::server_ranking().to_vec(),
        use_proximity_radar: settings.use_proximity_radar,
        use_proximity_radar_speaking_only: settings.use_proximity_radar_speaking_only,
        group_spatial_audio: settings.group_spatial_audio,
    }));

    let mut session_id: Option<SessionId> = None;
    let mut explicit_disconnect = false;

    while let Some(msg) = ws_rx.next().await {
        let msg = match msg {
            Ok(msg) => msg,
            Err(err) => {
                debug!(%err, "voice websocket read error");
                break;
            }
        };
        let text = match msg {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        let client_msg: ClientMessage = match serde_json::from_str(&text) {
            Ok(m) => m,
            Err(err) => {
                warn!(%err, "malformed client message");
                let _ = tx.send(ServerMessage::Error(ErrorData {
                    code: "bad_message".into(),
                    message: "could not parse message".into(),
                }));
                continue;
            }
        };
        match handle_client_message(client_msg, &state, &tx, &mut session_id).await {
            ControlFlow::Continue(()) => {}
            ControlFlow::Break(()) => {
                explicit_disconnect = true;
                break;
            }
        }
    }

    writer.abort();
    if let Some(session_id) = session_id {
        if explicit_disconnect {
            teardown_session(&state, session_id, CloseReason::ClientDisconnect).await;
        }
        // An ordinary drop (network error, tab close without a disconnect
        // message) leaves the session intact for `resume` within its window;
        // the sweeper reclaims it once the heartbeat deadline lapses.
    }
}

async fn handle_client_message(
    msg: ClientMessage,
    state: &SignalingState,
    tx: &mpsc::UnboundedSender<ServerMessage>,
    session_id: &mut Option<SessionId>,
) -> ControlFlow<()> {
    match msg {
        ClientMessage::Authenticate(data) => handle_authenticate(data, state, tx, session_id).await,
        ClientMessage::Resume(data) => handle_resume(data, state, tx, session_id).await,
        ClientMessage::Heartbeat(data) => handle_heartbeat(data, state, tx, *session_id).await,
        ClientMessage::Disconnect(_) => return ControlFlow::Break(()),
        ClientMessage::Offer(data) => handle_offer(data, state, tx, *session_id).await,
        ClientMessage::Answer(_) => {
            warn!("server is always the webrtc answerer; ignoring client-sent answer");
        }
        ClientMessage::IceCandidate(data) => handle_ice_candidate(data, state, *session_id).await,
        ClientMessage::StartDatachannel => {
            debug!(?session_id, "client signalled intent to open a datachannel");
        }
        ClientMessage::CreateGroup(data) => handle_create_group(data, state, tx, *session_id).await,
        ClientMessage::JoinGroup(data) => handle_join_group(data, state, tx, *session_id).await,
        ClientMessage::LeaveGroup => handle_leave_group(state, tx, *session_id).await,
        ClientMessage::ListGroups => handle_list_groups(state, tx).await,
        ClientMessage::ListPlayers => handle_list_players(state, tx).await,
        ClientMessage::GetGroupMembers(data) => handle_get_group_members(data, state, tx).await,
        ClientMessage::UpdateGroupPassword(data) => handle_update_group_password(data, state, tx, *session_id).await,
        ClientMessage::SetGroupPermanent(data) => handle_set_group_permanent(data, state, tx, *session_id).await,
        ClientMessage::UserSpeaking(data) => handle_user_speaking(data, state, *session_id).await,
        ClientMessage::UserMute(data) => handle_user_mute(data, state, *session_id).await,
        ClientMessage::Audio(data) => handle_audio_fallback(data, state, tx, *session_id).await,
        ClientMessage::Ping => {
            let _ = tx.send(ServerMessage::Pong);
        }
    }
    ControlFlow::Continue(())
}

async fn handle_authenticate(
    data: AuthenticateData,
    state: &SignalingState,
    tx: &mpsc::UnboundedSender<ServerMessage>,
    session_id: &mut Option<SessionId>,
) {
    let Some(player_id) = state.app.credentials.verify(&data.username, &data.auth_code) else {
        let _ = tx.send(ServerMessage::AuthError(AuthErrorData {
            code: "invalid_credentials".into(),
            message: "unknown username or auth code".into(),
        }));
        return;
    };

    let settings = state.app.settings_snapshot().await;
    let codec = negotiate_codec(&data.audio_codecs, data.preferred_audio_codec);

    let sid = state.app.sessions.new_session(data.username.clone(), tx.clone());
    if let Some(evicted_sid) = state.app.sessions.bind_player(sid, player_id) {
        preempt(state, evicted_sid).await;
    }
    *session_id = Some(sid);

    let Some(session) = state.app.sessions.get(sid) else { return };
    let obfuscated_id = session.obfuscated_id;
    let resume_token = session.resume_token.clone();
    drop(session);

    if state.app.positions.get(player_id).is_none() {
        let deadline = Instant::now() + Duration::from_secs(settings.pending_game_join_timeout_seconds);
        state.app.sessions.mark_pending(sid, deadline);
        let _ = tx.send(ServerMessage::PendingGameSession(PendingGameSessionData {
            timeout_seconds: settings.pending_game_join_timeout_seconds,
        }));
    }

    let _ = tx.send(ServerMessage::AuthSuccess(AuthSuccessData {
        client_id: obfuscated_id,
        transport_mode: TransportMode::Webrtc,
        stun_servers: settings.stun_servers.clone(),
        session_id: sid.to_string(),
        resume_token,
        heartbeat_interval_ms: settings.heartbeat_interval_ms,
        resume_window_ms: settings.resume_window_ms,
        audio_codec: codec,
        audio_codecs: data.audio_codecs,
        use_proximity_radar: settings.use_proximity_radar,
        group_spatial_audio: settings.group_spatial_audio,
    }));

    broadcast_player_list(state).await;
}

/// A player authenticating from a second connection preempts their own
/// stale session rather than running both side by side.
async fn preempt(state: &SignalingState, evicted_sid: SessionId) {
    if let Some(session) = state.app.sessions.get(evicted_sid) {
        let _ = session.signal_tx.send(ServerMessage::Disconnect(DisconnectData {
            reason: "preempted_by_new_session".into(),
        }));
    }
    teardown_session(state, evicted_sid, CloseReason::Preempted).await;
}

async fn handle_resume(
    data: ResumeData,
    state: &SignalingState,
    tx: &mpsc::UnboundedSender<ServerMessage>,
    session_id: &mut Option<SessionId>,
) {
    let fail = |tx: &mpsc::UnboundedSender<ServerMessage>| {
        let _ = tx.send(ServerMessage::AuthError(AuthErrorData {
            code: "resume_failed".into(),
            message: "session id or resume token not recognized".into(),
        }));
    };
    let Ok(uuid) = Uuid::parse_str(&data.session_id) else {
        fail(tx);
        return;
    };
    let sid = SessionId::from_bytes(*uuid.as_bytes());
    let Some(new_token) = state.app.sessions.resume(sid, &data.resume_token) else {
        fail(tx);
        return;
    };
    state.app.sessions.set_signal_tx(sid, tx.clone());
    *session_id = Some(sid);

    let Some(session) = state.app.sessions.get(sid) else { return };
    let obfuscated_id = session.obfuscated_id;
    drop(session);

    let _ = tx.send(ServerMessage::Resumed(ResumedData {
        client_id: obfuscated_id,
        session_id: sid.to_string(),
        resume_token: new_token,
    }));
}

async fn handle_heartbeat(data: HeartbeatData, state: &SignalingState, tx: &mpsc::UnboundedSender<ServerMessage>, session_id: Option<SessionId>) {
    let Some(sid) = session_id else { return };
    state.app.sessions.heartbeat(sid);

    let Some(session) = state.app.sessions.get(sid) else { return };
    let pending = session.pending_until.is_some();
    let player_id = session.player_id;
    let obfuscated_id = session.obfuscated_id;
    drop(session);

    if pending {
        if let Some(player_id) = player_id {
            if state.app.positions.get(player_id).is_some() {
                state.app.sessions.clear_pending(sid);
                let _ = tx.send(ServerMessage::GameSessionReady(GameSessionReadyData { client_id: obfuscated_id }));
            }
        }
    }

    let _ = tx.send(ServerMessage::HeartbeatAck(HeartbeatData { timestamp: data.timestamp }));
}

async fn handle_offer(data: SdpData, state: &SignalingState, tx: &mpsc::UnboundedSender<ServerMessage>, session_id: Option<SessionId>) {
    let Some(sid) = session_id else { return };
    match state.webrtc.accept_offer(state.app.clone(), sid, data.sdp).await {
        Ok(answer_sdp) => {
            let _ = tx.send(ServerMessage::Answer(SdpData { sdp: answer_sdp }));
        }
        Err(err) => {
            warn!(%err, %sid, "webrtc offer rejected");
            let _ = tx.send(ServerMessage::Error(ErrorData {
                code: "webrtc_offer_failed".into(),
                message: err.to_string(),
            }));
        }
    }
}

async fn handle_ice_candidate(data: IceCandidateData, state: &SignalingState, session_id: Option<SessionId>) {
    let Some(sid) = session_id else { return };
    if let Err(err) = state.webrtc.add_ice_candidate(sid, data).await {
        debug!(%err, %sid, "ice candidate not applied");
    }
}

async fn handle_create_group(
    data: CreateGroupData,
    state: &SignalingState,
    tx: &mpsc::UnboundedSender<ServerMessage>,
    session_id: Option<SessionId>,
) {
    let Some((player_id, _)) = bound_player(state, session_id) else { return };
    let settings = state.app.settings_snapshot().await;
    if data.name.chars().count() > settings.max_group_name_length {
        let _ = tx.send(ServerMessage::Error(ErrorData {
            code: "name_too_long".into(),
            message: format!("group name exceeds {} characters", settings.max_group_name_length),
        }));
        return;
    }
    let group_settings = GroupSettings {
        max_members: settings.max_group_member_count,
        proximity_range_blocks: settings.default_proximity_distance,
        allow_invites: true,
        default_volume: 1.0,
    };
    match state.app.groups.create(data.name, false, player_id, group_settings, data.password) {
        Ok(group_id) => {
            let group = group_wire(state, group_id);
            if let Some(group) = group {
                let _ = tx.send(ServerMessage::GroupCreated(GroupCreatedData { group }));
            }
        }
        Err(err) => send_group_op_error(tx, err),
    }
}

async fn handle_join_group(
    data: JoinGroupData,
    state: &SignalingState,
    tx: &mpsc::UnboundedSender<ServerMessage>,
    session_id: Option<SessionId>,
) {
    let Some((player_id, _)) = bound_player(state, session_id) else { return };
    let Some(group_id) = parse_group_id(&data.group_id) else {
        send_invalid_group_id(tx);
        return;
    };
    match state.app.groups.join(player_id, group_id, data.password.as_deref()) {
        Ok(()) => {
            if let Some(group) = group_wire(state, group_id) {
                let _ = tx.send(ServerMessage::GroupJoined(GroupJoinedData { group }));
            }
        }
        Err(err) => {
            let _ = tx.send(ServerMessage::Error(ErrorData {
                code: join_error_code(err).into(),
                message: join_error_message(err).into(),
            }));
        }
    }
}

async fn handle_leave_group(state: &SignalingState, tx: &mpsc::UnboundedSender<ServerMessage>, session_id: Option<SessionId>) {
    let Some((player_id, _)) = bound_player(state, session_id) else { return };
    if state.app.groups.leave(player_id).is_ok() {
        let _ = tx.send(ServerMessage::GroupLeft);
    }
}

async fn handle_list_groups(state: &SignalingState, tx: &mpsc::UnboundedSender<ServerMessage>) {
    let groups = state.app.groups.list().iter().map(to_wire).collect();
    let _ = tx.send(ServerMessage::GroupList(GroupListData { groups }));
}

async fn handle_list_players(state: &SignalingState, tx: &mpsc::UnboundedSender<ServerMessage>) {
    let _ = tx.send(ServerMessage::PlayerList(PlayerListData { players: player_summaries(state) }));
}

async fn handle_get_group_members(data: GroupIdData, state: &SignalingState, tx: &mpsc::UnboundedSender<ServerMessage>) {
    let Some(group_id) = parse_group_id(&data.group_id) else {
        send_invalid_group_id(tx);
        return;
    };
    let member_ids = obfuscated_members(state, group_id);
    let _ = tx.send(ServerMessage::GroupMembersUpdated(GroupMembersUpdatedData {
        group_id: data.group_id,
        member_ids,
    }));
}

async fn handle_update_group_password(
    data: UpdateGroupPasswordData,
    state: &SignalingState,
    tx: &mpsc::UnboundedSender<ServerMessage>,
    session_id: Option<SessionId>,
) {
    let Some((player_id, _)) = bound_player(state, session_id) else { return };
    let Some(group_id) = parse_group_id(&data.group_id) else {
        send_invalid_group_id(tx);
        return;
    };
    if let Err(err) = state.app.groups.set_password(group_id, player_id, data.password) {
        send_group_op_error(tx, err);
    }
}

async fn handle_set_group_permanent(
    data: SetGroupPermanentData,
    state: &SignalingState,
    tx: &mpsc::UnboundedSender<ServerMessage>,
    session_id: Option<SessionId>,
) {
    let Some((player_id, _)) = bound_player(state, session_id) else { return };
    let Some(group_id) = parse_group_id(&data.group_id) else {
        send_invalid_group_id(tx);
        return;
    };
    if let Err(err) = state.app.groups.set_permanent(group_id, Some(player_id), data.permanent) {
        send_group_op_error(tx, err);
    }
}

async fn handle_user_speaking(data: UserSpeakingData, state: &SignalingState, session_id: Option<SessionId>) {
    let Some((_, sid)) = bound_player(state, session_id) else { return };
    let Some(session) = state.app.sessions.get(sid) else { return };
    let obfuscated_id = session.obfuscated_id;
    drop(session);
    let settings = state.app.settings_snapshot().await;
    let audience = router::audience_session_ids(sid, &state.app.sessions, &state.app.positions, &state.app.groups, settings.default_proximity_distance);
    broadcast_to(state, &audience, ServerMessage::UserSpeakingStatus(UserSpeakingStatusData { player_id: obfuscated_id, speaking: data.speaking }));
}

async fn handle_user_mute(data: UserMuteData, state: &SignalingState, session_id: Option<SessionId>) {
    let Some((_, sid)) = bound_player(state, session_id) else { return };
    state.app.sessions.set_mic_muted(sid, data.muted);
    let Some(session) = state.app.sessions.get(sid) else { return };
    let obfuscated_id = session.obfuscated_id;
    drop(session);
    let settings = state.app.settings_snapshot().await;
    let audience = router::audience_session_ids(sid, &state.app.sessions, &state.app.positions, &state.app.groups, settings.default_proximity_distance);
    broadcast_to(state, &audience, ServerMessage::UserMuteStatus(UserMuteStatusData { player_id: obfuscated_id, muted: data.muted }));
}

async fn handle_audio_fallback(
    data: AudioFallbackData,
    state: &SignalingState,
    tx: &mpsc::UnboundedSender<ServerMessage>,
    session_id: Option<SessionId>,
) {
    use base64::Engine;
    let Some(sid) = session_id else { return };
    let Some(session) = state.app.sessions.get(sid) else { return };
    let Some(player_id) = session.player_id else { return };
    let sender_obfuscated_id = session.obfuscated_id;
    let needs_egress = session.audio_egress.is_none();
    drop(session);

    if needs_egress {
        state.app.sessions.set_audio_egress(sid, AudioEgress::spawn(AudioSink::WebSocketFallback(tx.clone())));
    }

    let Ok(pcm_bytes) = base64::engine::general_purpose::STANDARD.decode(&data.audio_data) else {
        warn!(%sid, "malformed base64 in audio fallback message");
        return;
    };
    let samples: Vec<i16> = pcm_bytes.chunks_exact(2).map(|c| i16::from_le_bytes([c[0], c[1]])).collect();
    let frame = voice_protocol::audio_frame::AudioFrame::PcmPlain { sender_id: player_id_hex(player_id), samples };

    let settings = state.app.settings_snapshot().await;
    let routed = router::route(
        sid,
        frame,
        &state.app.sessions,
        &state.app.positions,
        &state.app.groups,
        settings.default_proximity_distance,
        settings.server_side_pcm_gain,
    );
    router::dispatch(routed, &state.app.sessions, player_id, sender_obfuscated_id);
}

/// Broadcasts group membership/list changes to whoever's affected. Spawned
/// once per server from `main.rs`, not per connection, so a group event is
/// never fanned out more than once no matter how many sessions are active.
pub async fn run_group_event_broadcaster(state: SignalingState) {
    let mut events = state.app.groups.subscribe();
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                warn!(skipped = n, "group event broadcaster lagged");
                continue;
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        };
        match event {
            GroupEvent::MembersUpdated { group_id, members } => {
                let member_ids: Vec<ObfuscatedId> = members
                    .into_iter()
                    .filter_map(|p| state.app.sessions.session_for_player(p))
                    .filter_map(|sid| state.app.sessions.get(sid).map(|s| s.obfuscated_id))
                    .collect();
                let wire = ServerMessage::GroupMembersUpdated(GroupMembersUpdatedData { group_id: group_id.to_string(), member_ids });
                let recipients: Vec<SessionId> = state.app.groups.members(group_id).into_iter().filter_map(|p| state.app.sessions.session_for_player(p)).collect();
                broadcast_to(&state, &recipients, wire);
            }
            GroupEvent::GroupDeleted { .. } | GroupEvent::ListChanged => {
                // Clients poll `list_groups` on demand; the active-session set
                // that would most want push notification here is operator
                // tooling (`voice-group`), which reads group state directly.
            }
        }
    }
}

/// Periodic heartbeat/pending-grace sweep, mirroring what the UDP transport's
/// address table never needed (UDP has no keepalive of its own) but every
/// signalling session does.
pub async fn run_session_sweeper(state: SignalingState, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        let expired = state.app.sessions.sweep(Instant::now());
        for (session_id, reason, player_id) in expired {
            debug!(%session_id, ?reason, "session swept");
            if let Some(player_id) = player_id {
                let _ = state.app.groups.leave(player_id);
                state.app.positions.remove(player_id);
            }
            state.webrtc.close_session(session_id).await;
        }
    }
}

async fn teardown_session(state: &SignalingState, session_id: SessionId, reason: CloseReason) {
    debug!(%session_id, ?reason, "tearing down session");
    if let Some(session) = state.app.sessions.remove(session_id) {
        if let Some(player_id) = session.player_id {
            let _ = state.app.groups.leave(player_id);
            state.app.positions.remove(player_id);
        }
    }
    state.webrtc.close_session(session_id).await;
    broadcast_player_list(state).await;
}

async fn broadcast_player_list(state: &SignalingState) {
    let players = player_summaries(state);
    let recipients: Vec<SessionId> = state.app.sessions.active_sessions().into_iter().map(|(sid, _)| sid).collect();
    broadcast_to(state, &recipients, ServerMessage::PlayerList(PlayerListData { players }));
}

fn player_summaries(state: &SignalingState) -> Vec<PlayerSummaryWire> {
    state
        .app
        .sessions
        .active_sessions()
        .into_iter()
        .filter_map(|(sid, _)| {
            let session = state.app.sessions.get(sid)?;
            Some(PlayerSummaryWire { id: session.obfuscated_id, username: session.username.clone() })
        })
        .collect()
}

fn broadcast_to(state: &SignalingState, sessions: &[SessionId], message: ServerMessage) {
    for sid in sessions {
        if let Some(session) = state.app.sessions.get(*sid) {
            let _ = session.signal_tx.send(message.clone());
        }
    }
}

/// Resolves the connection's bound player and session, logging nothing on a
/// miss — an unauthenticated client issuing group/voice ops is simply ignored.
fn bound_player(state: &SignalingState, session_id: Option<SessionId>) -> Option<(PlayerId, SessionId)> {
    let sid = session_id?;
    let session = state.app.sessions.get(sid)?;
    let player_id = session.player_id?;
    Some((player_id, sid))
}

fn parse_group_id(s: &str) -> Option<GroupId> {
    Uuid::parse_str(s).ok().map(|u| GroupId::from_bytes(*u.as_bytes()))
}

fn send_invalid_group_id(tx: &mpsc::UnboundedSender<ServerMessage>) {
    let _ = tx.send(ServerMessage::Error(ErrorData { code: "invalid_group_id".into(), message: "group id is not a valid uuid".into() }));
}

fn group_wire(state: &SignalingState, group_id: GroupId) -> Option<GroupSummaryWire> {
    state.app.groups.list().iter().find(|g| g.group_id == group_id).map(to_wire)
}

fn to_wire(summary: &voice_protocol::group::GroupSummary) -> GroupSummaryWire {
    GroupSummaryWire {
        group_id: summary.group_id.to_string(),
        name: summary.name.clone(),
        member_count: summary.member_count,
        max_members: summary.max_members,
        permanent: summary.permanent,
        isolated: summary.isolated,
        has_password: summary.has_password,
    }
}

fn obfuscated_members(state: &SignalingState, group_id: GroupId) -> Vec<ObfuscatedId> {
    state
        .app
        .groups
        .members(group_id)
        .into_iter()
        .filter_map(|p| state.app.sessions.session_for_player(p))
        .filter_map(|sid| state.app.sessions.get(sid).map(|s| s.obfuscated_id))
        .collect()
}

fn send_group_op_error(tx: &mpsc::UnboundedSender<ServerMessage>, err: voice_protocol::group::GroupOpError) {
    use voice_protocol::group::GroupOpError;
    let (code, message) = match err {
        GroupOpError::NotFound => ("group_not_found", "no such group"),
        GroupOpError::NotPermitted => ("not_permitted", "only the group's creator or an operator may do this"),
        GroupOpError::NameTooLong => ("name_too_long", "group name exceeds the configured limit"),
        GroupOpError::TooManyGroups => ("too_many_groups", "the server's group limit has been reached"),
    };
    let _ = tx.send(ServerMessage::Error(ErrorData { code: code.into(), message: message.into() }));
}

fn join_error_code(err: voice_protocol::group::JoinError) -> &'static str {
    use voice_protocol::group::JoinError;
    match err {
        JoinError::WrongPassword => "wrong_password",
        JoinError::Full => "group_full",
        JoinError::NotFound => "group_not_found",
        JoinError::AlreadyInGroup => "already_in_group",
    }
}

fn join_error_message(err: voice_protocol::group::JoinError) -> &'static str {
    use voice_protocol::group::JoinError;
    match err {
        JoinError::WrongPassword => "incorrect group password",
        JoinError::Full => "group has reached its member limit",
        JoinError::NotFound => "no such group",
        JoinError::AlreadyInGroup => "already a member of a group",
    }
}

fn player_id_hex(id: PlayerId) -> String {
    id.to_bytes().iter().map(|b| format!("{:02x}", b)).collect()
}
