//! `AudioRouter::route`: audience selection and per-recipient spatialization.
//!
//! A plain, non-async function over the three state maps so it never awaits
//! while holding a lock — the owning transport's receive loop calls this,
//! then dispatches each `RoutedFrame` to its recipient's egress queue.

use std::collections::HashSet;

use voice_protocol::audio_frame::{AudioFrame, ProximityMeta};
use voice_protocol::ids::{ObfuscatedId, PlayerId, SessionId};
use voice_protocol::spatial::{apply_gain_i16, distance_gain, rotate_to_listener_frame};

use crate::audio_sink::EgressFrame;
use crate::group_registry::GroupRegistry;
use crate::position_tracker::PositionTracker;
use crate::session_registry::{SessionRegistry, SessionStatus};

pub struct RoutedFrame {
    pub recipient_session_id: SessionId,
    pub frame: AudioFrame,
}

/// Pushes every routed frame onto its recipient's egress queue. Shared by
/// all three transports so a sender on one never needs to know how a
/// recipient on another is actually reached.
pub fn dispatch(
    routed: Vec<RoutedFrame>,
    sessions: &SessionRegistry,
    sender_player_id: PlayerId,
    sender_obfuscated_id: ObfuscatedId,
) {
    for routed_frame in routed {
        let Some(session) = sessions.get(routed_frame.recipient_session_id) else {
            continue;
        };
        let Some(egress) = &session.audio_egress else {
            continue;
        };
        egress.push(EgressFrame {
            frame: routed_frame.frame,
            sender_player_id,
            sender_obfuscated_id,
        });
    }
}

/// Builds the audience for one inbound frame and attaches per-recipient
/// spatial metadata. See the proximity/group/isolation rules this encodes.
pub fn route(
    sender_session_id: SessionId,
    frame: AudioFrame,
    sessions: &SessionRegistry,
    positions: &PositionTracker,
    groups: &GroupRegistry,
    default_proximity: f32,
    apply_server_gain: bool,
) -> Vec<RoutedFrame> {
    let Some(sender) = sessions.get(sender_session_id) else {
        return Vec::new();
    };
    if sender.status != SessionStatus::Active || sender.mic_muted {
        return Vec::new();
    }
    let Some(sender_player_id) = sender.player_id else {
        return Vec::new();
    };
    drop(sender);

    let Some(sender_pos) = positions.get(sender_player_id) else {
        return broadcast_fallback(sender_session_id, sender_player_id, frame, sessions);
    };

    let sender_group_id = groups.group_of(sender_player_id);
    let (proximity_range, isolated, group_members) = match sender_group_id {
        Some(group_id) => {
            let range = groups
                .settings_of(group_id)
                .map(|s| s.proximity_range_blocks)
                .unwrap_or(default_proximity);
            let members: HashSet<PlayerId> = groups
                .members(group_id)
                .into_iter()
                .filter(|m| *m != sender_player_id)
                .collect();
            (range, groups.is_isolated(group_id), members)
        }
        None => (default_proximity, false, HashSet::new()),
    };

    let proximity_candidates = positions.snapshot_world(&sender_pos.world_id);
    let proximity_set: HashSet<PlayerId> = proximity_candidates
        .iter()
        .filter(|(player_id, _)| *player_id != sender_player_id)
        .filter(|(_, pos)| sender_pos.distance(pos) <= proximity_range)
        .map(|(player_id, _)| *player_id)
        .collect();

    let audience: HashSet<PlayerId> = if isolated {
        // (P ∩ G) ∪ G collapses to G: any proximity recipient outside the
        // isolated group is dropped, and every group member is always included.
        group_members.clone()
    } else {
        // The sender's own group (if any) is non-isolated here, so any
        // proximity recipient who belongs to an isolated group is necessarily
        // a member of a *different* one, and must not hear this sender.
        proximity_set
            .iter()
            .filter(|player_id| !groups.group_of(**player_id).is_some_and(|g| groups.is_isolated(g)))
            .copied()
            .collect::<HashSet<PlayerId>>()
            .union(&group_members)
            .copied()
            .collect()
    };

    let mut out = Vec::with_capacity(audience.len());
    for recipient_player_id in audience {
        let Some(recipient_session_id) = sessions.session_for_player(recipient_player_id) else {
            continue;
        };
        let Some(recipient_session) = sessions.get(recipient_session_id) else {
            continue;
        };
        if recipient_session.status != SessionStatus::Active {
            continue;
        }
        drop(recipient_session);

        let recipient_pos = positions.get(recipient_player_id);
        let spatial = match &recipient_pos {
            Some(pos) if proximity_set.contains(&recipient_player_id) => {
                let relative = (
                    sender_pos.x - pos.x,
                    sender_pos.y - pos.y,
                    sender_pos.z - pos.z,
                );
                let rotated = rotate_to_listener_frame(relative, pos.yaw, pos.pitch);
                let distance = sender_pos.distance(pos);
                Some((rotated, ProximityMeta { distance, max_range: proximity_range }))
            }
            _ => None,
        };

        let gain = spatial.as_ref().map(|(_, meta)| distance_gain(meta.distance, meta.max_range));
        let routed_frame = attach_metadata(&frame, spatial.map(|(_, meta)| meta), gain, apply_server_gain);
        out.push(RoutedFrame {
            recipient_session_id,
            frame: routed_frame,
        });
    }
    out
}

/// The set of sessions that would hear `sender_session_id` right now, without
/// actually building or sending a frame. Used to scope `user_speaking`/
/// `user_mute` status broadcasts to the same audience audio routing would
/// reach, so a status update never leaks presence to a player who could not
/// otherwise hear this sender (the same leak-prevention rule `route` enforces
/// for audio itself). Unlike `route`, not gated on `mic_muted` — a muted
/// player's mute-state changes still need to reach their audience.
pub fn audience_session_ids(
    sender_session_id: SessionId,
    sessions: &SessionRegistry,
    positions: &PositionTracker,
    groups: &GroupRegistry,
    default_proximity: f32,
) -> Vec<SessionId> {
    let Some(sender) = sessions.get(sender_session_id) else {
        return Vec::new();
    };
    if sender.status != SessionStatus::Active {
        return Vec::new();
    }
    let Some(sender_player_id) = sender.player_id else {
        return Vec::new();
    };
    drop(sender);

    let Some(sender_pos) = positions.get(sender_player_id) else {
        return sessions
            .active_sessions()
            .into_iter()
            .filter(|(sid, player_id)| *sid != sender_session_id && *player_id != sender_player_id)
            .map(|(sid, _)| sid)
            .collect();
    };

    let sender_group_id = groups.group_of(sender_player_id);
    let (proximity_range, isolated, group_members) = match sender_group_id {
        Some(group_id) => {
            let range = groups
                .settings_of(group_id)
                .map(|s| s.proximity_range_blocks)
                .unwrap_or(default_proximity);
            let members: HashSet<PlayerId> = groups
                .members(group_id)
                .into_iter()
                .filter(|m| *m != sender_player_id)
                .collect();
            (range, groups.is_isolated(group_id), members)
        }
        None => (default_proximity, false, HashSet::new()),
    };

    let audience_players: HashSet<PlayerId> = if isolated {
        group_members
    } else {
        let proximity_candidates = positions.snapshot_world(&sender_pos.world_id);
        let proximity_set: HashSet<PlayerId> = proximity_candidates
            .iter()
            .filter(|(player_id, _)| *player_id != sender_player_id)
            .filter(|(_, pos)| sender_pos.distance(pos) <= proximity_range)
            .filter(|(player_id, _)| !groups.group_of(*player_id).is_some_and(|g| groups.is_isolated(g)))
            .map(|(player_id, _)| *player_id)
            .collect();
        proximity_set.union(&group_members).copied().collect()
    };

    audience_players
        .into_iter()
        .filter_map(|player_id| sessions.session_for_player(player_id))
        .collect()
}

/// Used only until a sender's first position report arrives: broadcast to
/// every other active, player-bound session so early audio isn't lost.
fn broadcast_fallback(
    sender_session_id: SessionId,
    sender_player_id: PlayerId,
    frame: AudioFrame,
    sessions: &SessionRegistry,
) -> Vec<RoutedFrame> {
    sessions
        .active_sessions()
        .into_iter()
        .filter(|(session_id, player_id)| *session_id != sender_session_id && *player_id != sender_player_id)
        .map(|(session_id, _)| RoutedFrame {
            recipient_session_id: session_id,
            frame: frame.clone(),
        })
        .collect()
}

fn attach_metadata(
    frame: &AudioFrame,
    proximity: Option<ProximityMeta>,
    gain: Option<f32>,
    apply_server_gain: bool,
) -> AudioFrame {
    match frame {
        AudioFrame::PcmPlain { sender_id, samples } => {
            let samples = scale_if_enabled(samples, gain, apply_server_gain);
            match proximity {
                Some(proximity) => AudioFrame::PcmWithProximity {
                    sender_id: sender_id.clone(),
                    proximity,
                    samples,
                },
                None => AudioFrame::PcmPlain {
                    sender_id: sender_id.clone(),
                    samples,
                },
            }
        }
        AudioFrame::PcmWithProximity { sender_id, samples, .. } => {
            let samples = scale_if_enabled(samples, gain, apply_server_gain);
            match proximity {
                Some(proximity) => AudioFrame::PcmWithProximity {
                    sender_id: sender_id.clone(),
                    proximity,
                    samples,
                },
                None => AudioFrame::PcmPlain {
                    sender_id: sender_id.clone(),
                    samples,
                },
            }
        }
        AudioFrame::Opus { sender_id, payload, .. } => AudioFrame::Opus {
            sender_id: sender_id.clone(),
            proximity,
            gain,
            payload: payload.clone(),
        },
    }
}

fn scale_if_enabled(samples: &[i16], gain: Option<f32>, apply_server_gain: bool) -> Vec<i16> {
    match gain {
        Some(gain) if apply_server_gain => samples.iter().map(|s| apply_gain_i16(*s, gain)).collect(),
        _ => samples.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc;
    use voice_protocol::group::GroupSettings;
    use voice_protocol::position::PlayerPosition;

    use super::*;
    use crate::group_registry::GroupRegistry;
    use crate::position_tracker::PositionTracker;
    use crate::session_registry::SessionRegistry;

    struct Fixture {
        sessions: SessionRegistry,
        positions: PositionTracker,
        groups: GroupRegistry,
    }

    fn fixture() -> Fixture {
        Fixture {
            sessions: SessionRegistry::new(Duration::from_secs(15), Duration::from_secs(30)),
            positions: PositionTracker::new(),
            groups: GroupRegistry::new(64),
        }
    }

    fn spawn_player(fx: &Fixture, name: &str, pos: PlayerPosition) -> (PlayerId, SessionId) {
        let (tx, _rx) = mpsc::unbounded_channel();
        let session_id = fx.sessions.new_session(name.into(), tx);
        let player_id = PlayerId::new_random();
        fx.sessions.bind_player(session_id, player_id);
        fx.positions.upsert(player_id, name.into(), pos);
        (player_id, session_id)
    }

    fn pcm(samples: Vec<i16>) -> AudioFrame {
        AudioFrame::PcmPlain {
            sender_id: "sender".into(),
            samples,
        }
    }

    #[test]
    fn nearby_player_gets_spatial_audio() {
        let fx = fixture();
        let (_a, sender_session) = spawn_player(&fx, "a", PlayerPosition::new(0.0, 64.0, 0.0, 0.0, 0.0, "overworld"));
        let (_b, _b_session) = spawn_player(&fx, "b", PlayerPosition::new(10.0, 64.0, 0.0, 0.0, 0.0, "overworld"));

        let routed = route(sender_session, pcm(vec![1000]), &fx.sessions, &fx.positions, &fx.groups, 30.0, false);
        assert_eq!(routed.len(), 1);
        assert!(matches!(routed[0].frame, AudioFrame::PcmWithProximity { .. }));
    }

    #[test]
    fn far_player_out_of_range_excluded() {
        let fx = fixture();
        let (_a, sender_session) = spawn_player(&fx, "a", PlayerPosition::new(0.0, 64.0, 0.0, 0.0, 0.0, "overworld"));
        spawn_player(&fx, "b", PlayerPosition::new(1000.0, 64.0, 0.0, 0.0, 0.0, "overworld"));

        let routed = route(sender_session, pcm(vec![1000]), &fx.sessions, &fx.positions, &fx.groups, 30.0, false);
        assert!(routed.is_empty());
    }

    #[test]
    fn group_member_out_of_range_gets_non_spatial_audio() {
        let fx = fixture();
        let (a, sender_session) = spawn_player(&fx, "a", PlayerPosition::new(0.0, 64.0, 0.0, 0.0, 0.0, "overworld"));
        let (b, _b_session) = spawn_player(&fx, "b", PlayerPosition::new(1000.0, 64.0, 0.0, 0.0, 0.0, "overworld"));
        let group_id = fx.groups.create("squad".into(), false, a, GroupSettings::default(), None).unwrap();
        fx.groups.join(b, group_id, None).unwrap();

        let routed = route(sender_session, pcm(vec![1000]), &fx.sessions, &fx.positions, &fx.groups, 30.0, false);
        assert_eq!(routed.len(), 1);
        assert!(matches!(routed[0].frame, AudioFrame::PcmPlain { .. }));
    }

    #[test]
    fn isolated_group_excludes_non_member_in_proximity() {
        let fx = fixture();
        let (a, sender_session) = spawn_player(&fx, "a", PlayerPosition::new(0.0, 64.0, 0.0, 0.0, 0.0, "overworld"));
        let (b, _b_session) = spawn_player(&fx, "b", PlayerPosition::new(5.0, 64.0, 0.0, 0.0, 0.0, "overworld"));
        spawn_player(&fx, "c", PlayerPosition::new(5.0, 64.0, 0.0, 0.0, 0.0, "overworld"));
        let group_id = fx.groups.create("squad".into(), false, a, GroupSettings::default(), None).unwrap();
        fx.groups.join(b, group_id, None).unwrap();
        fx.groups.set_isolated(group_id, None, true).unwrap();

        let routed = route(sender_session, pcm(vec![1000]), &fx.sessions, &fx.positions, &fx.groups, 30.0, false);
        let recipient_sessions: HashSet<SessionId> = routed.iter().map(|r| r.recipient_session_id).collect();
        assert_eq!(recipient_sessions.len(), 1, "only the isolated group member should be reachable, not the bystander");
    }

    #[test]
    fn audience_session_ids_matches_proximity_audio_routing() {
        let fx = fixture();
        let (_a, sender_session) = spawn_player(&fx, "a", PlayerPosition::new(0.0, 64.0, 0.0, 0.0, 0.0, "overworld"));
        let (_b, b_session) = spawn_player(&fx, "b", PlayerPosition::new(10.0, 64.0, 0.0, 0.0, 0.0, "overworld"));
        spawn_player(&fx, "c", PlayerPosition::new(1000.0, 64.0, 0.0, 0.0, 0.0, "overworld"));

        let audience = audience_session_ids(sender_session, &fx.sessions, &fx.positions, &fx.groups, 30.0);
        assert_eq!(audience, vec![b_session]);
    }

    #[test]
    fn unbound_sender_produces_no_routed_frames() {
        let fx = fixture();
        let (tx, _rx) = mpsc::unbounded_channel();
        let sender_session = fx.sessions.new_session("pending".into(), tx);
        spawn_player(&fx, "b", PlayerPosition::new(1.0, 64.0, 0.0, 0.0, 0.0, "overworld"));

        let routed = route(sender_session, pcm(vec![1000]), &fx.sessions, &fx.positions, &fx.groups, 30.0, false);
        assert!(routed.is_empty());
    }
}
