use dashmap::DashMap;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tokio::sync::broadcast;
use tracing::warn;
use voice_protocol::group::{Group, GroupOpError, GroupSettings, GroupSummary, JoinError, LeaveError};
use voice_protocol::ids::{GroupId, PlayerId};

/// SHA-256 hex digest of `password`; `Group.password_hash` never holds the
/// raw secret, on disk or on the wire.
fn hash_password(password: &str) -> String {
    let digest = Sha256::digest(password.as_bytes());
    hex_encode(&digest)
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

fn hashes_match(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Emitted on every mutation; the `SignalingHub` subscribes once per
/// connection and filters by which sessions the event concerns.
#[derive(Debug, Clone)]
pub enum GroupEvent {
    MembersUpdated { group_id: GroupId, members: Vec<PlayerId> },
    GroupDeleted { group_id: GroupId },
    ListChanged,
}

/// Authoritative state for voice groups: membership, settings, isolation,
/// passwords, permanence.
pub struct GroupRegistry {
    groups: DashMap<GroupId, Group>,
    member_of: DashMap<PlayerId, GroupId>,
    max_group_count: u32,
    events: broadcast::Sender<GroupEvent>,
}

impl GroupRegistry {
    pub fn new(max_group_count: u32) -> Self {
        let (events, _rx) = broadcast::channel(256);
        Self {
            groups: DashMap::new(),
            member_of: DashMap::new(),
            max_group_count,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GroupEvent> {
        self.events.subscribe()
    }

    /// `permanent` is a server/operator-only capability. Player-initiated
    /// requests must call this with `permanent = false` and never trust a
    /// client-sourced permanence flag.
    pub fn create(
        &self,
        name: String,
        permanent: bool,
        creator: PlayerId,
        settings: GroupSettings,
        password: Option<String>,
    ) -> Result<GroupId, GroupOpError> {
        self.create_with_isolation(name, permanent, false, creator, settings, password)
    }

    /// Isolation, like permanence, may only be requested by the server or an
    /// operator; player-initiated creates must go through `create` instead.
    pub fn create_with_isolation(
        &self,
        name: String,
        permanent: bool,
        isolated: bool,
        creator: PlayerId,
        settings: GroupSettings,
        password: Option<String>,
    ) -> Result<GroupId, GroupOpError> {
        if self.groups.len() as u32 >= self.max_group_count {
            return Err(GroupOpError::TooManyGroups);
        }
        let group_id = GroupId::new_random();
        let mut members = std::collections::HashSet::new();
        members.insert(creator);
        self.groups.insert(
            group_id,
            Group {
                group_id,
                name,
                creator_player_id: creator,
                permanent,
                isolated,
                password_hash: password.map(|p| hash_password(&p)),
                settings,
                members,
            },
        );
        self.member_of.insert(creator, group_id);
        let _ = self.events.send(GroupEvent::ListChanged);
        Ok(group_id)
    }

    pub fn join(&self, player_id: PlayerId, group_id: GroupId, password: Option<&str>) -> Result<(), JoinError> {
        if self.member_of.contains_key(&player_id) {
            return Err(JoinError::AlreadyInGroup);
        }
        let mut group = self.groups.get_mut(&group_id).ok_or(JoinError::NotFound)?;
        if let Some(expected) = &group.password_hash {
            let matches = password.map(hash_password).is_some_and(|given| hashes_match(&given, expected));
            if !matches {
                return Err(JoinError::WrongPassword);
            }
        }
        if group.is_full() {
            return Err(JoinError::Full);
        }
        group.members.insert(player_id);
        let members: Vec<PlayerId> = group.members.iter().copied().collect();
        drop(group);
        self.member_of.insert(player_id, group_id);
        let _ = self.events.send(GroupEvent::MembersUpdated { group_id, members });
        Ok(())
    }

    pub fn leave(&self, player_id: PlayerId) -> Result<(), LeaveError> {
        let group_id = self.member_of.remove(&player_id).map(|(_, g)| g).ok_or(LeaveError::NotMember)?;
        let mut destroyed = false;
        if let Some(mut group) = self.groups.get_mut(&group_id) {
            group.members.remove(&player_id);
            if group.members.is_empty() && !group.permanent {
                destroyed = true;
            }
        }
        if destroyed {
            self.groups.remove(&group_id);
            let _ = self.events.send(GroupEvent::GroupDeleted { group_id });
        } else if let Some(group) = self.groups.get(&group_id) {
            let members: Vec<PlayerId> = group.members.iter().copied().collect();
            let _ = self.events.send(GroupEvent::MembersUpdated { group_id, members });
        }
        let _ = self.events.send(GroupEvent::ListChanged);
        Ok(())
    }

    pub fn list(&self) -> Vec<GroupSummary> {
        self.groups.iter().map(|e| GroupSummary::from(e.value())).collect()
    }

    pub fn members(&self, group_id: GroupId) -> Vec<PlayerId> {
        self.groups
            .get(&group_id)
            .map(|g| g.members.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn group_of(&self, player_id: PlayerId) -> Option<GroupId> {
        self.member_of.get(&player_id).map(|e| *e.value())
    }

    pub fn is_isolated(&self, group_id: GroupId) -> bool {
        self.groups.get(&group_id).map(|g| g.isolated).unwrap_or(false)
    }

    pub fn settings_of(&self, group_id: GroupId) -> Option<GroupSettings> {
        self.groups.get(&group_id).map(|g| g.settings)
    }

    /// Exposed for the admin CLI, which needs to act as a group's creator to
    /// change its password without itself being a player.
    pub fn creator_of(&self, group_id: GroupId) -> Option<PlayerId> {
        self.groups.get(&group_id).map(|g| g.creator_player_id)
    }

    pub fn set_password(&self, group_id: GroupId, actor: PlayerId, password: Option<String>) -> Result<(), GroupOpError> {
        let mut group = self.groups.get_mut(&group_id).ok_or(GroupOpError::NotFound)?;
        if group.creator_player_id != actor {
            return Err(GroupOpError::NotPermitted);
        }
        group.password_hash = password.map(|p| hash_password(&p));
        Ok(())
    }

    /// `actor = None` marks an operator call (bypasses the creator check);
    /// per spec, permanence may only be granted by the server or an operator.
    pub fn set_permanent(&self, group_id: GroupId, actor: Option<PlayerId>, permanent: bool) -> Result<(), GroupOpError> {
        let mut group = self.groups.get_mut(&group_id).ok_or(GroupOpError::NotFound)?;
        if let Some(actor) = actor {
            if group.creator_player_id != actor {
                return Err(GroupOpError::NotPermitted);
            }
            if permanent {
                warn!(group_id = %group_id, "client attempted to set permanent=true; denied, operator grant required");
                return Err(GroupOpError::NotPermitted);
            }
        }
        group.permanent = permanent;
        Ok(())
    }

    /// `actor = None` marks an operator call; clients cannot toggle isolation.
    pub fn set_isolated(&self, group_id: GroupId, actor: Option<PlayerId>, isolated: bool) -> Result<(), GroupOpError> {
        let mut group = self.groups.get_mut(&group_id).ok_or(GroupOpError::NotFound)?;
        if actor.is_some() {
            warn!(group_id = %group_id, "client attempted to change isolation; denied, operator grant required");
            return Err(GroupOpError::NotPermitted);
        }
        group.isolated = isolated;
        Ok(())
    }

    pub fn delete(&self, group_id: GroupId) -> Result<(), GroupOpError> {
        let group = self.groups.remove(&group_id).ok_or(GroupOpError::NotFound)?;
        for member in group.1.members {
            self.member_of.remove(&member);
        }
        let _ = self.events.send(GroupEvent::GroupDeleted { group_id });
        let _ = self.events.send(GroupEvent::ListChanged);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> GroupRegistry {
        GroupRegistry::new(16)
    }

    #[test]
    fn create_and_join() {
        let reg = registry();
        let creator = PlayerId::new_random();
        let group_id = reg.create("Squad".into(), false, creator, GroupSettings::default(), None).unwrap();
        let joiner = PlayerId::new_random();
        reg.join(joiner, group_id, None).unwrap();
        assert_eq!(reg.group_of(joiner), Some(group_id));
        assert_eq!(reg.members(group_id).len(), 2);
    }

    #[test]
    fn join_wrong_password_fails() {
        let reg = registry();
        let creator = PlayerId::new_random();
        let group_id = reg.create("Locked".into(), false, creator, GroupSettings::default(), Some("secret".into())).unwrap();
        let joiner = PlayerId::new_random();
        assert_eq!(reg.join(joiner, group_id, Some("wrong")), Err(JoinError::WrongPassword));
        assert_eq!(reg.join(joiner, group_id, Some("secret")), Ok(()));
    }

    #[test]
    fn join_full_group_fails() {
        let reg = registry();
        let creator = PlayerId::new_random();
        let mut settings = GroupSettings::default();
        settings.max_members = 1;
        let group_id = reg.create("Full".into(), false, creator, settings, None).unwrap();
        let joiner = PlayerId::new_random();
        assert_eq!(reg.join(joiner, group_id, None), Err(JoinError::Full));
    }

    #[test]
    fn join_nonexistent_group_fails() {
        let reg = registry();
        let joiner = PlayerId::new_random();
        assert_eq!(reg.join(joiner, GroupId::new_random(), None), Err(JoinError::NotFound));
    }

    #[test]
    fn join_while_already_in_a_group_fails() {
        let reg = registry();
        let creator = PlayerId::new_random();
        reg.create("A".into(), false, creator, GroupSettings::default(), None).unwrap();
        let group_b = reg.create("B".into(), false, PlayerId::new_random(), GroupSettings::default(), None).unwrap();
        assert_eq!(reg.join(creator, group_b, None), Err(JoinError::AlreadyInGroup));
    }

    #[test]
    fn leaving_last_member_destroys_non_permanent_group() {
        let reg = registry();
        let creator = PlayerId::new_random();
        let group_id = reg.create("Temp".into(), false, creator, GroupSettings::default(), None).unwrap();
        reg.leave(creator).unwrap();
        assert!(reg.group_of(creator).is_none());
        assert!(reg.list().is_empty());
    }

    #[test]
    fn leaving_permanent_group_keeps_it_alive() {
        let reg = registry();
        let creator = PlayerId::new_random();
        let group_id = reg.create("Perm".into(), true, creator, GroupSettings::default(), None).unwrap();
        reg.leave(creator).unwrap();
        assert_eq!(reg.list().len(), 1);
        assert!(reg.members(group_id).is_empty());
    }

    #[test]
    fn leave_not_a_member_fails() {
        let reg = registry();
        assert_eq!(reg.leave(PlayerId::new_random()), Err(LeaveError::NotMember));
    }

    #[test]
    fn client_cannot_escalate_to_permanent() {
        let reg = registry();
        let creator = PlayerId::new_random();
        let group_id = reg.create("X".into(), false, creator, GroupSettings::default(), None).unwrap();
        assert_eq!(reg.set_permanent(group_id, Some(creator), true), Err(GroupOpError::NotPermitted));
    }

    #[test]
    fn operator_can_grant_permanent() {
        let reg = registry();
        let creator = PlayerId::new_random();
        let group_id = reg.create("X".into(), false, creator, GroupSettings::default(), None).unwrap();
        reg.set_permanent(group_id, None, true).unwrap();
        reg.leave(creator).unwrap();
        assert_eq!(reg.list().len(), 1);
    }

    #[test]
    fn non_creator_cannot_set_password() {
        let reg = registry();
        let creator = PlayerId::new_random();
        let group_id = reg.create("X".into(), false, creator, GroupSettings::default(), None).unwrap();
        let other = PlayerId::new_random();
        assert_eq!(reg.set_password(group_id, other, Some("pw".into())), Err(GroupOpError::NotPermitted));
    }

    #[test]
    fn client_cannot_set_isolated() {
        let reg = registry();
        let creator = PlayerId::new_random();
        let group_id = reg.create("X".into(), false, creator, GroupSettings::default(), None).unwrap();
        assert_eq!(reg.set_isolated(group_id, Some(creator), true), Err(GroupOpError::NotPermitted));
    }

    #[test]
    fn operator_can_set_isolated() {
        let reg = registry();
        let creator = PlayerId::new_random();
        let group_id = reg.create("X".into(), false, creator, GroupSettings::default(), None).unwrap();
        reg.set_isolated(group_id, None, true).unwrap();
        assert!(reg.is_isolated(group_id));
    }

    #[test]
    fn too_many_groups_rejected() {
        let reg = GroupRegistry::new(1);
        reg.create("A".into(), false, PlayerId::new_random(), GroupSettings::default(), None).unwrap();
        let err = reg.create("B".into(), false, PlayerId::new_random(), GroupSettings::default(), None);
        assert_eq!(err, Err(GroupOpError::TooManyGroups));
    }
}
