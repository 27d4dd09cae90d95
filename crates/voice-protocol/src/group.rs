use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::ids::{GroupId, PlayerId};

/// Per-group tunables set at creation time and mutable by the creator/an operator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GroupSettings {
    pub max_members: u32,
    pub proximity_range_blocks: f32,
    pub allow_invites: bool,
    pub default_volume: f32,
}

impl Default for GroupSettings {
    fn default() -> Self {
        Self {
            max_members: 16,
            proximity_range_blocks: 30.0,
            allow_invites: true,
            default_volume: 1.0,
        }
    }
}

/// A voice group: proximity-independent audience the router treats as always-audible
/// to each other, optionally `isolated` from ordinary proximity routing.
#[derive(Debug, Clone)]
pub struct Group {
    pub group_id: GroupId,
    pub name: String,
    pub creator_player_id: PlayerId,
    pub permanent: bool,
    pub isolated: bool,
    pub password_hash: Option<String>,
    pub settings: GroupSettings,
    pub members: HashSet<PlayerId>,
}

impl Group {
    pub fn is_full(&self) -> bool {
        self.members.len() as u32 >= self.settings.max_members
    }
}

/// Public summary of a group, as surfaced to clients via `list_groups`/`group_list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupSummary {
    pub group_id: GroupId,
    pub name: String,
    pub member_count: u32,
    pub max_members: u32,
    pub permanent: bool,
    pub isolated: bool,
    pub has_password: bool,
}

impl From<&Group> for GroupSummary {
    fn from(g: &Group) -> Self {
        Self {
            group_id: g.group_id,
            name: g.name.clone(),
            member_count: g.members.len() as u32,
            max_members: g.settings.max_members,
            permanent: g.permanent,
            isolated: g.isolated,
            has_password: g.password_hash.is_some(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinError {
    WrongPassword,
    Full,
    NotFound,
    AlreadyInGroup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveError {
    NotMember,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupOpError {
    NotFound,
    NotPermitted,
    NameTooLong,
    TooManyGroups,
}
