use dashmap::{DashMap, DashSet};
use voice_protocol::ids::PlayerId;
use voice_protocol::position::PlayerPosition;

/// `player_id -> PlayerPosition`, plus a per-world index so the router can
/// enumerate candidate recipients without scanning every tracked player.
pub struct PositionTracker {
    positions: DashMap<PlayerId, (String, PlayerPosition)>,
    by_world: DashMap<String, DashSet<PlayerId>>,
}

impl PositionTracker {
    pub fn new() -> Self {
        Self {
            positions: DashMap::new(),
            by_world: DashMap::new(),
        }
    }

    /// Idempotent: inserting again for the same player just overwrites.
    pub fn upsert(&self, player_id: PlayerId, username: String, position: PlayerPosition) {
        let world_id = position.world_id.clone();
        if let Some((_, (old_world, _))) = self.positions.remove(&player_id) {
            if old_world != world_id {
                if let Some(set) = self.by_world.get(&old_world) {
                    set.remove(&player_id);
                }
            }
        }
        self.by_world
            .entry(world_id)
            .or_insert_with(DashSet::new)
            .insert(player_id);
        self.positions.insert(player_id, (username, position));
    }

    pub fn remove(&self, player_id: PlayerId) {
        if let Some((_, (_, position))) = self.positions.remove(&player_id) {
            if let Some(set) = self.by_world.get(&position.world_id) {
                set.remove(&player_id);
            }
        }
    }

    pub fn get(&self, player_id: PlayerId) -> Option<PlayerPosition> {
        self.positions.get(&player_id).map(|e| e.value().1.clone())
    }

    /// All `(player_id, position)` pairs sharing `world_id`, excluding nobody —
    /// callers filter out the sender themselves.
    pub fn snapshot_world(&self, world_id: &str) -> Vec<(PlayerId, PlayerPosition)> {
        let Some(set) = self.by_world.get(world_id) else {
            return Vec::new();
        };
        set.iter()
            .filter_map(|id| self.positions.get(&id).map(|e| (*id, e.value().1.clone())))
            .collect()
    }

    pub fn resolve_by_username(&self, name: &str) -> Option<PlayerId> {
        self.positions
            .iter()
            .find(|e| e.value().0 == name)
            .map(|e| *e.key())
    }
}

impl Default for PositionTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(x: f32, world: &str) -> PlayerPosition {
        PlayerPosition::new(x, 64.0, 0.0, 0.0, 0.0, world)
    }

    #[test]
    fn upsert_then_get() {
        let tracker = PositionTracker::new();
        let id = PlayerId::new_random();
        tracker.upsert(id, "alice".into(), pos(1.0, "overworld"));
        assert_eq!(tracker.get(id).unwrap().x, 1.0);
    }

    #[test]
    fn upsert_is_idempotent() {
        let tracker = PositionTracker::new();
        let id = PlayerId::new_random();
        tracker.upsert(id, "alice".into(), pos(1.0, "overworld"));
        tracker.upsert(id, "alice".into(), pos(2.0, "overworld"));
        assert_eq!(tracker.snapshot_world("overworld").len(), 1);
        assert_eq!(tracker.get(id).unwrap().x, 2.0);
    }

    #[test]
    fn remove_clears_position_and_world_index() {
        let tracker = PositionTracker::new();
        let id = PlayerId::new_random();
        tracker.upsert(id, "alice".into(), pos(1.0, "overworld"));
        tracker.remove(id);
        assert!(tracker.get(id).is_none());
        assert!(tracker.snapshot_world("overworld").is_empty());
    }

    #[test]
    fn moving_worlds_updates_both_indices() {
        let tracker = PositionTracker::new();
        let id = PlayerId::new_random();
        tracker.upsert(id, "alice".into(), pos(1.0, "overworld"));
        tracker.upsert(id, "alice".into(), pos(1.0, "nether"));
        assert!(tracker.snapshot_world("overworld").is_empty());
        assert_eq!(tracker.snapshot_world("nether").len(), 1);
    }

    #[test]
    fn snapshot_world_only_returns_matching_world() {
        let tracker = PositionTracker::new();
        let a = PlayerId::new_random();
        let b = PlayerId::new_random();
        tracker.upsert(a, "alice".into(), pos(0.0, "overworld"));
        tracker.upsert(b, "bob".into(), pos(0.0, "nether"));
        assert_eq!(tracker.snapshot_world("overworld").len(), 1);
        assert_eq!(tracker.snapshot_world("nether").len(), 1);
        assert!(tracker.snapshot_world("end").is_empty());
    }

    #[test]
    fn resolve_by_username_is_case_exact() {
        let tracker = PositionTracker::new();
        let id = PlayerId::new_random();
        tracker.upsert(id, "Alice".into(), pos(0.0, "overworld"));
        assert_eq!(tracker.resolve_by_username("Alice"), Some(id));
        assert_eq!(tracker.resolve_by_username("alice"), None);
    }
}
