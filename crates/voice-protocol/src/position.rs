use serde::{Deserialize, Serialize};

/// A player's location and facing in the game world.
///
/// `world_id` partitions the audible space: positions in different worlds
/// are never compared for proximity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerPosition {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    /// Degrees.
    pub yaw: f32,
    /// Degrees.
    pub pitch: f32,
    pub world_id: String,
}

impl PlayerPosition {
    pub fn new(x: f32, y: f32, z: f32, yaw: f32, pitch: f32, world_id: impl Into<String>) -> Self {
        Self {
            x,
            y,
            z,
            yaw,
            pitch,
            world_id: world_id.into(),
        }
    }

    /// Euclidean distance over `(x, y, z)` to another position. Callers are
    /// responsible for confirming both positions share a `world_id` first.
    pub fn distance(&self, other: &PlayerPosition) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// Whether two positions can be compared for proximity at all.
    pub fn same_world(&self, other: &PlayerPosition) -> bool {
        self.world_id == other.world_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_is_symmetric() {
        let a = PlayerPosition::new(0.0, 64.0, 0.0, 0.0, 0.0, "overworld");
        let b = PlayerPosition::new(10.0, 64.0, 0.0, 90.0, 0.0, "overworld");
        assert_eq!(a.distance(&b), b.distance(&a));
        assert!((a.distance(&b) - 10.0).abs() < 1e-4);
    }

    #[test]
    fn zero_distance_for_same_point() {
        let a = PlayerPosition::new(1.0, 2.0, 3.0, 0.0, 0.0, "overworld");
        assert_eq!(a.distance(&a), 0.0);
    }

    #[test]
    fn different_worlds_are_not_the_same_world() {
        let a = PlayerPosition::new(0.0, 0.0, 0.0, 0.0, 0.0, "overworld");
        let b = PlayerPosition::new(0.0, 0.0, 0.0, 0.0, 0.0, "nether");
        assert!(!a.same_world(&b));
    }
}
