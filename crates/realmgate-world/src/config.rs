//! Movement tuning.

/// Tuning for the movement authority.
///
/// Defaults match the character controller the game client was built
/// against.
#[derive(Debug, Clone)]
pub struct MovementConfig {
    /// Travel speed in world units per second.
    pub move_speed: f32,
    /// Turn speed factor. Facing turns by at most `rotation_speed * 60`
    /// degrees per second.
    pub rotation_speed: f32,
    /// Distance from the path target at which the entity brakes and
    /// counts as arrived.
    pub stopping_distance: f32,
    /// Search radius when snapping a move destination onto the surface.
    pub path_search_radius: f32,
    /// Search radius when snapping a teleport (or spawn) position.
    pub teleport_search_radius: f32,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            move_speed: 5.0,
            rotation_speed: 10.0,
            stopping_distance: 0.5,
            path_search_radius: 2.0,
            teleport_search_radius: 5.0,
        }
    }
}

impl MovementConfig {
    /// Maximum facing change in degrees per second.
    pub fn turn_rate_deg_per_sec(&self) -> f32 {
        self.rotation_speed * 60.0
    }
}
