//! Server configuration.
//!
//! Every sub-crate owns a plain config struct with a `Default`;
//! [`ServerConfig`] gathers them and overlays `REALMGATE_*` environment
//! variables. An invalid value is logged and the default kept, so a typo
//! in the environment never stops the server from starting.

use std::str::FromStr;
use std::time::Duration;

use realmgate_identity::{IdentityConfig, OwnerCheck};
use realmgate_protocol::Vec3;
use realmgate_session::SessionConfig;
use realmgate_tick::TickConfig;
use realmgate_world::MovementConfig;

/// Where new characters appear when their saved position is the origin.
pub const DEFAULT_SPAWN_POINT: Vec3 = Vec3::new(5.0, 0.0, 5.0);

/// Everything the server needs to start.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the WebSocket listener binds to.
    pub bind_addr: String,
    pub identity: IdentityConfig,
    pub session: SessionConfig,
    pub movement: MovementConfig,
    pub tick: TickConfig,
    /// Spawn point for characters without a saved position.
    pub default_spawn: Vec3,
    /// Half side length of the binary's default square of ground.
    pub world_half_extent: f32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:7777".to_string(),
            identity: IdentityConfig::default(),
            session: SessionConfig::default(),
            movement: MovementConfig::default(),
            tick: TickConfig::default(),
            default_spawn: DEFAULT_SPAWN_POINT,
            world_half_extent: 100.0,
        }
    }
}

impl ServerConfig {
    /// Loads config from the process environment over defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads config from an arbitrary key lookup over defaults.
    ///
    /// Recognised keys:
    ///
    /// | key | meaning |
    /// |-----|---------|
    /// | `REALMGATE_BIND_ADDR` | listener address |
    /// | `REALMGATE_IDENTITY_URL` | identity service base URL |
    /// | `REALMGATE_IDENTITY_TIMEOUT_MS` | per-request timeout |
    /// | `REALMGATE_OWNER_CHECK` | `strict`, `when-present` or `disabled` |
    /// | `REALMGATE_ADMISSION_TIMEOUT_SECS` | unbound connection lifetime |
    /// | `REALMGATE_REJECTION_GRACE_MS` | delay before closing a rejected connection |
    /// | `REALMGATE_TICK_RATE` | simulation rate in Hz (1-128) |
    /// | `REALMGATE_MOVE_SPEED` | units per second |
    /// | `REALMGATE_ROTATION_SPEED` | turn rate, x60 degrees per second |
    /// | `REALMGATE_STOPPING_DISTANCE` | arrival distance |
    /// | `REALMGATE_PATH_SEARCH_RADIUS` | destination snap radius |
    /// | `REALMGATE_TELEPORT_SEARCH_RADIUS` | teleport snap radius |
    /// | `REALMGATE_SPAWN_POINT` | `x,y,z`, not the origin |
    /// | `REALMGATE_WORLD_HALF_EXTENT` | default ground half extent |
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = lookup("REALMGATE_BIND_ADDR") {
            if addr.trim().is_empty() {
                tracing::warn!("REALMGATE_BIND_ADDR is empty, using default");
            } else {
                config.bind_addr = addr.trim().to_string();
            }
        }

        if let Some(url) = lookup("REALMGATE_IDENTITY_URL") {
            if url.starts_with("http://") || url.starts_with("https://") {
                config.identity.base_url = url;
            } else {
                tracing::warn!("Invalid REALMGATE_IDENTITY_URL '{}', using default", url);
            }
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "REALMGATE_IDENTITY_TIMEOUT_MS", |v| *v > 0) {
            config.identity.request_timeout = Duration::from_millis(ms);
        }
        if let Some(policy) = parse_var::<OwnerCheck, _>(&lookup, "REALMGATE_OWNER_CHECK", |_| true) {
            config.identity.owner_check = policy;
        }

        if let Some(secs) =
            parse_var::<u64, _>(&lookup, "REALMGATE_ADMISSION_TIMEOUT_SECS", |v| *v > 0)
        {
            config.session.admission_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "REALMGATE_REJECTION_GRACE_MS", |_| true) {
            config.session.rejection_grace = Duration::from_millis(ms);
        }

        if let Some(hz) = parse_var::<u32, _>(&lookup, "REALMGATE_TICK_RATE", |v| {
            (TickConfig::MIN_TICK_RATE_HZ..=TickConfig::MAX_TICK_RATE_HZ).contains(v)
        }) {
            config.tick.tick_rate_hz = hz;
        }

        let positive = |v: &f32| v.is_finite() && *v > 0.0;
        let non_negative = |v: &f32| v.is_finite() && *v >= 0.0;
        if let Some(v) = parse_var(&lookup, "REALMGATE_MOVE_SPEED", positive) {
            config.movement.move_speed = v;
        }
        if let Some(v) = parse_var(&lookup, "REALMGATE_ROTATION_SPEED", positive) {
            config.movement.rotation_speed = v;
        }
        if let Some(v) = parse_var(&lookup, "REALMGATE_STOPPING_DISTANCE", non_negative) {
            config.movement.stopping_distance = v;
        }
        if let Some(v) = parse_var(&lookup, "REALMGATE_PATH_SEARCH_RADIUS", non_negative) {
            config.movement.path_search_radius = v;
        }
        if let Some(v) = parse_var(&lookup, "REALMGATE_TELEPORT_SEARCH_RADIUS", non_negative) {
            config.movement.teleport_search_radius = v;
        }

        if let Some(raw) = lookup("REALMGATE_SPAWN_POINT") {
            // The origin stands for "no saved position".
            match parse_vec3(&raw).filter(|p| *p != Vec3::ZERO) {
                Some(point) => config.default_spawn = point,
                None => tracing::warn!("Invalid REALMGATE_SPAWN_POINT '{}', using default", raw),
            }
        }
        if let Some(v) = parse_var(&lookup, "REALMGATE_WORLD_HALF_EXTENT", positive) {
            config.world_half_extent = v;
        }

        config
    }
}

/// Reads and parses `key`, returning `None` (after a warning) when the
/// value does not parse or fails `valid`.
fn parse_var<T, F>(lookup: &F, key: &str, valid: impl Fn(&T) -> bool) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) if valid(&value) => Some(value),
        Ok(_) => {
            tracing::warn!("{} '{}' is out of range, using default", key, raw);
            None
        }
        Err(_) => {
            tracing::warn!("Invalid {} '{}', using default", key, raw);
            None
        }
    }
}

/// Parses `"x,y,z"`.
fn parse_vec3(raw: &str) -> Option<Vec3> {
    let mut parts = raw.split(',').map(|p| p.trim().parse::<f32>());
    let (Some(Ok(x)), Some(Ok(y)), Some(Ok(z)), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return None;
    };
    let point = Vec3::new(x, y, z);
    [x, y, z].iter().all(|c| c.is_finite()).then_some(point)
}
