//! Navigable surface queries.
//!
//! The movement authority never moves an entity to a raw client-supplied
//! point. Every destination is first snapped to the nearest navigable
//! point within a search radius, and a destination with no such point is
//! refused.

use realmgate_protocol::Vec3;

/// Tolerance used when asking whether a point is itself navigable.
pub const NAV_EPSILON: f32 = 1e-3;

/// A walkable region of the world.
pub trait NavigableSurface: Send + Sync + 'static {
    /// Nearest navigable point within `radius` of `point`, or `None`.
    fn sample(&self, point: Vec3, radius: f32) -> Option<Vec3>;

    /// Whether `point` lies on the surface.
    fn is_navigable(&self, point: Vec3) -> bool {
        self.sample(point, NAV_EPSILON).is_some()
    }
}

impl<S: NavigableSurface + ?Sized> NavigableSurface for Box<S> {
    fn sample(&self, point: Vec3, radius: f32) -> Option<Vec3> {
        (**self).sample(point, radius)
    }

    fn is_navigable(&self, point: Vec3) -> bool {
        (**self).is_navigable(point)
    }
}

// ---------------------------------------------------------------------------
// FlatGround
// ---------------------------------------------------------------------------

/// An axis-aligned rectangle of ground at a fixed height.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatGround {
    pub min_x: f32,
    pub max_x: f32,
    pub min_z: f32,
    pub max_z: f32,
    pub height: f32,
}

impl FlatGround {
    /// A square of side `2 * half_extent` centred on the origin.
    pub fn centered(half_extent: f32, height: f32) -> Self {
        let h = half_extent.abs();
        Self {
            min_x: -h,
            max_x: h,
            min_z: -h,
            max_z: h,
            height,
        }
    }

    fn nearest(&self, point: Vec3) -> Vec3 {
        Vec3::new(
            point.x.clamp(self.min_x, self.max_x),
            self.height,
            point.z.clamp(self.min_z, self.max_z),
        )
    }
}

impl NavigableSurface for FlatGround {
    fn sample(&self, point: Vec3, radius: f32) -> Option<Vec3> {
        let nearest = self.nearest(point);
        (nearest.distance(point) <= radius).then_some(nearest)
    }
}

// ---------------------------------------------------------------------------
// NavAreas
// ---------------------------------------------------------------------------

/// One walkable box. `min` and `max` are opposite corners.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NavArea {
    pub min: Vec3,
    pub max: Vec3,
}

impl NavArea {
    pub fn new(a: Vec3, b: Vec3) -> Self {
        Self {
            min: Vec3::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z)),
            max: Vec3::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z)),
        }
    }

    fn nearest(&self, point: Vec3) -> Vec3 {
        Vec3::new(
            point.x.clamp(self.min.x, self.max.x),
            point.y.clamp(self.min.y, self.max.y),
            point.z.clamp(self.min.z, self.max.z),
        )
    }
}

/// A union of walkable boxes: platforms, bridges, rooms.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NavAreas {
    areas: Vec<NavArea>,
}

impl NavAreas {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_area(mut self, area: NavArea) -> Self {
        self.areas.push(area);
        self
    }

    pub fn push(&mut self, area: NavArea) {
        self.areas.push(area);
    }

    pub fn areas(&self) -> &[NavArea] {
        &self.areas
    }
}

impl NavigableSurface for NavAreas {
    fn sample(&self, point: Vec3, radius: f32) -> Option<Vec3> {
        self.areas
            .iter()
            .map(|area| area.nearest(point))
            .map(|p| (p.distance(point), p))
            .filter(|(d, _)| *d <= radius)
            .min_by(|(a, _), (b, _)| a.total_cmp(b))
            .map(|(_, p)| p)
    }
}
