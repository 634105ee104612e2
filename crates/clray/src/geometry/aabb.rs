use super::vec3::Vec3;

/// Axis-aligned bounding box
/// Defined by 2 points
#[derive(Clone, Copy, Default, Debug, PartialEq)]
pub struct AABB {
    pub minimum: Vec3,
    pub maximum: Vec3
}

impl AABB {
    pub fn new(minimum: Vec3, maximum: Vec3) -> AABB {
        AABB { minimum, maximum }
    }

    /// Axis-aligned cube from its minimum corner and edge length
    pub fn cube(origin: Vec3, size: f32) -> AABB {
        AABB { minimum: origin, maximum: origin + Vec3::splat(size) }
    }

    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Option<AABB> {
        let mut points = points.into_iter();
        let first = points.next()?;
        Some(points.fold(AABB::new(first, first), |b, p| AABB {
            minimum: Vec3::elementwise_min(b.minimum, p),
            maximum: Vec3::elementwise_max(b.maximum, p),
        }))
    }

    /// Returns a box which surrounds both a and b
    pub fn surrounding_box(a: AABB, b: AABB) -> AABB {
        AABB {
            minimum: Vec3::elementwise_min(a.minimum, b.minimum),
            maximum: Vec3::elementwise_max(a.maximum, b.maximum),
        }
    }

    pub fn extent(&self) -> Vec3 {
        self.maximum - self.minimum
    }

    pub fn center(&self) -> Vec3 {
        (self.minimum + self.maximum) * 0.5
    }

    pub fn contains(&self, other: &AABB) -> bool {
        self.minimum.0 <= other.minimum.0 && self.minimum.1 <= other.minimum.1 && self.minimum.2 <= other.minimum.2
            && self.maximum.0 >= other.maximum.0 && self.maximum.1 >= other.maximum.1 && self.maximum.2 >= other.maximum.2
    }

    /// Slab test. Returns the parametric `[t_enter, t_exit]` overlap of the
    /// ray with the box, clipped to `[t_min, t_max]`.
    pub fn ray_interval(&self, origin: Vec3, direction: Vec3, t_min: f32, t_max: f32) -> Option<(f32, f32)> {
        let mut t0 = t_min;
        let mut t1 = t_max;
        for axis in 0..3 {
            let inv_d = 1.0 / direction[axis];
            let mut near = (self.minimum[axis] - origin[axis]) * inv_d;
            let mut far = (self.maximum[axis] - origin[axis]) * inv_d;
            if inv_d < 0.0 {
                std::mem::swap(&mut near, &mut far);
            }
            // NaN from 0 * inf (origin on a slab plane, parallel ray) must not shrink the interval
            if !near.is_nan() {
                t0 = f32::max(t0, near);
            }
            if !far.is_nan() {
                t1 = f32::min(t1, far);
            }
            if t0 > t1 {
                return None;
            }
        }
        Some((t0, t1))
    }
}
