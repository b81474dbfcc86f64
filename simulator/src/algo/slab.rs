//! Ray / box intersection by the slab method
//!
//! The box is centered on the origin with half-extents `h`. A ray
//! `p + t·v` crosses each pair of parallel faces between
//!
//! ```text
//! t = (-h - p) / v   and   t = (h - p) / v
//! ```
//!
//! and lies inside the box on the intersection of the three per-axis
//! intervals. With `v` a velocity the ray parameter is a time.

use nalgebra::Vector3;

/// Parameter interval during which a ray lies inside a box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlabInterval {
    pub entry: f64,
    pub exit: f64,
}

impl SlabInterval {
    /// Time left inside the box from `t = 0`, never negative.
    pub fn remaining(&self) -> f64 {
        self.exit.max(0.0)
    }
}

/// Intersect the ray `origin + t·direction` with the origin-centered box.
///
/// Axes whose direction component is below `tol` in magnitude constrain
/// nothing when the origin lies within that slab, and make the intersection
/// empty otherwise. An unconstrained ray yields an infinite exit.
///
/// # Returns
/// * `Some(interval)` - Entry and exit parameters, `entry <= exit`
/// * `None` - The ray misses the box
pub fn intersect(
    origin: &Vector3<f64>,
    direction: &Vector3<f64>,
    half_extents: &Vector3<f64>,
    tol: f64,
) -> Option<SlabInterval> {
    let mut entry = f64::NEG_INFINITY;
    let mut exit = f64::INFINITY;

    for axis in 0..3 {
        let p = origin[axis];
        let v = direction[axis];
        let h = half_extents[axis];

        if v.abs() < tol {
            if p < -h || p > h {
                return None;
            }
            continue;
        }

        let t1 = (-h - p) / v;
        let t2 = (h - p) / v;
        entry = entry.max(t1.min(t2));
        exit = exit.min(t1.max(t2));
    }

    if exit < entry {
        None
    } else {
        Some(SlabInterval { entry, exit })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const TOL: f64 = 1e-8;

    fn unit_box() -> Vector3<f64> {
        Vector3::new(1.0, 1.0, 1.0)
    }

    #[test]
    fn test_from_center_along_x() {
        let hit = intersect(
            &Vector3::zeros(),
            &Vector3::new(1.0, 0.0, 0.0),
            &unit_box(),
            TOL,
        )
        .unwrap();
        assert_relative_eq!(hit.entry, -1.0);
        assert_relative_eq!(hit.exit, 1.0);
        assert_relative_eq!(hit.remaining(), 1.0);
    }

    #[test]
    fn test_diagonal_exits_on_nearest_face() {
        let hit = intersect(
            &Vector3::new(0.5, 0.0, 0.0),
            &Vector3::new(1.0, 2.0, 0.0),
            &unit_box(),
            TOL,
        )
        .unwrap();
        // corner: x and y faces both reached at t = 0.5
        assert_relative_eq!(hit.exit, 0.5);
    }

    #[test]
    fn test_negative_velocity() {
        let hit = intersect(
            &Vector3::new(0.5, 0.0, 0.0),
            &Vector3::new(-0.5, 0.0, 0.0),
            &unit_box(),
            TOL,
        )
        .unwrap();
        assert_relative_eq!(hit.exit, 3.0);
        assert_relative_eq!(hit.entry, -1.0);
    }

    #[test]
    fn test_parallel_outside_slab_misses() {
        let miss = intersect(
            &Vector3::new(0.0, 2.0, 0.0),
            &Vector3::new(1.0, 0.0, 0.0),
            &unit_box(),
            TOL,
        );
        assert!(miss.is_none());
    }

    #[test]
    fn test_ray_missing_box() {
        let miss = intersect(
            &Vector3::new(-5.0, 3.0, 0.0),
            &Vector3::new(1.0, 0.1, 0.0),
            &unit_box(),
            TOL,
        );
        assert!(miss.is_none());
    }

    #[test]
    fn test_stationary_inside_never_exits() {
        let hit = intersect(&Vector3::zeros(), &Vector3::zeros(), &unit_box(), TOL).unwrap();
        assert!(hit.exit.is_infinite());
    }

    #[test]
    fn test_already_left_has_no_remaining_time() {
        let hit = intersect(
            &Vector3::new(3.0, 0.0, 0.0),
            &Vector3::new(1.0, 0.0, 0.0),
            &unit_box(),
            TOL,
        )
        .unwrap();
        assert!(hit.exit < 0.0);
        assert_eq!(hit.remaining(), 0.0);
    }
}
