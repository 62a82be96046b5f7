use glam::{Mat4, Vec3};
use crate::error::{Error, Result};

/// Largest dimension of a model after normalization, in scene units.
pub const TARGET_SIZE: f32 = 2.0;

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn from_points<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = Vec3>,
    {
        points.into_iter().fold(None, |acc, p| match acc {
            None => Some(Self { min: p, max: p }),
            Some(b) => Some(Self { min: b.min.min(p), max: b.max.max(p) }),
        })
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn max_dimension(&self) -> f32 {
        self.size().max_element()
    }
}

/// Uniform scale about the box center that moves the center to the origin
/// and maps the largest dimension to a fixed size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalization {
    pub center: Vec3,
    pub scale: f32,
}

impl Normalization {
    pub fn fit(bounds: &Aabb, target_size: f32) -> Result<Self> {
        let max_dim = bounds.max_dimension();
        if !max_dim.is_finite() || max_dim <= f32::EPSILON {
            return Err(Error::DegenerateBounds(max_dim));
        }

        Ok(Self {
            center: bounds.center(),
            scale: target_size / max_dim,
        })
    }

    pub fn apply(&self, p: Vec3) -> Vec3 {
        (p - self.center) * self.scale
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale(Vec3::splat(self.scale)) * Mat4::from_translation(-self.center)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-4;

    fn sample_points() -> Vec<Vec3> {
        vec![
            Vec3::new(1.0, 2.0, 3.0),
            Vec3::new(4.0, -1.0, 3.5),
            Vec3::new(2.5, 0.0, 7.0),
        ]
    }

    fn normalized_bounds(points: &[Vec3]) -> Aabb {
        let bounds = Aabb::from_points(points.iter().copied()).unwrap();
        let n = Normalization::fit(&bounds, TARGET_SIZE).unwrap();
        Aabb::from_points(points.iter().map(|p| n.apply(*p))).unwrap()
    }

    #[test]
    fn test_bounds_of_points() {
        let b = Aabb::from_points(sample_points()).unwrap();
        assert_eq!(b.min, Vec3::new(1.0, -1.0, 3.0));
        assert_eq!(b.max, Vec3::new(4.0, 2.0, 7.0));
        assert_eq!(b.max_dimension(), 4.0);
        assert!(Aabb::from_points(std::iter::empty()).is_none());
    }

    #[test]
    fn test_normalized_model_is_centered_with_target_size() {
        let b = normalized_bounds(&sample_points());
        assert!(b.center().length() < EPS);
        assert!((b.max_dimension() - TARGET_SIZE).abs() < EPS);
        // aspect preserved: 3:3:4 before, 1.5:1.5:2 after
        assert!((b.size().x - 1.5).abs() < EPS);
    }

    #[test]
    fn test_normalization_is_scale_invariant() {
        let base = normalized_bounds(&sample_points());
        for k in [0.001_f32, 0.5, 3.0, 250.0] {
            let scaled: Vec<Vec3> = sample_points().into_iter().map(|p| p * k).collect();
            let b = normalized_bounds(&scaled);
            assert!((b.min - base.min).length() < EPS, "k = {k}");
            assert!((b.max - base.max).length() < EPS, "k = {k}");
        }
    }

    #[test]
    fn test_matrix_matches_apply() {
        let b = Aabb::from_points(sample_points()).unwrap();
        let n = Normalization::fit(&b, TARGET_SIZE).unwrap();
        for p in sample_points() {
            assert!((n.matrix().transform_point3(p) - n.apply(p)).length() < EPS);
        }
    }

    #[test]
    fn test_degenerate_bounds_rejected() {
        let b = Aabb::from_points([Vec3::ONE]).unwrap();
        assert!(matches!(Normalization::fit(&b, TARGET_SIZE), Err(Error::DegenerateBounds(_))));
    }
}
