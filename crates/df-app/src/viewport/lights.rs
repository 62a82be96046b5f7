use glam::Vec3;

#[derive(Debug, Clone, PartialEq)]
pub enum Light {
    Ambient {
        color: Vec3,
        intensity: f32,
    },
    Directional {
        color: Vec3,
        intensity: f32,
        position: Vec3,
        cast_shadow: bool,
    },
}

impl Light {
    pub fn intensity(&self) -> f32 {
        match self {
            Self::Ambient { intensity, .. } | Self::Directional { intensity, .. } => *intensity,
        }
    }

    pub fn casts_shadow(&self) -> bool {
        matches!(self, Self::Directional { cast_shadow: true, .. })
    }
}

/// Ambient fill, a shadow-casting key light and a softer fill light.
pub fn studio_rig() -> [(&'static str, Light); 3] {
    [
        ("ambient", Light::Ambient {
            color: Vec3::ONE,
            intensity: 0.6,
        }),
        ("key", Light::Directional {
            color: Vec3::ONE,
            intensity: 1.0,
            position: Vec3::new(5.0, 10.0, 7.5),
            cast_shadow: true,
        }),
        ("fill", Light::Directional {
            color: Vec3::ONE,
            intensity: 0.4,
            position: Vec3::new(-5.0, 5.0, -5.0),
            cast_shadow: false,
        }),
    ]
}

/// Ground reference grid on the XZ plane, centered at the origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Grid {
    pub size: f32,
    pub divisions: u32,
}

impl Default for Grid {
    fn default() -> Self {
        Self { size: 10.0, divisions: 10 }
    }
}

impl Grid {
    /// Line segments making up the grid, both directions.
    pub fn lines(&self) -> Vec<(Vec3, Vec3)> {
        let half = self.size / 2.0;
        let step = self.size / self.divisions.max(1) as f32;

        (0..=self.divisions)
            .flat_map(|i| {
                let k = -half + i as f32 * step;
                [
                    (Vec3::new(-half, 0.0, k), Vec3::new(half, 0.0, k)),
                    (Vec3::new(k, 0.0, -half), Vec3::new(k, 0.0, half)),
                ]
            })
            .collect()
    }
}
