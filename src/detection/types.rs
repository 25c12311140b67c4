// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// Normalized 2-D landmark.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point2 {
    pub x: f32,
    pub y: f32,
}

impl Point2 {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point2) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Six points around one eye:
/// p0 outer corner, p1/p2 upper lid, p3 inner corner, p4/p5 lower lid.
#[derive(Debug, Clone, PartialEq)]
pub struct EyeLandmarks {
    pub points: [Point2; 6],
}

impl EyeLandmarks {
    pub fn new(points: [Point2; 6]) -> Self {
        Self { points }
    }

    /// Eye-aspect ratio: lid opening `|p1 - p5|` over eye width `|p0 - p3|`.
    /// A collapsed eye width yields 0.
    pub fn aspect_ratio(&self) -> f32 {
        let p = &self.points;
        let vertical = p[1].distance(&p[5]);
        let horizontal = p[0].distance(&p[3]);
        if horizontal > 0.0 {
            vertical / horizontal
        } else {
            0.0
        }
    }

    /// A unit-width eye whose aspect ratio is exactly `ear`.
    pub fn from_aspect_ratio(ear: f32) -> Self {
        let half = ear / 2.0;
        Self::new([
            Point2::new(0.0, 0.0),
            Point2::new(0.35, -half),
            Point2::new(0.65, -half),
            Point2::new(1.0, 0.0),
            Point2::new(0.65, half),
            Point2::new(0.35, half),
        ])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FaceLandmarks {
    pub left_eye: EyeLandmarks,
    pub right_eye: EyeLandmarks,
}

impl FaceLandmarks {
    /// Mean aspect ratio over both eyes.
    pub fn eye_aspect_ratio(&self) -> f32 {
        (self.left_eye.aspect_ratio() + self.right_eye.aspect_ratio()) / 2.0
    }

    /// Both eyes opened to `ear`.
    pub fn with_eye_aspect_ratio(ear: f32) -> Self {
        Self {
            left_eye: EyeLandmarks::from_aspect_ratio(ear),
            right_eye: EyeLandmarks::from_aspect_ratio(ear),
        }
    }
}

/// One detected hand. Only presence matters downstream.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HandLandmarks {
    pub points: Vec<Point2>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eye_aspect_ratio() {
        let eye = EyeLandmarks::from_aspect_ratio(0.3);
        assert!((eye.aspect_ratio() - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_collapsed_eye_is_zero() {
        let eye = EyeLandmarks::new([Point2::new(0.5, 0.5); 6]);
        assert_eq!(eye.aspect_ratio(), 0.0);
    }

    #[test]
    fn test_face_averages_both_eyes() {
        let face = FaceLandmarks {
            left_eye: EyeLandmarks::from_aspect_ratio(0.1),
            right_eye: EyeLandmarks::from_aspect_ratio(0.3),
        };
        assert!((face.eye_aspect_ratio() - 0.2).abs() < 1e-6);
    }
}
