use nalgebra::{Point2, Point3, RealField};
use serde::{Deserialize, Serialize};

/// Intrinsics that map sensor-plane coordinates to pixel coordinates.
pub trait IntrinsicsModel<S: RealField + Copy> {
    /// Convert sensor-plane coordinates into pixel coordinates.
    fn sensor_to_pixel(&self, sensor: &Point2<S>) -> Point2<S>;
    /// Convert pixel coordinates into sensor-plane coordinates.
    fn pixel_to_sensor(&self, pixel: &Point2<S>) -> Point2<S>;
}

/// Standard pinhole intrinsics with optional skew.
///
/// Both the color and the depth sensor of an RGB-D camera are described by
/// one of these; depth maps store the metric `z` coordinate in the sensor's
/// own camera frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FxFyCxCySkew<S: RealField + Copy> {
    /// Focal length in pixels along X.
    pub fx: S,
    /// Focal length in pixels along Y.
    pub fy: S,
    /// Principal point X coordinate in pixels.
    pub cx: S,
    /// Principal point Y coordinate in pixels.
    pub cy: S,
    /// Skew term (typically 0).
    pub skew: S,
}

impl<S: RealField + Copy> FxFyCxCySkew<S> {
    /// Zero-skew intrinsics.
    pub fn new(fx: S, fy: S, cx: S, cy: S) -> Self {
        Self {
            fx,
            fy,
            cx,
            cy,
            skew: S::zero(),
        }
    }

    /// Project a camera-frame point to pixels. `None` behind the camera.
    pub fn project(&self, p_c: &Point3<S>) -> Option<Point2<S>> {
        if p_c.z <= S::zero() {
            return None;
        }
        let sensor = Point2::new(p_c.x / p_c.z, p_c.y / p_c.z);
        Some(self.sensor_to_pixel(&sensor))
    }

    /// Back-project a pixel with metric depth `z` into the camera frame.
    pub fn backproject(&self, pixel: &Point2<S>, depth: S) -> Point3<S> {
        let s = self.pixel_to_sensor(pixel);
        Point3::new(s.x * depth, s.y * depth, depth)
    }
}

impl<S: RealField + Copy> IntrinsicsModel<S> for FxFyCxCySkew<S> {
    fn sensor_to_pixel(&self, sensor: &Point2<S>) -> Point2<S> {
        let u = self.fx * sensor.x + self.skew * sensor.y + self.cx;
        let v = self.fy * sensor.y + self.cy;
        Point2::new(u, v)
    }

    fn pixel_to_sensor(&self, pixel: &Point2<S>) -> Point2<S> {
        let sy = (pixel.y - self.cy) / self.fy;
        let sx = (pixel.x - self.cx - self.skew * sy) / self.fx;
        Point2::new(sx, sy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backproject_inverts_project() {
        let k = FxFyCxCySkew {
            fx: 525.0,
            fy: 520.0,
            cx: 319.5,
            cy: 239.5,
            skew: 0.3,
        };
        let p = Point3::new(0.2, -0.1, 1.7);
        let px = k.project(&p).unwrap();
        let back = k.backproject(&px, p.z);
        assert!((back - p).norm() < 1e-12);
    }

    #[test]
    fn project_rejects_points_behind_camera() {
        let k = FxFyCxCySkew::new(500.0, 500.0, 320.0, 240.0);
        assert!(k.project(&Point3::new(0.0, 0.0, -1.0)).is_none());
    }
}
