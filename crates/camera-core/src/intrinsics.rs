//! Pinhole camera intrinsics and projection

use crate::error::{CameraError, Result};
use serde::{Deserialize, Serialize};

/// Maps between image pixels and 3D points in the camera frame
pub trait Projector: Send + Sync {
    /// Back-project a pixel with a known depth into a camera-frame point
    fn pixel_to_point(&self, x: f64, y: f64, z: f64) -> (f64, f64, f64);

    /// Project a camera-frame point onto the image plane
    fn point_to_pixel(&self, x: f64, y: f64, z: f64) -> (f64, f64);
}

/// Intrinsic parameters of a pinhole camera
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PinholeCameraIntrinsics {
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
    /// Focal length along x, in pixels
    pub fx: f64,
    /// Focal length along y, in pixels
    pub fy: f64,
    /// Principal point x
    pub ppx: f64,
    /// Principal point y
    pub ppy: f64,
}

impl PinholeCameraIntrinsics {
    /// Check that the parameters describe a usable camera
    pub fn check_valid(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(CameraError::InvalidIntrinsics(format!(
                "invalid size ({}, {})",
                self.width, self.height
            )));
        }
        // negated comparisons so NaN is rejected too
        if !(self.fx > 0.0) || !(self.fy > 0.0) {
            return Err(CameraError::InvalidIntrinsics(format!(
                "invalid focal length ({}, {})",
                self.fx, self.fy
            )));
        }
        if !(self.ppx >= 0.0) || !(self.ppy >= 0.0) {
            return Err(CameraError::InvalidIntrinsics(format!(
                "invalid principal point ({}, {})",
                self.ppx, self.ppy
            )));
        }
        Ok(())
    }
}

impl Projector for PinholeCameraIntrinsics {
    fn pixel_to_point(&self, x: f64, y: f64, z: f64) -> (f64, f64, f64) {
        let px = (x - self.ppx) * z / self.fx;
        let py = (y - self.ppy) * z / self.fy;
        (px, py, z)
    }

    fn point_to_pixel(&self, x: f64, y: f64, z: f64) -> (f64, f64) {
        if z == 0.0 {
            return (0.0, 0.0);
        }
        let px = (x / z) * self.fx + self.ppx;
        let py = (y / z) * self.fy + self.ppy;
        (px, py)
    }
}
