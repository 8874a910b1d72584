//! Pinhole camera intrinsics: focal length, principal point, and sensor resolution.
//!
//! `Camera` maps between pixel coordinates of a detected star and the unit
//! direction vector of that star in the camera frame.
//!
//! # Coordinate conventions
//!
//! - **Pixel coordinates**: origin at the top-left corner, +X right, +Y down.
//! - **Camera frame**: +Z along the boresight, +X right, +Y down in the image.
//!
//! # Pipeline
//!
//! ```text
//! pixel → subtract principal point → divide by f → (x, y, 1) → normalize
//! vector → divide by z → multiply by f → add principal point → pixel
//! ```

use crate::{Centroid, Vector3};

#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    /// Focal length in pixels: `f = (width/2) / tan(fov/2)`.
    pub focal_length_px: f64,
    /// Pixel position of the optical axis `[x, y]`.
    pub principal_point: [f64; 2],
    /// Sensor size in pixels `[width, height]`.
    pub resolution: [u32; 2],
}

impl Camera {
    /// Create a camera from a horizontal field of view and sensor size.
    ///
    /// The principal point is placed at the geometric image center.
    pub fn from_fov(fov_rad: f64, width: u32, height: u32) -> Self {
        let f = (width as f64 / 2.0) / (fov_rad / 2.0).tan();
        Self {
            focal_length_px: f,
            principal_point: [width as f64 / 2.0, height as f64 / 2.0],
            resolution: [width, height],
        }
    }

    pub fn width(&self) -> u32 {
        self.resolution[0]
    }

    pub fn height(&self) -> u32 {
        self.resolution[1]
    }

    /// Pixel scale in radians per pixel (approximate, at image center).
    pub fn pixel_scale(&self) -> f64 {
        1.0 / self.focal_length_px
    }

    /// Horizontal field of view in radians.
    pub fn fov_rad(&self) -> f64 {
        2.0 * ((self.width() as f64 / 2.0) / self.focal_length_px).atan()
    }

    /// Unit vector in the camera frame for a pixel position.
    pub fn camera_to_spatial(&self, px: f64, py: f64) -> Vector3 {
        let x = (px - self.principal_point[0]) / self.focal_length_px;
        let y = (py - self.principal_point[1]) / self.focal_length_px;
        Vector3::new(x, y, 1.0).normalize()
    }

    /// Pixel position of a camera-frame direction.
    ///
    /// Returns `None` for directions on or behind the focal plane (`z <= 0`).
    pub fn spatial_to_camera(&self, v: &Vector3) -> Option<(f64, f64)> {
        if v.z <= 0.0 {
            return None;
        }
        let px = self.focal_length_px * v.x / v.z + self.principal_point[0];
        let py = self.focal_length_px * v.y / v.z + self.principal_point[1];
        Some((px, py))
    }

    /// Whether a pixel position falls on the sensor.
    pub fn in_sensor(&self, px: f64, py: f64) -> bool {
        px >= 0.0 && py >= 0.0 && px < self.width() as f64 && py < self.height() as f64
    }

    pub fn centroid_uvec(&self, centroid: &Centroid) -> Vector3 {
        self.camera_to_spatial(centroid.x, centroid.y)
    }
}
