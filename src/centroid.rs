//! Define a centroid (center of mass) representing
//! a star detection in an unresolved image.
//! Centroids come from an external star extraction step and are the input to star identification.
//!

#[derive(Debug, Clone, PartialEq)]
pub struct Centroid {
    /// Centroid position in pixels along columns (image x-axis).
    /// Origin is the top-left pixel corner; +X points right in the image.
    pub x: f64,
    /// Centroid position in pixels along rows (image y-axis).
    /// +Y points down in the image.
    pub y: f64,
    /// Approximate spot radius along x, in pixels.
    pub radius_x: f64,
    /// Approximate spot radius along y, in pixels.
    pub radius_y: f64,
    /// Optional "brightness" value used for sorting (brighter = higher).
    /// The exact meaning is image-dependent.
    pub mass: Option<f64>,
}

impl Centroid {
    /// Point-like centroid with no size or brightness estimate.
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            radius_x: 0.0,
            radius_y: 0.0,
            mass: None,
        }
    }

    pub fn with_mass(x: f64, y: f64, mass: f64) -> Self {
        Self {
            mass: Some(mass),
            ..Self::new(x, y)
        }
    }

    /// Brightness used for ordering; centroids without one sort last.
    pub fn brightness(&self) -> f64 {
        self.mass.unwrap_or(f64::NEG_INFINITY)
    }
}

/// Indices of `centroids` sorted brightest first (stable for equal brightness).
pub fn brightness_order(centroids: &[Centroid]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..centroids.len()).collect();
    order.sort_by(|&a, &b| {
        centroids[b]
            .brightness()
            .partial_cmp(&centroids[a].brightness())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn brightness_order_is_descending_and_stable() {
        let centroids = vec![
            Centroid::with_mass(0.0, 0.0, 1.0),
            Centroid::new(1.0, 1.0),
            Centroid::with_mass(2.0, 2.0, 5.0),
            Centroid::with_mass(3.0, 3.0, 1.0),
        ];
        assert_eq!(brightness_order(&centroids), vec![2, 0, 3, 1]);
    }
}
