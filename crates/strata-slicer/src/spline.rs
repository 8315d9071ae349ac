//! Editable layer-height spline.
//!
//! Layer heights are stored as `(z, height)` control points of a natural
//! cubic spline over the object height. The planner stores the generated
//! layers here; interactive edits update the control points and the layer
//! vector is re-sampled from the interpolation.

use serde::{Deserialize, Serialize};

/// A cubic layer-height profile over the object height.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayerHeightSpline {
    object_height: f64,
    /// Ordered `(z, height)` control points; this is also the persisted
    /// representation.
    control_points: Vec<(f64, f64)>,
    /// Second derivatives of the natural cubic through the control points.
    #[serde(skip)]
    second_derivatives: Vec<f64>,
}

impl LayerHeightSpline {
    /// An empty spline for an object of the given height.
    pub fn new(object_height: f64) -> Self {
        Self {
            object_height,
            control_points: Vec::new(),
            second_derivatives: Vec::new(),
        }
    }

    /// Update the object height (top border for sampling).
    pub fn set_object_height(&mut self, object_height: f64) {
        self.object_height = object_height;
    }

    /// The object height the spline spans.
    pub fn object_height(&self) -> f64 {
        self.object_height
    }

    /// True when enough control points exist to interpolate.
    pub fn is_valid(&self) -> bool {
        self.control_points.len() >= 2
    }

    /// The control points, ordered by Z.
    pub fn control_points(&self) -> &[(f64, f64)] {
        &self.control_points
    }

    /// Rebuild the control points from a generated layer vector (print_z
    /// positions, ascending).
    pub fn set_layers(&mut self, print_zs: &[f64]) {
        self.control_points.clear();
        let mut last_z = 0.0;
        for &z in print_zs {
            self.control_points.push((z, z - last_z));
            last_z = z;
        }
        self.update_coefficients();
    }

    /// Replace the height at one control point; heights are clamped to the
    /// given limits and the interpolation is rebuilt.
    pub fn set_layer_height(&mut self, z: f64, height: f64, min: f64, max: f64) {
        let clamped = height.clamp(min, max);
        if let Some(cp) = self
            .control_points
            .iter_mut()
            .min_by(|a, b| {
                (a.0 - z)
                    .abs()
                    .partial_cmp(&(b.0 - z).abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
        {
            cp.1 = clamped;
        }
        self.update_coefficients();
    }

    /// Interpolated layer height at `z`.
    pub fn height_at(&self, z: f64) -> f64 {
        let n = self.control_points.len();
        if n == 0 {
            return 0.0;
        }
        if n == 1 || z <= self.control_points[0].0 {
            return self.control_points[0].1;
        }
        if z >= self.control_points[n - 1].0 {
            return self.control_points[n - 1].1;
        }
        // find the spanning segment
        let seg = self
            .control_points
            .partition_point(|cp| cp.0 < z)
            .saturating_sub(1);
        let (x0, y0) = self.control_points[seg];
        let (x1, y1) = self.control_points[seg + 1];
        let h = x1 - x0;
        if h <= 0.0 {
            return y0;
        }
        let a = (x1 - z) / h;
        let b = (z - x0) / h;
        let d0 = self.second_derivatives.get(seg).copied().unwrap_or(0.0);
        let d1 = self.second_derivatives.get(seg + 1).copied().unwrap_or(0.0);
        a * y0 + b * y1 + ((a * a * a - a) * d0 + (b * b * b - b) * d1) * h * h / 6.0
    }

    /// Re-sample the layer vector from the interpolated profile.
    pub fn interpolated_layers(&self) -> Vec<f64> {
        let mut layers = Vec::new();
        if !self.is_valid() {
            return layers;
        }
        let mut z = 0.0;
        while z < self.object_height {
            let height = self.height_at(z).max(1e-4);
            z += height;
            layers.push(z);
        }
        layers
    }

    /// Natural cubic second derivatives (tridiagonal solve).
    fn update_coefficients(&mut self) {
        let n = self.control_points.len();
        self.second_derivatives = vec![0.0; n];
        if n < 3 {
            return;
        }
        let mut u = vec![0.0; n];
        for i in 1..n - 1 {
            let (x_prev, y_prev) = self.control_points[i - 1];
            let (x_here, y_here) = self.control_points[i];
            let (x_next, y_next) = self.control_points[i + 1];
            let sig = (x_here - x_prev) / (x_next - x_prev);
            let p = sig * self.second_derivatives[i - 1] + 2.0;
            self.second_derivatives[i] = (sig - 1.0) / p;
            let slope_next = (y_next - y_here) / (x_next - x_here);
            let slope_prev = (y_here - y_prev) / (x_here - x_prev);
            u[i] = (6.0 * (slope_next - slope_prev) / (x_next - x_prev) - sig * u[i - 1]) / p;
        }
        for i in (1..n - 1).rev() {
            self.second_derivatives[i] =
                self.second_derivatives[i] * self.second_derivatives[i + 1] + u[i];
        }
        self.second_derivatives[0] = 0.0;
        self.second_derivatives[n - 1] = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_uniform_layers_round_trip() {
        let mut spline = LayerHeightSpline::new(10.0);
        let layers: Vec<f64> = (1..=50).map(|i| i as f64 * 0.2).collect();
        spline.set_layers(&layers);
        assert!(spline.is_valid());
        // a constant profile interpolates to the same constant
        assert_relative_eq!(spline.height_at(3.33), 0.2, epsilon = 1e-9);
        let resampled = spline.interpolated_layers();
        assert_eq!(resampled.len(), 50);
        assert_relative_eq!(*resampled.last().unwrap(), 10.0, epsilon = 1e-6);
    }

    #[test]
    fn test_edit_changes_profile() {
        let mut spline = LayerHeightSpline::new(10.0);
        let layers: Vec<f64> = (1..=50).map(|i| i as f64 * 0.2).collect();
        spline.set_layers(&layers);
        spline.set_layer_height(5.0, 0.3, 0.1, 0.4);
        assert!(spline.height_at(5.0) > 0.21);
        // far away the profile is unchanged
        assert_relative_eq!(spline.height_at(0.2), 0.2, epsilon = 0.02);
    }

    #[test]
    fn test_serialization_is_control_points() {
        let mut spline = LayerHeightSpline::new(1.0);
        spline.set_layers(&[0.3, 0.6, 0.9]);
        let json = serde_json::to_string(&spline).unwrap();
        let mut parsed: LayerHeightSpline = serde_json::from_str(&json).unwrap();
        // the persisted form is the ordered (z, height) control points; the
        // interpolation coefficients are rebuilt after loading
        let zs: Vec<f64> = parsed.control_points().iter().map(|cp| cp.0).collect();
        assert_eq!(zs, vec![0.3, 0.6, 0.9]);
        parsed.set_layers(&zs);
        assert!(parsed.is_valid());
        assert_relative_eq!(parsed.height_at(0.45), 0.3, epsilon = 1e-9);
    }
}
