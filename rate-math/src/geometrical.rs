//! Geometrical rate estimator
//!
//! Assumes launch positions and directions are uniform within the emission
//! cone. The particles crossing the sensor are then a fixed fraction of all
//! emitted particles, equal to the ratio between the sensor volume and the
//! slice of the emission cone spanned by the sensor along the launch axis.
//! The observed detection rate is scaled back up by that ratio.

use std::f64::consts::PI;

use crate::error::EstimatorError;

/// Estimator inverting the cone-slice / sensor-volume geometry.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeometricalEstimator;

impl GeometricalEstimator {
    /// Volume of a cone with half-angle `alpha_deg` (degrees) and height `v`.
    ///
    /// `(1/3) · π · (v · tan α)² · v`
    pub fn cone_volume(alpha_deg: f64, v: f64) -> f64 {
        let base_radius = v * alpha_deg.to_radians().tan();
        PI * base_radius * base_radius * v / 3.0
    }

    /// Scale an observed detection rate to the emission rate.
    ///
    /// # Arguments
    /// * `observed_rate` - Detections per second at the sensor
    /// * `alpha_deg` - Emission cone half-angle in degrees, in `(0, 90)`
    /// * `emission_radius` - Radius of the emission disk
    /// * `sensor_dimensions` - Sensor extent (along the launch axis first)
    /// * `sensor_x` - Sensor center position along the launch axis
    ///
    /// The sensor is taken as axis-aligned: its faces sit at
    /// `sensor_x ± sensor_dimensions[0] / 2`.
    pub fn estimate(
        observed_rate: f64,
        alpha_deg: f64,
        emission_radius: f64,
        sensor_dimensions: [f64; 3],
        sensor_x: f64,
    ) -> Result<f64, EstimatorError> {
        if sensor_dimensions.iter().any(|&d| !(d > 0.0)) {
            return Err(EstimatorError::InvalidArgument(format!(
                "sensor dimensions must be positive, got {sensor_dimensions:?}"
            )));
        }
        let half_length = sensor_dimensions[0] / 2.0;
        Self::estimate_between_faces(
            observed_rate,
            alpha_deg,
            emission_radius,
            sensor_x - half_length,
            sensor_x + half_length,
            sensor_dimensions.iter().product(),
        )
    }

    /// Scale an observed detection rate given the sensor's face positions.
    ///
    /// # Arguments
    /// * `observed_rate` - Detections per second at the sensor
    /// * `alpha_deg` - Emission cone half-angle in degrees, in `(0, 90)`
    /// * `emission_radius` - Radius of the emission disk
    /// * `near_face` - Launch-axis position of the sensor face closest to the source
    /// * `far_face` - Launch-axis position of the farthest sensor face
    /// * `sensor_volume` - Volume of the sensor
    ///
    /// The cone apex sits `emission_radius / tan α` behind the emission disk,
    /// so both face distances are shifted by that amount before the two cone
    /// volumes are differenced.
    pub fn estimate_between_faces(
        observed_rate: f64,
        alpha_deg: f64,
        emission_radius: f64,
        near_face: f64,
        far_face: f64,
        sensor_volume: f64,
    ) -> Result<f64, EstimatorError> {
        if !(alpha_deg > 0.0 && alpha_deg < 90.0) {
            return Err(EstimatorError::InvalidArgument(format!(
                "cone half-angle must lie in (0, 90) degrees, got {alpha_deg}"
            )));
        }
        if !observed_rate.is_finite() || observed_rate < 0.0 {
            return Err(EstimatorError::InvalidArgument(format!(
                "observed rate must be finite and non-negative, got {observed_rate}"
            )));
        }
        if !(sensor_volume > 0.0) || !(far_face >= near_face) {
            return Err(EstimatorError::InvalidArgument(format!(
                "sensor must have positive volume and ordered faces, got volume \
                 {sensor_volume} between {near_face} and {far_face}"
            )));
        }

        let apex_offset = emission_radius / alpha_deg.to_radians().tan();
        let slice_volume = Self::cone_volume(alpha_deg, far_face + apex_offset)
            - Self::cone_volume(alpha_deg, near_face + apex_offset);

        Ok(observed_rate * (slice_volume / sensor_volume))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_degenerate_cone_has_no_volume() {
        for v in [0.0, 0.5, 3.0, 100.0] {
            assert_eq!(GeometricalEstimator::cone_volume(0.0, v), 0.0);
        }
    }

    #[test]
    fn test_cone_volume_known_value() {
        // tan(45°) = 1 -> (1/3)·π·9·3 = 9π
        assert_relative_eq!(
            GeometricalEstimator::cone_volume(45.0, 3.0),
            9.0 * PI,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_cone_volume_monotonic_in_height() {
        for alpha in [5.0, 20.0, 60.0] {
            let mut previous = GeometricalEstimator::cone_volume(alpha, 0.0);
            for step in 1..50 {
                let current = GeometricalEstimator::cone_volume(alpha, step as f64 * 0.25);
                assert!(current > previous);
                previous = current;
            }
        }
    }

    #[test]
    fn test_estimate_scales_by_volume_ratio() {
        let alpha = 45.0;
        let rate = GeometricalEstimator::estimate(2.0, alpha, 1.0, [1.0, 2.0, 2.0], 3.0).unwrap();

        // apex offset = 1, faces at 2.5 + 1 and 3.5 + 1
        let slice = GeometricalEstimator::cone_volume(alpha, 4.5)
            - GeometricalEstimator::cone_volume(alpha, 3.5);
        assert_relative_eq!(rate, 2.0 * slice / 4.0, epsilon = 1e-9);
        assert!(rate > 2.0);
    }

    #[test]
    fn test_zero_observed_rate_gives_zero() {
        let rate = GeometricalEstimator::estimate(0.0, 20.0, 0.5, [1.0, 3.0, 0.5], 3.0).unwrap();
        assert_eq!(rate, 0.0);
    }

    #[test]
    fn test_invalid_angle_rejected() {
        assert!(GeometricalEstimator::estimate(1.0, 0.0, 0.5, [1.0, 1.0, 1.0], 3.0).is_err());
        assert!(GeometricalEstimator::estimate(1.0, 90.0, 0.5, [1.0, 1.0, 1.0], 3.0).is_err());
    }

    #[test]
    fn test_face_form_matches_axis_aligned_form() {
        let from_dims = GeometricalEstimator::estimate(3.0, 20.0, 0.5, [1.0, 3.0, 0.5], 3.0).unwrap();
        let from_faces =
            GeometricalEstimator::estimate_between_faces(3.0, 20.0, 0.5, 2.5, 3.5, 1.5).unwrap();
        assert_relative_eq!(from_dims, from_faces, epsilon = 1e-12);
    }

    #[test]
    fn test_reversed_faces_rejected() {
        let result = GeometricalEstimator::estimate_between_faces(1.0, 20.0, 0.5, 3.5, 2.5, 1.0);
        assert!(matches!(result, Err(EstimatorError::InvalidArgument(_))));
    }

    #[test]
    fn test_flat_sensor_rejected() {
        let result = GeometricalEstimator::estimate(1.0, 20.0, 0.5, [1.0, 0.0, 1.0], 3.0);
        assert!(matches!(result, Err(EstimatorError::InvalidArgument(_))));
    }
}
