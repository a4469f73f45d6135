//! Helper functions for integration tests

use nalgebra::DMatrix;
use std::f64::consts::PI;

/// Compute relative error: |actual - expected| / |expected|
pub fn relative_error(actual: f64, expected: f64) -> f64 {
    if expected.abs() < 1e-10 {
        (actual - expected).abs()
    } else {
        (actual - expected).abs() / expected.abs()
    }
}

/// Potential (mV) of a point current `current` (nA) at `distance` (um) in a
/// medium of conductivity `sigma` (S/m)
pub fn point_source_potential(current: f64, sigma: f64, distance: f64) -> f64 {
    current / (4.0 * PI * sigma * distance)
}

/// Current density (mA/cm^2) that yields `current` (nA) through `area` (um^2)
pub fn density_for(current: f64, area: f64) -> f64 {
    current / (area * 1e-2)
}

/// Largest elementwise relative difference between two matrices
pub fn max_relative_difference(a: &DMatrix<f64>, b: &DMatrix<f64>) -> f64 {
    assert_eq!(a.shape(), b.shape(), "shape mismatch");
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| relative_error(x, y))
        .fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_error() {
        assert!((relative_error(1.0, 1.0) - 0.0).abs() < 1e-10);
        assert!((relative_error(1.1, 1.0) - 0.1).abs() < 1e-10);
        assert!((relative_error(0.9, 1.0) - 0.1).abs() < 1e-10);
    }

    #[test]
    fn test_density_round_trip() {
        let density = density_for(1.0, 314.0);
        assert!((density * 314.0 * 1e-2 - 1.0).abs() < 1e-12);
    }
}
