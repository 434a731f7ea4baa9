//! Square 2D Gaussian kernel.
//!
//! Reach is three standard deviations on each side of the origin, so the
//! dimension is always `6 * stdev + 1`.


use std::f64::consts::PI;

/// Kernel reach in standard deviations on each side of the origin.
pub const KERNEL_DIMENSION_SD: u32 = 3;

/// Maximum 8-bit channel value, used to scale the normalization constant.
pub const COLOUR_SCALE: f64 = 255.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Kernel {
    weights: Vec<f32>,
    dimension: u32,
    origin: u32,
    peak: f32,
    normalization: f32,
}

impl Kernel {
    /// Kernel width and height for `stdev`.
    pub const fn dimension_for(stdev: u32) -> u32 {
        2 * (KERNEL_DIMENSION_SD * stdev) + 1
    }

    /// Index of the centre cell for `stdev`.
    pub const fn origin_for(stdev: u32) -> u32 {
        KERNEL_DIMENSION_SD * stdev
    }

    /// Builds the kernel, tracking the peak weight and the normalization sum
    /// `Σ weight * 255` while filling cells.
    pub fn gaussian(stdev: u32) -> Kernel {
        assert!(stdev > 0, "Standard deviation must be positive");

        let dimension = Self::dimension_for(stdev);
        let origin = Self::origin_for(stdev);
        let variance = (stdev as f64).powi(2);
        let scale = 1.0 / (2.0 * PI * variance).sqrt();

        let mut weights = vec![0.0f32; (dimension * dimension) as usize];
        let mut peak = 0.0f32;
        let mut normalization = 0.0f32;

        for i in 0..dimension {
            let dx = origin.abs_diff(i) as f64;
            for j in 0..dimension {
                let dy = origin.abs_diff(j) as f64;
                let weight = (scale * (-(dx * dx + dy * dy) / (2.0 * variance)).exp()) as f32;

                weights[(i * dimension + j) as usize] = weight;
                peak = peak.max(weight);
                normalization += weight * COLOUR_SCALE as f32;
            }
        }

        tracing::debug!(
            stdev,
            dimension,
            peak,
            normalization,
            "built gaussian kernel"
        );

        Kernel {
            weights,
            dimension,
            origin,
            peak,
            normalization,
        }
    }

    pub fn dimension(&self) -> u32 {
        self.dimension
    }

    pub fn origin(&self) -> u32 {
        self.origin
    }

    /// Largest weight in the kernel. Informational only.
    pub fn peak(&self) -> f32 {
        self.peak
    }

    /// Sum of every weight scaled by 255.
    pub fn normalization(&self) -> f32 {
        self.normalization
    }

    /// Row-major weights, `dimension * dimension` long.
    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    #[inline]
    pub fn weight(&self, i: u32, j: u32) -> f32 {
        debug_assert!(i < self.dimension && j < self.dimension);
        self.weights[(i * self.dimension + j) as usize]
    }
}
