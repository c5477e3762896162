//! Numerical tolerances shared by the simplifier, density engine and range
//! estimator. Builder free functions use [`EngineConfig::default`] implicitly;
//! [`crate::node::Dag::with_config`] lets a caller override them.

/// Bundles the tuning constants the density/range/simplify algorithms treat
/// as literals elsewhere in this crate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    /// Tail mass used by `rangeEst` when sizing an internal convolution or
    /// compound-quadrature grid (`ε` in `(lo, hi) = range_est(ε)`).
    pub eps_int: f64,
    /// Minimum number of grid points used per child when convolving a `Sum`.
    pub n_min: usize,
    /// Tolerance within which `Mixture` weights must sum to 1.
    pub mixture_weight_tolerance: f64,
    /// Grid-point count above which a convolution step is large enough that
    /// a host could swap in an FFT-backed convolution; this crate always
    /// convolves directly and only records the threshold.
    pub fft_threshold: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            eps_int: 1e-4,
            n_min: 1024,
            mixture_weight_tolerance: 1e-9,
            fft_threshold: 4096,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_documented_constants() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.eps_int, 1e-4);
        assert_eq!(cfg.n_min, 1024);
        assert_eq!(cfg.mixture_weight_tolerance, 1e-9);
        assert_eq!(cfg.fft_threshold, 4096);
    }
}
