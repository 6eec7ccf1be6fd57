//! Miscellaneous tools.

use std::sync::Arc;
use ndarray as nd;
use num_complex::Complex64 as C64;
use rustfft::{ Fft, FftPlanner };
use crate::grid::{ Header, MAX_DIM };

/// Squared magnitude of a complex amplitude.
#[inline]
pub fn density(z: C64) -> f64 { z.norm_sqr() }

/// Direction of a Fourier transform.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FftDir {
    /// Position to momentum space, unnormalized.
    Forward,
    /// Momentum to position space, normalized by the total point count.
    Inverse,
}

/// Forward and inverse FFT plans for every non-trivial axis of a grid.
///
/// Planning happens once; the plans are shared between worker threads.
#[derive(Clone)]
pub struct FftPlans {
    shape: [usize; MAX_DIM],
    forward: Vec<(usize, Arc<dyn Fft<f64>>)>,
    inverse: Vec<(usize, Arc<dyn Fft<f64>>)>,
}

impl std::fmt::Debug for FftPlans {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FftPlans").field("shape", &self.shape).finish()
    }
}

impl FftPlans {
    /// Plan transforms for the grid described by `header`.
    pub fn new(header: &Header) -> Self {
        let shape = header.shape();
        let mut planner = FftPlanner::<f64>::new();
        let mut forward = Vec::new();
        let mut inverse = Vec::new();
        for (ax, &n) in shape.iter().enumerate().take(header.dim()) {
            if n < 2 { continue; }
            forward.push((ax, planner.plan_fft_forward(n)));
            inverse.push((ax, planner.plan_fft_inverse(n)));
        }
        Self { shape, forward, inverse }
    }

    /// Perform the multi-dimensional, complex-valued FFT of one flat,
    /// row-major buffer in place.
    ///
    /// *Panics if `buf` does not hold exactly as many points as the grid*.
    pub fn process(&self, buf: &mut [C64], dir: FftDir) {
        let n_total = buf.len();
        let [nx, ny, nz] = self.shape;
        let mut view = nd::ArrayViewMut3::from_shape((nx, ny, nz), buf)
            .expect("FftPlans::process: buffer does not match grid shape");
        let plans = match dir {
            FftDir::Forward => &self.forward,
            FftDir::Inverse => &self.inverse,
        };
        for (ax, plan) in plans.iter() {
            nd::Zip::from(view.lanes_mut(nd::Axis(*ax)))
                .par_for_each(|mut lane| {
                    let mut line: Vec<C64> = lane.to_vec();
                    plan.process(&mut line);
                    lane.iter_mut().zip(line)
                        .for_each(|(zk, lk)| { *zk = lk; });
                });
        }
        if dir == FftDir::Inverse {
            let norm = (n_total as f64).recip();
            view.par_map_inplace(|zk| { *zk *= norm; });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn max_diff(a: &[C64], b: &[C64]) -> f64 {
        a.iter().zip(b)
            .map(|(ak, bk)| (ak - bk).norm())
            .fold(0.0, f64::max)
    }

    #[test]
    fn plane_wave_lands_in_one_mode() {
        let h = Header::new(1, &[16], &[0.0], &[16.0], 0.1).unwrap();
        let plans = FftPlans::new(&h);
        let dk = h.dk[0];
        let mut buf: Vec<C64>
            = (0..16).map(|l| C64::cis(3.0 * dk * l as f64)).collect();
        plans.process(&mut buf, FftDir::Forward);
        for (l, zk) in buf.iter().enumerate() {
            if l == 3 {
                assert!((zk.norm() - 16.0).abs() < 1e-10);
            } else {
                assert!(zk.norm() < 1e-10);
            }
        }
    }

    #[test]
    fn round_trip_3d() {
        let h = Header::new(3, &[4, 3, 5], &[0.0; 3], &[1.0; 3], 0.1).unwrap();
        let plans = FftPlans::new(&h);
        let orig: Vec<C64>
            = (0..h.n_points())
            .map(|l| C64::new((l as f64).sin(), (0.3 * l as f64).cos()))
            .collect();
        let mut buf = orig.clone();
        plans.process(&mut buf, FftDir::Forward);
        assert!(max_diff(&buf, &orig) > 1e-3);
        plans.process(&mut buf, FftDir::Inverse);
        assert!(max_diff(&buf, &orig) < 1e-12);
    }
}
