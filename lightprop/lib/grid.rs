//! Description of the uniform spatial grid shared by all field components.
//!
//! The same [`Header`] is written verbatim at the head of every snapshot file,
//! so its layout is fixed: all fields are stored with three axes, and axes
//! beyond the grid's dimensionality carry a single point.

use std::f64::consts::TAU;
use serde::{ Deserialize, Serialize };
use crate::error::ConfigError;

/// Maximum number of spatial dimensions.
pub const MAX_DIM: usize = 3;

/// Byte size of one complex amplitude in a snapshot payload.
pub const DATATYPE_SIZE: u64 = 16;

/// Grid and time-stepping metadata.
///
/// Spacing is always `(max - min) / n` per axis and never changes after
/// construction; only [`Self::t`] and [`Self::dt`] are updated during a run.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Header {
    /// Encoded size of the header itself in bytes.
    pub nself: u64,
    /// Byte size of one payload element.
    pub ndatatype: u64,
    /// Number of spatial dimensions (1–3).
    pub ndims: u64,
    /// Points per axis.
    pub n: [u64; MAX_DIM],
    /// Non-zero if the payload describes an atomic wavefunction.
    pub atom: i32,
    /// Non-zero if the payload is complex-valued.
    pub complex: i32,
    /// Lower spatial bound per axis.
    pub min: [f64; MAX_DIM],
    /// Upper spatial bound per axis.
    pub max: [f64; MAX_DIM],
    /// Spacing per axis.
    pub dx: [f64; MAX_DIM],
    /// Wavevector spacing per axis.
    pub dk: [f64; MAX_DIM],
    /// Mass scale factor.
    pub mass: f64,
    /// Time scale factor.
    pub t_scale: f64,
    /// Time step.
    pub dt: f64,
    /// Current simulation time.
    pub t: f64,
}

impl Header {
    /// Create a new header for a `dim`-dimensional grid with `n[i]` points on
    /// `[min[i], max[i])` along axis `i`.
    ///
    /// Fails if `dim` is not 1, 2, or 3, if fewer than `dim` entries are given
    /// for any of the per-axis arrays, or if any axis is empty.
    pub fn new(
        dim: usize,
        n: &[usize],
        min: &[f64],
        max: &[f64],
        dt: f64,
    ) -> Result<Self, ConfigError>
    {
        if !(1..=MAX_DIM).contains(&dim) {
            return Err(ConfigError::bad_value(
                "dim", format!("must be 1, 2, or 3; got {dim}")));
        }
        for (name, len) in [("n", n.len()), ("min", min.len()), ("max", max.len())] {
            if len < dim {
                return Err(ConfigError::bad_value(
                    name, format!("expected {dim} entries; got {len}")));
            }
        }
        let mut header = Self {
            nself: 0,
            ndatatype: DATATYPE_SIZE,
            ndims: dim as u64,
            n: [1; MAX_DIM],
            atom: 1,
            complex: 1,
            min: [0.0; MAX_DIM],
            max: [0.0; MAX_DIM],
            dx: [1.0; MAX_DIM],
            dk: [0.0; MAX_DIM],
            mass: 1.0,
            t_scale: 1.0,
            dt,
            t: 0.0,
        };
        for ax in 0..dim {
            let len = max[ax] - min[ax];
            if n[ax] == 0 || len <= 0.0 {
                return Err(ConfigError::bad_value(
                    "grid", format!("axis {ax} is empty")));
            }
            header.n[ax] = n[ax] as u64;
            header.min[ax] = min[ax];
            header.max[ax] = max[ax];
            header.dx[ax] = len / n[ax] as f64;
            header.dk[ax] = TAU / len;
        }
        header.nself = Self::encoded_len();
        Ok(header)
    }

    /// Size of the header in its binary snapshot encoding.
    pub fn encoded_len() -> u64 {
        // fixed-width encoding; every field is a primitive or a fixed array
        8 * 3 + 8 * MAX_DIM as u64 + 4 * 2 + 8 * 4 * MAX_DIM as u64 + 8 * 4
    }

    /// Number of spatial dimensions.
    pub fn dim(&self) -> usize { self.ndims as usize }

    /// Points per axis, always three entries.
    pub fn shape(&self) -> [usize; MAX_DIM] {
        [self.n[0] as usize, self.n[1] as usize, self.n[2] as usize]
    }

    /// Total number of grid points.
    pub fn n_points(&self) -> usize { self.shape().iter().product() }

    /// Volume element in position space.
    pub fn dv(&self) -> f64 { self.dx[..self.dim()].iter().product() }

    /// Volume element in momentum space for an unnormalized forward transform,
    /// such that summing `|ψ(k)|²` times this factor over all points gives the
    /// same particle number as in position space.
    pub fn dv_k(&self) -> f64 { self.dv() / self.n_points() as f64 }

    /// Split a flat grid index into per-axis indices (row-major).
    pub fn unravel(&self, l: usize) -> [usize; MAX_DIM] {
        let [_, ny, nz] = self.shape();
        [l / (ny * nz), (l / nz) % ny, l % nz]
    }

    /// Position of the point with flat index `l`, centered on the grid
    /// midpoint. Entries past the grid's dimensionality are zero.
    pub fn coord(&self, l: usize) -> [f64; MAX_DIM] {
        let idx = self.unravel(l);
        let mut x = [0.0; MAX_DIM];
        for ax in 0..self.dim() {
            let half = (self.n[ax] / 2) as f64;
            x[ax] = (idx[ax] as f64 - half) * self.dx[ax];
        }
        x
    }

    /// Wavevector of the FFT mode with flat index `l`. Entries past the grid's
    /// dimensionality are zero.
    pub fn wavevector(&self, l: usize) -> [f64; MAX_DIM] {
        let idx = self.unravel(l);
        let mut k = [0.0; MAX_DIM];
        for ax in 0..self.dim() {
            k[ax] = wavenumber(idx[ax], self.n[ax] as usize, self.dk[ax]);
        }
        k
    }
}

// map super-Nyquist indices to negative frequencies
fn wavenumber(i: usize, n: usize, dk: f64) -> f64 {
    let m = if n % 2 == 0 { n / 2 } else { (n + 1) / 2 };
    if i < m { i as f64 * dk } else { -((n - i) as f64) * dk }
}

/// Squared Euclidean norm of a three-vector.
pub fn norm2(v: &[f64; MAX_DIM]) -> f64 { v.iter().map(|vk| vk * vk).sum() }

/// Dot product of two three-vectors.
pub fn dot(a: &[f64; MAX_DIM], b: &[f64; MAX_DIM]) -> f64 {
    a.iter().zip(b).map(|(ak, bk)| ak * bk).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spacing_and_volume() {
        let h = Header::new(2, &[8, 4], &[-4.0, -1.0], &[4.0, 1.0], 0.01)
            .unwrap();
        assert_eq!(h.shape(), [8, 4, 1]);
        assert_eq!(h.n_points(), 32);
        assert!((h.dx[0] - 1.0).abs() < 1e-15);
        assert!((h.dx[1] - 0.5).abs() < 1e-15);
        assert!((h.dv() - 0.5).abs() < 1e-15);
        assert!((h.dk[0] - TAU / 8.0).abs() < 1e-15);
    }

    #[test]
    fn centered_coordinates() {
        let h = Header::new(1, &[8], &[-4.0], &[4.0], 0.01).unwrap();
        assert_eq!(h.coord(0), [-4.0, 0.0, 0.0]);
        assert_eq!(h.coord(4), [0.0, 0.0, 0.0]);
        assert_eq!(h.coord(7), [3.0, 0.0, 0.0]);
    }

    #[test]
    fn fft_ordered_wavevectors() {
        let h = Header::new(1, &[4], &[0.0], &[TAU], 0.01).unwrap();
        let k: Vec<f64> = (0..4).map(|l| h.wavevector(l)[0]).collect();
        assert_eq!(k, vec![0.0, 1.0, -2.0, -1.0]);
    }

    #[test]
    fn row_major_unravel() {
        let h = Header::new(3, &[2, 3, 4], &[0.0; 3], &[1.0; 3], 0.01)
            .unwrap();
        assert_eq!(h.unravel(0), [0, 0, 0]);
        assert_eq!(h.unravel(5), [0, 1, 1]);
        assert_eq!(h.unravel(23), [1, 2, 3]);
    }

    #[test]
    fn encoded_len_matches_bincode() {
        let h = Header::new(1, &[8], &[0.0], &[1.0], 0.01).unwrap();
        let len = bincode::serialized_size(&h).unwrap();
        assert_eq!(len, Header::encoded_len());
        assert_eq!(h.nself, len);
    }

    #[test]
    fn rejects_bad_dimension() {
        assert!(Header::new(4, &[1; 4], &[0.0; 4], &[1.0; 4], 0.1).is_err());
        assert!(Header::new(2, &[8], &[0.0], &[1.0], 0.1).is_err());
        assert!(Header::new(1, &[0], &[0.0], &[1.0], 0.1).is_err());
    }
}
