//! Split-step propagators acting on a [`Field`].
//!
//! A full time step `dt` is assembled by the sequence controller as
//! ```text
//! K(dt/2) P(dt) K(dt) P(dt) ... K(dt) P(dt) K(dt/2)
//! ```
//! where `K` is the kinetic rotation in momentum space ([`Kinetic`]) and `P` is
//! a position-space propagator, either [`LocalPotential`] or one of the
//! light-coupled steps in [`coupling`][crate::coupling]. Only the kinetic
//! steps advance the simulation time, so every `P` is evaluated at the
//! midpoint of its interval.

use ndarray as nd;
use num_complex::Complex64 as C64;
use crate::{
    config::{ CResult, Params, SegmentDesc },
    error::PropError,
    field::Field,
    grid::{ self, MAX_DIM },
    utils::density,
};

pub type PResult<T> = Result<T, PropError>;

/// Laser parameters in effect for the current step.
///
/// Built once per segment from its descriptor; the controller then updates
/// the chirp and phase per chirp trial and the amplitude scale per step.
#[derive(Clone, Debug, PartialEq)]
pub struct Drive {
    /// Angular frequencies of the two lasers.
    pub laser_w: [f64; 2],
    /// Wavevectors of the two lasers.
    pub laser_k: [f64; 2],
    /// Linear frequency sweep rates of the two lasers.
    pub chirp_w: [f64; 2],
    /// Chirp rate of the current trial.
    pub chirp: f64,
    /// Additional laser phase of the current trial.
    pub phase: f64,
    /// Amplitudes of the first coupling, (right-going, left-going).
    pub amp_1: [f64; 2],
    /// Phases of the first coupling, (right-going, left-going).
    pub phi_1: [f64; 2],
    /// Amplitudes of the second coupling, (right-going, left-going).
    pub amp_2: [f64; 2],
    /// Phases of the second coupling, (right-going, left-going).
    pub phi_2: [f64; 2],
    /// Time-dependent scaling applied to every amplitude.
    pub amp_scale: f64,
}

impl Default for Drive {
    fn default() -> Self {
        Self {
            laser_w: [0.0; 2],
            laser_k: [0.0; 2],
            chirp_w: [0.0; 2],
            chirp: 0.0,
            phase: 0.0,
            amp_1: [0.0; 2],
            phi_1: [0.0; 2],
            amp_2: [0.0; 2],
            phi_2: [0.0; 2],
            amp_scale: 1.0,
        }
    }
}

impl Drive {
    /// Copy the laser parameters of a (normalized) segment.
    pub fn from_segment(seg: &SegmentDesc) -> Self {
        Self {
            laser_w: seg.laser_w,
            laser_k: seg.laser_k,
            chirp_w: seg.chirp_w,
            chirp: 0.0,
            phase: seg.phase,
            amp_1: seg.amp_1,
            phi_1: seg.phi_1,
            amp_2: seg.amp_2,
            phi_2: seg.phi_2,
            amp_scale: 1.0,
        }
    }

    /// Difference between the two laser frequencies.
    pub fn domh(&self) -> f64 { self.laser_w[0] - self.laser_w[1] }
}

/// Something that advances a [`Field`] by one step.
///
/// Implementors are looked up by name in a
/// [`Registry`][crate::registry::Registry], so new variants can be added
/// without touching the controller.
pub trait Propagator: Send + Sync {
    /// Apply one step of length `field.dt()` in place.
    fn step(&self, field: &mut Field, drive: &Drive) -> PResult<()>;
}

/// Kinetic rotation `exp(-i f dt |k|²)` applied in momentum space.
///
/// Advances the simulation time by `f dt`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Kinetic {
    fraction: f64,
}

impl Kinetic {
    /// Half kinetic step, `f = 1/2`.
    pub fn half() -> Self { Self { fraction: 0.5 } }

    /// Full kinetic step, `f = 1`.
    pub fn full() -> Self { Self { fraction: 1.0 } }

    pub fn fraction(&self) -> f64 { self.fraction }
}

impl Propagator for Kinetic {
    fn step(&self, field: &mut Field, _drive: &Drive) -> PResult<()> {
        let dt = self.fraction * field.dt();
        for s in 0..field.n_states() {
            field.fft(s);
            let (header, psi) = field.split_mut();
            nd::Zip::indexed(psi.row_mut(s))
                .par_for_each(|l, q| {
                    *q *= C64::cis(-grid::norm2(&header.wavevector(l)) * dt);
                });
            field.ifft(s);
        }
        field.advance(dt);
        Ok(())
    }
}

/// Pointwise phase rotation from the logarithmic nonlinearity, contact
/// self-interaction, linear external potential, and fixed per-state energy
/// offsets:
/// ```text
/// V[s](x) = -b ln ρ[s] + g[s, s] ρ[s] + β·x - Δ[s]
/// ψ[s](x) → exp(-i dt V[s](x)) ψ[s](x)
/// ```
/// with `ρ[s] = |ψ[s](x)|²`. Both density terms are taken to be exactly zero
/// wherever `ρ[s] ≤ 0`.
#[derive(Clone, Debug, PartialEq)]
pub struct LocalPotential {
    b: f64,
    g_diag: Vec<f64>,
    beta: [f64; MAX_DIM],
    delta: Vec<f64>,
}

impl LocalPotential {
    /// Create a new local potential step for `g_diag.len()` states.
    ///
    /// *Panics if `delta` has a different length from `g_diag`*.
    pub fn new(b: f64, g_diag: Vec<f64>, beta: [f64; MAX_DIM], delta: Vec<f64>)
        -> Self
    {
        assert_eq!(g_diag.len(), delta.len(),
            "LocalPotential::new: mismatched state counts");
        Self { b, g_diag, beta, delta }
    }

    /// Read parameters:
    /// - `b`: logarithmic nonlinearity
    /// - `g`: flattened `n_states × n_states` interaction matrix; only the
    ///   diagonal is used
    /// - `beta`: linear potential gradient, one entry per dimension
    /// - `omega_ij`: energy offsets of states `2..n_states`
    pub fn from_params(params: &Params) -> CResult<Self> {
        let n = params.grid.n_states;
        let b = params.constant("b")?;
        let g = params.vconstants("g", n * n)?;
        let g_diag: Vec<f64> = (0..n).map(|i| g[i + n * i]).collect();
        let beta = linear_potential(params)?;
        let delta = state_offsets(params)?;
        Ok(Self::new(b, g_diag, beta, delta))
    }

    pub fn n_states(&self) -> usize { self.g_diag.len() }

    /// Potential seen by state `s` at density `rho` and position `x`.
    pub fn potential(&self, s: usize, rho: f64, x: &[f64; MAX_DIM]) -> f64 {
        let nonlin
            = if rho <= 0.0 {
                0.0
            } else {
                -self.b * rho.ln() + self.g_diag[s] * rho
            };
        nonlin + grid::dot(&self.beta, x) - self.delta[s]
    }
}

impl Propagator for LocalPotential {
    fn step(&self, field: &mut Field, _drive: &Drive) -> PResult<()> {
        if field.n_states() != self.n_states() {
            return Err(PropError::StateCount {
                name: "freeprop",
                found: field.n_states(),
            });
        }
        let dt = field.dt();
        let (header, psi) = field.split_mut();
        nd::Zip::indexed(psi)
            .par_for_each(|(s, l), q| {
                let v = self.potential(s, density(*q), &header.coord(l));
                *q *= C64::cis(-dt * v);
            });
        Ok(())
    }
}

/// Read the `beta` linear potential gradient, one entry per dimension.
pub(crate) fn linear_potential(params: &Params) -> CResult<[f64; MAX_DIM]> {
    let mut beta = [0.0; MAX_DIM];
    for (ax, bk) in beta.iter_mut().enumerate().take(params.grid.dim) {
        *bk = params.vconstant("beta", ax)?;
    }
    Ok(beta)
}

/// Per-state energy offsets: zero for the two lowest states, `omega_ij[i - 2]`
/// for state `i ≥ 2`.
pub(crate) fn state_offsets(params: &Params) -> CResult<Vec<f64>> {
    let n = params.grid.n_states;
    let mut delta = vec![0.0; n];
    for (i, dk) in delta.iter_mut().enumerate().skip(2) {
        *dk = params.vconstant("omega_ij", i - 2)?;
    }
    Ok(delta)
}
