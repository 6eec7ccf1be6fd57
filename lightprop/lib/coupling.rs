//! Light-coupled propagators.
//!
//! At every grid point a small Hermitian matrix `H` over the internal states is
//! built from the local densities and the laser parameters, then the state
//! vector is advanced by the exact propagator
//! ```text
//! U = V exp(-i dt E) V^†
//! ```
//! where `H = V E V^†` is the eigendecomposition of `H`. The two physical
//! variants differ only in how `H` is filled; see [`Coupling`].

use ndarray as nd;
use ndarray_linalg::{ EighInplace, UPLO };
use num_complex::Complex64 as C64;
use num_traits::Zero;
use rayon::prelude::*;
use crate::{
    Arr1,
    Arr2,
    config::{ CResult, Params },
    error::PropError,
    field::Field,
    grid::{ self, MAX_DIM },
    timedep::{ linear_potential, state_offsets, Drive, PResult, Propagator },
    utils::density,
};

/// Fills the per-point coupling matrix of a [`CoupledStep`].
pub trait Coupling: Send + Sync {
    /// Name used in error messages.
    fn name(&self) -> &'static str;

    /// Smallest number of internal states the coupling can act on.
    fn min_states(&self) -> usize;

    /// Write the coupling matrix at position `x` into `h`, which is zeroed
    /// beforehand. `psi` holds the amplitudes of every state at that point and
    /// `t` is the midpoint time of the step.
    fn fill(
        &self,
        h: &mut nd::Array2<C64>,
        psi: nd::ArrayView1<C64>,
        x: &[f64; MAX_DIM],
        t: f64,
        drive: &Drive,
    );
}

/// Compute `V exp(-i dt E) V^†` from the eigenvalues `E` and eigenvectors `V`
/// (as columns) of a Hermitian matrix.
pub fn propagator<S, T>(evals: &Arr1<S>, evecs: &Arr2<T>, dt: f64)
    -> nd::Array2<C64>
where
    S: nd::Data<Elem = f64>,
    T: nd::Data<Elem = C64>,
{
    let phases: nd::Array1<C64> = evals.mapv(|e| C64::cis(-dt * e));
    let scaled: nd::Array2<C64> = evecs * &phases;
    scaled.dot(&evecs.t().mapv(|z| z.conj()))
}

// q → V exp(-i dt E) V^† q without forming the propagator; `c` is scratch
fn apply_propagator<S, T>(
    evals: &Arr1<S>,
    evecs: &Arr2<T>,
    dt: f64,
    c: &mut nd::Array1<C64>,
    mut q: nd::ArrayViewMut1<C64>,
)
where
    S: nd::Data<Elem = f64>,
    T: nd::Data<Elem = C64>,
{
    c.iter_mut().zip(evals.iter()).zip(evecs.columns())
        .for_each(|((ci, e), v)| {
            let proj: C64
                = v.iter().zip(q.iter()).map(|(vj, qj)| vj.conj() * qj).sum();
            *ci = proj * C64::cis(-dt * e);
        });
    q.iter_mut().zip(evecs.rows())
        .for_each(|(qj, row)| {
            *qj = row.iter().zip(c.iter()).map(|(vji, ci)| vji * ci).sum();
        });
}

/// Exact per-point propagator for a light [`Coupling`].
#[derive(Clone, Debug)]
pub struct CoupledStep<C> {
    coupling: C,
}

impl<C> CoupledStep<C>
where C: Coupling
{
    pub fn new(coupling: C) -> Self { Self { coupling } }

    pub fn coupling(&self) -> &C { &self.coupling }

    /// Build the coupling matrix at grid point `l`.
    pub fn matrix(&self, field: &Field, l: usize, drive: &Drive)
        -> nd::Array2<C64>
    {
        let n = field.n_states();
        let mut h = nd::Array2::zeros((n, n));
        self.coupling.fill(
            &mut h, field.psi().column(l), &field.coord(l), field.t(), drive);
        h
    }
}

impl<C> Propagator for CoupledStep<C>
where C: Coupling
{
    fn step(&self, field: &mut Field, drive: &Drive) -> PResult<()> {
        let n = field.n_states();
        if n < self.coupling.min_states() {
            return Err(PropError::StateCount {
                name: self.coupling.name(),
                found: n,
            });
        }
        let dt = field.dt();
        let t = field.t();
        let (header, psi) = field.split_mut();
        psi.axis_iter_mut(nd::Axis(1))
            .into_par_iter()
            .enumerate()
            .try_for_each_init(
                || (nd::Array2::<C64>::zeros((n, n)), nd::Array1::<C64>::zeros(n)),
                |(h, c), (l, q)| {
                    h.fill(C64::zero());
                    self.coupling.fill(h, q.view(), &header.coord(l), t, drive);
                    let (evals, evecs) = h.eigh_inplace(UPLO::Lower)?;
                    apply_propagator(&evals, &*evecs, dt, c, q);
                    Ok(())
                },
            )
    }
}

/// Two counter-propagating lasers driving first- (and, with three states,
/// second-) order Bragg transitions out of state 0.
///
/// Diagonal:
/// ```text
/// H[s, s] = b ln ρ[s] + β·x - Δ[s]
/// ```
/// with the density term zero wherever `ρ[s] ≤ 0`. Off-diagonal, for the
/// `i`-th coupling (`i = 0, 1`, with `σ = +1, -1`):
/// ```text
/// θ = (-δω + σ α t) t + σ k x₀ - φ/2
/// H[i + 1, 0] = a ((A₀ + A₁)/2 cos θ + i (A₀ - A₁)/2 sin θ)
/// H[0, i + 1] = H[i + 1, 0]^*
/// ```
/// where `δω` is the laser frequency difference, `α` the trial chirp, `k` the
/// first laser's wavevector, `φ` the additional phase, `A` the first coupling
/// amplitudes and `a` the amplitude scale.
#[derive(Clone, Debug, PartialEq)]
pub struct TwoLaser {
    b: f64,
    beta: [f64; MAX_DIM],
    delta: Vec<f64>,
}

impl TwoLaser {
    pub fn new(b: f64, beta: [f64; MAX_DIM], delta: Vec<f64>) -> Self {
        Self { b, beta, delta }
    }

    /// Read `b`, `beta`, and `omega_ij`.
    pub fn from_params(params: &Params) -> CResult<Self> {
        Ok(Self::new(
            params.constant("b")?,
            linear_potential(params)?,
            state_offsets(params)?,
        ))
    }
}

impl Coupling for TwoLaser {
    fn name(&self) -> &'static str { "bragg" }

    fn min_states(&self) -> usize { 2 }

    fn fill(
        &self,
        h: &mut nd::Array2<C64>,
        psi: nd::ArrayView1<C64>,
        x: &[f64; MAX_DIM],
        t: f64,
        drive: &Drive,
    ) {
        let n = psi.len();
        let lin = grid::dot(&self.beta, x);
        for (s, q) in psi.iter().enumerate() {
            let rho = density(*q);
            let nonlin = if rho <= 0.0 { 0.0 } else { self.b * rho.ln() };
            let offset = self.delta.get(s).copied().unwrap_or(0.0);
            h[[s, s]] = C64::from(nonlin + lin - offset);
        }
        let [a0, a1] = drive.amp_1;
        let domh = drive.domh();
        for i in 0..(n - 1).min(2) {
            let sigma = if i == 0 { 1.0 } else { -1.0 };
            let theta
                = (-domh + sigma * drive.chirp * t) * t
                + sigma * drive.laser_k[0] * x[0]
                - 0.5 * drive.phase;
            let eta
                = drive.amp_scale
                * C64::new(
                    (a0 + a1) / 2.0 * theta.cos(),
                    (a0 - a1) / 2.0 * theta.sin(),
                );
            h[[i + 1, 0]] = eta;
            h[[0, i + 1]] = eta.conj();
        }
    }
}

/// Gaussian beam geometry shared by both lasers of a [`ThreeLevel`]
/// coupling.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Beam {
    /// Waist radius at the focus.
    pub waist_0: f64,
    /// Focus position along the propagation axis (`x₀`).
    pub z_0: f64,
    /// Substitute for the wavefront curvature radius where it is undefined.
    pub r_c_clamp: f64,
}

impl Default for Beam {
    fn default() -> Self {
        Self { waist_0: 7.0, z_0: 0.0, r_c_clamp: f32::MAX as f64 }
    }
}

/// Beam quantities at a single point.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BeamSample {
    /// Relative field amplitude, `w₀/w(z) exp(-(r/w(z))²)`.
    pub amp: f64,
    /// Wavefront curvature radius.
    pub r_c: f64,
    /// Curvature path offset, `r²/(2 R_c)`.
    pub curvature: f64,
    /// Gouy phase.
    pub gouy: f64,
}

impl Beam {
    /// Evaluate the beam of wavevector `k` at `x`, taking `x₀` as the
    /// propagation axis and `x₁` as the radius.
    pub fn sample(&self, k: f64, x: &[f64; MAX_DIM]) -> BeamSample {
        let z_r = k / 2.0 * self.waist_0.powi(2);
        let dz = x[0] - self.z_0;
        let waist = self.waist_0 * (1.0 + (dz / z_r).powi(2)).sqrt();
        let mut r_c = dz * (1.0 + (z_r / dz).powi(2));
        if !r_c.is_finite() { r_c = self.r_c_clamp; }
        BeamSample {
            amp: self.waist_0 / waist * (-(x[1] / waist).powi(2)).exp(),
            r_c,
            curvature: x[1].powi(2) / (2.0 * r_c),
            gouy: (dz / z_r).atan(),
        }
    }
}

/// Two Gaussian lasers driving Raman transitions `0 ↔ 2` and `1 ↔ 2`,
/// including Doppler shifts of a moving, accelerating frame.
///
/// Diagonal:
/// ```text
/// H[s, s] = -b ln ρ[s] + Δ[s]
/// Δ = [ω₀(t) - ω_ig, ω₁(t) - ω_ie, ω_ij...]
/// ```
/// where `ωⱼ(t) = ωⱼ + αⱼ t` are the swept laser frequencies. For laser `j`
/// with (right, left) amplitudes `A` and phases `Φ`,
/// ```text
/// β = (v₀ + g₀ t) / c
/// θ± = k (x₀ + P) (β ∓ 1) ∓ β ωⱼ(t) t - Φ± - ζ
/// η = a G (A₊ exp(i θ₊) + A₋ exp(i θ₋))
/// ```
/// with `P` the curvature offset, `ζ` the Gouy phase and `G` the envelope
/// from [`Beam::sample`]. Laser 0 fills `H[0, 2]`, laser 1 fills `H[1, 2]`.
#[derive(Clone, Debug, PartialEq)]
pub struct ThreeLevel {
    b: f64,
    delta: Vec<f64>,
    omega_ig: f64,
    omega_ie: f64,
    v_0: f64,
    g_0: f64,
    c_p: f64,
    beams: [Beam; 2],
}

impl ThreeLevel {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        b: f64,
        delta: Vec<f64>,
        omega_ig: f64,
        omega_ie: f64,
        v_0: f64,
        g_0: f64,
        c_p: f64,
        beams: [Beam; 2],
    ) -> Self
    {
        Self { b, delta, omega_ig, omega_ie, v_0, g_0, c_p, beams }
    }

    /// Read `b`, `omega_ij`, `omega_ig`, `omega_ie`, `v_0`, `g_0`, and `c_p`,
    /// and optionally `waist_0`, `z_0`, and `r_c_clamp` for the beam
    /// geometry.
    pub fn from_params(params: &Params) -> CResult<Self> {
        let def = Beam::default();
        let beam = Beam {
            waist_0: params.constant_or("waist_0", def.waist_0)?,
            z_0: params.constant_or("z_0", def.z_0)?,
            r_c_clamp: params.constant_or("r_c_clamp", def.r_c_clamp)?,
        };
        Ok(Self::new(
            params.constant("b")?,
            state_offsets(params)?,
            params.constant("omega_ig")?,
            params.constant("omega_ie")?,
            params.constant("v_0")?,
            params.constant("g_0")?,
            params.constant("c_p")?,
            [beam; 2],
        ))
    }

    pub fn beams(&self) -> &[Beam; 2] { &self.beams }

    #[allow(clippy::too_many_arguments)]
    fn laser(
        &self,
        j: usize,
        x: &[f64; MAX_DIM],
        t: f64,
        doppler: f64,
        w_t: f64,
        amp: [f64; 2],
        phi: [f64; 2],
        drive: &Drive,
    ) -> C64
    {
        let k = drive.laser_k[j];
        let beam = self.beams[j].sample(k, x);
        let path = k * (x[0] + beam.curvature);
        let theta_r
            = path * (doppler - 1.0) - doppler * w_t * t - phi[0] - beam.gouy;
        let theta_l
            = path * (doppler + 1.0) + doppler * w_t * t - phi[1] - beam.gouy;
        drive.amp_scale * beam.amp
            * (amp[0] * C64::cis(theta_r) + amp[1] * C64::cis(theta_l))
    }
}

impl Coupling for ThreeLevel {
    fn name(&self) -> &'static str { "raman" }

    fn min_states(&self) -> usize { 3 }

    fn fill(
        &self,
        h: &mut nd::Array2<C64>,
        psi: nd::ArrayView1<C64>,
        x: &[f64; MAX_DIM],
        t: f64,
        drive: &Drive,
    ) {
        let doppler = (self.v_0 + self.g_0 * t) / self.c_p;
        let w_t = [
            drive.laser_w[0] + drive.chirp_w[0] * t,
            drive.laser_w[1] + drive.chirp_w[1] * t,
        ];
        for (s, q) in psi.iter().enumerate() {
            let rho = density(*q);
            let nonlin = if rho <= 0.0 { 0.0 } else { -self.b * rho.ln() };
            let offset
                = match s {
                    0 => w_t[0] - self.omega_ig,
                    1 => w_t[1] - self.omega_ie,
                    _ => self.delta.get(s).copied().unwrap_or(0.0),
                };
            h[[s, s]] = C64::from(nonlin + offset);
        }
        let eta_1
            = self.laser(0, x, t, doppler, w_t[0], drive.amp_1, drive.phi_1, drive);
        h[[0, 2]] = eta_1;
        h[[2, 0]] = eta_1.conj();
        let eta_2
            = self.laser(1, x, t, doppler, w_t[1], drive.amp_2, drive.phi_2, drive);
        h[[1, 2]] = eta_2;
        h[[2, 1]] = eta_2.conj();
    }
}

/// Two-laser (Bragg) propagator.
pub type Bragg = CoupledStep<TwoLaser>;

/// Three-level (Raman) propagator.
pub type Raman = CoupledStep<ThreeLevel>;
