//! Theoretical background.
//!
//! # Contents
//! - [Background](#background)
//! - [Split-step propagation](#split-step-propagation)
//! - [Light coupling](#light-coupling)
//! - [Momentum populations](#momentum-populations)
//! - [Chirp scans](#chirp-scans)
//!
//! # Background
//! The field is a set of *n* complex amplitudes *ψ*ₛ(**x**, *t*), one per
//! internal state *s*, evolving under a coupled nonlinear Schrödinger equation
//! in dimensionless units,
//! ```text
//!   ∂ψₛ
//! i --- = -∇² ψₛ + Vₛ(x, |ψₛ|²) ψₛ + Σ_{s'≠s} Ω_{ss'}(x, t) ψ_{s'}
//!   ∂t
//! ```
//! where *V*ₛ collects a logarithmic nonlinearity, a contact self-interaction,
//! an external linear potential and a fixed energy offset of state *s*, and the
//! Ω's are coherent couplings between states driven by laser light. Without
//! light the states evolve independently.
//!
//! The grid is uniform with spacing *δx* = (*x*ₘₐₓ - *x*ₘᵢₙ)/*N* along each
//! axis and positions are measured from the grid midpoint,
//! ```text
//! x[i] = (i - ⌊N/2⌋) δx
//! ```
//! Wavevectors follow FFT ordering, with *δk* = 2π/(*N* *δx*).
//!
//! # Split-step propagation
//! Writing the right-hand side as *T* + *P*, where *T* = -∇² is diagonal in
//! momentum space and *P* (potential plus coupling) is block-diagonal in
//! position space, one step of length *δt* is approximated by the symmetric
//! product
//! ```text
//! exp(-i δt (T + P)) ≈ exp(-i δt T / 2) exp(-i δt P) exp(-i δt T / 2)
//! ```
//! which is second-order accurate in *δt*. Chaining *N*ₖ of these steps, the
//! inner half-steps merge pairwise into full kinetic steps:
//! ```text
//! K(δt/2) P K(δt) P K(δt) ... P K(δt/2)
//! ```
//! The kinetic factor is a pure phase in momentum space,
//! *ψ*(**k**) → exp(-i *f* *δt* |**k**|²) *ψ*(**k**) with *f* = 1/2 or 1, so it
//! is applied by a forward FFT, a pointwise multiplication and an inverse FFT.
//!
//! Since only the kinetic factors advance the clock, every *P* is evaluated
//! at the midpoint of its interval.
//!
//! Without light, *P* is diagonal in the states and also a pure phase:
//! ```text
//! Vₛ(x) = -b ln ρₛ + gₛₛ ρₛ + β·x - Δₛ,   ρₛ = |ψₛ(x)|²
//! ```
//! with the density terms dropped wherever *ρ*ₛ = 0. Each such step is
//! exactly invertible (replace *δt* by -*δt*) and leaves every density
//! unchanged.
//!
//! # Light coupling
//! With light, *P* is a small Hermitian *n* × *n* matrix *H*(**x**, *t*) at each
//! grid point. Its exponential is computed exactly by diagonalization,
//! ```text
//! H = V E V^†
//! exp(-i δt H) = V exp(-i δt E) V^†
//! ```
//! which is unitary whenever *H* is Hermitian, so the total population
//! Σₛ |*ψ*ₛ(**x**)|² is conserved point by point.
//!
//! Two couplings are provided.
//!
//! **Two lasers (Bragg).** Counter-propagating beams with frequency difference
//! *δω* and wavevector *k* couple state 0 to states 1 and 2 with phases
//! ```text
//! θ± = (-δω ± α t) t ± k x₀ - φ/2
//! ```
//! where *α* is the chirp rate of the current trial and *φ* an additional
//! laser phase.
//!
//! **Three levels (Raman).** Two Gaussian beams of wavevectors *k*ⱼ couple
//! states 0 and 1 to a common state 2. A beam with waist *w*₀ focused at
//! *z*₀ has Rayleigh range *z*ᵣ = *k* *w*₀²/2 and, at distance
//! *z* = *x*₀ - *z*₀ from the focus,
//! ```text
//! w(z) = w₀ √(1 + (z/zᵣ)²)
//! R(z) = z (1 + (zᵣ/z)²)
//! ζ(z) = atan(z/zᵣ)
//! ```
//! The radius of curvature *R* is undefined at the focus itself, where it is
//! replaced by a large constant. The field amplitude falls off radially (along
//! *x*₁) as (*w*₀/*w*) exp(-(*r*/*w*)²) and each beam carries a right- and a
//! left-going part, Doppler shifted by *β* = (*v*₀ + *g*₀ *t*)/*c*.
//!
//! # Momentum populations
//! The population near a momentum **k**₀ is estimated by transforming one
//! component to momentum space and summing
//! ```text
//! N(k₀) = Σ_{|k - k₀| < r} |ψ(k)|² δV/N
//! ```
//! where the factor *δV*/*N* makes Parseval's relation hold for the
//! unnormalized forward transform. Tracking these sums over time shows Rabi
//! oscillations between momentum states.
//!
//! # Chirp scans
//! A resonance can drift during a pulse, so a segment may be repeated for a
//! number of trial chirp rates, each starting from the same checkpointed field.
//! The first two trials sit at the configured bounds; every later trial uses
//! the midpoint of the two most recent ones, after discarding the more recent
//! one if the population at the first probe decreased. This is a heuristic
//! search that runs a fixed number of trials rather than a convergent root
//! finder.
