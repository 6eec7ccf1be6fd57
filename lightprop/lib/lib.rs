#![allow(dead_code, non_snake_case)]

//! Split-step propagation of multi-component wavefunctions coupled to laser
//! fields, and the controller that strings propagation steps into simulated
//! interferometry sequences.
//!
//! Provides:
//! - A [field][field::Field] of one complex amplitude array per internal
//!   state over a uniform 1–3 dimensional grid, with in-place FFTs
//! - Kinetic and local-potential split-step propagators
//!   ([`timedep`])
//! - Light-coupled propagators built on per-point diagonalization of a small
//!   Hermitian coupling matrix ([`coupling`]): a two-laser (Bragg) and a
//!   three-level (Raman) variant
//! - Momentum-space occupancy analysis ([`occupancy`]) and chirp scans
//!   ([`chirp`])
//! - A [sequence controller][sequence::Controller] driving all of the above
//!   from a TOML parameter file
//!
//! See [`docs`] for theoretical background.

pub mod error;
pub mod utils;
pub mod grid;
pub mod field;
pub mod snapshot;
pub mod formula;
pub mod config;
pub mod timedep;
pub mod coupling;
pub mod occupancy;
pub mod chirp;
pub mod registry;
pub mod sequence;
pub mod logging;

pub mod docs;

pub type Arr1<S> = ndarray::ArrayBase<S, ndarray::Ix1>;
pub type Arr2<S> = ndarray::ArrayBase<S, ndarray::Ix2>;
