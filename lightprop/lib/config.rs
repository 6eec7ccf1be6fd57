//! Parameter store and sequence descriptors, read from a TOML file.
//!
//! ```toml
//! threads = 4
//! probes = [[0.0], [2.0]]
//!
//! [grid]
//! dim = 1
//! n = [256]
//! min = [-64.0]
//! max = [64.0]
//! dt = 0.001
//! n_states = 2
//!
//! [constants]
//! b = 0.0
//! g = [1.0, 0.0, 0.0, 1.0]
//! beta = [0.0]
//! rabi_threshold = 0.5
//! # ...
//!
//! [simulation]
//! AMP_T = "exp(-(t - 1)^2)"
//!
//! [[sequence]]
//! name = "bragg"
//! duration = [1.0]
//! dt = 0.001
//! nk = 10
//! laser_w = [10.0, 10.0]
//! amp_1 = [1.0, 1.0]
//! rabi_output_freq = "each"
//! ```

use std::{ collections::BTreeMap, path::Path };
use serde::Deserialize;
use tracing::warn;
use crate::{ error::ConfigError, grid::{ Header, MAX_DIM } };

pub type CResult<T> = Result<T, ConfigError>;

/// Grid and state-count section.
#[derive(Clone, Debug, Deserialize)]
pub struct GridParams {
    pub dim: usize,
    pub n: Vec<usize>,
    pub min: Vec<f64>,
    pub max: Vec<f64>,
    #[serde(default = "def_dt")]
    pub dt: f64,
    #[serde(default = "def_one")]
    pub t_scale: f64,
    pub n_states: usize,
}

fn def_dt() -> f64 { 0.001 }

fn def_one() -> f64 { 1.0 }

/// A named constant: either a scalar or an indexed vector.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Constant {
    Scalar(f64),
    Vector(Vec<f64>),
}

/// Cadence at which a diagnostic is produced during a segment.
#[derive(Copy, Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Freq {
    /// Never.
    #[default]
    None,
    /// After every outer step.
    Each,
    /// Once at the end of the segment (or chirp trial).
    Last,
    /// After every outer step, appended to a single packed file. Only
    /// meaningful for wavefunction snapshots.
    Packed,
}

/// What the per-trial parameter of a chirp scan controls.
#[derive(Copy, Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChirpMode {
    /// Trials bisect over the chirp rate between `chirp_min` and `chirp_max`.
    #[default]
    Chirp,
    /// Trial `s` of `K` additionally sets the laser phase to `s·2π/K`.
    Phase,
}

/// One protocol segment.
#[derive(Clone, Debug, Deserialize)]
pub struct SegmentDesc {
    /// Name of the propagator to apply between kinetic steps.
    pub name: String,
    /// Free-form content, e.g. the momentum vector of `set_momentum`.
    #[serde(default)]
    pub content: String,
    /// Target component, e.g. for `set_momentum`.
    #[serde(default)]
    pub comp: usize,
    /// Requested durations; the longest one is used.
    #[serde(default)]
    pub duration: Vec<f64>,
    /// Time step.
    #[serde(default = "def_dt")]
    pub dt: f64,
    /// Fine steps per outer step.
    #[serde(default = "def_nk")]
    pub nk: usize,
    /// Angular frequencies of the two lasers.
    #[serde(default)]
    pub laser_w: [f64; 2],
    /// Linear frequency sweep rates of the two lasers (three-level variant).
    #[serde(default)]
    pub chirp_w: [f64; 2],
    /// Amplitudes of the first coupling, (right-going, left-going).
    #[serde(default)]
    pub amp_1: [f64; 2],
    /// Phases of the first coupling, (right-going, left-going).
    #[serde(default)]
    pub phi_1: [f64; 2],
    /// Amplitudes of the second coupling, (right-going, left-going).
    #[serde(default)]
    pub amp_2: [f64; 2],
    /// Phases of the second coupling, (right-going, left-going).
    #[serde(default)]
    pub phi_2: [f64; 2],
    /// Additional laser phase.
    #[serde(default)]
    pub phase: f64,
    /// Chirp of the first trial.
    #[serde(default)]
    pub chirp_min: f64,
    /// Chirp of the second trial.
    #[serde(default)]
    pub chirp_max: f64,
    /// Number of chirp trials.
    #[serde(default = "def_chirps")]
    pub no_of_chirps: usize,
    #[serde(default)]
    pub chirp_mode: ChirpMode,
    /// Wavefunction snapshot cadence.
    #[serde(default)]
    pub output_freq: Freq,
    /// Particle-number report cadence.
    #[serde(default)]
    pub compute_pn_freq: Freq,
    /// Rabi-probe sampling cadence.
    #[serde(default)]
    pub rabi_output_freq: Freq,
    /// Custom diagnostic cadence.
    #[serde(default)]
    pub custom_freq: Freq,
    /// Laser wavevectors, derived from `laser_w` by [`Self::normalize`].
    #[serde(skip)]
    pub laser_k: [f64; 2],
}

fn def_nk() -> usize { 1 }

fn def_chirps() -> usize { 1 }

/// Outer/inner step counts derived from a segment.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct StepPlan {
    /// Outer steps.
    pub na: usize,
    /// Fine steps per outer step.
    pub nk: usize,
    /// `true` if `na * nk * dt` reproduces the requested duration.
    pub exact: bool,
}

impl SegmentDesc {
    /// Longest requested duration.
    pub fn max_duration(&self) -> f64 {
        self.duration.iter().copied().fold(0.0, f64::max)
    }

    /// Fill in derived quantities: laser wavevectors from frequencies, and a
    /// single trial for free propagation.
    pub fn normalize(&mut self, c_p: f64) {
        self.laser_k = [self.laser_w[0] / c_p, self.laser_w[1] / c_p];
        if self.name == "freeprop" || self.no_of_chirps == 0 {
            self.no_of_chirps = 1;
        }
        if self.nk == 0 { self.nk = 1; }
    }

    /// Difference between the two laser frequencies.
    pub fn laser_domh(&self) -> f64 { self.laser_w[0] - self.laser_w[1] }

    /// Compute outer/inner step counts. The duration is truncated to a whole
    /// number of steps.
    pub fn steps(&self) -> StepPlan {
        let duration = self.max_duration();
        // guard against e.g. 0.01 / 0.001 = 9.9999...
        let sub_n = (duration / self.dt + 1e-9).floor() as usize;
        let nk = self.nk.max(1);
        let na = sub_n / nk;
        let covered = (na * nk) as f64 * self.dt;
        let exact = (covered - duration).abs() <= 1e-9 * duration.abs().max(1.0);
        StepPlan { na, nk, exact }
    }

    /// Parse `content` as a comma-separated momentum vector.
    pub fn momentum(&self, dim: usize) -> CResult<[f64; MAX_DIM]> {
        let vals: Vec<f64>
            = self.content.split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<f64>())
            .collect::<Result<_, _>>()
            .map_err(|e| ConfigError::bad_value("content", e.to_string()))?;
        if vals.len() < dim {
            return Err(ConfigError::bad_value(
                "content", format!("expected {dim} momentum components")));
        }
        let mut p = [0.0; MAX_DIM];
        p.iter_mut().zip(vals).take(dim).for_each(|(pk, vk)| { *pk = vk; });
        Ok(p)
    }
}

/// All run parameters.
#[derive(Clone, Debug, Deserialize)]
pub struct Params {
    pub grid: GridParams,
    #[serde(default)]
    pub constants: BTreeMap<String, Constant>,
    #[serde(default)]
    pub simulation: BTreeMap<String, String>,
    /// Momentum-space probe points.
    #[serde(default)]
    pub probes: Vec<Vec<f64>>,
    /// Worker thread count; defaults to the available parallelism.
    #[serde(default)]
    pub threads: Option<usize>,
    #[serde(default)]
    pub sequence: Vec<SegmentDesc>,
}

impl Params {
    /// Parse parameters from TOML text.
    pub fn from_toml_str(text: &str) -> CResult<Self> {
        let params: Self = toml::from_str(text)?;
        params.validate()?;
        Ok(params)
    }

    /// Read and parse a TOML parameter file.
    pub fn load<P>(path: P) -> CResult<Self>
    where P: AsRef<Path>
    {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|source| {
                ConfigError::Read { path: path.to_path_buf(), source }
            })?;
        Self::from_toml_str(&text)
    }

    fn validate(&self) -> CResult<()> {
        if self.grid.n_states == 0 {
            return Err(ConfigError::bad_value("n_states", "must be positive"));
        }
        for (k, seg) in self.sequence.iter().enumerate() {
            if seg.dt <= 0.0 {
                return Err(ConfigError::bad_value(
                    "dt", format!("sequence {} has non-positive time step", k + 1)));
            }
        }
        if let Some(p) = self.probes.iter().find(|p| p.len() < self.grid.dim) {
            return Err(ConfigError::bad_value(
                "probes", format!("probe {p:?} has fewer than {} components", self.grid.dim)));
        }
        Ok(())
    }

    /// Build the grid header.
    pub fn header(&self) -> CResult<Header> {
        let mut header = Header::new(
            self.grid.dim, &self.grid.n, &self.grid.min, &self.grid.max, self.grid.dt)?;
        header.t_scale = self.grid.t_scale;
        Ok(header)
    }

    /// Look up a scalar constant.
    pub fn constant(&self, name: &str) -> CResult<f64> {
        match self.constants.get(name) {
            Some(Constant::Scalar(x)) => Ok(*x),
            Some(Constant::Vector(_)) => Err(ConfigError::bad_value(
                name, "expected a scalar, found a vector")),
            None => Err(ConfigError::MissingParameter(name.to_string())),
        }
    }

    /// Look up a scalar constant, falling back to `default` if absent.
    pub fn constant_or(&self, name: &str, default: f64) -> CResult<f64> {
        match self.constant(name) {
            Err(ConfigError::MissingParameter(_)) => Ok(default),
            res => res,
        }
    }

    /// Look up entry `i` of a vector constant.
    pub fn vconstant(&self, name: &str, i: usize) -> CResult<f64> {
        match self.constants.get(name) {
            Some(Constant::Vector(v)) => v.get(i).copied()
                .ok_or_else(|| {
                    ConfigError::MissingIndex { name: name.to_string(), index: i }
                }),
            Some(Constant::Scalar(_)) => Err(ConfigError::bad_value(
                name, "expected a vector, found a scalar")),
            None => Err(ConfigError::MissingParameter(name.to_string())),
        }
    }

    /// Look up the first `n` entries of a vector constant.
    pub fn vconstants(&self, name: &str, n: usize) -> CResult<Vec<f64>> {
        (0..n).map(|i| self.vconstant(name, i)).collect()
    }

    /// Look up a simulation string.
    pub fn simulation(&self, name: &str) -> CResult<&str> {
        self.simulation.get(name)
            .map(|s| s.as_str())
            .ok_or_else(|| ConfigError::MissingParameter(name.to_string()))
    }

    /// All scalar constants, as name/value pairs for formula compilation.
    pub fn formula_constants(&self) -> Vec<(String, f64)> {
        self.constants.iter()
            .filter_map(|(name, c)| match c {
                Constant::Scalar(x) => Some((name.clone(), *x)),
                Constant::Vector(_) => None,
            })
            .collect()
    }

    /// Momentum-space probe points, padded to three components.
    pub fn probe_points(&self) -> Vec<[f64; MAX_DIM]> {
        self.probes.iter()
            .map(|p| {
                let mut k = [0.0; MAX_DIM];
                k.iter_mut().zip(p).take(self.grid.dim)
                    .for_each(|(kk, pk)| { *kk = *pk; });
                k
            })
            .collect()
    }

    /// Worker thread count.
    pub fn threads(&self) -> usize {
        match self.threads {
            Some(n) if n > 0 => n,
            Some(_) => {
                warn!("ignoring zero thread count");
                std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
            },
            None => std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
        }
    }
}
