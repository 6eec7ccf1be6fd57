//! Name-keyed propagator lookup.

use std::sync::Arc;
use rustc_hash::FxHashMap as HashMap;
use crate::{
    config::{ CResult, Params },
    coupling::{ CoupledStep, ThreeLevel, TwoLaser },
    error::ConfigError,
    timedep::{ Kinetic, LocalPotential, Propagator },
};

/// Name of the half kinetic step.
pub const HALF_STEP: &str = "half_step";

/// Name of the full kinetic step.
pub const FULL_STEP: &str = "full_step";

/// Name of the uncoupled local potential step.
pub const FREEPROP: &str = "freeprop";

/// Name of the two-laser light-coupled step.
pub const BRAGG: &str = "bragg";

/// Name of the three-level light-coupled step.
pub const RAMAN: &str = "raman";

/// Maps segment names to the propagators they run.
#[derive(Clone, Default)]
pub struct Registry {
    steps: HashMap<String, Arc<dyn Propagator>>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.steps.keys().collect();
        names.sort();
        f.debug_struct("Registry").field("steps", &names).finish()
    }
}

impl Registry {
    /// Create a new, empty registry.
    pub fn new() -> Self { Self::default() }

    /// Create a registry holding the kinetic steps and the `freeprop`,
    /// `bragg`, and `raman` propagators.
    ///
    /// The light-coupled propagators are only registered if every constant
    /// they need is present; [`Self::lookup`] reports what is missing.
    pub fn standard(params: &Params) -> CResult<Self> {
        let mut reg = Self::new();
        reg.register(HALF_STEP, Kinetic::half());
        reg.register(FULL_STEP, Kinetic::full());
        reg.register(FREEPROP, LocalPotential::from_params(params)?);
        match TwoLaser::from_params(params) {
            Ok(c) => { reg.register(BRAGG, CoupledStep::new(c)); },
            Err(err) => {
                tracing::debug!("bragg propagator unavailable: {err}");
            },
        }
        match ThreeLevel::from_params(params) {
            Ok(c) => { reg.register(RAMAN, CoupledStep::new(c)); },
            Err(err) => {
                tracing::debug!("raman propagator unavailable: {err}");
            },
        }
        Ok(reg)
    }

    /// Find the propagator for segment `name`.
    ///
    /// If a standard light-coupled propagator is missing, its construction
    /// error from `params` is returned instead of
    /// [`ConfigError::UnknownSequence`].
    pub fn lookup(&self, name: &str, params: &Params)
        -> CResult<Arc<dyn Propagator>>
    {
        if let Some(step) = self.get(name) { return Ok(step); }
        match name {
            BRAGG => { TwoLaser::from_params(params)?; },
            RAMAN => { ThreeLevel::from_params(params)?; },
            _ => { },
        }
        Err(ConfigError::UnknownSequence(name.to_string()))
    }

    /// Add or replace a propagator.
    pub fn register<P>(&mut self, name: &str, step: P) -> &mut Self
    where P: Propagator + 'static
    {
        self.steps.insert(name.to_string(), Arc::new(step));
        self
    }

    /// Remove a propagator, returning it if it was present.
    pub fn remove(&mut self, name: &str) -> Option<Arc<dyn Propagator>> {
        self.steps.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Propagator>> {
        self.steps.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool { self.steps.contains_key(name) }

    pub fn len(&self) -> usize { self.steps.len() }

    pub fn is_empty(&self) -> bool { self.steps.is_empty() }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEXT: &str = r#"
        [grid]
        dim = 1
        n = [8]
        min = [-4.0]
        max = [4.0]
        n_states = 2

        [constants]
        b = 0.0
        g = [0.0, 0.0, 0.0, 0.0]
        beta = [0.0]
    "#;

    #[test]
    fn standard_registers_available_steps() {
        let params = Params::from_toml_str(TEXT).unwrap();
        let reg = Registry::standard(&params).unwrap();
        assert!(reg.contains(HALF_STEP));
        assert!(reg.contains(FULL_STEP));
        assert!(reg.contains(FREEPROP));
        assert!(reg.contains(BRAGG));
        // needs the Raman constants
        assert!(!reg.contains(RAMAN));
        assert!(reg.get("nope").is_none());
    }

    #[test]
    fn lookup_reports_missing_constants() {
        let params = Params::from_toml_str(TEXT).unwrap();
        let reg = Registry::standard(&params).unwrap();
        assert!(reg.lookup(BRAGG, &params).is_ok());
        assert!(matches!(
            reg.lookup(RAMAN, &params),
            Err(ConfigError::MissingParameter(name)) if name == "omega_ig"
        ));
        assert!(matches!(
            reg.lookup("nope", &params),
            Err(ConfigError::UnknownSequence(name)) if name == "nope"
        ));
    }

    #[test]
    fn lookup_prefers_registered_steps() {
        let params = Params::from_toml_str(TEXT).unwrap();
        let mut reg = Registry::standard(&params).unwrap();
        reg.register(RAMAN, Kinetic::full());
        assert!(reg.lookup(RAMAN, &params).is_ok());
        reg.remove(BRAGG);
        assert!(matches!(
            reg.lookup(BRAGG, &params),
            Err(ConfigError::UnknownSequence(_)),
        ));
    }

    #[test]
    fn register_replaces() {
        let params = Params::from_toml_str(TEXT).unwrap();
        let mut reg = Registry::standard(&params).unwrap();
        let n = reg.len();
        reg.register(FREEPROP, Kinetic::full());
        assert_eq!(reg.len(), n);
        assert!(reg.remove(HALF_STEP).is_some());
        assert!(!reg.contains(HALF_STEP));
    }
}
