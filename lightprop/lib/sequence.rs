//! Execution of a protocol: an ordered list of segments, each run as
//! `Na` outer steps of `Nk` fine steps, optionally repeated over several
//! chirp trials.
//!
//! One outer step applies
//! ```text
//! half_step, (Nk - 1) × [segment step, full_step], segment step, half_step
//! ```
//! followed by whichever diagnostics the segment asks for at every step.
//!
//! Segments with more than one chirp trial checkpoint the field to
//! `Backup_<n>_<k>.bin` before the first trial and reload it before every
//! later one. After the last trial the field is saved under its end time and
//! reloaded from exactly those files, so the segment exits in the final
//! trial's end state.
//!
//! Segments are numbered from 1 in output file names; `set_momentum` segments
//! do not take a number.

use std::{
    f64::consts::TAU,
    io,
    path::{ Path, PathBuf },
    sync::Arc,
};
use tracing::{ error, info, warn };
use crate::{
    chirp::{ chirp_name, write_chirps, ChirpRow, ChirpSearch, TrialRecord },
    config::{ ChirpMode, Freq, Params, SegmentDesc, StepPlan },
    error::{ ConfigError, RunError },
    field::Field,
    formula::Formula,
    occupancy::{ populations, rabi_name, Probes, RabiSeries },
    registry::{ Registry, FULL_STEP, HALF_STEP },
    snapshot::{ self, packed_name },
    timedep::{ Drive, Propagator },
};

pub type RResult<T> = Result<T, RunError>;

/// Name of the built-in segment that imparts a momentum kick.
pub const SET_MOMENTUM: &str = "set_momentum";

/// Everything a run mutates, exposed to [`Hooks`].
#[derive(Debug)]
pub struct RunState {
    /// Run parameters.
    pub params: Params,
    /// The propagated field.
    pub field: Field,
    /// Momentum-space probes.
    pub probes: Probes,
    /// Probe samples of the current chirp trial.
    pub rabi: RabiSeries,
    /// Chirp table of the current segment.
    pub chirps: Vec<ChirpRow>,
    /// Directory receiving snapshots and diagnostic tables.
    pub outdir: PathBuf,
    /// One-based index of the current segment.
    pub segment: usize,
    /// Zero-based index of the current chirp trial.
    pub trial: usize,
    amp_t: Option<Formula>,
}

impl RunState {
    /// Scale factor for all light amplitudes at the current field time: the
    /// `AMP_T` formula if one was configured, otherwise 1.
    pub fn amp_scale(&self) -> f64 {
        self.amp_t.as_ref()
            .map(|f| f.eval(&[self.field.t()]))
            .unwrap_or(1.0)
    }

    /// Log the particle number of every state.
    pub fn log_particle_numbers(&self) {
        for c in 0..self.field.n_states() {
            info!("N[{}] = {}", c, self.field.particle_number(c));
        }
    }

    fn save_snapshots(&self) -> RResult<()> {
        snapshot::save_all(&self.outdir, &self.field)?;
        Ok(())
    }

    fn append_packed(&self) -> RResult<()> {
        for k in 0..self.field.n_states() {
            let path = self.outdir.join(packed_name(self.segment, k));
            snapshot::append(path, &self.field, k)?;
        }
        Ok(())
    }
}

/// User extension points of a [`Controller`].
pub trait Hooks: Send {
    /// Called before any built-in handling of a segment; return `true` to
    /// claim the segment and skip the built-in handling.
    fn custom_segment(&mut self, state: &mut RunState, seg: &SegmentDesc)
        -> RResult<bool>
    {
        let _ = (state, seg);
        Ok(false)
    }

    /// Custom diagnostic, called at the segment's `custom_freq` cadence.
    fn diagnostic(&mut self, state: &mut RunState, seg: &SegmentDesc)
        -> RResult<()>
    {
        let _ = (state, seg);
        Ok(())
    }
}

/// Drives a field through the segments of a parameter file.
pub struct Controller {
    state: RunState,
    registry: Registry,
    hooks: Option<Box<dyn Hooks>>,
    pool: Arc<rayon::ThreadPool>,
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("state", &self.state)
            .field("registry", &self.registry)
            .field("hooks", &self.hooks.is_some())
            .field("threads", &self.pool.current_num_threads())
            .finish()
    }
}

fn check_state_count(params: &Params, field: &Field) -> RResult<()> {
    if field.n_states() != params.grid.n_states {
        return Err(ConfigError::StateCount {
            expected: params.grid.n_states,
            found: field.n_states(),
        }.into());
    }
    Ok(())
}

fn output_err(path: &Path) -> impl FnOnce(io::Error) -> RunError + '_ {
    move |source| RunError::Output { path: path.to_path_buf(), source }
}

impl Controller {
    /// Set up a run of `params` on `field`, writing output to `outdir`.
    ///
    /// Builds the standard [`Registry`] and a worker pool of
    /// [`Params::threads`] threads, and compiles the optional `AMP_T`
    /// formula. Fails if the field's component count does not match the
    /// configured number of internal states.
    pub fn new<P>(params: Params, field: Field, outdir: P) -> RResult<Self>
    where P: AsRef<Path>
    {
        check_state_count(&params, &field)?;
        let registry = Registry::standard(&params)?;
        let probes = Probes::from_params(&params)?;
        let amp_t
            = match params.simulation("AMP_T") {
                Ok(expr) => Some(
                    Formula::compile(expr, &["t"], &params.formula_constants())?
                ),
                Err(_) => None,
            };
        let pool
            = rayon::ThreadPoolBuilder::new()
            .num_threads(params.threads())
            .build()?;
        let state = RunState {
            params,
            field,
            probes,
            rabi: RabiSeries::new(),
            chirps: Vec::new(),
            outdir: outdir.as_ref().to_path_buf(),
            segment: 0,
            trial: 0,
            amp_t,
        };
        Ok(Self { state, registry, hooks: None, pool: Arc::new(pool) })
    }

    /// Attach custom hooks.
    pub fn with_hooks<H>(mut self, hooks: H) -> Self
    where H: Hooks + 'static
    {
        self.hooks = Some(Box::new(hooks));
        self
    }

    pub fn state(&self) -> &RunState { &self.state }

    pub fn state_mut(&mut self) -> &mut RunState { &mut self.state }

    pub fn registry(&self) -> &Registry { &self.registry }

    /// Register additional propagators or replace standard ones.
    pub fn registry_mut(&mut self) -> &mut Registry { &mut self.registry }

    pub fn field(&self) -> &Field { &self.state.field }

    pub fn into_field(self) -> Field { self.state.field }

    /// Run every segment in order.
    ///
    /// Snapshot and diagnostic-output failures abandon only the current
    /// segment; every other error ends the run.
    pub fn run(&mut self) -> RResult<()> {
        let pool = Arc::clone(&self.pool);
        pool.install(|| self.run_segments())
    }

    fn run_segments(&mut self) -> RResult<()> {
        check_state_count(&self.state.params, &self.state.field)?;
        let half
            = self.registry.get(HALF_STEP)
            .ok_or(ConfigError::MissingPropagator(HALF_STEP))?;
        let full
            = self.registry.get(FULL_STEP)
            .ok_or(ConfigError::MissingPropagator(FULL_STEP))?;
        let segments = self.state.params.sequence.clone();
        info!("found {} sequences", segments.len());
        if self.state.probes.is_empty() {
            warn!("probe list is empty; momentum populations are unavailable");
        }
        let mut index = 0;
        for seg in segments.into_iter() {
            if seg.name != SET_MOMENTUM { index += 1; }
            match self.run_segment(index, seg, half.as_ref(), full.as_ref()) {
                Ok(()) => { },
                Err(err) if !err.is_fatal() => {
                    error!("sequence {index} abandoned: {err}");
                },
                Err(err) => { return Err(err); },
            }
        }
        Ok(())
    }

    /// Run a single segment; `index` is the segment number used in output
    /// file names.
    pub fn run_segment(
        &mut self,
        index: usize,
        mut seg: SegmentDesc,
        half: &dyn Propagator,
        full: &dyn Propagator,
    ) -> RResult<()>
    {
        self.state.segment = index;
        self.state.trial = 0;
        if let Some(hooks) = self.hooks.as_mut() {
            if hooks.custom_segment(&mut self.state, &seg)? {
                info!("sequence {index} ({}) handled by custom hook", seg.name);
                return Ok(());
            }
        }
        if seg.name == SET_MOMENTUM { return self.set_momentum(&seg); }

        let c_p
            = if seg.laser_w == [0.0; 2] {
                self.state.params.constant_or("c_p", 1.0)?
            } else {
                self.state.params.constant("c_p")?
            };
        seg.normalize(c_p);
        let plan = seg.steps();
        self.log_banner(index, &seg, plan);
        self.state.field.set_dt(seg.dt);
        let step = self.registry.lookup(&seg.name, &self.state.params)?;

        let n = self.state.field.n_states();
        for k in 0..n {
            snapshot::remove(self.state.outdir.join(packed_name(index, k)))?;
        }
        self.state.chirps.clear();
        let trials = seg.no_of_chirps;
        let mut search = ChirpSearch::from_segment(&seg);
        if trials > 1 {
            snapshot::save_backup(&self.state.outdir, &self.state.field, index)?;
        }

        let mut drive = Drive::from_segment(&seg);
        for s in 0..trials {
            self.state.trial = s;
            self.state.rabi.clear();
            drive.chirp = search.chirp(s);
            if seg.chirp_mode == ChirpMode::Phase {
                drive.phase = s as f64 * TAU / trials as f64;
            }
            for _ in 0..plan.na {
                self.outer_step(step.as_ref(), half, full, plan.nk, &mut drive)?;
                info!("t = {}", self.state.field.t());
                self.step_diagnostics(&seg, s)?;
            }
            self.trial_diagnostics(&seg, s, plan)?;
            if trials > 1 {
                let pops
                    = populations(&mut self.state.field, &self.state.probes)
                    .unwrap_or_default();
                let response = pops.first().copied().unwrap_or(0.0);
                let param
                    = match seg.chirp_mode {
                        ChirpMode::Chirp => drive.chirp,
                        ChirpMode::Phase => drive.phase,
                    };
                self.state.chirps.push(
                    ChirpRow { step: s, param, populations: pops });
                search.record(TrialRecord { chirp: drive.chirp, response });
                if s + 1 < trials {
                    snapshot::load_backup(
                        &self.state.outdir, &mut self.state.field, index)?;
                }
            }
        }

        if trials > 1 {
            let path = self.state.outdir.join(chirp_name(index));
            write_chirps(&path, &self.state.probes, &self.state.chirps)
                .map_err(output_err(&path))?;
            let st = &mut self.state;
            let saved = snapshot::save_all(&st.outdir, &st.field)?;
            for (k, path) in saved.iter().enumerate() {
                snapshot::load(path, &mut st.field, k)?;
            }
        }
        Ok(())
    }

    fn set_momentum(&mut self, seg: &SegmentDesc) -> RResult<()> {
        let dim = self.state.field.header().dim();
        let p = seg.momentum(dim)?;
        if seg.comp >= self.state.field.n_states() {
            return Err(ConfigError::bad_value(
                "comp", format!("no field component {}", seg.comp)).into());
        }
        self.state.field.set_momentum(p, seg.comp);
        info!("started new sequence {}", seg.name);
        info!("momentum {:?} set for component {}", &p[..dim], seg.comp);
        Ok(())
    }

    fn log_banner(&self, index: usize, seg: &SegmentDesc, plan: StepPlan) {
        let covered = (plan.na * plan.nk) as f64 * seg.dt;
        info!("started new sequence {}", seg.name);
        info!("sequence no : {}", index);
        info!("duration    : {}", seg.max_duration());
        info!("dt          : {}", seg.dt);
        info!("Na          : {}", plan.na);
        info!("Nk          : {}", plan.nk);
        info!("Na*Nk*dt    : {}", covered);
        match self.state.amp_t.as_ref() {
            Some(f) => { info!("Amp is      : {}", f.expr()); },
            None => { info!("Amp is      : 1"); },
        }
        if !plan.exact {
            warn!(
                "Na*Nk*dt = {} differs from the requested duration {}",
                covered,
                seg.max_duration(),
            );
        }
    }

    fn outer_step(
        &mut self,
        step: &dyn Propagator,
        half: &dyn Propagator,
        full: &dyn Propagator,
        nk: usize,
        drive: &mut Drive,
    ) -> RResult<()>
    {
        half.step(&mut self.state.field, drive)?;
        for _ in 1..nk {
            self.coupled_step(step, drive)?;
            full.step(&mut self.state.field, drive)?;
        }
        self.coupled_step(step, drive)?;
        half.step(&mut self.state.field, drive)?;
        Ok(())
    }

    // the field time sits at the midpoint of the segment step here
    fn coupled_step(&mut self, step: &dyn Propagator, drive: &mut Drive)
        -> RResult<()>
    {
        drive.amp_scale = self.state.amp_scale();
        step.step(&mut self.state.field, drive)?;
        Ok(())
    }

    fn custom_diagnostic(&mut self, seg: &SegmentDesc) -> RResult<()> {
        match self.hooks.as_mut() {
            Some(hooks) => hooks.diagnostic(&mut self.state, seg),
            None => Ok(()),
        }
    }

    fn step_diagnostics(&mut self, seg: &SegmentDesc, s: usize) -> RResult<()> {
        if s == 0 {
            match seg.output_freq {
                Freq::Each => { self.state.save_snapshots()?; },
                Freq::Packed => { self.state.append_packed()?; },
                Freq::None | Freq::Last => { },
            }
        }
        if seg.compute_pn_freq == Freq::Each {
            self.state.log_particle_numbers();
        }
        if seg.rabi_output_freq == Freq::Each {
            let st = &mut self.state;
            st.rabi.sample(&mut st.field, &st.probes);
        }
        if seg.custom_freq == Freq::Each { self.custom_diagnostic(seg)?; }
        Ok(())
    }

    fn trial_diagnostics(&mut self, seg: &SegmentDesc, s: usize, plan: StepPlan)
        -> RResult<()>
    {
        if s == 0 && seg.output_freq == Freq::Last {
            self.state.save_snapshots()?;
        }
        if seg.compute_pn_freq == Freq::Last {
            self.state.log_particle_numbers();
        }
        if seg.custom_freq == Freq::Last { self.custom_diagnostic(seg)?; }
        if seg.rabi_output_freq == Freq::Last {
            let st = &mut self.state;
            let t = st.field.t();
            if let Some(row) = st.rabi.sample(&mut st.field, &st.probes) {
                info!("Rabi output for timestep {}: {:?}", t, row);
            }
        }
        if seg.rabi_output_freq == Freq::Each {
            let st = &self.state;
            let path = st.outdir.join(rabi_name(st.segment, s));
            st.rabi.write(&path, &st.probes, seg.dt * plan.nk as f64)
                .map_err(output_err(&path))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use ndarray as nd;
    use num_complex::Complex64 as C64;
    use super::*;
    use crate::error::{ PropError, SnapshotError };

    fn params(sequence: &str) -> Params {
        let text = format!(r#"
            threads = 2
            probes = [[0.0]]

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
            rabi_threshold = 0.1

            {sequence}
        "#);
        Params::from_toml_str(&text).unwrap()
    }

    fn field(params: &Params) -> Field {
        let h = params.header().unwrap();
        let comps = vec![nd::Array1::from_elem(8, C64::new(0.5, 0.0)); 2];
        Field::from_components(h, &comps).unwrap()
    }

    const FREEPROP: &str = r#"
        [[sequence]]
        name = "freeprop"
        duration = [0.005]
        dt = 0.001
        rabi_output_freq = "each"
    "#;

    #[test]
    fn rejects_state_count_mismatch() {
        let p = params(FREEPROP);
        let h = p.header().unwrap();
        let f = Field::zeros(h, 3);
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Controller::new(p, f, dir.path()),
            Err(RunError::Config(ConfigError::StateCount { expected: 2, found: 3 })),
        ));
    }

    #[test]
    fn missing_kinetic_step_is_fatal() {
        let p = params(FREEPROP);
        let f = field(&p);
        let dir = tempfile::tempdir().unwrap();
        let mut ctrl = Controller::new(p, f, dir.path()).unwrap();
        ctrl.registry_mut().remove(FULL_STEP);
        let err = ctrl.run().unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(
            err, RunError::Config(ConfigError::MissingPropagator("full_step"))));
    }

    #[test]
    fn unknown_sequence_is_fatal() {
        let p = params(r#"
            [[sequence]]
            name = "nope"
            duration = [0.001]
        "#);
        let f = field(&p);
        let dir = tempfile::tempdir().unwrap();
        let mut ctrl = Controller::new(p, f, dir.path()).unwrap();
        assert!(matches!(
            ctrl.run(),
            Err(RunError::Config(ConfigError::UnknownSequence(name))) if name == "nope",
        ));
    }

    #[test]
    fn light_segment_reports_missing_constant() {
        let p = params(r#"
            c_p = 10.0
            omega_ie = 1.0

            [[sequence]]
            name = "raman"
            duration = [0.001]
            laser_w = [1.0, 2.0]
        "#);
        let f = field(&p);
        let dir = tempfile::tempdir().unwrap();
        let mut ctrl = Controller::new(p, f, dir.path()).unwrap();
        assert!(matches!(
            ctrl.run(),
            Err(RunError::Config(ConfigError::MissingParameter(name)))
                if name == "omega_ig"
        ));
    }

    #[test]
    fn raman_segment_with_two_states_is_fatal() {
        let p = params(r#"
            c_p = 10.0
            omega_ig = 1.0
            omega_ie = 1.0
            v_0 = 0.0
            g_0 = 0.0

            [[sequence]]
            name = "raman"
            duration = [0.001]
            laser_w = [1.0, 2.0]
        "#);
        let f = field(&p);
        let dir = tempfile::tempdir().unwrap();
        let mut ctrl = Controller::new(p, f, dir.path()).unwrap();
        let err = ctrl.run().unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(
            err, RunError::Prop(PropError::StateCount { name: "raman", found: 2 })));
    }

    #[test]
    fn set_momentum_takes_no_segment_number() {
        let p = params(r#"
            [[sequence]]
            name = "set_momentum"
            content = "1.0"
            comp = 0

            [[sequence]]
            name = "freeprop"
            duration = [0.002]
            rabi_output_freq = "each"
        "#);
        let f = field(&p);
        let dir = tempfile::tempdir().unwrap();
        let mut ctrl = Controller::new(p, f, dir.path()).unwrap();
        ctrl.run().unwrap();
        assert_eq!(ctrl.state().segment, 1);
        assert!(dir.path().join(rabi_name(1, 0)).exists());
        assert!(!dir.path().join(rabi_name(2, 0)).exists());
    }

    #[test]
    fn claimed_segments_take_a_number() {
        let p = params(r#"
            [[sequence]]
            name = "nope"

            [[sequence]]
            name = "freeprop"
            duration = [0.002]
            rabi_output_freq = "each"
        "#);
        let f = field(&p);
        let dir = tempfile::tempdir().unwrap();
        let mut ctrl
            = Controller::new(p, f, dir.path()).unwrap().with_hooks(Claim(0));
        ctrl.run().unwrap();
        assert!(dir.path().join(rabi_name(2, 0)).exists());
    }

    #[test]
    fn freeprop_advances_time_and_writes_rabi_table() {
        let p = params(FREEPROP);
        let f = field(&p);
        let dir = tempfile::tempdir().unwrap();
        let mut ctrl = Controller::new(p, f, dir.path()).unwrap();
        ctrl.run().unwrap();
        assert!((ctrl.field().t() - 0.005).abs() < 1e-12);
        assert_eq!(ctrl.state().rabi.len(), 5);
        let text
            = std::fs::read_to_string(dir.path().join("Rabi_1_0.txt")).unwrap();
        assert_eq!(text.lines().count(), 6);
    }

    #[test]
    fn set_momentum_kicks_component() {
        let p = params(r#"
            [[sequence]]
            name = "set_momentum"
            content = "2.0"
            comp = 1
        "#);
        let f = field(&p);
        let dir = tempfile::tempdir().unwrap();
        let mut ctrl = Controller::new(p, f, dir.path()).unwrap();
        ctrl.run().unwrap();
        let field = ctrl.field();
        let x = field.coord(3)[0];
        assert_eq!(field.component(0)[3], C64::new(0.5, 0.0));
        assert!((field.component(1)[3] - 0.5 * C64::cis(2.0 * x)).norm() < 1e-14);
        assert_eq!(field.t(), 0.0);
    }

    struct Claim(usize);

    impl Hooks for Claim {
        fn custom_segment(&mut self, _state: &mut RunState, seg: &SegmentDesc)
            -> RResult<bool>
        {
            self.0 += 1;
            Ok(seg.name == "nope")
        }
    }

    #[test]
    fn hook_can_claim_segments() {
        let p = params(r#"
            [[sequence]]
            name = "nope"

            [[sequence]]
            name = "freeprop"
            duration = [0.002]
        "#);
        let f = field(&p);
        let dir = tempfile::tempdir().unwrap();
        let mut ctrl
            = Controller::new(p, f, dir.path()).unwrap().with_hooks(Claim(0));
        ctrl.run().unwrap();
        assert!((ctrl.field().t() - 0.002).abs() < 1e-12);
    }

    #[test]
    fn snapshot_failure_only_abandons_segment() {
        let p = params(r#"
            [[sequence]]
            name = "freeprop"
            duration = [0.002]
            output_freq = "each"

            [[sequence]]
            name = "freeprop"
            duration = [0.003]
        "#);
        let f = field(&p);
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");
        let mut ctrl = Controller::new(p, f, &missing).unwrap();
        ctrl.run().unwrap();
        // first segment stops after its first outer step
        assert!((ctrl.field().t() - 0.004).abs() < 1e-12);
        let err: RunError
            = SnapshotError::Component(7).into();
        assert!(!err.is_fatal());
    }

    #[test]
    fn amplitude_formula_sees_field_time() {
        let mut p = params(FREEPROP);
        p.simulation.insert("AMP_T".to_string(), "2 * t + b".to_string());
        let f = field(&p);
        let dir = tempfile::tempdir().unwrap();
        let mut ctrl = Controller::new(p, f, dir.path()).unwrap();
        ctrl.state_mut().field.set_t(0.25);
        assert_eq!(ctrl.state().amp_scale(), 0.5);
    }
}
