//! Simulation driver and run options.
//!
//! One sampling period runs through
//! controller -> delay -> modulator -> per-segment integration -> commit.
//! Each non-empty switching segment is integrated with the converter
//! switching state held fixed; the accepted sub-steps are appended to the
//! log only once the whole segment succeeded.

use nalgebra::DVector;
use tracing::{debug, info, trace, warn};

use ds_core::ExternalId;

use crate::controller::Controller;
use crate::delay::Delay;
use crate::error::{SimError, SimResult};
use crate::integrator::{DormandPrince, ForwardEuler, Integrator, RK4, Sample};
use crate::model::Model;
use crate::pwm::{DutyRatios, Modulator, ModulatorConfig, Segment};
use crate::record::SimRecord;
use crate::signal::ValueKind;

/// Integrator selection for simulation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum IntegratorType {
    /// Adaptive Dormand-Prince 5(4) (default).
    #[default]
    DormandPrince,
    /// 4th-order Runge-Kutta, fixed sub-steps bounded by `max_step`.
    #[cfg_attr(feature = "serde", serde(rename = "rk4"))]
    RK4,
    /// Forward Euler, fixed sub-steps bounded by `max_step`.
    ForwardEuler,
}

/// Options for simulation runs.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SimOptions {
    /// Stop time (seconds); periods start while `t <= t_stop`.
    pub t_stop: f64,
    /// Integrator type (default: DormandPrince)
    pub integrator: IntegratorType,
    /// Relative tolerance of the adaptive integrator
    pub rtol: f64,
    /// Absolute tolerance of the adaptive integrator
    pub atol: f64,
    /// Upper bound on integrator sub-steps (seconds); `None` is unbounded
    pub max_step: Option<f64>,
    /// Controller-to-converter delay in sampling periods
    pub delay: usize,
    pub modulator: ModulatorConfig,
}

impl Default for SimOptions {
    fn default() -> Self {
        Self {
            t_stop: 1.0,
            integrator: IntegratorType::default(),
            rtol: 1e-6,
            atol: 1e-8,
            max_step: None,
            delay: 1,
            modulator: ModulatorConfig::default(),
        }
    }
}

impl SimOptions {
    fn max_step(&self) -> f64 {
        self.max_step.unwrap_or(f64::INFINITY)
    }

    fn validate(&self) -> SimResult<()> {
        if !self.t_stop.is_finite() || self.t_stop < 0.0 {
            return Err(SimError::InvalidArg {
                what: "t_stop must be finite and non-negative",
            });
        }
        DormandPrince::new(self.rtol, self.atol, self.max_step())?;
        Ok(())
    }

    fn integrate(
        &self,
        model: &mut Model,
        t0: f64,
        x0: &DVector<f64>,
        duration: f64,
    ) -> SimResult<Vec<Sample>> {
        let max_step = self.max_step();
        match self.integrator {
            IntegratorType::DormandPrince => DormandPrince {
                rtol: self.rtol,
                atol: self.atol,
                max_step,
                ..DormandPrince::default()
            }
            .integrate(model, t0, x0, duration),
            IntegratorType::RK4 => RK4 { max_step }.integrate(model, t0, x0, duration),
            IntegratorType::ForwardEuler => {
                ForwardEuler { max_step }.integrate(model, t0, x0, duration)
            }
        }
    }
}

/// Where the driver is in its per-period cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SimPhase {
    Idle,
    ControllerStep,
    DelayStep,
    SegmentIntegrate,
    Commit,
    Done,
    Aborted,
}

/// How a `simulate()` call ended.
#[derive(Clone, Debug, PartialEq)]
pub enum SimOutcome {
    /// Simulated time passed the stop time.
    Completed,
    /// A period failed; everything committed before `t` is kept.
    Aborted { t: f64, reason: SimError },
}

impl SimOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Summary of one `simulate()` call.
#[derive(Clone, Debug, PartialEq)]
pub struct SimReport {
    pub outcome: SimOutcome,
    /// Simulated time when the call returned
    pub t: f64,
    /// Controller invocations
    pub periods: usize,
    /// Non-empty segments committed
    pub segments: usize,
    /// Integrator sub-steps logged
    pub steps: usize,
}

/// Drives a [`Model`] with a sampled controller through a modulator.
pub struct Simulation<C> {
    model: Model,
    controller: C,
    switching: ExternalId,
    delay: Delay<DutyRatios>,
    modulator: Box<dyn Modulator>,
    opts: SimOptions,
    x_init: DVector<f64>,
    t: f64,
    phase: SimPhase,
    record: SimRecord,
}

#[derive(Default)]
struct Counters {
    periods: usize,
    segments: usize,
    steps: usize,
}

impl<C: Controller> Simulation<C> {
    /// Set up a run; `switching` is the external input that carries the
    /// converter switching state and must be of kind `Phases`.
    pub fn new(
        mut model: Model,
        switching: ExternalId,
        controller: C,
        opts: SimOptions,
    ) -> SimResult<Self> {
        opts.validate()?;
        let kind = model.external_kind(switching)?;
        if kind != ValueKind::Phases {
            return Err(SimError::KindMismatch {
                signal: "switching state".to_string(),
                expected: ValueKind::Phases,
                found: kind,
            });
        }
        let delay = Delay::new(opts.delay)?;
        let modulator = opts.modulator.build()?;
        // Outputs must be valid before the first controller call.
        model.refresh(0.0)?;
        let record = SimRecord::new(model.state_labels());
        let x_init = model.get_state_vector();

        Ok(Self {
            model,
            controller,
            switching,
            delay,
            modulator,
            opts,
            x_init,
            t: 0.0,
            phase: SimPhase::Idle,
            record,
        })
    }

    /// Replace the modulator built from the options.
    pub fn with_modulator(mut self, modulator: Box<dyn Modulator>) -> Self {
        self.modulator = modulator;
        self
    }

    /// Replace the delay built from the options.
    pub fn with_delay(mut self, delay: Delay<DutyRatios>) -> Self {
        self.delay = delay;
        self
    }

    /// Run until simulated time exceeds the stop time or a period fails.
    ///
    /// Never returns an error: a failure ends the call with
    /// [`SimOutcome::Aborted`] and the log keeps every committed segment.
    /// Calling again resumes from the last committed state.
    pub fn simulate(&mut self) -> SimReport {
        let mut counters = Counters::default();
        info!(
            t_start = self.t,
            t_stop = self.opts.t_stop,
            dim = self.model.dim(),
            integrator = ?self.opts.integrator,
            "simulation started"
        );

        self.phase = SimPhase::Idle;
        while self.t <= self.opts.t_stop {
            if let Err(reason) = self.period(&mut counters) {
                self.phase = SimPhase::Aborted;
                warn!(t = self.t, %reason, "simulation aborted");
                return self.report(SimOutcome::Aborted { t: self.t, reason }, counters);
            }
        }

        self.phase = SimPhase::Done;
        info!(
            t = self.t,
            periods = counters.periods,
            steps = counters.steps,
            "simulation finished"
        );
        self.report(SimOutcome::Completed, counters)
    }

    fn report(&self, outcome: SimOutcome, counters: Counters) -> SimReport {
        SimReport {
            outcome,
            t: self.t,
            periods: counters.periods,
            segments: counters.segments,
            steps: counters.steps,
        }
    }

    fn period(&mut self, counters: &mut Counters) -> SimResult<()> {
        self.phase = SimPhase::ControllerStep;
        self.model.refresh(self.t)?;
        let cmd = self.controller.control(self.t, &self.model)?;
        if !cmd.t_s.is_finite() || cmd.t_s <= 0.0 {
            return Err(SimError::InvalidArg {
                what: "sampling period must be positive and finite",
            });
        }
        if cmd.duty.iter().any(|d| !d.is_finite()) {
            return Err(SimError::NonFinite {
                what: "duty ratio reference",
                t: self.t,
            });
        }
        counters.periods += 1;

        self.phase = SimPhase::DelayStep;
        let duty = self.delay.call(cmd.duty);
        debug!(t = self.t, t_s = cmd.t_s, ?duty, "sampling period");

        self.phase = SimPhase::SegmentIntegrate;
        let segments = self.modulator.segments(cmd.t_s, duty);
        let t_start = self.t;
        for segment in segments.iter().filter(|s| s.duration > 0.0) {
            self.segment(segment, counters)?;
        }
        if self.t <= t_start {
            return Err(SimError::InvalidArg {
                what: "modulator produced no time advance",
            });
        }
        Ok(())
    }

    fn segment(&mut self, segment: &Segment, counters: &mut Counters) -> SimResult<()> {
        self.phase = SimPhase::SegmentIntegrate;
        self.model.set_external(self.switching, segment.q.phases())?;
        let x0 = self.model.get_state_vector();

        let samples = match self
            .opts
            .integrate(&mut self.model, self.t, &x0, segment.duration)
        {
            Ok(samples) => samples,
            Err(err) => {
                // Trial evaluations leave the last trial state in the model.
                self.model.set_state_vector(&x0)?;
                return Err(err);
            }
        };

        self.phase = SimPhase::Commit;
        if let Some(last) = samples.last() {
            self.model.set_state_vector(&last.x)?;
        }
        trace!(
            t = self.t,
            duration = segment.duration,
            q = ?segment.q.phases(),
            steps = samples.len(),
            "segment committed"
        );
        counters.segments += 1;
        counters.steps += samples.len();
        for sample in samples {
            self.record.push(sample.t, sample.x, segment.q);
        }
        self.t += segment.duration;
        Ok(())
    }

    /// Rewind to t = 0: initial model state, zero switching state, zero-filled
    /// delay, initial carrier edge, reset controller and an empty log.
    pub fn reset(&mut self) -> SimResult<()> {
        self.model.set_state_vector(&self.x_init)?;
        self.model.set_external(self.switching, [0.0; 3])?;
        self.model.refresh(0.0)?;
        self.delay.reset();
        self.modulator.reset();
        self.controller.reset();
        self.record = SimRecord::new(self.model.state_labels());
        self.t = 0.0;
        self.phase = SimPhase::Idle;
        debug!("simulation reset");
        Ok(())
    }

    pub fn phase(&self) -> SimPhase {
        self.phase
    }

    /// Current simulated time (seconds).
    pub fn time(&self) -> f64 {
        self.t
    }

    pub fn options(&self) -> &SimOptions {
        &self.opts
    }

    /// Move the stop time, e.g. to continue a finished run.
    pub fn set_stop_time(&mut self, t_stop: f64) -> SimResult<()> {
        if !t_stop.is_finite() || t_stop < 0.0 {
            return Err(SimError::InvalidArg {
                what: "t_stop must be finite and non-negative",
            });
        }
        self.opts.t_stop = t_stop;
        Ok(())
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Mutable model access between runs.
    ///
    /// Changing state here becomes the starting point of the next period.
    pub fn model_mut(&mut self) -> &mut Model {
        &mut self.model
    }

    pub fn controller(&self) -> &C {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut C {
        &mut self.controller
    }

    pub fn record(&self) -> &SimRecord {
        &self.record
    }

    /// Take the log, leaving an empty one with the same labels.
    pub fn take_record(&mut self) -> SimRecord {
        let labels = self.record.labels.clone();
        std::mem::replace(&mut self.record, SimRecord::new(labels))
    }

    pub fn into_parts(self) -> (Model, C, SimRecord) {
        (self.model, self.controller, self.record)
    }
}

impl<C> std::fmt::Debug for Simulation<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("model", &self.model)
            .field("t", &self.t)
            .field("phase", &self.phase)
            .field("opts", &self.opts)
            .field("logged", &self.record.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::ControlCommand;
    use crate::pwm::ZeroOrderHold;
    use crate::signal::{SignalDecl, Signals, SignalsMut, Value};
    use crate::subsystem::Subsystem;

    /// First-order filter of phase a of the switching state:
    /// dx/dt = (q_a - x) / tau
    struct Filter {
        tau: f64,
    }

    impl Subsystem for Filter {
        fn states(&self) -> &[SignalDecl] {
            const S: [SignalDecl; 1] = [SignalDecl::real("x")];
            &S
        }
        fn inputs(&self) -> &[SignalDecl] {
            const I: [SignalDecl; 1] = [SignalDecl::phases("q")];
            &I
        }
        fn outputs(&self) -> &[SignalDecl] {
            const O: [SignalDecl; 1] = [SignalDecl::real("x")];
            &O
        }
        fn initial_state(&self) -> Vec<Value> {
            vec![Value::Real(0.0)]
        }
        fn compute_outputs(
            &self,
            _t: f64,
            state: &Signals<'_>,
            _input: &Signals<'_>,
            output: &mut SignalsMut<'_>,
        ) -> SimResult<()> {
            output.set(0, state.real(0)?)
        }
        fn rhs(
            &self,
            _t: f64,
            state: &Signals<'_>,
            input: &Signals<'_>,
            _output: &Signals<'_>,
            derivative: &mut SignalsMut<'_>,
        ) -> SimResult<()> {
            let q = input.phases(0)?;
            derivative.set(0, (q[0] - state.real(0)?) / self.tau)
        }
    }

    fn filter_model() -> (Model, ExternalId) {
        let mut b = Model::builder();
        let f = b.add("filter", Filter { tau: 1e-3 });
        let q = b.external("q", ValueKind::Phases);
        b.drive(q, f, "q");
        (b.build().unwrap(), q)
    }

    /// Binary fraction so accumulated time stays exact.
    const T_S: f64 = 1.0 / 1024.0;

    fn constant(
        t_s: f64,
        duty: DutyRatios,
    ) -> impl FnMut(f64, &Model) -> SimResult<ControlCommand> {
        move |_t: f64, _model: &Model| -> SimResult<ControlCommand> {
            Ok(ControlCommand::new(t_s, duty))
        }
    }

    fn euler_opts(t_stop: f64) -> SimOptions {
        SimOptions {
            t_stop,
            integrator: IntegratorType::ForwardEuler,
            ..SimOptions::default()
        }
    }

    #[test]
    fn sim_options_defaults() {
        let opts = SimOptions::default();
        assert_eq!(opts.t_stop, 1.0);
        assert_eq!(opts.integrator, IntegratorType::DormandPrince);
        assert_eq!(opts.delay, 1);
        assert_eq!(opts.max_step, None);
    }

    #[test]
    fn invalid_options_fail_at_construction() {
        let (model, q) = filter_model();
        let opts = SimOptions {
            t_stop: -1.0,
            ..SimOptions::default()
        };
        assert!(Simulation::new(model, q, constant(1e-4, [0.5; 3]), opts).is_err());

        let (model, q) = filter_model();
        let opts = SimOptions {
            delay: 0,
            ..SimOptions::default()
        };
        assert!(Simulation::new(model, q, constant(1e-4, [0.5; 3]), opts).is_err());
    }

    #[test]
    fn zero_segments_are_not_logged() {
        let (model, q) = filter_model();
        let opts = euler_opts(10.0 * T_S);
        let mut sim = Simulation::new(model, q, constant(T_S, [0.5; 3]), opts).unwrap();
        let report = sim.simulate();
        assert!(report.outcome.is_completed());
        assert_eq!(sim.phase(), SimPhase::Done);

        // t = 0, T_S, ..., 10 T_S all start a period (11 periods). The first
        // period sees the zero fill of the delay: one all-off segment.
        // Every later period has two non-empty segments.
        assert_eq!(report.periods, 11);
        assert_eq!(report.segments, 1 + 2 * 10);
        assert_eq!(sim.record().len(), report.steps);
        assert_eq!(report.steps, report.segments);
        assert_eq!(sim.time(), 11.0 * T_S);
        assert!(sim.record().t.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn delay_holds_zero_for_first_period() {
        let (model, q) = filter_model();
        let opts = euler_opts(1e-4);
        let mut sim = Simulation::new(model, q, constant(1e-4, [1.0; 3]), opts).unwrap();
        sim.simulate();
        let record = sim.record();
        assert_eq!(record.q[0].phases(), [0.0; 3]);
        assert_eq!(record.x[0][0], 0.0);
        assert_eq!(record.q.last().unwrap().phases(), [1.0; 3]);
        assert!(record.x.last().unwrap()[0] > 0.0);
    }

    #[test]
    fn zero_order_hold_logs_one_segment_per_period() {
        let (model, q) = filter_model();
        let opts = euler_opts(8.0 * T_S);
        let mut sim = Simulation::new(model, q, constant(2.0 * T_S, [0.25; 3]), opts)
            .unwrap()
            .with_modulator(Box::new(ZeroOrderHold));
        let report = sim.simulate();
        assert_eq!(report.periods, 5);
        assert_eq!(report.segments, 5);
    }

    #[test]
    fn bad_sampling_period_aborts_without_error() {
        let (model, q) = filter_model();
        let mut calls = 0;
        let controller = move |_t: f64, _m: &Model| -> SimResult<ControlCommand> {
            calls += 1;
            let t_s = if calls > 3 { 0.0 } else { 1e-4 };
            Ok(ControlCommand::new(t_s, [0.5; 3]))
        };
        let mut sim = Simulation::new(model, q, controller, euler_opts(1.0)).unwrap();
        let report = sim.simulate();
        assert_eq!(sim.phase(), SimPhase::Aborted);
        match report.outcome {
            SimOutcome::Aborted { t, reason } => {
                assert!((t - 3e-4).abs() < 1e-15);
                assert!(matches!(reason, SimError::InvalidArg { .. }));
            }
            SimOutcome::Completed => panic!("expected abort"),
        }
        assert_eq!(sim.record().len(), 1 + 2 + 2);
    }

    #[test]
    fn controller_error_aborts() {
        let (model, q) = filter_model();
        let controller = |_t: f64, _m: &Model| -> SimResult<ControlCommand> {
            Err(SimError::Controller {
                message: "estimator diverged".into(),
            })
        };
        let mut sim = Simulation::new(model, q, controller, euler_opts(1.0)).unwrap();
        let report = sim.simulate();
        assert!(!report.outcome.is_completed());
        assert_eq!(report.periods, 0);
        assert!(sim.record().is_empty());
    }

    #[test]
    fn controller_sees_committed_outputs() {
        let (model, q) = filter_model();
        let filter = model.subsystem_id("filter").unwrap();
        let mut seen = Vec::new();
        let controller = move |_t: f64, m: &Model| -> SimResult<ControlCommand> {
            seen.push(m.output(filter, "x").and_then(|v| v.as_real()));
            let x = m.state(filter, "x").and_then(|v| v.as_real());
            assert_eq!(seen.last().copied().flatten(), x);
            Ok(ControlCommand::new(1e-4, [1.0; 3]))
        };
        let mut sim = Simulation::new(model, q, controller, euler_opts(5e-4)).unwrap();
        assert!(sim.simulate().outcome.is_completed());
    }

    #[test]
    fn simulate_resumes_after_done() {
        let (model, q) = filter_model();
        let opts = euler_opts(2e-4);
        let mut sim = Simulation::new(model, q, constant(1e-4, [0.5; 3]), opts).unwrap();
        sim.simulate();
        let logged = sim.record().len();
        let t = sim.time();
        sim.set_stop_time(5e-4).unwrap();
        let report = sim.simulate();
        assert!(report.outcome.is_completed());
        assert!(sim.record().len() > logged);
        assert!(sim.record().t[logged] > t);
        assert!(sim.set_stop_time(f64::NAN).is_err());
    }

    #[test]
    fn adaptive_run_tracks_filter_response() {
        let (model, q) = filter_model();
        let opts = SimOptions {
            t_stop: 5e-3,
            delay: 1,
            modulator: ModulatorConfig::ZeroOrderHold,
            ..SimOptions::default()
        };
        let mut sim = Simulation::new(model, q, constant(1e-4, [1.0; 3]), opts).unwrap();
        sim.simulate();
        // Zero input during the first period, then a unit step.
        let filter = sim.model().subsystem_id("filter").unwrap();
        let x = sim.model().state(filter, "x").and_then(|v| v.as_real()).unwrap();
        let expected = 1.0 - (-(sim.time() - 1e-4) / 1e-3).exp();
        assert!((x - expected).abs() < 1e-5);
    }

    #[test]
    fn tiny_fixed_max_step_aborts_instead_of_panicking() {
        let (model, q) = filter_model();
        let opts = SimOptions {
            t_stop: 4.0 * T_S,
            integrator: IntegratorType::RK4,
            max_step: Some(1e-300),
            ..SimOptions::default()
        };
        let mut sim = Simulation::new(model, q, constant(T_S, [0.5; 3]), opts).unwrap();
        let report = sim.simulate();
        match report.outcome {
            SimOutcome::Aborted { t, reason } => {
                assert_eq!(t, 0.0);
                assert!(matches!(reason, SimError::StepSizeTooSmall { .. }));
            }
            SimOutcome::Completed => panic!("expected abort"),
        }
        assert_eq!(sim.phase(), SimPhase::Aborted);
        assert!(sim.record().is_empty());
    }

    /// Counts its calls and alternates the duty ratio between periods.
    struct Toggling {
        calls: usize,
    }

    impl Controller for Toggling {
        fn control(&mut self, _t: f64, _model: &Model) -> SimResult<ControlCommand> {
            self.calls += 1;
            let d = if self.calls % 2 == 0 { 0.75 } else { 0.25 };
            Ok(ControlCommand::new(T_S, [d, 0.5, 1.0 - d]))
        }

        fn reset(&mut self) {
            self.calls = 0;
        }
    }

    #[test]
    fn reset_replays_the_same_run() {
        let (model, q) = filter_model();
        let opts = SimOptions {
            t_stop: 6.0 * T_S,
            delay: 2,
            ..SimOptions::default()
        };
        let mut sim = Simulation::new(model, q, Toggling { calls: 0 }, opts).unwrap();
        let first = sim.simulate();
        let record = sim.take_record();

        sim.reset().unwrap();
        assert_eq!(sim.time(), 0.0);
        assert_eq!(sim.phase(), SimPhase::Idle);
        assert_eq!(sim.controller().calls, 0);
        assert!(sim.record().is_empty());

        let second = sim.simulate();
        assert_eq!(first, second);
        assert_eq!(sim.record().t, record.t);
        assert_eq!(sim.record().x, record.x);
        assert_eq!(sim.record().q, record.q);
    }
}
