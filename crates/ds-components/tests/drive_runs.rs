//! End-to-end runs of the demonstration plants.

use ds_components::{
    DcLinkParams, OpenLoopVoltage, PmsmDriveParams, RlLoad, SampleConfig, StiffInverter,
    assemble_pmsm_drive,
};
use ds_core::units::{henries, ohms, rad_per_s, s, volts, webers};
use ds_sim::{
    ExternalId, Model, ModulatorConfig, SimOptions, SimRecord, Simulation, ValueKind, run_sweep,
};

const T_S: f64 = 1e-4;
const W: f64 = 300.0;
const PSI: f64 = 0.5;

fn rl_model(r: f64, l: f64) -> (Model, ExternalId) {
    let mut b = Model::builder();
    let inv = b.add("inverter", StiffInverter::new(volts(540.0)).unwrap());
    let load = b.add("load", RlLoad::new(ohms(r), henries(l)).unwrap());
    let q = b.external("q", ValueKind::Phases);
    b.drive(q, inv, "q_cs");
    b.connect(inv, "u_cs", load, "u_s");
    (b.build().unwrap(), q)
}

fn open_loop() -> OpenLoopVoltage {
    let sample = SampleConfig::new(s(T_S)).unwrap();
    OpenLoopVoltage::new(sample, rad_per_s(W), s(0.0), webers(PSI), volts(540.0)).unwrap()
}

/// Mean current magnitude over the logged entries after `t_from`.
fn mean_current(record: &SimRecord, t_from: f64) -> f64 {
    let re = record.column_by_label("load.i_s.re").unwrap();
    let im = record.column_by_label("load.i_s.im").unwrap();
    let tail: Vec<f64> = record
        .t
        .iter()
        .zip(re.iter().zip(&im))
        .filter(|(t, _)| **t >= t_from)
        .map(|(_, (a, b))| a.hypot(*b))
        .collect();
    tail.iter().sum::<f64>() / tail.len() as f64
}

fn rl_run(r: f64, modulator: ModulatorConfig) -> f64 {
    let (model, q) = rl_model(r, 0.01);
    let opts = SimOptions {
        t_stop: 0.1,
        modulator,
        ..SimOptions::default()
    };
    let mut sim = Simulation::new(model, q, open_loop(), opts).unwrap();
    let report = sim.simulate();
    assert!(report.outcome.is_completed(), "{:?}", report.outcome);
    mean_current(sim.record(), 0.08)
}

fn steady_state_amplitude(r: f64, l: f64) -> f64 {
    PSI * W / (r * r + (W * l) * (W * l)).sqrt()
}

#[test]
fn averaged_rl_current_matches_phasor_solution() {
    let i = rl_run(1.0, ModulatorConfig::ZeroOrderHold);
    let expected = steady_state_amplitude(1.0, 0.01);
    assert!((i - expected).abs() < 0.01 * expected, "{i} vs {expected}");
}

#[test]
fn switched_rl_current_matches_within_ripple() {
    let i = rl_run(1.0, ModulatorConfig::default());
    let expected = steady_state_amplitude(1.0, 0.01);
    assert!((i - expected).abs() < 0.05 * expected, "{i} vs {expected}");
}

#[test]
fn sweep_over_load_resistance() {
    let resistances = vec![0.5, 1.0, 2.0, 4.0];
    let currents = run_sweep(resistances.clone(), |r| {
        rl_run(r, ModulatorConfig::ZeroOrderHold)
    });
    assert_eq!(currents.len(), resistances.len());
    for (r, i) in resistances.iter().zip(&currents) {
        let expected = steady_state_amplitude(*r, 0.01);
        assert!((i - expected).abs() < 0.01 * expected);
    }
    assert!(currents.windows(2).all(|w| w[0] > w[1]));
}

#[test]
fn pmsm_drive_runs_open_loop_start() {
    let drive = assemble_pmsm_drive(&PmsmDriveParams::default()).unwrap();
    let sample = SampleConfig::new(s(T_S)).unwrap();
    let controller = OpenLoopVoltage::new(
        sample,
        rad_per_s(2.0 * std::f64::consts::PI * 10.0),
        s(0.05),
        webers(0.545),
        volts(540.0),
    )
    .unwrap();
    let opts = SimOptions {
        t_stop: 0.05,
        ..SimOptions::default()
    };
    let mut sim = Simulation::new(drive.model, drive.switching, controller, opts).unwrap();
    let report = sim.simulate();
    assert!(report.outcome.is_completed(), "{:?}", report.outcome);
    assert!(!sim.record().is_empty());
    assert!(sim.record().x.iter().all(|x| x.iter().all(|v| v.is_finite())));
    assert!(sim.record().column_by_label("mechanics.w_m").is_some());
}

#[test]
fn dc_link_drive_with_measured_bus() {
    let params = PmsmDriveParams {
        dc_link: Some(DcLinkParams {
            c_dc: 1e-3,
            r_g: 0.1,
        }),
        ..PmsmDriveParams::default()
    };
    let drive = assemble_pmsm_drive(&params).unwrap();
    let sample = SampleConfig::new(s(T_S)).unwrap();
    let controller = OpenLoopVoltage::new(
        sample,
        rad_per_s(2.0 * std::f64::consts::PI * 10.0),
        s(0.05),
        webers(0.545),
        volts(540.0),
    )
    .unwrap()
    .with_measured_dc_bus(drive.converter);
    let opts = SimOptions {
        t_stop: 0.02,
        ..SimOptions::default()
    };
    let mut sim = Simulation::new(drive.model, drive.switching, controller, opts).unwrap();
    let report = sim.simulate();
    assert!(report.outcome.is_completed(), "{:?}", report.outcome);
    let u_dc = sim.record().column_by_label("converter.u_dc").unwrap();
    assert!(u_dc.iter().all(|u| u.is_finite() && *u > 0.0));
}
