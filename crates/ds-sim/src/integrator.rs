//! Time integrators for one switching segment.
//!
//! Every integrator advances a [`TransientModel`] from `t0` across a fixed
//! `duration` and reports each sub-step it accepted. The last sample always
//! lands exactly on `t0 + duration`.

use nalgebra::DVector;

use ds_core::first_non_finite;

use crate::error::{SimError, SimResult};
use crate::model::TransientModel;

/// One accepted integrator sub-step.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub t: f64,
    pub x: DVector<f64>,
}

/// Trait for time integrators.
pub trait Integrator {
    /// Integrate `model` from `(t0, x0)` over `duration`.
    ///
    /// A zero duration takes no steps and returns no samples.
    fn integrate<M: TransientModel + ?Sized>(
        &self,
        model: &mut M,
        t0: f64,
        x0: &DVector<f64>,
        duration: f64,
    ) -> SimResult<Vec<Sample>>;
}

fn check_duration(duration: f64) -> SimResult<()> {
    if !duration.is_finite() || duration < 0.0 {
        return Err(SimError::InvalidArg {
            what: "segment duration must be finite and non-negative",
        });
    }
    Ok(())
}

/// Evaluate the right-hand side and reject NaN/inf.
fn eval<M: TransientModel + ?Sized>(
    model: &mut M,
    t: f64,
    x: &DVector<f64>,
) -> SimResult<DVector<f64>> {
    let dx = model.rhs(t, x)?;
    if first_non_finite(dx.as_slice()).is_some() {
        return Err(SimError::NonFinite {
            what: "state derivative",
            t,
        });
    }
    Ok(dx)
}

fn check_state(x: &DVector<f64>, t: f64) -> SimResult<()> {
    if first_non_finite(x.as_slice()).is_some() {
        return Err(SimError::NonFinite { what: "state", t });
    }
    Ok(())
}

/// Upper bound on fixed sub-steps per segment.
const MAX_SUBSTEPS: f64 = 1e7;

/// Split `duration` into equal sub-steps no longer than `max_step`.
fn substeps(t0: f64, duration: f64, max_step: f64) -> SimResult<usize> {
    if !(max_step.is_finite() && max_step > 0.0) {
        return Ok(1);
    }
    let n = (duration / max_step).ceil();
    if !n.is_finite() || n > MAX_SUBSTEPS {
        tracing::warn!(t = t0, duration, max_step, "too many fixed sub-steps");
        return Err(SimError::StepSizeTooSmall { t: t0, h: max_step });
    }
    Ok((n as usize).max(1))
}

/// Drive a fixed-step update rule across a segment.
fn fixed_steps<M, F>(
    model: &mut M,
    t0: f64,
    x0: &DVector<f64>,
    duration: f64,
    max_step: f64,
    mut step: F,
) -> SimResult<Vec<Sample>>
where
    M: TransientModel + ?Sized,
    F: FnMut(&mut M, f64, &DVector<f64>, f64) -> SimResult<DVector<f64>>,
{
    check_duration(duration)?;
    if duration == 0.0 {
        return Ok(Vec::new());
    }
    let n = substeps(t0, duration, max_step)?;
    let h = duration / n as f64;
    let mut samples = Vec::new();
    let mut x = x0.clone();
    for i in 0..n {
        let t = t0 + i as f64 * h;
        x = step(model, t, &x, h)?;
        let t_next = if i + 1 == n {
            t0 + duration
        } else {
            t0 + (i + 1) as f64 * h
        };
        check_state(&x, t_next)?;
        samples.push(Sample {
            t: t_next,
            x: x.clone(),
        });
    }
    Ok(samples)
}

/// Classical RK4 (Runge-Kutta 4th order) integrator.
///
/// Each segment is split into equal sub-steps no longer than `max_step`; an
/// infinite `max_step` takes the whole segment in one step.
#[derive(Clone, Debug)]
pub struct RK4 {
    pub max_step: f64,
}

impl Default for RK4 {
    fn default() -> Self {
        Self {
            max_step: f64::INFINITY,
        }
    }
}

impl Integrator for RK4 {
    fn integrate<M: TransientModel + ?Sized>(
        &self,
        model: &mut M,
        t0: f64,
        x0: &DVector<f64>,
        duration: f64,
    ) -> SimResult<Vec<Sample>> {
        fixed_steps(model, t0, x0, duration, self.max_step, |model, t, x, h| {
            let k1 = eval(model, t, x)?;
            let k2 = eval(model, t + 0.5 * h, &(x + 0.5 * h * &k1))?;
            let k3 = eval(model, t + 0.5 * h, &(x + 0.5 * h * &k2))?;
            let k4 = eval(model, t + h, &(x + h * &k3))?;
            Ok(x + (h / 6.0) * (k1 + 2.0 * k2 + 2.0 * k3 + k4))
        })
    }
}

/// Forward Euler (explicit, 1st order, fast for testing).
/// Calls rhs() once per step instead of 4 times (RK4).
#[derive(Clone, Debug)]
pub struct ForwardEuler {
    pub max_step: f64,
}

impl Default for ForwardEuler {
    fn default() -> Self {
        Self {
            max_step: f64::INFINITY,
        }
    }
}

impl Integrator for ForwardEuler {
    fn integrate<M: TransientModel + ?Sized>(
        &self,
        model: &mut M,
        t0: f64,
        x0: &DVector<f64>,
        duration: f64,
    ) -> SimResult<Vec<Sample>> {
        fixed_steps(model, t0, x0, duration, self.max_step, |model, t, x, h| {
            let dx = eval(model, t, x)?;
            Ok(x + h * dx)
        })
    }
}

const DP_C: [f64; 7] = [0.0, 1.0 / 5.0, 3.0 / 10.0, 4.0 / 5.0, 8.0 / 9.0, 1.0, 1.0];

#[rustfmt::skip]
const DP_A: [&[f64]; 6] = [
    &[1.0/5.0],
    &[3.0/40.0, 9.0/40.0],
    &[44.0/45.0, -56.0/15.0, 32.0/9.0],
    &[19372.0/6561.0, -25360.0/2187.0, 64448.0/6561.0, -212.0/729.0],
    &[9017.0/3168.0, -355.0/33.0, 46732.0/5247.0, 49.0/176.0, -5103.0/18656.0],
    &[35.0/384.0, 0.0, 500.0/1113.0, 125.0/192.0, -2187.0/6784.0, 11.0/84.0],
];

/// Difference between the 5th and embedded 4th order weights.
const DP_ERR: [f64; 7] = [
    71.0 / 57600.0,
    0.0,
    -71.0 / 16695.0,
    71.0 / 1920.0,
    -17253.0 / 339200.0,
    22.0 / 525.0,
    -1.0 / 40.0,
];

/// Dormand-Prince 5(4) adaptive Runge-Kutta integrator.
///
/// Local error is measured in the max norm scaled by
/// `atol + rtol * |x|`; a step is accepted when that norm is at most one.
/// The next step is rescaled by `0.9 * err^(-1/5)`, clipped to `[0.1, 10]`
/// and to `max_step`.
#[derive(Clone, Debug)]
pub struct DormandPrince {
    pub rtol: f64,
    pub atol: f64,
    /// Upper bound on any sub-step; infinite means unbounded.
    pub max_step: f64,
    /// Smallest step tried before giving up with `StepSizeTooSmall`.
    pub min_step: f64,
}

impl Default for DormandPrince {
    fn default() -> Self {
        Self {
            rtol: 1e-6,
            atol: 1e-8,
            max_step: f64::INFINITY,
            min_step: 1e-14,
        }
    }
}

impl DormandPrince {
    const SAFETY: f64 = 0.9;

    pub fn new(rtol: f64, atol: f64, max_step: f64) -> SimResult<Self> {
        if !(rtol.is_finite() && rtol > 0.0) {
            return Err(SimError::InvalidArg {
                what: "rtol must be positive",
            });
        }
        if !(atol.is_finite() && atol > 0.0) {
            return Err(SimError::InvalidArg {
                what: "atol must be positive",
            });
        }
        if max_step.is_nan() || max_step <= 0.0 {
            return Err(SimError::InvalidArg {
                what: "max_step must be positive",
            });
        }
        Ok(Self {
            rtol,
            atol,
            max_step,
            ..Self::default()
        })
    }

    /// Take one trial step; returns the candidate state and its error norm.
    fn trial<M: TransientModel + ?Sized>(
        &self,
        model: &mut M,
        t: f64,
        x: &DVector<f64>,
        h: f64,
    ) -> SimResult<(DVector<f64>, f64)> {
        let mut k: Vec<DVector<f64>> = Vec::with_capacity(7);
        k.push(eval(model, t, x)?);
        // The last row is the propagated 5th order solution (FSAL).
        let mut x_new = x.clone();
        for (stage, row) in DP_A.iter().enumerate() {
            x_new.copy_from(x);
            for (coef, ki) in row.iter().zip(&k) {
                if *coef != 0.0 {
                    x_new.axpy(h * coef, ki, 1.0);
                }
            }
            k.push(eval(model, t + DP_C[stage + 1] * h, &x_new)?);
        }

        let mut err = DVector::zeros(x.len());
        for (coef, ki) in DP_ERR.iter().zip(&k) {
            err.axpy(h * coef, ki, 1.0);
        }
        let norm = err
            .iter()
            .zip(x.iter().zip(x_new.iter()))
            .map(|(e, (a, b))| e.abs() / (self.atol + self.rtol * a.abs().max(b.abs())))
            .fold(0.0_f64, f64::max);
        Ok((x_new, norm))
    }
}

impl Integrator for DormandPrince {
    fn integrate<M: TransientModel + ?Sized>(
        &self,
        model: &mut M,
        t0: f64,
        x0: &DVector<f64>,
        duration: f64,
    ) -> SimResult<Vec<Sample>> {
        check_duration(duration)?;
        let t_end = t0 + duration;
        let mut samples = Vec::new();
        let mut t = t0;
        let mut x = x0.clone();
        let mut h = duration.min(self.max_step);

        while t < t_end {
            let remaining = t_end - t;
            let last = h >= remaining;
            let h_try = if last { remaining } else { h };
            let floor = self.min_step.max(16.0 * f64::EPSILON * t.abs());
            if !last && h_try < floor {
                tracing::warn!(t, h = h_try, "integrator step size collapsed");
                return Err(SimError::StepSizeTooSmall { t, h: h_try });
            }

            let (x_new, err) = self.trial(model, t, &x, h_try)?;
            if err.is_nan() {
                return Err(SimError::NonFinite {
                    what: "error estimate",
                    t,
                });
            }
            let scale = (Self::SAFETY * err.max(1e-16).powf(-0.2)).clamp(0.1, 10.0);

            if err <= 1.0 {
                t = if last { t_end } else { t + h_try };
                check_state(&x_new, t)?;
                x = x_new;
                samples.push(Sample { t, x: x.clone() });
                // Do not let a short final step shrink the next segment's guess.
                h = (h.max(h_try) * scale).min(self.max_step);
            } else {
                h = h_try * scale;
            }
        }
        Ok(samples)
    }
}
