//! Pulse-width modulation: duty ratios to timed converter switching states.
//!
//! [`CarrierComparison`] reproduces a symmetric triangular carrier compared
//! against three duty ratios, updated twice per carrier period. Each call
//! covers one half period and the carrier direction alternates between
//! calls, so two consecutive calls make up one full carrier cycle.
//! [`ZeroOrderHold`] skips the switching ripple and holds the duty ratios
//! themselves as an averaged switching state.

use ds_core::{Complex64, abc_to_complex};

use crate::error::{SimError, SimResult};

/// Per-phase duty ratios in `[0, 1]`.
pub type DutyRatios = [f64; 3];

/// Converter switching state, one entry per phase.
///
/// Entries are 0 or 1 for real switching states, or any value in `[0, 1]`
/// for an averaged state.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SwitchingState(pub [f64; 3]);

impl SwitchingState {
    pub fn phases(&self) -> [f64; 3] {
        self.0
    }

    /// Space vector of the switching state.
    pub fn space_vector(&self) -> Complex64 {
        abc_to_complex(self.0)
    }
}

impl From<SwitchingState> for [f64; 3] {
    fn from(q: SwitchingState) -> Self {
        q.0
    }
}

/// One interval over which the switching state is held.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Segment {
    pub duration: f64,
    pub q: SwitchingState,
}

/// Turns a sampling period and duty ratios into held switching states.
///
/// The returned durations always sum to `t_s`; segments may have zero
/// duration.
pub trait Modulator {
    fn segments(&mut self, t_s: f64, duty: DutyRatios) -> Vec<Segment>;

    /// Return to the state right after construction.
    fn reset(&mut self) {}
}

/// Direction of the carrier during the next half period.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum CarrierEdge {
    #[default]
    Rising,
    Falling,
}

impl CarrierEdge {
    pub fn flipped(self) -> Self {
        match self {
            Self::Rising => Self::Falling,
            Self::Falling => Self::Rising,
        }
    }
}

/// Double-update natural-sampling carrier comparison.
#[derive(Clone, Debug)]
pub struct CarrierComparison {
    levels: u32,
    initial_edge: CarrierEdge,
    edge: CarrierEdge,
}

impl Default for CarrierComparison {
    fn default() -> Self {
        Self {
            levels: Self::DEFAULT_LEVELS,
            initial_edge: CarrierEdge::default(),
            edge: CarrierEdge::default(),
        }
    }
}

impl CarrierComparison {
    /// Counter resolution of a 12-bit PWM timer.
    pub const DEFAULT_LEVELS: u32 = 1 << 12;

    /// Comparator with `levels` counter steps per half period.
    pub fn new(levels: u32) -> SimResult<Self> {
        if levels < 1 {
            return Err(SimError::InvalidArg {
                what: "carrier comparison needs at least one counter level",
            });
        }
        Ok(Self {
            levels,
            ..Self::default()
        })
    }

    /// Start with the given carrier direction instead of a rising edge.
    pub fn with_initial_edge(mut self, edge: CarrierEdge) -> Self {
        self.initial_edge = edge;
        self.edge = edge;
        self
    }

    pub fn levels(&self) -> u32 {
        self.levels
    }

    /// Carrier direction the next call will use.
    pub fn edge(&self) -> CarrierEdge {
        self.edge
    }

    /// Round a duty ratio to the counter resolution, saturating to `[0, 1]`.
    ///
    /// Half counts round to the even count.
    pub fn quantize(&self, d: f64) -> f64 {
        let n = f64::from(self.levels);
        (n * d.clamp(0.0, 1.0)).round_ties_even() / n
    }

    /// Switching segments of one half carrier period, then flip the edge.
    pub fn compare(&mut self, t_s: f64, duty: DutyRatios) -> [Segment; 4] {
        let d = duty.map(|x| self.quantize(x));

        let mut instants = [0.0, d[0], d[1], d[2]];
        instants[1..].sort_by(f64::total_cmp);

        let mut segments = [Segment {
            duration: 0.0,
            q: SwitchingState::default(),
        }; 4];
        for (i, segment) in segments.iter_mut().enumerate() {
            let end = instants.get(i + 1).copied().unwrap_or(1.0);
            segment.duration = t_s * (end - instants[i]);
            segment.q = SwitchingState(d.map(|dp| if instants[i] < dp { 1.0 } else { 0.0 }));
        }

        if self.edge == CarrierEdge::Rising {
            segments.reverse();
        }
        self.edge = self.edge.flipped();
        segments
    }
}

impl Modulator for CarrierComparison {
    fn segments(&mut self, t_s: f64, duty: DutyRatios) -> Vec<Segment> {
        self.compare(t_s, duty).to_vec()
    }

    fn reset(&mut self) {
        self.edge = self.initial_edge;
    }
}

/// Hold the duty ratios as an averaged switching state for the whole period.
#[derive(Clone, Copy, Debug, Default)]
pub struct ZeroOrderHold;

impl Modulator for ZeroOrderHold {
    fn segments(&mut self, t_s: f64, duty: DutyRatios) -> Vec<Segment> {
        vec![Segment {
            duration: t_s,
            q: SwitchingState(duty.map(|d| d.clamp(0.0, 1.0))),
        }]
    }
}

/// Serialisable modulator selection.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
pub enum ModulatorConfig {
    CarrierComparison {
        levels: u32,
        #[cfg_attr(feature = "serde", serde(default))]
        initial_edge: CarrierEdge,
    },
    ZeroOrderHold,
}

impl Default for ModulatorConfig {
    fn default() -> Self {
        Self::CarrierComparison {
            levels: CarrierComparison::DEFAULT_LEVELS,
            initial_edge: CarrierEdge::default(),
        }
    }
}

impl ModulatorConfig {
    pub fn build(&self) -> SimResult<Box<dyn Modulator>> {
        Ok(match self {
            Self::CarrierComparison {
                levels,
                initial_edge,
            } => Box::new(CarrierComparison::new(*levels)?.with_initial_edge(*initial_edge)),
            Self::ZeroOrderHold => Box::new(ZeroOrderHold),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ds_core::{Tolerances, nearly_equal};
    use proptest::prelude::*;

    const ON: SwitchingState = SwitchingState([1.0, 1.0, 1.0]);
    const OFF: SwitchingState = SwitchingState([0.0, 0.0, 0.0]);

    fn durations(segments: &[Segment]) -> Vec<f64> {
        segments.iter().map(|s| s.duration).collect()
    }

    #[test]
    fn equal_ratios_collapse_middle_segments() {
        let mut cc = CarrierComparison::default().with_initial_edge(CarrierEdge::Falling);
        let falling = cc.compare(1e-3, [0.5, 0.5, 0.5]);
        assert_eq!(durations(&falling), vec![0.0005, 0.0, 0.0, 0.0005]);
        assert_eq!(falling[0].q, ON);
        assert_eq!(falling[3].q, OFF);

        let rising = cc.compare(1e-3, [0.5, 0.5, 0.5]);
        let mut mirrored = rising;
        mirrored.reverse();
        assert_eq!(mirrored, falling);
        assert_eq!(cc.edge(), CarrierEdge::Falling);
    }

    #[test]
    fn full_and_zero_ratios_leave_one_segment() {
        let mut cc = CarrierComparison::default();
        for _ in 0..2 {
            let segments = cc.compare(2e-4, [1.0, 0.0, 0.0]);
            let active: Vec<_> = segments.iter().filter(|s| s.duration > 0.0).collect();
            assert_eq!(active.len(), 1);
            assert_eq!(active[0].duration, 2e-4);
            assert_eq!(active[0].q, SwitchingState([1.0, 0.0, 0.0]));
        }
    }

    #[test]
    fn distinct_ratios_give_staircase() {
        let mut cc = CarrierComparison::default().with_initial_edge(CarrierEdge::Falling);
        let s = cc.compare(1.0, [0.75, 0.25, 0.5]);
        assert_eq!(durations(&s), vec![0.25, 0.25, 0.25, 0.25]);
        assert_eq!(s[0].q, ON);
        assert_eq!(s[1].q, SwitchingState([1.0, 0.0, 1.0]));
        assert_eq!(s[2].q, SwitchingState([1.0, 0.0, 0.0]));
        assert_eq!(s[3].q, OFF);
    }

    #[test]
    fn default_starts_on_rising_edge() {
        let mut cc = CarrierComparison::default();
        assert_eq!(cc.edge(), CarrierEdge::Rising);
        let s = cc.compare(1.0, [0.75, 0.25, 0.5]);
        assert_eq!(s[0].q, OFF);
        assert_eq!(s[3].q, ON);
        assert_eq!(cc.edge(), CarrierEdge::Falling);
        cc.reset();
        assert_eq!(cc.edge(), CarrierEdge::Rising);
    }

    #[test]
    fn ratios_are_quantized_and_saturated() {
        let cc = CarrierComparison::new(4).unwrap();
        assert_eq!(cc.quantize(0.3), 0.25);
        assert_eq!(cc.quantize(0.4), 0.5);
        assert_eq!(cc.quantize(-0.2), 0.0);
        assert_eq!(cc.quantize(1.7), 1.0);
        assert!(CarrierComparison::new(0).is_err());
    }

    #[test]
    fn half_counts_round_to_even() {
        let cc = CarrierComparison::new(4).unwrap();
        assert_eq!(cc.quantize(0.125), 0.0);
        assert_eq!(cc.quantize(0.375), 0.5);
        assert_eq!(cc.quantize(0.625), 0.5);
        assert_eq!(cc.quantize(0.875), 1.0);
    }

    #[test]
    fn near_ties_snap_to_exact_ties() {
        let mut cc = CarrierComparison::default();
        let s = cc.compare(1.0, [0.5, 0.5 + 1e-9, 0.5 - 1e-9]);
        assert_eq!(s.iter().filter(|s| s.duration > 0.0).count(), 2);
    }

    #[test]
    fn zero_order_hold_averages() {
        let mut zoh = ZeroOrderHold;
        let s = zoh.segments(1e-4, [0.2, 0.5, 1.3]);
        assert_eq!(s.len(), 1);
        assert_eq!(s[0].duration, 1e-4);
        assert_eq!(s[0].q, SwitchingState([0.2, 0.5, 1.0]));
    }

    #[test]
    fn config_builds_modulators() {
        let mut m = ModulatorConfig::default().build().unwrap();
        assert_eq!(m.segments(1.0, [0.5; 3]).len(), 4);
        let mut m = ModulatorConfig::ZeroOrderHold.build().unwrap();
        assert_eq!(m.segments(1.0, [0.5; 3]).len(), 1);
        let bad = ModulatorConfig::CarrierComparison {
            levels: 0,
            initial_edge: CarrierEdge::Rising,
        };
        assert!(bad.build().is_err());
    }

    #[test]
    fn switching_state_space_vector() {
        let v = SwitchingState([1.0, 0.0, 0.0]).space_vector();
        assert!((v.re - 2.0 / 3.0).abs() < 1e-12);
        assert!(v.im.abs() < 1e-12);
        assert!(ON.space_vector().norm() < 1e-12);
    }

    proptest! {
        #[test]
        fn durations_sum_to_period(
            da in 0.0f64..=1.0,
            db in 0.0f64..=1.0,
            dc in 0.0f64..=1.0,
            t_s in 1e-6f64..1e-2,
        ) {
            let mut cc = CarrierComparison::default();
            for _ in 0..2 {
                let sum: f64 = cc.compare(t_s, [da, db, dc]).iter().map(|s| s.duration).sum();
                let tol = Tolerances { abs: 0.0, rel: 1e-12 };
                prop_assert!(nearly_equal(sum, t_s, tol));
            }
        }

        #[test]
        fn rising_call_mirrors_falling_call(
            d in prop::array::uniform3(prop_oneof![Just(0.0), Just(1.0), Just(0.5), 0.0f64..=1.0]),
            t_s in 1e-6f64..1e-2,
        ) {
            let mut cc = CarrierComparison::default().with_initial_edge(CarrierEdge::Falling);
            let falling = cc.compare(t_s, d);
            prop_assert_eq!(cc.edge(), CarrierEdge::Rising);
            let mut rising = cc.compare(t_s, d);
            prop_assert_eq!(cc.edge(), CarrierEdge::Falling);
            rising.reverse();
            prop_assert_eq!(rising, falling);
        }

        #[test]
        fn every_state_is_binary_and_durations_non_negative(
            d in prop::array::uniform3(-0.5f64..1.5),
        ) {
            let mut cc = CarrierComparison::default();
            for s in cc.compare(1.0, d) {
                prop_assert!(s.duration >= 0.0);
                prop_assert!(s.q.0.iter().all(|&q| q == 0.0 || q == 1.0));
            }
        }
    }
}
