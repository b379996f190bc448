//! Simulation engine for power-electronic motor drives.
//!
//! Provides:
//! - Composition of independently owned subsystems into one ODE model
//! - Adaptive (Dormand-Prince) and fixed-step (RK4, Euler) integrators
//! - Computational delay and carrier-comparison PWM
//! - A driver interleaving a sampled controller with segment integration
//! - Parallel parameter sweeps

pub mod builder;
pub mod controller;
pub mod delay;
pub mod error;
pub mod integrator;
pub mod model;
pub mod pwm;
pub mod record;
pub mod signal;
pub mod sim;
pub mod subsystem;
pub mod sweep;

// Internal modules
mod validate;

// Re-exports for public API
pub use builder::ModelBuilder;
pub use controller::{ControlCommand, Controller};
pub use delay::Delay;
pub use error::{SimError, SimResult};
pub use integrator::{DormandPrince, ForwardEuler, Integrator, RK4, Sample};
pub use model::{Model, TransientModel};
pub use pwm::{
    CarrierComparison, CarrierEdge, DutyRatios, Modulator, ModulatorConfig, Segment,
    SwitchingState, ZeroOrderHold,
};
pub use record::SimRecord;
pub use signal::{SignalDecl, Signals, SignalsMut, Value, ValueKind};
pub use sim::{IntegratorType, SimOptions, SimOutcome, SimPhase, SimReport, Simulation};
pub use subsystem::Subsystem;
pub use sweep::run_sweep;

pub use ds_core::{Complex64, ExternalId, SubsystemId};
