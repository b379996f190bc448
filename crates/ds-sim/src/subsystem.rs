//! The contract every physical subsystem implements.

use crate::error::SimResult;
use crate::signal::{SignalDecl, Signals, SignalsMut, Value};

/// An independently owned unit of continuous state.
///
/// A subsystem declares its state, input and output records once; the
/// [`Model`](crate::Model) owns the storage and hands the subsystem typed
/// views. Both methods must be pure functions of their arguments.
///
/// `compute_outputs` may read its own state and the inputs driven from
/// outside the model (for example the converter switching state). Inputs
/// wired from other subsystems are only visible in `rhs`, which keeps the
/// assembled right-hand side free of instantaneous loops.
pub trait Subsystem {
    /// Declared continuous states, in flattening order.
    fn states(&self) -> &[SignalDecl];

    /// Declared inputs.
    fn inputs(&self) -> &[SignalDecl];

    /// Declared outputs.
    fn outputs(&self) -> &[SignalDecl];

    /// Initial state values, one per declared state.
    fn initial_state(&self) -> Vec<Value>;

    /// Write every declared output from the current state (and external inputs).
    fn compute_outputs(
        &self,
        t: f64,
        state: &Signals<'_>,
        input: &Signals<'_>,
        output: &mut SignalsMut<'_>,
    ) -> SimResult<()>;

    /// Write the time derivative of every declared state.
    fn rhs(
        &self,
        t: f64,
        state: &Signals<'_>,
        input: &Signals<'_>,
        output: &Signals<'_>,
        derivative: &mut SignalsMut<'_>,
    ) -> SimResult<()>;
}
