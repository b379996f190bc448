//! Incremental model builder.

use ds_core::{ExternalId, SubsystemId};

use crate::error::SimResult;
use crate::model::Model;
use crate::signal::ValueKind;
use crate::subsystem::Subsystem;
use crate::validate;

/// A requested output -> input wire, still referring to ports by name.
#[derive(Debug, Clone)]
pub(crate) struct Connection {
    pub(crate) from: SubsystemId,
    pub(crate) output: String,
    pub(crate) to: SubsystemId,
    pub(crate) input: String,
}

/// A requested external source.
#[derive(Debug, Clone)]
pub(crate) struct ExternalSpec {
    pub(crate) name: String,
    pub(crate) kind: ValueKind,
}

/// A requested external source -> input wire.
#[derive(Debug, Clone)]
pub(crate) struct Drive {
    pub(crate) source: ExternalId,
    pub(crate) to: SubsystemId,
    pub(crate) input: String,
}

/// Builder for assembling subsystems into a [`Model`].
///
/// Use `add` to register subsystems in flattening order, `connect` to wire
/// outputs to inputs and `external`/`drive` for inputs set from outside the
/// model, then call `build()` to validate and freeze the wiring.
///
/// ```
/// # use ds_sim::{Model, ModelBuilder, SignalDecl, Signals, SignalsMut, SimResult, Subsystem, Value};
/// struct Source;
/// impl Subsystem for Source {
///     fn states(&self) -> &[SignalDecl] { &[] }
///     fn inputs(&self) -> &[SignalDecl] { &[] }
///     fn outputs(&self) -> &[SignalDecl] { const O: [SignalDecl; 1] = [SignalDecl::real("y")]; &O }
///     fn initial_state(&self) -> Vec<Value> { Vec::new() }
///     fn compute_outputs(&self, _t: f64, _x: &Signals<'_>, _u: &Signals<'_>, y: &mut SignalsMut<'_>) -> SimResult<()> {
///         y.set(0, 1.0)
///     }
///     fn rhs(&self, _t: f64, _x: &Signals<'_>, _u: &Signals<'_>, _y: &Signals<'_>, _dx: &mut SignalsMut<'_>) -> SimResult<()> {
///         Ok(())
///     }
/// }
///
/// let mut builder = ModelBuilder::new();
/// builder.add("source", Source);
/// let model: Model = builder.build().unwrap();
/// assert_eq!(model.dim(), 0);
/// ```
#[derive(Default)]
pub struct ModelBuilder {
    pub(crate) slots: Vec<(String, Box<dyn Subsystem>)>,
    pub(crate) connections: Vec<Connection>,
    pub(crate) externals: Vec<ExternalSpec>,
    pub(crate) drives: Vec<Drive>,
}

impl ModelBuilder {
    /// Create a new empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subsystem and return its ID.
    pub fn add(
        &mut self,
        name: impl Into<String>,
        subsystem: impl Subsystem + 'static,
    ) -> SubsystemId {
        self.add_boxed(name, Box::new(subsystem))
    }

    /// Register an already boxed subsystem.
    pub fn add_boxed(
        &mut self,
        name: impl Into<String>,
        subsystem: Box<dyn Subsystem>,
    ) -> SubsystemId {
        let id = SubsystemId::from_index(self.slots.len() as u32);
        self.slots.push((name.into(), subsystem));
        id
    }

    /// Wire output `output` of `from` to input `input` of `to`.
    pub fn connect(
        &mut self,
        from: SubsystemId,
        output: impl Into<String>,
        to: SubsystemId,
        input: impl Into<String>,
    ) -> &mut Self {
        self.connections.push(Connection {
            from,
            output: output.into(),
            to,
            input: input.into(),
        });
        self
    }

    /// Declare a source whose value is set from outside the model.
    pub fn external(&mut self, name: impl Into<String>, kind: ValueKind) -> ExternalId {
        let id = ExternalId::from_index(self.externals.len() as u32);
        self.externals.push(ExternalSpec {
            name: name.into(),
            kind,
        });
        id
    }

    /// Let external source `source` drive input `input` of `to`.
    ///
    /// An unknown `source` is reported by `build()`.
    pub fn drive(
        &mut self,
        source: ExternalId,
        to: SubsystemId,
        input: impl Into<String>,
    ) -> &mut Self {
        self.drives.push(Drive {
            source,
            to,
            input: input.into(),
        });
        self
    }

    /// Number of registered subsystems.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Validate the wiring and freeze it into a [`Model`].
    pub fn build(self) -> SimResult<Model> {
        validate::validate_names(&self.slots)?;
        let resolved = validate::resolve(&self)?;
        Model::assemble(self, resolved)
    }
}
