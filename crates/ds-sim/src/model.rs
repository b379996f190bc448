//! Composite model of subsystems and the `TransientModel` seam integrators use.

use nalgebra::DVector;

use ds_core::{ExternalId, SubsystemId};

use crate::builder::ModelBuilder;
use crate::error::{SimError, SimResult};
use crate::signal::{SignalDecl, Signals, SignalsMut, Value, ValueKind, flat_width, position};
use crate::subsystem::Subsystem;
use crate::validate::{self, Resolved, Wire};

/// Trait for dynamic systems an [`Integrator`](crate::Integrator) can advance.
pub trait TransientModel {
    /// Length of the flat state vector.
    fn dim(&self) -> usize;

    /// State integration starts from.
    fn initial_state(&self) -> DVector<f64>;

    /// Compute state derivative dxdt = f(t, x).
    ///
    /// Takes `&mut self` so implementations can stage the trial state in
    /// their own storage before evaluating.
    fn rhs(&mut self, t: f64, x: &DVector<f64>) -> SimResult<DVector<f64>>;
}

/// Storage for one registered subsystem.
struct Slot {
    name: String,
    subsystem: Box<dyn Subsystem>,
    state_decls: Vec<SignalDecl>,
    input_decls: Vec<SignalDecl>,
    output_decls: Vec<SignalDecl>,
    state: Vec<Value>,
    input: Vec<Value>,
    output: Vec<Value>,
    derivative: Vec<Value>,
    /// Inputs readable while outputs are computed (externally driven ones).
    external_mask: Vec<bool>,
    output_written: Vec<bool>,
    derivative_written: Vec<bool>,
    /// Offset of this slot's states in the flat vector.
    offset: usize,
}

/// External source and the inputs it drives.
struct External {
    name: String,
    kind: ValueKind,
    value: Value,
    targets: Vec<(usize, usize)>,
}

/// Subsystems assembled into one ODE right-hand side.
///
/// The flat state vector concatenates every subsystem's states in
/// registration order; complex states take two slots (re, im) and
/// three-phase states three. That order is fixed once `build()` succeeds.
pub struct Model {
    slots: Vec<Slot>,
    wires: Vec<Wire>,
    externals: Vec<External>,
    dim: usize,
}

impl Model {
    /// Start assembling a model.
    pub fn builder() -> ModelBuilder {
        ModelBuilder::new()
    }

    pub(crate) fn assemble(builder: ModelBuilder, resolved: Resolved) -> SimResult<Self> {
        let Resolved {
            wires,
            external_targets,
        } = resolved;

        let mut slots = Vec::with_capacity(builder.slots.len());
        let mut offset = 0;
        for (name, subsystem) in builder.slots {
            let state_decls = subsystem.states().to_vec();
            let input_decls = subsystem.inputs().to_vec();
            let output_decls = subsystem.outputs().to_vec();
            let state = subsystem.initial_state();
            validate::validate_initial_state(&name, &state_decls, &state)?;

            let width = flat_width(&state_decls);
            slots.push(Slot {
                input: input_decls.iter().map(|d| d.kind.zero()).collect(),
                output: output_decls.iter().map(|d| d.kind.zero()).collect(),
                derivative: state_decls.iter().map(|d| d.kind.zero()).collect(),
                external_mask: vec![false; input_decls.len()],
                output_written: vec![false; output_decls.len()],
                derivative_written: vec![false; state_decls.len()],
                name,
                subsystem,
                state_decls,
                input_decls,
                output_decls,
                state,
                offset,
            });
            offset += width;
        }

        let mut externals = Vec::with_capacity(builder.externals.len());
        for (spec, targets) in builder.externals.into_iter().zip(external_targets) {
            for &(slot, input) in &targets {
                slots[slot].external_mask[input] = true;
            }
            externals.push(External {
                name: spec.name,
                kind: spec.kind,
                value: spec.kind.zero(),
                targets,
            });
        }

        let mut model = Self {
            slots,
            wires,
            externals,
            dim: offset,
        };
        for index in 0..model.externals.len() {
            model.propagate_external(index);
        }
        Ok(model)
    }

    /// Length of the flat state vector.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of subsystems.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Look up a subsystem by the name it was registered with.
    pub fn subsystem_id(&self, name: &str) -> Option<SubsystemId> {
        self.slots
            .iter()
            .position(|s| s.name == name)
            .map(|i| SubsystemId::from_index(i as u32))
    }

    pub fn subsystem_name(&self, id: SubsystemId) -> Option<&str> {
        self.slots.get(id.slot()).map(|s| s.name.as_str())
    }

    pub fn subsystem(&self, id: SubsystemId) -> Option<&dyn Subsystem> {
        self.slots.get(id.slot()).map(|s| s.subsystem.as_ref())
    }

    /// Mutable access to a subsystem, e.g. to retune parameters between runs.
    ///
    /// Declarations are cached at assembly and are not re-read.
    pub fn subsystem_mut(&mut self, id: SubsystemId) -> Option<&mut (dyn Subsystem + 'static)> {
        self.slots.get_mut(id.slot()).map(|s| s.subsystem.as_mut())
    }

    /// Flat vector of every subsystem's state, in registration order.
    pub fn get_state_vector(&self) -> DVector<f64> {
        let mut x = DVector::zeros(self.dim);
        for slot in &self.slots {
            let mut at = slot.offset;
            for value in &slot.state {
                let width = value.kind().width();
                value.write_flat(&mut x.as_mut_slice()[at..at + width]);
                at += width;
            }
        }
        x
    }

    /// Write a flat vector back into the subsystem states.
    pub fn set_state_vector(&mut self, x: &DVector<f64>) -> SimResult<()> {
        if x.len() != self.dim {
            return Err(SimError::DimensionMismatch {
                expected: self.dim,
                got: x.len(),
            });
        }
        let flat = x.as_slice();
        for slot in &mut self.slots {
            let mut at = slot.offset;
            for (value, decl) in slot.state.iter_mut().zip(&slot.state_decls) {
                let width = decl.kind.width();
                *value = Value::read_flat(decl.kind, &flat[at..at + width]);
                at += width;
            }
        }
        Ok(())
    }

    /// Compute every subsystem's outputs from its state and external inputs.
    pub fn set_outputs(&mut self, t: f64) -> SimResult<()> {
        for slot in &mut self.slots {
            let state = Signals::new(&slot.state_decls, &slot.state);
            let input = Signals::restricted(&slot.input_decls, &slot.input, &slot.external_mask);
            let mut output = SignalsMut::new(
                &slot.output_decls,
                &mut slot.output,
                &mut slot.output_written,
            );
            slot.subsystem
                .compute_outputs(t, &state, &input, &mut output)?;
            output.finish()?;
        }
        Ok(())
    }

    /// Copy wired outputs into inputs.
    ///
    /// Every wire reads an output computed in `set_outputs`, so one pass
    /// resolves the whole graph.
    pub fn interconnect(&mut self, _t: f64) {
        for wire in &self.wires {
            let value = self.slots[wire.from.0].output[wire.from.1];
            self.slots[wire.to.0].input[wire.to.1] = value;
        }
    }

    /// Concatenate every subsystem's state derivative, in registration order.
    ///
    /// Valid only after `set_outputs` and `interconnect` ran for `t`.
    pub fn derivatives(&mut self, t: f64) -> SimResult<DVector<f64>> {
        let mut dx = DVector::zeros(self.dim);
        for slot in &mut self.slots {
            let state = Signals::new(&slot.state_decls, &slot.state);
            let input = Signals::new(&slot.input_decls, &slot.input);
            let output = Signals::new(&slot.output_decls, &slot.output);
            let mut derivative = SignalsMut::new(
                &slot.state_decls,
                &mut slot.derivative,
                &mut slot.derivative_written,
            );
            slot.subsystem
                .rhs(t, &state, &input, &output, &mut derivative)?;
            derivative.finish()?;

            let mut at = slot.offset;
            for value in &slot.derivative {
                if !value.is_finite() {
                    return Err(SimError::NonFinite {
                        what: "state derivative",
                        t,
                    });
                }
                let width = value.kind().width();
                value.write_flat(&mut dx.as_mut_slice()[at..at + width]);
                at += width;
            }
        }
        Ok(dx)
    }

    /// Right-hand side the integrator calls.
    ///
    /// set_state_vector -> set_outputs -> interconnect -> derivatives.
    pub fn rhs(&mut self, t: f64, x: &DVector<f64>) -> SimResult<DVector<f64>> {
        self.set_state_vector(x)?;
        self.refresh(t)?;
        self.derivatives(t)
    }

    /// Recompute outputs and inputs from the current state.
    pub fn refresh(&mut self, t: f64) -> SimResult<()> {
        self.set_outputs(t)?;
        self.interconnect(t);
        Ok(())
    }

    /// Look up an external source by name.
    pub fn external_id(&self, name: &str) -> Option<ExternalId> {
        self.externals
            .iter()
            .position(|e| e.name == name)
            .map(|i| ExternalId::from_index(i as u32))
    }

    pub fn external_kind(&self, id: ExternalId) -> SimResult<ValueKind> {
        self.externals
            .get(id.slot())
            .map(|e| e.kind)
            .ok_or(SimError::UnknownExternal { id: id.index() })
    }

    pub fn external_value(&self, id: ExternalId) -> Option<Value> {
        self.externals.get(id.slot()).map(|e| e.value)
    }

    /// Set an external source and push it into every input it drives.
    pub fn set_external(&mut self, id: ExternalId, value: impl Into<Value>) -> SimResult<()> {
        let value = value.into();
        let external = self
            .externals
            .get_mut(id.slot())
            .ok_or(SimError::UnknownExternal { id: id.index() })?;
        if external.kind != value.kind() {
            return Err(SimError::KindMismatch {
                signal: external.name.clone(),
                expected: external.kind,
                found: value.kind(),
            });
        }
        external.value = value;
        self.propagate_external(id.slot());
        Ok(())
    }

    fn propagate_external(&mut self, index: usize) {
        let external = &self.externals[index];
        for &(slot, input) in &external.targets {
            self.slots[slot].input[input] = external.value;
        }
    }

    /// Current value of an output, as of the last `set_outputs`.
    pub fn output(&self, id: SubsystemId, name: &str) -> Option<Value> {
        let slot = self.slots.get(id.slot())?;
        position(&slot.output_decls, name).map(|i| slot.output[i])
    }

    /// Current value of an input, as of the last `interconnect`.
    pub fn input(&self, id: SubsystemId, name: &str) -> Option<Value> {
        let slot = self.slots.get(id.slot())?;
        position(&slot.input_decls, name).map(|i| slot.input[i])
    }

    /// Current value of a state.
    pub fn state(&self, id: SubsystemId, name: &str) -> Option<Value> {
        let slot = self.slots.get(id.slot())?;
        position(&slot.state_decls, name).map(|i| slot.state[i])
    }

    /// Flat index of the first slot of a state.
    pub fn state_offset(&self, id: SubsystemId, name: &str) -> Option<usize> {
        let slot = self.slots.get(id.slot())?;
        let index = position(&slot.state_decls, name)?;
        Some(slot.offset + flat_width(&slot.state_decls[..index]))
    }

    /// One label per flat slot: `<subsystem>.<state>[.re|.im|.a|.b|.c]`.
    pub fn state_labels(&self) -> Vec<String> {
        let mut labels = Vec::with_capacity(self.dim);
        for slot in &self.slots {
            for decl in &slot.state_decls {
                for suffix in decl.kind.slot_suffixes() {
                    labels.push(format!("{}.{}{}", slot.name, decl.name, suffix));
                }
            }
        }
        labels
    }
}

impl TransientModel for Model {
    fn dim(&self) -> usize {
        self.dim
    }

    fn initial_state(&self) -> DVector<f64> {
        self.get_state_vector()
    }

    fn rhs(&mut self, t: f64, x: &DVector<f64>) -> SimResult<DVector<f64>> {
        Model::rhs(self, t, x)
    }
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field(
                "subsystems",
                &self.slots.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
            )
            .field("wires", &self.wires.len())
            .field("externals", &self.externals.len())
            .field("dim", &self.dim)
            .finish()
    }
}
