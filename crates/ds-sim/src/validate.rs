//! Assembly-time validation of model wiring.

use std::collections::HashSet;

use ds_core::SubsystemId;

use crate::builder::ModelBuilder;
use crate::error::{SimError, SimResult};
use crate::signal::{SignalDecl, Value, ValueKind, position};
use crate::subsystem::Subsystem;

/// Output -> input wire in slot/port indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Wire {
    pub(crate) from: (usize, usize),
    pub(crate) to: (usize, usize),
}

/// Wiring with every name resolved to an index.
#[derive(Debug, Default)]
pub(crate) struct Resolved {
    pub(crate) wires: Vec<Wire>,
    /// Per external source, the (slot, input) pairs it drives.
    pub(crate) external_targets: Vec<Vec<(usize, usize)>>,
}

/// Subsystem names must be unique.
pub(crate) fn validate_names(slots: &[(String, Box<dyn Subsystem>)]) -> SimResult<()> {
    let mut seen = HashSet::new();
    for (name, _) in slots {
        if !seen.insert(name.as_str()) {
            return Err(SimError::DuplicateName { name: name.clone() });
        }
    }
    Ok(())
}

fn lookup<'a>(
    slots: &'a [(String, Box<dyn Subsystem>)],
    id: SubsystemId,
) -> SimResult<&'a (String, Box<dyn Subsystem>)> {
    slots
        .get(id.slot())
        .ok_or(SimError::UnknownSubsystem { id: id.index() })
}

fn port_index(
    subsystem: &str,
    decls: &[SignalDecl],
    direction: &'static str,
    port: &str,
) -> SimResult<usize> {
    position(decls, port).ok_or_else(|| SimError::UnknownPort {
        subsystem: subsystem.to_string(),
        direction,
        port: port.to_string(),
    })
}

fn check_kind(
    signal: impl FnOnce() -> String,
    expected: ValueKind,
    found: ValueKind,
) -> SimResult<()> {
    if expected == found {
        Ok(())
    } else {
        Err(SimError::KindMismatch {
            signal: signal(),
            expected,
            found,
        })
    }
}

/// Resolve connections and external drives, then require every input to be
/// driven by exactly one source.
pub(crate) fn resolve(builder: &ModelBuilder) -> SimResult<Resolved> {
    let slots = &builder.slots;
    let mut drivers: Vec<Vec<usize>> = slots
        .iter()
        .map(|(_, sub)| vec![0; sub.inputs().len()])
        .collect();
    let mut resolved = Resolved {
        wires: Vec::with_capacity(builder.connections.len()),
        external_targets: vec![Vec::new(); builder.externals.len()],
    };

    for conn in &builder.connections {
        let (from_name, from) = lookup(slots, conn.from)?;
        let (to_name, to) = lookup(slots, conn.to)?;
        let out_idx = port_index(from_name, from.outputs(), "output", &conn.output)?;
        let in_idx = port_index(to_name, to.inputs(), "input", &conn.input)?;

        check_kind(
            || format!("{from_name}.{} -> {to_name}.{}", conn.output, conn.input),
            to.inputs()[in_idx].kind,
            from.outputs()[out_idx].kind,
        )?;

        drivers[conn.to.slot()][in_idx] += 1;
        resolved.wires.push(Wire {
            from: (conn.from.slot(), out_idx),
            to: (conn.to.slot(), in_idx),
        });
    }

    for drive in &builder.drives {
        let spec = builder
            .externals
            .get(drive.source.slot())
            .ok_or(SimError::UnknownExternal {
                id: drive.source.index(),
            })?;
        let (to_name, to) = lookup(slots, drive.to)?;
        let in_idx = port_index(to_name, to.inputs(), "input", &drive.input)?;

        check_kind(
            || format!("{} -> {to_name}.{}", spec.name, drive.input),
            to.inputs()[in_idx].kind,
            spec.kind,
        )?;

        drivers[drive.to.slot()][in_idx] += 1;
        resolved.external_targets[drive.source.slot()].push((drive.to.slot(), in_idx));
    }

    for ((name, sub), counts) in slots.iter().zip(&drivers) {
        for (decl, &count) in sub.inputs().iter().zip(counts) {
            match count {
                1 => {}
                0 => {
                    return Err(SimError::UnwiredInput {
                        subsystem: name.clone(),
                        input: decl.name.to_string(),
                    });
                }
                _ => {
                    return Err(SimError::MultipleDrivers {
                        subsystem: name.clone(),
                        input: decl.name.to_string(),
                    });
                }
            }
        }
    }

    Ok(resolved)
}

/// Initial values must match the declared states one to one.
pub(crate) fn validate_initial_state(
    subsystem: &str,
    decls: &[SignalDecl],
    values: &[Value],
) -> SimResult<()> {
    if decls.len() != values.len() {
        return Err(SimError::StateCount {
            subsystem: subsystem.to_string(),
            declared: decls.len(),
            supplied: values.len(),
        });
    }
    for (decl, value) in decls.iter().zip(values) {
        check_kind(
            || format!("{subsystem}.{}", decl.name),
            decl.kind,
            value.kind(),
        )?;
    }
    Ok(())
}
