//! Signal values, port declarations and the typed views subsystems see.
//!
//! Every state, input and output of a subsystem is declared up front as a
//! [`SignalDecl`]. Values are a closed enum so that a complex flux and a
//! three-phase switching state can travel through the same ports without
//! run-time attribute bags.

use std::fmt;

use ds_core::Complex64;

use crate::error::{SimError, SimResult};

/// Kind of a declared signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ValueKind {
    /// Real scalar, one slot in the flat state vector.
    Real,
    /// Complex scalar (space vector), two slots.
    Complex,
    /// Real three-phase vector, three slots.
    Phases,
}

impl ValueKind {
    /// Number of real slots occupied in a flat vector.
    pub const fn width(self) -> usize {
        match self {
            Self::Real => 1,
            Self::Complex => 2,
            Self::Phases => 3,
        }
    }

    /// Zero value of this kind.
    pub fn zero(self) -> Value {
        match self {
            Self::Real => Value::Real(0.0),
            Self::Complex => Value::Complex(Complex64::new(0.0, 0.0)),
            Self::Phases => Value::Phases([0.0; 3]),
        }
    }

    /// Suffixes used when labelling flat-vector slots.
    pub(crate) const fn slot_suffixes(self) -> &'static [&'static str] {
        match self {
            Self::Real => &[""],
            Self::Complex => &[".re", ".im"],
            Self::Phases => &[".a", ".b", ".c"],
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Real => "real",
            Self::Complex => "complex",
            Self::Phases => "phases",
        };
        f.write_str(name)
    }
}

/// A signal value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Real(f64),
    Complex(Complex64),
    Phases([f64; 3]),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Real(_) => ValueKind::Real,
            Self::Complex(_) => ValueKind::Complex,
            Self::Phases(_) => ValueKind::Phases,
        }
    }

    pub fn is_finite(&self) -> bool {
        match self {
            Self::Real(v) => v.is_finite(),
            Self::Complex(v) => v.re.is_finite() && v.im.is_finite(),
            Self::Phases(v) => v.iter().all(|x| x.is_finite()),
        }
    }

    pub fn as_real(&self) -> Option<f64> {
        match self {
            Self::Real(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_complex(&self) -> Option<Complex64> {
        match self {
            Self::Complex(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_phases(&self) -> Option<[f64; 3]> {
        match self {
            Self::Phases(v) => Some(*v),
            _ => None,
        }
    }

    /// Write this value into `out`, which must be exactly `kind().width()` long.
    pub(crate) fn write_flat(&self, out: &mut [f64]) {
        match self {
            Self::Real(v) => out[0] = *v,
            Self::Complex(v) => {
                out[0] = v.re;
                out[1] = v.im;
            }
            Self::Phases(v) => out.copy_from_slice(v),
        }
    }

    /// Read a value of `kind` from `src`, which must be exactly `kind.width()` long.
    pub(crate) fn read_flat(kind: ValueKind, src: &[f64]) -> Self {
        match kind {
            ValueKind::Real => Self::Real(src[0]),
            ValueKind::Complex => Self::Complex(Complex64::new(src[0], src[1])),
            ValueKind::Phases => Self::Phases([src[0], src[1], src[2]]),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Real(v)
    }
}

impl From<Complex64> for Value {
    fn from(v: Complex64) -> Self {
        Self::Complex(v)
    }
}

impl From<[f64; 3]> for Value {
    fn from(v: [f64; 3]) -> Self {
        Self::Phases(v)
    }
}

/// Declaration of one named state, input or output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalDecl {
    pub name: &'static str,
    pub kind: ValueKind,
}

impl SignalDecl {
    pub const fn real(name: &'static str) -> Self {
        Self {
            name,
            kind: ValueKind::Real,
        }
    }

    pub const fn complex(name: &'static str) -> Self {
        Self {
            name,
            kind: ValueKind::Complex,
        }
    }

    pub const fn phases(name: &'static str) -> Self {
        Self {
            name,
            kind: ValueKind::Phases,
        }
    }
}

/// Position of `name` in a declaration list.
pub fn position(decls: &[SignalDecl], name: &str) -> Option<usize> {
    decls.iter().position(|d| d.name == name)
}

/// Total flat width of a declaration list.
pub fn flat_width(decls: &[SignalDecl]) -> usize {
    decls.iter().map(|d| d.kind.width()).sum()
}

/// Read-only view of a subsystem's states, inputs or outputs.
///
/// While outputs are being computed, the input view is restricted to the
/// externally driven inputs; touching any other input is a
/// [`SimError::Feedthrough`].
#[derive(Debug, Clone, Copy)]
pub struct Signals<'a> {
    decls: &'a [SignalDecl],
    values: &'a [Value],
    readable: Option<&'a [bool]>,
}

impl<'a> Signals<'a> {
    pub fn new(decls: &'a [SignalDecl], values: &'a [Value]) -> Self {
        Self {
            decls,
            values,
            readable: None,
        }
    }

    pub(crate) fn restricted(
        decls: &'a [SignalDecl],
        values: &'a [Value],
        readable: &'a [bool],
    ) -> Self {
        Self {
            decls,
            values,
            readable: Some(readable),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn value(&self, index: usize) -> SimResult<Value> {
        let value = self.values.get(index).ok_or(SimError::IndexOob {
            what: "signal",
            index,
            len: self.values.len(),
        })?;
        if let Some(readable) = self.readable {
            if !readable[index] {
                return Err(SimError::Feedthrough {
                    input: self.decls[index].name,
                });
            }
        }
        Ok(*value)
    }

    pub fn real(&self, index: usize) -> SimResult<f64> {
        let v = self.value(index)?;
        v.as_real().ok_or_else(|| self.mismatch(index, v))
    }

    pub fn complex(&self, index: usize) -> SimResult<Complex64> {
        let v = self.value(index)?;
        v.as_complex().ok_or_else(|| self.mismatch(index, v))
    }

    pub fn phases(&self, index: usize) -> SimResult<[f64; 3]> {
        let v = self.value(index)?;
        v.as_phases().ok_or_else(|| self.mismatch(index, v))
    }

    fn mismatch(&self, index: usize, found: Value) -> SimError {
        SimError::KindMismatch {
            signal: self.decls[index].name.to_string(),
            expected: self.decls[index].kind,
            found: found.kind(),
        }
    }
}

/// Write view for outputs and state derivatives.
///
/// Tracks which slots were written so the model can reject a subsystem that
/// forgot one instead of silently reading a stale value.
#[derive(Debug)]
pub struct SignalsMut<'a> {
    decls: &'a [SignalDecl],
    values: &'a mut [Value],
    written: &'a mut [bool],
}

impl<'a> SignalsMut<'a> {
    pub(crate) fn new(
        decls: &'a [SignalDecl],
        values: &'a mut [Value],
        written: &'a mut [bool],
    ) -> Self {
        written.fill(false);
        Self {
            decls,
            values,
            written,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn set(&mut self, index: usize, value: impl Into<Value>) -> SimResult<()> {
        let value = value.into();
        let len = self.values.len();
        let decl = self.decls.get(index).ok_or(SimError::IndexOob {
            what: "signal",
            index,
            len,
        })?;
        if decl.kind != value.kind() {
            return Err(SimError::KindMismatch {
                signal: decl.name.to_string(),
                expected: decl.kind,
                found: value.kind(),
            });
        }
        self.values[index] = value;
        self.written[index] = true;
        Ok(())
    }

    /// Fails with [`SimError::Unwritten`] naming the first slot left untouched.
    pub(crate) fn finish(self) -> SimResult<()> {
        match self.written.iter().position(|w| !w) {
            Some(i) => Err(SimError::Unwritten {
                signal: self.decls[i].name,
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DECLS: [SignalDecl; 3] = [
        SignalDecl::real("w_m"),
        SignalDecl::complex("psi_s"),
        SignalDecl::phases("q"),
    ];

    #[test]
    fn widths() {
        assert_eq!(ValueKind::Real.width(), 1);
        assert_eq!(ValueKind::Complex.width(), 2);
        assert_eq!(ValueKind::Phases.width(), 3);
        assert_eq!(flat_width(&DECLS), 6);
    }

    #[test]
    fn flat_round_trip_is_exact() {
        let values = [
            Value::Real(0.1),
            Value::Complex(Complex64::new(-3.5, 1e-17)),
            Value::Phases([1.0, 0.0, 0.25]),
        ];
        for v in values {
            let mut buf = vec![0.0; v.kind().width()];
            v.write_flat(&mut buf);
            assert_eq!(Value::read_flat(v.kind(), &buf), v);
        }
    }

    #[test]
    fn typed_reads_check_kind() {
        let values = [
            Value::Real(2.0),
            Value::Complex(Complex64::new(1.0, 2.0)),
            Value::Phases([1.0, 0.0, 0.0]),
        ];
        let view = Signals::new(&DECLS, &values);
        assert_eq!(view.real(0).unwrap(), 2.0);
        assert_eq!(view.complex(1).unwrap(), Complex64::new(1.0, 2.0));
        assert!(matches!(
            view.real(1),
            Err(SimError::KindMismatch { .. })
        ));
        assert!(matches!(view.value(3), Err(SimError::IndexOob { .. })));
    }

    #[test]
    fn restricted_view_rejects_feedthrough() {
        let values = [
            Value::Real(2.0),
            Value::Complex(Complex64::new(1.0, 2.0)),
            Value::Phases([1.0, 0.0, 0.0]),
        ];
        let readable = [false, false, true];
        let view = Signals::restricted(&DECLS, &values, &readable);
        assert_eq!(view.phases(2).unwrap(), [1.0, 0.0, 0.0]);
        assert_eq!(
            view.real(0),
            Err(SimError::Feedthrough { input: "w_m" })
        );
    }

    #[test]
    fn writer_tracks_completion() {
        let mut values = DECLS.map(|d| d.kind.zero());
        let mut written = [true; 3];
        let mut out = SignalsMut::new(&DECLS, &mut values, &mut written);
        out.set(0, 1.0).unwrap();
        out.set(2, [0.0, 1.0, 0.0]).unwrap();
        assert!(out.set(1, 3.0).is_err());
        assert_eq!(out.finish(), Err(SimError::Unwritten { signal: "psi_s" }));
    }
}
