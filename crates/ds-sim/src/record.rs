//! In-memory trajectory log.

use nalgebra::DVector;

use crate::pwm::SwitchingState;

/// Time-ordered log of accepted integrator sub-steps.
///
/// Each entry holds the time, the full flat state and the switching state
/// held over the segment the step belongs to. Entries are only appended.
#[derive(Clone, Debug, Default)]
pub struct SimRecord {
    /// Time points (seconds)
    pub t: Vec<f64>,
    /// State snapshots
    pub x: Vec<DVector<f64>>,
    /// Held switching state per entry
    pub q: Vec<SwitchingState>,
    /// Label per flat state slot
    pub labels: Vec<String>,
}

impl SimRecord {
    pub fn new(labels: Vec<String>) -> Self {
        Self {
            labels,
            ..Self::default()
        }
    }

    pub fn push(&mut self, t: f64, x: DVector<f64>, q: SwitchingState) {
        self.t.push(t);
        self.x.push(x);
        self.q.push(q);
    }

    pub fn len(&self) -> usize {
        self.t.len()
    }

    pub fn is_empty(&self) -> bool {
        self.t.is_empty()
    }

    /// Time series of one flat state slot.
    pub fn column(&self, index: usize) -> Option<Vec<f64>> {
        if index >= self.labels.len() {
            return None;
        }
        Some(self.x.iter().map(|x| x[index]).collect())
    }

    /// Time series of the flat state slot with `label`, e.g. `"machine.psi_s.re"`.
    pub fn column_by_label(&self, label: &str) -> Option<Vec<f64>> {
        let index = self.labels.iter().position(|l| l == label)?;
        self.column(index)
    }

    /// Time series of one phase of the held switching state.
    pub fn switching_phase(&self, phase: usize) -> Option<Vec<f64>> {
        if phase >= 3 {
            return None;
        }
        Some(self.q.iter().map(|q| q.0[phase]).collect())
    }

    pub fn last_time(&self) -> Option<f64> {
        self.t.last().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> SimRecord {
        let mut r = SimRecord::new(vec!["a.x".into(), "b.z.re".into(), "b.z.im".into()]);
        r.push(0.1, DVector::from_vec(vec![1.0, 2.0, 3.0]), SwitchingState([1.0, 0.0, 0.0]));
        r.push(0.2, DVector::from_vec(vec![4.0, 5.0, 6.0]), SwitchingState([0.0; 3]));
        r
    }

    #[test]
    fn columns_by_index_and_label() {
        let r = record();
        assert_eq!(r.len(), 2);
        assert_eq!(r.column(0), Some(vec![1.0, 4.0]));
        assert_eq!(r.column_by_label("b.z.im"), Some(vec![3.0, 6.0]));
        assert_eq!(r.column(3), None);
        assert_eq!(r.column_by_label("c"), None);
        assert_eq!(r.switching_phase(0), Some(vec![1.0, 0.0]));
        assert_eq!(r.last_time(), Some(0.2));
    }
}
