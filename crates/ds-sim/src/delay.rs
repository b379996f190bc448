//! Computational delay between controller and converter.

use std::collections::VecDeque;

use crate::error::{SimError, SimResult};

/// Fixed-depth FIFO modelling controller-to-converter latency.
///
/// The buffer starts full of `T::default()`, so the first `depth` calls
/// return the zero fill before the first pushed value comes out.
#[derive(Debug, Clone)]
pub struct Delay<T> {
    buffer: VecDeque<T>,
}

impl<T: Clone + Default> Delay<T> {
    pub fn new(depth: usize) -> SimResult<Self> {
        if depth == 0 {
            return Err(SimError::InvalidArg {
                what: "delay depth must be at least 1",
            });
        }
        Ok(Self {
            buffer: std::iter::repeat_n(T::default(), depth).collect(),
        })
    }

    /// Push `u` and return the value pushed `depth` calls ago.
    pub fn call(&mut self, u: T) -> T {
        self.buffer.push_back(u);
        // Length is depth + 1 here, so there is always a front element.
        self.buffer.pop_front().unwrap_or_default()
    }

    pub fn depth(&self) -> usize {
        self.buffer.len()
    }

    /// Refill with the zero value.
    pub fn reset(&mut self) {
        self.buffer.iter_mut().for_each(|v| *v = T::default());
    }
}

impl<T: Clone + Default> Default for Delay<T> {
    fn default() -> Self {
        Self {
            buffer: VecDeque::from([T::default()]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn depth_zero_is_rejected() {
        assert!(Delay::<f64>::new(0).is_err());
    }

    #[test]
    fn default_delays_one_call() {
        let mut d = Delay::<[f64; 3]>::default();
        assert_eq!(d.depth(), 1);
        assert_eq!(d.call([0.1, 0.2, 0.3]), [0.0; 3]);
        assert_eq!(d.call([0.4, 0.5, 0.6]), [0.1, 0.2, 0.3]);
    }

    #[test]
    fn reset_refills_with_zero() {
        let mut d = Delay::new(2).unwrap();
        d.call(1.0);
        d.call(2.0);
        d.reset();
        assert_eq!(d.call(3.0), 0.0);
        assert_eq!(d.call(4.0), 0.0);
        assert_eq!(d.call(5.0), 3.0);
        assert_eq!(d.depth(), 2);
    }

    proptest! {
        #[test]
        fn constant_input_appears_after_depth_calls(
            depth in 1usize..8,
            u in -1e3f64..1e3,
            extra in 1usize..8,
        ) {
            let mut d = Delay::new(depth).unwrap();
            for _ in 0..depth {
                prop_assert_eq!(d.call(u), 0.0);
            }
            for _ in 0..extra {
                prop_assert_eq!(d.call(u), u);
            }
            prop_assert_eq!(d.depth(), depth);
        }
    }
}
