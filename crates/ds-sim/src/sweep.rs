//! Parallel evaluation of independent simulation cases.

use rayon::prelude::*;

/// Run `f` on every case in parallel, returning results in case order.
///
/// Each case should build its own model and [`Simulation`](crate::Simulation)
/// inside `f`; nothing is shared between cases.
pub fn run_sweep<P, R, F>(cases: Vec<P>, f: F) -> Vec<R>
where
    P: Send,
    R: Send,
    F: Fn(P) -> R + Sync + Send,
{
    tracing::info!(cases = cases.len(), "sweep started");
    cases.into_par_iter().map(f).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn results_keep_case_order() {
        let cases: Vec<u64> = (0..64).collect();
        let out = run_sweep(cases, |n| n * n);
        assert_eq!(out, (0..64).map(|n| n * n).collect::<Vec<_>>());
    }

    #[test]
    fn empty_sweep() {
        let out: Vec<u8> = run_sweep(Vec::<u8>::new(), |n| n);
        assert!(out.is_empty());
    }
}
