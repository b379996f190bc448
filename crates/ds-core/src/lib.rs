//! ds-core: stable foundation for drivesim.
//!
//! Contains:
//! - units (uom SI types + constructors for electrical and mechanical quantities)
//! - numeric (Real + tolerances + float helpers)
//! - ids (compact IDs for subsystems and external ports)
//! - space_vector (three-phase <-> two-axis transforms)
//! - error (shared error types)

pub mod error;
pub mod ids;
pub mod numeric;
pub mod space_vector;
pub mod units;

// Re-exports: nice ergonomics for downstream crates
pub use error::{CoreError, CoreResult};
pub use ids::*;
pub use numeric::*;
pub use space_vector::{
    AlphaBetaZero, Complex64, abc_to_complex, complex_to_abc, duty_ratios_from_voltage,
    max_linear_voltage,
};
pub use units::*;
