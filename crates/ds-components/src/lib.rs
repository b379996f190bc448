//! Demonstration plant subsystems and controllers for drivesim.
//!
//! Each physical block implements [`ds_sim::Subsystem`] and validates its
//! parameters at construction. Parameters are passed as uom quantities and
//! stored in SI base units.

pub mod controller;
pub mod drive;
pub mod inverter;
pub mod machine;
pub mod mechanics;
pub mod rl_load;
pub mod sampled;

pub use controller::OpenLoopVoltage;
pub use drive::{DcLinkParams, DriveModel, PmsmDriveParams, assemble_pmsm_drive};
pub use inverter::{DcLinkInverter, StiffInverter};
pub use machine::PmSyncMachine;
pub use mechanics::Mechanics;
pub use rl_load::RlLoad;
pub use sampled::SampleConfig;
