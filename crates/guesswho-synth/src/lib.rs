//! Environment composition and pipeline synthesis for GuessWho.
//!
//! Synthesis is a single synchronous pass: one environment unit per
//! environment, then the delivery pipeline that promotes the compute
//! artifact through them. The first construction error aborts the pass.

pub mod assembly;
pub mod environment_unit;
pub mod pipeline;
pub mod provision;

pub use assembly::{Assembly, synthesize};
pub use environment_unit::{EnvironmentUnit, build_environment_unit, build_environment_units};
pub use pipeline::{PipelineBuilder, build_pipeline};
pub use provision::{DryRunProvisioner, ProvisionCall, ProvisionReport, provision_assembly};
