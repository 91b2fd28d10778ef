//! Core domain types and traits for GuessWho infrastructure synthesis.
//!
//! This crate contains:
//! - Environment registry and the resource naming policy
//! - Resource constructs (tables, compute units, API front doors, grants)
//! - Pipeline, stage and action definitions
//! - Provisioner and action-runner traits consumed by backends

pub mod api;
pub mod environment;
pub mod error;
pub mod id;
pub mod naming;
pub mod pipeline;
pub mod provisioner;
pub mod resource;
pub mod runner;
pub mod secret;

pub use environment::{Environment, EnvironmentMap};
pub use error::{Error, Result};
pub use id::ResourceId;
pub use naming::{DeploymentTarget, ResourceName, StackContext};
pub use secret::SecretValue;
