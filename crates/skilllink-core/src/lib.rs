//! Core domain types and traits for the Skilllink marketplace.
//!
//! This crate contains:
//! - Resource identifiers
//! - Provider-signed sign-in assertions
//! - Actors and roles
//! - Job requests, their status state machine and query filters
//! - The persistence trait the lifecycle manager writes through

pub mod actor;
pub mod assertion;
pub mod error;
pub mod id;
pub mod job;
pub mod store;

pub use actor::{Actor, Role};
pub use assertion::{AssertionError, ProviderKey};
pub use error::{Error, Result};
pub use id::ResourceId;
pub use job::{JobFilter, JobRequest, JobStatus, NewJob, StatusGroup, Transition};
pub use store::{AssigneeGuard, JobPatch, JobStore, Precondition, UpdateOutcome};
