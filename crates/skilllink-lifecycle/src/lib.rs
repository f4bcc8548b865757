//! Job lifecycle management for Skilllink.
//!
//! Enforces the job status state machine over any [`JobStore`]. The store's
//! atomic conditional update decides every race; the manager never merges
//! state on its own.
//!
//! [`JobStore`]: skilllink_core::JobStore

pub mod manager;

pub use manager::JobLifecycleManager;
