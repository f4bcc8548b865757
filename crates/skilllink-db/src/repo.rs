//! Job store implementations.

pub mod job;
pub mod memory;

pub use job::{JobRecord, PgJobRepo};
pub use memory::MemoryJobRepo;
