//! Repository layer: one zero-sized struct per table.

pub mod job_repo;

pub use job_repo::JobRepo;
