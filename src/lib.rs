//! Halo is the communication substrate of a block-structured adaptive mesh
//! refinement (AMR) code. The mesh is a forest of equally sized blocks at
//! refinement levels that differ by at most one between neighbors. Each
//! block carries ghost zones, which are filled from neighboring blocks by a
//! non-blocking boundary exchange (with restriction and prolongation across
//! level jumps, and flux correction at coarse-fine faces). The per-stage
//! work of a time step is expressed as tasks with dependencies, which a
//! polling scheduler runs without ever blocking on a message.

pub mod array;
pub mod bvals;
pub mod config;
pub mod coordinates;
pub mod driver;
pub mod error;
pub mod field;
pub mod index_space;
pub mod kernel;
pub mod mesh;
pub mod message;
pub mod neighbor;
pub mod refinement;
pub mod tasks;
pub mod thread_pool;

pub use error::{Error, Result};
