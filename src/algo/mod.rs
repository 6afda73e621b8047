//! Mesh optimization algorithms.
//!
//! This module contains the local operators and the decision layer that
//! composes them:
//!
//! - **Queries**: vertex balls, surface balls and edge shells
//! - **Relocation**: interior, surface and curve-constrained vertex moves
//! - **Collapse**: edge collapse with the link condition, point deletion
//! - **Swap**: internal and boundary edge swaps
//! - **Optimization**: the boundary-cell driver and a reference sweep
//! - **Quality**: the quality/length oracle and mesh quality statistics
//!
//! Every operator either commits a valid edit or leaves the mesh untouched.
//! Errors are reserved for meshes found inconsistent.

pub mod ball;
pub mod collapse;
pub mod delete;
pub mod metric;
pub mod optimize;
pub mod progress;
pub mod quality;
pub mod relocate;
pub mod spatial;
pub mod swap;

pub use progress::Progress;
