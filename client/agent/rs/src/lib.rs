//! Shared entities and the Health Agent wire API.
//!
//! Consumed by both `bin/control` (the central control plane) and `bin/agent`
//! (the per-host process), so that a tuple, a server record, or an agent
//! request means exactly one thing everywhere it is decoded.

pub mod entities;

pub mod api;

pub use entities::error::DeployError;
