pub mod deployment;
pub mod error;
pub mod health;
pub mod secret;
pub mod server;
pub mod service;
pub mod sidecar;
pub mod tuple;

pub use deployment::*;
pub use health::*;
pub use secret::*;
pub use server::*;
pub use service::*;
pub use sidecar::*;
pub use tuple::*;
