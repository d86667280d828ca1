//! The v2 HTTP front end: wire schemas and the nine routed endpoints. See
//! spec §4.8.

pub mod v2;
pub mod wire;

pub use v2::{register_routes, FrontEndState};
