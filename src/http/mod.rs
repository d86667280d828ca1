//! HTTP server, routing table, and common header extraction. See spec
//! §4.9.

pub mod headers;
pub mod router;
pub mod server;

pub use headers::{HeaderError, TransactionHeaders};
pub use router::{Handler, HandlerRequest, HandlerResponse, Router, RouterBuilder};
pub use server::{HttpServer, HttpServerConfig, HttpServerError};
