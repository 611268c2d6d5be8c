//! Gateway wiring: router, server, and upstream forwarder.

pub mod proxy;
pub mod router;
pub mod server;

pub use router::{ApiHandle, build_api, create_router};
pub use server::Gateway;
