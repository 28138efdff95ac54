//! # Server
//! Provider side of the protocol.

mod response;
#[allow(clippy::module_inception)]
mod server;

pub use response::{AuthResponse, DirectResponse};
pub use server::ServerManager;
