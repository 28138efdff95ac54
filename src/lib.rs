#![warn(missing_docs)]
//! # OpenID Engine
//!
//! OpenID 1.1 and 2.0 authentication for both sides of the protocol: the relying party
//! (consumer) and the provider (server).
//!
//! Http is done through the [types::OpenIdHttpClient] trait. With the default `http_client`
//! feature [http_client::DefaultHttpClient] implements it on top of reqwest. XRDS parsing and
//! XRI resolution are pluggable through [types::XrdsParser] and [types::XriResolver].
//!
//! ## Relying Party
//!
//! ### New Instance
//! - [consumer::ConsumerManager::new]
//!
//! ### Flow
//! - [consumer::ConsumerManager::discover_async]
//! - [consumer::ConsumerManager::associate_async]
//! - [consumer::ConsumerManager::authenticate]
//! - [consumer::ConsumerManager::verify_async]
//!
//! ## Provider
//!
//! ### New Instance
//! - [server::ServerManager::new]
//!
//! ### Requests
//! - [server::ServerManager::association_response]
//! - [server::ServerManager::auth_response_async]
//! - [server::ServerManager::sign]
//! - [server::ServerManager::verify]
//!
//! ## Building Blocks
//! - [discovery::Discovery]
//! - [realm::RealmVerifier]
//! - [nonce::InMemoryNonceVerifier]
//! - [association::DiffieHellmanSession]
//! - [message::Message] and the concrete messages in [message]
//! - [message::extensions] for Simple Registration and Attribute Exchange

pub mod association;
pub mod consumer;
pub mod discovery;
/// Helpers
pub mod helpers;
mod http;
#[cfg(feature = "http_client")]
pub mod http_client;
pub mod message;
pub mod nonce;
pub mod realm;
pub mod server;
#[cfg(test)]
mod tests;
pub mod types;

/// Re exports from the crate
pub mod re_exports {
    pub use url;
}
