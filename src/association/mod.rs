//! # Associations
//! Shared MAC keys, their Diffie-Hellman negotiation and storage.

#[allow(clippy::module_inception)]
mod association;
mod diffie_hellman;
mod store;

pub use association::{Association, AssociationType, FAILED_ASSOCIATION_HANDLE};
pub use diffie_hellman::{
    AssociationSessionType, DiffieHellmanSession, DEFAULT_GENERATOR, DEFAULT_MODULUS_HEX,
};
pub use store::{
    ConsumerAssociationStore, InMemoryConsumerAssociationStore, InMemoryServerAssociationStore,
    ServerAssociationStore, HANDLE_GENERATION_ATTEMPTS,
};
