//! # Consumer
//! Relying party side of the protocol.

#[allow(clippy::module_inception)]
mod consumer;
mod verification;

pub use consumer::{ConsumerManager, FAILED_ASSOCIATION_LIFETIME, RP_NONCE_PARAMETER};
pub use verification::{VerificationResult, VerifiedAssertion};
