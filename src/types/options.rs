use std::time::Duration;

use crate::association::{AssociationSessionType, AssociationType};

/// # DiscoveryOptions
/// Limits handed to the [crate::types::OpenIdHttpClient] on every discovery request
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    /// Maximum redirects followed while fetching identifiers and XRDS documents
    pub max_redirects: usize,
    /// Response bodies larger than this are a hard failure
    pub max_body_size: usize,
    /// Per request timeout
    pub timeout: Duration,
    /// Run HTML `<link>` discovery when Yadis fails or finds nothing
    pub html_fallback: bool,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            max_redirects: 10,
            max_body_size: 100_000,
            timeout: Duration::from_secs(10),
            html_fallback: true,
        }
    }
}

/// # RealmOptions
#[derive(Debug, Clone)]
pub struct RealmOptions {
    /// Regular expressions matched against the realm domain. A match denies the realm.
    pub denied_realm_domains: Vec<String>,
    /// When RP discovery fails, log and accept instead of rejecting
    pub soft_fail_rp_discovery: bool,
}

impl Default for RealmOptions {
    fn default() -> Self {
        Self {
            denied_realm_domains: vec![
                r"^\*\.[^.]+$".to_string(),
                r"^\*\.[a-z]{2,3}\.[a-z]{2}$".to_string(),
            ],
            soft_fail_rp_discovery: false,
        }
    }
}

/// # ConsumerOptions
#[derive(Debug, Clone)]
pub struct ConsumerOptions {
    /// Association requested from OpenID 2.0 providers
    pub preferred_association: (AssociationType, AssociationSessionType),
    /// Association requested from OpenID 1.x providers
    pub openid1_association: (AssociationType, AssociationSessionType),
    /// Allow `no-encryption` sessions over https
    pub allow_no_encryption: bool,
    /// Confirm assertions with `check_authentication` when no association is stored
    pub allow_stateless: bool,
    /// Maximum age of a `response_nonce`, in seconds
    pub max_nonce_age: i64,
    /// Re-discover the claimed identifier when the assertion does not match the discovered one
    pub rediscover_on_mismatch: bool,
    /// Send `checkid_immediate` instead of `checkid_setup`
    pub immediate: bool,
    /// Discovery limits
    pub discovery: DiscoveryOptions,
}

impl Default for ConsumerOptions {
    fn default() -> Self {
        Self {
            preferred_association: (AssociationType::HmacSha256, AssociationSessionType::DhSha256),
            openid1_association: (AssociationType::HmacSha1, AssociationSessionType::DhSha1),
            allow_no_encryption: false,
            allow_stateless: true,
            max_nonce_age: 60,
            rediscover_on_mismatch: true,
            immediate: false,
            discovery: DiscoveryOptions::default(),
        }
    }
}

/// # ServerOptions
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// The OP endpoint url, sent as `openid.op_endpoint`
    pub op_endpoint: String,
    /// Lifetime of associations negotiated with relying parties, in seconds
    pub association_lifetime: i64,
    /// Lifetime of private (stateless) associations, in seconds
    pub private_association_lifetime: i64,
    /// Only hand out `no-encryption` sessions over https
    pub require_https_for_no_encryption: bool,
    /// Reject authentication requests whose realm can not be confirmed by RP discovery
    pub enforce_rp_discovery: bool,
    /// Realm verification settings
    pub realm: RealmOptions,
    /// Discovery limits used for RP discovery
    pub discovery: DiscoveryOptions,
}

impl ServerOptions {
    /// Options for the OP reachable at `op_endpoint`
    pub fn new(op_endpoint: impl Into<String>) -> Self {
        Self {
            op_endpoint: op_endpoint.into(),
            association_lifetime: 1800,
            private_association_lifetime: 1800,
            require_https_for_no_encryption: true,
            enforce_rp_discovery: false,
            realm: RealmOptions::default(),
            discovery: DiscoveryOptions {
                max_redirects: 0,
                ..DiscoveryOptions::default()
            },
        }
    }
}
