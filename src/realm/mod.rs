//! # Realm Verifier
//! Checks that a `return_to` url belongs to the realm a user is asked to trust.

use std::fmt::Display;

use regex::{Regex, RegexBuilder};
use tracing::{debug, warn};
use url::Url;

use crate::discovery::Discovery;
use crate::types::{codes, ErrorKind, OpenIdError, OpenIdHttpClient, OpenIdReturnType, RealmOptions};

/// Result of a realm check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RealmMatch {
    /// `return_to` belongs to the realm
    Ok,
    /// The realm domain is on the denylist
    DeniedRealm,
    /// The realm is not a valid url
    MalformedRealm,
    /// `return_to` is not a valid url
    MalformedReturnTo,
    /// The realm has a fragment
    FragmentNotAllowed,
    /// Schemes differ
    ProtocolMismatch,
    /// Ports differ
    PortMismatch,
    /// `return_to` is not under the realm path
    PathMismatch,
    /// `return_to` host is not the realm host (or a subdomain of a wildcard realm)
    DomainMismatch,
    /// RP discovery on the realm failed
    RpDiscoveryFailed,
    /// RP discovery found no endpoint matching `return_to`
    RpInvalidEndpoint,
}

impl RealmMatch {
    /// Stable code
    pub fn code(&self) -> &'static str {
        match self {
            RealmMatch::Ok => "ok",
            RealmMatch::DeniedRealm => "denied_realm",
            RealmMatch::MalformedRealm => "malformed_realm",
            RealmMatch::MalformedReturnTo => "malformed_return_to",
            RealmMatch::FragmentNotAllowed => "fragment_not_allowed",
            RealmMatch::ProtocolMismatch => "protocol_mismatch",
            RealmMatch::PortMismatch => "port_mismatch",
            RealmMatch::PathMismatch => "path_mismatch",
            RealmMatch::DomainMismatch => "domain_mismatch",
            RealmMatch::RpDiscoveryFailed => "rp_discovery_failed",
            RealmMatch::RpInvalidEndpoint => "rp_invalid_endpoint",
        }
    }

    /// Checks for [RealmMatch::Ok]
    pub fn is_ok(&self) -> bool {
        *self == RealmMatch::Ok
    }
}

impl Display for RealmMatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Host part of a realm before it is parsed, eg `*.example.com` of `https://*.example.com:8080/`
fn realm_domain(realm: &str) -> &str {
    let without_scheme = realm.split_once("://").map(|(_, r)| r).unwrap_or(realm);

    let end = without_scheme
        .find(['/', ':', '?', '#'])
        .unwrap_or(without_scheme.len());

    &without_scheme[..end]
}

fn normalized_path(url: &Url) -> String {
    let path = url.path();
    if path.ends_with('/') {
        path.to_string()
    } else {
        format!("{path}/")
    }
}

/// # RealmVerifier
/// Static realm matching, optionally confirmed by relying party discovery on the realm.
#[derive(Debug, Clone)]
pub struct RealmVerifier {
    denied_domains: Vec<Regex>,
    options: RealmOptions,
    discovery: Option<Discovery>,
}

impl RealmVerifier {
    /// Compiles the denylist of `options`
    pub fn new(options: RealmOptions) -> OpenIdReturnType<Self> {
        let denied_domains = options
            .denied_realm_domains
            .iter()
            .map(|pattern| {
                RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| {
                        Box::new(OpenIdError::new_server_error(
                            ErrorKind::Configuration,
                            codes::INVALID_PARAMETER,
                            format!("invalid denied realm pattern {pattern}: {e}"),
                        ))
                    })
            })
            .collect::<OpenIdReturnType<Vec<Regex>>>()?;

        Ok(Self {
            denied_domains,
            options,
            discovery: None,
        })
    }

    /// Enables RP discovery with `discovery`
    pub fn with_discovery(mut self, discovery: Discovery) -> Self {
        self.discovery = Some(discovery);
        self
    }

    /// # Static Match
    /// Matches `return_to` against `realm` without network access.
    ///
    /// A realm may start its host with `*.`, which matches the host itself and any subdomain.
    pub fn match_return_to(&self, realm: &str, return_to: &str) -> RealmMatch {
        let domain = realm_domain(realm);
        if self.denied_domains.iter().any(|d| d.is_match(domain)) {
            return RealmMatch::DeniedRealm;
        }

        let (realm, wildcard) = match realm.split_once("://*.") {
            Some((scheme, rest)) => (format!("{scheme}://{rest}"), true),
            None => (realm.to_string(), false),
        };

        let realm = match Url::parse(&realm) {
            Ok(url) if matches!(url.scheme(), "http" | "https") && url.host_str().is_some() => url,
            _ => return RealmMatch::MalformedRealm,
        };

        if realm.fragment().is_some() {
            return RealmMatch::FragmentNotAllowed;
        }

        let return_to = match Url::parse(return_to) {
            Ok(url) if matches!(url.scheme(), "http" | "https") && url.host_str().is_some() => url,
            _ => return RealmMatch::MalformedReturnTo,
        };

        if realm.scheme() != return_to.scheme() {
            return RealmMatch::ProtocolMismatch;
        }

        let realm_host = realm.host_str().unwrap_or_default().to_ascii_lowercase();
        let return_host = return_to.host_str().unwrap_or_default().to_ascii_lowercase();

        let domain_matches = if wildcard {
            return_host == realm_host || return_host.ends_with(&format!(".{realm_host}"))
        } else {
            return_host == realm_host
        };

        if !domain_matches {
            return RealmMatch::DomainMismatch;
        }

        if realm.port_or_known_default() != return_to.port_or_known_default() {
            return RealmMatch::PortMismatch;
        }

        if !normalized_path(&return_to).starts_with(&normalized_path(&realm)) {
            return RealmMatch::PathMismatch;
        }

        RealmMatch::Ok
    }

    /// # Validate
    /// Static match followed, for OpenID 2.0 with `enforce_rp_discovery`, by relying party
    /// discovery on the realm. Any discovered endpoint that matches `return_to` statically
    /// confirms the realm.
    pub async fn validate_async<T>(
        &self,
        realm: &str,
        return_to: &str,
        is_openid1: bool,
        enforce_rp_discovery: bool,
        http_client: &T,
    ) -> RealmMatch
    where
        T: OpenIdHttpClient,
    {
        let result = self.match_return_to(realm, return_to);
        if !result.is_ok() || is_openid1 || !enforce_rp_discovery {
            return result;
        }

        let discovered = match (&self.discovery, Url::parse(&realm.replacen("://*.", "://www.", 1))) {
            (Some(discovery), Ok(realm_url)) => {
                discovery.discover_rp_async(&realm_url, http_client).await
            }
            (None, _) => {
                warn!(realm, "RP discovery requested without a discovery engine");
                return self.rp_discovery_failed();
            }
            (_, Err(_)) => return RealmMatch::MalformedRealm,
        };

        let endpoints = match discovered {
            Ok(endpoints) => endpoints,
            Err(e) => {
                debug!(realm, error = %e, "RP discovery failed");
                return self.rp_discovery_failed();
            }
        };

        if endpoints
            .iter()
            .any(|e| self.match_return_to(e.endpoint.as_str(), return_to).is_ok())
        {
            RealmMatch::Ok
        } else {
            RealmMatch::RpInvalidEndpoint
        }
    }

    fn rp_discovery_failed(&self) -> RealmMatch {
        if self.options.soft_fail_rp_discovery {
            warn!("ignoring failed RP discovery");
            RealmMatch::Ok
        } else {
            RealmMatch::RpDiscoveryFailed
        }
    }
}
