use std::fmt::Debug;
use std::sync::Arc;

use tracing::{debug, info, warn};
use url::Url;

use super::{AuthResponse, DirectResponse};
use crate::association::{
    Association, AssociationSessionType, AssociationType, InMemoryServerAssociationStore,
    ServerAssociationStore,
};
use crate::discovery::Discovery;
use crate::helpers::{now, validate_url};
use crate::message::extensions::ExtensionRegistry;
use crate::message::{
    AssociationError, AssociationRequest, AssociationResponse, AuthFailure, AuthFailureKind,
    AuthRequest, AuthSuccess, AuthSuccessParams, DirectError, Message, ParameterList,
    ProtocolMessage, ProtocolVersion, VerifyRequest, VerifyResponse, MODE_CHECKID_SETUP,
};
use crate::nonce::generate_nonce;
use crate::realm::RealmVerifier;
use crate::types::{
    codes, ErrorKind, OpenIdError, OpenIdHttpClient, OpenIdReturnType, ServerOptions,
};

/// Association type the provider suggests when a request asks for an unsupported one
const SUGGESTED_ASSOCIATION: (AssociationType, AssociationSessionType) =
    (AssociationType::HmacSha256, AssociationSessionType::DhSha256);

fn server_failure(kind: ErrorKind, code: &'static str, message: impl Into<String>) -> Box<OpenIdError> {
    Box::new(OpenIdError::new_server_error(kind, code, message))
}

/// # ServerManager
/// Answers association, authentication and `check_authentication` requests.
///
/// Associations handed to relying parties live in the shared store. Assertions for relying
/// parties without a usable association are signed with single use private associations that
/// only `check_authentication` can confirm.
pub struct ServerManager {
    op_endpoint: Url,
    options: ServerOptions,
    shared: Arc<dyn ServerAssociationStore>,
    private: Arc<dyn ServerAssociationStore>,
    realm_verifier: RealmVerifier,
    extensions: ExtensionRegistry,
    now: fn() -> i64,
}

impl ServerManager {
    /// Creates a provider with in-memory association stores
    pub fn new(options: ServerOptions) -> OpenIdReturnType<Self> {
        let op_endpoint = validate_url(&options.op_endpoint).ok_or_else(|| {
            server_failure(
                ErrorKind::Configuration,
                codes::INVALID_URL,
                format!("op_endpoint {} is not an http(s) url", options.op_endpoint),
            )
        })?;

        Ok(Self {
            op_endpoint,
            realm_verifier: RealmVerifier::new(options.realm.clone())?,
            options,
            shared: Arc::new(InMemoryServerAssociationStore::new()),
            private: Arc::new(InMemoryServerAssociationStore::new()),
            extensions: ExtensionRegistry::with_defaults(),
            now,
        })
    }

    /// Enables RP discovery during realm verification
    pub fn with_discovery(mut self, discovery: Discovery) -> Self {
        let discovery = discovery.with_options(self.options.discovery.clone());
        self.realm_verifier = self.realm_verifier.with_discovery(discovery);
        self
    }

    /// Replaces the shared and private association stores
    pub fn with_association_stores(
        mut self,
        shared: Arc<dyn ServerAssociationStore>,
        private: Arc<dyn ServerAssociationStore>,
    ) -> Self {
        self.shared = shared;
        self.private = private;
        self
    }

    /// Replaces the extension registry
    pub fn with_extensions(mut self, extensions: ExtensionRegistry) -> Self {
        self.extensions = extensions;
        self
    }

    /// Reads the time from `now`
    pub fn with_clock(mut self, now: fn() -> i64) -> Self {
        self.now = now;
        self
    }

    /// Extension registry used for received requests
    pub fn extensions(&self) -> &ExtensionRegistry {
        &self.extensions
    }

    /// The provider endpoint
    pub fn op_endpoint(&self) -> &Url {
        &self.op_endpoint
    }

    /// # Association Response
    /// Answers an `associate` request. `is_https` tells whether the request arrived over TLS,
    /// which `no-encryption` sessions require.
    pub fn association_response(&self, params: ParameterList, is_https: bool) -> DirectResponse {
        let message = match Message::from_parameters(params) {
            Ok(message) => message,
            Err(e) => return direct_error(ProtocolVersion::OpenId2, &e.to_string()),
        };
        let version = message.version();

        let request = match AssociationRequest::from_message(message) {
            Ok(request) => request,
            Err(e) if e.code() == codes::UNSUPPORTED_TYPE && version.is_version2() => {
                debug!(error = %e, "unsupported association request");
                return DirectResponse::AssociationError(AssociationError::create(
                    &e.to_string(),
                    Some(SUGGESTED_ASSOCIATION),
                ));
            }
            Err(e) => return direct_error(version, &e.to_string()),
        };

        if request.session_type() == AssociationSessionType::NoEncryption
            && self.options.require_https_for_no_encryption
            && !is_https
        {
            let error = "no-encryption sessions require https";
            return if version.is_version2() {
                DirectResponse::AssociationError(AssociationError::create(
                    error,
                    Some((
                        request.assoc_type(),
                        AssociationSessionType::for_association(request.assoc_type()),
                    )),
                ))
            } else {
                direct_error(version, error)
            };
        }

        let response = self
            .shared
            .generate(request.assoc_type(), self.options.association_lifetime)
            .and_then(|association| {
                AssociationResponse::create(&request, &association, (self.now)())
            });

        match response {
            Ok(response) => {
                info!(
                    handle = response.assoc_handle(),
                    assoc_type = %request.assoc_type(),
                    "association created"
                );
                DirectResponse::Association(response)
            }
            Err(e) => {
                warn!(error = %e, "association failed");
                direct_error(version, &e.to_string())
            }
        }
    }

    /// # Authentication Response
    /// Answers `request` after the embedding application authenticated the user (or not).
    ///
    /// The realm must cover `return_to`. `claimed_id` and `local_id` are required when the
    /// relying party asked the provider to select the identifier and otherwise default to the
    /// ones in the request. The assertion is signed with the relying party's association or,
    /// when that is unknown or expired, with a private association and `invalidate_handle`.
    pub async fn auth_response_async<T>(
        &self,
        request: &AuthRequest,
        claimed_id: Option<&str>,
        local_id: Option<&str>,
        authenticated: bool,
        http_client: &T,
    ) -> OpenIdReturnType<AuthResponse>
    where
        T: OpenIdHttpClient,
    {
        let version = request.version();
        let return_to = request.return_to().ok_or_else(|| {
            server_failure(
                ErrorKind::Protocol,
                codes::MISSING_FIELD,
                "the request has no return_to to answer to",
            )
        })?;

        let realm = request.realm().unwrap_or_default();
        let realm_match = self
            .realm_verifier
            .validate_async(
                realm,
                return_to.as_str(),
                !version.is_version2(),
                self.options.enforce_rp_discovery,
                http_client,
            )
            .await;

        if !realm_match.is_ok() {
            return Err(server_failure(
                ErrorKind::Protocol,
                codes::REALM_MISMATCH,
                format!("{return_to} is not covered by realm {realm}: {realm_match}"),
            ));
        }

        if !authenticated {
            let (kind, setup_url) = if request.is_immediate() {
                let mut setup = request.message().clone();
                setup.set("mode", MODE_CHECKID_SETUP);
                (
                    AuthFailureKind::SetupNeeded,
                    Some(setup.destination_url(&self.op_endpoint)),
                )
            } else {
                (AuthFailureKind::Cancel, None)
            };

            return Ok(AuthResponse::Failure {
                failure: AuthFailure::create(version, kind, setup_url.as_ref())?,
                return_to,
            });
        }

        let missing_identifier = || {
            server_failure(
                ErrorKind::Configuration,
                codes::MISSING_FIELD,
                "the provider must choose the identifier for identifier select requests",
            )
        };

        let (claimed_id, identity) = if request.is_identifier_select() {
            (
                Some(claimed_id.ok_or_else(missing_identifier)?),
                Some(local_id.or(claimed_id).ok_or_else(missing_identifier)?),
            )
        } else {
            (
                claimed_id.or(request.claimed_id()),
                local_id.or(request.identity()),
            )
        };

        let (association, invalidate_handle) = self.signing_association(request, version)?;

        let mut success = AuthSuccess::create(AuthSuccessParams {
            version,
            op_endpoint: self.op_endpoint.clone(),
            claimed_id: claimed_id.map(str::to_string),
            identity: identity.map(str::to_string),
            return_to,
            response_nonce: version
                .is_version2()
                .then(|| generate_nonce((self.now)())),
            invalidate_handle,
            assoc_handle: association.handle().to_string(),
        })?;

        success.sign(&association)?;

        info!(identity = ?success.identity(), handle = association.handle(), "positive assertion");
        Ok(AuthResponse::Success(success))
    }

    /// The relying party's association when it is usable, a new private one otherwise
    fn signing_association(
        &self,
        request: &AuthRequest,
        version: ProtocolVersion,
    ) -> OpenIdReturnType<(Association, Option<String>)> {
        if let Some(handle) = request.assoc_handle() {
            if let Some(association) = self.shared.load(handle).filter(|a| !a.is_failed()) {
                return Ok((association, None));
            }
            debug!(handle, "unknown or expired association, signing privately");
        }

        let assoc_type = if version.is_version2() {
            AssociationType::HmacSha256
        } else {
            AssociationType::HmacSha1
        };

        let association = self
            .private
            .generate(assoc_type, self.options.private_association_lifetime)?;

        Ok((
            association,
            request.assoc_handle().map(str::to_string),
        ))
    }

    /// # Sign
    /// Rebuilds the signed list of `success` and signs it again, eg after extensions were added
    pub fn sign(&self, success: &mut AuthSuccess) -> OpenIdReturnType<()> {
        let handle = success.assoc_handle().unwrap_or_default().to_string();

        let association = self
            .shared
            .load(&handle)
            .or_else(|| self.private.load(&handle))
            .ok_or_else(|| {
                server_failure(
                    ErrorKind::Protocol,
                    codes::SIGNING_FAILED,
                    format!("association {handle} is unknown or expired"),
                )
            })?;

        success.build_signed_list();
        success.sign(&association)
    }

    /// # Verify
    /// Answers a `check_authentication` request. A private association confirms at most one
    /// assertion.
    pub fn verify(&self, params: ParameterList) -> DirectResponse {
        let request = match Message::from_parameters(params).and_then(VerifyRequest::from_message) {
            Ok(request) => request,
            Err(e) => return direct_error(ProtocolVersion::OpenId2, &e.to_string()),
        };
        let version = request.message().version();

        let handle = request.assoc_handle().unwrap_or_default();

        let is_valid = match self.private.load(handle) {
            // only the caller whose remove succeeds confirms the assertion
            Some(association) => {
                request.verify_signature(&association) && self.private.remove(handle)
            }
            None => {
                debug!(handle, "check_authentication for an unknown private association");
                false
            }
        };

        let invalidate_handle = request
            .invalidate_handle()
            .filter(|h| self.shared.load(h).is_none());

        info!(handle, is_valid, "check_authentication");
        DirectResponse::Verify(VerifyResponse::create(version, is_valid, invalidate_handle))
    }
}

fn direct_error(version: ProtocolVersion, error: &str) -> DirectResponse {
    DirectResponse::Error(DirectError::create(version, error))
}

impl Debug for ServerManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerManager")
            .field("op_endpoint", &self.op_endpoint.as_str())
            .field("realm_verifier", &self.realm_verifier)
            .field("extensions", &self.extensions)
            .finish_non_exhaustive()
    }
}
