use std::fmt::Debug;
use std::sync::Arc;

use tracing::{debug, info, warn};
use url::Url;

use super::{VerificationResult, VerifiedAssertion};
use crate::association::{
    Association, AssociationSessionType, AssociationType, ConsumerAssociationStore,
    DiffieHellmanSession, InMemoryConsumerAssociationStore,
};
use crate::discovery::Discovery;
use crate::helpers::now;
use crate::http::{consumer_error, request_async};
use crate::message::extensions::ExtensionRegistry;
use crate::message::{
    AssociationError, AssociationRequest, AssociationResponse, AuthFailureKind, AuthRequest,
    AuthRequestParams, AuthSuccess, DirectError, Message, OpenIdMessage, ParameterList,
    ProtocolMessage, ProtocolVersion, VerifyRequest, VerifyResponse,
};
use crate::nonce::{generate_nonce, InMemoryNonceVerifier, NonceResult, NonceVerifier};
use crate::types::{
    codes, ConsumerOptions, ErrorKind, HttpMethod, HttpRequest, Identifier, OpenIdError,
    OpenIdHttpClient, OpenIdReturnType, ServiceEndpoint, ServiceType, IDENTIFIER_SELECT,
};

/// Seconds a declined association negotiation is remembered before it is attempted again
pub const FAILED_ASSOCIATION_LIFETIME: i64 = 300;

/// `return_to` query parameter carrying the consumer's own nonce on OpenID 1.x requests, whose
/// assertions have no `response_nonce`
pub const RP_NONCE_PARAMETER: &str = "rp_nonce";

fn consumer_failure(kind: ErrorKind, code: &'static str, message: impl Into<String>) -> Box<OpenIdError> {
    Box::new(OpenIdError::new_consumer_error(kind, code, message))
}

/// Answer of one association attempt
enum Negotiation {
    Established(Association),
    Unsupported(Option<(AssociationType, AssociationSessionType)>),
}

/// # ConsumerManager
/// Discovers providers, negotiates associations, builds authentication requests and verifies
/// the responses.
pub struct ConsumerManager {
    discovery: Discovery,
    associations: Arc<dyn ConsumerAssociationStore>,
    nonces: Arc<dyn NonceVerifier>,
    extensions: ExtensionRegistry,
    options: ConsumerOptions,
    now: fn() -> i64,
}

impl ConsumerManager {
    /// Creates a consumer with in-memory association and nonce stores
    pub fn new(discovery: Discovery, options: ConsumerOptions) -> Self {
        let discovery = discovery.with_options(options.discovery.clone());

        Self {
            discovery,
            associations: Arc::new(InMemoryConsumerAssociationStore::new()),
            nonces: Arc::new(InMemoryNonceVerifier::new(options.max_nonce_age)),
            extensions: ExtensionRegistry::with_defaults(),
            options,
            now,
        }
    }

    /// Replaces the association store
    pub fn with_association_store(mut self, store: Arc<dyn ConsumerAssociationStore>) -> Self {
        self.associations = store;
        self
    }

    /// Replaces the nonce verifier
    pub fn with_nonce_verifier(mut self, nonces: Arc<dyn NonceVerifier>) -> Self {
        self.nonces = nonces;
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

    /// Extension registry used for received assertions
    pub fn extensions(&self) -> &ExtensionRegistry {
        &self.extensions
    }

    /// # Discover
    /// Parses `identifier` and discovers its provider endpoints, most preferred first
    pub async fn discover_async<T>(
        &self,
        identifier: &str,
        http_client: &T,
    ) -> OpenIdReturnType<Vec<ServiceEndpoint>>
    where
        T: OpenIdHttpClient,
    {
        let identifier = Identifier::parse(identifier)?;
        self.discovery
            .discover_async(&identifier, http_client)
            .await
            .into_endpoints()
    }

    fn direct_request(&self, endpoint: &Url, message: &dyn ProtocolMessage) -> HttpRequest {
        HttpRequest::new(endpoint.clone())
            .method(HttpMethod::POST)
            .form(&message.wire_parameters())
            .max_redirects(0)
            .max_body_size(self.options.discovery.max_body_size)
            .timeout(self.options.discovery.timeout)
    }

    fn session_allowed(&self, endpoint: &ServiceEndpoint, session: AssociationSessionType) -> bool {
        session.is_diffie_hellman()
            || (self.options.allow_no_encryption && endpoint.endpoint.scheme() == "https")
    }

    /// # Associate
    /// Returns an association with the provider of `endpoint`, negotiating a new one when none
    /// is stored.
    ///
    /// An `unsupported-type` answer is retried once with the provider's suggestion. When
    /// negotiation fails the failure is remembered for [FAILED_ASSOCIATION_LIFETIME] seconds and
    /// `None` is returned, meaning the flow continues in stateless mode.
    pub async fn associate_async<T>(
        &self,
        endpoint: &ServiceEndpoint,
        http_client: &T,
    ) -> Option<Association>
    where
        T: OpenIdHttpClient,
    {
        let op_url = endpoint.endpoint.as_str();

        if let Some(existing) = self.associations.load_latest(op_url) {
            if existing.is_failed() {
                debug!(op_url, "association negotiation failed recently");
                return None;
            }
            return Some(existing);
        }

        let (mut assoc_type, mut session_type) = if endpoint.is_version2() {
            self.options.preferred_association
        } else {
            self.options.openid1_association
        };

        if !self.session_allowed(endpoint, session_type) {
            session_type = AssociationSessionType::for_association(assoc_type);
        }

        for attempt in 1..=2 {
            match self
                .negotiate(endpoint, assoc_type, session_type, http_client)
                .await
            {
                Ok(Negotiation::Established(association)) => {
                    info!(op_url, handle = association.handle(), "association established");
                    self.associations.save(op_url, association.clone());
                    return Some(association);
                }
                Ok(Negotiation::Unsupported(Some((suggested_type, suggested_session))))
                    if attempt == 1
                        && endpoint.is_version2()
                        && self.session_allowed(endpoint, suggested_session) =>
                {
                    debug!(op_url, %suggested_type, %suggested_session, "retrying with the suggested association");
                    assoc_type = suggested_type;
                    session_type = suggested_session;
                }
                Ok(Negotiation::Unsupported(_)) => {
                    debug!(op_url, "provider declined the association");
                    break;
                }
                Err(e) => {
                    warn!(op_url, error = %e, "association failed");
                    break;
                }
            }
        }

        self.associations.save(
            op_url,
            Association::Failed {
                expiry: (self.now)() + FAILED_ASSOCIATION_LIFETIME,
            },
        );

        None
    }

    async fn negotiate<T>(
        &self,
        endpoint: &ServiceEndpoint,
        assoc_type: AssociationType,
        session_type: AssociationSessionType,
        http_client: &T,
    ) -> OpenIdReturnType<Negotiation>
    where
        T: OpenIdHttpClient,
    {
        let version = if endpoint.is_version2() {
            ProtocolVersion::OpenId2
        } else {
            ProtocolVersion::OpenId1
        };

        let dh = if session_type.is_diffie_hellman() {
            Some(DiffieHellmanSession::create_default(session_type)?)
        } else {
            None
        };

        let request = AssociationRequest::create(version, assoc_type, dh.as_ref())?;
        let http_request = self.direct_request(&endpoint.endpoint, &request);

        let response = request_async(http_request, http_client, consumer_error).await?;
        let message = Message::from_key_value_form(response.body.as_deref().unwrap_or_default())?;

        match response.status_code {
            200 => {
                let response = AssociationResponse::from_message(message, &request)?;
                Ok(Negotiation::Established(
                    response.association(dh.as_ref(), (self.now)())?,
                ))
            }
            400 if AssociationError::is_association_error(&message) => {
                let error = AssociationError::from_message(message)?;
                debug!(error = error.error(), "association error");
                Ok(Negotiation::Unsupported(error.suggestion()))
            }
            status => {
                let detail = DirectError::from_message(message)
                    .map(|e| e.error().to_string())
                    .unwrap_or_default();

                Err(consumer_failure(
                    ErrorKind::Protocol,
                    codes::PROVIDER_ERROR,
                    format!("association answered {status}: {detail}"),
                ))
            }
        }
    }

    /// # Authenticate
    /// Builds the authentication request for `endpoint`. OP identifier endpoints ask the
    /// provider to select the identifier. OpenID 1.x requests get a [RP_NONCE_PARAMETER] added
    /// to `return_to`. Send the user agent to [AuthRequest::destination_url] of the result.
    pub fn authenticate(
        &self,
        endpoint: &ServiceEndpoint,
        return_to: &Url,
        realm: Option<&str>,
        association: Option<&Association>,
    ) -> OpenIdReturnType<AuthRequest> {
        let version = if endpoint.is_version2() {
            ProtocolVersion::OpenId2
        } else {
            ProtocolVersion::OpenId1
        };

        let (claimed_id, identity) = if endpoint.is_op_select() {
            (
                Some(IDENTIFIER_SELECT.to_string()),
                Some(IDENTIFIER_SELECT.to_string()),
            )
        } else {
            (
                endpoint
                    .claimed_identifier
                    .as_ref()
                    .map(|c| c.as_str().to_string()),
                endpoint.local_identifier(),
            )
        };

        let mut return_to = return_to.clone();
        if !version.is_version2() {
            return_to
                .query_pairs_mut()
                .append_pair(RP_NONCE_PARAMETER, &generate_nonce((self.now)()));
        }

        AuthRequest::create(AuthRequestParams {
            version,
            claimed_id,
            identity,
            return_to: Some(return_to),
            realm: realm.map(str::to_string),
            assoc_handle: association
                .filter(|a| !a.is_failed())
                .map(|a| a.handle().to_string()),
            immediate: self.options.immediate,
        })
    }

    /// # Verify
    /// Checks the provider response that arrived at `receiving_url`.
    ///
    /// `discovered` is the endpoint the request was sent to; OpenID 1.x responses can not be
    /// verified without it. Positive assertions are checked for `return_to`, discovered
    /// information, nonce replay and signature, in that order.
    pub async fn verify_async<T>(
        &self,
        receiving_url: &Url,
        params: ParameterList,
        discovered: Option<&ServiceEndpoint>,
        http_client: &T,
    ) -> VerificationResult
    where
        T: OpenIdHttpClient,
    {
        let parsed = Message::from_parameters(params)
            .and_then(|message| OpenIdMessage::from_message(message, &self.extensions));

        let assertion = match parsed {
            Ok(OpenIdMessage::AuthSuccess(assertion)) => assertion,
            Ok(OpenIdMessage::AuthFailure(failure)) => {
                return match failure.kind() {
                    AuthFailureKind::Cancel => VerificationResult::Cancelled,
                    AuthFailureKind::SetupNeeded => VerificationResult::SetupNeeded {
                        user_setup_url: failure.user_setup_url().map(str::to_string),
                    },
                }
            }
            Ok(OpenIdMessage::IndirectError(error)) => {
                return VerificationResult::Failed(consumer_failure(
                    ErrorKind::Protocol,
                    codes::PROVIDER_ERROR,
                    error.error(),
                ))
            }
            Ok(_) => {
                return VerificationResult::Failed(consumer_failure(
                    ErrorKind::Protocol,
                    codes::INVALID_MODE,
                    "not a response to an authentication request",
                ))
            }
            Err(e) => return VerificationResult::Failed(e),
        };

        match self
            .verify_assertion(receiving_url, assertion, discovered, http_client)
            .await
        {
            Ok(verified) => {
                info!(verified_id = ?verified.verified_id, "assertion verified");
                VerificationResult::Success(Box::new(verified))
            }
            Err(e) => {
                debug!(error = %e, "assertion rejected");
                VerificationResult::Failed(e)
            }
        }
    }

    async fn verify_assertion<T>(
        &self,
        receiving_url: &Url,
        assertion: AuthSuccess,
        discovered: Option<&ServiceEndpoint>,
        http_client: &T,
    ) -> OpenIdReturnType<VerifiedAssertion>
    where
        T: OpenIdHttpClient,
    {
        verify_return_to(receiving_url, assertion.return_to().unwrap_or_default())?;

        let (endpoint, verified_id) = self
            .verify_discovered_information(&assertion, discovered, http_client)
            .await?;

        let op_url = endpoint.endpoint.as_str();

        let nonce = if assertion.version().is_version2() {
            assertion.response_nonce().map(str::to_string)
        } else {
            Some(rp_nonce(&assertion)?)
        };

        if let Some(nonce) = nonce {
            let result = self.nonces.seen(op_url, &nonce);
            if result != NonceResult::Ok {
                return Err(consumer_failure(
                    ErrorKind::Protocol,
                    codes::INVALID_NONCE,
                    format!("nonce rejected: {result:?}"),
                ));
            }
        }

        let handle = assertion.assoc_handle().unwrap_or_default();
        let association = self
            .associations
            .load(op_url, handle)
            .filter(|a| !a.is_failed());

        let valid = match association {
            Some(association) => assertion.verify_signature(&association),
            None if self.options.allow_stateless => {
                self.check_authentication(&endpoint, &assertion, http_client)
                    .await?
            }
            None => {
                return Err(consumer_failure(
                    ErrorKind::Configuration,
                    codes::INVALID_SIGNATURE,
                    format!("no association {handle} and stateless mode is disabled"),
                ))
            }
        };

        if !valid {
            return Err(consumer_failure(
                ErrorKind::Protocol,
                codes::INVALID_SIGNATURE,
                "signature verification failed",
            ));
        }

        Ok(VerifiedAssertion {
            verified_id,
            endpoint,
            assertion,
        })
    }

    /// Confirms the assertion with the provider. Honours `invalidate_handle` in the answer.
    async fn check_authentication<T>(
        &self,
        endpoint: &ServiceEndpoint,
        assertion: &AuthSuccess,
        http_client: &T,
    ) -> OpenIdReturnType<bool>
    where
        T: OpenIdHttpClient,
    {
        let request = VerifyRequest::from_auth_success(assertion);
        let http_request = self.direct_request(&endpoint.endpoint, &request);

        let response = request_async(http_request, http_client, consumer_error).await?;
        if response.status_code != 200 {
            return Err(consumer_failure(
                ErrorKind::Transport,
                codes::UNEXPECTED_STATUS,
                format!("check_authentication answered {}", response.status_code),
            ));
        }

        let message = Message::from_key_value_form(response.body.as_deref().unwrap_or_default())?;
        let response = VerifyResponse::from_message(message)?;

        if let Some(handle) = response.invalidate_handle() {
            debug!(handle, "provider invalidated association");
            self.associations.remove(endpoint.endpoint.as_str(), handle);
        }

        Ok(response.is_valid())
    }

    /// Matches the assertion against the endpoint the request went to, re-discovering the
    /// claimed identifier when they differ. Returns the endpoint and the verified identifier.
    async fn verify_discovered_information<T>(
        &self,
        assertion: &AuthSuccess,
        discovered: Option<&ServiceEndpoint>,
        http_client: &T,
    ) -> OpenIdReturnType<(ServiceEndpoint, Option<String>)>
    where
        T: OpenIdHttpClient,
    {
        if !assertion.version().is_version2() {
            let endpoint = discovered.ok_or_else(|| {
                consumer_failure(
                    ErrorKind::Configuration,
                    codes::DISCOVERY_MISMATCH,
                    "OpenID 1.x responses need the discovered endpoint",
                )
            })?;

            if assertion.identity().map(str::to_string) != endpoint.local_identifier() {
                return Err(discovery_mismatch("identity differs from the discovered one"));
            }

            return Ok((
                endpoint.clone(),
                endpoint
                    .claimed_identifier
                    .as_ref()
                    .map(|c| c.as_str().to_string()),
            ));
        }

        let op_endpoint = Url::parse(assertion.op_endpoint().unwrap_or_default())
            .map_err(|_| discovery_mismatch("op_endpoint is not a url"))?;

        let Some(claimed_id) = assertion.claimed_id() else {
            let endpoint = discovered
                .filter(|d| d.endpoint == op_endpoint)
                .cloned()
                .unwrap_or_else(|| ServiceEndpoint::new(op_endpoint, ServiceType::OpenId2OpSelect));
            return Ok((endpoint, None));
        };

        let claimed = Identifier::parse(claimed_id)?;

        if let Some(endpoint) = discovered.filter(|d| endpoint_matches(d, assertion, &claimed, &op_endpoint)) {
            return Ok((endpoint.clone(), Some(claimed_id.to_string())));
        }

        if !self.options.rediscover_on_mismatch {
            return Err(discovery_mismatch(
                "assertion does not match the discovered endpoint",
            ));
        }

        debug!(claimed_id, "re-discovering the claimed identifier");

        let endpoints = self
            .discovery
            .discover_async(&claimed, http_client)
            .await
            .into_endpoints()?;

        endpoints
            .into_iter()
            .find(|e| endpoint_matches(e, assertion, &claimed, &op_endpoint))
            .map(|e| (e, Some(claimed_id.to_string())))
            .ok_or_else(|| discovery_mismatch("no discovered endpoint matches the assertion"))
    }
}

/// The consumer nonce of an OpenID 1.x assertion. `return_to` is signed, so the nonce is too.
fn rp_nonce(assertion: &AuthSuccess) -> OpenIdReturnType<String> {
    Url::parse(assertion.return_to().unwrap_or_default())
        .ok()
        .and_then(|return_to| {
            return_to
                .query_pairs()
                .find(|(k, _)| k == RP_NONCE_PARAMETER)
                .map(|(_, v)| v.into_owned())
        })
        .ok_or_else(|| {
            consumer_failure(
                ErrorKind::Protocol,
                codes::INVALID_NONCE,
                format!("return_to carries no {RP_NONCE_PARAMETER}"),
            )
        })
}

fn discovery_mismatch(message: &str) -> Box<OpenIdError> {
    consumer_failure(ErrorKind::Protocol, codes::DISCOVERY_MISMATCH, message)
}

fn endpoint_matches(
    endpoint: &ServiceEndpoint,
    assertion: &AuthSuccess,
    claimed: &Identifier,
    op_endpoint: &Url,
) -> bool {
    endpoint.is_version2()
        && !endpoint.is_op_select()
        && endpoint.endpoint == *op_endpoint
        && endpoint.claimed_identifier.as_ref() == Some(claimed)
        && assertion.identity().map(str::to_string) == endpoint.local_identifier()
}

/// Checks that the response arrived at its `return_to`: same scheme, authority and path, and
/// every `return_to` query parameter present with the same value
fn verify_return_to(receiving_url: &Url, return_to: &str) -> OpenIdReturnType<()> {
    let mismatch = |message: &str| {
        consumer_failure(ErrorKind::Protocol, codes::RETURN_TO_MISMATCH, message)
    };

    let return_to = Url::parse(return_to).map_err(|_| mismatch("return_to is not a url"))?;

    if return_to.scheme() != receiving_url.scheme()
        || return_to.host_str() != receiving_url.host_str()
        || return_to.port_or_known_default() != receiving_url.port_or_known_default()
        || return_to.path() != receiving_url.path()
    {
        return Err(mismatch("return_to does not match the receiving url"));
    }

    for (key, value) in return_to.query_pairs() {
        if !receiving_url
            .query_pairs()
            .any(|(k, v)| k == key && v == value)
        {
            return Err(mismatch(&format!("return_to parameter {key} is missing")));
        }
    }

    Ok(())
}

impl Debug for ConsumerManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsumerManager")
            .field("discovery", &self.discovery)
            .field("extensions", &self.extensions)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
