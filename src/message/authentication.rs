use url::Url;

use super::extensions::{ExtensionRegistry, MessageExtension};
use super::{
    Message, ProtocolMessage, ProtocolVersion, MODE_CANCEL, MODE_CHECKID_IMMEDIATE,
    MODE_CHECKID_SETUP, MODE_ID_RES, MODE_SETUP_NEEDED,
};
use crate::association::Association;
use crate::helpers::parse_nonce_timestamp;
use crate::types::{codes, OpenIdError, OpenIdReturnType, IDENTIFIER_SELECT};

/// Longest `response_nonce` accepted
pub const MAX_NONCE_LENGTH: usize = 255;

fn invalid(code: &'static str, message: impl Into<String>) -> Box<OpenIdError> {
    Box::new(OpenIdError::new_message_error(code, message))
}

/// Parameters of an [AuthRequest]
#[derive(Debug, Clone)]
pub struct AuthRequestParams {
    /// Protocol version of the provider endpoint
    pub version: ProtocolVersion,
    /// Identifier the user claims to own (2.0)
    pub claimed_id: Option<String>,
    /// Provider local identifier
    pub identity: Option<String>,
    /// Where the provider sends the response
    pub return_to: Option<Url>,
    /// Realm (`trust_root` in 1.x) the user is asked to trust
    pub realm: Option<String>,
    /// Association to sign the response with
    pub assoc_handle: Option<String>,
    /// `checkid_immediate` instead of `checkid_setup`
    pub immediate: bool,
}

impl Default for AuthRequestParams {
    fn default() -> Self {
        Self {
            version: ProtocolVersion::OpenId2,
            claimed_id: None,
            identity: None,
            return_to: None,
            realm: None,
            assoc_handle: None,
            immediate: false,
        }
    }
}

/// # AuthRequest
/// `checkid_setup` or `checkid_immediate` request, sent to the provider through the user agent.
#[derive(Debug, Clone)]
pub struct AuthRequest {
    message: Message,
}

impl AuthRequest {
    /// Builds a request from `params`
    pub fn create(params: AuthRequestParams) -> OpenIdReturnType<Self> {
        let version = params.version;
        let mut message = Message::new(version);

        message.set(
            "mode",
            if params.immediate {
                MODE_CHECKID_IMMEDIATE
            } else {
                MODE_CHECKID_SETUP
            },
        );

        if version.is_version2() {
            message.set_optional("claimed_id", params.claimed_id);
        }
        message.set_optional("identity", params.identity);
        message.set_optional("assoc_handle", params.assoc_handle);
        message.set_optional("return_to", params.return_to.map(String::from));

        let realm_key = if version.is_version2() {
            "realm"
        } else {
            "trust_root"
        };
        message.set_optional(realm_key, params.realm);

        let request = Self { message };
        request.validate()?;
        Ok(request)
    }

    /// Reads a received request
    pub fn from_message(message: Message) -> OpenIdReturnType<Self> {
        let request = Self { message };
        request.validate()?;
        Ok(request)
    }

    /// Protocol version
    pub fn version(&self) -> ProtocolVersion {
        self.message.version()
    }

    /// Whether the provider must answer without interacting with the user
    pub fn is_immediate(&self) -> bool {
        self.message.mode() == Some(MODE_CHECKID_IMMEDIATE)
    }

    /// Claimed identifier
    pub fn claimed_id(&self) -> Option<&str> {
        self.message.get("claimed_id")
    }

    /// Provider local identifier
    pub fn identity(&self) -> Option<&str> {
        self.message.get("identity")
    }

    /// Whether the provider is asked to choose the identifier
    pub fn is_identifier_select(&self) -> bool {
        self.identity() == Some(IDENTIFIER_SELECT)
    }

    /// Association handle
    pub fn assoc_handle(&self) -> Option<&str> {
        self.message.get("assoc_handle")
    }

    /// Parsed `return_to`
    pub fn return_to(&self) -> Option<Url> {
        self.message
            .get("return_to")
            .and_then(|r| Url::parse(r).ok())
    }

    /// `realm`, or `trust_root` in 1.x, defaulting to `return_to`
    pub fn realm(&self) -> Option<&str> {
        self.message
            .get("realm")
            .or_else(|| self.message.get("trust_root"))
            .or_else(|| self.message.get("return_to"))
    }

    /// Attaches `extension`, see [Message::add_extension]
    pub fn add_extension(&mut self, extension: &dyn MessageExtension) -> OpenIdReturnType<String> {
        self.message.add_extension(extension)
    }

    /// Builds the request side of the extension with `type_uri`
    pub fn extension(
        &self,
        type_uri: &str,
        registry: &ExtensionRegistry,
    ) -> OpenIdReturnType<Option<Box<dyn MessageExtension>>> {
        self.message.extension(type_uri, registry, true)
    }

    /// Url that sends the user agent to `op_endpoint` with this request
    pub fn destination_url(&self, op_endpoint: &Url) -> Url {
        self.message.destination_url(op_endpoint)
    }
}

impl ProtocolMessage for AuthRequest {
    fn message(&self) -> &Message {
        &self.message
    }

    fn validate(&self) -> OpenIdReturnType<()> {
        let message = &self.message;
        message.validate_parameters()?;
        message.expect_mode(&[MODE_CHECKID_SETUP, MODE_CHECKID_IMMEDIATE])?;

        message.url("return_to")?;

        if message.is_version2() {
            if !message.has("return_to") && !message.has("realm") {
                return Err(invalid(
                    codes::MISSING_FIELD,
                    "either return_to or realm is required",
                ));
            }

            if message.has("claimed_id") != message.has("identity") {
                return Err(invalid(
                    codes::INVALID_IDENTITY,
                    "claimed_id and identity must be sent together",
                ));
            }

            if message.has("trust_root") {
                return Err(invalid(
                    codes::VERSION_MISMATCH,
                    "trust_root is not an OpenID 2.0 parameter",
                ));
            }
        } else {
            message.require_all(&["identity", "return_to"])?;

            if message.has("realm") || message.has("claimed_id") {
                return Err(invalid(
                    codes::VERSION_MISMATCH,
                    "realm and claimed_id are OpenID 2.0 parameters",
                ));
            }
        }

        Ok(())
    }
}

/// Parameters of an [AuthSuccess]
#[derive(Debug, Clone)]
pub struct AuthSuccessParams {
    /// Protocol version of the request being answered
    pub version: ProtocolVersion,
    /// Provider endpoint (2.0)
    pub op_endpoint: Url,
    /// Claimed identifier (2.0)
    pub claimed_id: Option<String>,
    /// Provider local identifier
    pub identity: Option<String>,
    /// `return_to` of the request
    pub return_to: Url,
    /// Fresh nonce (2.0)
    pub response_nonce: Option<String>,
    /// Handle of the association the relying party asked for but the provider did not use
    pub invalidate_handle: Option<String>,
    /// Handle of the association that signs the response
    pub assoc_handle: String,
}

/// # AuthSuccess
/// Positive assertion (`id_res`) and its signature.
#[derive(Debug, Clone)]
pub struct AuthSuccess {
    message: Message,
    signed: Vec<String>,
    extra_signed: Vec<String>,
    must_sign_extensions: Vec<String>,
    identifying_extension: bool,
}

impl AuthSuccess {
    /// Builds an unsigned assertion and its signed list
    pub fn create(params: AuthSuccessParams) -> OpenIdReturnType<Self> {
        let version = params.version;
        let mut message = Message::new(version);
        message.set("mode", MODE_ID_RES);

        if version.is_version2() {
            message.set("op_endpoint", params.op_endpoint.as_str());
            message.set_optional("claimed_id", params.claimed_id);
        }
        message.set_optional("identity", params.identity);
        message.set("return_to", params.return_to.as_str());

        if version.is_version2() {
            let nonce = params
                .response_nonce
                .ok_or_else(|| invalid(codes::MISSING_FIELD, "response_nonce is required"))?;
            message.set("response_nonce", nonce);
        }

        message.set_optional("invalidate_handle", params.invalidate_handle);
        message.set("assoc_handle", params.assoc_handle);

        let mut success = Self {
            message,
            signed: vec![],
            extra_signed: vec![],
            must_sign_extensions: vec![],
            identifying_extension: false,
        };
        success.build_signed_list();
        Ok(success)
    }

    /// Reads a received assertion. Signature and nonce freshness are checked by the caller.
    pub fn from_message(message: Message, registry: &ExtensionRegistry) -> OpenIdReturnType<Self> {
        let must_sign_extensions = message
            .extension_uris()
            .filter(|uri| registry.signature_required(uri))
            .map(str::to_string)
            .collect();

        let identifying_extension = message
            .extension_uris()
            .any(|uri| registry.provides_identifier(uri));

        let success = Self {
            signed: message.signed_fields(),
            message,
            extra_signed: vec![],
            must_sign_extensions,
            identifying_extension,
        };
        success.validate()?;
        Ok(success)
    }

    /// Fields every assertion of this version signs, when present
    fn base_signed_fields(&self) -> &'static [&'static str] {
        if self.message.is_version2() {
            &[
                "op_endpoint",
                "claimed_id",
                "identity",
                "return_to",
                "response_nonce",
                "assoc_handle",
            ]
        } else {
            &["return_to", "identity"]
        }
    }

    /// Recomputes the signed list and stores it in `signed`.
    ///
    /// Call again after adding fields or extensions, before [Self::sign].
    pub fn build_signed_list(&mut self) {
        let mut signed: Vec<String> = vec![];
        let mut push = |field: String| {
            if !signed.contains(&field) {
                signed.push(field);
            }
        };

        for field in self.base_signed_fields() {
            if self.message.has(field) {
                push(field.to_string());
            }
        }

        for field in &self.extra_signed {
            push(field.clone());
        }

        for uri in &self.must_sign_extensions {
            for key in self.message.extension_keys(uri) {
                push(key);
            }
        }

        self.message.set("signed", signed.join(","));
        self.signed = signed;
    }

    /// Asks for `fields` to be signed too. Takes effect on the next [Self::build_signed_list].
    pub fn sign_fields(&mut self, fields: &[&str]) {
        for field in fields {
            if !self.extra_signed.iter().any(|f| f == field) {
                self.extra_signed.push(field.to_string());
            }
        }
    }

    /// Attaches `extension`. Extensions that require signing join the signed list on the next
    /// [Self::build_signed_list].
    pub fn add_extension(&mut self, extension: &dyn MessageExtension) -> OpenIdReturnType<String> {
        let alias = self.message.add_extension(extension)?;

        if extension.signature_required() {
            self.must_sign_extensions
                .push(extension.type_uri().to_string());
        }
        if extension.provides_identifier() {
            self.identifying_extension = true;
        }

        Ok(alias)
    }

    /// Builds the response side of the extension with `type_uri`.
    ///
    /// Only reached after [ProtocolMessage::validate] checked must-sign coverage.
    pub fn extension(
        &self,
        type_uri: &str,
        registry: &ExtensionRegistry,
    ) -> OpenIdReturnType<Option<Box<dyn MessageExtension>>> {
        self.message.extension(type_uri, registry, false)
    }

    /// Signed fields in order
    pub fn signed_fields(&self) -> &[String] {
        &self.signed
    }

    /// Text the signature covers
    pub fn signature_text(&self) -> OpenIdReturnType<String> {
        self.message.signature_text(&self.signed)
    }

    /// Signs the signed list with `association` and stores the signature in `sig`
    pub fn sign(&mut self, association: &Association) -> OpenIdReturnType<()> {
        if self.message.get("assoc_handle") != Some(association.handle()) {
            return Err(invalid(
                codes::INVALID_PARAMETER,
                "assoc_handle does not name the signing association",
            ));
        }

        let signature = association.sign_text(&self.signature_text()?)?;
        self.message.set("sig", signature);
        Ok(())
    }

    /// Checks `sig` against `association`
    pub fn verify_signature(&self, association: &Association) -> bool {
        match (self.signature_text(), self.signature()) {
            (Ok(text), Some(signature)) => association.verify_signature(&text, signature),
            _ => false,
        }
    }

    /// `sig`
    pub fn signature(&self) -> Option<&str> {
        self.message.get("sig")
    }

    /// Protocol version
    pub fn version(&self) -> ProtocolVersion {
        self.message.version()
    }

    /// `op_endpoint` (2.0)
    pub fn op_endpoint(&self) -> Option<&str> {
        self.message.get("op_endpoint")
    }

    /// `claimed_id` (2.0)
    pub fn claimed_id(&self) -> Option<&str> {
        self.message.get("claimed_id")
    }

    /// `identity`
    pub fn identity(&self) -> Option<&str> {
        self.message.get("identity")
    }

    /// `return_to`
    pub fn return_to(&self) -> Option<&str> {
        self.message.get("return_to")
    }

    /// `response_nonce` (2.0)
    pub fn response_nonce(&self) -> Option<&str> {
        self.message.get("response_nonce")
    }

    /// `assoc_handle`
    pub fn assoc_handle(&self) -> Option<&str> {
        self.message.get("assoc_handle")
    }

    /// `invalidate_handle`
    pub fn invalidate_handle(&self) -> Option<&str> {
        self.message.get("invalidate_handle")
    }

    /// Url that sends the user agent back to the relying party with this assertion
    pub fn destination_url(&self) -> OpenIdReturnType<Url> {
        let return_to = self
            .message
            .url("return_to")?
            .ok_or_else(|| invalid(codes::MISSING_FIELD, "return_to is required"))?;
        Ok(self.message.destination_url(&return_to))
    }

    fn require_signed(&self, field: &str) -> OpenIdReturnType<()> {
        if self.signed.iter().any(|f| f == field) {
            Ok(())
        } else {
            Err(invalid(
                codes::UNSIGNED_FIELD,
                format!("{field} is not signed"),
            ))
        }
    }
}

impl ProtocolMessage for AuthSuccess {
    fn message(&self) -> &Message {
        &self.message
    }

    fn validate(&self) -> OpenIdReturnType<()> {
        let message = &self.message;
        message.validate_parameters()?;
        message.expect_mode(&[MODE_ID_RES])?;
        message.require_all(&["return_to", "assoc_handle", "signed", "sig"])?;

        message.url("return_to")?;
        message.url("op_endpoint")?;

        self.require_signed("return_to")?;

        if message.is_version2() {
            message.require_all(&["op_endpoint", "response_nonce"])?;
            self.require_signed("op_endpoint")?;
            self.require_signed("response_nonce")?;
            self.require_signed("assoc_handle")?;

            if message.has("claimed_id") != message.has("identity") && !self.identifying_extension
            {
                return Err(invalid(
                    codes::INVALID_IDENTITY,
                    "claimed_id and identity must be present together",
                ));
            }

            for field in ["claimed_id", "identity"] {
                if message.has(field) {
                    self.require_signed(field)?;
                }
            }

            let nonce = message.required("response_nonce")?;
            if nonce.len() > MAX_NONCE_LENGTH || parse_nonce_timestamp(nonce).is_none() {
                return Err(invalid(
                    codes::INVALID_NONCE,
                    format!("malformed response_nonce {nonce}"),
                ));
            }
        } else {
            if message.has("op_endpoint") || message.has("response_nonce") {
                return Err(invalid(
                    codes::VERSION_MISMATCH,
                    "op_endpoint and response_nonce are OpenID 2.0 parameters",
                ));
            }

            if message.has("identity") {
                self.require_signed("identity")?;
            } else if !self.identifying_extension {
                return Err(invalid(
                    codes::INVALID_IDENTITY,
                    "assertion carries no identity",
                ));
            }
        }

        for uri in &self.must_sign_extensions {
            for key in message.extension_keys(uri) {
                self.require_signed(&key)?;
            }
        }

        Ok(())
    }
}

/// Kind of negative assertion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailureKind {
    /// The user declined
    Cancel,
    /// An immediate request needs user interaction
    SetupNeeded,
}

/// # AuthFailure
/// Negative assertion: `cancel` or `setup_needed`. OpenID 1.x signals setup needed as `id_res`
/// with a `user_setup_url`.
#[derive(Debug, Clone)]
pub struct AuthFailure {
    message: Message,
    kind: AuthFailureKind,
}

impl AuthFailure {
    /// Builds a negative assertion. `user_setup_url` is required for 1.x setup needed answers.
    pub fn create(
        version: ProtocolVersion,
        kind: AuthFailureKind,
        user_setup_url: Option<&Url>,
    ) -> OpenIdReturnType<Self> {
        let mut message = Message::new(version);

        match kind {
            AuthFailureKind::Cancel => message.set("mode", MODE_CANCEL),
            AuthFailureKind::SetupNeeded if version.is_version2() => {
                message.set("mode", MODE_SETUP_NEEDED)
            }
            AuthFailureKind::SetupNeeded => {
                message.set("mode", MODE_ID_RES);
                let url = user_setup_url.ok_or_else(|| {
                    invalid(codes::MISSING_FIELD, "user_setup_url is required in OpenID 1.x")
                })?;
                message.set("user_setup_url", url.as_str());
            }
        }

        Ok(Self { message, kind })
    }

    /// Checks if a received indirect message is a negative assertion
    pub fn is_failure(message: &Message) -> bool {
        match message.mode() {
            Some(MODE_CANCEL) => true,
            Some(MODE_SETUP_NEEDED) => message.is_version2(),
            Some(MODE_ID_RES) => !message.is_version2() && message.has("user_setup_url"),
            _ => false,
        }
    }

    /// Reads a received negative assertion
    pub fn from_message(message: Message) -> OpenIdReturnType<Self> {
        let kind = match message.mode() {
            Some(MODE_CANCEL) => AuthFailureKind::Cancel,
            _ if Self::is_failure(&message) => AuthFailureKind::SetupNeeded,
            other => {
                return Err(invalid(
                    codes::INVALID_MODE,
                    format!("{other:?} is not a negative assertion"),
                ))
            }
        };

        let failure = Self { message, kind };
        failure.validate()?;
        Ok(failure)
    }

    /// Kind of failure
    pub fn kind(&self) -> AuthFailureKind {
        self.kind
    }

    /// Url where the user can complete setup (1.x)
    pub fn user_setup_url(&self) -> Option<&str> {
        self.message.get("user_setup_url")
    }

    /// Url that sends the user agent to `return_to` with this answer
    pub fn destination_url(&self, return_to: &Url) -> Url {
        self.message.destination_url(return_to)
    }
}

impl ProtocolMessage for AuthFailure {
    fn message(&self) -> &Message {
        &self.message
    }

    fn validate(&self) -> OpenIdReturnType<()> {
        self.message.validate_parameters()?;
        self.message.url("user_setup_url")?;
        Ok(())
    }
}
