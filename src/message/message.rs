use url::Url;

use super::extensions::{ExtensionRegistry, MessageExtension, SREG10_URI};
use super::ParameterList;
use crate::helpers::string_map_to_form_url_encoded;
use crate::types::{codes, OpenIdError, OpenIdReturnType};

/// Namespace of OpenID 2.0 messages
pub const OPENID2_NS: &str = "http://specs.openid.net/auth/2.0";
/// Namespace some OpenID 1.1 implementations declare
pub const OPENID11_NS: &str = "http://openid.net/signon/1.1";
/// Namespace some OpenID 1.0 implementations declare
pub const OPENID10_NS: &str = "http://openid.net/signon/1.0";

/// Alias the Simple Registration 1.0 extension always uses
pub const SREG_ALIAS: &str = "sreg";

/// Protocol version of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolVersion {
    /// OpenID 1.0 and 1.1, no namespace
    OpenId1,
    /// OpenID 2.0
    OpenId2,
}

impl ProtocolVersion {
    /// Checks for OpenID 2.0
    pub fn is_version2(&self) -> bool {
        *self == ProtocolVersion::OpenId2
    }
}

/// # Message
/// Parameters of a protocol message plus the extension aliases declared in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    params: ParameterList,
    version: ProtocolVersion,
    /// `(type uri, alias)` in declaration order
    extensions: Vec<(String, String)>,
}

impl Message {
    /// Creates an empty message. OpenID 2.0 messages get their namespace parameter.
    pub fn new(version: ProtocolVersion) -> Self {
        let mut params = ParameterList::new();
        if version.is_version2() {
            params.set("ns", OPENID2_NS);
        }

        Self {
            params,
            version,
            extensions: vec![],
        }
    }

    /// Wraps received parameters.
    ///
    /// The version comes from `ns`. Extension aliases come from `ns.<alias>` declarations in
    /// OpenID 2.0 and from the fixed `sreg` prefix in OpenID 1.x.
    pub fn from_parameters(params: ParameterList) -> OpenIdReturnType<Self> {
        let version = match params.get("ns") {
            None | Some(OPENID11_NS) | Some(OPENID10_NS) => ProtocolVersion::OpenId1,
            Some(OPENID2_NS) => ProtocolVersion::OpenId2,
            Some(other) => {
                return Err(Box::new(OpenIdError::new_message_error(
                    codes::VERSION_MISMATCH,
                    format!("unknown protocol namespace {other}"),
                )))
            }
        };

        let mut extensions: Vec<(String, String)> = vec![];

        for (key, value) in params.iter() {
            let Some(alias) = key.strip_prefix("ns.") else {
                continue;
            };

            if !version.is_version2() {
                return Err(Box::new(OpenIdError::new_message_error(
                    codes::VERSION_MISMATCH,
                    format!("OpenID 1.x message declares extension namespace {key}"),
                )));
            }

            if alias.is_empty() || alias.contains('.') || alias.contains(',') {
                return Err(Box::new(OpenIdError::new_message_error(
                    codes::EXTENSION_ERROR,
                    format!("invalid extension alias {alias:?}"),
                )));
            }

            if extensions.iter().any(|(uri, _)| uri == value) {
                return Err(Box::new(OpenIdError::new_message_error(
                    codes::EXTENSION_ERROR,
                    format!("extension {value} is declared twice"),
                )));
            }

            extensions.push((value.to_string(), alias.to_string()));
        }

        if !version.is_version2() && params.keys().any(|k| k.starts_with("sreg.")) {
            extensions.push((SREG10_URI.to_string(), SREG_ALIAS.to_string()));
        }

        Ok(Self {
            params,
            version,
            extensions,
        })
    }

    /// Parses a key-value form body
    pub fn from_key_value_form(text: &str) -> OpenIdReturnType<Self> {
        Self::from_parameters(ParameterList::from_key_value_form(text)?)
    }

    /// Parses a url encoded query or form body
    pub fn from_url_encoded(query: &str) -> OpenIdReturnType<Self> {
        Self::from_parameters(ParameterList::from_url_encoded(query)?)
    }

    /// Protocol version
    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    /// Checks for OpenID 2.0
    pub fn is_version2(&self) -> bool {
        self.version.is_version2()
    }

    /// `mode` parameter
    pub fn mode(&self) -> Option<&str> {
        self.params.get("mode")
    }

    /// Value of `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key)
    }

    /// Sets `key`
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.params.set(key, value);
    }

    /// Sets `key` when `value` is some
    pub fn set_optional(&mut self, key: &str, value: Option<impl Into<String>>) {
        if let Some(value) = value {
            self.params.set(key, value);
        }
    }

    /// Removes `key`
    pub(crate) fn remove(&mut self, key: &str) -> Option<String> {
        self.params.remove(key)
    }

    /// Checks if `key` is present
    pub fn has(&self, key: &str) -> bool {
        self.params.has(key)
    }

    /// All parameters
    pub fn parameters(&self) -> &ParameterList {
        &self.params
    }

    /// Value of `key`, or a missing field error
    pub fn required(&self, key: &str) -> OpenIdReturnType<&str> {
        self.params.get(key).ok_or_else(|| {
            Box::new(OpenIdError::new_message_error(
                codes::MISSING_FIELD,
                format!("missing required parameter {key}"),
            ))
        })
    }

    /// Checks that all `keys` are present
    pub fn require_all(&self, keys: &[&str]) -> OpenIdReturnType<()> {
        for key in keys {
            self.required(key)?;
        }
        Ok(())
    }

    /// Value of `key` parsed as an absolute url
    pub fn url(&self, key: &str) -> OpenIdReturnType<Option<Url>> {
        self.params
            .get(key)
            .map(|v| {
                Url::parse(v).map_err(|_| {
                    Box::new(OpenIdError::new_message_error(
                        codes::INVALID_URL,
                        format!("{key} is not a valid url: {v}"),
                    ))
                })
            })
            .transpose()
    }

    /// Checks that the `mode` is one of `modes`
    pub fn expect_mode(&self, modes: &[&str]) -> OpenIdReturnType<&str> {
        let mode = self.required("mode")?;
        if !modes.contains(&mode) {
            return Err(Box::new(OpenIdError::new_message_error(
                codes::INVALID_MODE,
                format!("unexpected mode {mode}, expected one of {}", modes.join(", ")),
            )));
        }
        Ok(mode)
    }

    /// Checks the parameters survive both wire encodings
    pub fn validate_parameters(&self) -> OpenIdReturnType<()> {
        self.params.validate()
    }

    /// Key-value form encoding
    pub fn key_value_form(&self) -> String {
        self.params.to_key_value_form()
    }

    /// `openid.` prefixed pairs
    pub fn wire_parameters(&self) -> Vec<(String, String)> {
        self.params.to_wire_pairs()
    }

    /// Url encoded `openid.` prefixed parameters, for POST bodies
    pub fn url_encoded(&self) -> String {
        self.params.to_url_encoded()
    }

    /// `base` with the message appended to its query. Existing query parameters are kept.
    pub fn destination_url(&self, base: &Url) -> Url {
        let mut url = base.clone();

        let mut pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        pairs.extend(self.wire_parameters());

        url.set_query(Some(&string_map_to_form_url_encoded(&pairs)));
        url
    }

    /// Alias of the extension with `type_uri`
    pub fn extension_alias(&self, type_uri: &str) -> Option<&str> {
        self.extensions
            .iter()
            .find(|(uri, _)| uri == type_uri)
            .map(|(_, alias)| alias.as_str())
    }

    /// Type URIs of the extensions in the message
    pub fn extension_uris(&self) -> impl Iterator<Item = &str> {
        self.extensions.iter().map(|(uri, _)| uri.as_str())
    }

    /// Checks if the extension with `type_uri` is in the message
    pub fn has_extension(&self, type_uri: &str) -> bool {
        self.extension_alias(type_uri).is_some()
    }

    /// Parameters of the extension with `type_uri`, without its alias prefix
    pub fn extension_parameters(&self, type_uri: &str) -> Option<ParameterList> {
        let alias = self.extension_alias(type_uri)?;
        Some(self.params.with_prefix_stripped(alias))
    }

    /// Keys, with the alias prefix, that belong to the extension with `type_uri`.
    /// Includes the `ns.<alias>` declaration.
    pub fn extension_keys(&self, type_uri: &str) -> Vec<String> {
        let Some(alias) = self.extension_alias(type_uri) else {
            return vec![];
        };

        let prefix = format!("{alias}.");
        let declaration = format!("ns.{alias}");

        self.params
            .keys()
            .filter(|k| k.starts_with(&prefix) || *k == declaration)
            .map(str::to_string)
            .collect()
    }

    /// Adds `extension` under a fresh alias.
    ///
    /// Simple Registration 1.0 always uses `sreg`. Others get `ext1`, `ext2` and so on. OpenID
    /// 1.x messages can only carry Simple Registration, having no way to declare namespaces.
    pub fn add_extension(&mut self, extension: &dyn MessageExtension) -> OpenIdReturnType<String> {
        let type_uri = extension.type_uri();

        if self.has_extension(type_uri) {
            return Err(Box::new(OpenIdError::new_message_error(
                codes::EXTENSION_ERROR,
                format!("extension {type_uri} is already present"),
            )));
        }

        let alias = if type_uri == SREG10_URI {
            if self.extensions.iter().any(|(_, a)| a == SREG_ALIAS) {
                return Err(Box::new(OpenIdError::new_message_error(
                    codes::EXTENSION_ERROR,
                    "alias sreg is already taken",
                )));
            }
            SREG_ALIAS.to_string()
        } else if !self.is_version2() {
            return Err(Box::new(OpenIdError::new_message_error(
                codes::EXTENSION_ERROR,
                format!("{type_uri} can not be used with OpenID 1.x"),
            )));
        } else {
            (1..)
                .map(|n| format!("ext{n}"))
                .find(|a| !self.extensions.iter().any(|(_, taken)| taken == a))
                .unwrap_or_default()
        };

        if self.is_version2() {
            self.params.set(format!("ns.{alias}"), type_uri);
        }

        for (key, value) in extension.parameters().iter() {
            self.params.set(format!("{alias}.{key}"), value);
        }

        self.extensions.push((type_uri.to_string(), alias.clone()));
        Ok(alias)
    }

    /// Builds the extension with `type_uri` through the factory registered for it.
    /// Returns none when the message does not carry the extension.
    pub fn extension(
        &self,
        type_uri: &str,
        registry: &ExtensionRegistry,
        is_request: bool,
    ) -> OpenIdReturnType<Option<Box<dyn MessageExtension>>> {
        let Some(params) = self.extension_parameters(type_uri) else {
            return Ok(None);
        };

        registry.create(type_uri, &params, is_request).map(Some)
    }

    /// The `field:value\n` text a signature is computed over.
    ///
    /// `mode` is read as `id_res` for check_authentication requests, which carry the assertion
    /// under a different mode.
    pub fn signature_text(&self, signed: &[String]) -> OpenIdReturnType<String> {
        let mut text = String::new();

        for field in signed {
            let value = match field.as_str() {
                "mode" if self.mode() == Some("check_authentication") => "id_res",
                _ => self.params.get(field).ok_or_else(|| {
                    Box::new(OpenIdError::new_message_error(
                        codes::MISSING_FIELD,
                        format!("signed field {field} is not in the message"),
                    ))
                })?,
            };

            text.push_str(field);
            text.push(':');
            text.push_str(value);
            text.push('\n');
        }

        Ok(text)
    }

    /// Fields listed in `signed`
    pub fn signed_fields(&self) -> Vec<String> {
        self.params
            .get("signed")
            .map(|s| {
                s.split(',')
                    .filter(|f| !f.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}
