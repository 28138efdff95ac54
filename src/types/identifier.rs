use std::fmt::Display;

use serde::{Deserialize, Serialize};
use url::Url;

use super::{codes, ErrorKind, OpenIdError, OpenIdReturnType};

/// Characters that mark the start of an XRI (global context symbols and cross references)
const XRI_GLOBAL_CONTEXT_SYMBOLS: [char; 6] = ['=', '@', '+', '$', '!', '('];

/// # Identifier
/// A user supplied or discovered identifier, normalized per OpenID 2.0 §7.2.
///
/// Two identifiers are equal when their normalized forms are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Identifier {
    /// An absolute http or https url without fragment
    Url(Url),
    /// An XRI in its canonical (i-name/i-number) form
    Xri(String),
}

impl Identifier {
    /// Parses and normalizes user input.
    ///
    /// - `xri://` prefixes are removed
    /// - Input starting with an XRI global context symbol is an XRI
    /// - Anything else is a url. `http://` is assumed when there is no scheme, the fragment is
    ///   dropped and the url is normalized.
    pub fn parse(input: &str) -> OpenIdReturnType<Identifier> {
        let trimmed = input.trim();

        let without_xri_scheme = trimmed
            .strip_prefix("xri://")
            .or_else(|| trimmed.strip_prefix("XRI://"))
            .unwrap_or(trimmed);

        if without_xri_scheme.is_empty() {
            return Err(invalid_identifier("identifier is empty"));
        }

        if without_xri_scheme.starts_with(XRI_GLOBAL_CONTEXT_SYMBOLS) {
            return Ok(Identifier::Xri(without_xri_scheme.to_string()));
        }

        let with_scheme = if without_xri_scheme.contains("://") {
            without_xri_scheme.to_string()
        } else {
            format!("http://{without_xri_scheme}")
        };

        let mut url = Url::parse(&with_scheme)
            .map_err(|e| invalid_identifier(format!("{input} is not a valid url ({e})")))?;

        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(invalid_identifier(format!(
                "{input} is not an http or https url"
            )));
        }

        url.set_fragment(None);

        Ok(Identifier::Url(url))
    }

    /// Builds a url identifier from an already discovered url, dropping the fragment
    pub fn from_url(mut url: Url) -> Identifier {
        url.set_fragment(None);
        Identifier::Url(url)
    }

    /// Normalized string form
    pub fn as_str(&self) -> &str {
        match self {
            Identifier::Url(url) => url.as_str(),
            Identifier::Xri(xri) => xri,
        }
    }

    /// Checks if the identifier is an XRI
    pub fn is_xri(&self) -> bool {
        matches!(self, Identifier::Xri(_))
    }

    /// The url of a url identifier
    pub fn url(&self) -> Option<&Url> {
        match self {
            Identifier::Url(url) => Some(url),
            Identifier::Xri(_) => None,
        }
    }
}

impl Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn invalid_identifier(message: impl Into<String>) -> Box<OpenIdError> {
    Box::new(OpenIdError::new_discovery_error(
        ErrorKind::Configuration,
        codes::INVALID_IDENTIFIER,
        message,
        None,
    ))
}
