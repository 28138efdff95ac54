use std::collections::HashMap;

use crate::helpers::{form_url_encoded_to_string_map, string_map_to_form_url_encoded};
use crate::types::{codes, OpenIdError, OpenIdReturnType};

/// Prefix of protocol parameters in url encoded messages
pub const OPENID_PREFIX: &str = "openid.";

/// # ParameterList
/// Ordered list of protocol parameters with unique keys.
///
/// Keys are stored without the `openid.` prefix, which is only added when the list is put on the
/// wire in url encoded form.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ParameterList {
    params: Vec<(String, String)>,
}

impl ParameterList {
    /// Creates an empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a list from pairs. Later duplicates replace earlier values.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let mut list = Self::new();
        for (k, v) in pairs {
            list.set(k, v);
        }
        list
    }

    /// Parses key-value form: `key:value` lines separated by `\n`
    pub fn from_key_value_form(text: &str) -> OpenIdReturnType<Self> {
        let mut list = Self::new();

        for line in text.split('\n') {
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }

            let (key, value) = line.split_once(':').ok_or_else(|| {
                Box::new(OpenIdError::new_message_parse_error(
                    codes::MALFORMED_MESSAGE,
                    format!("key-value line without a colon: {line}"),
                ))
            })?;

            list.insert_unique(key, value)?;
        }

        Ok(list)
    }

    /// Picks the `openid.` prefixed parameters out of request parameters and strips the prefix.
    /// Other parameters (eg those of the return_to url) are ignored.
    pub fn from_request_parameters<K, V>(
        pairs: impl IntoIterator<Item = (K, V)>,
    ) -> OpenIdReturnType<Self>
    where
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut list = Self::new();

        for (k, v) in pairs {
            if let Some(key) = k.as_ref().strip_prefix(OPENID_PREFIX) {
                list.insert_unique(key, v)?;
            }
        }

        Ok(list)
    }

    /// Parses a url encoded query or form body, see [Self::from_request_parameters]
    pub fn from_url_encoded(query: &str) -> OpenIdReturnType<Self> {
        Self::from_request_parameters(form_url_encoded_to_string_map(query))
    }

    fn insert_unique(&mut self, key: &str, value: impl Into<String>) -> OpenIdReturnType<()> {
        if self.has(key) {
            return Err(Box::new(OpenIdError::new_message_parse_error(
                codes::MALFORMED_MESSAGE,
                format!("duplicate parameter {key}"),
            )));
        }
        self.params.push((key.to_string(), value.into()));
        Ok(())
    }

    /// Sets `key`. An existing key keeps its position.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();

        match self.params.iter_mut().find(|(k, _)| *k == key) {
            Some(existing) => existing.1 = value,
            None => self.params.push((key, value)),
        }
    }

    /// Value of `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Checks if `key` is present
    pub fn has(&self, key: &str) -> bool {
        self.params.iter().any(|(k, _)| k == key)
    }

    /// Removes `key`, returning its value
    pub fn remove(&mut self, key: &str) -> Option<String> {
        let index = self.params.iter().position(|(k, _)| k == key)?;
        Some(self.params.remove(index).1)
    }

    /// Iterates over the parameters in order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Parameter keys in order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.params.iter().map(|(k, _)| k.as_str())
    }

    /// Number of parameters
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Checks if the list is empty
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Parameters under `prefix.`, with the prefix stripped
    pub fn with_prefix_stripped(&self, prefix: &str) -> ParameterList {
        let dotted = format!("{prefix}.");
        ParameterList {
            params: self
                .params
                .iter()
                .filter_map(|(k, v)| {
                    k.strip_prefix(&dotted)
                        .map(|stripped| (stripped.to_string(), v.clone()))
                })
                .collect(),
        }
    }

    /// Checks that every parameter survives both wire encodings.
    ///
    /// Keys must be non empty and free of `:` and newlines, values free of newlines.
    pub fn validate(&self) -> OpenIdReturnType<()> {
        for (k, v) in &self.params {
            if k.is_empty() || k.contains(':') || k.contains('\n') {
                return Err(Box::new(OpenIdError::new_message_error(
                    codes::INVALID_PARAMETER,
                    format!("invalid parameter name {k:?}"),
                )));
            }

            if v.contains('\n') {
                return Err(Box::new(OpenIdError::new_message_error(
                    codes::INVALID_PARAMETER,
                    format!("value of {k} contains a newline"),
                )));
            }
        }
        Ok(())
    }

    /// Key-value form, used for direct responses
    pub fn to_key_value_form(&self) -> String {
        self.params
            .iter()
            .map(|(k, v)| format!("{k}:{v}\n"))
            .collect()
    }

    /// `openid.` prefixed pairs, used for indirect messages and direct requests
    pub fn to_wire_pairs(&self) -> Vec<(String, String)> {
        self.params
            .iter()
            .map(|(k, v)| (format!("{OPENID_PREFIX}{k}"), v.clone()))
            .collect()
    }

    /// `openid.` prefixed, url encoded
    pub fn to_url_encoded(&self) -> String {
        string_map_to_form_url_encoded(&self.to_wire_pairs())
    }

    /// Copy of the parameters as a map
    pub(crate) fn to_map(&self) -> HashMap<String, String> {
        self.params.iter().cloned().collect()
    }
}
