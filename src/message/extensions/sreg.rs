use std::any::Any;
use std::collections::HashMap;

use super::{extension_error, ExtensionFactory, MessageExtension};
use crate::message::ParameterList;
use crate::types::OpenIdReturnType;

/// Simple Registration 1.0 namespace
pub const SREG10_URI: &str = "http://openid.net/sreg/1.0";
/// Simple Registration 1.1 namespace
pub const SREG11_URI: &str = "http://openid.net/extensions/sreg/1.1";

/// Profile fields Simple Registration defines
pub const SREG_FIELDS: [&str; 9] = [
    "nickname", "email", "fullname", "dob", "gender", "postcode", "country", "language", "timezone",
];

fn check_field(field: &str) -> OpenIdReturnType<()> {
    if SREG_FIELDS.contains(&field) {
        Ok(())
    } else {
        Err(extension_error(format!("unknown sreg field {field}")))
    }
}

fn field_list(parameters: &ParameterList, key: &str) -> OpenIdReturnType<Vec<String>> {
    let fields: Vec<String> = parameters
        .get(key)
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(str::to_string)
        .collect();

    for field in &fields {
        check_field(field)?;
    }

    Ok(fields)
}

/// # SRegRequest
/// Profile fields a relying party asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SRegRequest {
    type_uri: &'static str,
    required: Vec<String>,
    optional: Vec<String>,
    policy_url: Option<String>,
}

impl SRegRequest {
    /// Empty request in the `type_uri` namespace (1.0 or 1.1)
    pub fn new(type_uri: &'static str) -> Self {
        Self {
            type_uri,
            required: vec![],
            optional: vec![],
            policy_url: None,
        }
    }

    /// Asks for `field`. Requesting a field twice moves it to the latest list.
    pub fn request_field(&mut self, field: &str, required: bool) -> OpenIdReturnType<()> {
        check_field(field)?;

        self.required.retain(|f| f != field);
        self.optional.retain(|f| f != field);

        if required {
            self.required.push(field.to_string());
        } else {
            self.optional.push(field.to_string());
        }
        Ok(())
    }

    /// Sets the url of the relying party's privacy policy
    pub fn set_policy_url(&mut self, policy_url: impl Into<String>) {
        self.policy_url = Some(policy_url.into());
    }

    /// Required fields
    pub fn required(&self) -> &[String] {
        &self.required
    }

    /// Optional fields
    pub fn optional(&self) -> &[String] {
        &self.optional
    }

    /// Privacy policy url
    pub fn policy_url(&self) -> Option<&str> {
        self.policy_url.as_deref()
    }

    /// All requested fields, required first
    pub fn requested_fields(&self) -> impl Iterator<Item = &str> {
        self.required
            .iter()
            .chain(self.optional.iter())
            .map(String::as_str)
    }

    /// Parses request parameters
    pub fn from_parameters(
        type_uri: &'static str,
        parameters: &ParameterList,
    ) -> OpenIdReturnType<Self> {
        let required = field_list(parameters, "required")?;
        let optional = field_list(parameters, "optional")?;

        if required.iter().any(|f| optional.contains(f)) {
            return Err(extension_error("sreg field both required and optional"));
        }

        Ok(Self {
            type_uri,
            required,
            optional,
            policy_url: parameters.get("policy_url").map(str::to_string),
        })
    }
}

impl MessageExtension for SRegRequest {
    fn type_uri(&self) -> &str {
        self.type_uri
    }

    fn parameters(&self) -> ParameterList {
        let mut params = ParameterList::new();
        if !self.required.is_empty() {
            params.set("required", self.required.join(","));
        }
        if !self.optional.is_empty() {
            params.set("optional", self.optional.join(","));
        }
        if let Some(policy_url) = &self.policy_url {
            params.set("policy_url", policy_url);
        }
        params
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// # SRegResponse
/// Profile values a provider releases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SRegResponse {
    type_uri: &'static str,
    values: ParameterList,
}

impl SRegResponse {
    /// Releases the values in `user_data` that `request` asked for
    pub fn from_request(request: &SRegRequest, user_data: &HashMap<String, String>) -> Self {
        let mut values = ParameterList::new();

        for field in request.requested_fields() {
            if let Some(value) = user_data.get(field) {
                values.set(field, value.as_str());
            }
        }

        Self {
            type_uri: request.type_uri,
            values,
        }
    }

    /// Parses response parameters. Unknown fields are rejected.
    pub fn from_parameters(
        type_uri: &'static str,
        parameters: &ParameterList,
    ) -> OpenIdReturnType<Self> {
        for (field, value) in parameters.iter() {
            check_field(field)?;

            if field == "gender" && !matches!(value, "M" | "F") {
                return Err(extension_error(format!("invalid sreg gender {value}")));
            }
        }

        Ok(Self {
            type_uri,
            values: parameters.clone(),
        })
    }

    /// Released value of `field`
    pub fn value(&self, field: &str) -> Option<&str> {
        self.values.get(field)
    }

    /// All released values
    pub fn values(&self) -> HashMap<String, String> {
        self.values.to_map()
    }
}

impl MessageExtension for SRegResponse {
    fn type_uri(&self) -> &str {
        self.type_uri
    }

    fn parameters(&self) -> ParameterList {
        self.values.clone()
    }

    fn signature_required(&self) -> bool {
        true
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Builds Simple Registration requests and responses for one namespace version
#[derive(Debug, Clone)]
pub struct SRegFactory {
    type_uri: &'static str,
}

impl SRegFactory {
    /// Factory for `type_uri` (1.0 or 1.1)
    pub fn new(type_uri: &'static str) -> Self {
        Self { type_uri }
    }
}

impl ExtensionFactory for SRegFactory {
    fn type_uri(&self) -> &str {
        self.type_uri
    }

    fn signature_required(&self) -> bool {
        true
    }

    fn create(
        &self,
        parameters: &ParameterList,
        is_request: bool,
    ) -> OpenIdReturnType<Box<dyn MessageExtension>> {
        Ok(if is_request {
            Box::new(SRegRequest::from_parameters(self.type_uri, parameters)?)
        } else {
            Box::new(SRegResponse::from_parameters(self.type_uri, parameters)?)
        })
    }
}
