use std::any::Any;

use super::{extension_error, ExtensionFactory, MessageExtension};
use crate::message::ParameterList;
use crate::types::OpenIdReturnType;

/// Attribute Exchange 1.0 namespace
pub const AX_URI: &str = "http://openid.net/srv/ax/1.0";

const MODE_FETCH_REQUEST: &str = "fetch_request";
const MODE_FETCH_RESPONSE: &str = "fetch_response";

fn check_alias(alias: &str) -> OpenIdReturnType<()> {
    if alias.is_empty() || alias.contains('.') || alias.contains(',') {
        return Err(extension_error(format!("invalid attribute alias {alias:?}")));
    }
    Ok(())
}

/// `type.<alias>` declarations in order
fn attribute_types(parameters: &ParameterList) -> OpenIdReturnType<Vec<(String, String)>> {
    let mut types = vec![];

    for (alias, type_uri) in parameters.with_prefix_stripped("type").iter() {
        check_alias(alias)?;
        if type_uri.is_empty() {
            return Err(extension_error(format!("attribute {alias} has an empty type")));
        }
        types.push((alias.to_string(), type_uri.to_string()));
    }

    Ok(types)
}

/// How many values of an attribute a relying party wants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxCount {
    /// At most this many, at least 1
    Limited(u32),
    /// As many as the provider has
    Unlimited,
}

impl AxCount {
    fn parse(value: &str) -> OpenIdReturnType<Self> {
        if value == "unlimited" {
            return Ok(AxCount::Unlimited);
        }

        match value.parse::<u32>() {
            Ok(n) if n >= 1 => Ok(AxCount::Limited(n)),
            _ => Err(extension_error(format!("invalid attribute count {value}"))),
        }
    }

    fn as_wire(&self) -> String {
        match self {
            AxCount::Limited(n) => n.to_string(),
            AxCount::Unlimited => "unlimited".to_string(),
        }
    }
}

/// A requested attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AxAttributeRequest {
    /// Alias inside the extension
    pub alias: String,
    /// Attribute type URI
    pub type_uri: String,
    /// Whether the relying party requires the attribute
    pub required: bool,
    /// Number of values wanted
    pub count: AxCount,
}

/// # FetchRequest
/// Attribute Exchange `fetch_request`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchRequest {
    attributes: Vec<AxAttributeRequest>,
    update_url: Option<String>,
}

impl FetchRequest {
    /// Empty request
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks for one value of `type_uri` under `alias`
    pub fn add_attribute(
        &mut self,
        alias: &str,
        type_uri: &str,
        required: bool,
    ) -> OpenIdReturnType<()> {
        self.add_attribute_with_count(alias, type_uri, required, AxCount::Limited(1))
    }

    /// Asks for `count` values of `type_uri` under `alias`
    pub fn add_attribute_with_count(
        &mut self,
        alias: &str,
        type_uri: &str,
        required: bool,
        count: AxCount,
    ) -> OpenIdReturnType<()> {
        check_alias(alias)?;

        if matches!(count, AxCount::Limited(0)) {
            return Err(extension_error("attribute count must be at least 1"));
        }

        if self.attributes.iter().any(|a| a.alias == alias) {
            return Err(extension_error(format!("attribute alias {alias} is taken")));
        }

        self.attributes.push(AxAttributeRequest {
            alias: alias.to_string(),
            type_uri: type_uri.to_string(),
            required,
            count,
        });
        Ok(())
    }

    /// Sets the url the provider may send later updates to
    pub fn set_update_url(&mut self, update_url: impl Into<String>) {
        self.update_url = Some(update_url.into());
    }

    /// Requested attributes
    pub fn attributes(&self) -> &[AxAttributeRequest] {
        &self.attributes
    }

    /// Update url
    pub fn update_url(&self) -> Option<&str> {
        self.update_url.as_deref()
    }

    /// Parses `fetch_request` parameters
    pub fn from_parameters(parameters: &ParameterList) -> OpenIdReturnType<Self> {
        if parameters.get("mode") != Some(MODE_FETCH_REQUEST) {
            return Err(extension_error("attribute exchange mode is not fetch_request"));
        }

        let types = attribute_types(parameters)?;

        let listed = |key: &str| -> OpenIdReturnType<Vec<String>> {
            let aliases: Vec<String> = parameters
                .get(key)
                .unwrap_or_default()
                .split(',')
                .filter(|a| !a.is_empty())
                .map(str::to_string)
                .collect();

            for alias in &aliases {
                if !types.iter().any(|(a, _)| a == alias) {
                    return Err(extension_error(format!(
                        "{key} lists {alias} which has no type"
                    )));
                }
            }
            Ok(aliases)
        };

        let required = listed("required")?;
        let if_available = listed("if_available")?;

        let mut request = FetchRequest {
            attributes: vec![],
            update_url: parameters.get("update_url").map(str::to_string),
        };

        for (alias, type_uri) in types {
            let count = match parameters.get(&format!("count.{alias}")) {
                Some(count) => AxCount::parse(count)?,
                None => AxCount::Limited(1),
            };

            if !required.contains(&alias) && !if_available.contains(&alias) {
                return Err(extension_error(format!(
                    "attribute {alias} is neither required nor if_available"
                )));
            }

            request.attributes.push(AxAttributeRequest {
                required: required.contains(&alias),
                alias,
                type_uri,
                count,
            });
        }

        Ok(request)
    }
}

impl MessageExtension for FetchRequest {
    fn type_uri(&self) -> &str {
        AX_URI
    }

    fn parameters(&self) -> ParameterList {
        let mut params = ParameterList::new();
        params.set("mode", MODE_FETCH_REQUEST);

        for attribute in &self.attributes {
            params.set(format!("type.{}", attribute.alias), &attribute.type_uri);
            if attribute.count != AxCount::Limited(1) {
                params.set(format!("count.{}", attribute.alias), attribute.count.as_wire());
            }
        }

        let aliases = |required: bool| {
            self.attributes
                .iter()
                .filter(|a| a.required == required)
                .map(|a| a.alias.as_str())
                .collect::<Vec<_>>()
                .join(",")
        };

        let required = aliases(true);
        if !required.is_empty() {
            params.set("required", required);
        }
        let if_available = aliases(false);
        if !if_available.is_empty() {
            params.set("if_available", if_available);
        }

        if let Some(update_url) = &self.update_url {
            params.set("update_url", update_url);
        }

        params
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Released values of one attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AxAttributeValues {
    /// Alias inside the extension
    pub alias: String,
    /// Attribute type URI
    pub type_uri: String,
    /// Values in order
    pub values: Vec<String>,
}

/// # FetchResponse
/// Attribute Exchange `fetch_response`.
///
/// A single value goes out as `value.<alias>`. Zero or several values go out as
/// `count.<alias>` with `value.<alias>.1` to `value.<alias>.N`. On receipt `count.<alias>=1` is
/// accepted and read from `value.<alias>.1`, and `value.<alias>` is only read when no count is
/// present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchResponse {
    attributes: Vec<AxAttributeValues>,
    update_url: Option<String>,
}

impl FetchResponse {
    /// Empty response
    pub fn new() -> Self {
        Self::default()
    }

    /// Releases `values` for `type_uri` under `alias`
    pub fn add_attribute(
        &mut self,
        alias: &str,
        type_uri: &str,
        values: Vec<String>,
    ) -> OpenIdReturnType<()> {
        check_alias(alias)?;

        if self.attributes.iter().any(|a| a.alias == alias) {
            return Err(extension_error(format!("attribute alias {alias} is taken")));
        }

        self.attributes.push(AxAttributeValues {
            alias: alias.to_string(),
            type_uri: type_uri.to_string(),
            values,
        });
        Ok(())
    }

    /// Sets the update url echoed back to the relying party
    pub fn set_update_url(&mut self, update_url: impl Into<String>) {
        self.update_url = Some(update_url.into());
    }

    /// Released attributes
    pub fn attributes(&self) -> &[AxAttributeValues] {
        &self.attributes
    }

    /// Values released for `type_uri`
    pub fn values(&self, type_uri: &str) -> Option<&[String]> {
        self.attributes
            .iter()
            .find(|a| a.type_uri == type_uri)
            .map(|a| a.values.as_slice())
    }

    /// First value released for `type_uri`
    pub fn value(&self, type_uri: &str) -> Option<&str> {
        self.values(type_uri)?.first().map(String::as_str)
    }

    /// Parses `fetch_response` parameters
    pub fn from_parameters(parameters: &ParameterList) -> OpenIdReturnType<Self> {
        if parameters.get("mode") != Some(MODE_FETCH_RESPONSE) {
            return Err(extension_error("attribute exchange mode is not fetch_response"));
        }

        let mut response = FetchResponse {
            attributes: vec![],
            update_url: parameters.get("update_url").map(str::to_string),
        };

        for (alias, type_uri) in attribute_types(parameters)? {
            let single_key = format!("value.{alias}");

            let values = match parameters.get(&format!("count.{alias}")) {
                Some(count) => {
                    if parameters.has(&single_key) {
                        return Err(extension_error(format!(
                            "attribute {alias} has both a count and an unindexed value"
                        )));
                    }

                    let count: u32 = count.parse().map_err(|_| {
                        extension_error(format!("invalid count {count} for attribute {alias}"))
                    })?;

                    (1..=count)
                        .map(|n| {
                            parameters
                                .get(&format!("value.{alias}.{n}"))
                                .map(str::to_string)
                                .ok_or_else(|| {
                                    extension_error(format!("attribute {alias} misses value {n}"))
                                })
                        })
                        .collect::<OpenIdReturnType<Vec<String>>>()?
                }
                None => parameters
                    .get(&single_key)
                    .map(|v| vec![v.to_string()])
                    .unwrap_or_default(),
            };

            response.attributes.push(AxAttributeValues {
                alias,
                type_uri,
                values,
            });
        }

        Ok(response)
    }
}

impl MessageExtension for FetchResponse {
    fn type_uri(&self) -> &str {
        AX_URI
    }

    fn parameters(&self) -> ParameterList {
        let mut params = ParameterList::new();
        params.set("mode", MODE_FETCH_RESPONSE);

        for attribute in &self.attributes {
            let alias = &attribute.alias;
            params.set(format!("type.{alias}"), &attribute.type_uri);

            if let [single] = attribute.values.as_slice() {
                params.set(format!("value.{alias}"), single);
            } else {
                params.set(format!("count.{alias}"), attribute.values.len().to_string());
                for (n, value) in attribute.values.iter().enumerate() {
                    params.set(format!("value.{alias}.{}", n + 1), value);
                }
            }
        }

        if let Some(update_url) = &self.update_url {
            params.set("update_url", update_url);
        }

        params
    }

    fn signature_required(&self) -> bool {
        true
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Builds Attribute Exchange fetch requests and responses
#[derive(Debug, Clone, Copy, Default)]
pub struct AxFactory;

impl ExtensionFactory for AxFactory {
    fn type_uri(&self) -> &str {
        AX_URI
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
            Box::new(FetchRequest::from_parameters(parameters)?)
        } else {
            Box::new(FetchResponse::from_parameters(parameters)?)
        })
    }
}
