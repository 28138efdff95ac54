//! # Extensions
//! Namespaced payloads carried inside protocol messages.

mod ax;
mod sreg;

use std::any::Any;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use super::ParameterList;
use crate::types::{codes, OpenIdError, OpenIdReturnType};

pub use ax::{
    AxAttributeRequest, AxAttributeValues, AxCount, AxFactory, FetchRequest, FetchResponse, AX_URI,
};
pub use sreg::{SRegFactory, SRegRequest, SRegResponse, SREG10_URI, SREG11_URI, SREG_FIELDS};

/// # MessageExtension
/// An extension payload. Parameters are returned without the alias prefix.
pub trait MessageExtension: Debug + Send + Sync {
    /// Namespace URI of the extension
    fn type_uri(&self) -> &str;

    /// Parameters without the alias prefix
    fn parameters(&self) -> ParameterList;

    /// Whether the parameters must be covered by the signature of a positive assertion
    fn signature_required(&self) -> bool {
        false
    }

    /// Whether the extension asserts an identifier on behalf of the provider
    fn provides_identifier(&self) -> bool {
        false
    }

    /// For downcasting to the concrete extension
    fn as_any(&self) -> &dyn Any;
}

/// # ExtensionFactory
/// Builds one extension type from received parameters.
pub trait ExtensionFactory: Send + Sync {
    /// Namespace URI of the extension this factory builds
    fn type_uri(&self) -> &str;

    /// Whether the extension's fields must be signed in positive assertions
    fn signature_required(&self) -> bool;

    /// Whether the extension asserts an identifier
    fn provides_identifier(&self) -> bool {
        false
    }

    /// Builds the extension from its parameters
    fn create(
        &self,
        parameters: &ParameterList,
        is_request: bool,
    ) -> OpenIdReturnType<Box<dyn MessageExtension>>;
}

/// # ExtensionRegistry
/// Maps extension namespace URIs to their factories.
#[derive(Clone, Default)]
pub struct ExtensionRegistry {
    factories: HashMap<String, Arc<dyn ExtensionFactory>>,
}

impl ExtensionRegistry {
    /// A registry without factories
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with Simple Registration 1.0 and 1.1 and Attribute Exchange 1.0
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(SRegFactory::new(SREG10_URI)));
        registry.register(Arc::new(SRegFactory::new(SREG11_URI)));
        registry.register(Arc::new(AxFactory));
        registry
    }

    /// Registers `factory` for its type URI, replacing an earlier one
    pub fn register(&mut self, factory: Arc<dyn ExtensionFactory>) {
        self.factories
            .insert(factory.type_uri().to_string(), factory);
    }

    /// Checks if a factory exists for `type_uri`
    pub fn is_registered(&self, type_uri: &str) -> bool {
        self.factories.contains_key(type_uri)
    }

    /// Whether the extension with `type_uri` must be signed. Unknown extensions need not be.
    pub fn signature_required(&self, type_uri: &str) -> bool {
        self.factories
            .get(type_uri)
            .is_some_and(|f| f.signature_required())
    }

    /// Whether the extension with `type_uri` asserts an identifier
    pub fn provides_identifier(&self, type_uri: &str) -> bool {
        self.factories
            .get(type_uri)
            .is_some_and(|f| f.provides_identifier())
    }

    /// Builds the extension with `type_uri` from `parameters`
    pub fn create(
        &self,
        type_uri: &str,
        parameters: &ParameterList,
        is_request: bool,
    ) -> OpenIdReturnType<Box<dyn MessageExtension>> {
        let factory = self.factories.get(type_uri).ok_or_else(|| {
            Box::new(OpenIdError::new_message_error(
                codes::EXTENSION_ERROR,
                format!("no factory registered for {type_uri}"),
            ))
        })?;

        factory.create(parameters, is_request)
    }
}

impl Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionRegistry")
            .field("factories", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

pub(crate) fn extension_error(message: impl Into<String>) -> Box<OpenIdError> {
    Box::new(OpenIdError::new_message_error(
        codes::EXTENSION_ERROR,
        message,
    ))
}
