//! # Discovery Engine
//! Yadis, HTML and XRI discovery of OpenID services.

#[allow(clippy::module_inception)]
mod discovery;
mod html;

pub use discovery::{
    Discovery, YadisResult, CONSUMER_SERVICE_TYPES, XRDS_CONTENT_TYPE, XRDS_LOCATION_HEADER,
    YADIS_ACCEPT,
};
pub use html::RegexHtmlParser;
