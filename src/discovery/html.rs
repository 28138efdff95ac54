use lazy_static::lazy_static;
use regex::Regex;

use crate::types::{codes, ErrorKind, HtmlLinks, HtmlParser, OpenIdError, OpenIdReturnType};

lazy_static! {
    static ref HEAD_OPEN_REGEX: Regex = Regex::new(r"(?is)<head(?:\s[^>]*)?>").unwrap();
    static ref HEAD_SECTION_REGEX: Regex =
        Regex::new(r"(?is)<head(?:\s[^>]*)?>(.*?)(?:</head\s*>|<body[\s>]|\z)").unwrap();
    static ref META_REGEX: Regex = Regex::new(r"(?is)<meta\s[^>]*>").unwrap();
    static ref LINK_REGEX: Regex = Regex::new(r"(?is)<link\s[^>]*>").unwrap();
    static ref ATTRIBUTE_REGEX: Regex = Regex::new(
        r#"(?is)([a-z][a-z0-9_:.-]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>/]+))"#
    )
    .unwrap();
    static ref COMMENT_REGEX: Regex = Regex::new(r"(?s)<!--.*?-->").unwrap();
}

fn parse_error(message: impl Into<String>) -> Box<OpenIdError> {
    Box::new(OpenIdError::new_discovery_error(
        ErrorKind::Parse,
        codes::PARSE_ERROR,
        message,
        None,
    ))
}

fn decode_entities(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

fn attribute(tag: &str, name: &str) -> Option<String> {
    ATTRIBUTE_REGEX.captures_iter(tag).find_map(|c| {
        let attribute_name = c.get(1)?.as_str();
        if !attribute_name.eq_ignore_ascii_case(name) {
            return None;
        }

        c.get(2)
            .or_else(|| c.get(3))
            .or_else(|| c.get(4))
            .map(|v| decode_entities(v.as_str().trim()))
    })
}

/// # RegexHtmlParser
/// Scans the `<head>` of an HTML document for Yadis meta tags and OpenID links.
///
/// Only the first `<head>` section is read and documents with more than one `<head>` are
/// rejected. Comments are skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegexHtmlParser;

impl RegexHtmlParser {
    fn head_section(html: &str) -> OpenIdReturnType<Option<String>> {
        let html = COMMENT_REGEX.replace_all(html, "");

        if HEAD_OPEN_REGEX.find_iter(&html).count() > 1 {
            return Err(parse_error("document has more than one <head>"));
        }

        Ok(HEAD_SECTION_REGEX
            .captures(&html)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string()))
    }
}

impl HtmlParser for RegexHtmlParser {
    fn parse_html_meta_xrds_location(&self, html: &str) -> OpenIdReturnType<Option<String>> {
        let Some(head) = Self::head_section(html)? else {
            return Ok(None);
        };

        let locations: Vec<String> = META_REGEX
            .find_iter(&head)
            .filter(|m| {
                attribute(m.as_str(), "http-equiv")
                    .is_some_and(|v| v.eq_ignore_ascii_case("x-xrds-location"))
            })
            .filter_map(|m| attribute(m.as_str(), "content"))
            .collect();

        if locations.len() > 1 {
            return Err(parse_error(
                "document has more than one X-XRDS-Location meta tag",
            ));
        }

        Ok(locations.into_iter().next().filter(|l| !l.is_empty()))
    }

    fn parse_html_links(&self, html: &str) -> OpenIdReturnType<HtmlLinks> {
        let mut links = HtmlLinks::default();

        let Some(head) = Self::head_section(html)? else {
            return Ok(links);
        };

        for tag in LINK_REGEX.find_iter(&head) {
            let (Some(rel), Some(href)) = (
                attribute(tag.as_str(), "rel"),
                attribute(tag.as_str(), "href"),
            ) else {
                continue;
            };

            for rel in rel.split_whitespace() {
                let slot = match rel.to_ascii_lowercase().as_str() {
                    "openid2.provider" => &mut links.op2_endpoint,
                    "openid2.local_id" => &mut links.op2_local_id,
                    "openid.server" => &mut links.op1_endpoint,
                    "openid.delegate" => &mut links.op1_delegate,
                    _ => continue,
                };

                if slot.is_none() {
                    *slot = Some(href.clone());
                }
            }
        }

        Ok(links)
    }
}
