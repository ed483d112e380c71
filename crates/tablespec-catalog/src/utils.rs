use std::collections::HashMap;

use lazy_static::lazy_static;
use regex::{Captures, Regex};
pub use tablespec_common::string::{quote_name_if_needed, quote_string_literal};
use url::Url;

use crate::error::{CatalogError, CatalogResult};

lazy_static! {
    static ref PLACEHOLDER_REGEX: Regex = {
        #[allow(clippy::unwrap_used)]
        Regex::new(r"\{(\w+)\}").unwrap()
    };
}

const ANONYMOUS_IDENTIFIER_PREFIX: &str = "delta.`";

pub fn quote_names_if_needed<T: AsRef<str>>(names: &[T]) -> String {
    names
        .iter()
        .map(|name| quote_name_if_needed(name.as_ref()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Returns whether the value still contains `{key}` placeholders.
pub fn has_placeholders(value: &str) -> bool {
    PLACEHOLDER_REGEX.is_match(value)
}

/// Replaces every `{key}` placeholder with the value registered for `key`.
pub fn substitute_placeholders(
    template: &str,
    values: &HashMap<String, String>,
) -> CatalogResult<String> {
    let mut missing = None;
    let result = PLACEHOLDER_REGEX.replace_all(template, |caps: &Captures| {
        let key = &caps[1];
        match values.get(key) {
            Some(value) => value.clone(),
            None => {
                missing.get_or_insert_with(|| key.to_string());
                caps[0].to_string()
            }
        }
    });
    match missing {
        Some(key) => Err(CatalogError::NoSuchValue(key)),
        None => Ok(result.into_owned()),
    }
}

/// Brings a storage location into canonical URI form.
/// A location without a scheme is given `default_scheme`.
pub fn normalize_location(location: &str, default_scheme: &str) -> CatalogResult<String> {
    match Url::parse(location) {
        Ok(_) => Ok(location.to_string()),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let location = format!("{default_scheme}:{location}");
            Url::parse(&location)
                .map_err(|e| CatalogError::invalid(format!("invalid location '{location}': {e}")))?;
            Ok(location)
        }
        Err(e) => Err(CatalogError::invalid(format!(
            "invalid location '{location}': {e}"
        ))),
    }
}

/// The identifier that addresses a Delta table by its location only.
pub fn anonymous_identifier(location: &str) -> String {
    format!("{ANONYMOUS_IDENTIFIER_PREFIX}{}`", location.replace('`', "``"))
}

/// Extracts the location from an identifier of the form ``delta.`<location>` ``.
pub fn parse_anonymous_identifier(identifier: &str) -> Option<String> {
    let inner = identifier
        .trim()
        .strip_prefix(ANONYMOUS_IDENTIFIER_PREFIX)?
        .strip_suffix('`')?;
    Some(inner.replace("``", "`"))
}
