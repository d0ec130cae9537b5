use crate::error::{GatewayError, Result};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref INDEX_NAME: Regex = Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]{0,63}$")
        .expect("index name pattern is valid");
}

/// Index names become directory names under the indices root, so only a
/// single plain path component is accepted.
pub fn validate_index_name(name: &str) -> Result<()> {
    if !INDEX_NAME.is_match(name) {
        return Err(GatewayError::InvalidIndexName(format!(
            "'{}' must be 1-64 characters of letters, digits, '.', '_' or '-', starting with a letter or digit",
            name
        )));
    }
    if name.contains("..") {
        return Err(GatewayError::InvalidIndexName(format!(
            "'{}' must not contain '..'",
            name
        )));
    }
    Ok(())
}
