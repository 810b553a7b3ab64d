//! Compact provider names.
//!
//! Providers shipped under the `contextflow.` namespace follow the
//! `contextflow.<kind>.context.provider` convention. Those names are written
//! as `<kind>` with a tag; anything else is written verbatim.

use crate::errors::{ContextError, Result};

const PREFIX: &str = "contextflow.";
const SUFFIX: &str = ".context.provider";

/// Name written as-is.
pub(crate) const TAG_VERBATIM: u8 = 0;
/// Name with the well-known prefix and suffix stripped.
pub(crate) const TAG_ABBREVIATED: u8 = 1;

/// Splits a provider name into its tag and written form.
pub(crate) fn compress(name: &str) -> (u8, &str) {
    if name.len() >= PREFIX.len() + SUFFIX.len() {
        if let Some(kind) = name
            .strip_prefix(PREFIX)
            .and_then(|rest| rest.strip_suffix(SUFFIX))
        {
            return (TAG_ABBREVIATED, kind);
        }
    }
    (TAG_VERBATIM, name)
}

/// Restores a provider name from its tag and written form.
pub(crate) fn expand(tag: u8, written: &str) -> Result<String> {
    match tag {
        TAG_VERBATIM => Ok(written.to_string()),
        TAG_ABBREVIATED => Ok(format!("{PREFIX}{written}{SUFFIX}")),
        other => Err(ContextError::serialization(format!(
            "unknown provider name tag {other}"
        ))),
    }
}
