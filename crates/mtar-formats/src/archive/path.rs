//! Entry name safety rules
//!
//! Archive entries are extracted relative to a module root. A name that is
//! absolute or that walks upward with `..` would let an archive place content
//! outside that root, so such names are rejected before any entry content is
//! read.

use crate::archive::error::{FormatError, FormatResult, UnsafePathReason};

/// Check that an entry name is a normalized, relative, forward-slash path
///
/// A single trailing `/` is permitted and marks a directory entry.
///
/// ```rust
/// use mtar_formats::validate_entry_name;
///
/// assert!(validate_entry_name("web/server.jar").is_ok());
/// assert!(validate_entry_name("web/").is_ok());
/// assert!(validate_entry_name("../etc/passwd").is_err());
/// assert!(validate_entry_name("/etc/passwd").is_err());
/// ```
pub fn validate_entry_name(name: &str) -> FormatResult<()> {
    check(name).map_err(|reason| FormatError::UnsafeEntryName {
        entry: name.to_string(),
        reason,
    })
}

fn check(name: &str) -> Result<(), UnsafePathReason> {
    if name.is_empty() {
        return Err(UnsafePathReason::Empty);
    }
    if name.starts_with('/') || name.starts_with('\\') || has_drive_prefix(name) {
        return Err(UnsafePathReason::Absolute);
    }
    if name.contains('\\') || name.contains('\0') {
        return Err(UnsafePathReason::ForbiddenCharacter);
    }

    let body = name.strip_suffix('/').unwrap_or(name);
    if body
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(UnsafePathReason::NotNormalized);
    }
    Ok(())
}

fn has_drive_prefix(name: &str) -> bool {
    let bytes = name.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}
