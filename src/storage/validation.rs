//! Path validation
//!
//! Filenames arrive from untrusted clients and must never escape the server
//! root. Anything that looks like a path rather than a plain name is
//! rejected.

use crate::error::StorageError;

/// Validates a client-supplied filename.
///
/// Rejects empty names, path separators, parent-directory components, and
/// NUL bytes.
pub fn sanitize_filename(name: &str) -> Result<&str, StorageError> {
    if name.is_empty()
        || name == "."
        || name.contains("..")
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0')
    {
        return Err(StorageError::InvalidFileName(name.to_string()));
    }
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_names_pass() {
        assert!(sanitize_filename("report.pdf").is_ok());
        assert!(sanitize_filename("no extension").is_ok());
        assert!(sanitize_filename(".hidden").is_ok());
    }

    #[test]
    fn traversal_attempts_are_rejected() {
        assert!(sanitize_filename("../etc/passwd").is_err());
        assert!(sanitize_filename("..").is_err());
        assert!(sanitize_filename("dir/file.txt").is_err());
        assert!(sanitize_filename("dir\\file.txt").is_err());
        assert!(sanitize_filename("").is_err());
        assert!(sanitize_filename(".").is_err());
        assert!(sanitize_filename("nul\0byte").is_err());
    }
}
