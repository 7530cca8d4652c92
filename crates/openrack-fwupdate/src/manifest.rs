//! `KEY=VALUE` tag file access
//!
//! The package MANIFEST, the trust root's `hashfunc` selectors and
//! `/etc/os-release` all share the same line format: a key, `=`, and a
//! possibly double-quoted value.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Result, UpdateError};

fn tag_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // Keys are matched case-insensitively; values may be quoted.
        Regex::new(r#"(?i)^\s*([a-z0-9_]+)\s*=\s*"?([^"]+)"?\s*$"#).expect("valid tag pattern")
    })
}

/// Read the value of `tag` from a `KEY=VALUE` file.
///
/// Returns `Ok(None)` when the file has no such tag. Key comparison is
/// case-sensitive; only the line shape is matched case-insensitively.
///
/// # Errors
///
/// Returns an I/O error when the file cannot be read.
pub fn read_tag(file: &Path, tag: &str) -> Result<Option<String>> {
    let content = std::fs::read_to_string(file)?;
    for line in content.lines() {
        if let Some(caps) = tag_line().captures(line) {
            if &caps[1] == tag {
                return Ok(Some(caps[2].trim().to_string()));
            }
        }
    }
    Ok(None)
}

/// Read the value of `tag`, treating absence as a package defect.
///
/// # Errors
///
/// Returns [`UpdateError::PackageInvalid`] when the tag is missing and an
/// I/O error when the file cannot be read.
pub fn require_tag(file: &Path, tag: &str) -> Result<String> {
    read_tag(file, tag)?.ok_or_else(|| {
        UpdateError::PackageInvalid(format!("{tag} not found in {}", file.display()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn tag_file(content: &str) -> std::io::Result<tempfile::NamedTempFile> {
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(content.as_bytes())?;
        Ok(file)
    }

    #[test]
    fn test_read_tag_plain_value() -> Result<()> {
        let f = tag_file("purpose=host\nHashType=sha256\n")?;
        assert_eq!(read_tag(f.path(), "HashType")?.as_deref(), Some("sha256"));
        Ok(())
    }

    #[test]
    fn test_read_tag_quoted_value() -> Result<()> {
        let f = tag_file("VERSION_ID=\"2.9.1-rc1\"\n")?;
        assert_eq!(
            read_tag(f.path(), "VERSION_ID")?.as_deref(),
            Some("2.9.1-rc1")
        );
        Ok(())
    }

    #[test]
    fn test_read_tag_ignores_other_keys_and_whitespace() -> Result<()> {
        let f = tag_file("  MachineName = openrack-r2 \nother=x\n")?;
        assert_eq!(
            read_tag(f.path(), "MachineName")?.as_deref(),
            Some("openrack-r2")
        );
        assert_eq!(read_tag(f.path(), "machinename")?, None);
        Ok(())
    }

    #[test]
    fn test_require_tag_missing_is_package_invalid() -> Result<()> {
        let f = tag_file("HashType=sha512\n")?;
        let err = require_tag(f.path(), "MachineName");
        assert!(matches!(err, Err(UpdateError::PackageInvalid(_))));
        Ok(())
    }
}
