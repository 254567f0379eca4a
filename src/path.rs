//! Cache filename construction and parsing.
//!
//! The cache keeps no in-process index: everything it needs to know about a
//! file is encoded in the basename. Permanent files carry their expiration,
//! temp files carry their producer's identity:
//!
//! ```text
//! perm-file-cache$<expires_at_ms>$<id>
//! temp-file-cache$<owner>$<unique>$<id>
//! ```
//!
//! `$` is the reserved separator. Parsing splits with a bounded part count
//! (3 for permanent, 4 for temp), so an id containing `$` survives as the
//! trailing part. Lookups enumerate files with glob patterns in which the
//! directory prefix and the id are escaped, so glob metacharacters inside
//! either cannot widen a match.

use std::path::{Path, PathBuf};

use glob::Pattern;
use thiserror::Error;

use crate::owner::OwnerToken;

/// Separator between filename parts. Banned from computed ids.
pub const SEP: char = '$';

/// Fixed prefix of committed cache files.
pub const PERM_PREFIX: &str = "perm-file-cache";

/// Fixed prefix of in-flight staging files.
pub const TEMP_PREFIX: &str = "temp-file-cache";

/// Why a basename failed to parse as a cache filename.
///
/// Never surfaced to callers; unparseable files go through the
/// unknown-files policy instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The basename does not start with a recognized cache prefix.
    #[error("no cache filename prefix")]
    BadPrefix,

    /// Too few separated parts, or an empty id part.
    #[error("malformed cache filename")]
    BadFormat,

    /// The expiration part is not a signed integer.
    #[error("expiration timestamp is not an integer")]
    BadTimestamp,

    /// The owner part is not a `pid-nonce-seq` triple.
    #[error("owner token is malformed")]
    BadOwner,
}

/// Parsed basename of a permanent file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermName {
    pub expires_at: i64,
    pub id: String,
}

/// Parsed basename of a temp file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TempName {
    pub owner: OwnerToken,
    pub unique: String,
    pub id: String,
}

/// Basename for a permanent file.
pub fn perm_file_name(id: &str, expires_at: i64) -> String {
    format!("{PERM_PREFIX}{SEP}{expires_at}{SEP}{id}")
}

/// Basename for a temp file.
pub fn temp_file_name(id: &str, owner: &OwnerToken, unique: u64) -> String {
    format!("{TEMP_PREFIX}{SEP}{owner}{SEP}{unique}{SEP}{id}")
}

/// Full path of a permanent file under `dir`.
pub fn perm_path(dir: &Path, id: &str, expires_at: i64) -> PathBuf {
    dir.join(perm_file_name(id, expires_at))
}

/// Full path of a temp file under `dir`.
pub fn temp_path(dir: &Path, id: &str, owner: &OwnerToken, unique: u64) -> PathBuf {
    dir.join(temp_file_name(id, owner, unique))
}

/// Glob pattern matching every generation of `id`, or every permanent file
/// when `id` is `None`.
pub fn perm_wildcard(dir: &Path, id: Option<&str>) -> String {
    match id {
        Some(id) => format!(
            "{}/{PERM_PREFIX}{SEP}*{SEP}{}",
            escape_dir(dir),
            Pattern::escape(id)
        ),
        None => format!("{}/{PERM_PREFIX}{SEP}*", escape_dir(dir)),
    }
}

/// Glob pattern matching every temp file under `dir`.
pub fn temp_wildcard(dir: &Path) -> String {
    format!("{}/{TEMP_PREFIX}{SEP}*", escape_dir(dir))
}

/// Escape glob metacharacters in a directory prefix.
///
/// Namespace fragments are caller-supplied and may contain `? [ ] *`.
fn escape_dir(dir: &Path) -> String {
    Pattern::escape(&dir.to_string_lossy())
}

/// Parse the basename of a permanent file.
pub fn parse_perm(name: &str) -> Result<PermName, ParseError> {
    let mut parts = name.splitn(3, SEP);
    let prefix = parts.next().ok_or(ParseError::BadFormat)?;
    if prefix != PERM_PREFIX {
        return Err(ParseError::BadPrefix);
    }
    let timestamp = parts.next().ok_or(ParseError::BadFormat)?;
    let id = parts.next().ok_or(ParseError::BadFormat)?;
    if id.is_empty() {
        return Err(ParseError::BadFormat);
    }
    let expires_at = timestamp
        .parse::<i64>()
        .map_err(|_| ParseError::BadTimestamp)?;

    Ok(PermName {
        expires_at,
        id: id.to_string(),
    })
}

/// Parse the basename of a temp file.
pub fn parse_temp(name: &str) -> Result<TempName, ParseError> {
    let mut parts = name.splitn(4, SEP);
    let prefix = parts.next().ok_or(ParseError::BadFormat)?;
    if prefix != TEMP_PREFIX {
        return Err(ParseError::BadPrefix);
    }
    let owner = parts.next().ok_or(ParseError::BadFormat)?;
    let unique = parts.next().ok_or(ParseError::BadFormat)?;
    let id = parts.next().ok_or(ParseError::BadFormat)?;
    if id.is_empty() {
        return Err(ParseError::BadFormat);
    }
    let owner = OwnerToken::parse(owner).ok_or(ParseError::BadOwner)?;

    Ok(TempName {
        owner,
        unique: unique.to_string(),
        id: id.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perm_file_name_layout() {
        assert_eq!(
            perm_file_name("report.pdf", 1700000000000),
            "perm-file-cache$1700000000000$report.pdf"
        );
    }

    #[test]
    fn perm_file_name_negative_timestamp() {
        assert_eq!(perm_file_name("k", -5), "perm-file-cache$-5$k");
    }

    #[test]
    fn temp_file_name_layout() {
        let owner = OwnerToken::parse("10-20-30").unwrap();
        assert_eq!(
            temp_file_name("report.pdf", &owner, 7),
            "temp-file-cache$10-20-30$7$report.pdf"
        );
    }

    #[test]
    fn perm_path_joins_dir() {
        let path = perm_path(Path::new("/var/cache/c"), "k", 42);
        assert_eq!(path, PathBuf::from("/var/cache/c/perm-file-cache$42$k"));
    }

    #[test]
    fn parse_perm_round_trip() {
        let parsed = parse_perm(&perm_file_name("k", 1234)).unwrap();
        assert_eq!(parsed.expires_at, 1234);
        assert_eq!(parsed.id, "k");
    }

    #[test]
    fn parse_perm_negative_timestamp() {
        let parsed = parse_perm("perm-file-cache$-99$k").unwrap();
        assert_eq!(parsed.expires_at, -99);
    }

    #[test]
    fn parse_perm_keeps_separator_in_id() {
        // Bounded split: everything after the second separator is the id.
        let parsed = parse_perm("perm-file-cache$1$a$b$c").unwrap();
        assert_eq!(parsed.expires_at, 1);
        assert_eq!(parsed.id, "a$b$c");
    }

    #[test]
    fn parse_perm_rejects_foreign_prefix() {
        assert_eq!(
            parse_perm("temp-file-cache$1-1-1$0$k"),
            Err(ParseError::BadPrefix)
        );
        assert_eq!(parse_perm("notes.txt"), Err(ParseError::BadPrefix));
    }

    #[test]
    fn parse_perm_rejects_missing_parts() {
        assert_eq!(parse_perm("perm-file-cache"), Err(ParseError::BadFormat));
        assert_eq!(parse_perm("perm-file-cache$123"), Err(ParseError::BadFormat));
        assert_eq!(parse_perm("perm-file-cache$123$"), Err(ParseError::BadFormat));
    }

    #[test]
    fn parse_perm_rejects_bad_timestamp() {
        assert_eq!(
            parse_perm("perm-file-cache$_$k"),
            Err(ParseError::BadTimestamp)
        );
        assert_eq!(
            parse_perm("perm-file-cache$12.5$k"),
            Err(ParseError::BadTimestamp)
        );
    }

    #[test]
    fn parse_temp_round_trip() {
        let owner = OwnerToken::mint();
        let parsed = parse_temp(&temp_file_name("k", &owner, 3)).unwrap();
        assert_eq!(parsed.owner, owner);
        assert_eq!(parsed.unique, "3");
        assert_eq!(parsed.id, "k");
    }

    #[test]
    fn parse_temp_keeps_separator_in_id() {
        let parsed = parse_temp("temp-file-cache$1-2-3$0$a$b").unwrap();
        assert_eq!(parsed.id, "a$b");
    }

    #[test]
    fn parse_temp_rejects_bad_owner() {
        assert_eq!(
            parse_temp("temp-file-cache$_$_$k"),
            Err(ParseError::BadOwner)
        );
    }

    #[test]
    fn parse_temp_rejects_missing_parts() {
        assert_eq!(
            parse_temp("temp-file-cache$1-2-3$0"),
            Err(ParseError::BadFormat)
        );
    }

    #[test]
    fn perm_wildcard_for_id() {
        let pattern = perm_wildcard(Path::new("/var/cache/c"), Some("k"));
        assert_eq!(pattern, "/var/cache/c/perm-file-cache$*$k");
    }

    #[test]
    fn perm_wildcard_for_all() {
        let pattern = perm_wildcard(Path::new("/var/cache/c"), None);
        assert_eq!(pattern, "/var/cache/c/perm-file-cache$*");
    }

    #[test]
    fn wildcard_escapes_metacharacters_in_id() {
        let pattern = perm_wildcard(Path::new("/d"), Some("a*b?c[d]"));
        assert_eq!(pattern, "/d/perm-file-cache$*$a[*]b[?]c[[]d[]]");
    }

    #[test]
    fn wildcard_escapes_metacharacters_in_dir() {
        let pattern = temp_wildcard(Path::new("/d[1]/t"));
        assert_eq!(pattern, "/d[[]1[]]/t/temp-file-cache$*");
    }

    #[test]
    fn wildcard_matches_own_encoding() {
        let name = perm_file_name("a*b?c", 77);
        let pattern = Pattern::new(&format!(
            "{PERM_PREFIX}{SEP}*{SEP}{}",
            Pattern::escape("a*b?c")
        ))
        .unwrap();
        assert!(pattern.matches(&name));
        assert!(!pattern.matches(&perm_file_name("aXbYc", 77)));
    }
}
