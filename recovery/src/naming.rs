//! Filename conventions written by the sync daemon
//!
//! Two grammars are recognised, both matched against the base name only:
//!
//! - conflict copies: `<base>.sync-conflict-<YYYYMMDD>-<HHMMSS>-<token>[<.ext>]`
//! - archived versions: `<base>~<YYYYMMDD>-<HHMMSS>[<.ext>]`, stored under the
//!   reserved [`VERSIONS_DIR`] subtree mirroring the folder layout.
//!
//! Parsing never fails: anything that does not match yields `None`.
//! Timestamps are local wall-clock time with no zone marker.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Reserved directory holding version artifacts
pub const VERSIONS_DIR: &str = ".stversions";

/// Literal marker separating the original base from the conflict suffix
pub const CONFLICT_MARKER: &str = ".sync-conflict-";

const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

static CONFLICT_NAME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.*)\.sync-conflict-([0-9]{8})-([0-9]{6})-([A-Za-z0-9_]+)(\..*)?$")
        .expect("Invalid conflict name regex")
});

static VERSION_NAME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.*)~([0-9]{8})-([0-9]{6})(\..*)?$").expect("Invalid version name regex")
});

/// A conflict filename split into its parts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictName {
    /// Original name without its extension
    pub original_base: String,
    /// The `.sync-conflict-<date>-<time>-<token>` part
    pub conflict_marker: String,
    /// Original extension including the dot, empty when there was none
    pub extension: String,
    /// Opaque device token
    pub token: String,
    date: String,
    time: String,
}

impl ConflictName {
    /// Name of the file this conflict copy diverged from
    pub fn original_name(&self) -> String {
        format!("{}{}", self.original_base, self.extension)
    }

    /// Embedded local timestamp, if the digits form a valid date and time
    pub fn timestamp(&self) -> Option<DateTime<Local>> {
        local_from_digits(&self.date, &self.time)
    }
}

/// A version filename split into its parts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionName {
    /// Original file name, extension restored
    pub original_name: String,
    /// Local time the version was taken
    pub timestamp: DateTime<Local>,
}

/// Parse a conflict copy's file name
pub fn parse_conflict_name(filename: &str) -> Option<ConflictName> {
    let caps = CONFLICT_NAME_REGEX.captures(filename)?;
    let original_base = caps.get(1).map_or("", |m| m.as_str());
    let extension = caps.get(5).map_or("", |m| m.as_str());

    if original_base.is_empty() && extension.is_empty() {
        return None;
    }

    let date = caps[2].to_string();
    let time = caps[3].to_string();
    let token = caps[4].to_string();

    Some(ConflictName {
        original_base: original_base.to_string(),
        conflict_marker: format!("{CONFLICT_MARKER}{date}-{time}-{token}"),
        extension: extension.to_string(),
        token,
        date,
        time,
    })
}

/// Build a conflict copy's file name
pub fn format_conflict_name(
    original_base: &str,
    extension: &str,
    timestamp: &DateTime<Local>,
    token: &str,
) -> String {
    format!(
        "{original_base}{CONFLICT_MARKER}{}-{token}{extension}",
        timestamp.format(TIMESTAMP_FORMAT)
    )
}

/// Parse a version artifact's file name
///
/// Digits that do not form a valid local date and time are not a match.
/// The base is empty for dotfiles such as `~20230601-093000.env`, but base
/// and extension cannot both be empty.
pub fn parse_version_name(filename: &str) -> Option<VersionName> {
    let caps = VERSION_NAME_REGEX.captures(filename)?;
    let original_base = caps.get(1).map_or("", |m| m.as_str());
    let extension = caps.get(4).map_or("", |m| m.as_str());

    if original_base.is_empty() && extension.is_empty() {
        return None;
    }

    let timestamp = local_from_digits(&caps[2], &caps[3])?;
    Some(VersionName {
        original_name: format!("{}{}", original_base, extension),
        timestamp,
    })
}

/// Build a version artifact's file name
pub fn format_version_name(
    original_base: &str,
    extension: &str,
    timestamp: &DateTime<Local>,
) -> String {
    format!(
        "{original_base}~{}{extension}",
        timestamp.format(TIMESTAMP_FORMAT)
    )
}

/// Split a file name into base and extension the way the daemon does:
/// the extension starts at the last dot and keeps it.
pub fn split_extension(filename: &str) -> (&str, &str) {
    match filename.rfind('.') {
        Some(idx) => filename.split_at(idx),
        None => (filename, ""),
    }
}

/// Path of the file a conflict copy belongs to, derived from its name
pub fn conflict_original_path(conflict_path: &Path) -> Option<PathBuf> {
    let name = conflict_path.file_name()?.to_str()?;
    let parsed = parse_conflict_name(name)?;
    Some(conflict_path.with_file_name(parsed.original_name()))
}

/// Directory under the reserved subtree that mirrors `original`'s parent
pub fn version_dir_for(root: &Path, original: &Path) -> Option<PathBuf> {
    let relative_parent = original.parent()?.strip_prefix(root).ok()?;
    Some(root.join(VERSIONS_DIR).join(relative_parent))
}

/// Full version artifact path for `original` taken at `timestamp`
pub fn version_path_for(
    root: &Path,
    original: &Path,
    timestamp: &DateTime<Local>,
) -> Option<PathBuf> {
    let dir = version_dir_for(root, original)?;
    let name = original.file_name()?.to_str()?;
    let (base, extension) = split_extension(name);
    Some(dir.join(format_version_name(base, extension, timestamp)))
}

/// Logical original path for a version artifact under `root`
///
/// Inverse of [`version_path_for`]; `None` when the path is outside the
/// reserved subtree or its name is not a version name.
pub fn original_path_for(root: &Path, version_path: &Path) -> Option<PathBuf> {
    let relative = version_path.strip_prefix(root.join(VERSIONS_DIR)).ok()?;
    let name = relative.file_name()?.to_str()?;
    let parsed = parse_version_name(name)?;
    let relative_parent = relative.parent().unwrap_or_else(|| Path::new(""));
    Some(root.join(relative_parent).join(parsed.original_name))
}

fn local_from_digits(date: &str, time: &str) -> Option<DateTime<Local>> {
    let date = NaiveDate::parse_from_str(date, "%Y%m%d").ok()?;
    let time = NaiveTime::parse_from_str(time, "%H%M%S").ok()?;
    Local
        .from_local_datetime(&NaiveDateTime::new(date, time))
        .earliest()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_parse_conflict_name_with_extension() {
        let parsed = parse_conflict_name("report.sync-conflict-20240101-120000-ABCD1234.docx").unwrap();
        assert_eq!(parsed.original_base, "report");
        assert_eq!(parsed.extension, ".docx");
        assert_eq!(parsed.token, "ABCD1234");
        assert_eq!(parsed.conflict_marker, ".sync-conflict-20240101-120000-ABCD1234");
        assert_eq!(parsed.original_name(), "report.docx");
    }

    #[test]
    fn test_parse_conflict_name_without_extension() {
        let parsed = parse_conflict_name("Makefile.sync-conflict-20240101-120000-XYZ").unwrap();
        assert_eq!(parsed.original_name(), "Makefile");
        assert_eq!(parsed.extension, "");
    }

    #[test]
    fn test_parse_conflict_name_rejects_other_names() {
        assert!(parse_conflict_name("report.docx").is_none());
        assert!(parse_conflict_name("report.sync-conflict-2024011-120000-A.docx").is_none());
        assert!(parse_conflict_name("report.SYNC-CONFLICT-20240101-120000-A.docx").is_none());
        assert!(parse_conflict_name("report.sync-conflict-20240101-120000-.docx").is_none());
    }

    #[test]
    fn test_parse_version_name() {
        let parsed = parse_version_name("notes~20230601-093000.txt").unwrap();
        assert_eq!(parsed.original_name, "notes.txt");
        assert_eq!(parsed.timestamp.year(), 2023);
        assert_eq!(parsed.timestamp.month(), 6);
        assert_eq!(parsed.timestamp.day(), 1);
        assert_eq!(parsed.timestamp.hour(), 9);
        assert_eq!(parsed.timestamp.minute(), 30);
        assert_eq!(parsed.timestamp.second(), 0);
    }

    #[test]
    fn test_parse_version_name_dotfile() {
        let parsed = parse_version_name("~20230601-093000.env").unwrap();
        assert_eq!(parsed.original_name, ".env");
        assert!(parse_version_name("~20230601-093000").is_none());
    }

    #[test]
    fn test_dotfile_version_path_inverts() {
        let root = Path::new("/data/folder");
        let original = Path::new("/data/folder/config/.env");
        let ts = Local.with_ymd_and_hms(2023, 6, 1, 9, 30, 0).unwrap();

        let version = version_path_for(root, original, &ts).unwrap();
        assert_eq!(
            version,
            PathBuf::from("/data/folder/.stversions/config/~20230601-093000.env")
        );
        assert_eq!(original_path_for(root, &version).unwrap(), original);
    }

    #[test]
    fn test_grammars_require_ascii_digits() {
        assert!(parse_conflict_name("report.sync-conflict-\u{0662}\u{0660}\u{0662}\u{0664}\u{0660}\u{0661}\u{0660}\u{0661}-120000-X.txt").is_none());
        assert!(parse_conflict_name("report.sync-conflict-20240101-120000-\u{00e9}t\u{00e9}.txt").is_none());
        assert!(parse_version_name("notes~\u{0662}\u{0660}\u{0662}\u{0663}\u{0660}\u{0666}\u{0660}\u{0661}-093000.txt").is_none());
    }

    #[test]
    fn test_parse_version_name_rejects_invalid_dates() {
        assert!(parse_version_name("notes~20231301-093000.txt").is_none());
        assert!(parse_version_name("notes~20230601-256000.txt").is_none());
        assert!(parse_version_name("notes.txt").is_none());
    }

    #[test]
    fn test_split_extension() {
        assert_eq!(split_extension("notes.txt"), ("notes", ".txt"));
        assert_eq!(split_extension("archive.tar.gz"), ("archive.tar", ".gz"));
        assert_eq!(split_extension("README"), ("README", ""));
        assert_eq!(split_extension(".bashrc"), ("", ".bashrc"));
    }

    #[test]
    fn test_mirrored_paths_are_inverse() {
        let root = Path::new("/data/folder");
        let original = Path::new("/data/folder/docs/2023/notes.txt");
        let ts = Local.with_ymd_and_hms(2023, 6, 1, 9, 30, 0).unwrap();

        let version = version_path_for(root, original, &ts).unwrap();
        assert_eq!(
            version,
            PathBuf::from("/data/folder/.stversions/docs/2023/notes~20230601-093000.txt")
        );
        assert_eq!(original_path_for(root, &version).unwrap(), original);
    }

    #[test]
    fn test_original_path_for_outside_subtree() {
        let root = Path::new("/data/folder");
        assert!(original_path_for(root, Path::new("/data/folder/notes~20230601-093000.txt")).is_none());
        assert!(original_path_for(root, Path::new("/data/folder/.stversions/notes.txt")).is_none());
    }

    #[test]
    fn test_conflict_original_path() {
        let path = Path::new("/data/folder/report.sync-conflict-20240101-120000-ABCD1234.docx");
        assert_eq!(
            conflict_original_path(path).unwrap(),
            PathBuf::from("/data/folder/report.docx")
        );
    }
}
