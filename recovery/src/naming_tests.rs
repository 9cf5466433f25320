//! Property tests for the filename codecs using proptest

use std::path::PathBuf;

use chrono::{DateTime, Local, TimeZone};
use proptest::prelude::*;
use test_case::test_case;

use crate::naming::*;

/// Strategy for generating base names, dots allowed inside
pub fn base_name() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_\\-]{1,20}(\\.[a-zA-Z0-9_\\-]{1,8})?"
}

/// Strategy for generating extensions, dot included, possibly empty
pub fn extension() -> impl Strategy<Value = String> {
    prop::option::of("[a-z0-9]{1,5}").prop_map(|ext| ext.map(|e| format!(".{}", e)).unwrap_or_default())
}

/// Strategy for generating device tokens
pub fn device_token() -> impl Strategy<Value = String> {
    "[A-Z0-9]{1,12}"
}

/// Strategy for generating local timestamps away from DST transitions
pub fn local_timestamp() -> impl Strategy<Value = DateTime<Local>> {
    (2000i32..2037, 1u32..=12, 1u32..=28, 4u32..=22, 0u32..60, 0u32..60).prop_map(
        |(year, month, day, hour, minute, second)| {
            Local
                .with_ymd_and_hms(year, month, day, hour, minute, second)
                .earliest()
                .expect("timestamp outside DST transitions")
        },
    )
}

/// Strategy for generating relative directory paths
pub fn relative_dir() -> impl Strategy<Value = PathBuf> {
    prop::collection::vec("[a-zA-Z0-9_\\-]{1,12}", 0..4).prop_map(|dirs| dirs.into_iter().collect())
}

proptest! {
    #[test]
    fn conflict_name_round_trips(
        base in base_name(),
        ext in extension(),
        ts in local_timestamp(),
        token in device_token(),
    ) {
        let name = format_conflict_name(&base, &ext, &ts, &token);
        let parsed = parse_conflict_name(&name).expect("generated name must parse");

        prop_assert_eq!(&parsed.original_base, &base);
        prop_assert_eq!(&parsed.extension, &ext);
        prop_assert_eq!(&parsed.token, &token);
        prop_assert_eq!(parsed.timestamp(), Some(ts));
    }

    #[test]
    fn version_name_round_trips(
        base in base_name(),
        ext in extension(),
        ts in local_timestamp(),
    ) {
        let name = format_version_name(&base, &ext, &ts);
        let parsed = parse_version_name(&name).expect("generated name must parse");

        prop_assert_eq!(parsed.original_name, format!("{}{}", base, ext));
        prop_assert_eq!(parsed.timestamp, ts);
    }

    #[test]
    fn parsing_is_total(input in any::<String>()) {
        let _ = parse_conflict_name(&input);
        let _ = parse_version_name(&input);
    }

    #[test]
    fn mirrored_paths_invert(
        dir in relative_dir(),
        base in base_name(),
        ext in extension(),
        ts in local_timestamp(),
    ) {
        let root = PathBuf::from("/sync/root");
        let original = root.join(&dir).join(format!("{}{}", base, ext));

        let version = version_path_for(&root, &original, &ts).expect("original is under root");
        prop_assert!(version.starts_with(root.join(VERSIONS_DIR)));
        prop_assert_eq!(original_path_for(&root, &version), Some(original));
    }

    #[test]
    fn mirrored_dotfile_paths_invert(
        dir in relative_dir(),
        name in "[a-z0-9]{1,8}",
        ts in local_timestamp(),
    ) {
        let root = PathBuf::from("/sync/root");
        let original = root.join(&dir).join(format!(".{}", name));

        let version = version_path_for(&root, &original, &ts).expect("original is under root");
        prop_assert_eq!(original_path_for(&root, &version), Some(original));
    }
}

#[test_case("photo.sync-conflict-20240101-120000-ABC.jpg", "photo.jpg" ; "with extension")]
#[test_case("archive.tar.sync-conflict-20240101-120000-ABC.gz", "archive.tar.gz" ; "double extension")]
#[test_case(".sync-conflict-20240101-120000-ABC.bashrc", ".bashrc" ; "dotfile")]
#[test_case("README.sync-conflict-20240101-120000-ABC", "README" ; "no extension")]
fn test_conflict_original_names(filename: &str, expected: &str) {
    assert_eq!(parse_conflict_name(filename).unwrap().original_name(), expected);
}

#[test_case("report.docx" ; "plain file")]
#[test_case("report.sync-conflict-20240101-1200-ABC.docx" ; "short time")]
#[test_case(".sync-conflict-20240101-120000-ABC" ; "nothing original")]
#[test_case("report.sync_conflict-20240101-120000-ABC.docx" ; "wrong separator")]
fn test_conflict_non_matches(filename: &str) {
    assert!(parse_conflict_name(filename).is_none());
}

#[test_case("notes~20230601-093000.txt", "notes.txt" ; "with extension")]
#[test_case("Makefile~20230601-093000", "Makefile" ; "no extension")]
#[test_case("a~b~20230601-093000.md", "a~b.md" ; "tilde in base")]
#[test_case("~20230601-093000.gitignore", ".gitignore" ; "dotfile")]
fn test_version_original_names(filename: &str, expected: &str) {
    assert_eq!(parse_version_name(filename).unwrap().original_name, expected);
}
