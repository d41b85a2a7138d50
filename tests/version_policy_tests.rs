//! Tests for the update-availability policy.
//!
//! The policy is deliberately not semantic-version aware: any non-empty
//! tag that differs from the recorded version triggers an update, and a
//! feed with no release never does.

use loadstone::release::{reported_latest, update_available, ReleaseDescriptor};
use proptest::prelude::*;

/// An update is flagged for a strictly newer tag.
#[test]
fn test_newer_tag_flags_update() {
    assert!(update_available("v.1.0", "v.1.1"));
}

/// The same tag never flags an update.
#[test]
fn test_same_tag_is_up_to_date() {
    assert!(!update_available("v.1.0", "v.1.0"));
}

/// A "downgrade" is indistinguishable from an upgrade; only difference
/// matters.
#[test]
fn test_older_tag_also_flags_update() {
    assert!(update_available("v.2.0", "v.1.0"));
}

/// No latest tag means no update, with the reported latest falling back
/// to the current version.
#[test]
fn test_no_release_reports_current() {
    assert!(!update_available("v.1.0", ""));
    assert_eq!(reported_latest("v.1.0", None), "v.1.0");
}

/// The reported latest is the feed's tag when a release exists.
#[test]
fn test_release_reports_feed_tag() {
    let release = ReleaseDescriptor {
        tag: "v.1.1".to_string(),
        asset_url: "https://example.invalid/release.zip".to_string(),
    };
    assert_eq!(reported_latest("v.1.0", Some(&release)), "v.1.1");
}

proptest! {
    /// For all pairs: available iff the latest tag is non-empty and
    /// differs from the current version.
    #[test]
    fn update_available_is_plain_inequality(current in ".{0,24}", latest in ".{0,24}") {
        let expected = !latest.is_empty() && latest != current;
        prop_assert_eq!(update_available(&current, &latest), expected);
    }

    /// Reconciling a version against itself is never an update.
    #[test]
    fn same_version_never_updates(version in ".{1,24}") {
        prop_assert!(!update_available(&version, &version));
    }
}
