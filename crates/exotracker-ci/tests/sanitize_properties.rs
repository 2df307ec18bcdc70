//! Property-based tests for build directory naming.

use exotracker_ci::{sanitize_path, BuildMatrix};
use proptest::prelude::*;
use std::collections::HashMap;

fn is_allowed(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')
}

fn matrix(job: &str, configuration: &str, version: &str) -> BuildMatrix {
    let vars: HashMap<&str, String> = [
        ("APPVEYOR_JOB_NAME", job.to_string()),
        ("CONFIGURATION", configuration.to_string()),
        ("APPVEYOR_BUILD_VERSION", version.to_string()),
    ]
    .into_iter()
    .collect();
    BuildMatrix::from_lookup(|key| vars.get(key).cloned()).expect("valid matrix")
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        ..ProptestConfig::default()
    })]

    /// Output only ever contains the allowed character class.
    #[test]
    fn sanitize_output_is_path_safe(s in any::<String>()) {
        let out = sanitize_path(&s);
        prop_assert!(out.chars().all(is_allowed), "unsafe output {:?}", out);
    }

    /// Sanitizing twice changes nothing.
    #[test]
    fn sanitize_is_idempotent(s in any::<String>()) {
        let once = sanitize_path(&s);
        prop_assert_eq!(sanitize_path(&once), once);
    }

    /// One output character per input character.
    #[test]
    fn sanitize_preserves_char_count(s in any::<String>()) {
        prop_assert_eq!(sanitize_path(&s).chars().count(), s.chars().count());
    }

    /// Already-safe names pass through untouched.
    #[test]
    fn sanitize_keeps_safe_names(s in "[A-Za-z0-9_.-]{0,40}") {
        prop_assert_eq!(sanitize_path(&s), s);
    }

    /// Names derived from the same matrix never drift between calls.
    #[test]
    fn derived_names_are_deterministic(
        job in ".{0,30}",
        configuration in "[A-Za-z]{1,10}",
        version in "[0-9]{1,3}\\.[0-9]{1,3}\\.[0-9]{1,3}",
    ) {
        let a = matrix(&job, &configuration, &version);
        let b = matrix(&job, &configuration, &version);

        prop_assert_eq!(a.build_dir_name(), b.build_dir_name());
        prop_assert_eq!(a.archive_name(), b.archive_name());
        prop_assert!(a.build_dir_name().chars().all(is_allowed));
    }

    /// The configuration suffix appears exactly when it is not Release.
    #[test]
    fn archive_suffix_only_for_non_release(
        configuration in "[A-Za-z]{1,10}",
        version in "[0-9]{1,3}\\.[0-9]{1,3}",
    ) {
        let name = matrix("job", &configuration, &version).archive_name();
        if configuration == "Release" {
            prop_assert_eq!(name, format!("exotracker-v{version}-dev"));
        } else {
            prop_assert_eq!(name, format!("exotracker-v{version}-{configuration}-dev"));
        }
    }
}
