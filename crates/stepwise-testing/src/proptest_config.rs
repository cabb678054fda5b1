//! Shared proptest configuration
//!
//! ```rust,ignore
//! proptest! {
//!     #![proptest_config(stepwise_testing::proptest_config::auto_config())]
//!
//!     #[test]
//!     fn my_property(x in 0..100i32) {
//!         // ...
//!     }
//! }
//! ```
//!
//! `PROPTEST_CASES` controls thoroughness: 64 for quick PR runs, thousands
//! for nightly ones.

use proptest::prelude::*;

/// Fast config for PR checks
pub fn ci_config() -> ProptestConfig {
    ProptestConfig {
        cases: 64,
        max_shrink_iters: 100,
        ..ProptestConfig::default()
    }
}

/// Config from `PROPTEST_CASES`, 256 cases when unset
pub fn auto_config() -> ProptestConfig {
    let cases = std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(256);

    ProptestConfig {
        cases,
        ..ProptestConfig::default()
    }
}
