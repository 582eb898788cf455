//! Shared proptest case counts.
//!
//! The default count follows the test tier selected by Cargo feature:
//!
//! | Tier     | Feature     | Cases |
//! |----------|-------------|-------|
//! | Fast     | `test-fast` | 8     |
//! | Standard | (none)      | 32    |
//! | Full     | `test-full` | 256   |
//!
//! `PROPTEST_CASES` in the environment overrides the tier.
//!
//! Async properties drive a [`TestRunner`](proptest::test_runner::TestRunner)
//! by hand so one tokio runtime serves every case:
//!
//! ```no_run
//! use proptest::{prelude::*, test_runner::TestRunner};
//! use rolegate_test_fixtures::proptest_config::proptest_config;
//!
//! let mut runner = TestRunner::new(proptest_config());
//! runner.run(&any::<u8>(), |_| Ok(())).unwrap();
//! ```

pub use proptest::test_runner::Config;

/// Test execution tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Fast,
    Standard,
    Full,
}

impl Tier {
    /// Tier chosen by Cargo features; `test-full` wins over `test-fast`.
    #[must_use]
    pub const fn current() -> Self {
        if cfg!(feature = "test-full") {
            Tier::Full
        } else if cfg!(feature = "test-fast") {
            Tier::Fast
        } else {
            Tier::Standard
        }
    }

    #[must_use]
    pub const fn proptest_cases(self) -> u32 {
        match self {
            Tier::Fast => 8,
            Tier::Standard => 32,
            Tier::Full => 256,
        }
    }
}

/// Case count for the current tier, unless `PROPTEST_CASES` says otherwise.
#[must_use]
pub fn test_cases() -> u32 {
    std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|s| s.parse().ok())
        .filter(|&n| n > 0)
        .unwrap_or(Tier::current().proptest_cases())
}

#[must_use]
pub fn proptest_config() -> Config {
    Config::with_cases(test_cases())
}
