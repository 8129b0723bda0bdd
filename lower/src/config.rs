//! Halo analysis configuration.
//!
//! Built explicitly with a bon builder or from environment variables.

use bon::bon;

/// Knobs of the halo analysis and guard insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HaloConfig {
    /// Check parallelization of halo-extended axes once propagation is done.
    pub validate_parallelization: bool,
    /// Log the rendered halo map at debug level after the build.
    pub dump_halo_map: bool,
    /// Literal written by the padding branch.
    pub pad_value: i64,
}

impl Default for HaloConfig {
    fn default() -> Self {
        Self { validate_parallelization: true, dump_halo_map: false, pad_value: 0 }
    }
}

#[bon]
impl HaloConfig {
    /// Create a halo configuration with builder pattern.
    #[builder]
    pub fn builder(
        #[builder(default = true)] validate_parallelization: bool,
        #[builder(default = false)] dump_halo_map: bool,
        #[builder(default = 0)] pad_value: i64,
    ) -> Self {
        Self { validate_parallelization, dump_halo_map, pad_value }
    }

    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// * `HALO_SKIP_VALIDATION` - Skip the parallelization check if set
    /// * `HALO_DEBUG` - Dump the halo map if set
    /// * `HALO_PAD_VALUE` - Padding literal (default: 0)
    pub fn from_env() -> Self {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Read the environment variables of [`Self::from_env`] through `var`.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let validate_parallelization = var("HALO_SKIP_VALIDATION").is_none();
        let dump_halo_map = var("HALO_DEBUG").is_some();
        let pad_value = var("HALO_PAD_VALUE").and_then(|s| s.parse().ok()).unwrap_or(0);

        Self { validate_parallelization, dump_halo_map, pad_value }
    }
}
