//! Collector configuration.

use std::time::Duration;

use crate::error::GcError;

/// Young-generation cycles are allowed unless disabled.
pub const DEFAULT_YOUNG_GEN_ENABLED: bool = true;
/// How long a cycle waits for the pipeline to drain.
pub const DEFAULT_PAUSE_TIMEOUT: Duration = Duration::from_secs(30);
/// Per-cycle summaries are off.
pub const DEFAULT_VERBOSE: bool = false;

/// Settings for one [`GarbageCollector`](crate::GarbageCollector).
///
/// Periodic cycles are off unless an interval is set; cycles can always be
/// triggered explicitly.
///
/// ```
/// use std::time::Duration;
/// use cluster_dgc::GcConfig;
///
/// let config = GcConfig::default()
///     .with_young_gen_interval(Duration::from_secs(60))
///     .with_pause_timeout(Duration::from_secs(5));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcConfig {
    /// Allow young-generation cycles.
    pub young_gen_enabled: bool,
    /// Period of scheduled young-generation cycles.
    pub young_gen_interval: Option<Duration>,
    /// Period of scheduled full cycles.
    pub full_interval: Option<Duration>,
    /// Upper bound on waiting for the transaction pipeline to drain.
    pub pause_timeout: Duration,
    /// Publish a summary of every cycle through the logging listener.
    pub verbose: bool,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            young_gen_enabled: DEFAULT_YOUNG_GEN_ENABLED,
            young_gen_interval: None,
            full_interval: None,
            pause_timeout: DEFAULT_PAUSE_TIMEOUT,
            verbose: DEFAULT_VERBOSE,
        }
    }
}

impl GcConfig {
    /// Allow or forbid young-generation cycles.
    #[must_use]
    pub const fn with_young_gen_enabled(mut self, enabled: bool) -> Self {
        self.young_gen_enabled = enabled;
        self
    }

    /// Schedule young-generation cycles every `interval`.
    #[must_use]
    pub const fn with_young_gen_interval(mut self, interval: Duration) -> Self {
        self.young_gen_interval = Some(interval);
        self
    }

    /// Schedule full cycles every `interval`.
    #[must_use]
    pub const fn with_full_interval(mut self, interval: Duration) -> Self {
        self.full_interval = Some(interval);
        self
    }

    /// Bound the wait for the pipeline to drain.
    #[must_use]
    pub const fn with_pause_timeout(mut self, timeout: Duration) -> Self {
        self.pause_timeout = timeout;
        self
    }

    /// Publish a summary of every cycle.
    #[must_use]
    pub const fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Returns `true` if any periodic cycle is configured.
    #[must_use]
    pub const fn is_scheduled(&self) -> bool {
        self.full_interval.is_some() || (self.young_gen_enabled && self.young_gen_interval.is_some())
    }

    /// Reject zero intervals and a zero pause timeout.
    ///
    /// # Errors
    ///
    /// [`GcError::InvalidConfig`] naming the offending field.
    pub fn validate(&self) -> Result<(), GcError> {
        if self.pause_timeout.is_zero() {
            return Err(GcError::InvalidConfig(
                "pause_timeout must be greater than zero".to_string(),
            ));
        }
        if self.young_gen_interval.is_some_and(|d| d.is_zero()) {
            return Err(GcError::InvalidConfig(
                "young_gen_interval must be greater than zero".to_string(),
            ));
        }
        if self.full_interval.is_some_and(|d| d.is_zero()) {
            return Err(GcError::InvalidConfig(
                "full_interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
