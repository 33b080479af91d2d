//! Configuration for the session cache.

use std::time::Duration;

/// Default idle threshold after which an unused session is reclaimed.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(180);

/// Default interval for the background sweep task.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Which idle entries the sweep is allowed to evict.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EvictionPolicy {
    /// Evict only entries that are idle past the threshold and hold no caller tokens.
    #[default]
    IdleAndUnreferenced,

    /// Evict on idle time alone. Callers that never released are treated as abandoned.
    IdleOnly,
}

/// Configuration for the session cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// How long an entry may go untouched before the sweep reclaims it.
    pub idle_timeout: Duration,

    /// Which idle entries may be evicted.
    pub eviction: EvictionPolicy,

    /// Whether every successful `acquire` kicks off a sweep in the background.
    pub sweep_on_acquire: bool,

    /// Whether to run the periodic sweep task.
    /// If false, expired sessions are only reclaimed opportunistically.
    pub enable_sweep_task: bool,

    /// Interval for the sweep task (if enabled).
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            eviction: EvictionPolicy::default(),
            sweep_on_acquire: true,
            enable_sweep_task: true,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

impl CacheConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the idle threshold.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the eviction policy.
    pub fn with_eviction(mut self, policy: EvictionPolicy) -> Self {
        self.eviction = policy;
        self
    }

    /// Enable or disable the opportunistic sweep on acquire.
    pub fn with_sweep_on_acquire(mut self, enabled: bool) -> Self {
        self.sweep_on_acquire = enabled;
        self
    }

    /// Enable or disable the background sweep task.
    pub fn with_sweep_task(mut self, enabled: bool) -> Self {
        self.enable_sweep_task = enabled;
        self
    }

    /// Set the sweep interval. A zero interval disables the background task.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        if interval.is_zero() {
            self.enable_sweep_task = false;
        }
        self
    }
}
