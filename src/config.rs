//! Centralized configuration for the checker.
//!
//! Goals:
//! - Single place to collect tunables instead of scattering env lookups.
//! - CheckConfig::from_env() reads BOLTCHECK_* env vars; fluent `with_*`
//!   setters override specific fields.
//!
//! Env:
//! - BOLTCHECK_MMAP = 0|1|true|false (default on) — map the file or read it into RAM
//! - BOLTCHECK_LOCK_TIMEOUT_MS = <u64> (default 0) — wait for the shared file lock

use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckConfig {
    /// Map the store file with mmap; false reads the whole file into RAM.
    /// Env: BOLTCHECK_MMAP (default true)
    pub mmap: bool,

    /// How long to wait for the shared lock on the store file, in ms.
    /// 0 fails immediately if a writer holds the file.
    /// Env: BOLTCHECK_LOCK_TIMEOUT_MS (default 0)
    pub lock_timeout_ms: u64,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            mmap: true,
            lock_timeout_ms: 0,
        }
    }
}

#[inline]
fn env_flag(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl CheckConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("BOLTCHECK_MMAP") {
            if let Some(on) = env_flag(&v) {
                cfg.mmap = on;
            }
        }

        if let Ok(v) = std::env::var("BOLTCHECK_LOCK_TIMEOUT_MS") {
            if let Ok(n) = v.trim().parse::<u64>() {
                cfg.lock_timeout_ms = n;
            }
        }

        cfg
    }

    pub fn with_mmap(mut self, on: bool) -> Self {
        self.mmap = on;
        self
    }

    pub fn with_lock_timeout_ms(mut self, ms: u64) -> Self {
        self.lock_timeout_ms = ms;
        self
    }
}

impl fmt::Display for CheckConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CheckConfig {{ mmap: {}, lock_timeout_ms: {} }}",
            self.mmap, self.lock_timeout_ms
        )
    }
}
