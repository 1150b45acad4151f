//! Read settings, loadable from environment variables.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Knobs a read algorithm exposes to the source driving it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadSettings {
    /// Offload each `read()` to a background worker.
    pub use_asynchronous_read_from_pool: bool,
    /// Whether the host can provide a cross-thread readiness signal. When
    /// false the source always reads inline.
    pub async_read_supported: bool,
    /// Worker threads of the shared I/O runtime.
    pub io_threads: usize,
    /// Rows per batch for readers that chunk their input.
    pub batch_size: usize,
}

impl Default for ReadSettings {
    fn default() -> Self {
        Self {
            use_asynchronous_read_from_pool: false,
            async_read_supported: true,
            io_threads: 4,
            batch_size: 8192,
        }
    }
}

impl ReadSettings {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            use_asynchronous_read_from_pool: parse_bool_var(
                "SCANPIPE_ASYNC_READ",
                defaults.use_asynchronous_read_from_pool,
            )?,
            async_read_supported: parse_bool_var(
                "SCANPIPE_ASYNC_SUPPORTED",
                defaults.async_read_supported,
            )?,
            io_threads: std::env::var("SCANPIPE_IO_THREADS")
                .unwrap_or_else(|_| defaults.io_threads.to_string())
                .parse()
                .context("Invalid SCANPIPE_IO_THREADS")?,
            batch_size: std::env::var("SCANPIPE_BATCH_SIZE")
                .unwrap_or_else(|_| defaults.batch_size.to_string())
                .parse()
                .context("Invalid SCANPIPE_BATCH_SIZE")?,
        })
    }

    /// Async reads are used only when requested and supported.
    pub fn async_reads_enabled(&self) -> bool {
        self.use_asynchronous_read_from_pool && self.async_read_supported
    }

    pub fn with_async_read(mut self, enabled: bool) -> Self {
        self.use_asynchronous_read_from_pool = enabled;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }
}

fn parse_bool_var(key: &str, default: bool) -> Result<bool> {
    match std::env::var(key) {
        Ok(v) => match v.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => anyhow::bail!("Invalid {}: {}", key, other),
        },
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Serialize env-mutating tests to avoid races.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_env() {
        for key in [
            "SCANPIPE_ASYNC_READ",
            "SCANPIPE_ASYNC_SUPPORTED",
            "SCANPIPE_IO_THREADS",
            "SCANPIPE_BATCH_SIZE",
        ] {
            unsafe { std::env::remove_var(key) };
        }
    }

    #[test]
    fn from_env_defaults() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env();

        let settings = ReadSettings::from_env().unwrap();
        assert_eq!(settings, ReadSettings::default());
        assert!(!settings.async_reads_enabled());

        clear_env();
    }

    #[test]
    fn from_env_with_all_vars() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env();

        unsafe {
            std::env::set_var("SCANPIPE_ASYNC_READ", "true");
            std::env::set_var("SCANPIPE_ASYNC_SUPPORTED", "1");
            std::env::set_var("SCANPIPE_IO_THREADS", "2");
            std::env::set_var("SCANPIPE_BATCH_SIZE", "512");
        }

        let settings = ReadSettings::from_env().unwrap();
        assert!(settings.use_asynchronous_read_from_pool);
        assert_eq!(settings.io_threads, 2);
        assert_eq!(settings.batch_size, 512);
        assert!(settings.async_reads_enabled());

        clear_env();
    }

    #[test]
    fn from_env_unsupported_platform_disables_async() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env();

        unsafe {
            std::env::set_var("SCANPIPE_ASYNC_READ", "on");
            std::env::set_var("SCANPIPE_ASYNC_SUPPORTED", "off");
        }

        let settings = ReadSettings::from_env().unwrap();
        assert!(settings.use_asynchronous_read_from_pool);
        assert!(!settings.async_reads_enabled());

        clear_env();
    }

    #[test]
    fn from_env_invalid_values() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env();

        unsafe { std::env::set_var("SCANPIPE_IO_THREADS", "many") };
        assert!(ReadSettings::from_env().is_err());
        clear_env();

        unsafe { std::env::set_var("SCANPIPE_ASYNC_READ", "maybe") };
        assert!(ReadSettings::from_env().is_err());

        clear_env();
    }
}
