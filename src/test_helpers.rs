//! Test-only guard for serialising environment mutation.
//!
//! The fake-session and prefail hooks in `main.rs` are driven by process
//! environment variables; tests that set them must not interleave.

use std::env;

use tokio::sync::{Mutex, MutexGuard};

/// Serialises environment mutation across the binary's async tests.
static ENV_LOCK: Mutex<()> = Mutex::const_new(());

/// Guard that holds the env mutex and removes the variable on drop.
pub struct EnvGuard {
    key: String,
    _guard: MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets an environment variable while holding the global mutex.
    pub async fn set_var(key: &str, value: &str) -> Self {
        let guard = ENV_LOCK.lock().await;
        unsafe { env::set_var(key, value) };
        Self {
            key: key.to_owned(),
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        unsafe { env::remove_var(&self.key) };
    }
}
