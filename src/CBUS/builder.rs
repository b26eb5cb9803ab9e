use std::future::Future;
use std::rc::Rc;
use std::str::FromStr;
use std::thread;
use std::time::Duration;

use super::fiber_pool::{FiberPool, FIBER_POOL_IDLE_TIMEOUT, FIBER_POOL_SIZE};
use crate::Core::cord::Cord;
use crate::Core::error::Result;

pub const ENV_FIBER_POOL_SIZE: &str = "CBUS_FIBER_POOL_SIZE";
pub const ENV_FIBER_POOL_IDLE_TIMEOUT_MS: &str = "CBUS_FIBER_POOL_IDLE_TIMEOUT_MS";

/// Environment variable parsed as `T`, or `default` if unset or unparsable.
fn env_get<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

pub struct FiberPoolBuilder {
    max_size: usize,
    idle_timeout: Duration,
}

impl Default for FiberPoolBuilder {
    fn default() -> Self {
        Self {
            max_size: FIBER_POOL_SIZE,
            idle_timeout: FIBER_POOL_IDLE_TIMEOUT,
        }
    }
}

impl FiberPoolBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `CBUS_FIBER_POOL_SIZE` and
    /// `CBUS_FIBER_POOL_IDLE_TIMEOUT_MS`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let idle_ms = env_get(
            ENV_FIBER_POOL_IDLE_TIMEOUT_MS,
            defaults.idle_timeout.as_millis() as u64,
        );
        Self {
            max_size: env_get(ENV_FIBER_POOL_SIZE, defaults.max_size).max(1),
            idle_timeout: Duration::from_millis(idle_ms),
        }
    }

    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    pub fn build(self) -> Rc<FiberPool> {
        FiberPool::create(self.max_size, self.idle_timeout)
    }

    /// Build the pool and make it the calling cord's pool. Pipes created
    /// afterwards on this cord run their messages on it.
    pub fn install(self) -> Rc<FiberPool> {
        let pool = self.build();
        FiberPool::install(Rc::clone(&pool));
        pool
    }
}

pub struct CordBuilder {
    name: String,
    stack_size: Option<usize>,
}

impl CordBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stack_size: None,
        }
    }

    pub fn with_stack_size(mut self, size: usize) -> Self {
        self.stack_size = Some(size);
        self
    }

    pub fn spawn<T, F, Fut>(self, main: F) -> Result<Cord<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + 'static,
    {
        let mut builder = thread::Builder::new();
        if let Some(size) = self.stack_size {
            builder = builder.stack_size(size);
        }
        Cord::spawn_with(builder, self.name, main)
    }
}
