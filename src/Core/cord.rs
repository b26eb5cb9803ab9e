// A cord is an OS thread with its own single-threaded event loop. Fibers are
// tasks spawned on the cord's LocalSet; they never migrate between threads.

use std::future::Future;
use std::thread;

use tokio::task::LocalSet;
use tracing::debug;

use super::error::{CbusError, Result};

/// A running cord. Join it to collect the output of its main fiber.
pub struct Cord<T> {
    name: String,
    thread: thread::JoinHandle<Result<T>>,
}

impl<T: Send + 'static> Cord<T> {
    /// Start a cord named `name` whose main fiber is `main()`.
    ///
    /// The future is created on the new thread, so it may hold `!Send`
    /// state such as pipes and fiber pools.
    pub fn spawn<F, Fut>(name: impl Into<String>, main: F) -> Result<Self>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + 'static,
    {
        Self::spawn_with(thread::Builder::new(), name.into(), main)
    }

    pub(crate) fn spawn_with<F, Fut>(
        builder: thread::Builder,
        name: String,
        main: F,
    ) -> Result<Self>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + 'static,
    {
        let cord_name = name.clone();
        let thread = builder
            .name(name.clone())
            .spawn(move || {
                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .map_err(CbusError::Runtime)?;
                let local = LocalSet::new();
                debug!(cord = %cord_name, "cord started");
                let output = local.block_on(&rt, main());
                debug!(cord = %cord_name, "cord finished");
                Ok(output)
            })
            .map_err(|source| CbusError::CordSpawn {
                name: name.clone(),
                source,
            })?;
        Ok(Self { name, thread })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the cord to finish and return its main fiber's output.
    pub fn join(self) -> Result<T> {
        let Cord { name, thread } = self;
        match thread.join() {
            Ok(output) => output,
            Err(_) => Err(CbusError::CordPanicked { name }),
        }
    }
}

/// Name of the calling cord (its thread name), or `"main"`.
pub fn cord_name() -> String {
    thread::current().name().unwrap_or("main").to_string()
}
