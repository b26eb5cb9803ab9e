// Per-cord pool of worker fibers executing delivered messages.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{debug, error};

use crate::CBUS::builder::FiberPoolBuilder;
use crate::CBUS::Msg::Cmsg::Cmsg;
use crate::CBUS::Msg::Cmsg_impl::deliver;
use crate::Core::cord::cord_name;
use crate::Core::error::{CbusError, Result};
use crate::Core::stailq::CmsgQueue;

pub const FIBER_POOL_SIZE: usize = 10240;
pub const FIBER_POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(3);

thread_local! {
    static FIBER_POOL: RefCell<Option<Rc<FiberPool>>> = const { RefCell::new(None) };
}

/// A pool of worker fibers, so that each message is handled in a fiber of
/// its own and a handler waiting on something does not hold up the queue.
///
/// The pool belongs to one cord and is shared by every pipe that cord
/// consumes. Fibers are spawned on demand up to `max_size` and leave the
/// pool after `idle_timeout` without work.
pub struct FiberPool {
    /// Messages fetched from the bus, waiting for a fiber.
    pub(crate) output: RefCell<CmsgQueue>,
    /// Parked fibers, most recently parked last.
    idle: RefCell<Vec<Rc<Notify>>>,
    size: Cell<usize>,
    max_size: usize,
    idle_timeout: Duration,
    /// Fibers that will look at the ready queue again without a wake-up:
    /// spawned or woken, not parked, and not suspended inside a handler.
    runnable: Cell<usize>,
    #[cfg(test)]
    pub(crate) fail_spawn: Cell<usize>,
}

impl FiberPool {
    /// Create a pool. No fiber is started until there is work.
    pub fn create(max_size: usize, idle_timeout: Duration) -> Rc<Self> {
        assert!(max_size > 0, "fiber pool max_size must be positive");
        Rc::new(Self {
            output: RefCell::new(CmsgQueue::new()),
            idle: RefCell::new(Vec::new()),
            size: Cell::new(0),
            max_size,
            idle_timeout,
            runnable: Cell::new(0),
            #[cfg(test)]
            fail_spawn: Cell::new(0),
        })
    }

    /// The calling cord's pool, created with default settings on first use.
    pub fn current() -> Rc<Self> {
        FIBER_POOL.with(|pool| {
            pool.borrow_mut()
                .get_or_insert_with(|| FiberPoolBuilder::default().build())
                .clone()
        })
    }

    /// Make `pool` the calling cord's pool for pipes created from now on.
    pub(crate) fn install(pool: Rc<Self>) {
        FIBER_POOL.with(|current| *current.borrow_mut() = Some(pool));
    }

    /// Get fibers working on the ready queue.
    ///
    /// Wakes the most recently parked fiber or, below the size cap, starts a
    /// new one. Does nothing while a runnable fiber will get to the queue
    /// anyway, or when the pool is full: the queued messages wait for a
    /// fiber to come free.
    pub fn resume(self: &Rc<Self>) {
        if self.output.borrow().is_empty() || self.runnable.get() > 0 {
            return;
        }
        let parked = self.idle.borrow_mut().pop();
        if let Some(wakeup) = parked {
            self.runnable.set(self.runnable.get() + 1);
            wakeup.notify_one();
        } else if self.size.get() < self.max_size {
            match self.spawn_fiber() {
                Ok(()) => {
                    self.size.set(self.size.get() + 1);
                    self.runnable.set(self.runnable.get() + 1);
                }
                Err(err) => {
                    // Back off: the messages stay queued for the next resume.
                    error!(cord = %cord_name(), %err, "fiber pool cannot grow");
                }
            }
        }
    }

    fn spawn_fiber(self: &Rc<Self>) -> Result<()> {
        #[cfg(test)]
        if self.fail_spawn.get() > 0 {
            self.fail_spawn.set(self.fail_spawn.get() - 1);
            return Err(CbusError::FiberSpawn("injected failure".into()));
        }
        tokio::runtime::Handle::try_current()
            .map_err(|err| CbusError::FiberSpawn(err.to_string()))?;
        tokio::task::spawn_local(fiber_pool_f(Rc::clone(self)));
        Ok(())
    }

    fn pop_output(&self) -> Option<Box<Cmsg>> {
        self.output.borrow_mut().pop_front()
    }

    /// Run one message to the end of its current hop. If the handler
    /// suspends, this fiber stops counting as runnable and the rest of the
    /// queue is handed to another fiber.
    async fn deliver(self: &Rc<Self>, msg: Box<Cmsg>) {
        let mut delivery = std::pin::pin!(deliver(msg));
        if futures::poll!(delivery.as_mut()).is_pending() {
            self.runnable.set(self.runnable.get() - 1);
            self.resume();
            delivery.await;
            self.runnable.set(self.runnable.get() + 1);
        }
    }

    /// Remove a parked fiber from the idle list; false if it was already
    /// taken by `resume`.
    fn forget_idle(&self, wakeup: &Rc<Notify>) -> bool {
        let mut idle = self.idle.borrow_mut();
        match idle.iter().position(|parked| Rc::ptr_eq(parked, wakeup)) {
            Some(pos) => {
                idle.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn size(&self) -> usize {
        self.size.get()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    pub fn idle_count(&self) -> usize {
        self.idle.borrow().len()
    }

    /// Messages waiting for a fiber.
    pub fn ready_len(&self) -> usize {
        self.output.borrow().len()
    }
}

/// Body of every pool fiber: drain the ready queue, yielding once per
/// round, then park; leave the pool if no work shows up within the idle
/// timeout.
async fn fiber_pool_f(pool: Rc<FiberPool>) {
    loop {
        let mut was_empty = false;
        while !was_empty {
            was_empty = pool.output.borrow().is_empty();
            while let Some(msg) = pool.pop_output() {
                pool.deliver(msg).await;
            }
            tokio::task::yield_now().await;
        }
        // Messages fetched during the last yield found this fiber runnable,
        // so nobody else was resumed for them.
        if !pool.output.borrow().is_empty() {
            continue;
        }

        let wakeup = Rc::new(Notify::new());
        pool.idle.borrow_mut().push(Rc::clone(&wakeup));
        pool.runnable.set(pool.runnable.get() - 1);
        let timed_out = tokio::time::timeout(pool.idle_timeout, wakeup.notified())
            .await
            .is_err();
        // A fiber already taken off the idle list was counted runnable again.
        if timed_out && pool.forget_idle(&wakeup) {
            break;
        }
    }
    pool.size.set(pool.size.get() - 1);
    debug!(cord = %cord_name(), size = pool.size.get(), "pool fiber left");
}
