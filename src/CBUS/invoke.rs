// Synchronous calls across the bus: run a function in the peer cord and
// suspend the calling fiber until the result comes back.

use std::time::Duration;

use tokio::sync::oneshot;

use super::bus::Cbus;
use super::Msg::Cmsg::{Cmsg, CmsgHop, Route};
use crate::Core::error::{CbusError, Result};

struct Invoke<R> {
    call: Option<Box<dyn FnOnce() -> R + Send>>,
    result: Option<R>,
    waiter: Option<oneshot::Sender<R>>,
}

/// First hop, in the peer cord.
fn invoke_call<R: Send + 'static>(msg: &mut Cmsg) {
    if let Some(invoke) = msg.payload_mut::<Invoke<R>>() {
        if let Some(call) = invoke.call.take() {
            invoke.result = Some(call());
        }
    }
}

/// Last hop, back in the calling cord: wake the caller.
fn invoke_notify<R: Send + 'static>(msg: &mut Cmsg) {
    if let Some(invoke) = msg.payload_mut::<Invoke<R>>() {
        if let (Some(waiter), Some(result)) = (invoke.waiter.take(), invoke.result.take()) {
            // The caller may have given up waiting.
            let _ = waiter.send(result);
        }
    }
}

impl Cbus {
    fn start_invoke<F, R>(&self, f: F) -> oneshot::Receiver<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let output = self.output();
        let route = Route::new(vec![
            CmsgHop::new(invoke_call::<R>, Some(output.peer())),
            CmsgHop::new(invoke_notify::<R>, None),
        ]);
        let (waiter, result) = oneshot::channel();
        output.push(Cmsg::new(
            &route,
            Invoke {
                call: Some(Box::new(f)),
                result: None,
                waiter: Some(waiter),
            },
        ));
        result
    }

    /// Run `f` in the peer cord and return its result. Suspends the calling
    /// fiber, not the thread. Must be called from a cord that joined the bus.
    ///
    /// Fails with [`CbusError::Disconnected`] if the message is dropped on
    /// the way, e.g. because the peer cord has exited.
    pub async fn invoke<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        self.start_invoke(f)
            .await
            .map_err(|_| CbusError::Disconnected)
    }

    /// Like [`invoke`](Self::invoke), giving up after `timeout`. The call is
    /// not retracted: `f` still runs in the peer and its result is dropped.
    pub async fn invoke_timeout<F, R>(&self, f: F, timeout: Duration) -> Result<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        match tokio::time::timeout(timeout, self.start_invoke(f)).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(_)) => Err(CbusError::Disconnected),
            Err(_) => Err(CbusError::TimedOut),
        }
    }
}
