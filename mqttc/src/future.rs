use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;

use mqttc_codec::{ConnectAck, SubscribeReturnCode};

use crate::{ClientError, Result};

pub type ConnectFuture = AckFuture<ConnectAck>;
pub type PublishFuture = AckFuture<()>;
pub type SubscribeFuture = AckFuture<Vec<SubscribeReturnCode>>;
pub type UnsubscribeFuture = AckFuture<()>;

/// One-shot result of an asynchronous client operation.
///
/// Clones share the same slot, so any number of tasks may wait on it. The first
/// [`complete`](AckFuture::complete) wins; later calls are rejected.
pub struct AckFuture<T> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    result: Mutex<Option<Result<T>>>,
    notify: Notify,
}

impl<T> Clone for AckFuture<T> {
    fn clone(&self) -> Self {
        AckFuture { inner: self.inner.clone() }
    }
}

impl<T> Default for AckFuture<T> {
    fn default() -> Self {
        AckFuture { inner: Arc::new(Inner { result: Mutex::new(None), notify: Notify::new() }) }
    }
}

impl<T> std::fmt::Debug for AckFuture<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AckFuture").field("done", &self.is_done()).finish()
    }
}

impl<T> AckFuture<T> {
    #[inline]
    pub fn is_done(&self) -> bool {
        self.inner.result.lock().is_some()
    }
}

impl<T: Clone> AckFuture<T> {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// A future that is already done.
    #[inline]
    pub fn ready(res: Result<T>) -> Self {
        let f = Self::new();
        *f.inner.result.lock() = Some(res);
        f
    }

    /// Store the result and release every waiter.
    ///
    /// Returns [`ClientError::AlreadyCompleted`] if a result is already stored; the
    /// stored result is left untouched.
    pub fn complete(&self, res: Result<T>) -> Result<()> {
        {
            let mut slot = self.inner.result.lock();
            if slot.is_some() {
                return Err(ClientError::AlreadyCompleted);
            }
            *slot = Some(res);
        }
        self.inner.notify.notify_waiters();
        Ok(())
    }

    /// The stored result, without waiting.
    #[inline]
    pub fn result(&self) -> Option<Result<T>> {
        self.inner.result.lock().clone()
    }

    /// Wait for the result. A zero `timeout` waits forever.
    pub async fn wait(&self, timeout: Duration) -> Result<T> {
        if timeout.is_zero() {
            self.wait_done().await
        } else {
            match tokio::time::timeout(timeout, self.wait_done()).await {
                Ok(res) => res,
                Err(_) => Err(ClientError::Timeout),
            }
        }
    }

    async fn wait_done(&self) -> Result<T> {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            // register before checking, so a completion in between is not missed
            notified.as_mut().enable();
            if let Some(res) = self.result() {
                return res;
            }
            notified.await;
        }
    }
}
