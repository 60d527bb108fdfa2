//! Cooperative shutdown signal for the worker loop.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Shutdown handle.
/// - `trigger()` で停止を要求する（全 listener に届く）
/// - handle を drop しても停止扱いになる
#[derive(Debug)]
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

/// Receiving side, cloned into each loop.
#[derive(Debug, Clone)]
pub struct ShutdownListener {
    rx: watch::Receiver<bool>,
    /// `never()` 用。sender が生きている限り drop による停止は起きない
    _keepalive: Option<Arc<watch::Sender<bool>>>,
}

impl Shutdown {
    pub fn new() -> (Self, ShutdownListener) {
        let (tx, rx) = watch::channel(false);
        let listener = ShutdownListener {
            rx,
            _keepalive: None,
        };
        (Self { tx }, listener)
    }

    pub fn trigger(&self) {
        // receiver が 0 でも値を残す（send だと捨てられる）
        self.tx.send_replace(true);
    }

    pub fn listener(&self) -> ShutdownListener {
        ShutdownListener {
            rx: self.tx.subscribe(),
            _keepalive: None,
        }
    }
}

impl ShutdownListener {
    /// Listener that never fires.
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            rx,
            _keepalive: Some(Arc::new(tx)),
        }
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Resolves once shutdown is requested or the handle is dropped.
    pub async fn triggered(&mut self) {
        // wait_for は sender が drop されると Err を返す。どちらも停止扱い
        let _ = self.rx.wait_for(|stop| *stop).await;
    }

    /// Sleeps for `delay`; returns `false` if shutdown interrupted the sleep.
    pub async fn sleep(&mut self, delay: Duration) -> bool {
        if delay.is_zero() {
            return !self.is_triggered();
        }
        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = self.triggered() => false,
        }
    }
}
