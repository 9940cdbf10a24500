//! Buffered single-listener event channel
//!
//! An `EventChannel` buffers events pushed from any thread and replays them,
//! in push order, to at most one attached listener. Pushing never blocks.
//! Dropping the listener detaches it; undelivered events stay buffered for
//! the next listener. Closing the channel lets the listener drain what is
//! left and then observe end-of-stream.

use futures::Stream;
use parking_lot::Mutex;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Errors for channel attachment
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("Channel {0} already has a listener")]
    Busy(String),
}

/// Ordered buffer-and-stream primitive with one listener at a time
pub struct EventChannel<T> {
    name: String,
    /// `None` once closed
    tx: Mutex<Option<mpsc::UnboundedSender<T>>>,
    /// `None` while a listener holds the receiving end
    rx: Mutex<Option<mpsc::UnboundedReceiver<T>>>,
}

impl<T: Send + 'static> EventChannel<T> {
    /// Create a new open channel
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            name: name.into(),
            tx: Mutex::new(Some(tx)),
            rx: Mutex::new(Some(rx)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Buffer an event. Returns `false` if the channel is closed.
    pub fn push(&self, event: T) -> bool {
        let tx = self.tx.lock();
        match tx.as_ref() {
            Some(tx) if tx.send(event).is_ok() => {
                trace!("{}: event buffered", self.name);
                true
            }
            _ => {
                debug!("{}: discarding event on closed channel", self.name);
                false
            }
        }
    }

    /// Stop accepting events. Buffered events remain deliverable.
    pub fn close(&self) {
        if self.tx.lock().take().is_some() {
            debug!("{}: closed", self.name);
        }
    }

    #[cfg(test)]
    pub fn is_closed(&self) -> bool {
        self.tx.lock().is_none()
    }

    /// Whether a listener currently holds the channel
    pub fn is_attached(&self) -> bool {
        self.rx.lock().is_none()
    }

    /// Attach the single listener
    pub fn attach(self: &Arc<Self>) -> Result<EventListener<T>, ChannelError> {
        let rx = self
            .rx
            .lock()
            .take()
            .ok_or_else(|| ChannelError::Busy(self.name.clone()))?;
        debug!("{}: listener attached", self.name);
        Ok(EventListener {
            channel: Arc::clone(self),
            rx: Some(rx),
        })
    }
}

/// The attached end of an [`EventChannel`]
pub struct EventListener<T> {
    channel: Arc<EventChannel<T>>,
    rx: Option<mpsc::UnboundedReceiver<T>>,
}

impl<T> EventListener<T> {
    /// Next event, or `None` once the channel is closed and drained
    pub async fn recv(&mut self) -> Option<T> {
        match self.rx.as_mut() {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }

    /// Non-waiting variant of [`recv`](Self::recv)
    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.as_mut().and_then(|rx| rx.try_recv().ok())
    }

    pub fn channel_name(&self) -> &str {
        &self.channel.name
    }
}

impl<T> Stream for EventListener<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        match self.get_mut().rx.as_mut() {
            Some(rx) => rx.poll_recv(cx),
            None => Poll::Ready(None),
        }
    }
}

impl<T> Drop for EventListener<T> {
    fn drop(&mut self) {
        if let Some(rx) = self.rx.take() {
            *self.channel.rx.lock() = Some(rx);
            debug!("{}: listener detached", self.channel.name);
        }
    }
}
