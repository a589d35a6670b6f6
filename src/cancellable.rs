use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use futures_channel::oneshot;
use futures_util::future::{FutureExt, Shared};

/// A cooperative cancellation token.
///
/// Attach it to a portal request through the `cancellable` method of the
/// request builders. Cancelling it before the portal answered closes the
/// request on the portal side and resolves the call with a cancellation
/// error right away. Cancelling after the request completed does nothing.
///
/// Clones share the same state.
#[derive(Clone)]
pub struct Cancellable(Arc<Inner>);

struct Inner {
    cancelled: AtomicBool,
    sender: Mutex<Option<oneshot::Sender<()>>>,
    receiver: Shared<oneshot::Receiver<()>>,
}

impl Cancellable {
    /// Create a new, not yet cancelled, token.
    pub fn new() -> Self {
        let (sender, receiver) = oneshot::channel();
        Self(Arc::new(Inner {
            cancelled: AtomicBool::new(false),
            sender: Mutex::new(Some(sender)),
            receiver: receiver.shared(),
        }))
    }

    /// Cancel every request the token is attached to.
    pub fn cancel(&self) {
        if self.0.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        #[cfg(feature = "tracing")]
        tracing::debug!("Cancellation requested");
        let sender = match self.0.sender.lock() {
            Ok(mut sender) => sender.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(sender) = sender {
            let _ = sender.send(());
        }
    }

    /// Whether [`Cancellable::cancel`] was called.
    pub fn is_cancelled(&self) -> bool {
        self.0.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once the token is cancelled.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        if self.0.receiver.clone().await.is_err() {
            // The sender is only dropped along the token, never resolve.
            std::future::pending::<()>().await;
        }
    }
}

impl Default for Cancellable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Cancellable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cancellable")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
