//! The message bus as seen by the request and session engines.
//!
//! The engines never talk to a [`zbus::Connection`] directly; they go
//! through the [`Bus`] trait which only knows how to call a method, send a
//! message without waiting for a reply and subscribe to a signal. The
//! session bus connection implements it, and so can any other transport.
use std::{
    any::Any,
    collections::VecDeque,
    fmt,
    future::ready,
    pin::Pin,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
    task::{Context, Poll, Waker},
};

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use zbus::{
    message::Type as MessageType,
    zvariant::{ObjectPath, OwnedObjectPath},
    MatchRule, Message, MessageStream,
};

#[cfg(test)]
pub(crate) mod mock;

/// Describes which signals a [`Subscription`] receives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignalFilter {
    sender: &'static str,
    interface: &'static str,
    member: &'static str,
    path: Option<OwnedObjectPath>,
}

impl SignalFilter {
    /// A filter for the signal `member` of `interface` emitted by `sender`.
    ///
    /// Signals emitted on every object path are received until
    /// [`SignalFilter::path`] narrows it down.
    pub fn new(sender: &'static str, interface: &'static str, member: &'static str) -> Self {
        Self {
            sender,
            interface,
            member,
            path: None,
        }
    }

    /// Only receive the signal when emitted on `path`.
    #[must_use]
    pub fn path(mut self, path: impl Into<OwnedObjectPath>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// The bus name of the emitter.
    pub fn sender(&self) -> &'static str {
        self.sender
    }

    /// The interface the signal belongs to.
    pub fn interface(&self) -> &'static str {
        self.interface
    }

    /// The signal name.
    pub fn member(&self) -> &'static str {
        self.member
    }

    /// The object path the signal is restricted to, if any.
    pub fn object_path(&self) -> Option<&ObjectPath<'static>> {
        self.path.as_deref()
    }

    /// Whether `message` is a signal this filter lets through.
    ///
    /// The sender is not compared, a well-known name only resolves on the
    /// bus itself.
    pub fn matches(&self, message: &Message) -> bool {
        let header = message.header();
        message.message_type() == MessageType::Signal
            && header.interface().map(|i| i.as_str()) == Some(self.interface)
            && header.member().map(|m| m.as_str()) == Some(self.member)
            && self
                .path
                .as_ref()
                .map_or(true, |path| header.path().map(|p| p.as_str()) == Some(path.as_str()))
    }

    fn match_rule(&self) -> zbus::Result<MatchRule<'static>> {
        let builder = MatchRule::builder()
            .msg_type(MessageType::Signal)
            .sender(self.sender)?
            .interface(self.interface)?
            .member(self.member)?;
        let builder = match &self.path {
            Some(path) => builder.path(path.clone().into_inner())?,
            None => builder,
        };
        Ok(builder.build())
    }
}

impl fmt::Display for SignalFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.interface, self.member)?;
        if let Some(path) = &self.path {
            write!(f, " on {}", path.as_str())?;
        }
        Ok(())
    }
}

/// How many signals a [`Subscription`] holds while nobody reads it.
///
/// Once full, the oldest queued signal is dropped to make room.
pub const MAX_QUEUED: usize = 64;

#[derive(Default)]
struct Queue {
    messages: VecDeque<Message>,
    waker: Option<Waker>,
    closed: bool,
}

fn lock(queue: &Mutex<Queue>) -> MutexGuard<'_, Queue> {
    queue.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The feeding end of a [`Subscription`].
///
/// Pushing never blocks: a subscription nobody reads keeps only the
/// [`MAX_QUEUED`] most recent signals.
pub struct SignalSender {
    queue: Weak<Mutex<Queue>>,
}

impl SignalSender {
    /// Queue `message`, dropping the oldest one if the queue is full.
    ///
    /// Returns `false` once the subscription is gone.
    pub fn push(&self, message: Message) -> bool {
        let Some(queue) = self.queue.upgrade() else {
            return false;
        };
        let mut queue = lock(&queue);
        if queue.messages.len() >= MAX_QUEUED {
            queue.messages.pop_front();
            #[cfg(feature = "tracing")]
            tracing::warn!("Signal queue full, dropping the oldest signal");
        }
        queue.messages.push_back(message);
        if let Some(waker) = queue.waker.take() {
            waker.wake();
        }
        true
    }

    /// Whether the subscription was dropped.
    pub fn is_closed(&self) -> bool {
        self.queue.strong_count() == 0
    }
}

impl Drop for SignalSender {
    fn drop(&mut self) {
        if let Some(queue) = self.queue.upgrade() {
            let mut queue = lock(&queue);
            queue.closed = true;
            if let Some(waker) = queue.waker.take() {
                waker.wake();
            }
        }
    }
}

impl fmt::Debug for SignalSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalSender")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// A live signal subscription.
///
/// Yields every matching signal received after it was created, up to
/// [`MAX_QUEUED`] unread ones. Dropping it removes the subscription from the
/// bus.
#[must_use = "dropping a subscription unsubscribes"]
pub struct Subscription {
    filter: SignalFilter,
    queue: Arc<Mutex<Queue>>,
    guard: Option<Box<dyn Any + Send>>,
}

impl Subscription {
    /// An empty subscription for signals matching `filter`, along with the
    /// sender feeding it.
    pub fn channel(filter: SignalFilter) -> (Self, SignalSender) {
        let queue = Arc::new(Mutex::new(Queue::default()));
        let sender = SignalSender {
            queue: Arc::downgrade(&queue),
        };
        let subscription = Self {
            filter,
            queue,
            guard: None,
        };
        (subscription, sender)
    }

    /// Keep `guard` alive as long as the subscription, e.g. the task feeding
    /// it.
    pub fn with_guard(mut self, guard: impl Any + Send) -> Self {
        self.guard = Some(Box::new(guard));
        self
    }

    /// The filter the subscription was created with.
    pub fn filter(&self) -> &SignalFilter {
        &self.filter
    }
}

impl Stream for Subscription {
    type Item = Message;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut queue = lock(&self.queue);
        if let Some(message) = queue.messages.pop_front() {
            return Poll::Ready(Some(message));
        }
        if queue.closed {
            return Poll::Ready(None);
        }
        queue.waker = Some(cx.waker().clone());
        Poll::Pending
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        #[cfg(feature = "tracing")]
        tracing::debug!("Unsubscribing from {}", self.filter);
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Subscription").field(&self.filter).finish()
    }
}

/// The transport the portal engines run on.
#[async_trait]
pub trait Bus: Send + Sync + 'static {
    /// The unique name of the connection, e.g. `:1.42`.
    fn unique_name(&self) -> Option<String>;

    /// Send a method call and wait for its reply.
    ///
    /// An error reply is returned as an error.
    async fn call(&self, message: Message) -> zbus::Result<Message>;

    /// Send a message without waiting for anything back.
    async fn send(&self, message: Message) -> zbus::Result<()>;

    /// Start receiving the signals described by `filter`.
    ///
    /// The subscription is in place once the returned future resolves.
    async fn subscribe(&self, filter: SignalFilter) -> zbus::Result<Subscription>;
}

#[async_trait]
impl Bus for zbus::Connection {
    fn unique_name(&self) -> Option<String> {
        zbus::Connection::unique_name(self).map(|name| name.to_string())
    }

    async fn call(&self, message: Message) -> zbus::Result<Message> {
        let serial = message.primary_header().serial_num();
        // Listen before sending, the reply could otherwise slip through.
        let replies = MessageStream::from(self).filter_map(move |msg| {
            ready(
                msg.ok()
                    .filter(|msg| msg.header().reply_serial() == Some(serial)),
            )
        });
        futures_util::pin_mut!(replies);
        zbus::Connection::send(self, &message).await?;

        let reply = replies
            .next()
            .await
            .ok_or_else(|| zbus::Error::Failure("Connection closed before the reply".to_owned()))?;
        match reply.message_type() {
            MessageType::Error => Err(reply.into()),
            _ => Ok(reply),
        }
    }

    async fn send(&self, message: Message) -> zbus::Result<()> {
        zbus::Connection::send(self, &message).await
    }

    async fn subscribe(&self, filter: SignalFilter) -> zbus::Result<Subscription> {
        #[cfg(feature = "tracing")]
        tracing::info!("Listening to signal {filter}");
        let mut stream = MessageStream::for_match_rule(filter.match_rule()?, self, None).await?;
        let (subscription, sender) = Subscription::channel(filter);
        // zbus stops reading the socket once a match rule queue is full, so the
        // rule is drained into the subscription's own queue as signals arrive.
        let feeder = self.executor().spawn(
            async move {
                while let Some(msg) = stream.next().await {
                    match msg {
                        Ok(msg) => {
                            if !sender.push(msg) {
                                break;
                            }
                        }
                        Err(_err) => {
                            #[cfg(feature = "tracing")]
                            tracing::warn!("Dropping an undecodable signal: {_err}");
                        }
                    }
                }
            },
            "xdg-portal signal feeder",
        );
        Ok(subscription.with_guard(feeder))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_matches_path() {
        let filter = SignalFilter::new(
            "org.freedesktop.portal.Desktop",
            "org.freedesktop.portal.Request",
            "Response",
        )
        .path(ObjectPath::try_from("/org/freedesktop/portal/desktop/request/1_1/t").unwrap());

        let matching = Message::signal(
            "/org/freedesktop/portal/desktop/request/1_1/t",
            "org.freedesktop.portal.Request",
            "Response",
        )
        .unwrap()
        .build(&(0u32,))
        .unwrap();
        let elsewhere = Message::signal(
            "/org/freedesktop/portal/desktop/request/1_1/other",
            "org.freedesktop.portal.Request",
            "Response",
        )
        .unwrap()
        .build(&(0u32,))
        .unwrap();
        let other_member = Message::signal(
            "/org/freedesktop/portal/desktop/request/1_1/t",
            "org.freedesktop.portal.Request",
            "Closed",
        )
        .unwrap()
        .build(&())
        .unwrap();

        assert!(filter.matches(&matching));
        assert!(!filter.matches(&elsewhere));
        assert!(!filter.matches(&other_member));
        assert_eq!(
            filter.to_string(),
            "org.freedesktop.portal.Request.Response on /org/freedesktop/portal/desktop/request/1_1/t"
        );
    }

    #[test]
    fn filter_without_path() {
        let filter = SignalFilter::new(
            "org.freedesktop.portal.Desktop",
            "org.freedesktop.portal.Settings",
            "SettingChanged",
        );
        let message = Message::signal(
            "/org/freedesktop/portal/desktop",
            "org.freedesktop.portal.Settings",
            "SettingChanged",
        )
        .unwrap()
        .build(&("org.freedesktop.appearance", "color-scheme"))
        .unwrap();
        assert!(filter.matches(&message));
        assert!(filter.match_rule().is_ok());
    }

    fn settings_changed(key: &str) -> Message {
        Message::signal(
            "/org/freedesktop/portal/desktop",
            "org.freedesktop.portal.Settings",
            "SettingChanged",
        )
        .unwrap()
        .build(&("org.freedesktop.appearance", key))
        .unwrap()
    }

    #[test]
    fn unread_queue_keeps_latest_signals() {
        use futures_util::FutureExt;

        let filter = SignalFilter::new(
            "org.freedesktop.portal.Desktop",
            "org.freedesktop.portal.Settings",
            "SettingChanged",
        );
        let (mut subscription, sender) = Subscription::channel(filter);
        for i in 0..MAX_QUEUED + 10 {
            assert!(sender.push(settings_changed(&format!("key-{i}"))));
        }

        let mut keys = Vec::new();
        while let Some(Some(message)) = subscription.next().now_or_never() {
            let (_, key): (String, String) = message.body().deserialize().unwrap();
            keys.push(key);
        }
        assert_eq!(keys.len(), MAX_QUEUED);
        assert_eq!(keys[0], "key-10");
        assert_eq!(keys[MAX_QUEUED - 1], format!("key-{}", MAX_QUEUED + 9));
    }

    #[test]
    fn queue_ends_with_its_sender() {
        use futures_util::FutureExt;

        let filter = SignalFilter::new(
            "org.freedesktop.portal.Desktop",
            "org.freedesktop.portal.Settings",
            "SettingChanged",
        );
        let (mut subscription, sender) = Subscription::channel(filter.clone());
        assert!(subscription.next().now_or_never().is_none());
        sender.push(settings_changed("color-scheme"));
        drop(sender);
        assert!(subscription.next().now_or_never().unwrap().is_some());
        assert!(subscription.next().now_or_never().unwrap().is_none());

        let (subscription, sender) = Subscription::channel(filter);
        drop(subscription);
        assert!(sender.is_closed());
        assert!(!sender.push(settings_changed("color-scheme")));
    }
}
