use std::{
    collections::{HashMap, HashSet},
    fmt::{self, Debug},
    sync::{Arc, Mutex, MutexGuard},
};

use futures_channel::oneshot;
use futures_util::{
    future::{select, Either, FutureExt},
    lock::Mutex as AsyncMutex,
    stream, Stream, StreamExt,
};
use serde::{Deserialize, Serialize, Serializer};
use zbus::zvariant::{ObjectPath, OwnedObjectPath, Signature, Type};

use crate::{
    bus::{SignalFilter, Subscription},
    desktop::{request::close_object, HandleToken},
    proxy::{Proxy, DESKTOP_DESTINATION, DESKTOP_PATH},
    Cancellable, Error, Portal,
};

pub(crate) const INTERFACE: &str = "org.freedesktop.portal.Session";

/// The portal a [`Session`] was created by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum SessionType {
    /// [`Screencast`](crate::desktop::screencast::Screencast)
    ScreenCast,
    /// [`RemoteDesktop`](crate::desktop::remote_desktop::RemoteDesktop)
    RemoteDesktop,
    /// [`InputCapture`](crate::desktop::input_capture::InputCapture)
    InputCapture,
    /// [`GlobalShortcuts`](crate::desktop::global_shortcuts::GlobalShortcuts)
    GlobalShortcuts,
    /// [`LocationProxy`](crate::desktop::location::LocationProxy)
    Location,
    /// [`InhibitProxy::create_monitor`](crate::desktop::inhibit::InhibitProxy::create_monitor)
    InhibitMonitor,
}

impl SessionType {
    /// The signals carrying a session handle, received as soon as the
    /// session exists.
    pub(crate) fn feature_signals(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::ScreenCast | Self::RemoteDesktop => &[],
            Self::InputCapture => &[
                ("org.freedesktop.portal.InputCapture", "ZonesChanged"),
                ("org.freedesktop.portal.InputCapture", "Activated"),
                ("org.freedesktop.portal.InputCapture", "Deactivated"),
                ("org.freedesktop.portal.InputCapture", "Disabled"),
            ],
            Self::GlobalShortcuts => &[
                ("org.freedesktop.portal.GlobalShortcuts", "Activated"),
                ("org.freedesktop.portal.GlobalShortcuts", "Deactivated"),
                ("org.freedesktop.portal.GlobalShortcuts", "ShortcutsChanged"),
            ],
            Self::Location => &[("org.freedesktop.portal.Location", "LocationUpdated")],
            Self::InhibitMonitor => &[("org.freedesktop.portal.Inhibit", "StateChanged")],
        }
    }

    /// Sessions without a start step are active once created.
    fn has_start(self) -> bool {
        !matches!(self, Self::InputCapture | Self::InhibitMonitor)
    }
}

/// The lifecycle of a [`Session`].
///
/// States only move forward: `Initial` to `Active` to `Closed`, or straight
/// from `Initial` to `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Created, not started yet.
    Initial,
    /// Started successfully.
    Active,
    /// Closed by the application or by the portal. Terminal.
    Closed,
}

/// A signal of a portal interface carrying the handle of the session it is
/// about as first argument.
pub(crate) trait SessionSignal:
    for<'de> Deserialize<'de> + Type + Debug + Send + 'static
{
    const INTERFACE: &'static str;
    const MEMBER: &'static str;

    fn session_handle(&self) -> ObjectPath<'_>;
}

type SignalKey = (&'static str, &'static str);

#[derive(Default)]
struct FeatureSignals {
    installed: HashSet<SignalKey>,
    pending: HashMap<SignalKey, Subscription>,
}

/// Shared by all portal interfaces that involve long lived sessions.
///
/// When a method that creates a session is called, if successful, the reply
/// will include a session handle (i.e. object path) for a Session object, which
/// will stay alive for the duration of the session.
///
/// The duration of the session is defined by the interface that creates it.
/// For convenience, the interface contains a method [`Session::close`],
/// and a signal [`Session::receive_closed`]. Whether it is allowed to
/// directly call [`Session::close`] depends on the interface.
///
/// Cloning is cheap, clones refer to the same session.
///
/// Wrapper of the DBus interface: [`org.freedesktop.portal.Session`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.Session.html).
#[doc(alias = "org.freedesktop.portal.Session")]
#[derive(Clone)]
pub struct Session(Arc<SessionInner>);

struct SessionInner {
    portal: Portal,
    path: OwnedObjectPath,
    kind: SessionType,
    state: Mutex<SessionState>,
    closed: AsyncMutex<Option<Subscription>>,
    features: Mutex<FeatureSignals>,
    observers: Mutex<Vec<oneshot::Sender<()>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Whether a failed start request leaves the session unusable: the portal
/// answered with a failure, or with results that don't decode.
fn ends_session(err: &Error) -> bool {
    matches!(
        err,
        Error::Response(_) | Error::Zbus(zbus::Error::Variant(_))
    )
}

/// Subscribe to the `Closed` signal of the session object at `path`.
pub(crate) async fn subscribe_closed(
    portal: &Portal,
    path: &OwnedObjectPath,
) -> Result<Subscription, Error> {
    let filter = SignalFilter::new(DESKTOP_DESTINATION, INTERFACE, "Closed").path(path.clone());
    portal.bus().subscribe(filter).await.map_err(From::from)
}

fn feature_filter((interface, member): SignalKey) -> SignalFilter {
    SignalFilter::new(DESKTOP_DESTINATION, interface, member)
        .path(ObjectPath::from_static_str_unchecked(DESKTOP_PATH))
}

impl Session {
    fn new(portal: Portal, path: OwnedObjectPath, kind: SessionType, closed: Subscription) -> Self {
        #[cfg(feature = "tracing")]
        tracing::info!("Creating a {INTERFACE} {} for {kind:?}", path.as_str());
        Self(Arc::new(SessionInner {
            portal,
            path,
            kind,
            state: Mutex::new(SessionState::Initial),
            closed: AsyncMutex::new(Some(closed)),
            features: Mutex::default(),
            observers: Mutex::default(),
        }))
    }

    /// The session object path.
    pub fn path(&self) -> ObjectPath<'_> {
        self.0.path.as_ref()
    }

    /// The portal the session belongs to.
    pub fn kind(&self) -> SessionType {
        self.0.kind
    }

    /// The current state of the session.
    ///
    /// A `Closed` signal already received from the portal is taken into
    /// account.
    pub fn state(&self) -> SessionState {
        if self.current_state() != SessionState::Closed {
            let received = match self.0.closed.try_lock() {
                Some(mut closed) => match closed.as_mut() {
                    Some(subscription) => subscription.next().now_or_never().is_some(),
                    None => false,
                },
                None => false,
            };
            if received {
                #[cfg(feature = "tracing")]
                tracing::info!("Received signal 'Closed' on '{}'", self.0.path.as_str());
                self.mark_closed();
            }
        }
        self.current_state()
    }

    fn current_state(&self) -> SessionState {
        *lock(&self.0.state)
    }

    /// Move forward to `state`, returns whether the state changed.
    fn set_state(&self, state: SessionState) -> bool {
        let mut current = lock(&self.0.state);
        let allowed = matches!(
            (*current, state),
            (SessionState::Initial, SessionState::Active)
                | (SessionState::Initial, SessionState::Closed)
                | (SessionState::Active, SessionState::Closed)
        );
        if allowed {
            #[cfg(feature = "tracing")]
            tracing::debug!(
                "Session {} moved from {:?} to {state:?}",
                self.0.path.as_str(),
                *current
            );
            *current = state;
        }
        allowed
    }

    fn mark_closed(&self) {
        if !self.set_state(SessionState::Closed) {
            return;
        }
        lock(&self.0.features).pending.clear();
        if let Some(mut closed) = self.0.closed.try_lock() {
            closed.take();
        }
        for observer in lock(&self.0.observers).drain(..) {
            let _ = observer.send(());
        }
    }

    /// A receiver resolving once the session gets closed, `None` when it
    /// already is.
    fn observe(&self) -> Option<oneshot::Receiver<()>> {
        let mut observers = lock(&self.0.observers);
        if self.current_state() == SessionState::Closed {
            return None;
        }
        let (sender, receiver) = oneshot::channel();
        observers.retain(|observer| !observer.is_canceled());
        observers.push(sender);
        Some(receiver)
    }

    async fn wait_closed_signal(&self) {
        let mut closed = self.0.closed.lock().await;
        match closed.as_mut() {
            Some(subscription) => {
                let _ = subscription.next().await;
                closed.take();
                drop(closed);
                #[cfg(feature = "tracing")]
                tracing::info!("Received signal 'Closed' on '{}'", self.0.path.as_str());
                self.mark_closed();
            }
            None => std::future::pending().await,
        }
    }

    /// Resolves once the session is closed, either through
    /// [`Session::close`] or by the portal.
    ///
    /// # Specifications
    ///
    /// See also [`Closed`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.Session.html#org-freedesktop-portal-session-closed).
    #[doc(alias = "Closed")]
    pub async fn receive_closed(&self) -> Result<(), Error> {
        let Some(notified) = self.observe() else {
            return Ok(());
        };
        let signal = Box::pin(self.wait_closed_signal());
        select(notified, signal).await;
        if self.current_state() == SessionState::Closed {
            if let Some(mut closed) = self.0.closed.try_lock() {
                closed.take();
            }
        }
        Ok(())
    }

    /// Closes the portal session to which this object refers and ends all
    /// related user interaction (dialogs, etc).
    ///
    /// The session is closed locally right away, without waiting for the
    /// portal. Closing an already closed session does nothing.
    ///
    /// # Specifications
    ///
    /// See also [`Close`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.Session.html#org-freedesktop-portal-session-close).
    #[doc(alias = "Close")]
    pub async fn close(&self) -> Result<(), Error> {
        if self.state() == SessionState::Closed {
            return Ok(());
        }
        close_object(&self.0.portal, INTERFACE, &self.0.path).await;
        self.mark_closed();
        Ok(())
    }

    /// Run the request starting the session.
    ///
    /// Success activates the session, a cancelled or failed request closes
    /// it. Any other error leaves it untouched.
    pub(crate) async fn start<T>(
        &self,
        proxy: &Proxy,
        handle_token: &HandleToken,
        method_name: &'static str,
        body: impl Serialize + Type + Debug,
        cancellable: Option<&Cancellable>,
    ) -> Result<T, Error>
    where
        T: for<'de> Deserialize<'de> + Type + Debug,
    {
        self.start_with(proxy, handle_token, method_name, body, cancellable, Ok)
            .await
    }

    /// Like [`Session::start`], `decode` turns the results into what the
    /// caller gets back. A results dict that can't be decoded closes the
    /// session, it is never left active behind an error.
    pub(crate) async fn start_with<T, R, D>(
        &self,
        proxy: &Proxy,
        handle_token: &HandleToken,
        method_name: &'static str,
        body: impl Serialize + Type + Debug,
        cancellable: Option<&Cancellable>,
        decode: D,
    ) -> Result<R, Error>
    where
        T: for<'de> Deserialize<'de> + Type + Debug,
        D: FnOnce(T) -> Result<R, Error>,
    {
        match self.state() {
            SessionState::Closed => return Err(Error::SessionClosed),
            SessionState::Active => return Err(Error::InvalidSessionState),
            SessionState::Initial => (),
        }
        let response = match proxy
            .request::<T>(handle_token, method_name, body, cancellable)
            .await
        {
            Ok(response) => response,
            Err(err) if ends_session(&err) => {
                self.close().await?;
                return Err(err);
            }
            Err(err) => return Err(err),
        };
        let started = match decode(response) {
            Ok(started) => started,
            Err(err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    "Closing {}, the {method_name} results are unusable: {err}",
                    self.0.path.as_str()
                );
                self.close().await?;
                return Err(err);
            }
        };
        if !self.set_state(SessionState::Active) {
            return Err(Error::SessionClosed);
        }
        self.install_signals(self.0.kind.feature_signals()).await?;
        Ok(started)
    }

    /// Run one configuration request against a session not started yet,
    /// any failure closes the session.
    pub(crate) async fn configure<T>(
        &self,
        proxy: &Proxy,
        handle_token: &HandleToken,
        method_name: &'static str,
        body: impl Serialize + Type + Debug,
        cancellable: Option<&Cancellable>,
    ) -> Result<T, Error>
    where
        T: for<'de> Deserialize<'de> + Type + Debug,
    {
        match self.state() {
            SessionState::Closed => return Err(Error::SessionClosed),
            SessionState::Active => return Err(Error::InvalidSessionState),
            SessionState::Initial => (),
        }
        match proxy
            .request::<T>(handle_token, method_name, body, cancellable)
            .await
        {
            Ok(response) => Ok(response),
            Err(err) => {
                self.close().await?;
                Err(err)
            }
        }
    }

    /// Subscribe to `signals` unless already done, the signals received from
    /// now on are handed to the first [`Session::receive_signal`] call.
    pub(crate) async fn install_signals(&self, signals: &[SignalKey]) -> Result<(), Error> {
        for key in signals {
            if lock(&self.0.features).installed.contains(key) {
                continue;
            }
            let subscription = self.0.portal.bus().subscribe(feature_filter(*key)).await?;
            let mut features = lock(&self.0.features);
            features.installed.insert(*key);
            if self.current_state() != SessionState::Closed {
                features.pending.insert(*key, subscription);
            }
        }
        Ok(())
    }

    /// Receive the `S` signals addressed to this session.
    ///
    /// Signals about other sessions are skipped. The stream ends once the
    /// session is closed.
    pub(crate) async fn receive_signal<S>(
        &self,
    ) -> Result<impl Stream<Item = S> + Send + Unpin + 'static, Error>
    where
        S: SessionSignal,
    {
        self.ensure_open()?;
        let key = (S::INTERFACE, S::MEMBER);
        let pending = lock(&self.0.features).pending.remove(&key);
        let subscription = match pending {
            Some(subscription) => subscription,
            None => self.0.portal.bus().subscribe(feature_filter(key)).await?,
        };

        Ok(Box::pin(stream::unfold(
            (self.clone(), subscription),
            |(session, mut subscription)| async move {
                loop {
                    let closed = Box::pin(session.receive_closed());
                    let message = match select(subscription.next(), closed).await {
                        Either::Left((Some(message), _)) => message,
                        _ => return None,
                    };
                    match message.body().deserialize::<S>() {
                        Ok(signal) if signal.session_handle() == session.path() => {
                            #[cfg(feature = "tracing")]
                            tracing::debug!("Received {} {signal:#?}", S::MEMBER);
                            return Some((signal, (session, subscription)));
                        }
                        Ok(_signal) => {
                            #[cfg(feature = "tracing")]
                            tracing::debug!(
                                "Skipping {} for {}",
                                S::MEMBER,
                                _signal.session_handle().as_str()
                            );
                        }
                        Err(_err) => {
                            #[cfg(feature = "tracing")]
                            tracing::warn!("Error obtaining body of {}: {_err:#?}", S::MEMBER);
                        }
                    }
                }
            },
        )))
    }

    /// Fails unless the session was started and is not closed.
    pub(crate) fn ensure_active(&self) -> Result<(), Error> {
        match self.state() {
            SessionState::Active => Ok(()),
            SessionState::Closed => Err(Error::SessionClosed),
            SessionState::Initial => Err(Error::InvalidSessionState),
        }
    }

    /// Fails if the session is closed.
    pub(crate) fn ensure_open(&self) -> Result<(), Error> {
        match self.state() {
            SessionState::Closed => Err(Error::SessionClosed),
            _ => Ok(()),
        }
    }

    /// Fails unless the session was created by one of `kinds`.
    pub(crate) fn ensure_kind(&self, kinds: &[SessionType]) -> Result<(), Error> {
        if kinds.contains(&self.0.kind) {
            Ok(())
        } else {
            Err(Error::InvalidSessionState)
        }
    }
}

impl Serialize for Session {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        ObjectPath::serialize(&self.path(), serializer)
    }
}

impl Type for Session {
    const SIGNATURE: &'static Signature = <ObjectPath<'static>>::SIGNATURE;
}

impl PartialEq for Session {
    fn eq(&self, other: &Self) -> bool {
        self.0.path == other.0.path
    }
}

impl Eq for Session {}

impl Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("path", &self.0.path.as_str())
            .field("kind", &self.0.kind)
            .field("state", &self.current_state())
            .finish()
    }
}

/// A session created by the portal but not handed out yet, the
/// configuration requests run against it first.
#[derive(Debug)]
pub(crate) struct PendingSession(Session);

impl PendingSession {
    pub(crate) async fn new(
        portal: Portal,
        path: OwnedObjectPath,
        kind: SessionType,
        closed: Subscription,
    ) -> Result<Self, Error> {
        let session = Session::new(portal, path, kind, closed);
        if let Err(err) = session.install_signals(kind.feature_signals()).await {
            session.close().await?;
            return Err(err);
        }
        Ok(Self(session))
    }

    pub(crate) fn session(&self) -> &Session {
        &self.0
    }

    /// Run one configuration request, any failure closes the session.
    pub(crate) async fn configure<T>(
        &self,
        proxy: &Proxy,
        handle_token: &HandleToken,
        method_name: &'static str,
        body: impl Serialize + Type + Debug,
        cancellable: Option<&Cancellable>,
    ) -> Result<T, Error>
    where
        T: for<'de> Deserialize<'de> + Type + Debug,
    {
        self.0
            .configure(proxy, handle_token, method_name, body, cancellable)
            .await
    }

    /// Hand out the session, active right away for portals without a start
    /// step.
    pub(crate) fn finish(self) -> Session {
        if !self.0.kind().has_start() {
            self.0.set_state(SessionState::Active);
        }
        self.0
    }
}

#[cfg(test)]
mod tests {
    use std::{str::FromStr, time::Duration};

    use zbus::zvariant::{as_value, OwnedValue, Value};

    use super::*;
    use crate::{
        bus::mock::{MockBus, Reply},
        desktop::request::ResponseError,
    };

    const SCREENCAST: &str = "org.freedesktop.portal.ScreenCast";
    const INPUT_CAPTURE: &str = "org.freedesktop.portal.InputCapture";
    const GLOBAL_SHORTCUTS: &str = "org.freedesktop.portal.GlobalShortcuts";

    #[derive(Debug, Deserialize, Type)]
    struct ZonesChanged(OwnedObjectPath, HashMap<String, OwnedValue>);

    impl SessionSignal for ZonesChanged {
        const INTERFACE: &'static str = INPUT_CAPTURE;
        const MEMBER: &'static str = "ZonesChanged";

        fn session_handle(&self) -> ObjectPath<'_> {
            self.0.as_ref()
        }
    }

    #[derive(Debug, Deserialize, Type)]
    struct Activated(OwnedObjectPath, String, u64, HashMap<String, OwnedValue>);

    impl SessionSignal for Activated {
        const INTERFACE: &'static str = GLOBAL_SHORTCUTS;
        const MEMBER: &'static str = "Activated";

        fn session_handle(&self) -> ObjectPath<'_> {
            self.0.as_ref()
        }
    }

    #[derive(Debug, Deserialize, Type)]
    struct Deactivated(OwnedObjectPath, String, u64, HashMap<String, OwnedValue>);

    impl SessionSignal for Deactivated {
        const INTERFACE: &'static str = GLOBAL_SHORTCUTS;
        const MEMBER: &'static str = "Deactivated";

        fn session_handle(&self) -> ObjectPath<'_> {
            self.0.as_ref()
        }
    }

    #[derive(Debug, Deserialize, Type)]
    #[zvariant(signature = "dict")]
    struct StartedWithStreams {
        #[serde(with = "as_value")]
        streams: u32,
    }

    fn session_path(name: &str) -> String {
        format!("/org/freedesktop/portal/desktop/session/1_1/{name}")
    }

    async fn create(bus: &Arc<MockBus>, interface: &'static str, kind: SessionType, name: &str) -> (Proxy, PendingSession) {
        let proxy = Proxy::new_desktop_with_portal(bus.portal(), interface)
            .await
            .unwrap();
        bus.respond(
            interface,
            "CreateSession",
            0,
            MockBus::results([("session_handle", Value::from(session_path(name)))]),
        );
        let (pending, _) = proxy
            .create_session(
                kind,
                &HandleToken::default(),
                &HandleToken::from_str(name).unwrap(),
                "CreateSession",
                &(),
                None,
            )
            .await
            .unwrap();
        (proxy, pending)
    }

    #[tokio::test]
    async fn create_start_and_closed_by_the_portal() {
        let bus = MockBus::new(":1.1");
        let (proxy, pending) = create(&bus, SCREENCAST, SessionType::ScreenCast, "p1").await;
        let session = pending.finish();
        assert_eq!(session.path().as_str(), session_path("p1"));
        assert_eq!(session.state(), SessionState::Initial);

        bus.respond(
            SCREENCAST,
            "Start",
            0,
            MockBus::results([("restore_token", Value::from("abc"))]),
        );
        let results = session
            .start::<HashMap<String, OwnedValue>>(&proxy, &HandleToken::default(), "Start", &(), None)
            .await
            .unwrap();
        assert!(results.contains_key("restore_token"));
        assert_eq!(session.state(), SessionState::Active);

        bus.emit_closed(&session_path("p1"));
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(bus.subscribers("Closed"), 0);

        bus.emit_closed(&session_path("p1"));
        assert_eq!(session.state(), SessionState::Closed);
        // Closed by the portal, nothing to close on our side.
        assert_eq!(bus.closes(&session_path("p1")), 0);
        assert!(matches!(session.ensure_active(), Err(Error::SessionClosed)));
    }

    #[tokio::test]
    async fn close_then_closed_signal() {
        let bus = MockBus::new(":1.1");
        let (proxy, pending) = create(&bus, SCREENCAST, SessionType::ScreenCast, "p2").await;
        let session = pending.finish();
        bus.respond(SCREENCAST, "Start", 0, HashMap::new());
        session
            .start::<HashMap<String, OwnedValue>>(&proxy, &HandleToken::default(), "Start", &(), None)
            .await
            .unwrap();

        session.close().await.unwrap();
        assert_eq!(session.state(), SessionState::Closed);
        bus.emit_closed(&session_path("p2"));
        session.close().await.unwrap();

        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(bus.closes(&session_path("p2")), 1);
        session.receive_closed().await.unwrap();
    }

    #[tokio::test]
    async fn receive_closed_wakes_up() {
        let bus = MockBus::new(":1.1");
        let (_proxy, pending) = create(&bus, SCREENCAST, SessionType::ScreenCast, "p3").await;
        let session = pending.finish();

        let emit = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            bus.emit_closed(&session_path("p3"));
        };
        let (closed, ()) = futures_util::join!(session.receive_closed(), emit);
        closed.unwrap();
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn cancelled_start_closes_the_session() {
        let bus = MockBus::new(":1.1");
        let (proxy, pending) = create(&bus, SCREENCAST, SessionType::ScreenCast, "p4").await;
        let session = pending.finish();

        bus.respond(SCREENCAST, "Start", 1, HashMap::new());
        let err = session
            .start::<HashMap<String, OwnedValue>>(&proxy, &HandleToken::default(), "Start", &(), None)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(bus.closes(&session_path("p4")), 1);

        assert!(matches!(
            session
                .start::<HashMap<String, OwnedValue>>(&proxy, &HandleToken::default(), "Start", &(), None)
                .await,
            Err(Error::SessionClosed)
        ));
    }

    #[tokio::test]
    async fn failed_transport_keeps_the_state() {
        let bus = MockBus::new(":1.1");
        let (proxy, pending) = create(&bus, SCREENCAST, SessionType::ScreenCast, "p5").await;
        let session = pending.finish();

        bus.script(SCREENCAST, "Start", Reply::Fail("broken"));
        let err = session
            .start::<HashMap<String, OwnedValue>>(&proxy, &HandleToken::default(), "Start", &(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Portal(_)));
        assert_eq!(session.state(), SessionState::Initial);
    }

    #[tokio::test]
    async fn failed_configuration_closes_the_session() {
        let bus = MockBus::new(":1.1");
        let (proxy, pending) = create(&bus, SCREENCAST, SessionType::ScreenCast, "p6").await;

        bus.respond(SCREENCAST, "SelectSources", 2, HashMap::new());
        let err = pending
            .configure::<HashMap<String, OwnedValue>>(&proxy, &HandleToken::default(), "SelectSources", &(), None)
            .await
            .unwrap_err();
        assert!(err.is_failed());
        assert_eq!(pending.session().state(), SessionState::Closed);
        assert_eq!(bus.closes(&session_path("p6")), 1);
    }

    #[tokio::test]
    async fn missing_session_handle() {
        let bus = MockBus::new(":1.1");
        let proxy = Proxy::new_desktop_with_portal(bus.portal(), SCREENCAST)
            .await
            .unwrap();
        bus.respond(SCREENCAST, "CreateSession", 0, HashMap::new());

        let err = proxy
            .create_session(
                SessionType::ScreenCast,
                &HandleToken::default(),
                &HandleToken::default(),
                "CreateSession",
                &(),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Response(ResponseError::ProtocolViolation("session_handle"))
        ));
        assert!(err.is_failed());
        assert_eq!(bus.subscribers("Closed"), 0);
    }

    #[tokio::test]
    async fn closed_is_subscribed_before_create_session() {
        let bus = MockBus::new(":1.1");
        let (_proxy, _pending) = create(&bus, SCREENCAST, SessionType::ScreenCast, "p7").await;
        let events = bus.events();
        let subscribed = events
            .iter()
            .position(|e| matches!(e, crate::bus::mock::Event::Subscribe { member, path, .. } if *member == "Closed" && path.as_deref() == Some(session_path("p7").as_str())))
            .unwrap();
        let called = events
            .iter()
            .position(|e| matches!(e, crate::bus::mock::Event::Call { member, .. } if member == "CreateSession"))
            .unwrap();
        assert!(subscribed < called);
    }

    #[tokio::test]
    async fn signals_are_routed_by_session() {
        let bus = MockBus::new(":1.1");
        let (_, capture) = create(&bus, INPUT_CAPTURE, SessionType::InputCapture, "capture").await;
        let (_, shortcuts) =
            create(&bus, GLOBAL_SHORTCUTS, SessionType::GlobalShortcuts, "shortcuts").await;
        let capture = capture.finish();
        let shortcuts = shortcuts.finish();
        assert_eq!(capture.state(), SessionState::Active);
        assert_eq!(shortcuts.state(), SessionState::Initial);

        // Emitted before anyone listens, kept by the subscriptions installed
        // along the sessions.
        let empty = HashMap::<String, OwnedValue>::new();
        let other = OwnedObjectPath::try_from(session_path("shortcuts")).unwrap();
        let own = OwnedObjectPath::try_from(session_path("capture")).unwrap();
        bus.emit(DESKTOP_PATH, INPUT_CAPTURE, "ZonesChanged", &(&other, &empty));
        bus.emit(DESKTOP_PATH, INPUT_CAPTURE, "ZonesChanged", &(&own, &empty));
        bus.emit(DESKTOP_PATH, GLOBAL_SHORTCUTS, "Activated", &(&own, "copy", 1u64, &empty));
        bus.emit(DESKTOP_PATH, GLOBAL_SHORTCUTS, "Activated", &(&other, "paste", 2u64, &empty));

        let zones = capture.receive_signal::<ZonesChanged>().await.unwrap();
        let activated = shortcuts.receive_signal::<Activated>().await.unwrap();
        futures_util::pin_mut!(zones, activated);

        let zone = tokio::time::timeout(Duration::from_secs(1), zones.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(zone.session_handle(), capture.path());
        let shortcut = tokio::time::timeout(Duration::from_secs(1), activated.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(shortcut.session_handle(), shortcuts.path());
        assert_eq!(shortcut.1, "paste");

        // Nothing else is addressed to them.
        assert!(zones.next().now_or_never().is_none());
        assert!(activated.next().now_or_never().is_none());
    }

    #[tokio::test]
    async fn signal_stream_ends_on_close() {
        let bus = MockBus::new(":1.1");
        let (_, capture) = create(&bus, INPUT_CAPTURE, SessionType::InputCapture, "c2").await;
        let capture = capture.finish();
        let zones = capture.receive_signal::<ZonesChanged>().await.unwrap();
        futures_util::pin_mut!(zones);

        let close = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            capture.close().await.unwrap();
        };
        let (next, ()) = futures_util::join!(zones.next(), close);
        assert!(next.is_none());
        assert!(matches!(
            capture.receive_signal::<ZonesChanged>().await,
            Err(Error::SessionClosed)
        ));
    }

    #[tokio::test]
    async fn unread_signals_do_not_hold_back_others() {
        let bus = MockBus::new(":1.1");
        let (proxy, pending) =
            create(&bus, GLOBAL_SHORTCUTS, SessionType::GlobalShortcuts, "busy").await;
        let session = pending.finish();
        bus.respond(GLOBAL_SHORTCUTS, "BindShortcuts", 0, HashMap::new());
        session
            .start::<HashMap<String, OwnedValue>>(&proxy, &HandleToken::default(), "BindShortcuts", &(), None)
            .await
            .unwrap();

        let own = OwnedObjectPath::try_from(session_path("busy")).unwrap();
        let empty = HashMap::<String, OwnedValue>::new();
        for timestamp in 0..200u64 {
            bus.emit(DESKTOP_PATH, GLOBAL_SHORTCUTS, "Deactivated", &(&own, "copy", timestamp, &empty));
        }
        bus.emit(DESKTOP_PATH, GLOBAL_SHORTCUTS, "Activated", &(&own, "paste", 200u64, &empty));

        let mut activated = session.receive_signal::<Activated>().await.unwrap();
        let shortcut = tokio::time::timeout(Duration::from_secs(1), activated.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(shortcut.1, "paste");

        // Only the most recent unread ones are kept.
        let mut deactivated = session.receive_signal::<Deactivated>().await.unwrap();
        let mut timestamps = Vec::new();
        while let Some(Some(signal)) = deactivated.next().now_or_never() {
            timestamps.push(signal.2);
        }
        assert_eq!(timestamps.len(), crate::bus::MAX_QUEUED);
        assert_eq!(timestamps.first(), Some(&136));
        assert_eq!(timestamps.last(), Some(&199));
    }

    #[tokio::test]
    async fn undecodable_start_results_close_the_session() {
        let bus = MockBus::new(":1.1");
        let (proxy, pending) = create(&bus, SCREENCAST, SessionType::ScreenCast, "p8").await;
        let session = pending.finish();

        bus.respond(SCREENCAST, "Start", 0, HashMap::new());
        let err = session
            .start::<StartedWithStreams>(&proxy, &HandleToken::default(), "Start", &(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Zbus(zbus::Error::Variant(_))));
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(bus.closes(&session_path("p8")), 1);
    }

    #[tokio::test]
    async fn rejected_start_results_close_the_session() {
        let bus = MockBus::new(":1.1");
        let (proxy, pending) = create(&bus, SCREENCAST, SessionType::ScreenCast, "p9").await;
        let session = pending.finish();

        bus.respond(SCREENCAST, "Start", 0, HashMap::new());
        let err = session
            .start_with(
                &proxy,
                &HandleToken::default(),
                "Start",
                &(),
                None,
                |_: HashMap<String, OwnedValue>| -> Result<(), Error> {
                    Err(ResponseError::ProtocolViolation("streams").into())
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Response(ResponseError::ProtocolViolation("streams"))
        ));
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(bus.closes(&session_path("p9")), 1);
        assert!(matches!(session.ensure_active(), Err(Error::SessionClosed)));
    }
}
