use std::{collections::HashMap, fmt::Debug, future::ready};

use futures_util::{
    future::{select, Either},
    pin_mut, Stream, StreamExt,
};
use serde::{Deserialize, Serialize};
use zbus::{
    message::Flags,
    zvariant::{ObjectPath, OwnedObjectPath, OwnedValue, Type, Value},
    Message,
};

use crate::{
    bus::SignalFilter,
    desktop::{
        request::{BasicResponse, Request, ResponseError},
        session::{self, PendingSession, SessionType},
        HandleToken,
    },
    Cancellable, Error, Portal, PortalError,
};

pub(crate) const DESKTOP_DESTINATION: &str = "org.freedesktop.portal.Desktop";
pub(crate) const DESKTOP_PATH: &str = "/org/freedesktop/portal/desktop";

pub(crate) const FLATPAK_DESTINATION: &str = "org.freedesktop.portal.Flatpak";
pub(crate) const FLATPAK_PATH: &str = "/org/freedesktop/portal/Flatpak";

const PROPERTIES_INTERFACE: &str = "org.freedesktop.DBus.Properties";

/// One portal interface on one object, bound to a [`Portal`].
#[derive(Debug, Clone)]
pub(crate) struct Proxy {
    portal: Portal,
    interface: &'static str,
    path: OwnedObjectPath,
    destination: &'static str,
    version: u32,
}

impl Proxy {
    pub async fn new<P>(
        portal: Portal,
        interface: &'static str,
        path: P,
        destination: &'static str,
    ) -> Result<Proxy, Error>
    where
        P: TryInto<ObjectPath<'static>>,
        P::Error: Into<zbus::zvariant::Error>,
    {
        let path = path
            .try_into()
            .map_err(Into::<zbus::zvariant::Error>::into)?
            .into();
        let mut proxy = Self {
            portal,
            interface,
            path,
            destination,
            version: 1,
        };
        proxy.version = proxy.property::<u32>("version").await.unwrap_or(1);
        #[cfg(feature = "tracing")]
        tracing::debug!("{interface} version {}", proxy.version);
        Ok(proxy)
    }

    pub async fn new_desktop(interface: &'static str) -> Result<Proxy, Error> {
        Self::new_desktop_with_portal(Portal::global().await?, interface).await
    }

    pub async fn new_desktop_with_portal(
        portal: Portal,
        interface: &'static str,
    ) -> Result<Proxy, Error> {
        Self::new(portal, interface, DESKTOP_PATH, DESKTOP_DESTINATION).await
    }

    pub async fn new_flatpak_with_portal(
        portal: Portal,
        interface: &'static str,
    ) -> Result<Proxy, Error> {
        Self::new(portal, interface, FLATPAK_PATH, FLATPAK_DESTINATION).await
    }

    pub async fn new_flatpak_with_path<P>(
        portal: Portal,
        interface: &'static str,
        path: P,
    ) -> Result<Proxy, Error>
    where
        P: TryInto<ObjectPath<'static>>,
        P::Error: Into<zbus::zvariant::Error>,
    {
        Self::new(portal, interface, path, FLATPAK_DESTINATION).await
    }

    /// Returns the version of the interface
    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn interface(&self) -> &'static str {
        self.interface
    }

    pub fn path(&self) -> &ObjectPath<'static> {
        &self.path
    }

    pub fn portal(&self) -> &Portal {
        &self.portal
    }

    fn method_call<B>(&self, method_name: &'static str, body: &B) -> Result<Message, Error>
    where
        B: Serialize + Type,
    {
        Message::method_call(self.path.clone().into_inner(), method_name)?
            .destination(self.destination)?
            .interface(self.interface)?
            .build(body)
            .map_err(From::from)
    }

    /// Issue `method_name` and wait for the `Response` signal of the request
    /// object it creates.
    ///
    /// The `Response` subscription is in place before the method is called.
    /// When `cancellable` is cancelled first, the request is closed and
    /// [`ResponseError::Cancelled`] returned without waiting any further; a
    /// response arriving later is discarded along with the subscription.
    pub(crate) async fn request<T>(
        &self,
        handle_token: &HandleToken,
        method_name: &'static str,
        body: impl Serialize + Type + Debug,
        cancellable: Option<&Cancellable>,
    ) -> Result<T, Error>
    where
        T: for<'de> Deserialize<'de> + Type + Debug,
    {
        self.request_with_path(handle_token, method_name, body, cancellable)
            .await
            .map(|(response, _)| response)
    }

    /// Like [`Proxy::request`], also returning the request object path.
    pub(crate) async fn request_with_path<T>(
        &self,
        handle_token: &HandleToken,
        method_name: &'static str,
        body: impl Serialize + Type + Debug,
        cancellable: Option<&Cancellable>,
    ) -> Result<(T, OwnedObjectPath), Error>
    where
        T: for<'de> Deserialize<'de> + Type + Debug,
    {
        if cancellable.is_some_and(Cancellable::is_cancelled) {
            #[cfg(feature = "tracing")]
            tracing::debug!("{}:{method_name} cancelled before being sent", self.interface);
            return Err(ResponseError::Cancelled.into());
        }
        let mut request = Request::prepare(&self.portal, handle_token).await?;

        let outcome = {
            let exchange = Box::pin(async {
                let path = self.call::<OwnedObjectPath>(method_name, &body).await?;
                #[cfg(feature = "tracing")]
                tracing::debug!("Received request path {}", path.as_str());
                request.follow(path).await?;
                request.receive_response::<T>().await
            });
            match cancellable {
                None => Some(exchange.await),
                Some(cancellable) => {
                    let cancelled = cancellable.cancelled();
                    pin_mut!(cancelled);
                    match select(exchange, cancelled).await {
                        Either::Left((response, _)) => Some(response),
                        Either::Right(_) => None,
                    }
                }
            }
        };
        let Some(response) = outcome else {
            #[cfg(feature = "tracing")]
            tracing::info!("Request {} cancelled", request.path().as_str());
            request.close().await;
            return Err(ResponseError::Cancelled.into());
        };
        let response = response?;
        Ok((response, request.path().to_owned().into()))
    }

    pub(crate) async fn empty_request(
        &self,
        handle_token: &HandleToken,
        method_name: &'static str,
        body: impl Serialize + Type + Debug,
        cancellable: Option<&Cancellable>,
    ) -> Result<(), Error> {
        self.request::<BasicResponse>(handle_token, method_name, body, cancellable)
            .await
            .map(|_| ())
    }

    /// Create a session through a request: the `Closed` signal of the
    /// predicted session object is subscribed to before `method_name` is
    /// called, the session object path is read from the mandatory
    /// `session_handle` result.
    ///
    /// Returns the session along with the remaining results.
    pub(crate) async fn create_session(
        &self,
        kind: SessionType,
        handle_token: &HandleToken,
        session_handle_token: &HandleToken,
        method_name: &'static str,
        body: impl Serialize + Type + Debug,
        cancellable: Option<&Cancellable>,
    ) -> Result<(PendingSession, HashMap<String, OwnedValue>), Error> {
        let predicted = self.portal.session_path(session_handle_token)?;
        let closed = session::subscribe_closed(&self.portal, &predicted).await?;

        let mut results = self
            .request::<HashMap<String, OwnedValue>>(handle_token, method_name, body, cancellable)
            .await?;
        let handle = results
            .remove("session_handle")
            .ok_or(ResponseError::ProtocolViolation("session_handle"))?;
        let path = session_handle(&handle)?;

        let closed = if path == predicted {
            closed
        } else {
            drop(closed);
            session::subscribe_closed(&self.portal, &path).await?
        };
        let pending = PendingSession::new(self.portal.clone(), path, kind, closed).await?;
        Ok((pending, results))
    }

    /// Create a session through a method directly replying with the session
    /// object path.
    pub(crate) async fn create_session_direct(
        &self,
        kind: SessionType,
        session_handle_token: &HandleToken,
        method_name: &'static str,
        body: impl Serialize + Type + Debug,
    ) -> Result<PendingSession, Error> {
        let predicted = self.portal.session_path(session_handle_token)?;
        let closed = session::subscribe_closed(&self.portal, &predicted).await?;
        let path = self.call::<OwnedObjectPath>(method_name, body).await?;
        let closed = if path == predicted {
            closed
        } else {
            drop(closed);
            session::subscribe_closed(&self.portal, &path).await?
        };
        PendingSession::new(self.portal.clone(), path, kind, closed).await
    }

    pub(crate) async fn call<R>(
        &self,
        method_name: &'static str,
        body: impl Serialize + Type + Debug,
    ) -> Result<R, Error>
    where
        R: for<'de> Deserialize<'de> + Type,
    {
        #[cfg(feature = "tracing")]
        {
            tracing::info!("Calling method {}:{}", self.interface, method_name);
            tracing::debug!("With body {:#?}", body);
        }
        let message = self.method_call(method_name, &body)?;
        let reply = self
            .portal
            .bus()
            .call(message)
            .await
            .map_err::<PortalError, _>(From::from)?;
        let reply = reply.body().deserialize::<R>()?;
        Ok(reply)
    }

    pub(crate) async fn call_versioned<R>(
        &self,
        method_name: &'static str,
        body: impl Serialize + Type + Debug,
        req_version: u32,
    ) -> Result<R, Error>
    where
        R: for<'de> Deserialize<'de> + Type,
    {
        let version = self.version();
        if version >= req_version {
            self.call::<R>(method_name, body).await
        } else {
            Err(Error::RequiresVersion(req_version, version))
        }
    }

    /// Send a method call without waiting for its reply.
    pub(crate) async fn send(
        &self,
        method_name: &'static str,
        body: impl Serialize + Type + Debug,
    ) -> Result<(), Error> {
        #[cfg(feature = "tracing")]
        {
            tracing::info!("Sending method {}:{}", self.interface, method_name);
            tracing::debug!("With body {:#?}", body);
        }
        let message = Message::method_call(self.path.clone().into_inner(), method_name)?
            .destination(self.destination)?
            .interface(self.interface)?
            .with_flags(Flags::NoReplyExpected)?
            .build(&body)?;
        self.portal.bus().send(message).await?;
        Ok(())
    }

    pub async fn property<T>(&self, property_name: &'static str) -> Result<T, Error>
    where
        T: TryFrom<OwnedValue>,
        <T as TryFrom<OwnedValue>>::Error: Into<zbus::zvariant::Error>,
    {
        let message = Message::method_call(self.path.clone().into_inner(), "Get")?
            .destination(self.destination)?
            .interface(PROPERTIES_INTERFACE)?
            .build(&(self.interface, property_name))?;
        let reply = self.portal.bus().call(message).await?;
        let value = reply.body().deserialize::<OwnedValue>()?;
        T::try_from(value).map_err(|e| Error::from(Into::<zbus::zvariant::Error>::into(e)))
    }

    pub(crate) async fn property_versioned<T>(
        &self,
        property_name: &'static str,
        req_version: u32,
    ) -> Result<T, Error>
    where
        T: TryFrom<OwnedValue>,
        <T as TryFrom<OwnedValue>>::Error: Into<zbus::zvariant::Error>,
    {
        let version = self.version();
        if version >= req_version {
            self.property::<T>(property_name).await
        } else {
            Err(Error::RequiresVersion(req_version, version))
        }
    }

    /// Receive every `name` signal emitted on the proxy object.
    pub(crate) async fn signal<I>(
        &self,
        name: &'static str,
    ) -> Result<impl Stream<Item = I> + Send + Unpin + 'static, Error>
    where
        I: for<'de> Deserialize<'de> + Type + Debug + Send + 'static,
    {
        let filter = SignalFilter::new(self.destination, self.interface, name).path(self.path.clone());
        let subscription = self.portal.bus().subscribe(filter).await?;
        Ok(subscription.filter_map({
            #[cfg(not(feature = "tracing"))]
            {
                move |msg| ready(msg.body().deserialize().ok())
            }
            #[cfg(feature = "tracing")]
            {
                let ifc = self.interface;
                move |msg| ready(trace_body(name, ifc, &msg))
            }
        }))
    }
}

/// The `session_handle` result, sent as an object path or as a string
/// depending on the portal version.
fn session_handle(value: &OwnedValue) -> Result<OwnedObjectPath, Error> {
    let path = match &**value {
        Value::ObjectPath(path) => Some(OwnedObjectPath::from(path.clone())),
        Value::Str(path) => OwnedObjectPath::try_from(path.as_str()).ok(),
        _ => None,
    };
    path.ok_or_else(|| ResponseError::ProtocolViolation("session_handle").into())
}

#[cfg(feature = "tracing")]
pub(crate) fn trace_body<I>(name: &'static str, ifc: &str, msg: &Message) -> Option<I>
where
    I: for<'de> Deserialize<'de> + Type + Debug,
{
    tracing::info!("Received signal '{name}' on '{ifc}'");
    match msg.body().deserialize() {
        Ok(body) => {
            tracing::debug!("With body {body:#?}");
            Some(body)
        }
        Err(e) => {
            tracing::warn!("Error obtaining body: {e:#?}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{str::FromStr, time::Duration};

    use super::*;
    use crate::bus::mock::{Event, MockBus, Reply};

    const FILE_CHOOSER: &str = "org.freedesktop.portal.FileChooser";

    #[derive(Debug, Deserialize, Type)]
    #[zvariant(signature = "dict")]
    struct Uris {
        #[serde(with = "zbus::zvariant::as_value")]
        uris: Vec<String>,
    }

    async fn file_chooser(bus: &std::sync::Arc<MockBus>) -> Proxy {
        Proxy::new_desktop_with_portal(bus.portal(), FILE_CHOOSER)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn subscribes_before_calling() {
        let bus = MockBus::new(":1.7");
        bus.respond(FILE_CHOOSER, "OpenFile", 0, MockBus::results([("uris", Value::from(vec!["file:///tmp/a"]))]));
        let proxy = file_chooser(&bus).await;
        let token = HandleToken::from_str("t1").unwrap();

        proxy
            .request::<Uris>(&token, "OpenFile", &("", "Open"), None)
            .await
            .unwrap();

        let events = bus.events();
        let subscribed = events
            .iter()
            .position(|e| matches!(e, Event::Subscribe { member, path, .. } if *member == "Response" && path.as_deref() == Some("/org/freedesktop/portal/desktop/request/1_7/t1")))
            .unwrap();
        let called = events
            .iter()
            .position(|e| matches!(e, Event::Call { member, .. } if member == "OpenFile"))
            .unwrap();
        assert!(subscribed < called);
    }

    #[tokio::test]
    async fn successful_response() {
        let bus = MockBus::new(":1.7");
        bus.respond(
            FILE_CHOOSER,
            "OpenFile",
            0,
            MockBus::results([("uris", Value::from(vec!["file:///tmp/a"]))]),
        );
        let proxy = file_chooser(&bus).await;

        let response = proxy
            .request::<Uris>(&HandleToken::default(), "OpenFile", &("", "Open"), None)
            .await
            .unwrap();
        assert_eq!(response.uris, vec!["file:///tmp/a".to_owned()]);
        // The response subscription is gone along the request.
        assert_eq!(bus.subscribers("Response"), 0);
    }

    #[tokio::test]
    async fn response_codes() {
        let bus = MockBus::new(":1.7");
        let proxy = file_chooser(&bus).await;

        bus.respond(FILE_CHOOSER, "OpenFile", 1, HashMap::new());
        let err = proxy
            .empty_request(&HandleToken::default(), "OpenFile", &("", "Open"), None)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());

        for code in [2, 7, 1000] {
            bus.respond(FILE_CHOOSER, "OpenFile", code, HashMap::new());
            let err = proxy
                .empty_request(&HandleToken::default(), "OpenFile", &("", "Open"), None)
                .await
                .unwrap_err();
            assert!(err.is_failed());
            assert!(!err.is_cancelled());
        }
    }

    #[tokio::test]
    async fn method_failure_is_reported() {
        let bus = MockBus::new(":1.7");
        bus.script(FILE_CHOOSER, "OpenFile", Reply::Fail("no such interface"));
        let proxy = file_chooser(&bus).await;

        let err = proxy
            .empty_request(&HandleToken::default(), "OpenFile", &("", "Open"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Portal(_)));
        assert_eq!(bus.subscribers("Response"), 0);
    }

    #[tokio::test]
    async fn cancel_closes_the_request() {
        let bus = MockBus::new(":1.7");
        bus.script(FILE_CHOOSER, "OpenFile", Reply::Pending);
        let proxy = file_chooser(&bus).await;
        let token = HandleToken::from_str("t2").unwrap();
        let cancellable = Cancellable::new();

        let request = proxy.empty_request(&token, "OpenFile", &("", "Open"), Some(&cancellable));
        let cancel = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            cancellable.cancel();
        };
        let (result, ()) = futures_util::join!(request, cancel);

        assert!(result.unwrap_err().is_cancelled());
        let path = "/org/freedesktop/portal/desktop/request/1_7/t2";
        assert_eq!(bus.closes(path), 1);

        // A straggling response has nobody to reach.
        assert_eq!(bus.subscribers("Response"), 0);
        bus.emit_response(path, 0, HashMap::new());
        assert_eq!(bus.closes(path), 1);
    }

    #[tokio::test]
    async fn already_cancelled_does_not_touch_the_bus() {
        let bus = MockBus::new(":1.7");
        let proxy = file_chooser(&bus).await;
        let before = bus.events().len();
        let cancellable = Cancellable::new();
        cancellable.cancel();

        let err = proxy
            .empty_request(&HandleToken::default(), "OpenFile", &("", "Open"), Some(&cancellable))
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(bus.events().len(), before);
    }

    #[tokio::test]
    async fn cancel_after_completion_is_a_no_op() {
        let bus = MockBus::new(":1.7");
        bus.respond(FILE_CHOOSER, "OpenFile", 0, HashMap::new());
        let proxy = file_chooser(&bus).await;
        let token = HandleToken::from_str("t3").unwrap();
        let cancellable = Cancellable::new();

        proxy
            .empty_request(&token, "OpenFile", &("", "Open"), Some(&cancellable))
            .await
            .unwrap();
        cancellable.cancel();
        assert_eq!(bus.closes("/org/freedesktop/portal/desktop/request/1_7/t3"), 0);
    }

    #[tokio::test]
    async fn cancel_and_response_race() {
        for round in 0..20u64 {
            let bus = MockBus::new(":1.7");
            bus.script(FILE_CHOOSER, "OpenFile", Reply::Pending);
            let proxy = file_chooser(&bus).await;
            let token = HandleToken::default();
            let path = bus.portal().request_path(&token).unwrap();
            let cancellable = Cancellable::new();

            let request = proxy.empty_request(&token, "OpenFile", &("", "Open"), Some(&cancellable));
            let race = async {
                tokio::time::sleep(Duration::from_millis(1)).await;
                if round % 2 == 0 {
                    bus.emit_response(path.as_str(), 0, HashMap::new());
                    cancellable.cancel();
                } else {
                    cancellable.cancel();
                    bus.emit_response(path.as_str(), 0, HashMap::new());
                }
            };
            let (result, ()) = futures_util::join!(request, race);

            // Exactly one outcome, the Close only goes out when cancellation won.
            match result {
                Ok(()) => assert_eq!(bus.closes(path.as_str()), 0),
                Err(err) => {
                    assert!(err.is_cancelled());
                    assert_eq!(bus.closes(path.as_str()), 1);
                }
            }
        }
    }

    #[tokio::test]
    async fn follows_unexpected_request_path() {
        let bus = MockBus::new(":1.7");
        bus.script(
            FILE_CHOOSER,
            "OpenFile",
            Reply::Path("/org/freedesktop/portal/desktop/request/1_7/legacy"),
        );
        let proxy = file_chooser(&bus).await;

        let token = HandleToken::default();
        let request = proxy.request_with_path::<BasicResponse>(
            &token,
            "OpenFile",
            &("", "Open"),
            None,
        );
        let respond = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            bus.emit_response(
                "/org/freedesktop/portal/desktop/request/1_7/legacy",
                0,
                HashMap::new(),
            );
        };
        let (result, ()) = futures_util::join!(request, respond);
        let (_, path) = result.unwrap();
        assert_eq!(
            path.as_str(),
            "/org/freedesktop/portal/desktop/request/1_7/legacy"
        );
    }

    #[tokio::test]
    async fn version_falls_back_to_one() {
        let bus = MockBus::new(":1.7");
        assert_eq!(file_chooser(&bus).await.version(), 1);

        bus.set_version(FILE_CHOOSER, 4);
        let proxy = file_chooser(&bus).await;
        assert_eq!(proxy.version(), 4);
        assert!(matches!(
            proxy.call_versioned::<()>("Anything", &(), 5).await,
            Err(Error::RequiresVersion(5, 4))
        ));
    }
}
