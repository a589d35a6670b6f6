//! Start a screencast session and get the PipeWire remote of it.
//!
//! # Examples
//!
//! How to create a screen cast session & start it.
//!
//! ```rust,no_run
//! use xdg_portal::desktop::{
//!     screencast::{CursorMode, Screencast, SelectSourcesOptions, SourceType},
//!     PersistMode,
//! };
//!
//! async fn run() -> xdg_portal::Result<()> {
//!     let proxy = Screencast::new().await?;
//!     let session = proxy.create_session(None).await?;
//!     proxy
//!         .select_sources(
//!             &session,
//!             SelectSourcesOptions::default()
//!                 .cursor_mode(CursorMode::Metadata)
//!                 .sources(SourceType::Monitor | SourceType::Window)
//!                 .multiple(true)
//!                 .persist_mode(PersistMode::DoNot),
//!             None,
//!         )
//!         .await?;
//!
//!     let response = proxy.start(&session, None, None).await?;
//!     response.streams().iter().for_each(|stream| {
//!         println!("node id: {}", stream.pipe_wire_node_id());
//!         println!("size: {:?}", stream.size());
//!         println!("position: {:?}", stream.position());
//!     });
//!     Ok(())
//! }
//! ```

use std::{fmt::Debug, os::fd::OwnedFd};

use enumflags2::{bitflags, BitFlags};
use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};
use zbus::zvariant::{
    self,
    as_value::{self, optional},
    Type,
};

use super::{
    request::BasicResponse, HandleToken, PersistMode, Session, SessionType,
};
use crate::{
    proxy::Proxy, window_identifier::MaybeWindowIdentifierExt, Cancellable, Error, Portal,
    WindowIdentifier,
};

pub(crate) const INTERFACE: &str = "org.freedesktop.portal.ScreenCast";

#[bitflags]
#[derive(Serialize_repr, Deserialize_repr, PartialEq, Eq, Copy, Clone, Debug, Type)]
#[repr(u32)]
#[doc(alias = "XdpOutputType")]
/// A bit flag for the available sources to record.
pub enum SourceType {
    #[doc(alias = "XDP_OUTPUT_MONITOR")]
    /// A monitor.
    Monitor,
    #[doc(alias = "XDP_OUTPUT_WINDOW")]
    /// A specific window
    Window,
    #[doc(alias = "XDP_OUTPUT_VIRTUAL")]
    /// Virtual
    Virtual,
}

#[bitflags]
#[derive(Serialize_repr, Deserialize_repr, PartialEq, Eq, Debug, Copy, Clone, Type)]
#[repr(u32)]
#[doc(alias = "XdpCursorMode")]
/// A bit flag for the possible cursor modes.
pub enum CursorMode {
    #[doc(alias = "XDP_CURSOR_MODE_HIDDEN")]
    /// The cursor is not part of the screen cast stream.
    Hidden,
    #[doc(alias = "XDP_CURSOR_MODE_EMBEDDED")]
    /// The cursor is embedded as part of the stream buffers.
    Embedded,
    #[doc(alias = "XDP_CURSOR_MODE_METADATA")]
    /// The cursor is not part of the screen cast stream, but sent as PipeWire
    /// stream metadata.
    Metadata,
}

#[derive(Serialize, Type, Debug, Default)]
#[zvariant(signature = "dict")]
pub(crate) struct CreateSessionOptions {
    #[serde(with = "as_value")]
    pub(crate) handle_token: HandleToken,
    #[serde(with = "as_value")]
    pub(crate) session_handle_token: HandleToken,
}

#[derive(Serialize, Type, Debug, Default)]
/// Specified options for a [`Screencast::select_sources`] request.
#[zvariant(signature = "dict")]
pub struct SelectSourcesOptions {
    #[serde(with = "as_value")]
    handle_token: HandleToken,
    #[serde(with = "optional", skip_serializing_if = "Option::is_none")]
    types: Option<BitFlags<SourceType>>,
    #[serde(with = "optional", skip_serializing_if = "Option::is_none")]
    multiple: Option<bool>,
    #[serde(with = "optional", skip_serializing_if = "Option::is_none")]
    cursor_mode: Option<CursorMode>,
    #[serde(with = "optional", skip_serializing_if = "Option::is_none")]
    restore_token: Option<String>,
    #[serde(with = "optional", skip_serializing_if = "Option::is_none")]
    persist_mode: Option<PersistMode>,
}

impl SelectSourcesOptions {
    /// Sets whether to allow selecting multiple sources.
    #[must_use]
    pub fn multiple(mut self, multiple: impl Into<Option<bool>>) -> Self {
        self.multiple = multiple.into();
        self
    }

    /// Sets how the cursor will be drawn on the screen cast stream.
    #[must_use]
    pub fn cursor_mode(mut self, cursor_mode: impl Into<Option<CursorMode>>) -> Self {
        self.cursor_mode = cursor_mode.into();
        self
    }

    /// Sets the types of content to record.
    #[must_use]
    pub fn sources(mut self, types: impl Into<Option<BitFlags<SourceType>>>) -> Self {
        self.types = types.into();
        self
    }

    /// Sets the persist mode.
    #[must_use]
    pub fn persist_mode(mut self, persist_mode: impl Into<Option<PersistMode>>) -> Self {
        self.persist_mode = persist_mode.into();
        self
    }

    /// Sets the restore token of a previous session.
    #[must_use]
    pub fn restore_token<'a>(mut self, token: impl Into<Option<&'a str>>) -> Self {
        self.restore_token = token.into().map(ToOwned::to_owned);
        self
    }
}

#[derive(Serialize, Type, Debug, Default)]
#[zvariant(signature = "dict")]
struct StartCastOptions {
    #[serde(with = "as_value")]
    handle_token: HandleToken,
}

#[derive(Deserialize, Type, Debug)]
#[zvariant(signature = "dict")]
struct StreamsResponse {
    #[serde(default, with = "optional")]
    streams: Option<Vec<Stream>>,
    #[serde(default, with = "optional")]
    restore_token: Option<String>,
}

/// A response to a [`Screencast::start`] request.
#[derive(Debug, Clone, PartialEq)]
pub struct Streams {
    streams: Vec<Stream>,
    restore_token: Option<String>,
}

impl Streams {
    /// The session restore token.
    pub fn restore_token(&self) -> Option<&str> {
        self.restore_token.as_deref()
    }

    /// The list of streams.
    pub fn streams(&self) -> &[Stream] {
        &self.streams
    }
}

impl From<StreamsResponse> for Streams {
    fn from(response: StreamsResponse) -> Self {
        Self {
            streams: response.streams.unwrap_or_default(),
            restore_token: response.restore_token,
        }
    }
}

#[derive(Clone, Deserialize, Type, PartialEq)]
/// A PipeWire stream.
pub struct Stream(u32, StreamProperties);

impl Stream {
    /// The PipeWire stream Node ID
    pub fn pipe_wire_node_id(&self) -> u32 {
        self.0
    }

    /// A tuple consisting of the position (x, y) in the compositor coordinate
    /// space.
    ///
    /// **Note** the position may not be equivalent to a position in a pixel
    /// coordinate space. Only available for monitor streams.
    pub fn position(&self) -> Option<(i32, i32)> {
        self.1.position
    }

    /// A tuple consisting of (width, height), in the compositor coordinate
    /// space.
    pub fn size(&self) -> Option<(i32, i32)> {
        self.1.size
    }

    /// The source type of the stream.
    pub fn source_type(&self) -> Option<SourceType> {
        self.1.source_type
    }

    /// The stream identifier, persisted across restored sessions.
    pub fn id(&self) -> Option<&str> {
        self.1.id.as_deref()
    }

    /// The stream mapping id.
    pub fn mapping_id(&self) -> Option<&str> {
        self.1.mapping_id.as_deref()
    }
}

impl Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("pipewire_node_id", &self.pipe_wire_node_id())
            .field("position", &self.position())
            .field("size", &self.size())
            .field("source_type", &self.source_type())
            .field("id", &self.id())
            .finish()
    }
}

#[derive(Clone, Deserialize, Type, Debug, PartialEq)]
#[zvariant(signature = "dict")]
struct StreamProperties {
    #[serde(default, with = "optional")]
    id: Option<String>,
    #[serde(default, with = "optional")]
    position: Option<(i32, i32)>,
    #[serde(default, with = "optional")]
    size: Option<(i32, i32)>,
    #[serde(default, with = "optional")]
    source_type: Option<SourceType>,
    #[serde(default, with = "optional")]
    mapping_id: Option<String>,
}

/// The interface lets sandboxed applications create screen cast sessions.
///
/// Wrapper of the DBus interface: [`org.freedesktop.portal.ScreenCast`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.ScreenCast.html).
#[derive(Debug)]
#[doc(alias = "org.freedesktop.portal.ScreenCast")]
pub struct Screencast(Proxy);

impl Screencast {
    /// Create a new instance of [`Screencast`].
    pub async fn new() -> Result<Self, Error> {
        let proxy = Proxy::new_desktop(INTERFACE).await?;
        Ok(Self(proxy))
    }

    /// Create a new instance of [`Screencast`] on `portal`.
    pub async fn with_portal(portal: Portal) -> Result<Self, Error> {
        let proxy = Proxy::new_desktop_with_portal(portal, INTERFACE).await?;
        Ok(Self(proxy))
    }

    /// Returns the version of the portal interface.
    pub fn version(&self) -> u32 {
        self.0.version()
    }

    /// Create a screen cast session.
    ///
    /// The session is returned in the [`SessionState::Initial`] state, ready
    /// for [`Screencast::select_sources`]. Configuring it once started fails
    /// with [`Error::InvalidSessionState`].
    ///
    /// [`SessionState::Initial`]: crate::desktop::SessionState::Initial
    ///
    /// # Specifications
    ///
    /// See also [`CreateSession`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.ScreenCast.html#org-freedesktop-portal-screencast-createsession).
    #[doc(alias = "CreateSession")]
    #[doc(alias = "xdp_portal_create_screencast_session")]
    pub async fn create_session(&self, cancellable: Option<&Cancellable>) -> Result<Session, Error> {
        let options = CreateSessionOptions::default();
        let (pending, _) = self
            .0
            .create_session(
                SessionType::ScreenCast,
                &options.handle_token,
                &options.session_handle_token,
                "CreateSession",
                &(&options,),
                cancellable,
            )
            .await?;
        Ok(pending.finish())
    }

    /// Configure what the screen cast session should record.
    ///
    /// This method must be called before starting the session, on a screen
    /// cast session or on a remote desktop session. A denied or cancelled
    /// selection closes the session.
    ///
    /// # Specifications
    ///
    /// See also [`SelectSources`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.ScreenCast.html#org-freedesktop-portal-screencast-selectsources).
    #[doc(alias = "SelectSources")]
    pub async fn select_sources(
        &self,
        session: &Session,
        options: SelectSourcesOptions,
        cancellable: Option<&Cancellable>,
    ) -> Result<(), Error> {
        session.ensure_kind(&[SessionType::ScreenCast, SessionType::RemoteDesktop])?;
        session
            .configure::<BasicResponse>(
                &self.0,
                &options.handle_token,
                "SelectSources",
                &(session, &options),
                cancellable,
            )
            .await
            .map(|_| ())
    }

    /// Start the screen cast session.
    ///
    /// This will typically result the portal presenting a dialog letting the
    /// user do the selection set up by `select_sources`. A session can only
    /// be started once.
    ///
    /// # Specifications
    ///
    /// See also [`Start`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.ScreenCast.html#org-freedesktop-portal-screencast-start).
    #[doc(alias = "Start")]
    pub async fn start(
        &self,
        session: &Session,
        identifier: Option<&WindowIdentifier>,
        cancellable: Option<&Cancellable>,
    ) -> Result<Streams, Error> {
        session.ensure_kind(&[SessionType::ScreenCast])?;
        let options = StartCastOptions::default();
        let identifier = identifier.to_string_or_empty();
        session
            .start_with(
                &self.0,
                &options.handle_token,
                "Start",
                &(session, &identifier, &options),
                cancellable,
                |response: StreamsResponse| Ok(Streams::from(response)),
            )
            .await
    }

    /// Open a file descriptor to the PipeWire remote where the screen cast
    /// streams are available.
    ///
    /// # Specifications
    ///
    /// See also [`OpenPipeWireRemote`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.ScreenCast.html#org-freedesktop-portal-screencast-openpipewireremote).
    #[doc(alias = "OpenPipeWireRemote")]
    pub async fn open_pipe_wire_remote(&self, session: &Session) -> Result<OwnedFd, Error> {
        session.ensure_kind(&[SessionType::ScreenCast, SessionType::RemoteDesktop])?;
        session.ensure_active()?;
        let options = std::collections::HashMap::<&str, zvariant::Value<'_>>::new();
        let fd = self
            .0
            .call::<zvariant::OwnedFd>("OpenPipeWireRemote", &(session, options))
            .await?;
        Ok(fd.into())
    }

    /// Available cursor modes.
    ///
    /// # Specifications
    ///
    /// See also [`AvailableCursorModes`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.ScreenCast.html#org-freedesktop-portal-screencast-availablecursormodes).
    #[doc(alias = "AvailableCursorModes")]
    pub async fn available_cursor_modes(&self) -> Result<BitFlags<CursorMode>, Error> {
        let bits = self
            .0
            .property_versioned::<u32>("AvailableCursorModes", 2)
            .await?;
        Ok(BitFlags::from_bits_truncate(bits))
    }

    /// Available source types.
    ///
    /// # Specifications
    ///
    /// See also [`AvailableSourceTypes`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.ScreenCast.html#org-freedesktop-portal-screencast-availablesourcetypes).
    #[doc(alias = "AvailableSourceTypes")]
    pub async fn available_source_types(&self) -> Result<BitFlags<SourceType>, Error> {
        let bits = self.0.property::<u32>("AvailableSourceTypes").await?;
        Ok(BitFlags::from_bits_truncate(bits))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use zbus::zvariant::{OwnedValue, Value};

    use super::*;
    use crate::{bus::mock::MockBus, desktop::SessionState};

    const SESSION: &str = "/org/freedesktop/portal/desktop/session/1_4/cast";

    async fn session(bus: &std::sync::Arc<MockBus>) -> (Screencast, Session) {
        bus.respond(
            INTERFACE,
            "CreateSession",
            0,
            MockBus::results([("session_handle", Value::from(SESSION))]),
        );
        let proxy = Screencast::with_portal(bus.portal()).await.unwrap();
        let session = proxy.create_session(None).await.unwrap();
        (proxy, session)
    }

    fn stream(node: u32, size: (i32, i32)) -> (u32, HashMap<&'static str, Value<'static>>) {
        let mut properties = HashMap::new();
        properties.insert("size", Value::from(size));
        properties.insert("source_type", Value::from(1u32));
        (node, properties)
    }

    #[tokio::test]
    async fn select_and_start() {
        let bus = MockBus::new(":1.4");
        let (proxy, session) = session(&bus).await;
        assert_eq!(session.path().as_str(), SESSION);
        assert_eq!(session.state(), SessionState::Initial);

        bus.respond(INTERFACE, "SelectSources", 0, HashMap::new());
        proxy
            .select_sources(
                &session,
                SelectSourcesOptions::default()
                    .sources(SourceType::Monitor | SourceType::Window)
                    .multiple(true),
                None,
            )
            .await
            .unwrap();
        let (path, options): (zvariant::OwnedObjectPath, HashMap<String, OwnedValue>) =
            bus.calls("SelectSources")[0].body().deserialize().unwrap();
        assert_eq!(path.as_str(), SESSION);
        assert_eq!(u32::try_from(&options["types"]).unwrap(), 3);
        assert!(!options.contains_key("cursor_mode"));

        bus.respond(
            INTERFACE,
            "Start",
            0,
            MockBus::results([
                ("streams", Value::from(vec![stream(42, (1920, 1080))])),
                ("restore_token", Value::from("again")),
            ]),
        );
        let streams = proxy.start(&session, None, None).await.unwrap();
        assert_eq!(session.state(), SessionState::Active);
        assert_eq!(streams.restore_token(), Some("again"));
        let stream = &streams.streams()[0];
        assert_eq!(stream.pipe_wire_node_id(), 42);
        assert_eq!(stream.size(), Some((1920, 1080)));
        assert_eq!(stream.source_type(), Some(SourceType::Monitor));
        assert_eq!(stream.position(), None);

        assert!(matches!(
            proxy.start(&session, None, None).await,
            Err(Error::InvalidSessionState)
        ));
    }

    #[tokio::test]
    async fn start_without_streams() {
        let bus = MockBus::new(":1.4");
        let (proxy, session) = session(&bus).await;
        bus.respond(INTERFACE, "Start", 0, HashMap::new());
        let streams = proxy.start(&session, None, None).await.unwrap();
        assert!(streams.streams().is_empty());
        assert_eq!(streams.restore_token(), None);
        assert_eq!(session.state(), SessionState::Active);
        assert_eq!(bus.closes(SESSION), 0);
    }

    #[tokio::test]
    async fn selection_only_before_start() {
        let bus = MockBus::new(":1.4");
        let (proxy, session) = session(&bus).await;
        bus.respond(INTERFACE, "Start", 0, HashMap::new());
        proxy.start(&session, None, None).await.unwrap();

        assert!(matches!(
            proxy
                .select_sources(&session, SelectSourcesOptions::default(), None)
                .await,
            Err(Error::InvalidSessionState)
        ));
        assert!(bus.calls("SelectSources").is_empty());
        assert_eq!(session.state(), SessionState::Active);
    }

    #[tokio::test]
    async fn malformed_streams_close_the_session() {
        let bus = MockBus::new(":1.4");
        let (proxy, session) = session(&bus).await;
        bus.respond(
            INTERFACE,
            "Start",
            0,
            MockBus::results([("streams", Value::from("not a stream list"))]),
        );
        let err = proxy.start(&session, None, None).await.unwrap_err();
        assert!(matches!(err, Error::Zbus(zbus::Error::Variant(_))));
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(bus.closes(SESSION), 1);
    }

    #[tokio::test]
    async fn denied_selection_closes_the_session() {
        let bus = MockBus::new(":1.4");
        let (proxy, session) = session(&bus).await;
        bus.respond(INTERFACE, "SelectSources", 2, HashMap::new());
        let err = proxy
            .select_sources(&session, SelectSourcesOptions::default(), None)
            .await
            .unwrap_err();
        assert!(err.is_failed());
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(bus.closes(SESSION), 1);

        assert!(matches!(
            proxy.open_pipe_wire_remote(&session).await,
            Err(Error::SessionClosed)
        ));
    }

    #[tokio::test]
    async fn pipe_wire_remote_needs_a_started_session() {
        let bus = MockBus::new(":1.4");
        let (proxy, session) = session(&bus).await;
        assert!(matches!(
            proxy.open_pipe_wire_remote(&session).await,
            Err(Error::InvalidSessionState)
        ));
        assert!(bus.calls("OpenPipeWireRemote").is_empty());
    }

    #[tokio::test]
    async fn available_types() {
        let bus = MockBus::new(":1.4");
        bus.set_version(INTERFACE, 1);
        bus.set_property(INTERFACE, "AvailableSourceTypes", Value::from(5u32));
        let proxy = Screencast::with_portal(bus.portal()).await.unwrap();
        assert_eq!(
            proxy.available_source_types().await.unwrap(),
            SourceType::Monitor | SourceType::Virtual
        );
        assert!(matches!(
            proxy.available_cursor_modes().await,
            Err(Error::RequiresVersion(2, 1))
        ));
    }
}
