//! Register global shortcuts
//!
//! Binding the shortcuts starts the session, the activation signals are
//! received from the moment the session is created.
//!
//! # Examples
//!
//! ```rust,no_run
//! use futures_util::StreamExt;
//! use xdg_portal::desktop::global_shortcuts::{GlobalShortcuts, NewShortcut};
//!
//! async fn run() -> xdg_portal::Result<()> {
//!     let proxy = GlobalShortcuts::new().await?;
//!     let session = proxy.create_session(None).await?;
//!     let mut activated = proxy.receive_activated(&session).await?;
//!
//!     let shortcuts = [NewShortcut::new("copy", "Copy the selection")
//!         .preferred_trigger("CTRL+SHIFT+c")];
//!     let bound = proxy.bind_shortcuts(&session, &shortcuts, None, None).await?;
//!     for shortcut in &bound {
//!         println!("{}: {}", shortcut.id(), shortcut.trigger_description());
//!     }
//!
//!     while let Some(shortcut) = activated.next().await {
//!         println!("{} pressed", shortcut.shortcut_id());
//!     }
//!     Ok(())
//! }
//! ```

use std::{collections::HashMap, fmt::Debug, time::Duration};

use futures_util::Stream;
use serde::{Deserialize, Serialize};
use zbus::zvariant::{
    as_value::{self, optional},
    ObjectPath, OwnedObjectPath, OwnedValue, Type,
};

use super::{session::SessionSignal, HandleToken, Session, SessionType};
use crate::{
    proxy::Proxy, window_identifier::MaybeWindowIdentifierExt, Cancellable, Error, Portal,
    WindowIdentifier,
};

const INTERFACE: &str = "org.freedesktop.portal.GlobalShortcuts";

#[derive(Clone, Serialize, Type, Debug, Default)]
#[zvariant(signature = "dict")]
struct NewShortcutInfo {
    #[serde(with = "as_value")]
    description: String,
    #[serde(with = "optional", skip_serializing_if = "Option::is_none")]
    preferred_trigger: Option<String>,
}

/// Shortcut descriptor used to bind new shortcuts in
/// [`GlobalShortcuts::bind_shortcuts`]
#[derive(Clone, Serialize, Type, Debug)]
pub struct NewShortcut(String, NewShortcutInfo);

impl NewShortcut {
    /// Construct new shortcut
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self(
            id.into(),
            NewShortcutInfo {
                description: description.into(),
                preferred_trigger: None,
            },
        )
    }

    /// Sets the preferred shortcut trigger, defined as described by the
    /// "shortcuts" XDG specification.
    #[must_use]
    pub fn preferred_trigger<'a>(mut self, preferred_trigger: impl Into<Option<&'a str>>) -> Self {
        self.1.preferred_trigger = preferred_trigger.into().map(ToOwned::to_owned);
        self
    }
}

#[derive(Clone, Deserialize, Type, Debug, Default, PartialEq)]
#[zvariant(signature = "dict")]
struct ShortcutInfo {
    #[serde(default, with = "optional")]
    description: Option<String>,
    #[serde(default, with = "optional")]
    trigger_description: Option<String>,
}

/// A shortcut bound by the portal.
///
/// If you need to create a new shortcuts, take a look at [`NewShortcut`]
/// instead.
#[derive(Clone, Deserialize, Type, Debug, PartialEq)]
pub struct Shortcut(String, ShortcutInfo);

impl Shortcut {
    /// Shortcut id
    pub fn id(&self) -> &str {
        &self.0
    }

    /// User-readable text describing what the shortcut does.
    pub fn description(&self) -> &str {
        self.1.description.as_deref().unwrap_or_default()
    }

    /// User-readable text describing how to trigger the shortcut for the
    /// client to render.
    pub fn trigger_description(&self) -> &str {
        self.1.trigger_description.as_deref().unwrap_or_default()
    }
}

#[derive(Serialize, Type, Debug, Default)]
#[zvariant(signature = "dict")]
struct CreateSessionOptions {
    #[serde(with = "as_value")]
    handle_token: HandleToken,
    #[serde(with = "as_value")]
    session_handle_token: HandleToken,
}

#[derive(Serialize, Type, Debug, Default)]
#[zvariant(signature = "dict")]
struct BindShortcutsOptions {
    #[serde(with = "as_value")]
    handle_token: HandleToken,
}

#[derive(Serialize, Type, Debug, Default)]
#[zvariant(signature = "dict")]
struct ListShortcutsOptions {
    #[serde(with = "as_value")]
    handle_token: HandleToken,
}

#[derive(Serialize, Type, Debug, Default)]
#[zvariant(signature = "dict")]
struct ConfigureShortcutsOptions {
    #[serde(with = "optional", skip_serializing_if = "Option::is_none")]
    activation_token: Option<String>,
}

#[derive(Deserialize, Type, Debug)]
#[zvariant(signature = "dict")]
struct ShortcutsResponse {
    #[serde(default, with = "optional")]
    shortcuts: Option<Vec<Shortcut>>,
}

/// Notifies about a shortcut becoming active.
#[derive(Debug, Deserialize, Type)]
pub struct Activated(OwnedObjectPath, String, u64, HashMap<String, OwnedValue>);

impl Activated {
    /// Session that requested the shortcut.
    pub fn session_handle(&self) -> ObjectPath<'_> {
        self.0.as_ref()
    }

    /// The application-provided ID for the shortcut.
    pub fn shortcut_id(&self) -> &str {
        &self.1
    }

    /// The timestamp, in milliseconds.
    pub fn timestamp(&self) -> Duration {
        Duration::from_millis(self.2)
    }

    /// Optional information
    pub fn options(&self) -> &HashMap<String, OwnedValue> {
        &self.3
    }
}

impl SessionSignal for Activated {
    const INTERFACE: &'static str = INTERFACE;
    const MEMBER: &'static str = "Activated";

    fn session_handle(&self) -> ObjectPath<'_> {
        self.0.as_ref()
    }
}

/// Notifies that a shortcut is not active anymore.
#[derive(Debug, Deserialize, Type)]
pub struct Deactivated(OwnedObjectPath, String, u64, HashMap<String, OwnedValue>);

impl Deactivated {
    /// Session that requested the shortcut.
    pub fn session_handle(&self) -> ObjectPath<'_> {
        self.0.as_ref()
    }

    /// The application-provided ID for the shortcut.
    pub fn shortcut_id(&self) -> &str {
        &self.1
    }

    /// The timestamp, in milliseconds.
    pub fn timestamp(&self) -> Duration {
        Duration::from_millis(self.2)
    }

    /// Optional information
    pub fn options(&self) -> &HashMap<String, OwnedValue> {
        &self.3
    }
}

impl SessionSignal for Deactivated {
    const INTERFACE: &'static str = INTERFACE;
    const MEMBER: &'static str = "Deactivated";

    fn session_handle(&self) -> ObjectPath<'_> {
        self.0.as_ref()
    }
}

/// Indicates that the information associated with some of the shortcuts has
/// changed.
#[derive(Debug, Deserialize, Type)]
pub struct ShortcutsChanged(OwnedObjectPath, Vec<Shortcut>);

impl ShortcutsChanged {
    /// Session that requested the shortcut.
    pub fn session_handle(&self) -> ObjectPath<'_> {
        self.0.as_ref()
    }

    /// Shortcuts that have been registered.
    pub fn shortcuts(&self) -> &[Shortcut] {
        &self.1
    }
}

impl SessionSignal for ShortcutsChanged {
    const INTERFACE: &'static str = INTERFACE;
    const MEMBER: &'static str = "ShortcutsChanged";

    fn session_handle(&self) -> ObjectPath<'_> {
        self.0.as_ref()
    }
}

/// A global shortcuts session.
///
/// The wrapper keeps the [`Session`] alive. Once the session is closed,
/// every call made through the wrapper fails with [`Error::SessionClosed`].
#[derive(Debug, Clone)]
pub struct GlobalShortcutsSession(Session);

impl GlobalShortcutsSession {
    /// The underlying session.
    pub fn session(&self) -> &Session {
        &self.0
    }

    /// Closes the session, the shortcuts get unbound.
    pub async fn close(&self) -> Result<(), Error> {
        self.0.close().await
    }
}

/// Wrapper of the DBus interface: [`org.freedesktop.portal.GlobalShortcuts`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.GlobalShortcuts.html).
#[derive(Debug)]
#[doc(alias = "org.freedesktop.portal.GlobalShortcuts")]
pub struct GlobalShortcuts(Proxy);

impl GlobalShortcuts {
    /// Create a new instance of [`GlobalShortcuts`].
    pub async fn new() -> Result<Self, Error> {
        let proxy = Proxy::new_desktop(INTERFACE).await?;
        Ok(Self(proxy))
    }

    /// Create a new instance of [`GlobalShortcuts`] on `portal`.
    pub async fn with_portal(portal: Portal) -> Result<Self, Error> {
        let proxy = Proxy::new_desktop_with_portal(portal, INTERFACE).await?;
        Ok(Self(proxy))
    }

    /// Returns the version of the portal interface.
    pub fn version(&self) -> u32 {
        self.0.version()
    }

    /// Create a global shortcuts session.
    ///
    /// # Specifications
    ///
    /// See also [`CreateSession`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.GlobalShortcuts.html#org-freedesktop-portal-globalshortcuts-createsession).
    #[doc(alias = "CreateSession")]
    #[doc(alias = "xdp_portal_create_global_shortcuts_session")]
    pub async fn create_session(
        &self,
        cancellable: Option<&Cancellable>,
    ) -> Result<GlobalShortcutsSession, Error> {
        let options = CreateSessionOptions::default();
        let (pending, _) = self
            .0
            .create_session(
                SessionType::GlobalShortcuts,
                &options.handle_token,
                &options.session_handle_token,
                "CreateSession",
                &(&options,),
                cancellable,
            )
            .await?;
        Ok(GlobalShortcutsSession(pending.finish()))
    }

    /// Bind the shortcuts, which starts the session.
    ///
    /// Shortcuts can only be bound once per session, a denied or cancelled
    /// binding closes the session.
    ///
    /// # Specifications
    ///
    /// See also [`BindShortcuts`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.GlobalShortcuts.html#org-freedesktop-portal-globalshortcuts-bindshortcuts).
    #[doc(alias = "BindShortcuts")]
    pub async fn bind_shortcuts(
        &self,
        session: &GlobalShortcutsSession,
        shortcuts: &[NewShortcut],
        identifier: Option<&WindowIdentifier>,
        cancellable: Option<&Cancellable>,
    ) -> Result<Vec<Shortcut>, Error> {
        let options = BindShortcutsOptions::default();
        let identifier = identifier.to_string_or_empty();
        let response = session
            .0
            .start::<ShortcutsResponse>(
                &self.0,
                &options.handle_token,
                "BindShortcuts",
                &(&session.0, shortcuts, &identifier, &options),
                cancellable,
            )
            .await?;
        Ok(response.shortcuts.unwrap_or_default())
    }

    /// Lists all shortcuts bound to the session.
    ///
    /// # Specifications
    ///
    /// See also [`ListShortcuts`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.GlobalShortcuts.html#org-freedesktop-portal-globalshortcuts-listshortcuts).
    #[doc(alias = "ListShortcuts")]
    pub async fn list_shortcuts(
        &self,
        session: &GlobalShortcutsSession,
        cancellable: Option<&Cancellable>,
    ) -> Result<Vec<Shortcut>, Error> {
        session.0.ensure_active()?;
        let options = ListShortcutsOptions::default();
        let response = self
            .0
            .request::<ShortcutsResponse>(
                &options.handle_token,
                "ListShortcuts",
                &(&session.0, &options),
                cancellable,
            )
            .await?;
        Ok(response.shortcuts.unwrap_or_default())
    }

    /// Ask the portal to show the shortcuts configuration of the session.
    ///
    /// # Arguments
    ///
    /// * `activation_token` - A token used to activate the configuration
    ///   window.
    ///
    /// # Specifications
    ///
    /// See also [`ConfigureShortcuts`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.GlobalShortcuts.html#org-freedesktop-portal-globalshortcuts-configureshortcuts).
    #[doc(alias = "ConfigureShortcuts")]
    pub async fn configure_shortcuts(
        &self,
        session: &GlobalShortcutsSession,
        identifier: Option<&WindowIdentifier>,
        activation_token: Option<&str>,
    ) -> Result<(), Error> {
        session.0.ensure_active()?;
        let options = ConfigureShortcutsOptions {
            activation_token: activation_token.map(ToOwned::to_owned),
        };
        let identifier = identifier.to_string_or_empty();
        self.0
            .call_versioned::<()>(
                "ConfigureShortcuts",
                &(&session.0, &identifier, &options),
                2,
            )
            .await
    }

    /// Signal emitted when shortcut becomes active.
    ///
    /// # Specifications
    ///
    /// See also [`Activated`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.GlobalShortcuts.html#org-freedesktop-portal-globalshortcuts-activated).
    #[doc(alias = "Activated")]
    pub async fn receive_activated(
        &self,
        session: &GlobalShortcutsSession,
    ) -> Result<impl Stream<Item = Activated> + Send + Unpin + 'static, Error> {
        session.0.receive_signal::<Activated>().await
    }

    /// Signal emitted when shortcut is not active anymore.
    ///
    /// # Specifications
    ///
    /// See also [`Deactivated`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.GlobalShortcuts.html#org-freedesktop-portal-globalshortcuts-deactivated).
    #[doc(alias = "Deactivated")]
    pub async fn receive_deactivated(
        &self,
        session: &GlobalShortcutsSession,
    ) -> Result<impl Stream<Item = Deactivated> + Send + Unpin + 'static, Error> {
        session.0.receive_signal::<Deactivated>().await
    }

    /// Signal emitted when information associated with some of the shortcuts
    /// has changed.
    ///
    /// # Specifications
    ///
    /// See also [`ShortcutsChanged`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.GlobalShortcuts.html#org-freedesktop-portal-globalshortcuts-shortcutschanged).
    #[doc(alias = "ShortcutsChanged")]
    pub async fn receive_shortcuts_changed(
        &self,
        session: &GlobalShortcutsSession,
    ) -> Result<impl Stream<Item = ShortcutsChanged> + Send + Unpin + 'static, Error> {
        session.0.receive_signal::<ShortcutsChanged>().await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use futures_util::{pin_mut, StreamExt};
    use zbus::zvariant::Value;

    use super::*;
    use crate::{bus::mock::MockBus, desktop::SessionState, proxy::DESKTOP_PATH};

    const SESSION: &str = "/org/freedesktop/portal/desktop/session/1_9/keys";

    async fn shortcuts_session(bus: &Arc<MockBus>) -> (GlobalShortcuts, GlobalShortcutsSession) {
        bus.respond(
            INTERFACE,
            "CreateSession",
            0,
            MockBus::results([("session_handle", Value::from(SESSION))]),
        );
        let proxy = GlobalShortcuts::with_portal(bus.portal()).await.unwrap();
        let session = proxy.create_session(None).await.unwrap();
        (proxy, session)
    }

    fn bound(id: &str, trigger: &str) -> (String, HashMap<&'static str, Value<'static>>) {
        let mut info = HashMap::new();
        info.insert("description", Value::from(format!("{id} action")));
        info.insert("trigger_description", Value::from(trigger.to_owned()));
        (id.to_owned(), info)
    }

    #[tokio::test]
    async fn bind_starts_the_session() {
        let bus = MockBus::new(":1.9");
        let (proxy, session) = shortcuts_session(&bus).await;
        assert_eq!(session.session().state(), SessionState::Initial);

        bus.respond(
            INTERFACE,
            "BindShortcuts",
            0,
            MockBus::results([("shortcuts", Value::from(vec![bound("copy", "Ctrl+C")]))]),
        );
        let shortcuts = proxy
            .bind_shortcuts(
                &session,
                &[NewShortcut::new("copy", "Copy").preferred_trigger("CTRL+c")],
                None,
                None,
            )
            .await
            .unwrap();
        assert_eq!(session.session().state(), SessionState::Active);
        assert_eq!(shortcuts.len(), 1);
        assert_eq!(shortcuts[0].id(), "copy");
        assert_eq!(shortcuts[0].description(), "copy action");
        assert_eq!(shortcuts[0].trigger_description(), "Ctrl+C");

        let (path, sent, window, _): (
            OwnedObjectPath,
            Vec<(String, HashMap<String, OwnedValue>)>,
            String,
            HashMap<String, OwnedValue>,
        ) = bus.calls("BindShortcuts")[0].body().deserialize().unwrap();
        assert_eq!(path.as_str(), SESSION);
        assert_eq!(window, "");
        assert_eq!(sent[0].0, "copy");
        assert_eq!(*sent[0].1["preferred_trigger"], Value::from("CTRL+c"));

        assert!(matches!(
            proxy.bind_shortcuts(&session, &[], None, None).await,
            Err(Error::InvalidSessionState)
        ));

        bus.respond(
            INTERFACE,
            "ListShortcuts",
            0,
            MockBus::results([(
                "shortcuts",
                Value::from(vec![bound("copy", "Ctrl+C"), bound("paste", "Ctrl+V")]),
            )]),
        );
        let listed = proxy.list_shortcuts(&session, None).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[1].id(), "paste");
    }

    #[tokio::test]
    async fn cancelled_binding_closes_the_session() {
        let bus = MockBus::new(":1.9");
        let (proxy, session) = shortcuts_session(&bus).await;
        bus.respond(INTERFACE, "BindShortcuts", 1, HashMap::new());
        let err = proxy
            .bind_shortcuts(&session, &[NewShortcut::new("a", "A")], None, None)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(session.session().state(), SessionState::Closed);
        assert!(matches!(
            proxy.list_shortcuts(&session, None).await,
            Err(Error::SessionClosed)
        ));
    }

    #[tokio::test]
    async fn list_before_binding() {
        let bus = MockBus::new(":1.9");
        let (proxy, session) = shortcuts_session(&bus).await;
        assert!(matches!(
            proxy.list_shortcuts(&session, None).await,
            Err(Error::InvalidSessionState)
        ));
        assert!(bus.calls("ListShortcuts").is_empty());
    }

    #[tokio::test]
    async fn configure_requires_version_two() {
        let bus = MockBus::new(":1.9");
        bus.set_version(INTERFACE, 1);
        let (proxy, session) = shortcuts_session(&bus).await;
        bus.respond(INTERFACE, "BindShortcuts", 0, HashMap::new());
        proxy
            .bind_shortcuts(&session, &[], None, None)
            .await
            .unwrap();
        assert!(matches!(
            proxy.configure_shortcuts(&session, None, Some("token")).await,
            Err(Error::RequiresVersion(2, 1))
        ));

        let bus = MockBus::new(":1.9");
        bus.set_version(INTERFACE, 2);
        let (proxy, session) = shortcuts_session(&bus).await;
        bus.respond(INTERFACE, "BindShortcuts", 0, HashMap::new());
        proxy
            .bind_shortcuts(&session, &[], None, None)
            .await
            .unwrap();
        proxy
            .configure_shortcuts(&session, None, Some("token"))
            .await
            .unwrap();
        let (_, _, options): (OwnedObjectPath, String, HashMap<String, OwnedValue>) =
            bus.calls("ConfigureShortcuts")[0].body().deserialize().unwrap();
        assert_eq!(*options["activation_token"], Value::from("token"));
    }

    #[tokio::test]
    async fn activation_signals_of_the_session() {
        let bus = MockBus::new(":1.9");
        let (proxy, session) = shortcuts_session(&bus).await;
        let activated = proxy.receive_activated(&session).await.unwrap();
        let changed = proxy.receive_shortcuts_changed(&session).await.unwrap();
        pin_mut!(activated, changed);

        let own = OwnedObjectPath::try_from(SESSION).unwrap();
        let other =
            OwnedObjectPath::try_from("/org/freedesktop/portal/desktop/session/1_9/other").unwrap();
        let empty = HashMap::<String, OwnedValue>::new();
        bus.emit(DESKTOP_PATH, INTERFACE, "Activated", &(&other, "paste", 10u64, &empty));
        bus.emit(DESKTOP_PATH, INTERFACE, "Activated", &(&own, "copy", 1500u64, &empty));
        bus.emit(
            DESKTOP_PATH,
            INTERFACE,
            "ShortcutsChanged",
            &(&own, vec![bound("copy", "Super+C")]),
        );

        let shortcut = activated.next().await.unwrap();
        assert_eq!(shortcut.shortcut_id(), "copy");
        assert_eq!(shortcut.timestamp(), Duration::from_millis(1500));
        let changed = changed.next().await.unwrap();
        assert_eq!(changed.shortcuts()[0].trigger_description(), "Super+C");

        session.close().await.unwrap();
        assert!(activated.next().await.is_none());
    }
}
