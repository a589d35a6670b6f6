//! Start a remote desktop session and interact with it.
//!
//! # Examples
//!
//! ```rust,no_run
//! use xdg_portal::desktop::{
//!     remote_desktop::{DeviceType, KeyState, RemoteDesktop, SelectDevicesOptions},
//!     screencast::{CursorMode, Screencast, SelectSourcesOptions, SourceType},
//!     PersistMode,
//! };
//!
//! async fn run() -> xdg_portal::Result<()> {
//!     let remote_desktop = RemoteDesktop::new().await?;
//!     let screencast = Screencast::new().await?;
//!     let session = remote_desktop.create_session(None).await?;
//!
//!     remote_desktop
//!         .select_devices(
//!             &session,
//!             SelectDevicesOptions::default()
//!                 .devices(DeviceType::Keyboard | DeviceType::Pointer)
//!                 .persist_mode(PersistMode::ExplicitlyRevoked),
//!             None,
//!         )
//!         .await?;
//!     screencast
//!         .select_sources(
//!             &session,
//!             SelectSourcesOptions::default()
//!                 .cursor_mode(CursorMode::Metadata)
//!                 .sources(SourceType::Monitor | SourceType::Window),
//!             None,
//!         )
//!         .await?;
//!
//!     let response = remote_desktop.start(&session, None, None).await?;
//!     println!("{:#?}", response.devices());
//!     println!("{:#?}", response.streams());
//!
//!     // 13 for Enter key code
//!     remote_desktop
//!         .notify_keyboard_keycode(&session, 13, KeyState::Pressed)
//!         .await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! Input events can only be sent once the session is started. Sending them
//! through an `ei` connection instead is possible with
//! [`RemoteDesktop::connect_to_eis`].

use std::{collections::HashMap, os::fd::OwnedFd};

use enumflags2::{bitflags, BitFlags};
use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};
use zbus::zvariant::{
    self,
    as_value::{self, optional},
    Type, Value,
};

use super::{
    request::BasicResponse,
    screencast::{CreateSessionOptions, Stream},
    HandleToken,
    PersistMode, Session, SessionType,
};
use crate::{
    proxy::Proxy, window_identifier::MaybeWindowIdentifierExt, Cancellable, Error, Portal,
    WindowIdentifier,
};

pub(crate) const INTERFACE: &str = "org.freedesktop.portal.RemoteDesktop";

#[derive(Serialize_repr, Deserialize_repr, Copy, Clone, PartialEq, Eq, Debug, Type)]
#[doc(alias = "XdpKeyState")]
/// The keyboard key state.
#[repr(u32)]
pub enum KeyState {
    #[doc(alias = "XDP_KEY_PRESSED")]
    /// The key is pressed.
    Pressed = 1,
    #[doc(alias = "XDP_KEY_RELEASED")]
    /// The key is released.
    Released = 0,
}

#[bitflags]
#[derive(Serialize_repr, Deserialize_repr, PartialEq, Eq, Debug, Clone, Copy, Type)]
#[repr(u32)]
#[doc(alias = "XdpDeviceType")]
/// A bit flag for the available devices.
pub enum DeviceType {
    #[doc(alias = "XDP_DEVICE_KEYBOARD")]
    /// A keyboard.
    Keyboard,
    #[doc(alias = "XDP_DEVICE_POINTER")]
    /// A mouse pointer.
    Pointer,
    #[doc(alias = "XDP_DEVICE_TOUCHSCREEN")]
    /// A touchscreen
    Touchscreen,
}

#[derive(Serialize_repr, Deserialize_repr, PartialEq, Eq, Debug, Clone, Copy, Type)]
#[doc(alias = "XdpDiscreteAxis")]
#[repr(u32)]
/// The available axis.
pub enum Axis {
    #[doc(alias = "XDP_AXIS_VERTICAL_SCROLL")]
    /// Vertical axis.
    Vertical = 0,
    #[doc(alias = "XDP_AXIS_HORIZONTAL_SCROLL")]
    /// Horizontal axis.
    Horizontal = 1,
}

#[derive(Serialize, Type, Debug, Default)]
#[zvariant(signature = "dict")]
struct NotifyPointerAxisOptions {
    #[serde(with = "as_value")]
    finish: bool,
}

#[derive(Serialize, Type, Debug, Default)]
/// Specified options for a [`RemoteDesktop::select_devices`] request.
#[zvariant(signature = "dict")]
pub struct SelectDevicesOptions {
    #[serde(with = "as_value")]
    handle_token: HandleToken,
    #[serde(with = "optional", skip_serializing_if = "Option::is_none")]
    types: Option<BitFlags<DeviceType>>,
    #[serde(with = "optional", skip_serializing_if = "Option::is_none")]
    restore_token: Option<String>,
    #[serde(with = "optional", skip_serializing_if = "Option::is_none")]
    persist_mode: Option<PersistMode>,
}

impl SelectDevicesOptions {
    /// Sets the device types to request remote controlling of.
    #[must_use]
    pub fn devices(mut self, types: impl Into<Option<BitFlags<DeviceType>>>) -> Self {
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
struct StartOptions {
    #[serde(with = "as_value")]
    handle_token: HandleToken,
}

#[derive(Deserialize, Type, Debug, Default, Clone, PartialEq)]
/// A response to a [`RemoteDesktop::start`] request.
#[zvariant(signature = "dict")]
pub struct SelectedDevices {
    #[serde(default, with = "as_value")]
    devices: BitFlags<DeviceType>,
    #[serde(default, with = "as_value")]
    streams: Vec<Stream>,
    #[serde(default, with = "optional")]
    restore_token: Option<String>,
    #[serde(default, with = "optional")]
    clipboard_enabled: Option<bool>,
}

impl SelectedDevices {
    /// The devices the user granted access to.
    pub fn devices(&self) -> BitFlags<DeviceType> {
        self.devices
    }

    /// The selected streams if a screen cast was set up on the same session.
    pub fn streams(&self) -> &[Stream] {
        &self.streams
    }

    /// The session restore token.
    pub fn restore_token(&self) -> Option<&str> {
        self.restore_token.as_deref()
    }

    /// Whether the clipboard was enabled.
    pub fn clipboard_enabled(&self) -> bool {
        self.clipboard_enabled.unwrap_or(false)
    }
}

/// The interface lets sandboxed applications create remote desktop sessions.
///
/// Wrapper of the DBus interface: [`org.freedesktop.portal.RemoteDesktop`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.RemoteDesktop.html).
#[derive(Debug)]
#[doc(alias = "org.freedesktop.portal.RemoteDesktop")]
pub struct RemoteDesktop(Proxy);

impl RemoteDesktop {
    /// Create a new instance of [`RemoteDesktop`].
    pub async fn new() -> Result<Self, Error> {
        let proxy = Proxy::new_desktop(INTERFACE).await?;
        Ok(Self(proxy))
    }

    /// Create a new instance of [`RemoteDesktop`] on `portal`.
    pub async fn with_portal(portal: Portal) -> Result<Self, Error> {
        let proxy = Proxy::new_desktop_with_portal(portal, INTERFACE).await?;
        Ok(Self(proxy))
    }

    /// Returns the version of the portal interface.
    pub fn version(&self) -> u32 {
        self.0.version()
    }

    /// Create a remote desktop session.
    ///
    /// A remote desktop session may only be started and stopped with this
    /// interface, but it can also be configured with
    /// [`Screencast::select_sources`](crate::desktop::screencast::Screencast::select_sources)
    /// to also record the screen.
    ///
    /// # Specifications
    ///
    /// See also [`CreateSession`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.RemoteDesktop.html#org-freedesktop-portal-remotedesktop-createsession).
    #[doc(alias = "CreateSession")]
    #[doc(alias = "xdp_portal_create_remote_desktop_session")]
    pub async fn create_session(&self, cancellable: Option<&Cancellable>) -> Result<Session, Error> {
        let options = CreateSessionOptions::default();
        let (pending, _) = self
            .0
            .create_session(
                SessionType::RemoteDesktop,
                &options.handle_token,
                &options.session_handle_token,
                "CreateSession",
                &(&options,),
                cancellable,
            )
            .await?;
        Ok(pending.finish())
    }

    /// Select input devices to remote control. A denied or cancelled
    /// selection closes the session.
    ///
    /// # Specifications
    ///
    /// See also [`SelectDevices`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.RemoteDesktop.html#org-freedesktop-portal-remotedesktop-selectdevices).
    #[doc(alias = "SelectDevices")]
    pub async fn select_devices(
        &self,
        session: &Session,
        options: SelectDevicesOptions,
        cancellable: Option<&Cancellable>,
    ) -> Result<(), Error> {
        session.ensure_kind(&[SessionType::RemoteDesktop])?;
        session
            .configure::<BasicResponse>(
                &self.0,
                &options.handle_token,
                "SelectDevices",
                &(session, &options),
                cancellable,
            )
            .await
            .map(|_| ())
    }

    /// Start a remote desktop session.
    ///
    /// This will typically result in the portal presenting a dialog letting
    /// the user select what to share, including devices and optionally
    /// screen content if screen cast sources was selected.
    ///
    /// # Specifications
    ///
    /// See also [`Start`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.RemoteDesktop.html#org-freedesktop-portal-remotedesktop-start).
    #[doc(alias = "Start")]
    pub async fn start(
        &self,
        session: &Session,
        identifier: Option<&WindowIdentifier>,
        cancellable: Option<&Cancellable>,
    ) -> Result<SelectedDevices, Error> {
        session.ensure_kind(&[SessionType::RemoteDesktop])?;
        let options = StartOptions::default();
        let identifier = identifier.to_string_or_empty();
        session
            .start::<SelectedDevices>(
                &self.0,
                &options.handle_token,
                "Start",
                &(session, &identifier, &options),
                cancellable,
            )
            .await
    }

    async fn notify(
        &self,
        session: &Session,
        method_name: &'static str,
        body: impl Serialize + Type + std::fmt::Debug,
    ) -> Result<(), Error> {
        session.ensure_kind(&[SessionType::RemoteDesktop])?;
        session.ensure_active()?;
        self.0.call::<()>(method_name, body).await
    }

    /// Notify keyboard code.
    ///
    /// **Note** only works if [`DeviceType::Keyboard`] access was provided
    /// after starting the session.
    ///
    /// # Specifications
    ///
    /// See also [`NotifyKeyboardKeycode`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.RemoteDesktop.html#org-freedesktop-portal-remotedesktop-notifykeyboardkeycode).
    #[doc(alias = "NotifyKeyboardKeycode")]
    pub async fn notify_keyboard_keycode(
        &self,
        session: &Session,
        keycode: i32,
        state: KeyState,
    ) -> Result<(), Error> {
        self.notify(
            session,
            "NotifyKeyboardKeycode",
            &(session, empty(), keycode, state),
        )
        .await
    }

    /// Notify keyboard symbol.
    ///
    /// **Note** only works if [`DeviceType::Keyboard`] access was provided
    /// after starting the session.
    ///
    /// # Specifications
    ///
    /// See also [`NotifyKeyboardKeysym`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.RemoteDesktop.html#org-freedesktop-portal-remotedesktop-notifykeyboardkeysym).
    #[doc(alias = "NotifyKeyboardKeysym")]
    pub async fn notify_keyboard_keysym(
        &self,
        session: &Session,
        keysym: i32,
        state: KeyState,
    ) -> Result<(), Error> {
        self.notify(
            session,
            "NotifyKeyboardKeysym",
            &(session, empty(), keysym, state),
        )
        .await
    }

    /// Notify about a new relative pointer motion event, in the streams
    /// logical coordinate space.
    ///
    /// # Specifications
    ///
    /// See also [`NotifyPointerMotion`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.RemoteDesktop.html#org-freedesktop-portal-remotedesktop-notifypointermotion).
    #[doc(alias = "NotifyPointerMotion")]
    pub async fn notify_pointer_motion(
        &self,
        session: &Session,
        dx: f64,
        dy: f64,
    ) -> Result<(), Error> {
        self.notify(session, "NotifyPointerMotion", &(session, empty(), dx, dy))
            .await
    }

    /// Notify about a new absolute pointer motion event, relative to the
    /// PipeWire stream node `stream`.
    ///
    /// # Specifications
    ///
    /// See also [`NotifyPointerMotionAbsolute`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.RemoteDesktop.html#org-freedesktop-portal-remotedesktop-notifypointermotionabsolute).
    #[doc(alias = "NotifyPointerMotionAbsolute")]
    pub async fn notify_pointer_motion_absolute(
        &self,
        session: &Session,
        stream: u32,
        x: f64,
        y: f64,
    ) -> Result<(), Error> {
        self.notify(
            session,
            "NotifyPointerMotionAbsolute",
            &(session, empty(), stream, x, y),
        )
        .await
    }

    /// Notify pointer button, encoded according to Linux Evdev button codes.
    ///
    /// # Specifications
    ///
    /// See also [`NotifyPointerButton`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.RemoteDesktop.html#org-freedesktop-portal-remotedesktop-notifypointerbutton).
    #[doc(alias = "NotifyPointerButton")]
    pub async fn notify_pointer_button(
        &self,
        session: &Session,
        button: i32,
        state: KeyState,
    ) -> Result<(), Error> {
        self.notify(
            session,
            "NotifyPointerButton",
            &(session, empty(), button, state),
        )
        .await
    }

    /// Notify pointer axis movement from a "smooth scroll" device, such as a
    /// touchpad. `finish` marks the last event of a sequence.
    ///
    /// # Specifications
    ///
    /// See also [`NotifyPointerAxis`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.RemoteDesktop.html#org-freedesktop-portal-remotedesktop-notifypointeraxis).
    #[doc(alias = "NotifyPointerAxis")]
    pub async fn notify_pointer_axis(
        &self,
        session: &Session,
        dx: f64,
        dy: f64,
        finish: bool,
    ) -> Result<(), Error> {
        let options = NotifyPointerAxisOptions { finish };
        self.notify(session, "NotifyPointerAxis", &(session, &options, dx, dy))
            .await
    }

    /// Notify pointer axis discrete steps.
    ///
    /// # Specifications
    ///
    /// See also [`NotifyPointerAxisDiscrete`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.RemoteDesktop.html#org-freedesktop-portal-remotedesktop-notifypointeraxisdiscrete).
    #[doc(alias = "NotifyPointerAxisDiscrete")]
    pub async fn notify_pointer_axis_discrete(
        &self,
        session: &Session,
        axis: Axis,
        steps: i32,
    ) -> Result<(), Error> {
        self.notify(
            session,
            "NotifyPointerAxisDiscrete",
            &(session, empty(), axis, steps),
        )
        .await
    }

    /// Notify about a new touch down event, in the logical coordinate space
    /// of the PipeWire stream node `stream`.
    ///
    /// # Specifications
    ///
    /// See also [`NotifyTouchDown`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.RemoteDesktop.html#org-freedesktop-portal-remotedesktop-notifytouchdown).
    #[doc(alias = "NotifyTouchDown")]
    pub async fn notify_touch_down(
        &self,
        session: &Session,
        stream: u32,
        slot: u32,
        x: f64,
        y: f64,
    ) -> Result<(), Error> {
        self.notify(
            session,
            "NotifyTouchDown",
            &(session, empty(), stream, slot, x, y),
        )
        .await
    }

    /// Notify about a new touch motion event.
    ///
    /// # Specifications
    ///
    /// See also [`NotifyTouchMotion`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.RemoteDesktop.html#org-freedesktop-portal-remotedesktop-notifytouchmotion).
    #[doc(alias = "NotifyTouchMotion")]
    pub async fn notify_touch_motion(
        &self,
        session: &Session,
        stream: u32,
        slot: u32,
        x: f64,
        y: f64,
    ) -> Result<(), Error> {
        self.notify(
            session,
            "NotifyTouchMotion",
            &(session, empty(), stream, slot, x, y),
        )
        .await
    }

    /// Notify about a new touch up event.
    ///
    /// # Specifications
    ///
    /// See also [`NotifyTouchUp`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.RemoteDesktop.html#org-freedesktop-portal-remotedesktop-notifytouchup).
    #[doc(alias = "NotifyTouchUp")]
    pub async fn notify_touch_up(&self, session: &Session, slot: u32) -> Result<(), Error> {
        self.notify(session, "NotifyTouchUp", &(session, empty(), slot))
            .await
    }

    /// Connect to EIS, returning a file descriptor to use with libei.
    ///
    /// Requires version 2 of the interface.
    ///
    /// # Specifications
    ///
    /// See also [`ConnectToEIS`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.RemoteDesktop.html#org-freedesktop-portal-remotedesktop-connecttoeis).
    #[doc(alias = "ConnectToEIS")]
    pub async fn connect_to_eis(&self, session: &Session) -> Result<OwnedFd, Error> {
        session.ensure_kind(&[SessionType::RemoteDesktop])?;
        session.ensure_active()?;
        let fd = self
            .0
            .call_versioned::<zvariant::OwnedFd>("ConnectToEIS", &(session, empty()), 2)
            .await?;
        Ok(fd.into())
    }

    /// Available source types.
    ///
    /// # Specifications
    ///
    /// See also [`AvailableDeviceTypes`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.RemoteDesktop.html#org-freedesktop-portal-remotedesktop-availabledevicetypes).
    #[doc(alias = "AvailableDeviceTypes")]
    pub async fn available_device_types(&self) -> Result<BitFlags<DeviceType>, Error> {
        let bits = self.0.property::<u32>("AvailableDeviceTypes").await?;
        Ok(BitFlags::from_bits_truncate(bits))
    }
}

fn empty() -> HashMap<&'static str, Value<'static>> {
    HashMap::new()
}

#[cfg(test)]
mod tests {
    use zbus::zvariant::{OwnedObjectPath, OwnedValue};

    use super::*;
    use crate::{
        bus::mock::MockBus,
        desktop::{screencast, SessionState},
    };

    const SESSION: &str = "/org/freedesktop/portal/desktop/session/1_5/remote";

    async fn session(bus: &std::sync::Arc<MockBus>) -> (RemoteDesktop, Session) {
        bus.respond(
            INTERFACE,
            "CreateSession",
            0,
            MockBus::results([("session_handle", Value::from(SESSION))]),
        );
        let proxy = RemoteDesktop::with_portal(bus.portal()).await.unwrap();
        let session = proxy.create_session(None).await.unwrap();
        (proxy, session)
    }

    #[tokio::test]
    async fn start_and_notify() {
        let bus = MockBus::new(":1.5");
        let (proxy, session) = session(&bus).await;
        assert_eq!(session.kind(), SessionType::RemoteDesktop);

        bus.respond(INTERFACE, "SelectDevices", 0, HashMap::new());
        proxy
            .select_devices(
                &session,
                SelectDevicesOptions::default().devices(DeviceType::Keyboard | DeviceType::Pointer),
                None,
            )
            .await
            .unwrap();

        // Input is refused until the session is started.
        assert!(matches!(
            proxy
                .notify_keyboard_keycode(&session, 13, KeyState::Pressed)
                .await,
            Err(Error::InvalidSessionState)
        ));
        assert!(bus.calls("NotifyKeyboardKeycode").is_empty());

        bus.respond(
            INTERFACE,
            "Start",
            0,
            MockBus::results([
                ("devices", Value::from(3u32)),
                ("clipboard_enabled", Value::from(true)),
            ]),
        );
        let selected = proxy.start(&session, None, None).await.unwrap();
        assert_eq!(selected.devices(), DeviceType::Keyboard | DeviceType::Pointer);
        assert!(selected.clipboard_enabled());
        assert!(selected.streams().is_empty());
        assert_eq!(session.state(), SessionState::Active);

        proxy
            .notify_keyboard_keycode(&session, 13, KeyState::Pressed)
            .await
            .unwrap();
        proxy
            .notify_pointer_axis(&session, 0.0, 2.5, true)
            .await
            .unwrap();

        let (path, _, keycode, state): (OwnedObjectPath, HashMap<String, OwnedValue>, i32, u32) =
            bus.calls("NotifyKeyboardKeycode")[0]
                .body()
                .deserialize()
                .unwrap();
        assert_eq!(path.as_str(), SESSION);
        assert_eq!((keycode, state), (13, 1));
        let (_, options, _, dy): (OwnedObjectPath, HashMap<String, OwnedValue>, f64, f64) =
            bus.calls("NotifyPointerAxis")[0].body().deserialize().unwrap();
        assert!(bool::try_from(&options["finish"]).unwrap());
        assert_eq!(dy, 2.5);
    }

    #[tokio::test]
    async fn closed_session_refuses_input() {
        let bus = MockBus::new(":1.5");
        let (proxy, session) = session(&bus).await;
        bus.respond(INTERFACE, "Start", 0, HashMap::new());
        proxy.start(&session, None, None).await.unwrap();

        bus.emit_closed(SESSION);
        assert!(matches!(
            proxy.notify_touch_up(&session, 0).await,
            Err(Error::SessionClosed)
        ));
        assert!(matches!(
            proxy.connect_to_eis(&session).await,
            Err(Error::SessionClosed)
        ));
        assert!(bus.calls("NotifyTouchUp").is_empty());
    }

    #[tokio::test]
    async fn screencast_sources_on_a_remote_desktop_session() {
        let bus = MockBus::new(":1.5");
        let (proxy, session) = session(&bus).await;
        bus.respond(screencast::INTERFACE, "SelectSources", 0, HashMap::new());
        let screencast = screencast::Screencast::with_portal(bus.portal())
            .await
            .unwrap();
        screencast
            .select_sources(&session, Default::default(), None)
            .await
            .unwrap();
        // Only the remote desktop interface may start it.
        assert!(matches!(
            screencast.start(&session, None, None).await,
            Err(Error::InvalidSessionState)
        ));

        let mut properties = HashMap::new();
        properties.insert("position", Value::from((0i32, 0i32)));
        bus.respond(
            INTERFACE,
            "Start",
            0,
            MockBus::results([("streams", Value::from(vec![(7u32, properties)]))]),
        );
        let selected = proxy.start(&session, None, None).await.unwrap();
        assert_eq!(selected.streams()[0].pipe_wire_node_id(), 7);
        assert_eq!(selected.streams()[0].position(), Some((0, 0)));
        assert!(selected.devices().is_empty());
    }

    #[tokio::test]
    async fn eis_requires_version_two() {
        let bus = MockBus::new(":1.5");
        let (proxy, session) = session(&bus).await;
        bus.respond(INTERFACE, "Start", 0, HashMap::new());
        proxy.start(&session, None, None).await.unwrap();
        assert_eq!(proxy.version(), 1);
        assert!(matches!(
            proxy.connect_to_eis(&session).await,
            Err(Error::RequiresVersion(2, 1))
        ));
    }
}
