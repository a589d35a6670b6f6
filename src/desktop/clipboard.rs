//! Interact with the clipboard.
//!
//! The portal is meant to be used along with a
//! [`RemoteDesktop`](crate::desktop::remote_desktop::RemoteDesktop) session:
//! the clipboard has to be requested before the session is started, the
//! selection can then be read and written while it is active.
//!
//! ```rust,no_run
//! use futures_util::StreamExt;
//! use xdg_portal::desktop::{clipboard::ClipboardProxy, remote_desktop::RemoteDesktop};
//!
//! async fn run() -> xdg_portal::Result<()> {
//!     let remote_desktop = RemoteDesktop::new().await?;
//!     let clipboard = ClipboardProxy::new().await?;
//!     let session = remote_desktop.create_session(None).await?;
//!     clipboard.request(&session).await?;
//!     let mut changes = clipboard.receive_selection_owner_changed(&session).await?;
//!
//!     let devices = remote_desktop.start(&session, None, None).await?;
//!     if devices.clipboard_enabled() {
//!         if let Some(change) = changes.next().await {
//!             println!("{:?}", change.mime_types());
//!         }
//!     }
//!     Ok(())
//! }
//! ```

use std::{collections::HashMap, os::fd::OwnedFd};

use futures_util::Stream;
use serde::{Deserialize, Serialize};
use zbus::zvariant::{self, as_value, ObjectPath, OwnedObjectPath, Type, Value};

use super::{session::SessionSignal, Session, SessionState, SessionType};
use crate::{proxy::Proxy, Error, Portal};

const INTERFACE: &str = "org.freedesktop.portal.Clipboard";

const SIGNALS: &[(&str, &str)] = &[
    (INTERFACE, "SelectionOwnerChanged"),
    (INTERFACE, "SelectionTransfer"),
];

#[derive(Debug, Type, Serialize)]
#[zvariant(signature = "dict")]
struct SetSelectionOptions<'a> {
    #[serde(with = "as_value")]
    mime_types: &'a [&'a str],
}

#[derive(Debug, Type, Deserialize, Default)]
#[zvariant(signature = "dict")]
struct OwnerChangedOptions {
    #[serde(default, with = "as_value::optional")]
    mime_types: Option<Vec<String>>,
    #[serde(default, with = "as_value::optional")]
    session_is_owner: Option<bool>,
}

#[derive(Debug, Type, Deserialize)]
/// The details of a new clipboard selection.
pub struct SelectionOwnerChanged(OwnedObjectPath, OwnerChangedOptions);

impl SelectionOwnerChanged {
    /// Whether the session is the owner of the clipboard selection or not.
    pub fn session_is_owner(&self) -> Option<bool> {
        self.1.session_is_owner
    }

    /// A list of mime types the new clipboard has content for.
    pub fn mime_types(&self) -> &[String] {
        self.1.mime_types.as_deref().unwrap_or_default()
    }
}

impl SessionSignal for SelectionOwnerChanged {
    const INTERFACE: &'static str = INTERFACE;
    const MEMBER: &'static str = "SelectionOwnerChanged";

    fn session_handle(&self) -> ObjectPath<'_> {
        self.0.as_ref()
    }
}

#[derive(Debug, Type, Deserialize)]
/// A request to transfer the session's clipboard content, answered with
/// [`ClipboardProxy::selection_write`].
pub struct SelectionTransfer(OwnedObjectPath, String, u32);

impl SelectionTransfer {
    /// The requested mime type.
    pub fn mime_type(&self) -> &str {
        &self.1
    }

    /// The serial identifying the transfer.
    pub fn serial(&self) -> u32 {
        self.2
    }
}

impl SessionSignal for SelectionTransfer {
    const INTERFACE: &'static str = INTERFACE;
    const MEMBER: &'static str = "SelectionTransfer";

    fn session_handle(&self) -> ObjectPath<'_> {
        self.0.as_ref()
    }
}

#[doc(alias = "org.freedesktop.portal.Clipboard")]
/// Wrapper of the DBus interface: [`org.freedesktop.portal.Clipboard`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.Clipboard.html).
#[derive(Debug)]
pub struct ClipboardProxy(Proxy);

impl ClipboardProxy {
    /// Create a new instance of [`ClipboardProxy`].
    pub async fn new() -> Result<Self, Error> {
        let proxy = Proxy::new_desktop(INTERFACE).await?;
        Ok(Self(proxy))
    }

    /// Create a new instance of [`ClipboardProxy`] on `portal`.
    pub async fn with_portal(portal: Portal) -> Result<Self, Error> {
        let proxy = Proxy::new_desktop_with_portal(portal, INTERFACE).await?;
        Ok(Self(proxy))
    }

    /// The version of the interface.
    pub fn version(&self) -> u32 {
        self.0.version()
    }

    fn ensure_active(session: &Session) -> Result<(), Error> {
        session.ensure_kind(&[SessionType::RemoteDesktop])?;
        session.ensure_active()
    }

    /// Ask for clipboard access on a remote desktop session not started
    /// yet. The selection signals of the session are received from now on.
    ///
    /// # Specifications
    ///
    /// See also [`RequestClipboard`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.Clipboard.html#org-freedesktop-portal-clipboard-requestclipboard).
    #[doc(alias = "RequestClipboard")]
    pub async fn request(&self, session: &Session) -> Result<(), Error> {
        session.ensure_kind(&[SessionType::RemoteDesktop])?;
        match session.state() {
            SessionState::Initial => (),
            SessionState::Active => return Err(Error::InvalidSessionState),
            SessionState::Closed => return Err(Error::SessionClosed),
        }
        session.install_signals(SIGNALS).await?;
        let options: HashMap<&str, Value<'_>> = HashMap::default();
        self.0
            .call::<()>("RequestClipboard", &(session, options))
            .await
    }

    /// Advertise the mime types the session's clipboard has content for.
    ///
    /// # Specifications
    ///
    /// See also [`SetSelection`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.Clipboard.html#org-freedesktop-portal-clipboard-setselection).
    #[doc(alias = "SetSelection")]
    pub async fn set_selection(&self, session: &Session, mime_types: &[&str]) -> Result<(), Error> {
        Self::ensure_active(session)?;
        let options = SetSelectionOptions { mime_types };
        self.0
            .call::<()>("SetSelection", &(session, options))
            .await
    }

    /// A file descriptor to write the content of the transfer `serial` to.
    ///
    /// # Specifications
    ///
    /// See also [`SelectionWrite`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.Clipboard.html#org-freedesktop-portal-clipboard-selectionwrite).
    #[doc(alias = "SelectionWrite")]
    pub async fn selection_write(&self, session: &Session, serial: u32) -> Result<OwnedFd, Error> {
        Self::ensure_active(session)?;
        let fd = self
            .0
            .call::<zvariant::OwnedFd>("SelectionWrite", &(session, serial))
            .await?;
        Ok(fd.into())
    }

    /// Report whether the transfer `serial` succeeded.
    ///
    /// # Specifications
    ///
    /// See also [`SelectionWriteDone`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.Clipboard.html#org-freedesktop-portal-clipboard-selectionwritedone).
    #[doc(alias = "SelectionWriteDone")]
    pub async fn selection_write_done(
        &self,
        session: &Session,
        serial: u32,
        success: bool,
    ) -> Result<(), Error> {
        Self::ensure_active(session)?;
        self.0
            .call::<()>("SelectionWriteDone", &(session, serial, success))
            .await
    }

    /// A file descriptor to read the clipboard content as `mime_type` from.
    ///
    /// # Specifications
    ///
    /// See also [`SelectionRead`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.Clipboard.html#org-freedesktop-portal-clipboard-selectionread).
    #[doc(alias = "SelectionRead")]
    pub async fn selection_read(&self, session: &Session, mime_type: &str) -> Result<OwnedFd, Error> {
        Self::ensure_active(session)?;
        let fd = self
            .0
            .call::<zvariant::OwnedFd>("SelectionRead", &(session, mime_type))
            .await?;
        Ok(fd.into())
    }

    /// Notifies the session that the clipboard selection has changed.
    ///
    /// # Specifications
    ///
    /// See also [`SelectionOwnerChanged`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.Clipboard.html#org-freedesktop-portal-clipboard-selectionownerchanged).
    #[doc(alias = "SelectionOwnerChanged")]
    pub async fn receive_selection_owner_changed(
        &self,
        session: &Session,
    ) -> Result<impl Stream<Item = SelectionOwnerChanged> + Send + Unpin + 'static, Error> {
        session.ensure_kind(&[SessionType::RemoteDesktop])?;
        session.receive_signal::<SelectionOwnerChanged>().await
    }

    /// Requests from the portal to transfer the session's clipboard
    /// content.
    ///
    /// # Specifications
    ///
    /// See also [`SelectionTransfer`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.Clipboard.html#org-freedesktop-portal-clipboard-selectiontransfer).
    #[doc(alias = "SelectionTransfer")]
    pub async fn receive_selection_transfer(
        &self,
        session: &Session,
    ) -> Result<impl Stream<Item = SelectionTransfer> + Send + Unpin + 'static, Error> {
        session.ensure_kind(&[SessionType::RemoteDesktop])?;
        session.receive_signal::<SelectionTransfer>().await
    }
}
