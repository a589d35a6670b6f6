//! Inhibit the session from being restarted or the user from logging out,
//! and monitor the state of the login session.
//!
//! Wrapper of the DBus interface: [`org.freedesktop.portal.Inhibit`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.Inhibit.html).
//!
//! ### Examples
//!
//! ```rust,no_run
//! use futures_util::StreamExt;
//! use xdg_portal::{
//!     desktop::inhibit::{InhibitFlags, InhibitProxy, SessionState},
//!     WindowIdentifier,
//! };
//!
//! async fn run() -> xdg_portal::Result<()> {
//!     let proxy = InhibitProxy::new().await?;
//!     let identifier = WindowIdentifier::default();
//!
//!     let session = proxy.create_monitor(Some(&identifier), None).await?;
//!     let mut states = proxy.receive_state_changed(&session).await?;
//!     while let Some(state) = states.next().await {
//!         if state.session_state() == SessionState::QueryEnd {
//!             let id = proxy
//!                 .inhibit(
//!                     Some(&identifier),
//!                     InhibitFlags::Logout | InhibitFlags::UserSwitch,
//!                     "please save the opened project first",
//!                     None,
//!                 )
//!                 .await?;
//!             proxy.query_end_response(&session).await?;
//!             // later on
//!             proxy.uninhibit(id).await?;
//!             break;
//!         }
//!     }
//!     Ok(())
//! }
//! ```

use enumflags2::{bitflags, BitFlags};
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};
use zbus::zvariant::{
    as_value::{self, optional},
    ObjectPath, OwnedObjectPath, Type,
};

use super::{
    request::{close_object, BasicResponse, INTERFACE as REQUEST_INTERFACE},
    session::SessionSignal,
    HandleToken, Session, SessionType,
};
use crate::{
    proxy::Proxy, window_identifier::MaybeWindowIdentifierExt, Cancellable, Error, Portal,
    WindowIdentifier,
};

const INTERFACE: &str = "org.freedesktop.portal.Inhibit";

#[derive(Serialize, Type, Debug, Default)]
#[zvariant(signature = "dict")]
struct CreateMonitorOptions {
    #[serde(with = "as_value")]
    handle_token: HandleToken,
    #[serde(with = "as_value")]
    session_handle_token: HandleToken,
}

#[derive(Serialize, Type, Debug, Default)]
#[zvariant(signature = "dict")]
struct InhibitOptions {
    #[serde(with = "as_value")]
    handle_token: HandleToken,
    #[serde(with = "optional", skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

#[bitflags]
#[derive(Serialize_repr, Deserialize_repr, PartialEq, Eq, Debug, Clone, Copy, Type)]
#[repr(u32)]
#[doc(alias = "XdpInhibitFlags")]
/// The actions to inhibit that can end the user's session
pub enum InhibitFlags {
    #[doc(alias = "XDP_INHIBIT_FLAG_LOGOUT")]
    /// Logout.
    Logout,
    #[doc(alias = "XDP_INHIBIT_FLAG_USER_SWITCH")]
    /// User switch.
    UserSwitch,
    #[doc(alias = "XDP_INHIBIT_FLAG_SUSPEND")]
    /// Suspend.
    Suspend,
    #[doc(alias = "XDP_INHIBIT_FLAG_IDLE")]
    /// Idle.
    Idle,
}

#[derive(Debug, Deserialize, Type)]
#[zvariant(signature = "dict")]
struct State {
    #[serde(default, rename = "screensaver-active", with = "optional")]
    screensaver_active: Option<bool>,
    #[serde(default, rename = "session-state", with = "optional")]
    session_state: Option<SessionState>,
}

/// A response received when the `state_changed` signal is received.
#[derive(Debug, Deserialize, Type)]
pub struct InhibitState(OwnedObjectPath, State);

impl InhibitState {
    /// Whether screensaver is active or not.
    pub fn screensaver_active(&self) -> bool {
        self.1.screensaver_active.unwrap_or(false)
    }

    /// The session state.
    pub fn session_state(&self) -> SessionState {
        self.1.session_state.unwrap_or(SessionState::Running)
    }
}

impl SessionSignal for InhibitState {
    const INTERFACE: &'static str = INTERFACE;
    const MEMBER: &'static str = "StateChanged";

    fn session_handle(&self) -> ObjectPath<'_> {
        self.0.as_ref()
    }
}

#[derive(Serialize_repr, Deserialize_repr, PartialEq, Eq, Debug, Clone, Copy, Type)]
#[doc(alias = "XdpLoginSessionState")]
#[repr(u32)]
/// The current state of the user's session.
pub enum SessionState {
    #[doc(alias = "XDP_LOGIN_SESSION_RUNNING")]
    /// Running.
    Running = 1,
    #[doc(alias = "XDP_LOGIN_SESSION_QUERY_END")]
    /// The user asked to end the session e.g logout.
    QueryEnd = 2,
    #[doc(alias = "XDP_LOGIN_SESSION_ENDING")]
    /// The session is ending.
    Ending = 3,
}

/// The interface lets sandboxed applications inhibit the user session from
/// ending, suspending, idling or getting switched away.
///
/// Every successful [`InhibitProxy::inhibit`] hands out an identifier kept
/// in the [`Portal`] context until it is passed to
/// [`InhibitProxy::uninhibit`].
///
/// Wrapper of the DBus interface: [`org.freedesktop.portal.Inhibit`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.Inhibit.html).
#[derive(Debug)]
#[doc(alias = "org.freedesktop.portal.Inhibit")]
pub struct InhibitProxy(Proxy);

impl InhibitProxy {
    /// Create a new instance of [`InhibitProxy`].
    pub async fn new() -> Result<Self, Error> {
        let proxy = Proxy::new_desktop(INTERFACE).await?;
        Ok(Self(proxy))
    }

    /// Create a new instance of [`InhibitProxy`] on `portal`.
    pub async fn with_portal(portal: Portal) -> Result<Self, Error> {
        let proxy = Proxy::new_desktop_with_portal(portal, INTERFACE).await?;
        Ok(Self(proxy))
    }

    /// Returns the version of the portal interface.
    pub fn version(&self) -> u32 {
        self.0.version()
    }

    /// Creates a monitoring session.
    /// While this session is active, the caller will receive `state_changed`
    /// signals with updates on the session state.
    ///
    /// # Arguments
    ///
    /// * `identifier` - The application window identifier.
    ///
    /// # Specifications
    ///
    /// See also [`CreateMonitor`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.Inhibit.html#org-freedesktop-portal-inhibit-createmonitor).
    #[doc(alias = "CreateMonitor")]
    #[doc(alias = "xdp_portal_session_monitor_start")]
    pub async fn create_monitor(
        &self,
        identifier: Option<&WindowIdentifier>,
        cancellable: Option<&Cancellable>,
    ) -> Result<Session, Error> {
        let options = CreateMonitorOptions::default();
        let identifier = identifier.to_string_or_empty();
        let (pending, _) = self
            .0
            .create_session(
                SessionType::InhibitMonitor,
                &options.handle_token,
                &options.session_handle_token,
                "CreateMonitor",
                &(&identifier, &options),
                cancellable,
            )
            .await?;
        Ok(pending.finish())
    }

    /// Inhibits a session status changes.
    ///
    /// Returns the identifier to pass to [`InhibitProxy::uninhibit`].
    ///
    /// # Arguments
    ///
    /// * `identifier` - The application window identifier.
    /// * `flags` - The flags determine what changes are inhibited.
    /// * `reason` - User-visible reason for the inhibition.
    ///
    /// # Specifications
    ///
    /// See also [`Inhibit`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.Inhibit.html#org-freedesktop-portal-inhibit-inhibit).
    #[doc(alias = "Inhibit")]
    #[doc(alias = "xdp_portal_session_inhibit")]
    pub async fn inhibit(
        &self,
        identifier: Option<&WindowIdentifier>,
        flags: BitFlags<InhibitFlags>,
        reason: &str,
        cancellable: Option<&Cancellable>,
    ) -> Result<u32, Error> {
        let options = InhibitOptions {
            reason: Some(reason.to_owned()),
            ..Default::default()
        };
        let identifier = identifier.to_string_or_empty();
        let (_, path) = self
            .0
            .request_with_path::<BasicResponse>(
                &options.handle_token,
                "Inhibit",
                &(&identifier, flags, &options),
                cancellable,
            )
            .await?;
        let id = self.0.portal().register_inhibitor(path);
        #[cfg(feature = "tracing")]
        tracing::debug!("Registered inhibitor {id}");
        Ok(id)
    }

    /// Removes the inhibition identified by `id`, closing the request object
    /// that holds it.
    ///
    /// Fails with [`Error::UnknownInhibitor`] for an identifier not handed
    /// out by [`InhibitProxy::inhibit`] or already removed.
    #[doc(alias = "xdp_portal_session_uninhibit")]
    pub async fn uninhibit(&self, id: u32) -> Result<(), Error> {
        let path = self
            .0
            .portal()
            .take_inhibitor(id)
            .ok_or(Error::UnknownInhibitor(id))?;
        close_object(self.0.portal(), REQUEST_INTERFACE, &path).await;
        Ok(())
    }

    /// Signal emitted when the session state changes.
    ///
    /// The stream ends once the monitor session is closed.
    ///
    /// # Specifications
    ///
    /// See also [`StateChanged`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.Inhibit.html#org-freedesktop-portal-inhibit-statechanged).
    #[doc(alias = "StateChanged")]
    #[doc(alias = "XdpPortal::session-state-changed")]
    pub async fn receive_state_changed(
        &self,
        session: &Session,
    ) -> Result<impl Stream<Item = InhibitState> + Send + Unpin + 'static, Error> {
        session.ensure_kind(&[SessionType::InhibitMonitor])?;
        session.receive_signal::<InhibitState>().await
    }

    /// Acknowledges that the caller received the "state_changed" signal.
    /// This method should be called within one second after receiving a
    /// [`receive_state_changed()`][`InhibitProxy::receive_state_changed`]
    /// signal with the [`SessionState::QueryEnd`] state.
    ///
    /// # Arguments
    ///
    /// * `session` - A [`Session`], created with
    ///   [`create_monitor()`][`InhibitProxy::create_monitor`].
    ///
    /// # Specifications
    ///
    /// See also [`QueryEndResponse`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.Inhibit.html#org-freedesktop-portal-inhibit-queryendresponse).
    #[doc(alias = "QueryEndResponse")]
    #[doc(alias = "xdp_portal_session_monitor_query_end_response")]
    pub async fn query_end_response(&self, session: &Session) -> Result<(), Error> {
        session.ensure_kind(&[SessionType::InhibitMonitor])?;
        session.ensure_open()?;
        self.0.call("QueryEndResponse", &(session,)).await
    }
}
