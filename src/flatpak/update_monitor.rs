//! # Examples
//!
//! How to monitor if there's a new update and install it.
//! Only available for Flatpak applications.
//!
//! ```rust,no_run
//! use futures_util::StreamExt;
//! use xdg_portal::{
//!     flatpak::{Flatpak, UpdateStatus},
//!     WindowIdentifier,
//! };
//!
//! async fn run() -> xdg_portal::Result<()> {
//!     let proxy = Flatpak::new().await?;
//!
//!     let monitor = proxy.create_update_monitor().await?;
//!     let info = monitor.receive_update_available().await?.next().await;
//!     println!("{info:#?}");
//!
//!     let mut progress = monitor.receive_progress().await?;
//!     monitor.update(None::<&WindowIdentifier>).await?;
//!     while let Some(progress) = progress.next().await {
//!         println!("{progress:#?}");
//!         if progress.status() != Some(UpdateStatus::Running) {
//!             break;
//!         }
//!     }
//!
//!     monitor.close().await?;
//!     Ok(())
//! }
//! ```

use futures_util::Stream;
use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};
use zbus::zvariant::{as_value, OwnedObjectPath, Type};

use crate::{
    proxy::Proxy, window_identifier::MaybeWindowIdentifierExt, Error, Portal, WindowIdentifier,
};

const INTERFACE: &str = "org.freedesktop.portal.Flatpak.UpdateMonitor";

#[derive(Serialize, Type, Debug, Default)]
#[zvariant(signature = "dict")]
struct UpdateOptions {}

#[derive(Deserialize, Type, Debug)]
#[zvariant(signature = "dict")]
/// A response containing the update information when an update is available.
pub struct UpdateInfo {
    #[serde(rename = "running-commit", with = "as_value")]
    running_commit: String,
    #[serde(rename = "local-commit", with = "as_value")]
    local_commit: String,
    #[serde(rename = "remote-commit", with = "as_value")]
    remote_commit: String,
}

impl UpdateInfo {
    /// The currently running OSTree commit.
    pub fn running_commit(&self) -> &str {
        &self.running_commit
    }

    /// The locally installed OSTree commit.
    pub fn local_commit(&self) -> &str {
        &self.local_commit
    }

    /// The available commit to install.
    pub fn remote_commit(&self) -> &str {
        &self.remote_commit
    }
}

#[derive(Serialize_repr, Deserialize_repr, PartialEq, Eq, Copy, Clone, Debug, Type)]
#[repr(u32)]
/// The update status.
pub enum UpdateStatus {
    #[doc(alias = "XDP_UPDATE_STATUS_RUNNING")]
    /// Running.
    Running = 0,
    #[doc(alias = "XDP_UPDATE_STATUS_EMPTY")]
    /// No update to install.
    Empty = 1,
    #[doc(alias = "XDP_UPDATE_STATUS_DONE")]
    /// Done.
    Done = 2,
    #[doc(alias = "XDP_UPDATE_STATUS_FAILED")]
    /// Failed.
    Failed = 3,
}

#[derive(Deserialize, Type, Debug)]
#[zvariant(signature = "dict")]
/// A response of the update progress signal.
pub struct UpdateProgress {
    #[serde(default, with = "as_value::optional")]
    n_ops: Option<u32>,
    #[serde(default, with = "as_value::optional")]
    op: Option<u32>,
    #[serde(default, with = "as_value::optional")]
    progress: Option<u32>,
    #[serde(default, with = "as_value::optional")]
    status: Option<UpdateStatus>,
    #[serde(default, with = "as_value::optional")]
    error: Option<String>,
    #[serde(default, with = "as_value::optional")]
    error_message: Option<String>,
}

impl UpdateProgress {
    /// The number of operations that the update consists of.
    pub fn n_ops(&self) -> Option<u32> {
        self.n_ops
    }

    /// The position of the currently active operation.
    pub fn op(&self) -> Option<u32> {
        self.op
    }

    /// The progress of the currently active operation, as a number between 0
    /// and 100.
    pub fn progress(&self) -> Option<u32> {
        self.progress
    }

    /// The overall status of the update.
    pub fn status(&self) -> Option<UpdateStatus> {
        self.status
    }

    /// The error name, sent when status is [`UpdateStatus::Failed`].
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// The error message, sent when status is [`UpdateStatus::Failed`].
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }
}

/// The interface exposes some interactions with Flatpak on the host to the
/// sandbox. For example, it allows you to restart the applications or start a
/// more sandboxed instance.
///
/// Wrapper of the DBus interface: [`org.freedesktop.portal.Flatpak.UpdateMonitor`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.Flatpak.UpdateMonitor.html).
#[derive(Debug)]
#[doc(alias = "org.freedesktop.portal.Flatpak.UpdateMonitor")]
pub struct UpdateMonitor(Proxy);

impl UpdateMonitor {
    pub(crate) async fn new(portal: Portal, path: OwnedObjectPath) -> Result<Self, Error> {
        let proxy = Proxy::new_flatpak_with_path(portal, INTERFACE, path.to_string()).await?;
        Ok(Self(proxy))
    }

    /// The object path of the monitor.
    pub fn path(&self) -> &zbus::zvariant::ObjectPath<'static> {
        self.0.path()
    }

    /// A signal received when there's progress during the application update.
    ///
    /// # Specifications
    ///
    /// See also [`Progress`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.Flatpak.UpdateMonitor.html#org-freedesktop-portal-flatpak-updatemonitor-progress).
    #[doc(alias = "Progress")]
    #[doc(alias = "XdpPortal::update-progress")]
    pub async fn receive_progress(
        &self,
    ) -> Result<impl Stream<Item = UpdateProgress> + Send + Unpin + 'static, Error> {
        self.0.signal("Progress").await
    }

    /// A signal received when there's an application update.
    ///
    /// # Specifications
    ///
    /// See also [`UpdateAvailable`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.Flatpak.UpdateMonitor.html#org-freedesktop-portal-flatpak-updatemonitor-updateavailable).
    #[doc(alias = "UpdateAvailable")]
    #[doc(alias = "XdpPortal::update-available")]
    pub async fn receive_update_available(
        &self,
    ) -> Result<impl Stream<Item = UpdateInfo> + Send + Unpin + 'static, Error> {
        self.0.signal("UpdateAvailable").await
    }

    /// Asks to install an update of the calling app.
    ///
    /// **Note** updates are only allowed if the new version has the same
    /// permissions (or less) than the currently installed version.
    ///
    /// # Specifications
    ///
    /// See also [`Update`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.Flatpak.UpdateMonitor.html#org-freedesktop-portal-flatpak-updatemonitor-update).
    #[doc(alias = "Update")]
    #[doc(alias = "xdp_portal_update_install")]
    pub async fn update(&self, identifier: Option<&WindowIdentifier>) -> Result<(), Error> {
        let options = UpdateOptions::default();
        let identifier = identifier.to_string_or_empty();

        self.0.call::<()>("Update", &(&identifier, &options)).await
    }

    /// Ends the update monitoring and cancels any ongoing installation.
    ///
    /// # Specifications
    ///
    /// See also [`Close`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.Flatpak.UpdateMonitor.html#org-freedesktop-portal-flatpak-updatemonitor-close).
    #[doc(alias = "Close")]
    pub async fn close(&self) -> Result<(), Error> {
        self.0.call::<()>("Close", &()).await
    }
}
