//! # Examples
//!
//! ```rust,no_run
//! use std::{fs::File, os::fd::AsFd};
//!
//! use xdg_portal::desktop::trash;
//!
//! async fn run() -> xdg_portal::Result<()> {
//!     let file = File::open("/home/user/adwaita-night.jpg").unwrap();
//!     if !trash::trash_file(&file.as_fd()).await? {
//!         println!("the file was not trashed");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! Or by using the Proxy directly
//!
//! ```rust,no_run
//! use std::fs::File;
//!
//! use xdg_portal::desktop::trash::TrashProxy;
//!
//! async fn run() -> xdg_portal::Result<()> {
//!     let file = File::open("/home/user/Downloads/adwaita-night.jpg").unwrap();
//!     let proxy = TrashProxy::new().await?;
//!     proxy.trash_file(&file).await?;
//!     Ok(())
//! }
//! ```

use std::os::fd::AsFd;

use serde_repr::{Deserialize_repr, Serialize_repr};
use zbus::zvariant::{Fd, Type};

use crate::{proxy::Proxy, Error, Portal};

const INTERFACE: &str = "org.freedesktop.portal.Trash";

#[derive(Serialize_repr, Deserialize_repr, PartialEq, Eq, Clone, Copy, Hash, Debug, Type)]
#[repr(u32)]
enum TrashStatus {
    Failed = 0,
    Succeeded = 1,
}

/// The interface lets sandboxed applications send files to the trashcan.
///
/// Wrapper of the DBus interface: [`org.freedesktop.portal.Trash`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.Trash.html).
#[derive(Debug)]
#[doc(alias = "org.freedesktop.portal.Trash")]
pub struct TrashProxy(Proxy);

impl TrashProxy {
    /// Create a new instance of [`TrashProxy`].
    pub async fn new() -> Result<Self, Error> {
        let proxy = Proxy::new_desktop(INTERFACE).await?;
        Ok(Self(proxy))
    }

    /// Create a new instance of [`TrashProxy`] on `portal`.
    pub async fn with_portal(portal: Portal) -> Result<Self, Error> {
        let proxy = Proxy::new_desktop_with_portal(portal, INTERFACE).await?;
        Ok(Self(proxy))
    }

    /// Returns the version of the portal interface.
    pub fn version(&self) -> u32 {
        self.0.version()
    }

    /// Sends a file to the trashcan.
    /// Applications are allowed to trash a file if they can open it in
    /// read/write mode.
    ///
    /// Returns whether the file was moved to the trash.
    ///
    /// # Arguments
    ///
    /// * `fd` - The file descriptor.
    ///
    /// # Specifications
    ///
    /// See also [`TrashFile`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.Trash.html#org-freedesktop-portal-trash-trashfile).
    #[doc(alias = "TrashFile")]
    pub async fn trash_file(&self, fd: &impl AsFd) -> Result<bool, Error> {
        let status = self
            .0
            .call::<TrashStatus>("TrashFile", &(Fd::from(fd),))
            .await?;
        #[cfg(feature = "tracing")]
        if status == TrashStatus::Failed {
            tracing::warn!("The portal failed to trash the file");
        }
        Ok(status == TrashStatus::Succeeded)
    }
}

#[doc(alias = "xdp_portal_trash_file")]
/// A handy wrapper around [`TrashProxy::trash_file`].
pub async fn trash_file(fd: &impl AsFd) -> Result<bool, Error> {
    let proxy = TrashProxy::new().await?;
    proxy.trash_file(fd).await
}

#[cfg(test)]
mod tests {
    use std::fs::File;

    use zbus::zvariant::OwnedFd;

    use super::*;
    use crate::bus::mock::{MockBus, Reply};

    #[tokio::test]
    async fn trash_file() {
        let bus = MockBus::new(":1.11");
        bus.script(INTERFACE, "TrashFile", Reply::U32(1));
        let proxy = TrashProxy::with_portal(bus.portal()).await.unwrap();
        let file = File::open("/dev/null").unwrap();
        assert!(proxy.trash_file(&file).await.unwrap());
        let (_fd,): (OwnedFd,) = bus.calls("TrashFile")[0].body().deserialize().unwrap();

        bus.script(INTERFACE, "TrashFile", Reply::U32(0));
        assert!(!proxy.trash_file(&file).await.unwrap());
    }

    #[tokio::test]
    async fn trash_failure_is_a_portal_error() {
        let bus = MockBus::new(":1.11");
        bus.script(INTERFACE, "TrashFile", Reply::Fail("no access"));
        let proxy = TrashProxy::with_portal(bus.portal()).await.unwrap();
        let file = File::open("/dev/null").unwrap();
        assert!(matches!(
            proxy.trash_file(&file).await,
            Err(Error::Portal(_))
        ));
    }
}
