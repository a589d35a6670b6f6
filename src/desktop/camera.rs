//! Check if a camera is available, request access to it and open a PipeWire
//! remote stream.
//!
//! Wrapper of the DBus interface: [`org.freedesktop.portal.Camera`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.Camera.html).
//!
//! ### Examples
//!
//! ```rust,no_run
//! use xdg_portal::desktop::camera::Camera;
//!
//! async fn run() -> xdg_portal::Result<()> {
//!     let camera = Camera::new().await?;
//!     if camera.is_present().await? {
//!         camera.request_access(None).await?;
//!         let remote_fd = camera.open_pipe_wire_remote().await?;
//!         // pass the remote fd to GStreamer for example
//!     }
//!     Ok(())
//! }
//! ```

use std::{collections::HashMap, os::fd::OwnedFd};

use serde::Serialize;
use zbus::zvariant::{self, as_value, Type, Value};

use super::HandleToken;
use crate::{proxy::Proxy, Cancellable, Error, Portal};

const INTERFACE: &str = "org.freedesktop.portal.Camera";

#[derive(Serialize, Type, Debug, Default)]
#[zvariant(signature = "dict")]
struct CameraAccessOptions {
    #[serde(with = "as_value")]
    handle_token: HandleToken,
}

/// The interface lets sandboxed applications access camera devices, such as
/// web cams.
///
/// Wrapper of the DBus interface: [`org.freedesktop.portal.Camera`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.Camera.html).
#[derive(Debug)]
#[doc(alias = "org.freedesktop.portal.Camera")]
pub struct Camera(Proxy);

impl Camera {
    /// Create a new instance of [`Camera`].
    pub async fn new() -> Result<Self, Error> {
        let proxy = Proxy::new_desktop(INTERFACE).await?;
        Ok(Self(proxy))
    }

    /// Create a new instance of [`Camera`] on `portal`.
    pub async fn with_portal(portal: Portal) -> Result<Self, Error> {
        let proxy = Proxy::new_desktop_with_portal(portal, INTERFACE).await?;
        Ok(Self(proxy))
    }

    /// Requests an access to the camera.
    ///
    /// # Specifications
    ///
    /// See also [`AccessCamera`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.Camera.html#org-freedesktop-portal-camera-accesscamera).
    #[doc(alias = "AccessCamera")]
    #[doc(alias = "xdp_portal_access_camera")]
    pub async fn request_access(&self, cancellable: Option<&Cancellable>) -> Result<(), Error> {
        let options = CameraAccessOptions::default();
        self.0
            .empty_request(&options.handle_token, "AccessCamera", &(&options,), cancellable)
            .await
    }

    /// Open a file descriptor to the PipeWire remote where the camera nodes
    /// are available.
    ///
    /// # Returns
    ///
    /// File descriptor of an open PipeWire remote.
    ///
    /// # Specifications
    ///
    /// See also [`OpenPipeWireRemote`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.Camera.html#org-freedesktop-portal-camera-openpipewireremote).
    #[doc(alias = "OpenPipeWireRemote")]
    #[doc(alias = "xdp_portal_open_pipewire_remote_for_camera")]
    pub async fn open_pipe_wire_remote(&self) -> Result<OwnedFd, Error> {
        // `options` is reserved for future use.
        let options: HashMap<&str, Value<'_>> = HashMap::new();
        let fd = self
            .0
            .call::<zvariant::OwnedFd>("OpenPipeWireRemote", &(options,))
            .await?;
        Ok(fd.into())
    }

    /// A boolean stating whether there is any cameras available.
    ///
    /// # Specifications
    ///
    /// See also [`IsCameraPresent`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.Camera.html#org-freedesktop-portal-camera-iscamerapresent).
    #[doc(alias = "IsCameraPresent")]
    #[doc(alias = "xdp_portal_is_camera_present")]
    pub async fn is_present(&self) -> Result<bool, Error> {
        self.0.property("IsCameraPresent").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::mock::MockBus;

    #[tokio::test]
    async fn presence_and_access() {
        let bus = MockBus::new(":1.5");
        bus.set_property(INTERFACE, "IsCameraPresent", Value::from(true));
        let camera = Camera::with_portal(bus.portal()).await.unwrap();
        assert!(camera.is_present().await.unwrap());

        bus.respond(INTERFACE, "AccessCamera", 0, HashMap::new());
        camera.request_access(None).await.unwrap();

        bus.respond(INTERFACE, "AccessCamera", 1, HashMap::new());
        assert!(camera.request_access(None).await.unwrap_err().is_cancelled());
    }
}
