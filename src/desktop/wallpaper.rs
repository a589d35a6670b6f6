//! Set a wallpaper on lockscreen, background or both.
//!
//! Wrapper of the DBus interface: [`org.freedesktop.portal.Wallpaper`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.Wallpaper.html).
//!
//! # Examples
//!
//! Sets a wallpaper from a file:
//!
//! ```rust,no_run
//! use std::{fs::File, os::fd::AsFd};
//!
//! use xdg_portal::desktop::wallpaper::{SetOn, WallpaperRequest};
//!
//! async fn run() -> xdg_portal::Result<()> {
//!     let file = File::open("/home/user/adwaita-day.jpg").unwrap();
//!     WallpaperRequest::default()
//!         .set_on(SetOn::Both)
//!         .show_preview(true)
//!         .send_file(&file.as_fd())
//!         .await?;
//!     Ok(())
//! }
//! ```
//!
//! Sets a wallpaper from a URI:
//!
//! ```rust,no_run
//! use xdg_portal::desktop::wallpaper::{SetOn, WallpaperRequest};
//!
//! async fn run() -> xdg_portal::Result<()> {
//!     let uri =
//!         url::Url::parse("file:///home/user/Downloads/adwaita-night.jpg").unwrap();
//!     WallpaperRequest::default()
//!         .set_on(SetOn::Lockscreen)
//!         .send_uri(&uri)
//!         .await?;
//!     Ok(())
//! }
//! ```

use std::{fmt, os::fd::AsFd};

use serde::{Deserialize, Serialize};
use url::Url;
use zbus::zvariant::{
    as_value::{self, optional},
    Fd, Type,
};

use super::HandleToken;
use crate::{
    proxy::Proxy, window_identifier::MaybeWindowIdentifierExt, Cancellable, Error, Portal,
    WindowIdentifier,
};

const INTERFACE: &str = "org.freedesktop.portal.Wallpaper";

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Type)]
#[zvariant(signature = "s")]
#[serde(rename_all = "lowercase")]
#[doc(alias = "XdpWallpaperFlags")]
/// Where to set the wallpaper on.
pub enum SetOn {
    /// Set the wallpaper only on the lock-screen.
    Lockscreen,
    /// Set the wallpaper only on the background.
    Background,
    /// Set the wallpaper on both lock-screen and background.
    Both,
}

impl fmt::Display for SetOn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lockscreen => f.write_str("lockscreen"),
            Self::Background => f.write_str("background"),
            Self::Both => f.write_str("both"),
        }
    }
}

#[derive(Serialize, Type, Debug, Default)]
#[zvariant(signature = "dict")]
struct WallpaperOptions {
    #[serde(with = "as_value")]
    handle_token: HandleToken,
    #[serde(
        rename = "show-preview",
        with = "optional",
        skip_serializing_if = "Option::is_none"
    )]
    show_preview: Option<bool>,
    #[serde(
        rename = "set-on",
        with = "optional",
        skip_serializing_if = "Option::is_none"
    )]
    set_on: Option<SetOn>,
}

#[derive(Debug)]
struct WallpaperProxy(Proxy);

impl WallpaperProxy {
    async fn new() -> Result<Self, Error> {
        let proxy = Proxy::new_desktop(INTERFACE).await?;
        Ok(Self(proxy))
    }

    async fn with_portal(portal: Portal) -> Result<Self, Error> {
        let proxy = Proxy::new_desktop_with_portal(portal, INTERFACE).await?;
        Ok(Self(proxy))
    }

    async fn set_wallpaper_file(
        &self,
        identifier: Option<&WindowIdentifier>,
        file: &impl AsFd,
        options: WallpaperOptions,
        cancellable: Option<&Cancellable>,
    ) -> Result<(), Error> {
        let identifier = identifier.to_string_or_empty();
        self.0
            .empty_request(
                &options.handle_token,
                "SetWallpaperFile",
                &(&identifier, Fd::from(file), &options),
                cancellable,
            )
            .await
    }

    async fn set_wallpaper_uri(
        &self,
        identifier: Option<&WindowIdentifier>,
        uri: &Url,
        options: WallpaperOptions,
        cancellable: Option<&Cancellable>,
    ) -> Result<(), Error> {
        let identifier = identifier.to_string_or_empty();
        self.0
            .empty_request(
                &options.handle_token,
                "SetWallpaperURI",
                &(&identifier, uri, &options),
                cancellable,
            )
            .await
    }
}

#[derive(Debug, Default)]
#[doc(alias = "xdp_portal_set_wallpaper")]
#[doc(alias = "org.freedesktop.portal.Wallpaper")]
/// A [builder-pattern] type to set the wallpaper.
///
/// [builder-pattern]: https://doc.rust-lang.org/1.0.0/style/ownership/builders.html
pub struct WallpaperRequest {
    identifier: Option<WindowIdentifier>,
    options: WallpaperOptions,
    cancellable: Option<Cancellable>,
    portal: Option<Portal>,
}

impl WallpaperRequest {
    #[must_use]
    /// Sets a window identifier.
    pub fn identifier(mut self, identifier: impl Into<Option<WindowIdentifier>>) -> Self {
        self.identifier = identifier.into();
        self
    }

    #[must_use]
    /// Whether to show a preview of the picture.
    /// **Note** that the portal may decide to show a preview even if this
    /// option is not set.
    pub fn show_preview(mut self, show_preview: impl Into<Option<bool>>) -> Self {
        self.options.show_preview = show_preview.into();
        self
    }

    #[must_use]
    /// Sets where to set the wallpaper on.
    pub fn set_on(mut self, set_on: impl Into<Option<SetOn>>) -> Self {
        self.options.set_on = set_on.into();
        self
    }

    #[must_use]
    /// Closes the dialog once `cancellable` is cancelled.
    pub fn cancellable(mut self, cancellable: &Cancellable) -> Self {
        self.cancellable = Some(cancellable.clone());
        self
    }

    #[must_use]
    /// Sets a portal context to use other than the global one.
    pub fn portal(mut self, portal: Option<Portal>) -> Self {
        self.portal = portal;
        self
    }

    async fn proxy(&mut self) -> Result<WallpaperProxy, Error> {
        if let Some(portal) = self.portal.take() {
            WallpaperProxy::with_portal(portal).await
        } else {
            WallpaperProxy::new().await
        }
    }

    /// Set the wallpaper from a file.
    ///
    /// # Specifications
    ///
    /// See also [`SetWallpaperFile`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.Wallpaper.html#org-freedesktop-portal-wallpaper-setwallpaperfile).
    #[doc(alias = "SetWallpaperFile")]
    pub async fn send_file(mut self, file: &impl AsFd) -> Result<(), Error> {
        let proxy = self.proxy().await?;
        proxy
            .set_wallpaper_file(
                self.identifier.as_ref(),
                file,
                self.options,
                self.cancellable.as_ref(),
            )
            .await
    }

    /// Set the wallpaper from a URI.
    ///
    /// # Specifications
    ///
    /// See also [`SetWallpaperURI`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.Wallpaper.html#org-freedesktop-portal-wallpaper-setwallpaperuri).
    #[doc(alias = "SetWallpaperURI")]
    pub async fn send_uri(mut self, uri: &Url) -> Result<(), Error> {
        let proxy = self.proxy().await?;
        proxy
            .set_wallpaper_uri(
                self.identifier.as_ref(),
                uri,
                self.options,
                self.cancellable.as_ref(),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, fs::File};

    use zbus::zvariant::{OwnedFd, OwnedValue, Value};

    use super::*;
    use crate::bus::mock::MockBus;

    #[test]
    fn set_on_names() {
        assert_eq!(SetOn::Both.to_string(), "both");
        assert_eq!(SetOn::Lockscreen.to_string(), "lockscreen");
    }

    #[tokio::test]
    async fn wallpaper_from_uri() {
        let bus = MockBus::new(":1.12");
        bus.respond(INTERFACE, "SetWallpaperURI", 0, HashMap::new());
        let uri = Url::parse("file:///usr/share/backgrounds/night.jpg").unwrap();
        WallpaperRequest::default()
            .set_on(SetOn::Background)
            .show_preview(false)
            .portal(Some(bus.portal()))
            .send_uri(&uri)
            .await
            .unwrap();

        let (parent, sent, options): (String, String, HashMap<String, OwnedValue>) =
            bus.calls("SetWallpaperURI")[0].body().deserialize().unwrap();
        assert_eq!(parent, "");
        assert_eq!(sent, uri.as_str());
        assert_eq!(*options["set-on"], Value::from("background"));
        assert_eq!(*options["show-preview"], Value::from(false));
    }

    #[tokio::test]
    async fn wallpaper_from_file_cancelled() {
        let bus = MockBus::new(":1.12");
        bus.respond(INTERFACE, "SetWallpaperFile", 1, HashMap::new());
        let file = File::open("/dev/null").unwrap();
        let err = WallpaperRequest::default()
            .portal(Some(bus.portal()))
            .send_file(&file)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());

        let (_, _fd, options): (String, OwnedFd, HashMap<String, OwnedValue>) =
            bus.calls("SetWallpaperFile")[0].body().deserialize().unwrap();
        assert!(!options.contains_key("set-on"));
    }
}
