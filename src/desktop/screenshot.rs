//! Take a screenshot or pick a color.
//!
//! Wrapper of the DBus interface: [`org.freedesktop.portal.Screenshot`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.Screenshot.html).
//!
//! # Examples
//!
//! ## Taking a screenshot
//!
//! ```rust,no_run
//! use xdg_portal::desktop::screenshot::Screenshot;
//!
//! async fn run() -> xdg_portal::Result<()> {
//!     let response = Screenshot::request()
//!         .interactive(true)
//!         .modal(true)
//!         .send()
//!         .await?;
//!     println!("URI: {}", response.uri());
//!     Ok(())
//! }
//! ```
//!
//! ## Picking a color
//!
//! ```rust,no_run
//! use xdg_portal::desktop::Color;
//!
//! async fn run() -> xdg_portal::Result<()> {
//!     let color = Color::pick().send().await?;
//!     println!("({}, {}, {})", color.red(), color.green(), color.blue());
//!
//!     Ok(())
//! }
//! ```

use serde::{Deserialize, Serialize};
use zbus::zvariant::{
    as_value::{self, optional},
    Type,
};

use super::{Color, HandleToken, ResponseError};
use crate::{
    proxy::Proxy, window_identifier::MaybeWindowIdentifierExt, Cancellable, Error, Portal,
    WindowIdentifier,
};

const INTERFACE: &str = "org.freedesktop.portal.Screenshot";

#[derive(Serialize, Type, Debug, Default)]
#[zvariant(signature = "dict")]
struct ScreenshotOptions {
    #[serde(with = "as_value")]
    handle_token: HandleToken,
    #[serde(with = "optional", skip_serializing_if = "Option::is_none")]
    modal: Option<bool>,
    #[serde(with = "optional", skip_serializing_if = "Option::is_none")]
    interactive: Option<bool>,
}

#[derive(Deserialize, Type, Debug)]
#[zvariant(signature = "dict")]
struct ScreenshotResponse {
    #[serde(default, with = "optional")]
    uri: Option<url::Url>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// The response of a [`ScreenshotRequest`] request.
pub struct Screenshot {
    uri: url::Url,
}

impl Screenshot {
    /// Creates a new builder-pattern struct instance to construct
    /// [`Screenshot`].
    ///
    /// This method returns an instance of [`ScreenshotRequest`].
    pub fn request() -> ScreenshotRequest {
        ScreenshotRequest::default()
    }

    /// The screenshot URI.
    pub fn uri(&self) -> &url::Url {
        &self.uri
    }
}

#[derive(Serialize, Type, Debug, Default)]
#[zvariant(signature = "dict")]
struct ColorOptions {
    #[serde(with = "as_value")]
    handle_token: HandleToken,
}

#[derive(Deserialize, Type, Debug)]
#[zvariant(signature = "dict")]
struct ColorResponse {
    #[serde(default, with = "optional")]
    color: Option<(f64, f64, f64)>,
}

impl Color {
    /// Creates a new builder-pattern struct instance to construct
    /// [`Color`].
    ///
    /// This method returns an instance of [`ColorRequest`].
    pub fn pick() -> ColorRequest {
        ColorRequest::default()
    }
}

#[derive(Debug)]
#[doc(alias = "org.freedesktop.portal.Screenshot")]
struct ScreenshotProxy(Proxy);

impl ScreenshotProxy {
    async fn new() -> Result<Self, Error> {
        let proxy = Proxy::new_desktop(INTERFACE).await?;
        Ok(Self(proxy))
    }

    async fn with_portal(portal: Portal) -> Result<Self, Error> {
        let proxy = Proxy::new_desktop_with_portal(portal, INTERFACE).await?;
        Ok(Self(proxy))
    }

    /// Obtains the color of a single pixel.
    ///
    /// See also [`PickColor`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.Screenshot.html#org-freedesktop-portal-screenshot-pickcolor).
    #[doc(alias = "PickColor")]
    #[doc(alias = "xdp_portal_pick_color")]
    async fn pick_color(
        &self,
        identifier: Option<&WindowIdentifier>,
        options: ColorOptions,
        cancellable: Option<&Cancellable>,
    ) -> Result<Color, Error> {
        let identifier = identifier.to_string_or_empty();
        let response = self
            .0
            .request::<ColorResponse>(
                &options.handle_token,
                "PickColor",
                &(&identifier, &options),
                cancellable,
            )
            .await?;
        let color = response
            .color
            .ok_or(ResponseError::ProtocolViolation("color"))?;
        Ok(Color::from(color))
    }

    /// Takes a screenshot.
    ///
    /// See also [`Screenshot`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.Screenshot.html#org-freedesktop-portal-screenshot-screenshot).
    #[doc(alias = "Screenshot")]
    #[doc(alias = "xdp_portal_take_screenshot")]
    async fn screenshot(
        &self,
        identifier: Option<&WindowIdentifier>,
        options: ScreenshotOptions,
        cancellable: Option<&Cancellable>,
    ) -> Result<Screenshot, Error> {
        let identifier = identifier.to_string_or_empty();
        let response = self
            .0
            .request::<ScreenshotResponse>(
                &options.handle_token,
                "Screenshot",
                &(&identifier, &options),
                cancellable,
            )
            .await?;
        let uri = response
            .uri
            .ok_or(ResponseError::ProtocolViolation("uri"))?;
        Ok(Screenshot { uri })
    }
}

#[derive(Debug, Default)]
#[doc(alias = "xdp_portal_pick_color")]
/// A [builder-pattern] type to construct [`Color`].
///
/// [builder-pattern]: https://doc.rust-lang.org/1.0.0/style/ownership/builders.html
pub struct ColorRequest {
    identifier: Option<WindowIdentifier>,
    options: ColorOptions,
    cancellable: Option<Cancellable>,
    portal: Option<Portal>,
}

impl ColorRequest {
    #[must_use]
    /// Sets a window identifier.
    pub fn identifier(mut self, identifier: impl Into<Option<WindowIdentifier>>) -> Self {
        self.identifier = identifier.into();
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

    /// Build the [`Color`].
    pub async fn send(self) -> Result<Color, Error> {
        let proxy = if let Some(portal) = self.portal {
            ScreenshotProxy::with_portal(portal).await?
        } else {
            ScreenshotProxy::new().await?
        };
        proxy
            .pick_color(
                self.identifier.as_ref(),
                self.options,
                self.cancellable.as_ref(),
            )
            .await
    }
}

#[derive(Debug, Default)]
#[doc(alias = "xdp_portal_take_screenshot")]
/// A [builder-pattern] type to take a screenshot.
///
/// [builder-pattern]: https://doc.rust-lang.org/1.0.0/style/ownership/builders.html
pub struct ScreenshotRequest {
    options: ScreenshotOptions,
    identifier: Option<WindowIdentifier>,
    cancellable: Option<Cancellable>,
    portal: Option<Portal>,
}

impl ScreenshotRequest {
    #[must_use]
    /// Sets a window identifier.
    pub fn identifier(mut self, identifier: impl Into<Option<WindowIdentifier>>) -> Self {
        self.identifier = identifier.into();
        self
    }

    #[must_use]
    /// Sets whether the dialog should be a modal.
    pub fn modal(mut self, modal: impl Into<Option<bool>>) -> Self {
        self.options.modal = modal.into();
        self
    }

    #[must_use]
    /// Sets whether the dialog should offer customization before a
    /// screenshot or not.
    pub fn interactive(mut self, interactive: impl Into<Option<bool>>) -> Self {
        self.options.interactive = interactive.into();
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

    /// Build the [`Screenshot`].
    pub async fn send(self) -> Result<Screenshot, Error> {
        let proxy = if let Some(portal) = self.portal {
            ScreenshotProxy::with_portal(portal).await?
        } else {
            ScreenshotProxy::new().await?
        };
        proxy
            .screenshot(
                self.identifier.as_ref(),
                self.options,
                self.cancellable.as_ref(),
            )
            .await
    }
}
