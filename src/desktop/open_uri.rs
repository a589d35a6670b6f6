//! Open a URI or a directory.
//!
//! Wrapper of the DBus interface: [`org.freedesktop.portal.OpenURI`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.OpenURI.html).
//!
//! # Examples
//!
//! ## Open a file
//!
//! ```rust,no_run
//! use std::{fs::File, os::fd::AsFd};
//!
//! use xdg_portal::desktop::open_uri::OpenFileRequest;
//!
//! async fn run() -> xdg_portal::Result<()> {
//!     let file = File::open("/home/user/adwaita-day.jpg").unwrap();
//!     OpenFileRequest::default()
//!         .ask(true)
//!         .send_file(&file.as_fd())
//!         .await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Open a file from a URI
//!
//! ```rust,no_run
//! use xdg_portal::desktop::open_uri::OpenFileRequest;
//!
//! async fn run() -> xdg_portal::Result<()> {
//!     let uri = url::Url::parse("file:///home/user/Downloads/adwaita-night.jpg").unwrap();
//!     OpenFileRequest::default().ask(true).send_uri(&uri).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Open a directory
//!
//! ```rust,no_run
//! use std::{fs::File, os::fd::AsFd};
//!
//! use xdg_portal::desktop::open_uri::OpenDirectoryRequest;
//!
//! async fn run() -> xdg_portal::Result<()> {
//!     let directory = File::open("/home/user/Downloads").unwrap();
//!     OpenDirectoryRequest::default()
//!         .send(&directory.as_fd())
//!         .await?;
//!     Ok(())
//! }
//! ```

use std::os::fd::AsFd;

use serde::Serialize;
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

const INTERFACE: &str = "org.freedesktop.portal.OpenURI";

#[derive(Serialize, Type, Debug, Default)]
#[zvariant(signature = "dict")]
struct OpenDirOptions {
    #[serde(with = "as_value")]
    handle_token: HandleToken,
    #[serde(with = "optional", skip_serializing_if = "Option::is_none")]
    activation_token: Option<String>,
}

#[derive(Serialize, Type, Debug, Default)]
#[zvariant(signature = "dict")]
struct OpenFileOptions {
    #[serde(with = "as_value")]
    handle_token: HandleToken,
    #[serde(with = "optional", skip_serializing_if = "Option::is_none")]
    writeable: Option<bool>,
    #[serde(with = "optional", skip_serializing_if = "Option::is_none")]
    ask: Option<bool>,
    #[serde(with = "optional", skip_serializing_if = "Option::is_none")]
    activation_token: Option<String>,
}

#[derive(Debug)]
#[doc(alias = "org.freedesktop.portal.OpenURI")]
struct OpenURIProxy(Proxy);

impl OpenURIProxy {
    async fn new() -> Result<Self, Error> {
        let proxy = Proxy::new_desktop(INTERFACE).await?;
        Ok(Self(proxy))
    }

    async fn with_portal(portal: Portal) -> Result<Self, Error> {
        let proxy = Proxy::new_desktop_with_portal(portal, INTERFACE).await?;
        Ok(Self(proxy))
    }

    async fn open_directory(
        &self,
        identifier: Option<&WindowIdentifier>,
        directory: &impl AsFd,
        options: OpenDirOptions,
        cancellable: Option<&Cancellable>,
    ) -> Result<(), Error> {
        let identifier = identifier.to_string_or_empty();
        self.0
            .empty_request(
                &options.handle_token,
                "OpenDirectory",
                &(&identifier, Fd::from(directory), &options),
                cancellable,
            )
            .await
    }

    async fn open_file(
        &self,
        identifier: Option<&WindowIdentifier>,
        file: &impl AsFd,
        options: OpenFileOptions,
        cancellable: Option<&Cancellable>,
    ) -> Result<(), Error> {
        let identifier = identifier.to_string_or_empty();
        self.0
            .empty_request(
                &options.handle_token,
                "OpenFile",
                &(&identifier, Fd::from(file), &options),
                cancellable,
            )
            .await
    }

    async fn open_uri(
        &self,
        identifier: Option<&WindowIdentifier>,
        uri: &Url,
        options: OpenFileOptions,
        cancellable: Option<&Cancellable>,
    ) -> Result<(), Error> {
        let identifier = identifier.to_string_or_empty();
        self.0
            .empty_request(
                &options.handle_token,
                "OpenURI",
                &(&identifier, uri, &options),
                cancellable,
            )
            .await
    }
}

#[derive(Debug, Default)]
#[doc(alias = "xdp_portal_open_uri")]
/// A [builder-pattern] type to open a file.
///
/// [builder-pattern]: https://doc.rust-lang.org/1.0.0/style/ownership/builders.html
pub struct OpenFileRequest {
    identifier: Option<WindowIdentifier>,
    options: OpenFileOptions,
    cancellable: Option<Cancellable>,
    portal: Option<Portal>,
}

impl OpenFileRequest {
    #[must_use]
    /// Sets a window identifier.
    pub fn identifier(mut self, identifier: impl Into<Option<WindowIdentifier>>) -> Self {
        self.identifier = identifier.into();
        self
    }

    #[must_use]
    /// Whether the file should be writeable or not.
    pub fn writeable(mut self, writeable: impl Into<Option<bool>>) -> Self {
        self.options.writeable = writeable.into();
        self
    }

    #[must_use]
    /// Whether to always ask the user which application to use or not.
    pub fn ask(mut self, ask: impl Into<Option<bool>>) -> Self {
        self.options.ask = ask.into();
        self
    }

    /// Sets the token that can be used to activate the chosen application.
    #[must_use]
    pub fn activation_token<'a>(mut self, activation_token: impl Into<Option<&'a str>>) -> Self {
        self.options.activation_token = activation_token.into().map(ToOwned::to_owned);
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

    async fn proxy(&mut self) -> Result<OpenURIProxy, Error> {
        if let Some(portal) = self.portal.take() {
            OpenURIProxy::with_portal(portal).await
        } else {
            OpenURIProxy::new().await
        }
    }

    /// Send the request for a file.
    pub async fn send_file(mut self, file: &impl AsFd) -> Result<(), Error> {
        let proxy = self.proxy().await?;
        proxy
            .open_file(
                self.identifier.as_ref(),
                file,
                self.options,
                self.cancellable.as_ref(),
            )
            .await
    }

    /// Send the request for a URI.
    pub async fn send_uri(mut self, uri: &Url) -> Result<(), Error> {
        let proxy = self.proxy().await?;
        proxy
            .open_uri(
                self.identifier.as_ref(),
                uri,
                self.options,
                self.cancellable.as_ref(),
            )
            .await
    }
}

#[derive(Debug, Default)]
#[doc(alias = "xdp_portal_open_directory")]
/// A [builder-pattern] type to open a directory.
///
/// [builder-pattern]: https://doc.rust-lang.org/1.0.0/style/ownership/builders.html
pub struct OpenDirectoryRequest {
    identifier: Option<WindowIdentifier>,
    options: OpenDirOptions,
    cancellable: Option<Cancellable>,
    portal: Option<Portal>,
}

impl OpenDirectoryRequest {
    #[must_use]
    /// Sets a window identifier.
    pub fn identifier(mut self, identifier: impl Into<Option<WindowIdentifier>>) -> Self {
        self.identifier = identifier.into();
        self
    }

    /// Sets the token that can be used to activate the chosen application.
    #[must_use]
    pub fn activation_token<'a>(mut self, activation_token: impl Into<Option<&'a str>>) -> Self {
        self.options.activation_token = activation_token.into().map(ToOwned::to_owned);
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

    /// Send the request.
    pub async fn send(self, directory: &impl AsFd) -> Result<(), Error> {
        let proxy = if let Some(portal) = self.portal {
            OpenURIProxy::with_portal(portal).await?
        } else {
            OpenURIProxy::new().await?
        };
        proxy
            .open_directory(
                self.identifier.as_ref(),
                directory,
                self.options,
                self.cancellable.as_ref(),
            )
            .await
    }
}
