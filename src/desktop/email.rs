//! Compose an email.
//!
//! Wrapper of the DBus interface: [`org.freedesktop.portal.Email`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.Email.html).
//!
//! # Examples
//!
//! Compose an email
//!
//! ```rust,no_run
//! use std::{fs::File, os::fd::OwnedFd};
//!
//! use xdg_portal::desktop::email::EmailRequest;
//!
//! async fn run() -> xdg_portal::Result<()> {
//!     let file = File::open("/home/user/Downloads/adwaita-night.jpg").unwrap();
//!     EmailRequest::default()
//!         .address("test@gmail.com")
//!         .subject("email subject")
//!         .body("the pre-filled email body")
//!         .attach(OwnedFd::from(file))
//!         .send()
//!         .await?;
//!     Ok(())
//! }
//! ```

use std::os::fd::OwnedFd;

use serde::Serialize;
use zbus::zvariant::{
    self,
    as_value::{self, optional},
    Type,
};

use super::HandleToken;
use crate::{
    proxy::Proxy, window_identifier::MaybeWindowIdentifierExt, Cancellable, Error, Portal,
    WindowIdentifier,
};

const INTERFACE: &str = "org.freedesktop.portal.Email";

#[derive(Serialize, Type, Debug, Default)]
#[zvariant(signature = "dict")]
struct EmailOptions {
    #[serde(with = "as_value")]
    handle_token: HandleToken,
    #[serde(with = "optional", skip_serializing_if = "Option::is_none")]
    address: Option<String>,
    #[serde(with = "optional", skip_serializing_if = "Option::is_none")]
    addresses: Option<Vec<String>>,
    #[serde(with = "optional", skip_serializing_if = "Option::is_none")]
    cc: Option<Vec<String>>,
    #[serde(with = "optional", skip_serializing_if = "Option::is_none")]
    bcc: Option<Vec<String>>,
    #[serde(with = "optional", skip_serializing_if = "Option::is_none")]
    subject: Option<String>,
    #[serde(with = "optional", skip_serializing_if = "Option::is_none")]
    body: Option<String>,
    #[serde(with = "optional", skip_serializing_if = "Option::is_none")]
    attachment_fds: Option<Vec<zvariant::OwnedFd>>,
    #[serde(with = "optional", skip_serializing_if = "Option::is_none")]
    activation_token: Option<String>,
}

#[derive(Debug)]
#[doc(alias = "org.freedesktop.portal.Email")]
struct EmailProxy(Proxy);

impl EmailProxy {
    pub async fn new() -> Result<EmailProxy, Error> {
        let proxy = Proxy::new_desktop(INTERFACE).await?;
        Ok(Self(proxy))
    }

    pub async fn with_portal(portal: Portal) -> Result<EmailProxy, Error> {
        let proxy = Proxy::new_desktop_with_portal(portal, INTERFACE).await?;
        Ok(Self(proxy))
    }

    /// Presents a window that lets the user compose an email.
    ///
    /// **Note** the default email client for the host will need to support
    /// `mailto:` URIs following RFC 2368.
    ///
    /// # Specifications
    ///
    /// See also [`ComposeEmail`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.Email.html#org-freedesktop-portal-email-composeemail).
    #[doc(alias = "ComposeEmail")]
    pub async fn compose(
        &self,
        identifier: Option<&WindowIdentifier>,
        options: EmailOptions,
        cancellable: Option<&Cancellable>,
    ) -> Result<(), Error> {
        let identifier = identifier.to_string_or_empty();
        self.0
            .empty_request(
                &options.handle_token,
                "ComposeEmail",
                &(&identifier, &options),
                cancellable,
            )
            .await
    }
}

#[derive(Debug, Default)]
#[doc(alias = "xdp_portal_compose_email")]
/// A [builder-pattern] type to compose an email.
///
/// [builder-pattern]: https://doc.rust-lang.org/1.0.0/style/ownership/builders.html
pub struct EmailRequest {
    identifier: Option<WindowIdentifier>,
    options: EmailOptions,
    cancellable: Option<Cancellable>,
    portal: Option<Portal>,
}

fn to_owned_list<P: IntoIterator<Item = I>, I: AsRef<str>>(list: Option<P>) -> Option<Vec<String>> {
    list.map(|a| a.into_iter().map(|s| s.as_ref().to_owned()).collect())
}

impl EmailRequest {
    /// Sets a window identifier.
    #[must_use]
    pub fn identifier(mut self, identifier: impl Into<Option<WindowIdentifier>>) -> Self {
        self.identifier = identifier.into();
        self
    }

    /// Sets the email address to send the email to.
    #[must_use]
    pub fn address<'a>(mut self, address: impl Into<Option<&'a str>>) -> Self {
        self.options.address = address.into().map(ToOwned::to_owned);
        self
    }

    /// Sets a list of email addresses to send the email to.
    #[must_use]
    pub fn addresses<P: IntoIterator<Item = I>, I: AsRef<str>>(
        mut self,
        addresses: impl Into<Option<P>>,
    ) -> Self {
        self.options.addresses = to_owned_list(addresses.into());
        self
    }

    /// Sets a list of email addresses to BCC.
    #[must_use]
    pub fn bcc<P: IntoIterator<Item = I>, I: AsRef<str>>(mut self, bcc: impl Into<Option<P>>) -> Self {
        self.options.bcc = to_owned_list(bcc.into());
        self
    }

    /// Sets a list of email addresses to CC.
    #[must_use]
    pub fn cc<P: IntoIterator<Item = I>, I: AsRef<str>>(mut self, cc: impl Into<Option<P>>) -> Self {
        self.options.cc = to_owned_list(cc.into());
        self
    }

    /// Sets the email subject.
    #[must_use]
    pub fn subject<'a>(mut self, subject: impl Into<Option<&'a str>>) -> Self {
        self.options.subject = subject.into().map(ToOwned::to_owned);
        self
    }

    /// Sets the email body.
    #[must_use]
    pub fn body<'a>(mut self, body: impl Into<Option<&'a str>>) -> Self {
        self.options.body = body.into().map(ToOwned::to_owned);
        self
    }

    /// Attaches a file to the email.
    #[must_use]
    pub fn attach(mut self, attachment: OwnedFd) -> Self {
        self.add_attachment(attachment);
        self
    }

    /// A different variant of [`Self::attach`].
    pub fn add_attachment(&mut self, attachment: OwnedFd) {
        self.options
            .attachment_fds
            .get_or_insert_with(Vec::new)
            .push(zvariant::OwnedFd::from(attachment));
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
    pub async fn send(self) -> Result<(), Error> {
        let proxy = if let Some(portal) = self.portal {
            EmailProxy::with_portal(portal).await?
        } else {
            EmailProxy::new().await?
        };
        proxy
            .compose(
                self.identifier.as_ref(),
                self.options,
                self.cancellable.as_ref(),
            )
            .await
    }
}
