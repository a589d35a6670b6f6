//! Access to the current logged user information such as the id, name
//! or their avatar uri.
//!
//! Wrapper of the DBus interface: [`org.freedesktop.portal.Account`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.Account.html).
//!
//! ### Examples
//!
//! ```rust, no_run
//! use xdg_portal::desktop::account::UserInformation;
//!
//! async fn run() -> xdg_portal::Result<()> {
//!     let response = UserInformation::request()
//!         .reason("App would like to access user information")
//!         .send()
//!         .await?;
//!
//!     println!("Name: {}", response.name());
//!     println!("ID: {}", response.id());
//!
//!     Ok(())
//! }
//! ```

use serde::{Deserialize, Serialize};
use zbus::zvariant::{as_value, Type};

use super::{HandleToken, ResponseError};
use crate::{
    proxy::Proxy, window_identifier::MaybeWindowIdentifierExt, Cancellable, Error, Portal,
    WindowIdentifier,
};

const INTERFACE: &str = "org.freedesktop.portal.Account";

#[derive(Serialize, Type, Debug, Default)]
#[zvariant(signature = "dict")]
struct UserInformationOptions {
    #[serde(with = "as_value")]
    handle_token: HandleToken,
    #[serde(with = "as_value::optional", skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

#[derive(Deserialize, Type, Debug)]
#[zvariant(signature = "dict")]
struct UserInformationResponse {
    #[serde(default, with = "as_value::optional")]
    id: Option<String>,
    #[serde(default, with = "as_value::optional")]
    name: Option<String>,
    #[serde(default, with = "as_value::optional")]
    image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// The response of a [`UserInformationRequest`] request.
pub struct UserInformation {
    id: String,
    name: String,
    image: Option<url::Url>,
}

impl UserInformation {
    /// User identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// User name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// User image uri, if the user has one.
    pub fn image(&self) -> Option<&url::Url> {
        self.image.as_ref()
    }

    /// Creates a new builder-pattern struct instance to construct
    /// [`UserInformation`].
    ///
    /// This method returns an instance of [`UserInformationRequest`].
    pub fn request() -> UserInformationRequest {
        UserInformationRequest::default()
    }
}

impl TryFrom<UserInformationResponse> for UserInformation {
    type Error = ResponseError;

    fn try_from(response: UserInformationResponse) -> Result<Self, Self::Error> {
        Ok(Self {
            id: response.id.ok_or(ResponseError::ProtocolViolation("id"))?,
            name: response.name.ok_or(ResponseError::ProtocolViolation("name"))?,
            // Users without an avatar get an empty string.
            image: response
                .image
                .filter(|image| !image.is_empty())
                .and_then(|image| url::Url::parse(&image).ok()),
        })
    }
}

struct AccountProxy(Proxy);

impl AccountProxy {
    pub async fn new() -> Result<Self, Error> {
        let proxy = Proxy::new_desktop(INTERFACE).await?;
        Ok(Self(proxy))
    }

    pub async fn with_portal(portal: Portal) -> Result<Self, Error> {
        let proxy = Proxy::new_desktop_with_portal(portal, INTERFACE).await?;
        Ok(Self(proxy))
    }

    #[doc(alias = "GetUserInformation")]
    pub async fn user_information(
        &self,
        identifier: Option<&WindowIdentifier>,
        options: UserInformationOptions,
        cancellable: Option<&Cancellable>,
    ) -> Result<UserInformation, Error> {
        let identifier = identifier.to_string_or_empty();
        let response = self
            .0
            .request::<UserInformationResponse>(
                &options.handle_token,
                "GetUserInformation",
                (&identifier, &options),
                cancellable,
            )
            .await?;
        Ok(UserInformation::try_from(response)?)
    }
}

#[doc(alias = "xdp_portal_get_user_information")]
#[doc(alias = "org.freedesktop.portal.Account")]
#[derive(Debug, Default)]
/// A [builder-pattern] type to construct [`UserInformation`].
///
/// [builder-pattern]: https://doc.rust-lang.org/1.0.0/style/ownership/builders.html
pub struct UserInformationRequest {
    options: UserInformationOptions,
    identifier: Option<WindowIdentifier>,
    cancellable: Option<Cancellable>,
    portal: Option<Portal>,
}

impl UserInformationRequest {
    #[must_use]
    /// Sets a user-visible reason for the request.
    pub fn reason<'a>(mut self, reason: impl Into<Option<&'a str>>) -> Self {
        self.options.reason = reason.into().map(ToOwned::to_owned);
        self
    }

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

    /// Build the [`UserInformation`].
    pub async fn send(self) -> Result<UserInformation, Error> {
        let proxy = if let Some(portal) = self.portal {
            AccountProxy::with_portal(portal).await?
        } else {
            AccountProxy::new().await?
        };
        proxy
            .user_information(
                self.identifier.as_ref(),
                self.options,
                self.cancellable.as_ref(),
            )
            .await
    }
}
