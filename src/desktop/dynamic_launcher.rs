//! Install launchers, such as web applications, from a sandboxed
//! application.
//!
//! Wrapper of the DBus interface: [`org.freedesktop.portal.DynamicLauncher`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.DynamicLauncher.html).
//!
//! # Examples
//!
//! ```rust,no_run
//! use xdg_portal::desktop::{
//!     dynamic_launcher::{DynamicLauncherProxy, PrepareInstallOptions},
//!     notification::Icon,
//! };
//!
//! async fn run() -> xdg_portal::Result<()> {
//!     let proxy = DynamicLauncherProxy::new().await?;
//!     let prepared = proxy
//!         .prepare_install(
//!             None,
//!             "My App",
//!             &Icon::with_name("dialog-symbolic"),
//!             PrepareInstallOptions::default().editable_name(true),
//!             None,
//!         )
//!         .await?;
//!
//!     // Name and Icon are filled in by the portal, Exec is rewritten to run
//!     // the sandboxed application.
//!     let desktop_entry = r#"
//!         [Desktop Entry]
//!         Comment=My Web App
//!         Type=Application
//!     "#;
//!     proxy
//!         .install(prepared.token(), "org.example.App.MyApp.desktop", desktop_entry)
//!         .await?;
//!
//!     proxy.launch("org.example.App.MyApp.desktop", None).await?;
//!     proxy.uninstall("org.example.App.MyApp.desktop").await?;
//!     Ok(())
//! }
//! ```

use std::collections::HashMap;

use enumflags2::{bitflags, BitFlags};
use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};
use zbus::zvariant::{
    self,
    as_value::{self, optional},
    OwnedValue, Type,
};

use super::{notification::Icon, HandleToken, ResponseError};
use crate::{
    proxy::Proxy, window_identifier::MaybeWindowIdentifierExt, Cancellable, Error, Portal,
    WindowIdentifier,
};

const INTERFACE: &str = "org.freedesktop.portal.DynamicLauncher";

#[bitflags]
#[derive(Serialize_repr, Deserialize_repr, PartialEq, Eq, Debug, Copy, Clone, Type)]
#[repr(u32)]
#[doc(alias = "XdpLauncherType")]
/// The kind of launcher to install.
pub enum LauncherType {
    #[doc(alias = "XDP_LAUNCHER_APPLICATION")]
    /// A launcher that represents an application.
    Application,
    #[doc(alias = "XDP_LAUNCHER_WEBAPP")]
    /// A launcher that represents a web application.
    WebApplication,
}

impl Default for LauncherType {
    fn default() -> Self {
        Self::Application
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Type)]
#[zvariant(signature = "s")]
#[serde(rename_all = "lowercase")]
/// The image format of a launcher icon.
pub enum IconType {
    /// PNG.
    Png,
    /// JPEG.
    Jpeg,
    /// SVG.
    Svg,
}

/// The icon of an installed launcher.
#[derive(Debug, Clone, PartialEq)]
pub struct LauncherIcon {
    icon: Icon,
    type_: IconType,
    size: u32,
}

impl LauncherIcon {
    /// The icon itself.
    pub fn icon(&self) -> &Icon {
        &self.icon
    }

    /// The image format of the icon.
    pub fn type_(&self) -> IconType {
        self.type_
    }

    /// The icon size in pixels, icons are square.
    pub fn size(&self) -> u32 {
        self.size
    }
}

#[derive(Serialize, Type, Debug, Default)]
#[zvariant(signature = "dict")]
/// Specified options for a [`DynamicLauncherProxy::prepare_install`] request.
pub struct PrepareInstallOptions {
    #[serde(with = "as_value")]
    handle_token: HandleToken,
    #[serde(with = "optional", skip_serializing_if = "Option::is_none")]
    modal: Option<bool>,
    #[serde(with = "as_value")]
    launcher_type: LauncherType,
    #[serde(with = "optional", skip_serializing_if = "Option::is_none")]
    target: Option<String>,
    #[serde(with = "optional", skip_serializing_if = "Option::is_none")]
    editable_name: Option<bool>,
    #[serde(with = "optional", skip_serializing_if = "Option::is_none")]
    editable_icon: Option<bool>,
}

impl PrepareInstallOptions {
    /// Sets whether the dialog should be modal.
    #[must_use]
    pub fn modal(mut self, modal: impl Into<Option<bool>>) -> Self {
        self.modal = modal.into();
        self
    }

    /// Sets the kind of launcher, an application by default.
    #[must_use]
    pub fn launcher_type(mut self, launcher_type: LauncherType) -> Self {
        self.launcher_type = launcher_type;
        self
    }

    /// Sets the URL a web application launcher opens.
    ///
    /// Only sent along for [`LauncherType::WebApplication`] launchers.
    #[must_use]
    pub fn target<'a>(mut self, target: impl Into<Option<&'a str>>) -> Self {
        self.target = target.into().map(ToOwned::to_owned);
        self
    }

    /// Sets whether the user may change the launcher name.
    #[must_use]
    pub fn editable_name(mut self, editable_name: impl Into<Option<bool>>) -> Self {
        self.editable_name = editable_name.into();
        self
    }

    /// Sets whether the user may change the launcher icon.
    #[must_use]
    pub fn editable_icon(mut self, editable_icon: impl Into<Option<bool>>) -> Self {
        self.editable_icon = editable_icon.into();
        self
    }
}

#[derive(Serialize, Type, Debug, Default)]
#[zvariant(signature = "dict")]
struct LaunchOptions {
    #[serde(with = "optional", skip_serializing_if = "Option::is_none")]
    activation_token: Option<String>,
}

#[derive(Deserialize, Type, Debug)]
#[zvariant(signature = "dict")]
struct PrepareInstallResponse {
    #[serde(default, with = "optional")]
    name: Option<String>,
    #[serde(default, with = "optional")]
    token: Option<String>,
}

/// The result of a [`DynamicLauncherProxy::prepare_install`] request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedInstall {
    name: String,
    token: String,
}

impl PreparedInstall {
    /// The launcher name, as chosen by the user when editable.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The token to pass to [`DynamicLauncherProxy::install`].
    pub fn token(&self) -> &str {
        &self.token
    }
}

/// The interface lets sandboxed applications install launchers like Web
/// Application from your browser or Steam.
///
/// Wrapper of the DBus interface: [`org.freedesktop.portal.DynamicLauncher`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.DynamicLauncher.html).
#[derive(Debug)]
#[doc(alias = "org.freedesktop.portal.DynamicLauncher")]
pub struct DynamicLauncherProxy(Proxy);

impl DynamicLauncherProxy {
    /// Create a new instance of [`DynamicLauncherProxy`].
    pub async fn new() -> Result<Self, Error> {
        let proxy = Proxy::new_desktop(INTERFACE).await?;
        Ok(Self(proxy))
    }

    /// Create a new instance of [`DynamicLauncherProxy`] on `portal`.
    pub async fn with_portal(portal: Portal) -> Result<Self, Error> {
        let proxy = Proxy::new_desktop_with_portal(portal, INTERFACE).await?;
        Ok(Self(proxy))
    }

    /// Returns the version of the portal interface.
    pub fn version(&self) -> u32 {
        self.0.version()
    }

    /// Ask the user to confirm the name and icon of a new launcher.
    ///
    /// The returned token is valid for a single
    /// [`DynamicLauncherProxy::install`] call.
    ///
    /// # Specifications
    ///
    /// See also [`PrepareInstall`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.DynamicLauncher.html#org-freedesktop-portal-dynamiclauncher-prepareinstall).
    #[doc(alias = "PrepareInstall")]
    #[doc(alias = "xdp_portal_dynamic_launcher_prepare_install")]
    #[doc(alias = "xdp_portal_dynamic_launcher_prepare_install_finish")]
    pub async fn prepare_install(
        &self,
        identifier: Option<&WindowIdentifier>,
        name: &str,
        icon: &Icon,
        mut options: PrepareInstallOptions,
        cancellable: Option<&Cancellable>,
    ) -> Result<PreparedInstall, Error> {
        if options.launcher_type != LauncherType::WebApplication {
            options.target = None;
        }
        let identifier = identifier.to_string_or_empty();
        let response = self
            .0
            .request::<PrepareInstallResponse>(
                &options.handle_token,
                "PrepareInstall",
                &(&identifier, name, icon.to_variant(), &options),
                cancellable,
            )
            .await?;
        Ok(PreparedInstall {
            // Kept as requested unless the user could edit it.
            name: response.name.unwrap_or_else(|| name.to_owned()),
            token: response
                .token
                .ok_or(ResponseError::ProtocolViolation("token"))?,
        })
    }

    /// Get a token to install a launcher without asking the user.
    ///
    /// Only allowed for applications the portal trusts, others get an
    /// error.
    ///
    /// # Specifications
    ///
    /// See also [`RequestInstallToken`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.DynamicLauncher.html#org-freedesktop-portal-dynamiclauncher-requestinstalltoken).
    #[doc(alias = "RequestInstallToken")]
    #[doc(alias = "xdp_portal_dynamic_launcher_request_install_token")]
    pub async fn request_install_token(&self, name: &str, icon: &Icon) -> Result<String, Error> {
        let options = HashMap::<&str, zvariant::Value<'_>>::new();
        self.0
            .call::<String>("RequestInstallToken", &(name, icon.to_variant(), options))
            .await
    }

    /// Install a launcher with a token from
    /// [`DynamicLauncherProxy::prepare_install`] or
    /// [`DynamicLauncherProxy::request_install_token`].
    ///
    /// `desktop_file_id` must be prefixed with the application id and end
    /// with `.desktop`.
    ///
    /// # Specifications
    ///
    /// See also [`Install`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.DynamicLauncher.html#org-freedesktop-portal-dynamiclauncher-install).
    #[doc(alias = "Install")]
    #[doc(alias = "xdp_portal_dynamic_launcher_install")]
    pub async fn install(
        &self,
        token: &str,
        desktop_file_id: &str,
        desktop_entry: &str,
    ) -> Result<(), Error> {
        let options = HashMap::<&str, zvariant::Value<'_>>::new();
        self.0
            .call::<()>("Install", &(token, desktop_file_id, desktop_entry, options))
            .await
    }

    /// # Specifications
    ///
    /// See also [`Uninstall`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.DynamicLauncher.html#org-freedesktop-portal-dynamiclauncher-uninstall).
    #[doc(alias = "Uninstall")]
    #[doc(alias = "xdp_portal_dynamic_launcher_uninstall")]
    pub async fn uninstall(&self, desktop_file_id: &str) -> Result<(), Error> {
        let options = HashMap::<&str, zvariant::Value<'_>>::new();
        self.0
            .call::<()>("Uninstall", &(desktop_file_id, options))
            .await
    }

    /// The contents of an installed launcher's desktop file.
    ///
    /// # Specifications
    ///
    /// See also [`GetDesktopEntry`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.DynamicLauncher.html#org-freedesktop-portal-dynamiclauncher-getdesktopentry).
    #[doc(alias = "GetDesktopEntry")]
    #[doc(alias = "xdp_portal_dynamic_launcher_get_desktop_entry")]
    pub async fn desktop_entry(&self, desktop_file_id: &str) -> Result<String, Error> {
        self.0
            .call::<String>("GetDesktopEntry", &(desktop_file_id,))
            .await
    }

    /// The icon of an installed launcher.
    ///
    /// # Specifications
    ///
    /// See also [`GetIcon`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.DynamicLauncher.html#org-freedesktop-portal-dynamiclauncher-geticon).
    #[doc(alias = "GetIcon")]
    #[doc(alias = "xdp_portal_dynamic_launcher_get_icon")]
    pub async fn icon(&self, desktop_file_id: &str) -> Result<LauncherIcon, Error> {
        let (icon, type_, size) = self
            .0
            .call::<(OwnedValue, IconType, u32)>("GetIcon", &(desktop_file_id,))
            .await?;
        Ok(LauncherIcon {
            icon: Icon::from_variant(&icon)?,
            type_,
            size,
        })
    }

    /// Launch an installed launcher.
    ///
    /// # Specifications
    ///
    /// See also [`Launch`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.DynamicLauncher.html#org-freedesktop-portal-dynamiclauncher-launch).
    #[doc(alias = "Launch")]
    #[doc(alias = "xdp_portal_dynamic_launcher_launch")]
    pub async fn launch(
        &self,
        desktop_file_id: &str,
        activation_token: Option<&str>,
    ) -> Result<(), Error> {
        let options = LaunchOptions {
            activation_token: activation_token.map(ToOwned::to_owned),
        };
        self.0
            .call::<()>("Launch", &(desktop_file_id, &options))
            .await
    }

    /// The kinds of launchers the portal can install.
    ///
    /// # Specifications
    ///
    /// See also [`SupportedLauncherTypes`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.DynamicLauncher.html#org-freedesktop-portal-dynamiclauncher-supportedlaunchertypes).
    #[doc(alias = "SupportedLauncherTypes")]
    pub async fn supported_launcher_types(&self) -> Result<BitFlags<LauncherType>, Error> {
        let bits = self.0.property::<u32>("SupportedLauncherTypes").await?;
        Ok(BitFlags::from_bits_truncate(bits))
    }
}

#[cfg(test)]
mod tests {
    use zbus::zvariant::Value;

    use super::*;
    use crate::bus::mock::{MockBus, Reply};

    #[derive(Deserialize, Type)]
    #[zvariant(signature = "dict")]
    struct SentOptions {
        #[serde(default, with = "optional")]
        handle_token: Option<String>,
        #[serde(default, with = "optional")]
        launcher_type: Option<u32>,
        #[serde(default, with = "optional")]
        target: Option<String>,
        #[serde(default, with = "optional")]
        editable_name: Option<bool>,
        #[serde(default, with = "optional")]
        activation_token: Option<String>,
    }

    async fn launcher(bus: &std::sync::Arc<MockBus>) -> DynamicLauncherProxy {
        DynamicLauncherProxy::with_portal(bus.portal()).await.unwrap()
    }

    #[tokio::test]
    async fn prepare_then_install() {
        let bus = MockBus::new(":1.11");
        bus.respond(
            INTERFACE,
            "PrepareInstall",
            0,
            MockBus::results([
                ("name", Value::from("Renamed")),
                ("token", Value::from("t0k3n")),
            ]),
        );
        let proxy = launcher(&bus).await;
        let prepared = proxy
            .prepare_install(
                None,
                "My App",
                &Icon::with_name("web-browser"),
                PrepareInstallOptions::default()
                    .launcher_type(LauncherType::WebApplication)
                    .target("https://example.org")
                    .editable_name(true),
                None,
            )
            .await
            .unwrap();
        assert_eq!(prepared.name(), "Renamed");
        assert_eq!(prepared.token(), "t0k3n");

        let (parent, name, icon, options): (String, String, OwnedValue, SentOptions) =
            bus.calls("PrepareInstall")[0].body().deserialize().unwrap();
        assert_eq!(parent, "");
        assert_eq!(name, "My App");
        assert_eq!(
            Icon::from_variant(&icon).unwrap(),
            Icon::with_name("web-browser")
        );
        assert!(options.handle_token.is_some());
        assert_eq!(options.launcher_type, Some(2));
        assert_eq!(options.target.as_deref(), Some("https://example.org"));
        assert_eq!(options.editable_name, Some(true));

        proxy
            .install(prepared.token(), "org.example.App.Web.desktop", "[Desktop Entry]")
            .await
            .unwrap();
        let (token, id, entry, _): (String, String, String, HashMap<String, OwnedValue>) =
            bus.calls("Install")[0].body().deserialize().unwrap();
        assert_eq!(token, "t0k3n");
        assert_eq!(id, "org.example.App.Web.desktop");
        assert_eq!(entry, "[Desktop Entry]");
    }

    #[tokio::test]
    async fn target_only_for_web_applications() {
        let bus = MockBus::new(":1.11");
        bus.respond(
            INTERFACE,
            "PrepareInstall",
            0,
            MockBus::results([("name", Value::from("App")), ("token", Value::from("t"))]),
        );
        let proxy = launcher(&bus).await;
        proxy
            .prepare_install(
                None,
                "App",
                &Icon::with_name("app"),
                PrepareInstallOptions::default().target("https://example.org"),
                None,
            )
            .await
            .unwrap();
        let (_, _, _, options): (String, String, OwnedValue, SentOptions) =
            bus.calls("PrepareInstall")[0].body().deserialize().unwrap();
        assert_eq!(options.launcher_type, Some(1));
        assert_eq!(options.target, None);
    }

    #[tokio::test]
    async fn cancelled_prepare_install() {
        let bus = MockBus::new(":1.11");
        bus.respond(INTERFACE, "PrepareInstall", 1, HashMap::new());
        let proxy = launcher(&bus).await;
        let err = proxy
            .prepare_install(
                None,
                "App",
                &Icon::with_name("app"),
                PrepareInstallOptions::default(),
                None,
            )
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn prepared_install_needs_a_token() {
        let bus = MockBus::new(":1.11");
        bus.respond(INTERFACE, "PrepareInstall", 0, HashMap::new());
        let proxy = launcher(&bus).await;
        let err = proxy
            .prepare_install(
                None,
                "App",
                &Icon::with_name("app"),
                PrepareInstallOptions::default(),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Response(ResponseError::ProtocolViolation("token"))
        ));

        bus.respond(
            INTERFACE,
            "PrepareInstall",
            0,
            MockBus::results([("token", Value::from("t"))]),
        );
        let prepared = proxy
            .prepare_install(
                None,
                "App",
                &Icon::with_name("app"),
                PrepareInstallOptions::default(),
                None,
            )
            .await
            .unwrap();
        assert_eq!(prepared.name(), "App");
    }

    #[tokio::test]
    async fn installed_launchers() {
        let bus = MockBus::new(":1.11");
        let proxy = launcher(&bus).await;

        bus.script(
            INTERFACE,
            "GetDesktopEntry",
            Reply::Build(|reply| reply.build(&("[Desktop Entry]\nName=App",))),
        );
        bus.script(
            INTERFACE,
            "GetIcon",
            Reply::Build(|reply| reply.build(&(Icon::with_name("app").to_variant(), "png", 64u32))),
        );
        bus.script(INTERFACE, "Uninstall", Reply::Unit);
        bus.script(INTERFACE, "Launch", Reply::Unit);

        let entry = proxy.desktop_entry("org.example.App.Web.desktop").await.unwrap();
        assert!(entry.ends_with("Name=App"));
        let (id,): (String,) = bus.calls("GetDesktopEntry")[0].body().deserialize().unwrap();
        assert_eq!(id, "org.example.App.Web.desktop");

        let icon = proxy.icon("org.example.App.Web.desktop").await.unwrap();
        assert_eq!(icon.icon(), &Icon::with_name("app"));
        assert_eq!(icon.type_(), IconType::Png);
        assert_eq!(icon.size(), 64);

        proxy.launch("org.example.App.Web.desktop", Some("xdg-token")).await.unwrap();
        let (id, options): (String, SentOptions) =
            bus.calls("Launch")[0].body().deserialize().unwrap();
        assert_eq!(id, "org.example.App.Web.desktop");
        assert_eq!(options.activation_token.as_deref(), Some("xdg-token"));

        proxy.uninstall("org.example.App.Web.desktop").await.unwrap();
        let (id, _): (String, HashMap<String, OwnedValue>) =
            bus.calls("Uninstall")[0].body().deserialize().unwrap();
        assert_eq!(id, "org.example.App.Web.desktop");

        bus.script(INTERFACE, "RequestInstallToken", Reply::Fail("not allowed"));
        assert!(proxy
            .request_install_token("App", &Icon::with_name("app"))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn supported_launcher_types() {
        let bus = MockBus::new(":1.11");
        bus.set_property(INTERFACE, "SupportedLauncherTypes", Value::from(3u32));
        let proxy = launcher(&bus).await;
        assert_eq!(
            proxy.supported_launcher_types().await.unwrap(),
            LauncherType::Application | LauncherType::WebApplication
        );
    }

    #[test]
    fn icon_variants() {
        let icon = Icon::with_names(["web-browser", "application-x-executable"]);
        assert_eq!(Icon::from_variant(&icon.to_variant()).unwrap(), icon);

        let icon = Icon::Bytes(vec![0x89, b'P', b'N', b'G']);
        assert_eq!(Icon::from_variant(&icon.to_variant()).unwrap(), icon);

        let icon = Icon::Uri(url::Url::parse("file:///usr/share/icons/app.png").unwrap());
        assert_eq!(Icon::from_variant(&icon.to_variant()).unwrap(), icon);

        assert!(Icon::from_variant(&Value::from("app")).is_err());
    }
}
