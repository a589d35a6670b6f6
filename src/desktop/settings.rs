//! ```rust,no_run
//! use futures_util::StreamExt;
//! use xdg_portal::desktop::settings::Settings;
//!
//! async fn run() -> xdg_portal::Result<()> {
//!     let proxy = Settings::new().await?;
//!
//!     let clock_format = proxy
//!         .read::<String>("org.gnome.desktop.interface", "clock-format")
//!         .await?;
//!     println!("{:#?}", clock_format);
//!
//!     let settings = proxy.read_all(&["org.gnome.desktop.interface"]).await?;
//!     println!("{:#?}", settings);
//!
//!     let mut changes = proxy.receive_setting_changed().await?;
//!     if let Some(setting) = changes.next().await {
//!         println!("{}", setting.namespace());
//!         println!("{}", setting.key());
//!         println!("{:#?}", setting.value());
//!     }
//!
//!     Ok(())
//! }
//! ```

use std::{collections::HashMap, convert::TryFrom, future::ready};

use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use zbus::zvariant::{OwnedValue, Type, Value};

use super::Color;
use crate::{proxy::Proxy, Error, Portal};

const INTERFACE: &str = "org.freedesktop.portal.Settings";

/// A HashMap of the <key, value> settings found on a specific namespace.
pub type Namespace = HashMap<String, OwnedValue>;

#[derive(Clone, Deserialize, Type)]
/// A specific `namespace.key = value` setting.
pub struct Setting(String, String, OwnedValue);

impl Setting {
    /// The setting namespace.
    pub fn namespace(&self) -> &str {
        &self.0
    }

    /// The setting key.
    pub fn key(&self) -> &str {
        &self.1
    }

    /// The setting value.
    pub fn value(&self) -> &OwnedValue {
        &self.2
    }
}

impl std::fmt::Debug for Setting {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Setting")
            .field("namespace", &self.namespace())
            .field("key", &self.key())
            .field("value", self.value())
            .finish()
    }
}

/// The system's preferred color scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ColorScheme {
    /// No preference
    NoPreference,
    /// Prefers dark appearance
    PreferDark,
    /// Prefers light appearance
    PreferLight,
}

impl TryFrom<OwnedValue> for ColorScheme {
    type Error = Error;

    fn try_from(value: OwnedValue) -> Result<Self, Self::Error> {
        Ok(match u32::try_from(value)? {
            1 => ColorScheme::PreferDark,
            2 => ColorScheme::PreferLight,
            _ => ColorScheme::NoPreference,
        })
    }
}

impl TryFrom<Setting> for ColorScheme {
    type Error = Error;

    fn try_from(value: Setting) -> Result<Self, Self::Error> {
        Self::try_from(value.2)
    }
}

/// The system's preferred contrast level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Contrast {
    /// No preference
    NoPreference,
    /// Higher contrast
    High,
}

impl TryFrom<OwnedValue> for Contrast {
    type Error = Error;

    fn try_from(value: OwnedValue) -> Result<Self, Self::Error> {
        Ok(match u32::try_from(value)? {
            1 => Contrast::High,
            _ => Contrast::NoPreference,
        })
    }
}

const APPEARANCE_NAMESPACE: &str = "org.freedesktop.appearance";
const COLOR_SCHEME_KEY: &str = "color-scheme";
const ACCENT_COLOR_KEY: &str = "accent-color";
const CONTRAST_KEY: &str = "contrast";

/// The interface provides read-only access to a small number of host settings
/// required for toolkits similar to XSettings. It is not for general purpose
/// settings.
///
/// Wrapper of the DBus interface: [`org.freedesktop.portal.Settings`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.Settings.html).
#[derive(Debug)]
#[doc(alias = "org.freedesktop.portal.Settings")]
pub struct Settings(Proxy);

impl Settings {
    /// Create a new instance of [`Settings`].
    pub async fn new() -> Result<Self, Error> {
        let proxy = Proxy::new_desktop(INTERFACE).await?;
        Ok(Self(proxy))
    }

    /// Create a new instance of [`Settings`] on `portal`.
    pub async fn with_portal(portal: Portal) -> Result<Self, Error> {
        let proxy = Proxy::new_desktop_with_portal(portal, INTERFACE).await?;
        Ok(Self(proxy))
    }

    /// Returns the version of the portal interface.
    pub fn version(&self) -> u32 {
        self.0.version()
    }

    /// Reads all the settings of the given namespaces.
    ///
    /// # Arguments
    ///
    /// * `namespaces` - List of namespaces to filter results by.
    ///
    /// If `namespaces` is an empty array or contains an empty string it matches
    /// all. Globing is supported but only for trailing sections, e.g.
    /// `org.example.*`.
    ///
    /// # Returns
    ///
    /// A `HashMap` of namespaces to its keys and values.
    ///
    /// # Specifications
    ///
    /// See also [`ReadAll`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.Settings.html#org-freedesktop-portal-settings-readall).
    #[doc(alias = "ReadAll")]
    #[doc(alias = "xdp_settings_read_all_values")]
    pub async fn read_all(
        &self,
        namespaces: &[&str],
    ) -> Result<HashMap<String, Namespace>, Error> {
        self.0.call("ReadAll", &(namespaces,)).await
    }

    /// Reads a single value. Returns an error on any unknown namespace or key.
    ///
    /// `ReadOne` is used when the portal provides it, the deprecated `Read`
    /// otherwise.
    ///
    /// # Arguments
    ///
    /// * `namespace` - Namespace to look up key in.
    /// * `key` - The key to get.
    ///
    /// # Specifications
    ///
    /// See also [`ReadOne`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.Settings.html#org-freedesktop-portal-settings-readone).
    #[doc(alias = "ReadOne")]
    #[doc(alias = "Read")]
    #[doc(alias = "xdp_settings_read_value")]
    pub async fn read<T>(&self, namespace: &str, key: &str) -> Result<T, Error>
    where
        T: TryFrom<OwnedValue>,
        Error: From<<T as TryFrom<OwnedValue>>::Error>,
    {
        let value = self.read_value(namespace, key).await?;
        T::try_from(value).map_err(From::from)
    }

    async fn read_value(&self, namespace: &str, key: &str) -> Result<OwnedValue, Error> {
        if self.version() >= 2 {
            return self
                .0
                .call::<OwnedValue>("ReadOne", &(namespace, key))
                .await;
        }
        let value = self.0.call::<OwnedValue>("Read", &(namespace, key)).await?;
        // Read wraps the value in one more variant.
        match &*value {
            Value::Value(inner) => Ok(inner.try_to_owned()?),
            _ => Ok(value),
        }
    }

    /// Retrieves the system's preferred color scheme
    #[doc(alias = "xdp_settings_read_uint")]
    pub async fn color_scheme(&self) -> Result<ColorScheme, Error> {
        self.read::<ColorScheme>(APPEARANCE_NAMESPACE, COLOR_SCHEME_KEY)
            .await
    }

    /// Retrieves the system's preferred accent color
    pub async fn accent_color(&self) -> Result<Color, Error> {
        let value = self
            .read_value(APPEARANCE_NAMESPACE, ACCENT_COLOR_KEY)
            .await?;
        let rgb = <(f64, f64, f64)>::try_from((*value).try_clone()?)?;
        Ok(Color::from(rgb))
    }

    /// Retrieves the system's preferred contrast level
    pub async fn contrast(&self) -> Result<Contrast, Error> {
        self.read::<Contrast>(APPEARANCE_NAMESPACE, CONTRAST_KEY)
            .await
    }

    /// Listen to changes of the system's preferred color scheme
    pub async fn receive_color_scheme_changed(
        &self,
    ) -> Result<impl Stream<Item = ColorScheme> + Send + Unpin + 'static, Error> {
        Ok(self
            .receive_setting_changed_with_args(APPEARANCE_NAMESPACE, COLOR_SCHEME_KEY)
            .await?
            .filter_map(|setting| ready(ColorScheme::try_from(setting).ok())))
    }

    /// Signal emitted when a setting changes.
    ///
    /// # Specifications
    ///
    /// See also [`SettingChanged`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.Settings.html#org-freedesktop-portal-settings-settingchanged).
    #[doc(alias = "SettingChanged")]
    #[doc(alias = "XdpSettings::changed")]
    pub async fn receive_setting_changed(
        &self,
    ) -> Result<impl Stream<Item = Setting> + Send + Unpin + 'static, Error> {
        self.0.signal("SettingChanged").await
    }

    /// Similar to [`receive_setting_changed`](Self::receive_setting_changed)
    /// but only receives the changes of `namespace.key`.
    pub async fn receive_setting_changed_with_args(
        &self,
        namespace: &str,
        key: &str,
    ) -> Result<impl Stream<Item = Setting> + Send + Unpin + 'static, Error> {
        let namespace = namespace.to_owned();
        let key = key.to_owned();
        Ok(self
            .receive_setting_changed()
            .await?
            .filter(move |setting| ready(setting.0 == namespace && setting.1 == key)))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures_util::{pin_mut, FutureExt};

    use super::*;
    use crate::{
        bus::mock::{MockBus, Reply},
        proxy::DESKTOP_PATH,
    };

    #[tokio::test]
    async fn read_one_and_legacy_read() {
        let bus = MockBus::new(":1.10");
        bus.set_version(INTERFACE, 2);
        bus.script(
            INTERFACE,
            "ReadOne",
            Reply::Value(OwnedValue::try_from(Value::from(1u32)).unwrap()),
        );
        let settings = Settings::with_portal(bus.portal()).await.unwrap();
        assert_eq!(settings.color_scheme().await.unwrap(), ColorScheme::PreferDark);
        let (namespace, key): (String, String) =
            bus.calls("ReadOne")[0].body().deserialize().unwrap();
        assert_eq!(namespace, APPEARANCE_NAMESPACE);
        assert_eq!(key, COLOR_SCHEME_KEY);

        let bus = MockBus::new(":1.10");
        bus.set_version(INTERFACE, 1);
        let nested = Value::Value(Box::new(Value::from(1u32)));
        bus.script(
            INTERFACE,
            "Read",
            Reply::Value(OwnedValue::try_from(nested).unwrap()),
        );
        let settings = Settings::with_portal(bus.portal()).await.unwrap();
        assert_eq!(settings.contrast().await.unwrap(), Contrast::High);
        assert!(bus.calls("ReadOne").is_empty());
    }

    #[tokio::test]
    async fn accent_color() {
        let bus = MockBus::new(":1.10");
        bus.set_version(INTERFACE, 2);
        bus.script(
            INTERFACE,
            "ReadOne",
            Reply::Value(OwnedValue::try_from(Value::from((0.2f64, 0.4f64, 1.0f64))).unwrap()),
        );
        let settings = Settings::with_portal(bus.portal()).await.unwrap();
        let color = settings.accent_color().await.unwrap();
        assert_eq!(color.red(), 0.2);
        assert_eq!(color.blue(), 1.0);
    }

    #[tokio::test]
    async fn filtered_changes() {
        let bus = MockBus::new(":1.10");
        let settings = Settings::with_portal(bus.portal()).await.unwrap();
        let schemes = settings.receive_color_scheme_changed().await.unwrap();
        pin_mut!(schemes);

        bus.emit(
            DESKTOP_PATH,
            INTERFACE,
            "SettingChanged",
            &(APPEARANCE_NAMESPACE, CONTRAST_KEY, Value::from(1u32)),
        );
        bus.emit(
            DESKTOP_PATH,
            INTERFACE,
            "SettingChanged",
            &(APPEARANCE_NAMESPACE, COLOR_SCHEME_KEY, Value::from(2u32)),
        );

        let scheme = tokio::time::timeout(Duration::from_secs(1), schemes.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(scheme, ColorScheme::PreferLight);
        assert!(schemes.next().now_or_never().is_none());
    }
}
