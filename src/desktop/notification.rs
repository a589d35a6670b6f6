//! Send and withdraw notifications.
//!
//! Wrapper of the DBus interface: [`org.freedesktop.portal.Notification`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.Notification.html).
//!
//! # Examples
//!
//! ```rust,no_run
//! use futures_util::StreamExt;
//! use xdg_portal::desktop::notification::{
//!     Button, Icon, Notification, NotificationProxy, Priority,
//! };
//! use zbus::zvariant::Value;
//!
//! async fn run() -> xdg_portal::Result<()> {
//!     let proxy = NotificationProxy::new().await?;
//!
//!     let notification_id = "org.gnome.design.Contrast";
//!     proxy
//!         .add_notification(
//!             notification_id,
//!             Notification::new("Contrast")
//!                 .default_action("open")
//!                 .default_action_target(Value::U32(100))
//!                 .icon(Icon::with_names(["dialog-question-symbolic"]))
//!                 .body("color copied to clipboard")
//!                 .priority(Priority::High)
//!                 .button(Button::new("Copy", "copy").target(Value::U32(32)))
//!                 .button(Button::new("Delete", "delete").target(Value::U32(40))),
//!         )
//!         .await?;
//!
//!     let mut actions = proxy.receive_action_invoked().await?;
//!     if let Some(action) = actions.next().await {
//!         match action.name() {
//!             "copy" => (),   // Copy something to clipboard
//!             "delete" => (), // Delete the file
//!             _ => (),
//!         };
//!         println!("{:#?}", action.id());
//!     }
//!
//!     proxy.remove_notification(notification_id).await?;
//!     Ok(())
//! }
//! ```

use std::{fmt, str::FromStr};

use futures_util::Stream;
use serde::{self, ser::SerializeTuple, Deserialize, Serialize, Serializer};
use zbus::zvariant::{
    self,
    as_value::{self, optional},
    OwnedValue, Signature, Type, Value,
};

use crate::{proxy::Proxy, Error, Portal};

const INTERFACE: &str = "org.freedesktop.portal.Notification";

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
/// The notification priority
pub enum Priority {
    /// Low.
    Low,
    /// Normal.
    Normal,
    /// High.
    High,
    /// Urgent.
    Urgent,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_ref())
    }
}

impl AsRef<str> for Priority {
    fn as_ref(&self) -> &str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }
}

/// The error returned when a string is not a known [`Priority`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidPriority(String);

impl fmt::Display for InvalidPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid notification priority `{}`", self.0)
    }
}

impl std::error::Error for InvalidPriority {}

impl FromStr for Priority {
    type Err = InvalidPriority;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Low" | "low" => Ok(Priority::Low),
            "Normal" | "normal" => Ok(Priority::Normal),
            "High" | "high" => Ok(Priority::High),
            "Urgent" | "urgent" => Ok(Priority::Urgent),
            _ => Err(InvalidPriority(s.to_owned())),
        }
    }
}

impl Serialize for Priority {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_ref())
    }
}

impl Type for Priority {
    const SIGNATURE: &'static Signature = &Signature::Str;
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// A serialized icon, sent as a `(sv)` tuple.
pub enum Icon {
    /// An icon URI.
    Uri(url::Url),
    /// A list of themed icon names, the first one found is used.
    Names(Vec<String>),
    /// Encoded image bytes, PNG for example.
    Bytes(Vec<u8>),
}

impl Icon {
    /// Create an icon from a name
    pub fn with_name(name: impl Into<String>) -> Self {
        Self::Names(vec![name.into()])
    }

    /// Create an icon from a list of names.
    pub fn with_names<N>(names: impl IntoIterator<Item = N>) -> Self
    where
        N: ToString,
    {
        Self::Names(names.into_iter().map(|name| name.to_string()).collect())
    }

    /// The icon as a `(sv)` structure, for interfaces taking it as a variant.
    pub(crate) fn to_variant(&self) -> Value<'static> {
        let (kind, value) = match self {
            Self::Uri(uri) => ("file", Value::from(uri.as_str().to_owned())),
            Self::Names(names) => ("themed", Value::from(names.clone())),
            Self::Bytes(bytes) => ("bytes", Value::from(bytes.clone())),
        };
        Value::from((kind, value))
    }

    pub(crate) fn from_variant(value: &Value<'_>) -> Result<Self, zvariant::Error> {
        let Value::Structure(structure) = value else {
            return Err(zvariant::Error::IncorrectType);
        };
        let (kind, value) = match structure.fields() {
            [Value::Str(kind), value] => (kind.as_str(), value),
            _ => return Err(zvariant::Error::IncorrectType),
        };
        let value = match value {
            Value::Value(inner) => inner.as_ref(),
            other => other,
        };
        match (kind, value) {
            ("file", Value::Str(uri)) => url::Url::parse(uri.as_str())
                .map(Self::Uri)
                .map_err(|err| zvariant::Error::Message(err.to_string())),
            ("themed", _) => Ok(Self::Names(Vec::<String>::try_from(value.try_clone()?)?)),
            ("bytes", _) => Ok(Self::Bytes(Vec::<u8>::try_from(value.try_clone()?)?)),
            _ => Err(zvariant::Error::Message(format!(
                "Unsupported icon of type {kind}"
            ))),
        }
    }
}

impl Serialize for Icon {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut tuple = serializer.serialize_tuple(2)?;
        match self {
            Self::Uri(uri) => {
                tuple.serialize_element("file")?;
                tuple.serialize_element(&Value::from(uri.as_str()))?;
            }
            Self::Names(names) => {
                tuple.serialize_element("themed")?;
                tuple.serialize_element(&Value::from(names.clone()))?;
            }
            Self::Bytes(bytes) => {
                tuple.serialize_element("bytes")?;
                tuple.serialize_element(&Value::from(bytes.clone()))?;
            }
        }
        tuple.end()
    }
}

impl Type for Icon {
    const SIGNATURE: &'static Signature = <(String, OwnedValue)>::SIGNATURE;
}

#[derive(Serialize, Type, Debug)]
/// A notification
#[zvariant(signature = "dict")]
pub struct Notification {
    /// User-visible string to display as the title.
    #[serde(with = "as_value")]
    title: String,
    /// User-visible string to display as the body.
    #[serde(with = "optional", skip_serializing_if = "Option::is_none")]
    body: Option<String>,
    /// Serialized icon (e.g using gio::Icon::serialize).
    #[serde(with = "optional", skip_serializing_if = "Option::is_none")]
    icon: Option<Icon>,
    /// The priority for the notification.
    #[serde(with = "optional", skip_serializing_if = "Option::is_none")]
    priority: Option<Priority>,
    /// Name of an action that is exported by the application.
    /// This action will be activated when the user clicks on the notification.
    #[serde(
        rename = "default-action",
        with = "optional",
        skip_serializing_if = "Option::is_none"
    )]
    default_action: Option<String>,
    /// Target parameter to send along when activating the default action.
    #[serde(
        rename = "default-action-target",
        serialize_with = "target",
        skip_serializing_if = "Option::is_none"
    )]
    default_action_target: Option<OwnedValue>,
    /// Array of buttons to add to the notification.
    #[serde(with = "optional", skip_serializing_if = "Option::is_none")]
    buttons: Option<Vec<Button>>,
}

impl Notification {
    /// Create a new notification.
    ///
    /// # Arguments
    ///
    /// * `title` - the notification title.
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_owned(),
            body: None,
            priority: None,
            icon: None,
            default_action: None,
            default_action_target: None,
            buttons: None,
        }
    }

    /// Sets the notification body.
    #[must_use]
    pub fn body<'a>(mut self, body: impl Into<Option<&'a str>>) -> Self {
        self.body = body.into().map(ToOwned::to_owned);
        self
    }

    /// Sets an icon to the notification.
    #[must_use]
    pub fn icon(mut self, icon: impl Into<Option<Icon>>) -> Self {
        self.icon = icon.into();
        self
    }

    /// Sets the notification priority.
    #[must_use]
    pub fn priority(mut self, priority: impl Into<Option<Priority>>) -> Self {
        self.priority = priority.into();
        self
    }

    /// Sets the default action when the user clicks on the notification.
    #[must_use]
    pub fn default_action<'a>(mut self, default_action: impl Into<Option<&'a str>>) -> Self {
        self.default_action = default_action.into().map(ToOwned::to_owned);
        self
    }

    /// Sets a value to be sent in the `action_invoked` signal.
    ///
    /// Values holding file descriptors are ignored.
    #[must_use]
    pub fn default_action_target<'a>(mut self, default_action_target: impl Into<Value<'a>>) -> Self {
        self.default_action_target = OwnedValue::try_from(default_action_target.into()).ok();
        self
    }

    /// Adds a new button to the notification.
    #[must_use]
    pub fn button(mut self, button: Button) -> Self {
        self.buttons.get_or_insert_with(Vec::new).push(button);
        self
    }
}

#[derive(Serialize, Type, Debug)]
/// A notification button
#[zvariant(signature = "dict")]
pub struct Button {
    /// User-visible label for the button. Mandatory.
    #[serde(with = "as_value")]
    label: String,
    /// Name of an action that is exported by the application. The action will
    /// be activated when the user clicks on the button.
    #[serde(with = "as_value")]
    action: String,
    /// Target parameter to send along when activating the action.
    #[serde(serialize_with = "target", skip_serializing_if = "Option::is_none")]
    target: Option<OwnedValue>,
}

// Targets already are variants, sent as is rather than wrapped in another one.
fn target<S>(value: &Option<OwnedValue>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value {
        Some(value) => value.serialize(serializer),
        None => serializer.serialize_unit(),
    }
}

impl Button {
    /// Create a new notification button.
    ///
    /// # Arguments
    ///
    /// * `label` - the user visible label of the button.
    /// * `action` - the action name to be invoked when the user clicks on the
    ///   button.
    pub fn new(label: &str, action: &str) -> Self {
        Self {
            label: label.to_owned(),
            action: action.to_owned(),
            target: None,
        }
    }

    /// The value to send with the action name when the button is clicked.
    ///
    /// Values holding file descriptors are ignored.
    #[must_use]
    pub fn target<'a>(mut self, target: impl Into<Value<'a>>) -> Self {
        self.target = OwnedValue::try_from(target.into()).ok();
        self
    }
}

#[derive(Debug, Deserialize, Type)]
/// An invoked action.
pub struct Action(String, String, Vec<OwnedValue>);

impl Action {
    /// Notification ID.
    pub fn id(&self) -> &str {
        &self.0
    }

    /// Action name.
    pub fn name(&self) -> &str {
        &self.1
    }

    /// The parameters passed to the action.
    pub fn parameter(&self) -> &[OwnedValue] {
        &self.2
    }
}

/// The interface lets sandboxed applications send and withdraw notifications.
///
/// It is not possible for the application to learn if the notification was
/// actually presented to the user. Not a portal in the strict sense, since
/// there is no user interaction.
///
/// **Note** in contrast to most other portal requests, notifications are
/// expected to outlast the running application. If a user clicks on a
/// notification after the application has exited, it will get activated again.
///
/// Notifications can specify actions that can be activated by the user.
/// Actions whose name starts with 'app.' are assumed to be exported and will be
/// activated via the ActivateAction() method in the org.freedesktop.Application
/// interface. Other actions are activated by sending the
/// `ActionInvoked` signal to the application.
///
/// Wrapper of the DBus interface: [`org.freedesktop.portal.Notification`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.Notification.html).
#[derive(Debug)]
#[doc(alias = "org.freedesktop.portal.Notification")]
pub struct NotificationProxy(Proxy);

impl NotificationProxy {
    /// Create a new instance of [`NotificationProxy`].
    pub async fn new() -> Result<Self, Error> {
        let proxy = Proxy::new_desktop(INTERFACE).await?;
        Ok(Self(proxy))
    }

    /// Create a new instance of [`NotificationProxy`] on `portal`.
    pub async fn with_portal(portal: Portal) -> Result<Self, Error> {
        let proxy = Proxy::new_desktop_with_portal(portal, INTERFACE).await?;
        Ok(Self(proxy))
    }

    /// Returns the version of the portal interface.
    pub fn version(&self) -> u32 {
        self.0.version()
    }

    /// Signal emitted when a particular action is invoked.
    ///
    /// # Specifications
    ///
    /// See also [`ActionInvoked`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.Notification.html#org-freedesktop-portal-notification-actioninvoked).
    #[doc(alias = "ActionInvoked")]
    #[doc(alias = "XdpPortal::notification-action-invoked")]
    pub async fn receive_action_invoked(
        &self,
    ) -> Result<impl Stream<Item = Action> + Send + Unpin + 'static, Error> {
        self.0.signal("ActionInvoked").await
    }

    /// Sends a notification.
    ///
    /// The ID can be used to later withdraw the notification.
    /// If the application reuses the same ID without withdrawing, the
    /// notification is replaced by the new one.
    ///
    /// # Arguments
    ///
    /// * `id` - Application-provided ID for this notification.
    /// * `notification` - The notification.
    ///
    /// # Specifications
    ///
    /// See also [`AddNotification`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.Notification.html#org-freedesktop-portal-notification-addnotification).
    #[doc(alias = "AddNotification")]
    #[doc(alias = "xdp_portal_add_notification")]
    pub async fn add_notification(
        &self,
        id: &str,
        notification: Notification,
    ) -> Result<(), Error> {
        self.0
            .call::<()>("AddNotification", &(id, notification))
            .await
    }

    /// Withdraws a notification.
    ///
    /// # Arguments
    ///
    /// * `id` - Application-provided ID for this notification.
    ///
    /// # Specifications
    ///
    /// See also [`RemoveNotification`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.Notification.html#org-freedesktop-portal-notification-removenotification).
    #[doc(alias = "RemoveNotification")]
    #[doc(alias = "xdp_portal_remove_notification")]
    pub async fn remove_notification(&self, id: &str) -> Result<(), Error> {
        self.0.call::<()>("RemoveNotification", &(id,)).await
    }
}
