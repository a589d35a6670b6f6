use std::{fmt, str::FromStr};

use serde::{Serialize, Serializer};
use zbus::zvariant::{Signature, Type};

/// Most portals interact with the user by showing dialogs.
///
/// These dialogs should generally be placed on top of the application window
/// that triggered them. To arrange this, the compositor needs to know about the
/// application window. Many portal requests expect a [`WindowIdentifier`] for
/// this reason.
///
/// Under X11, the [`WindowIdentifier`] has the form `x11:XID`, where XID is
/// the XID of the application window in hexadecimal. Under Wayland, it has
/// the form `wayland:HANDLE`, where HANDLE is a surface handle obtained with
/// the [xdg-foreign](https://gitlab.freedesktop.org/wayland/wayland-protocols/-/blob/main/unstable/xdg-foreign/xdg-foreign-unstable-v2.xml)
/// protocol.
///
/// The toolkit specific export of those handles is left to the application,
/// the default identifier means "no parent window".
///
/// See also [Parent window identifiers](https://flatpak.github.io/xdg-desktop-portal/docs/window-identifiers.html).
///
/// # Usage
///
/// ```rust
/// use xdg_portal::WindowIdentifier;
///
/// let identifier = WindowIdentifier::from_xid(212321);
/// assert_eq!(identifier.to_string(), "x11:0x33d61");
///
/// let identifier: WindowIdentifier = "wayland:some-handle".parse().unwrap();
/// assert_eq!(identifier, WindowIdentifier::from_wayland_handle("some-handle"));
///
/// assert_eq!(WindowIdentifier::default().to_string(), "");
/// ```
#[doc(alias = "XdpParent")]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum WindowIdentifier {
    /// An X11 window.
    X11(std::os::raw::c_ulong),
    /// A Wayland surface exported with xdg-foreign.
    Wayland(String),
    /// No parent window.
    #[default]
    None,
}

impl WindowIdentifier {
    /// Create an instance of [`WindowIdentifier`] from an X11 window's XID.
    pub fn from_xid(xid: std::os::raw::c_ulong) -> Self {
        Self::X11(xid)
    }

    /// Create an instance of [`WindowIdentifier`] from an exported Wayland
    /// surface handle.
    pub fn from_wayland_handle(handle: impl Into<String>) -> Self {
        let handle = handle.into();
        if handle.is_empty() {
            Self::None
        } else {
            Self::Wayland(handle)
        }
    }
}

impl fmt::Display for WindowIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::X11(xid) => write!(f, "x11:0x{xid:x}"),
            Self::Wayland(handle) => write!(f, "wayland:{handle}"),
            Self::None => f.write_str(""),
        }
    }
}

/// The error returned when parsing an unsupported [`WindowIdentifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidWindowIdentifier(String);

impl fmt::Display for InvalidWindowIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid window identifier `{}`", self.0)
    }
}

impl std::error::Error for InvalidWindowIdentifier {}

impl FromStr for WindowIdentifier {
    type Err = InvalidWindowIdentifier;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.is_empty() {
            return Ok(Self::None);
        }
        let invalid = || InvalidWindowIdentifier(value.to_owned());
        match value.split_once(':') {
            Some(("x11", xid)) => {
                let xid = xid.trim_start_matches("0x");
                std::os::raw::c_ulong::from_str_radix(xid, 16)
                    .map(Self::X11)
                    .map_err(|_| invalid())
            }
            Some(("wayland", handle)) if !handle.is_empty() => {
                Ok(Self::Wayland(handle.to_owned()))
            }
            _ => Err(invalid()),
        }
    }
}

impl Serialize for WindowIdentifier {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl Type for WindowIdentifier {
    const SIGNATURE: &'static Signature = &Signature::Str;
}

pub(crate) trait MaybeWindowIdentifierExt {
    fn to_string_or_empty(&self) -> String;
}

impl MaybeWindowIdentifierExt for Option<&WindowIdentifier> {
    fn to_string_or_empty(&self) -> String {
        self.map(ToString::to_string).unwrap_or_default()
    }
}
