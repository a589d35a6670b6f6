mod color;
mod handle_token;
pub(crate) mod request;
pub(crate) mod session;

pub use self::{
    color::Color,
    handle_token::{HandleInvalidCharacter, HandleToken},
    request::ResponseError,
    session::{Session, SessionState, SessionType},
};

/// Retrieve information about the user.
pub mod account;
/// Request running in the background.
pub mod background;
/// Check whether a camera is available and request access to it.
pub mod camera;
/// Interact with the clipboard of a remote desktop session.
pub mod clipboard;
/// Install launchers, such as web applications.
pub mod dynamic_launcher;
/// Compose an email.
pub mod email;
/// Open/save file(s) chooser.
pub mod file_chooser;
/// Register global shortcuts.
pub mod global_shortcuts;
/// Inhibit the session from being restarted or the user from logging out.
pub mod inhibit;
/// Capture input events from physical or logical devices.
pub mod input_capture;
/// Query the user's GPS location.
pub mod location;
/// Send/withdraw notifications.
pub mod notification;
/// Open a URI or a directory.
pub mod open_uri;
/// Print a document.
pub mod print;
/// Start a remote desktop session and interact with it.
pub mod remote_desktop;
/// Start a screencast session and get the PipeWire remote of it.
pub mod screencast;
/// Take a screenshot or pick a color.
pub mod screenshot;
/// Read & listen to system settings changes.
pub mod settings;
/// Send files to the trash.
pub mod trash;
/// Set a wallpaper on lockscreen, background or both.
pub mod wallpaper;

#[derive(
    Default,
    serde_repr::Deserialize_repr,
    serde_repr::Serialize_repr,
    PartialEq,
    Eq,
    Debug,
    Copy,
    Clone,
    zbus::zvariant::Type,
)]
#[doc(alias = "XdpPersistMode")]
#[repr(u32)]
/// Persistence mode for a screencast or remote desktop session.
pub enum PersistMode {
    #[doc(alias = "XDP_PERSIST_MODE_NONE")]
    #[default]
    /// Do not persist.
    DoNot = 0,
    #[doc(alias = "XDP_PERSIST_MODE_TRANSIENT")]
    /// Persist while the application is running.
    Application = 1,
    #[doc(alias = "XDP_PERSIST_MODE_PERSISTENT")]
    /// Persist until explicitly revoked.
    ExplicitlyRevoked = 2,
}
