#![deny(rustdoc::broken_intra_doc_links)]
#![deny(missing_docs)]
//! Client side of the [XDG desktop portals](https://flatpak.github.io/xdg-desktop-portal/)
//! written on top of [zbus](https://github.com/dbus2/zbus).
//!
//! Every portal call goes through one of two engines: the request engine,
//! which issues a method call and waits for the `Response` signal of the
//! `org.freedesktop.portal.Request` object it creates, and the session engine,
//! which drives the longer lived [`Session`](desktop::Session) objects used by
//! the screen cast, remote desktop, input capture, global shortcuts and
//! location portals.
//!
//! # Examples
//!
//! Ask the user to pick a file
//!
//! ```rust,no_run
//! use xdg_portal::desktop::file_chooser::SelectedFiles;
//!
//! async fn run() -> xdg_portal::Result<()> {
//!     let files = SelectedFiles::open_file()
//!         .title("Open a picture")
//!         .multiple(true)
//!         .send()
//!         .await?;
//!
//!     for uri in files.uris() {
//!         println!("{uri}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! Cancel a pending dialog
//!
//! ```rust,no_run
//! use xdg_portal::{desktop::screenshot::Screenshot, Cancellable};
//!
//! async fn run() -> xdg_portal::Result<()> {
//!     let cancellable = Cancellable::new();
//!     let request = Screenshot::request()
//!         .interactive(true)
//!         .cancellable(&cancellable)
//!         .send();
//!     cancellable.cancel();
//!
//!     assert!(request.await.unwrap_err().is_cancelled());
//!     Ok(())
//! }
//! ```
#[cfg(all(all(feature = "tokio", feature = "async-io"), not(doc)))]
compile_error!("You can't enable both async-io & tokio features at once");
#[cfg(all(not(feature = "tokio"), not(feature = "async-io"), not(doc)))]
compile_error!("Either the `async-io` or the `tokio` feature has to be enabled");

/// Alias for a [`Result`] with the error type `xdg_portal::Error`.
pub type Result<T> = std::result::Result<T, Error>;

/// The transport used by the request and session engines.
pub mod bus;
mod cancellable;
/// Interact with the user's desktop such as picking a file, casting the
/// screen or querying the user's location.
pub mod desktop;
mod error;
mod file_path;
/// Spawn commands outside the sandbox or monitor if the running application
/// has received an update & install it.
pub mod flatpak;
mod helpers;
mod portal;
mod proxy;
mod window_identifier;

pub use enumflags2;
pub use zbus::{self, zvariant};

pub use self::{
    cancellable::Cancellable,
    error::{Error, PortalError},
    portal::Portal,
    window_identifier::{InvalidWindowIdentifier, WindowIdentifier},
};

/// Check whether the application is running inside a sandbox.
///
/// The check looks for `/.flatpak-info` or a snap environment.
pub fn is_sandboxed() -> bool {
    crate::helpers::is_flatpak() || crate::helpers::is_snap()
}
