//! # Examples
//!
//! Spawn a process outside of the sandbox, only works in a Flatpak.
//!
//! ```rust,no_run
//! use std::collections::HashMap;
//!
//! use futures_util::StreamExt;
//! use xdg_portal::flatpak::{Flatpak, SpawnFlags, SpawnOptions};
//!
//! async fn run() -> xdg_portal::Result<()> {
//!     let proxy = Flatpak::new().await?;
//!     let mut exited = proxy.receive_spawn_exited().await?;
//!
//!     let pid = proxy
//!         .spawn(
//!             "/",
//!             &["contrast"],
//!             HashMap::new(),
//!             HashMap::new(),
//!             SpawnFlags::ClearEnv | SpawnFlags::NoNetwork,
//!             SpawnOptions::default(),
//!         )
//!         .await?;
//!
//!     while let Some(process) = exited.next().await {
//!         if process.pid() == pid {
//!             println!("exited with {}", process.exit_status());
//!             break;
//!         }
//!     }
//!     Ok(())
//! }
//! ```

use std::{collections::HashMap, fmt::Debug, os::fd::AsFd, path::Path};

use enumflags2::{bitflags, BitFlags};
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};
use zbus::zvariant::{
    as_value,
    Fd, OwnedObjectPath, Type,
};

use crate::{desktop::HandleToken, file_path::FilePath, proxy::Proxy, Error, Portal};

const INTERFACE: &str = "org.freedesktop.portal.Flatpak";

#[bitflags]
#[derive(Serialize_repr, Deserialize_repr, PartialEq, Eq, Copy, Clone, Debug, Type)]
#[repr(u32)]
/// A bitmask representing the "permissions" of a newly created sandbox.
pub enum SandboxFlags {
    /// Share the display access (X11, Wayland) with the caller.
    DisplayAccess = 1,
    /// Share the sound access (PulseAudio) with the caller.
    SoundAccess = 2,
    /// Share the gpu access with the caller.
    GpuAccess = 4,
    /// Allow sandbox access to (filtered) session bus.
    SessionBusAccess = 8,
    /// Allow sandbox access to accessibility bus.
    AccessibilityBusAccess = 16,
}

#[bitflags]
#[derive(Serialize_repr, Deserialize_repr, PartialEq, Eq, Copy, Clone, Debug, Type)]
#[repr(u32)]
#[doc(alias = "XdpSpawnFlags")]
/// Flags affecting the created sandbox.
pub enum SpawnFlags {
    #[doc(alias = "XDP_SPAWN_FLAG_CLEARENV")]
    /// Clear the environment.
    ClearEnv = 1,
    #[doc(alias = "XDP_SPAWN_FLAG_LATEST")]
    /// Spawn the latest version of the app.
    Latest = 2,
    #[doc(alias = "XDP_SPAWN_FLAG_SANDBOX")]
    /// Spawn in a sandbox (equivalent of the sandbox option of `flatpak run`).
    Sandbox = 4,
    #[doc(alias = "XDP_SPAWN_FLAG_NO_NETWORK")]
    /// Spawn without network (equivalent of the `unshare=network` option of
    /// `flatpak run`).
    NoNetwork = 8,
    #[doc(alias = "XDP_SPAWN_FLAG_WATCH")]
    /// Kill the sandbox when the caller disappears from the session bus.
    WatchBus = 16,
    /// Expose the sandbox pids in the callers sandbox, only supported if using
    /// user namespaces for containers (not setuid), see the support property.
    ExposePids = 32,
    /// Emit a SpawnStarted signal once the sandboxed process has been fully
    /// started.
    NotifyStart = 64,
    /// Expose the sandbox process IDs in the caller's sandbox and the
    /// caller's process IDs in the new sandbox.
    SharePids = 128,
    /// Don't provide app files at `/app` in the new sandbox.
    EmptyApp = 256,
}

#[bitflags]
#[derive(Serialize_repr, Deserialize_repr, PartialEq, Eq, Copy, Clone, Debug, Type)]
#[repr(u32)]
/// Flags marking what optional features are available.
pub enum SupportsFlags {
    /// Supports the expose sandbox pids flag of Spawn.
    ExposePids = 1,
}

#[derive(Serialize, Type, Debug, Default)]
#[zvariant(signature = "dict")]
/// Specified options for a [`Flatpak::spawn`] request.
pub struct SpawnOptions<'a> {
    #[serde(
        rename = "sandbox-expose",
        with = "as_value::optional",
        skip_serializing_if = "Option::is_none"
    )]
    sandbox_expose: Option<Vec<String>>,
    #[serde(
        rename = "sandbox-expose-ro",
        with = "as_value::optional",
        skip_serializing_if = "Option::is_none"
    )]
    sandbox_expose_ro: Option<Vec<String>>,
    #[serde(
        rename = "sandbox-expose-fd",
        with = "as_value::optional",
        skip_serializing_if = "Option::is_none"
    )]
    sandbox_expose_fd: Option<Vec<Fd<'a>>>,
    #[serde(
        rename = "sandbox-expose-fd-ro",
        with = "as_value::optional",
        skip_serializing_if = "Option::is_none"
    )]
    sandbox_expose_fd_ro: Option<Vec<Fd<'a>>>,
    #[serde(
        rename = "sandbox-flags",
        with = "as_value::optional",
        skip_serializing_if = "Option::is_none"
    )]
    sandbox_flags: Option<BitFlags<SandboxFlags>>,
    #[serde(
        rename = "unset-env",
        with = "as_value::optional",
        skip_serializing_if = "Option::is_none"
    )]
    unset_env: Option<Vec<String>>,
}

impl<'a> SpawnOptions<'a> {
    /// Sets the list of filenames for files to expose the new sandbox.
    /// **Note** absolute paths or subdirectories are not allowed.
    #[must_use]
    pub fn sandbox_expose(mut self, sandbox_expose: &[&str]) -> Self {
        self.sandbox_expose = Some(sandbox_expose.iter().map(|s| (*s).to_owned()).collect());
        self
    }

    /// Sets the list of filenames for files to expose the new sandbox,
    /// read-only.
    /// **Note** absolute paths or subdirectories are not allowed.
    #[must_use]
    pub fn sandbox_expose_ro(mut self, sandbox_expose_ro: &[&str]) -> Self {
        self.sandbox_expose_ro = Some(
            sandbox_expose_ro
                .iter()
                .map(|s| (*s).to_owned())
                .collect(),
        );
        self
    }

    /// Sets the list of file descriptors of files to expose the new sandbox.
    #[must_use]
    pub fn sandbox_expose_fd(mut self, sandbox_expose_fd: &[&'a impl AsFd]) -> Self {
        self.sandbox_expose_fd = Some(sandbox_expose_fd.iter().map(|fd| Fd::from(*fd)).collect());
        self
    }

    /// Sets the list of file descriptors of files to expose the new sandbox,
    /// read-only.
    #[must_use]
    pub fn sandbox_expose_fd_ro(mut self, sandbox_expose_fd_ro: &[&'a impl AsFd]) -> Self {
        self.sandbox_expose_fd_ro = Some(
            sandbox_expose_fd_ro
                .iter()
                .map(|fd| Fd::from(*fd))
                .collect(),
        );
        self
    }

    /// Sets the created sandbox flags.
    #[must_use]
    pub fn sandbox_flags(mut self, sandbox_flags: impl Into<Option<BitFlags<SandboxFlags>>>) -> Self {
        self.sandbox_flags = sandbox_flags.into();
        self
    }

    /// Sets the environment variables to unset in the new process.
    #[must_use]
    pub fn unset_env(mut self, variables: &[&str]) -> Self {
        self.unset_env = Some(variables.iter().map(|s| (*s).to_owned()).collect());
        self
    }
}

#[derive(Serialize, Type, Debug, Default)]
#[zvariant(signature = "dict")]
struct CreateMonitorOptions {
    #[serde(with = "as_value")]
    handle_token: HandleToken,
}

/// A process spawned by [`Flatpak::spawn`] has fully started.
#[derive(Debug, Deserialize, Type, Clone, Copy, PartialEq, Eq)]
pub struct SpawnStarted(u32, u32);

impl SpawnStarted {
    /// The PID of the process, as returned by [`Flatpak::spawn`].
    pub fn pid(&self) -> u32 {
        self.0
    }

    /// The PID of the process inside its sandbox.
    pub fn relative_pid(&self) -> u32 {
        self.1
    }
}

/// A process spawned by [`Flatpak::spawn`] exited.
#[derive(Debug, Deserialize, Type, Clone, Copy, PartialEq, Eq)]
pub struct SpawnExited(u32, u32);

impl SpawnExited {
    /// The PID of the process.
    pub fn pid(&self) -> u32 {
        self.0
    }

    /// The wait status of the process, as returned by `waitpid()`.
    pub fn exit_status(&self) -> u32 {
        self.1
    }
}

/// The interface exposes some interactions with Flatpak on the host to the
/// sandbox. For example, it allows you to restart the applications or start a
/// more sandboxed instance.
///
/// Wrapper of the DBus interface: [`org.freedesktop.portal.Flatpak`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.Flatpak.html).
#[derive(Debug)]
#[doc(alias = "org.freedesktop.portal.Flatpak")]
pub struct Flatpak(Proxy);

impl Flatpak {
    /// Create a new instance of [`Flatpak`].
    pub async fn new() -> Result<Self, Error> {
        Self::with_portal(Portal::global().await?).await
    }

    /// Create a new instance of [`Flatpak`] on `portal`.
    pub async fn with_portal(portal: Portal) -> Result<Self, Error> {
        let proxy = Proxy::new_flatpak_with_portal(portal, INTERFACE).await?;
        Ok(Self(proxy))
    }

    /// Returns the version of the portal interface.
    pub fn version(&self) -> u32 {
        self.0.version()
    }

    /// Creates an update monitor object that will emit signals
    /// when an update for the caller becomes available, and can be used to
    /// install it.
    ///
    /// # Specifications
    ///
    /// See also [`CreateUpdateMonitor`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.Flatpak.html#org-freedesktop-portal-flatpak-createupdatemonitor).
    #[doc(alias = "CreateUpdateMonitor")]
    #[doc(alias = "xdp_portal_update_monitor_start")]
    pub async fn create_update_monitor(&self) -> Result<UpdateMonitor, Error> {
        let options = CreateMonitorOptions::default();
        let path = self
            .0
            .call::<OwnedObjectPath>("CreateUpdateMonitor", &(&options,))
            .await?;
        UpdateMonitor::new(self.0.portal().clone(), path).await
    }

    /// Emitted when a process starts by [`spawn()`][`Flatpak::spawn`] with
    /// [`SpawnFlags::NotifyStart`].
    ///
    /// # Specifications
    ///
    /// See also [`SpawnStarted`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.Flatpak.html#org-freedesktop-portal-flatpak-spawnstarted).
    #[doc(alias = "SpawnStarted")]
    pub async fn receive_spawn_started(
        &self,
    ) -> Result<impl Stream<Item = SpawnStarted> + Send + Unpin + 'static, Error> {
        self.0.signal("SpawnStarted").await
    }

    /// Emitted when a process started by [`spawn()`][`Flatpak::spawn`]
    /// exits.
    ///
    /// # Specifications
    ///
    /// See also [`SpawnExited`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.Flatpak.html#org-freedesktop-portal-flatpak-spawnexited).
    #[doc(alias = "SpawnExited")]
    #[doc(alias = "XdpPortal::spawn-exited")]
    pub async fn receive_spawn_exited(
        &self,
    ) -> Result<impl Stream<Item = SpawnExited> + Send + Unpin + 'static, Error> {
        self.0.signal("SpawnExited").await
    }

    /// This methods let you start a new instance of your application,
    /// optionally enabling a tighter sandbox.
    ///
    /// # Arguments
    ///
    /// * `cwd_path` - The working directory for the new process.
    /// * `argv` - The argv for the new process, starting with the executable to
    ///   launch.
    /// * `fds` - Array of file descriptors to pass to the new process.
    /// * `envs` - Array of variable/value pairs for the environment of the new
    ///   process.
    /// * `flags`
    /// * `options` - A [`SpawnOptions`].
    ///
    /// # Returns
    ///
    /// The PID of the new process.
    ///
    /// # Specifications
    ///
    /// See also [`Spawn`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.Flatpak.html#org-freedesktop-portal-flatpak-spawn).
    #[doc(alias = "Spawn")]
    #[doc(alias = "xdp_portal_spawn")]
    pub async fn spawn(
        &self,
        cwd_path: impl AsRef<Path>,
        argv: &[impl AsRef<Path>],
        fds: HashMap<u32, Fd<'_>>,
        envs: HashMap<&str, &str>,
        flags: BitFlags<SpawnFlags>,
        options: SpawnOptions<'_>,
    ) -> Result<u32, Error> {
        let cwd_path = FilePath::new(cwd_path)?;
        let argv = argv
            .iter()
            .map(FilePath::new)
            .collect::<Result<Vec<_>, _>>()?;
        self.0
            .call(
                "Spawn",
                &(&cwd_path, &argv, &fds, &envs, flags, &options),
            )
            .await
    }

    /// This methods let you send a Unix signal to a process that was started
    /// [`spawn()`][`Flatpak::spawn`].
    ///
    /// # Arguments
    ///
    /// * `pid` - The PID of the process to send the signal to.
    /// * `signal` - The signal to send.
    /// * `to_process_group` - Whether to send the signal to the process group.
    ///
    /// # Specifications
    ///
    /// See also [`SpawnSignal`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.Flatpak.html#org-freedesktop-portal-flatpak-spawnsignal).
    #[doc(alias = "SpawnSignal")]
    #[doc(alias = "xdp_portal_spawn_signal")]
    pub async fn spawn_signal(
        &self,
        pid: u32,
        signal: u32,
        to_process_group: bool,
    ) -> Result<(), Error> {
        self.0
            .call::<()>("SpawnSignal", &(pid, signal, to_process_group))
            .await
    }

    /// Flags marking what optional features are available.
    ///
    /// # Specifications
    ///
    /// See also [`supports`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.Flatpak.html#org-freedesktop-portal-flatpak-supports).
    pub async fn supports(&self) -> Result<BitFlags<SupportsFlags>, Error> {
        let bits = self.0.property::<u32>("supports").await?;
        Ok(BitFlags::from_bits_truncate(bits))
    }
}

/// Monitor if there's an update it and install it.
pub mod update_monitor;
pub use update_monitor::{UpdateInfo, UpdateMonitor, UpdateProgress, UpdateStatus};

#[cfg(test)]
mod tests {
    use std::{fs::File, time::Duration};

    use futures_util::{pin_mut, StreamExt};
    use zbus::zvariant::{OwnedFd, OwnedValue, Value};

    use super::*;
    use crate::{
        bus::mock::{MockBus, Reply},
        proxy::FLATPAK_PATH,
    };

    #[tokio::test]
    async fn spawn_and_wait() {
        let bus = MockBus::new(":1.13");
        bus.script(INTERFACE, "Spawn", Reply::U32(4242));
        let proxy = Flatpak::with_portal(bus.portal()).await.unwrap();
        let exited = proxy.receive_spawn_exited().await.unwrap();
        pin_mut!(exited);

        let file = File::open("/dev/null").unwrap();
        let mut fds = HashMap::new();
        fds.insert(3, Fd::from(&file));
        let mut envs = HashMap::new();
        envs.insert("LANG", "C");
        let pid = proxy
            .spawn(
                "/",
                &["echo", "hi"],
                fds,
                envs,
                SpawnFlags::ClearEnv | SpawnFlags::WatchBus,
                SpawnOptions::default()
                    .sandbox_expose(&["data"])
                    .sandbox_flags(SandboxFlags::GpuAccess | SandboxFlags::SoundAccess),
            )
            .await
            .unwrap();
        assert_eq!(pid, 4242);

        let (cwd, argv, fds, envs, flags, options): (
            Vec<u8>,
            Vec<Vec<u8>>,
            HashMap<u32, OwnedFd>,
            HashMap<String, String>,
            u32,
            HashMap<String, OwnedValue>,
        ) = bus.calls("Spawn")[0].body().deserialize().unwrap();
        assert_eq!(cwd, b"/\0");
        assert_eq!(argv, vec![b"echo\0".to_vec(), b"hi\0".to_vec()]);
        assert!(fds.contains_key(&3));
        assert_eq!(envs["LANG"], "C");
        assert_eq!(flags, 17);
        assert_eq!(u32::try_from(&options["sandbox-flags"]).unwrap(), 6);
        assert_eq!(*options["sandbox-expose"], Value::from(vec!["data"]));

        bus.emit(FLATPAK_PATH, INTERFACE, "SpawnExited", &(4242u32, 0u32));
        let process = tokio::time::timeout(Duration::from_secs(1), exited.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(process.pid(), 4242);
        assert_eq!(process.exit_status(), 0);
    }

    #[tokio::test]
    async fn spawn_rejects_nul_bytes() {
        let bus = MockBus::new(":1.13");
        let proxy = Flatpak::with_portal(bus.portal()).await.unwrap();
        let err = proxy
            .spawn(
                "/",
                &["ec\0ho"],
                HashMap::new(),
                HashMap::new(),
                BitFlags::empty(),
                SpawnOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NulTerminated(2)));
        assert!(bus.calls("Spawn").is_empty());
    }

    #[tokio::test]
    async fn spawn_signal_and_supports() {
        let bus = MockBus::new(":1.13");
        bus.set_property(INTERFACE, "supports", Value::from(1u32));
        let proxy = Flatpak::with_portal(bus.portal()).await.unwrap();
        proxy.spawn_signal(4242, 15, true).await.unwrap();
        let (pid, signal, group): (u32, u32, bool) =
            bus.calls("SpawnSignal")[0].body().deserialize().unwrap();
        assert_eq!((pid, signal, group), (4242, 15, true));
        assert_eq!(
            proxy.supports().await.unwrap(),
            SupportsFlags::ExposePids
        );
    }
}
