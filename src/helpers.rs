use std::path::Path;

/// Whether the application runs inside a Flatpak sandbox.
pub(crate) fn is_flatpak() -> bool {
    Path::new("/.flatpak-info").exists()
}

/// Whether the application runs as a Snap.
pub(crate) fn is_snap() -> bool {
    std::env::var_os("SNAP").is_some_and(|snap| !snap.is_empty())
}
