use zbus::DBusError;

use crate::desktop::request::ResponseError;

/// An error flowing back from the portal frontend through a method call.
#[allow(missing_docs)]
#[derive(DBusError, Debug)]
#[zbus(prefix = "org.freedesktop.portal.Error")]
pub enum PortalError {
    #[zbus(error)]
    /// ZBus specific error.
    ZBus(zbus::Error),
    /// Request failed.
    Failed(String),
    /// Invalid arguments passed.
    InvalidArgument(String),
    /// Not found.
    NotFound(String),
    /// Exists already.
    Exist(String),
    /// Method not allowed to be called.
    NotAllowed(String),
    /// Request cancelled.
    Cancelled(String),
    /// Window destroyed.
    WindowDestroyed(String),
}

#[derive(Debug)]
#[non_exhaustive]
/// The error type for xdg-portal.
pub enum Error {
    /// The portal request didn't succeed.
    Response(ResponseError),
    /// Something failed on the portal frontend side, the method call itself
    /// failed.
    Portal(PortalError),
    /// A zbus specific error.
    Zbus(zbus::Error),
    /// A signal returned no response.
    NoResponse,
    /// The portal interface version is lower than the one required.
    ///
    /// Holds the required and the available versions.
    RequiresVersion(u32, u32),
    /// The session was closed, either by the application or by the portal.
    SessionClosed,
    /// The operation is not allowed in the current state of the session.
    InvalidSessionState,
    /// No pending inhibition is registered under that identifier.
    UnknownInhibitor(u32),
    /// The bus connection has no unique name, object paths can't be
    /// predicted.
    MissingUniqueName,
    /// A path contains a nul byte at the given position.
    NulTerminated(usize),
}

impl Error {
    /// Whether the request was cancelled, by the user or by the
    /// application.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::Response(ResponseError::Cancelled) | Self::Portal(PortalError::Cancelled(_))
        )
    }

    /// Whether the portal answered with a failure, including a missing
    /// mandatory field in an otherwise successful response.
    pub fn is_failed(&self) -> bool {
        matches!(
            self,
            Self::Response(ResponseError::Other | ResponseError::ProtocolViolation(_))
        )
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Response(e) => Some(e),
            Self::Portal(e) => Some(e),
            Self::Zbus(e) => Some(e),
            _ => None,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Response(e) => write!(f, "Portal request didn't succeed: {e}"),
            Self::Portal(e) => write!(f, "Portal request failed: {e}"),
            Self::Zbus(e) => write!(f, "ZBus Error: {e}"),
            Self::NoResponse => f.write_str("Portal error: no response"),
            Self::RequiresVersion(required, available) => write!(
                f,
                "This interface requires version {required}, but {available} is available"
            ),
            Self::SessionClosed => f.write_str("The session is closed"),
            Self::InvalidSessionState => {
                f.write_str("The operation is not allowed in the current session state")
            }
            Self::UnknownInhibitor(id) => write!(f, "No inhibitor registered with id {id}"),
            Self::MissingUniqueName => f.write_str("The bus connection has no unique name"),
            Self::NulTerminated(position) => {
                write!(f, "The path contains a nul byte at position {position}")
            }
        }
    }
}

impl From<ResponseError> for Error {
    fn from(e: ResponseError) -> Self {
        Self::Response(e)
    }
}

impl From<PortalError> for Error {
    fn from(e: PortalError) -> Self {
        Self::Portal(e)
    }
}

impl From<zbus::Error> for Error {
    fn from(e: zbus::Error) -> Self {
        Self::Zbus(e)
    }
}

impl From<zbus::fdo::Error> for Error {
    fn from(e: zbus::fdo::Error) -> Self {
        Self::Zbus(e.into())
    }
}

impl From<zbus::zvariant::Error> for Error {
    fn from(e: zbus::zvariant::Error) -> Self {
        Self::Zbus(e.into())
    }
}
