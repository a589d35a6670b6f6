use std::{
    collections::HashMap,
    fmt,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc, Mutex, OnceLock,
    },
};

use zbus::zvariant::{ObjectPath, OwnedObjectPath};

use crate::{bus::Bus, desktop::HandleToken, Error};

static GLOBAL: OnceLock<Portal> = OnceLock::new();

const REQUEST_PREFIX: &str = "/org/freedesktop/portal/desktop/request";
const SESSION_PREFIX: &str = "/org/freedesktop/portal/desktop/session";

/// The bus connection every portal call goes through.
///
/// It holds the transport along with the sender token, the caller's unique
/// name with the leading `:` removed and the `.` replaced by `_`, out of
/// which the request and session object paths are predicted.
///
/// Cloning is cheap, clones share the same connection.
#[derive(Clone)]
pub struct Portal(Arc<PortalInner>);

struct PortalInner {
    bus: Arc<dyn Bus>,
    sender_token: String,
    inhibitors: Mutex<HashMap<u32, OwnedObjectPath>>,
    next_inhibitor: AtomicU32,
}

impl Portal {
    /// Connect to the session bus.
    pub async fn new() -> Result<Self, Error> {
        let connection = zbus::Connection::session().await?;
        Self::with_connection(connection)
    }

    /// Use an already established connection.
    pub fn with_connection(connection: zbus::Connection) -> Result<Self, Error> {
        Self::with_bus(Arc::new(connection))
    }

    /// Use any [`Bus`] implementation as the transport.
    ///
    /// Fails with [`Error::MissingUniqueName`] when the bus has no unique
    /// name, object paths can't be predicted without it.
    pub fn with_bus(bus: Arc<dyn Bus>) -> Result<Self, Error> {
        let unique_name = bus.unique_name().ok_or(Error::MissingUniqueName)?;
        let sender_token = unique_name.trim_start_matches(':').replace('.', "_");
        #[cfg(feature = "tracing")]
        tracing::debug!("Portal context created for {unique_name}");
        Ok(Self(Arc::new(PortalInner {
            bus,
            sender_token,
            inhibitors: Mutex::new(HashMap::new()),
            next_inhibitor: AtomicU32::new(1),
        })))
    }

    /// The process wide context, connected to the session bus on first
    /// use.
    pub async fn global() -> Result<Self, Error> {
        if let Some(portal) = GLOBAL.get() {
            return Ok(portal.clone());
        }
        let portal = Self::new().await?;
        Ok(GLOBAL.get_or_init(|| portal).clone())
    }

    /// The sanitized unique name used in the predicted object paths.
    pub fn sender_token(&self) -> &str {
        &self.0.sender_token
    }

    /// `/org/freedesktop/portal/desktop/request/SENDER/TOKEN`
    pub fn request_path(&self, token: &HandleToken) -> Result<OwnedObjectPath, Error> {
        self.path(REQUEST_PREFIX, token)
    }

    /// `/org/freedesktop/portal/desktop/session/SENDER/TOKEN`
    pub fn session_path(&self, token: &HandleToken) -> Result<OwnedObjectPath, Error> {
        self.path(SESSION_PREFIX, token)
    }

    fn path(&self, prefix: &str, token: &HandleToken) -> Result<OwnedObjectPath, Error> {
        let path = ObjectPath::try_from(format!("{prefix}/{}/{token}", self.0.sender_token))?;
        Ok(path.into())
    }

    pub(crate) fn bus(&self) -> &Arc<dyn Bus> {
        &self.0.bus
    }

    /// Ids are never 0 and never one still registered, even once the counter
    /// wraps around.
    pub(crate) fn register_inhibitor(&self, request: OwnedObjectPath) -> u32 {
        let mut inhibitors = self.inhibitors();
        let id = loop {
            let id = self.0.next_inhibitor.fetch_add(1, Ordering::Relaxed);
            if id != 0 && !inhibitors.contains_key(&id) {
                break id;
            }
        };
        inhibitors.insert(id, request);
        id
    }

    pub(crate) fn take_inhibitor(&self, id: u32) -> Option<OwnedObjectPath> {
        self.inhibitors().remove(&id)
    }

    fn inhibitors(&self) -> std::sync::MutexGuard<'_, HashMap<u32, OwnedObjectPath>> {
        match self.0.inhibitors.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl fmt::Debug for Portal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Portal")
            .field("sender_token", &self.0.sender_token)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;
    use crate::bus::mock::MockBus;

    #[test]
    fn predicted_paths() {
        let portal = MockBus::new(":1.156").portal();
        assert_eq!(portal.sender_token(), "1_156");

        let token = HandleToken::from_str("xdgportal_abc").unwrap();
        assert_eq!(
            portal.request_path(&token).unwrap().as_str(),
            "/org/freedesktop/portal/desktop/request/1_156/xdgportal_abc"
        );
        assert_eq!(
            portal.session_path(&token).unwrap().as_str(),
            "/org/freedesktop/portal/desktop/session/1_156/xdgportal_abc"
        );
    }

    #[test]
    fn requires_unique_name() {
        let bus = MockBus::anonymous();
        assert!(matches!(
            Portal::with_bus(bus),
            Err(Error::MissingUniqueName)
        ));
    }

    #[test]
    fn inhibitor_table() {
        let portal = MockBus::new(":1.2").portal();
        let path = OwnedObjectPath::try_from("/org/freedesktop/portal/desktop/request/1_2/a").unwrap();
        let first = portal.register_inhibitor(path.clone());
        let second = portal.register_inhibitor(path.clone());
        assert_ne!(first, second);
        assert_eq!(portal.take_inhibitor(first), Some(path));
        assert_eq!(portal.take_inhibitor(first), None);
        assert!(portal.take_inhibitor(second).is_some());
    }

    #[test]
    fn inhibitor_ids_skip_zero_on_wrap() {
        let portal = MockBus::new(":1.2").portal();
        let path = OwnedObjectPath::try_from("/org/freedesktop/portal/desktop/request/1_2/a").unwrap();
        assert_eq!(portal.register_inhibitor(path.clone()), 1);

        portal.0.next_inhibitor.store(u32::MAX, Ordering::Relaxed);
        assert_eq!(portal.register_inhibitor(path.clone()), u32::MAX);
        // 0 is skipped, 1 is still held.
        assert_eq!(portal.register_inhibitor(path.clone()), 2);
        assert_eq!(portal.take_inhibitor(0), None);
        assert_eq!(portal.take_inhibitor(1), Some(path));
    }
}
