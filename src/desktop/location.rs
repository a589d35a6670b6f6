//! Query the user's location through a location session.
//!
//! Wrapper of the DBus interface: [`org.freedesktop.portal.Location`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.Location.html).
//!
//! # Examples
//!
//! ```rust,no_run
//! use futures_util::StreamExt;
//! use xdg_portal::desktop::location::{Accuracy, LocationProxy};
//!
//! async fn run() -> xdg_portal::Result<()> {
//!     let proxy = LocationProxy::new().await?;
//!     let session = proxy
//!         .create_session(None, None, Some(Accuracy::Street))
//!         .await?;
//!     let mut stream = proxy.receive_location_updated(&session).await?;
//!     proxy.start(&session, None, None).await?;
//!     if let Some(location) = stream.next().await {
//!         println!("{}", location.accuracy());
//!         println!("{}", location.longitude());
//!         println!("{}", location.latitude());
//!     }
//!     session.close().await?;
//!     Ok(())
//! }
//! ```

use std::fmt::Debug;

use futures_util::Stream;
use serde::{Deserialize, Serialize};
use serde_repr::Serialize_repr;
use zbus::zvariant::{
    as_value::{self, optional},
    ObjectPath, OwnedObjectPath, Type,
};

use super::{
    request::BasicResponse, session::SessionSignal, HandleToken, Session, SessionType,
};
use crate::{
    proxy::Proxy, window_identifier::MaybeWindowIdentifierExt, Cancellable, Error, Portal,
    WindowIdentifier,
};

const INTERFACE: &str = "org.freedesktop.portal.Location";

#[derive(Serialize_repr, PartialEq, Eq, Clone, Copy, Debug, Type)]
#[doc(alias = "XdpLocationAccuracy")]
#[repr(u32)]
/// The accuracy of the location.
pub enum Accuracy {
    #[doc(alias = "XDP_LOCATION_ACCURACY_NONE")]
    /// None.
    None = 0,
    #[doc(alias = "XDP_LOCATION_ACCURACY_COUNTRY")]
    /// Country.
    Country = 1,
    #[doc(alias = "XDP_LOCATION_ACCURACY_CITY")]
    /// City.
    City = 2,
    #[doc(alias = "XDP_LOCATION_ACCURACY_NEIGHBORHOOD")]
    /// Neighborhood.
    Neighborhood = 3,
    #[doc(alias = "XDP_LOCATION_ACCURACY_STREET")]
    /// Street.
    Street = 4,
    #[doc(alias = "XDP_LOCATION_ACCURACY_EXACT")]
    /// The exact location.
    Exact = 5,
}

#[derive(Serialize, Type, Debug, Default)]
#[zvariant(signature = "dict")]
struct CreateSessionOptions {
    #[serde(with = "as_value")]
    session_handle_token: HandleToken,
    #[serde(
        rename = "distance-threshold",
        with = "optional",
        skip_serializing_if = "Option::is_none"
    )]
    distance_threshold: Option<u32>,
    #[serde(
        rename = "time-threshold",
        with = "optional",
        skip_serializing_if = "Option::is_none"
    )]
    time_threshold: Option<u32>,
    #[serde(with = "optional", skip_serializing_if = "Option::is_none")]
    accuracy: Option<Accuracy>,
}

#[derive(Serialize, Type, Debug, Default)]
#[zvariant(signature = "dict")]
struct SessionStartOptions {
    #[serde(with = "as_value")]
    handle_token: HandleToken,
}

#[derive(Deserialize, Type)]
/// The response received on a `location_updated` signal.
pub struct Location(OwnedObjectPath, LocationInner);

impl Location {
    /// The associated session.
    pub fn session_handle(&self) -> ObjectPath<'_> {
        self.0.as_ref()
    }

    /// The accuracy, in meters.
    pub fn accuracy(&self) -> f64 {
        self.1.accuracy
    }

    /// The altitude, in meters.
    pub fn altitude(&self) -> Option<f64> {
        // -f64::MAX stands for an unknown altitude.
        if self.1.altitude == -f64::MAX {
            None
        } else {
            Some(self.1.altitude)
        }
    }

    /// The speed, in meters per second.
    pub fn speed(&self) -> Option<f64> {
        if self.1.speed == -1f64 {
            None
        } else {
            Some(self.1.speed)
        }
    }

    /// The heading, in degrees, going clockwise. North 0, East 90, South 180,
    /// West 270.
    pub fn heading(&self) -> Option<f64> {
        if self.1.heading == -1f64 {
            None
        } else {
            Some(self.1.heading)
        }
    }

    /// The location description.
    pub fn description(&self) -> Option<&str> {
        if self.1.description.is_empty() {
            None
        } else {
            Some(&self.1.description)
        }
    }

    /// The latitude, in degrees.
    pub fn latitude(&self) -> f64 {
        self.1.latitude
    }

    /// The longitude, in degrees.
    pub fn longitude(&self) -> f64 {
        self.1.longitude
    }

    /// The timestamp when the location was retrieved.
    pub fn timestamp(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.1.timestamp.0)
            + std::time::Duration::from_micros(self.1.timestamp.1)
    }
}

impl SessionSignal for Location {
    const INTERFACE: &'static str = INTERFACE;
    const MEMBER: &'static str = "LocationUpdated";

    fn session_handle(&self) -> ObjectPath<'_> {
        self.0.as_ref()
    }
}

impl Debug for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Location")
            .field("accuracy", &self.accuracy())
            .field("altitude", &self.altitude())
            .field("speed", &self.speed())
            .field("heading", &self.heading())
            .field("description", &self.description())
            .field("latitude", &self.latitude())
            .field("longitude", &self.longitude())
            .field("timestamp", &self.timestamp())
            .finish()
    }
}

#[derive(Debug, Deserialize, Type)]
#[zvariant(signature = "dict")]
#[serde(rename_all = "PascalCase")]
struct LocationInner {
    #[serde(with = "as_value")]
    accuracy: f64,
    #[serde(default = "unknown_altitude", with = "as_value")]
    altitude: f64,
    #[serde(default = "unknown", with = "as_value")]
    speed: f64,
    #[serde(default = "unknown", with = "as_value")]
    heading: f64,
    #[serde(default, with = "as_value")]
    description: String,
    #[serde(with = "as_value")]
    latitude: f64,
    #[serde(with = "as_value")]
    longitude: f64,
    #[serde(default, with = "as_value")]
    timestamp: (u64, u64),
}

fn unknown_altitude() -> f64 {
    -f64::MAX
}

fn unknown() -> f64 {
    -1f64
}

/// The interface lets sandboxed applications query basic information about
/// the location.
///
/// Wrapper of the DBus interface: [`org.freedesktop.portal.Location`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.Location.html).
#[derive(Debug, Clone)]
#[doc(alias = "org.freedesktop.portal.Location")]
pub struct LocationProxy(Proxy);

impl LocationProxy {
    /// Create a new instance of [`LocationProxy`].
    pub async fn new() -> Result<Self, Error> {
        let proxy = Proxy::new_desktop(INTERFACE).await?;
        Ok(Self(proxy))
    }

    /// Create a new instance of [`LocationProxy`] on `portal`.
    pub async fn with_portal(portal: Portal) -> Result<Self, Error> {
        let proxy = Proxy::new_desktop_with_portal(portal, INTERFACE).await?;
        Ok(Self(proxy))
    }

    /// Returns the version of the portal interface.
    pub fn version(&self) -> u32 {
        self.0.version()
    }

    /// Signal emitted when the user location is updated.
    ///
    /// Only the updates of `session` are received, the stream ends once it
    /// is closed.
    ///
    /// # Specifications
    ///
    /// See also [`LocationUpdated`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.Location.html#org-freedesktop-portal-location-locationupdated).
    #[doc(alias = "LocationUpdated")]
    #[doc(alias = "XdpPortal::location-updated")]
    pub async fn receive_location_updated(
        &self,
        session: &Session,
    ) -> Result<impl Stream<Item = Location> + Send + Unpin + 'static, Error> {
        session.ensure_kind(&[SessionType::Location])?;
        session.receive_signal::<Location>().await
    }

    /// Create a location session.
    ///
    /// # Arguments
    ///
    /// * `distance_threshold` - Sets the distance threshold in meters, default
    ///   to `0`.
    /// * `time_threshold` - Sets the time threshold in seconds, default to `0`.
    /// * `accuracy` - Sets the location accuracy, default to
    ///   [`Accuracy::Exact`].
    ///
    /// # Specifications
    ///
    /// See also [`CreateSession`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.Location.html#org-freedesktop-portal-location-createsession).
    #[doc(alias = "CreateSession")]
    pub async fn create_session(
        &self,
        distance_threshold: Option<u32>,
        time_threshold: Option<u32>,
        accuracy: Option<Accuracy>,
    ) -> Result<Session, Error> {
        let options = CreateSessionOptions {
            distance_threshold,
            time_threshold,
            accuracy,
            ..Default::default()
        };
        let pending = self
            .0
            .create_session_direct(
                SessionType::Location,
                &options.session_handle_token,
                "CreateSession",
                &(&options,),
            )
            .await?;
        Ok(pending.finish())
    }

    /// Start the location session.
    /// An application can only attempt start a session once.
    ///
    /// # Arguments
    ///
    /// * `session` - A [`Session`], created with
    ///   [`create_session()`][`LocationProxy::create_session`].
    /// * `identifier` - Identifier for the application window.
    ///
    /// # Specifications
    ///
    /// See also [`Start`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.Location.html#org-freedesktop-portal-location-start).
    #[doc(alias = "Start")]
    #[doc(alias = "xdp_portal_location_monitor_start")]
    pub async fn start(
        &self,
        session: &Session,
        identifier: Option<&WindowIdentifier>,
        cancellable: Option<&Cancellable>,
    ) -> Result<(), Error> {
        session.ensure_kind(&[SessionType::Location])?;
        let options = SessionStartOptions::default();
        let identifier = identifier.to_string_or_empty();
        session
            .start::<BasicResponse>(
                &self.0,
                &options.handle_token,
                "Start",
                &(session, &identifier, &options),
                cancellable,
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, time::Duration};

    use futures_util::{FutureExt, StreamExt};
    use zbus::zvariant::Value;

    use super::*;
    use crate::{
        bus::mock::{MockBus, Reply},
        desktop::SessionState,
        proxy::DESKTOP_PATH,
    };

    const SESSION: &str = "/org/freedesktop/portal/desktop/session/1_6/location";

    fn update(latitude: f64) -> HashMap<&'static str, Value<'static>> {
        let mut location = HashMap::new();
        location.insert("Latitude", Value::from(latitude));
        location.insert("Longitude", Value::from(2.35));
        location.insert("Accuracy", Value::from(10.0));
        location.insert("Altitude", Value::from(-f64::MAX));
        location.insert("Timestamp", Value::from((1_700_000_000u64, 0u64)));
        location
    }

    #[tokio::test]
    async fn location_session() {
        let bus = MockBus::new(":1.6");
        bus.script(INTERFACE, "CreateSession", Reply::Path(SESSION));
        let proxy = LocationProxy::with_portal(bus.portal()).await.unwrap();
        let session = proxy
            .create_session(Some(100), None, Some(Accuracy::City))
            .await
            .unwrap();
        assert_eq!(session.path().as_str(), SESSION);
        assert_eq!(session.state(), SessionState::Initial);

        bus.respond(INTERFACE, "Start", 0, HashMap::new());
        proxy.start(&session, None, None).await.unwrap();
        assert_eq!(session.state(), SessionState::Active);

        let handle = OwnedObjectPath::try_from(SESSION).unwrap();
        bus.emit(DESKTOP_PATH, INTERFACE, "LocationUpdated", &(&handle, update(48.85)));
        let other = OwnedObjectPath::try_from("/org/freedesktop/portal/desktop/session/1_6/other")
            .unwrap();
        bus.emit(DESKTOP_PATH, INTERFACE, "LocationUpdated", &(&other, update(0.0)));

        let updates = proxy.receive_location_updated(&session).await.unwrap();
        futures_util::pin_mut!(updates);
        let location = tokio::time::timeout(Duration::from_secs(1), updates.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(location.latitude(), 48.85);
        assert_eq!(location.altitude(), None);
        assert_eq!(location.speed(), None);
        assert_eq!(location.description(), None);
        assert!(updates.next().now_or_never().is_none());

        assert!(matches!(
            proxy.start(&session, None, None).await,
            Err(Error::InvalidSessionState)
        ));
    }
}
