//! Capture input events from physical or logical devices.
//!
//! Input capture sessions are active as soon as they are created: the zone,
//! activation and disable signals are subscribed to along with the session.
//!
//! # Examples
//!
//! ## A note of warning on Barrier placement
//!
//! Barriers are placed along the edges of the zones returned by
//! [`InputCapture::zones`]. A barrier outside of a zone edge is rejected and
//! reported back in [`InputCapture::set_pointer_barriers`] results.
//!
//! ## Capturing input once the pointer crosses the left edge
//!
//! ```rust,no_run
//! use std::num::NonZeroU32;
//!
//! use futures_util::StreamExt;
//! use xdg_portal::desktop::input_capture::{Barrier, Capabilities, InputCapture};
//!
//! async fn run() -> xdg_portal::Result<()> {
//!     let input_capture = InputCapture::new().await?;
//!     let session = input_capture
//!         .create_session(
//!             None,
//!             Capabilities::Keyboard | Capabilities::Pointer | Capabilities::Touchscreen,
//!             None,
//!         )
//!         .await?;
//!     let zones = input_capture.zones(&session, None).await?;
//!
//!     let barriers = zones
//!         .regions()
//!         .iter()
//!         .enumerate()
//!         .filter_map(|(n, region)| {
//!             let id = NonZeroU32::new(n as u32 + 1)?;
//!             let x = region.x_offset();
//!             let y = region.y_offset();
//!             Some(Barrier::new(id, (x, y, x, y + region.height() as i32 - 1)))
//!         })
//!         .collect::<Vec<_>>();
//!     let failed = input_capture
//!         .set_pointer_barriers(&session, &barriers, zones.zone_set(), None)
//!         .await?;
//!     println!("rejected barriers: {failed:?}");
//!
//!     let mut activated = input_capture.receive_activated(&session).await?;
//!     input_capture.enable(&session).await?;
//!     if let Some(activated) = activated.next().await {
//!         println!("activated by {:?}", activated.barrier_id());
//!         input_capture
//!             .release(&session, activated.activation_id(), None)
//!             .await?;
//!     }
//!     session.close().await?;
//!     Ok(())
//! }
//! ```

use std::{collections::HashMap, fmt::Debug, num::NonZeroU32, os::fd::OwnedFd};

use enumflags2::{bitflags, BitFlags};
use futures_util::Stream;
use serde::{de::Visitor, Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};
use zbus::zvariant::{
    self,
    as_value::{self, optional},
    ObjectPath, OwnedObjectPath, OwnedValue, Type, Value,
};

use super::{session::SessionSignal, HandleToken, ResponseError, Session, SessionType};
use crate::{
    proxy::Proxy, window_identifier::MaybeWindowIdentifierExt, Cancellable, Error, Portal,
    WindowIdentifier,
};

const INTERFACE: &str = "org.freedesktop.portal.InputCapture";

#[bitflags]
#[derive(Serialize_repr, Deserialize_repr, PartialEq, Eq, Debug, Clone, Copy, Type)]
#[repr(u32)]
#[doc(alias = "XdpInputCapability")]
/// Supported capabilities
pub enum Capabilities {
    /// Keyboard
    Keyboard,
    /// Pointer
    Pointer,
    /// Touchscreen
    Touchscreen,
}

#[derive(Serialize, Type, Debug, Default)]
#[zvariant(signature = "dict")]
struct CreateSessionOptions {
    #[serde(with = "as_value")]
    handle_token: HandleToken,
    #[serde(with = "as_value")]
    session_handle_token: HandleToken,
    #[serde(with = "as_value")]
    capabilities: BitFlags<Capabilities>,
}

#[derive(Serialize, Type, Debug, Default)]
#[zvariant(signature = "dict")]
struct GetZonesOptions {
    #[serde(with = "as_value")]
    handle_token: HandleToken,
}

#[derive(Serialize, Type, Debug, Default)]
#[zvariant(signature = "dict")]
struct SetPointerBarriersOptions {
    #[serde(with = "as_value")]
    handle_token: HandleToken,
}

#[derive(Serialize, Type, Debug, Default)]
#[zvariant(signature = "dict")]
struct ReleaseOptions {
    #[serde(with = "optional", skip_serializing_if = "Option::is_none")]
    activation_id: Option<u32>,
    #[serde(with = "optional", skip_serializing_if = "Option::is_none")]
    cursor_position: Option<(f64, f64)>,
}

/// Indicates that an input capturing session was disabled.
#[derive(Debug, Deserialize, Type)]
#[zvariant(signature = "(oa{sv})")]
pub struct Disabled(OwnedObjectPath, HashMap<String, OwnedValue>);

impl Disabled {
    /// Session that was disabled.
    pub fn session_handle(&self) -> ObjectPath<'_> {
        self.0.as_ref()
    }

    /// Optional information
    pub fn options(&self) -> &HashMap<String, OwnedValue> {
        &self.1
    }
}

impl SessionSignal for Disabled {
    const INTERFACE: &'static str = INTERFACE;
    const MEMBER: &'static str = "Disabled";

    fn session_handle(&self) -> ObjectPath<'_> {
        self.0.as_ref()
    }
}

#[derive(Debug, Deserialize, Type)]
#[zvariant(signature = "dict")]
struct DeactivatedOptions {
    #[serde(default, with = "optional")]
    activation_id: Option<u32>,
}

/// Indicates that an input capturing session was deactivated.
#[derive(Debug, Deserialize, Type)]
#[zvariant(signature = "(oa{sv})")]
pub struct Deactivated(OwnedObjectPath, DeactivatedOptions);

impl Deactivated {
    /// Session that was deactivated.
    pub fn session_handle(&self) -> ObjectPath<'_> {
        self.0.as_ref()
    }

    /// The same activation_id number as in the corresponding "Activated"
    /// signal.
    pub fn activation_id(&self) -> Option<u32> {
        self.1.activation_id
    }
}

impl SessionSignal for Deactivated {
    const INTERFACE: &'static str = INTERFACE;
    const MEMBER: &'static str = "Deactivated";

    fn session_handle(&self) -> ObjectPath<'_> {
        self.0.as_ref()
    }
}

#[derive(Debug, Deserialize, Type)]
#[zvariant(signature = "dict")]
struct ActivatedOptions {
    #[serde(default, with = "optional")]
    activation_id: Option<u32>,
    #[serde(default, with = "optional")]
    cursor_position: Option<(f64, f64)>,
    #[serde(default, with = "optional")]
    barrier_id: Option<ActivatedBarrier>,
}

/// Indicates that an input capturing session was activated.
#[derive(Debug, Deserialize, Type)]
#[zvariant(signature = "(oa{sv})")]
pub struct Activated(OwnedObjectPath, ActivatedOptions);

impl Activated {
    /// Session that was activated.
    pub fn session_handle(&self) -> ObjectPath<'_> {
        self.0.as_ref()
    }

    /// A number that can be used to synchronize with the transport-layer.
    pub fn activation_id(&self) -> Option<u32> {
        self.1.activation_id
    }

    /// The current cursor position in the same coordinate space as the zones.
    pub fn cursor_position(&self) -> Option<(f64, f64)> {
        self.1.cursor_position
    }

    /// The barrier that was triggered or None,
    /// if the input-capture was not triggered by a barrier
    pub fn barrier_id(&self) -> Option<ActivatedBarrier> {
        self.1.barrier_id
    }
}

impl SessionSignal for Activated {
    const INTERFACE: &'static str = INTERFACE;
    const MEMBER: &'static str = "Activated";

    fn session_handle(&self) -> ObjectPath<'_> {
        self.0.as_ref()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Type)]
#[zvariant(signature = "u")]
/// The barrier an activation was triggered by.
pub enum ActivatedBarrier {
    /// [`BarrierID`] of the triggered barrier
    Barrier(BarrierID),
    /// The id of the triggered barrier could not be determined,
    /// e.g. because of multiple barriers at the same location.
    UnknownBarrier,
}

impl<'de> Deserialize<'de> for ActivatedBarrier {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_u32(ActivatedBarrierVisitor)
    }
}

struct ActivatedBarrierVisitor;

impl Visitor<'_> for ActivatedBarrierVisitor {
    type Value = ActivatedBarrier;

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(formatter, "an unsigned 32bit integer (u32)")
    }

    fn visit_u32<E>(self, v: u32) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(match BarrierID::new(v) {
            Some(id) => ActivatedBarrier::Barrier(id),
            None => ActivatedBarrier::UnknownBarrier,
        })
    }
}

#[derive(Debug, Deserialize, Type)]
#[zvariant(signature = "dict")]
struct ZonesChangedOptions {
    #[serde(default, with = "optional")]
    zone_set: Option<u32>,
}

/// Indicates that zones available to this session changed.
#[derive(Debug, Deserialize, Type)]
#[zvariant(signature = "(oa{sv})")]
pub struct ZonesChanged(OwnedObjectPath, ZonesChangedOptions);

impl ZonesChanged {
    /// Session whose zones changed.
    pub fn session_handle(&self) -> ObjectPath<'_> {
        self.0.as_ref()
    }

    /// The zone_set ID of the invalidated zone.
    pub fn zone_set(&self) -> Option<u32> {
        self.1.zone_set
    }
}

impl SessionSignal for ZonesChanged {
    const INTERFACE: &'static str = INTERFACE;
    const MEMBER: &'static str = "ZonesChanged";

    fn session_handle(&self) -> ObjectPath<'_> {
        self.0.as_ref()
    }
}

/// A region of a [`Zones`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Type)]
#[zvariant(signature = "(uuii)")]
pub struct Region(u32, u32, i32, i32);

impl Region {
    /// The width.
    pub fn width(self) -> u32 {
        self.0
    }

    /// The height
    pub fn height(self) -> u32 {
        self.1
    }

    /// The x offset.
    pub fn x_offset(self) -> i32 {
        self.2
    }

    /// The y offset.
    pub fn y_offset(self) -> i32 {
        self.3
    }
}

#[derive(Debug, Deserialize, Type)]
#[zvariant(signature = "dict")]
struct ZonesResponse {
    #[serde(default, with = "optional")]
    zones: Option<Vec<Region>>,
    #[serde(default, with = "optional")]
    zone_set: Option<u32>,
}

/// A response of [`InputCapture::zones`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Zones {
    zones: Vec<Region>,
    zone_set: u32,
}

impl Zones {
    /// A list of regions.
    pub fn regions(&self) -> &[Region] {
        &self.zones
    }

    /// A unique ID to be used in [`InputCapture::set_pointer_barriers`].
    pub fn zone_set(&self) -> u32 {
        self.zone_set
    }
}

impl TryFrom<ZonesResponse> for Zones {
    type Error = ResponseError;

    fn try_from(response: ZonesResponse) -> Result<Self, Self::Error> {
        Ok(Self {
            zones: response
                .zones
                .ok_or(ResponseError::ProtocolViolation("zones"))?,
            zone_set: response
                .zone_set
                .ok_or(ResponseError::ProtocolViolation("zone_set"))?,
        })
    }
}

/// A barrier ID.
pub type BarrierID = NonZeroU32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Type)]
#[zvariant(signature = "dict")]
/// Input Barrier.
pub struct Barrier {
    #[serde(with = "as_value")]
    barrier_id: BarrierID,
    #[serde(with = "as_value")]
    position: (i32, i32, i32, i32),
}

impl Barrier {
    /// Create a new barrier going from `(x1, y1)` to `(x2, y2)`.
    pub fn new(barrier_id: BarrierID, position: (i32, i32, i32, i32)) -> Self {
        Self {
            barrier_id,
            position,
        }
    }

    /// The barrier id.
    pub fn id(&self) -> BarrierID {
        self.barrier_id
    }
}

#[derive(Debug, Deserialize, Type)]
#[zvariant(signature = "dict")]
struct SetPointerBarriersResponse {
    #[serde(default, with = "optional")]
    failed_barriers: Option<Vec<u32>>,
}

/// An input capture session, the capabilities granted by the portal along
/// with the [`Session`] they belong to.
///
/// The wrapper keeps the session alive. Once the session is closed, every
/// call made through the wrapper fails with [`Error::SessionClosed`].
#[derive(Debug, Clone)]
pub struct InputCaptureSession {
    session: Session,
    capabilities: BitFlags<Capabilities>,
}

impl InputCaptureSession {
    /// The underlying session.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// The capabilities granted for the session.
    pub fn capabilities(&self) -> BitFlags<Capabilities> {
        self.capabilities
    }

    /// Closes the session.
    pub async fn close(&self) -> Result<(), Error> {
        self.session.close().await
    }

    fn active(&self) -> Result<&Session, Error> {
        self.session.ensure_active()?;
        Ok(&self.session)
    }
}

/// Wrapper of the DBus interface: [`org.freedesktop.portal.InputCapture`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.InputCapture.html).
#[derive(Debug)]
#[doc(alias = "org.freedesktop.portal.InputCapture")]
pub struct InputCapture(Proxy);

impl InputCapture {
    /// Create a new instance of [`InputCapture`].
    pub async fn new() -> Result<Self, Error> {
        let proxy = Proxy::new_desktop(INTERFACE).await?;
        Ok(Self(proxy))
    }

    /// Create a new instance of [`InputCapture`] on `portal`.
    pub async fn with_portal(portal: Portal) -> Result<Self, Error> {
        let proxy = Proxy::new_desktop_with_portal(portal, INTERFACE).await?;
        Ok(Self(proxy))
    }

    /// Returns the version of the portal interface.
    pub fn version(&self) -> u32 {
        self.0.version()
    }

    /// Create an input capture session.
    ///
    /// The returned session is active, its zone and activation signals are
    /// received from now on.
    ///
    /// # Specifications
    ///
    /// See also [`CreateSession`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.InputCapture.html#org-freedesktop-portal-inputcapture-createsession).
    #[doc(alias = "CreateSession")]
    #[doc(alias = "xdp_portal_create_input_capture_session")]
    pub async fn create_session(
        &self,
        identifier: Option<&WindowIdentifier>,
        capabilities: BitFlags<Capabilities>,
        cancellable: Option<&Cancellable>,
    ) -> Result<InputCaptureSession, Error> {
        let options = CreateSessionOptions {
            capabilities,
            ..Default::default()
        };
        let identifier = identifier.to_string_or_empty();
        let (pending, results) = self
            .0
            .create_session(
                SessionType::InputCapture,
                &options.handle_token,
                &options.session_handle_token,
                "CreateSession",
                &(&identifier, &options),
                cancellable,
            )
            .await?;
        let granted = match results.get("capabilities").map(u32::try_from) {
            Some(Ok(bits)) => BitFlags::from_bits_truncate(bits),
            _ => {
                pending.session().close().await?;
                return Err(ResponseError::ProtocolViolation("capabilities").into());
            }
        };
        Ok(InputCaptureSession {
            session: pending.finish(),
            capabilities: granted,
        })
    }

    /// A set of currently available input zones for this session.
    ///
    /// # Specifications
    ///
    /// See also [`GetZones`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.InputCapture.html#org-freedesktop-portal-inputcapture-getzones).
    #[doc(alias = "GetZones")]
    pub async fn zones(
        &self,
        session: &InputCaptureSession,
        cancellable: Option<&Cancellable>,
    ) -> Result<Zones, Error> {
        let session = session.active()?;
        let options = GetZonesOptions::default();
        let response = self
            .0
            .request::<ZonesResponse>(
                &options.handle_token,
                "GetZones",
                &(session, &options),
                cancellable,
            )
            .await?;
        Ok(Zones::try_from(response)?)
    }

    /// Set up zero or more pointer barriers, replacing the ones set before.
    ///
    /// Returns the ids of the barriers the portal rejected.
    ///
    /// # Specifications
    ///
    /// See also [`SetPointerBarriers`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.InputCapture.html#org-freedesktop-portal-inputcapture-setpointerbarriers).
    #[doc(alias = "SetPointerBarriers")]
    pub async fn set_pointer_barriers(
        &self,
        session: &InputCaptureSession,
        barriers: &[Barrier],
        zone_set: u32,
        cancellable: Option<&Cancellable>,
    ) -> Result<Vec<BarrierID>, Error> {
        let session = session.active()?;
        let options = SetPointerBarriersOptions::default();
        let response = self
            .0
            .request::<SetPointerBarriersResponse>(
                &options.handle_token,
                "SetPointerBarriers",
                &(session, &options, barriers, zone_set),
                cancellable,
            )
            .await?;
        Ok(response
            .failed_barriers
            .unwrap_or_default()
            .into_iter()
            .filter_map(BarrierID::new)
            .collect())
    }

    /// Enable input capturing.
    ///
    /// # Specifications
    ///
    /// See also [`Enable`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.InputCapture.html#org-freedesktop-portal-inputcapture-enable).
    #[doc(alias = "Enable")]
    pub async fn enable(&self, session: &InputCaptureSession) -> Result<(), Error> {
        let session = session.active()?;
        self.0.call::<()>("Enable", &(session, empty())).await
    }

    /// Disable input capturing.
    ///
    /// # Specifications
    ///
    /// See also [`Disable`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.InputCapture.html#org-freedesktop-portal-inputcapture-disable).
    #[doc(alias = "Disable")]
    pub async fn disable(&self, session: &InputCaptureSession) -> Result<(), Error> {
        let session = session.active()?;
        self.0.call::<()>("Disable", &(session, empty())).await
    }

    /// Release any ongoing input capture.
    ///
    /// # Arguments
    ///
    /// * `activation_id` - The id of the [`Activated`] signal being answered.
    /// * `cursor_position` - Where to warp the pointer to, in the zones
    ///   coordinate space.
    ///
    /// # Specifications
    ///
    /// See also [`Release`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.InputCapture.html#org-freedesktop-portal-inputcapture-release).
    #[doc(alias = "Release")]
    pub async fn release(
        &self,
        session: &InputCaptureSession,
        activation_id: Option<u32>,
        cursor_position: Option<(f64, f64)>,
    ) -> Result<(), Error> {
        let session = session.active()?;
        let options = ReleaseOptions {
            activation_id,
            cursor_position,
        };
        self.0.call::<()>("Release", &(session, &options)).await
    }

    /// Connect to EIS.
    ///
    /// # Specifications
    ///
    /// See also [`ConnectToEIS`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.InputCapture.html#org-freedesktop-portal-inputcapture-connecttoeis).
    #[doc(alias = "ConnectToEIS")]
    pub async fn connect_to_eis(&self, session: &InputCaptureSession) -> Result<OwnedFd, Error> {
        let session = session.active()?;
        let fd = self
            .0
            .call::<zvariant::OwnedFd>("ConnectToEIS", &(session, empty()))
            .await?;
        Ok(fd.into())
    }

    /// Signal emitted when the application will no longer receive captured
    /// events.
    ///
    /// # Specifications
    ///
    /// See also [`Disabled`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.InputCapture.html#org-freedesktop-portal-inputcapture-disabled).
    #[doc(alias = "Disabled")]
    pub async fn receive_disabled(
        &self,
        session: &InputCaptureSession,
    ) -> Result<impl Stream<Item = Disabled> + Send + Unpin + 'static, Error> {
        session.session.receive_signal::<Disabled>().await
    }

    /// Signal emitted when input capture starts.
    ///
    /// # Specifications
    ///
    /// See also [`Activated`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.InputCapture.html#org-freedesktop-portal-inputcapture-activated).
    #[doc(alias = "Activated")]
    pub async fn receive_activated(
        &self,
        session: &InputCaptureSession,
    ) -> Result<impl Stream<Item = Activated> + Send + Unpin + 'static, Error> {
        session.session.receive_signal::<Activated>().await
    }

    /// Signal emitted when input capture stopped.
    ///
    /// # Specifications
    ///
    /// See also [`Deactivated`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.InputCapture.html#org-freedesktop-portal-inputcapture-deactivated).
    #[doc(alias = "Deactivated")]
    pub async fn receive_deactivated(
        &self,
        session: &InputCaptureSession,
    ) -> Result<impl Stream<Item = Deactivated> + Send + Unpin + 'static, Error> {
        session.session.receive_signal::<Deactivated>().await
    }

    /// Signal emitted when the set of zones available to the session changed.
    ///
    /// # Specifications
    ///
    /// See also [`ZonesChanged`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.InputCapture.html#org-freedesktop-portal-inputcapture-zoneschanged).
    #[doc(alias = "ZonesChanged")]
    pub async fn receive_zones_changed(
        &self,
        session: &InputCaptureSession,
    ) -> Result<impl Stream<Item = ZonesChanged> + Send + Unpin + 'static, Error> {
        session.session.receive_signal::<ZonesChanged>().await
    }

    /// Supported capabilities.
    ///
    /// # Specifications
    ///
    /// See also [`SupportedCapabilities`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.InputCapture.html#org-freedesktop-portal-inputcapture-supportedcapabilities).
    #[doc(alias = "SupportedCapabilities")]
    pub async fn supported_capabilities(&self) -> Result<BitFlags<Capabilities>, Error> {
        let bits = self.0.property::<u32>("SupportedCapabilities").await?;
        Ok(BitFlags::from_bits_truncate(bits))
    }
}

fn empty() -> HashMap<&'static str, Value<'static>> {
    HashMap::new()
}
