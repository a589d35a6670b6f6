use std::{
    collections::HashMap,
    fmt::{self, Debug},
    marker::PhantomData,
};

use futures_util::StreamExt;
use serde::{
    de::{self, Error as SeError, Visitor},
    Deserialize, Deserializer, Serialize,
};
use zbus::{
    message::Flags,
    zvariant::{ObjectPath, OwnedObjectPath, OwnedValue, Signature, Type},
    Message,
};

use crate::{
    bus::{SignalFilter, Subscription},
    desktop::HandleToken,
    proxy::DESKTOP_DESTINATION,
    Error, Portal,
};

pub(crate) const INTERFACE: &str = "org.freedesktop.portal.Request";

/// The decoded `(response_code, results)` tuple of a `Response` signal.
///
/// The results are only decoded when the response code is `0`.
#[derive(Debug)]
pub(crate) enum Response<T>
where
    T: for<'de> Deserialize<'de> + Type,
{
    /// Success, the request is carried out.
    Ok(T),
    /// The user cancelled the request or something else happened.
    Err(ResponseError),
}

impl<T> Type for Response<T>
where
    T: for<'de> Deserialize<'de> + Type,
{
    const SIGNATURE: &'static Signature = <(u32, HashMap<&str, OwnedValue>)>::SIGNATURE;
}

impl<'de, T> Deserialize<'de> for Response<T>
where
    T: for<'d> Deserialize<'d> + Type,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct ResponseVisitor<T>(PhantomData<fn() -> (ResponseType, T)>);

        impl<'de, T> Visitor<'de> for ResponseVisitor<T>
        where
            T: Deserialize<'de>,
        {
            type Value = (ResponseType, Option<T>);

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                write!(
                    formatter,
                    "a tuple composed of the response status along with the response"
                )
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: de::SeqAccess<'de>,
            {
                let code: u32 = seq.next_element()?.ok_or_else(|| A::Error::custom(
                    "Failed to deserialize the response. Expected a numeric (u) value as the first item of the returned tuple",
                ))?;
                let type_ = ResponseType::from(code);
                if type_ == ResponseType::Success {
                    let data: T = seq.next_element()?.ok_or_else(|| A::Error::custom(
                        "Failed to deserialize the response. Expected a vardict (a{sv}) with the returned results",
                    ))?;
                    Ok((type_, Some(data)))
                } else {
                    Ok((type_, None))
                }
            }
        }

        let visitor = ResponseVisitor::<T>(PhantomData);
        let response: (ResponseType, Option<T>) = deserializer.deserialize_tuple(2, visitor)?;
        match response {
            (ResponseType::Success, Some(data)) => Ok(Response::Ok(data)),
            (ResponseType::Success, None) => Err(D::Error::custom("Missing response results")),
            (ResponseType::Cancelled, _) => Ok(Response::Err(ResponseError::Cancelled)),
            (ResponseType::Other, _) => Ok(Response::Err(ResponseError::Other)),
        }
    }
}

#[derive(Serialize, Deserialize, Type)]
/// The most basic response. Used when only the status of the request is what we
/// receive as a response.
pub(crate) struct BasicResponse(HashMap<String, OwnedValue>);

impl Debug for BasicResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("BasicResponse").finish()
    }
}

#[derive(Debug, Copy, PartialEq, Eq, Hash, Clone)]
/// An error returned a portal request caused by either the user cancelling the
/// request or something else.
pub enum ResponseError {
    /// The user or the application cancelled the request.
    Cancelled,
    /// Something else happened.
    Other,
    /// The portal answered successfully but left out a mandatory field.
    ProtocolViolation(&'static str),
}

impl std::error::Error for ResponseError {}

impl std::fmt::Display for ResponseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => f.write_str("Cancelled"),
            Self::Other => f.write_str("Other"),
            Self::ProtocolViolation(field) => {
                write!(f, "Missing mandatory field `{field}` in the response")
            }
        }
    }
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
enum ResponseType {
    /// Success, the request is carried out.
    Success,
    /// The user cancelled the interaction.
    Cancelled,
    /// The user interaction was ended in some other way.
    Other,
}

impl From<u32> for ResponseType {
    fn from(code: u32) -> Self {
        match code {
            0 => Self::Success,
            1 => Self::Cancelled,
            _ => Self::Other,
        }
    }
}

/// A portal request in flight.
///
/// The `Response` signal subscription is installed when the request is
/// prepared, before the method creating the request object is called, and
/// removed when the request is dropped.
///
/// Wrapper of the DBus interface: [`org.freedesktop.portal.Request`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.Request.html).
#[doc(alias = "org.freedesktop.portal.Request")]
pub(crate) struct Request {
    portal: Portal,
    path: OwnedObjectPath,
    subscription: Subscription,
}

impl Request {
    /// Subscribe to the `Response` signal of the request object predicted
    /// from `handle_token`.
    pub(crate) async fn prepare(portal: &Portal, handle_token: &HandleToken) -> Result<Self, Error> {
        let path = portal.request_path(handle_token)?;
        #[cfg(feature = "tracing")]
        tracing::info!("Creating a {INTERFACE} {}", path.as_str());
        let subscription = Self::subscribe(portal, &path).await?;
        Ok(Self {
            portal: portal.clone(),
            path,
            subscription,
        })
    }

    async fn subscribe(portal: &Portal, path: &OwnedObjectPath) -> Result<Subscription, Error> {
        let filter =
            SignalFilter::new(DESKTOP_DESTINATION, INTERFACE, "Response").path(path.clone());
        portal.bus().subscribe(filter).await.map_err(From::from)
    }

    /// The request object path.
    pub(crate) fn path(&self) -> &ObjectPath<'static> {
        &self.path
    }

    /// Move the subscription over to `path` when the portal created the
    /// request object somewhere else than predicted.
    ///
    /// Portals older than 0.9 don't honor the handle token.
    pub(crate) async fn follow(&mut self, path: OwnedObjectPath) -> Result<(), Error> {
        if path == self.path {
            return Ok(());
        }
        #[cfg(feature = "tracing")]
        tracing::warn!(
            "Request object created at {} instead of {}",
            path.as_str(),
            self.path.as_str()
        );
        self.subscription = Self::subscribe(&self.portal, &path).await?;
        self.path = path;
        Ok(())
    }

    /// Wait for the `Response` signal and decode it.
    ///
    /// Code `0` yields the results, `1` [`ResponseError::Cancelled`] and
    /// anything else [`ResponseError::Other`].
    pub(crate) async fn receive_response<T>(&mut self) -> Result<T, Error>
    where
        T: for<'de> Deserialize<'de> + Type + Debug,
    {
        let message = self.subscription.next().await.ok_or(Error::NoResponse)?;
        #[cfg(feature = "tracing")]
        tracing::info!("Received signal 'Response' on '{}'", self.path.as_str());
        let response = match message.body().deserialize::<Response<T>>()? {
            Response::Err(e) => Err(e.into()),
            Response::Ok(r) => Ok(r),
        };
        #[cfg(feature = "tracing")]
        tracing::debug!("Received response {:#?}", response);
        response
    }

    /// Closes the portal request to which this object refers and ends all
    /// related user interaction (dialogs, etc). A Response signal will not
    /// be emitted in this case.
    ///
    /// Best effort, failures are only logged.
    ///
    /// # Specifications
    ///
    /// See also [`Close`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.Request.html#org-freedesktop-portal-request-close).
    #[doc(alias = "Close")]
    pub(crate) async fn close(&self) {
        close_object(&self.portal, INTERFACE, &self.path).await
    }
}

impl Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Request").field(&self.path.as_str()).finish()
    }
}

/// Send a `Close` call, not expecting any reply, to a request or session
/// object.
pub(crate) async fn close_object(portal: &Portal, interface: &'static str, path: &ObjectPath<'_>) {
    #[cfg(feature = "tracing")]
    tracing::info!("Calling method {interface}:Close on {}", path.as_str());
    let message = Message::method_call(path.to_owned(), "Close")
        .and_then(|b| b.destination(DESKTOP_DESTINATION))
        .and_then(|b| b.interface(interface))
        .and_then(|b| b.with_flags(Flags::NoReplyExpected))
        .and_then(|b| b.build(&()));
    let result = match message {
        Ok(message) => portal.bus().send(message).await,
        Err(err) => Err(err),
    };
    if let Err(_err) = result {
        #[cfg(feature = "tracing")]
        tracing::warn!("Failed to close {}: {_err}", path.as_str());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response_message(code: u32, results: HashMap<&str, zbus::zvariant::Value<'_>>) -> Message {
        Message::signal(
            "/org/freedesktop/portal/desktop/request/1_1/t",
            INTERFACE,
            "Response",
        )
        .unwrap()
        .build(&(code, results))
        .unwrap()
    }

    #[test]
    fn response_codes() {
        let mut results = HashMap::new();
        results.insert("uris", zbus::zvariant::Value::from(vec!["file:///tmp/a"]));
        let message = response_message(0, results);
        match message.body().deserialize::<Response<BasicResponse>>().unwrap() {
            Response::Ok(BasicResponse(results)) => assert!(results.contains_key("uris")),
            Response::Err(e) => panic!("unexpected {e}"),
        }

        let message = response_message(1, HashMap::new());
        assert!(matches!(
            message.body().deserialize::<Response<BasicResponse>>().unwrap(),
            Response::Err(ResponseError::Cancelled)
        ));

        for code in [2, 3, 42, u32::MAX] {
            let message = response_message(code, HashMap::new());
            assert!(matches!(
                message.body().deserialize::<Response<BasicResponse>>().unwrap(),
                Response::Err(ResponseError::Other)
            ));
        }
    }
}
