//! An in-memory portal backend recording everything the engines do.
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;
use serde::Serialize;
use zbus::{
    zvariant::{DynamicType, OwnedObjectPath, OwnedValue, Value},
    Message,
};

use super::{Bus, SignalFilter, SignalSender, Subscription};
use crate::{desktop::request::INTERFACE as REQUEST_INTERFACE, Portal};

/// What the engines did, in order.
#[derive(Debug, Clone)]
pub(crate) enum Event {
    Subscribe {
        interface: &'static str,
        member: &'static str,
        path: Option<String>,
    },
    Call {
        interface: String,
        member: String,
        path: String,
        message: Message,
    },
    Send {
        interface: String,
        member: String,
        path: String,
        message: Message,
    },
}

/// How the backend answers a method call.
pub(crate) enum Reply {
    /// Reply with the request object path, emitting the `Response` signal
    /// before the reply.
    Respond(u32, HashMap<String, OwnedValue>),
    /// Reply with the request object path, never respond.
    Pending,
    /// Fail the method call.
    Fail(&'static str),
    /// Reply with a fixed object path.
    Path(&'static str),
    /// Reply with a number.
    U32(u32),
    /// Reply with a variant.
    Value(OwnedValue),
    /// Reply with a boolean.
    Bool(bool),
    /// Reply with nothing.
    Unit,
    /// Reply with a custom body.
    Build(fn(zbus::message::Builder<'_>) -> zbus::Result<Message>),
}

#[derive(Default)]
struct State {
    events: Vec<Event>,
    subscribers: Vec<(SignalFilter, SignalSender)>,
    replies: HashMap<(String, String), Reply>,
    properties: HashMap<(String, String), OwnedValue>,
}

pub(crate) struct MockBus {
    unique_name: Option<String>,
    state: Mutex<State>,
}

impl MockBus {
    pub(crate) fn new(unique_name: &str) -> Arc<Self> {
        Arc::new(Self {
            unique_name: Some(unique_name.to_owned()),
            state: Mutex::default(),
        })
    }

    pub(crate) fn anonymous() -> Arc<Self> {
        Arc::new(Self {
            unique_name: None,
            state: Mutex::default(),
        })
    }

    pub(crate) fn portal(self: &Arc<Self>) -> Portal {
        Portal::with_bus(self.clone()).unwrap()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub(crate) fn results<const N: usize>(
        entries: [(&str, Value<'_>); N],
    ) -> HashMap<String, OwnedValue> {
        entries
            .into_iter()
            .map(|(key, value)| (key.to_owned(), OwnedValue::try_from(value).unwrap()))
            .collect()
    }

    pub(crate) fn script(&self, interface: &str, method: &str, reply: Reply) {
        self.state()
            .replies
            .insert((interface.to_owned(), method.to_owned()), reply);
    }

    pub(crate) fn respond(
        &self,
        interface: &str,
        method: &str,
        code: u32,
        results: HashMap<String, OwnedValue>,
    ) {
        self.script(interface, method, Reply::Respond(code, results));
    }

    pub(crate) fn set_version(&self, interface: &str, version: u32) {
        self.set_property(interface, "version", Value::from(version));
    }

    pub(crate) fn set_property(&self, interface: &str, name: &str, value: Value<'_>) {
        self.state().properties.insert(
            (interface.to_owned(), name.to_owned()),
            OwnedValue::try_from(value).unwrap(),
        );
    }

    pub(crate) fn events(&self) -> Vec<Event> {
        self.state().events.clone()
    }

    /// The method calls made to `member`, oldest first.
    pub(crate) fn calls(&self, member: &str) -> Vec<Message> {
        self.state()
            .events
            .iter()
            .filter_map(|event| match event {
                Event::Call {
                    member: m, message, ..
                } if m == member => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    /// The messages sent without expecting a reply to `member`.
    pub(crate) fn sent(&self, member: &str) -> Vec<Message> {
        self.state()
            .events
            .iter()
            .filter_map(|event| match event {
                Event::Send {
                    member: m, message, ..
                } if m == member => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    /// How many `Close` calls reached `path`.
    pub(crate) fn closes(&self, path: &str) -> usize {
        self.state()
            .events
            .iter()
            .filter(|event| {
                matches!(event, Event::Send { member, path: p, .. } if member == "Close" && p == path)
            })
            .count()
    }

    /// Live subscriptions to the signal `member`.
    pub(crate) fn subscribers(&self, member: &str) -> usize {
        let mut state = self.state();
        state.subscribers.retain(|(_, sender)| !sender.is_closed());
        state
            .subscribers
            .iter()
            .filter(|(filter, _)| filter.member() == member)
            .count()
    }

    pub(crate) fn emit<B>(&self, path: &str, interface: &str, member: &str, body: &B)
    where
        B: Serialize + DynamicType,
    {
        let message = Message::signal(path, interface, member)
            .unwrap()
            .build(body)
            .unwrap();
        Self::deliver(&mut self.state(), message);
    }

    pub(crate) fn emit_response(&self, path: &str, code: u32, results: HashMap<String, OwnedValue>) {
        self.emit(path, REQUEST_INTERFACE, "Response", &(code, results));
    }

    pub(crate) fn emit_closed(&self, session_path: &str) {
        self.emit(
            session_path,
            "org.freedesktop.portal.Session",
            "Closed",
            &HashMap::<String, OwnedValue>::new(),
        );
    }

    fn deliver(state: &mut State, message: Message) {
        state.subscribers.retain(|(_, sender)| !sender.is_closed());
        for (filter, sender) in &state.subscribers {
            if filter.matches(&message) {
                sender.push(message.clone());
            }
        }
    }

    /// The object path of the most recent live `Response` subscription.
    fn pending_request(state: &State) -> Option<OwnedObjectPath> {
        state
            .subscribers
            .iter()
            .rev()
            .filter(|(filter, sender)| {
                filter.interface() == REQUEST_INTERFACE && !sender.is_closed()
            })
            .find_map(|(filter, _)| filter.object_path().cloned().map(Into::into))
    }

    fn reply(state: &mut State, call: &Message) -> zbus::Result<Message> {
        let header = call.header();
        let interface = header.interface().map(|i| i.to_string()).unwrap_or_default();
        let member = header.member().map(|m| m.to_string()).unwrap_or_default();
        let builder = Message::method_return(&header)?;

        if interface == "org.freedesktop.DBus.Properties" && member == "Get" {
            let (target, property): (String, String) = call.body().deserialize()?;
            return match state.properties.get(&(target, property.clone())) {
                Some(value) => builder.build(&(value,)),
                None => Err(zbus::fdo::Error::UnknownProperty(property).into()),
            };
        }

        match state.replies.get(&(interface, member)) {
            Some(Reply::Respond(code, results)) => {
                let path = Self::pending_request(state)
                    .ok_or_else(|| zbus::Error::Failure("No pending request".to_owned()))?;
                let response = Message::signal(path.as_str(), REQUEST_INTERFACE, "Response")?
                    .build(&(*code, results))?;
                Self::deliver(state, response);
                builder.build(&(path,))
            }
            Some(Reply::Pending) => {
                let path = Self::pending_request(state)
                    .ok_or_else(|| zbus::Error::Failure("No pending request".to_owned()))?;
                builder.build(&(path,))
            }
            Some(Reply::Fail(message)) => {
                Err(zbus::fdo::Error::Failed((*message).to_owned()).into())
            }
            Some(Reply::Path(path)) => {
                let path = OwnedObjectPath::try_from(*path)?;
                builder.build(&(path,))
            }
            Some(Reply::U32(value)) => builder.build(&(*value,)),
            Some(Reply::Value(value)) => builder.build(&(value,)),
            Some(Reply::Bool(value)) => builder.build(&(*value,)),
            Some(Reply::Build(build)) => build(builder),
            Some(Reply::Unit) | None => builder.build(&()),
        }
    }
}

fn describe(message: &Message) -> (String, String, String) {
    let header = message.header();
    (
        header.interface().map(|i| i.to_string()).unwrap_or_default(),
        header.member().map(|m| m.to_string()).unwrap_or_default(),
        header.path().map(|p| p.to_string()).unwrap_or_default(),
    )
}

#[async_trait]
impl Bus for MockBus {
    fn unique_name(&self) -> Option<String> {
        self.unique_name.clone()
    }

    async fn call(&self, message: Message) -> zbus::Result<Message> {
        let (interface, member, path) = describe(&message);
        let mut state = self.state();
        state.events.push(Event::Call {
            interface,
            member,
            path,
            message: message.clone(),
        });
        Self::reply(&mut state, &message)
    }

    async fn send(&self, message: Message) -> zbus::Result<()> {
        let (interface, member, path) = describe(&message);
        self.state().events.push(Event::Send {
            interface,
            member,
            path,
            message,
        });
        Ok(())
    }

    async fn subscribe(&self, filter: SignalFilter) -> zbus::Result<Subscription> {
        let (subscription, sender) = Subscription::channel(filter.clone());
        let mut state = self.state();
        state.events.push(Event::Subscribe {
            interface: filter.interface(),
            member: filter.member(),
            path: filter.object_path().map(|p| p.to_string()),
        });
        state.subscribers.push((filter, sender));
        Ok(subscription)
    }
}
