// Mapping of action return values onto responses

use crate::{Error, HttpResponse, Json};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::hash::{BuildHasher, Hash};

/// The shape of a successful action result.
#[derive(Debug, Clone)]
pub enum Reply {
    /// No payload; rendered as `204 No Content`.
    Empty,
    /// Plain text.
    Text(String),
    /// Structured payload.
    Json(serde_json::Value),
    /// A response built by the action itself.
    Response(HttpResponse),
}

impl Reply {
    /// Serialize any value as a structured payload.
    pub fn json<T: Serialize>(value: &T) -> Result<Self, Error> {
        serde_json::to_value(value)
            .map(Reply::Json)
            .map_err(|e| Error::Serialization(e.to_string()))
    }

    pub fn into_response(self) -> Result<HttpResponse, Error> {
        match self {
            Reply::Empty => Ok(HttpResponse::no_content()),
            Reply::Text(text) => Ok(HttpResponse::ok().with_text(text)),
            Reply::Json(value) => HttpResponse::ok().with_json(&value),
            Reply::Response(response) => Ok(response),
        }
    }
}

/// Conversion of an action's return value into a [`Reply`].
///
/// An `Err` short-circuits to the error path regardless of any value.
pub trait IntoReply {
    fn into_reply(self) -> Result<Reply, Error>;
}

impl IntoReply for Reply {
    fn into_reply(self) -> Result<Reply, Error> {
        Ok(self)
    }
}

impl IntoReply for () {
    fn into_reply(self) -> Result<Reply, Error> {
        Ok(Reply::Empty)
    }
}

impl IntoReply for String {
    fn into_reply(self) -> Result<Reply, Error> {
        Ok(Reply::Text(self))
    }
}

impl IntoReply for &'static str {
    fn into_reply(self) -> Result<Reply, Error> {
        Ok(Reply::Text(self.to_string()))
    }
}

impl IntoReply for HttpResponse {
    fn into_reply(self) -> Result<Reply, Error> {
        Ok(Reply::Response(self))
    }
}

impl IntoReply for serde_json::Value {
    fn into_reply(self) -> Result<Reply, Error> {
        Ok(Reply::Json(self))
    }
}

impl<T: Serialize> IntoReply for Json<T> {
    fn into_reply(self) -> Result<Reply, Error> {
        Reply::json(&self.0)
    }
}

impl<T: Serialize> IntoReply for Vec<T> {
    fn into_reply(self) -> Result<Reply, Error> {
        Reply::json(&self)
    }
}

impl<K, V, S> IntoReply for HashMap<K, V, S>
where
    K: Serialize + Eq + Hash,
    V: Serialize,
    S: BuildHasher,
{
    fn into_reply(self) -> Result<Reply, Error> {
        Reply::json(&self)
    }
}

impl<K: Serialize + Ord, V: Serialize> IntoReply for BTreeMap<K, V> {
    fn into_reply(self) -> Result<Reply, Error> {
        Reply::json(&self)
    }
}

/// `None` renders as an empty reply.
impl<T: IntoReply> IntoReply for Option<T> {
    fn into_reply(self) -> Result<Reply, Error> {
        match self {
            Some(value) => value.into_reply(),
            None => Ok(Reply::Empty),
        }
    }
}

impl<T: IntoReply, E: Into<Error>> IntoReply for Result<T, E> {
    fn into_reply(self) -> Result<Reply, Error> {
        match self {
            Ok(value) => value.into_reply(),
            Err(err) => Err(err.into()),
        }
    }
}
