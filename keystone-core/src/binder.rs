//! Parameter binding.
//!
//! The binder walks a route's parameter descriptors in declaration order,
//! pulls each raw value out of the live request, applies defaults and the
//! requiredness rule, and coerces the text into the destination type. The
//! result is an [`Args`] bag the action reads its typed arguments from.
//!
//! Coercion never guesses: a value that does not convert fails with
//! [`Error::Coercion`] instead of degrading to a zero value.

use crate::context::{ContextHandle, RequestContext};
use crate::metadata::{BodyType, ParamSource, ParamType, ParameterDescriptor, RouteDescriptor};
use crate::settings::DispatchSettings;
use crate::Error;
use serde::de::DeserializeOwned;
use std::any::Any;
use std::fmt;

const TRUTHY: &[&str] = &["true", "1", "yes", "on", "t", "y"];
const FALSY: &[&str] = &["false", "0", "no", "off", "f", "n"];

/// One bound argument.
pub enum BoundValue {
    /// Optional parameter with neither a value nor a default.
    Absent,
    Int(i128),
    UInt(u128),
    Float(f64),
    Bool(bool),
    Text(String),
    List(Vec<String>),
    /// Body decoded without a typed decoder.
    Json(serde_json::Value),
    /// Body decoded by a typed decoder.
    Decoded(Box<dyn Any + Send>),
    Context(ContextHandle),
}

impl BoundValue {
    pub fn is_absent(&self) -> bool {
        matches!(self, BoundValue::Absent)
    }
}

impl fmt::Debug for BoundValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoundValue::Absent => f.write_str("Absent"),
            BoundValue::Int(v) => f.debug_tuple("Int").field(v).finish(),
            BoundValue::UInt(v) => f.debug_tuple("UInt").field(v).finish(),
            BoundValue::Float(v) => f.debug_tuple("Float").field(v).finish(),
            BoundValue::Bool(v) => f.debug_tuple("Bool").field(v).finish(),
            BoundValue::Text(v) => f.debug_tuple("Text").field(v).finish(),
            BoundValue::List(v) => f.debug_tuple("List").field(v).finish(),
            BoundValue::Json(v) => f.debug_tuple("Json").field(v).finish(),
            BoundValue::Decoded(_) => f.write_str("Decoded(..)"),
            BoundValue::Context(_) => f.write_str("Context(..)"),
        }
    }
}

fn invalid(raw: &str, target: &str) -> Error {
    Error::Coercion(format!("'{}' is not a valid {}", raw, target))
}

macro_rules! parse_int {
    ($raw:expr, $ty:ty, $variant:ident, $wide:ty) => {
        $raw.trim()
            .parse::<$ty>()
            .map(|v| BoundValue::$variant(v as $wide))
            .map_err(|_| invalid($raw, stringify!($ty)))
    };
}

fn parse_float(raw: &str, target: &str) -> Result<f64, Error> {
    let value: f64 = raw.trim().parse().map_err(|_| invalid(raw, target))?;
    if !value.is_finite() {
        return Err(invalid(raw, target));
    }
    Ok(value)
}

/// Parse a boolean from the canonical token set, ignoring ASCII case.
pub fn parse_bool(raw: &str) -> Option<bool> {
    let token = raw.trim();
    if TRUTHY.iter().any(|t| t.eq_ignore_ascii_case(token)) {
        Some(true)
    } else if FALSY.iter().any(|t| t.eq_ignore_ascii_case(token)) {
        Some(false)
    } else {
        None
    }
}

/// Coerce a textual value into a destination type.
pub fn coerce(param_type: &ParamType, raw: &str) -> Result<BoundValue, Error> {
    match param_type {
        ParamType::I8 => parse_int!(raw, i8, Int, i128),
        ParamType::I16 => parse_int!(raw, i16, Int, i128),
        ParamType::I32 => parse_int!(raw, i32, Int, i128),
        ParamType::I64 => parse_int!(raw, i64, Int, i128),
        ParamType::I128 => parse_int!(raw, i128, Int, i128),
        ParamType::Isize => parse_int!(raw, isize, Int, i128),
        ParamType::U8 => parse_int!(raw, u8, UInt, u128),
        ParamType::U16 => parse_int!(raw, u16, UInt, u128),
        ParamType::U32 => parse_int!(raw, u32, UInt, u128),
        ParamType::U64 => parse_int!(raw, u64, UInt, u128),
        ParamType::U128 => parse_int!(raw, u128, UInt, u128),
        ParamType::Usize => parse_int!(raw, usize, UInt, u128),
        ParamType::F32 => {
            let value = parse_float(raw, "f32")?;
            if value.abs() > f32::MAX as f64 {
                return Err(invalid(raw, "f32"));
            }
            Ok(BoundValue::Float(value))
        }
        ParamType::F64 => parse_float(raw, "f64").map(BoundValue::Float),
        ParamType::Bool => parse_bool(raw)
            .map(BoundValue::Bool)
            .ok_or_else(|| invalid(raw, "bool")),
        ParamType::String => Ok(BoundValue::Text(raw.to_string())),
        ParamType::StringList => Ok(BoundValue::List(
            raw.split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect(),
        )),
        ParamType::Body(body) => decode_body(body, raw.as_bytes()),
        ParamType::Context => Err(Error::Coercion(
            "the request context is not read from text".to_string(),
        )),
    }
}

/// Decode a structured payload into its destination aggregate.
pub fn decode_body(body: &BodyType, bytes: &[u8]) -> Result<BoundValue, Error> {
    match &body.decoder {
        Some(decoder) => decoder.decode(bytes).map(BoundValue::Decoded),
        None => serde_json::from_slice(bytes)
            .map(BoundValue::Json)
            .map_err(|e| Error::Deserialization(format!("{}: {}", body.type_name, e))),
    }
}

/// Conversion from a bound value to a concrete argument type.
pub trait FromBound: Sized {
    fn from_bound(value: &BoundValue) -> Option<Self>;
}

macro_rules! from_bound_int {
    ($($ty:ty),*) => {
        $(
            impl FromBound for $ty {
                fn from_bound(value: &BoundValue) -> Option<Self> {
                    match value {
                        BoundValue::Int(v) => <$ty>::try_from(*v).ok(),
                        BoundValue::UInt(v) => <$ty>::try_from(*v).ok(),
                        _ => None,
                    }
                }
            }
        )*
    };
}

from_bound_int!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize);

impl FromBound for f64 {
    fn from_bound(value: &BoundValue) -> Option<Self> {
        match value {
            BoundValue::Float(v) => Some(*v),
            BoundValue::Int(v) => Some(*v as f64),
            BoundValue::UInt(v) => Some(*v as f64),
            _ => None,
        }
    }
}

impl FromBound for f32 {
    fn from_bound(value: &BoundValue) -> Option<Self> {
        f64::from_bound(value).map(|v| v as f32)
    }
}

impl FromBound for bool {
    fn from_bound(value: &BoundValue) -> Option<Self> {
        match value {
            BoundValue::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl FromBound for String {
    fn from_bound(value: &BoundValue) -> Option<Self> {
        match value {
            BoundValue::Text(v) => Some(v.clone()),
            _ => None,
        }
    }
}

impl FromBound for Vec<String> {
    fn from_bound(value: &BoundValue) -> Option<Self> {
        match value {
            BoundValue::List(v) => Some(v.clone()),
            _ => None,
        }
    }
}

impl FromBound for serde_json::Value {
    fn from_bound(value: &BoundValue) -> Option<Self> {
        match value {
            BoundValue::Json(v) => Some(v.clone()),
            _ => None,
        }
    }
}

impl FromBound for ContextHandle {
    fn from_bound(value: &BoundValue) -> Option<Self> {
        match value {
            BoundValue::Context(ctx) => Some(ctx.clone()),
            _ => None,
        }
    }
}

/// Bound arguments of one dispatch, in declaration order.
pub struct Args {
    values: Vec<(String, BoundValue)>,
    context: ContextHandle,
}

impl Args {
    pub fn new(context: ContextHandle) -> Self {
        Self {
            values: Vec::new(),
            context,
        }
    }

    pub fn push(&mut self, name: impl Into<String>, value: BoundValue) {
        self.values.push((name.into(), value));
    }

    /// The raw bound value of a parameter.
    pub fn raw(&self, name: &str) -> Option<&BoundValue> {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, value)| value)
    }

    fn bound(&self, name: &str) -> Result<&BoundValue, Error> {
        self.raw(name)
            .ok_or_else(|| Error::Invocation(format!("no parameter named '{}' was bound", name)))
    }

    /// A required argument.
    pub fn get<T: FromBound>(&self, name: &str) -> Result<T, Error> {
        match self.opt(name)? {
            Some(value) => Ok(value),
            None => Err(Error::Invocation(format!(
                "parameter '{}' is absent",
                name
            ))),
        }
    }

    /// An optional argument; `None` when the parameter is absent.
    pub fn opt<T: FromBound>(&self, name: &str) -> Result<Option<T>, Error> {
        let value = self.bound(name)?;
        if value.is_absent() {
            return Ok(None);
        }
        T::from_bound(value).map(Some).ok_or_else(|| {
            Error::Invocation(format!(
                "parameter '{}' bound as {:?} cannot be read as {}",
                name,
                value,
                std::any::type_name::<T>()
            ))
        })
    }

    /// Take the decoded body.
    ///
    /// A typed body is moved out on success; untyped bodies are converted
    /// from their JSON value and stay available.
    pub fn body<T: DeserializeOwned + 'static>(&mut self, name: &str) -> Result<T, Error> {
        match self.opt_body(name)? {
            Some(value) => Ok(value),
            None => Err(Error::Invocation(format!(
                "body parameter '{}' is absent",
                name
            ))),
        }
    }

    pub fn opt_body<T: DeserializeOwned + 'static>(
        &mut self,
        name: &str,
    ) -> Result<Option<T>, Error> {
        let slot = self
            .values
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, value)| value)
            .ok_or_else(|| Error::Invocation(format!("no parameter named '{}' was bound", name)))?;

        match std::mem::replace(slot, BoundValue::Absent) {
            BoundValue::Absent => Ok(None),
            BoundValue::Decoded(boxed) => match boxed.downcast::<T>() {
                Ok(value) => Ok(Some(*value)),
                Err(boxed) => {
                    *slot = BoundValue::Decoded(boxed);
                    Err(Error::Invocation(format!(
                        "body parameter '{}' was not decoded as {}",
                        name,
                        std::any::type_name::<T>()
                    )))
                }
            },
            BoundValue::Json(value) => {
                let decoded = serde_json::from_value(value.clone())
                    .map_err(|e| Error::Deserialization(format!("body parameter '{}': {}", name, e)));
                *slot = BoundValue::Json(value);
                decoded.map(Some)
            }
            other => {
                *slot = other;
                Err(Error::Invocation(format!(
                    "parameter '{}' is not a body parameter",
                    name
                )))
            }
        }
    }

    /// The live request context.
    pub fn context(&self) -> &ContextHandle {
        &self.context
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(name, _)| name.as_str())
    }
}

impl fmt::Debug for Args {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.values.iter().map(|(name, value)| (name, value)))
            .finish()
    }
}

/// Binds route parameters from a live request.
#[derive(Debug, Clone, Default)]
pub struct ParameterBinder {
    max_body_bytes: Option<usize>,
}

impl ParameterBinder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_settings(settings: &DispatchSettings) -> Self {
        Self {
            max_body_bytes: settings.max_body_bytes,
        }
    }

    pub fn with_max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = Some(limit);
        self
    }

    /// Bind every parameter of `route`, in declaration order.
    ///
    /// Fails with `Validation` for a missing required value, `Coercion` for
    /// an unconvertible value and `Deserialization` for an undecodable body.
    pub async fn bind(&self, route: &RouteDescriptor, ctx: &ContextHandle) -> Result<Args, Error> {
        let mut args = Args::new(ctx.clone());

        for param in &route.params {
            let value = if param.source == ParamSource::Context
                || param.param_type == ParamType::Context
            {
                BoundValue::Context(ctx.clone())
            } else if param.source == ParamSource::Body {
                self.bind_body(route, param, ctx.as_ref()).await?
            } else {
                bind_text(route, param, ctx.as_ref())?
            };

            tracing::trace!(
                param = %param.name,
                source = %param.source,
                absent = value.is_absent(),
                "Bound parameter"
            );
            args.push(param.name.clone(), value);
        }

        Ok(args)
    }

    async fn bind_body(
        &self,
        route: &RouteDescriptor,
        param: &ParameterDescriptor,
        ctx: &dyn RequestContext,
    ) -> Result<BoundValue, Error> {
        let bytes = ctx.body().await?;

        if let Some(limit) = self.max_body_bytes {
            if bytes.len() > limit {
                return Err(Error::Validation(format!(
                    "request body of {} bytes exceeds the limit of {} bytes",
                    bytes.len(),
                    limit
                )));
            }
        }

        let default;
        let payload: &[u8] = if bytes.iter().all(u8::is_ascii_whitespace) {
            match missing(route, param)? {
                Some(value) => {
                    default = value;
                    default.as_bytes()
                }
                None => return Ok(BoundValue::Absent),
            }
        } else {
            &bytes
        };

        let bound = match &param.param_type {
            ParamType::Body(body) => decode_body(body, payload),
            other => std::str::from_utf8(payload)
                .map_err(|_| Error::Coercion("request body is not valid UTF-8".to_string()))
                .and_then(|text| coerce(other, text)),
        };
        bound.map_err(|e| with_param(e, param))
    }
}

/// Resolve a missing value: the default, `None` for an optional parameter,
/// or a validation failure.
fn missing(route: &RouteDescriptor, param: &ParameterDescriptor) -> Result<Option<String>, Error> {
    match &param.default_value {
        Some(value) => Ok(Some(value.clone())),
        None if param.required => Err(Error::Validation(format!(
            "missing required {} parameter '{}' for {}::{}",
            param.source, param.name, route.controller, route.action
        ))),
        None => Ok(None),
    }
}

fn bind_text(
    route: &RouteDescriptor,
    param: &ParameterDescriptor,
    ctx: &dyn RequestContext,
) -> Result<BoundValue, Error> {
    let raw = match lookup(ctx, param) {
        Some(raw) => raw,
        None => match missing(route, param)? {
            Some(value) => value,
            None => return Ok(BoundValue::Absent),
        },
    };

    coerce(&param.param_type, &raw).map_err(|e| with_param(e, param))
}

fn lookup(ctx: &dyn RequestContext, param: &ParameterDescriptor) -> Option<String> {
    match param.source {
        ParamSource::Path => ctx.path_param(&param.name),
        ParamSource::Query => ctx.query(&param.name),
        ParamSource::Header => ctx.header(&param.name),
        ParamSource::Cookie => ctx.cookie(&param.name),
        ParamSource::Form => ctx.form_value(&param.name),
        ParamSource::Body | ParamSource::Context => None,
    }
}

fn with_param(err: Error, param: &ParameterDescriptor) -> Error {
    match err {
        Error::Coercion(msg) => Error::Coercion(format!(
            "{} parameter '{}': {}",
            param.source, param.name, msg
        )),
        Error::Deserialization(msg) => {
            Error::Deserialization(format!("body parameter '{}': {}", param.name, msg))
        }
        other => other,
    }
}
