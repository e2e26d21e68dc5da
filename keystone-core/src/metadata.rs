//! Canonical metadata model.
//!
//! Every extraction strategy (structural tags, source comments, manual
//! registration) produces these descriptor shapes, so the registry and the
//! dispatcher never need to know where a descriptor came from.

use crate::Error;
use serde::{Serialize, Serializer};
use std::any::Any;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Free-form key/value tags attached to controllers and routes.
pub type TagMap = BTreeMap<String, String>;

/// HTTP methods
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum HttpMethod {
    GET,
    POST,
    PUT,
    DELETE,
    PATCH,
    HEAD,
    OPTIONS,
    /// Matches every verb.
    ANY,
}

impl HttpMethod {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "GET" => Some(HttpMethod::GET),
            "POST" => Some(HttpMethod::POST),
            "PUT" => Some(HttpMethod::PUT),
            "DELETE" => Some(HttpMethod::DELETE),
            "PATCH" => Some(HttpMethod::PATCH),
            "HEAD" => Some(HttpMethod::HEAD),
            "OPTIONS" => Some(HttpMethod::OPTIONS),
            "ANY" | "*" => Some(HttpMethod::ANY),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::GET => "GET",
            HttpMethod::POST => "POST",
            HttpMethod::PUT => "PUT",
            HttpMethod::DELETE => "DELETE",
            HttpMethod::PATCH => "PATCH",
            HttpMethod::HEAD => "HEAD",
            HttpMethod::OPTIONS => "OPTIONS",
            HttpMethod::ANY => "ANY",
        }
    }

    /// Whether a request with the given method is accepted.
    pub fn matches(&self, method: &str) -> bool {
        *self == HttpMethod::ANY || self.as_str().eq_ignore_ascii_case(method)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What role a controller type plays.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ControllerKind {
    Rest,
    Mvc,
    /// Service, repository or plain component.
    Component,
}

/// Which extraction strategy produced a descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationSource {
    StructuralTag,
    SourceComment,
    Manual,
    Hybrid,
}

impl AnnotationSource {
    /// Combine two sources describing the same item.
    pub fn merge(self, other: AnnotationSource) -> AnnotationSource {
        if self == other {
            self
        } else {
            AnnotationSource::Hybrid
        }
    }
}

/// Where a parameter's raw value comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamSource {
    Path,
    Query,
    Header,
    Cookie,
    Form,
    Body,
    /// Bound to the request context capability instead of a request field.
    Context,
}

impl ParamSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamSource::Path => "path",
            ParamSource::Query => "query",
            ParamSource::Header => "header",
            ParamSource::Cookie => "cookie",
            ParamSource::Form => "form",
            ParamSource::Body => "body",
            ParamSource::Context => "context",
        }
    }
}

impl fmt::Display for ParamSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type DecodeFn = dyn Fn(&[u8]) -> Result<Box<dyn Any + Send>, Error> + Send + Sync;

/// Decodes a raw body straight into a concrete aggregate type.
#[derive(Clone)]
pub struct BodyDecoder {
    decode: Arc<DecodeFn>,
}

impl BodyDecoder {
    /// Decoder producing `T` from a JSON payload.
    pub fn json<T>() -> Self
    where
        T: serde::de::DeserializeOwned + Send + 'static,
    {
        Self {
            decode: Arc::new(|bytes: &[u8]| {
                let value: T = serde_json::from_slice(bytes)
                    .map_err(|e| Error::Deserialization(e.to_string()))?;
                Ok(Box::new(value) as Box<dyn Any + Send>)
            }),
        }
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<Box<dyn Any + Send>, Error> {
        (self.decode)(bytes)
    }
}

impl fmt::Debug for BodyDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BodyDecoder")
    }
}

/// Destination aggregate of a body parameter.
#[derive(Clone, Debug)]
pub struct BodyType {
    pub type_name: String,
    /// Typed decoder, when the concrete type is known at registration.
    /// Without one the payload binds as a `serde_json::Value`.
    pub decoder: Option<BodyDecoder>,
}

impl BodyType {
    pub fn typed<T>() -> Self
    where
        T: serde::de::DeserializeOwned + Send + 'static,
    {
        Self {
            type_name: short_type_name(std::any::type_name::<T>()).to_string(),
            decoder: Some(BodyDecoder::json::<T>()),
        }
    }

    pub fn untyped(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            decoder: None,
        }
    }
}

impl PartialEq for BodyType {
    fn eq(&self, other: &Self) -> bool {
        self.type_name == other.type_name
    }
}

/// Destination semantic type of a parameter.
#[derive(Clone, Debug, PartialEq)]
pub enum ParamType {
    I8,
    I16,
    I32,
    I64,
    I128,
    Isize,
    U8,
    U16,
    U32,
    U64,
    U128,
    Usize,
    F32,
    F64,
    Bool,
    String,
    /// Comma-separated list of strings.
    StringList,
    Body(BodyType),
    /// The request context capability.
    Context,
}

impl ParamType {
    /// Map a Rust type spelling onto a semantic type.
    ///
    /// `Option<T>` maps to `T`; the caller decides about requiredness.
    /// Unknown names are treated as body aggregates.
    pub fn from_type_name(name: &str) -> ParamType {
        let compact: String = name.chars().filter(|c| !c.is_whitespace()).collect();
        let compact = compact.trim_start_matches('&');
        let compact = compact.strip_prefix("'static").unwrap_or(compact);

        if let Some(inner) = strip_generic(compact, "Option") {
            return ParamType::from_type_name(inner);
        }
        if let Some(inner) = strip_generic(compact, "Vec") {
            return match short_type_name(inner) {
                "String" | "str" | "&str" => ParamType::StringList,
                _ => ParamType::Body(BodyType::untyped(compact)),
            };
        }
        if let Some(inner) = strip_generic(compact, "Arc") {
            if is_context_type(inner) {
                return ParamType::Context;
            }
        }

        match short_type_name(compact) {
            "i8" => ParamType::I8,
            "i16" => ParamType::I16,
            "i32" => ParamType::I32,
            "i64" => ParamType::I64,
            "i128" => ParamType::I128,
            "isize" => ParamType::Isize,
            "u8" => ParamType::U8,
            "u16" => ParamType::U16,
            "u32" => ParamType::U32,
            "u64" => ParamType::U64,
            "u128" => ParamType::U128,
            "usize" => ParamType::Usize,
            "f32" => ParamType::F32,
            "f64" => ParamType::F64,
            "bool" => ParamType::Bool,
            "String" | "str" => ParamType::String,
            other if is_context_type(other) => ParamType::Context,
            _ => ParamType::Body(BodyType::untyped(compact)),
        }
    }

    /// Canonical name used in diagnostics and serialized descriptors.
    pub fn name(&self) -> &str {
        match self {
            ParamType::I8 => "i8",
            ParamType::I16 => "i16",
            ParamType::I32 => "i32",
            ParamType::I64 => "i64",
            ParamType::I128 => "i128",
            ParamType::Isize => "isize",
            ParamType::U8 => "u8",
            ParamType::U16 => "u16",
            ParamType::U32 => "u32",
            ParamType::U64 => "u64",
            ParamType::U128 => "u128",
            ParamType::Usize => "usize",
            ParamType::F32 => "f32",
            ParamType::F64 => "f64",
            ParamType::Bool => "bool",
            ParamType::String => "string",
            ParamType::StringList => "string[]",
            ParamType::Body(body) => &body.type_name,
            ParamType::Context => "context",
        }
    }

    pub fn is_body(&self) -> bool {
        matches!(self, ParamType::Body(_))
    }
}

impl Serialize for ParamType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

const CONTEXT_TYPE_NAMES: &[&str] = &["RequestContext", "HttpRequest", "ContextHandle"];

fn is_context_type(name: &str) -> bool {
    let name = name.trim_start_matches('&');
    let name = name.strip_prefix("dyn").unwrap_or(name);
    CONTEXT_TYPE_NAMES.contains(&short_type_name(name))
}

fn strip_generic<'a>(name: &'a str, wrapper: &str) -> Option<&'a str> {
    let open = name.find('<')?;
    if short_type_name(&name[..open]) != wrapper {
        return None;
    }
    name[open + 1..].strip_suffix('>')
}

/// Last path segment of a type path (`a::b::User` → `User`).
pub fn short_type_name(name: &str) -> &str {
    let base = name.split('<').next().unwrap_or(name);
    base.rsplit("::").next().unwrap_or(base)
}

/// Canonical record of how one call argument is sourced and typed.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ParameterDescriptor {
    pub name: String,
    pub source: ParamSource,
    pub required: bool,
    pub default_value: Option<String>,
    pub param_type: ParamType,
    pub description: Option<String>,
}

impl ParameterDescriptor {
    pub fn new(name: impl Into<String>, source: ParamSource, param_type: ParamType) -> Self {
        Self {
            name: name.into(),
            source,
            required: true,
            default_value: None,
            param_type,
            description: None,
        }
    }

    pub fn path(name: impl Into<String>, param_type: ParamType) -> Self {
        Self::new(name, ParamSource::Path, param_type)
    }

    pub fn context(name: impl Into<String>) -> Self {
        Self::new(name, ParamSource::Context, ParamType::Context)
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    /// Set a default; a parameter with a default is never required.
    pub fn default_value(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self.required = false;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Canonical record of one dispatch-target type.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ControllerDescriptor {
    pub namespace: String,
    pub type_name: String,
    pub kind: ControllerKind,
    pub base_path: String,
    pub tags: TagMap,
    pub source: AnnotationSource,
}

impl ControllerDescriptor {
    pub fn new(
        namespace: impl Into<String>,
        type_name: impl Into<String>,
        kind: ControllerKind,
        source: AnnotationSource,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            type_name: type_name.into(),
            kind,
            base_path: String::new(),
            tags: TagMap::new(),
            source,
        }
    }

    /// Build the descriptor's identity from a full type path.
    pub fn for_type_path(type_path: &str, kind: ControllerKind, source: AnnotationSource) -> Self {
        let (namespace, type_name) = split_type_path(type_path);
        Self::new(namespace, type_name, kind, source)
    }

    pub fn with_base_path(mut self, base_path: impl Into<String>) -> Self {
        self.base_path = base_path.into();
        self
    }

    /// `namespace::TypeName`, the registry key of the controller.
    pub fn qualified_name(&self) -> String {
        qualify(&self.namespace, &self.type_name)
    }
}

/// Split `a::b::Type` into (`a::b`, `Type`).
pub fn split_type_path(type_path: &str) -> (&str, &str) {
    match type_path.rsplit_once("::") {
        Some((namespace, name)) => (namespace, name),
        None => ("", type_path),
    }
}

pub fn qualify(namespace: &str, type_name: &str) -> String {
    if namespace.is_empty() {
        type_name.to_string()
    } else {
        format!("{}::{}", namespace, type_name)
    }
}

/// Canonical record of one HTTP-reachable action.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RouteDescriptor {
    pub method: HttpMethod,
    /// Path suffix relative to `base_path`.
    pub path: String,
    /// Base path of the declaring controller at registration time.
    pub base_path: String,
    /// Qualified name of the declaring controller.
    pub controller: String,
    pub action: String,
    pub params: Vec<ParameterDescriptor>,
    pub middleware: Vec<String>,
    pub description: Option<String>,
    pub tags: TagMap,
    pub source: AnnotationSource,
}

impl RouteDescriptor {
    pub fn new(
        method: HttpMethod,
        controller: impl Into<String>,
        action: impl Into<String>,
        path: impl Into<String>,
        source: AnnotationSource,
    ) -> Self {
        Self {
            method,
            path: normalize_suffix(&path.into()),
            base_path: String::new(),
            controller: controller.into(),
            action: action.into(),
            params: Vec::new(),
            middleware: Vec::new(),
            description: None,
            tags: TagMap::new(),
            source,
        }
    }

    /// The path a transport should register for this route.
    pub fn full_path(&self) -> String {
        combine_path(&self.base_path, &self.path)
    }

    pub fn param(&self, name: &str) -> Option<&ParameterDescriptor> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn body_param(&self) -> Option<&ParameterDescriptor> {
        self.params.iter().find(|p| p.source == ParamSource::Body)
    }

    /// Check the structural invariants of a route.
    pub fn validate(&self) -> Result<(), Error> {
        if self.action.is_empty() {
            return Err(Error::Metadata(format!(
                "route on {} has an empty action name",
                self.controller
            )));
        }
        if !self.path.is_empty() && !self.path.starts_with('/') {
            return Err(Error::Metadata(format!(
                "route {}::{} path '{}' must be empty or start with '/'",
                self.controller, self.action, self.path
            )));
        }

        let bodies = self
            .params
            .iter()
            .filter(|p| p.source == ParamSource::Body)
            .count();
        if bodies > 1 {
            return Err(Error::Metadata(format!(
                "route {}::{} declares {} body parameters, at most one is allowed",
                self.controller, self.action, bodies
            )));
        }

        let mut seen = HashSet::new();
        for param in &self.params {
            if param.name.is_empty() {
                return Err(Error::Metadata(format!(
                    "route {}::{} has a parameter without a name",
                    self.controller, self.action
                )));
            }
            if !seen.insert(param.name.as_str()) {
                return Err(Error::Metadata(format!(
                    "route {}::{} declares parameter '{}' twice",
                    self.controller, self.action, param.name
                )));
            }
            if param.source == ParamSource::Body && !param.param_type.is_body() {
                return Err(Error::Metadata(format!(
                    "body parameter '{}' of {}::{} must have an aggregate type, found {}",
                    param.name, self.controller, self.action, param.param_type
                )));
            }
            if let Some(default) = &param.default_value {
                if !matches!(param.param_type, ParamType::Body(_) | ParamType::Context) {
                    crate::binder::coerce(&param.param_type, default).map_err(|e| {
                        Error::Metadata(format!(
                            "default value of parameter '{}' on {}::{} is invalid: {}",
                            param.name, self.controller, self.action, e
                        ))
                    })?;
                }
            }
        }

        Ok(())
    }
}

/// Join a base path and a suffix with exactly one separator.
///
/// Trailing separators are trimmed from both sides, an empty suffix yields
/// the base, an empty base yields the suffix, and two empty inputs yield `""`.
pub fn combine_path(base: &str, suffix: &str) -> String {
    let base = base.trim_end_matches('/');
    let suffix = suffix.trim_end_matches('/');

    if suffix.is_empty() {
        return base.to_string();
    }
    if base.is_empty() {
        return suffix.to_string();
    }

    format!("{}/{}", base, suffix.trim_start_matches('/'))
}

/// Validate and normalize a controller base path.
///
/// `"users/"` becomes `"/users"`; `""` and `"/"` become `""`.
pub fn normalize_base_path(raw: &str) -> Result<String, Error> {
    let trimmed = raw.trim();
    if trimmed
        .chars()
        .any(|c| c.is_whitespace() || c == '?' || c == '#')
    {
        return Err(Error::Metadata(format!("invalid base path '{}'", raw)));
    }
    if trimmed.contains("//") {
        return Err(Error::Metadata(format!(
            "base path '{}' contains an empty segment",
            raw
        )));
    }

    Ok(normalize_suffix(trimmed).trim_end_matches('/').to_string())
}

/// Normalize a route suffix: `{name}` placeholders become `:name` and a
/// non-empty suffix always starts with a separator.
pub fn normalize_suffix(suffix: &str) -> String {
    let trimmed = suffix.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let segments: Vec<String> = trimmed
        .split('/')
        .map(|segment| {
            match segment
                .strip_prefix('{')
                .and_then(|s| s.strip_suffix('}'))
            {
                Some(name) => format!(":{}", name),
                None => segment.to_string(),
            }
        })
        .collect();
    let joined = segments.join("/");

    if joined.starts_with('/') {
        joined
    } else {
        format!("/{}", joined)
    }
}
