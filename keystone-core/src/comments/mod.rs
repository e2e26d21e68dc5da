//! Comment-driven metadata extraction.
//!
//! Controllers can describe themselves in documentation comments instead of
//! code. The extractor parses the declaring source file with `syn`, reads the
//! doc comment of the type and of every inherent method, and turns the
//! `@Directive` lines it finds into the same descriptors the tag extractor
//! produces:
//!
//! ```text
//! /// @RestController
//! /// @RequestMapping("/users")
//! pub struct UserController;
//!
//! impl UserController {
//!     /// Fetch one user.
//!     ///
//!     /// @GetMapping("/{id}")
//!     /// @PathVariable("id")
//!     /// @RequestParam(name="verbose", defaultValue="false")
//!     pub fn show(&mut self, id: i64, verbose: bool) -> String { .. }
//! }
//! ```
//!
//! Source files are located through an explicit [`SourceManifest`].

pub mod directive;

use self::directive::{directive_name, parse_directive, Directive, DirectiveArgs};
use crate::binder::parse_bool;
use crate::metadata::{
    normalize_base_path, short_type_name, AnnotationSource, BodyType, ControllerDescriptor,
    ControllerKind, HttpMethod, ParamSource, ParamType, ParameterDescriptor, RouteDescriptor,
    TagMap,
};
use crate::{Error, Registry};
use quote::ToTokens;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use syn::{Attribute, Expr, ExprLit, FnArg, ImplItem, ImplItemFn, Item, Lit, Meta, Pat, Type};

const TYPE_DIRECTIVES: &[&str] = &[
    "RestController",
    "Controller",
    "Service",
    "Repository",
    "Component",
    "RequestMapping",
    "Tag",
];

const METHOD_DIRECTIVES: &[&str] = &[
    "GetMapping",
    "PostMapping",
    "PutMapping",
    "DeleteMapping",
    "PatchMapping",
    "HeadMapping",
    "OptionsMapping",
    "RequestMapping",
    "PathVariable",
    "RequestParam",
    "RequestHeader",
    "CookieValue",
    "FormParam",
    "RequestBody",
    "Middleware",
    "Description",
    "Tag",
];

fn verb_of(name: &str) -> Option<HttpMethod> {
    match name {
        "GetMapping" => Some(HttpMethod::GET),
        "PostMapping" => Some(HttpMethod::POST),
        "PutMapping" => Some(HttpMethod::PUT),
        "DeleteMapping" => Some(HttpMethod::DELETE),
        "PatchMapping" => Some(HttpMethod::PATCH),
        "HeadMapping" => Some(HttpMethod::HEAD),
        "OptionsMapping" => Some(HttpMethod::OPTIONS),
        _ => None,
    }
}

fn source_of(name: &str) -> Option<ParamSource> {
    match name {
        "PathVariable" => Some(ParamSource::Path),
        "RequestParam" => Some(ParamSource::Query),
        "RequestHeader" => Some(ParamSource::Header),
        "CookieValue" => Some(ParamSource::Cookie),
        "FormParam" => Some(ParamSource::Form),
        "RequestBody" => Some(ParamSource::Body),
        _ => None,
    }
}

/// Explicit mapping from controller type paths to their source files.
///
/// Deserializes from a plain map:
///
/// ```json
/// { "app::users::UserController": "src/users.rs" }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceManifest {
    entries: BTreeMap<String, PathBuf>,
}

impl SourceManifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// List the file declaring `C`.
    pub fn add<C: ?Sized>(&mut self, file: impl Into<PathBuf>) -> &mut Self {
        self.add_path(std::any::type_name::<C>(), file)
    }

    pub fn add_path(&mut self, type_path: impl Into<String>, file: impl Into<PathBuf>) -> &mut Self {
        self.entries.insert(type_path.into(), file.into());
        self
    }

    /// Builder form of [`SourceManifest::add`].
    pub fn with<C: ?Sized>(mut self, file: impl Into<PathBuf>) -> Self {
        self.add::<C>(file);
        self
    }

    pub fn file(&self, type_path: &str) -> Option<&Path> {
        self.entries.get(type_path).map(PathBuf::as_path)
    }

    pub fn type_paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Descriptors extracted for one controller type.
#[derive(Debug, Clone)]
pub struct ExtractedController {
    pub controller: ControllerDescriptor,
    pub routes: Vec<RouteDescriptor>,
}

/// Extracts descriptors from documentation-comment directives.
#[derive(Debug, Clone, Default)]
pub struct CommentExtractor {
    manifest: SourceManifest,
    body_types: HashMap<String, BodyType>,
}

impl CommentExtractor {
    pub fn new(manifest: SourceManifest) -> Self {
        Self {
            manifest,
            body_types: HashMap::new(),
        }
    }

    /// Decode body parameters of type `T` (matched by type name) into `T`.
    ///
    /// Bodies of unregistered types bind as `serde_json::Value`.
    pub fn with_body_type<T>(mut self) -> Self
    where
        T: serde::de::DeserializeOwned + Send + 'static,
    {
        let body = BodyType::typed::<T>();
        self.body_types.insert(body.type_name.clone(), body);
        self
    }

    pub fn manifest(&self) -> &SourceManifest {
        &self.manifest
    }

    /// Extract one controller from its listed source file.
    pub fn extract(&self, type_path: &str) -> Result<ExtractedController, Error> {
        let file = self.manifest.file(type_path).ok_or_else(|| {
            Error::Metadata(format!("no source file is listed for {}", type_path))
        })?;
        let source = std::fs::read_to_string(file).map_err(|e| {
            Error::Metadata(format!(
                "cannot read {} for {}: {}",
                file.display(),
                type_path,
                e
            ))
        })?;
        self.extract_source(type_path, &source)
    }

    /// Extract one controller from in-memory source text.
    pub fn extract_source(
        &self,
        type_path: &str,
        source: &str,
    ) -> Result<ExtractedController, Error> {
        let file = syn::parse_file(source).map_err(|e| {
            Error::Metadata(format!("cannot parse source of {}: {}", type_path, e))
        })?;

        let type_name = short_type_name(type_path);
        let attrs = find_type_attrs(&file.items, type_name).ok_or_else(|| {
            Error::Metadata(format!(
                "{} is not declared in its source file",
                type_path
            ))
        })?;
        let controller = controller_descriptor(type_path, &doc_lines(attrs))?;

        let mut methods = Vec::new();
        collect_methods(&file.items, type_name, &mut methods);

        let mut routes = Vec::new();
        for method in methods {
            if let Some(route) = self.route_descriptor(type_path, &controller, method)? {
                routes.push(route);
            }
        }

        tracing::debug!(
            controller = %type_path,
            routes = routes.len(),
            "Extracted comment metadata"
        );

        Ok(ExtractedController { controller, routes })
    }

    /// Extract every controller listed in the manifest.
    pub fn extract_all(&self) -> Result<Vec<ExtractedController>, Error> {
        self.manifest
            .type_paths()
            .map(|type_path| self.extract(type_path))
            .collect()
    }

    /// Extract everything, then publish it.
    ///
    /// Nothing is published when any file fails to extract or any route
    /// conflicts with the registry. Controllers that were already registered
    /// through tags are merged into a hybrid descriptor.
    pub fn register_into(&self, registry: &Registry) -> Result<Vec<Arc<RouteDescriptor>>, Error> {
        let batch = self
            .extract_all()?
            .into_iter()
            .map(|item| (item.controller, item.routes))
            .collect();
        let published = registry.publish(batch)?;

        tracing::info!(
            controllers = self.manifest.len(),
            routes = published.len(),
            "Registered routes from source comments"
        );

        Ok(published)
    }

    fn route_descriptor(
        &self,
        type_path: &str,
        controller: &ControllerDescriptor,
        method: &ImplItemFn,
    ) -> Result<Option<RouteDescriptor>, Error> {
        let action = method.sig.ident.to_string();
        let location = format!("{}::{}", type_path, action);

        let mut verb: Option<(HttpMethod, String)> = None;
        let mut param_directives: Vec<(ParamSource, Directive)> = Vec::new();
        let mut middleware = Vec::new();
        let mut description = None;
        let mut tags = TagMap::new();
        let mut free_text = Vec::new();

        for line in doc_lines(&method.attrs) {
            if directive_name(&line).is_none() {
                if !line.is_empty() {
                    free_text.push(line);
                }
                continue;
            }
            let Some(directive) = read_directive(&line, &location, METHOD_DIRECTIVES)? else {
                continue;
            };

            if let Some(method) = verb_of(&directive.name) {
                set_verb(&mut verb, method, mapping_path(&directive), &location)?;
                continue;
            }
            if let Some(source) = source_of(&directive.name) {
                param_directives.push((source, directive));
                continue;
            }

            match directive.name.as_str() {
                "RequestMapping" => {
                    let method = match directive.get("method") {
                        Some(name) => HttpMethod::from_str(name).ok_or_else(|| {
                            Error::Metadata(format!(
                                "{}: unknown HTTP method '{}'",
                                location, name
                            ))
                        })?,
                        None => HttpMethod::ANY,
                    };
                    set_verb(&mut verb, method, mapping_path(&directive), &location)?;
                }
                "Middleware" => middleware.extend(
                    directive
                        .value()
                        .or_else(|| directive.get("name"))
                        .unwrap_or("")
                        .split(',')
                        .map(str::trim)
                        .filter(|name| !name.is_empty())
                        .map(str::to_string),
                ),
                "Description" => description = directive.value().map(str::to_string),
                "Tag" => {
                    let (key, value) = tag_pair(&directive, &location)?;
                    tags.insert(key, value);
                }
                _ => {}
            }
        }

        let Some((http_method, path)) = verb else {
            tracing::trace!(method = %location, "No route directive; skipping");
            return Ok(None);
        };

        let signature = signature_params(method);
        let named = param_directives
            .iter()
            .map(|(source, directive)| {
                param_name(directive, *source, &signature, &location)
                    .map(|name| (name, *source, directive))
            })
            .collect::<Result<Vec<_>, Error>>()?;

        let mut used = vec![false; named.len()];
        let mut params = Vec::new();
        for (name, ty) in &signature {
            if let Some(idx) = named.iter().position(|(n, _, _)| same_name(n, name)) {
                used[idx] = true;
                let (param_name, source, directive) = &named[idx];
                params.push(self.param_descriptor(
                    param_name,
                    *source,
                    directive,
                    Some(ty),
                    &location,
                )?);
            } else if ParamType::from_type_name(ty) == ParamType::Context {
                params.push(ParameterDescriptor::context(name.as_str()));
            } else {
                tracing::debug!(
                    method = %location,
                    param = %name,
                    "Signature parameter has no binding directive"
                );
            }
        }
        for (idx, (param_name, source, directive)) in named.iter().enumerate() {
            if !used[idx] {
                params.push(self.param_descriptor(
                    param_name, *source, directive, None, &location,
                )?);
            }
        }

        let mut route = RouteDescriptor::new(
            http_method,
            type_path,
            action,
            path,
            AnnotationSource::SourceComment,
        );
        route.base_path = controller.base_path.clone();
        route.params = params;
        route.middleware = middleware;
        route.tags = tags;
        route.description = description.or_else(|| {
            if free_text.is_empty() {
                None
            } else {
                Some(free_text.join(" "))
            }
        });
        route.validate()?;

        Ok(Some(route))
    }

    fn param_descriptor(
        &self,
        name: &str,
        source: ParamSource,
        directive: &Directive,
        signature_type: Option<&String>,
        location: &str,
    ) -> Result<ParameterDescriptor, Error> {
        let (param_type, optional) = match (directive.get("type"), signature_type) {
            (Some(ty), _) => (ParamType::from_type_name(ty), false),
            (None, Some(ty)) => (ParamType::from_type_name(ty), short_type_name(ty) == "Option"),
            (None, None) if source == ParamSource::Body => {
                (ParamType::Body(BodyType::untyped("Value")), false)
            }
            (None, None) => (ParamType::String, false),
        };

        let mut param =
            ParameterDescriptor::new(name, source, self.resolve_body(param_type)).required(!optional);

        if let Some(raw) = directive.get("required") {
            let required = parse_bool(raw).ok_or_else(|| {
                Error::Metadata(format!(
                    "{}: invalid required value '{}' for '{}'",
                    location, raw, name
                ))
            })?;
            param = param.required(required);
        }
        if let Some(default) = directive.get("defaultValue") {
            param = param.default_value(default);
        }
        if let Some(description) = directive.get("description") {
            param = param.description(description);
        }

        Ok(param)
    }

    fn resolve_body(&self, param_type: ParamType) -> ParamType {
        match param_type {
            ParamType::Body(body) if body.decoder.is_none() => {
                match self.body_types.get(short_type_name(&body.type_name)) {
                    Some(typed) => ParamType::Body(typed.clone()),
                    None => ParamType::Body(body),
                }
            }
            other => other,
        }
    }
}

fn read_directive(
    line: &str,
    location: &str,
    vocabulary: &[&str],
) -> Result<Option<Directive>, Error> {
    let Some(name) = directive_name(line) else {
        return Ok(None);
    };
    if !vocabulary.contains(&name) {
        tracing::debug!(directive = %name, location = %location, "Ignoring unknown directive");
        return Ok(None);
    }

    parse_directive(line).map_err(|msg| {
        Error::Metadata(format!(
            "{}: malformed directive '{}': {}",
            location,
            line.trim(),
            msg
        ))
    })
}

fn controller_descriptor(type_path: &str, lines: &[String]) -> Result<ControllerDescriptor, Error> {
    let mut kind: Option<(ControllerKind, Option<&'static str>)> = None;
    let mut base_path: Option<String> = None;
    let mut tags = TagMap::new();

    for line in lines {
        let Some(directive) = read_directive(line, type_path, TYPE_DIRECTIVES)? else {
            continue;
        };

        let found = match directive.name.as_str() {
            "RestController" => (ControllerKind::Rest, None),
            "Controller" => (ControllerKind::Mvc, None),
            "Service" => (ControllerKind::Component, Some("service")),
            "Repository" => (ControllerKind::Component, Some("repository")),
            "Component" => (ControllerKind::Component, Some("component")),
            "RequestMapping" => {
                let path = mapping_path(&directive).to_string();
                if base_path.replace(path).is_some() {
                    return Err(Error::Metadata(format!(
                        "{} declares more than one @RequestMapping",
                        type_path
                    )));
                }
                continue;
            }
            "Tag" => {
                let (key, value) = tag_pair(&directive, type_path)?;
                tags.insert(key, value);
                continue;
            }
            _ => continue,
        };

        match kind {
            Some(existing) if existing != found => {
                return Err(Error::Metadata(format!(
                    "{} carries conflicting controller directives",
                    type_path
                )));
            }
            _ => kind = Some(found),
        }
    }

    let Some((kind, stereotype)) = kind else {
        return Err(Error::Metadata(format!(
            "{} has no controller or component directive",
            type_path
        )));
    };

    let base_path = normalize_base_path(base_path.as_deref().unwrap_or(""))
        .map_err(|e| Error::Metadata(format!("{}: {}", type_path, e.message())))?;

    let mut descriptor =
        ControllerDescriptor::for_type_path(type_path, kind, AnnotationSource::SourceComment)
            .with_base_path(base_path);
    if let Some(stereotype) = stereotype {
        descriptor
            .tags
            .insert("stereotype".to_string(), stereotype.to_string());
    }
    descriptor.tags.extend(tags);

    Ok(descriptor)
}

fn mapping_path(directive: &Directive) -> &str {
    directive
        .value()
        .or_else(|| directive.get("path"))
        .unwrap_or("")
}

fn set_verb(
    verb: &mut Option<(HttpMethod, String)>,
    method: HttpMethod,
    path: &str,
    location: &str,
) -> Result<(), Error> {
    if verb.is_some() {
        return Err(Error::Metadata(format!(
            "{} carries more than one route directive",
            location
        )));
    }
    *verb = Some((method, path.to_string()));
    Ok(())
}

fn tag_pair(directive: &Directive, location: &str) -> Result<(String, String), Error> {
    match (directive.get("name"), directive.get("value")) {
        (Some(name), Some(value)) => Ok((name.to_string(), value.to_string())),
        _ => Err(Error::Metadata(format!(
            "{}: @Tag needs name and value properties",
            location
        ))),
    }
}

fn param_name(
    directive: &Directive,
    source: ParamSource,
    signature: &[(String, String)],
    location: &str,
) -> Result<String, Error> {
    let explicit = directive.get("name").or(match &directive.args {
        DirectiveArgs::Single(value) => Some(value.as_str()),
        _ => None,
    });
    if let Some(name) = explicit {
        return Ok(name.to_string());
    }

    if source == ParamSource::Body {
        let mut bodies = signature
            .iter()
            .filter(|(_, ty)| ParamType::from_type_name(ty).is_body());
        if let (Some((name, _)), None) = (bodies.next(), bodies.next()) {
            return Ok(name.clone());
        }
    }

    Err(Error::Metadata(format!(
        "{}: @{} needs a parameter name",
        location, directive.name
    )))
}

/// Directive names may spell a signature parameter with dashes or in a
/// different case (`X-Tenant` for `x_tenant`).
fn same_name(directive_name: &str, signature_name: &str) -> bool {
    directive_name.len() == signature_name.len()
        && directive_name
            .chars()
            .zip(signature_name.chars())
            .all(|(a, b)| {
                let a = if a == '-' { '_' } else { a };
                a.eq_ignore_ascii_case(&b)
            })
}

/// Doc comment lines, trimmed, with block-comment stars removed.
fn doc_lines(attrs: &[Attribute]) -> Vec<String> {
    let mut lines = Vec::new();
    for attr in attrs {
        if !attr.path().is_ident("doc") {
            continue;
        }
        if let Meta::NameValue(meta) = &attr.meta
            && let Expr::Lit(ExprLit {
                lit: Lit::Str(text),
                ..
            }) = &meta.value
        {
            for line in text.value().lines() {
                let line = line.trim();
                let line = line.strip_prefix('*').map(str::trim_start).unwrap_or(line);
                lines.push(line.to_string());
            }
        }
    }
    lines
}

/// `(name, type)` of every typed signature parameter, type without spaces.
fn signature_params(method: &ImplItemFn) -> Vec<(String, String)> {
    method
        .sig
        .inputs
        .iter()
        .filter_map(|arg| match arg {
            FnArg::Typed(typed) => match typed.pat.as_ref() {
                Pat::Ident(ident) => {
                    let ty: String = typed
                        .ty
                        .to_token_stream()
                        .to_string()
                        .chars()
                        .filter(|c| !c.is_whitespace())
                        .collect();
                    Some((ident.ident.to_string(), ty))
                }
                _ => None,
            },
            FnArg::Receiver(_) => None,
        })
        .collect()
}

fn find_type_attrs<'a>(items: &'a [Item], name: &str) -> Option<&'a [Attribute]> {
    for item in items {
        match item {
            Item::Struct(item) if item.ident == name => return Some(&item.attrs),
            Item::Enum(item) if item.ident == name => return Some(&item.attrs),
            Item::Mod(module) => {
                if let Some((_, inner)) = &module.content
                    && let Some(found) = find_type_attrs(inner, name)
                {
                    return Some(found);
                }
            }
            _ => {}
        }
    }
    None
}

fn collect_methods<'a>(items: &'a [Item], name: &str, out: &mut Vec<&'a ImplItemFn>) {
    for item in items {
        match item {
            Item::Impl(block) if block.trait_.is_none() && is_type(&block.self_ty, name) => {
                out.extend(block.items.iter().filter_map(|item| match item {
                    ImplItem::Fn(method) => Some(method),
                    _ => None,
                }));
            }
            Item::Mod(module) => {
                if let Some((_, inner)) = &module.content {
                    collect_methods(inner, name, out);
                }
            }
            _ => {}
        }
    }
}

fn is_type(ty: &Type, name: &str) -> bool {
    match ty {
        Type::Path(path) => {
            path.qself.is_none()
                && path
                    .path
                    .segments
                    .last()
                    .is_some_and(|segment| segment.ident == name)
        }
        _ => false,
    }
}
