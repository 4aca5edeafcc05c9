//! Signature model
//!
//! Every provider carries an explicit [`Signature`]: its ordered parameters,
//! each classified once into a [`ParamKind`], plus the declared return type.
//! Derived signatures are new values; the original is never mutated.

use crate::marker::Marker;
use crate::provider::{TypeInfo, Value};
use crate::{App, Request, Settings, State};
use std::fmt;

/// Context values supplied automatically by the route at call time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AutoInject {
    Request,
    Settings,
    App,
    State,
}

impl AutoInject {
    pub const ALL: [AutoInject; 4] = [
        AutoInject::Request,
        AutoInject::Settings,
        AutoInject::App,
        AutoInject::State,
    ];

    /// Parameter name that selects this kind when the type does not.
    pub fn reserved_name(&self) -> &'static str {
        match self {
            AutoInject::Request => "request",
            AutoInject::Settings => "settings",
            AutoInject::App => "app",
            AutoInject::State => "state",
        }
    }

    /// The type normally declared for this kind.
    pub fn type_info(&self) -> TypeInfo {
        match self {
            AutoInject::Request => TypeInfo::of::<Request>(),
            AutoInject::Settings => TypeInfo::of::<Settings>(),
            AutoInject::App => TypeInfo::of::<App>(),
            AutoInject::State => TypeInfo::of::<State>(),
        }
    }

    fn classify(name: &str, ty: &TypeInfo) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.type_info() == *ty)
            .or_else(|| Self::ALL.into_iter().find(|kind| kind.reserved_name() == name))
    }
}

impl fmt::Display for AutoInject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reserved_name())
    }
}

/// Classification of a parameter, computed once at construction.
#[derive(Debug, Clone)]
pub enum ParamKind {
    /// Supplied by the caller (the host router's own binder).
    Plain,
    /// Request, settings, app or state.
    Auto(AutoInject),
    /// Carries a `Depends` or custom-field marker.
    Annotated(Marker),
}

/// One formal argument of a provider.
#[derive(Clone)]
pub struct Parameter {
    name: String,
    ty: TypeInfo,
    default: Option<Value>,
    kind: ParamKind,
}

impl Parameter {
    /// Un-annotated parameter, classified by declared type first, then by reserved name.
    pub fn new(name: impl Into<String>, ty: TypeInfo) -> Self {
        let name = name.into();
        let kind = match AutoInject::classify(&name, &ty) {
            Some(auto) => ParamKind::Auto(auto),
            None => ParamKind::Plain,
        };
        Self {
            name,
            ty,
            default: None,
            kind,
        }
    }

    /// Annotated parameter. The marker takes precedence over reserved names.
    pub fn annotated(name: impl Into<String>, ty: TypeInfo, marker: Marker) -> Self {
        Self {
            name: name.into(),
            ty,
            default: None,
            kind: ParamKind::Annotated(marker),
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn type_info(&self) -> TypeInfo {
        self.ty
    }

    #[inline]
    pub fn default(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    #[inline]
    pub fn kind(&self) -> &ParamKind {
        &self.kind
    }

    pub fn marker(&self) -> Option<&Marker> {
        match &self.kind {
            ParamKind::Annotated(marker) => Some(marker),
            _ => None,
        }
    }

    pub fn auto_inject(&self) -> Option<AutoInject> {
        match self.kind {
            ParamKind::Auto(auto) => Some(auto),
            _ => None,
        }
    }

    #[inline]
    pub fn is_annotated(&self) -> bool {
        matches!(self.kind, ParamKind::Annotated(_))
    }

    #[inline]
    pub fn is_plain(&self) -> bool {
        matches!(self.kind, ParamKind::Plain)
    }
}

impl fmt::Debug for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parameter")
            .field("name", &self.name)
            .field("type", &self.ty.name())
            .field("has_default", &self.default.is_some())
            .field("kind", &self.kind)
            .finish()
    }
}

/// Ordered parameters plus the declared return type.
///
/// # Examples
///
/// ```rust
/// use route_injector::{Depends, Provider, Request};
///
/// let user = Provider::builder("user")
///     .param::<Request>("request")
///     .sync(|_| Ok(String::from("alice")));
///
/// let handler = Provider::builder("handler")
///     .param::<u32>("page")
///     .depends::<String>("user", Depends::on(&user))
///     .sync(|_| Ok(()));
///
/// let public = handler.signature().without_annotated();
/// assert_eq!(public.names().collect::<Vec<_>>(), vec!["page"]);
/// assert!(user.signature().has_request_parameter());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Signature {
    params: Vec<Parameter>,
    returns: Option<TypeInfo>,
}

impl Signature {
    pub fn new(params: Vec<Parameter>, returns: Option<TypeInfo>) -> Self {
        Self { params, returns }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Parameter> {
        self.params.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.params.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.params.iter().map(|p| p.name.as_str())
    }

    #[inline]
    pub fn return_type(&self) -> Option<TypeInfo> {
        self.returns
    }

    /// Keep plain and auto-injected parameters, in order.
    pub fn without_annotated(&self) -> Signature {
        self.filtered(|p| !p.is_annotated())
    }

    /// Drop request/settings/app/state parameters, keeping annotated ones.
    pub fn without_auto_injected(&self) -> Signature {
        self.filtered(|p| p.auto_inject().is_none())
    }

    /// True if an un-annotated parameter is the request.
    pub fn has_request_parameter(&self) -> bool {
        self.params
            .iter()
            .any(|p| p.auto_inject() == Some(AutoInject::Request))
    }

    /// True if any parameter needs a context value at call time.
    pub fn has_auto_injected(&self) -> bool {
        self.params.iter().any(|p| p.auto_inject().is_some())
    }

    /// `(parameter name, kind)` for each auto-injected parameter.
    pub fn auto_injected(&self) -> Vec<(String, AutoInject)> {
        self.params
            .iter()
            .filter_map(|p| p.auto_inject().map(|auto| (p.name.clone(), auto)))
            .collect()
    }

    /// Annotated parameters with their markers.
    pub fn annotated(&self) -> impl Iterator<Item = (&Parameter, &Marker)> {
        self.params
            .iter()
            .filter_map(|p| p.marker().map(|marker| (p, marker)))
    }

    fn filtered(&self, keep: impl Fn(&Parameter) -> bool) -> Signature {
        Signature {
            params: self.params.iter().filter(|p| keep(p)).cloned().collect(),
            returns: self.returns,
        }
    }
}

impl<'a> IntoIterator for &'a Signature {
    type Item = &'a Parameter;
    type IntoIter = std::slice::Iter<'a, Parameter>;

    fn into_iter(self) -> Self::IntoIter {
        self.params.iter()
    }
}
