//! Dependency markers attached to annotated parameters

use crate::fields::CustomField;
use crate::provider::{Provider, TypeInfo, Value};
use crate::{DiError, Result};
use std::fmt;
use std::sync::Arc;

/// What an annotated parameter resolves through.
#[derive(Clone)]
pub enum Marker {
    /// Call another provider.
    Depends(Depends),
    /// Extract a value from the request.
    Field(Arc<dyn CustomField>),
}

impl Marker {
    /// Wrap a custom field.
    pub fn field(field: impl CustomField) -> Self {
        Marker::Field(Arc::new(field))
    }

    pub fn as_depends(&self) -> Option<&Depends> {
        match self {
            Marker::Depends(depends) => Some(depends),
            Marker::Field(_) => None,
        }
    }

    pub fn as_field(&self) -> Option<&Arc<dyn CustomField>> {
        match self {
            Marker::Field(field) => Some(field),
            Marker::Depends(_) => None,
        }
    }
}

impl From<Depends> for Marker {
    fn from(depends: Depends) -> Self {
        Marker::Depends(depends)
    }
}

impl fmt::Debug for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Marker::Depends(depends) => depends.fmt(f),
            Marker::Field(field) => f
                .debug_struct("Field")
                .field("source", &field.source())
                .field("name", &field.explicit_name())
                .finish(),
        }
    }
}

/// Reference to a sub-dependency.
///
/// Cached by default: every reference to the same provider within one
/// request observes the same value.
///
/// # Examples
///
/// ```rust
/// use route_injector::{Depends, Provider};
///
/// let counter = Provider::builder("counter").sync(|_| Ok(1_u32));
///
/// let cached = Depends::on(&counter);
/// let fresh = Depends::on(&counter).no_cache();
///
/// assert!(cached.uses_cache());
/// assert!(!fresh.uses_cache());
/// ```
#[derive(Clone)]
pub struct Depends {
    provider: Arc<Provider>,
    use_cache: bool,
    cast: bool,
}

impl Depends {
    pub fn on(provider: &Arc<Provider>) -> Self {
        Self {
            provider: Arc::clone(provider),
            use_cache: true,
            cast: true,
        }
    }

    /// Call the provider for this reference even if it already ran in this request.
    pub fn no_cache(self) -> Self {
        self.use_cache(false)
    }

    pub fn use_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    /// Check the resolved value against the parameter's declared type (on by default).
    pub fn cast(mut self, cast: bool) -> Self {
        self.cast = cast;
        self
    }

    #[inline]
    pub fn provider(&self) -> &Arc<Provider> {
        &self.provider
    }

    #[inline]
    pub fn uses_cache(&self) -> bool {
        self.use_cache
    }

    #[inline]
    pub fn casts(&self) -> bool {
        self.cast
    }

    pub(crate) fn check(&self, name: &str, declared: TypeInfo, value: &Value) -> Result<()> {
        if !self.cast || declared.matches(value) {
            return Ok(());
        }
        Err(DiError::TypeMismatch {
            name: name.to_string(),
            expected: declared.name(),
            found: self.value_type_name(),
        })
    }

    /// Declared return type of the provider.
    pub(crate) fn value_type_name(&self) -> &'static str {
        self.provider
            .signature()
            .return_type()
            .map(|ty| ty.name())
            .unwrap_or("an unknown type")
    }
}

impl fmt::Debug for Depends {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Depends")
            .field("provider", &self.provider.name())
            .field("use_cache", &self.use_cache)
            .field("cast", &self.cast)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let p = Provider::builder("p").sync(|_| Ok(1_u32));
        let d = Depends::on(&p);
        assert!(d.uses_cache());
        assert!(d.casts());
        assert_eq!(d.provider().id(), p.id());
    }

    #[test]
    fn test_cast_check() {
        let p = Provider::builder("p").sync(|_| Ok(1_u32));
        let value: Value = Arc::new(1_u32);

        assert!(Depends::on(&p).check("x", TypeInfo::of::<u32>(), &value).is_ok());

        let err = Depends::on(&p)
            .check("x", TypeInfo::of::<String>(), &value)
            .unwrap_err();
        assert!(matches!(err, DiError::TypeMismatch { found: "u32", .. }));

        assert!(
            Depends::on(&p)
                .cast(false)
                .check("x", TypeInfo::of::<String>(), &value)
                .is_ok()
        );
    }

    #[test]
    fn test_marker_accessors() {
        let p = Provider::builder("p").sync(|_| Ok(1_u32));
        let marker: Marker = Depends::on(&p).no_cache().into();
        assert!(marker.as_field().is_none());
        assert!(!marker.as_depends().unwrap().uses_cache());
    }
}
