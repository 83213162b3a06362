//! Object handles.
//!
//! A [`Ref<C>`] is an opaque, server-assigned reference to an object of API
//! class `C`. Handles carry no state and are never dereferenced locally:
//! every read or write is a remote call. Identity is the pair
//! `(class, reference)`, so two handles of different classes are never equal
//! even when the server reused the same literal string.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use crate::codec::{CodecError, CodecResult, FromWire, ToWire, WireKey};
use crate::wire::WireValue;

/// Literal the server uses for "no object".
pub const NULL_REF: &str = "OpaqueRef:NULL";

/// Marker for an API class (`VM`, `host`, ...).
pub trait ApiClass: Send + Sync + 'static {
    /// Class name as used in method names (`VM.start`) and events.
    const NAME: &'static str;
}

/// Declare marker types for API classes.
///
/// ```rust,ignore
/// api_class! {
///     /// A virtual machine.
///     Vm => "VM",
/// }
/// ```
#[macro_export]
macro_rules! api_class {
    ( $( $(#[$meta:meta])* $name:ident => $wire:literal ),+ $(,)? ) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
            pub enum $name {}

            impl $crate::handle::ApiClass for $name {
                const NAME: &'static str = $wire;
            }
        )+
    };
}

/// Typed handle to a server-side object.
pub struct Ref<C: ApiClass> {
    reference: String,
    _class: PhantomData<fn() -> C>,
}

impl<C: ApiClass> Ref<C> {
    /// Wrap a raw reference. Only the codec and the mock server mint handles.
    pub(crate) fn from_wire_string(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            _class: PhantomData,
        }
    }

    /// The null reference of this class.
    pub fn null() -> Self {
        Self::from_wire_string(NULL_REF)
    }

    pub fn is_null(&self) -> bool {
        self.reference == NULL_REF
    }

    /// The raw reference string as sent on the wire.
    pub fn as_wire_str(&self) -> &str {
        &self.reference
    }

    pub fn class_name(&self) -> &'static str {
        C::NAME
    }

    /// Drop the static class, keeping the class name at runtime.
    pub fn erase(&self) -> AnyRef {
        AnyRef {
            class: C::NAME.to_string(),
            reference: self.reference.clone(),
        }
    }
}

impl<C: ApiClass> Clone for Ref<C> {
    fn clone(&self) -> Self {
        Self::from_wire_string(self.reference.clone())
    }
}

impl<C: ApiClass> Default for Ref<C> {
    fn default() -> Self {
        Self::null()
    }
}

impl<A: ApiClass, B: ApiClass> PartialEq<Ref<B>> for Ref<A> {
    fn eq(&self, other: &Ref<B>) -> bool {
        A::NAME == B::NAME && self.reference == other.reference
    }
}

impl<C: ApiClass> Eq for Ref<C> {}

impl<C: ApiClass> Hash for Ref<C> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        C::NAME.hash(state);
        self.reference.hash(state);
    }
}

impl<C: ApiClass> PartialOrd for Ref<C> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<C: ApiClass> Ord for Ref<C> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.reference.cmp(&other.reference)
    }
}

impl<C: ApiClass> fmt::Debug for Ref<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ref<{}>({})", C::NAME, self.reference)
    }
}

impl<C: ApiClass> fmt::Display for Ref<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reference)
    }
}

impl<C: ApiClass> ToWire for Ref<C> {
    fn to_wire_raw(&self) -> WireValue {
        WireValue::String(self.reference.clone())
    }
}

/// Only the string shape is checked; liveness is the server's business.
impl<C: ApiClass> FromWire for Ref<C> {
    fn from_wire(value: &WireValue) -> CodecResult<Self> {
        match value {
            WireValue::String(reference) => Ok(Self::from_wire_string(reference.clone())),
            other => Err(CodecError::shape("string", other)),
        }
    }
}

impl<C: ApiClass> WireKey for Ref<C> {
    fn to_key_raw(&self) -> String {
        self.reference.clone()
    }

    fn from_key(key: &str) -> CodecResult<Self> {
        Ok(Self::from_wire_string(key))
    }
}

/// Handle whose class is only known at runtime, e.g. the object of an event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AnyRef {
    class: String,
    reference: String,
}

impl AnyRef {
    pub(crate) fn new(class: impl Into<String>, reference: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            reference: reference.into(),
        }
    }

    pub fn class_name(&self) -> &str {
        &self.class
    }

    pub fn as_wire_str(&self) -> &str {
        &self.reference
    }

    /// Recover a typed handle when the class matches. Class names compare
    /// case-insensitively because events report classes in lowercase.
    pub fn downcast<C: ApiClass>(&self) -> Option<Ref<C>> {
        if self.class.eq_ignore_ascii_case(C::NAME) {
            Some(Ref::from_wire_string(self.reference.clone()))
        } else {
            None
        }
    }
}

impl fmt::Display for AnyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.class, self.reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    crate::api_class! {
        Alpha => "alpha",
        Beta => "beta",
    }

    fn alpha(r: &str) -> Ref<Alpha> {
        Ref::from_wire_string(r)
    }

    fn beta(r: &str) -> Ref<Beta> {
        Ref::from_wire_string(r)
    }

    #[test]
    fn test_equality_by_reference() {
        assert_eq!(alpha("OpaqueRef:1"), alpha("OpaqueRef:1"));
        assert_ne!(alpha("OpaqueRef:1"), alpha("OpaqueRef:2"));

        let mut set = HashSet::new();
        set.insert(alpha("OpaqueRef:1"));
        assert!(set.contains(&alpha("OpaqueRef:1")));
    }

    #[test]
    fn test_cross_class_never_equal() {
        assert!(alpha("OpaqueRef:1") != beta("OpaqueRef:1"));
        assert_ne!(alpha("OpaqueRef:1").erase(), beta("OpaqueRef:1").erase());
    }

    #[test]
    fn test_null_reference() {
        let null = Ref::<Alpha>::null();
        assert!(null.is_null());
        assert_eq!(null.as_wire_str(), NULL_REF);
        assert_eq!(Ref::<Alpha>::default(), null);
    }

    #[test]
    fn test_decode_checks_only_shape() {
        let handle: Ref<Alpha> = FromWire::from_wire(&WireValue::from("not-even-opaque")).unwrap();
        assert_eq!(handle.as_wire_str(), "not-even-opaque");
        assert!(Ref::<Alpha>::from_wire(&WireValue::Int(5)).is_err());
    }

    #[test]
    fn test_downcast() {
        let any = AnyRef::new("ALPHA", "OpaqueRef:9");
        assert_eq!(any.downcast::<Alpha>(), Some(alpha("OpaqueRef:9")));
        assert!(any.downcast::<Beta>().is_none());
    }
}
