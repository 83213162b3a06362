//! Enumerations with an open vocabulary.
//!
//! The server may be newer than the client and send tokens the client has
//! never heard of. Decoding therefore never fails on an unknown token: it
//! yields [`EnumValue::Unrecognized`] carrying the raw string. Sending such a
//! value back is refused at encode time.

use std::fmt;

use crate::codec::{CodecError, CodecResult, FromWire, ToWire, WireKey};
use crate::wire::WireValue;

/// A closed set of wire tokens, declared with [`wire_enum!`](crate::wire_enum).
pub trait WireEnum: Sized + Copy + Eq + Ord + fmt::Debug + 'static {
    /// Vocabulary name used in error messages (e.g. `vm_power_state`).
    const VOCABULARY: &'static str;

    /// Every known member, in declaration order.
    const ALL: &'static [Self];

    /// The wire token of this member.
    fn as_str(&self) -> &'static str;

    /// Look up a member by its wire token.
    fn from_token(token: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|member| member.as_str() == token)
    }
}

/// A decoded enum value: a known member or the raw token the client did not
/// recognize.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EnumValue<T> {
    Known(T),
    Unrecognized(String),
}

impl<T: WireEnum> EnumValue<T> {
    /// Classify a raw token.
    pub fn from_token(token: &str) -> Self {
        match T::from_token(token) {
            Some(member) => EnumValue::Known(member),
            None => EnumValue::Unrecognized(token.to_string()),
        }
    }

    pub fn known(&self) -> Option<T> {
        match self {
            EnumValue::Known(member) => Some(*member),
            EnumValue::Unrecognized(_) => None,
        }
    }

    pub fn is(&self, member: T) -> bool {
        self.known() == Some(member)
    }

    pub fn is_unrecognized(&self) -> bool {
        matches!(self, EnumValue::Unrecognized(_))
    }

    /// The token as it appeared on the wire.
    pub fn as_raw(&self) -> &str {
        match self {
            EnumValue::Known(member) => member.as_str(),
            EnumValue::Unrecognized(raw) => raw,
        }
    }
}

/// Missing enum fields decode to an empty unrecognized token.
impl<T> Default for EnumValue<T> {
    fn default() -> Self {
        EnumValue::Unrecognized(String::new())
    }
}

impl<T> From<T> for EnumValue<T> {
    fn from(member: T) -> Self {
        EnumValue::Known(member)
    }
}

impl<T: WireEnum> fmt::Display for EnumValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnumValue::Known(member) => write!(f, "{}", member.as_str()),
            EnumValue::Unrecognized(raw) => write!(f, "UNRECOGNIZED({})", raw),
        }
    }
}

impl<T: WireEnum> ToWire for EnumValue<T> {
    fn to_wire_raw(&self) -> WireValue {
        WireValue::String(self.as_raw().to_string())
    }

    fn to_wire(&self) -> CodecResult<WireValue> {
        match self {
            EnumValue::Known(member) => Ok(WireValue::String(member.as_str().to_string())),
            EnumValue::Unrecognized(raw) => Err(CodecError::UnrecognizedEnum {
                vocabulary: T::VOCABULARY,
                raw: raw.clone(),
            }),
        }
    }
}

impl<T: WireEnum> FromWire for EnumValue<T> {
    fn from_wire(value: &WireValue) -> CodecResult<Self> {
        match value {
            WireValue::String(token) => Ok(EnumValue::from_token(token)),
            other => Err(CodecError::shape("string", other)),
        }
    }
}

impl<T: WireEnum> WireKey for EnumValue<T> {
    fn to_key_raw(&self) -> String {
        self.as_raw().to_string()
    }

    fn to_key(&self) -> CodecResult<String> {
        match self.to_wire()? {
            WireValue::String(token) => Ok(token),
            other => Err(CodecError::shape("string", &other)),
        }
    }

    fn from_key(key: &str) -> CodecResult<Self> {
        Ok(EnumValue::from_token(key))
    }
}

/// Declare a wire enumeration.
///
/// ```rust,ignore
/// wire_enum! {
///     /// Power state of a VM.
///     pub enum VmPowerState: "vm_power_state" {
///         Halted = "Halted",
///         Running = "Running",
///     }
/// }
/// ```
///
/// The bare type implements [`ToWire`] so it can be passed as a call
/// argument; decoding always goes through [`EnumValue`].
#[macro_export]
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident : $vocabulary:literal {
            $( $(#[$vmeta:meta])* $variant:ident = $token:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        $vis enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $crate::enums::WireEnum for $name {
            const VOCABULARY: &'static str = $vocabulary;
            const ALL: &'static [Self] = &[ $( $name::$variant ),+ ];

            fn as_str(&self) -> &'static str {
                match self {
                    $( $name::$variant => $token ),+
                }
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str($crate::enums::WireEnum::as_str(self))
            }
        }

        impl $crate::codec::ToWire for $name {
            fn to_wire_raw(&self) -> $crate::wire::WireValue {
                $crate::wire::WireValue::String($crate::enums::WireEnum::as_str(self).to_string())
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    crate::wire_enum! {
        enum Colour: "colour" {
            Red = "red",
            Green = "green",
        }
    }

    #[test]
    fn test_known_token() {
        let value: EnumValue<Colour> = FromWire::from_wire(&WireValue::from("green")).unwrap();
        assert_eq!(value, EnumValue::Known(Colour::Green));
        assert!(value.is(Colour::Green));
        assert_eq!(value.to_wire().unwrap(), WireValue::from("green"));
    }

    #[test]
    fn test_unknown_token_is_preserved() {
        let value: EnumValue<Colour> = FromWire::from_wire(&WireValue::from("ultraviolet")).unwrap();
        assert!(value.is_unrecognized());
        assert_eq!(value.as_raw(), "ultraviolet");
        assert_eq!(value.to_string(), "UNRECOGNIZED(ultraviolet)");
    }

    #[test]
    fn test_unrecognized_refuses_to_encode() {
        let value = EnumValue::<Colour>::Unrecognized("ultraviolet".to_string());
        assert_eq!(
            value.to_wire().unwrap_err(),
            CodecError::UnrecognizedEnum {
                vocabulary: "colour",
                raw: "ultraviolet".to_string()
            }
        );
    }

    #[test]
    fn test_unrecognized_keeps_raw_snapshot_form() {
        let value = EnumValue::<Colour>::Unrecognized("ultraviolet".to_string());
        assert_eq!(value.to_wire_raw(), WireValue::from("ultraviolet"));
    }

    #[test]
    fn test_wrong_shape() {
        let result = EnumValue::<Colour>::from_wire(&WireValue::Int(1));
        assert!(matches!(result, Err(CodecError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_default_is_empty_unrecognized() {
        assert_eq!(EnumValue::<Colour>::default(), EnumValue::Unrecognized(String::new()));
    }

    #[test]
    fn test_bare_member_encodes() {
        assert_eq!(Colour::Red.to_wire().unwrap(), WireValue::from("red"));
        assert_eq!(Colour::ALL.len(), 2);
    }
}
