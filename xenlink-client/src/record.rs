//! Record snapshots.
//!
//! A record is an immutable copy of every field of one object at one
//! instant, produced only by decoding. Fields missing from the wire are
//! filled with their zero value and remembered as defaulted, so a record the
//! server sent partially can be told apart from one whose fields really are
//! empty.

use std::collections::BTreeMap;
use std::fmt;

use crate::codec::CodecResult;
use crate::handle::ApiClass;
use crate::wire::WireValue;

/// Width the field names are right-aligned to in the display form.
pub const DISPLAY_NAME_WIDTH: usize = 20;

/// A full-object snapshot, declared with [`api_record!`](crate::api_record).
pub trait Record: Sized + Clone + fmt::Debug + Send + Sync + 'static {
    /// The API class this record describes.
    type Class: ApiClass;

    /// Wire names of every field, in declaration order.
    const FIELDS: &'static [&'static str];

    /// Decode a record from a wire struct.
    fn decode_record(value: &WireValue) -> CodecResult<Self>;

    /// Wire-map form: every field by wire name, defaults included.
    fn to_wire_map(&self) -> BTreeMap<String, WireValue>;

    /// Wire names of the fields that were absent when decoding.
    fn defaulted_fields(&self) -> &[&'static str];

    fn is_defaulted(&self, field: &str) -> bool {
        self.defaulted_fields().contains(&field)
    }

    /// True when the server sent every field.
    fn is_complete(&self) -> bool {
        self.defaulted_fields().is_empty()
    }
}

/// An API class that has a record type.
pub trait Entity: ApiClass {
    type Record: Record<Class = Self> + crate::codec::FromWire;
}

/// Write the display form of a record: one `name: value` line per field in
/// declaration order, names right-aligned.
pub fn write_display<R: Record>(record: &R, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let map = record.to_wire_map();
    for name in R::FIELDS {
        let value = map.get(*name).unwrap_or(&WireValue::Nil);
        writeln!(f, "{:>width$}: {}", name, value, width = DISPLAY_NAME_WIDTH)?;
    }
    Ok(())
}

/// Declare a record type.
///
/// ```rust,ignore
/// api_record! {
///     /// PCI device snapshot.
///     pub struct PciRecord for Pci {
///         /// Unique identifier
///         uuid: String = "uuid",
///         host: Ref<Host> = "host",
///     }
/// }
/// ```
///
/// Every field type must implement `FromWire`, `ToWire` and `Default`.
#[macro_export]
macro_rules! api_record {
    (
        $(#[$meta:meta])*
        pub struct $name:ident for $class:ty {
            $( $(#[$fmeta:meta])* $field:ident : $ty:ty = $wire:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq)]
        pub struct $name {
            $( $(#[$fmeta])* pub $field: $ty, )+
            defaulted: ::std::vec::Vec<&'static str>,
        }

        /// Every field holds its zero value and counts as defaulted until
        /// assigned through a decode.
        impl ::std::default::Default for $name {
            fn default() -> Self {
                Self {
                    $( $field: <$ty as ::std::default::Default>::default(), )+
                    defaulted: <$name as $crate::record::Record>::FIELDS.to_vec(),
                }
            }
        }

        impl $crate::record::Record for $name {
            type Class = $class;

            const FIELDS: &'static [&'static str] = &[ $( $wire ),+ ];

            fn decode_record(
                value: &$crate::wire::WireValue,
            ) -> $crate::codec::CodecResult<Self> {
                let fields = match value.as_struct() {
                    Some(fields) => fields,
                    None => {
                        return Err($crate::codec::CodecError::ShapeMismatch {
                            expected: "struct",
                            found: value.kind(),
                        })
                    }
                };
                let mut defaulted = ::std::vec::Vec::new();
                $(
                    let $field: $ty = match fields.get($wire) {
                        Some(raw) if !raw.is_nil() => {
                            <$ty as $crate::codec::FromWire>::from_wire(raw).map_err(|e| {
                                $crate::codec::CodecError::Field {
                                    field: $wire.to_string(),
                                    source: ::std::boxed::Box::new(e),
                                }
                            })?
                        }
                        _ => {
                            defaulted.push($wire);
                            <$ty as ::std::default::Default>::default()
                        }
                    };
                )+
                Ok(Self { $( $field, )+ defaulted })
            }

            fn to_wire_map(
                &self,
            ) -> ::std::collections::BTreeMap<::std::string::String, $crate::wire::WireValue> {
                let mut map = ::std::collections::BTreeMap::new();
                $(
                    map.insert(
                        $wire.to_string(),
                        $crate::codec::ToWire::to_wire_raw(&self.$field),
                    );
                )+
                map
            }

            fn defaulted_fields(&self) -> &[&'static str] {
                &self.defaulted
            }
        }

        impl $crate::record::Entity for $class {
            type Record = $name;
        }

        impl $crate::codec::FromWire for $name {
            fn from_wire(
                value: &$crate::wire::WireValue,
            ) -> $crate::codec::CodecResult<Self> {
                <$name as $crate::record::Record>::decode_record(value)
            }
        }

        impl $crate::codec::ToWire for $name {
            fn to_wire_raw(&self) -> $crate::wire::WireValue {
                $crate::wire::WireValue::Struct(
                    <$name as $crate::record::Record>::to_wire_map(self),
                )
            }

            fn to_wire(&self) -> $crate::codec::CodecResult<$crate::wire::WireValue> {
                let mut map = ::std::collections::BTreeMap::new();
                $(
                    let value = $crate::codec::ToWire::to_wire(&self.$field).map_err(|e| {
                        $crate::codec::CodecError::Field {
                            field: $wire.to_string(),
                            source: ::std::boxed::Box::new(e),
                        }
                    })?;
                    map.insert($wire.to_string(), value);
                )+
                Ok($crate::wire::WireValue::Struct(map))
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                $crate::record::write_display(self, f)
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{CodecError, FromWire, ToWire};
    use crate::enums::EnumValue;
    use crate::handle::Ref;
    use chrono::{DateTime, Utc};
    use std::collections::BTreeSet;

    crate::api_class! {
        Widget => "widget",
    }

    crate::wire_enum! {
        enum Mood: "mood" {
            Calm = "calm",
        }
    }

    crate::api_record! {
        pub struct WidgetRecord for Widget {
            uuid: String = "uuid",
            size: i64 = "size",
            enabled: bool = "enabled",
            created: DateTime<Utc> = "created",
            parent: Ref<Widget> = "parent",
            mood: EnumValue<Mood> = "mood",
            tags: BTreeSet<String> = "tags",
        }
    }

    #[test]
    fn test_missing_fields_default() {
        let wire = WireValue::structure([("uuid", WireValue::from("abc"))]);
        let record = WidgetRecord::decode_record(&wire).unwrap();

        assert_eq!(record.uuid, "abc");
        assert_eq!(record.size, 0);
        assert!(!record.enabled);
        assert_eq!(record.created.timestamp(), 0);
        assert!(record.parent.is_null());
        assert_eq!(record.mood, EnumValue::Unrecognized(String::new()));
        assert!(record.tags.is_empty());

        assert!(!record.is_defaulted("uuid"));
        assert!(record.is_defaulted("size"));
        assert_eq!(record.defaulted_fields().len(), 6);
        assert!(!record.is_complete());
    }

    #[test]
    fn test_defaulted_distinguishable_from_literal_zero() {
        let partial = WidgetRecord::decode_record(&WireValue::structure([("uuid", WireValue::from(""))]))
            .unwrap();
        let literal = WidgetRecord::decode_record(&WireValue::structure([
            ("uuid", WireValue::from("")),
            ("size", WireValue::Int(0)),
            ("enabled", WireValue::Bool(false)),
            ("created", WireValue::from("19700101T00:00:00Z")),
            ("parent", WireValue::from("OpaqueRef:NULL")),
            ("mood", WireValue::from("")),
            ("tags", WireValue::Array(vec![])),
        ]))
        .unwrap();

        assert_eq!(partial.to_wire_map(), literal.to_wire_map());
        assert!(literal.is_complete());
        assert_ne!(partial, literal);
    }

    #[test]
    fn test_wire_map_substitutes_defaults() {
        let record = WidgetRecord::decode_record(&WireValue::structure(Vec::<(&str, WireValue)>::new()))
            .unwrap();
        let map = record.to_wire_map();

        assert_eq!(map.len(), WidgetRecord::FIELDS.len());
        assert_eq!(map["parent"], WireValue::from("OpaqueRef:NULL"));
        assert_eq!(map["mood"], WireValue::from(""));
        assert_eq!(map["tags"], WireValue::Array(vec![]));
    }

    #[test]
    fn test_field_error_names_field() {
        let wire = WireValue::structure([("size", WireValue::Bool(true))]);
        let err = WidgetRecord::from_wire(&wire).unwrap_err();
        assert!(matches!(err, CodecError::Field { ref field, .. } if field == "size"));
    }

    #[test]
    fn test_not_a_struct() {
        assert!(matches!(
            WidgetRecord::from_wire(&WireValue::from("x")),
            Err(CodecError::ShapeMismatch { expected: "struct", .. })
        ));
    }

    #[test]
    fn test_display_form() {
        let wire = WireValue::structure([("uuid", WireValue::from("abc")), ("size", WireValue::Int(3))]);
        let record = WidgetRecord::from_wire(&wire).unwrap();
        let text = record.to_string();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), WidgetRecord::FIELDS.len());
        assert_eq!(lines[0], format!("{:>20}: abc", "uuid"));
        assert_eq!(lines[1], format!("{:>20}: 3", "size"));
    }

    #[test]
    fn test_snapshot_form_round_trips() {
        let wire = WireValue::structure([("uuid", WireValue::from("abc")), ("mood", WireValue::from("ecstatic"))]);
        let record = WidgetRecord::from_wire(&wire).unwrap();
        let again = WidgetRecord::from_wire(&record.to_wire_raw()).unwrap();

        assert_eq!(again.mood.as_raw(), "ecstatic");
        assert_eq!(again.uuid, "abc");
    }

    #[test]
    fn test_call_encoding_refuses_unrecognized_enum() {
        let wire = WireValue::structure([("uuid", WireValue::from("abc")), ("mood", WireValue::from("ecstatic"))]);
        let record = WidgetRecord::from_wire(&wire).unwrap();

        let err = record.to_wire().unwrap_err();
        assert!(matches!(
            err,
            CodecError::Field { ref field, ref source }
                if field == "mood" && matches!(**source, CodecError::UnrecognizedEnum { .. })
        ));
    }

    #[test]
    fn test_call_encoding_of_known_values() {
        let mut record = WidgetRecord::default();
        record.uuid = "abc".to_string();
        record.mood = Mood::Calm.into();

        let encoded = record.to_wire().unwrap();
        assert_eq!(encoded.get("mood"), Some(&WireValue::from("calm")));
        assert_eq!(encoded.get("uuid"), Some(&WireValue::from("abc")));
        assert_eq!(encoded, record.to_wire_raw());
    }

    #[test]
    fn test_default_record_is_fully_defaulted() {
        let record = WidgetRecord::default();
        assert_eq!(record.defaulted_fields(), WidgetRecord::FIELDS);
        assert!(record.is_defaulted("uuid"));
        assert!(!record.is_complete());
        assert!(record.to_wire().is_err());
    }
}
