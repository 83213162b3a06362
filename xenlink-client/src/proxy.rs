//! Calls every API class shares.
//!
//! Instance-level calls hang off [`Ref<C>`]; class-level calls come from the
//! [`ClassCalls`] trait, implemented for every API class marker, so
//! `Vm::get_all()` and `vm.get_record()` need no per-class code.

use std::collections::{BTreeMap, BTreeSet};

use crate::call::{Action, Call};
use crate::codec::{FromWire, ToWire};
use crate::handle::{ApiClass, Ref};
use crate::record::Entity;

/// Full method name for an operation of class `C` (`VM.start`).
pub fn method_name<C: ApiClass>(operation: &str) -> String {
    format!("{}.{}", C::NAME, operation)
}

impl<C: ApiClass> Ref<C> {
    /// A read-only call on this object.
    pub fn call<R: FromWire>(&self, operation: &str) -> Call<R> {
        Call::new(method_name::<C>(operation)).arg(self)
    }

    /// A mutating call on this object.
    pub fn action<R: FromWire>(&self, operation: &str) -> Action<R> {
        Action::new(method_name::<C>(operation)).arg(self)
    }

    /// Read a full snapshot of this object.
    pub fn get_record(&self) -> Call<C::Record>
    where
        C: Entity,
    {
        self.call("get_record")
    }

    /// Read one field by its wire name.
    pub fn get_field<T: FromWire>(&self, field: &str) -> Call<T> {
        self.call(&format!("get_{}", field))
    }

    /// Overwrite one field by its wire name.
    pub fn set_field<T: ToWire + ?Sized>(&self, field: &str, value: &T) -> Call<()> {
        self.call(&format!("set_{}", field)).arg(value)
    }

    /// Add a key to a map-valued field.
    pub fn add_to_field<K, V>(&self, field: &str, key: &K, value: &V) -> Call<()>
    where
        K: ToWire + ?Sized,
        V: ToWire + ?Sized,
    {
        self.call(&format!("add_to_{}", field)).arg(key).arg(value)
    }

    /// Remove a key from a map-valued field.
    pub fn remove_from_field<K: ToWire + ?Sized>(&self, field: &str, key: &K) -> Call<()> {
        self.call(&format!("remove_from_{}", field)).arg(key)
    }

    pub fn get_uuid(&self) -> Call<String> {
        self.get_field("uuid")
    }

    pub fn get_other_config(&self) -> Call<BTreeMap<String, String>> {
        self.get_field("other_config")
    }
}

/// Class-level calls, available on every API class marker.
pub trait ClassCalls: ApiClass + Sized {
    /// Handles of every object of this class.
    fn get_all() -> Call<Vec<Ref<Self>>> {
        Call::new(method_name::<Self>("get_all"))
    }

    /// Snapshots of every object of this class, keyed by handle.
    fn get_all_records() -> Call<BTreeMap<Ref<Self>, Self::Record>>
    where
        Self: Entity,
    {
        Call::new(method_name::<Self>("get_all_records"))
    }

    fn get_by_uuid(uuid: &str) -> Call<Ref<Self>> {
        Call::new(method_name::<Self>("get_by_uuid")).arg(uuid)
    }

    fn get_by_name_label(label: &str) -> Call<BTreeSet<Ref<Self>>> {
        Call::new(method_name::<Self>("get_by_name_label")).arg(label)
    }
}

impl<C: ApiClass> ClassCalls for C {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::vm::Vm;
    use crate::codec::decode;
    use crate::wire::WireValue;

    #[test]
    fn test_instance_call_prepends_handle() {
        let vm: Ref<Vm> = decode(&WireValue::from("OpaqueRef:7")).unwrap();
        let call = vm.set_field("name_label", "web-01");
        assert_eq!(call.method(), "VM.set_name_label");
        assert_eq!(call.args(), &[WireValue::from("OpaqueRef:7"), WireValue::from("web-01")]);
    }

    #[test]
    fn test_class_calls() {
        assert_eq!(Vm::get_all().method(), "VM.get_all");
        assert_eq!(Vm::get_all_records().method(), "VM.get_all_records");
        assert_eq!(Vm::get_by_uuid("u-1").args(), &[WireValue::from("u-1")]);
    }
}
