//! PCI devices.

use std::collections::{BTreeMap, BTreeSet};

use crate::api::host::Host;
use crate::call::Call;
use crate::handle::Ref;

crate::api_class! {
    /// A PCI device on a host.
    Pci => "PCI",
}

crate::api_record! {
    pub struct PciRecord for Pci {
        uuid: String = "uuid",
        class_name: String = "class_name",
        vendor_name: String = "vendor_name",
        device_name: String = "device_name",
        host: Ref<Host> = "host",
        /// Bus address, `0000:04:00.0`
        pci_id: String = "pci_id",
        /// Devices that must be passed through together with this one
        dependencies: BTreeSet<Ref<Pci>> = "dependencies",
        other_config: BTreeMap<String, String> = "other_config",
        subsystem_vendor_name: String = "subsystem_vendor_name",
        subsystem_device_name: String = "subsystem_device_name",
        driver_name: String = "driver_name",
    }
}

impl Ref<Pci> {
    pub fn get_host(&self) -> Call<Ref<Host>> {
        self.get_field("host")
    }

    pub fn get_pci_id(&self) -> Call<String> {
        self.get_field("pci_id")
    }

    pub fn get_dependencies(&self) -> Call<BTreeSet<Ref<Pci>>> {
        self.get_field("dependencies")
    }

    pub fn set_other_config(&self, other_config: &BTreeMap<String, String>) -> Call<()> {
        self.set_field("other_config", other_config)
    }

    pub fn add_to_other_config(&self, key: &str, value: &str) -> Call<()> {
        self.add_to_field("other_config", key, value)
    }

    pub fn remove_from_other_config(&self, key: &str) -> Call<()> {
        self.remove_from_field("other_config", key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::decode;
    use crate::record::Record;
    use crate::wire::WireValue;

    #[test]
    fn test_record_keeps_dependencies_as_set() {
        let wire = WireValue::structure([
            ("pci_id", WireValue::from("0000:04:00.0")),
            ("host", WireValue::from("OpaqueRef:h")),
            (
                "dependencies",
                WireValue::Array(vec!["OpaqueRef:p2".into(), "OpaqueRef:p2".into()]),
            ),
        ]);
        let record: PciRecord = decode(&wire).unwrap();

        assert_eq!(record.pci_id, "0000:04:00.0");
        assert_eq!(record.dependencies.len(), 1);
        assert!(record.is_defaulted("driver_name"));
        assert_eq!(record.driver_name, "");
    }

    #[test]
    fn test_other_config_mutators() {
        let pci: Ref<Pci> = decode(&WireValue::from("OpaqueRef:p1")).unwrap();
        let call = pci.add_to_other_config("passthrough", "true");
        assert_eq!(call.method(), "PCI.add_to_other_config");
        assert_eq!(
            call.args(),
            &[
                WireValue::from("OpaqueRef:p1"),
                WireValue::from("passthrough"),
                WireValue::from("true")
            ]
        );
    }
}
