//! Physical hosts.

use std::collections::{BTreeMap, BTreeSet};

use crate::api::pci::Pci;
use crate::api::vm::Vm;
use crate::api::{HostMetrics, Pgpu, Pif, Sr};
use crate::call::{Action, Call};
use crate::enums::EnumValue;
use crate::handle::Ref;

crate::api_class! {
    /// A physical host running the hypervisor.
    Host => "host",
}

crate::wire_enum! {
    pub enum HostAllowedOperation: "host_allowed_operations" {
        Provision = "provision",
        Evacuate = "evacuate",
        Shutdown = "shutdown",
        Reboot = "reboot",
        PowerOn = "power_on",
        VmStart = "vm_start",
        VmResume = "vm_resume",
        VmMigrate = "vm_migrate",
    }
}

crate::wire_enum! {
    pub enum HostDisplay: "host_display" {
        Enabled = "enabled",
        DisableOnReboot = "disable_on_reboot",
        Disabled = "disabled",
        EnableOnReboot = "enable_on_reboot",
    }
}

crate::api_record! {
    /// Snapshot of a host.
    pub struct HostRecord for Host {
        uuid: String = "uuid",
        name_label: String = "name_label",
        name_description: String = "name_description",
        memory_overhead: i64 = "memory_overhead",
        allowed_operations: BTreeSet<EnumValue<HostAllowedOperation>> = "allowed_operations",
        current_operations: BTreeMap<String, EnumValue<HostAllowedOperation>> = "current_operations",
        api_version_major: i64 = "API_version_major",
        api_version_minor: i64 = "API_version_minor",
        api_version_vendor: String = "API_version_vendor",
        enabled: bool = "enabled",
        software_version: BTreeMap<String, String> = "software_version",
        other_config: BTreeMap<String, String> = "other_config",
        capabilities: BTreeSet<String> = "capabilities",
        cpu_configuration: BTreeMap<String, String> = "cpu_configuration",
        sched_policy: String = "sched_policy",
        supported_bootloaders: BTreeSet<String> = "supported_bootloaders",
        resident_vms: BTreeSet<Ref<Vm>> = "resident_VMs",
        logging: BTreeMap<String, String> = "logging",
        pifs: BTreeSet<Ref<Pif>> = "PIFs",
        suspend_image_sr: Ref<Sr> = "suspend_image_sr",
        crash_dump_sr: Ref<Sr> = "crash_dump_sr",
        cpu_info: BTreeMap<String, String> = "cpu_info",
        hostname: String = "hostname",
        address: String = "address",
        metrics: Ref<HostMetrics> = "metrics",
        license_params: BTreeMap<String, String> = "license_params",
        tags: BTreeSet<String> = "tags",
        edition: String = "edition",
        bios_strings: BTreeMap<String, String> = "bios_strings",
        local_cache_sr: Ref<Sr> = "local_cache_sr",
        chipset_info: BTreeMap<String, String> = "chipset_info",
        pcis: BTreeSet<Ref<Pci>> = "PCIs",
        pgpus: BTreeSet<Ref<Pgpu>> = "PGPUs",
        ssl_legacy: bool = "ssl_legacy",
        display: EnumValue<HostDisplay> = "display",
        virtual_hardware_platform_versions: BTreeSet<i64> = "virtual_hardware_platform_versions",
        control_domain: Ref<Vm> = "control_domain",
        iscsi_iqn: String = "iscsi_iqn",
        multipathing: bool = "multipathing",
    }
}

impl Ref<Host> {
    pub fn get_name_label(&self) -> Call<String> {
        self.get_field("name_label")
    }

    pub fn get_enabled(&self) -> Call<bool> {
        self.get_field("enabled")
    }

    pub fn get_resident_vms(&self) -> Call<BTreeSet<Ref<Vm>>> {
        self.get_field("resident_VMs")
    }

    /// Stop new VMs from starting on this host.
    pub fn disable(&self) -> Action<()> {
        self.action("disable")
    }

    pub fn enable(&self) -> Action<()> {
        self.action("enable")
    }

    /// Reboot the host. It must be disabled and empty first.
    pub fn reboot(&self) -> Action<()> {
        self.action("reboot")
    }

    pub fn shutdown(&self) -> Action<()> {
        self.action("shutdown")
    }

    /// Migrate every VM away from this host.
    pub fn evacuate(&self) -> Action<()> {
        self.action("evacuate")
    }
}
