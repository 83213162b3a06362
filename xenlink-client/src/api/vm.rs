//! Virtual machines.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};

use crate::api::host::Host;
use crate::api::{Console, Vbd, Vdi, Vif, VmGuestMetrics, VmMetrics};
use crate::call::{Action, Call};
use crate::enums::EnumValue;
use crate::handle::Ref;
use crate::proxy::method_name;

crate::api_class! {
    /// A virtual machine (or template, or snapshot).
    Vm => "VM",
}

crate::wire_enum! {
    /// Power state of a VM.
    pub enum VmPowerState: "vm_power_state" {
        Halted = "Halted",
        Paused = "Paused",
        Running = "Running",
        Suspended = "Suspended",
    }
}

crate::wire_enum! {
    /// Operations that may be allowed or in progress on a VM.
    pub enum VmOperation: "vm_operations" {
        Snapshot = "snapshot",
        Clone = "clone",
        Copy = "copy",
        Provision = "provision",
        Start = "start",
        StartOn = "start_on",
        Pause = "pause",
        Unpause = "unpause",
        CleanShutdown = "clean_shutdown",
        CleanReboot = "clean_reboot",
        HardShutdown = "hard_shutdown",
        HardReboot = "hard_reboot",
        Suspend = "suspend",
        Resume = "resume",
        PoolMigrate = "pool_migrate",
        MigrateSend = "migrate_send",
        Destroy = "destroy",
    }
}

crate::wire_enum! {
    /// What to do when the guest shuts down or reboots.
    pub enum OnNormalExit: "on_normal_exit" {
        Destroy = "destroy",
        Restart = "restart",
    }
}

crate::wire_enum! {
    /// What to do when the guest crashes.
    pub enum OnCrashBehaviour: "on_crash_behaviour" {
        CoredumpAndDestroy = "coredump_and_destroy",
        CoredumpAndRestart = "coredump_and_restart",
        Destroy = "destroy",
        Preserve = "preserve",
        RenameRestart = "rename_restart",
        Restart = "restart",
    }
}

crate::api_record! {
    /// Snapshot of a VM.
    pub struct VmRecord for Vm {
        uuid: String = "uuid",
        allowed_operations: BTreeSet<EnumValue<VmOperation>> = "allowed_operations",
        current_operations: BTreeMap<String, EnumValue<VmOperation>> = "current_operations",
        power_state: EnumValue<VmPowerState> = "power_state",
        name_label: String = "name_label",
        name_description: String = "name_description",
        user_version: i64 = "user_version",
        is_a_template: bool = "is_a_template",
        is_default_template: bool = "is_default_template",
        suspend_vdi: Ref<Vdi> = "suspend_VDI",
        /// Host the VM is currently running on
        resident_on: Ref<Host> = "resident_on",
        affinity: Ref<Host> = "affinity",
        memory_overhead: i64 = "memory_overhead",
        memory_target: i64 = "memory_target",
        memory_static_max: i64 = "memory_static_max",
        memory_dynamic_max: i64 = "memory_dynamic_max",
        memory_dynamic_min: i64 = "memory_dynamic_min",
        memory_static_min: i64 = "memory_static_min",
        vcpus_params: BTreeMap<String, String> = "VCPUs_params",
        vcpus_max: i64 = "VCPUs_max",
        vcpus_at_startup: i64 = "VCPUs_at_startup",
        actions_after_shutdown: EnumValue<OnNormalExit> = "actions_after_shutdown",
        actions_after_reboot: EnumValue<OnNormalExit> = "actions_after_reboot",
        actions_after_crash: EnumValue<OnCrashBehaviour> = "actions_after_crash",
        consoles: BTreeSet<Ref<Console>> = "consoles",
        vifs: BTreeSet<Ref<Vif>> = "VIFs",
        vbds: BTreeSet<Ref<Vbd>> = "VBDs",
        pv_bootloader: String = "PV_bootloader",
        pv_kernel: String = "PV_kernel",
        pv_args: String = "PV_args",
        hvm_boot_policy: String = "HVM_boot_policy",
        hvm_boot_params: BTreeMap<String, String> = "HVM_boot_params",
        hvm_shadow_multiplier: f64 = "HVM_shadow_multiplier",
        platform: BTreeMap<String, String> = "platform",
        other_config: BTreeMap<String, String> = "other_config",
        domid: i64 = "domid",
        is_control_domain: bool = "is_control_domain",
        metrics: Ref<VmMetrics> = "metrics",
        guest_metrics: Ref<VmGuestMetrics> = "guest_metrics",
        is_a_snapshot: bool = "is_a_snapshot",
        snapshot_of: Ref<Vm> = "snapshot_of",
        snapshots: BTreeSet<Ref<Vm>> = "snapshots",
        snapshot_time: DateTime<Utc> = "snapshot_time",
        tags: BTreeSet<String> = "tags",
        blocked_operations: BTreeMap<EnumValue<VmOperation>, String> = "blocked_operations",
        parent: Ref<Vm> = "parent",
        children: BTreeSet<Ref<Vm>> = "children",
    }
}

impl Vm {
    /// Create a VM from a template-like record. Only the fields the server
    /// accepts at creation time are honoured.
    pub fn create(record: &VmRecord) -> Action<Ref<Vm>> {
        Action::new(method_name::<Vm>("create")).arg(record)
    }
}

impl Ref<Vm> {
    pub fn get_power_state(&self) -> Call<EnumValue<VmPowerState>> {
        self.get_field("power_state")
    }

    pub fn get_name_label(&self) -> Call<String> {
        self.get_field("name_label")
    }

    pub fn set_name_label(&self, label: &str) -> Call<()> {
        self.set_field("name_label", label)
    }

    pub fn get_resident_on(&self) -> Call<Ref<Host>> {
        self.get_field("resident_on")
    }

    /// Boot a halted VM.
    pub fn start(&self, start_paused: bool, force: bool) -> Action<()> {
        self.action("start").arg(&start_paused).arg(&force)
    }

    /// Boot a halted VM on a specific host.
    pub fn start_on(&self, host: &Ref<Host>, start_paused: bool, force: bool) -> Action<()> {
        self.action("start_on").arg(host).arg(&start_paused).arg(&force)
    }

    pub fn pause(&self) -> Action<()> {
        self.action("pause")
    }

    pub fn unpause(&self) -> Action<()> {
        self.action("unpause")
    }

    /// Ask the guest to shut down cleanly.
    pub fn clean_shutdown(&self) -> Action<()> {
        self.action("clean_shutdown")
    }

    /// Power off immediately.
    pub fn hard_shutdown(&self) -> Action<()> {
        self.action("hard_shutdown")
    }

    pub fn clean_reboot(&self) -> Action<()> {
        self.action("clean_reboot")
    }

    pub fn hard_reboot(&self) -> Action<()> {
        self.action("hard_reboot")
    }

    pub fn suspend(&self) -> Action<()> {
        self.action("suspend")
    }

    pub fn resume(&self, start_paused: bool, force: bool) -> Action<()> {
        self.action("resume").arg(&start_paused).arg(&force)
    }

    /// Snapshot the VM; returns the new snapshot VM.
    pub fn snapshot(&self, new_name: &str) -> Action<Ref<Vm>> {
        self.action("snapshot").arg(new_name)
    }

    pub fn clone_vm(&self, new_name: &str) -> Action<Ref<Vm>> {
        self.action("clone").arg(new_name)
    }

    pub fn destroy(&self) -> Action<()> {
        self.action("destroy")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decode, FromWire};
    use crate::record::Record;
    use crate::wire::WireValue;

    #[test]
    fn test_sync_and_async_share_arguments() {
        let vm: Ref<Vm> = decode(&WireValue::from("OpaqueRef:vm1")).unwrap();
        let action = vm.start(false, true);

        assert_eq!(action.method(), "VM.start");
        assert_eq!(action.async_method(), "Async.VM.start");
        assert_eq!(
            action.args(),
            &[
                WireValue::from("OpaqueRef:vm1"),
                WireValue::Bool(false),
                WireValue::Bool(true)
            ]
        );
    }

    #[test]
    fn test_record_decode() {
        let wire = WireValue::structure([
            ("uuid", WireValue::from("0f9c")),
            ("name_label", WireValue::from("web-01")),
            ("power_state", WireValue::from("Running")),
            ("memory_static_max", WireValue::from("4294967296")),
            ("resident_on", WireValue::from("OpaqueRef:host1")),
            (
                "allowed_operations",
                WireValue::Array(vec!["clean_shutdown".into(), "teleport".into()]),
            ),
            (
                "blocked_operations",
                WireValue::structure([("destroy", WireValue::from("protected"))]),
            ),
        ]);
        let record = VmRecord::from_wire(&wire).unwrap();

        assert!(record.power_state.is(VmPowerState::Running));
        assert_eq!(record.memory_static_max, 4_294_967_296);
        assert_eq!(record.resident_on.as_wire_str(), "OpaqueRef:host1");
        assert!(record
            .allowed_operations
            .contains(&EnumValue::Known(VmOperation::CleanShutdown)));
        assert!(record
            .allowed_operations
            .contains(&EnumValue::Unrecognized("teleport".to_string())));
        assert_eq!(
            record.blocked_operations.get(&EnumValue::Known(VmOperation::Destroy)),
            Some(&"protected".to_string())
        );
        assert!(record.is_defaulted("affinity"));
        assert!(record.affinity.is_null());
    }
}
