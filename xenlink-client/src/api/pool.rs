//! Resource pools.

use std::collections::{BTreeMap, BTreeSet};

use crate::api::host::Host;
use crate::api::{Sr, Vdi};
use crate::call::Call;
use crate::handle::Ref;

crate::api_class! {
    /// The pool a host belongs to. Every deployment has exactly one.
    Pool => "pool",
}

crate::api_record! {
    pub struct PoolRecord for Pool {
        uuid: String = "uuid",
        name_label: String = "name_label",
        name_description: String = "name_description",
        master: Ref<Host> = "master",
        default_sr: Ref<Sr> = "default_SR",
        suspend_image_sr: Ref<Sr> = "suspend_image_SR",
        crash_dump_sr: Ref<Sr> = "crash_dump_SR",
        other_config: BTreeMap<String, String> = "other_config",
        ha_enabled: bool = "ha_enabled",
        ha_configuration: BTreeMap<String, String> = "ha_configuration",
        ha_host_failures_to_tolerate: i64 = "ha_host_failures_to_tolerate",
        ha_allow_overcommit: bool = "ha_allow_overcommit",
        tags: BTreeSet<String> = "tags",
        gui_config: BTreeMap<String, String> = "gui_config",
        wlb_url: String = "wlb_url",
        wlb_enabled: bool = "wlb_enabled",
        redo_log_enabled: bool = "redo_log_enabled",
        redo_log_vdi: Ref<Vdi> = "redo_log_vdi",
        restrictions: BTreeMap<String, String> = "restrictions",
        cpu_info: BTreeMap<String, String> = "cpu_info",
        policy_no_vendor_device: bool = "policy_no_vendor_device",
        live_patching_disabled: bool = "live_patching_disabled",
        igmp_snooping_enabled: bool = "igmp_snooping_enabled",
    }
}

impl Ref<Pool> {
    /// The pool master, the only host that accepts API calls.
    pub fn get_master(&self) -> Call<Ref<Host>> {
        self.get_field("master")
    }

    pub fn get_restrictions(&self) -> Call<BTreeMap<String, String>> {
        self.get_field("restrictions")
    }
}
