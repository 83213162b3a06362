//! Virtual GPUs.

use std::collections::BTreeMap;

use crate::api::pci::Pci;
use crate::api::vm::Vm;
use crate::api::{GpuGroup, Pgpu, VgpuType};
use crate::call::{Action, Call};
use crate::handle::Ref;
use crate::proxy::method_name;

crate::api_class! {
    /// A virtual GPU attached to a VM.
    Vgpu => "VGPU",
}

crate::api_record! {
    pub struct VgpuRecord for Vgpu {
        uuid: String = "uuid",
        vm: Ref<Vm> = "VM",
        gpu_group: Ref<GpuGroup> = "GPU_group",
        device: String = "device",
        currently_attached: bool = "currently_attached",
        other_config: BTreeMap<String, String> = "other_config",
        vgpu_type: Ref<VgpuType> = "type",
        resident_on: Ref<Pgpu> = "resident_on",
        scheduled_to_be_resident_on: Ref<Pgpu> = "scheduled_to_be_resident_on",
        compatibility_metadata: BTreeMap<String, String> = "compatibility_metadata",
        extra_args: String = "extra_args",
        pci: Ref<Pci> = "PCI",
    }
}

impl Vgpu {
    /// Create a vGPU of the group's default type.
    pub fn create(
        vm: &Ref<Vm>,
        gpu_group: &Ref<GpuGroup>,
        device: &str,
        other_config: &BTreeMap<String, String>,
    ) -> Action<Ref<Vgpu>> {
        Action::new(method_name::<Vgpu>("create"))
            .arg(vm)
            .arg(gpu_group)
            .arg(device)
            .arg(other_config)
    }

    /// Create a vGPU of an explicit type.
    pub fn create_with_type(
        vm: &Ref<Vm>,
        gpu_group: &Ref<GpuGroup>,
        device: &str,
        other_config: &BTreeMap<String, String>,
        vgpu_type: &Ref<VgpuType>,
    ) -> Action<Ref<Vgpu>> {
        Self::create(vm, gpu_group, device, other_config).arg(vgpu_type)
    }
}

impl Ref<Vgpu> {
    pub fn get_vm(&self) -> Call<Ref<Vm>> {
        self.get_field("VM")
    }

    pub fn get_currently_attached(&self) -> Call<bool> {
        self.get_field("currently_attached")
    }

    pub fn get_extra_args(&self) -> Call<String> {
        self.get_field("extra_args")
    }

    pub fn set_extra_args(&self, value: &str) -> Call<()> {
        self.set_field("extra_args", value)
    }

    pub fn destroy(&self) -> Action<()> {
        self.action("destroy")
    }
}
