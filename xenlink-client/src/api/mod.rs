//! Entity declarations.
//!
//! Each module declares one API class: its marker type, its record schema,
//! its enumerations and the handful of typed operations on top of the
//! generic calls in [`crate::proxy`]. Adding a field or an operation is a
//! schema change here, nothing else moves.

pub mod host;
pub mod pci;
pub mod pool;
pub mod task;
pub mod vgpu;
pub mod vm;

crate::api_class! {
    /// Storage repository.
    Sr => "SR",
    /// Virtual disk image.
    Vdi => "VDI",
    /// Physical network interface.
    Pif => "PIF",
    /// Physical GPU.
    Pgpu => "PGPU",
    GpuGroup => "GPU_group",
    VgpuType => "VGPU_type",
    HostMetrics => "host_metrics",
    VmMetrics => "VM_metrics",
    VmGuestMetrics => "VM_guest_metrics",
    Console => "console",
    Vif => "VIF",
    Vbd => "VBD",
}
