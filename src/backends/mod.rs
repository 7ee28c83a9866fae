mod compute;

pub use compute::{DeviceView, ResourceKind, WgpuComputeBackend};
