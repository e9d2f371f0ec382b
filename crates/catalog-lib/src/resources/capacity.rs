//! Node capacity and reserved overhead for a shape

use super::tax::{self, CPU_BRACKETS, MEMORY_BRACKETS};
use crate::config::{NetworkMode, NodeConfig, ProviderOptions};
use crate::models::{Overhead, ResourceList, Shape, GIB, MIB};
use crate::shapes::GpuAllowList;

/// Hard eviction threshold on available memory
pub const EVICTION_MEMORY_AVAILABLE_MIB: u64 = 750;

/// Memory left for the node after the hypervisor's share
///
/// The overhead is rounded up to whole MiB and the result is kept exact.
pub fn memory_capacity(shape: &Shape, overhead_percent: f64) -> u64 {
    let bytes = shape.memory_mib() * MIB;
    let overhead_mib = (bytes as f64 * overhead_percent / MIB as f64).ceil() as u64;
    bytes.saturating_sub(overhead_mib * MIB)
}

/// Pod capacity: explicit override, else the network mode default,
/// capped by pods-per-core when set
pub fn max_pods(vcpus: u64, network_mode: NetworkMode, node: &NodeConfig) -> u64 {
    let pods = node
        .kubelet
        .max_pods
        .map(u64::from)
        .unwrap_or_else(|| network_mode.default_max_pods());

    match node.kubelet.pods_per_core {
        Some(per_core) if per_core > 0 => pods.min(u64::from(per_core) * vcpus),
        _ => pods,
    }
}

/// GPUs a node exposes; zero for shapes without driver support
pub fn gpu_capacity(shape: &Shape, allow_list: &GpuAllowList) -> u64 {
    if allow_list.contains(&shape.name) {
        shape.gpu_count()
    } else {
        0
    }
}

pub fn capacity(shape: &Shape, options: &ProviderOptions, node: &NodeConfig) -> ResourceList {
    let vcpus = shape.vcpus();
    ResourceList {
        cpu_millicores: vcpus * 1000,
        memory_bytes: memory_capacity(shape, options.vm_memory_overhead_percent),
        pods: max_pods(vcpus, options.network_mode, node),
        ephemeral_storage_bytes: node.os_disk_size_gb * GIB,
        gpus: gpu_capacity(shape, &options.gpu_allow_list),
    }
}

/// Reserved CPU in millicores for `vcpus` cores
pub fn kube_reserved_cpu(vcpus: u64) -> u64 {
    (1000.0 * tax::calculate(CPU_BRACKETS, vcpus as f64)).floor() as u64
}

/// Reserved memory in MiB for `memory_gib` GiB
pub fn kube_reserved_memory_mib(memory_gib: f64) -> u64 {
    (1024.0 * tax::calculate(MEMORY_BRACKETS, memory_gib)).floor() as u64
}

/// Reservations withheld from the node's capacity
///
/// System-level reservation is always zero; the whole reservation is
/// accounted as kube-reserved.
pub fn overhead(shape: &Shape) -> Overhead {
    Overhead {
        kube_reserved: ResourceList {
            cpu_millicores: kube_reserved_cpu(shape.vcpus()),
            memory_bytes: kube_reserved_memory_mib(shape.memory_gib()) * MIB,
            ..Default::default()
        },
        system_reserved: ResourceList::default(),
        eviction_threshold: ResourceList {
            memory_bytes: EVICTION_MEMORY_AVAILABLE_MIB * MIB,
            ..Default::default()
        },
    }
}
