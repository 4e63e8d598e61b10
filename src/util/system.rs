//! Host system probing
//!
//! Collects the hardware summary a worker reports during its handshake.
//! Only the logical core count matters to the protocol (it weights the work
//! partition); OS, architecture and RAM are diagnostic.

use sysinfo::System;

use crate::protocol::{Architecture, OsType, SystemInfo};

/// Gathers the local machine's summary.
///
/// The core count falls back to 1 if the runtime cannot report parallelism,
/// keeping the reported capacity valid for partitioning.
pub fn collect_system_info() -> SystemInfo {
    let cpu_cores = std::thread::available_parallelism()
        .map(|n| n.get() as u32)
        .unwrap_or(1);

    let mut sys = System::new();
    sys.refresh_memory();
    let total_ram_mb = sys.total_memory() / (1024 * 1024);

    SystemInfo {
        os_type: detect_os(),
        architecture: detect_architecture(),
        cpu_cores,
        total_ram_mb,
    }
}

fn detect_os() -> OsType {
    match std::env::consts::OS {
        "windows" => OsType::Windows,
        "linux" => OsType::Linux,
        "macos" => OsType::MacOs,
        _ => OsType::Unknown,
    }
}

fn detect_architecture() -> Architecture {
    match std::env::consts::ARCH {
        "x86" => Architecture::X86,
        "x86_64" => Architecture::X64,
        "arm" => Architecture::Arm,
        "aarch64" => Architecture::Arm64,
        _ => Architecture::Unknown,
    }
}
