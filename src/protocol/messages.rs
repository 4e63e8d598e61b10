//! Message schema shared by the coordinator and workers
//!
//! Field order in each `encode`/`decode` pair is the wire contract; the two
//! sides carry no message type tag because every protocol state expects
//! exactly one message type. The exchange per worker is:
//!
//! ```text
//! Worker                          Coordinator
//!   |------ HandshakeRequest -------->|
//!   |<----- HandshakeResponse --------|
//!   |<----- TaskBatch ----------------|
//!   |------ ResultBatch ------------->|
//!   |<----- Command(STOP_WORK) -------|
//!   |            (close)              |
//! ```

use std::fmt;

use super::wire::{
    read_bool, read_f64, read_string, read_u32, read_u64, read_u8, read_vec, write_bool,
    write_f64, write_string, write_u32, write_u64, write_u8, write_vec, ByteReader, Decode,
    Encode, WireError,
};
use crate::quadrature::{self, QuadratureError};

/// Operating system reported by a worker. Diagnostic only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsType {
    Windows,
    Linux,
    MacOs,
    Unknown,
}

impl OsType {
    fn tag(self) -> u8 {
        match self {
            OsType::Windows => 0,
            OsType::Linux => 1,
            OsType::MacOs => 2,
            OsType::Unknown => 3,
        }
    }

    fn from_tag(value: u8) -> Result<Self, WireError> {
        match value {
            0 => Ok(OsType::Windows),
            1 => Ok(OsType::Linux),
            2 => Ok(OsType::MacOs),
            3 => Ok(OsType::Unknown),
            value => Err(WireError::InvalidTag {
                field: "os_type",
                value,
            }),
        }
    }
}

impl fmt::Display for OsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OsType::Windows => "Windows",
            OsType::Linux => "Linux",
            OsType::MacOs => "MacOS",
            OsType::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

/// CPU architecture reported by a worker. Diagnostic only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Architecture {
    X86,
    X64,
    Arm,
    Arm64,
    Unknown,
}

impl Architecture {
    fn tag(self) -> u8 {
        match self {
            Architecture::X86 => 0,
            Architecture::X64 => 1,
            Architecture::Arm => 2,
            Architecture::Arm64 => 3,
            Architecture::Unknown => 4,
        }
    }

    fn from_tag(value: u8) -> Result<Self, WireError> {
        match value {
            0 => Ok(Architecture::X86),
            1 => Ok(Architecture::X64),
            2 => Ok(Architecture::Arm),
            3 => Ok(Architecture::Arm64),
            4 => Ok(Architecture::Unknown),
            value => Err(WireError::InvalidTag {
                field: "architecture",
                value,
            }),
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Architecture::X86 => "x86",
            Architecture::X64 => "x64",
            Architecture::Arm => "ARM",
            Architecture::Arm64 => "ARM64",
            Architecture::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

/// Hardware summary a worker reports during the handshake.
///
/// Only `cpu_cores` is protocol-significant: the coordinator weights the
/// work partition by it. The rest is logged for the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemInfo {
    pub os_type: OsType,
    pub architecture: Architecture,
    pub cpu_cores: u32,
    pub total_ram_mb: u64,
}

impl Encode for SystemInfo {
    fn encode(&self, out: &mut Vec<u8>) -> Result<(), WireError> {
        write_u8(out, self.os_type.tag());
        write_u8(out, self.architecture.tag());
        write_u32(out, self.cpu_cores);
        write_u64(out, self.total_ram_mb);
        Ok(())
    }
}

impl Decode for SystemInfo {
    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            os_type: OsType::from_tag(read_u8(reader, "os_type")?)?,
            architecture: Architecture::from_tag(read_u8(reader, "architecture")?)?,
            cpu_cores: read_u32(reader, "cpu_cores")?,
            total_ram_mb: read_u64(reader, "total_ram_mb")?,
        })
    }
}

impl fmt::Display for SystemInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} with {} cores, {} MB RAM",
            self.os_type, self.architecture, self.cpu_cores, self.total_ram_mb
        )
    }
}

/// First message on a fresh connection, worker to coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeRequest {
    pub client_version: String,
    pub system_info: SystemInfo,
}

impl Encode for HandshakeRequest {
    fn encode(&self, out: &mut Vec<u8>) -> Result<(), WireError> {
        write_string(out, &self.client_version, "client_version")?;
        self.system_info.encode(out)
    }
}

impl Decode for HandshakeRequest {
    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            client_version: read_string(reader, "client_version")?,
            system_info: SystemInfo::decode(reader)?,
        })
    }
}

/// Coordinator's reply to a handshake.
///
/// `assigned_client_id` is nonzero exactly when `accepted` is true; a
/// rejected worker must abort.
#[derive(Debug, Clone, PartialEq)]
pub struct HandshakeResponse {
    pub assigned_client_id: u64,
    pub server_version: String,
    pub accepted: bool,
    pub message: String,
}

impl Encode for HandshakeResponse {
    fn encode(&self, out: &mut Vec<u8>) -> Result<(), WireError> {
        write_u64(out, self.assigned_client_id);
        write_string(out, &self.server_version, "server_version")?;
        write_bool(out, self.accepted);
        write_string(out, &self.message, "message")
    }
}

impl Decode for HandshakeResponse {
    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            assigned_client_id: read_u64(reader, "assigned_client_id")?,
            server_version: read_string(reader, "server_version")?,
            accepted: read_bool(reader, "accepted")?,
            message: read_string(reader, "message")?,
        })
    }
}

/// One sub-interval of the integration range, executed by one worker thread.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Task {
    pub id: u64,
    pub begin: f64,
    pub end: f64,
    pub step: f64,
}

impl Task {
    /// Checks the task against the integration preconditions (positive
    /// bounds, sane step, no contact with the singularity at x = 1).
    pub fn validate(&self) -> Result<(), QuadratureError> {
        quadrature::validate_bounds(self.begin, self.end, self.step)
    }
}

impl Encode for Task {
    fn encode(&self, out: &mut Vec<u8>) -> Result<(), WireError> {
        write_u64(out, self.id);
        write_f64(out, self.begin);
        write_f64(out, self.end);
        write_f64(out, self.step);
        Ok(())
    }
}

impl Decode for Task {
    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            id: read_u64(reader, "task.id")?,
            begin: read_f64(reader, "task.begin")?,
            end: read_f64(reader, "task.end")?,
            step: read_f64(reader, "task.step")?,
        })
    }
}

/// Ordered list of tasks destined for one worker.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TaskBatch {
    pub tasks: Vec<Task>,
}

impl Encode for TaskBatch {
    fn encode(&self, out: &mut Vec<u8>) -> Result<(), WireError> {
        write_vec(out, &self.tasks, "tasks")
    }
}

impl Decode for TaskBatch {
    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            tasks: read_vec(reader, "tasks")?,
        })
    }
}

/// Outcome of one task. `value` is meaningful only when `success` is true.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskResult {
    pub task_id: u64,
    pub value: f64,
    pub success: bool,
    pub error_message: String,
}

impl TaskResult {
    pub fn success(task_id: u64, value: f64) -> Self {
        Self {
            task_id,
            value,
            success: true,
            error_message: String::new(),
        }
    }

    pub fn failure(task_id: u64, error_message: String) -> Self {
        Self {
            task_id,
            value: 0.0,
            success: false,
            error_message,
        }
    }
}

impl Encode for TaskResult {
    fn encode(&self, out: &mut Vec<u8>) -> Result<(), WireError> {
        write_u64(out, self.task_id);
        write_f64(out, self.value);
        write_bool(out, self.success);
        write_string(out, &self.error_message, "error_message")
    }
}

impl Decode for TaskResult {
    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            task_id: read_u64(reader, "result.task_id")?,
            value: read_f64(reader, "result.value")?,
            success: read_bool(reader, "result.success")?,
            error_message: read_string(reader, "result.error_message")?,
        })
    }
}

/// Everything a worker sends back after executing its batch.
///
/// Results pair with tasks by id; their order within the batch is not part
/// of the contract.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultBatch {
    pub client_id: u64,
    pub results: Vec<TaskResult>,
    pub total_time_seconds: f64,
}

impl Encode for ResultBatch {
    fn encode(&self, out: &mut Vec<u8>) -> Result<(), WireError> {
        write_u64(out, self.client_id);
        write_vec(out, &self.results, "results")?;
        write_f64(out, self.total_time_seconds);
        Ok(())
    }
}

impl Decode for ResultBatch {
    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            client_id: read_u64(reader, "client_id")?,
            results: read_vec(reader, "results")?,
            total_time_seconds: read_f64(reader, "total_time_seconds")?,
        })
    }
}

/// Control command tags. Only [`CommandType::StopWork`] is exchanged by the
/// core protocol; the other values are reserved on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandType {
    StartWork,
    StopWork,
    Ping,
    Ack,
}

impl CommandType {
    fn tag(self) -> u8 {
        match self {
            CommandType::StartWork => 1,
            CommandType::StopWork => 2,
            CommandType::Ping => 3,
            CommandType::Ack => 4,
        }
    }

    fn from_tag(value: u8) -> Result<Self, WireError> {
        match value {
            1 => Ok(CommandType::StartWork),
            2 => Ok(CommandType::StopWork),
            3 => Ok(CommandType::Ping),
            4 => Ok(CommandType::Ack),
            value => Err(WireError::InvalidTag {
                field: "command_type",
                value,
            }),
        }
    }
}

/// Control command with an optional textual payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub command_type: CommandType,
    pub message: String,
}

impl Command {
    pub fn stop_work(message: impl Into<String>) -> Self {
        Self {
            command_type: CommandType::StopWork,
            message: message.into(),
        }
    }
}

impl Encode for Command {
    fn encode(&self, out: &mut Vec<u8>) -> Result<(), WireError> {
        write_u8(out, self.command_type.tag());
        write_string(out, &self.message, "command.message")
    }
}

impl Decode for Command {
    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            command_type: CommandType::from_tag(read_u8(reader, "command_type")?)?,
            message: read_string(reader, "command.message")?,
        })
    }
}
