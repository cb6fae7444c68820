//! Error taxonomy for the transform engine.
//!
//! Every public engine operation returns [`EngineResult`]. Device failures
//! carry the name of the primitive that failed, the source location that
//! issued it, and (when the device can report it) a snapshot of device
//! memory at the time of failure.

use std::fmt;
use std::panic::Location;

/// Free and total device memory in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryInfo {
    pub free: usize,
    pub total: usize,
}

impl fmt::Display for MemoryInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "free {:.1} MiB of {:.1} MiB",
            self.free as f64 / MIB,
            self.total as f64 / MIB
        )
    }
}

const MIB: f64 = 1024.0 * 1024.0;

fn memory_suffix(memory: &Option<MemoryInfo>) -> String {
    match memory {
        Some(info) => format!(" (device memory: {info})"),
        None => String::new(),
    }
}

/// Coarse classification of an [`EngineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Allocation of device memory or another finite resource failed.
    ResourceExhaustion,
    /// The request cannot be expressed within the device's launch limits.
    ConfigurationViolation,
    /// A device primitive (copy, kernel, plan, BLAS call, sync) reported failure.
    PrimitiveFailure,
    /// Caller-supplied buffers, shapes or maps are inconsistent.
    InvalidArgument,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(
        "{what}: cannot allocate {requested} bytes (at {location}){}",
        memory_suffix(.memory)
    )]
    ResourceExhausted {
        what: &'static str,
        requested: usize,
        location: &'static Location<'static>,
        memory: Option<MemoryInfo>,
    },

    #[error(
        "launch geometry for {items} work items needs {groups_x} groups along x, device allows {max_groups}"
    )]
    LaunchGeometry {
        items: usize,
        groups_x: usize,
        max_groups: usize,
    },

    #[error("{op} failed: {detail} (at {location}){}", memory_suffix(.memory))]
    Primitive {
        op: &'static str,
        detail: String,
        location: &'static Location<'static>,
        memory: Option<MemoryInfo>,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    /// A device primitive failed; records the caller's location.
    #[track_caller]
    pub fn primitive(op: &'static str, detail: impl fmt::Display) -> Self {
        Self::Primitive {
            op,
            detail: detail.to_string(),
            location: Location::caller(),
            memory: None,
        }
    }

    /// An allocation of `requested` bytes failed; records the caller's location.
    #[track_caller]
    pub fn exhausted(what: &'static str, requested: usize) -> Self {
        Self::ResourceExhausted {
            what,
            requested,
            location: Location::caller(),
            memory: None,
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Attaches a device memory snapshot to variants that carry one.
    ///
    /// An existing snapshot is kept; it was taken closer to the failure.
    pub fn with_memory(mut self, info: Option<MemoryInfo>) -> Self {
        match &mut self {
            Self::ResourceExhausted { memory, .. } | Self::Primitive { memory, .. } => {
                if memory.is_none() {
                    *memory = info;
                }
            }
            Self::LaunchGeometry { .. } | Self::InvalidArgument(_) => {}
        }
        self
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ResourceExhausted { .. } => ErrorKind::ResourceExhaustion,
            Self::LaunchGeometry { .. } => ErrorKind::ConfigurationViolation,
            Self::Primitive { .. } => ErrorKind::PrimitiveFailure,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
        }
    }

    /// Source location that raised a device failure, if recorded.
    pub fn location(&self) -> Option<&'static Location<'static>> {
        match self {
            Self::ResourceExhausted { location, .. } | Self::Primitive { location, .. } => {
                Some(*location)
            }
            Self::LaunchGeometry { .. } | Self::InvalidArgument(_) => None,
        }
    }

    pub fn memory(&self) -> Option<MemoryInfo> {
        match self {
            Self::ResourceExhausted { memory, .. } | Self::Primitive { memory, .. } => *memory,
            Self::LaunchGeometry { .. } | Self::InvalidArgument(_) => None,
        }
    }
}
