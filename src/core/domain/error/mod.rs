use crate::core::domain::model::domain_state::DomainState;
use thiserror::Error;

/// The main error type for VM orchestration.
///
/// Every operation exposed by [`crate::VmOrchestrator`] returns this error.
/// Variants are grouped by how a caller is expected to react: validation and
/// conflict errors are corrected by changing the input, state errors by
/// changing the domain state first, and compensation or definition-loss
/// errors require operator attention.
#[derive(Error, Debug)]
pub enum VmmError {
    /// A proposed VM specification violated a validation rule.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A uniqueness rule was violated, either by the pre-check or by a
    /// storage-level constraint at write time.
    #[error("Conflict: {0}")]
    Conflict(#[from] ConflictError),

    /// The virtualization control plane rejected or failed an operation.
    #[error("Control plane error: {0}")]
    ControlPlane(#[from] ControlPlaneError),

    /// The domain is not in the state required for the requested mutation.
    ///
    /// # Fields
    /// * `vm_id` - The user-facing VM id of the domain
    /// * `expected` - The state the operation requires
    /// * `actual` - The state observed on the control plane
    #[error("Domain {vm_id} is {actual}, expected {expected}")]
    State {
        vm_id: u32,
        expected: DomainState,
        actual: DomainState,
    },

    /// Domain instantiation failed and every persisted row was rolled back.
    #[error("VM creation failed and was rolled back: {source}")]
    CreationRolledBack {
        #[source]
        source: Box<VmmError>,
    },

    /// A compensating step failed. The system needs operator attention.
    ///
    /// # Fields
    /// * `step` - The compensation step that failed
    /// * `source` - Why the step failed
    /// * `cause` - The original failure that triggered compensation
    #[error("Compensation step '{step}' failed: {source} (while rolling back: {cause})")]
    Compensation {
        step: &'static str,
        #[source]
        source: Box<VmmError>,
        cause: Box<VmmError>,
    },

    /// A domain descriptor could not be parsed, patched or built.
    #[error("Descriptor error: {0}")]
    Descriptor(#[from] DescriptorError),

    /// The domain definition was removed and neither the new nor the
    /// original definition could be registered again.
    #[error("Domain definition for VM {vm_id} was lost: {message}")]
    DefinitionLost { vm_id: u32, message: String },

    /// A referenced entity does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// The persistence engine failed.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// The storage-pool driver failed.
    #[error("Storage pool error: {0}")]
    StoragePool(String),

    /// A filesystem operation on a backing image failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The orchestrator was configured incorrectly.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl VmmError {
    pub(crate) fn not_found(kind: &'static str, id: impl ToString) -> Self {
        VmmError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Returns true if the error was caused by the caller's input and can be
    /// fixed by correcting it.
    pub fn is_user_error(&self) -> bool {
        matches!(self, VmmError::Validation(_) | VmmError::Conflict(_))
    }
}

/// Rule violations detected while validating a proposed VM.
///
/// Each variant names exactly one rule and carries the offending value so
/// the caller can render a precise message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid VM name: {0:?}")]
    InvalidName(String),

    #[error("VM id must be between 1 and 9999, got {0:?}")]
    InvalidVmId(Option<u32>),

    #[error("Description must be at most {max} characters, got {len}")]
    InvalidDescription { len: usize, max: usize },

    #[error("Invalid storage type: {0}")]
    InvalidStorageType(String),

    #[error("Disk size must be at least {min} bytes")]
    DiskTooSmall { min: u64 },

    #[error("No {noun} selected")]
    NoDatasetSelected { noun: &'static str },

    #[error("No storage emulation type selected")]
    NoEmulationType,

    #[error("Invalid storage emulation type: {0}")]
    InvalidEmulationType(String),

    #[error("Dataset not found: {0}")]
    DatasetNotFound(String),

    #[error("Dataset {guid} is not a {expected}")]
    InvalidDatasetType { guid: String, expected: &'static str },

    #[error("Dataset {0} backing raw storage must have a mountpoint")]
    DatasetMissingMountpoint(String),

    #[error("Raw storage image already exists: {0}")]
    RawImageExists(String),

    #[error("Dataset {0} does not report available space")]
    UnknownAvailableSpace(String),

    #[error("Not enough space in dataset {guid}: {available} bytes available, {requested} requested")]
    InsufficientSpace {
        guid: String,
        available: u64,
        requested: u64,
    },

    #[error("No switch emulation type selected")]
    NoSwitchEmulationType,

    #[error("MAC object not found: {0}")]
    MacObjectNotFound(i64),

    #[error("Network object {id} is of type {kind}, expected Mac")]
    InvalidMacObjectType { id: i64, kind: String },

    #[error("MAC object {0} has no entries")]
    MacObjectHasNoEntries(i64),

    #[error("Switch not found: {0}")]
    SwitchNotFound(String),

    #[error("CPU {axis} must be greater than 0")]
    InvalidCpuTopology { axis: &'static str },

    #[error("CPU topology exceeds {max} vCPUs")]
    TooManyVcpus { max: u32 },

    #[error("Memory must be at least {min} bytes, got {requested}")]
    MemoryTooSmall { min: u64, requested: u64 },

    #[error("VNC port must be between 1 and 65535, got {0}")]
    InvalidVncPort(u32),

    #[error("VNC password rejected: {0}")]
    WeakVncPassword(String),

    #[error("No VNC resolution selected")]
    NoVncResolution,

    #[error("Boot order must be greater than or equal to 0, got {0}")]
    InvalidBootOrder(i64),

    #[error("PCI device not found: {0}")]
    PciDeviceNotFound(u32),

    #[error("Duplicate {field} entry: {value}")]
    DuplicateEntry { field: &'static str, value: u32 },

    #[error("CPU pinning exceeds total vCPUs: {vcpus}")]
    PinningExceedsVcpus { vcpus: u32 },

    #[error("CPU pinning exceeds host logical cores: {cores}")]
    PinningExceedsLogicalCores { cores: usize },

    #[error("Pinned core {core} does not exist on a host with {cores} logical cores")]
    PinnedCoreOutOfRange { core: u32, cores: usize },

    #[error("ISO not found: {0}")]
    IsoNotFound(String),

    #[error("Invalid time offset: {0:?}, expected utc or localtime")]
    InvalidClockOffset(String),

    #[error("Invalid VM action: {0}")]
    InvalidAction(String),
}

/// Uniqueness violations across the persisted VM set.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConflictError {
    #[error("VM id {0} is already in use")]
    VmIdInUse(u32),

    #[error("VNC port {0} is already in use by another VM")]
    VncPortInUse(u16),

    #[error("VNC port {0} is already bound by another service")]
    VncPortBound(u16),

    #[error("PCI device {0} is already assigned to another VM")]
    PciDeviceInUse(u32),

    #[error("Core {0} is already pinned by another VM")]
    CpuAlreadyPinned(u32),

    #[error("Volume {0} is already used by another VM")]
    ZvolInUse(String),

    #[error("MAC object {0} is already attached to another VM")]
    MacObjectInUse(i64),

    #[error("Network object name {0} is already taken")]
    NetworkObjectNameTaken(String),

    /// A constraint the application layer does not name explicitly.
    #[error("Constraint violated: {0}")]
    Other(String),
}

/// A failure reported by the virtualization control plane.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{operation} failed: {message}")]
pub struct ControlPlaneError {
    pub operation: &'static str,
    pub message: String,
}

impl ControlPlaneError {
    pub fn new(operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            operation,
            message: message.into(),
        }
    }
}

/// Problems with a domain descriptor document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("malformed descriptor: {0}")]
    Malformed(String),

    #[error("descriptor has no root element")]
    MissingRoot,

    /// The patched document failed re-inspection.
    #[error("patched descriptor rejected: {0}")]
    Rejected(String),

    #[error("cannot write descriptor: {0}")]
    Write(String),

    #[error("vCPU count overflows: {sockets}x{cores}x{threads}")]
    VcpuOverflow { sockets: u32, cores: u32, threads: u32 },
}

/// A failure reported by the storage-pool driver.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct StoragePoolError(pub String);

impl From<StoragePoolError> for VmmError {
    fn from(error: StoragePoolError) -> Self {
        VmmError::StoragePool(error.0)
    }
}

/// Type alias for Results that may fail with a VmmError
pub type VmmResult<T> = Result<T, VmmError>;
