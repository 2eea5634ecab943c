pub mod byte_size;
mod clock_offset;
mod description;
mod mac_address;
mod vm_id;
mod vm_name;
mod vnc_password;
mod vnc_port;

pub use clock_offset::ClockOffset;
pub use description::Description;
pub use mac_address::MacAddress;
pub use vm_id::VmId;
pub use vm_name::VmName;
pub use vnc_password::VncPassword;
pub use vnc_port::VncPort;

// Re-export for the lifecycle service
pub(crate) use description::validate_description;
