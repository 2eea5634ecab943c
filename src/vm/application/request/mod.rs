pub mod create_vm_request;
pub mod remove_vm_request;
