pub mod clock_service;
pub mod lifecycle_service;
pub mod network_attachment_service;
pub mod provisioning_service;
pub mod teardown_service;
pub mod validation_service;
