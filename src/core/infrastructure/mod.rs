pub mod config;
pub mod control_plane;
pub mod domain_xml;
pub mod host_probe;
pub mod schema;
pub mod sqlite_store;
pub mod storage_pool;
pub mod store;
