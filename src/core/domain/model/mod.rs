pub mod domain_state;
pub mod network;
pub mod network_object;
pub mod pool_dataset;
pub mod storage;
pub mod vm;
