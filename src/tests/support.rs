//! Stateful stand-ins for the host collaborators, and a seeded harness.

use crate::{
    ControlPlane, ControlPlaneError, CreateVmRequest, DatasetKind, DomainHandle, DomainState,
    HostProbe, OrchestratorConfig, PoolDataset, SqliteStore, StoragePool, StoragePoolError,
    VmOrchestrator, inspect_descriptor,
};
use async_trait::async_trait;
use std::{
    collections::{HashMap, HashSet},
    path::PathBuf,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};
use tempfile::TempDir;

pub const GIB: u64 = 1 << 30;

#[derive(Debug, Clone)]
struct FakeDomain {
    uuid: String,
    state: DomainState,
    descriptor: String,
}

/// An in-memory control plane keyed by domain name.
#[derive(Default)]
pub struct FakeControlPlane {
    domains: Mutex<HashMap<String, FakeDomain>>,
    fail_define: AtomicBool,
    fail_state: AtomicBool,
    atomic_redefine: bool,
    defines: AtomicUsize,
    undefines: AtomicUsize,
}

impl FakeControlPlane {
    pub fn atomic() -> Self {
        Self {
            atomic_redefine: true,
            ..Default::default()
        }
    }

    pub fn fail_define(&self, fail: bool) {
        self.fail_define.store(fail, Ordering::SeqCst);
    }

    pub fn fail_state_queries(&self, fail: bool) {
        self.fail_state.store(fail, Ordering::SeqCst);
    }

    pub fn set_state(&self, name: &str, state: DomainState) {
        let mut domains = self.domains.lock().unwrap();
        domains.get_mut(name).expect("domain defined").state = state;
    }

    pub fn state_of(&self, name: &str) -> Option<DomainState> {
        self.domains.lock().unwrap().get(name).map(|d| d.state)
    }

    pub fn descriptor_of(&self, name: &str) -> Option<String> {
        self.domains
            .lock()
            .unwrap()
            .get(name)
            .map(|d| d.descriptor.clone())
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.domains.lock().unwrap().contains_key(name)
    }

    pub fn define_calls(&self) -> usize {
        self.defines.load(Ordering::SeqCst)
    }

    pub fn undefine_calls(&self) -> usize {
        self.undefines.load(Ordering::SeqCst)
    }

    fn handle(name: &str, domain: &FakeDomain) -> DomainHandle {
        DomainHandle {
            name: name.to_string(),
            uuid: domain.uuid.clone(),
        }
    }

    fn set(&self, domain: &DomainHandle, op: &'static str, state: DomainState) -> Result<(), ControlPlaneError> {
        let mut domains = self.domains.lock().unwrap();
        let entry = domains
            .get_mut(&domain.name)
            .ok_or_else(|| ControlPlaneError::new(op, "domain not found"))?;
        entry.state = state;
        Ok(())
    }
}

#[async_trait]
impl ControlPlane for FakeControlPlane {
    async fn lookup_domain(&self, name: &str) -> Result<Option<DomainHandle>, ControlPlaneError> {
        if self.fail_state.load(Ordering::SeqCst) {
            return Err(ControlPlaneError::new("lookup", "connection refused"));
        }
        Ok(self
            .domains
            .lock()
            .unwrap()
            .get(name)
            .map(|d| Self::handle(name, d)))
    }

    async fn domain_state(&self, domain: &DomainHandle) -> Result<DomainState, ControlPlaneError> {
        self.domains
            .lock()
            .unwrap()
            .get(&domain.name)
            .map(|d| d.state)
            .ok_or_else(|| ControlPlaneError::new("state", "domain not found"))
    }

    async fn descriptor(&self, domain: &DomainHandle) -> Result<String, ControlPlaneError> {
        self.descriptor_of(&domain.name)
            .ok_or_else(|| ControlPlaneError::new("descriptor", "domain not found"))
    }

    async fn define(&self, descriptor: &str) -> Result<DomainHandle, ControlPlaneError> {
        self.defines.fetch_add(1, Ordering::SeqCst);
        if self.fail_define.load(Ordering::SeqCst) {
            return Err(ControlPlaneError::new("define", "hypervisor refused definition"));
        }
        let summary = inspect_descriptor(descriptor)
            .map_err(|e| ControlPlaneError::new("define", e.to_string()))?;
        let name = summary
            .name
            .ok_or_else(|| ControlPlaneError::new("define", "descriptor has no name"))?;

        let mut domains = self.domains.lock().unwrap();
        let count = domains.len();
        let entry = domains.entry(name.clone()).or_insert_with(|| FakeDomain {
            uuid: format!("00000000-0000-0000-0000-{count:012}"),
            state: DomainState::Shutoff,
            descriptor: String::new(),
        });
        entry.descriptor = descriptor.to_string();
        Ok(Self::handle(&name, entry))
    }

    async fn undefine(&self, domain: &DomainHandle) -> Result<(), ControlPlaneError> {
        self.undefines.fetch_add(1, Ordering::SeqCst);
        self.domains
            .lock()
            .unwrap()
            .remove(&domain.name)
            .map(|_| ())
            .ok_or_else(|| ControlPlaneError::new("undefine", "domain not found"))
    }

    async fn start(&self, domain: &DomainHandle) -> Result<(), ControlPlaneError> {
        self.set(domain, "start", DomainState::Running)
    }

    async fn shutdown(&self, domain: &DomainHandle) -> Result<(), ControlPlaneError> {
        self.set(domain, "shutdown", DomainState::Shutoff)
    }

    async fn destroy(&self, domain: &DomainHandle) -> Result<(), ControlPlaneError> {
        self.set(domain, "destroy", DomainState::Shutoff)
    }

    async fn reboot(&self, domain: &DomainHandle) -> Result<(), ControlPlaneError> {
        self.set(domain, "reboot", DomainState::Running)
    }

    fn supports_atomic_redefine(&self) -> bool {
        self.atomic_redefine
    }
}

/// A storage pool holding a fixed list of datasets.
#[derive(Default)]
pub struct FakeStoragePool {
    datasets: Mutex<Vec<PoolDataset>>,
    destroyed: Mutex<Vec<String>>,
}

impl FakeStoragePool {
    pub fn add(&self, dataset: PoolDataset) {
        self.datasets.lock().unwrap().push(dataset);
    }

    pub fn destroyed(&self) -> Vec<String> {
        self.destroyed.lock().unwrap().clone()
    }

    fn of_kind(&self, kind: DatasetKind) -> Vec<PoolDataset> {
        self.datasets
            .lock()
            .unwrap()
            .iter()
            .filter(|d| d.kind == kind)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl StoragePool for FakeStoragePool {
    async fn list_filesystems(&self) -> Result<Vec<PoolDataset>, StoragePoolError> {
        Ok(self.of_kind(DatasetKind::Filesystem))
    }

    async fn list_volumes(&self) -> Result<Vec<PoolDataset>, StoragePoolError> {
        Ok(self.of_kind(DatasetKind::Volume))
    }

    async fn list_datasets(&self) -> Result<Vec<PoolDataset>, StoragePoolError> {
        Ok(self.datasets.lock().unwrap().clone())
    }

    async fn destroy(&self, guid: &str, _recursive: bool) -> Result<(), StoragePoolError> {
        let mut datasets = self.datasets.lock().unwrap();
        let before = datasets.len();
        datasets.retain(|d| d.guid != guid);
        if datasets.len() == before {
            return Err(StoragePoolError(format!("dataset {guid} does not exist")));
        }
        self.destroyed.lock().unwrap().push(guid.to_string());
        Ok(())
    }
}

/// A host with a fixed core count and a set of bound ports.
pub struct FakeHost {
    pub cores: usize,
    pub bound: HashSet<u16>,
}

#[async_trait]
impl HostProbe for FakeHost {
    fn logical_cores(&self) -> usize {
        self.cores
    }

    async fn port_in_use(&self, port: u16) -> std::io::Result<bool> {
        Ok(self.bound.contains(&port))
    }
}

/// A seeded store, fakes and an orchestrator wired to them.
///
/// Inventory: switch `lan` (bridge0), passthrough devices 1 and 2, ISO
/// `iso-1`, filesystem `fs-1` mounted in a temp directory and volume
/// `vol-1`. The host has 4 logical cores and port 5999 is bound.
pub struct Harness {
    pub dir: TempDir,
    pub store: Arc<SqliteStore>,
    pub control_plane: Arc<FakeControlPlane>,
    pub pool: Arc<FakeStoragePool>,
    pub orchestrator: VmOrchestrator,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_control_plane(FakeControlPlane::default()).await
    }

    pub async fn with_control_plane(control_plane: FakeControlPlane) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(
            SqliteStore::open_and_init(&dir.path().join("db/vmm.sqlite"))
                .await
                .unwrap(),
        );
        store.add_standard_switch("lan", "bridge0").await.unwrap();
        store.add_passthrough_device(1, "0000:03:00.0", "nic").await.unwrap();
        store.add_passthrough_device(2, "0000:04:00.0", "gpu").await.unwrap();
        let iso = dir.path().join("os.iso");
        std::fs::write(&iso, b"iso").unwrap();
        store.add_download("iso-1", "os.iso", &iso).await.unwrap();

        let mountpoint = dir.path().join("vms");
        std::fs::create_dir_all(&mountpoint).unwrap();
        let pool = Arc::new(FakeStoragePool::default());
        pool.add(dataset("fs-1", "tank/vms", DatasetKind::Filesystem, Some(mountpoint)));
        pool.add(dataset("vol-1", "tank/vols/web", DatasetKind::Volume, None));

        let control_plane = Arc::new(control_plane);
        let orchestrator = VmOrchestrator::builder()
            .store(store.clone())
            .control_plane(control_plane.clone())
            .storage_pool(pool.clone())
            .host(Arc::new(FakeHost {
                cores: 4,
                bound: HashSet::from([5999]),
            }))
            .config(OrchestratorConfig::default())
            .build()
            .unwrap();

        Self {
            dir,
            store,
            control_plane,
            pool,
            orchestrator,
        }
    }

    pub fn image_path(&self, vm_id: u32) -> PathBuf {
        self.dir.path().join("vms").join(format!("{vm_id}.img"))
    }
}

pub fn dataset(
    guid: &str,
    name: &str,
    kind: DatasetKind,
    mountpoint: Option<PathBuf>,
) -> PoolDataset {
    PoolDataset {
        guid: guid.to_string(),
        name: name.to_string(),
        kind,
        mountpoint,
        properties: HashMap::from([("available".to_string(), "100G".to_string())]),
    }
}

/// A valid request with a 1 GiB raw disk on `fs-1` attached to `lan`.
pub fn request(name: &str, vm_id: u32, vnc_port: u32) -> CreateVmRequest {
    CreateVmRequest {
        name: name.to_string(),
        vm_id: Some(vm_id),
        storage_type: "raw".to_string(),
        storage_dataset: "fs-1".to_string(),
        storage_size: Some(GIB),
        storage_emulation_type: "virtio-blk".to_string(),
        switch_name: "lan".to_string(),
        switch_emulation_type: "virtio".to_string(),
        cpu_sockets: 1,
        cpu_cores: 2,
        cpu_threads: 2,
        ram: GIB,
        vnc_port,
        vnc_resolution: "1280x720".to_string(),
        time_offset: "utc".to_string(),
        ..Default::default()
    }
}
