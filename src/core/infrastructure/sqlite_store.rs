//! SQLite-backed implementation of [`VmStore`] and [`InventoryStore`].

use super::{
    schema::{SCHEMA_SQL, SCHEMA_VERSION},
    store::{InventoryStore, StoreError, VmStore},
};
use crate::core::domain::{
    error::ConflictError,
    model::{
        network::{Network, SwitchKind, SwitchRef},
        network_object::NetworkObject,
        storage::{Storage, StorageEmulation, StorageType},
        vm::{NewVm, Vm, VmAction, VmState, VmStats},
    },
    value_object::ClockOffset,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, params, types::Type};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, warn};

const VM_COLUMNS: &str = "id, name, description, vm_id, cpu_sockets, cpu_cores, cpu_threads, \
    ram, vnc_port, vnc_password, vnc_resolution, vnc_wait, start_at_boot, start_order, wol, \
    tpm_emulation, time_offset, iso, created_at, updated_at, started_at, stopped_at";

impl From<rusqlite::Error> for StoreError {
    fn from(error: rusqlite::Error) -> Self {
        StoreError::Query(error.to_string())
    }
}

/// Returns the constraint message if the error is a constraint violation.
fn constraint_violation(error: &rusqlite::Error) -> Option<&str> {
    match error {
        rusqlite::Error::SqliteFailure(e, message) if e.code == ErrorCode::ConstraintViolation => {
            Some(message.as_deref().unwrap_or("constraint violation"))
        }
        _ => None,
    }
}

/// Maps a constraint violation with `on_conflict`, any other error to a query failure.
fn map_write_error(
    error: rusqlite::Error,
    on_conflict: impl FnOnce(&str) -> ConflictError,
) -> StoreError {
    match constraint_violation(&error) {
        Some(message) => StoreError::Conflict(on_conflict(message)),
        None => StoreError::from(error),
    }
}

fn conversion_error(index: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(index, Type::Text, message.into())
}

pub struct SqliteStore {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    /// Creates the parent directory if it doesn't exist.
    /// Does NOT initialize the schema, call `init()` after opening.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Init(format!("cannot create directory {}: {e}", parent.display()))
            })?;
        }

        let conn = Connection::open(path).map_err(|e| {
            StoreError::Init(format!("cannot open database {}: {e}", path.display()))
        })?;

        let mode: String = conn
            .pragma_update_and_check(None, "journal_mode", "wal", |row| row.get(0))
            .map_err(|e| StoreError::Init(format!("cannot set WAL mode: {e}")))?;
        if mode != "wal" {
            return Err(StoreError::Init(format!(
                "failed to enable WAL mode: journal_mode is '{mode}'"
            )));
        }

        Self::with_connection(conn, Some(path.to_path_buf()))
    }

    /// Open a private in-memory database. Mostly useful for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StoreError::Init(format!("cannot open in-memory database: {e}")))?;
        Self::with_connection(conn, None)
    }

    fn with_connection(conn: Connection, db_path: Option<PathBuf>) -> Result<Self, StoreError> {
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(|e| StoreError::Init(format!("cannot enable foreign keys: {e}")))?;

        Ok(SqliteStore {
            conn: Mutex::new(conn),
            db_path,
        })
    }

    /// Open the database and create the schema if it is missing.
    pub async fn open_and_init(path: &Path) -> Result<Self, StoreError> {
        let store = Self::open(path)?;
        store.init().await?;
        Ok(store)
    }

    /// Create the schema on a fresh database. Idempotent.
    pub async fn init(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;

        let has_meta: bool = conn
            .query_row(
                "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'schema_meta')",
                [],
                |row| row.get(0),
            )
            .map_err(|e| StoreError::Init(format!("cannot inspect database: {e}")))?;

        if has_meta {
            let version: String = conn
                .query_row(
                    "SELECT value FROM schema_meta WHERE key = 'version'",
                    [],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| StoreError::Init(format!("cannot read schema version: {e}")))?
                .ok_or_else(|| StoreError::Init("schema_meta has no version".to_string()))?;
            let found: u32 = version
                .parse()
                .map_err(|e| StoreError::Init(format!("unreadable schema version: {e}")))?;
            if found != SCHEMA_VERSION {
                return Err(StoreError::SchemaMismatch {
                    expected: SCHEMA_VERSION,
                    found,
                });
            }
            return Ok(());
        }

        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| StoreError::Init(format!("cannot create schema: {e}")))?;
        debug!(path = ?self.db_path, version = SCHEMA_VERSION, "created schema");
        Ok(())
    }

    /// Location of the database file, `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    pub async fn add_standard_switch(&self, name: &str, bridge: &str) -> Result<i64, StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO standard_switches (name, bridge_name) VALUES (?1, ?2)",
            params![name, bridge],
        )
        .map_err(|e| map_write_error(e, |m| ConflictError::Other(m.to_string())))?;
        Ok(conn.last_insert_rowid())
    }

    pub async fn add_manual_switch(&self, name: &str, bridge: &str) -> Result<i64, StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO manual_switches (name, bridge) VALUES (?1, ?2)",
            params![name, bridge],
        )
        .map_err(|e| map_write_error(e, |m| ConflictError::Other(m.to_string())))?;
        Ok(conn.last_insert_rowid())
    }

    /// Registers a device as available for passthrough.
    pub async fn add_passthrough_device(
        &self,
        id: u32,
        domain: &str,
        device: &str,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO passthrough_devices (id, domain, device) VALUES (?1, ?2, ?3)",
            params![id, domain, device],
        )?;
        Ok(())
    }

    pub async fn add_download(&self, uuid: &str, name: &str, path: &Path) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO downloads (uuid, name, path) VALUES (?1, ?2, ?3)",
            params![uuid, name, path.to_string_lossy()],
        )?;
        Ok(())
    }

    /// Inserts a network object of any kind with the given entries.
    pub async fn add_network_object(
        &self,
        name: &str,
        kind: &str,
        entries: &[&str],
    ) -> Result<i64, StoreError> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO network_objects (name, type) VALUES (?1, ?2)",
            params![name, kind],
        )
        .map_err(|e| map_write_error(e, |_| ConflictError::NetworkObjectNameTaken(name.into())))?;
        let id = tx.last_insert_rowid();
        for entry in entries {
            tx.execute(
                "INSERT INTO network_object_entries (object_id, value) VALUES (?1, ?2)",
                params![id, entry],
            )?;
        }
        tx.commit()?;
        Ok(id)
    }

    /// Caches a resolved value for a network object.
    pub async fn add_object_resolution(&self, object_id: i64, value: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO network_object_resolutions (object_id, resolved_value) VALUES (?1, ?2)",
            params![object_id, value],
        )?;
        Ok(())
    }

    /// Appends a historical usage sample to a VM.
    pub async fn record_stats(
        &self,
        vm_ref: i64,
        cpu_usage: f64,
        memory_usage: f64,
        memory_used: f64,
    ) -> Result<i64, StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO vm_stats (vm_ref, cpu_usage, memory_usage, memory_used, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![vm_ref, cpu_usage, memory_usage, memory_used, Utc::now()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    #[cfg(test)]
    pub(crate) async fn row_count(&self, table: &str) -> i64 {
        let conn = self.conn.lock().await;
        conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
            row.get(0)
        })
        .unwrap()
    }
}

fn read_vm_row(row: &Row<'_>) -> rusqlite::Result<Vm> {
    let time_offset: String = row.get(16)?;
    let time_offset = time_offset
        .parse::<ClockOffset>()
        .map_err(|e| conversion_error(16, e.to_string()))?;
    let ram: i64 = row.get(7)?;

    Ok(Vm {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        vm_id: row.get(3)?,
        cpu_sockets: row.get(4)?,
        cpu_cores: row.get(5)?,
        cpu_threads: row.get(6)?,
        ram: ram as u64,
        vnc_port: row.get(8)?,
        vnc_password: row.get(9)?,
        vnc_resolution: row.get(10)?,
        vnc_wait: row.get(11)?,
        start_at_boot: row.get(12)?,
        start_order: row.get(13)?,
        wol: row.get(14)?,
        tpm_emulation: row.get(15)?,
        time_offset,
        iso: row.get(17)?,
        storages: Vec::new(),
        networks: Vec::new(),
        pci_devices: Vec::new(),
        cpu_pinning: Vec::new(),
        stats: Vec::new(),
        state: VmState::Unknown,
        created_at: row.get(18)?,
        updated_at: row.get(19)?,
        started_at: row.get(20)?,
        stopped_at: row.get(21)?,
    })
}

fn read_storage_row(row: &Row<'_>) -> rusqlite::Result<Storage> {
    let kind: String = row.get(3)?;
    let kind = kind
        .parse::<StorageType>()
        .map_err(|e| conversion_error(3, e.to_string()))?;
    let emulation: String = row.get(6)?;
    let emulation = StorageEmulation::from_stored(&emulation)
        .ok_or_else(|| conversion_error(6, format!("unknown emulation {emulation}")))?;
    let size: i64 = row.get(5)?;

    Ok(Storage {
        id: row.get(0)?,
        vm_ref: row.get(1)?,
        name: row.get(2)?,
        kind,
        dataset: row.get(4)?,
        size: size as u64,
        emulation,
    })
}

fn read_network_row(row: &Row<'_>) -> rusqlite::Result<Network> {
    let switch_kind: String = row.get(4)?;
    let switch_kind = SwitchKind::from_stored(&switch_kind)
        .ok_or_else(|| conversion_error(4, format!("unknown switch type {switch_kind}")))?;

    Ok(Network {
        id: row.get(0)?,
        vm_ref: row.get(1)?,
        mac_id: row.get(2)?,
        switch_id: row.get(3)?,
        switch_kind,
        emulation: row.get(5)?,
    })
}

fn load_children(conn: &Connection, vm: &mut Vm) -> rusqlite::Result<()> {
    vm.storages = conn
        .prepare(
            "SELECT id, vm_ref, name, type, dataset, size, emulation \
             FROM storages WHERE vm_ref = ?1 ORDER BY id",
        )?
        .query_map([vm.id], read_storage_row)?
        .collect::<Result<_, _>>()?;

    vm.networks = conn
        .prepare(
            "SELECT id, vm_ref, mac_id, switch_id, switch_type, emulation \
             FROM networks WHERE vm_ref = ?1 ORDER BY id",
        )?
        .query_map([vm.id], read_network_row)?
        .collect::<Result<_, _>>()?;

    vm.pci_devices = conn
        .prepare("SELECT device_id FROM vm_pci_devices WHERE vm_ref = ?1 ORDER BY position")?
        .query_map([vm.id], |row| row.get(0))?
        .collect::<Result<_, _>>()?;

    vm.cpu_pinning = conn
        .prepare("SELECT core FROM vm_cpu_pins WHERE vm_ref = ?1 ORDER BY position")?
        .query_map([vm.id], |row| row.get(0))?
        .collect::<Result<_, _>>()?;

    vm.stats = conn
        .prepare(
            "SELECT id, vm_ref, cpu_usage, memory_usage, memory_used, created_at \
             FROM vm_stats WHERE vm_ref = ?1 ORDER BY id",
        )?
        .query_map([vm.id], |row| {
            Ok(VmStats {
                id: row.get(0)?,
                vm_ref: row.get(1)?,
                cpu_usage: row.get(2)?,
                memory_usage: row.get(3)?,
                memory_used: row.get(4)?,
                created_at: row.get(5)?,
            })
        })?
        .collect::<Result<_, _>>()?;

    Ok(())
}

fn load_vm_where(
    conn: &Connection,
    filter: &str,
    value: i64,
) -> Result<Option<Vm>, StoreError> {
    let sql = format!("SELECT {VM_COLUMNS} FROM vms WHERE {filter} = ?1");
    let vm = conn.query_row(&sql, [value], read_vm_row).optional()?;
    match vm {
        Some(mut vm) => {
            load_children(conn, &mut vm)?;
            Ok(Some(vm))
        }
        None => Ok(None),
    }
}

fn exists(conn: &Connection, sql: &str, value: impl rusqlite::ToSql) -> Result<bool, StoreError> {
    let found = conn.query_row(sql, [value], |_| Ok(())).optional()?;
    Ok(found.is_some())
}

fn expect_updated(changed: usize, vm_id: impl ToString) -> Result<(), StoreError> {
    if changed == 0 {
        return Err(StoreError::NotFound {
            kind: "vm",
            id: vm_id.to_string(),
        });
    }
    Ok(())
}

#[async_trait]
impl VmStore for SqliteStore {
    async fn vm_id_in_use(&self, vm_id: u32) -> Result<bool, StoreError> {
        let conn = self.conn.lock().await;
        exists(&conn, "SELECT 1 FROM vms WHERE vm_id = ?1", vm_id)
    }

    async fn vnc_port_in_use(&self, port: u16) -> Result<bool, StoreError> {
        let conn = self.conn.lock().await;
        exists(&conn, "SELECT 1 FROM vms WHERE vnc_port = ?1", port)
    }

    async fn dataset_in_use(&self, dataset: &str) -> Result<bool, StoreError> {
        let conn = self.conn.lock().await;
        exists(&conn, "SELECT 1 FROM storages WHERE dataset = ?1 LIMIT 1", dataset)
    }

    async fn pci_device_owner(&self, device_id: u32) -> Result<Option<u32>, StoreError> {
        let conn = self.conn.lock().await;
        let owner = conn
            .query_row(
                "SELECT vms.vm_id FROM vm_pci_devices \
                 JOIN vms ON vms.id = vm_pci_devices.vm_ref WHERE device_id = ?1",
                [device_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(owner)
    }

    async fn pinned_core_owner(&self, core: u32) -> Result<Option<u32>, StoreError> {
        let conn = self.conn.lock().await;
        let owner = conn
            .query_row(
                "SELECT vms.vm_id FROM vm_cpu_pins \
                 JOIN vms ON vms.id = vm_cpu_pins.vm_ref WHERE core = ?1",
                [core],
                |row| row.get(0),
            )
            .optional()?;
        Ok(owner)
    }

    async fn mac_object_attached(&self, mac_id: i64) -> Result<bool, StoreError> {
        let conn = self.conn.lock().await;
        exists(&conn, "SELECT 1 FROM networks WHERE mac_id = ?1", mac_id)
    }

    async fn insert_vm(&self, vm: &NewVm) -> Result<Vm, StoreError> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        let now = Utc::now();

        tx.execute(
            "INSERT INTO vms (name, description, vm_id, cpu_sockets, cpu_cores, cpu_threads, \
             ram, vnc_port, vnc_password, vnc_resolution, vnc_wait, start_at_boot, start_order, \
             wol, tpm_emulation, time_offset, iso, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?18)",
            params![
                vm.name,
                vm.description,
                vm.vm_id,
                vm.cpu_sockets,
                vm.cpu_cores,
                vm.cpu_threads,
                vm.ram as i64,
                vm.vnc_port,
                vm.vnc_password,
                vm.vnc_resolution,
                vm.vnc_wait,
                vm.start_at_boot,
                vm.start_order,
                vm.wol,
                vm.tpm_emulation,
                vm.time_offset.as_str(),
                vm.iso,
                now,
            ],
        )
        .map_err(|e| {
            map_write_error(e, |message| {
                if message.contains("vms.vm_id") {
                    ConflictError::VmIdInUse(vm.vm_id)
                } else if message.contains("vms.vnc_port") {
                    ConflictError::VncPortInUse(vm.vnc_port)
                } else {
                    ConflictError::Other(message.to_string())
                }
            })
        })?;
        let id = tx.last_insert_rowid();

        for (position, device_id) in vm.pci_devices.iter().enumerate() {
            tx.execute(
                "INSERT INTO vm_pci_devices (device_id, vm_ref, position) VALUES (?1, ?2, ?3)",
                params![device_id, id, position as i64],
            )
            .map_err(|e| map_write_error(e, |_| ConflictError::PciDeviceInUse(*device_id)))?;
        }

        for (position, core) in vm.cpu_pinning.iter().enumerate() {
            tx.execute(
                "INSERT INTO vm_cpu_pins (core, vm_ref, position) VALUES (?1, ?2, ?3)",
                params![core, id, position as i64],
            )
            .map_err(|e| map_write_error(e, |_| ConflictError::CpuAlreadyPinned(*core)))?;
        }

        for storage in &vm.storages {
            tx.execute(
                "INSERT INTO storages (vm_ref, name, type, dataset, size, emulation) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    id,
                    storage.name,
                    storage.kind.as_str(),
                    storage.dataset,
                    storage.size as i64,
                    storage.emulation.as_str(),
                ],
            )
            .map_err(|e| {
                map_write_error(e, |message| match storage.kind {
                    StorageType::Zvol => ConflictError::ZvolInUse(storage.dataset.clone()),
                    _ => ConflictError::Other(message.to_string()),
                })
            })?;
        }

        for network in &vm.networks {
            tx.execute(
                "INSERT INTO networks (vm_ref, mac_id, switch_id, switch_type, emulation) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    id,
                    network.mac_id,
                    network.switch_id,
                    network.switch_kind.as_str(),
                    network.emulation,
                ],
            )
            .map_err(|e| {
                map_write_error(e, |message| match network.mac_id {
                    Some(mac_id) if message.contains("networks.mac_id") => {
                        ConflictError::MacObjectInUse(mac_id)
                    }
                    _ => ConflictError::Other(message.to_string()),
                })
            })?;
        }

        let created = load_vm_where(&tx, "id", id)?;
        tx.commit()?;

        created.ok_or_else(|| StoreError::Query(format!("VM row {id} vanished after insert")))
    }

    async fn get_vm(&self, id: i64) -> Result<Option<Vm>, StoreError> {
        let conn = self.conn.lock().await;
        load_vm_where(&conn, "id", id)
    }

    async fn find_vm_by_vm_id(&self, vm_id: u32) -> Result<Option<Vm>, StoreError> {
        let conn = self.conn.lock().await;
        load_vm_where(&conn, "vm_id", i64::from(vm_id))
    }

    async fn list_vms(&self) -> Result<Vec<Vm>, StoreError> {
        let conn = self.conn.lock().await;
        let mut vms: Vec<Vm> = conn
            .prepare(&format!("SELECT {VM_COLUMNS} FROM vms ORDER BY vm_id"))?
            .query_map([], read_vm_row)?
            .collect::<Result<_, _>>()?;
        for vm in &mut vms {
            load_children(&conn, vm)?;
        }
        Ok(vms)
    }

    async fn delete_vm_row(&self, id: i64) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        let deleted = conn.execute("DELETE FROM vms WHERE id = ?1", [id])?;
        if deleted == 0 {
            warn!(record_id = id, "VM row already absent");
        }
        Ok(())
    }

    async fn delete_storage_row(&self, id: i64) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute("DELETE FROM storages WHERE id = ?1", [id])?;
        Ok(())
    }

    async fn delete_network_row(&self, id: i64) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute("DELETE FROM networks WHERE id = ?1", [id])?;
        Ok(())
    }

    async fn delete_stat_row(&self, id: i64) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute("DELETE FROM vm_stats WHERE id = ?1", [id])?;
        Ok(())
    }

    async fn update_clock_offset(
        &self,
        vm_id: u32,
        offset: ClockOffset,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "UPDATE vms SET time_offset = ?1, updated_at = ?2 WHERE vm_id = ?3",
            params![offset.as_str(), Utc::now(), vm_id],
        )?;
        expect_updated(changed, vm_id)
    }

    async fn update_description(&self, id: i64, description: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "UPDATE vms SET description = ?1, updated_at = ?2 WHERE id = ?3",
            params![description, Utc::now(), id],
        )?;
        expect_updated(changed, id)
    }

    async fn update_wake_on_lan(&self, vm_id: u32, enabled: bool) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "UPDATE vms SET wol = ?1, updated_at = ?2 WHERE vm_id = ?3",
            params![enabled, Utc::now(), vm_id],
        )?;
        expect_updated(changed, vm_id)
    }

    async fn update_boot_order(
        &self,
        vm_id: u32,
        start_at_boot: bool,
        start_order: u32,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "UPDATE vms SET start_at_boot = ?1, start_order = ?2, updated_at = ?3 WHERE vm_id = ?4",
            params![start_at_boot, start_order, Utc::now(), vm_id],
        )?;
        expect_updated(changed, vm_id)
    }

    async fn record_power_event(
        &self,
        id: i64,
        action: VmAction,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let sql = match action {
            VmAction::Start => "UPDATE vms SET started_at = ?1, updated_at = ?1 WHERE id = ?2",
            VmAction::Stop | VmAction::Shutdown => {
                "UPDATE vms SET stopped_at = ?1, updated_at = ?1 WHERE id = ?2"
            }
            VmAction::Reboot => "UPDATE vms SET updated_at = ?1 WHERE id = ?2",
        };
        let conn = self.conn.lock().await;
        let changed = conn.execute(sql, params![at, id])?;
        expect_updated(changed, id)
    }
}

#[async_trait]
impl InventoryStore for SqliteStore {
    async fn find_switches(&self, name: &str) -> Result<Vec<SwitchRef>, StoreError> {
        let conn = self.conn.lock().await;
        let mut switches = Vec::new();

        let standard = conn
            .query_row(
                "SELECT id, name, bridge_name FROM standard_switches WHERE name = ?1",
                [name],
                |row| {
                    Ok(SwitchRef {
                        kind: SwitchKind::Standard,
                        id: row.get(0)?,
                        name: row.get(1)?,
                        bridge: row.get(2)?,
                    })
                },
            )
            .optional()?;
        switches.extend(standard);

        let manual = conn
            .query_row(
                "SELECT id, name, bridge FROM manual_switches WHERE name = ?1",
                [name],
                |row| {
                    Ok(SwitchRef {
                        kind: SwitchKind::Manual,
                        id: row.get(0)?,
                        name: row.get(1)?,
                        bridge: row.get(2)?,
                    })
                },
            )
            .optional()?;
        switches.extend(manual);

        Ok(switches)
    }

    async fn network_object(&self, id: i64) -> Result<Option<NetworkObject>, StoreError> {
        let conn = self.conn.lock().await;
        let object = conn
            .query_row(
                "SELECT id, name, type FROM network_objects WHERE id = ?1",
                [id],
                |row| {
                    Ok(NetworkObject {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        kind: row.get(2)?,
                        entries: Vec::new(),
                    })
                },
            )
            .optional()?;

        let Some(mut object) = object else {
            return Ok(None);
        };
        object.entries = conn
            .prepare("SELECT value FROM network_object_entries WHERE object_id = ?1 ORDER BY id")?
            .query_map([id], |row| row.get(0))?
            .collect::<Result<_, _>>()?;
        Ok(Some(object))
    }

    async fn network_object_name_exists(&self, name: &str) -> Result<bool, StoreError> {
        let conn = self.conn.lock().await;
        exists(&conn, "SELECT 1 FROM network_objects WHERE name = ?1", name)
    }

    async fn create_mac_object(
        &self,
        name: &str,
        mac: &str,
    ) -> Result<NetworkObject, StoreError> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO network_objects (name, type) VALUES (?1, ?2)",
            params![name, NetworkObject::MAC_KIND],
        )
        .map_err(|e| map_write_error(e, |_| ConflictError::NetworkObjectNameTaken(name.into())))?;
        let id = tx.last_insert_rowid();
        tx.execute(
            "INSERT INTO network_object_entries (object_id, value) VALUES (?1, ?2)",
            params![id, mac],
        )?;
        tx.commit()?;

        Ok(NetworkObject {
            id,
            name: name.to_string(),
            kind: NetworkObject::MAC_KIND.to_string(),
            entries: vec![mac.to_string()],
        })
    }

    async fn delete_network_objects(&self, ids: &[i64]) -> Result<(), StoreError> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        for id in ids {
            tx.execute("DELETE FROM network_object_entries WHERE object_id = ?1", [id])?;
        }
        for id in ids {
            tx.execute("DELETE FROM network_object_resolutions WHERE object_id = ?1", [id])?;
        }
        for id in ids {
            tx.execute("DELETE FROM network_objects WHERE id = ?1", [id])?;
        }
        tx.commit()?;
        Ok(())
    }

    async fn passthrough_device_exists(&self, id: u32) -> Result<bool, StoreError> {
        let conn = self.conn.lock().await;
        exists(&conn, "SELECT 1 FROM passthrough_devices WHERE id = ?1", id)
    }

    async fn iso_path(&self, uuid: &str) -> Result<Option<PathBuf>, StoreError> {
        let conn = self.conn.lock().await;
        let path: Option<String> = conn
            .query_row("SELECT path FROM downloads WHERE uuid = ?1", [uuid], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(path.map(PathBuf::from))
    }
}
