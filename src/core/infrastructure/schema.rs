pub const SCHEMA_VERSION: u32 = 1;

/// Unique constraints here are the authoritative conflict signal; the
/// validator's pre-checks only give earlier, friendlier errors.
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
INSERT INTO schema_meta (key, value) VALUES ('version', '1');

CREATE TABLE vms (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    vm_id INTEGER NOT NULL UNIQUE CHECK (vm_id BETWEEN 1 AND 9999),
    cpu_sockets INTEGER NOT NULL CHECK (cpu_sockets >= 1),
    cpu_cores INTEGER NOT NULL CHECK (cpu_cores >= 1),
    cpu_threads INTEGER NOT NULL CHECK (cpu_threads >= 1),
    ram INTEGER NOT NULL,
    vnc_port INTEGER NOT NULL UNIQUE CHECK (vnc_port BETWEEN 1 AND 65535),
    vnc_password TEXT NOT NULL DEFAULT '',
    vnc_resolution TEXT NOT NULL,
    vnc_wait INTEGER NOT NULL DEFAULT 1,
    start_at_boot INTEGER NOT NULL DEFAULT 1,
    start_order INTEGER NOT NULL DEFAULT 0 CHECK (start_order >= 0),
    wol INTEGER NOT NULL DEFAULT 0,
    tpm_emulation INTEGER NOT NULL DEFAULT 0,
    time_offset TEXT NOT NULL DEFAULT 'utc' CHECK (time_offset IN ('utc', 'localtime')),
    iso TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    started_at TEXT,
    stopped_at TEXT
);

CREATE TABLE vm_pci_devices (
    device_id INTEGER PRIMARY KEY,
    vm_ref INTEGER NOT NULL REFERENCES vms(id) ON DELETE CASCADE,
    position INTEGER NOT NULL
);
CREATE INDEX vm_pci_devices_vm ON vm_pci_devices(vm_ref);

CREATE TABLE vm_cpu_pins (
    core INTEGER PRIMARY KEY,
    vm_ref INTEGER NOT NULL REFERENCES vms(id) ON DELETE CASCADE,
    position INTEGER NOT NULL
);
CREATE INDEX vm_cpu_pins_vm ON vm_cpu_pins(vm_ref);

CREATE TABLE storages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    vm_ref INTEGER NOT NULL REFERENCES vms(id) ON DELETE CASCADE,
    name TEXT NOT NULL DEFAULT '',
    type TEXT NOT NULL CHECK (type IN ('raw', 'zvol', 'iso')),
    dataset TEXT NOT NULL,
    size INTEGER NOT NULL DEFAULT 0,
    emulation TEXT NOT NULL
);
CREATE INDEX storages_vm ON storages(vm_ref);
CREATE INDEX storages_dataset ON storages(dataset);
CREATE UNIQUE INDEX storages_zvol_exclusive ON storages(dataset) WHERE type = 'zvol';

CREATE TABLE standard_switches (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    bridge_name TEXT NOT NULL
);

CREATE TABLE manual_switches (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    bridge TEXT NOT NULL
);

CREATE TABLE network_objects (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    type TEXT NOT NULL
);

CREATE TABLE network_object_entries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    object_id INTEGER NOT NULL REFERENCES network_objects(id),
    value TEXT NOT NULL
);
CREATE INDEX network_object_entries_object ON network_object_entries(object_id);

CREATE TABLE network_object_resolutions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    object_id INTEGER NOT NULL REFERENCES network_objects(id),
    resolved_value TEXT NOT NULL
);
CREATE INDEX network_object_resolutions_object ON network_object_resolutions(object_id);

CREATE TABLE networks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    vm_ref INTEGER NOT NULL REFERENCES vms(id) ON DELETE CASCADE,
    mac_id INTEGER REFERENCES network_objects(id),
    switch_id INTEGER NOT NULL,
    switch_type TEXT NOT NULL DEFAULT 'standard' CHECK (switch_type IN ('standard', 'manual')),
    emulation TEXT NOT NULL
);
CREATE INDEX networks_vm ON networks(vm_ref);
CREATE UNIQUE INDEX networks_mac_exclusive ON networks(mac_id) WHERE mac_id IS NOT NULL;

CREATE TABLE vm_stats (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    vm_ref INTEGER NOT NULL REFERENCES vms(id) ON DELETE CASCADE,
    cpu_usage REAL NOT NULL,
    memory_usage REAL NOT NULL,
    memory_used REAL NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX vm_stats_vm ON vm_stats(vm_ref);

CREATE TABLE passthrough_devices (
    id INTEGER PRIMARY KEY,
    domain TEXT NOT NULL DEFAULT '',
    device TEXT NOT NULL DEFAULT ''
);

CREATE TABLE downloads (
    uuid TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    path TEXT NOT NULL
);
"#;
