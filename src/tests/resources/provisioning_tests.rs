use crate::{
    ConflictError, ValidationError, VmmError,
    tests::support::{FakeControlPlane, GIB, Harness, request},
};

async fn assert_nothing_persisted(h: &Harness) {
    for table in [
        "vms",
        "storages",
        "networks",
        "vm_pci_devices",
        "vm_cpu_pins",
        "network_objects",
        "network_object_entries",
    ] {
        assert_eq!(h.store.row_count(table).await, 0, "{table} not empty");
    }
}

#[tokio::test]
async fn test_failed_define_rolls_back_everything() {
    let control_plane = FakeControlPlane::default();
    control_plane.fail_define(true);
    let h = Harness::with_control_plane(control_plane).await;

    let mut create = request("web", 101, 5901);
    create.iso = "iso-1".to_string();
    create.pci_devices = vec![1, 2];
    create.cpu_pinning = vec![3];

    let err = h.orchestrator.create_vm(&create).await.unwrap_err();
    match &err {
        VmmError::CreationRolledBack { source } => {
            assert!(matches!(**source, VmmError::ControlPlane(_)));
        }
        other => panic!("expected rollback, got {other:?}"),
    }
    assert!(!err.is_user_error());

    assert_nothing_persisted(&h).await;
    assert!(!h.image_path(101).exists());
    assert!(!h.control_plane.is_defined("101"));

    // a rolled back attempt leaves every resource free
    h.control_plane.fail_define(false);
    let vm = h.orchestrator.create_vm(&create).await.unwrap();
    assert_eq!(vm.pci_devices, vec![1, 2]);
    assert_eq!(vm.cpu_pinning, vec![3]);
}

#[tokio::test]
async fn test_duplicate_vm_id_persists_nothing() {
    let h = Harness::new().await;
    h.orchestrator
        .create_vm(&request("web", 101, 5901))
        .await
        .unwrap();
    let defines = h.control_plane.define_calls();

    let result = h.orchestrator.create_vm(&request("db", 101, 5902)).await;
    assert!(matches!(
        result,
        Err(VmmError::Conflict(ConflictError::VmIdInUse(101)))
    ));
    assert_eq!(h.store.row_count("vms").await, 1);
    assert_eq!(h.store.row_count("network_objects").await, 1);
    assert_eq!(h.control_plane.define_calls(), defines);
}

#[tokio::test]
async fn test_vnc_port_must_be_free() {
    let h = Harness::new().await;
    h.orchestrator
        .create_vm(&request("web", 1, 5901))
        .await
        .unwrap();

    assert!(matches!(
        h.orchestrator.create_vm(&request("db", 2, 5901)).await,
        Err(VmmError::Conflict(ConflictError::VncPortInUse(5901)))
    ));
    assert!(matches!(
        h.orchestrator.create_vm(&request("db", 2, 5999)).await,
        Err(VmmError::Conflict(ConflictError::VncPortBound(5999)))
    ));
    assert!(matches!(
        h.orchestrator.create_vm(&request("db", 2, 0)).await,
        Err(VmmError::Validation(ValidationError::InvalidVncPort(0)))
    ));
}

#[tokio::test]
async fn test_exclusive_devices_and_cores() {
    let h = Harness::new().await;
    let mut first = request("web", 1, 5901);
    first.pci_devices = vec![1];
    first.cpu_pinning = vec![0, 1];
    h.orchestrator.create_vm(&first).await.unwrap();

    let mut second = request("db", 2, 5902);
    second.pci_devices = vec![1];
    assert!(matches!(
        h.orchestrator.create_vm(&second).await,
        Err(VmmError::Conflict(ConflictError::PciDeviceInUse(1)))
    ));

    second.pci_devices = vec![9];
    assert!(matches!(
        h.orchestrator.create_vm(&second).await,
        Err(VmmError::Validation(ValidationError::PciDeviceNotFound(9)))
    ));

    second.pci_devices = vec![2];
    second.cpu_pinning = vec![1];
    assert!(matches!(
        h.orchestrator.create_vm(&second).await,
        Err(VmmError::Conflict(ConflictError::CpuAlreadyPinned(1)))
    ));

    second.cpu_pinning = vec![2, 3];
    h.orchestrator.create_vm(&second).await.unwrap();
}

#[tokio::test]
async fn test_more_pins_than_vcpus_is_rejected() {
    let h = Harness::new().await;
    let mut create = request("web", 1, 5901);
    create.cpu_pinning = vec![0, 1, 2, 3, 0];

    assert!(matches!(
        h.orchestrator.create_vm(&create).await,
        Err(VmmError::Validation(ValidationError::PinningExceedsVcpus { vcpus: 4 }))
    ));
    assert_nothing_persisted(&h).await;
}

#[tokio::test]
async fn test_zvol_is_exclusive() {
    let h = Harness::new().await;
    let zvol = |name: &str, vm_id: u32, port: u32| {
        let mut create = request(name, vm_id, port);
        create.storage_type = "zvol".to_string();
        create.storage_dataset = "vol-1".to_string();
        create.storage_size = None;
        create
    };

    let vm = h.orchestrator.create_vm(&zvol("web", 1, 5901)).await.unwrap();
    assert_eq!(vm.storages[0].size, 0);
    assert_eq!(vm.storages[0].name, "");
    let descriptor = h.control_plane.descriptor_of("1").unwrap();
    assert!(descriptor.contains("/dev/zvol/tank/vols/web"));

    assert!(matches!(
        h.orchestrator.create_vm(&zvol("db", 2, 5902)).await,
        Err(VmmError::Conflict(ConflictError::ZvolInUse(_)))
    ));
}

#[tokio::test]
async fn test_raw_disk_rules() {
    let h = Harness::new().await;

    let mut small = request("web", 1, 5901);
    small.storage_size = Some(1 << 20);
    assert!(matches!(
        h.orchestrator.create_vm(&small).await,
        Err(VmmError::Validation(ValidationError::DiskTooSmall { .. }))
    ));

    let mut huge = request("web", 1, 5901);
    huge.storage_size = Some(200 * GIB);
    assert!(matches!(
        h.orchestrator.create_vm(&huge).await,
        Err(VmmError::Validation(ValidationError::InsufficientSpace { .. }))
    ));

    std::fs::write(h.image_path(1), b"stale").unwrap();
    assert!(matches!(
        h.orchestrator.create_vm(&request("web", 1, 5901)).await,
        Err(VmmError::Validation(ValidationError::RawImageExists(_)))
    ));
}

#[tokio::test]
async fn test_vm_without_disk_or_network() {
    let h = Harness::new().await;
    let mut create = request("bare", 5, 5905);
    create.storage_type = "none".to_string();
    create.switch_name = String::new();
    create.tpm_emulation = Some(true);

    let vm = h.orchestrator.create_vm(&create).await.unwrap();
    assert!(vm.storages.is_empty());
    assert!(vm.networks.is_empty());
    assert!(vm.vnc_wait);
    assert!(vm.start_at_boot);
    assert!(vm.tpm_emulation);
    assert_eq!(h.store.row_count("network_objects").await, 0);
    assert!(h.control_plane.descriptor_of("5").unwrap().contains("tpm-crb"));
}

#[tokio::test]
async fn test_oversized_topology_is_rejected() {
    let h = Harness::new().await;

    let mut create = request("web", 1, 5901);
    create.cpu_sockets = 65536;
    create.cpu_cores = 65536;
    create.cpu_pinning = vec![0];
    assert!(matches!(
        h.orchestrator.create_vm(&create).await,
        Err(VmmError::Validation(ValidationError::TooManyVcpus { max: 256 }))
    ));

    create.cpu_pinning.clear();
    assert!(matches!(
        h.orchestrator.create_vm(&create).await,
        Err(VmmError::Validation(ValidationError::TooManyVcpus { .. }))
    ));
    assert_nothing_persisted(&h).await;
    assert_eq!(h.control_plane.define_calls(), 0);
}
