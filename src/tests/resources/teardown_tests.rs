use crate::{
    RemoveVmOptions, VmmError,
    tests::support::{Harness, request},
};

fn raw_disks(delete_raw_disks: bool) -> RemoveVmOptions {
    RemoveVmOptions {
        delete_raw_disks,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_raw_image_kept_by_default() {
    let h = Harness::new().await;
    let vm = h.orchestrator.create_vm(&request("web", 9, 5909)).await.unwrap();

    h.orchestrator.remove_vm(vm.id, raw_disks(false)).await.unwrap();
    assert!(h.image_path(9).exists());
    assert_eq!(h.store.row_count("vms").await, 0);
}

#[tokio::test]
async fn test_raw_image_deleted_when_asked() {
    let h = Harness::new().await;
    let vm = h.orchestrator.create_vm(&request("web", 9, 5909)).await.unwrap();

    h.orchestrator.remove_vm(vm.id, raw_disks(true)).await.unwrap();
    assert!(!h.image_path(9).exists());
}

#[tokio::test]
async fn test_missing_raw_image_is_only_a_warning() {
    let h = Harness::new().await;
    let vm = h.orchestrator.create_vm(&request("web", 9, 5909)).await.unwrap();
    std::fs::remove_file(h.image_path(9)).unwrap();

    h.orchestrator.remove_vm(vm.id, raw_disks(true)).await.unwrap();
    assert_eq!(h.store.row_count("vms").await, 0);
    assert_eq!(h.store.row_count("storages").await, 0);
}

#[tokio::test]
async fn test_volume_destroyed_only_when_asked() {
    let h = Harness::new().await;
    let mut create = request("web", 9, 5909);
    create.storage_type = "zvol".to_string();
    create.storage_dataset = "vol-1".to_string();
    let vm = h.orchestrator.create_vm(&create).await.unwrap();

    let options = RemoveVmOptions {
        delete_volumes: true,
        ..Default::default()
    };
    h.orchestrator.remove_vm(vm.id, options).await.unwrap();
    assert_eq!(h.pool.destroyed(), vec!["vol-1".to_string()]);

    // a destroyed volume cannot back a new VM
    let mut again = request("db", 10, 5910);
    again.storage_type = "zvol".to_string();
    again.storage_dataset = "vol-1".to_string();
    assert!(matches!(
        h.orchestrator.create_vm(&again).await,
        Err(VmmError::Validation(_))
    ));
}

#[tokio::test]
async fn test_stats_and_identities_removed() {
    let h = Harness::new().await;
    let vm = h.orchestrator.create_vm(&request("web", 9, 5909)).await.unwrap();
    h.store.record_stats(vm.id, 1.0, 2.0, 3.0).await.unwrap();
    h.store.record_stats(vm.id, 4.0, 5.0, 6.0).await.unwrap();
    let mac_id = vm.networks[0].mac_id.unwrap();
    h.store.add_object_resolution(mac_id, "02:00:00:00:00:09").await.unwrap();

    let options = RemoveVmOptions {
        clean_up_macs: true,
        ..Default::default()
    };
    h.orchestrator.remove_vm(vm.id, options).await.unwrap();

    assert_eq!(h.store.row_count("vm_stats").await, 0);
    assert_eq!(h.store.row_count("network_objects").await, 0);
    assert_eq!(h.store.row_count("network_object_resolutions").await, 0);
}

#[tokio::test]
async fn test_undefined_domain_does_not_block_removal() {
    let h = Harness::new().await;
    let vm = h.orchestrator.create_vm(&request("web", 9, 5909)).await.unwrap();
    let handle = crate::DomainHandle {
        name: "9".to_string(),
        uuid: String::new(),
    };
    crate::ControlPlane::undefine(h.control_plane.as_ref(), &handle)
        .await
        .unwrap();

    h.orchestrator
        .remove_vm(vm.id, RemoveVmOptions::default())
        .await
        .unwrap();
    assert_eq!(h.store.row_count("vms").await, 0);
}

#[tokio::test]
async fn test_unknown_vm_is_not_found() {
    let h = Harness::new().await;
    assert!(matches!(
        h.orchestrator.remove_vm(404, RemoveVmOptions::default()).await,
        Err(VmmError::NotFound { kind: "vm", .. })
    ));
}
