use crate::{
    ConflictError, InventoryStore, RemoveVmOptions, ValidationError, VmmError,
    tests::support::{Harness, request},
};

#[tokio::test]
async fn test_identity_names_get_a_suffix_when_taken() {
    let h = Harness::new().await;

    let first = h.orchestrator.create_vm(&request("web", 1, 5901)).await.unwrap();
    h.orchestrator
        .remove_vm(first.id, RemoveVmOptions::default())
        .await
        .unwrap();

    let second = h.orchestrator.create_vm(&request("web", 2, 5902)).await.unwrap();
    let third = h.orchestrator.create_vm(&request("web", 3, 5903)).await.unwrap();

    let name_of = |id: Option<i64>| {
        let store = h.store.clone();
        async move {
            store
                .network_object(id.unwrap())
                .await
                .unwrap()
                .unwrap()
                .name
        }
    };
    assert_eq!(name_of(second.networks[0].mac_id).await, "web-lan-1");
    assert_eq!(name_of(third.networks[0].mac_id).await, "web-lan-2");
    assert_eq!(h.store.row_count("network_objects").await, 3);
}

#[tokio::test]
async fn test_supplied_identity_is_reused_once() {
    let h = Harness::new().await;
    let mac_id = h
        .store
        .add_network_object("kept", "Mac", &["02:aa:bb:cc:dd:ee"])
        .await
        .unwrap();

    let mut create = request("web", 1, 5901);
    create.mac_id = Some(mac_id);
    let vm = h.orchestrator.create_vm(&create).await.unwrap();
    assert_eq!(vm.networks[0].mac_id, Some(mac_id));
    assert!(
        h.control_plane
            .descriptor_of("1")
            .unwrap()
            .contains("02:aa:bb:cc:dd:ee")
    );

    let mut again = request("db", 2, 5902);
    again.mac_id = Some(mac_id);
    assert!(matches!(
        h.orchestrator.create_vm(&again).await,
        Err(VmmError::Conflict(ConflictError::MacObjectInUse(id))) if id == mac_id
    ));
    assert_eq!(h.store.row_count("vms").await, 1);
}

#[tokio::test]
async fn test_identity_must_be_a_mac_with_entries() {
    let h = Harness::new().await;
    let host = h
        .store
        .add_network_object("gateway", "Host", &["10.0.0.1"])
        .await
        .unwrap();
    let empty = h.store.add_network_object("empty", "Mac", &[]).await.unwrap();

    let mut create = request("web", 1, 5901);
    create.mac_id = Some(host);
    assert!(matches!(
        h.orchestrator.create_vm(&create).await,
        Err(VmmError::Validation(ValidationError::InvalidMacObjectType { .. }))
    ));

    create.mac_id = Some(empty);
    assert!(matches!(
        h.orchestrator.create_vm(&create).await,
        Err(VmmError::Validation(ValidationError::MacObjectHasNoEntries(_)))
    ));

    create.mac_id = Some(404);
    assert!(matches!(
        h.orchestrator.create_vm(&create).await,
        Err(VmmError::Validation(ValidationError::MacObjectNotFound(404)))
    ));
}

#[tokio::test]
async fn test_unknown_or_ambiguous_switch_creates_no_identity() {
    let h = Harness::new().await;

    let mut create = request("web", 1, 5901);
    create.switch_name = "dmz".to_string();
    assert!(matches!(
        h.orchestrator.create_vm(&create).await,
        Err(VmmError::Validation(ValidationError::SwitchNotFound(_)))
    ));

    h.store.add_manual_switch("lan", "bridge9").await.unwrap();
    assert!(matches!(
        h.orchestrator.create_vm(&request("web", 1, 5901)).await,
        Err(VmmError::Validation(ValidationError::SwitchNotFound(_)))
    ));
    assert_eq!(h.store.row_count("network_objects").await, 0);
}

#[tokio::test]
async fn test_manual_switch_attachment() {
    let h = Harness::new().await;
    h.store.add_manual_switch("uplink", "em0bridge").await.unwrap();

    let mut create = request("web", 1, 5901);
    create.switch_name = "uplink".to_string();
    let vm = h.orchestrator.create_vm(&create).await.unwrap();

    assert_eq!(vm.networks[0].switch_kind, crate::SwitchKind::Manual);
    assert!(
        h.control_plane
            .descriptor_of("1")
            .unwrap()
            .contains(r#"<source bridge="em0bridge"/>"#)
    );
}
