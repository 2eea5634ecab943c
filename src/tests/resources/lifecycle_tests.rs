use crate::{
    DomainState, ValidationError, VmAction, VmState, VmmError,
    tests::support::{Harness, request},
};

#[tokio::test]
async fn test_power_actions_follow_domain_state() {
    let h = Harness::new().await;
    let vm = h.orchestrator.create_vm(&request("web", 4, 5904)).await.unwrap();

    assert!(matches!(
        h.orchestrator.perform_action(vm.id, VmAction::Shutdown).await,
        Err(VmmError::State {
            actual: DomainState::Shutoff,
            ..
        })
    ));

    h.orchestrator.perform_action(vm.id, VmAction::Start).await.unwrap();
    assert_eq!(h.control_plane.state_of("4"), Some(DomainState::Running));
    assert!(matches!(
        h.orchestrator.perform_action(vm.id, VmAction::Start).await,
        Err(VmmError::State {
            actual: DomainState::Running,
            ..
        })
    ));

    h.orchestrator.perform_action(vm.id, VmAction::Reboot).await.unwrap();
    h.orchestrator.perform_action(vm.id, VmAction::Stop).await.unwrap();
    assert_eq!(h.control_plane.state_of("4"), Some(DomainState::Shutoff));

    let stopped = h.orchestrator.get_vm(vm.id).await.unwrap();
    assert!(stopped.started_at.is_some());
    assert!(stopped.stopped_at.is_some());
    assert_eq!(stopped.state, VmState::Inactive);
}

#[tokio::test]
async fn test_state_is_unknown_when_control_plane_fails() {
    let h = Harness::new().await;
    h.orchestrator.create_vm(&request("web", 4, 5904)).await.unwrap();
    h.control_plane.fail_state_queries(true);

    let listed = h.orchestrator.list_vms().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].state, VmState::Unknown);
}

#[tokio::test]
async fn test_record_updates() {
    let h = Harness::new().await;
    let vm = h.orchestrator.create_vm(&request("web", 4, 5904)).await.unwrap();

    assert!(matches!(
        h.orchestrator
            .update_description(vm.id, &"d".repeat(1025))
            .await,
        Err(VmmError::Validation(ValidationError::InvalidDescription { .. }))
    ));
    h.orchestrator.update_description(vm.id, "").await.unwrap();

    assert!(matches!(
        h.orchestrator.modify_boot_order(4, true, -2).await,
        Err(VmmError::Validation(ValidationError::InvalidBootOrder(-2)))
    ));
    assert!(matches!(
        h.orchestrator.modify_wake_on_lan(77, true).await,
        Err(VmmError::NotFound { .. })
    ));
    assert!(matches!(
        h.orchestrator.update_description(404, "x").await,
        Err(VmmError::NotFound { .. })
    ));
}
