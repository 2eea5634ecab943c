use crate::{
    ClockOffset, DomainState, ValidationError, VmmError, inspect_descriptor,
    tests::support::{FakeControlPlane, Harness, request},
};

fn offset_of(h: &Harness, name: &str) -> Option<String> {
    let descriptor = h.control_plane.descriptor_of(name).unwrap();
    inspect_descriptor(&descriptor).unwrap().clock_offset
}

#[tokio::test]
async fn test_clock_round_trip() {
    let h = Harness::new().await;
    let vm = h.orchestrator.create_vm(&request("web", 3, 5903)).await.unwrap();
    assert_eq!(offset_of(&h, "3").as_deref(), Some("utc"));

    h.orchestrator.modify_clock(3, "localtime").await.unwrap();
    assert_eq!(offset_of(&h, "3").as_deref(), Some("localtime"));
    assert_eq!(
        h.orchestrator.get_vm(vm.id).await.unwrap().time_offset,
        ClockOffset::Localtime
    );

    h.orchestrator.modify_clock(3, "utc").await.unwrap();
    assert_eq!(offset_of(&h, "3").as_deref(), Some("utc"));
    assert_eq!(
        h.orchestrator.get_vm(vm.id).await.unwrap().time_offset,
        ClockOffset::Utc
    );

    // the rest of the definition is carried over
    let descriptor = h.control_plane.descriptor_of("3").unwrap();
    assert!(descriptor.contains("bridge0"));
    assert!(descriptor.contains("3.img"));
}

#[tokio::test]
async fn test_running_domain_is_left_untouched() {
    let h = Harness::new().await;
    let vm = h.orchestrator.create_vm(&request("web", 3, 5903)).await.unwrap();
    h.control_plane.set_state("3", DomainState::Running);
    let before = h.control_plane.descriptor_of("3");
    let defines = h.control_plane.define_calls();

    let result = h.orchestrator.modify_clock(3, "localtime").await;
    assert!(matches!(
        result,
        Err(VmmError::State {
            vm_id: 3,
            expected: DomainState::Shutoff,
            actual: DomainState::Running,
        })
    ));

    assert_eq!(h.control_plane.descriptor_of("3"), before);
    assert_eq!(h.control_plane.define_calls(), defines);
    assert_eq!(h.control_plane.undefine_calls(), 0);
    assert_eq!(
        h.orchestrator.get_vm(vm.id).await.unwrap().time_offset,
        ClockOffset::Utc
    );
}

#[tokio::test]
async fn test_paused_domain_is_rejected() {
    let h = Harness::new().await;
    h.orchestrator.create_vm(&request("web", 3, 5903)).await.unwrap();
    h.control_plane.set_state("3", DomainState::Paused);

    assert!(matches!(
        h.orchestrator.modify_clock(3, "localtime").await,
        Err(VmmError::State {
            actual: DomainState::Paused,
            ..
        })
    ));
}

#[tokio::test]
async fn test_atomic_backend_is_never_undefined() {
    let h = Harness::with_control_plane(FakeControlPlane::atomic()).await;
    h.orchestrator.create_vm(&request("web", 3, 5903)).await.unwrap();

    h.orchestrator.modify_clock(3, "localtime").await.unwrap();
    assert_eq!(h.control_plane.undefine_calls(), 0);
    assert_eq!(offset_of(&h, "3").as_deref(), Some("localtime"));
}

#[tokio::test]
async fn test_unknown_offset_or_vm() {
    let h = Harness::new().await;
    assert!(matches!(
        h.orchestrator.modify_clock(3, "Europe/Berlin").await,
        Err(VmmError::Validation(ValidationError::InvalidClockOffset(_)))
    ));
    assert!(matches!(
        h.orchestrator.modify_clock(3, "utc").await,
        Err(VmmError::NotFound { kind: "vm", .. })
    ));
}
