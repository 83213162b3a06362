//! End-to-end call tests against the in-memory server.

use std::sync::Arc;

use xenlink_client::api::host::Host;
use xenlink_client::api::task::TaskStatus;
use xenlink_client::api::vm::{OnCrashBehaviour, OnNormalExit, Vm, VmPowerState, VmRecord};
use xenlink_client::prelude::*;
use xenlink_client::{decode, CodecError, MockServer, WireValue};

async fn setup() -> (Arc<MockServer>, Session) {
    let server = Arc::new(MockServer::new().with_user("root", "secret"));
    let session = Session::login_with_password(server.clone(), "root", "secret", "integration")
        .await
        .expect("login");
    (server, session)
}

async fn new_vm(session: &Session, label: &str) -> Ref<Vm> {
    let mut record = VmRecord::default();
    record.name_label = label.to_string();
    record.memory_static_max = 2 * 1024 * 1024 * 1024;
    record.power_state = VmPowerState::Halted.into();
    record.actions_after_shutdown = OnNormalExit::Destroy.into();
    record.actions_after_reboot = OnNormalExit::Restart.into();
    record.actions_after_crash = OnCrashBehaviour::Restart.into();
    Vm::create(&record).invoke(session).await.expect("create VM")
}

#[tokio::test]
async fn test_created_vm_reads_back() {
    let (_server, session) = setup().await;
    let vm = new_vm(&session, "web-01").await;

    let record = vm.get_record().invoke(&session).await.unwrap();
    assert_eq!(record.name_label, "web-01");
    assert_eq!(record.memory_static_max, 2 * 1024 * 1024 * 1024);
    assert!(record.power_state.is(VmPowerState::Halted));
    assert!(record.resident_on.is_null());

    let by_uuid = Vm::get_by_uuid(&record.uuid).invoke(&session).await.unwrap();
    assert_eq!(by_uuid, vm);
}

#[tokio::test]
async fn test_create_refuses_unrecognized_enum() {
    let (server, session) = setup().await;
    let wire = WireValue::structure([
        ("name_label", WireValue::from("odd")),
        ("power_state", WireValue::from("Teleporting")),
    ]);
    let record: VmRecord = decode(&wire).unwrap();
    server.clear_calls();

    let err = Vm::create(&record).invoke(&session).await.unwrap_err();
    match err {
        XenApiError::Codec(CodecError::Field { field, .. }) => assert_eq!(field, "power_state"),
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(server.calls().is_empty());

    // A default record has not chosen its enum values either
    assert!(Vm::create(&VmRecord::default()).invoke(&session).await.is_err());
}

#[tokio::test]
async fn test_get_all_records_is_keyed_by_handle() {
    let (server, session) = setup().await;
    let a = new_vm(&session, "a").await;
    let b = new_vm(&session, "b").await;
    server
        .create_object("host", [("name_label", WireValue::from("xen01"))])
        .unwrap();

    let records = Vm::get_all_records().invoke(&session).await.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[&a].name_label, "a");
    assert_eq!(records[&b].name_label, "b");

    let hosts = Host::get_all().invoke(&session).await.unwrap();
    assert_eq!(hosts.len(), 1);
}

#[tokio::test]
async fn test_sync_and_async_reach_same_state() {
    let (_server, session) = setup().await;
    let sync_vm = new_vm(&session, "sync").await;
    let async_vm = new_vm(&session, "async").await;

    sync_vm.start(false, false).invoke(&session).await.unwrap();
    let task = async_vm.start(false, false).invoke_async(&session).await.unwrap();

    assert_eq!(
        task.get_status().invoke(&session).await.unwrap(),
        EnumValue::Known(TaskStatus::Success)
    );
    for vm in [&sync_vm, &async_vm] {
        let state = vm.get_power_state().invoke(&session).await.unwrap();
        assert!(state.is(VmPowerState::Running));
    }
}

#[tokio::test]
async fn test_async_failure_lands_in_task() {
    let (_server, session) = setup().await;
    let vm = new_vm(&session, "halted").await;

    let err = vm.clean_shutdown().invoke(&session).await.unwrap_err();
    match &err {
        XenApiError::Failure { code, params } => {
            assert_eq!(*code, FaultCode::VmBadPowerState);
            assert_eq!(params[0], vm.as_wire_str());
        }
        other => panic!("unexpected error: {:?}", other),
    }

    let task = vm.clean_shutdown().invoke_async(&session).await.unwrap();
    let record = task.get_record().invoke(&session).await.unwrap();
    assert!(record.status.is(TaskStatus::Failure));
    assert_eq!(record.error_info[0], "VM_BAD_POWER_STATE");
    assert_eq!(record.progress, 1.0);
}

#[tokio::test]
async fn test_start_on_records_host() {
    let (server, session) = setup().await;
    let host_ref = server
        .create_object("host", [("name_label", WireValue::from("xen02"))])
        .unwrap();
    let host: Ref<Host> = decode(&WireValue::from(host_ref.as_str())).unwrap();
    let vm = new_vm(&session, "pinned").await;

    vm.start_on(&host, false, false).invoke(&session).await.unwrap();
    assert_eq!(vm.get_resident_on().invoke(&session).await.unwrap(), host);

    vm.hard_shutdown().invoke(&session).await.unwrap();
    assert!(vm.get_resident_on().invoke(&session).await.unwrap().is_null());
}

#[tokio::test]
async fn test_invalid_handle() {
    let (_server, session) = setup().await;
    let ghost: Ref<Vm> = decode(&WireValue::from("OpaqueRef:ghost")).unwrap();

    let err = ghost.get_record().invoke(&session).await.unwrap_err();
    assert!(err.is_fault(FaultCode::HandleInvalid));
    assert_eq!(err.fault_params().to_vec(), vec!["VM", "OpaqueRef:ghost"]);
}

#[tokio::test]
async fn test_unrecognized_fault_passes_through() {
    let (server, session) = setup().await;
    server.fail_next("VM.get_all", vec!["SR_FULL".to_string(), "OpaqueRef:sr".to_string()]);

    let err = Vm::get_all().invoke(&session).await.unwrap_err();
    match err {
        XenApiError::UnrecognizedFailure { name, params } => {
            assert_eq!(name, "SR_FULL");
            assert_eq!(params, vec!["OpaqueRef:sr".to_string()]);
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_map_field_mutators() {
    let (_server, session) = setup().await;
    let vm = new_vm(&session, "tagged").await;

    vm.add_to_field("other_config", "owner", "ops").invoke(&session).await.unwrap();
    vm.add_to_field("other_config", "tier", "gold").invoke(&session).await.unwrap();
    vm.remove_from_field("other_config", "tier").invoke(&session).await.unwrap();

    let other_config = vm.get_other_config().invoke(&session).await.unwrap();
    assert_eq!(other_config.len(), 1);
    assert_eq!(other_config["owner"], "ops");
}

#[tokio::test]
async fn test_snapshot_points_at_source() {
    let (_server, session) = setup().await;
    let vm = new_vm(&session, "golden").await;

    let snap = vm.snapshot("golden-snap").invoke(&session).await.unwrap();
    let record = snap.get_record().invoke(&session).await.unwrap();
    assert!(record.is_a_snapshot);
    assert_eq!(record.snapshot_of, vm);
    assert_ne!(snap, vm);
}

#[tokio::test]
async fn test_session_sees_logout() {
    let (server, session) = setup().await;
    assert_eq!(server.session_count(), 1);
    session.logout().await.unwrap();
    assert_eq!(server.session_count(), 0);
}
