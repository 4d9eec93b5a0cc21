//! Tests for the bridge context

use super::*;
use crate::config::{DeviceConfig, DiscoveryConfig, NetworkConfig};
use crate::endpoints::EndpointRegistry;
use crate::session::DeviceClass;
use crate::transport::testing::{RecordingTransport, SentLog};
use rosc::OscType;

const DISCOVERY_PORT: u16 = 12002;
const DEVICE_PORT: u16 = 16000;

fn make_test_config(auto_detect: bool, subscribe: bool) -> AppConfig {
    AppConfig {
        network: NetworkConfig {
            host: "127.0.0.1".to_string(),
            serialosc_port: DISCOVERY_PORT,
            listener_port: 19996,
        },
        device: DeviceConfig {
            prefix: "/monome".to_string(),
            class: DeviceClass::Auto,
            settings_file: "device.yaml".into(),
        },
        discovery: DiscoveryConfig {
            auto_detect,
            subscribe,
        },
    }
}

fn init(persisted: &str, log: &SentLog) -> Bridge {
    init_with(persisted, RecordingTransport::new(log.clone()), make_test_config(false, false))
}

fn init_with(persisted: &str, transport: RecordingTransport, config: AppConfig) -> Bridge {
    let mut registry = EndpointRegistry::new(transport);
    let bridge = Bridge::init(&config, persisted, &mut registry);
    assert!(registry.is_sealed());
    bridge
}

fn device_info(id: &str, device_type: &str, port: i32) -> InboundEvent {
    InboundEvent::DeviceInfo(DeviceRecord::new(id, device_type, port).unwrap())
}

#[test]
fn test_discovery_while_unbound_persists_and_restarts() {
    let log = SentLog::default();
    let mut bridge = init("0", &log);

    assert_eq!(bridge.connection().state(), ConnectionState::Unbound);
    assert_eq!(bridge.session_state(), SessionState::NoSession);
    assert_eq!(log.len(), 0);

    let effects = bridge.handle_event(device_info("m0000001", "monome 128", 16000));

    assert_eq!(effects, vec![Effect::PersistPort(16000), Effect::Restart]);
    // Handshake only happens in the next cycle
    assert!(log.to_port(DEVICE_PORT).is_empty());
    assert_eq!(log.len(), 0);
}

#[test]
fn test_init_with_persisted_port_handshakes_and_resets() {
    let log = SentLog::default();
    let bridge = init("16000", &log);

    assert_eq!(bridge.session_state(), SessionState::Ready);
    assert_eq!(
        bridge.connection().state(),
        ConnectionState::Connected { port: DEVICE_PORT }
    );

    let addrs = log.addrs_to(DEVICE_PORT);
    assert_eq!(&addrs[..3], &["/sys/host", "/sys/port", "/sys/prefix"]);
    assert_eq!(addrs[3], "/monome/grid/led/level/all");
    assert_eq!(addrs.len(), 3 + 10);
}

#[test]
fn test_init_announces_to_serialosc_when_enabled() {
    let log = SentLog::default();
    let bridge = init_with(
        "0",
        RecordingTransport::new(log.clone()),
        make_test_config(true, true),
    );

    assert!(bridge.discovery().has_channel());
    assert_eq!(
        log.addrs_to(DISCOVERY_PORT),
        vec!["/serialosc/notify", "/serialosc/list"]
    );
    let list = &log.to_port(DISCOVERY_PORT)[1];
    assert_eq!(
        list.args,
        vec![OscType::String("127.0.0.1".to_string()), OscType::Int(19996)]
    );
}

#[test]
fn test_device_open_failure_leaves_unbound() {
    let log = SentLog::default();
    let bridge = init_with(
        "16000",
        RecordingTransport::new(log.clone()).refusing(DEVICE_PORT),
        make_test_config(false, false),
    );

    assert_eq!(bridge.connection().state(), ConnectionState::Unbound);
    assert_eq!(bridge.session_state(), SessionState::NoSession);
    assert_eq!(bridge.status().endpoints.len(), 2);
}

#[test]
fn test_listener_failure_does_not_abort_init() {
    let log = SentLog::default();
    let bridge = init_with(
        "16000",
        RecordingTransport::new(log.clone()).refusing(19996),
        make_test_config(false, false),
    );

    assert_eq!(bridge.session_state(), SessionState::Ready);
    let roles: Vec<EndpointRole> = bridge.status().endpoints.iter().map(|e| e.role).collect();
    assert_eq!(roles, vec![EndpointRole::DiscoveryOut, EndpointRole::DeviceOut]);
}

#[test]
fn test_replayed_device_info_is_idempotent() {
    let log = SentLog::default();
    let mut bridge = init("16000", &log);

    assert!(bridge
        .handle_event(device_info("m0000001", "monome 128", 16000))
        .is_empty());
    let sent_before = log.len();
    let status_before = bridge.status();

    assert!(bridge
        .handle_event(device_info("m0000001", "monome 128", 16000))
        .is_empty());

    let status_after = bridge.status();
    assert_eq!(log.len(), sent_before);
    assert_eq!(status_after.connection, status_before.connection);
    assert_eq!(status_after.bound_device, status_before.bound_device);
    assert_eq!(status_after.devices, status_before.devices);
}

#[test]
fn test_port_change_restarts_once() {
    let log = SentLog::default();
    let mut bridge = init("16000", &log);

    bridge.handle_event(device_info("m1", "monome 128", 16000));
    let effects = bridge.handle_event(device_info("m1", "monome 128", 16001));
    assert_eq!(effects, vec![Effect::PersistPort(16001), Effect::Restart]);

    // Restart is pending: nothing else is acted on
    assert!(bridge
        .handle_event(device_info("m1", "monome 128", 16002))
        .is_empty());
}

#[test]
fn test_second_device_is_ignored() {
    let log = SentLog::default();
    let mut bridge = init("16000", &log);

    bridge.handle_event(device_info("m1", "monome 128", 16000));
    let effects = bridge.handle_event(device_info("m2", "monome arc 4", 17000));

    assert!(effects.is_empty());
    assert_eq!(bridge.status().devices.len(), 2);
    assert_eq!(bridge.status().bound_device.as_deref(), Some("m1"));
}

#[test]
fn test_remaining_device_claimed_after_removal() {
    let log = SentLog::default();
    let mut bridge = init("16000", &log);

    bridge.handle_event(device_info("m1", "monome 128", 16000));
    bridge.handle_event(device_info("m2", "monome arc 4", 17000));
    bridge.handle_event(InboundEvent::DeviceRemoved { id: "m1".to_string() });

    let effects = bridge.handle_event(device_info("m2", "monome arc 4", 17000));
    assert_eq!(effects, vec![Effect::PersistPort(17000), Effect::Restart]);
}

#[test]
fn test_add_notification_connects_and_resubscribes() {
    let log = SentLog::default();
    let mut bridge = init("0", &log);

    let effects = bridge.handle_event(InboundEvent::DeviceAdded(
        DeviceRecord::new("m1", "monome arc 4", 17000).unwrap(),
    ));

    assert_eq!(effects, vec![Effect::PersistPort(17000), Effect::Restart]);
    assert_eq!(log.addrs_to(DISCOVERY_PORT), vec!["/serialosc/notify"]);
}

#[test]
fn test_grid_feedback_in_ready_session() {
    let log = SentLog::default();
    let mut bridge = init("16000", &log);
    log.clear();

    bridge.handle_event(InboundEvent::GridKey { x: 1, y: 2, pressed: true });
    bridge.handle_event(InboundEvent::GridKey { x: 1, y: 2, pressed: false });

    let sent = log.to_port(DEVICE_PORT);
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].addr, "/monome/grid/led/level/set");
    assert_eq!(
        sent[0].args,
        vec![OscType::Int(1), OscType::Int(2), OscType::Int(15)]
    );
    assert_eq!(
        sent[1].args,
        vec![OscType::Int(1), OscType::Int(2), OscType::Int(6)]
    );
    assert_eq!(bridge.feedback().keys().is_lit(1, 2), Some(true));
}

#[test]
fn test_encoder_feedback_in_ready_session() {
    let log = SentLog::default();
    let mut bridge = init("16000", &log);
    log.clear();

    bridge.handle_event(InboundEvent::EncoderDelta { encoder: 0, delta: 80 });

    let sent = log.to_port(DEVICE_PORT);
    assert_eq!(sent.len(), 2);
    assert_eq!(
        sent[0].args,
        vec![OscType::Int(0), OscType::Int(0), OscType::Int(10), OscType::Int(15)]
    );
    assert_eq!(
        sent[1].args,
        vec![OscType::Int(0), OscType::Int(11), OscType::Int(63), OscType::Int(0)]
    );
}

#[test]
fn test_input_without_session_is_dropped() {
    let log = SentLog::default();
    let mut bridge = init("0", &log);

    let effects = bridge.handle_event(InboundEvent::GridKey { x: 0, y: 0, pressed: true });
    bridge.handle_event(InboundEvent::EncoderDelta { encoder: 0, delta: 64 });

    assert!(effects.is_empty());
    assert_eq!(log.len(), 0);
    assert_eq!(bridge.feedback().keys().is_lit(0, 0), Some(false));
    assert_eq!(bridge.feedback().bars().position(0), Some(0.0));
}

#[test]
fn test_port_edits_through_bridge() {
    let log = SentLog::default();
    let mut bridge = init("16000", &log);

    assert_eq!(bridge.apply_port_edit("80"), vec![Effect::PersistPort(16000)]);
    assert!(bridge.apply_port_edit("16000").is_empty());
    assert_eq!(
        bridge.apply_port_edit("0"),
        vec![Effect::PersistPort(0), Effect::Restart]
    );
}

#[test]
fn test_detect_sends_list_request() {
    let log = SentLog::default();
    let mut bridge = init("0", &log);

    bridge.detect();

    assert_eq!(log.addrs_to(DISCOVERY_PORT), vec!["/serialosc/list"]);
}

#[test]
fn test_connected_device_survives_other_reply_first() {
    let log = SentLog::default();
    let mut bridge = init("16000", &log);

    assert!(bridge
        .handle_event(device_info("m2", "monome arc 4", 17000))
        .is_empty());
    assert!(bridge
        .handle_event(device_info("m1", "monome 128", 16000))
        .is_empty());

    assert_eq!(bridge.status().bound_device.as_deref(), Some("m1"));
    assert_eq!(
        bridge.connection().state(),
        ConnectionState::Connected { port: DEVICE_PORT }
    );
    assert_eq!(bridge.session_state(), SessionState::Ready);
}

#[test]
fn test_detect_rebinds_to_present_device() {
    let log = SentLog::default();
    let mut bridge = init("16000", &log);
    bridge.handle_event(device_info("m1", "monome 128", 16000));

    // m1 was unplugged without a remove notification
    bridge.detect();
    let effects = bridge.handle_event(device_info("m2", "monome arc 4", 17000));

    assert_eq!(effects, vec![Effect::PersistPort(17000), Effect::Restart]);
}

#[test]
fn test_detect_keeps_device_that_replies_first() {
    let log = SentLog::default();
    let mut bridge = init("16000", &log);
    bridge.handle_event(device_info("m1", "monome 128", 16000));

    bridge.detect();

    // Unchanged replay still rebinds after detect
    assert!(bridge
        .handle_event(device_info("m1", "monome 128", 16000))
        .is_empty());
    assert_eq!(bridge.status().bound_device.as_deref(), Some("m1"));
}

#[test]
fn test_invalid_persisted_port_repaired_on_init() {
    let log = SentLog::default();
    let mut bridge = init("999", &log);

    assert_eq!(bridge.connection().state(), ConnectionState::Unbound);
    assert_eq!(bridge.take_startup_effects(), vec![Effect::PersistPort(0)]);
    assert!(bridge.take_startup_effects().is_empty());
}
