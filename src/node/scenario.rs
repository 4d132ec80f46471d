//! Sensor and gateway engines talking over a simulated air link

use super::gateway::{FrameVerdict, GatewayConfig, GatewayEngine};
use super::mock::{board, MockBoard, MockPin};
use super::NodeHardware;
use super::sensor::{CycleOutcome, ReportSummary, SensorConfig, SensorEngine};
use crate::config::storage::REQUEST_ID_OFFSET;
use crate::edge::EdgeCounter;
use crate::hal::mock::MemoryStore;
use crate::protocol::{DataType, LogLine};
use crate::radio::traits::control_byte;
use crate::radio::traits::mock::frame;
use crate::storage::DurableCounter;
use std::cell::RefCell;
use std::rc::Rc;

type SharedGateway = Rc<RefCell<GatewayEngine<MockBoard, String>>>;

fn started_gateway() -> SharedGateway {
    let (board, _, _, _) = board(1759);
    let mut gateway = GatewayEngine::new(board, String::new(), GatewayConfig::default());
    gateway.start().unwrap();
    Rc::new(RefCell::new(gateway))
}

/// Sensor whose transmissions are handled by `gateway`, answered frames
/// travelling back to the sensor
fn linked_sensor(
    gateway: &SharedGateway,
    node_id: u8,
    persisted: u32,
) -> SensorEngine<'static, MockBoard, MemoryStore, MockPin, String> {
    let edges: &'static EdgeCounter = Box::leak(Box::new(EdgeCounter::new(1)));
    let mut counter = DurableCounter::new(MemoryStore::new(8), REQUEST_ID_OFFSET);
    counter.write(persisted).unwrap();

    let (mut board, _, _, _) = board(1759);
    let link = Rc::clone(gateway);
    board.radio().set_responder(Box::new(move |sent| {
        let uplink = frame(
            sent.to,
            node_id,
            control_byte(sent.request_ack, sent.send_ack),
            &sent.payload,
            -45,
        );
        let mut gateway = link.borrow_mut();
        gateway.handle_frame(&uplink);
        let reply = gateway.hardware().radio().sent.pop()?;
        Some(frame(
            reply.to,
            1,
            control_byte(reply.request_ack, reply.send_ack),
            &reply.payload,
            -38,
        ))
    }));

    let config = SensorConfig {
        node_id,
        ..SensorConfig::default()
    };
    SensorEngine::new(
        board,
        MockPin::with_level(true),
        edges,
        counter,
        String::new(),
        config,
    )
}

#[test]
fn test_switch_toggle_reaches_gateway_and_is_acknowledged() {
    let gateway = started_gateway();
    let mut sensor = linked_sensor(&gateway, 19, 100);

    let outcome = sensor.run_cycle();
    assert_eq!(
        outcome,
        CycleOutcome::Reported(ReportSummary {
            sent: 1,
            acknowledged: 1,
            last_request_id: 101,
        })
    );

    let sent = &sensor.hardware().radio().sent;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, 1);
    assert_eq!(sent[0].payload, vec![1, 101, 0, 30, 25, 38, 0xFF]);
    assert_eq!(sensor.counter().read(), 101);

    let gateway_log = gateway.borrow().log().clone();
    let relayed: Vec<_> = gateway_log.lines().map(LogLine::parse).collect();
    assert_eq!(relayed.len(), 2);
    assert_eq!(
        relayed[1].as_ref().map(ToString::to_string),
        Ok("GW;4;19;-45;1;101;30;25.".to_string())
    );

    let sensor_line = sensor.log().lines().next().unwrap();
    assert!(sensor_line.starts_with("WS;4;19;-38;1;101;30;25;"));
}

#[test]
fn test_gateway_reply_echoes_request() {
    let gateway = started_gateway();
    let mut sensor = linked_sensor(&gateway, 19, 100);
    let captured = Rc::new(RefCell::new(Vec::new()));

    // Observe the gateway's outgoing frame before the link pops it
    let seen = Rc::clone(&captured);
    let link = Rc::clone(&gateway);
    sensor.hardware().radio().set_responder(Box::new(move |sent| {
        let uplink = frame(sent.to, 19, control_byte(sent.request_ack, sent.send_ack), &sent.payload, -45);
        let mut gateway = link.borrow_mut();
        let verdict = gateway.handle_frame(&uplink);
        seen.borrow_mut().push(verdict);
        let reply = gateway.hardware().radio().sent.last()?.clone();
        Some(frame(reply.to, 1, control_byte(reply.request_ack, reply.send_ack), &reply.payload, -38))
    }));

    sensor.run_cycle();

    let gateway_sent = gateway.borrow_mut().hardware().radio().sent.clone();
    assert_eq!(gateway_sent.len(), 1);
    assert_eq!(gateway_sent[0].to, 19);
    assert_eq!(gateway_sent[0].payload, vec![129, 101, 0, 30, 25, 28, 0xFF]);
    assert!(gateway_sent[0].send_ack);
    assert!(matches!(
        captured.borrow()[0],
        FrameVerdict::Accepted {
            acknowledged: true,
            ..
        }
    ));
}

#[test]
fn test_consecutive_wakeups_keep_ids_increasing() {
    let gateway = started_gateway();
    let mut first = linked_sensor(&gateway, 19, 100);
    first.run_cycle();
    let persisted = first.counter().read();
    assert_eq!(persisted, 101);

    let mut second = linked_sensor(&gateway, 19, persisted);
    second.run_cycle();
    assert_eq!(second.hardware().radio().sent[0].payload[1], 102);
    assert_eq!(second.counter().read(), 102);
}

#[test]
fn test_two_sensors_share_gateway() {
    let gateway = started_gateway();
    let mut near = linked_sensor(&gateway, 19, 0);
    let mut far = linked_sensor(&gateway, 7, 41);

    near.run_cycle();
    far.run_cycle();

    let log = gateway.borrow().log().clone();
    let senders: Vec<u8> = log
        .lines()
        .filter_map(|line| LogLine::parse(line).ok())
        .filter(|line| line.record.data_type() == DataType::SensorData)
        .map(|line| line.record.node_id())
        .collect();
    assert_eq!(senders, vec![19, 7]);
    assert_eq!(near.counter().read(), 1);
    assert_eq!(far.counter().read(), 42);
}
