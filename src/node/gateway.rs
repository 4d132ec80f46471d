//! Gateway receive loop
//!
//! The gateway stays in receive, checks every frame for size and checksum,
//! echoes an acknowledgement when the sender asked for one, and relays each
//! accepted reading to the serial log.

use super::{led_duty, NodeHardware};
use crate::config::protocol::{FRAME_HEADER_SIZE, GATEWAY_ID, PACKET_SIZE};
use crate::config::system::CPU_CLOCK_HZ;
use crate::config::timing::GATEWAY_POLL_MS;
use crate::poll::Timeout;
use crate::protocol::{emit, Fault, Origin, PacketError, Reading, Record, SensorPacket};
use crate::radio::{PacketRadio, RadioError, RadioFrame};
use core::fmt;
use log::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatewayConfig {
    pub node_id: u8,
    /// Reported in the startup record
    pub clock_hz: u32,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            node_id: GATEWAY_ID,
            clock_hz: CPU_CLOCK_HZ,
        }
    }
}

/// What happened to one received frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameVerdict {
    Accepted {
        packet: SensorPacket,
        /// An acknowledgement went out
        acknowledged: bool,
    },
    Dropped(Fault),
}

pub struct GatewayEngine<H, W> {
    hw: H,
    log: W,
    config: GatewayConfig,
    duty: u8,
}

impl<H, W> GatewayEngine<H, W>
where
    H: NodeHardware,
    W: fmt::Write,
{
    pub fn new(hw: H, log: W, config: GatewayConfig) -> Self {
        Self {
            hw,
            log,
            config,
            duty: led_duty(0),
        }
    }

    pub fn hardware(&mut self) -> &mut H {
        &mut self.hw
    }

    pub fn log(&self) -> &W {
        &self.log
    }

    fn record(&mut self, record: Record) {
        emit(&mut self.log, Origin::Gateway, record);
    }

    /// Log the startup record, bring up the radio and start receiving
    pub fn start(&mut self) -> Result<(), RadioError> {
        let node_id = self.config.node_id;
        let supply = self.hw.measure_supply();
        self.duty = led_duty(supply);
        self.record(Record::Startup {
            node_id,
            clock_hz: self.config.clock_hz,
            supply,
        });

        if let Err(e) = self.hw.start_radio(node_id, self.duty) {
            warn!("Gateway radio unavailable: {}", e);
            self.record(Record::Error {
                node_id,
                fault: Fault::RadioInit,
            });
            return Err(e);
        }
        self.hw.radio().receive_begin()?;
        info!("Gateway {} listening", node_id);
        Ok(())
    }

    /// Re-arm the receiver if a fault left it idle, then wait up to one
    /// poll interval for a frame and handle it
    pub fn poll(&mut self) -> Option<FrameVerdict> {
        let radio = self.hw.radio();
        if !radio.is_receiving() {
            debug!("Receiver idle, re-arming");
            if let Err(e) = radio.receive_begin() {
                warn!("Gateway receiver re-arm failed: {}", e);
            }
        }
        let frame = radio.wait_for_response(Timeout::Ms(GATEWAY_POLL_MS))?;
        Some(self.handle_frame(&frame))
    }

    pub fn run(&mut self) -> ! {
        loop {
            self.poll();
        }
    }

    /// Validate one frame, acknowledge it if asked, and log the reading
    pub fn handle_frame(&mut self, frame: &RadioFrame) -> FrameVerdict {
        if frame.frame_len() < PACKET_SIZE + FRAME_HEADER_SIZE {
            debug!("Frame of {} bytes from node {}", frame.frame_len(), frame.sender);
            return self.drop_frame(frame.sender, Fault::InvalidSize);
        }

        let packet = match SensorPacket::decode(&frame.payload) {
            Ok(packet) => packet,
            Err(PacketError::TooShort) => return self.drop_frame(frame.sender, Fault::InvalidSize),
            Err(PacketError::BadCrc { expected, received }) => {
                debug!(
                    "CRC from node {}: expected {:#04x}, got {:#04x}",
                    frame.sender, expected, received
                );
                return self.drop_frame(frame.sender, Fault::InvalidCrc);
            }
        };

        let acknowledged = frame.ack_requested() && self.acknowledge(frame.sender, &packet);

        self.record(Record::SensorData(Reading {
            node_id: frame.sender,
            rssi: frame.rssi,
            state: packet.state,
            request_id: packet.request_id,
            supply: packet.supply,
            temperature: packet.temperature,
            elapsed_ms: None,
        }));
        FrameVerdict::Accepted {
            packet,
            acknowledged,
        }
    }

    fn acknowledge(&mut self, sender: u8, packet: &SensorPacket) -> bool {
        let reply = packet.reply().encode();
        self.hw.indicator(Some(self.duty));
        let sent = self.hw.radio().send(sender, &reply, false, true);
        self.hw.indicator(None);
        match sent {
            Ok(_) => true,
            Err(e) => {
                warn!("Acknowledgement to node {} failed: {}", sender, e);
                false
            }
        }
    }

    fn drop_frame(&mut self, sender: u8, fault: Fault) -> FrameVerdict {
        self.record(Record::Error {
            node_id: sender,
            fault,
        });
        FrameVerdict::Dropped(fault)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::mock::MockClock;
    use crate::node::mock::{board, MockBoard, MockLed};
    use crate::radio::traits::mock::frame;
    use crate::radio::traits::{CTL_REQUEST_ACK, CTL_SEND_ACK};

    const REPORT: [u8; 7] = [1, 101, 0, 30, 25, 38, 0xFF];

    fn gateway() -> (GatewayEngine<MockBoard, String>, MockClock, MockLed) {
        let (board, clock, _, led) = board(1759);
        let mut engine = GatewayEngine::new(board, String::new(), GatewayConfig::default());
        engine.start().unwrap();
        (engine, clock, led)
    }

    fn lines(engine: &GatewayEngine<MockBoard, String>) -> Vec<String> {
        engine.log().lines().map(str::to_string).collect()
    }

    #[test]
    fn test_start_logs_and_listens() {
        let (mut engine, _, _) = gateway();
        assert_eq!(lines(&engine), vec!["GW;1;1;240000000;30."]);
        let radio = engine.hardware().radio();
        assert_eq!(radio.address, Some(1));
        assert!(radio.receiving);
    }

    #[test]
    fn test_start_radio_failure_logged() {
        let (mut board, _, _, _) = board(1759);
        board.radio().init_failures = usize::MAX;
        let mut engine = GatewayEngine::new(board, String::new(), GatewayConfig::default());

        assert_eq!(engine.start(), Err(RadioError::NotResponding));
        assert_eq!(
            lines(&engine),
            vec!["GW;1;1;240000000;30.", "GW;3;1;Can not initialize RFM."]
        );
    }

    #[test]
    fn test_acknowledges_when_asked() {
        let (mut engine, _, led) = gateway();
        let verdict = engine.handle_frame(&frame(1, 19, CTL_REQUEST_ACK, &REPORT, -45));

        assert!(matches!(
            verdict,
            FrameVerdict::Accepted {
                acknowledged: true,
                ..
            }
        ));
        let radio = engine.hardware().radio();
        assert_eq!(radio.sent.len(), 1);
        assert_eq!(radio.sent[0].to, 19);
        assert_eq!(radio.sent[0].payload, vec![129, 101, 0, 30, 25, 28, 0xFF]);
        assert!(radio.sent[0].send_ack);
        assert!(!radio.sent[0].request_ack);
        assert_eq!(led.history(), vec![100, 0]);
        assert_eq!(lines(&engine)[1], "GW;4;19;-45;1;101;30;25.");
    }

    #[test]
    fn test_no_ack_unless_asked() {
        let (mut engine, _, _) = gateway();
        let verdict = engine.handle_frame(&frame(1, 19, 0, &REPORT, -45));

        assert!(matches!(
            verdict,
            FrameVerdict::Accepted {
                acknowledged: false,
                ..
            }
        ));
        assert!(engine.hardware().radio().sent.is_empty());
        assert_eq!(lines(&engine)[1], "GW;4;19;-45;1;101;30;25.");
    }

    #[test]
    fn test_short_frame_dropped() {
        let (mut engine, _, _) = gateway();
        let verdict = engine.handle_frame(&frame(1, 19, CTL_REQUEST_ACK, &REPORT[..6], -45));

        assert_eq!(verdict, FrameVerdict::Dropped(Fault::InvalidSize));
        assert!(engine.hardware().radio().sent.is_empty());
        assert_eq!(lines(&engine)[1], "GW;3;19;Invalid message size.");
    }

    #[test]
    fn test_bad_crc_dropped() {
        let (mut engine, _, _) = gateway();
        let mut corrupted = REPORT;
        corrupted[3] ^= 0x04;
        let verdict = engine.handle_frame(&frame(1, 19, CTL_REQUEST_ACK, &corrupted, -45));

        assert_eq!(verdict, FrameVerdict::Dropped(Fault::InvalidCrc));
        assert!(engine.hardware().radio().sent.is_empty());
        assert_eq!(lines(&engine)[1], "GW;3;19;Invalid CRC.");
    }

    #[test]
    fn test_trailing_bytes_accepted() {
        let (mut engine, _, _) = gateway();
        let mut longer = REPORT.to_vec();
        longer.extend_from_slice(&[0, 0]);
        let verdict = engine.handle_frame(&frame(1, 19, 0, &longer, -45));
        assert!(matches!(verdict, FrameVerdict::Accepted { .. }));
    }

    #[test]
    fn test_poll_handles_scheduled_frame() {
        let (mut engine, clock, _) = gateway();
        let at = clock.peek() + 150;
        engine
            .hardware()
            .radio()
            .schedule(at, frame(1, 19, CTL_REQUEST_ACK, &REPORT, -45));

        assert_eq!(engine.poll(), None);
        assert!(matches!(engine.poll(), Some(FrameVerdict::Accepted { .. })));
        assert_eq!(engine.hardware().radio().sent.len(), 1);
    }

    #[test]
    fn test_poll_rearms_idle_receiver() {
        let (mut engine, clock, _) = gateway();
        let at = clock.peek();
        let radio = engine.hardware().radio();
        radio.receiving = false;
        radio.schedule(at, frame(1, 19, 0, &REPORT, -45));

        assert!(matches!(engine.poll(), Some(FrameVerdict::Accepted { .. })));
        assert!(engine.hardware().radio().receiving);
    }

    #[test]
    fn test_replies_are_not_acknowledged_again() {
        let (mut engine, _, _) = gateway();
        let reply = [129, 101, 0, 30, 25, 28, 0xFF];
        let verdict = engine.handle_frame(&frame(1, 19, CTL_SEND_ACK, &reply, -45));

        match verdict {
            FrameVerdict::Accepted {
                packet,
                acknowledged,
            } => {
                assert!(packet.is_reply());
                assert!(!acknowledged);
            }
            other => panic!("unexpected verdict {:?}", other),
        }
    }
}
