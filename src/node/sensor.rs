//! Window sensor duty cycle
//!
//! One call to [`SensorEngine::run_cycle`] covers a whole wake-up:
//!
//! 1. measure the supply; below the minimum, log and stop
//! 2. power and initialise the radio (with retries)
//! 3. listen until the channel has been quiet for the node's window
//! 4. for every drained batch of switch edges, report the current level
//!    and wait for the gateway to echo the request id
//! 5. persist each acknowledged id, then sleep the radio and cut its power
//!
//! The caller puts the MCU into deep sleep afterwards.

use super::csma::{ChannelState, QuietWindow};
use super::{led_duty, NodeHardware};
use crate::config::protocol::{CSMA_LIMIT_DBM, DEFAULT_SENSOR_ID, GATEWAY_ID, REPEAT_ON_ERROR_COUNT};
use crate::config::supply::MIN_VOLTAGE;
use crate::config::timing::{ACK_TIMEOUT_MS, CSMA_LIMIT_MS, CSMA_WINDOW_PER_ID_MS};
use crate::edge::EdgeCounter;
use crate::hal::ByteStore;
use crate::poll::Timeout;
use crate::protocol::packet::decode_request_id;
use crate::protocol::{emit, Fault, Origin, Reading, Record, SensorPacket};
use crate::radio::{PacketRadio, RadioFrame};
use crate::storage::{DurableCounter, RequestIds};
use core::fmt;
use embedded_hal::digital::InputPin;
use log::{debug, info, warn};

/// Sensor identity and behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorConfig {
    pub node_id: u8,
    /// Where reports go and whose acknowledgements count
    pub gateway_id: u8,
    /// Added to the radio's temperature reading
    pub temperature_calibration: i8,
    /// Also log `WaitForReady` and `Standby` records
    pub trace_phases: bool,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            node_id: DEFAULT_SENSOR_ID,
            gateway_id: GATEWAY_ID,
            temperature_calibration: 0,
            trace_phases: false,
        }
    }
}

/// Reports made during one cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportSummary {
    pub sent: u32,
    pub acknowledged: u32,
    /// Request id of the last report, zero if none was made
    pub last_request_id: u32,
}

/// How a wake-up ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Supply too low to power the radio
    LowVoltage { supply: u8 },
    /// The radio never came up
    RadioUnavailable,
    Reported(ReportSummary),
}

pub struct SensorEngine<'a, H, S, Sw, W> {
    hw: H,
    switch: Sw,
    edges: &'a EdgeCounter,
    counter: DurableCounter<S>,
    log: W,
    config: SensorConfig,
    woke_at: u32,
}

impl<'a, H, S, Sw, W> SensorEngine<'a, H, S, Sw, W>
where
    H: NodeHardware,
    S: ByteStore,
    Sw: InputPin,
    W: fmt::Write,
{
    pub fn new(
        hw: H,
        switch: Sw,
        edges: &'a EdgeCounter,
        counter: DurableCounter<S>,
        log: W,
        config: SensorConfig,
    ) -> Self {
        let woke_at = hw.now_ms();
        Self {
            hw,
            switch,
            edges,
            counter,
            log,
            config,
            woke_at,
        }
    }

    pub fn hardware(&mut self) -> &mut H {
        &mut self.hw
    }

    pub fn counter(&mut self) -> &mut DurableCounter<S> {
        &mut self.counter
    }

    pub fn log(&self) -> &W {
        &self.log
    }

    fn record(&mut self, record: Record) {
        emit(&mut self.log, Origin::Sensor, record);
    }

    fn elapsed_ms(&self) -> u32 {
        self.hw.now_ms().wrapping_sub(self.woke_at)
    }

    /// Run one wake-up from supply check to radio power-down
    pub fn run_cycle(&mut self) -> CycleOutcome {
        let node_id = self.config.node_id;
        let supply = self.hw.measure_supply();
        let duty = led_duty(supply);
        debug!("Supply {} (led duty {}%)", supply, duty);

        let outcome = if supply < MIN_VOLTAGE {
            warn!("Supply {} below operating minimum", supply);
            self.record(Record::Error {
                node_id,
                fault: Fault::LowVoltage,
            });
            CycleOutcome::LowVoltage { supply }
        } else if let Err(e) = self.hw.start_radio(node_id, duty) {
            warn!("Giving up on radio: {}", e);
            self.record(Record::Error {
                node_id,
                fault: Fault::RadioInit,
            });
            CycleOutcome::RadioUnavailable
        } else {
            if self.channel_sense() == ChannelState::GaveUp {
                warn!("Channel never went quiet, transmitting anyway");
            }
            if self.config.trace_phases {
                let elapsed_ms = self.elapsed_ms();
                self.record(Record::WaitForReady {
                    node_id,
                    elapsed_ms,
                });
            }
            let summary = self.report(supply, duty);
            self.hw.stop_radio();
            info!(
                "Cycle done: {}/{} reports acknowledged",
                summary.acknowledged, summary.sent
            );
            CycleOutcome::Reported(summary)
        };

        if self.config.trace_phases {
            let elapsed_ms = self.elapsed_ms();
            self.record(Record::Standby {
                node_id,
                elapsed_ms,
            });
        }
        self.hw.indicator(None);
        outcome
    }

    /// Listen until the channel has been quiet for this node's window
    pub fn channel_sense(&mut self) -> ChannelState {
        let window_ms = CSMA_WINDOW_PER_ID_MS * self.config.node_id as u32;
        if let Err(e) = self.hw.radio().receive_begin() {
            warn!("Could not enter receive: {}", e);
        }

        let mut window = QuietWindow::new(self.hw.now_ms(), window_ms, CSMA_LIMIT_MS);
        loop {
            let busy = channel_busy(self.hw.radio());
            match window.observe(self.hw.now_ms(), busy) {
                ChannelState::Listening => continue,
                state => return state,
            }
        }
    }

    fn report(&mut self, supply: u8, duty: u8) -> ReportSummary {
        let mut ids = RequestIds::resume(&mut self.counter);
        let mut summary = ReportSummary::default();

        while self.edges.take() > 0 {
            let request_id = ids.next();
            let state = matches!(self.switch.is_high(), Ok(true)) as u8;
            let acknowledged = self.deliver(request_id, state, supply, duty);

            summary.sent += 1;
            summary.last_request_id = request_id;
            if !acknowledged {
                continue;
            }
            summary.acknowledged += 1;
            if let Err(e) = self.counter.write(request_id) {
                warn!("Persisting request id {} failed: {}", request_id, e);
                self.record(Record::Error {
                    node_id: self.config.node_id,
                    fault: Fault::PersistFailed,
                });
            }
        }
        summary
    }

    /// Send one report until acknowledged or out of attempts
    fn deliver(&mut self, request_id: u32, state: u8, supply: u8, duty: u8) -> bool {
        let calibration = self.config.temperature_calibration;
        let temperature = self
            .hw
            .radio()
            .read_temperature(calibration)
            .unwrap_or_else(|e| {
                warn!("Temperature read failed: {}", e);
                0
            });
        let packet = SensorPacket {
            state,
            request_id: request_id as u16,
            supply,
            temperature,
        };
        let payload = packet.encode();

        let mut rssi = 0;
        let mut acknowledged = false;
        for attempt in 1..=REPEAT_ON_ERROR_COUNT {
            self.hw.indicator(Some(duty));
            let sent = self
                .hw
                .radio()
                .send(self.config.gateway_id, &payload, true, false);
            self.hw.indicator(None);
            if let Err(e) = sent {
                warn!("Send attempt {} failed: {}", attempt, e);
                continue;
            }

            let Some(reply) = self
                .hw
                .radio()
                .wait_for_response(Timeout::Ms(ACK_TIMEOUT_MS))
            else {
                debug!("No reply to request {} (attempt {})", request_id, attempt);
                continue;
            };
            rssi = reply.rssi;
            if is_acknowledgement(&self.config, &reply, packet.request_id) {
                acknowledged = true;
                break;
            }
            debug!("Ignoring frame from node {}", reply.sender);
        }

        let elapsed_ms = self.elapsed_ms();
        self.record(Record::SensorData(Reading {
            node_id: self.config.node_id,
            rssi,
            state,
            request_id: packet.request_id,
            supply,
            temperature,
            elapsed_ms: Some(elapsed_ms),
        }));
        acknowledged
    }
}

/// A loud carrier or any decoded frame marks the channel busy
fn channel_busy<R: PacketRadio>(radio: &mut R) -> bool {
    let loud = radio
        .read_rssi(false)
        .map(|dbm| dbm > CSMA_LIMIT_DBM)
        .unwrap_or(true);
    let heard = radio.try_receive().is_some();
    loud || heard
}

/// Whether `reply` is the gateway's acknowledgement of `request_id`
///
/// The reply's checksum is not verified; the echoed id is enough to match
/// it to the outstanding report.
fn is_acknowledgement(config: &SensorConfig, reply: &RadioFrame, request_id: u16) -> bool {
    reply.sender == config.gateway_id
        && reply.target == config.node_id
        && reply.ack_received()
        && reply.payload.len() >= 3
        && decode_request_id(reply.payload[1], reply.payload[2]) == request_id
}
