//! Per-sensor state built from gateway records.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::{Duration, Instant};

use window_sensor_firmware::protocol::{Fault, LogLine, Origin, Record};

/// Below this supply (tenths of a volt) a sensor is flagged for a new battery
pub const LOW_BATTERY_TENTHS: u8 = 22;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Warning {
    /// Nothing heard for longer than the allowed silence
    NoActivity,
    /// The gateway is not connected
    NotReady,
    LowBattery,
}

/// What a sensor last told us.
#[derive(Debug, Clone)]
pub struct SensorState {
    pub id: u8,
    /// Switch reads open
    pub alarm: bool,
    pub alarm_since: Option<Instant>,
    /// Supply in tenths of a volt
    pub supply: Option<u8>,
    pub last_seen: Instant,
    pub warnings: BTreeSet<Warning>,
}

impl SensorState {
    fn new(id: u8, now: Instant) -> Self {
        Self {
            id,
            alarm: false,
            alarm_since: None,
            supply: None,
            last_seen: now,
            warnings: BTreeSet::new(),
        }
    }

    fn set_alarm(&mut self, alarm: bool, now: Instant) -> bool {
        let changed = self.alarm != alarm;
        self.alarm = alarm;
        if changed {
            self.alarm_since = alarm.then_some(now);
        }
        changed
    }

    fn set_warning(&mut self, warning: Warning, on: bool) -> bool {
        if on {
            self.warnings.insert(warning)
        } else {
            self.warnings.remove(&warning)
        }
    }
}

impl fmt::Display for SensorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}: ", self.id)?;
        if !self.alarm && self.warnings.is_empty() {
            write!(f, "OK")?;
        }
        if self.alarm {
            write!(f, "OPEN")?;
        }
        if !self.warnings.is_empty() {
            write!(f, " {:?}", self.warnings)?;
        }
        if let Some(supply) = self.supply {
            write!(f, " ({}.{} V)", supply / 10, supply % 10)?;
        }
        Ok(())
    }
}

/// Outcome of feeding one line to the monitor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Startup,
    Fault { node_id: u8, fault: Fault },
    /// A sensor reading was applied
    Update { node_id: u8, changed: bool },
    UnknownSensor(u8),
    Ignored(String),
}

pub struct Monitor {
    sensors: BTreeMap<u8, SensorState>,
    /// Accept sensors that were not configured up front
    open_roster: bool,
}

impl Monitor {
    pub fn new(ids: &[u8], now: Instant) -> Self {
        let sensors = ids
            .iter()
            .map(|&id| (id, SensorState::new(id, now)))
            .collect();
        Self {
            sensors,
            open_roster: ids.is_empty(),
        }
    }

    pub fn sensor(&self, id: u8) -> Option<&SensorState> {
        self.sensors.get(&id)
    }

    /// Flag every sensor while the gateway is away
    pub fn set_ready(&mut self, ready: bool) {
        for sensor in self.sensors.values_mut() {
            sensor.set_warning(Warning::NotReady, !ready);
        }
    }

    pub fn handle_line(&mut self, line: &str, now: Instant) -> Event {
        let line = line.trim();
        let parsed = match LogLine::parse(line) {
            Ok(parsed) => parsed,
            Err(e) => return Event::Ignored(e.to_string()),
        };
        if parsed.origin != Origin::Gateway {
            return Event::Ignored("not a gateway record".to_string());
        }

        match parsed.record {
            Record::Startup { .. } => Event::Startup,
            Record::Error { node_id, fault } => Event::Fault { node_id, fault },
            Record::SensorData(reading) => {
                let id = reading.node_id;
                if !self.open_roster && !self.sensors.contains_key(&id) {
                    return Event::UnknownSensor(id);
                }
                let sensor = self
                    .sensors
                    .entry(id)
                    .or_insert_with(|| SensorState::new(id, now));

                let mut changed = sensor.set_alarm(reading.state == 0, now);
                sensor.supply = Some(reading.supply);
                sensor.last_seen = now;
                changed |= sensor.set_warning(Warning::LowBattery, reading.supply < LOW_BATTERY_TENTHS);
                changed |= sensor.set_warning(Warning::NoActivity, false);
                Event::Update {
                    node_id: id,
                    changed,
                }
            }
            Record::WaitForReady { .. } | Record::Standby { .. } => {
                Event::Ignored("sensor-side record".to_string())
            }
        }
    }

    /// Flag sensors not heard from within `max_silence`; returns newly flagged ids
    pub fn check_activity(&mut self, now: Instant, max_silence: Duration) -> Vec<u8> {
        self.sensors
            .values_mut()
            .filter(|sensor| now.duration_since(sensor.last_seen) > max_silence)
            .filter_map(|sensor| sensor.set_warning(Warning::NoActivity, true).then_some(sensor.id))
            .collect()
    }
}
