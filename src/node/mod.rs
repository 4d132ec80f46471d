//! Node roles and the hardware they share
//!
//! Both the window sensor and the gateway run on the same board: a supply
//! sampler, an indicator LED, and an RFM69 behind a power switch.
//! [`NodeBoard`] bundles these and implements [`NodeHardware`], the seam
//! the protocol engines are written against.

pub mod csma;
pub mod gateway;
pub mod sensor;

#[cfg(test)]
mod scenario;

use crate::config::protocol::REPEAT_ON_ERROR_COUNT;
use crate::config::supply::{
    ADC_FULL_SCALE_MV, ADC_MAX, DIVIDER_RATIO, FULL_VOLTAGE, MAX_LED_DUTY, MIN_LED_DUTY,
    MIN_VOLTAGE, REFERENCE_SCALE, SAMPLE_COUNT,
};
use crate::config::timing::REPEAT_ON_ERROR_DELAY_MS;
use crate::hal::{Clock, SupplySampler};
use crate::radio::{PacketRadio, RadioConfig, RadioError};
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use embedded_hal::pwm::SetDutyCycle;
use log::{info, warn};

pub use gateway::{GatewayConfig, GatewayEngine};
pub use sensor::{CycleOutcome, SensorConfig, SensorEngine};

/// Hardware services the protocol engines need
pub trait NodeHardware {
    type Radio: PacketRadio;

    fn radio(&mut self) -> &mut Self::Radio;

    /// Monotonic milliseconds
    fn now_ms(&self) -> u32;

    /// Supply voltage in tenths of a volt
    fn measure_supply(&mut self) -> u8;

    /// Light the indicator at `duty` percent, or switch it off
    fn indicator(&mut self, duty: Option<u8>);

    /// Power the radio and initialise it, retrying with a pause in between
    fn start_radio(&mut self, node_id: u8, duty: u8) -> Result<(), RadioError>;

    /// Put the radio to sleep and cut its power
    fn stop_radio(&mut self);
}

/// Supply in tenths of a volt from raw reference readings
///
/// Uses the median of the samples; a zero median (converter never started)
/// reads as zero volts.
pub fn supply_from_samples(samples: &mut [u32]) -> u8 {
    if samples.is_empty() {
        return 0;
    }
    samples.sort_unstable();
    match samples[samples.len() / 2] {
        0 => 0,
        median => (REFERENCE_SCALE / median).min(u8::MAX as u32) as u8,
    }
}

/// Battery voltage behind the divider for a raw 12-bit conversion
pub fn divider_millivolts(raw: u16) -> u32 {
    raw as u32 * ADC_FULL_SCALE_MV * DIVIDER_RATIO / ADC_MAX
}

/// Reference reading that [`supply_from_samples`] maps back to `millivolts`
///
/// Lets a board that measures the battery directly feed the same
/// median-of-readings path as one that measures a fixed reference.
pub fn reference_reading(millivolts: u32) -> u32 {
    match millivolts {
        0 => 0,
        mv => REFERENCE_SCALE * 100 / mv,
    }
}

/// Indicator brightness for a supply level; dimmer as the battery drains
pub fn led_duty(supply: u8) -> u8 {
    let clamped = supply.clamp(MIN_VOLTAGE, FULL_VOLTAGE) - MIN_VOLTAGE;
    let span = FULL_VOLTAGE - MIN_VOLTAGE;
    let range = (MAX_LED_DUTY - MIN_LED_DUTY) as u32;
    MIN_LED_DUTY + (range * clamped as u32 / span as u32) as u8
}

/// Radio power switch, indicator and supply sampler of one node
pub struct NodeBoard<R, Pwr, Led, Adc, D, C> {
    radio: R,
    /// Active low
    radio_power: Pwr,
    led: Led,
    supply: Adc,
    delay: D,
    clock: C,
    config: RadioConfig,
}

impl<R, Pwr, Led, Adc, D, C> NodeBoard<R, Pwr, Led, Adc, D, C>
where
    R: PacketRadio,
    Pwr: OutputPin,
    Led: SetDutyCycle,
    Adc: SupplySampler,
    D: DelayNs,
    C: Clock,
{
    pub fn new(
        radio: R,
        radio_power: Pwr,
        led: Led,
        supply: Adc,
        delay: D,
        clock: C,
        config: RadioConfig,
    ) -> Self {
        Self {
            radio,
            radio_power,
            led,
            supply,
            delay,
            clock,
            config,
        }
    }

    fn power_radio(&mut self, on: bool) {
        let _ = if on {
            self.radio_power.set_low()
        } else {
            self.radio_power.set_high()
        };
    }

    fn configure_radio(&mut self, node_id: u8) -> Result<(), RadioError> {
        self.radio
            .initialize(self.config.band, node_id, self.config.network_id)?;
        self.radio.set_high_power(self.config.high_power)?;
        self.radio.set_power_level(self.config.power_level)
    }

    /// Supply sampler, for board-specific calibration
    pub fn supply_sampler(&mut self) -> &mut Adc {
        &mut self.supply
    }
}

impl<R, Pwr, Led, Adc, D, C> NodeHardware for NodeBoard<R, Pwr, Led, Adc, D, C>
where
    R: PacketRadio,
    Pwr: OutputPin,
    Led: SetDutyCycle,
    Adc: SupplySampler,
    D: DelayNs,
    C: Clock,
{
    type Radio = R;

    fn radio(&mut self) -> &mut R {
        &mut self.radio
    }

    fn now_ms(&self) -> u32 {
        self.clock.now_ms()
    }

    fn measure_supply(&mut self) -> u8 {
        let mut samples = [0u32; SAMPLE_COUNT];
        for sample in samples.iter_mut() {
            *sample = self.supply.sample().unwrap_or(0);
        }
        supply_from_samples(&mut samples)
    }

    fn indicator(&mut self, duty: Option<u8>) {
        let _ = match duty {
            Some(percent) => self.led.set_duty_cycle_percent(percent.min(100)),
            None => self.led.set_duty_cycle_fully_off(),
        };
    }

    fn start_radio(&mut self, node_id: u8, duty: u8) -> Result<(), RadioError> {
        let mut last_error = RadioError::NotResponding;
        for attempt in 1..=REPEAT_ON_ERROR_COUNT {
            self.power_radio(true);
            match self.configure_radio(node_id) {
                Ok(()) => {
                    info!("Radio up as node {} (attempt {})", node_id, attempt);
                    return Ok(());
                }
                Err(e) => {
                    warn!("Radio init attempt {} failed: {}", attempt, e);
                    last_error = e;
                    self.indicator(Some(duty));
                    self.power_radio(false);
                    self.delay.delay_ms(REPEAT_ON_ERROR_DELAY_MS);
                    self.indicator(None);
                }
            }
        }
        Err(last_error)
    }

    fn stop_radio(&mut self) {
        if let Err(e) = self.radio.sleep() {
            warn!("Radio sleep failed: {}", e);
        }
        self.power_radio(false);
    }
}
