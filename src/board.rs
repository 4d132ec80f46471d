//! ESP32-S3 board support
//!
//! Adapts esp-hal peripherals to the collaborator traits the engines use:
//! the monotonic clock, the battery sampler, flash-backed byte storage, the
//! serial record sink and the interrupt-driven switch.

use crate::config::sensor_pins;
use crate::edge::{EdgeCounter, EdgeDispatch};
use crate::hal::{Clock, SupplySampler};
use crate::node::{divider_millivolts, reference_reading};
use crate::storage::MirroredFlash;
use core::cell::RefCell;
use core::convert::Infallible;
use core::fmt;
use critical_section::Mutex;
use esp_hal::analog::adc::{Adc, AdcPin};
use esp_hal::gpio::{Event, Input};
use esp_hal::handler;
use esp_hal::peripherals::{ADC1, GPIO1};
use esp_hal::time::Instant;
use esp_hal::Blocking;
use esp_storage::FlashStorage;

/// Milliseconds since boot from the system timer
#[derive(Debug, Clone, Copy, Default)]
pub struct EspClock;

impl Clock for EspClock {
    fn now_ms(&self) -> u32 {
        Instant::now().duration_since_epoch().as_millis() as u32
    }
}

/// Record sink on the USB serial console
pub struct Console;

impl fmt::Write for Console {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        esp_println::print!("{}", s);
        Ok(())
    }
}

/// Battery sampler on the divider tap
pub struct BatterySampler<'d> {
    adc: Adc<'d, ADC1<'d>, Blocking>,
    pin: AdcPin<GPIO1<'d>, ADC1<'d>>,
}

impl<'d> BatterySampler<'d> {
    pub fn new(adc: Adc<'d, ADC1<'d>, Blocking>, pin: AdcPin<GPIO1<'d>, ADC1<'d>>) -> Self {
        Self { adc, pin }
    }
}

impl SupplySampler for BatterySampler<'_> {
    fn sample(&mut self) -> Option<u32> {
        match nb::block!(self.adc.read_oneshot(&mut self.pin)) {
            Ok(raw) => Some(reference_reading(divider_millivolts(raw))),
            Err(_) => None,
        }
    }
}

/// Durable area mirrored across two sectors of the SPI flash
pub type FlashByteStore<'d> = MirroredFlash<FlashStorage<'d>>;

/// Edges seen on the magnetic switch; the wake-up itself counts as one
pub static SWITCH_EDGES: EdgeCounter = EdgeCounter::new(1);

static EDGE_ROUTES: EdgeDispatch<1> = EdgeDispatch::new([(sensor_pins::SWITCH, &SWITCH_EDGES)]);

static SWITCH_PIN: Mutex<RefCell<Option<Input<'static>>>> = Mutex::new(RefCell::new(None));

#[handler]
fn switch_interrupt() {
    critical_section::with(|cs| {
        if let Some(pin) = SWITCH_PIN.borrow_ref_mut(cs).as_mut() {
            if pin.is_interrupt_set() {
                pin.clear_interrupt();
                EDGE_ROUTES.dispatch(sensor_pins::SWITCH);
            }
        }
    });
}

/// The switch input, shared with its interrupt handler
pub struct SharedSwitch;

impl SharedSwitch {
    /// Listen for both edges and route them to [`SWITCH_EDGES`]
    pub fn install(io: &mut esp_hal::gpio::Io<'_>, mut pin: Input<'static>) -> Self {
        io.set_interrupt_handler(switch_interrupt);
        critical_section::with(|cs| {
            pin.listen(Event::AnyEdge);
            SWITCH_PIN.borrow_ref_mut(cs).replace(pin);
        });
        SharedSwitch
    }
}

/// Stop listening on the switch and give the pin back
pub fn release_switch() -> Option<Input<'static>> {
    critical_section::with(|cs| {
        let mut pin = SWITCH_PIN.borrow_ref_mut(cs).take()?;
        pin.unlisten();
        Some(pin)
    })
}

impl embedded_hal::digital::ErrorType for SharedSwitch {
    type Error = Infallible;
}

impl embedded_hal::digital::InputPin for SharedSwitch {
    fn is_high(&mut self) -> Result<bool, Infallible> {
        Ok(critical_section::with(|cs| {
            SWITCH_PIN
                .borrow_ref(cs)
                .as_ref()
                .is_some_and(|pin| pin.is_high())
        }))
    }

    fn is_low(&mut self) -> Result<bool, Infallible> {
        self.is_high().map(|high| !high)
    }
}
