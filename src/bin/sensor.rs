#![no_std]
#![no_main]

// Required for ESP-IDF bootloader compatibility
esp_bootloader_esp_idf::esp_app_desc!(
    env!("CARGO_PKG_VERSION"),  // version
    env!("CARGO_PKG_NAME"),     // project_name
    "00:00:00",                 // build_time
    "2025-01-01",               // build_date
    "0.0.0",                    // idf_ver (not using IDF)
    0x10000,                    // mmu_page_size (64KB)
    0,                          // min_efuse_blk_rev_full (accept all)
    u16::MAX                    // max_efuse_blk_rev_full (accept all)
);

use esp_backtrace as _;
use esp_hal::analog::adc::{Adc, AdcConfig, Attenuation};
use esp_hal::delay::Delay;
use esp_hal::gpio::{DriveMode, Input, InputConfig, Io, Level, Output, OutputConfig, Pull};
use esp_hal::ledc::channel::{self, ChannelIFace};
use esp_hal::ledc::timer::{self, TimerIFace};
use esp_hal::ledc::{LSGlobalClkSource, Ledc, LowSpeed};
use esp_hal::rtc_cntl::sleep::{Ext0WakeupSource, WakeupLevel};
use esp_hal::rtc_cntl::Rtc;
use esp_hal::spi::master::{Config as SpiConfig, Spi};
use esp_hal::spi::Mode as SpiMode;
use esp_hal::time::Rate;
use esp_storage::FlashStorage;
use log::{info, LevelFilter};

use window_sensor_firmware::board::{
    release_switch, BatterySampler, Console, EspClock, FlashByteStore, SharedSwitch, SWITCH_EDGES,
};
use window_sensor_firmware::config::{led, spi};
use window_sensor_firmware::config::storage::{FLASH_BANKS, REQUEST_ID_OFFSET};
use window_sensor_firmware::hal::ActiveLow;
use window_sensor_firmware::node::{NodeBoard, SensorConfig, SensorEngine};
use window_sensor_firmware::radio::{RadioConfig, Rfm69, Rfm69Pins};
use window_sensor_firmware::storage::DurableCounter;

#[esp_hal::main]
fn main() -> ! {
    esp_println::logger::init_logger(LevelFilter::Info);
    let peripherals = esp_hal::init(esp_hal::Config::default());

    // Radio stays unpowered until the supply check passes (active low)
    let radio_power = Output::new(peripherals.GPIO42, Level::High, OutputConfig::default());

    let spi_bus = Spi::new(
        peripherals.SPI2,
        SpiConfig::default()
            .with_frequency(Rate::from_mhz(spi::FREQUENCY_MHZ))
            .with_mode(SpiMode::_0),
    )
    .unwrap()
    .with_sck(peripherals.GPIO7)
    .with_miso(peripherals.GPIO8)
    .with_mosi(peripherals.GPIO9);

    let pins = Rfm69Pins {
        nss: Output::new(peripherals.GPIO41, Level::High, OutputConfig::default()),
        dio0: Input::new(peripherals.GPIO39, InputConfig::default().with_pull(Pull::Down)),
    };
    let radio = Rfm69::new(spi_bus, pins, EspClock);

    // Indicator LED on LEDC, idle fully off
    let mut ledc = Ledc::new(peripherals.LEDC);
    ledc.set_global_slow_clock(LSGlobalClkSource::APBClk);
    let mut led_timer = ledc.timer::<LowSpeed>(timer::Number::Timer0);
    led_timer
        .configure(timer::config::Config {
            duty: timer::config::Duty::Duty8Bit,
            clock_source: timer::LSClockSource::APBClk,
            frequency: Rate::from_khz(led::PWM_FREQUENCY_KHZ),
        })
        .unwrap();
    let mut led_channel = ledc.channel(channel::Number::Channel0, peripherals.GPIO48);
    led_channel
        .configure(channel::config::Config {
            timer: &led_timer,
            duty_pct: 100,
            drive_mode: DriveMode::PushPull,
        })
        .unwrap();

    let mut adc_config = AdcConfig::new();
    let battery_pin = adc_config.enable_pin(peripherals.GPIO1, Attenuation::_11dB);
    let battery = BatterySampler::new(Adc::new(peripherals.ADC1, adc_config), battery_pin);

    let mut io = Io::new(peripherals.IO_MUX);
    let switch_pin = Input::new(peripherals.GPIO4, InputConfig::default().with_pull(Pull::Up));
    let switch = SharedSwitch::install(&mut io, switch_pin);

    let board = NodeBoard::new(
        radio,
        radio_power,
        ActiveLow(led_channel),
        battery,
        Delay::new(),
        EspClock,
        RadioConfig::default(),
    );
    let counter = DurableCounter::new(
        FlashByteStore::new(FlashStorage::new(peripherals.FLASH), FLASH_BANKS),
        REQUEST_ID_OFFSET,
    );

    let mut engine = SensorEngine::new(
        board,
        switch,
        &SWITCH_EDGES,
        counter,
        Console,
        SensorConfig::default(),
    );
    let outcome = engine.run_cycle();
    info!("Cycle finished: {:?}", outcome);

    // Wake again when the switch leaves its current level
    let open = release_switch().is_some_and(|pin| pin.is_high());
    let wake_level = if open { WakeupLevel::Low } else { WakeupLevel::High };

    // SAFETY: the only driver of GPIO4 was dropped by release_switch
    let wake_pin = unsafe { esp_hal::peripherals::GPIO4::steal() };
    let wakeup = Ext0WakeupSource::new(wake_pin, wake_level);
    let mut rtc = Rtc::new(peripherals.LPWR);
    rtc.sleep_deep(&[&wakeup])
}
