//! Hardware configuration constants for the ESP32-S3 with an RFM69HCW module

/// System clocks
pub mod system {
    /// CPU clock reported in the gateway startup record
    pub const CPU_CLOCK_HZ: u32 = 240_000_000;
}

/// Indicator LED pin (active low)
pub mod led {
    pub const PIN: u8 = 48;
    /// LEDC carrier for the brightness PWM
    pub const PWM_FREQUENCY_KHZ: u32 = 24;
}

/// SPI pins for the RFM69 module
pub mod spi {
    pub const SCLK: u8 = 7;
    pub const MISO: u8 = 8;
    pub const MOSI: u8 = 9;
    /// SPI clock in MHz
    pub const FREQUENCY_MHZ: u32 = 4;
}

/// RFM69 control pins
pub mod radio_pins {
    pub const NSS: u8 = 41;
    pub const DIO0: u8 = 39;
    /// Drives the high-side switch feeding the module (active low)
    pub const POWER: u8 = 42;
}

/// Sensor-side pins
pub mod sensor_pins {
    /// Magnetic switch; also the deep-sleep wake source
    pub const SWITCH: u8 = 4;
    /// Battery divider tap sampled by the ADC
    pub const SUPPLY_ADC: u8 = 1;
}

/// Default radio configuration
pub mod radio_defaults {
    use crate::radio::Band;

    pub const BAND: Band = Band::Mhz433;
    pub const NETWORK_ID: u8 = 1;
    /// Output power level, 0 (min) to 31 (max)
    pub const POWER_LEVEL: u8 = 31;
    /// The RFM69HW/HCW variants need the PA1+PA2 high power path
    pub const HIGH_POWER: bool = true;
}

/// Protocol constants
pub mod protocol {
    /// Node id of the single gateway
    pub const GATEWAY_ID: u8 = 1;

    /// Node id used by the sensor firmware unless overridden
    pub const DEFAULT_SENSOR_ID: u8 = 19;

    /// Size of a sensor packet on the air
    pub const PACKET_SIZE: usize = 7;

    /// Radio header bytes counted by the frame length byte (target, sender, control)
    pub const FRAME_HEADER_SIZE: usize = 3;

    /// Largest payload the radio FIFO carries in one frame
    pub const MAX_PAYLOAD: usize = 61;

    /// Attempts for both radio initialisation and report delivery
    pub const REPEAT_ON_ERROR_COUNT: usize = 10;

    /// RSSI above this level (dBm) marks the channel as busy
    pub const CSMA_LIMIT_DBM: i16 = -50;
}

/// Timeouts and delays in milliseconds
pub mod timing {
    /// Bound for each scratch-register probe and for mode-ready waits
    pub const PROBE_TIMEOUT_MS: u32 = 50;

    /// Bound for the packet-sent signal after entering transmit
    pub const TX_LIMIT_MS: u32 = 1000;

    /// Pause between failed radio initialisation attempts
    pub const REPEAT_ON_ERROR_DELAY_MS: u32 = 1000;

    /// How long the sensor waits for an acknowledgement per attempt
    pub const ACK_TIMEOUT_MS: u32 = 100;

    /// Quiet window per unit of node id required before a sensor transmits
    pub const CSMA_WINDOW_PER_ID_MS: u32 = 5;

    /// Upper bound on the whole channel-sense phase
    pub const CSMA_LIMIT_MS: u32 = 1000;

    /// Receive poll interval of the gateway loop
    pub const GATEWAY_POLL_MS: u32 = 100;

    /// Bound for temperature and RSSI measurements
    pub const MEASUREMENT_TIMEOUT_MS: u32 = 10;
}

/// Persistent storage layout
pub mod storage {
    /// Last acknowledged request id (u32, little-endian)
    pub const REQUEST_ID_OFFSET: u32 = 0;

    /// Reserved durable slot (u32, little-endian)
    pub const RESERVED_OFFSET: u32 = 4;

    /// Bytes in the durable area
    pub const AREA_SIZE: usize = 8;

    /// Flash sectors taking turns to hold the durable area
    ///
    /// Both lie in the default NVS partition, which nothing else on the
    /// board uses.
    pub const FLASH_BANKS: [u32; 2] = [0x9000, 0xA000];
}

/// Supply measurement
pub mod supply {
    /// ADC samples taken per measurement; the median is used
    pub const SAMPLE_COUNT: usize = 5;

    /// Divides the median reference reading into tenths of a volt
    pub const REFERENCE_SCALE: u32 = 29 * 1820;

    /// Below this (tenths of a volt) the sensor does not power the radio
    pub const MIN_VOLTAGE: u8 = 18;

    /// Supply at which the indicator reaches full duty
    pub const FULL_VOLTAGE: u8 = 30;

    pub const MIN_LED_DUTY: u8 = 10;
    pub const MAX_LED_DUTY: u8 = 100;

    /// ADC input range at 11 dB attenuation
    pub const ADC_FULL_SCALE_MV: u32 = 3100;

    /// Largest 12-bit conversion
    pub const ADC_MAX: u32 = 4095;

    /// Battery divider ratio in front of the ADC pin
    pub const DIVIDER_RATIO: u32 = 2;
}
