//! I2C register map for the M5Stack Unit MiniScale (U177).
//!
//! Addresses, widths and encodings come from the protocol sheet; they are a
//! device contract and never inferred at runtime. All multi-byte registers
//! are little-endian.

/// Factory I2C address of the unit.
pub const DEFAULT_ADDR: u8 = 0x26;
/// Default Linux bus number (`/dev/i2c-1`).
pub const DEFAULT_BUS: u8 = 1;

/// Raw ADC count, i32.
pub const REG_RAW_ADC: u8 = 0x00;
/// Weight in grams, f32.
pub const REG_WEIGHT_F32: u8 = 0x10;
/// Button state, 1 byte: 0 = pressed, nonzero = not pressed.
pub const REG_BUTTON: u8 = 0x20;
/// RGB indicator, 3 bytes `[r, g, b]`.
pub const REG_LED_RGB: u8 = 0x30;
/// GAP calibration constant (ADC counts per gram), f32.
pub const REG_GAP_F32: u8 = 0x40;
/// Write 1 to reset the zero-load offset (tare).
pub const REG_OFFSET_TARE: u8 = 0x50;
/// Weight as grams x 100, i32.
pub const REG_WEIGHT_X100_I32: u8 = 0x60;
/// Display string, up to 15 chars plus NUL terminator.
pub const REG_WEIGHT_STR: u8 = 0x70;
/// Filter block, 3 bytes: `[lp_enabled, avg_level 0..50, ema_alpha 0..99]`.
pub const REG_FILTERS: u8 = 0x80;
/// Firmware version, 1 byte.
pub const REG_FW_VERSION: u8 = 0xFE;
/// Bus address, 1 byte, read/write.
pub const REG_I2C_ADDRESS: u8 = 0xFF;
