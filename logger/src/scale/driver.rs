//! Driver for the MiniScale register protocol.
//!
//! `MiniScale` is generic over any [`embedded_hal::i2c::I2c`] bus; on a
//! Linux host the binaries hand it a `linux_embedded_hal::I2cdev`. The
//! driver performs one bus transaction per operation and never retries;
//! recovery cadence belongs to the caller.

use std::fmt;

use embedded_hal::i2c::I2c;
use thiserror::Error;

use super::registers::{
    REG_BUTTON, REG_FILTERS, REG_FW_VERSION, REG_GAP_F32, REG_I2C_ADDRESS, REG_LED_RGB,
    REG_OFFSET_TARE, REG_RAW_ADC, REG_WEIGHT_F32, REG_WEIGHT_STR, REG_WEIGHT_X100_I32,
};

#[derive(Debug, Error)]
pub enum ScaleError {
    /// The bus transaction did not complete (no response, NACK, timeout).
    #[error("i2c transfer failed at register {reg:#04x}: {detail}")]
    Bus { reg: u8, detail: String },
}

impl ScaleError {
    fn bus(reg: u8, err: impl fmt::Debug) -> Self {
        Self::Bus {
            reg,
            detail: format!("{err:?}"),
        }
    }
}

/// Device-side filter block at 0x80.
///
/// Lives on the device, not cached here; reads and writes always hit the
/// bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterConfig {
    pub low_pass_enabled: bool,
    /// Moving-average level, 0..=50.
    pub avg_level: u8,
    /// EMA alpha, 0..=99.
    pub ema_alpha: u8,
}

impl FilterConfig {
    fn from_bytes(raw: [u8; 3]) -> Self {
        Self {
            low_pass_enabled: raw[0] != 0,
            avg_level: raw[1],
            ema_alpha: raw[2],
        }
    }
}

/// Partial update of the filter block. Fields left as `None` keep whatever
/// the device currently holds.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilterUpdate {
    pub low_pass_enabled: Option<bool>,
    pub avg_level: Option<u8>,
    pub ema_alpha: Option<u8>,
}

impl FilterUpdate {
    /// Overlays the update onto the current register block.
    fn apply(self, mut current: [u8; 3]) -> [u8; 3] {
        if let Some(enabled) = self.low_pass_enabled {
            current[0] = enabled as u8;
        }
        if let Some(level) = self.avg_level {
            current[1] = level;
        }
        if let Some(alpha) = self.ema_alpha {
            current[2] = alpha;
        }
        current
    }
}

/// Handle on one MiniScale unit at a fixed bus address.
pub struct MiniScale<I2C> {
    i2c: I2C,
    addr: u8,
}

impl<I2C: I2c> MiniScale<I2C> {
    pub fn new(i2c: I2C, addr: u8) -> Self {
        Self { i2c, addr }
    }

    /// The address this handle currently talks to.
    pub fn address(&self) -> u8 {
        self.addr
    }

    /// Gives the bus back to the caller.
    pub fn release(self) -> I2C {
        self.i2c
    }

    fn read_reg(&mut self, reg: u8, buf: &mut [u8]) -> Result<(), ScaleError> {
        self.i2c
            .write_read(self.addr, &[reg], buf)
            .map_err(|e| ScaleError::bus(reg, e))
    }

    fn write_reg(&mut self, reg: u8, payload: &[u8]) -> Result<(), ScaleError> {
        let mut frame = Vec::with_capacity(1 + payload.len());
        frame.push(reg);
        frame.extend_from_slice(payload);
        self.i2c
            .write(self.addr, &frame)
            .map_err(|e| ScaleError::bus(reg, e))
    }

    /// Raw ADC count.
    pub fn raw_adc(&mut self) -> Result<i32, ScaleError> {
        let mut buf = [0u8; 4];
        self.read_reg(REG_RAW_ADC, &mut buf)?;
        Ok(i32::from_le_bytes(buf))
    }

    /// Weight in grams from the float32 register at 0x10.
    pub fn weight(&mut self) -> Result<f32, ScaleError> {
        let mut buf = [0u8; 4];
        self.read_reg(REG_WEIGHT_F32, &mut buf)?;
        Ok(f32::from_le_bytes(buf))
    }

    /// Weight in grams from the grams-x-100 integer register at 0x60.
    ///
    /// Deliberately a separate path from [`Self::weight`] so callers can
    /// cross-check the two encodings.
    pub fn weight_x100(&mut self) -> Result<f32, ScaleError> {
        let mut buf = [0u8; 4];
        self.read_reg(REG_WEIGHT_X100_I32, &mut buf)?;
        Ok(i32::from_le_bytes(buf) as f32 / 100.0)
    }

    /// True while the unit's button is held. The register reads 0 for
    /// pressed and nonzero for not pressed.
    pub fn button_pressed(&mut self) -> Result<bool, ScaleError> {
        let mut buf = [0u8; 1];
        self.read_reg(REG_BUTTON, &mut buf)?;
        Ok(buf[0] == 0)
    }

    /// Resets the zero-load offset. The device settles its new baseline
    /// asynchronously and offers no acknowledgement; allow a short settle
    /// delay before trusting subsequent reads.
    pub fn tare(&mut self) -> Result<(), ScaleError> {
        self.write_reg(REG_OFFSET_TARE, &[1])
    }

    /// GAP calibration constant (ADC counts per gram).
    pub fn gap(&mut self) -> Result<f32, ScaleError> {
        let mut buf = [0u8; 4];
        self.read_reg(REG_GAP_F32, &mut buf)?;
        Ok(f32::from_le_bytes(buf))
    }

    pub fn set_gap(&mut self, gap: f32) -> Result<(), ScaleError> {
        self.write_reg(REG_GAP_F32, &gap.to_le_bytes())
    }

    pub fn filters(&mut self) -> Result<FilterConfig, ScaleError> {
        let mut buf = [0u8; 3];
        self.read_reg(REG_FILTERS, &mut buf)?;
        Ok(FilterConfig::from_bytes(buf))
    }

    /// Read-modify-write of the filter block: fields absent from `update`
    /// are written back exactly as the device reported them.
    pub fn set_filters(&mut self, update: FilterUpdate) -> Result<(), ScaleError> {
        let mut current = [0u8; 3];
        self.read_reg(REG_FILTERS, &mut current)?;
        self.write_reg(REG_FILTERS, &update.apply(current))
    }

    pub fn led(&mut self) -> Result<(u8, u8, u8), ScaleError> {
        let mut buf = [0u8; 3];
        self.read_reg(REG_LED_RGB, &mut buf)?;
        Ok((buf[0], buf[1], buf[2]))
    }

    pub fn set_led(&mut self, r: u8, g: u8, b: u8) -> Result<(), ScaleError> {
        self.write_reg(REG_LED_RGB, &[r, g, b])
    }

    /// The unit's own rendering of the current weight, NUL-terminated.
    pub fn display_text(&mut self) -> Result<String, ScaleError> {
        let mut buf = [0u8; 16];
        self.read_reg(REG_WEIGHT_STR, &mut buf)?;
        let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
        Ok(String::from_utf8_lossy(&buf[..end]).into_owned())
    }

    pub fn firmware_version(&mut self) -> Result<u8, ScaleError> {
        let mut buf = [0u8; 1];
        self.read_reg(REG_FW_VERSION, &mut buf)?;
        Ok(buf[0])
    }

    pub fn i2c_address(&mut self) -> Result<u8, ScaleError> {
        let mut buf = [0u8; 1];
        self.read_reg(REG_I2C_ADDRESS, &mut buf)?;
        Ok(buf[0])
    }

    /// Moves the device to a new bus address and rebinds this handle to it.
    /// The device stops responding at the old address as soon as the write
    /// lands, so the rebind happens before returning.
    pub fn set_i2c_address(&mut self, new_addr: u8) -> Result<u8, ScaleError> {
        let new_addr = new_addr & 0x7F;
        self.write_reg(REG_I2C_ADDRESS, &[new_addr])?;
        self.addr = new_addr;
        Ok(new_addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scale::registers::DEFAULT_ADDR;
    use embedded_hal::i2c::ErrorKind;
    use embedded_hal_mock::eh1::i2c::{Mock, Transaction};

    fn scale_with(expectations: &[Transaction]) -> MiniScale<Mock> {
        MiniScale::new(Mock::new(expectations), DEFAULT_ADDR)
    }

    #[test]
    fn weight_decodes_le_float32() {
        let expectations = [Transaction::write_read(
            DEFAULT_ADDR,
            vec![REG_WEIGHT_F32],
            25.0f32.to_le_bytes().to_vec(),
        )];
        let mut scale = scale_with(&expectations);
        assert_eq!(scale.weight().unwrap(), 25.0);
        scale.release().done();
    }

    #[test]
    fn weight_x100_decodes_le_int32_and_scales() {
        let expectations = [Transaction::write_read(
            DEFAULT_ADDR,
            vec![REG_WEIGHT_X100_I32],
            2500i32.to_le_bytes().to_vec(),
        )];
        let mut scale = scale_with(&expectations);
        assert_eq!(scale.weight_x100().unwrap(), 25.0);
        scale.release().done();
    }

    #[test]
    fn raw_adc_is_signed() {
        let expectations = [Transaction::write_read(
            DEFAULT_ADDR,
            vec![REG_RAW_ADC],
            (-9_136_487i32).to_le_bytes().to_vec(),
        )];
        let mut scale = scale_with(&expectations);
        assert_eq!(scale.raw_adc().unwrap(), -9_136_487);
        scale.release().done();
    }

    #[test]
    fn button_logic_is_inverted() {
        for (raw, pressed) in [(0u8, true), (1u8, false), (7u8, false)] {
            let expectations = [Transaction::write_read(
                DEFAULT_ADDR,
                vec![REG_BUTTON],
                vec![raw],
            )];
            let mut scale = scale_with(&expectations);
            assert_eq!(scale.button_pressed().unwrap(), pressed, "raw byte {raw}");
            scale.release().done();
        }
    }

    #[test]
    fn tare_writes_sentinel() {
        let expectations = [Transaction::write(DEFAULT_ADDR, vec![REG_OFFSET_TARE, 1])];
        let mut scale = scale_with(&expectations);
        scale.tare().unwrap();
        scale.release().done();
    }

    #[test]
    fn partial_filter_update_preserves_other_fields() {
        let expectations = [
            Transaction::write_read(DEFAULT_ADDR, vec![REG_FILTERS], vec![1, 10, 10]),
            Transaction::write(DEFAULT_ADDR, vec![REG_FILTERS, 1, 20, 10]),
        ];
        let mut scale = scale_with(&expectations);
        scale
            .set_filters(FilterUpdate {
                avg_level: Some(20),
                ..Default::default()
            })
            .unwrap();
        scale.release().done();
    }

    #[test]
    fn filter_update_overlay_is_pure() {
        let update = FilterUpdate {
            low_pass_enabled: Some(false),
            ema_alpha: Some(42),
            ..Default::default()
        };
        assert_eq!(update.apply([1, 10, 10]), [0, 10, 42]);
        assert_eq!(FilterUpdate::default().apply([1, 10, 10]), [1, 10, 10]);
    }

    #[test]
    fn gap_round_trips_as_le_float32() {
        let expectations = [
            Transaction::write(
                DEFAULT_ADDR,
                [&[REG_GAP_F32][..], &1.5f32.to_le_bytes()[..]].concat(),
            ),
            Transaction::write_read(DEFAULT_ADDR, vec![REG_GAP_F32], 1.5f32.to_le_bytes().to_vec()),
        ];
        let mut scale = scale_with(&expectations);
        scale.set_gap(1.5).unwrap();
        assert_eq!(scale.gap().unwrap(), 1.5);
        scale.release().done();
    }

    #[test]
    fn address_change_rebinds_handle() {
        let expectations = [
            Transaction::write(DEFAULT_ADDR, vec![REG_I2C_ADDRESS, 0x33]),
            Transaction::write_read(0x33, vec![REG_BUTTON], vec![0]),
        ];
        let mut scale = scale_with(&expectations);
        assert_eq!(scale.set_i2c_address(0x33).unwrap(), 0x33);
        assert_eq!(scale.address(), 0x33);
        // subsequent traffic goes to the new address
        assert!(scale.button_pressed().unwrap());
        scale.release().done();
    }

    #[test]
    fn display_text_stops_at_nul() {
        let mut raw = vec![0u8; 16];
        raw[..7].copy_from_slice(b"12.34 g");
        let expectations = [Transaction::write_read(
            DEFAULT_ADDR,
            vec![REG_WEIGHT_STR],
            raw,
        )];
        let mut scale = scale_with(&expectations);
        assert_eq!(scale.display_text().unwrap(), "12.34 g");
        scale.release().done();
    }

    #[test]
    fn bus_failure_surfaces_as_scale_error() {
        let expectations = [Transaction::write_read(
            DEFAULT_ADDR,
            vec![REG_WEIGHT_F32],
            vec![0, 0, 0, 0],
        )
        .with_error(ErrorKind::Other)];
        let mut scale = scale_with(&expectations);
        let err = scale.weight().unwrap_err();
        assert!(matches!(err, ScaleError::Bus { reg, .. } if reg == REG_WEIGHT_F32));
        scale.release().done();
    }
}
