//! The sampling loop and the button-tare monitor.
//!
//! One flow of control services two cadences: each top-level iteration
//! rotates the sink if the date changed, appends one sample, then polls the
//! button, and finally pauses for the sampling interval minus the button
//! poll period. Nothing else contends for the bus or the open file.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Local;
use embedded_hal::i2c::I2c;
use tokio::sync::watch;
use tokio::time::sleep;

use crate::scale::{MiniScale, ScaleError};
use crate::sink::{CsvSink, WeightSample};

/// Button poll period; also the re-poll pace while waiting for release.
pub const BUTTON_POLL: Duration = Duration::from_millis(50);
/// The tare register gives no acknowledgement; readings are not trusted
/// again until this much time has passed.
pub const TARE_SETTLE: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DebounceState {
    Armed,
    WaitRelease,
}

/// Turns raw button polls into at-most-one tare per physical press.
///
/// A tare fires only on a rising edge (not pressed -> pressed); a held
/// press never re-fires. With `wait_release` set, the machine stays
/// disarmed after firing until the button is observed released.
#[derive(Debug)]
pub struct TareDebounce {
    state: DebounceState,
    prev_pressed: bool,
    wait_release: bool,
}

impl TareDebounce {
    pub fn new(wait_release: bool) -> Self {
        Self {
            state: DebounceState::Armed,
            prev_pressed: false,
            wait_release,
        }
    }

    /// Feeds one poll result. Returns true when a tare should fire.
    pub fn observe(&mut self, pressed: bool) -> bool {
        match self.state {
            DebounceState::Armed => {
                let fire = pressed && !self.prev_pressed;
                self.prev_pressed = pressed;
                if fire && self.wait_release {
                    self.state = DebounceState::WaitRelease;
                }
                fire
            }
            DebounceState::WaitRelease => {
                if !pressed {
                    self.state = DebounceState::Armed;
                    self.prev_pressed = false;
                }
                false
            }
        }
    }

    /// True while a release must be observed before the next tare can arm.
    pub fn awaiting_release(&self) -> bool {
        self.state == DebounceState::WaitRelease
    }
}

/// Loop configuration, produced by the config/CLI layer.
#[derive(Debug, Clone)]
pub struct SamplerSettings {
    pub data_dir: PathBuf,
    /// Optional name tag mixed into the file name (sanitized by the sink).
    pub name_tag: String,
    pub interval: Duration,
    /// Multiplier applied to both weight encodings (-1.0 for inverted
    /// wiring).
    pub sign: f32,
    /// Echo each row to stdout.
    pub echo: bool,
    /// Require a release before accepting another button tare.
    pub wait_release: bool,
}

/// Owns the scale handle and the currently open log file for its entire
/// run; both are released on every exit path when the sampler drops.
pub struct Sampler<I2C> {
    scale: MiniScale<I2C>,
    settings: SamplerSettings,
    stop: watch::Receiver<bool>,
    debounce: TareDebounce,
}

fn today() -> String {
    Local::now().format("%Y-%m-%d").to_string()
}

impl<I2C: I2c> Sampler<I2C> {
    pub fn new(scale: MiniScale<I2C>, settings: SamplerSettings, stop: watch::Receiver<bool>) -> Self {
        let debounce = TareDebounce::new(settings.wait_release);
        Self {
            scale,
            settings,
            stop,
            debounce,
        }
    }

    fn stop_requested(&self) -> bool {
        *self.stop.borrow()
    }

    fn open_sink(&self, date: &str) -> Result<CsvSink> {
        CsvSink::open(&self.settings.data_dir, &self.settings.name_tag, date).with_context(|| {
            format!(
                "failed to open log file in {}",
                self.settings.data_dir.display()
            )
        })
    }

    /// Runs until the stop flag is raised. The flag is checked once per
    /// top-level iteration and inside the wait-for-release sub-loop; the
    /// inter-iteration pause itself is not interruptible.
    pub async fn run(mut self) -> Result<()> {
        let mut sink = self.open_sink(&today())?;
        tracing::info!("logging to {}", sink.path().display());

        let pause = self.settings.interval.saturating_sub(BUTTON_POLL);
        while !self.stop_requested() {
            // Rotation is a date-string comparison, so wall-clock jumps
            // just open whichever file matches the new date.
            let date = today();
            if date != sink.date() {
                sink = self.open_sink(&date)?;
                tracing::info!("rotated to new daily file {}", sink.path().display());
            }

            let sample = self.read_sample();
            sink.append(&sample).context("failed to append sample")?;
            if self.settings.echo {
                println!("{}", sample.csv_row());
            }

            self.service_button().await;
            sleep(pause).await;
        }

        tracing::info!("stop requested, logger exiting");
        Ok(())
    }

    /// Reads all three values for one row. Any bus failure degrades the
    /// whole row to sentinels; a failed tick never halts the loop and the
    /// next regular tick is the retry.
    fn read_sample(&mut self) -> WeightSample {
        let timestamp = Local::now();
        match self.read_weights() {
            Ok((weight_g, weight_x100_g, raw_adc)) => WeightSample {
                timestamp,
                weight_g: weight_g * self.settings.sign,
                weight_x100_g: weight_x100_g * self.settings.sign,
                raw_adc,
            },
            Err(err) => {
                tracing::warn!("sample read failed, writing sentinel row: {}", err);
                WeightSample {
                    timestamp,
                    weight_g: f32::NAN,
                    weight_x100_g: f32::NAN,
                    raw_adc: -1,
                }
            }
        }
    }

    fn read_weights(&mut self) -> Result<(f32, f32, i32), ScaleError> {
        let weight_g = self.scale.weight()?;
        let weight_x100_g = self.scale.weight_x100()?;
        let raw_adc = self.scale.raw_adc()?;
        Ok((weight_g, weight_x100_g, raw_adc))
    }

    /// One button service pass: poll, debounce, maybe tare.
    ///
    /// A failed button read counts as "not pressed" so an ambiguous poll
    /// can never trigger a tare.
    async fn service_button(&mut self) {
        let pressed = self.scale.button_pressed().unwrap_or(false);
        if !self.debounce.observe(pressed) {
            return;
        }

        tracing::info!("button press detected, taring");
        if let Err(err) = self.scale.tare() {
            tracing::warn!("button tare failed: {}", err);
        }
        sleep(TARE_SETTLE).await;

        // Re-arm only once the button is seen released. Unlike the fixed
        // inter-tick pause this wait is open-ended, so it also honors the
        // stop flag.
        while self.debounce.awaiting_release() && !self.stop_requested() {
            match self.scale.button_pressed() {
                Ok(pressed) => {
                    self.debounce.observe(pressed);
                }
                // Stay disarmed on a failed poll; a later clean "released"
                // read re-arms.
                Err(_) => break,
            }
            if self.debounce.awaiting_release() {
                sleep(BUTTON_POLL).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scale::registers::{
        DEFAULT_ADDR, REG_RAW_ADC, REG_WEIGHT_F32, REG_WEIGHT_X100_I32,
    };
    use embedded_hal::i2c::ErrorKind;
    use embedded_hal_mock::eh1::i2c::{Mock, Transaction};

    #[test]
    fn held_press_fires_once_then_rearms_on_release() {
        let mut debounce = TareDebounce::new(true);
        let fires: Vec<bool> = [true, true, true, false]
            .into_iter()
            .map(|pressed| debounce.observe(pressed))
            .collect();
        assert_eq!(fires, vec![true, false, false, false]);
        // released and pressed again: a second tare is allowed
        assert!(debounce.observe(true));
    }

    #[test]
    fn without_wait_release_edge_detection_still_debounces() {
        let mut debounce = TareDebounce::new(false);
        assert!(debounce.observe(true));
        assert!(!debounce.observe(true));
        assert!(!debounce.observe(false));
        assert!(debounce.observe(true));
    }

    #[test]
    fn release_must_be_observed_before_rearming() {
        let mut debounce = TareDebounce::new(true);
        assert!(debounce.observe(true));
        assert!(debounce.awaiting_release());
        debounce.observe(true);
        assert!(debounce.awaiting_release());
        debounce.observe(false);
        assert!(!debounce.awaiting_release());
    }

    fn test_sampler(i2c: Mock, sign: f32) -> Sampler<Mock> {
        let (_tx, rx) = watch::channel(false);
        Sampler::new(
            MiniScale::new(i2c, DEFAULT_ADDR),
            SamplerSettings {
                data_dir: PathBuf::from("."),
                name_tag: String::new(),
                interval: Duration::from_secs(1),
                sign,
                echo: false,
                wait_release: true,
            },
            rx,
        )
    }

    #[test]
    fn tick_applies_sign_to_both_weights() {
        let expectations = [
            Transaction::write_read(
                DEFAULT_ADDR,
                vec![REG_WEIGHT_F32],
                25.0f32.to_le_bytes().to_vec(),
            ),
            Transaction::write_read(
                DEFAULT_ADDR,
                vec![REG_WEIGHT_X100_I32],
                2500i32.to_le_bytes().to_vec(),
            ),
            Transaction::write_read(DEFAULT_ADDR, vec![REG_RAW_ADC], 1234i32.to_le_bytes().to_vec()),
        ];
        let mut sampler = test_sampler(Mock::new(&expectations), -1.0);

        let sample = sampler.read_sample();
        assert_eq!(sample.weight_g, -25.0);
        assert_eq!(sample.weight_x100_g, -25.0);
        assert_eq!(sample.raw_adc, 1234);
        sampler.scale.release().done();
    }

    #[test]
    fn failed_read_degrades_to_sentinels() {
        let expectations = [Transaction::write_read(
            DEFAULT_ADDR,
            vec![REG_WEIGHT_F32],
            vec![0, 0, 0, 0],
        )
        .with_error(ErrorKind::Other)];
        let mut sampler = test_sampler(Mock::new(&expectations), 1.0);

        let sample = sampler.read_sample();
        assert!(sample.weight_g.is_nan());
        assert!(sample.weight_x100_g.is_nan());
        assert_eq!(sample.raw_adc, -1);
        sampler.scale.release().done();
    }
}
