//! Interactive sanity check and GAP calibration for the MiniScale.
//!
//! Prints identity and filter state, tares, optionally performs a
//! two-point GAP calibration with a known weight, then streams 30 samples
//! from both weight encodings plus the raw ADC.

use std::io::{self, Write};
use std::thread::sleep;
use std::time::Duration;

use anyhow::{Context, Result};
use embedded_hal::i2c::I2c;
use linux_embedded_hal::I2cdev;

use miniscale_logger::scale::calibration::compute_gap;
use miniscale_logger::scale::registers::{DEFAULT_ADDR, DEFAULT_BUS};
use miniscale_logger::scale::MiniScale;

const SETTLE: Duration = Duration::from_millis(300);

fn prompt(text: &str) -> Result<String> {
    print!("{text}");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn read_row<I2C: I2c>(scale: &mut MiniScale<I2C>) -> Result<(f32, f32, i32)> {
    Ok((scale.weight()?, scale.weight_x100()?, scale.raw_adc()?))
}

fn maybe_calibrate<I2C: I2c>(scale: &mut MiniScale<I2C>) -> Result<()> {
    let answer = prompt("Calibrate GAP with known weight? [y/N]: ")?;
    if !answer.eq_ignore_ascii_case("y") {
        return Ok(());
    }

    println!("Taring unit (reset offset)...");
    scale.tare()?;
    sleep(SETTLE);

    let adc_zero = scale.raw_adc()?;
    println!("adc @ 0 g : {adc_zero}");

    prompt("Place known weight on the scale, wait for it to stabilize, then press Enter...")?;
    let adc_loaded = scale.raw_adc()?;
    println!("adc @ weight: {adc_loaded}");

    let grams: f32 = prompt("Enter known weight in grams (e.g. 200): ")?
        .parse()
        .context("expected a number of grams")?;

    let gap = compute_gap(adc_zero, adc_loaded, grams)?;
    println!("Computed GAP = {gap:.6} (ADC counts per gram)");
    scale.set_gap(gap)?;
    println!("GAP readback = {:.6}", scale.gap()?);
    Ok(())
}

fn main() -> Result<()> {
    let device = format!("/dev/i2c-{DEFAULT_BUS}");
    let i2c = I2cdev::new(&device).with_context(|| format!("failed to open {device}"))?;
    let mut scale = MiniScale::new(i2c, DEFAULT_ADDR);

    println!("FW version: {}", scale.firmware_version()?);
    println!("Current I2C addr: {:#04x}", scale.i2c_address()?);
    match scale.gap() {
        Ok(gap) => println!("Current GAP: {gap:.6}"),
        Err(err) => eprintln!("[WARN] could not read GAP: {err}"),
    }
    let filters = scale.filters()?;
    println!(
        "Filters -> low_pass={} avg_level={} ema_alpha={}",
        filters.low_pass_enabled, filters.avg_level, filters.ema_alpha
    );
    if let Ok(text) = scale.display_text() {
        println!("Display: {text}");
    }

    println!("Taring unit (reset offset)...");
    scale.tare()?;
    sleep(SETTLE);

    maybe_calibrate(&mut scale)?;

    println!("\nStreaming 30 samples:");
    for i in 0..30 {
        match read_row(&mut scale) {
            Ok((weight, weight_x100, adc)) => println!(
                "{i:02}: weight_f32={weight:9.3} g   weight_x100={weight_x100:9.3} g   raw_adc={adc}"
            ),
            Err(err) => println!("{i:02}: read error -> {err}"),
        }
        sleep(Duration::from_secs(1));
    }

    Ok(())
}
