// PCA9685 16-channel PWM controller (Adafruit servo HAT) over I2C
//
// Each channel has a 12-bit ON/OFF counter pair; one PWM period is 4096 ticks.
// Register writes: [register, data...], auto-increment lets a whole channel
// (ON_L, ON_H, OFF_L, OFF_H) go out in one block write.

use rppal::i2c::I2c;
use std::thread::sleep;
use std::time::Duration;
use tracing::debug;

/// Internal oscillator frequency
pub const OSCILLATOR_HZ: f64 = 25_000_000.0;

/// Number of PWM channels on the chip
pub const CHANNEL_COUNT: u8 = 16;

/// Counter resolution (ticks per PWM period)
const TICKS_PER_PERIOD: f64 = 4096.0;
const MAX_TICK: u16 = 4095;

/// Oscillator start-up time after clearing SLEEP
const WAKE_DELAY: Duration = Duration::from_millis(5);

/// Register addresses
#[repr(u8)]
#[derive(Debug, Clone, Copy)]
pub enum Register {
    Mode1 = 0x00,
    Mode2 = 0x01,
    Led0OnL = 0x06, // channel n starts at 0x06 + 4n
    PreScale = 0xFE,
}

/// MODE1 bits
const MODE1_RESTART: u8 = 0x80;
const MODE1_AUTO_INCREMENT: u8 = 0x20;
const MODE1_SLEEP: u8 = 0x10;
const MODE1_ALLCALL: u8 = 0x01;

/// MODE2 bits
const MODE2_OUTDRV: u8 = 0x04; // totem-pole outputs

/// Error types for PCA9685 communication
#[derive(Debug, thiserror::Error)]
pub enum Pca9685Error {
    #[error("I2C error: {0}")]
    I2c(#[from] rppal::i2c::Error),

    #[error("Invalid PWM channel {channel} (expected 0..{max})", max = CHANNEL_COUNT)]
    InvalidChannel { channel: u8 },

    #[error("Invalid PWM frequency {0} Hz")]
    InvalidFrequency(f64),
}

pub type Result<T> = std::result::Result<T, Pca9685Error>;

/// PCA9685 on an I2C bus
pub struct Pca9685 {
    i2c: I2c,
    freq_hz: f64,
}

impl Pca9685 {
    /// Open the chip on `bus` at `address`, reset it and set the PWM frequency
    pub fn open(bus: u8, address: u16, freq_hz: f64) -> Result<Self> {
        let mut i2c = I2c::with_bus(bus)?;
        i2c.set_slave_address(address)?;

        let mut chip = Self { i2c, freq_hz };
        chip.reset()?;
        chip.set_pwm_freq(freq_hz)?;
        Ok(chip)
    }

    fn write_u8(&mut self, register: Register, value: u8) -> Result<()> {
        debug!("PCA9685 write reg={:?}, value=0x{:02X}", register, value);
        self.i2c.smbus_write_byte(register as u8, value)?;
        Ok(())
    }

    fn read_u8(&mut self, register: Register) -> Result<u8> {
        Ok(self.i2c.smbus_read_byte(register as u8)?)
    }

    /// Put the outputs in totem-pole mode and wake the oscillator
    pub fn reset(&mut self) -> Result<()> {
        self.write_u8(Register::Mode2, MODE2_OUTDRV)?;
        self.write_u8(Register::Mode1, MODE1_ALLCALL)?;
        sleep(WAKE_DELAY);
        Ok(())
    }

    /// Set the PWM frequency for all channels.
    /// The prescaler can only be written while the chip sleeps.
    pub fn set_pwm_freq(&mut self, freq_hz: f64) -> Result<()> {
        let prescale = prescale_for(freq_hz)?;

        let old_mode = self.read_u8(Register::Mode1)?;
        let sleep_mode = (old_mode & !MODE1_RESTART) | MODE1_SLEEP;
        self.write_u8(Register::Mode1, sleep_mode)?;
        self.write_u8(Register::PreScale, prescale)?;
        self.write_u8(Register::Mode1, old_mode)?;
        sleep(WAKE_DELAY);
        self.write_u8(Register::Mode1, old_mode | MODE1_RESTART | MODE1_AUTO_INCREMENT)?;

        debug!("PCA9685 frequency {} Hz (prescale {})", freq_hz, prescale);
        self.freq_hz = freq_hz;
        Ok(())
    }

    /// Write the ON/OFF tick counters of one channel
    pub fn set_pwm(&mut self, channel: u8, on: u16, off: u16) -> Result<()> {
        let register = channel_register(channel)?;
        let data = pwm_bytes(on, off);
        debug!("PCA9685 ch{}: on={}, off={}", channel, on, off);
        self.i2c.block_write(register, &data)?;
        Ok(())
    }

    /// Output a pulse of `us` microseconds on a channel
    pub fn set_pulse_us(&mut self, channel: u8, us: f64) -> Result<()> {
        let ticks = us_to_ticks(us, self.freq_hz);
        self.set_pwm(channel, 0, ticks)
    }
}

/// Prescaler value for a PWM frequency: round(osc / (4096 * f)) - 1, clamped to 3..=255
pub fn prescale_for(freq_hz: f64) -> Result<u8> {
    if !(freq_hz > 0.0 && freq_hz.is_finite()) {
        return Err(Pca9685Error::InvalidFrequency(freq_hz));
    }
    let prescale = (OSCILLATOR_HZ / (TICKS_PER_PERIOD * freq_hz)).round() - 1.0;
    Ok(prescale.clamp(3.0, 255.0) as u8)
}

/// Convert a pulse width in microseconds to a tick count at `freq_hz`
pub fn us_to_ticks(us: f64, freq_hz: f64) -> u16 {
    let ticks = (us * TICKS_PER_PERIOD * freq_hz / 1_000_000.0).round();
    ticks.clamp(0.0, MAX_TICK as f64) as u16
}

/// First register (LEDn_ON_L) of a channel
fn channel_register(channel: u8) -> Result<u8> {
    if channel >= CHANNEL_COUNT {
        return Err(Pca9685Error::InvalidChannel { channel });
    }
    Ok(Register::Led0OnL as u8 + 4 * channel)
}

/// ON_L, ON_H, OFF_L, OFF_H for one channel
fn pwm_bytes(on: u16, off: u16) -> [u8; 4] {
    let [on_l, on_h] = on.min(MAX_TICK).to_le_bytes();
    let [off_l, off_h] = off.min(MAX_TICK).to_le_bytes();
    [on_l, on_h, off_l, off_h]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prescale() {
        // 25 MHz / (4096 * 50 Hz) = 122.07 -> 122 - 1
        assert_eq!(prescale_for(50.0).unwrap(), 121);
        // 25 MHz / (4096 * 1000 Hz) = 6.10 -> 6 - 1
        assert_eq!(prescale_for(1000.0).unwrap(), 5);
        // Out-of-range frequencies clamp to the chip limits
        assert_eq!(prescale_for(1.0).unwrap(), 255);
        assert_eq!(prescale_for(10_000.0).unwrap(), 3);
    }

    #[test]
    fn test_prescale_rejects_bad_frequency() {
        assert!(matches!(prescale_for(0.0), Err(Pca9685Error::InvalidFrequency(_))));
        assert!(matches!(prescale_for(-50.0), Err(Pca9685Error::InvalidFrequency(_))));
        assert!(prescale_for(f64::NAN).is_err());
    }

    #[test]
    fn test_us_to_ticks() {
        // 20 ms period at 50 Hz: 1500 us = 7.5% of 4096
        assert_eq!(us_to_ticks(1500.0, 50.0), 307);
        assert_eq!(us_to_ticks(500.0, 50.0), 102);
        assert_eq!(us_to_ticks(2500.0, 50.0), 512);
        assert_eq!(us_to_ticks(0.0, 50.0), 0);
        assert_eq!(us_to_ticks(-100.0, 50.0), 0);
        assert_eq!(us_to_ticks(1_000_000.0, 50.0), 4095);
    }

    #[test]
    fn test_channel_register() {
        assert_eq!(channel_register(0).unwrap(), 0x06);
        assert_eq!(channel_register(2).unwrap(), 0x0E);
        assert_eq!(channel_register(15).unwrap(), 0x42);
        assert!(matches!(
            channel_register(16),
            Err(Pca9685Error::InvalidChannel { channel: 16 })
        ));
    }

    #[test]
    fn test_pwm_bytes() {
        assert_eq!(pwm_bytes(0, 307), [0x00, 0x00, 0x33, 0x01]);
        assert_eq!(pwm_bytes(0, 0xFFFF), [0x00, 0x00, 0xFF, 0x0F]);
    }
}
