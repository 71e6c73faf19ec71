//! Proportional valve output.
//!
//! The valve opening follows a 12-bit DAC on the I2C bus. Each write is two
//! bytes, high byte first.

use embedded_hal::i2c::I2c;

use super::state::PressureState;

/// Errors that can occur when driving the DAC.
#[derive(Debug)]
pub enum DeviceError<E: core::fmt::Debug> {
    /// The I2C transaction failed.
    Bus(E),
    /// The code does not fit in 12 bits.
    CodeOutOfRange(u16),
}

/// 12-bit DAC behind the proportional valve.
pub struct PressureDac<I2C> {
    i2c: I2C,
    address: u8,
}

impl<I2C, E> PressureDac<I2C>
where
    I2C: I2c<Error = E>,
    E: core::fmt::Debug,
{
    pub fn new(
        i2c: I2C,
        address: u8,
    ) -> Self {
        Self { i2c, address }
    }

    pub fn bus(&self) -> &I2C {
        &self.i2c
    }

    pub fn bus_mut(&mut self) -> &mut I2C {
        &mut self.i2c
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    /// Write a raw 12-bit code.
    pub fn write_code(
        &mut self,
        code: u16,
    ) -> Result<(), DeviceError<E>> {
        if code > PressureState::DAC_MAX_CODE {
            return Err(DeviceError::CodeOutOfRange(code));
        }
        let [high, low] = code.to_be_bytes();
        self.i2c
            .write(self.address, &[high, low])
            .map_err(DeviceError::Bus)?;
        tracing::info!(code, address = self.address, "DAC updated");
        Ok(())
    }

    /// Write the code matching the recorded pressure.
    pub fn apply(
        &mut self,
        pressure: &PressureState,
    ) -> Result<u16, DeviceError<E>> {
        let code = pressure.dac_code();
        self.write_code(code)?;
        Ok(code)
    }
}
