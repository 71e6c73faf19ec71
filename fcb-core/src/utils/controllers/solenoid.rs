//! Solenoid bank output through a 74HC595 shift register.
//!
//! The mask is clocked out MSB first (bit 7 = channel 8) and latched on the
//! rising edge of the storage clock after the eighth bit.

use embedded_hal::digital::OutputPin;

use super::state::SolenoidMask;

pub struct ShiftRegister<P> {
    data: P,
    clock: P,
    latch: P,
}

impl<P: OutputPin> ShiftRegister<P> {
    pub fn new(
        data: P,
        clock: P,
        latch: P,
    ) -> Self {
        Self { data, clock, latch }
    }

    /// Shift out and latch one mask.
    pub fn write(
        &mut self,
        mask: SolenoidMask,
    ) -> Result<(), P::Error> {
        let bits = mask.bits();
        self.latch.set_low()?;
        for bit in (0..8).rev() {
            if bits & (1 << bit) != 0 {
                self.data.set_high()?;
            } else {
                self.data.set_low()?;
            }
            self.clock.set_high()?;
            self.clock.set_low()?;
        }
        self.latch.set_high()?;
        tracing::info!(mask = bits, "solenoid mask latched");
        Ok(())
    }

    /// The pins as `(data, clock, latch)`.
    pub fn pins(&self) -> (&P, &P, &P) {
        (&self.data, &self.clock, &self.latch)
    }

    /// Give the pins back as `(data, clock, latch)`.
    pub fn release(self) -> (P, P, P) {
        (self.data, self.clock, self.latch)
    }
}
