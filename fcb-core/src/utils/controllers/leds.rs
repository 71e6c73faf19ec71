//! LED array control.
//!
//! Drives the 8x8 addressable array through `SmartLedsWrite`. The pattern is
//! fixed (the centre 4x4 block white, the rest dark); only the global brightness
//! changes.

use smart_leds::brightness;
use smart_leds_trait::{SmartLedsWrite, RGB8};

/// Number of LEDs in the array.
pub const LED_COUNT: usize = 64;
const GRID: usize = 8;

const WHITE: RGB8 = RGB8 {
    r: 255,
    g: 255,
    b: 255,
};
const BLACK: RGB8 = RGB8 { r: 0, g: 0, b: 0 };

/// The centre 4x4 block lit, everything else dark.
pub fn centre_pattern() -> [RGB8; LED_COUNT] {
    let mut pattern = [BLACK; LED_COUNT];
    for row in 2..6 {
        for col in 2..6 {
            pattern[row * GRID + col] = WHITE;
        }
    }
    pattern
}

/// Addressable LED array with a fixed pattern.
pub struct LightArray<Driver> {
    driver: Driver,
    pattern: [RGB8; LED_COUNT],
}

impl<Driver, E> LightArray<Driver>
where
    Driver: SmartLedsWrite<Color = RGB8, Error = E>,
{
    /// Create a `LightArray` over the given LED driver. Nothing is written yet.
    pub fn new(driver: Driver) -> Self {
        Self {
            driver,
            pattern: centre_pattern(),
        }
    }

    pub fn driver(&self) -> &Driver {
        &self.driver
    }

    /// Render the pattern scaled to `level` (255 is full brightness).
    pub fn show(
        &mut self,
        level: u8,
    ) -> Result<(), E> {
        self.driver
            .write(brightness(self.pattern.iter().copied(), level))
    }

    /// Render every LED dark.
    pub fn blank(&mut self) -> Result<(), E> {
        self.show(0)
    }
}
