use embedded_hal_mock::eh1::digital::{Mock as PinMock, State as PinState, Transaction as PinTrans};
use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction as I2cTrans};
use fcb_core::utils::controllers::{
    config::DAC_ADDRESS,
    pressure::{DeviceError, PressureDac},
    solenoid::ShiftRegister,
    state::{PressureState, SolenoidMask},
};

/// Create a write transaction for the given I2C address and data payload.
pub fn write(
    addr: u8,
    data: Vec<u8>,
) -> I2cTrans {
    I2cTrans::write(addr, data)
}

fn set(high: bool) -> PinTrans {
    PinTrans::set(if high { PinState::High } else { PinState::Low })
}

/// Expected pin traffic for one latched mask.
fn shift_out_expectations(bits: u8) -> (Vec<PinTrans>, Vec<PinTrans>, Vec<PinTrans>) {
    let data = (0..8).rev().map(|bit| set(bits & (1 << bit) != 0)).collect();
    let clock = (0..8).flat_map(|_| [set(true), set(false)]).collect();
    let latch = vec![set(false), set(true)];
    (data, clock, latch)
}

#[test]
fn test_dac_writes_high_byte_first() {
    let expectations = [
        write(DAC_ADDRESS, vec![0x08, 0x00]),
        write(DAC_ADDRESS, vec![0x0F, 0xFF]),
        write(DAC_ADDRESS, vec![0x00, 0x00]),
    ];

    let mut dac = PressureDac::new(I2cMock::new(&expectations), DAC_ADDRESS);
    dac.write_code(2048).unwrap();
    dac.write_code(4095).unwrap();
    dac.write_code(0).unwrap();
    dac.bus_mut().done();
}

#[test]
fn test_dac_rejects_codes_above_12_bits() {
    let mut dac = PressureDac::new(I2cMock::new(&[]), DAC_ADDRESS);
    assert!(matches!(dac.write_code(4096), Err(DeviceError::CodeOutOfRange(4096))));
    dac.bus_mut().done();
}

#[test]
fn test_dac_applies_recorded_pressure() {
    // 50 of 100 kPa is half scale; full scale clamps to 4095.
    let expectations = [
        write(DAC_ADDRESS, vec![0x08, 0x00]),
        write(DAC_ADDRESS, vec![0x0F, 0xFF]),
    ];
    let mut pressure = PressureState::new(100).unwrap();
    let mut dac = PressureDac::new(I2cMock::new(&expectations), DAC_ADDRESS);

    pressure.set_current(50).unwrap();
    assert_eq!(dac.apply(&pressure).unwrap(), 2048);
    pressure.set_current(100).unwrap();
    assert_eq!(dac.apply(&pressure).unwrap(), 4095);
    dac.bus_mut().done();
}

#[test]
fn test_shift_register_msb_first() {
    let (data, clock, latch) = shift_out_expectations(0b1000_0001);
    let mut register =
        ShiftRegister::new(PinMock::new(&data), PinMock::new(&clock), PinMock::new(&latch));

    register.write(SolenoidMask::from_bits(0b1000_0001)).unwrap();

    let (mut data, mut clock, mut latch) = register.release();
    data.done();
    clock.done();
    latch.done();
}

#[test]
fn test_shift_register_one_latch_per_write() {
    let (mut data, mut clock, mut latch) = shift_out_expectations(0xC3);
    let (second_data, second_clock, second_latch) = shift_out_expectations(0x00);
    data.extend(second_data);
    clock.extend(second_clock);
    latch.extend(second_latch);
    let mut register =
        ShiftRegister::new(PinMock::new(&data), PinMock::new(&clock), PinMock::new(&latch));

    register.write(SolenoidMask::from_bits(0xC3)).unwrap();
    register.write(SolenoidMask::from_bits(0x00)).unwrap();

    let (mut data, mut clock, mut latch) = register.release();
    data.done();
    clock.done();
    latch.done();
}
