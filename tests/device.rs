use std::cell::RefCell;
use std::rc::Rc;

use embedded_hal::blocking::i2c::{Write, WriteRead};
use si5351_synth::{
    ClockOutput, CrystalLoad, DeviceError, DeviceStatusBits, Error, PllInput, RetunePolicy,
    Si5351, Si5351Device, PLL,
};

#[derive(Debug, PartialEq)]
struct BusError;

#[derive(Default)]
struct Bus {
    writes: Vec<Vec<u8>>,
    status: u8,
    fail: bool,
}

/// Records every write; reads return the status byte.
#[derive(Clone, Default)]
struct FakeI2c(Rc<RefCell<Bus>>);

impl FakeI2c {
    fn take_writes(&self) -> Vec<Vec<u8>> {
        std::mem::replace(&mut self.0.borrow_mut().writes, Vec::new())
    }
}

impl Write for FakeI2c {
    type Error = BusError;

    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), BusError> {
        let mut bus = self.0.borrow_mut();
        if bus.fail {
            return Err(BusError);
        }
        assert_eq!(address, 0x60);
        bus.writes.push(bytes.to_vec());
        Ok(())
    }
}

impl WriteRead for FakeI2c {
    type Error = BusError;

    fn write_read(&mut self, address: u8, bytes: &[u8], buffer: &mut [u8]) -> Result<(), BusError> {
        let bus = self.0.borrow();
        if bus.fail {
            return Err(BusError);
        }
        assert_eq!(address, 0x60);
        assert_eq!(bytes, &[0]);
        buffer[0] = bus.status;
        Ok(())
    }
}

fn device() -> (Si5351Device<FakeI2c>, FakeI2c) {
    let bus = FakeI2c::default();
    (Si5351Device::new_adafruit_module(bus.clone()), bus)
}

#[test]
fn init_powers_everything_down() {
    let (mut clock, bus) = device();
    clock.init(CrystalLoad::_10).unwrap();

    let mut expected = vec![vec![3, 0xFF]];
    for reg in 16..24 {
        expected.push(vec![reg, 0x80]);
    }
    expected.push(vec![183, 0xD2]);
    expected.push(vec![15, 0x00]);
    assert_eq!(bus.take_writes(), expected);
}

#[test]
fn device_status_is_parsed() {
    let (mut clock, bus) = device();
    bus.0.borrow_mut().status = 0b0110_0000;
    assert_eq!(
        clock.read_device_status().unwrap(),
        DeviceStatusBits::LOL_A | DeviceStatusBits::LOL_B
    );
}

#[test]
fn first_frequency_writes_pll_then_output() {
    let (mut clock, bus) = device();
    clock.set_frequency(ClockOutput::Clk0, 10_000_000, false).unwrap();

    assert_eq!(
        bus.take_writes(),
        vec![
            // PLL A, 36 * 25 MHz, integer
            vec![26, 0x00, 0x01, 0x00, 0x10, 0x00, 0x00, 0x00, 0x00],
            // CLK6 control carries FBA_INT
            vec![22, 0xCF],
            // MS0 divides by 90
            vec![42, 0x00, 0x01, 0x00, 0x2B, 0x00, 0x00, 0x00, 0x00],
            vec![16, 0x4F],
            vec![177, 0x20],
            vec![3, 0xFE],
        ]
    );
    assert_eq!(clock.get_vco_frequency(PLL::A), Some(90_000_000_000));
    assert_eq!(clock.get_vco_frequency(PLL::B), None);
}

#[test]
fn sibling_leaves_pll_alone() {
    let (mut clock, bus) = device();
    clock.set_frequency(ClockOutput::Clk0, 10_000_000, false).unwrap();
    bus.take_writes();

    clock.set_frequency(ClockOutput::Clk1, 3_000_000, false).unwrap();
    assert_eq!(
        bus.take_writes(),
        vec![
            vec![50, 0x00, 0x01, 0x00, 0x94, 0x00, 0x00, 0x00, 0x00],
            vec![17, 0x4F],
            vec![3, 0xFC],
        ]
    );
}

#[test]
fn strict_policy_refuses_without_touching_the_bus() {
    let bus = FakeI2c::default();
    let mut clock = Si5351Device::new(bus.clone(), false, 25_000_000).with_policy(RetunePolicy::Strict);
    clock.set_frequency(ClockOutput::Clk0, 1_000_000, false).unwrap();
    clock.set_frequency(ClockOutput::Clk1, 3_000_000, false).unwrap();
    bus.take_writes();

    assert_eq!(
        clock.set_frequency(ClockOutput::Clk1, 200_000_000, false),
        Err(DeviceError::Synth(Error::UnreachableWithCurrentPll))
    );
    assert!(bus.take_writes().is_empty());
}

#[test]
fn restricted_output_uses_shared_r_register() {
    let (mut clock, bus) = device();
    clock.set_frequency(ClockOutput::Clk7, 1_000_000, false).unwrap();

    let writes = bus.take_writes();
    assert!(writes.contains(&vec![91, 224]));
    assert!(writes.contains(&vec![92, 0x20]));
    assert_eq!(writes.last(), Some(&vec![3, 0x7F]));
}

#[test]
fn out_of_range_request_writes_nothing() {
    let (mut clock, bus) = device();
    assert_eq!(
        clock.set_frequency(ClockOutput::Clk0, 300_000_000, false),
        Err(DeviceError::Synth(Error::InvalidRange))
    );
    assert!(bus.take_writes().is_empty());
}

#[test]
fn bus_errors_are_passed_through() {
    let (mut clock, bus) = device();
    bus.0.borrow_mut().fail = true;

    assert_eq!(
        clock.set_frequency(ClockOutput::Clk0, 10_000_000, false),
        Err(DeviceError::CommunicationError(BusError))
    );
    assert_eq!(
        clock.read_device_status(),
        Err(DeviceError::CommunicationError(BusError))
    );
}

#[test]
fn correction_is_kept_per_input() {
    let (mut clock, bus) = device();
    assert_eq!(clock.get_correction(PllInput::Xtal), 0);

    clock.set_correction(-12_500, PllInput::Xtal).unwrap();
    assert_eq!(clock.get_correction(PllInput::Xtal), -12_500);
    assert_eq!(clock.get_correction(PllInput::Clkin), 0);
    // no PLL is tuned yet, so only the output enable mask goes out
    assert_eq!(bus.take_writes(), vec![vec![3, 0xFF]]);
}

#[test]
fn odd_restricted_ratio_is_never_written() {
    let (mut clock, bus) = device();
    clock.set_frequency(ClockOutput::Clk6, 10_000_000, false).unwrap();
    bus.take_writes();

    clock.set_frequency(ClockOutput::Clk7, 20_000_000, false).unwrap();
    let writes = bus.take_writes();
    assert!(writes.contains(&vec![91, 44]));
    assert!(writes.contains(&vec![90, 88]));
    assert!(writes.contains(&vec![177, 0x20]));
}

#[test]
fn phase_offsets() {
    let (mut clock, bus) = device();
    clock.set_phase(ClockOutput::Clk1, 0xFF).unwrap();
    assert_eq!(bus.take_writes(), vec![vec![166, 0x7F]]);

    assert_eq!(
        clock.set_phase(ClockOutput::Clk6, 10),
        Err(DeviceError::Synth(Error::InvalidParameter))
    );
}

#[test]
fn switching_pll_input_re_solves_without_reset() {
    let (mut clock, bus) = device();
    clock.set_frequency(ClockOutput::Clk0, 10_000_000, false).unwrap();
    clock.set_reference_frequency(10_000_000, PllInput::Clkin).unwrap();
    bus.take_writes();

    clock.set_pll_input(PLL::A, PllInput::Clkin).unwrap();
    let writes = bus.take_writes();
    assert_eq!(writes[0], vec![15, 0x04]);
    // 90 * 10 MHz
    assert_eq!(writes[1], vec![26, 0x00, 0x01, 0x00, 0x2B, 0x00, 0x00, 0x00, 0x00]);
    assert!(writes.iter().all(|w| w[0] != 177));
    assert_eq!(clock.get_vco_frequency(PLL::A), Some(90_000_000_000));
}

#[test]
fn moved_output_is_routed_from_pll_b() {
    let (mut clock, bus) = device();
    clock.select_clock_pll(ClockOutput::Clk2, PLL::B);
    clock.set_frequency(ClockOutput::Clk2, 2_000_000, false).unwrap();

    let writes = bus.take_writes();
    // PLL B block, then MS_SRC set on CLK2
    assert_eq!(writes[0][0], 34);
    assert!(writes.contains(&vec![18, 0x6F]));
    assert!(writes.contains(&vec![177, 0x80]));
}
