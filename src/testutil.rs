//! Scripted peripherals for exercising the driver without hardware.

use core::convert::Infallible;
use core::future::Future;
use core::pin::pin;
use core::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

use embedded_hal_async::i2c::{ErrorKind, ErrorType, I2c, Operation, SevenBitAddress};
use heapless::{Deque, Vec};

use crate::config::Config;
use crate::power::PowerRail;
use crate::Zt7650;

/// Run a future to completion. The mock peripherals never return
/// `Poll::Pending`, so a bare polling loop is sufficient.
pub fn block_on<F: Future>(fut: F) -> F::Output {
  const VTABLE: RawWakerVTable = RawWakerVTable::new(|_| RawWaker::new(core::ptr::null(), &VTABLE), |_| {}, |_| {}, |_| {});
  let raw = RawWaker::new(core::ptr::null(), &VTABLE);
  let waker = unsafe { Waker::from_raw(raw) };
  let mut cx = Context::from_waker(&waker);
  let mut fut = pin!(fut);
  loop {
    if let Poll::Ready(out) = fut.as_mut().poll(&mut cx) {
      return out;
    }
  }
}

#[derive(Debug)]
pub struct MockBusError;

impl embedded_hal_async::i2c::Error for MockBusError {
  fn kind(&self) -> ErrorKind {
    ErrorKind::Other
  }
}

#[derive(Debug)]
enum Step {
  Write(Vec<u8, 72>),
  WriteFail,
  Read(Vec<u8, 128>),
  ReadFail,
}

/// I²C bus that checks every transaction against a pre-recorded script.
#[derive(Debug, Default)]
pub struct ScriptI2c {
  script: Deque<Step, 512>,
}

impl ScriptI2c {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn expect_write(&mut self, bytes: &[u8]) {
    self.script.push_back(Step::Write(Vec::from_slice(bytes).unwrap())).unwrap();
  }

  pub fn expect_write_fail(&mut self) {
    self.script.push_back(Step::WriteFail).unwrap();
  }

  pub fn expect_read(&mut self, bytes: &[u8]) {
    self.script.push_back(Step::Read(Vec::from_slice(bytes).unwrap())).unwrap();
  }

  pub fn expect_read_fail(&mut self) {
    self.script.push_back(Step::ReadFail).unwrap();
  }

  pub fn done(&self) -> bool {
    self.script.is_empty()
  }
}

impl ErrorType for ScriptI2c {
  type Error = MockBusError;
}

impl I2c<SevenBitAddress> for ScriptI2c {
  async fn transaction(&mut self, _address: SevenBitAddress, operations: &mut [Operation<'_>]) -> Result<(), MockBusError> {
    for op in operations {
      let step = self.script.pop_front().expect("unexpected bus transaction");
      match (op, step) {
        (Operation::Write(bytes), Step::Write(expected)) => {
          assert_eq!(*bytes, &expected[..], "unexpected write payload");
        }
        (Operation::Write(_), Step::WriteFail) => return Err(MockBusError),
        (Operation::Read(buf), Step::Read(data)) => {
          assert_eq!(buf.len(), data.len(), "read length mismatch");
          buf.copy_from_slice(&data);
        }
        (Operation::Read(_), Step::ReadFail) => return Err(MockBusError),
        (op, step) => panic!("script mismatch: op {op:?} vs step {step:?}"),
      }
    }
    Ok(())
  }
}

/// Interrupt pin held at a fixed level; all waits resolve immediately.
#[derive(Debug)]
pub struct MockIntPin {
  pub low: bool,
}

impl Default for MockIntPin {
  fn default() -> Self {
    Self { low: true }
  }
}

impl embedded_hal::digital::ErrorType for MockIntPin {
  type Error = Infallible;
}

impl embedded_hal::digital::InputPin for MockIntPin {
  fn is_high(&mut self) -> Result<bool, Infallible> {
    Ok(!self.low)
  }

  fn is_low(&mut self) -> Result<bool, Infallible> {
    Ok(self.low)
  }
}

impl embedded_hal_async::digital::Wait for MockIntPin {
  async fn wait_for_high(&mut self) -> Result<(), Infallible> {
    Ok(())
  }

  async fn wait_for_low(&mut self) -> Result<(), Infallible> {
    Ok(())
  }

  async fn wait_for_rising_edge(&mut self) -> Result<(), Infallible> {
    Ok(())
  }

  async fn wait_for_falling_edge(&mut self) -> Result<(), Infallible> {
    Ok(())
  }

  async fn wait_for_any_edge(&mut self) -> Result<(), Infallible> {
    Ok(())
  }
}

/// Power rail that records how often it was driven.
#[derive(Debug, Default)]
pub struct MockRail {
  pub on: bool,
  pub off_count: u32,
  pub on_count: u32,
}

impl PowerRail for MockRail {
  type Error = Infallible;

  async fn set(&mut self, on: bool) -> Result<(), Infallible> {
    self.on = on;
    if on {
      self.on_count += 1;
    } else {
      self.off_count += 1;
    }
    Ok(())
  }
}

/// Delay source that completes immediately and accumulates requested time.
#[derive(Debug, Default)]
pub struct MockDelay {
  pub total_ns: u64,
}

impl embedded_hal_async::delay::DelayNs for MockDelay {
  async fn delay_ns(&mut self, ns: u32) {
    self.total_ns += ns as u64;
  }
}

/// Script a clean power-on sequence: reset, then a valid boot checksum.
pub fn expect_clean_boot(i2c: &mut ScriptI2c) {
  i2c.expect_write(&[0x00, 0x00]); // soft reset
  i2c.expect_write(&[0x2C, 0x01]); // checksum select
  i2c.expect_read(&[0xAA, 0x55]);
}

/// Script the register traffic of `mini_init` with the default config.
pub fn expect_mini_init(i2c: &mut ScriptI2c) {
  i2c.expect_write(&[0x00, 0x00]); // soft reset
  i2c.expect_write(&[0x10, 0x00, 0x00, 0x00]); // touch mode: point
  i2c.expect_write(&[0x3E, 0x02, 0x00, 0x02]); // cover control: open
  i2c.expect_write(&[0x16, 0x01, 0x00, 0x00]); // optional setting
  for _ in 0..10 {
    i2c.expect_write(&[0x03, 0x00]); // drain int status
  }
  i2c.expect_write(&[0xF1, 0x00, 0xE8, 0x03]); // heartbeat interval
}

pub type TestDriver = Zt7650<ScriptI2c, MockIntPin, MockRail, MockDelay>;

pub fn test_driver(i2c: ScriptI2c) -> TestDriver {
  Zt7650::new(i2c, MockIntPin::default(), MockRail::default(), MockDelay::default(), Config::new(1080, 2316))
}

pub fn test_driver_with_config(i2c: ScriptI2c, config: Config) -> TestDriver {
  Zt7650::new(i2c, MockIntPin::default(), MockRail::default(), MockDelay::default(), config)
}

impl TestDriver {
  /// Mark the rail as up without running the power sequence.
  pub fn force_powered(&mut self) {
    self.powered = true;
  }

  pub fn i2c_script_done(&self) -> bool {
    self.i2c.done()
  }

  pub fn int_pin_mut(&mut self) -> &mut MockIntPin {
    &mut self.int
  }

  pub fn rail(&self) -> &MockRail {
    &self.power
  }

  pub fn delay_total_ns(&self) -> u64 {
    self.delay.total_ns
  }
}
