//! Register transport.
//!
//! Every access selects a 16-bit register by writing its address
//! little-endian, then (for reads) issues a separate read transaction after
//! a settle delay. A failed select is retried up to [`reg::I2C_RETRY_CNT`]
//! times with 1 ms between attempts; exhausting the retries counts one
//! communication error and surfaces the bus error to the caller.

use embedded_hal::digital::InputPin;
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::digital::Wait;
use embedded_hal_async::i2c::{I2c, SevenBitAddress};

use crate::power::PowerRail;
use crate::reg::{self, I2C_ADDR};
use crate::{Error, Zt7650};

/// Largest payload accepted by `write_data` (one NVM sector).
const MAX_WRITE_PAYLOAD: usize = reg::TC_NVM_SECTOR_SZ;

impl<I, E, INT, P, D> Zt7650<I, INT, P, D>
where
  I: I2c<SevenBitAddress, Error = E>,
  INT: Wait + InputPin,
  P: PowerRail,
  D: DelayNs,
{
  fn check_accessible(&self) -> Result<(), Error<E>> {
    if !self.powered {
      return Err(Error::PowerOff);
    }
    if self.secure {
      return Err(Error::Busy);
    }
    Ok(())
  }

  /// Select `reg` and read `buf.len()` bytes from it.
  pub(crate) async fn read_data(&mut self, reg: impl Into<u16>, buf: &mut [u8]) -> Result<(), Error<E>> {
    self.check_accessible()?;
    let addr = reg.into().to_le_bytes();

    let mut attempt = 0;
    loop {
      match self.i2c.write(I2C_ADDR, &addr).await {
        Ok(()) => break,
        Err(e) => {
          attempt += 1;
          if attempt >= reg::I2C_RETRY_CNT {
            self.comm_err_count += 1;
            return Err(Error::I2c(e));
          }
          self.delay.delay_ms(1).await;
        }
      }
    }

    self.delay.delay_us(reg::TRANSACTION_DELAY_US).await;

    if let Err(e) = self.i2c.read(I2C_ADDR, buf).await {
      self.comm_err_count += 1;
      return Err(Error::I2c(e));
    }

    self.delay.delay_us(reg::POST_TRANSACTION_DELAY_US).await;
    Ok(())
  }

  pub(crate) async fn read_u16(&mut self, reg: impl Into<u16>) -> Result<u16, Error<E>> {
    let mut buf = [0u8; 2];
    self.read_data(reg, &mut buf).await?;
    Ok(u16::from_le_bytes(buf))
  }

  /// Write `data` to `reg` in a single transaction.
  pub(crate) async fn write_data(&mut self, reg: impl Into<u16>, data: &[u8]) -> Result<(), Error<E>> {
    self.check_accessible()?;
    debug_assert!(data.len() <= MAX_WRITE_PAYLOAD);

    let addr = reg.into().to_le_bytes();
    let mut pkt = [0u8; MAX_WRITE_PAYLOAD + 2];
    pkt[..2].copy_from_slice(&addr);
    let len = data.len().min(MAX_WRITE_PAYLOAD);
    pkt[2..2 + len].copy_from_slice(&data[..len]);

    let mut attempt = 0;
    loop {
      match self.i2c.write(I2C_ADDR, &pkt[..2 + len]).await {
        Ok(()) => break,
        Err(e) => {
          attempt += 1;
          if attempt >= reg::I2C_RETRY_CNT {
            self.comm_err_count += 1;
            return Err(Error::I2c(e));
          }
          self.delay.delay_ms(1).await;
        }
      }
    }

    self.delay.delay_us(reg::POST_TRANSACTION_DELAY_US).await;
    Ok(())
  }

  pub(crate) async fn write_reg16(&mut self, reg: impl Into<u16>, value: u16) -> Result<(), Error<E>> {
    self.write_data(reg, &value.to_le_bytes()).await
  }

  /// Issue a command register: a bare 2-byte select with no payload.
  pub(crate) async fn write_cmd(&mut self, reg: impl Into<u16>) -> Result<(), Error<E>> {
    self.check_accessible()?;
    let addr = reg.into().to_le_bytes();

    let mut attempt = 0;
    loop {
      match self.i2c.write(I2C_ADDR, &addr).await {
        Ok(()) => break,
        Err(e) => {
          attempt += 1;
          if attempt >= reg::I2C_RETRY_CNT {
            self.comm_err_count += 1;
            return Err(Error::I2c(e));
          }
          self.delay.delay_ms(1).await;
        }
      }
    }

    self.delay.delay_us(reg::POST_TRANSACTION_DELAY_US).await;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use crate::reg::Reg;
  use crate::testutil::*;
  use crate::Error;

  #[test]
  fn read_selects_then_reads() {
    let mut i2c = ScriptI2c::new();
    i2c.expect_write(&[0x2C, 0x01]); // ChecksumResult, little-endian
    i2c.expect_read(&[0xAA, 0x55]);
    let mut dev = test_driver(i2c);
    dev.force_powered();

    let value = block_on(dev.read_u16(Reg::ChecksumResult)).unwrap();
    assert_eq!(value, 0x55AA);
    assert_eq!(dev.comm_err_count(), 0);
  }

  #[test]
  fn select_retries_are_bounded() {
    let mut i2c = ScriptI2c::new();
    for _ in 0..8 {
      i2c.expect_write_fail();
    }
    let mut dev = test_driver(i2c);
    dev.force_powered();

    let mut buf = [0u8; 2];
    let err = block_on(dev.read_data(Reg::FirmwareVersion, &mut buf));
    assert!(matches!(err, Err(Error::I2c(_))));
    assert_eq!(dev.comm_err_count(), 1);
    assert!(dev.i2c_script_done());
  }

  #[test]
  fn transient_select_failure_recovers() {
    let mut i2c = ScriptI2c::new();
    i2c.expect_write_fail();
    i2c.expect_write_fail();
    i2c.expect_write(&[0x12, 0x00]);
    i2c.expect_read(&[0x34, 0x12]);
    let mut dev = test_driver(i2c);
    dev.force_powered();

    let value = block_on(dev.read_u16(Reg::FirmwareVersion)).unwrap();
    assert_eq!(value, 0x1234);
    assert_eq!(dev.comm_err_count(), 0);
  }

  #[test]
  fn failed_read_counts_one_comm_error() {
    let mut i2c = ScriptI2c::new();
    i2c.expect_write(&[0x12, 0x00]);
    i2c.expect_read_fail();
    let mut dev = test_driver(i2c);
    dev.force_powered();

    let err = block_on(dev.read_u16(Reg::FirmwareVersion));
    assert!(matches!(err, Err(Error::I2c(_))));
    assert_eq!(dev.comm_err_count(), 1);
  }

  #[test]
  fn access_rejected_while_powered_off() {
    let mut dev = test_driver(ScriptI2c::new());
    let err = block_on(dev.read_u16(Reg::FirmwareVersion));
    assert!(matches!(err, Err(Error::PowerOff)));
  }

  #[test]
  fn access_rejected_in_secure_mode() {
    let mut dev = test_driver(ScriptI2c::new());
    dev.force_powered();
    dev.set_secure_mode(true);
    let err = block_on(dev.write_cmd(Reg::ClearIntStatus));
    assert!(matches!(err, Err(Error::Busy)));
  }

  #[test]
  fn write_data_prefixes_register_address() {
    let mut i2c = ScriptI2c::new();
    i2c.expect_write(&[0x16, 0x01, 0x05, 0x00]); // OptionalSetting + 0x0005 LE
    let mut dev = test_driver(i2c);
    dev.force_powered();

    block_on(dev.write_reg16(Reg::OptionalSetting, 0x0005)).unwrap();
    assert!(dev.i2c_script_done());
  }

  #[test]
  fn write_cmd_is_bare_select() {
    let mut i2c = ScriptI2c::new();
    i2c.expect_write(&[0x03, 0x00]);
    let mut dev = test_driver(i2c);
    dev.force_powered();

    block_on(dev.write_cmd(Reg::ClearIntStatus)).unwrap();
    assert!(dev.i2c_script_done());
  }
}
