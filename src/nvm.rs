//! Factory bookkeeping in the chip's user NVM (IUM) area.
//!
//! The IUM window is mapped behind a lock command; reads and writes go
//! through [`Zt7650::read_nvm`] / [`Zt7650::write_nvm`], which bracket the
//! access with the lock and the low-power state flag. A failed access
//! leaves the chip in an unknown state, so the driver recovers it with a
//! power cycle before surfacing the error.

use embedded_hal::digital::InputPin;
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::digital::Wait;
use embedded_hal_async::i2c::{I2c, SevenBitAddress};

use crate::power::{PowerRail, PowerTarget};
use crate::reg::{self, Reg, VCmd};
use crate::{Error, Zt7650};

/// Byte offset of the factory test result within the IUM area.
const NVM_OFFSET_FAC_RESULT: u8 = 0;
/// Byte offset of the disassemble counter.
const NVM_OFFSET_DISASSEMBLE_COUNT: u8 = 2;

/// Which factory test station recorded a result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OctaTest {
  Module,
  Assy,
}

/// Outcome of a factory test.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OctaResult {
  #[default]
  None,
  Fail,
  Pass,
}

impl OctaResult {
  fn from_code(code: u8) -> Self {
    match code & 0x03 {
      1 => OctaResult::Fail,
      2 => OctaResult::Pass,
      _ => OctaResult::None,
    }
  }

  fn code(self) -> u8 {
    match self {
      OctaResult::None => 0,
      OctaResult::Fail => 1,
      OctaResult::Pass => 2,
    }
  }
}

/// Factory test record, packed into one NVM byte.
///
/// Each station gets a 2-bit result and a 2-bit run counter that saturates
/// at three. An erased byte (0xFF) reads as an empty record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TestResult {
  pub assy_result: OctaResult,
  pub assy_count: u8,
  pub module_result: OctaResult,
  pub module_count: u8,
}

impl TestResult {
  fn unpack(byte: u8) -> Self {
    let byte = if byte == 0xFF { 0 } else { byte };
    Self {
      assy_count: byte & 0x03,
      assy_result: OctaResult::from_code(byte >> 2),
      module_count: (byte >> 4) & 0x03,
      module_result: OctaResult::from_code(byte >> 6),
    }
  }

  fn pack(self) -> u8 {
    (self.assy_count & 0x03)
      | self.assy_result.code() << 2
      | (self.module_count & 0x03) << 4
      | self.module_result.code() << 6
  }

  fn record(&mut self, test: OctaTest, result: OctaResult) {
    match test {
      OctaTest::Assy => {
        self.assy_result = result;
        if self.assy_count < 3 {
          self.assy_count += 1;
        }
      }
      OctaTest::Module => {
        self.module_result = result;
        if self.module_count < 3 {
          self.module_count += 1;
        }
      }
    }
  }
}

impl<I, E, INT, P, D> Zt7650<I, INT, P, D>
where
  I: I2c<SevenBitAddress, Error = E>,
  INT: Wait + InputPin,
  P: PowerRail,
  D: DelayNs,
{
  /// Read from the IUM area at `offset`. At most one NVM sector is read;
  /// the hardware minimum transfer is two bytes.
  pub async fn read_nvm(&mut self, offset: u8, buf: &mut [u8]) -> Result<(), Error<E>> {
    self.esd_timer_stop();
    let result = self.read_nvm_inner(offset, buf).await;
    self.finish_nvm_access(result).await
  }

  async fn read_nvm_inner(&mut self, offset: u8, buf: &mut [u8]) -> Result<(), Error<E>> {
    self.write_reg16(Reg::PowerStateFlag, 0x0001).await?;
    self.delay.delay_ms(10).await;

    self.write_cmd(VCmd::IumLock).await?;
    self.delay.delay_ms(40).await;

    let len = buf.len().clamp(2, reg::TC_NVM_SECTOR_SZ);
    let mut sector = [0u8; reg::TC_NVM_SECTOR_SZ];
    self.read_data(reg::IUM_ADDR_OFFSET + offset as u16, &mut sector[..len]).await?;
    let n = buf.len().min(len);
    buf[..n].copy_from_slice(&sector[..n]);

    self.write_cmd(VCmd::IumUnlock).await?;
    self.write_reg16(Reg::PowerStateFlag, 0x0000).await?;
    self.delay.delay_ms(10).await;
    Ok(())
  }

  /// Write into the IUM area at `offset` and persist the sector.
  pub async fn write_nvm(&mut self, offset: u8, data: &[u8]) -> Result<(), Error<E>> {
    self.esd_timer_stop();
    let result = self.write_nvm_inner(offset, data).await;
    let result = match result {
      Err(e) => {
        // Leave write protection engaged before the recovery cycle.
        let _ = self.write_reg16(VCmd::NvmWriteEnable, 0x0000).await;
        self.delay.delay_ms(10).await;
        Err(e)
      }
      ok => ok,
    };
    self.finish_nvm_access(result).await
  }

  async fn write_nvm_inner(&mut self, offset: u8, data: &[u8]) -> Result<(), Error<E>> {
    self.write_reg16(Reg::PowerStateFlag, 0x0001).await?;
    self.delay.delay_ms(10).await;

    self.write_cmd(VCmd::IumLock).await?;

    let mut sector = [0u8; reg::TC_NVM_SECTOR_SZ];
    let len = data.len().min(reg::TC_NVM_SECTOR_SZ);
    sector[..len].copy_from_slice(&data[..len]);
    let len = len.max(2);
    self.write_data(reg::IUM_ADDR_OFFSET + offset as u16, &sector[..len]).await?;

    self.write_reg16(VCmd::NvmWriteEnable, 0x0001).await?;
    self.delay.delay_ms(10).await;
    self.write_cmd(VCmd::IumSave).await?;
    self.delay.delay_ms(30).await;
    self.write_reg16(VCmd::NvmWriteEnable, 0x0000).await?;
    self.delay.delay_ms(10).await;

    self.write_cmd(VCmd::IumUnlock).await?;
    self.write_reg16(Reg::PowerStateFlag, 0x0000).await?;
    self.delay.delay_ms(10).await;
    Ok(())
  }

  /// Re-arm the watchdog, recovering the chip first if the access failed.
  async fn finish_nvm_access(&mut self, result: Result<(), Error<E>>) -> Result<(), Error<E>> {
    if let Err(e) = result {
      self.power_control(PowerTarget::Off).await?;
      self.power_control(PowerTarget::OnSequence).await?;
      self.clear_report_state();
      self.mini_init().await?;
      return Err(e);
    }
    self.esd_timer_start();
    Ok(())
  }

  /// Factory test record stored in NVM.
  pub async fn test_result(&mut self) -> Result<TestResult, Error<E>> {
    let mut buf = [0u8; 2];
    self.read_nvm(NVM_OFFSET_FAC_RESULT, &mut buf).await?;
    Ok(TestResult::unpack(buf[0]))
  }

  /// Record the outcome of a factory test station and persist it.
  pub async fn set_test_result(&mut self, test: OctaTest, result: OctaResult) -> Result<TestResult, Error<E>> {
    let mut buf = [0u8; 2];
    self.read_nvm(NVM_OFFSET_FAC_RESULT, &mut buf).await?;
    let mut record = TestResult::unpack(buf[0]);
    record.record(test, result);
    self.write_nvm(NVM_OFFSET_FAC_RESULT, &[record.pack(), 0]).await?;
    Ok(record)
  }

  /// How often the panel has been detached from the device.
  pub async fn disassemble_count(&mut self) -> Result<u8, Error<E>> {
    let mut buf = [0u8; 2];
    self.read_nvm(NVM_OFFSET_DISASSEMBLE_COUNT, &mut buf).await?;
    Ok(if buf[0] == 0xFF { 0 } else { buf[0] })
  }

  /// Bump the disassemble counter, saturating below the erased value.
  pub async fn increment_disassemble_count(&mut self) -> Result<u8, Error<E>> {
    let mut count = self.disassemble_count().await?;
    if count < 0xFE {
      count += 1;
    }
    self.write_nvm(NVM_OFFSET_DISASSEMBLE_COUNT, &[count, 0]).await?;
    self.delay.delay_ms(5).await;
    Ok(count)
  }
}
