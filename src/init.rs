//! Bring-up: capability query, reporting-mode setup, hardware calibration.

use embedded_hal::digital::InputPin;
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::digital::Wait;
use embedded_hal_async::i2c::{I2c, SevenBitAddress};

use crate::config::{CoverType, COVER_OPEN};
use crate::power::PowerRail;
use crate::reg::{self, Reg, VCmd};
use crate::state::WorkState;
use crate::{Error, Zt7650};

/// Identification and geometry read back from the chip during bring-up.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Capability {
  pub vendor_id: u16,
  pub ic_revision: u16,
  pub fw_version: u16,
  pub fw_minor_version: u16,
  pub reg_data_version: u16,
  pub hw_id: u16,
  pub x_node_num: u16,
  pub y_node_num: u16,
}

impl Capability {
  pub fn total_node_num(&self) -> u32 {
    self.x_node_num as u32 * self.y_node_num as u32
  }
}

impl<I, E, INT, P, D> Zt7650<I, INT, P, D>
where
  I: I2c<SevenBitAddress, Error = E>,
  INT: Wait + InputPin,
  P: PowerRail,
  D: DelayNs,
{
  /// Populate [`Capability`] from the chip's identification block.
  pub(crate) async fn read_capability(&mut self) -> Result<(), Error<E>> {
    self.capability.vendor_id = self.read_u16(Reg::VendorId).await?;
    self.capability.fw_minor_version = self.read_u16(Reg::MinorFwVersion).await?;

    let mut revision = [0u8; 8];
    self.read_data(Reg::ChipRevision, &mut revision).await?;
    self.capability.ic_revision = u16::from_le_bytes([revision[0], revision[1]]);
    self.capability.fw_version = u16::from_le_bytes([revision[2], revision[3]]);
    self.capability.reg_data_version = u16::from_le_bytes([revision[4], revision[5]]);
    self.capability.hw_id = u16::from_le_bytes([revision[6], revision[7]]);

    // Y node count sits first; the two registers are adjacent.
    let mut nodes = [0u8; 4];
    self.read_data(Reg::TotalNumberOfY, &mut nodes).await?;
    self.capability.y_node_num = u16::from_le_bytes([nodes[0], nodes[1]]);
    self.capability.x_node_num = u16::from_le_bytes([nodes[2], nodes[3]]);
    Ok(())
  }

  /// One-time reporting setup after power-on: panel geometry, then the
  /// recurring part shared with [`mini_init`].
  ///
  /// [`mini_init`]: Zt7650::mini_init
  pub(crate) async fn init_touch(&mut self) -> Result<(), Error<E>> {
    self.write_reg16(Reg::XResolution, self.config.x_resolution).await?;
    self.write_reg16(Reg::YResolution, self.config.y_resolution).await?;
    self.write_reg16(Reg::SupportedFingerNum, reg::MAX_FINGERS as u16).await?;
    self.mini_init().await
  }

  /// Re-initialization that runs after every recovery power cycle: restores
  /// the touch mode, cover state, optional-mode bits, and the heartbeat
  /// interval, then drains stale interrupt status.
  pub(crate) async fn mini_init(&mut self) -> Result<(), Error<E>> {
    self.write_cmd(Reg::Swreset).await?;
    self.write_reg16(Reg::TouchMode, self.touch_mode.code()).await?;

    let cover = self.cover.map_or(COVER_OPEN, CoverType::code);
    self.write_reg16(Reg::CoverControl, cover).await?;

    self.write_reg16(Reg::OptionalSetting, self.optional_mode).await?;

    // Garbage interrupt status accumulates across the reset.
    for _ in 0..10 {
      self.write_cmd(Reg::ClearIntStatus).await?;
      self.delay.delay_us(10).await;
    }

    self
      .write_reg16(Reg::PeriodicalInterruptInterval, reg::SCAN_RATE_HZ * reg::ESD_TIMER_INTERVAL)
      .await?;
    self.esd_timer_start();

    if self.sleep_mode {
      self.esd_timer_stop();
      self.write_cmd(Reg::Sleep).await?;
    }
    Ok(())
  }

  /// Run the hardware offset calibration and persist it to NVM.
  ///
  /// The chip is switched into its calibration acquisition mode and polled
  /// until it clears the calibration-request bit, bounded at
  /// [`Error::Timeout`]. On success the result is saved and the chip is
  /// reset back into point mode.
  pub async fn hw_calibration(&mut self) -> Result<(), Error<E>> {
    self.esd_timer_stop();
    if !self.guard.try_enter(WorkState::Calibration) {
      self.esd_timer_start();
      return Err(Error::Busy);
    }
    let result = self.hw_calibration_inner().await;
    self.guard.exit();
    self.esd_timer_start();
    result
  }

  pub(crate) async fn hw_calibration_inner(&mut self) -> Result<(), Error<E>> {
    self.write_reg16(Reg::TouchMode, 0x07).await?;
    self.delay.delay_ms(10).await;
    self.write_cmd(Reg::ClearIntStatus).await?;
    self.delay.delay_ms(10).await;
    self.write_cmd(Reg::ClearIntStatus).await?;
    self.delay.delay_ms(50).await;
    self.write_cmd(Reg::ClearIntStatus).await?;
    self.delay.delay_ms(10).await;

    self.write_cmd(Reg::Calibrate).await?;
    self.write_cmd(Reg::ClearIntStatus).await?;
    self.delay.delay_ms(10).await;
    self.write_cmd(Reg::ClearIntStatus).await?;

    let mut time_out = 0u32;
    loop {
      self.delay.delay_ms(200).await;
      self.write_cmd(Reg::ClearIntStatus).await?;

      let eeprom_info = self.read_u16(Reg::EepromInfo).await?;
      if eeprom_info & 0x0001 == 0 {
        break;
      }

      if time_out == 4 {
        // Calibration stalled once; kick it again before the final bound.
        self.write_cmd(Reg::Calibrate).await?;
        self.delay.delay_ms(10).await;
        self.write_cmd(Reg::ClearIntStatus).await?;
      }

      time_out += 1;
      if time_out > 10 {
        self.write_reg16(Reg::TouchMode, self.touch_mode.code()).await?;
        self.delay.delay_ms(50).await;
        self.write_cmd(Reg::Swreset).await?;
        return Err(Error::Timeout);
      }
    }

    self.write_reg16(VCmd::NvmWriteEnable, 0x0001).await?;
    self.delay.delay_us(100).await;
    self.write_cmd(Reg::SaveCalibration).await?;
    self.delay.delay_ms(1100).await;
    self.write_reg16(VCmd::NvmWriteEnable, 0x0000).await?;

    self.write_reg16(Reg::TouchMode, self.touch_mode.code()).await?;
    self.delay.delay_ms(50).await;
    self.write_cmd(Reg::Swreset).await?;
    Ok(())
  }

  /// Read one frame of raw node data while a diagnostic
  /// [`TouchMode`](crate::TouchMode) is active. `buf` receives
  /// `total_node_num()` 16-bit samples, little-endian.
  pub async fn read_raw_frame(&mut self, buf: &mut [u8]) -> Result<(), Error<E>> {
    self.esd_timer_stop();
    if !self.guard.try_enter(WorkState::RawData) {
      self.esd_timer_start();
      return Err(Error::Busy);
    }
    let result = self.read_raw_frame_inner(buf).await;
    self.guard.exit();
    self.esd_timer_start();
    result
  }

  async fn read_raw_frame_inner(&mut self, buf: &mut [u8]) -> Result<(), Error<E>> {
    self.read_data(Reg::PointStatus, buf).await?;
    self.write_cmd(Reg::ClearIntStatus).await
  }
}

#[cfg(test)]
mod tests {
  use crate::testutil::*;
  use crate::Error;

  fn expect_calibration_entry(i2c: &mut ScriptI2c) {
    i2c.expect_write(&[0x10, 0x00, 0x07, 0x00]); // acquisition mode
    for _ in 0..3 {
      i2c.expect_write(&[0x03, 0x00]); // clear int
    }
    i2c.expect_write(&[0x06, 0x00]); // calibrate
    i2c.expect_write(&[0x03, 0x00]);
    i2c.expect_write(&[0x03, 0x00]);
  }

  fn expect_calibration_poll(i2c: &mut ScriptI2c, eeprom_info: &[u8; 2]) {
    i2c.expect_write(&[0x03, 0x00]);
    i2c.expect_write(&[0x18, 0x00]); // eeprom info
    i2c.expect_read(eeprom_info);
  }

  fn expect_calibration_save(i2c: &mut ScriptI2c) {
    i2c.expect_write(&[0xF0, 0x13, 0x01, 0x00]); // nvm write enable
    i2c.expect_write(&[0x08, 0x00]); // save calibration
    i2c.expect_write(&[0xF0, 0x13, 0x00, 0x00]);
    i2c.expect_write(&[0x10, 0x00, 0x00, 0x00]); // back to point mode
    i2c.expect_write(&[0x00, 0x00]); // soft reset
  }

  #[test]
  fn capability_unpacks_revision_block() {
    let mut i2c = ScriptI2c::new();
    i2c.expect_write(&[0x1C, 0x00]); // vendor id
    i2c.expect_read(&[0x5A, 0x00]);
    i2c.expect_write(&[0x21, 0x01]); // minor fw version
    i2c.expect_read(&[0x02, 0x00]);
    i2c.expect_write(&[0x11, 0x00]); // chip revision block
    i2c.expect_read(&[0x01, 0x00, 0x2C, 0x00, 0x07, 0x00, 0x50, 0x76]);
    i2c.expect_write(&[0x60, 0x00]); // node counts
    i2c.expect_read(&[0x10, 0x00, 0x22, 0x00]);
    let mut dev = test_driver(i2c);
    dev.force_powered();

    block_on(dev.read_capability()).unwrap();
    let cap = dev.capability();
    assert_eq!(cap.vendor_id, 0x005A);
    assert_eq!(cap.fw_version, 0x002C);
    assert_eq!(cap.reg_data_version, 0x0007);
    assert_eq!(cap.hw_id, 0x7650);
    assert_eq!(cap.y_node_num, 16);
    assert_eq!(cap.x_node_num, 34);
    assert_eq!(cap.total_node_num(), 544);
  }

  #[test]
  fn mini_init_restores_reporting_state() {
    let mut i2c = ScriptI2c::new();
    expect_mini_init(&mut i2c);
    let mut dev = test_driver(i2c);
    dev.force_powered();

    block_on(dev.mini_init()).unwrap();
    assert!(dev.esd_armed());
    assert!(dev.i2c_script_done());
  }

  #[test]
  fn mini_init_sleeping_panel_reenters_sleep() {
    let mut i2c = ScriptI2c::new();
    expect_mini_init(&mut i2c);
    i2c.expect_write(&[0x05, 0x00]); // sleep command
    let mut dev = test_driver(i2c);
    dev.force_powered();
    dev.sleep_mode = true;

    block_on(dev.mini_init()).unwrap();
    assert!(!dev.esd_armed());
    assert!(dev.i2c_script_done());
  }

  #[test]
  fn hw_calibration_saves_and_restores_point_mode() {
    let mut i2c = ScriptI2c::new();
    expect_calibration_entry(&mut i2c);
    expect_calibration_poll(&mut i2c, &[0x00, 0x00]);
    expect_calibration_save(&mut i2c);
    let mut dev = test_driver(i2c);
    dev.force_powered();

    block_on(dev.hw_calibration()).unwrap();
    assert!(dev.esd_armed());
    assert!(dev.i2c_script_done());
  }

  #[test]
  fn stalled_calibration_is_kicked_once_mid_poll() {
    let mut i2c = ScriptI2c::new();
    expect_calibration_entry(&mut i2c);
    // Calibration-request bit stays set through the fifth poll.
    for _ in 0..5 {
      expect_calibration_poll(&mut i2c, &[0x01, 0x00]);
    }
    i2c.expect_write(&[0x06, 0x00]); // calibrate re-issued
    i2c.expect_write(&[0x03, 0x00]);
    expect_calibration_poll(&mut i2c, &[0x00, 0x00]);
    expect_calibration_save(&mut i2c);
    let mut dev = test_driver(i2c);
    dev.force_powered();

    block_on(dev.hw_calibration()).unwrap();
    assert!(dev.i2c_script_done());
  }

  #[test]
  fn calibration_timeout_resets_back_into_point_mode() {
    let mut i2c = ScriptI2c::new();
    expect_calibration_entry(&mut i2c);
    for n in 0..11 {
      expect_calibration_poll(&mut i2c, &[0x01, 0x00]);
      if n == 4 {
        i2c.expect_write(&[0x06, 0x00]);
        i2c.expect_write(&[0x03, 0x00]);
      }
    }
    i2c.expect_write(&[0x10, 0x00, 0x00, 0x00]); // restore point mode
    i2c.expect_write(&[0x00, 0x00]); // soft reset
    let mut dev = test_driver(i2c);
    dev.force_powered();

    let err = block_on(dev.hw_calibration());
    assert!(matches!(err, Err(Error::Timeout)));
    assert!(dev.i2c_script_done());
  }
}
