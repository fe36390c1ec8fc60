//! Power rail control and the vendor boot handshake.

use embedded_hal::digital::InputPin;
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::digital::Wait;
use embedded_hal_async::i2c::{I2c, SevenBitAddress};

use crate::reg::{self, Reg, VCmd};
use crate::{Error, Zt7650};

/// External power switch for the controller's supply rail.
///
/// Implementations drive whatever regulator or load switch feeds the panel;
/// the driver sequences the delays and register traffic around it.
pub trait PowerRail {
  type Error;

  async fn set(&mut self, on: bool) -> Result<(), Self::Error>;
}

/// Target state for [`Zt7650::power_control`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PowerTarget {
  Off,
  /// Rail up, no firmware boot validation. Used on the way into the
  /// flash-programming mode, where the resident firmware may be invalid.
  On,
  /// Rail up followed by the boot handshake that leaves the firmware
  /// running with a verified flash checksum.
  OnSequence,
}

impl<I, E, INT, P, D> Zt7650<I, INT, P, D>
where
  I: I2c<SevenBitAddress, Error = E>,
  INT: Wait + InputPin,
  P: PowerRail,
  D: DelayNs,
{
  pub(crate) async fn power_control(&mut self, target: PowerTarget) -> Result<(), Error<E>> {
    match target {
      PowerTarget::Off => {
        self.powered = false;
        self.power.set(false).await.map_err(|_| Error::Power)?;
        self.delay.delay_ms(reg::CHIP_OFF_DELAY_MS).await;
        Ok(())
      }
      PowerTarget::On => {
        self.power.set(true).await.map_err(|_| Error::Power)?;
        self.delay.delay_ms(reg::CHIP_ON_DELAY_MS).await;
        self.powered = true;
        Ok(())
      }
      PowerTarget::OnSequence => {
        self.power.set(true).await.map_err(|_| Error::Power)?;
        self.delay.delay_ms(reg::CHIP_ON_DELAY_MS).await;
        self.powered = true;
        self.power_sequence().await
      }
    }
  }

  /// Boot the resident firmware and verify its flash checksum.
  ///
  /// A clean boot answers the signature directly after reset. Otherwise the
  /// NVM handshake is driven through the vendor command window, up to
  /// [`reg::INIT_RETRY_CNT`] times, before giving up with
  /// [`Error::Checksum`].
  async fn power_sequence(&mut self) -> Result<(), Error<E>> {
    self.write_cmd(Reg::Swreset).await?;
    self.delay.delay_ms(reg::RESET_CHECKSUM_DELAY_MS).await;

    let mut last = 0u16;
    match self.read_u16(Reg::ChecksumResult).await {
      Ok(reg::CORRECT_CHECKSUM) => return Ok(()),
      Ok(checksum) => last = checksum,
      Err(Error::I2c(_)) => {}
      Err(e) => return Err(e),
    }

    for attempt in 0..reg::INIT_RETRY_CNT {
      if attempt > 0 {
        self.delay.delay_ms(reg::CHIP_ON_DELAY_MS).await;
      }
      match self.boot_handshake().await {
        Ok(reg::CORRECT_CHECKSUM) => return Ok(()),
        Ok(checksum) => last = checksum,
        Err(Error::I2c(_)) => {}
        Err(e) => return Err(e),
      }
    }

    Err(Error::Checksum(last))
  }

  /// One pass of the vendor NVM boot handshake. Returns the checksum
  /// register's value after the firmware was restarted.
  async fn boot_handshake(&mut self) -> Result<u16, Error<E>> {
    self.write_reg16(VCmd::Enable, 0x0001).await?;
    self.delay.delay_us(10).await;

    // Chip code read is part of the handshake; the value is not validated
    // here because a blank chip still has to reach the updater.
    let _ = self.read_u16(VCmd::ChipId).await?;
    self.delay.delay_us(10).await;

    self.write_cmd(VCmd::IntnClear).await?;
    self.delay.delay_us(10).await;

    self.write_reg16(VCmd::NvmInit, 0x0001).await?;
    self.delay.delay_ms(2).await;

    self.write_reg16(VCmd::NvmProgStart, 0x0001).await?;
    self.delay.delay_ms(reg::FIRMWARE_ON_DELAY_MS).await;

    self.read_u16(Reg::ChecksumResult).await
  }

  /// Re-read the boot checksum of the running firmware.
  pub(crate) async fn crc_ok(&mut self) -> Result<bool, Error<E>> {
    Ok(self.read_u16(Reg::ChecksumResult).await? == reg::CORRECT_CHECKSUM)
  }
}
