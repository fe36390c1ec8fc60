//! Firmware image handling and the flash download state machine.
//!
//! An image carries a 0x80-byte info block describing four flash sections
//! (info, core, custom, register) with 24-bit big-endian sizes and 32-bit
//! little-endian checksums. The same block is programmed into the chip, so
//! comparing the on-chip copy against the new image decides between a full
//! download and one of the two partial downloads that skip the unchanged
//! core section.

use embedded_hal::digital::InputPin;
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::digital::Wait;
use embedded_hal_async::i2c::{I2c, SevenBitAddress};

use crate::init::Capability;
use crate::power::{PowerRail, PowerTarget};
use crate::reg::{self, VCmd};
use crate::state::WorkState;
use crate::{Error, Zt7650};

/// Size of the flash info block at the start of every image.
const INFO_BLOCK_LEN: usize = 0x80;

// Info block field offsets.
const OFF_INFO_CHECKSUM: usize = 0x20;
const OFF_CORE_CHECKSUM: usize = 0x24;
const OFF_CUSTOM_CHECKSUM: usize = 0x28;
const OFF_REGISTER_CHECKSUM: usize = 0x2C;
const OFF_VERSION: usize = 52;
const OFF_MINOR_VERSION: usize = 56;
const OFF_REG_VERSION: usize = 60;
const OFF_INFO_SIZE: usize = 0x58;
const OFF_CORE_SIZE: usize = 0x5C;
const OFF_CUSTOM_SIZE: usize = 0x60;
const OFF_REGISTER_SIZE: usize = 0x64;
const OFF_TOTAL_SIZE: usize = 0x68;

/// Largest value a 24-bit section size field can carry; reads back from
/// erased flash.
const SECTION_SIZE_ERASED: u32 = 0x00FF_FFFF;

/// Panel bring-up stage, steering how aggressively firmware is replaced.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Bringup {
  /// Update only when the image carries a newer version.
  #[default]
  Normal,
  /// Never update from the host image.
  SkipUpdate,
  /// Update whenever any version field differs, even downgrades.
  OnAnyDiff,
  /// Always download, regardless of versions.
  Forced,
}

/// How much of the flash a download has to rewrite.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DownloadMethod {
  Full,
  /// Core section matches; rewrite custom and register sections.
  PartialCustom,
  /// Core and custom sections match; rewrite the register section only.
  PartialRegister,
}

/// A firmware image as shipped, borrowed for the duration of a download.
#[derive(Clone, Copy, Debug)]
pub struct FirmwareImage<'a> {
  data: &'a [u8],
}

impl<'a> FirmwareImage<'a> {
  /// Wrap raw image bytes. Returns `None` when the data cannot even hold
  /// the info block.
  pub fn new(data: &'a [u8]) -> Option<Self> {
    if data.len() < INFO_BLOCK_LEN {
      return None;
    }
    Some(Self { data })
  }

  pub fn version(&self) -> u16 {
    read_u16_le(self.data, OFF_VERSION)
  }

  pub fn minor_version(&self) -> u16 {
    read_u16_le(self.data, OFF_MINOR_VERSION)
  }

  pub fn reg_version(&self) -> u16 {
    read_u16_le(self.data, OFF_REG_VERSION)
  }

  fn sections(&self) -> SectionInfo {
    SectionInfo::parse(&self.data[..INFO_BLOCK_LEN])
  }

  /// Number of flash bytes a download writes: the sum of the four section
  /// sizes (falling back to the header's total size), rounded up to a
  /// whole sector.
  fn flash_len(&self) -> usize {
    let s = self.sections();
    let mut len = s.info_size + s.core_size + s.custom_size + s.register_size;
    if len == 0 {
      len = read_u24_be(self.data, OFF_TOTAL_SIZE);
    }
    let len = len as usize;
    len.div_ceil(reg::TC_SECTOR_SZ) * reg::TC_SECTOR_SZ
  }

  /// Whether this image should replace what the chip runs, by the version
  /// fields alone.
  ///
  /// A chip-side major version above 0xFF is treated as corrupt and always
  /// replaced. Otherwise the comparison walks major, minor, then register
  /// data version, so a newer major wins even when lower fields regress.
  pub fn should_replace(&self, cap: &Capability, bringup: Bringup) -> bool {
    match bringup {
      Bringup::SkipUpdate => return false,
      Bringup::Forced => return true,
      Bringup::OnAnyDiff => {
        return cap.fw_version != self.version()
          || cap.fw_minor_version != self.minor_version()
          || cap.reg_data_version != self.reg_version();
      }
      Bringup::Normal => {}
    }

    if cap.fw_version > 0xFF {
      return true;
    }
    if cap.fw_version != self.version() {
      return cap.fw_version < self.version();
    }
    if cap.fw_minor_version != self.minor_version() {
      return cap.fw_minor_version < self.minor_version();
    }
    cap.reg_data_version < self.reg_version()
  }
}

/// Section sizes and checksums parsed from an info block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct SectionInfo {
  info_size: u32,
  core_size: u32,
  custom_size: u32,
  register_size: u32,
  info_checksum: u32,
  core_checksum: u32,
  custom_checksum: u32,
  register_checksum: u32,
}

impl SectionInfo {
  fn parse(block: &[u8]) -> Self {
    Self {
      info_size: read_u24_be(block, OFF_INFO_SIZE),
      core_size: read_u24_be(block, OFF_CORE_SIZE),
      custom_size: read_u24_be(block, OFF_CUSTOM_SIZE),
      register_size: read_u24_be(block, OFF_REGISTER_SIZE),
      info_checksum: read_u32_le(block, OFF_INFO_CHECKSUM),
      core_checksum: read_u32_le(block, OFF_CORE_CHECKSUM),
      custom_checksum: read_u32_le(block, OFF_CUSTOM_CHECKSUM),
      register_checksum: read_u32_le(block, OFF_REGISTER_CHECKSUM),
    }
  }

  fn any_size_invalid(&self) -> bool {
    let sizes = [self.info_size, self.core_size, self.custom_size, self.register_size];
    sizes.iter().any(|&s| s == 0 || s == SECTION_SIZE_ERASED)
  }
}

fn read_u16_le(data: &[u8], off: usize) -> u16 {
  u16::from_le_bytes([data[off], data[off + 1]])
}

fn read_u32_le(data: &[u8], off: usize) -> u32 {
  u32::from_le_bytes([data[off], data[off + 1], data[off + 2], data[off + 3]])
}

/// Section size fields are four bytes with the top byte unused.
fn read_u24_be(data: &[u8], off: usize) -> u32 {
  (data[off + 1] as u32) << 16 | (data[off + 2] as u32) << 8 | data[off + 3] as u32
}

/// Checksum over an info block: the wrapping sum of its 16-bit words, with
/// the stored checksum itself masked out.
fn info_block_checksum(block: &[u8]) -> u32 {
  let mut sum = 0u32;
  for (i, chunk) in block.chunks_exact(2).enumerate() {
    if i * 2 == OFF_INFO_CHECKSUM || i * 2 == OFF_INFO_CHECKSUM + 2 {
      continue;
    }
    sum = sum.wrapping_add(u16::from_le_bytes([chunk[0], chunk[1]]) as u32);
  }
  sum
}

fn choose_download_method(ic: &SectionInfo, fw: &SectionInfo, ic_block_valid: bool) -> DownloadMethod {
  let mut method = DownloadMethod::Full;

  if ic.core_size == fw.core_size
    && ic.custom_size == fw.custom_size
    && ic.core_checksum == fw.core_checksum
    && ic.custom_checksum == fw.custom_checksum
    && (ic.register_size != fw.register_size || ic.register_checksum != fw.register_checksum)
  {
    method = DownloadMethod::PartialRegister;
  }

  if ic.core_size == fw.core_size
    && ic.core_checksum == fw.core_checksum
    && (ic.custom_size != fw.custom_size || ic.custom_checksum != fw.custom_checksum)
  {
    method = DownloadMethod::PartialCustom;
  }

  if ic.any_size_invalid() || fw.any_size_invalid() || !ic_block_valid {
    method = DownloadMethod::Full;
  }

  method
}

impl<I, E, INT, P, D> Zt7650<I, INT, P, D>
where
  I: I2c<SevenBitAddress, Error = E>,
  INT: Wait + InputPin,
  P: PowerRail,
  D: DelayNs,
{
  /// Whether [`Zt7650::initialize`] would download `image`: the version
  /// fields ask for it, or the chip's flash checksum does not come up
  /// clean.
  pub(crate) async fn firmware_update_needed(&mut self, image: &FirmwareImage<'_>) -> Result<bool, Error<E>> {
    if image.should_replace(&self.capability, self.config.bringup) {
      return Ok(true);
    }
    Ok(!self.crc_ok().await?)
  }

  /// Download `image` into the chip's flash and verify it by rebooting.
  ///
  /// The chip is power-cycled into its bootloader; the whole procedure is
  /// retried up to three times before the last error is surfaced. On
  /// success the chip is re-initialized into reporting mode.
  pub async fn upgrade_firmware(&mut self, image: &FirmwareImage<'_>) -> Result<(), Error<E>> {
    self.esd_timer_stop();
    if !self.guard.try_enter(WorkState::Upgrade) {
      self.esd_timer_start();
      return Err(Error::Busy);
    }
    let result = self.upgrade_and_reinit(image).await;
    self.guard.exit();
    self.esd_timer_start();
    result
  }

  async fn upgrade_and_reinit(&mut self, image: &FirmwareImage<'_>) -> Result<(), Error<E>> {
    self.upgrade_firmware_inner(image).await?;
    self.read_capability().await?;
    self.mini_init().await
  }

  pub(crate) async fn upgrade_firmware_inner(&mut self, image: &FirmwareImage<'_>) -> Result<(), Error<E>> {
    // The download walks the image in whole sectors; a truncated image
    // would run off the end of the buffer.
    if image.data.len() < image.flash_len() {
      return Err(Error::InvalidImage);
    }

    let mut attempt = 0;
    loop {
      match self.upgrade_attempt(image).await {
        Ok(()) => return Ok(()),
        Err(e) => {
          attempt += 1;
          if attempt >= reg::INIT_RETRY_CNT {
            return Err(e);
          }
        }
      }
    }
  }

  async fn upgrade_attempt(&mut self, image: &FirmwareImage<'_>) -> Result<(), Error<E>> {
    self.power_control(PowerTarget::Off).await?;
    self.power_control(PowerTarget::On).await?;
    self.delay.delay_ms(10).await;

    self.write_reg16(VCmd::Enable, 0x0001).await?;
    self.delay.delay_ms(10).await;
    self.write_cmd(VCmd::UpgradeMode).await?;
    self.delay.delay_ms(5).await;
    self.write_reg16(VCmd::Enable, 0x0001).await?;
    self.delay.delay_ms(1).await;
    self.write_cmd(VCmd::IntnClear).await?;

    // Chip code is informative only; the read doubles as a liveness check
    // of the bootloader.
    let _chip_code = self.read_u16(VCmd::ChipId).await?;
    self.delay.delay_ms(5).await;

    let method = self.check_download_method(image).await?;
    match method {
      DownloadMethod::Full => self.full_download(image).await?,
      DownloadMethod::PartialCustom | DownloadMethod::PartialRegister => self.partial_download(image).await?,
    }

    // Verification is a reboot: the chip recomputes its flash checksum
    // during the power-on sequence.
    self.power_control(PowerTarget::Off).await?;
    self.power_control(PowerTarget::OnSequence).await?;
    self.delay.delay_ms(10).await;
    Ok(())
  }

  /// Read the on-chip info block and compare it against the image's.
  async fn check_download_method(&mut self, image: &FirmwareImage<'_>) -> Result<DownloadMethod, Error<E>> {
    self.write_reg16(VCmd::Enable, 0x0001).await?;
    self.delay.delay_ms(1).await;
    self.write_cmd(VCmd::IntnClear).await?;
    self.write_reg16(VCmd::NvmInit, 0x0001).await?;
    self.delay.delay_ms(5).await;

    self.write_reg16(VCmd::UpgradeInitFlash, 0x0000).await?;

    let mut block = [0u8; INFO_BLOCK_LEN];
    for chunk in block.chunks_exact_mut(reg::TC_SECTOR_SZ) {
      self.read_data(VCmd::UpgradeReadFlash, chunk).await?;
    }

    let ic = SectionInfo::parse(&block);
    let fw = image.sections();
    let ic_block_valid = info_block_checksum(&block) == ic.info_checksum;
    Ok(choose_download_method(&ic, &fw, ic_block_valid))
  }

  async fn full_download(&mut self, image: &FirmwareImage<'_>) -> Result<(), Error<E>> {
    let len = image.flash_len();

    self.write_reg16(VCmd::NvmInit, 0x0001).await?;
    self.delay.delay_ms(5).await;
    self.write_reg16(VCmd::NvmWriteEnable, 0x0001).await?;
    self.delay.delay_ms(10).await;
    self.write_cmd(VCmd::UpgradeInitFlash).await?;

    self.write_reg16(VCmd::UpgradeWriteMode, 0x0001).await?;
    self.delay.delay_ms(1).await;

    // Core flash is erased by section, the trailing pages individually.
    for section in 0u16..3 {
      self.erase_block(0x0001, section).await?;
      self.delay.delay_ms(50).await;
    }
    for page in 95u16..126 {
      self.erase_block(0x0000, page).await?;
      self.delay.delay_ms(50).await;
    }
    self.delay.delay_ms(100).await;
    self.write_cmd(VCmd::UpgradeInitFlash).await?;

    self.write_flash(image.data, 0, len).await
  }

  /// Rewrite the info block plus everything after the core section,
  /// leaving the verified core pages in place.
  async fn partial_download(&mut self, image: &FirmwareImage<'_>) -> Result<(), Error<E>> {
    let len = image.flash_len();
    let s = image.sections();
    let info_len = s.info_size as usize;
    let erase_start_page = (s.info_size + s.core_size) as usize / reg::TSP_PAGE_SIZE;

    self.write_reg16(VCmd::NvmInit, 0x0001).await?;
    self.delay.delay_ms(5).await;
    self.write_reg16(VCmd::NvmWriteEnable, 0x0001).await?;
    self.delay.delay_ms(10).await;
    self.write_cmd(VCmd::UpgradeInitFlash).await?;

    self.write_reg16(VCmd::UpgradeWriteMode, 0x0001).await?;
    self.delay.delay_ms(1).await;

    self.erase_block(0x0000, 0).await?;
    for page in erase_start_page..len / reg::TSP_PAGE_SIZE {
      self.delay.delay_ms(50).await;
      self.erase_block(0x0000, page as u16).await?;
    }
    self.delay.delay_ms(50).await;

    self.write_cmd(VCmd::UpgradeInitFlash).await?;
    self.delay.delay_ms(1).await;

    self.write_reg16(VCmd::UpgradeStartPage, 0x0000).await?;
    self.delay.delay_ms(5).await;
    self.write_flash(image.data, 0, info_len).await?;

    self.write_reg16(VCmd::UpgradeStartPage, erase_start_page as u16).await?;
    self.delay.delay_ms(5).await;
    self.write_flash(image.data, erase_start_page * reg::TSP_PAGE_SIZE, len).await
  }

  async fn erase_block(&mut self, kind: u16, num: u16) -> Result<(), Error<E>> {
    let mut data = [0u8; 4];
    data[0..2].copy_from_slice(&kind.to_le_bytes());
    data[2..4].copy_from_slice(&num.to_le_bytes());
    self.write_data(VCmd::UpgradeBlockErase, &data).await
  }

  /// Stream `data[start..end]` into flash, sector by sector with a fuzing
  /// delay after each programmed page. The final page is written out to
  /// its boundary as far as the image provides bytes.
  async fn write_flash(&mut self, data: &[u8], start: usize, end: usize) -> Result<(), Error<E>> {
    let mut addr = start;
    while addr < end {
      for _ in 0..reg::TSP_PAGE_SIZE / reg::TC_SECTOR_SZ {
        if addr + reg::TC_SECTOR_SZ > data.len() {
          break;
        }
        self.write_data(VCmd::UpgradeWriteFlash, &data[addr..addr + reg::TC_SECTOR_SZ]).await?;
        addr += reg::TC_SECTOR_SZ;
        self.delay.delay_us(100).await;
      }
      self.delay.delay_us(reg::FUZING_DELAY_US).await;
    }
    Ok(())
  }
}
