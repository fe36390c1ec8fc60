//! Driver configuration and runtime mode registers.

use embedded_hal::digital::InputPin;
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::digital::Wait;
use embedded_hal_async::i2c::{I2c, SevenBitAddress};

use crate::fw::Bringup;
use crate::power::PowerRail;
use crate::reg::Reg;
use crate::state::WorkState;
use crate::{Error, Zt7650};

/// Static configuration for a panel.
///
/// Resolution and zone insets describe the glass; the gesture enables decide
/// which low-power events the driver reports while the panel sleeps.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
  pub x_resolution: u16,
  pub y_resolution: u16,
  /// Width of the left/right edge bands used for touch zone classification.
  pub area_edge: u16,
  /// Height of the indicator band at the top of the panel.
  pub area_indicator: u16,
  /// Height of the navigation band at the bottom of the panel.
  pub area_navigation: u16,
  pub spay_enable: bool,
  pub aod_enable: bool,
  pub aot_enable: bool,
  pub singletap_enable: bool,
  pub fod_enable: bool,
  pub bringup: Bringup,
  pub initial_touch_mode: TouchMode,
}

impl Config {
  /// Configuration for a panel of the given resolution, with all low-power
  /// gestures disabled.
  pub fn new(x_resolution: u16, y_resolution: u16) -> Self {
    Self {
      x_resolution,
      y_resolution,
      area_edge: 60,
      area_indicator: 48,
      area_navigation: 60,
      spay_enable: false,
      aod_enable: false,
      aot_enable: false,
      singletap_enable: false,
      fod_enable: false,
      bringup: Bringup::Normal,
      initial_touch_mode: TouchMode::Point,
    }
  }

  pub fn with_zone_insets(mut self, edge: u16, indicator: u16, navigation: u16) -> Self {
    self.area_edge = edge;
    self.area_indicator = indicator;
    self.area_navigation = navigation;
    self
  }

  pub fn with_spay(mut self, enable: bool) -> Self {
    self.spay_enable = enable;
    self
  }

  pub fn with_aod(mut self, enable: bool) -> Self {
    self.aod_enable = enable;
    self
  }

  pub fn with_aot(mut self, enable: bool) -> Self {
    self.aot_enable = enable;
    self
  }

  pub fn with_single_tap(mut self, enable: bool) -> Self {
    self.singletap_enable = enable;
    self
  }

  pub fn with_fod(mut self, enable: bool) -> Self {
    self.fod_enable = enable;
    self
  }

  pub fn with_bringup(mut self, bringup: Bringup) -> Self {
    self.bringup = bringup;
    self
  }
}

/// Acquisition mode of the analog front end.
///
/// [`TouchMode::Point`] is the production mode that reports finger
/// coordinates; the rest stream raw node data for factory diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TouchMode {
  #[default]
  Point,
  Delta,
  Raw,
  Reference,
  Dnd,
  Jitter,
  Sensitivity,
}

impl TouchMode {
  pub(crate) fn code(self) -> u16 {
    match self {
      TouchMode::Point => 0,
      TouchMode::Delta => 3,
      TouchMode::Raw => 7,
      TouchMode::Reference => 8,
      TouchMode::Dnd => 11,
      TouchMode::Jitter => 15,
      TouchMode::Sensitivity => 21,
    }
  }
}

/// Closed-cover state reported to the chip so it can adapt its sensing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CoverType {
  WalletClose,
  ViewClose,
  LedClose,
  ClearClose,
  ClearSideViewClose,
  MiniSViewWalletClose,
}

/// Register value for the open-cover state.
pub(crate) const COVER_OPEN: u16 = 0x0200;

impl CoverType {
  pub(crate) fn code(self) -> u16 {
    match self {
      CoverType::WalletClose => 0x0000,
      CoverType::ViewClose => 0x0100,
      CoverType::LedClose => 0x0700,
      CoverType::ClearClose => 0x0800,
      CoverType::ClearSideViewClose => 0x0F00,
      CoverType::MiniSViewWalletClose => 0x1000,
    }
  }
}

/// Host-driven sensing hints, one bit each in the optional-setting register.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OptionalMode {
  UsbDetect,
  SViewDetect,
  Sensitive,
  EdgeSelect,
  DuoTouch,
  TouchableArea,
  EarDetect,
  EarDetectMutual,
  PocketMode,
  OtgMode,
}

impl OptionalMode {
  fn mask(self) -> u16 {
    let bit = match self {
      OptionalMode::UsbDetect => 0,
      OptionalMode::SViewDetect => 1,
      OptionalMode::Sensitive => 2,
      OptionalMode::EdgeSelect => 3,
      OptionalMode::DuoTouch => 4,
      OptionalMode::TouchableArea => 5,
      OptionalMode::EarDetect => 6,
      OptionalMode::EarDetectMutual => 7,
      OptionalMode::PocketMode => 8,
      OptionalMode::OtgMode => 15,
    };
    1 << bit
  }
}

/// Panel border region in which accidental grip contacts are rejected.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GripEdgeZone {
  pub left: u16,
  pub right: u16,
  pub top: u16,
  pub bottom: u16,
}

impl<I, E, INT, P, D> Zt7650<I, INT, P, D>
where
  I: I2c<SevenBitAddress, Error = E>,
  INT: Wait + InputPin,
  P: PowerRail,
  D: DelayNs,
{
  /// Switch the analog front end into `mode`.
  ///
  /// Raw modes stop the point pipeline; interrupts then deliver node data
  /// readable through [`Zt7650::read_raw_frame`].
  pub async fn set_touch_mode(&mut self, mode: TouchMode) -> Result<(), Error<E>> {
    self.esd_timer_stop();
    if !self.guard.try_enter(WorkState::SetMode) {
      self.esd_timer_start();
      return Err(Error::Busy);
    }
    let result = self.set_touch_mode_inner(mode).await;
    self.guard.exit();
    self.esd_timer_start();
    result
  }

  async fn set_touch_mode_inner(&mut self, mode: TouchMode) -> Result<(), Error<E>> {
    self.write_reg16(Reg::TouchMode, mode.code()).await?;
    self.write_cmd(Reg::Swreset).await?;
    self.delay.delay_ms(25).await;
    // Drain stale interrupt status left over from the mode switch.
    for _ in 0..10 {
      self.write_cmd(Reg::ClearIntStatus).await?;
      self.delay.delay_ms(20).await;
    }
    self.touch_mode = mode;
    Ok(())
  }

  /// Report a cover state; `None` means open.
  pub async fn set_cover_type(&mut self, cover: Option<CoverType>) -> Result<(), Error<E>> {
    self.cover = cover;
    let value = cover.map_or(COVER_OPEN, CoverType::code);
    self.write_reg16(Reg::CoverControl, value).await
  }

  /// Toggle one of the optional-mode hint bits.
  pub async fn set_optional_mode(&mut self, mode: OptionalMode, on: bool) -> Result<(), Error<E>> {
    let mask = mode.mask();
    let next = if on { self.optional_mode | mask } else { self.optional_mode & !mask };
    if next == self.optional_mode {
      return Ok(());
    }
    self.optional_mode = next;
    self.write_reg16(Reg::OptionalSetting, next).await
  }

  /// Program the grip rejection border.
  pub async fn set_grip_exception_zone(&mut self, zone: GripEdgeZone) -> Result<(), Error<E>> {
    let mut data = [0u8; 8];
    data[0..2].copy_from_slice(&zone.left.to_le_bytes());
    data[2..4].copy_from_slice(&zone.right.to_le_bytes());
    data[4..6].copy_from_slice(&zone.top.to_le_bytes());
    data[6..8].copy_from_slice(&zone.bottom.to_le_bytes());
    self.write_data(Reg::RejectZoneArea, &data).await
  }
}
