#![no_std]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Async, `no_std` driver for the Zinitix ZT7650 capacitive touchscreen
//! controller.
//!
//! The ZT7650 is a large-panel touch controller with on-chip flash firmware,
//! multi-finger coordinate reporting, and low-power gesture detection. This
//! crate exposes a strongly typed API on top of the raw register map, with
//! helpers for:
//!
//! - The vendor power-on sequence, including the NVM boot handshake the chip
//!   needs when its boot checksum does not come up clean
//! - Conditional firmware updates with full or partial flash downloads,
//!   depending on how the on-chip image differs from the new one
//! - An interrupt-driven event pipeline that turns raw point records into
//!   per-slot press/move/release transitions and low-power gestures
//! - A host-driven watchdog that power-cycles and re-initializes the chip
//!   when its periodic heartbeat interrupt stops arriving
//! - Factory bookkeeping kept in the chip's user NVM area
//! - `embedded-hal` / `embedded-hal-async` 1.0 traits so the driver works
//!   across MCU families
//!
//! ```no_run
//! use embedded_hal::digital::InputPin;
//! use embedded_hal_async::{delay::DelayNs, digital::Wait, i2c::{I2c, SevenBitAddress}};
//! use zt7650::{Config, PowerRail, Zt7650};
//!
//! async fn example<I2C, INT, PWR, D, E>(
//!   i2c: I2C,
//!   int: INT,
//!   power: PWR,
//!   delay: D,
//! ) -> Result<(), zt7650::Error<E>>
//! where
//!   I2C: I2c<SevenBitAddress, Error = E>,
//!   INT: Wait + InputPin,
//!   PWR: PowerRail,
//!   D: DelayNs,
//! {
//!   let config = Config::new(1080, 2316);
//!   let mut touch = Zt7650::new(i2c, int, power, delay, config);
//!   touch.initialize(None).await?;
//!   loop {
//!     let frame = touch.wait_for_event().await?;
//!     let _ = frame;
//!   }
//! }
//! ```

mod config;
mod esd;
mod event;
mod fw;
mod init;
mod nvm;
mod power;
mod reg;
mod rw;
mod state;
#[cfg(test)]
mod testutil;

use embedded_hal::digital::InputPin;
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::digital::Wait;
use embedded_hal_async::i2c::{I2c, SevenBitAddress};

pub use config::{Config, CoverType, GripEdgeZone, OptionalMode, TouchMode};
pub use esd::EsdOutcome;
pub use event::{
  Contact, Frame, Gesture, PanelColumn, PanelRow, Touch, TouchKind, TouchPhase, TouchStatus, TouchZone,
};
pub use fw::{Bringup, DownloadMethod, FirmwareImage};
pub use init::Capability;
pub use nvm::{OctaResult, OctaTest, TestResult};
pub use power::{PowerRail, PowerTarget};
pub use reg::MAX_FINGERS;
pub use state::WorkState;

use event::Scrub;
use state::WorkGuard;

/// Errors that can occur while interacting with the controller.
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
  /// I²C bus transaction failed with the underlying driver error, after
  /// the protocol's bounded retries were exhausted.
  I2c(E),
  /// The interrupt pin could not be read or awaited.
  Pin,
  /// The power rail driver reported a failure.
  Power,
  /// A register access was attempted while the rail is down.
  PowerOff,
  /// The controller is held by another operation, or secure mode has
  /// detached it from the host.
  Busy,
  /// The boot handshake left the firmware checksum register with the given
  /// value instead of the expected signature.
  Checksum(u16),
  /// A bounded poll (hardware calibration) did not converge.
  Timeout,
  /// The firmware image is too short to carry a valid header.
  InvalidImage,
}

/// Driver for the Zinitix ZT7650 touchscreen controller.
///
/// Owns the I²C bus, the interrupt line, the chip's power rail, and a delay
/// source. Create an instance with [`Zt7650::new`], provide a [`Config`],
/// then call [`Zt7650::initialize`] to run the power-on sequence and bring
/// the chip into point-reporting mode.
pub struct Zt7650<I, INT, P, D> {
  i2c: I,
  int: INT,
  power: P,
  delay: D,
  config: Config,

  guard: WorkGuard,
  powered: bool,
  secure: bool,
  sleep_mode: bool,

  capability: Capability,
  touch_mode: TouchMode,
  optional_mode: u16,
  cover: Option<CoverType>,

  esd_armed: bool,

  slots: [Contact; MAX_FINGERS],
  prev_slots: [Contact; MAX_FINGERS],
  pressed_origin: [(u16, u16); MAX_FINGERS],
  move_count: [u16; MAX_FINGERS],
  finger_cnt: u8,
  check_multi: bool,
  multi_count: u32,
  palm_count: u32,
  noise_mode: Option<bool>,
  scrub: Option<Scrub>,

  comm_err_count: u32,
}

impl<I, E, INT, P, D> Zt7650<I, INT, P, D>
where
  I: I2c<SevenBitAddress, Error = E>,
  INT: Wait + InputPin,
  P: PowerRail,
  D: DelayNs,
{
  /// Create a new driver instance with the provided peripherals and
  /// configuration.
  ///
  /// Nothing is transmitted to the device until [`Zt7650::initialize`] is
  /// called; the rail is assumed to be off.
  pub fn new(i2c: I, int: INT, power: P, delay: D, config: Config) -> Self {
    let touch_mode = config.initial_touch_mode;
    Self {
      i2c,
      int,
      power,
      delay,
      config,
      guard: WorkGuard::default(),
      powered: false,
      secure: false,
      sleep_mode: false,
      capability: Capability::default(),
      touch_mode,
      optional_mode: 0,
      cover: None,
      esd_armed: false,
      slots: [Contact::default(); MAX_FINGERS],
      prev_slots: [Contact::default(); MAX_FINGERS],
      pressed_origin: [(0, 0); MAX_FINGERS],
      move_count: [0; MAX_FINGERS],
      finger_cnt: 0,
      check_multi: false,
      multi_count: 0,
      palm_count: 0,
      noise_mode: None,
      scrub: None,
      comm_err_count: 0,
    }
  }

  /// Bring the controller up: power-on sequence, capability query,
  /// conditional firmware update, hardware calibration when the chip asks
  /// for it, and the register writes that put it into reporting mode.
  ///
  /// Returns `true` if a firmware download ran.
  pub async fn initialize(&mut self, firmware: Option<&FirmwareImage<'_>>) -> Result<bool, Error<E>> {
    if !self.guard.try_enter(WorkState::Probe) {
      return Err(Error::Busy);
    }
    let result = self.initialize_inner(firmware).await;
    self.guard.exit();
    let upgraded = result?;
    self.esd_timer_start();
    Ok(upgraded)
  }

  async fn initialize_inner(&mut self, firmware: Option<&FirmwareImage<'_>>) -> Result<bool, Error<E>> {
    let mut upgraded = false;

    match self.power_control(PowerTarget::OnSequence).await {
      Ok(()) => {}
      // A chip with blank or corrupt flash cannot pass the boot handshake;
      // a full download is the only way forward.
      Err(Error::Checksum(_)) if firmware.is_some() => {
        if let Some(image) = firmware {
          self.upgrade_firmware_inner(image).await?;
          upgraded = true;
        }
      }
      Err(e) => return Err(e),
    }

    self.read_capability().await?;

    if let Some(image) = firmware {
      if !upgraded && self.firmware_update_needed(image).await? {
        self.upgrade_firmware_inner(image).await?;
        self.read_capability().await?;
        upgraded = true;
      }
    }

    // Calibration request bit survives in EEPROM until a calibration is
    // saved back.
    let eeprom_info = self.read_u16(reg::Reg::EepromInfo).await?;
    if eeprom_info & 0x0001 != 0 {
      self.hw_calibration_inner().await?;
    }

    self.init_touch().await?;
    Ok(upgraded)
  }

  /// Wait for the interrupt line to assert and run the event pipeline.
  pub async fn wait_for_event(&mut self) -> Result<Frame, Error<E>> {
    self.int.wait_for_low().await.map_err(|_| Error::Pin)?;
    self.handle_interrupt().await
  }

  /// Put the controller into its low-power sleep state. Gesture events
  /// keep arriving while asleep when enabled in [`Config`].
  pub async fn suspend(&mut self) -> Result<(), Error<E>> {
    if self.sleep_mode {
      return Ok(());
    }
    if !self.guard.try_enter(WorkState::SleepIn) {
      return Err(Error::Busy);
    }
    self.esd_timer_stop();
    let result = self.write_cmd(reg::Reg::Sleep).await;
    match result {
      Ok(()) => {
        self.sleep_mode = true;
        self.clear_report_state();
      }
      // The panel is still awake; keep the watchdog on it.
      Err(_) => self.esd_timer_start(),
    }
    self.guard.exit();
    result
  }

  /// Wake the controller from sleep and restore its optional-mode setting.
  pub async fn resume(&mut self) -> Result<(), Error<E>> {
    if !self.sleep_mode {
      return Ok(());
    }
    if !self.guard.try_enter(WorkState::SleepOut) {
      return Err(Error::Busy);
    }
    self.sleep_mode = false;
    let result = self.resume_inner().await;
    self.guard.exit();
    result?;
    self.esd_timer_start();
    Ok(())
  }

  async fn resume_inner(&mut self) -> Result<(), Error<E>> {
    self.write_cmd(reg::Reg::Wakeup).await?;
    self.write_reg16(reg::Reg::OptionalSetting, self.optional_mode).await
  }

  /// Detach or re-attach the host from the controller.
  ///
  /// While secure mode is active every register access fails with
  /// [`Error::Busy`] and the watchdog stands down; the bus is assumed to
  /// belong to a trusted execution environment.
  pub fn set_secure_mode(&mut self, enabled: bool) {
    self.secure = enabled;
    if enabled {
      self.esd_timer_stop();
    }
  }

  /// Number of register transactions that exhausted their retries since
  /// the driver was created.
  pub fn comm_err_count(&self) -> u32 {
    self.comm_err_count
  }

  /// Operation currently holding the controller, [`WorkState::Idle`] when
  /// none is running.
  pub fn work_state(&self) -> WorkState {
    self.guard.current()
  }

  /// Capability block read from the chip during [`Zt7650::initialize`].
  pub fn capability(&self) -> &Capability {
    &self.capability
  }

  /// Coordinates of the most recent gesture, for hosts that query them
  /// after a gesture event.
  pub fn scrub(&self) -> Option<(u16, u16)> {
    self.scrub.map(|s| (s.x, s.y))
  }

  /// Number of times more than four fingers were down at once.
  pub fn multi_count(&self) -> u32 {
    self.multi_count
  }

  /// Number of palm contacts seen since the driver was created.
  pub fn palm_count(&self) -> u32 {
    self.palm_count
  }

  /// Where the contact tracked in `slot` first touched down, while it is
  /// still on the glass.
  pub fn pressed_origin(&self, slot: usize) -> Option<(u16, u16)> {
    if slot >= MAX_FINGERS || self.slots[slot].status == event::TouchStatus::None {
      return None;
    }
    Some(self.pressed_origin[slot])
  }
}
