//! Host-driven ESD watchdog.
//!
//! The chip is programmed to raise a periodic heartbeat interrupt; the host
//! runs a timer that is pushed back every time the pipeline services an
//! event. When the timer fires the chip has stopped talking, usually after
//! an ESD strike, and gets power-cycled back to life. The driver owns the
//! armed/disarmed state; the platform owns the actual timer and calls
//! [`Zt7650::esd_timeout`] on expiry.

use embedded_hal::digital::InputPin;
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::digital::Wait;
use embedded_hal_async::i2c::{I2c, SevenBitAddress};

use crate::power::{PowerRail, PowerTarget};
use crate::reg;
use crate::state::WorkState;
use crate::{Error, Zt7650};

/// Result of servicing a watchdog expiry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EsdOutcome {
  /// The chip was power-cycled and re-initialized.
  Recovered,
  /// Another operation holds the controller; the timer was re-armed and
  /// the expiry should be retried after the next period.
  Deferred,
  /// Secure mode owns the bus; the watchdog stands down until the host
  /// re-attaches.
  Disarmed,
}

impl<I, E, INT, P, D> Zt7650<I, INT, P, D>
where
  I: I2c<SevenBitAddress, Error = E>,
  INT: Wait + InputPin,
  P: PowerRail,
  D: DelayNs,
{
  /// Arm the watchdog. Skipped while the panel sleeps, where the heartbeat
  /// interrupt is off.
  pub(crate) fn esd_timer_start(&mut self) {
    if self.sleep_mode || self.secure {
      return;
    }
    self.esd_armed = true;
  }

  pub(crate) fn esd_timer_stop(&mut self) {
    self.esd_armed = false;
  }

  /// Whether the platform timer should currently be running.
  pub fn esd_armed(&self) -> bool {
    self.esd_armed
  }

  /// Watchdog period the platform timer should use, in seconds.
  pub fn esd_period_secs(&self) -> u32 {
    reg::CHECK_ESD_TIMER_SECS
  }

  /// Service a watchdog expiry.
  ///
  /// Performs at most one power cycle per call. Callers re-arm their timer
  /// whenever [`Zt7650::esd_armed`] is true afterwards.
  pub async fn esd_timeout(&mut self) -> Result<EsdOutcome, Error<E>> {
    if self.secure {
      self.esd_timer_stop();
      return Ok(EsdOutcome::Disarmed);
    }

    if !self.guard.try_enter(WorkState::EsdTimer) {
      self.esd_timer_start();
      return Ok(EsdOutcome::Deferred);
    }

    let result = self.esd_recover().await;
    self.guard.exit();
    self.esd_timer_start();
    result?;
    Ok(EsdOutcome::Recovered)
  }

  async fn esd_recover(&mut self) -> Result<(), Error<E>> {
    self.power_control(PowerTarget::Off).await?;
    self.power_control(PowerTarget::OnSequence).await?;
    self.clear_report_state();
    self.mini_init().await
  }
}
