/// Operation currently holding the controller.
///
/// Long-running operations (firmware upgrade, calibration, watchdog
/// recovery, the interrupt pipeline itself) are mutually exclusive; each
/// claims the controller through [`WorkGuard::try_enter`] and releases it
/// with [`WorkGuard::exit`], including on its error paths.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WorkState {
  #[default]
  Idle,
  Normal,
  EsdTimer,
  EarlySuspend,
  Suspend,
  Resume,
  Upgrade,
  Remove,
  SetMode,
  Calibration,
  RawData,
  Probe,
  SleepIn,
  SleepOut,
}

/// Single transition point for [`WorkState`].
#[derive(Debug, Default)]
pub(crate) struct WorkGuard {
  state: WorkState,
}

impl WorkGuard {
  /// Claim the controller for `next`. Succeeds only when no other
  /// operation holds it.
  pub(crate) fn try_enter(&mut self, next: WorkState) -> bool {
    if self.state != WorkState::Idle {
      return false;
    }
    self.state = next;
    true
  }

  /// Release the controller.
  pub(crate) fn exit(&mut self) {
    self.state = WorkState::Idle;
  }

  pub(crate) fn current(&self) -> WorkState {
    self.state
  }
}
