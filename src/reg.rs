//! ZT7650 register map, vendor command window, and protocol constants.
//!
//! Registers are 16-bit addresses transmitted little-endian on the wire.
//! The `0xXXF0` vendor command window is only live after `VCmd::Enable`
//! has been written; it drives the NVM and firmware-flash state machines.

/// Default I²C slave address of the controller.
pub(crate) const I2C_ADDR: u8 = 0x20;

#[allow(dead_code)]
#[repr(u16)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Reg {
  // Command registers, written as a bare 2-byte address
  Swreset = 0x0000,
  Wakeup = 0x0001,
  ClearIntStatus = 0x0003,
  Idle = 0x0004,
  Sleep = 0x0005,
  Calibrate = 0x0006,
  SaveStatus = 0x0007,
  SaveCalibration = 0x0008,
  RecallFactory = 0x000F,

  // Chip identification and version block
  TouchMode = 0x0010,
  ChipRevision = 0x0011,
  FirmwareVersion = 0x0012,
  DataVersion = 0x0013,
  HwId = 0x0014,
  SupportedFingerNum = 0x0015,
  EepromInfo = 0x0018,
  InitialTouchMode = 0x0019,
  VendorId = 0x001C,
  Threshold = 0x0020,
  ProximityDetect = 0x0024,
  PocketDetect = 0x0037,

  // Panel geometry
  TotalNumberOfY = 0x0060,
  TotalNumberOfX = 0x0061,
  ConnectionCheck = 0x0062,

  PowerStateFlag = 0x007E,
  DelayRawForHost = 0x007F,
  Status = 0x0080,
  IconStatus = 0x00AA,
  LpmMode = 0x00AF,
  XResolution = 0x00C0,
  YResolution = 0x00C1,

  IntEnableFlag = 0x00F0,
  PeriodicalInterruptInterval = 0x00F1,

  DebugReg = 0x0115,
  OptionalSetting = 0x0116,
  MinorFwVersion = 0x0121,
  ChecksumResult = 0x012C,
  RejectZoneArea = 0x01AD,

  // Event pipeline
  PointStatus = 0x0200,
  PointStatus1 = 0x0201,
  FodStatus = 0x020A,
  ViStatus = 0x020B,

  CoverControl = 0x023E,
}

impl From<Reg> for u16 {
  fn from(r: Reg) -> u16 {
    r as u16
  }
}

/// Vendor command window. Live only after `Enable` has been written with
/// `0x0001`; used by the boot handshake, firmware updater, and NVM access.
#[allow(dead_code)]
#[repr(u16)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum VCmd {
  Enable = 0x10F0,
  NvmProgStart = 0x11F0,
  NvmInit = 0x12F0,
  NvmWriteEnable = 0x13F0,
  IntnClear = 0x14F0,
  IumLock = 0x15F0,
  IumUnlock = 0x16F0,
  ChipId = 0x17F0,
  RegRead = 0x18F0,
  RegWrite = 0x19F0,
  OscFreqSel = 0x1AF0,
  UpgradeInitFlash = 0x20F0,
  UpgradeWriteFlash = 0x21F0,
  UpgradeReadFlash = 0x22F0,
  UpgradeMode = 0x25F0,
  UpgradeWriteMode = 0x27F0,
  UpgradeMassErase = 0x28F0,
  UpgradeStartPage = 0x29F0,
  UpgradeBlockErase = 0x2AF0,
  IumSave = 0x31F0,
  NvmWrite = 0x34F0,
}

impl From<VCmd> for u16 {
  fn from(c: VCmd) -> u16 {
    c as u16
  }
}

/// Value of [`Reg::ChecksumResult`] when the firmware booted with a valid
/// flash image.
pub(crate) const CORRECT_CHECKSUM: u16 = 0x55AA;

// Power sequencing delays (ms)
pub(crate) const CHIP_ON_DELAY_MS: u32 = 100;
pub(crate) const CHIP_OFF_DELAY_MS: u32 = 300;
pub(crate) const FIRMWARE_ON_DELAY_MS: u32 = 150;
/// Boot-to-checksum wait after a soft reset (ms).
pub(crate) const RESET_CHECKSUM_DELAY_MS: u32 = 300;

// Bus transaction pacing (µs)
pub(crate) const TRANSACTION_DELAY_US: u32 = 50;
pub(crate) const POST_TRANSACTION_DELAY_US: u32 = 10;

/// Bounded retry count for a single register transaction.
pub(crate) const I2C_RETRY_CNT: u32 = 8;

/// Bounded retry count for bring-up scale operations (power sequence,
/// firmware upgrade).
pub(crate) const INIT_RETRY_CNT: u32 = 3;

// Flash geometry
pub(crate) const TC_SECTOR_SZ: usize = 8;
pub(crate) const TC_NVM_SECTOR_SZ: usize = 64;
pub(crate) const TSP_PAGE_SIZE: usize = 1024;
/// Post-page programming (fuzing) delay (µs).
pub(crate) const FUZING_DELAY_US: u32 = 28_000;

/// Maximum number of simultaneously tracked contacts.
pub const MAX_FINGERS: usize = 10;

/// Watchdog re-arm period in seconds.
pub(crate) const CHECK_ESD_TIMER_SECS: u32 = 5;

/// Scan rate used to program the periodic interrupt interval register.
pub(crate) const SCAN_RATE_HZ: u16 = 1000;
pub(crate) const ESD_TIMER_INTERVAL: u16 = 1;

/// IUM (in-chip user memory) window base; NVM byte offsets are addressed
/// relative to this.
pub(crate) const IUM_ADDR_OFFSET: u16 = 0xB000;
