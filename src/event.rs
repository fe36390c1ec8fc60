//! Interrupt-driven event pipeline.
//!
//! Each asserted interrupt carries one or more 10-byte point records. The
//! first record doubles as a status word: its event id routes the payload to
//! the coordinate decoder, the low-power gesture decoder, or the raw-data
//! path, and its `left_event` field says how many further records follow.

use embedded_hal::digital::InputPin;
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::digital::Wait;
use embedded_hal_async::i2c::{I2c, SevenBitAddress};

use heapless::Vec;

use crate::config::TouchMode;
use crate::power::{PowerRail, PowerTarget};
use crate::reg::{Reg, MAX_FINGERS};
use crate::state::WorkState;
use crate::{Error, Zt7650};

const POINT_RECORD_LEN: usize = 10;
const POINT_READ_RETRY: u32 = 10;

// First-record event ids.
const EID_COORDINATE: u8 = 0;
const EID_GESTURE: u8 = 1;
const EID_CUSTOM: u8 = 2;

// Gesture record ids, carried in the tid field.
const GESTURE_SWIPE_UP: u8 = 0;
const GESTURE_DOUBLE_TAP: u8 = 1;
const GESTURE_FINGERPRINT: u8 = 2;
const GESTURE_SINGLE_TAP: u8 = 3;

/// Per-slot contact lifecycle reported by the chip.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TouchStatus {
  #[default]
  None,
  Press,
  Move,
  Release,
}

/// What the chip believes the contact is.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TouchKind {
  #[default]
  Normal,
  Hover,
  FlipCover,
  Glove,
  Stylus,
  Palm,
  Wet,
  Proximity,
}

impl TouchKind {
  fn from_code(code: u8) -> Self {
    match code {
      1 => TouchKind::Hover,
      2 => TouchKind::FlipCover,
      3 => TouchKind::Glove,
      4 => TouchKind::Stylus,
      5 => TouchKind::Palm,
      6 => TouchKind::Wet,
      7 => TouchKind::Proximity,
      _ => TouchKind::Normal,
    }
  }
}

/// Edge of a contact's lifetime within a reported frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TouchPhase {
  Start,
  Move,
  End,
}

/// Horizontal band a contact falls into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PanelColumn {
  LeftEdge,
  Center,
  RightEdge,
}

/// Vertical band a contact falls into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PanelRow {
  Indicator,
  Center,
  Navigation,
}

/// Coarse panel region, classified from the zone insets in
/// [`Config`](crate::Config).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TouchZone {
  pub column: PanelColumn,
  pub row: PanelRow,
}

/// Low-power gesture events, only reported when the matching enable is set
/// in [`Config`](crate::Config).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Gesture {
  /// Swipe-up while the panel sleeps.
  Spay,
  /// Double tap used as a wake trigger.
  WakeDoubleTap,
  /// Double tap on the always-on display, with coordinates in
  /// [`Zt7650::scrub`].
  AodDoubleTap,
  SingleTap,
  FodPress,
  FodRelease,
  /// The finger left the fingerprint sensing area.
  FodOut,
}

/// One contact transition within a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Touch {
  pub slot: u8,
  pub phase: TouchPhase,
  pub x: u16,
  pub y: u16,
  /// Contact strength; the chip reports 0 for saturated contacts, mapped
  /// up to 1 so a live contact never carries zero pressure.
  pub z: u8,
  pub major: u8,
  pub minor: u8,
  pub kind: TouchKind,
  pub zone: TouchZone,
}

/// Decoded state of one tracking slot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Contact {
  pub status: TouchStatus,
  pub x: u16,
  pub y: u16,
  pub z: u8,
  pub major: u8,
  pub minor: u8,
  pub kind: TouchKind,
  pub noise: u8,
  pub max_sense: u8,
}

/// Result of one serviced interrupt.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Frame {
  /// Contact transitions since the previous frame.
  Touches(Vec<Touch, MAX_FINGERS>),
  Gesture(Gesture),
  /// The interrupt carried nothing reportable.
  Idle,
  /// The pipeline could not service the interrupt; any tracked contacts
  /// were released.
  Dropped,
}

/// Coordinates attached to the most recent gesture.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Scrub {
  pub x: u16,
  pub y: u16,
}

/// Raw 10-byte point record, field access by shift and mask.
#[derive(Clone, Copy)]
struct PointRecord([u8; POINT_RECORD_LEN]);

impl PointRecord {
  fn eid(&self) -> u8 {
    self.0[0] & 0x03
  }

  fn tid(&self) -> u8 {
    (self.0[0] >> 2) & 0x0F
  }

  fn status(&self) -> TouchStatus {
    match self.0[0] >> 6 {
      1 => TouchStatus::Press,
      2 => TouchStatus::Move,
      3 => TouchStatus::Release,
      _ => TouchStatus::None,
    }
  }

  fn x(&self) -> u16 {
    (self.0[1] as u16) << 4 | (self.0[3] >> 4) as u16
  }

  fn y(&self) -> u16 {
    (self.0[2] as u16) << 4 | (self.0[3] & 0x0F) as u16
  }

  fn major(&self) -> u8 {
    self.0[4]
  }

  fn minor(&self) -> u8 {
    self.0[5]
  }

  fn z(&self) -> u8 {
    self.0[6] & 0x3F
  }

  fn left_event(&self) -> u8 {
    self.0[7] & 0x3F
  }

  fn kind(&self) -> TouchKind {
    let code = (self.0[6] >> 6) << 2 | self.0[7] >> 6;
    TouchKind::from_code(code)
  }

  fn noise(&self) -> u8 {
    self.0[8]
  }

  fn max_sense(&self) -> u8 {
    self.0[9]
  }

  /// Gesture records pack their coordinates differently from coordinate
  /// records.
  fn gesture_point(&self) -> (u16, u16) {
    let x = ((self.0[2] as u16) << 4) & 0xFF0 | (self.0[4] >> 4) as u16;
    let y = ((self.0[3] as u16) << 4) & 0xFF0 | (self.0[4] & 0x0F) as u16;
    (x, y)
  }
}

impl<I, E, INT, P, D> Zt7650<I, INT, P, D>
where
  I: I2c<SevenBitAddress, Error = E>,
  INT: Wait + InputPin,
  P: PowerRail,
  D: DelayNs,
{
  /// Service one asserted interrupt.
  ///
  /// Returns [`Frame::Idle`] when the line was not actually asserted or the
  /// records carried nothing reportable, and [`Frame::Dropped`] when the
  /// controller was held by another operation or had to be recovered.
  pub async fn handle_interrupt(&mut self) -> Result<Frame, Error<E>> {
    // The line is active low; a high level here is a spurious wakeup.
    if self.int.is_high().map_err(|_| Error::Pin)? {
      return Ok(Frame::Idle);
    }

    if !self.guard.try_enter(WorkState::Normal) {
      self.write_cmd(Reg::ClearIntStatus).await?;
      self.clear_report_state();
      return Ok(Frame::Dropped);
    }
    self.esd_timer_stop();

    let result = self.handle_interrupt_inner().await;

    self.guard.exit();
    self.esd_timer_start();
    result
  }

  async fn handle_interrupt_inner(&mut self) -> Result<Frame, Error<E>> {
    // Diagnostic modes deliver node frames, read separately through
    // `read_raw_frame`.
    if self.touch_mode != TouchMode::Point {
      self.write_cmd(Reg::ClearIntStatus).await?;
      return Ok(Frame::Idle);
    }

    let mut first = [0u8; POINT_RECORD_LEN];
    if self.read_records(Reg::PointStatus, &mut first).await.is_err() {
      self.recover().await?;
      return Ok(Frame::Dropped);
    }
    let first = PointRecord(first);

    match first.eid() {
      EID_GESTURE => {
        let gesture = self.decode_gesture(&first);
        self.write_cmd(Reg::ClearIntStatus).await?;
        Ok(gesture.map_or(Frame::Idle, Frame::Gesture))
      }
      EID_CUSTOM => {
        self.write_cmd(Reg::ClearIntStatus).await?;
        Ok(Frame::Idle)
      }
      EID_COORDINATE => self.decode_coordinates(first).await,
      _ => {
        self.write_cmd(Reg::ClearIntStatus).await?;
        Ok(Frame::Idle)
      }
    }
  }

  async fn decode_coordinates(&mut self, first: PointRecord) -> Result<Frame, Error<E>> {
    let left = (first.left_event() as usize).min(MAX_FINGERS - 1);
    let mut rest = [0u8; (MAX_FINGERS - 1) * POINT_RECORD_LEN];
    if left > 0 {
      let buf = &mut rest[..left * POINT_RECORD_LEN];
      if self.read_records(Reg::PointStatus1, buf).await.is_err() {
        self.recover().await?;
        return Ok(Frame::Dropped);
      }
    }
    self.write_cmd(Reg::ClearIntStatus).await?;

    self.prev_slots = self.slots;
    self.slots = [Contact::default(); MAX_FINGERS];

    let noise = first.noise() != 0;
    if self.noise_mode != Some(noise) {
      self.noise_mode = Some(noise);
    }

    for idx in 0..=left {
      let record = if idx == 0 {
        first
      } else {
        let off = (idx - 1) * POINT_RECORD_LEN;
        let mut raw = [0u8; POINT_RECORD_LEN];
        raw.copy_from_slice(&rest[off..off + POINT_RECORD_LEN]);
        PointRecord(raw)
      };

      let slot = record.tid() as usize;
      if slot >= MAX_FINGERS {
        continue;
      }
      let kind = record.kind();
      if record.status() == TouchStatus::None && kind != TouchKind::Proximity {
        continue;
      }
      self.slots[slot] = Contact {
        status: record.status(),
        x: record.x(),
        y: record.y(),
        z: record.z().max(1),
        major: record.major(),
        minor: record.minor(),
        kind,
        noise: record.noise(),
        max_sense: record.max_sense(),
      };
    }

    Ok(self.report_transitions())
  }

  fn report_transitions(&mut self) -> Frame {
    let mut touches: Vec<Touch, MAX_FINGERS> = Vec::new();

    for slot in 0..MAX_FINGERS {
      let cur = self.slots[slot];
      let prev = self.prev_slots[slot];

      let phase = match (prev.status, cur.status) {
        (TouchStatus::None | TouchStatus::Release, TouchStatus::Press) => TouchPhase::Start,
        (_, TouchStatus::Press | TouchStatus::Move) => TouchPhase::Move,
        (TouchStatus::Press | TouchStatus::Move, TouchStatus::Release) => TouchPhase::End,
        _ => continue,
      };

      match phase {
        TouchPhase::Start => {
          if cur.x > self.config.x_resolution || cur.y > self.config.y_resolution {
            self.slots[slot] = Contact::default();
            continue;
          }
          self.pressed_origin[slot] = (cur.x, cur.y);
          self.move_count[slot] = 0;
          self.finger_cnt += 1;
          if self.finger_cnt > 4 && !self.check_multi {
            self.check_multi = true;
            self.multi_count += 1;
          }
          if cur.kind == TouchKind::Palm {
            self.palm_count += 1;
          }
        }
        TouchPhase::Move => {
          self.move_count[slot] = self.move_count[slot].saturating_add(1);
        }
        TouchPhase::End => {
          self.finger_cnt = self.finger_cnt.saturating_sub(1);
          if self.finger_cnt == 0 {
            self.check_multi = false;
          }
        }
      }

      // A release record carries no coordinates worth trusting; report the
      // last tracked position.
      let (x, y) = if phase == TouchPhase::End { (prev.x, prev.y) } else { (cur.x, cur.y) };
      let source = if phase == TouchPhase::End { prev } else { cur };
      let touch = Touch {
        slot: slot as u8,
        phase,
        x,
        y,
        z: source.z,
        major: source.major,
        minor: source.minor,
        kind: source.kind,
        zone: self.classify_zone(x, y),
      };
      if touches.push(touch).is_err() {
        break;
      }
      if phase == TouchPhase::End {
        self.slots[slot] = Contact::default();
      }
    }

    if touches.is_empty() {
      Frame::Idle
    } else {
      Frame::Touches(touches)
    }
  }

  fn decode_gesture(&mut self, record: &PointRecord) -> Option<Gesture> {
    let (x, y) = record.gesture_point();
    match record.tid() {
      GESTURE_SWIPE_UP if self.config.spay_enable => {
        self.scrub = Some(Scrub { x, y });
        Some(Gesture::Spay)
      }
      GESTURE_DOUBLE_TAP => {
        if record.0[1] == 1 && self.config.aot_enable {
          Some(Gesture::WakeDoubleTap)
        } else if record.0[1] == 0 && self.config.aod_enable {
          self.scrub = Some(Scrub { x, y });
          Some(Gesture::AodDoubleTap)
        } else {
          None
        }
      }
      GESTURE_FINGERPRINT if self.config.fod_enable => match record.0[1] {
        0 | 1 => {
          self.scrub = Some(Scrub { x, y });
          Some(Gesture::FodPress)
        }
        2 => Some(Gesture::FodRelease),
        3 => Some(Gesture::FodOut),
        _ => None,
      },
      GESTURE_SINGLE_TAP if self.config.singletap_enable => {
        self.scrub = Some(Scrub { x, y });
        Some(Gesture::SingleTap)
      }
      _ => None,
    }
  }

  fn classify_zone(&self, x: u16, y: u16) -> TouchZone {
    let column = if x < self.config.area_edge {
      PanelColumn::LeftEdge
    } else if x >= self.config.x_resolution.saturating_sub(self.config.area_edge) {
      PanelColumn::RightEdge
    } else {
      PanelColumn::Center
    };
    let row = if y < self.config.area_indicator {
      PanelRow::Indicator
    } else if y >= self.config.y_resolution.saturating_sub(self.config.area_navigation) {
      PanelRow::Navigation
    } else {
      PanelRow::Center
    };
    TouchZone { column, row }
  }

  /// Bounded re-read of a point record block. The early records are latched
  /// until the interrupt is cleared, so a retry sees the same data.
  async fn read_records(&mut self, reg: Reg, buf: &mut [u8]) -> Result<(), Error<E>> {
    let mut attempt = 0;
    loop {
      match self.read_data(reg, buf).await {
        Ok(()) => return Ok(()),
        Err(e) => {
          attempt += 1;
          if attempt >= POINT_READ_RETRY {
            return Err(e);
          }
          self.delay.delay_ms(1).await;
        }
      }
    }
  }

  /// Power-cycle recovery after the event pipeline lost the bus.
  async fn recover(&mut self) -> Result<(), Error<E>> {
    self.power_control(PowerTarget::Off).await?;
    self.power_control(PowerTarget::OnSequence).await?;
    self.clear_report_state();
    self.mini_init().await
  }

  /// Forget all tracked contacts, as after a reset or a dropped frame.
  pub(crate) fn clear_report_state(&mut self) {
    self.slots = [Contact::default(); MAX_FINGERS];
    self.prev_slots = [Contact::default(); MAX_FINGERS];
    self.pressed_origin = [(0, 0); MAX_FINGERS];
    self.move_count = [0; MAX_FINGERS];
    self.finger_cnt = 0;
    self.check_multi = false;
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::Config;
  use crate::testutil::*;

  fn press_record(x: u16, y: u16, z: u8) -> [u8; 10] {
    let b0 = 0x40; // coordinate event, slot 0, press
    let b1 = (x >> 4) as u8;
    let b2 = (y >> 4) as u8;
    let b3 = ((x as u8) << 4) | (y as u8 & 0x0F);
    [b0, b1, b2, b3, 5, 3, z & 0x3F, 0, 0, 7]
  }

  #[test]
  fn record_fields_unpack() {
    let r = PointRecord([0x40, 0x06, 0x0C, 0x48, 5, 3, 0x32, 0x00, 0x02, 0x07]);
    assert_eq!(r.eid(), EID_COORDINATE);
    assert_eq!(r.tid(), 0);
    assert_eq!(r.status(), TouchStatus::Press);
    assert_eq!(r.x(), 100);
    assert_eq!(r.y(), 200);
    assert_eq!(r.major(), 5);
    assert_eq!(r.minor(), 3);
    assert_eq!(r.z(), 50);
    assert_eq!(r.left_event(), 0);
    assert_eq!(r.kind(), TouchKind::Normal);
    assert_eq!(r.noise(), 2);
    assert_eq!(r.max_sense(), 7);
  }

  #[test]
  fn record_kind_spans_both_bytes() {
    // Type code 7 (proximity) splits as 0b01 in byte 6 and 0b11 in byte 7.
    let r = PointRecord([0x00, 0, 0, 0, 0, 0, 0x40, 0xC0, 0, 0]);
    assert_eq!(r.kind(), TouchKind::Proximity);
  }

  #[test]
  fn gesture_point_unpacks() {
    let r = PointRecord([0x05, 0x01, 0x1F, 0x2A, 0x4B, 0, 0, 0, 0, 0]);
    assert_eq!(r.gesture_point(), (0x1F4, 0x2AB));
  }

  #[test]
  fn single_press_reports_start() {
    let mut i2c = ScriptI2c::new();
    i2c.expect_write(&[0x00, 0x02]);
    i2c.expect_read(&press_record(100, 200, 50));
    i2c.expect_write(&[0x03, 0x00]);
    let mut dev = test_driver(i2c);
    dev.force_powered();

    let frame = block_on(dev.handle_interrupt()).unwrap();
    let Frame::Touches(touches) = frame else { panic!("expected touches, got {frame:?}") };
    assert_eq!(touches.len(), 1);
    let t = &touches[0];
    assert_eq!(t.slot, 0);
    assert_eq!(t.phase, TouchPhase::Start);
    assert_eq!((t.x, t.y), (100, 200));
    assert_eq!(t.z, 50);
    assert_eq!(t.zone.column, PanelColumn::Center);
    assert_eq!(t.zone.row, PanelRow::Center);
    assert!(dev.i2c_script_done());
    assert!(dev.esd_armed());
  }

  #[test]
  fn release_reports_end_at_last_position() {
    let mut i2c = ScriptI2c::new();
    i2c.expect_write(&[0x00, 0x02]);
    i2c.expect_read(&press_record(100, 200, 50));
    i2c.expect_write(&[0x03, 0x00]);
    let mut release = press_record(0, 0, 0);
    release[0] = 0xC0; // slot 0, release
    i2c.expect_write(&[0x00, 0x02]);
    i2c.expect_read(&release);
    i2c.expect_write(&[0x03, 0x00]);
    let mut dev = test_driver(i2c);
    dev.force_powered();

    block_on(dev.handle_interrupt()).unwrap();
    let frame = block_on(dev.handle_interrupt()).unwrap();
    let Frame::Touches(touches) = frame else { panic!("expected touches, got {frame:?}") };
    assert_eq!(touches[0].phase, TouchPhase::End);
    assert_eq!((touches[0].x, touches[0].y), (100, 200));
  }

  #[test]
  fn out_of_bounds_press_is_skipped() {
    let mut i2c = ScriptI2c::new();
    i2c.expect_write(&[0x00, 0x02]);
    i2c.expect_read(&press_record(2000, 200, 50));
    i2c.expect_write(&[0x03, 0x00]);
    let mut dev = test_driver(i2c);
    dev.force_powered();

    let frame = block_on(dev.handle_interrupt()).unwrap();
    assert_eq!(frame, Frame::Idle);
  }

  #[test]
  fn edge_press_classifies_zone() {
    let mut i2c = ScriptI2c::new();
    i2c.expect_write(&[0x00, 0x02]);
    i2c.expect_read(&press_record(10, 2300, 50));
    i2c.expect_write(&[0x03, 0x00]);
    let mut dev = test_driver(i2c);
    dev.force_powered();

    let frame = block_on(dev.handle_interrupt()).unwrap();
    let Frame::Touches(touches) = frame else { panic!("expected touches, got {frame:?}") };
    assert_eq!(touches[0].zone.column, PanelColumn::LeftEdge);
    assert_eq!(touches[0].zone.row, PanelRow::Navigation);
  }

  #[test]
  fn wake_double_tap_decodes_when_enabled() {
    let mut i2c = ScriptI2c::new();
    i2c.expect_write(&[0x00, 0x02]);
    i2c.expect_read(&[0x05, 0x01, 0, 0, 0, 0, 0, 0, 0, 0]);
    i2c.expect_write(&[0x03, 0x00]);
    let mut dev = test_driver_with_config(i2c, Config::new(1080, 2316).with_aot(true));
    dev.force_powered();

    let frame = block_on(dev.handle_interrupt()).unwrap();
    assert_eq!(frame, Frame::Gesture(Gesture::WakeDoubleTap));
  }

  #[test]
  fn disabled_gesture_is_not_reported() {
    let mut i2c = ScriptI2c::new();
    i2c.expect_write(&[0x00, 0x02]);
    i2c.expect_read(&[0x05, 0x01, 0, 0, 0, 0, 0, 0, 0, 0]);
    i2c.expect_write(&[0x03, 0x00]);
    let mut dev = test_driver(i2c);
    dev.force_powered();

    let frame = block_on(dev.handle_interrupt()).unwrap();
    assert_eq!(frame, Frame::Idle);
  }

  #[test]
  fn spay_records_scrub_position() {
    let mut i2c = ScriptI2c::new();
    i2c.expect_write(&[0x00, 0x02]);
    i2c.expect_read(&[0x01, 0x00, 0x1F, 0x2A, 0x4B, 0, 0, 0, 0, 0]);
    i2c.expect_write(&[0x03, 0x00]);
    let mut dev = test_driver_with_config(i2c, Config::new(1080, 2316).with_spay(true));
    dev.force_powered();

    let frame = block_on(dev.handle_interrupt()).unwrap();
    assert_eq!(frame, Frame::Gesture(Gesture::Spay));
    assert_eq!(dev.scrub(), Some((0x1F4, 0x2AB)));
  }

  #[test]
  fn spurious_interrupt_touches_nothing() {
    let mut dev = test_driver(ScriptI2c::new());
    dev.force_powered();
    dev.int_pin_mut().low = false;

    let frame = block_on(dev.handle_interrupt()).unwrap();
    assert_eq!(frame, Frame::Idle);
    assert!(dev.i2c_script_done());
  }

  #[test]
  fn held_controller_drops_the_frame() {
    let mut i2c = ScriptI2c::new();
    i2c.expect_write(&[0x03, 0x00]);
    let mut dev = test_driver(i2c);
    dev.force_powered();
    assert!(dev.guard.try_enter(WorkState::SetMode));

    let frame = block_on(dev.handle_interrupt()).unwrap();
    assert_eq!(frame, Frame::Dropped);
    assert!(dev.i2c_script_done());
  }

  #[test]
  fn unreadable_records_trigger_recovery() {
    let mut i2c = ScriptI2c::new();
    for _ in 0..POINT_READ_RETRY {
      i2c.expect_write(&[0x00, 0x02]);
      i2c.expect_read_fail();
    }
    expect_clean_boot(&mut i2c);
    expect_mini_init(&mut i2c);
    let mut dev = test_driver(i2c);
    dev.force_powered();

    let frame = block_on(dev.handle_interrupt()).unwrap();
    assert_eq!(frame, Frame::Dropped);
    assert_eq!(dev.rail().off_count, 1);
    assert_eq!(dev.rail().on_count, 1);
    assert!(dev.i2c_script_done());
  }

  #[test]
  fn five_fingers_count_as_multi() {
    let mut dev = test_driver(ScriptI2c::new());
    dev.force_powered();
    for slot in 0..5 {
      dev.slots[slot] = Contact { status: TouchStatus::Press, x: 100, y: 100, z: 10, ..Contact::default() };
      dev.report_transitions();
      dev.prev_slots = dev.slots;
    }
    assert_eq!(dev.multi_count(), 1);
    assert_eq!(dev.finger_cnt, 5);
  }
}
