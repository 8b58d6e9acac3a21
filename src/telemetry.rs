//! Read-only view of the control loop for debug getters and app data.
//!
//! The control loop is the only writer; readers on other threads get a copy
//! of the last published tick.

use core::cell::Cell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use thiserror::Error;

use crate::drivers::traction::TractionDebug;

/// First byte of every app-data frame sent to the companion app.
pub const APP_DATA_ID: u8 = 0x65;
pub const COMMAND_TELEMETRY: u8 = 1;
/// Largest app-data frame the host accepts in one packet.
pub const APP_DATA_LEN: usize = 64;

#[derive(Clone, Copy, Debug, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TelemetrySnapshot {
    pub time: f32,
    pub gyro: [f32; 3],
    pub accel: [f32; 3],
    pub duty_cycle: f32,
    pub current: f32,
    pub braking: bool,
    pub abs_erpm: f32,
    pub acceleration: f32,
    /// Averaged acceleration in ERPM/s
    pub erpm_rate: f32,
    pub current_avg: f32,
    pub wheelslip: bool,
    pub pitch_angle: f32,
    pub pitch_filtered: f32,
    pub traction: TractionDebug,
}

impl TelemetrySnapshot {
    pub const ZERO: Self = Self {
        time: 0.0,
        gyro: [0.0; 3],
        accel: [0.0; 3],
        duty_cycle: 0.0,
        current: 0.0,
        braking: false,
        abs_erpm: 0.0,
        acceleration: 0.0,
        erpm_rate: 0.0,
        current_avg: 0.0,
        wheelslip: false,
        pitch_angle: 0.0,
        pitch_filtered: 0.0,
        traction: TractionDebug::ZERO,
    };

    /// Indexed accessor used by the host's debug command. Unknown indices read 0.
    pub fn debug_value(&self, index: i32) -> f32 {
        let t = &self.traction;
        match index {
            1 => self.time,
            2 => self.gyro[0],
            3 => self.gyro[1],
            4 => self.gyro[2],
            5 => self.accel[0],
            6 => self.accel[1],
            7 => self.accel[2],
            8 => self.duty_cycle,
            9 => self.current,
            10 => self.braking as u8 as f32,
            11 => self.abs_erpm,
            12 => self.acceleration,
            13 => self.current_avg,
            14 => self.wheelslip as u8 as f32,
            15 => self.pitch_filtered,
            16 => t.debug1,
            17 => t.debug2,
            18 => t.debug3,
            19 => t.debug4,
            20 => t.debug5,
            21 => t.debug6,
            22 => t.debug7,
            23 => t.debug8,
            24 => t.debug9,
            25 => t.last_reason.map_or(0.0, |r| r.code() as f32),
            26 => self.erpm_rate,
            _ => 0.0,
        }
    }

    /// Serializes the snapshot as `[APP_DATA_ID, COMMAND_TELEMETRY, ...]`
    /// with big-endian floats.
    pub fn encode_app_data(&self) -> Result<heapless::Vec<u8, APP_DATA_LEN>, TelemetryError> {
        let mut buf = heapless::Vec::new();
        self.encode_into(&mut buf)?;
        Ok(buf)
    }

    /// Appends the frame to `buf`, returning the number of bytes written.
    pub fn encode_into<const N: usize>(&self, buf: &mut heapless::Vec<u8, N>) -> Result<usize, TelemetryError> {
        let start = buf.len();
        let mut w = FrameWriter { buf: &mut *buf, needed: start };

        w.put(&[APP_DATA_ID, COMMAND_TELEMETRY]);
        w.put_f32(self.time);
        for v in self.gyro {
            w.put_f32(v);
        }
        for v in self.accel {
            w.put_f32(v);
        }
        w.put_f32(self.duty_cycle);
        w.put_f32(self.current);
        w.put_f32(self.abs_erpm);
        w.put_f32(self.acceleration);
        w.put_f32(self.current_avg);
        w.put_f32(self.pitch_angle);
        w.put_f32(self.pitch_filtered);
        w.put(&[self.wheelslip as u8, self.braking as u8]);
        let reason = self.traction.last_reason.map_or(0, |r| r.code());
        w.put(&reason.to_be_bytes());

        let needed = w.needed;
        if needed > N {
            buf.truncate(start);
            warn!("app data frame needs {} bytes, buffer holds {}", needed, N);
            return Err(TelemetryError::BufferOverflow { needed, capacity: N });
        }
        Ok(needed - start)
    }
}

/// Counts every byte requested so an overflow reports the full frame size.
struct FrameWriter<'a, const N: usize> {
    buf: &'a mut heapless::Vec<u8, N>,
    needed: usize,
}

impl<const N: usize> FrameWriter<'_, N> {
    fn put(&mut self, bytes: &[u8]) {
        self.needed += bytes.len();
        if self.needed <= N {
            let _ = self.buf.extend_from_slice(bytes);
        }
    }

    fn put_f32(&mut self, value: f32) {
        self.put(&value.to_be_bytes());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TelemetryError {
    #[error("app data frame needs {needed} bytes but the buffer holds {capacity}")]
    BufferOverflow { needed: usize, capacity: usize },
}

/// Latest published snapshot, shareable across threads. Usable as a
/// `static` so the control loop can borrow it for `'static`.
pub struct Telemetry {
    latest: Mutex<CriticalSectionRawMutex, Cell<TelemetrySnapshot>>,
}

impl Telemetry {
    pub const fn new() -> Self {
        Self {
            latest: Mutex::new(Cell::new(TelemetrySnapshot::ZERO)),
        }
    }

    pub fn publish(&self, snapshot: TelemetrySnapshot) {
        self.latest.lock(|cell| cell.set(snapshot));
    }

    pub fn latest(&self) -> TelemetrySnapshot {
        self.latest.lock(|cell| cell.get())
    }

    pub fn debug_value(&self, index: i32) -> f32 {
        self.latest().debug_value(index)
    }
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::traction::DeactivationReason;

    fn snapshot() -> TelemetrySnapshot {
        TelemetrySnapshot {
            time: 12.5,
            gyro: [1.0, 2.0, 3.0],
            accel: [0.1, 0.2, 0.9],
            duty_cycle: 0.4,
            current: 22.0,
            braking: false,
            abs_erpm: 8000.0,
            acceleration: 35.0,
            erpm_rate: 35_000.0,
            current_avg: 18.0,
            wheelslip: true,
            pitch_angle: 1.5,
            pitch_filtered: 1.25,
            traction: TractionDebug {
                debug4: 210.0,
                debug5: 2.0,
                last_reason: Some(DeactivationReason::HardTimeout210),
                ..TractionDebug::default()
            },
        }
    }

    #[test]
    fn debug_indices() {
        let s = snapshot();
        assert_eq!(s.debug_value(1), 12.5);
        assert_eq!(s.debug_value(3), 2.0);
        assert_eq!(s.debug_value(7), 0.9);
        assert_eq!(s.debug_value(10), 0.0);
        assert_eq!(s.debug_value(11), 8000.0);
        assert_eq!(s.debug_value(14), 1.0);
        assert_eq!(s.debug_value(19), 210.0);
        assert_eq!(s.debug_value(25), 210.0);
        assert_eq!(s.debug_value(26), 35_000.0);
        assert_eq!(s.debug_value(0), 0.0);
        assert_eq!(s.debug_value(99), 0.0);
        assert_eq!(s.debug_value(-4), 0.0);
    }

    #[test]
    fn app_data_frame_layout() {
        let frame = snapshot().encode_app_data().unwrap();
        assert_eq!(frame.len(), 2 + 14 * 4 + 2 + 2);
        assert_eq!(&frame[..2], &[APP_DATA_ID, COMMAND_TELEMETRY]);
        assert_eq!(&frame[2..6], &12.5f32.to_be_bytes());
        assert_eq!(&frame[58..60], &[1, 0]);
        assert_eq!(&frame[60..62], &210u16.to_be_bytes());
    }

    #[test]
    fn overflow_is_reported_and_buffer_untouched() {
        let mut buf = heapless::Vec::<u8, 16>::new();
        buf.push(0xAA).unwrap();
        let err = snapshot().encode_into(&mut buf).unwrap_err();
        assert_eq!(
            err,
            TelemetryError::BufferOverflow {
                needed: 63,
                capacity: 16
            }
        );
        assert_eq!(buf.as_slice(), &[0xAA]);
    }

    #[test]
    fn publish_then_read_back() {
        let telemetry = Telemetry::new();
        assert_eq!(telemetry.debug_value(11), 0.0);
        telemetry.publish(snapshot());
        assert_eq!(telemetry.debug_value(11), 8000.0);
        assert!(telemetry.latest().wheelslip);
    }

    static SHARED: Telemetry = Telemetry::new();

    #[test]
    fn static_cell_starts_zeroed_and_publishes() {
        assert_eq!(SHARED.debug_value(1), 0.0);
        assert_eq!(SHARED.latest().traction.last_reason, None);

        SHARED.publish(snapshot());
        assert_eq!(SHARED.debug_value(1), 12.5);
        assert_eq!(SHARED.debug_value(25), 210.0);
    }
}
