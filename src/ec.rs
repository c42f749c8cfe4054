// Copyright (c) 2026 Omen Fan Utility Contributors
// Licensed under the MIT License

//! EC register access and fan actuation.
//!
//! The EC address space is exposed as a byte-addressable debugfs file
//! (`/sys/kernel/debug/ec/ec0/io`, requires `ec_sys` with write support).
//! All control happens through single-byte reads and writes at fixed
//! offsets.

use std::fs::OpenOptions;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default path of the EC debugfs interface.
pub const DEFAULT_EC_PATH: &str = "/sys/kernel/debug/ec/ec0/io";

// ---------------------------------------------------------------------------
// Register map
// ---------------------------------------------------------------------------

/// Fan 1 duty register.
pub const FAN1_OFFSET: u64 = 0x34;
/// Fan 2 duty register.
pub const FAN2_OFFSET: u64 = 0x35;
/// BIOS fan-control flag register.
pub const BIOS_OFFSET: u64 = 0x62;
/// Firmware timer register, zeroed when claiming manual control.
pub const TIMER_OFFSET: u64 = 0x63;
/// CPU temperature register (degrees Celsius).
pub const CPU_TEMP_OFFSET: u64 = 0x57;
/// GPU temperature register (degrees Celsius).
pub const GPU_TEMP_OFFSET: u64 = 0xB7;
/// Boost control register (read by the probe tool only).
pub const BOOST_OFFSET: u64 = 0xEC;

/// BIOS register value that disables firmware fan management.
pub const BIOS_MANUAL: u8 = 6;
/// BIOS register value that restores firmware fan management.
pub const BIOS_AUTO: u8 = 0;

/// Delay between the BIOS-control write and the timer write when
/// claiming manual control.
const OVERRIDE_SETTLE: Duration = Duration::from_millis(100);

// ---------------------------------------------------------------------------
// Register accessor
// ---------------------------------------------------------------------------

/// Single-byte access to the EC address space.
///
/// Kept narrow so tests can run the control pipeline against an in-memory
/// register image instead of real hardware.
pub trait EcAccess {
    fn read_byte(&self, offset: u64) -> io::Result<u8>;
    fn write_byte(&self, offset: u64, value: u8) -> io::Result<()>;
}

/// The real debugfs-backed EC device.
///
/// Every call opens the device file, seeks, transfers exactly one byte and
/// closes again. No handle survives between calls, so a failed access
/// cannot leave a stale file position behind for the next one.
#[derive(Debug, Clone)]
pub struct EcDev {
    path: PathBuf,
}

impl EcDev {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EcAccess for EcDev {
    fn read_byte(&self, offset: u64) -> io::Result<u8> {
        let mut f = OpenOptions::new().read(true).open(&self.path)?;
        f.seek(SeekFrom::Start(offset))?;
        let mut buf = [0u8; 1];
        f.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    fn write_byte(&self, offset: u64, value: u8) -> io::Result<()> {
        let mut f = OpenOptions::new().write(true).open(&self.path)?;
        f.seek(SeekFrom::Start(offset))?;
        f.write_all(&[value])?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// A CPU/GPU temperature sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TempReading {
    pub cpu: u8,
    pub gpu: u8,
}

impl TempReading {
    /// The hotter of the two sensors; the curve tracks this.
    pub fn max(&self) -> u8 {
        self.cpu.max(self.gpu)
    }
}

/// Read both temperature registers.
pub fn read_temps<E: EcAccess>(ec: &E) -> io::Result<TempReading> {
    let cpu = ec.read_byte(CPU_TEMP_OFFSET)?;
    let gpu = ec.read_byte(GPU_TEMP_OFFSET)?;
    Ok(TempReading { cpu, gpu })
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// Write both fan duty registers for a quantized speed percentage.
///
/// Each fan's raw value is `percent * fan_max / 100`, truncated.
pub fn set_fan_speeds<E: EcAccess>(
    ec: &E,
    percent: u8,
    fan1_max: u8,
    fan2_max: u8,
) -> io::Result<()> {
    ec.write_byte(FAN1_OFFSET, percent_to_raw(percent, fan1_max))?;
    ec.write_byte(FAN2_OFFSET, percent_to_raw(percent, fan2_max))
}

/// Convert a 0-100 percentage to a raw register value for a fan with the
/// given maximum.
pub fn percent_to_raw(percent: u8, fan_max: u8) -> u8 {
    (u32::from(percent) * u32::from(fan_max) / 100) as u8
}

/// Claim manual fan control from the firmware.
///
/// Writes the manual value to the BIOS-control register, waits for it to
/// settle, then zeroes the firmware timer. Idempotent; the daemon calls
/// this every iteration so the firmware cannot quietly take control back.
pub fn assert_override<E: EcAccess>(ec: &E) -> io::Result<()> {
    ec.write_byte(BIOS_OFFSET, BIOS_MANUAL)?;
    std::thread::sleep(OVERRIDE_SETTLE);
    ec.write_byte(TIMER_OFFSET, 0)
}

/// Return fan control to the firmware.
///
/// Re-enables BIOS management and zeroes both fan registers so the
/// firmware starts from a clean state.
pub fn release_override<E: EcAccess>(ec: &E) -> io::Result<()> {
    ec.write_byte(BIOS_OFFSET, BIOS_AUTO)?;
    ec.write_byte(FAN1_OFFSET, 0)?;
    ec.write_byte(FAN2_OFFSET, 0)
}

// ---------------------------------------------------------------------------
// Override guard
// ---------------------------------------------------------------------------

/// Scoped claim of manual fan control.
///
/// Dropping the guard makes one best-effort attempt to restore firmware
/// control, so every exit path out of the control loop releases the
/// override. If the loop already failed on register I/O the restore is
/// likely to fail on the same device; that failure is logged and swallowed.
pub struct OverrideGuard<'a, E: EcAccess> {
    ec: &'a E,
    released: bool,
}

impl<'a, E: EcAccess> OverrideGuard<'a, E> {
    /// Assert the override and return a guard that releases it on drop.
    pub fn claim(ec: &'a E) -> io::Result<Self> {
        assert_override(ec)?;
        Ok(Self {
            ec,
            released: false,
        })
    }

    /// Release the override now, surfacing any I/O error.
    pub fn release(mut self) -> io::Result<()> {
        self.released = true;
        release_override(self.ec)
    }
}

impl<E: EcAccess> Drop for OverrideGuard<'_, E> {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = release_override(self.ec) {
                log::warn!("Failed to restore firmware fan control: {e}");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------


#[cfg(test)]
mod tests {
    use super::mock::MockEc;
    use super::*;
    use std::io::Write as _;

    fn scratch_device() -> (tempfile::TempDir, EcDev) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("io");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(&[0u8; 256]).unwrap();
        (dir, EcDev::new(path))
    }

    #[test]
    fn test_read_write_roundtrip_at_offset() {
        let (_dir, ec) = scratch_device();
        ec.write_byte(FAN1_OFFSET, 42).unwrap();
        assert_eq!(ec.read_byte(FAN1_OFFSET).unwrap(), 42);
        // Neighbouring register untouched
        assert_eq!(ec.read_byte(FAN2_OFFSET).unwrap(), 0);
    }

    #[test]
    fn test_missing_device_is_io_error() {
        let ec = EcDev::new("/nonexistent/ec/io");
        assert!(ec.read_byte(CPU_TEMP_OFFSET).is_err());
        assert!(ec.write_byte(FAN1_OFFSET, 1).is_err());
    }

    #[test]
    fn test_percent_to_raw_truncates() {
        assert_eq!(percent_to_raw(100, 50), 50);
        assert_eq!(percent_to_raw(65, 50), 32);
        assert_eq!(percent_to_raw(0, 50), 0);
    }

    #[test]
    fn test_read_temps_reports_max() {
        let ec = MockEc::new();
        ec.set(CPU_TEMP_OFFSET, 61);
        ec.set(GPU_TEMP_OFFSET, 74);
        let t = read_temps(&ec).unwrap();
        assert_eq!(t.cpu, 61);
        assert_eq!(t.gpu, 74);
        assert_eq!(t.max(), 74);
    }

    #[test]
    fn test_assert_override_is_idempotent() {
        let ec = MockEc::new();
        for _ in 0..3 {
            assert_override(&ec).unwrap();
            assert_eq!(ec.get(BIOS_OFFSET), BIOS_MANUAL);
            assert_eq!(ec.get(TIMER_OFFSET), 0);
        }
    }

    #[test]
    fn test_release_override_restores_auto_and_zeroes_fans() {
        let ec = MockEc::new();
        assert_override(&ec).unwrap();
        set_fan_speeds(&ec, 80, 50, 50).unwrap();
        assert_ne!(ec.get(FAN1_OFFSET), 0);

        release_override(&ec).unwrap();
        assert_eq!(ec.get(BIOS_OFFSET), BIOS_AUTO);
        assert_eq!(ec.get(FAN1_OFFSET), 0);
        assert_eq!(ec.get(FAN2_OFFSET), 0);
    }

    #[test]
    fn test_guard_releases_on_drop() {
        let ec = MockEc::new();
        {
            let _guard = OverrideGuard::claim(&ec).unwrap();
            assert_eq!(ec.get(BIOS_OFFSET), BIOS_MANUAL);
        }
        assert_eq!(ec.get(BIOS_OFFSET), BIOS_AUTO);
    }

    #[test]
    fn test_guard_explicit_release() {
        let ec = MockEc::new();
        let guard = OverrideGuard::claim(&ec).unwrap();
        guard.release().unwrap();
        assert_eq!(ec.get(BIOS_OFFSET), BIOS_AUTO);
        assert_eq!(ec.get(FAN1_OFFSET), 0);
    }
}
