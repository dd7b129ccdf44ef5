//! Linux hidraw transport for the pendant receiver
//!
//! The WHB04B-6 USB receiver shows up as a single hidraw node. Input
//! reports (report ID 0x04) are read non-blocking and forwarded to the
//! engine; display packets go out as feature reports through the
//! `HIDIOCSFEATURE` ioctl, and each transfer is reported back to the engine
//! as a completion event carrying the byte count.
//!
//! SPDX-License-Identifier: GPL-3.0

use std::fs::{File, OpenOptions};
use std::io::{self, Read};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

use crate::devices::{DeviceId, EngineEvent};
use crate::display::{FeatureReportSink, ReportType};
use crate::protocol::{WHB04B6_PRODUCT_ID, XHC_VENDOR_ID};

/// Largest report we expect from the receiver
const READ_BUFFER_LEN: usize = 64;

/// `HIDIOCSFEATURE(len)`: `_IOC(_IOC_WRITE | _IOC_READ, 'H', 0x06, len)`
fn hidiocsfeature(len: usize) -> u64 {
    const IOC_READ_WRITE: u64 = 3;
    (IOC_READ_WRITE << 30) | ((len as u64) << 16) | ((b'H' as u64) << 8) | 0x06
}

/// A matching hidraw node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// `/dev/hidrawN`
    pub path: PathBuf,
    /// `HID_NAME` from the uevent, if present
    pub name: String,
}

/// Whether a hidraw uevent belongs to the pendant receiver
///
/// Matches `HID_ID=<bus>:000010CE:0000EB93`, case-insensitive.
pub fn uevent_matches(uevent: &str) -> bool {
    let wanted = format!("{:08X}:{:08X}", XHC_VENDOR_ID, WHB04B6_PRODUCT_ID);
    uevent
        .lines()
        .filter_map(|line| line.strip_prefix("HID_ID="))
        .any(|id| id.to_ascii_uppercase().ends_with(&wanted))
}

fn uevent_name(uevent: &str) -> String {
    uevent
        .lines()
        .find_map(|line| line.strip_prefix("HID_NAME="))
        .unwrap_or("WHB04B-6")
        .to_string()
}

/// Scan `/sys/class/hidraw` for pendant receivers
pub fn list_devices() -> Result<Vec<DeviceInfo>, HidrawError> {
    list_devices_in(Path::new("/sys/class/hidraw"))
}

fn list_devices_in(hidraw_dir: &Path) -> Result<Vec<DeviceInfo>, HidrawError> {
    if !hidraw_dir.exists() {
        return Ok(Vec::new());
    }

    let mut devices = Vec::new();
    for entry in std::fs::read_dir(hidraw_dir).map_err(HidrawError::IoError)? {
        let entry = entry.map_err(HidrawError::IoError)?;
        let path = entry.path();

        let Ok(uevent) = std::fs::read_to_string(path.join("device/uevent")) else {
            continue;
        };
        if !uevent_matches(&uevent) {
            continue;
        }

        if let Some(node) = path.file_name() {
            devices.push(DeviceInfo {
                path: PathBuf::from("/dev").join(node),
                name: uevent_name(&uevent),
            });
        }
    }

    devices.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(devices)
}

/// First pendant receiver found
pub fn find_device() -> Result<DeviceInfo, HidrawError> {
    list_devices()?
        .into_iter()
        .next()
        .ok_or(HidrawError::DeviceNotFound)
}

/// Open hidraw node of one pendant receiver
pub struct PendantHandler {
    device: DeviceId,
    path: PathBuf,
    file: File,
    event_tx: mpsc::UnboundedSender<EngineEvent>,
}

impl PendantHandler {
    /// Open the node read/write and non-blocking
    pub fn open(path: &Path, event_tx: mpsc::UnboundedSender<EngineEvent>) -> Result<Self, HidrawError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(path)
            .map_err(|e| {
                if e.kind() == io::ErrorKind::PermissionDenied {
                    tracing::error!(
                        path = %path.display(),
                        "Permission denied opening hidraw device. Make sure udev rules are installed."
                    );
                    HidrawError::PermissionDenied
                } else {
                    HidrawError::IoError(e)
                }
            })?;

        tracing::info!(path = %path.display(), "Opened pendant hidraw device");
        Ok(Self {
            device: DeviceId(path.display().to_string()),
            path: path.to_path_buf(),
            file,
            event_tx,
        })
    }

    pub fn device(&self) -> &DeviceId {
        &self.device
    }

    /// Feature report sink sharing this node
    pub fn feature_sink(&self) -> Result<HidrawFeatureSink, HidrawError> {
        Ok(HidrawFeatureSink {
            file: self.file.try_clone().map_err(HidrawError::IoError)?,
            device: self.device.clone(),
            event_tx: self.event_tx.clone(),
        })
    }

    /// Forward input reports until the device goes away
    pub async fn start(&mut self) -> Result<(), HidrawError> {
        let mut buf = [0u8; READ_BUFFER_LEN];

        tracing::info!(path = %self.path.display(), "Listening for pendant reports");

        loop {
            match self.file.read(&mut buf) {
                Ok(0) => {
                    tokio::time::sleep(tokio::time::Duration::from_millis(1)).await;
                }
                Ok(len) => {
                    let event = EngineEvent::Report {
                        device: self.device.clone(),
                        data: buf[..len].to_vec(),
                    };
                    if self.event_tx.send(event).is_err() {
                        tracing::debug!("Engine gone, stopping hidraw reader");
                        return Ok(());
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    tokio::time::sleep(tokio::time::Duration::from_millis(1)).await;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Error reading hidraw device");
                    return Err(HidrawError::IoError(e));
                }
            }
        }
    }
}

/// Sends display packets with `HIDIOCSFEATURE`
pub struct HidrawFeatureSink {
    file: File,
    device: DeviceId,
    event_tx: mpsc::UnboundedSender<EngineEvent>,
}

impl FeatureReportSink for HidrawFeatureSink {
    fn set_report(&mut self, report_id: u8, report_type: ReportType, data: &[u8]) -> bool {
        // data already starts with the report ID
        let mut buf = data.to_vec();

        // SAFETY: buf is a valid, writable buffer of exactly the length
        // encoded in the request and outlives the call.
        let result = unsafe {
            libc::ioctl(
                self.file.as_raw_fd(),
                hidiocsfeature(buf.len()) as _,
                buf.as_mut_ptr(),
            )
        };

        let len = if result < 0 {
            let err = io::Error::last_os_error();
            tracing::warn!(
                device = %self.device,
                report_id = format!("0x{:02X}", report_id),
                error = %err,
                "Feature report failed"
            );
            0
        } else {
            result as usize
        };

        // completion goes through the engine queue, never back into the caller
        self.event_tx
            .send(EngineEvent::FeatureReportComplete {
                device: self.device.clone(),
                report_id,
                report_type,
                len,
            })
            .is_ok()
    }
}

/// Hidraw error type
#[derive(Debug)]
pub enum HidrawError {
    /// Device not found
    DeviceNotFound,
    /// Permission denied
    PermissionDenied,
    /// I/O error
    IoError(std::io::Error),
}

impl std::fmt::Display for HidrawError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HidrawError::DeviceNotFound => write!(f, "WHB04B-6 receiver not found"),
            HidrawError::PermissionDenied => write!(
                f,
                "Permission denied. Ensure udev rules are installed."
            ),
            HidrawError::IoError(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for HidrawError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HidrawError::IoError(e) => Some(e),
            _ => None,
        }
    }
}
