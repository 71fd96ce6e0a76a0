//! Shared HID transport helpers.
//!
//! Thin wrappers over `hidapi` used by every driver: opening by VID/PID,
//! report-id-prefixed writes, bounded reads, and the enumeration dump the
//! diagnostic probes print.

use hidapi::{HidApi, HidDevice};
use std::time::{Duration, Instant};

use crate::error::{PanelError, Result};

/// Poll slice for bounded reads.
const READ_POLL: Duration = Duration::from_millis(50);

/// Default probe/init response timeout.
pub const READ_TIMEOUT: Duration = Duration::from_secs(2);

/// Open the first HID interface matching `vid:pid`.
pub fn open_device(api: &HidApi, vid: u16, pid: u16) -> Result<HidDevice> {
    api.open(vid, pid).map_err(|e| {
        PanelError::Connection(format!(
            "cannot open {:04x}:{:04x}: {e}",
            vid, pid
        ))
    })
}

/// Write one output report with the conventional report id 0 prefix.
pub fn write_report(device: &HidDevice, payload: &[u8]) -> Result<()> {
    let mut report = Vec::with_capacity(payload.len() + 1);
    report.push(0x00);
    report.extend_from_slice(payload);
    device.write(&report)?;
    Ok(())
}

/// Read up to `size` bytes, polling until data arrives or `timeout`
/// expires. Returns `None` on timeout; transport errors propagate.
pub fn read_with_timeout(device: &HidDevice, size: usize, timeout: Duration) -> Result<Option<Vec<u8>>> {
    let deadline = Instant::now() + timeout;
    let mut buf = vec![0u8; size];
    while Instant::now() < deadline {
        let n = device.read_timeout(&mut buf, READ_POLL.as_millis() as i32)?;
        if n > 0 {
            buf.truncate(n);
            return Ok(Some(buf));
        }
    }
    Ok(None)
}

/// Hex rendering of `data`, truncated to `max_bytes`.
pub fn hex_dump(data: &[u8], max_bytes: usize) -> String {
    let shown = &data[..data.len().min(max_bytes)];
    let mut out = shown
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ");
    if data.len() > max_bytes {
        out.push_str(&format!(" ... ({} bytes total)", data.len()));
    }
    out
}

/// Print every HID interface enumerated for `vid:pid`. Part of the
/// diagnostic report, so it goes to stdout rather than the log.
pub fn print_hid_info(api: &HidApi, vid: u16, pid: u16) {
    println!("--- HID Device Info ---");
    let interfaces: Vec<_> = api
        .device_list()
        .filter(|d| d.vendor_id() == vid && d.product_id() == pid)
        .collect();
    if interfaces.is_empty() {
        println!("  No HID interfaces found for {vid:#06x}:{pid:#06x}");
        return;
    }
    let multi = interfaces.len() > 1;
    for (i, dev) in interfaces.iter().enumerate() {
        if multi {
            println!("  Interface #{i}:");
        }
        let prefix = if multi { "    " } else { "  " };
        println!("{prefix}Manufacturer: {}", dev.manufacturer_string().unwrap_or("N/A"));
        println!("{prefix}Product:      {}", dev.product_string().unwrap_or("N/A"));
        println!("{prefix}Serial:       {}", dev.serial_number().unwrap_or("N/A"));
        println!("{prefix}Release:      {}", dev.release_number());
        println!("{prefix}Interface:    {}", dev.interface_number());
        println!(
            "{prefix}Usage:        page={:#06x} usage={:#06x}",
            dev.usage_page(),
            dev.usage()
        );
        println!("{prefix}Path:         {}", dev.path().to_string_lossy());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_hex_dump_truncates() {
        assert_eq!(hex_dump(&[0xDA, 0xDB, 0xDC], 8), "DA DB DC");
        assert_eq!(hex_dump(&[0x00; 5], 2), "00 00 ... (5 bytes total)");
        assert_eq!(hex_dump(&[], 8), "");
    }
}
