//! Trofeo Vision driver (1280x480 JPEG over HID).
//!
//! The only protocol verified against physical hardware. Frames are JPEG
//! payloads carried in 512-byte HID packets:
//!
//! ```text
//! header packet
//!   [0..4]   magic DA DB DC DD
//!   [4]      0x02 (frame command)
//!   [8..12]  00 05 E0 01 (resolution tag)
//!   [12]     0x02
//!   [16..20] payload length, little endian
//!   [20..]   first 492 payload bytes
//! continuation packets
//!   512 payload bytes each, last one zero padded
//! ```
//!
//! The init packet reuses the magic with command 0x00 and byte [12] set;
//! the device answers with a 512-byte identity block. The device sends no
//! per-frame acknowledgment, so the stream never blocks on reads.

use hidapi::{HidApi, HidDevice};
use image::RgbaImage;

use super::hid::{hex_dump, open_device, print_hid_info, read_with_timeout, write_report, READ_TIMEOUT};
use super::{DisplayDriver, FrameFormat, ProtocolStatus};
use crate::error::{PanelError, Result};
use crate::render::FrameProducer;

pub const VENDOR_ID: u16 = 0x0416;
pub const PRODUCT_ID: u16 = 0x5302;

const MAGIC: [u8; 4] = [0xDA, 0xDB, 0xDC, 0xDD];
const PACKET_SIZE: usize = 512;
/// Payload bytes carried by the header packet.
const HEADER_PAYLOAD: usize = PACKET_SIZE - 20;

/// Thermalright Trofeo Vision 1280x480 panel.
#[derive(Default)]
pub struct TrofeoVisionDriver {
    device: Option<HidDevice>,
}

impl TrofeoVisionDriver {
    pub fn new() -> Self {
        Self::default()
    }

    fn device(&self) -> Result<&HidDevice> {
        self.device
            .as_ref()
            .ok_or_else(|| PanelError::Connection("device not open".to_string()))
    }
}

impl DisplayDriver for TrofeoVisionDriver {
    fn device_name(&self) -> &'static str {
        "Trofeo Vision"
    }

    fn vendor_id(&self) -> u16 {
        VENDOR_ID
    }

    fn product_id(&self) -> u16 {
        PRODUCT_ID
    }

    fn display_width(&self) -> u32 {
        1280
    }

    fn display_height(&self) -> u32 {
        480
    }

    fn frame_format(&self) -> FrameFormat {
        FrameFormat::Jpeg
    }

    fn protocol_status(&self) -> ProtocolStatus {
        ProtocolStatus::Verified
    }

    fn open(&mut self, api: &HidApi) -> Result<()> {
        self.device = Some(open_device(api, VENDOR_ID, PRODUCT_ID)?);
        Ok(())
    }

    fn close(&mut self) {
        self.device = None;
    }

    fn send_init(&mut self) -> Result<()> {
        let device = self.device()?;
        write_report(device, &build_init_packet())?;

        match read_with_timeout(device, PACKET_SIZE, READ_TIMEOUT)? {
            Some(response) => {
                let info = InitResponse::decode(&response);
                log::info!(
                    "[{}] init response: magic_ok={} type={:?} board_id={:?}",
                    self.device_name(),
                    info.magic_ok,
                    info.type_bytes,
                    info.board_id_ascii
                );
            }
            None => log::warn!("[{}] no init response received", self.device_name()),
        }
        Ok(())
    }

    fn send_frame(&mut self, frame: &RgbaImage) -> Result<()> {
        let jpeg = FrameProducer::encode_jpeg(frame)?;
        let device = self.device()?;
        for packet in build_frame_packets(&jpeg) {
            write_report(device, &packet)?;
        }
        Ok(())
    }

    fn diagnose(&self, api: &HidApi) {
        print_hid_info(api, VENDOR_ID, PRODUCT_ID);

        println!("\n--- Init Probe ---");
        let device = match open_device(api, VENDOR_ID, PRODUCT_ID) {
            Ok(d) => d,
            Err(e) => {
                println!("  [!] Failed to open HID device: {e}");
                return;
            }
        };

        let init = build_init_packet();
        println!("  Sending {PACKET_SIZE}-byte init packet...");
        println!("  TX (first 32 bytes): {}", hex_dump(&init, 32));
        if let Err(e) = write_report(&device, &init) {
            println!("  [!] Probe error: {e}");
            return;
        }

        match read_with_timeout(&device, PACKET_SIZE, READ_TIMEOUT) {
            Ok(Some(rx)) => {
                println!("  RX ({} bytes):       {}", rx.len(), hex_dump(&rx, 36));
                let info = InitResponse::decode(&rx);
                println!("  Magic valid:    {}", info.magic_ok);
                if let Some((a, b)) = info.type_bytes {
                    println!("  Type [4:6]:     {a:#04x} {b:#04x}");
                }
                if let Some(b12) = info.byte_12 {
                    println!("  Byte [12]:      {b12:#04x}");
                }
                if let Some(b16) = info.byte_16 {
                    println!("  Byte [16]:      {b16:#04x}");
                }
                if let Some(hex) = &info.board_id_hex {
                    println!("  Board ID (hex): {hex}");
                }
                if let Some(ascii) = &info.board_id_ascii {
                    println!("  Board ID (ASCII): {ascii}");
                }
            }
            Ok(None) => println!("  RX: no response within 2s timeout"),
            Err(e) => println!("  [!] Probe error: {e}"),
        }
    }
}

// ============================================================================
// PACKET BUILDERS (pure, tested without hardware)
// ============================================================================

/// The 512-byte init packet: magic, command 0x00, byte [12] set.
pub fn build_init_packet() -> [u8; PACKET_SIZE] {
    let mut init = [0u8; PACKET_SIZE];
    init[0..4].copy_from_slice(&MAGIC);
    init[4] = 0x00;
    init[12] = 0x01;
    init
}

/// Split a JPEG payload into the header packet plus zero-padded
/// continuation packets.
pub fn build_frame_packets(jpeg: &[u8]) -> Vec<[u8; PACKET_SIZE]> {
    let mut header = [0u8; PACKET_SIZE];
    header[0..4].copy_from_slice(&MAGIC);
    header[4] = 0x02;
    header[8..12].copy_from_slice(&[0x00, 0x05, 0xE0, 0x01]);
    header[12] = 0x02;
    header[16..20].copy_from_slice(&(jpeg.len() as u32).to_le_bytes());

    let first = jpeg.len().min(HEADER_PAYLOAD);
    header[20..20 + first].copy_from_slice(&jpeg[..first]);

    let mut packets = vec![header];
    let mut offset = first;
    while offset < jpeg.len() {
        let mut packet = [0u8; PACKET_SIZE];
        let chunk = &jpeg[offset..jpeg.len().min(offset + PACKET_SIZE)];
        packet[..chunk.len()].copy_from_slice(chunk);
        packets.push(packet);
        offset += PACKET_SIZE;
    }
    packets
}

/// Fields decoded from the 512-byte init response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitResponse {
    pub magic_ok: bool,
    pub type_bytes: Option<(u8, u8)>,
    pub byte_12: Option<u8>,
    pub byte_16: Option<u8>,
    pub board_id_hex: Option<String>,
    pub board_id_ascii: Option<String>,
}

impl InitResponse {
    pub fn decode(response: &[u8]) -> Self {
        let magic_ok = response.len() >= 4 && response[0..4] == MAGIC;
        let type_bytes = (response.len() > 5).then(|| (response[4], response[5]));
        let byte_12 = response.get(12).copied();
        let byte_16 = response.get(16).copied();
        let (board_id_hex, board_id_ascii) = if response.len() >= 36 {
            let id = &response[20..36];
            let hex = id.iter().map(|b| format!("{b:02X}")).collect::<String>();
            let ascii = id
                .iter()
                .map(|&b| {
                    if b.is_ascii_graphic() || b == b' ' {
                        b as char
                    } else if b == 0 {
                        '\0'
                    } else {
                        '\u{FFFD}'
                    }
                })
                .collect::<String>()
                .trim_end_matches('\0')
                .to_string();
            (Some(hex), Some(ascii))
        } else {
            (None, None)
        };
        Self {
            magic_ok,
            type_bytes,
            byte_12,
            byte_16,
            board_id_hex,
            board_id_ascii,
        }
    }
}
