//! Diagnostic-only drivers for chipsets awaiting hardware verification.
//!
//! One generic [`StubDriver`] parameterized by a static [`StubSpec`]
//! covers every unverified chipset: the probe packet, expected response
//! size, and response decoding all come from the spec. Streaming entry
//! points fail with a protocol error; the manager routes these drivers to
//! [`DisplayDriver::diagnose`] instead of opening them.

use hidapi::HidApi;
use image::RgbaImage;

use super::hid::{hex_dump, open_device, print_hid_info, read_with_timeout, write_report, READ_TIMEOUT};
use super::protocol::{
    ProtocolDescriptor, ALI, ALI_VARIANT_LARGE, ALI_VARIANT_LARGE2, ALI_VARIANT_SMALL, LIANYUN,
    LIANYUN_V2, XSAIL, XSAIL_INIT_FLAG_INDEX, XSAIL_RESPONSE_LEN,
};
use super::{DisplayDriver, FrameFormat, ProtocolStatus};
use crate::error::{PanelError, Result};

/// Everything that varies between unverified chipsets.
pub struct StubSpec {
    pub name: &'static str,
    pub vendor_id: u16,
    pub product_id: u16,
    /// Placeholder until a real panel reports its resolution.
    pub display_width: u32,
    pub display_height: u32,
    pub descriptor: &'static ProtocolDescriptor,
    /// Extra flag byte set in the init packet, beyond the header.
    pub init_flag: Option<(usize, u8)>,
    /// Bytes to request when reading the probe response.
    pub response_len: usize,
    /// Turn a raw response into report lines.
    pub decode: fn(&[u8]) -> Vec<String>,
}

/// ALi chipset LCD (`0416:5406`).
pub static ALI_SPEC: StubSpec = StubSpec {
    name: "ALi LCD",
    vendor_id: 0x0416,
    product_id: 0x5406,
    display_width: 480,
    display_height: 480,
    descriptor: &ALI,
    init_flag: None,
    response_len: 64,
    decode: decode_ali_response,
};

/// LianYun chipset LCD (`0416:5408`).
pub static LIANYUN_SPEC: StubSpec = StubSpec {
    name: "LianYun LCD",
    vendor_id: 0x0416,
    product_id: 0x5408,
    display_width: 480,
    display_height: 480,
    descriptor: &LIANYUN,
    init_flag: None,
    response_len: 512,
    decode: decode_lianyun_response,
};

/// LianYun V2 chipset LCD (`0416:5409`).
pub static LIANYUN_V2_SPEC: StubSpec = StubSpec {
    name: "LianYun V2 LCD",
    vendor_id: 0x0416,
    product_id: 0x5409,
    display_width: 480,
    display_height: 480,
    descriptor: &LIANYUN_V2,
    init_flag: None,
    response_len: 511,
    decode: decode_lianyun_response,
};

/// Legacy Xsail SoC LCD (`87AD:70DB`).
pub static XSAIL_SPEC: StubSpec = StubSpec {
    name: "Xsail LCD",
    vendor_id: 0x87AD,
    product_id: 0x70DB,
    display_width: 480,
    display_height: 480,
    descriptor: &XSAIL,
    init_flag: Some((XSAIL_INIT_FLAG_INDEX, 1)),
    response_len: XSAIL_RESPONSE_LEN,
    decode: decode_xsail_response,
};

/// Diagnostic-only driver bound to one [`StubSpec`].
pub struct StubDriver {
    spec: &'static StubSpec,
}

impl StubDriver {
    pub fn new(spec: &'static StubSpec) -> Self {
        Self { spec }
    }

    fn unsupported(&self) -> PanelError {
        PanelError::Protocol(format!(
            "{} protocol is unverified; connect to run diagnostics",
            self.spec.name
        ))
    }
}

impl DisplayDriver for StubDriver {
    fn device_name(&self) -> &'static str {
        self.spec.name
    }

    fn vendor_id(&self) -> u16 {
        self.spec.vendor_id
    }

    fn product_id(&self) -> u16 {
        self.spec.product_id
    }

    fn display_width(&self) -> u32 {
        self.spec.display_width
    }

    fn display_height(&self) -> u32 {
        self.spec.display_height
    }

    fn frame_format(&self) -> FrameFormat {
        FrameFormat::Jpeg
    }

    fn protocol_status(&self) -> ProtocolStatus {
        ProtocolStatus::Unverified
    }

    fn open(&mut self, _api: &HidApi) -> Result<()> {
        Err(self.unsupported())
    }

    fn close(&mut self) {}

    fn send_init(&mut self) -> Result<()> {
        Err(self.unsupported())
    }

    fn send_frame(&mut self, _frame: &RgbaImage) -> Result<()> {
        Err(self.unsupported())
    }

    fn diagnose(&self, api: &HidApi) {
        print_hid_info(api, self.spec.vendor_id, self.spec.product_id);

        println!("\n--- Init Probe ---");
        let device = match open_device(api, self.spec.vendor_id, self.spec.product_id) {
            Ok(d) => d,
            Err(e) => {
                println!("  [!] Failed to open HID device: {e}");
                return;
            }
        };

        let init = build_probe_packet(self.spec);
        println!("  Sending {}-byte init packet...", init.len());
        println!("  TX (first 32 bytes): {}", hex_dump(&init, 32));
        if let Err(e) = write_report(&device, &init) {
            println!("  [!] Probe error: {e}");
            return;
        }

        match read_with_timeout(&device, self.spec.response_len, READ_TIMEOUT) {
            Ok(Some(rx)) => {
                println!("  RX ({} bytes):       {}", rx.len(), hex_dump(&rx, 32));
                for line in (self.spec.decode)(&rx) {
                    println!("  {line}");
                }
            }
            Ok(None) => println!("  RX: no response within 2s timeout"),
            Err(e) => println!("  [!] Probe error: {e}"),
        }
    }
}

/// Header plus zero padding plus any flag byte.
pub fn build_probe_packet(spec: &StubSpec) -> Vec<u8> {
    let desc = spec.descriptor;
    let mut packet = vec![0u8; desc.init_packet_len];
    packet[..desc.init_header.len()].copy_from_slice(desc.init_header);
    if let Some((index, value)) = spec.init_flag {
        packet[index] = value;
    }
    packet
}

// ============================================================================
// RESPONSE DECODERS
// ============================================================================

fn decode_ali_response(rx: &[u8]) -> Vec<String> {
    let Some(&variant) = rx.first() else {
        return vec!["Variant: empty response".to_string()];
    };
    let desc = match variant {
        ALI_VARIANT_SMALL => "small screen (153600-byte buffer)",
        ALI_VARIANT_LARGE | ALI_VARIANT_LARGE2 => "large screen (204800-byte buffer)",
        _ => "unknown (not in expected set: 0x36, 0x65, 0x66)",
    };
    vec![format!("Variant: {variant:#04x} -> {desc}")]
}

fn decode_lianyun_response(rx: &[u8]) -> Vec<String> {
    let ok_0 = rx.first() == Some(&3);
    let ok_1 = rx.get(1) == Some(&0xFF);
    let ok_8 = rx.get(8) == Some(&1);
    vec![format!(
        "Validation: bytes[0]==3: {ok_0}, bytes[1]==0xFF: {ok_1}, bytes[8]==1: {ok_8}"
    )]
}

fn decode_xsail_response(rx: &[u8]) -> Vec<String> {
    let mut lines = Vec::new();
    if rx.len() > 40 {
        let info = &rx[20..41];
        lines.push(format!("Device info [20:40]: {}", hex_dump(info, 21)));
        let ascii: String = info
            .iter()
            .filter(|&&b| b != 0)
            .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '\u{FFFD}' })
            .collect();
        if !ascii.trim().is_empty() {
            lines.push(format!("Device info (ASCII): {ascii}"));
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_probe_packets_match_documented_layouts() {
        let ali = build_probe_packet(&ALI_SPEC);
        assert_eq!(ali.len(), 1040);
        assert_eq!(ali[0], 0xF5);
        assert_eq!(ali[13], 0x04);
        assert!(ali[16..].iter().all(|&b| b == 0));

        let ly = build_probe_packet(&LIANYUN_SPEC);
        assert_eq!(ly.len(), 2048);
        assert_eq!(&ly[0..2], &[0x02, 0xFF]);
        assert_eq!(ly[8], 1);

        let ly2 = build_probe_packet(&LIANYUN_V2_SPEC);
        assert_eq!(ly2.len(), 512);
        assert_eq!(&ly2[..16], &ly[..16]);

        let xs = build_probe_packet(&XSAIL_SPEC);
        assert_eq!(xs.len(), 64);
        assert_eq!(&xs[0..4], &[0x12, 0x34, 0x56, 0x78]);
        assert_eq!(xs[56], 1);
    }

    #[test]
    fn test_all_stubs_report_unverified() {
        for spec in [&ALI_SPEC, &LIANYUN_SPEC, &LIANYUN_V2_SPEC, &XSAIL_SPEC] {
            let driver = StubDriver::new(spec);
            assert_eq!(driver.protocol_status(), ProtocolStatus::Unverified);
        }
    }

    #[test]
    fn test_ali_variant_decoding() {
        assert!(decode_ali_response(&[0x36])[0].contains("small screen"));
        assert!(decode_ali_response(&[0x65])[0].contains("large screen"));
        assert!(decode_ali_response(&[0x66])[0].contains("large screen"));
        assert!(decode_ali_response(&[0x99])[0].contains("unknown"));
    }

    #[test]
    fn test_lianyun_validation_flags() {
        let mut rx = vec![0u8; 16];
        rx[0] = 3;
        rx[1] = 0xFF;
        rx[8] = 1;
        let line = &decode_lianyun_response(&rx)[0];
        assert!(line.contains("bytes[0]==3: true"));
        assert!(line.contains("bytes[8]==1: true"));

        let line = &decode_lianyun_response(&[0u8; 16])[0];
        assert!(line.contains("bytes[0]==3: false"));
    }

    #[test]
    fn test_xsail_info_extraction() {
        let mut rx = vec![0u8; 1024];
        rx[20..26].copy_from_slice(b"SOMORE");
        let lines = decode_xsail_response(&rx);
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains("SOMORE"));

        // Short response yields no info lines
        assert!(decode_xsail_response(&[0u8; 10]).is_empty());
    }
}
