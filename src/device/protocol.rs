//! Wire-protocol constant tables.
//!
//! Each unverified chipset's framing, recovered from the vendor tool, is
//! captured as one [`ProtocolDescriptor`] so the numbers live in data
//! rather than scattered through driver code. The descriptors drive both
//! the diagnostic probes and any future promotion of a stub to a working
//! driver.

/// Static description of one chipset's transfer framing.
#[derive(Debug, Clone, Copy)]
pub struct ProtocolDescriptor {
    /// Bytes per data packet on the wire.
    pub chunk_size: usize,
    /// Offset of frame payload within the first packet.
    pub payload_offset: usize,
    /// Bulk/interrupt endpoint frames are written to.
    pub write_endpoint: u8,
    /// Command-type byte placed in each chunk header.
    pub command_type: u8,
    /// Bytes written per burst; `chunk_size` when unbatched.
    pub burst_size: usize,
    /// Length of the post-frame acknowledgment read, 0 when the device
    /// never acks.
    pub ack_len: usize,
    /// Total init packet length (header plus zero padding).
    pub init_packet_len: usize,
    /// Leading bytes of the init packet.
    pub init_header: &'static [u8],
}

/// ALi chipset (`0416:5406`). Single header+JPEG write, 16-byte ack.
///
/// The init response's first byte selects the screen variant:
/// `0x36` 153600-byte buffer, `0x65`/`0x66` 204800-byte buffer.
pub const ALI: ProtocolDescriptor = ProtocolDescriptor {
    chunk_size: 0,
    payload_offset: 16,
    write_endpoint: 2,
    command_type: 0x01,
    burst_size: 0,
    ack_len: 16,
    init_packet_len: 1040,
    init_header: &[
        0xF5, 0x00, 0x01, 0x00, 0xBC, 0xFF, 0xB6, 0xC8, 0x00, 0x00, 0x00, 0x00, 0x00, 0x04, 0x00,
        0x00,
    ],
};

/// ALi screen variant bytes reported in the init response.
pub const ALI_VARIANT_SMALL: u8 = 0x36;
pub const ALI_VARIANT_LARGE: u8 = 0x65;
pub const ALI_VARIANT_LARGE2: u8 = 0x66;

/// LianYun chipset (`0416:5408`). 512-byte chunks, payload at offset 64,
/// 4096-byte write bursts to the unusual EP9, 512-byte ack.
pub const LIANYUN: ProtocolDescriptor = ProtocolDescriptor {
    chunk_size: 512,
    payload_offset: 64,
    write_endpoint: 9,
    command_type: 1,
    burst_size: 4096,
    ack_len: 512,
    init_packet_len: 2048,
    init_header: &[
        0x02, 0xFF, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00,
    ],
};

/// LianYun V2 chipset (`0416:5409`). Same chunk format as LianYun but
/// command type 2, payload at offset 20, one unbatched write to EP2, and
/// a 511-byte ack.
pub const LIANYUN_V2: ProtocolDescriptor = ProtocolDescriptor {
    chunk_size: 512,
    payload_offset: 20,
    write_endpoint: 2,
    command_type: 2,
    burst_size: 512,
    ack_len: 511,
    init_packet_len: 512,
    init_header: &[
        0x02, 0xFF, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00,
    ],
};

/// Xsail SoC (`87AD:70DB`). 64-byte init with marker `12 34 56 78` and
/// byte [56] set, 1024-byte response carrying device info at [20..40].
/// EP1 serves both directions; frames go out as one transfer with a
/// trailing zero-length packet when the size is a 512 multiple.
pub const XSAIL: ProtocolDescriptor = ProtocolDescriptor {
    chunk_size: 0,
    payload_offset: 64,
    write_endpoint: 1,
    command_type: 0,
    burst_size: 0,
    ack_len: 0,
    init_packet_len: 64,
    init_header: &[0x12, 0x34, 0x56, 0x78],
};

/// Expected length of the Xsail init response.
pub const XSAIL_RESPONSE_LEN: usize = 1024;

/// Byte index forced to 1 in the Xsail init packet.
pub const XSAIL_INIT_FLAG_INDEX: usize = 56;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_init_headers_fit_their_packets() {
        for desc in [&ALI, &LIANYUN, &LIANYUN_V2, &XSAIL] {
            assert!(desc.init_header.len() <= desc.init_packet_len);
        }
    }

    #[test]
    fn test_lianyun_variants_differ_where_documented() {
        assert_eq!(LIANYUN.command_type, 1);
        assert_eq!(LIANYUN_V2.command_type, 2);
        assert_eq!(LIANYUN.payload_offset, 64);
        assert_eq!(LIANYUN_V2.payload_offset, 20);
        assert_eq!(LIANYUN.write_endpoint, 9);
        assert_eq!(LIANYUN_V2.write_endpoint, 2);
        // Same init header, different padding length
        assert_eq!(LIANYUN.init_header, LIANYUN_V2.init_header);
        assert_eq!(LIANYUN.init_packet_len, 2048);
        assert_eq!(LIANYUN_V2.init_packet_len, 512);
    }
}
