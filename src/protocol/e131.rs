//! sACN (E1.31) data packet codec
//!
//! ```text
//! offset  size  field
//!      0     2  preamble size (0x0010)
//!      2     2  postamble size (0)
//!      4    12  ACN packet identifier "ASC-E1.17\0\0\0"
//!     16     2  root flags & length
//!     18     4  root vector (VECTOR_ROOT_E131_DATA)
//!     22    16  CID
//!     38     2  framing flags & length
//!     40     4  framing vector (VECTOR_E131_DATA_PACKET)
//!     44    64  source name, NUL padded
//!    108     1  priority
//!    109     2  synchronization address
//!    111     1  sequence number
//!    112     1  options
//!    113     2  universe
//!    115     2  DMP flags & length
//!    117     1  DMP vector (0x02)
//!    118     1  address & data type (0xa1)
//!    119     2  first property address (0)
//!    121     2  address increment (1)
//!    123     2  property value count (slots + 1)
//!    125     1  DMX start code (0x00)
//!    126   n    channel slots (1-512)
//! ```
//!
//! All multi-byte fields are big-endian. The codec never touches sockets.

use bytes::{BufMut, Bytes, BytesMut};
use uuid::Uuid;

use crate::constants::{DEFAULT_PRIORITY, DMX_UNIVERSE_SIZE};
use crate::error::ProtocolError;

pub const ACN_PACKET_IDENTIFIER: [u8; 12] = *b"ASC-E1.17\0\0\0";
pub const PREAMBLE_SIZE: u16 = 0x0010;
pub const VECTOR_ROOT_E131_DATA: u32 = 0x0000_0004;
pub const VECTOR_E131_DATA_PACKET: u32 = 0x0000_0002;
pub const VECTOR_DMP_SET_PROPERTY: u8 = 0x02;
pub const DMP_ADDRESS_DATA_TYPE: u8 = 0xa1;
pub const DMX_START_CODE: u8 = 0x00;

/// Length of everything before the first channel slot
pub const HEADER_LEN: usize = 126;
pub const MAX_PACKET_LEN: usize = HEADER_LEN + DMX_UNIVERSE_SIZE;
pub const SOURCE_NAME_LEN: usize = 64;

const FLAGS: u16 = 0x7000;

const ROOT_VECTOR_OFFSET: usize = 18;
const CID_OFFSET: usize = 22;
const FRAMING_VECTOR_OFFSET: usize = 40;
const SOURCE_NAME_OFFSET: usize = 44;
const PRIORITY_OFFSET: usize = 108;
const SEQUENCE_OFFSET: usize = 111;
const UNIVERSE_OFFSET: usize = 113;
const START_CODE_OFFSET: usize = 125;

/// A decoded DMX data packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LightingPacket {
    pub universe: u16,
    pub sequence: u8,
    pub priority: u8,
    pub source_name: String,
    pub cid: [u8; 16],
    /// Channel slots with trailing zeros removed, at least one slot long
    pub channel_data: Vec<u8>,
}

/// Encoder holding the per-source fields of every packet
#[derive(Debug, Clone)]
pub struct PacketEncoder {
    cid: [u8; 16],
    source_name: [u8; SOURCE_NAME_LEN],
    priority: u8,
}

impl PacketEncoder {
    /// Create an encoder with a fresh random CID.
    ///
    /// The source name is truncated to 63 bytes so it stays NUL terminated.
    pub fn new(source_name: &str, priority: u8) -> Self {
        Self::with_cid(*Uuid::new_v4().as_bytes(), source_name, priority)
    }

    pub fn with_cid(cid: [u8; 16], source_name: &str, priority: u8) -> Self {
        let mut name = [0u8; SOURCE_NAME_LEN];
        let bytes = source_name.as_bytes();
        let len = bytes.len().min(SOURCE_NAME_LEN - 1);
        name[..len].copy_from_slice(&bytes[..len]);

        Self {
            cid,
            source_name: name,
            priority: priority.min(crate::constants::MAX_PRIORITY),
        }
    }

    pub fn cid(&self) -> [u8; 16] {
        self.cid
    }

    pub fn priority(&self) -> u8 {
        self.priority
    }

    /// Encode one universe worth of channel slots
    pub fn encode(
        &self,
        universe: u16,
        sequence: u8,
        channels: &[u8],
    ) -> Result<Bytes, ProtocolError> {
        if channels.is_empty() || channels.len() > DMX_UNIVERSE_SIZE {
            return Err(ProtocolError::InvalidPayloadLength(channels.len()));
        }

        let total = HEADER_LEN + channels.len();
        let mut packet = BytesMut::with_capacity(total);

        // Root layer
        packet.put_u16(PREAMBLE_SIZE);
        packet.put_u16(0);
        packet.put_slice(&ACN_PACKET_IDENTIFIER);
        packet.put_u16(FLAGS | (total - 16) as u16);
        packet.put_u32(VECTOR_ROOT_E131_DATA);
        packet.put_slice(&self.cid);

        // Framing layer
        packet.put_u16(FLAGS | (total - 38) as u16);
        packet.put_u32(VECTOR_E131_DATA_PACKET);
        packet.put_slice(&self.source_name);
        packet.put_u8(self.priority);
        packet.put_u16(0); // no synchronization universe
        packet.put_u8(sequence);
        packet.put_u8(0); // options
        packet.put_u16(universe);

        // DMP layer
        packet.put_u16(FLAGS | (total - 115) as u16);
        packet.put_u8(VECTOR_DMP_SET_PROPERTY);
        packet.put_u8(DMP_ADDRESS_DATA_TYPE);
        packet.put_u16(0);
        packet.put_u16(1);
        packet.put_u16(channels.len() as u16 + 1);
        packet.put_u8(DMX_START_CODE);
        packet.put_slice(channels);

        debug_assert_eq!(packet.len(), total);
        Ok(packet.freeze())
    }
}

/// Encode a packet with a one-off encoder at the default priority
pub fn encode(
    source_name: &str,
    universe: u16,
    sequence: u8,
    channels: &[u8],
) -> Result<Bytes, ProtocolError> {
    PacketEncoder::new(source_name, DEFAULT_PRIORITY).encode(universe, sequence, channels)
}

/// Decode a packet, logging and dropping anything that is not DMX data
pub fn decode(data: &[u8]) -> Option<LightingPacket> {
    match parse(data) {
        Ok(packet) => Some(packet),
        Err(e) => {
            tracing::debug!("Dropping sACN packet: {}", e);
            None
        }
    }
}

/// Decode a packet, reporting why it was rejected
pub fn parse(data: &[u8]) -> Result<LightingPacket, ProtocolError> {
    if data.len() < HEADER_LEN {
        return Err(ProtocolError::PacketTooShort(data.len()));
    }

    let preamble = read_u16(data, 0);
    if preamble != PREAMBLE_SIZE {
        return Err(ProtocolError::InvalidPreamble(preamble));
    }

    if data[4..16] != ACN_PACKET_IDENTIFIER {
        return Err(ProtocolError::InvalidIdentifier);
    }

    let root_vector = read_u32(data, ROOT_VECTOR_OFFSET);
    if root_vector != VECTOR_ROOT_E131_DATA {
        return Err(ProtocolError::UnsupportedVector(root_vector));
    }

    let framing_vector = read_u32(data, FRAMING_VECTOR_OFFSET);
    if framing_vector != VECTOR_E131_DATA_PACKET {
        return Err(ProtocolError::UnsupportedVector(framing_vector));
    }

    let start_code = data[START_CODE_OFFSET];
    if start_code != DMX_START_CODE {
        return Err(ProtocolError::InvalidStartCode(start_code));
    }

    let mut cid = [0u8; 16];
    cid.copy_from_slice(&data[CID_OFFSET..CID_OFFSET + 16]);

    let name_field = &data[SOURCE_NAME_OFFSET..SOURCE_NAME_OFFSET + SOURCE_NAME_LEN];
    let name_len = name_field.iter().position(|&b| b == 0).unwrap_or(SOURCE_NAME_LEN);
    let source_name = String::from_utf8_lossy(&name_field[..name_len]).into_owned();

    let slots = &data[HEADER_LEN..data.len().min(MAX_PACKET_LEN)];
    let used = slots.iter().rposition(|&b| b != 0).map_or(1, |last| last + 1);
    let mut channel_data = slots[..used.min(slots.len())].to_vec();
    if channel_data.is_empty() {
        channel_data.push(0);
    }

    Ok(LightingPacket {
        universe: read_u16(data, UNIVERSE_OFFSET),
        sequence: data[SEQUENCE_OFFSET],
        priority: data[PRIORITY_OFFSET],
        source_name,
        cid,
        channel_data,
    })
}

fn read_u16(data: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([data[offset], data[offset + 1]])
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([data[offset], data[offset + 1], data[offset + 2], data[offset + 3]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn strip_trailing_zeros(data: &[u8]) -> Vec<u8> {
        let used = data.iter().rposition(|&b| b != 0).map_or(1, |last| last + 1);
        data[..used].to_vec()
    }

    #[test]
    fn test_packet_layout() {
        let encoder = PacketEncoder::with_cid([7u8; 16], "LightShow", 150);
        let packet = encoder.encode(0x0102, 42, &[255, 128, 64]).unwrap();

        assert_eq!(packet.len(), 129);
        assert_eq!(&packet[0..2], &[0x00, 0x10]);
        assert_eq!(&packet[4..16], b"ASC-E1.17\0\0\0");
        assert_eq!(&packet[16..18], &(0x7000u16 | 113).to_be_bytes());
        assert_eq!(&packet[22..38], &[7u8; 16]);
        assert_eq!(&packet[38..40], &(0x7000u16 | 91).to_be_bytes());
        assert_eq!(&packet[44..53], b"LightShow");
        assert_eq!(packet[53], 0);
        assert_eq!(packet[108], 150);
        assert_eq!(packet[111], 42);
        assert_eq!(&packet[113..115], &[0x01, 0x02]);
        assert_eq!(&packet[115..117], &(0x7000u16 | 14).to_be_bytes());
        assert_eq!(packet[117], 0x02);
        assert_eq!(packet[118], 0xa1);
        assert_eq!(&packet[123..125], &4u16.to_be_bytes());
        assert_eq!(packet[125], 0x00);
        assert_eq!(&packet[126..], &[255, 128, 64]);
    }

    #[test]
    fn test_full_universe_matches_standard_size() {
        let packet = encode("LightShow", 1, 0, &[0u8; 512]).unwrap();
        assert_eq!(packet.len(), 638);
    }

    #[test]
    fn test_payload_length_checked() {
        assert!(matches!(
            encode("LightShow", 1, 0, &[]),
            Err(ProtocolError::InvalidPayloadLength(0))
        ));
        assert!(matches!(
            encode("LightShow", 1, 0, &[0u8; 513]),
            Err(ProtocolError::InvalidPayloadLength(513))
        ));
    }

    #[test]
    fn test_long_source_name_truncated() {
        let name = "x".repeat(100);
        let packet = encode(&name, 1, 0, &[1]).unwrap();
        let decoded = decode(&packet).unwrap();
        assert_eq!(decoded.source_name.len(), 63);
    }

    #[test]
    fn test_decode_sample_packet() {
        let data = [255, 128, 64, 0, 32, 96, 160, 224];
        let packet = encode("Test", 1, 42, &data).unwrap();
        let decoded = decode(&packet).unwrap();

        assert_eq!(decoded.universe, 1);
        assert_eq!(decoded.sequence, 42);
        assert_eq!(decoded.priority, DEFAULT_PRIORITY);
        assert_eq!(decoded.source_name, "Test");
        assert_eq!(decoded.channel_data, data.to_vec());
    }

    #[test]
    fn test_trailing_zeros_trimmed() {
        let packet = encode("Test", 1, 0, &[9, 0, 3, 0, 0, 0]).unwrap();
        assert_eq!(decode(&packet).unwrap().channel_data, vec![9, 0, 3]);

        let packet = encode("Test", 1, 0, &[0u8; 512]).unwrap();
        assert_eq!(decode(&packet).unwrap().channel_data, vec![0]);
    }

    #[test]
    fn test_header_only_packet() {
        let packet = encode("Test", 1, 0, &[5]).unwrap();
        let decoded = decode(&packet[..HEADER_LEN]).unwrap();
        assert_eq!(decoded.channel_data, vec![0]);
    }

    #[test]
    fn test_short_buffer_rejected() {
        assert!(decode(&[0u8; 10]).is_none());
        assert!(matches!(parse(&[0u8; 10]), Err(ProtocolError::PacketTooShort(10))));
    }

    #[test]
    fn test_corrupted_fields_rejected() {
        let packet = encode("Test", 1, 0, &[1, 2, 3]).unwrap().to_vec();

        let mut bad = packet.clone();
        bad[1] = 0x11;
        assert!(matches!(parse(&bad), Err(ProtocolError::InvalidPreamble(0x0011))));

        let mut bad = packet.clone();
        bad[4] = b'X';
        assert!(matches!(parse(&bad), Err(ProtocolError::InvalidIdentifier)));

        let mut bad = packet.clone();
        bad[125] = 0xdd;
        assert!(matches!(parse(&bad), Err(ProtocolError::InvalidStartCode(0xdd))));

        // Synchronization packets use a different framing vector
        let mut bad = packet.clone();
        bad[40..44].copy_from_slice(&1u32.to_be_bytes());
        assert!(matches!(parse(&bad), Err(ProtocolError::UnsupportedVector(1))));
    }

    #[test]
    fn test_cid_is_unique_per_encoder() {
        let a = PacketEncoder::new("Test", 100);
        let b = PacketEncoder::new("Test", 100);
        assert_ne!(a.cid(), b.cid());
    }

    proptest! {
        #[test]
        fn prop_decode_inverts_encode(
            universe in any::<u16>(),
            sequence in any::<u8>(),
            channels in proptest::collection::vec(any::<u8>(), 1..=512),
        ) {
            let packet = encode("LightShow", universe, sequence, &channels).unwrap();
            let decoded = decode(&packet).unwrap();

            prop_assert_eq!(decoded.universe, universe);
            prop_assert_eq!(decoded.sequence, sequence);
            prop_assert_eq!(decoded.channel_data, strip_trailing_zeros(&channels));
        }

        #[test]
        fn prop_decode_never_panics(data in proptest::collection::vec(any::<u8>(), 0..700)) {
            let _ = decode(&data);
        }
    }
}
