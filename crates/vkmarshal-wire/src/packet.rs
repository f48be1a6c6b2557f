//! Command packet framing: `opcode: u32 BE`, `length: u32 BE` (header
//! included), then the marshaled body.

use crate::error::WireError;
use crate::stream::{WireReader, WireSink, WireWriter};

/// Header size in bytes: opcode(4) + length(4) = 8
pub const HEADER_SIZE: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub opcode: u32,
    /// Total packet length, header included.
    pub length: u32,
}

impl PacketHeader {
    /// Parse the header at the start of `buf`.
    pub fn parse(buf: &[u8]) -> Result<Self, WireError> {
        let mut r = WireReader::new(buf);
        Ok(Self {
            opcode: r.get_be32()?,
            length: r.get_be32()?,
        })
    }

    pub fn write(&self, out: &mut dyn WireSink) {
        out.put_be32(self.opcode);
        out.put_be32(self.length);
    }

    pub fn body_len(&self) -> usize {
        (self.length as usize).saturating_sub(HEADER_SIZE)
    }
}

/// Prefix `body` with its header.
pub fn frame(opcode: u32, body: &[u8]) -> Vec<u8> {
    let mut out = WireWriter::with_capacity(HEADER_SIZE + body.len());
    PacketHeader {
        opcode,
        length: (HEADER_SIZE + body.len()) as u32,
    }
    .write(&mut out);
    out.put_bytes(body);
    out.into_inner()
}

/// Split a captured stream into whole packets. Returns the packets and the
/// number of bytes they cover; a trailing partial packet, or a header
/// claiming fewer than [`HEADER_SIZE`] bytes, stops the walk.
pub fn split_packets(buf: &[u8]) -> (Vec<(PacketHeader, &[u8])>, usize) {
    let mut packets = Vec::new();
    let mut pos = 0;
    while buf.len() - pos >= HEADER_SIZE {
        let Ok(header) = PacketHeader::parse(&buf[pos..]) else {
            break;
        };
        let len = header.length as usize;
        if len < HEADER_SIZE || buf.len() - pos < len {
            break;
        }
        packets.push((header, &buf[pos + HEADER_SIZE..pos + len]));
        pos += len;
    }
    (packets, pos)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_counts_the_header() {
        let packet = frame(20000, &[1, 2, 3]);
        assert_eq!(packet.len(), 11);
        let header = PacketHeader::parse(&packet).unwrap();
        assert_eq!(header, PacketHeader { opcode: 20000, length: 11 });
        assert_eq!(header.body_len(), 3);
    }

    #[test]
    fn split_stops_at_partial_packet() {
        let mut buf = frame(1, &[9; 4]);
        buf.extend(frame(2, &[]));
        let partial = frame(3, &[7; 16]);
        buf.extend(&partial[..10]);
        let (packets, consumed) = split_packets(&buf);
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0].1, &[9; 4]);
        assert_eq!(packets[1].0.opcode, 2);
        assert_eq!(consumed, 12 + 8);
    }

    #[test]
    fn split_rejects_undersized_length() {
        let mut buf = Vec::new();
        buf.extend(5u32.to_be_bytes());
        buf.extend(4u32.to_be_bytes());
        let (packets, consumed) = split_packets(&buf);
        assert!(packets.is_empty());
        assert_eq!(consumed, 0);
    }
}
