//! Owned OGG pages.

use std::io::Write;

use crate::crc32;
use crate::{
    parse_u32_le, parse_u64_le, BITSTREAM_SERIAL_NUMBER_RANGE, BOS_VALUE, CONTINUATION_VALUE,
    CRC32_RANGE, EOS_VALUE, GRANULE_POSITION_RANGE, HEADER_TYPE_INDEX, NO_GRANULE_POSITION,
    PAGE_SEQUENCE_NUMBER_RANGE, SEGMENT_COUNT_INDEX, SEGMENT_TABLE_INDEX,
};

/// A single page of an OGG physical bitstream.
///
/// A page owns its header and body bytes. Pages handed out by the reader are
/// borrowed until the next read; engines clone them before storing or
/// mutating. Mutators refresh the checksum in the same call, so a mutated
/// page is never observable with a stale checksum.
#[derive(Clone, Debug, Default)]
pub struct Page {
    header: Vec<u8>,
    body: Vec<u8>,
}

impl Page {
    /// Creates a page from raw header and body bytes and seals it with a
    /// fresh checksum.
    pub fn new(header: Vec<u8>, body: Vec<u8>) -> Self {
        let mut page = Self { header, body };
        page.refresh_checksum();
        page
    }

    pub(crate) fn from_parts(header: Vec<u8>, body: Vec<u8>) -> Self {
        Self { header, body }
    }

    /// The raw header bytes, including the segment table.
    pub fn header(&self) -> &[u8] {
        self.header.as_ref()
    }

    /// The raw body bytes.
    pub fn body(&self) -> &[u8] {
        self.body.as_ref()
    }

    /// Unique serial ID of the logical bitstream this page belongs to.
    pub fn bitstream_serial_number(&self) -> u32 {
        parse_u32_le(&self.header[BITSTREAM_SERIAL_NUMBER_RANGE])
    }

    /// Per-stream sequence number of this page.
    pub fn page_sequence_number(&self) -> u32 {
        parse_u32_le(&self.header[PAGE_SEQUENCE_NUMBER_RANGE])
    }

    /// The granule position of the last packet ending on this page, or
    /// [`NO_GRANULE_POSITION`] when no packet ends here.
    pub fn granule_position(&self) -> u64 {
        parse_u64_le(&self.header[GRANULE_POSITION_RANGE])
    }

    /// Page carries the begin of stream marker.
    pub fn is_bos(&self) -> bool {
        self.header[HEADER_TYPE_INDEX] & BOS_VALUE != 0
    }

    /// Page carries the end of stream marker.
    pub fn is_eos(&self) -> bool {
        self.header[HEADER_TYPE_INDEX] & EOS_VALUE != 0
    }

    /// Page continues a packet from the previous page of its stream.
    pub fn is_continuation(&self) -> bool {
        self.header[HEADER_TYPE_INDEX] & CONTINUATION_VALUE != 0
    }

    /// Number of packets that end on this page. Zero marks a pure
    /// continuation page.
    pub fn packet_count(&self) -> usize {
        self.lacing_values().iter().filter(|lace| **lace < 255).count()
    }

    pub(crate) fn lacing_values(&self) -> &[u8] {
        let table_size = usize::from(self.header[SEGMENT_COUNT_INDEX]);
        &self.header[SEGMENT_TABLE_INDEX..SEGMENT_TABLE_INDEX + table_size]
    }

    /// The payload of the first packet starting on this page, truncated to
    /// the part stored here. Used to probe the codec on a BOS page.
    pub(crate) fn first_packet(&self) -> &[u8] {
        let mut size = 0;
        for lace in self.lacing_values() {
            size += usize::from(*lace);
            if *lace < 255 {
                break;
            }
        }
        &self.body[..size.min(self.body.len())]
    }

    /// Sets the end of stream marker and refreshes the checksum.
    pub fn set_eos(&mut self) {
        self.header[HEADER_TYPE_INDEX] |= EOS_VALUE;
        self.refresh_checksum();
    }

    /// Forces the "no packet ends here" granule position and refreshes the
    /// checksum. Repairs continuation pages that carry a stray granule
    /// position and would mis-sort because of it.
    pub fn clear_granule_position(&mut self) {
        self.header[GRANULE_POSITION_RANGE]
            .copy_from_slice(&NO_GRANULE_POSITION.to_le_bytes());
        self.refresh_checksum();
    }

    /// Recomputes the checksum over the header and body.
    pub fn refresh_checksum(&mut self) {
        self.header[CRC32_RANGE].iter_mut().for_each(|x| *x = 0);
        let crc = crc32::update(crc32::update(0, &self.header), &self.body);
        self.header[CRC32_RANGE].copy_from_slice(&crc.to_le_bytes());
    }

    pub(crate) fn checksum_is_valid(&self) -> bool {
        let stored = parse_u32_le(&self.header[CRC32_RANGE]);
        let mut header = self.header.clone();
        header[CRC32_RANGE].iter_mut().for_each(|x| *x = 0);
        crc32::update(crc32::update(0, &header), &self.body) == stored
    }

    /// Writes the page out, header first.
    pub fn write_into<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(&self.header)?;
        writer.write_all(&self.body)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::panic)]
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn opus_head_page() -> Page {
        let d: Vec<u8> = vec![
            0x4F, 0x67, 0x67, 0x53, 0x00, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x4A, 0xC9, 0x09, 0xB6, 0x00, 0x00, 0x00, 0x00, 0xF9, 0x20, 0x89, 0xF8, 0x01, 0x13,
            0x4F, 0x70, 0x75, 0x73, 0x48, 0x65, 0x61, 0x64, 0x01, 0x02, 0x38, 0x01, 0x80, 0xBB,
            0x00, 0x00, 0x00, 0x00, 0x00,
        ];
        Page::from_parts(d[..28].to_vec(), d[28..].to_vec())
    }

    #[test]
    fn test_field_accessors() {
        let page = opus_head_page();
        assert_eq!(page.bitstream_serial_number(), 0xB609_C94A);
        assert_eq!(page.page_sequence_number(), 0);
        assert_eq!(page.granule_position(), 0);
        assert!(page.is_bos());
        assert!(!page.is_eos());
        assert!(!page.is_continuation());
        assert_eq!(page.packet_count(), 1);
        assert!(page.checksum_is_valid());
    }

    #[test]
    fn test_first_packet() {
        let page = opus_head_page();
        assert_eq!(&page.first_packet()[..8], b"OpusHead");
    }

    #[test]
    fn test_set_eos_refreshes_checksum() {
        let mut page = opus_head_page();
        page.set_eos();
        assert!(page.is_eos());
        assert!(page.checksum_is_valid());
    }

    #[test]
    fn test_clear_granule_position() {
        let mut page = opus_head_page();
        page.clear_granule_position();
        assert_eq!(page.granule_position(), NO_GRANULE_POSITION);
        assert!(page.checksum_is_valid());
    }

    #[test]
    fn test_write_into() {
        let page = opus_head_page();
        let mut out = Vec::new();
        page.write_into(&mut out).unwrap();
        assert_eq!(out.len(), 47);
        assert_eq!(&out[..4], b"OggS");
    }
}
