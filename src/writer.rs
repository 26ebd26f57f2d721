use std::convert::TryFrom;
use std::io::Write;

use crate::crc32::crc32;
use crate::reader::Packet;
use crate::{
    WriteError, BITSTREAM_SERIAL_NUMBER_RANGE, BOS_VALUE, CONTINUATION_VALUE, CRC32_RANGE,
    EOS_VALUE, GRANULE_POSITION_RANGE, HEADER_TYPE_INDEX, MAX_PAGE_DATA_SIZE, MAX_PAGE_SIZE,
    NO_GRANULE_POSITION, PAGER_MARKER, PAGER_MARKER_RANGE, PAGE_SEQUENCE_NUMBER_RANGE,
    SEGMENT_COUNT_INDEX, SEGMENT_TABLE_INDEX, VERSION_INDEX,
};

/// Page boundary forcing for [`PageWriter::feed`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Flush {
    /// Let the writer fill pages on its own.
    None,
    /// Force a page boundary right after the packet, so the page it ends
    /// carries its granule position.
    After,
}

#[derive(Clone, Debug)]
struct StreamState {
    bitstream_serial_number: u32,
    data_buffer: Box<[u8]>,
    data_head: usize,
    packet_sizes: Vec<(usize, bool)>,
    segment_count: usize,
    page_sequence_number: u32,
    granule_position: u64,
    header_type: u8,
}

impl StreamState {
    fn new(bitstream_serial_number: u32, is_bos: bool) -> Self {
        Self {
            bitstream_serial_number,
            data_buffer: vec![0_u8; MAX_PAGE_DATA_SIZE].into_boxed_slice(),
            data_head: 0,
            packet_sizes: Vec::with_capacity(16),
            segment_count: 0,
            page_sequence_number: 0,
            granule_position: NO_GRANULE_POSITION,
            header_type: if is_bos { BOS_VALUE } else { 0 },
        }
    }
}

/// Generic OGG page writer.
///
/// Packets are assembled into pages per logical bitstream. A page is
/// written once a packet doesn't fit into its free space, when a packet is
/// fed with [`Flush::After`], or when a packet carries the end of stream
/// marker. Packets bigger than the biggest allowed data page size of
/// 65_025 B are split over continuation pages.
pub struct PageWriter<W: Write> {
    writer: W,
    stream_states: Vec<StreamState>,
    page_buffer: Box<[u8]>,
}

impl<W: Write> PageWriter<W> {
    /// Creates a new `PageWriter`.
    pub fn new(writer: W) -> Self {
        let mut page_buffer = vec![0_u8; MAX_PAGE_SIZE];
        page_buffer[PAGER_MARKER_RANGE].copy_from_slice(&PAGER_MARKER);

        Self {
            writer,
            stream_states: Default::default(),
            page_buffer: page_buffer.into_boxed_slice(),
        }
    }

    /// Consumes the `PageWriter` and returns the writer.
    pub fn into_inner(self) -> W {
        self.writer
    }

    /// Queues a packet for the stream it belongs to. A stream is started
    /// implicitly by its first packet, which carries the BOS marker.
    pub fn feed(&mut self, packet: &Packet, flush: Flush) -> Result<(), WriteError> {
        self.feed_raw(
            packet.bitstream_serial_number(),
            packet.data(),
            packet.granule_position(),
            packet.is_bos(),
            packet.is_eos(),
            flush,
        )
    }

    /// Queues a packet given as raw parts.
    pub fn feed_raw(
        &mut self,
        bitstream_serial_number: u32,
        packet_data: &[u8],
        granule_position: u64,
        is_bos: bool,
        is_eos: bool,
        flush: Flush,
    ) -> Result<(), WriteError> {
        let index = match self
            .stream_states
            .iter()
            .position(|s| s.bitstream_serial_number == bitstream_serial_number)
        {
            Some(index) => index,
            None => {
                self.stream_states
                    .push(StreamState::new(bitstream_serial_number, is_bos));
                self.stream_states.len() - 1
            }
        };
        let state = &mut self.stream_states[index];

        let size = packet_data.len();
        let needed_laces = size / 255 + 1;

        // Flush the open page when the new packet doesn't fit into its
        // free space.
        if state.data_head != 0
            && (state.data_head + size > MAX_PAGE_DATA_SIZE
                || state.segment_count + needed_laces > 255)
        {
            write_page(&mut self.writer, &mut self.page_buffer, state)?;
        }

        // If the packet now fits on the page, store it and return.
        if state.data_head + size <= MAX_PAGE_DATA_SIZE
            && state.segment_count + needed_laces <= 255
        {
            state.granule_position = granule_position;
            if is_eos {
                state.header_type |= EOS_VALUE;
            }
            push_packet(state, packet_data, true);

            if matches!(flush, Flush::After)
                || is_eos
                || state.data_head == MAX_PAGE_DATA_SIZE
                || state.segment_count == 255
            {
                write_page(&mut self.writer, &mut self.page_buffer, state)?;
            }

            return Ok(());
        }

        // The packet is bigger than a page, so it is split over
        // continuation pages.
        let mut offset = 0;
        let mut remaining = size;
        while remaining >= MAX_PAGE_DATA_SIZE {
            state.granule_position = NO_GRANULE_POSITION;
            push_packet(state, &packet_data[offset..offset + MAX_PAGE_DATA_SIZE], false);
            write_page(&mut self.writer, &mut self.page_buffer, state)?;
            state.header_type = CONTINUATION_VALUE;

            offset += MAX_PAGE_DATA_SIZE;
            remaining -= MAX_PAGE_DATA_SIZE;
        }

        state.granule_position = granule_position;
        if is_eos {
            state.header_type |= EOS_VALUE;
        }
        push_packet(state, &packet_data[offset..], true);
        write_page(&mut self.writer, &mut self.page_buffer, state)?;

        Ok(())
    }

    /// Writes out any partially assembled pages.
    pub fn flush_pending(&mut self) -> Result<(), WriteError> {
        for state in self.stream_states.iter_mut() {
            if state.data_head != 0 || !state.packet_sizes.is_empty() {
                write_page(&mut self.writer, &mut self.page_buffer, state)?;
            }
        }
        Ok(())
    }
}

fn push_packet(state: &mut StreamState, packet_data: &[u8], complete: bool) {
    let size = packet_data.len();
    state.data_buffer[state.data_head..state.data_head + size].copy_from_slice(packet_data);
    state.data_head += size;
    state.packet_sizes.push((size, complete));
    state.segment_count += size / 255 + usize::from(complete);
}

fn write_page<W: Write>(
    writer: &mut W,
    page_buffer: &mut [u8],
    state: &mut StreamState,
) -> Result<(), WriteError> {
    // Write out the segment table. A complete packet always gets its
    // terminating lace, including a lace of zero when the length is a
    // multiple of 255.
    let mut segment_count: usize = 0;
    for (packet_size, complete) in state.packet_sizes.iter() {
        let full_segments = packet_size / 255;
        for _ in 0..full_segments {
            page_buffer[SEGMENT_TABLE_INDEX + segment_count] = 255;
            segment_count += 1;
        }

        if *complete {
            page_buffer[SEGMENT_TABLE_INDEX + segment_count] = u8::try_from(packet_size % 255)?;
            segment_count += 1;
        }
    }

    // Assemble the page.
    page_buffer[VERSION_INDEX] = 0;
    page_buffer[HEADER_TYPE_INDEX] = state.header_type;
    page_buffer[GRANULE_POSITION_RANGE].copy_from_slice(&state.granule_position.to_le_bytes());
    page_buffer[BITSTREAM_SERIAL_NUMBER_RANGE]
        .copy_from_slice(&state.bitstream_serial_number.to_le_bytes());
    page_buffer[PAGE_SEQUENCE_NUMBER_RANGE]
        .copy_from_slice(&state.page_sequence_number.to_le_bytes());
    page_buffer[CRC32_RANGE].copy_from_slice(&[0, 0, 0, 0]);
    page_buffer[SEGMENT_COUNT_INDEX] = u8::try_from(segment_count)?;

    let data_start = SEGMENT_TABLE_INDEX + segment_count;
    let data_end = data_start + state.data_head;
    page_buffer[data_start..data_end].copy_from_slice(&state.data_buffer[..state.data_head]);

    let crc32 = crc32(&page_buffer[..data_end]);
    page_buffer[CRC32_RANGE].copy_from_slice(&crc32.to_le_bytes());

    // Write out the page and reset the state of the stream.
    writer.write_all(&page_buffer[..data_end])?;

    state.packet_sizes.clear();
    state.data_head = 0;
    state.segment_count = 0;
    state.header_type = 0;
    state.granule_position = NO_GRANULE_POSITION;

    state.page_sequence_number += 1;

    Ok(())
}
