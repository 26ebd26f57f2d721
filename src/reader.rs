use std::collections::VecDeque;
use std::io::{ErrorKind, Read};

use log::warn;

use crate::media_mapping::{identify, Codec, StreamInfo};
use crate::page::Page;
use crate::{
    ReadError, CONST_HEADER_DATA_RANGE, MAX_PAGE_SIZE, NO_GRANULE_POSITION, PAGER_MARKER,
    PAGER_MARKER_RANGE, SEGMENT_COUNT_INDEX, SEGMENT_TABLE_INDEX, VERSION_INDEX,
};

/// A page delivered by [`PageReader::next_page`], bundled with the
/// reader-side queries that apply to it.
///
/// The page is borrowed from the reader until the next read, so everything
/// an engine may want to know alongside it is resolved up front.
#[derive(Debug)]
pub struct PageEvent<'a> {
    /// The delivered page.
    pub page: &'a Page,
    /// Presentation time in milliseconds at this page, `-1` when no page
    /// with a computable granule position has been seen yet.
    pub units: i64,
    /// Number of header packets of the page's stream.
    pub numheaders: i64,
    /// Granule-shift bit count of the page's stream.
    pub granuleshift: u32,
}

struct StreamEntry {
    serialno: u32,
    info: StreamInfo,
}

/// Generic OGG page reader.
///
/// Delivers whole pages in file order, skipping pages whose checksum does
/// not match. Streams are registered on their BOS page, which makes the
/// codec queries available for every later page of that stream.
pub struct PageReader<R: Read> {
    reader: R,
    page: Page,
    streams: Vec<StreamEntry>,
    current_units: i64,
}

impl<R: Read> PageReader<R> {
    /// Creates a new `PageReader`.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            page: Page::default(),
            streams: Vec::new(),
            current_units: -1,
        }
    }

    /// Consumes the `PageReader` and returns the reader.
    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Reads the next page.
    ///
    /// Returns `None` at the end of the input. Pages with an invalid
    /// checksum are skipped. A truncated final page is treated as the end
    /// of the input.
    pub fn next_page(&mut self) -> Result<Option<PageEvent<'_>>, ReadError> {
        loop {
            match self.read_single_page() {
                Ok(true) => {}
                Ok(false) => continue,
                Err(ReadError::IoError(ref err)) if err.kind() == ErrorKind::UnexpectedEof => {
                    return Ok(None);
                }
                Err(err) => return Err(err),
            }

            let serialno = self.page.bitstream_serial_number();
            if self.page.is_bos() && !self.streams.iter().any(|s| s.serialno == serialno) {
                let info = identify(self.page.first_packet());
                self.streams.push(StreamEntry { serialno, info });
            }

            let info = self.stream_info(serialno);
            if self.page.packet_count() > 0 {
                let units = info.units(self.page.granule_position());
                if units >= 0 {
                    self.current_units = units;
                }
            }

            return Ok(Some(PageEvent {
                page: &self.page,
                units: self.current_units,
                numheaders: info.numheaders,
                granuleshift: info.granuleshift,
            }));
        }
    }

    /// Presentation time in milliseconds of the reader position, `-1` when
    /// unknown.
    pub fn tell_units(&self) -> i64 {
        self.current_units
    }

    /// Number of header packets of the given stream.
    pub fn numheaders(&self, serialno: u32) -> i64 {
        self.stream_info(serialno).numheaders
    }

    /// Granule-shift bit count of the given stream.
    pub fn granuleshift(&self, serialno: u32) -> u32 {
        self.stream_info(serialno).granuleshift
    }

    /// Content type name of the given stream, `None` when the codec was not
    /// identified.
    pub fn content_type(&self, serialno: u32) -> Option<&'static str> {
        self.stream_info(serialno)
            .codec
            .map(|codec| codec.content_type())
    }

    pub(crate) fn codec(&self, serialno: u32) -> Option<Codec> {
        self.stream_info(serialno).codec
    }

    fn stream_info(&self, serialno: u32) -> StreamInfo {
        self.streams
            .iter()
            .find(|s| s.serialno == serialno)
            .map(|s| s.info)
            .unwrap_or_default()
    }

    fn read_single_page(&mut self) -> Result<bool, ReadError> {
        self.sync_with_next_page()?;

        let mut header = vec![0_u8; SEGMENT_TABLE_INDEX];
        header[PAGER_MARKER_RANGE].copy_from_slice(&PAGER_MARKER);
        self.reader.read_exact(&mut header[CONST_HEADER_DATA_RANGE])?;

        let version = header[VERSION_INDEX];
        if version != 0 {
            return Err(ReadError::UnhandledBitstreamVersion(version));
        }

        let table_size = usize::from(header[SEGMENT_COUNT_INDEX]);
        header.resize(SEGMENT_TABLE_INDEX + table_size, 0);
        self.reader
            .read_exact(&mut header[SEGMENT_TABLE_INDEX..])?;

        let body_size = header[SEGMENT_TABLE_INDEX..]
            .iter()
            .map(|lace| usize::from(*lace))
            .sum();
        let mut body = vec![0_u8; body_size];
        self.reader.read_exact(&mut body)?;

        let page = Page::from_parts(header, body);
        if !page.checksum_is_valid() {
            warn!(
                "dropping page with invalid checksum (serialno {:#010x})",
                page.bitstream_serial_number()
            );
            return Ok(false);
        }

        self.page = page;
        Ok(true)
    }

    fn sync_with_next_page(&mut self) -> Result<(), ReadError> {
        let mut buffer = [0_u8; 4];

        // Fast path.
        self.reader.read_exact(&mut buffer)?;
        if buffer == PAGER_MARKER {
            return Ok(());
        }

        // Count matches.
        let mut marker_found = 0;
        for byte in &buffer {
            if *byte == PAGER_MARKER[marker_found] {
                marker_found += 1;
            } else {
                marker_found = 0;
            }
        }

        // Re-sync.
        for _ in 0..MAX_PAGE_SIZE {
            if marker_found == 4 {
                return Ok(());
            }
            self.reader.read_exact(&mut buffer[..1])?;
            if buffer[0] == PAGER_MARKER[marker_found] {
                marker_found += 1;
            } else {
                marker_found = 0;
            }
        }

        Err(ReadError::UnableToSync)
    }
}

/// A packet inside an OGG stream.
#[derive(Clone, Debug)]
pub struct Packet {
    data: Vec<u8>,
    bitstream_serial_number: u32,
    granule_position: u64,
    packetno: u64,
    is_bos: bool,
    is_eos: bool,
}

impl Packet {
    /// The payload of the packet.
    pub fn data(&self) -> &[u8] {
        self.data.as_ref()
    }

    /// Unique serial ID of the logical bitstream this packet belongs to.
    pub fn bitstream_serial_number(&self) -> u32 {
        self.bitstream_serial_number
    }

    /// The granule position of the packet, [`NO_GRANULE_POSITION`] unless
    /// the packet is the last one ending on its final page.
    pub fn granule_position(&self) -> u64 {
        self.granule_position
    }

    /// Sequential number of the packet inside its stream, starting at 0.
    pub fn packetno(&self) -> u64 {
        self.packetno
    }

    /// Packet is the first of its logical bitstream.
    pub fn is_bos(&self) -> bool {
        self.is_bos
    }

    /// Packet is the last of its logical bitstream.
    pub fn is_eos(&self) -> bool {
        self.is_eos
    }
}

struct Partial {
    serialno: u32,
    data: Vec<u8>,
}

/// Packet assembly on top of a [`PageReader`].
///
/// Tracks a per-stream packet number and joins packets that span pages.
/// The comment engine reads header packets through this and then takes the
/// page reader back to pass the rest of the file through untouched.
pub struct PacketReader<R: Read> {
    pages: PageReader<R>,
    queue: VecDeque<Packet>,
    partials: Vec<Partial>,
    counters: Vec<(u32, u64)>,
}

impl<R: Read> PacketReader<R> {
    /// Creates a new `PacketReader`.
    pub fn new(reader: R) -> Self {
        Self {
            pages: PageReader::new(reader),
            queue: VecDeque::with_capacity(8),
            partials: Vec::new(),
            counters: Vec::new(),
        }
    }

    /// Hands back the underlying page reader, positioned after the last
    /// fully consumed page.
    pub fn into_page_reader(self) -> PageReader<R> {
        self.pages
    }

    /// Number of header packets of the given stream.
    pub fn numheaders(&self, serialno: u32) -> i64 {
        self.pages.numheaders(serialno)
    }

    /// Content type name of the given stream, `None` when the codec was not
    /// identified.
    pub fn content_type(&self, serialno: u32) -> Option<&'static str> {
        self.pages.content_type(serialno)
    }

    pub(crate) fn codec(&self, serialno: u32) -> Option<Codec> {
        self.pages.codec(serialno)
    }

    /// Reads the next packet. Returns `None` at the end of the input.
    pub fn next_packet(&mut self) -> Result<Option<Packet>, ReadError> {
        loop {
            if let Some(packet) = self.queue.pop_front() {
                return Ok(Some(packet));
            }

            let (serialno, granule_position, is_continuation, is_eos, laces, body) =
                match self.pages.next_page()? {
                    None => return Ok(None),
                    Some(ev) => (
                        ev.page.bitstream_serial_number(),
                        ev.page.granule_position(),
                        ev.page.is_continuation(),
                        ev.page.is_eos(),
                        ev.page.lacing_values().to_vec(),
                        ev.page.body().to_vec(),
                    ),
                };

            self.split_page(serialno, granule_position, is_continuation, is_eos, &laces, &body);
        }
    }

    fn split_page(
        &mut self,
        serialno: u32,
        granule_position: u64,
        is_continuation: bool,
        is_eos: bool,
        laces: &[u8],
        body: &[u8],
    ) {
        let partial = self
            .partials
            .iter()
            .position(|p| p.serialno == serialno)
            .map(|i| self.partials.remove(i).data);

        // A continuation page resumes the stream's partial packet; a
        // non-continuation page after a partial is a discontinuity and the
        // partial is dropped.
        let mut pending = if is_continuation { partial } else { None };
        let mut lost_start = is_continuation && pending.is_none();

        let mut completed: Vec<Vec<u8>> = Vec::new();
        let mut segment = 0_usize;
        let mut offset = 0_usize;
        for lace in laces {
            segment += usize::from(*lace);
            if *lace < 255 {
                let bytes = &body[offset..offset + segment];
                offset += segment;
                segment = 0;

                if lost_start {
                    // Tail of a packet whose start was never seen.
                    lost_start = false;
                    continue;
                }

                let mut data = pending.take().unwrap_or_default();
                data.extend_from_slice(bytes);
                completed.push(data);
            }
        }

        // An unfinished tail spills into the stream's partial slot.
        if segment > 0 && !lost_start {
            let mut data = pending.take().unwrap_or_default();
            data.extend_from_slice(&body[offset..offset + segment]);
            self.partials.push(Partial { serialno, data });
        }

        let count = completed.len();
        for (index, data) in completed.into_iter().enumerate() {
            let packetno = self.next_packetno(serialno);
            self.queue.push_back(Packet {
                data,
                bitstream_serial_number: serialno,
                granule_position: if index + 1 == count {
                    granule_position
                } else {
                    NO_GRANULE_POSITION
                },
                packetno,
                is_bos: packetno == 0,
                is_eos: is_eos && index + 1 == count && segment == 0,
            });
        }
    }

    fn next_packetno(&mut self, serialno: u32) -> u64 {
        match self.counters.iter_mut().find(|(s, _)| *s == serialno) {
            Some((_, next)) => {
                let packetno = *next;
                *next += 1;
                packetno
            }
            None => {
                self.counters.push((serialno, 1));
                0
            }
        }
    }
}
