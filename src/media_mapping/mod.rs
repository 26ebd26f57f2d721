//! Codec-specific knowledge for the supported media mappings.
//!
//! A logical bitstream is identified by the magic bytes of the first packet
//! on its BOS page. Identification yields the number of header packets, the
//! granule-shift bit count and the granule rate, which is everything the
//! tools need to place a page in presentation time.

use std::convert::TryFrom;

use crate::{parse_u32_be, parse_u32_le, NO_GRANULE_POSITION};

/// The media mappings the tools know about.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Codec {
    Theora,
    Vorbis,
    Speex,
    Opus,
    Flac,
}

impl Codec {
    /// The content type name reported for streams of this mapping.
    pub(crate) fn content_type(self) -> &'static str {
        match self {
            Codec::Theora => "Theora",
            Codec::Vorbis => "Vorbis",
            Codec::Speex => "Speex",
            Codec::Opus => "Opus",
            Codec::Flac => "FLAC",
        }
    }
}

/// Per-stream framing knowledge derived from a BOS page.
#[derive(Clone, Copy, Debug)]
pub(crate) struct StreamInfo {
    pub(crate) codec: Option<Codec>,
    pub(crate) numheaders: i64,
    pub(crate) granuleshift: u32,
    pub(crate) granulerate_num: u64,
    pub(crate) granulerate_den: u64,
}

impl Default for StreamInfo {
    fn default() -> Self {
        // Defaults for unidentified mappings: three header packets, no
        // granule shift, granule positions counted in seconds.
        Self {
            codec: None,
            numheaders: 3,
            granuleshift: 0,
            granulerate_num: 1,
            granulerate_den: 1,
        }
    }
}

impl StreamInfo {
    /// Presentation time in milliseconds of the given granule position,
    /// `-1` when the position is the "no packet ends here" sentinel.
    pub(crate) fn units(&self, granule_position: u64) -> i64 {
        if granule_position == NO_GRANULE_POSITION {
            return -1;
        }

        let granule = if self.granuleshift > 0 {
            (granule_position >> self.granuleshift)
                + (granule_position & ((1_u64 << self.granuleshift) - 1))
        } else {
            granule_position
        };

        let ms = u128::from(granule) * 1000 * u128::from(self.granulerate_den)
            / u128::from(self.granulerate_num.max(1));
        i64::try_from(ms).unwrap_or(i64::MAX)
    }
}

/// Identifies the mapping of a stream from the first packet of its BOS
/// page. Unknown or truncated identification headers yield the defaults.
pub(crate) fn identify(first_packet: &[u8]) -> StreamInfo {
    if first_packet.starts_with(b"\x80theora") {
        theora(first_packet)
    } else if first_packet.starts_with(b"\x01vorbis") {
        vorbis(first_packet)
    } else if first_packet.starts_with(b"Speex   ") {
        speex(first_packet)
    } else if first_packet.starts_with(b"OpusHead") {
        opus(first_packet)
    } else if first_packet.starts_with(b"\x7fFLAC") {
        flac(first_packet)
    } else {
        StreamInfo::default()
    }
}

fn theora(packet: &[u8]) -> StreamInfo {
    if packet.len() < 42 {
        return StreamInfo::default();
    }

    let fps_numerator = parse_u32_be(&packet[22..26]);
    let fps_denominator = parse_u32_be(&packet[26..30]);
    // KFGSHIFT straddles the quality field: two bits in byte 40, three in
    // byte 41.
    let granuleshift =
        u32::from((packet[40] & 0x03) << 3) | u32::from((packet[41] & 0xE0) >> 5);

    StreamInfo {
        codec: Some(Codec::Theora),
        numheaders: 3,
        granuleshift,
        granulerate_num: u64::from(fps_numerator),
        granulerate_den: u64::from(fps_denominator.max(1)),
    }
}

fn vorbis(packet: &[u8]) -> StreamInfo {
    if packet.len() < 30 {
        return StreamInfo::default();
    }

    let sample_rate = parse_u32_le(&packet[12..16]);

    StreamInfo {
        codec: Some(Codec::Vorbis),
        numheaders: 3,
        granuleshift: 0,
        granulerate_num: u64::from(sample_rate),
        granulerate_den: 1,
    }
}

fn speex(packet: &[u8]) -> StreamInfo {
    if packet.len() < 72 {
        return StreamInfo::default();
    }

    let sample_rate = parse_u32_le(&packet[36..40]);
    let extra_headers = parse_u32_le(&packet[68..72]);

    StreamInfo {
        codec: Some(Codec::Speex),
        numheaders: 2 + i64::from(extra_headers),
        granuleshift: 0,
        granulerate_num: u64::from(sample_rate),
        granulerate_den: 1,
    }
}

fn opus(packet: &[u8]) -> StreamInfo {
    if packet.len() < 19 {
        return StreamInfo::default();
    }

    // Granule positions of an Opus stream always count 48 kHz samples,
    // independent of the input sample rate carried in the header.
    StreamInfo {
        codec: Some(Codec::Opus),
        numheaders: 2,
        granuleshift: 0,
        granulerate_num: 48_000,
        granulerate_den: 1,
    }
}

fn flac(packet: &[u8]) -> StreamInfo {
    if packet.len() < 30 {
        return StreamInfo::default();
    }

    // Header packet count, zero meaning unknown.
    let numheaders = (u16::from(packet[7]) << 8) | u16::from(packet[8]);
    let numheaders = if numheaders == 0 {
        3
    } else {
        i64::from(numheaders) + 1
    };
    // STREAMINFO sample rate, 20 bits.
    let sample_rate = (u32::from(packet[27]) << 12)
        | (u32::from(packet[28]) << 4)
        | (u32::from(packet[29]) >> 4);

    StreamInfo {
        codec: Some(Codec::Flac),
        numheaders,
        granuleshift: 0,
        granulerate_num: u64::from(sample_rate.max(1)),
        granulerate_den: 1,
    }
}
