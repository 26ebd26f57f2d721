//! Comment packet editing and listing.

use std::convert::TryFrom;
use std::io::{Read, Write};

use log::debug;

use crate::media_mapping::Codec;
use crate::reader::PacketReader;
use crate::writer::{Flush, PageWriter};
use crate::{parse_u32_le, ToolError, NO_GRANULE_POSITION};

/// Bound on the header phase for streams whose codec misreports its header
/// packet count.
const MAX_HEADER_PACKETS: u64 = 64;

/// A single `NAME=value` comment entry.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Comment {
    /// The entry's name.
    pub name: String,
    /// The entry's value.
    pub value: String,
}

impl Comment {
    /// Parses a staged `NAME=VALUE` argument. Returns `None` when the
    /// argument contains no `=`.
    pub fn parse(argument: &str) -> Option<Comment> {
        let index = argument.find('=')?;
        Some(Comment {
            name: argument[..index].to_string(),
            value: argument[index + 1..].to_string(),
        })
    }
}

/// Selects which logical bitstreams have their comments edited or listed.
#[derive(Clone, Debug, Default)]
pub struct CommentFilter {
    /// Select every logical bitstream.
    pub do_all: bool,
    /// Serial numbers to select.
    pub serialnos: Vec<u32>,
    /// Content types to select, matched case-insensitively.
    pub content_types: Vec<String>,
}

impl CommentFilter {
    fn is_in_scope(&self, serialno: u32, content_type: Option<&str>) -> bool {
        if self.do_all {
            return true;
        }
        if self.serialnos.contains(&serialno) {
            return true;
        }
        content_type.map_or(false, |ident| {
            self.content_types
                .iter()
                .any(|c| c.eq_ignore_ascii_case(ident))
        })
    }
}

fn comment_prefix(codec: Codec) -> Option<&'static [u8]> {
    match codec {
        Codec::Vorbis => Some(b"\x03vorbis"),
        Codec::Theora => Some(b"\x81theora"),
        Codec::Opus => Some(b"OpusTags"),
        Codec::Speex => Some(b""),
        // The FLAC comment packet is a metadata block, not a prefixed body.
        Codec::Flac => None,
    }
}

fn take<'a>(cursor: &mut &'a [u8], n: usize) -> Option<&'a [u8]> {
    if cursor.len() < n {
        return None;
    }
    let (head, tail) = cursor.split_at(n);
    *cursor = tail;
    Some(head)
}

fn take_u32(cursor: &mut &[u8]) -> Option<u32> {
    take(cursor, 4).map(parse_u32_le)
}

fn parse_comment_body(body: &[u8]) -> Option<(String, Vec<Comment>)> {
    let mut cursor = body;

    let vendor_len = usize::try_from(take_u32(&mut cursor)?).ok()?;
    let vendor = String::from_utf8_lossy(take(&mut cursor, vendor_len)?).into_owned();

    let count = take_u32(&mut cursor)?;
    let mut comments = Vec::new();
    for _ in 0..count {
        let entry_len = usize::try_from(take_u32(&mut cursor)?).ok()?;
        let entry = String::from_utf8_lossy(take(&mut cursor, entry_len)?).into_owned();
        let (name, value) = match entry.find('=') {
            Some(index) => (entry[..index].to_string(), entry[index + 1..].to_string()),
            None => (entry, String::new()),
        };
        comments.push(Comment { name, value });
    }

    Some((vendor, comments))
}

fn generate_comment_body(vendor: &str, comments: &[Comment]) -> Option<Vec<u8>> {
    let mut body = Vec::new();
    body.extend_from_slice(&u32::try_from(vendor.len()).ok()?.to_le_bytes());
    body.extend_from_slice(vendor.as_bytes());
    body.extend_from_slice(&u32::try_from(comments.len()).ok()?.to_le_bytes());
    for comment in comments {
        let entry_len = comment.name.len() + 1 + comment.value.len();
        body.extend_from_slice(&u32::try_from(entry_len).ok()?.to_le_bytes());
        body.extend_from_slice(comment.name.as_bytes());
        body.push(b'=');
        body.extend_from_slice(comment.value.as_bytes());
    }
    Some(body)
}

/// Extracts vendor and entries from a comment packet of the given mapping.
pub(crate) fn parse_comment_packet(
    codec: Codec,
    packet: &[u8],
) -> Option<(String, Vec<Comment>)> {
    let body = match codec {
        Codec::Flac => {
            // Metadata block header: type byte (4 = VORBIS_COMMENT, high
            // bit flags the last block) and a 24-bit length.
            if packet.len() < 4 || packet[0] & 0x7F != 4 {
                return None;
            }
            &packet[4..]
        }
        _ => {
            let prefix = comment_prefix(codec)?;
            if !packet.starts_with(prefix) {
                return None;
            }
            &packet[prefix.len()..]
        }
    };
    parse_comment_body(body)
}

/// Builds a replacement comment packet in the given mapping's framing.
pub(crate) fn generate_comment_packet(
    codec: Codec,
    original: &[u8],
    vendor: &str,
    comments: &[Comment],
) -> Option<Vec<u8>> {
    let body = generate_comment_body(vendor, comments)?;
    match codec {
        Codec::Flac => {
            if original.len() < 4 || body.len() > 0x00FF_FFFF {
                return None;
            }
            let mut packet = Vec::with_capacity(4 + body.len());
            // The last-metadata-block flag of the original is kept.
            packet.push(original[0]);
            packet.extend_from_slice(&u32::try_from(body.len()).ok()?.to_be_bytes()[1..]);
            packet.extend_from_slice(&body);
            Some(packet)
        }
        _ => {
            let prefix = comment_prefix(codec)?;
            let mut packet = Vec::with_capacity(prefix.len() + body.len() + 1);
            packet.extend_from_slice(prefix);
            packet.extend_from_slice(&body);
            if codec == Codec::Vorbis {
                packet.push(0x01);
            }
            Some(packet)
        }
    }
}

fn rebuild_comment_packet(
    codec: Option<Codec>,
    original: &[u8],
    staged: &[Comment],
    delete: bool,
) -> Option<Vec<u8>> {
    let codec = codec?;
    let (vendor, mut comments) = parse_comment_packet(codec, original)?;
    if delete {
        comments.clear();
    }
    comments.extend_from_slice(staged);
    generate_comment_packet(codec, original, &vendor, &comments)
}

fn headers_complete<R: Read>(
    packets: &PacketReader<R>,
    seen_tracks: &mut Vec<u32>,
    serialno: u32,
    packetno: u64,
) -> bool {
    let numheaders = u64::try_from(packets.numheaders(serialno)).unwrap_or(0);
    if packetno + 1 >= numheaders || packetno + 1 >= MAX_HEADER_PACKETS {
        seen_tracks.retain(|s| *s != serialno);
        if seen_tracks.is_empty() {
            return true;
        }
    }
    false
}

/// Rewrites the comment packet of the selected streams.
///
/// The comment packet of every selected stream is replaced by a freshly
/// generated one carrying the input's vendor string and the input's entries
/// (unless `delete`) followed by the staged entries. Everything from the
/// first page after the headers on is copied through byte for byte.
pub fn edit_comments<R: Read, W: Write>(
    input: R,
    output: &mut W,
    filter: &CommentFilter,
    staged: &[Comment],
    delete: bool,
) -> Result<(), ToolError> {
    let mut packets = PacketReader::new(input);
    let mut writer = PageWriter::new(&mut *output);
    let mut seen_tracks: Vec<u32> = Vec::new();

    loop {
        let packet = match packets.next_packet()? {
            Some(packet) => packet,
            None => break,
        };
        let serialno = packet.bitstream_serial_number();

        if packet.packetno() == 0 && !seen_tracks.contains(&serialno) {
            seen_tracks.push(serialno);
        }

        // A packet that ends a page keeps its page boundary, so the page
        // it ends stays aligned with its granule position.
        let flush = if packet.granule_position() == NO_GRANULE_POSITION {
            Flush::None
        } else {
            Flush::After
        };

        let replacement = if packet.packetno() == 1
            && filter.is_in_scope(serialno, packets.content_type(serialno))
        {
            rebuild_comment_packet(packets.codec(serialno), packet.data(), staged, delete)
        } else {
            None
        };

        match replacement {
            Some(data) => writer.feed_raw(
                serialno,
                &data,
                packet.granule_position(),
                packet.is_bos(),
                packet.is_eos(),
                flush,
            )?,
            None => writer.feed(&packet, flush)?,
        }

        if headers_complete(&packets, &mut seen_tracks, serialno, packet.packetno()) {
            break;
        }
    }

    writer.flush_pending()?;
    drop(writer);

    debug!("header phase complete, copying remaining pages");

    let mut pages = packets.into_page_reader();
    while let Some(ev) = pages.next_page()? {
        ev.page.write_into(output)?;
    }

    Ok(())
}

/// Lists the comments of the selected streams.
///
/// Prints codec name (`???` when unknown), serial number, vendor and every
/// `name: value` entry, in the order the streams' comment packets appear.
pub fn list_comments<R: Read, W: Write>(
    input: R,
    output: &mut W,
    filter: &CommentFilter,
) -> Result<(), ToolError> {
    let mut packets = PacketReader::new(input);
    let mut seen_tracks: Vec<u32> = Vec::new();

    loop {
        let packet = match packets.next_packet()? {
            Some(packet) => packet,
            None => break,
        };
        let serialno = packet.bitstream_serial_number();

        if packet.packetno() == 0 && !seen_tracks.contains(&serialno) {
            seen_tracks.push(serialno);
        }

        if packet.packetno() == 1
            && filter.is_in_scope(serialno, packets.content_type(serialno))
        {
            match packets.content_type(serialno) {
                Some(name) => writeln!(output, "{}: serialno {:010}", name, serialno)?,
                None => writeln!(output, "???: serialno {:010}", serialno)?,
            }

            if let Some(codec) = packets.codec(serialno) {
                if let Some((vendor, comments)) = parse_comment_packet(codec, packet.data()) {
                    writeln!(output, "\tVendor: {}", vendor)?;
                    for comment in &comments {
                        writeln!(output, "\t{}: {}", comment.name, comment.value)?;
                    }
                }
            }
        }

        if headers_complete(&packets, &mut seen_tracks, serialno, packet.packetno()) {
            break;
        }
    }

    Ok(())
}
