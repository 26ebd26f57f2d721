//! Builders for the synthetic OGG containers used by the integration tests.

#![allow(dead_code)]

use std::convert::TryInto;
use std::io::Cursor;

use oggtool_ng::{Page, PageReader};

pub const FLAG_NONE: u8 = 0;
pub const FLAG_CONTINUATION: u8 = 0x1;
pub const FLAG_BOS: u8 = 0x2;
pub const FLAG_EOS: u8 = 0x4;

/// Assembles one page with correct lacing and checksum.
pub fn build_page(
    serialno: u32,
    pageno: u32,
    granule_position: u64,
    flags: u8,
    packets: &[&[u8]],
) -> Vec<u8> {
    let mut laces = Vec::new();
    let mut body = Vec::new();
    for packet in packets {
        let mut remaining = packet.len();
        while remaining >= 255 {
            laces.push(255_u8);
            remaining -= 255;
        }
        laces.push(remaining as u8);
        body.extend_from_slice(packet);
    }

    let mut header = vec![0_u8; 27];
    header[..4].copy_from_slice(b"OggS");
    header[5] = flags;
    header[6..14].copy_from_slice(&granule_position.to_le_bytes());
    header[14..18].copy_from_slice(&serialno.to_le_bytes());
    header[18..22].copy_from_slice(&pageno.to_le_bytes());
    header[26] = laces.len() as u8;
    header.extend_from_slice(&laces);

    let page = Page::new(header, body);
    let mut out = Vec::new();
    page.write_into(&mut out).unwrap();
    out
}

/// A page holding only the head of a packet that continues on the next
/// page. The body length must be a multiple of 255.
pub fn build_partial_page(
    serialno: u32,
    pageno: u32,
    granule_position: u64,
    flags: u8,
    partial: &[u8],
) -> Vec<u8> {
    assert_eq!(partial.len() % 255, 0);

    let mut header = vec![0_u8; 27];
    header[..4].copy_from_slice(b"OggS");
    header[5] = flags;
    header[6..14].copy_from_slice(&granule_position.to_le_bytes());
    header[14..18].copy_from_slice(&serialno.to_le_bytes());
    header[18..22].copy_from_slice(&pageno.to_le_bytes());
    header[26] = (partial.len() / 255) as u8;
    header.extend(std::iter::repeat(255_u8).take(partial.len() / 255));

    let page = Page::new(header, partial.to_vec());
    let mut out = Vec::new();
    page.write_into(&mut out).unwrap();
    out
}

/// Vorbis identification header with the given sample rate.
pub fn vorbis_ident(sample_rate: u32) -> Vec<u8> {
    let mut p = vec![0_u8; 30];
    p[..7].copy_from_slice(b"\x01vorbis");
    p[11] = 1;
    p[12..16].copy_from_slice(&sample_rate.to_le_bytes());
    p[28] = 0x01;
    p[29] = 0x01;
    p
}

/// Vorbis setup header stand-in.
pub fn vorbis_setup() -> Vec<u8> {
    let mut p = b"\x05vorbis".to_vec();
    p.extend_from_slice(&[0x10; 16]);
    p
}

/// Theora identification header with the given frame rate and granule
/// shift.
pub fn theora_ident(fps_num: u32, fps_den: u32, kfgshift: u8) -> Vec<u8> {
    let mut p = vec![0_u8; 42];
    p[..7].copy_from_slice(b"\x80theora");
    p[7] = 3;
    p[8] = 2;
    p[22..26].copy_from_slice(&fps_num.to_be_bytes());
    p[26..30].copy_from_slice(&fps_den.to_be_bytes());
    p[40] = (kfgshift >> 3) & 0x03;
    p[41] = (kfgshift & 0x07) << 5;
    p
}

fn comment_body(vendor: &str, entries: &[(&str, &str)]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
    body.extend_from_slice(vendor.as_bytes());
    body.extend_from_slice(&(entries.len() as u32).to_le_bytes());
    for (name, value) in entries {
        let entry = format!("{}={}", name, value);
        body.extend_from_slice(&(entry.len() as u32).to_le_bytes());
        body.extend_from_slice(entry.as_bytes());
    }
    body
}

/// Vorbis comment header.
pub fn vorbis_comment(vendor: &str, entries: &[(&str, &str)]) -> Vec<u8> {
    let mut p = b"\x03vorbis".to_vec();
    p.extend(comment_body(vendor, entries));
    p.push(0x01);
    p
}

/// Theora comment header.
pub fn theora_comment(vendor: &str, entries: &[(&str, &str)]) -> Vec<u8> {
    let mut p = b"\x81theora".to_vec();
    p.extend(comment_body(vendor, entries));
    p
}

/// Theora setup header stand-in.
pub fn theora_setup() -> Vec<u8> {
    let mut p = b"\x82theora".to_vec();
    p.extend_from_slice(&[0x20; 16]);
    p
}

/// Decodes vendor and entries of a comment packet, skipping `prefix`
/// magic bytes.
pub fn parse_comment(packet: &[u8], prefix: usize) -> (String, Vec<(String, String)>) {
    let body = &packet[prefix..];
    let mut offset = 0;

    let read_u32 = |body: &[u8], offset: usize| {
        u32::from_le_bytes(body[offset..offset + 4].try_into().unwrap()) as usize
    };

    let vendor_len = read_u32(body, offset);
    offset += 4;
    let vendor = String::from_utf8(body[offset..offset + vendor_len].to_vec()).unwrap();
    offset += vendor_len;

    let count = read_u32(body, offset);
    offset += 4;
    let mut entries = Vec::new();
    for _ in 0..count {
        let entry_len = read_u32(body, offset);
        offset += 4;
        let entry = String::from_utf8(body[offset..offset + entry_len].to_vec()).unwrap();
        offset += entry_len;
        let split = entry.find('=').unwrap();
        entries.push((entry[..split].to_string(), entry[split + 1..].to_string()));
    }

    (vendor, entries)
}

/// Reads back every page of a container.
pub fn parse_pages(bytes: &[u8]) -> Vec<Page> {
    let mut reader = PageReader::new(Cursor::new(bytes.to_vec()));
    let mut pages = Vec::new();
    while let Some(ev) = reader.next_page().unwrap() {
        pages.push(ev.page.clone());
    }
    pages
}

/// The pages of one stream, in output order.
pub fn stream_pages(pages: &[Page], serialno: u32) -> Vec<Page> {
    pages
        .iter()
        .filter(|page| page.bitstream_serial_number() == serialno)
        .cloned()
        .collect()
}

/// Raw bytes of a page sequence, for byte-identity assertions.
pub fn page_bytes(pages: &[Page]) -> Vec<u8> {
    let mut out = Vec::new();
    for page in pages {
        page.write_into(&mut out).unwrap();
    }
    out
}
