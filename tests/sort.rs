//! Page re-interleaving against synthetic containers.

mod common;

use std::io::Cursor;

use common::*;
use oggtool_ng::{sort, Page, NO_GRANULE_POSITION};

const FIRST: u32 = 0x0101_0101;
const SECOND: u32 = 0x0202_0202;

fn run_sort(input: &[u8], verbose: bool) -> Vec<u8> {
    let bytes = input.to_vec();
    let mut out = Vec::new();
    sort(
        || Ok(Cursor::new(bytes.clone())),
        &mut out,
        verbose,
    )
    .unwrap();
    out
}

fn granules(pages: &[Page]) -> Vec<u64> {
    pages.iter().map(|p| p.granule_position()).collect()
}

/// Two Theora streams (granule positions read as milliseconds), with one
/// page pair deliberately out of time order.
fn out_of_order_file() -> Vec<u8> {
    let mut file = Vec::new();
    file.extend(build_page(FIRST, 0, 0, FLAG_BOS, &[&theora_ident(1000, 1, 0)]));
    file.extend(build_page(SECOND, 0, 0, FLAG_BOS, &[&theora_ident(1000, 1, 0)]));
    // 300 ms page muxed ahead of the other stream's 200 ms page.
    file.extend(build_page(FIRST, 1, 300, FLAG_NONE, &[b"late page"]));
    file.extend(build_page(SECOND, 1, 200, FLAG_NONE, &[b"early page"]));
    file.extend(build_page(FIRST, 2, 400, FLAG_EOS, &[b"tail"]));
    file.extend(build_page(SECOND, 2, 500, FLAG_EOS, &[b"tail"]));
    file
}

#[test]
fn pages_come_out_in_time_order() {
    let out = run_sort(&out_of_order_file(), false);
    let pages = parse_pages(&out);

    // BOS pages first, then data by presentation time: the 200 ms page
    // overtakes the 300 ms page.
    let serials: Vec<u32> = pages.iter().map(|p| p.bitstream_serial_number()).collect();
    assert_eq!(serials[..2], [FIRST, SECOND]);
    assert_eq!(granules(&pages[2..]), vec![200, 300, 400, 500]);
}

#[test]
fn per_stream_order_is_preserved() {
    let input = out_of_order_file();
    let out = run_sort(&input, false);

    let input_pages = parse_pages(&input);
    let output_pages = parse_pages(&out);
    for serialno in [FIRST, SECOND] {
        assert_eq!(
            page_bytes(&stream_pages(&output_pages, serialno)),
            page_bytes(&stream_pages(&input_pages, serialno))
        );
    }
}

#[test]
fn sorted_input_is_identity() {
    let mut file = Vec::new();
    file.extend(build_page(FIRST, 0, 0, FLAG_BOS, &[&theora_ident(1000, 1, 0)]));
    file.extend(build_page(SECOND, 0, 0, FLAG_BOS, &[&theora_ident(1000, 1, 0)]));
    file.extend(build_page(FIRST, 1, 100, FLAG_NONE, &[b"a"]));
    file.extend(build_page(SECOND, 1, 200, FLAG_NONE, &[b"b"]));
    file.extend(build_page(FIRST, 2, 300, FLAG_EOS, &[b"c"]));
    file.extend(build_page(SECOND, 2, 400, FLAG_EOS, &[b"d"]));

    let out = run_sort(&file, false);
    assert_eq!(out, file);
}

#[test]
fn careful_mode_puts_the_non_vorbis_bos_first() {
    // Audio (Vorbis) muxed ahead of video (Theora): the video BOS page
    // must lead the output anyway.
    let audio = 10;
    let video = 20;
    let mut file = Vec::new();
    file.extend(build_page(audio, 0, 0, FLAG_BOS, &[&vorbis_ident(1000)]));
    file.extend(build_page(video, 0, 0, FLAG_BOS, &[&theora_ident(1000, 1, 0)]));
    file.extend(build_page(audio, 1, 100, FLAG_EOS, &[b"audio"]));
    file.extend(build_page(video, 1, 100, FLAG_EOS, &[b"video"]));

    let out = run_sort(&file, false);
    let pages = parse_pages(&out);
    let serials: Vec<u32> = pages.iter().map(|p| p.bitstream_serial_number()).collect();
    assert_eq!(serials[..2], [video, audio]);

    // Both streams keep their own page order.
    let input_pages = parse_pages(&file);
    for serialno in [audio, video] {
        assert_eq!(
            page_bytes(&stream_pages(&pages, serialno)),
            page_bytes(&stream_pages(&input_pages, serialno))
        );
    }
}

#[test]
fn stray_granule_position_on_continuation_page_is_repaired() {
    let big = vec![0x42_u8; 510];
    let mut file = Vec::new();
    file.extend(build_page(FIRST, 0, 0, FLAG_BOS, &[&theora_ident(1000, 1, 0)]));
    file.extend(build_page(FIRST, 1, 100, FLAG_NONE, &[b"data"]));
    // A pure continuation page that wrongly carries a granule position.
    file.extend(build_partial_page(FIRST, 2, 999, FLAG_NONE, &big[..510]));
    file.extend(build_page(FIRST, 3, 200, FLAG_CONTINUATION | FLAG_EOS, &[&[][..]]));

    let out = run_sort(&file, false);
    let pages = parse_pages(&out);

    assert_eq!(pages.len(), 4);
    // The repaired page now carries the sentinel and still has a valid
    // checksum (the page reader would have dropped it otherwise).
    assert_eq!(pages[2].granule_position(), NO_GRANULE_POSITION);
    assert_eq!(pages[2].packet_count(), 0);
    assert_eq!(granules(&pages[3..]), vec![200]);
}

#[test]
fn verbose_mode_still_produces_the_same_container() {
    let quiet = run_sort(&out_of_order_file(), false);
    let verbose = run_sort(&out_of_order_file(), true);
    assert_eq!(quiet, verbose);
}
