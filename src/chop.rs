//! Time-interval extraction.
//!
//! Streams move through a per-track phase machine: headers are copied
//! verbatim, then data pages are either emitted directly or, for streams
//! with a granule shift, buffered until the cut point so the keyframe
//! context of the first emitted page survives the cut.

use std::convert::TryFrom;
use std::io::{Read, Write};

use log::debug;

use crate::page::Page;
use crate::reader::{PageEvent, PageReader};
use crate::{ToolError, NO_GRANULE_POSITION};

/// The interval extracted by [`chop`], in seconds.
#[derive(Clone, Copy, Debug)]
pub struct ChopInterval {
    /// Start of the interval.
    pub start: f64,
    /// End of the interval, `None` meaning to the end of the input.
    pub end: Option<f64>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Phase {
    Headers,
    Plain,
    GranuleShift,
    Ignored,
}

struct PageAccum {
    page: Page,
    time: f64,
}

struct TrackState {
    serialno: u32,
    phase: Phase,
    headers_remaining: i64,
    page_accum: Vec<PageAccum>,
    /// Greatest previously inferred keyframe value.
    prev_keyframe: u64,
}

#[allow(clippy::as_conversions)]
fn page_time(units: i64) -> f64 {
    units as f64 / 1000.0
}

/// Extracts the pages inside the given interval from the input.
///
/// Header pages of every stream are kept, data pages inside the interval
/// are kept in order, the page crossing the end of the interval is emitted
/// with the EOS marker set, and for granule-shift streams the buffered
/// keyframe window is emitted ahead of the first in-interval page.
pub fn chop<R: Read, W: Write>(
    interval: &ChopInterval,
    input: R,
    output: &mut W,
) -> Result<(), ToolError> {
    let mut reader = PageReader::new(input);
    let mut tracks: Vec<TrackState> = Vec::new();
    let mut written_accum = false;
    let mut catch_all = true;

    while let Some(ev) = reader.next_page()? {
        let serialno = ev.page.bitstream_serial_number();

        match tracks.iter().position(|t| t.serialno == serialno) {
            Some(index) => {
                let phase = tracks[index].phase;
                match phase {
                    Phase::Headers => read_headers(interval, &mut tracks, index, &ev, output)?,
                    Phase::Plain => read_plain(interval, &mut tracks[index], &ev, output)?,
                    Phase::GranuleShift => {
                        read_gs(interval, &mut tracks, index, &ev, &mut written_accum, output)?
                    }
                    Phase::Ignored => {}
                }
            }
            None => {
                if !catch_all {
                    continue;
                }
                if ev.page.is_bos() {
                    tracks.push(TrackState {
                        serialno,
                        phase: Phase::Headers,
                        headers_remaining: ev.numheaders,
                        page_accum: Vec::new(),
                        prev_keyframe: 0,
                    });
                    let index = tracks.len() - 1;
                    read_headers(interval, &mut tracks, index, &ev, output)?;
                } else {
                    // All BOS pages have been seen; late streams are
                    // ignored from here on.
                    catch_all = false;
                }
            }
        }
    }

    Ok(())
}

fn read_headers<W: Write>(
    interval: &ChopInterval,
    tracks: &mut [TrackState],
    index: usize,
    ev: &PageEvent<'_>,
    output: &mut W,
) -> Result<(), ToolError> {
    ev.page.write_into(output)?;

    let track = &mut tracks[index];
    track.headers_remaining -= i64::try_from(ev.page.packet_count()).unwrap_or(0);

    if track.headers_remaining <= 0 {
        track.phase = if interval.start == 0.0 || ev.granuleshift == 0 {
            Phase::Plain
        } else {
            Phase::GranuleShift
        };
        debug!(
            "stream {:#010x}: headers done, entering {:?} phase",
            track.serialno, track.phase
        );
    }

    Ok(())
}

fn read_plain<W: Write>(
    interval: &ChopInterval,
    track: &mut TrackState,
    ev: &PageEvent<'_>,
    output: &mut W,
) -> Result<(), ToolError> {
    let time = page_time(ev.units);

    if time >= interval.start && interval.end.map_or(true, |end| time <= end) {
        ev.page.write_into(output)?;
    } else if let Some(end) = interval.end {
        if time > end {
            // This is the first page past the end time; mark it and stop
            // handling this track.
            let mut page = ev.page.clone();
            page.set_eos();
            page.write_into(output)?;
            track.phase = Phase::Ignored;
            debug!("stream {:#010x}: end of interval at {:.3}s", track.serialno, time);
        }
    }

    Ok(())
}

fn read_gs<W: Write>(
    interval: &ChopInterval,
    tracks: &mut [TrackState],
    index: usize,
    ev: &PageEvent<'_>,
    written_accum: &mut bool,
    output: &mut W,
) -> Result<(), ToolError> {
    let time = page_time(ev.units);

    if time >= interval.start {
        // Write out accumulated pages, then hand this page to the plain
        // reader.
        write_accum(tracks, written_accum, output)?;
        tracks[index].phase = Phase::Plain;
        return read_plain(interval, &mut tracks[index], ev, output);
    }

    let track = &mut tracks[index];
    let granule_position = ev.page.granule_position();
    if granule_position != NO_GRANULE_POSITION {
        let keyframe = granule_position >> ev.granuleshift;
        if keyframe != track.prev_keyframe {
            // The buffer only ever holds pages whose context is the
            // current keyframe.
            track.page_accum.clear();
            track.prev_keyframe = keyframe;
        }
    }

    track.page_accum.push(PageAccum {
        page: ev.page.clone(),
        time,
    });

    Ok(())
}

/// Merges all tracks' accumulated pages by ascending recorded time and
/// writes them out. Runs at most once per file.
fn write_accum<W: Write>(
    tracks: &mut [TrackState],
    written_accum: &mut bool,
    output: &mut W,
) -> Result<(), ToolError> {
    if *written_accum {
        return Ok(());
    }

    let candidates: Vec<usize> = tracks
        .iter()
        .enumerate()
        .filter(|(_, t)| t.phase == Phase::GranuleShift)
        .map(|(index, _)| index)
        .collect();
    let mut cursors = vec![0_usize; candidates.len()];
    let remaining: usize = candidates
        .iter()
        .map(|index| tracks[*index].page_accum.len())
        .sum();

    for _ in 0..remaining {
        let mut min: Option<(usize, f64)> = None;
        for (candidate, track_index) in candidates.iter().enumerate() {
            let track = &tracks[*track_index];
            if cursors[candidate] < track.page_accum.len() {
                let time = track.page_accum[cursors[candidate]].time;
                if min.map_or(true, |(_, min_time)| time < min_time) {
                    min = Some((candidate, time));
                }
            }
        }

        if let Some((candidate, _)) = min {
            let track = &tracks[candidates[candidate]];
            track.page_accum[cursors[candidate]].page.write_into(output)?;
            cursors[candidate] += 1;
        }
    }

    for index in candidates {
        tracks[index].page_accum.clear();
    }
    debug!("flushed {} accumulated pages", remaining);

    *written_accum = true;

    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::panic)]
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::{PAGER_MARKER, SEGMENT_COUNT_INDEX};

    fn tagged_page(serialno: u32, tag: u8) -> Page {
        let mut header = vec![0_u8; 27];
        header[..4].copy_from_slice(&PAGER_MARKER);
        header[14..18].copy_from_slice(&serialno.to_le_bytes());
        header[SEGMENT_COUNT_INDEX] = 1;
        header.push(1);
        Page::new(header, vec![tag])
    }

    fn gs_track(serialno: u32, pages: &[(u8, f64)]) -> TrackState {
        TrackState {
            serialno,
            phase: Phase::GranuleShift,
            headers_remaining: 0,
            page_accum: pages
                .iter()
                .map(|(tag, time)| PageAccum {
                    page: tagged_page(serialno, *tag),
                    time: *time,
                })
                .collect(),
            prev_keyframe: 0,
        }
    }

    fn emitted_tags(bytes: &[u8]) -> Vec<u8> {
        // Every test page carries a one-byte body; its tag is the final
        // byte of each 29-byte page.
        bytes.chunks(29).map(|page| page[28]).collect()
    }

    #[test]
    fn test_write_accum_merges_by_time() {
        let mut tracks = vec![
            gs_track(1, &[(10, 0.1), (30, 0.3)]),
            gs_track(2, &[(20, 0.2), (40, 0.4)]),
        ];
        let mut written = false;
        let mut out = Vec::new();

        write_accum(&mut tracks, &mut written, &mut out).unwrap();

        assert_eq!(emitted_tags(&out), vec![10, 20, 30, 40]);
        assert!(written);
        assert!(tracks.iter().all(|t| t.page_accum.is_empty()));
    }

    #[test]
    fn test_write_accum_runs_once() {
        let mut tracks = vec![gs_track(1, &[(10, 0.1)])];
        let mut written = false;
        let mut out = Vec::new();

        write_accum(&mut tracks, &mut written, &mut out).unwrap();
        let len = out.len();

        tracks[0].page_accum.push(PageAccum {
            page: tagged_page(1, 99),
            time: 0.2,
        });
        write_accum(&mut tracks, &mut written, &mut out).unwrap();

        assert_eq!(out.len(), len);
    }

    #[test]
    fn test_write_accum_ties_prefer_first_track() {
        let mut tracks = vec![
            gs_track(1, &[(10, 0.5)]),
            gs_track(2, &[(20, 0.5)]),
        ];
        let mut written = false;
        let mut out = Vec::new();

        write_accum(&mut tracks, &mut written, &mut out).unwrap();

        assert_eq!(emitted_tags(&out), vec![10, 20]);
    }
}
