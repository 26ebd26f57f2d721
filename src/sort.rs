//! Page re-interleaving in presentation-time order.
//!
//! One independent reader is opened per logical bitstream; each holds a
//! one-page look-ahead slot. The merge loop repeatedly emits the earliest
//! slot, with BOS pages taking precedence over data pages.

use std::io::{Read, Write};

use log::debug;

use crate::page::Page;
use crate::reader::PageReader;
use crate::{ToolError, NO_GRANULE_POSITION};

struct Input<R: Read> {
    reader: PageReader<R>,
    serialno: u32,
    slot: Option<Page>,
}

/// Emits a permutation of the input's pages that is non-decreasing in
/// presentation time while keeping each stream's own page order.
///
/// The opener is called once for a discovery pass and once per discovered
/// stream, each call yielding an independent reader over the same bytes.
/// With `verbose`, per-iteration merge diagnostics go to standard output.
pub fn sort<R, F, W>(mut open: F, output: &mut W, verbose: bool) -> Result<(), ToolError>
where
    R: Read,
    F: FnMut() -> std::io::Result<R>,
    W: Write,
{
    // Discovery pass: one input per BOS page.
    let mut inputs: Vec<Input<R>> = Vec::new();
    let mut discovery = PageReader::new(open()?);
    while let Some(ev) = discovery.next_page()? {
        if !ev.page.is_bos() {
            break;
        }
        let serialno = ev.page.bitstream_serial_number();
        inputs.push(Input {
            reader: PageReader::new(open()?),
            serialno,
            slot: None,
        });
        debug!("tracking stream {:#010x}", serialno);
    }
    drop(discovery);

    // For the common video+audio pairing, make sure a non-Vorbis BOS page
    // leads the output.
    let mut careful = inputs.len() == 2;

    while !inputs.is_empty() {
        // Refill the look-ahead slots, dropping exhausted inputs.
        let mut index = 0;
        while index < inputs.len() {
            if pump(&mut inputs[index])? {
                index += 1;
            } else {
                let input = inputs.remove(index);
                debug!("stream {:#010x} drained", input.serialno);
            }
        }
        if inputs.is_empty() {
            break;
        }

        if verbose {
            println!("{:-<60}", "");
        }

        // Select the earliest page. A BOS page wins outright; otherwise a
        // slot at time zero is always a minimum, then the smallest
        // non-negative time wins. Unknown (negative) times are never
        // minima.
        let mut min_units: i64 = -1;
        let mut min_index = 0;
        for index in 0..inputs.len() {
            let input = &inputs[index];
            let page = match &input.slot {
                Some(page) => page,
                None => continue,
            };

            if page.is_bos() {
                min_index = index;
                if careful {
                    let is_vorbis =
                        input.reader.content_type(input.serialno) == Some("Vorbis");
                    if index == 0 && is_vorbis {
                        careful = false;
                    } else {
                        break;
                    }
                } else {
                    break;
                }
            }

            let units = input.reader.tell_units();
            if verbose {
                println!(
                    "{}: index {} serialno {:010} units {}",
                    format_time(units),
                    index,
                    input.serialno,
                    units
                );
            }

            if min_units == -1 || units == 0 || (units > -1 && units < min_units) {
                min_units = units;
                min_index = index;
            }
        }

        if verbose {
            println!("min index {}", min_index);
        }

        // Write the earliest page.
        if let Some(page) = inputs[min_index].slot.take() {
            if page.is_bos() {
                careful = false;
            }
            page.write_into(output)?;
        }
    }

    Ok(())
}

fn pump<R: Read>(input: &mut Input<R>) -> Result<bool, ToolError> {
    if input.slot.is_some() {
        return Ok(true);
    }

    while let Some(ev) = input.reader.next_page()? {
        if ev.page.bitstream_serial_number() != input.serialno {
            continue;
        }

        let mut page = ev.page.clone();
        // A continuation page must carry the sentinel granule position;
        // fix it before the page is sorted.
        if page.packet_count() == 0 && page.granule_position() != NO_GRANULE_POSITION {
            page.clear_granule_position();
        }

        input.slot = Some(page);
        return Ok(true);
    }

    Ok(false)
}

fn format_time(units: i64) -> String {
    let sign = if units < 0 { "-" } else { "" };
    let ms = units.unsigned_abs();
    format!(
        "{}{:02}:{:02}:{:02}.{:03}",
        sign,
        ms / 3_600_000,
        (ms / 60_000) % 60,
        (ms / 1000) % 60,
        ms % 1000
    )
}
