use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::process;

use clap::Parser;

use oggtool_ng::{chop, ChopInterval, ToolError};

/// Extract the pages of an OGG file within a given time interval.
#[derive(Parser)]
#[command(name = "ogg-chop", disable_version_flag = true)]
struct Args {
    /// Start time in seconds.
    #[arg(
        short = 's',
        long = "start",
        value_name = "SECONDS",
        default_value_t = 0.0
    )]
    start: f64,

    /// End time in seconds (to the end of the input when absent).
    #[arg(short = 'e', long = "end", value_name = "SECONDS")]
    end: Option<f64>,

    /// Output filename (standard output when absent).
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    output: Option<String>,

    /// Output version information and exit.
    #[arg(short = 'v', long = "version")]
    version: bool,

    /// Input filename, `-` for standard input.
    #[arg(value_name = "FILE", default_value = "-")]
    input: String,
}

fn main() {
    env_logger::init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let code = match err.kind() {
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            let _ = err.print();
            process::exit(code);
        }
    };

    if args.version {
        println!("ogg-chop version {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    let input: Box<dyn Read> = if args.input == "-" {
        Box::new(io::stdin())
    } else {
        match File::open(&args.input) {
            Ok(file) => Box::new(BufReader::new(file)),
            Err(err) => {
                eprintln!("ogg-chop: {}: {}", args.input, err);
                process::exit(1);
            }
        }
    };

    let mut output: Box<dyn Write> = match &args.output {
        Some(path) => match File::create(path) {
            Ok(file) => Box::new(BufWriter::new(file)),
            Err(_) => {
                eprintln!("ogg-chop: unable to open output file {}", path);
                process::exit(1);
            }
        },
        None => Box::new(io::stdout()),
    };

    let interval = ChopInterval {
        start: args.start,
        end: args.end,
    };

    let result = chop(&interval, input, &mut output)
        .and_then(|_| output.flush().map_err(ToolError::from));
    if let Err(err) = result {
        eprintln!("ogg-chop: {}", err);
        process::exit(1);
    }
}
