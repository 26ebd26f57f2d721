use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::process;

use clap::Parser;

use oggtool_ng::{sort, ToolError};

/// Sort the pages of an OGG file in order of presentation time.
#[derive(Parser)]
#[command(name = "ogg-sort", disable_version_flag = true)]
struct Args {
    /// Output filename (standard output when absent).
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    output: Option<String>,

    /// Verbose operation.
    #[arg(short = 'V', long = "verbose")]
    verbose: bool,

    /// Output version information and exit.
    #[arg(short = 'v', long = "version")]
    version: bool,

    /// Input filename.
    #[arg(value_name = "FILE")]
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
        println!("ogg-sort version {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    // One reader is opened per discovered stream, so the input must be a
    // real file.
    if let Err(err) = File::open(&args.input) {
        eprintln!("ogg-sort: {}: {}", args.input, err);
        process::exit(1);
    }

    let mut output: Box<dyn Write> = match &args.output {
        Some(path) => match File::create(path) {
            Ok(file) => Box::new(BufWriter::new(file)),
            Err(_) => {
                eprintln!("ogg-sort: unable to open output file {}", path);
                process::exit(1);
            }
        },
        None => Box::new(io::stdout()),
    };

    let path = args.input.clone();
    let open = || File::open(&path).map(BufReader::new);

    let result =
        sort(open, &mut output, args.verbose).and_then(|_| output.flush().map_err(ToolError::from));
    if let Err(err) = result {
        eprintln!("ogg-sort: {}", err);
        process::exit(1);
    }
}
