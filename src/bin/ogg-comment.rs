use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::process;

use clap::Parser;

use oggtool_ng::{edit_comments, list_comments, Comment, CommentFilter, ToolError};

/// List or edit comments in an OGG file.
#[derive(Parser)]
#[command(name = "ogg-comment", disable_version_flag = true)]
struct Args {
    /// List the comments in the given file.
    #[arg(short = 'l', long = "list")]
    list: bool,

    /// Output filename (standard output when absent).
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    output: Option<String>,

    /// Delete comments before editing.
    #[arg(short = 'd', long = "delete")]
    delete: bool,

    /// Edit comments for all logical bitstreams.
    #[arg(short = 'a', long = "all")]
    all: bool,

    /// Edit comments of the logical bitstreams with the given content type.
    #[arg(short = 'c', long = "content-type", value_name = "TYPE")]
    content_types: Vec<String>,

    /// Edit comments of the logical bitstream with the given serialno.
    #[arg(short = 's', long = "serialno", value_name = "NUM")]
    serialnos: Vec<u32>,

    /// Output version information and exit.
    #[arg(short = 'v', long = "version")]
    version: bool,

    /// `NAME=VALUE` comment entries; any other argument is the input
    /// filename (`-` or absent for standard input).
    #[arg(value_name = "TAG|FILE")]
    rest: Vec<String>,
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
        println!("ogg-comment version {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    // Positional arguments containing `=` stage comment entries; the rest
    // names the input file.
    let mut staged: Vec<Comment> = Vec::new();
    let mut input_name: Option<String> = None;
    for argument in &args.rest {
        match Comment::parse(argument) {
            Some(comment) => {
                if !args.list {
                    staged.push(comment);
                }
            }
            None => input_name = Some(argument.clone()),
        }
    }

    let filter = CommentFilter {
        do_all: args.all || (args.serialnos.is_empty() && args.content_types.is_empty()),
        serialnos: args.serialnos.clone(),
        content_types: args.content_types.clone(),
    };

    let input: Box<dyn Read> = match input_name.as_deref() {
        None | Some("-") => Box::new(io::stdin()),
        Some(path) => match File::open(path) {
            Ok(file) => Box::new(BufReader::new(file)),
            Err(err) => {
                eprintln!("ogg-comment: {}: {}", path, err);
                process::exit(1);
            }
        },
    };

    let result = if args.list {
        let mut stdout = io::stdout();
        list_comments(input, &mut stdout, &filter)
    } else {
        let mut output: Box<dyn Write> = match &args.output {
            Some(path) => match File::create(path) {
                Ok(file) => Box::new(BufWriter::new(file)),
                Err(_) => {
                    eprintln!("ogg-comment: unable to open output file {}", path);
                    process::exit(1);
                }
            },
            None => Box::new(io::stdout()),
        };

        edit_comments(input, &mut output, &filter, &staged, args.delete)
            .and_then(|_| output.flush().map_err(ToolError::from))
    };

    if let Err(err) = result {
        eprintln!("ogg-comment: {}", err);
        process::exit(1);
    }
}
