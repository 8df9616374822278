//! # ttsubset CLI
//!
//! Usage:
//!   ttsubset font.ttf --text "Hello 世界" -o output.pdf
//!   ttsubset font.ttf --text-file input.txt --config subset.json --report
//!
//! Set `RUST_LOG=info` to watch encoding transitions.

use std::env;
use std::fs;
use std::process;

use ttsubset::{DocumentContext, SubsetConfig, SubsetError};

const FONT_SIZE: f64 = 12.0;

struct Args {
    font: String,
    text: Option<String>,
    text_file: Option<String>,
    output: String,
    config: Option<String>,
    report: bool,
}

fn usage() -> ! {
    eprintln!(
        "usage: ttsubset FONT.ttf (--text STR | --text-file PATH) [-o out.pdf] [--config cfg.json] [--report]"
    );
    process::exit(1);
}

fn parse_args() -> Args {
    let mut args = env::args().skip(1);
    let mut parsed = Args {
        font: String::new(),
        text: None,
        text_file: None,
        output: "output.pdf".to_string(),
        config: None,
        report: false,
    };
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--text" => parsed.text = Some(args.next().unwrap_or_else(|| usage())),
            "--text-file" => parsed.text_file = Some(args.next().unwrap_or_else(|| usage())),
            "-o" => parsed.output = args.next().unwrap_or_else(|| usage()),
            "--config" => parsed.config = Some(args.next().unwrap_or_else(|| usage())),
            "--report" => parsed.report = true,
            "-h" | "--help" => usage(),
            _ if arg.starts_with('-') || !parsed.font.is_empty() => usage(),
            _ => parsed.font = arg,
        }
    }
    if parsed.font.is_empty() || parsed.text.is_some() == parsed.text_file.is_some() {
        usage();
    }
    parsed
}

fn run(args: &Args) -> Result<(), SubsetError> {
    let config = match &args.config {
        Some(path) => SubsetConfig::from_json(&fs::read_to_string(path)?)?,
        None => SubsetConfig::default(),
    };
    let text = match (&args.text, &args.text_file) {
        (Some(text), _) => text.clone(),
        (None, Some(path)) => fs::read_to_string(path)?,
        (None, None) => String::new(),
    };

    let mut context = DocumentContext::new();
    let mut font = ttsubset::open_font(fs::read(&args.font)?, &mut context, config)?;
    let pdf_bytes = ttsubset::pdf::PdfWriter::write_text_document(&mut font, &text, FONT_SIZE)?;
    fs::write(&args.output, &pdf_bytes)?;

    eprintln!("✓ Written {} bytes to {}", pdf_bytes.len(), args.output);
    if args.report {
        let report = serde_json::to_string_pretty(&font.report())
            .map_err(|e| SubsetError::FontError(format!("Failed to serialize report: {}", e)))?;
        println!("{}", report);
    }
    Ok(())
}

fn main() {
    env_logger::init();
    let args = parse_args();
    if let Err(e) = run(&args) {
        eprintln!("✗ {}", e);
        process::exit(1);
    }
}
