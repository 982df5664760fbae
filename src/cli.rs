// Command-line front end for Oxipuff.
//
// Thin wiring over the library: each subcommand reads its inputs, calls one
// library operation and writes the result.

use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process;

use clap::{ArgAction, Args, Parser, Subcommand, ValueHint};

use crate::extent::{BitExtent, ByteExtent, parse_extents};
use crate::locate::{ContainerFormat, find_puff_locations, locate_deflates};
use crate::patch::{
    DiffOptions, PatchOptions, patch_file, puff_diff, puff_patch_to_writer, read_patch,
};
use crate::puffin_stream::DEFAULT_MAX_CACHE_SIZE;
use crate::stream::{ExtentStream, FileStream, MemoryStream, read_all};
use crate::utils::{huff, puff};

const BUF_SIZE: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// Byte size parsing (supports K, M, G suffixes)
// ---------------------------------------------------------------------------

fn parse_byte_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty size string".into());
    }
    let (num_part, multiplier) = match s.as_bytes().last() {
        Some(b'k' | b'K') => (&s[..s.len() - 1], 1024u64),
        Some(b'm' | b'M') => (&s[..s.len() - 1], 1024 * 1024),
        Some(b'g' | b'G') => (&s[..s.len() - 1], 1024 * 1024 * 1024),
        _ => (s, 1u64),
    };
    let num: u64 = num_part
        .trim()
        .parse()
        .map_err(|e| format!("invalid size '{s}': {e}"))?;
    num.checked_mul(multiplier)
        .ok_or_else(|| format!("size overflow: '{s}'"))
}

/// A comma-separated `off:len` list given as one argument.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ExtentList(Vec<ByteExtent>);

fn parse_extent_list(s: &str) -> Result<ExtentList, String> {
    parse_extents(s).map(ExtentList).map_err(|e| e.to_string())
}

// ---------------------------------------------------------------------------
// Clap CLI definition
// ---------------------------------------------------------------------------

/// Deflate-aware binary diff and patch.
#[derive(Parser, Debug)]
#[command(
    name = "oxipuff",
    version,
    about = "Deflate-aware binary diff/patch",
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,

    /// Force overwrite existing output files.
    #[arg(short = 'f', long, global = true)]
    force: bool,

    /// Quiet mode (suppress non-error output).
    #[arg(short = 'q', long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Verbose mode (use multiple times for more detail).
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Output stats as JSON to stderr.
    #[arg(long = "json", global = true)]
    json_output: bool,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Rewrite every deflate stream of a file into puff form.
    Puff(PuffArgs),
    /// Puff a file, huff it back and check the result is bit-identical.
    Puffhuff(PuffHuffArgs),
    /// Create a patch between two files.
    Diff(DiffArgs),
    /// Apply a patch.
    Patch(PatchArgs),
    /// List the deflate blocks of a file as bit extents.
    Locate(LocateArgs),
}

#[derive(Args, Debug, Clone)]
struct InputLayout {
    /// Container holding the deflate data: raw, zlib, gzip or zip.
    #[arg(long, default_value_t = ContainerFormat::Raw)]
    format: ContainerFormat,

    /// Explicit deflate bit extents (`off:len,...`), skipping discovery.
    #[arg(long, value_parser = parse_extent_list, conflicts_with = "format")]
    deflates: Option<ExtentList>,
}

#[derive(Args, Debug)]
struct PuffArgs {
    #[command(flatten)]
    layout: InputLayout,

    /// Input file.
    #[arg(value_hint = ValueHint::FilePath)]
    input: PathBuf,

    /// Output file for the puffed data.
    #[arg(value_hint = ValueHint::FilePath)]
    output: PathBuf,
}

#[derive(Args, Debug)]
struct PuffHuffArgs {
    #[command(flatten)]
    layout: InputLayout,

    /// Input file.
    #[arg(value_hint = ValueHint::FilePath)]
    input: PathBuf,
}

#[derive(Args, Debug)]
struct LocateArgs {
    /// Container holding the deflate data: raw, zlib, gzip or zip.
    #[arg(long, default_value_t = ContainerFormat::Raw)]
    format: ContainerFormat,

    /// Input file.
    #[arg(value_hint = ValueHint::FilePath)]
    input: PathBuf,
}

#[derive(Args, Debug)]
struct DiffArgs {
    /// Container format of the source file.
    #[arg(long = "src-format", default_value_t = ContainerFormat::Raw)]
    src_format: ContainerFormat,

    /// Container format of the destination file.
    #[arg(long = "dst-format", default_value_t = ContainerFormat::Raw)]
    dst_format: ContainerFormat,

    /// Byte extents (`off:len,...`) of the source file to diff.
    #[arg(long = "src-extents", value_parser = parse_extent_list)]
    src_extents: Option<ExtentList>,

    /// Byte extents (`off:len,...`) of the destination file to diff.
    #[arg(long = "dst-extents", value_parser = parse_extent_list)]
    dst_extents: Option<ExtentList>,

    /// Shortest match worth a bsdiff control entry.
    #[arg(long = "small-match", default_value_t = 12)]
    small_match: usize,

    /// Source (old) file.
    #[arg(value_hint = ValueHint::FilePath)]
    source: PathBuf,

    /// Destination (new) file.
    #[arg(value_hint = ValueHint::FilePath)]
    destination: PathBuf,

    /// Output patch file.
    #[arg(value_hint = ValueHint::FilePath)]
    patch: PathBuf,
}

#[derive(Args, Debug)]
struct PatchArgs {
    /// Byte extents (`off:len,...`) of the source file the patch was made from.
    #[arg(long = "src-extents", value_parser = parse_extent_list)]
    src_extents: Option<ExtentList>,

    /// Byte extents (`off:len,...`) of the output file to write.
    #[arg(long = "dst-extents", value_parser = parse_extent_list)]
    dst_extents: Option<ExtentList>,

    /// Memory budget for puffed source data (supports K/M/G suffix).
    #[arg(long = "cache-size", value_parser = parse_byte_size, default_value_t = DEFAULT_MAX_CACHE_SIZE as u64)]
    cache_size: u64,

    /// Source (old) file.
    #[arg(value_hint = ValueHint::FilePath)]
    source: PathBuf,

    /// Patch file.
    #[arg(value_hint = ValueHint::FilePath)]
    patch: PathBuf,

    /// Output file, or `-` for stdout. May be the source itself.
    #[arg(value_hint = ValueHint::FilePath)]
    output: PathBuf,
}

struct GlobalOpts {
    force: bool,
    quiet: bool,
    verbose: u8,
    json_output: bool,
}

#[cfg(any(test, feature = "fuzzing"))]
pub fn fuzz_try_parse_args(args: &[String]) {
    let argv: Vec<String> = std::iter::once("oxipuff".to_string())
        .chain(args.iter().cloned())
        .collect();
    let _ = Cli::try_parse_from(argv);
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

type CmdResult = Result<(), String>;

fn read_file(path: &Path, what: &str) -> Result<Vec<u8>, String> {
    fs::read(path).map_err(|e| format!("{what}: {}: {e}", path.display()))
}

/// Read `path`, restricted to `extents` when given.
fn read_region(path: &Path, extents: Option<&[ByteExtent]>, what: &str) -> Result<Vec<u8>, String> {
    let Some(extents) = extents else {
        return read_file(path, what);
    };
    let ctx = |e: crate::Error| format!("{what}: {}: {e}", path.display());
    let file = FileStream::open(path).map_err(ctx)?;
    let mut stream = ExtentStream::for_read(file, extents.to_vec()).map_err(ctx)?;
    read_all(&mut stream).map_err(ctx)
}

fn write_file(path: &Path, data: &[u8], opts: &GlobalOpts, what: &str) -> CmdResult {
    if path.exists() && !opts.force {
        return Err(format!(
            "{what} exists, use -f to overwrite: {}",
            path.display()
        ));
    }
    fs::write(path, data).map_err(|e| format!("{what}: {}: {e}", path.display()))
}

fn extent_slice(list: &Option<ExtentList>) -> Option<&[ByteExtent]> {
    list.as_ref().map(|l| l.0.as_slice())
}

fn deflates_of(data: &[u8], layout: &InputLayout) -> Result<Vec<BitExtent>, String> {
    match &layout.deflates {
        Some(ExtentList(extents)) => Ok(extents
            .iter()
            .map(|e| BitExtent::new(e.offset, e.length))
            .collect()),
        None => locate_deflates(data, layout.format)
            .map_err(|e| format!("locating {} deflates: {e}", layout.format)),
    }
}

fn print_json(value: serde_json::Value) {
    match serde_json::to_string_pretty(&value) {
        Ok(s) => eprintln!("{s}"),
        Err(e) => eprintln!("oxipuff: json: {e}"),
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn cmd_puff(args: &PuffArgs, opts: &GlobalOpts) -> CmdResult {
    let data = read_file(&args.input, "input file")?;
    let deflates = deflates_of(&data, &args.layout)?;
    let puffed = puff(&data, &deflates).map_err(|e| format!("puff: {e}"))?;
    write_file(&args.output, &puffed, opts, "output file")?;

    if opts.verbose > 0 && !opts.quiet {
        eprintln!(
            "oxipuff: puff: {} deflates, input size: {}, puff size: {}",
            deflates.len(),
            data.len(),
            puffed.len()
        );
    }
    if opts.json_output {
        print_json(serde_json::json!({
            "command": "puff",
            "deflates": deflates.len(),
            "input_size": data.len(),
            "puff_size": puffed.len(),
        }));
    }
    Ok(())
}

fn cmd_puffhuff(args: &PuffHuffArgs, opts: &GlobalOpts) -> CmdResult {
    let data = read_file(&args.input, "input file")?;
    let deflates = deflates_of(&data, &args.layout)?;
    let (puffs, _) = find_puff_locations(&mut MemoryStream::for_read(&data), &deflates)
        .map_err(|e| format!("puff: {e}"))?;
    let puffed = puff(&data, &deflates).map_err(|e| format!("puff: {e}"))?;
    let huffed = huff(&puffed, &deflates, &puffs).map_err(|e| format!("huff: {e}"))?;
    let matches = huffed == data;

    if opts.json_output {
        print_json(serde_json::json!({
            "command": "puffhuff",
            "deflates": deflates.len(),
            "input_size": data.len(),
            "puff_size": puffed.len(),
            "matches": matches,
        }));
    }
    if !matches {
        return Err(format!(
            "puffhuff: {} does not survive the round trip",
            args.input.display()
        ));
    }
    if !opts.quiet {
        eprintln!(
            "oxipuff: puffhuff: {} deflates, {} -> {} -> {} bytes, identical",
            deflates.len(),
            data.len(),
            puffed.len(),
            huffed.len()
        );
    }
    Ok(())
}

fn cmd_locate(args: &LocateArgs, opts: &GlobalOpts) -> CmdResult {
    let data = read_file(&args.input, "input file")?;
    let deflates = locate_deflates(&data, args.format)
        .map_err(|e| format!("locating {} deflates: {e}", args.format))?;

    if opts.json_output {
        let list: Vec<_> = deflates
            .iter()
            .map(|d| serde_json::json!({ "offset": d.offset, "length": d.length }))
            .collect();
        print_json(serde_json::json!({
            "command": "locate",
            "format": args.format.to_string(),
            "deflates": list,
        }));
    } else {
        for d in &deflates {
            println!("{}:{}", d.offset, d.length);
        }
    }
    Ok(())
}

fn cmd_diff(args: &DiffArgs, opts: &GlobalOpts) -> CmdResult {
    let src = read_region(&args.source, extent_slice(&args.src_extents), "source file")?;
    let dst = read_region(&args.destination, extent_slice(&args.dst_extents), "destination file")?;
    let src_deflates = locate_deflates(&src, args.src_format)
        .map_err(|e| format!("locating source {} deflates: {e}", args.src_format))?;
    let dst_deflates = locate_deflates(&dst, args.dst_format)
        .map_err(|e| format!("locating destination {} deflates: {e}", args.dst_format))?;

    let diff_opts = DiffOptions {
        small_match: args.small_match,
    };
    let patch = puff_diff(&src, &dst, &src_deflates, &dst_deflates, &diff_opts)
        .map_err(|e| format!("diff: {e}"))?;
    write_file(&args.patch, &patch, opts, "patch file")?;

    if opts.verbose > 0 && !opts.quiet {
        eprintln!(
            "oxipuff: diff: source size: {}, destination size: {}, patch size: {}",
            src.len(),
            dst.len(),
            patch.len()
        );
    }
    if opts.json_output {
        print_json(serde_json::json!({
            "command": "diff",
            "source_size": src.len(),
            "destination_size": dst.len(),
            "source_deflates": src_deflates.len(),
            "destination_deflates": dst_deflates.len(),
            "patch_size": patch.len(),
        }));
    }
    Ok(())
}

fn cmd_patch(args: &PatchArgs, opts: &GlobalOpts) -> CmdResult {
    let patch = read_file(&args.patch, "patch file")?;
    let max_cache_size = usize::try_from(args.cache_size)
        .map_err(|_| format!("cache size {} does not fit in memory", args.cache_size))?;
    let patch_opts = PatchOptions { max_cache_size };

    let to_stdout = args.output.as_os_str() == "-";
    let in_place = args.output == args.source || args.dst_extents.is_some();
    if !to_stdout && args.output.exists() && !in_place && !opts.force {
        return Err(format!(
            "output file exists, use -f to overwrite: {}",
            args.output.display()
        ));
    }

    let written = if to_stdout {
        if args.dst_extents.is_some() {
            return Err("--dst-extents cannot be used when writing to stdout".into());
        }
        let src = read_region(&args.source, extent_slice(&args.src_extents), "source file")?;
        let mut out = BufWriter::with_capacity(BUF_SIZE, io::stdout().lock());
        let written = puff_patch_to_writer(&src, &patch, &mut out, &patch_opts)
            .map_err(|e| format!("patch: {e}"))?;
        out.flush().map_err(|e| format!("write flush error: {e}"))?;
        written
    } else {
        patch_file(
            &args.source,
            &args.output,
            extent_slice(&args.src_extents),
            extent_slice(&args.dst_extents),
            &patch,
            &patch_opts,
        )
        .map_err(|e| format!("patch: {e}"))?
    };

    if opts.verbose > 0 && !opts.quiet {
        eprintln!("oxipuff: patch: {written} puff bytes written");
    }
    if opts.json_output {
        let (header, payload) = read_patch(&patch).map_err(|e| format!("patch: {e}"))?;
        print_json(serde_json::json!({
            "command": "patch",
            "patch_size": patch.len(),
            "payload_size": payload.len(),
            "source_deflates": header.src.deflates.len(),
            "destination_deflates": header.dst.deflates.len(),
            "puff_size": written,
        }));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn log_filter(verbose: u8, quiet: bool) -> &'static str {
    match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, _) => "debug",
    }
}

/// Main CLI entry point. Parses arguments via clap, dispatches commands.
pub fn run() -> ! {
    let cli = Cli::parse();
    let opts = GlobalOpts {
        force: cli.force,
        quiet: cli.quiet,
        verbose: cli.verbose.min(2),
        json_output: cli.json_output,
    };

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(log_filter(opts.verbose, opts.quiet)),
    )
    .format_timestamp(None)
    .format_target(false)
    .init();

    let result = match &cli.command {
        Cmd::Puff(args) => cmd_puff(args, &opts),
        Cmd::Puffhuff(args) => cmd_puffhuff(args, &opts),
        Cmd::Diff(args) => cmd_diff(args, &opts),
        Cmd::Patch(args) => cmd_patch(args, &opts),
        Cmd::Locate(args) => cmd_locate(args, &opts),
    };

    match result {
        Ok(()) => process::exit(0),
        Err(msg) => {
            eprintln!("oxipuff: {msg}");
            process::exit(1);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
