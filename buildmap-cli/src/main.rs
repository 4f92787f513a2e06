use clap::{Parser, Subcommand};
use log::{info, LevelFilter};
use std::fs;
use std::path::{Path, PathBuf};

use buildmap_core::{
    checksum, find_map_files, load_map, map_from_json, map_to_json, save_map, ChecksumStatus, MapError,
    MapReader, MapWriter, Result, Variant,
};

mod config;

use config::{load_settings, Settings};

#[derive(Debug, Parser)]
#[command(name = "buildmap", version, about = "Build engine map inspector and converter")]
struct Args {
    /// Settings file (JSON). Defaults to the per-user config location.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[arg(long, global = true, value_name = "LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print header fields, record counts and checksum status.
    Info {
        file: PathBuf,
        #[arg(long, value_parser = parse_variant)]
        variant: Option<Variant>,
    },
    /// Write the decoded map as JSON.
    Dump {
        file: PathBuf,
        #[arg(long, value_parser = parse_variant)]
        variant: Option<Variant>,
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Encode a JSON map (as produced by `dump`) into a map file.
    Import {
        json: PathBuf,
        output: PathBuf,
        #[arg(long, value_parser = parse_variant)]
        variant: Option<Variant>,
    },
    /// Re-encode a map from one variant's layout into another's.
    Convert {
        input: PathBuf,
        output: PathBuf,
        #[arg(long, value_parser = parse_variant)]
        from: Variant,
        #[arg(long, value_parser = parse_variant)]
        to: Variant,
    },
    /// Read and re-write every map under PATH, checking the bytes match.
    Verify {
        path: PathBuf,
        #[arg(long, value_parser = parse_variant)]
        variant: Option<Variant>,
    },
}

fn parse_variant(s: &str) -> std::result::Result<Variant, String> {
    s.parse::<Variant>().map_err(|e| e.to_string())
}

fn init_logging(level: LevelFilter) -> std::result::Result<(), log::SetLoggerError> {
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                chrono::Local::now().format("%H:%M:%S%.3f"),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stderr())
        .apply()
}

fn checksum_label(status: ChecksumStatus) -> String {
    match status {
        ChecksumStatus::Valid(crc) => format!("ok ({crc:08X})"),
        ChecksumStatus::Mismatch { stored, computed } => {
            format!("MISMATCH (stored {stored:08X}, computed {computed:08X})")
        }
        ChecksumStatus::Missing => "missing".to_string(),
    }
}

fn cmd_info(path: &Path, variant: Variant, settings: &Settings) -> Result<()> {
    let data = fs::read(path)?;
    let reader = MapReader::new(variant);
    let (map, consumed) = reader.read_with_len(&data)?;
    let h = &map.header;

    println!("{} ({} bytes, {} layout)", path.display(), data.len(), variant);
    println!("  version      {}", h.version);
    println!("  position     {}, {}, {}", h.posx, h.posy, h.posz);
    println!("  angle        {}", h.ang);
    println!("  cursectnum   {}", h.cursectnum);
    if reader.config().extra_info {
        println!("  revision     {}", h.revision);
        println!("  skybits      {} ({} offsets)", h.skybits, h.sky_offsets.len());
        println!("  visibility   {}", h.visibility);
        println!("  songid       {}", h.songid);
        println!("  parallax     {}", h.parallaxtype);
    }
    println!("  sectors      {}", map.sectors.len());
    println!("  walls        {}", map.walls.len());
    println!("  sprites      {}", map.sprites.len());
    if let Some(extra) = h.extra_info.as_ref() {
        println!(
            "  payloads     sector {} / wall {} / sprite {} bytes",
            extra.xsector_size, extra.xwall_size, extra.xsprite_size
        );
        let flagged = map.sectors.iter().filter(|s| s.payload.is_some()).count()
            + map.walls.iter().filter(|w| w.payload.is_some()).count()
            + map.sprites.iter().filter(|s| s.payload.is_some()).count();
        println!("  with payload {flagged} records");
    }
    if reader.config().checksum && settings.verify_checksum {
        println!("  checksum     {}", checksum_label(checksum::verify(&data)));
    }
    if consumed < data.len() {
        println!("  trailing     {} bytes", data.len() - consumed);
    }

    let issues = map.check_links();
    if !issues.is_empty() {
        println!("  link issues  {}", issues.len());
        for issue in issues.iter().take(10) {
            println!("    {issue:?}");
        }
    }
    Ok(())
}

fn cmd_dump(path: &Path, variant: Variant, output: Option<&Path>, settings: &Settings) -> Result<()> {
    let map = load_map(path, variant)?;
    let json = map_to_json(&map, settings.pretty_json)?;
    match output {
        Some(out) => {
            fs::write(out, json)?;
            info!("wrote {}", out.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn cmd_import(json_path: &Path, output: &Path, variant: Variant) -> Result<()> {
    let json = fs::read_to_string(json_path)?;
    let map = map_from_json(&json)?;
    save_map(output, &map, variant)?;
    info!(
        "wrote {} ({} sectors, {} walls, {} sprites)",
        output.display(),
        map.sectors.len(),
        map.walls.len(),
        map.sprites.len()
    );
    Ok(())
}

fn cmd_convert(input: &Path, output: &Path, from: Variant, to: Variant) -> Result<()> {
    let map = load_map(input, from)?;
    save_map(output, &map, to)?;
    info!("converted {} ({from}) -> {} ({to})", input.display(), output.display());
    Ok(())
}

fn describe_mismatch(written: &[u8], read: &[u8]) -> String {
    let first_diff = written
        .iter()
        .zip(read.iter())
        .position(|(a, b)| a != b)
        .unwrap_or_else(|| written.len().min(read.len()));
    format!(
        "DIFFERS at offset {first_diff} (wrote {} bytes, read {})",
        written.len(),
        read.len()
    )
}

/// Returns how many files failed to round-trip byte for byte or carry a bad
/// checksum. A file counts once however many of its checks fail.
fn cmd_verify(root: &Path, variant: Variant, settings: &Settings) -> Result<usize> {
    let files = find_map_files(root)?;
    if files.is_empty() {
        return Err(MapError::Format(format!("no .map files under {}", root.display())));
    }

    let reader = MapReader::new(variant);
    let writer = MapWriter::new(variant);
    let mut failures = 0usize;

    for path in &files {
        let data = fs::read(path)?;
        let (mut ok, mut line) = match reader.read(&data).and_then(|map| writer.write(&map)) {
            Ok(bytes) if bytes == data => (true, "ok".to_string()),
            Ok(bytes) => (false, describe_mismatch(&bytes, &data)),
            Err(e) => (false, format!("FAILED: {e}")),
        };
        if reader.config().checksum && settings.verify_checksum {
            let status = checksum::verify(&data);
            ok &= status.is_valid();
            line.push_str(&format!(", checksum {}", checksum_label(status)));
        }
        if !ok {
            failures += 1;
        }
        println!("{}: {}", path.display(), line);
    }

    println!("{} files, {} failures", files.len(), failures);
    Ok(failures)
}

fn run(args: Args, settings: Settings) -> Result<bool> {
    let pick = |v: Option<Variant>| v.unwrap_or(settings.default_variant);
    match args.command {
        Command::Info { file, variant } => cmd_info(&file, pick(variant), &settings).map(|_| true),
        Command::Dump { file, variant, output } => {
            cmd_dump(&file, pick(variant), output.as_deref(), &settings).map(|_| true)
        }
        Command::Import { json, output, variant } => cmd_import(&json, &output, pick(variant)).map(|_| true),
        Command::Convert { input, output, from, to } => cmd_convert(&input, &output, from, to).map(|_| true),
        Command::Verify { path, variant } => cmd_verify(&path, pick(variant), &settings).map(|failures| failures == 0),
    }
}

fn main() {
    let args = Args::parse();

    let settings = match load_settings(args.config.as_deref()) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("Error: failed to load settings: {err}");
            std::process::exit(1);
        }
    };

    let level_name = args.log_level.clone().unwrap_or_else(|| settings.log_level.clone());
    let level = level_name.parse::<LevelFilter>().unwrap_or(LevelFilter::Info);
    if let Err(err) = init_logging(level) {
        eprintln!("Warning: could not initialise logging: {err}");
    }

    match run(args, settings) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(err) => {
            eprintln!("Error: {err}");
            std::process::exit(1);
        }
    }
}
