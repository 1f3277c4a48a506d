//! thingpack CLI - Tool for inspecting and converting client asset archives.

use std::env;
use std::fs;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context};
use thingpack::config::{Settings, VersionCatalog};
use thingpack::core::{
    AssetVersion, CompileOutcome, ProgressEvent, ProgressSink, SaveStatus,
};
use thingpack::obd::{self, ObdVersion};
use thingpack::thing::{Category, ObjectType};
use thingpack::{ObjectStore, SpriteStore};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

const BUILD_DATE: &str = env!("THINGPACK_BUILD_DATE");

/// Logs compile progress at every checkpoint.
struct LogProgress;

impl ProgressSink for LogProgress {
    fn progress(&self, event: ProgressEvent) {
        info!(archive = ?event.archive, "compiling: {}%", event.percent);
    }
}

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();

    // Parse global flags
    let mut level = "info";
    let mut filtered_args: Vec<&str> = Vec::new();
    for arg in &args[1..] {
        match arg.as_str() {
            "-v" | "--verbose" => level = "debug",
            "-vv" | "--trace" => level = "trace",
            "-q" | "--quiet" => level = "error",
            _ => filtered_args.push(arg),
        }
    }
    init_tracing(level);

    match run(&filtered_args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// `THINGPACK_LOG` wins over the command-line level.
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_env("THINGPACK_LOG").unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(args: &[&str]) -> anyhow::Result<()> {
    let Some(&command) = args.first() else {
        print_help();
        return Ok(());
    };
    let settings = Settings::load();

    match command {
        "i" | "info" => {
            let [file, version] = expect_args::<2>(args, "thingpack info <file.spr|file.dat> <version>")?;
            cmd_info(&settings, file, version)
        }
        "copy-spr" => {
            let [input, output, version] =
                expect_args::<3>(args, "thingpack copy-spr <in.spr> <out.spr> <version> [to-version]")?;
            cmd_copy_spr(&settings, input, output, version, args.get(4).copied())
        }
        "copy-dat" => {
            let [input, output, version] =
                expect_args::<3>(args, "thingpack copy-dat <in.dat> <out.dat> <version> [to-version]")?;
            cmd_copy_dat(&settings, input, output, version, args.get(4).copied())
        }
        "e" | "export" => {
            let [dat, spr, category, id, output, version] = expect_args::<6>(
                args,
                "thingpack export <file.dat> <file.spr> <category> <id> <out.obd> <version>",
            )?;
            cmd_export(&settings, dat, spr, category, id, output, version)
        }
        "inspect" => {
            let [file] = expect_args::<1>(args, "thingpack inspect <file.obd>")?;
            cmd_inspect(file)
        }
        "versions" => cmd_versions(&settings),
        "h" | "help" | "-h" | "--help" => {
            print_help();
            Ok(())
        }
        "version" | "--version" => {
            println!("thingpack {} ({})", env!("CARGO_PKG_VERSION"), BUILD_DATE);
            Ok(())
        }
        other => {
            print_help();
            bail!("unknown command '{}'", other)
        }
    }
}

/// The `N` positional arguments after the command.
fn expect_args<'a, const N: usize>(args: &[&'a str], usage: &str) -> anyhow::Result<[&'a str; N]> {
    match args.get(1..=N) {
        Some(slice) => Ok(<[&str; N]>::try_from(slice)?),
        None => bail!("missing arguments\nUsage: {}", usage),
    }
}

fn print_help() {
    println!("thingpack - client asset archive toolkit ({})", BUILD_DATE);
    println!();
    println!("USAGE:");
    println!("    thingpack [OPTIONS] <COMMAND> [ARGS]");
    println!();
    println!("COMMANDS:");
    println!("    i, info   <file> <version>                   Show archive summary (.spr or .dat)");
    println!("    copy-spr  <in> <out> <version> [to]          Rewrite a sprite archive");
    println!("    copy-dat  <in> <out> <version> [to]          Rewrite an object archive");
    println!("    e, export <dat> <spr> <cat> <id> <out> <ver> Export one object as an .obd blob");
    println!("    inspect   <file.obd>                         Show the contents of a blob");
    println!("    versions                                     List known client versions");
    println!("    h, help                                      Show this help");
    println!();
    println!("OPTIONS:");
    println!("    -v, --verbose    Show debug output");
    println!("    -vv, --trace     Show trace output (very verbose)");
    println!("    -q, --quiet      Only report errors");
    println!();
    println!("EXAMPLES:");
    println!("    thingpack info Tibia.spr 8.60");
    println!("    thingpack copy-dat Tibia.dat out.dat 8.60 10.98   # Upgrade metadata");
    println!("    thingpack export Tibia.dat Tibia.spr item 2160 coin.obd 8.60");
    println!();
    println!("NOTES:");
    println!("    - Versions are looked up in the catalog (see 'versions')");
    println!("    - THINGPACK_LOG overrides the log filter, e.g. THINGPACK_LOG=thingpack=trace");
}

fn catalog(settings: &Settings) -> anyhow::Result<VersionCatalog> {
    settings.catalog().context("failed to read version catalog")
}

fn lookup(catalog: &VersionCatalog, text: &str) -> anyhow::Result<AssetVersion> {
    Ok(catalog.find(text)?.clone())
}

fn cmd_info(settings: &Settings, path: &str, version: &str) -> anyhow::Result<()> {
    let version = lookup(&catalog(settings)?, version)?;
    let features = settings.requested_features();
    let is_dat = Path::new(path)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("dat"));

    println!("File:     {}", path);
    println!("Version:  {}", version);
    if is_dat {
        let store = ObjectStore::load(path, version, features)
            .with_context(|| format!("failed to open {}", path))?;
        println!("Features: {:?}", store.features());
        println!();
        for category in Category::ALL {
            let (total, animated) = store.things(category)?.fold((0usize, 0usize), |(n, a), t| {
                (n + 1, a + usize::from(t.groups().iter().any(|g| g.is_animated())))
            });
            println!(
                "  {:<8} {:>6} (ids {}..={}, {} animated)",
                category.name(),
                total,
                store.min_id(category),
                store.count(category),
                animated
            );
        }
    } else {
        let store = SpriteStore::load(path, version, features)
            .with_context(|| format!("failed to open {}", path))?;
        println!("Features: {:?}", store.features());
        println!();
        let count = store.count();
        let mut empty = 0u32;
        for id in 1..=count {
            if store.is_empty_sprite(id)? {
                empty += 1;
            }
        }
        debug!(count, empty, "scanned sprite slots");
        println!("Sprites:  {} ({} empty)", count, empty);
    }
    Ok(())
}

fn cmd_copy_spr(
    settings: &Settings,
    input: &str,
    output: &str,
    version: &str,
    to_version: Option<&str>,
) -> anyhow::Result<()> {
    let catalog = catalog(settings)?;
    let from = lookup(&catalog, version)?;
    let to = match to_version {
        Some(text) => lookup(&catalog, text)?,
        None => from.clone(),
    };
    let features = settings.requested_features();

    let mut store = SpriteStore::load(input, from, features)
        .with_context(|| format!("failed to open {}", input))?;
    let status = store.save(output, to, features, Arc::new(LogProgress))?;
    finish(status, || store.wait_compile())?;
    println!("{} sprites written to {}", store.count(), output);
    Ok(())
}

fn cmd_copy_dat(
    settings: &Settings,
    input: &str,
    output: &str,
    version: &str,
    to_version: Option<&str>,
) -> anyhow::Result<()> {
    let catalog = catalog(settings)?;
    let from = lookup(&catalog, version)?;
    let to = match to_version {
        Some(text) => lookup(&catalog, text)?,
        None => from.clone(),
    };
    let features = settings.requested_features();

    let mut store = ObjectStore::load(input, from, features)
        .with_context(|| format!("failed to open {}", input))?;
    let status = store.save(output, to, features, Arc::new(LogProgress))?;
    finish(status, || store.wait_compile())?;
    let mut total = 0;
    for category in Category::ALL {
        total += store.things(category)?.count();
    }
    println!("{} objects written to {}", total, output);
    Ok(())
}

fn finish(
    status: SaveStatus,
    wait: impl FnOnce() -> thingpack::Result<CompileOutcome>,
) -> anyhow::Result<()> {
    match status {
        SaveStatus::Copied => {
            info!("archive unchanged; copied");
            Ok(())
        }
        SaveStatus::Started => match wait()? {
            CompileOutcome::Compiled(path) => {
                debug!(path = %path.display(), "compile finished");
                Ok(())
            }
            CompileOutcome::Cancelled => bail!("compile was cancelled"),
        },
        SaveStatus::NotStarted => bail!("a compile is already running"),
    }
}

fn cmd_export(
    settings: &Settings,
    dat: &str,
    spr: &str,
    category: &str,
    id: &str,
    output: &str,
    version: &str,
) -> anyhow::Result<()> {
    let version = lookup(&catalog(settings)?, version)?;
    let features = settings.requested_features();
    let category = Category::from_name(category)?;
    let id: u32 = id.parse().with_context(|| format!("invalid object id '{}'", id))?;

    let objects = ObjectStore::load(dat, version.clone(), features)
        .with_context(|| format!("failed to open {}", dat))?;
    let sprites = SpriteStore::load(spr, version.clone(), features)
        .with_context(|| format!("failed to open {}", spr))?;
    let thing = objects.get_thing(category, id)?;

    let blob = obd::encode_with_level(
        thing,
        |sprite_id| sprites.get_sprite(sprite_id),
        version.value(),
        ObdVersion::V2,
        settings.compression_level,
    )?;
    fs::write(output, &blob).with_context(|| format!("failed to write {}", output))?;
    println!("{} {} exported to {} ({} bytes)", category, id, output, blob.len());
    Ok(())
}

fn cmd_inspect(path: &str) -> anyhow::Result<()> {
    let data = fs::read(path).with_context(|| format!("failed to read {}", path))?;
    let blob = obd::decode(&data).with_context(|| format!("failed to decode {}", path))?;

    println!("File:     {}", path);
    println!("Format:   {}", blob.version);
    println!("Client:   {}.{:02}", blob.client_version / 100, blob.client_version % 100);
    println!("Category: {}", blob.object.category());
    print_object(&blob.object);
    println!("Sprites:  {} unique", blob.sprites.len());
    for sprite in &blob.sprites {
        debug!(id = sprite.id(), empty = sprite.is_empty(), "blob sprite");
    }
    Ok(())
}

fn print_object(object: &ObjectType) {
    for group in object.groups() {
        let dims = group.dimensions();
        println!("Group {:?}: {}", group.kind, dims);
        if let Some(animation) = &group.animation {
            println!(
                "  animation: mode {:?}, loops {}, start {}, {} durations",
                animation.mode,
                animation.loop_count,
                animation.start_frame,
                animation.durations.len()
            );
        }
    }
    let props = &object.properties;
    if let Some(speed) = props.ground {
        println!("Ground speed: {}", speed);
    }
    if let Some(light) = &props.light {
        println!("Light: intensity {}, color {}", light.intensity, light.color);
    }
    if let Some(market) = &props.market {
        println!("Market: '{}' (trade as {})", market.name, market.trade_as);
    }
}

fn cmd_versions(settings: &Settings) -> anyhow::Result<()> {
    let catalog = catalog(settings)?;
    match VersionCatalog::default_path() {
        Some(path) if path.exists() => println!("Catalog: {}", path.display()),
        _ => println!("Catalog: built-in"),
    }
    for version in catalog.iter() {
        println!("  {:>5}  {}  ({:?})", version.value(), version, version.format());
    }
    Ok(())
}
