use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::debug;

use crate::codegen::{generate_header, generate_source};
use crate::config::{Config, DependencyRegistry, TagConfig};
use crate::model::Component;
use crate::resolve::{ensure_namespaced_type_refs, fix_header_references, DependencyMap};
use crate::scanner::analyze_directory;
use crate::utils::errors::emit_diagnostics;
use crate::utils::logger;
use crate::validate::validate_components;
use crate::version::VERSION;

#[derive(Parser, Debug)]
#[command(name = "mpybindgen", version = VERSION, about = "MicroPython binding generator CLI")]
pub struct MpyBindGenCli {
    #[arg(long, global = true)]
    /// Pretty-print the scanned component model before generation.
    dump_components: bool,

    #[arg(long, global = true)]
    /// Display phase timing information.
    time: bool,

    #[arg(long, global = true)]
    /// Load the annotation vocabulary from a JSON file instead of the
    /// built-in `MPy*` tags.
    tag_config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

impl MpyBindGenCli {
    pub fn command(&self) -> &Command {
        &self.command
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Scans, resolves, validates and emits one generated binding pair.
    Generate {
        /// Path to the generation config JSON.
        #[arg(short, long)]
        source: PathBuf,
        /// Output stem override; `-` writes both artifacts to stdout.
        #[arg(short, long)]
        output: Option<String>,
        /// Additional include search directories.
        #[arg(short = 'I', long = "include", value_name = "DIR")]
        include: Vec<PathBuf>,
        /// `NAME=value` definitions seeding the config's variable table.
        #[arg(value_name = "VAR=value")]
        definitions: Vec<String>,
    },
    /// Scans a source file or tree and pretty-prints the component model.
    Dump { path: PathBuf },
}

pub fn run() -> Result<()> {
    logger::init_logging();
    let cli = MpyBindGenCli::parse();
    match &cli.command {
        Command::Generate {
            source,
            output,
            include,
            definitions,
        } => handle_generate(&cli, source, output.as_deref(), include, definitions),
        Command::Dump { path } => handle_dump(&cli, path),
    }
}

#[derive(Default)]
struct Timings {
    phases: Vec<(&'static str, Duration)>,
}

impl Timings {
    fn measure<T>(&mut self, phase: &'static str, work: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let result = work();
        self.phases.push((phase, start.elapsed()));
        result
    }

    fn print(&self) {
        println!("{}", "== Phase timings ==".bold());
        for (phase, duration) in &self.phases {
            println!("{phase:>10}: {duration:.2?}");
        }
    }
}

fn load_tags(cli: &MpyBindGenCli) -> Result<TagConfig> {
    match &cli.tag_config {
        Some(path) => TagConfig::load(path)
            .with_context(|| format!("failed to load tag config {}", path.display())),
        None => Ok(TagConfig::default()),
    }
}

fn parse_definitions(definitions: &[String]) -> BTreeMap<String, String> {
    let mut variables = BTreeMap::new();
    for definition in definitions {
        let (key, value) = match definition.split_once('=') {
            Some((key, value)) => (key.trim(), value.trim()),
            None => (definition.trim(), ""),
        };
        variables.insert(key.to_string(), value.to_string());
    }
    variables
}

fn handle_generate(
    cli: &MpyBindGenCli,
    source: &Path,
    output: Option<&str>,
    includes: &[PathBuf],
    definitions: &[String],
) -> Result<()> {
    let mut timings = Timings::default();
    let tags = load_tags(cli)?;
    let seed = parse_definitions(definitions);

    let mut config = Config::load(source, &seed)
        .with_context(|| format!("failed to load config {}", source.display()))?;
    if let Some(output) = output {
        config.set_target_path(output);
    }
    for include in includes {
        config.add_include_path(include.clone());
    }

    let mut registry = DependencyRegistry::new();
    registry
        .load(&config)
        .context("failed to load dependency configs")?;

    println!(
        "{} {}",
        "analyzing".bold(),
        config.base_directory().display()
    );
    let (mut components, dependencies) = timings.measure("scan", || {
        let mut dependencies = DependencyMap::new();
        for (path, dep_config) in registry.configs() {
            let scanned = analyze_directory(dep_config.base_directory(), &tags)?;
            debug!(
                config = %path.display(),
                components = scanned.len(),
                "scanned dependency"
            );
            dependencies.insert(path.clone(), scanned);
        }
        let components = analyze_directory(config.base_directory(), &tags)?;
        Ok::<_, anyhow::Error>((components, dependencies))
    })?;
    debug!(components = components.len(), "scanned unit");

    let mut diagnostics = timings.measure("resolve", || {
        ensure_namespaced_type_refs(&mut components, &dependencies);
        fix_header_references(&mut components, &config)
    });
    diagnostics.extend(timings.measure("validate", || {
        validate_components(&components, &dependencies)
    }));

    if cli.dump_components {
        println!("{components:#?}");
    }

    // No output is written once any error was reported.
    if emit_diagnostics(&diagnostics) {
        bail!("validation failed");
    }

    let (header, source_text) = timings.measure("generate", || {
        let header = generate_header(&config, &registry, &components)?;
        let source_text = generate_source(&config, &components, &dependencies)?;
        Ok::<_, anyhow::Error>((header, source_text))
    })?;

    timings.measure("write", || write_artifacts(&config, &header, &source_text))?;

    if cli.time {
        timings.print();
    }
    Ok(())
}

fn write_artifacts(config: &Config, header: &str, source: &str) -> Result<()> {
    match (config.target_header_path(), config.target_source_path()) {
        (Some(header_path), Some(source_path)) => {
            if let Some(parent) = source_path.parent() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create output directory {}", parent.display())
                })?;
            }
            fs::write(&header_path, header)
                .with_context(|| format!("failed to write {}", header_path.display()))?;
            fs::write(&source_path, source)
                .with_context(|| format!("failed to write {}", source_path.display()))?;
            println!("{} {}", "generated".green().bold(), header_path.display());
            println!("{} {}", "generated".green().bold(), source_path.display());
        }
        _ => {
            println!("{header}");
            println!("{source}");
        }
    }
    Ok(())
}

fn handle_dump(cli: &MpyBindGenCli, path: &Path) -> Result<()> {
    let tags = load_tags(cli)?;
    let components: Vec<Component> = analyze_directory(path, &tags)
        .with_context(|| format!("failed to scan {}", path.display()))?;
    println!("{components:#?}");
    Ok(())
}
