//! synthclone - sampler host with a plugin registry.
//!
//! Usage:
//!   synthclone new <DIR>        Create an empty session
//!   synthclone info <DIR>       Summarize a saved session
//!   synthclone generate <DIR>   Add zones with the zone generator
//!   synthclone plugins          List built-in plugins
//!   synthclone --help           Show help

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Context, Result, bail};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use synthclone_core::{SessionConfig, SessionDocument};
use synthclone_plugin::builtin::{TrimmerPlugin, ZONE_GENERATOR_ID, ZoneGeneratorPlugin};
use synthclone_plugin::{HostConfig, Plugin, PluginManager, builtin_plugins};
use synthclone_session::{EventKind, Session, SessionEvent};

#[derive(Parser)]
#[command(
    name = "synthclone",
    version,
    about = "Create and inspect synthclone sessions",
    long_about = "synthclone records zones of a MIDI instrument into a session.\n\n\
                  This tool creates sessions, lays out zones with the built-in \
                  zone generator and summarizes saved sessions."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create an empty session
    New {
        /// Session directory
        dir: PathBuf,

        /// Sample rate in Hz
        #[arg(short = 'r', long, default_value = "44100")]
        sample_rate: u32,

        /// Channels per sample
        #[arg(short, long, default_value = "2")]
        channels: u16,
    },

    /// Summarize a saved session
    Info {
        /// Session directory
        dir: PathBuf,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Add zones to a session with the zone generator
    Generate {
        /// Session directory
        dir: PathBuf,

        /// Lowest note
        #[arg(long)]
        first_note: Option<u8>,

        /// Highest note
        #[arg(long)]
        last_note: Option<u8>,

        /// Number of notes in the range that get zones
        #[arg(long)]
        total_notes: Option<u8>,

        /// Velocity layers per note
        #[arg(long)]
        velocity_layers: Option<u8>,

        /// MIDI channel
        #[arg(long)]
        channel: Option<u8>,
    },

    /// List built-in plugins
    Plugins,
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let host = HostConfig::load().context("Failed to read host configuration")?;
    init_logging(&host);

    let cli = Cli::parse();

    match cli.command {
        Command::New {
            dir,
            sample_rate,
            channels,
        } => run_new(host, &dir, sample_rate, channels)?,
        Command::Info { dir, format } => run_info(&dir, format)?,
        Command::Generate {
            dir,
            first_note,
            last_note,
            total_notes,
            velocity_layers,
            channel,
        } => run_generate(
            host,
            &dir,
            GenerateArgs {
                first_note,
                last_note,
                total_notes,
                velocity_layers,
                channel,
            },
        )?,
        Command::Plugins => run_plugins(host),
    }

    Ok(())
}

fn init_logging(host: &HostConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(host.log_filter.as_deref().unwrap_or("warn")))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Collect messages the session reports while a command runs.
fn collect_errors(session: &Session) -> Rc<RefCell<Vec<String>>> {
    let errors = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&errors);
    session.subscribe(EventKind::ErrorReported, move |event| {
        if let SessionEvent::ErrorReported { message } = event {
            sink.borrow_mut().push(message.clone());
        }
    });
    errors
}

fn print_errors(errors: &RefCell<Vec<String>>) {
    for message in errors.borrow().iter() {
        eprintln!("warning: {message}");
    }
}

/// Create a session with every enabled built-in plugin active.
fn run_new(host: HostConfig, dir: &Path, sample_rate: u32, channels: u16) -> Result<()> {
    let config = SessionConfig::builder()
        .directory(dir)
        .sample_rate(Some(sample_rate))
        .channel_count(channels)
        .build()
        .context("Invalid session settings")?;

    let session = Session::new();
    let errors = collect_errors(&session);
    let mut manager = PluginManager::new(session.clone(), host);
    manager.register_all(builtin_plugins());

    session
        .create_session(&config)
        .with_context(|| format!("Failed to create session in {}", dir.display()))?;
    for plugin in manager.plugins() {
        manager.activate_plugin(plugin.id.as_str())?;
    }
    session.save_session().context("Failed to save session")?;

    print_errors(&errors);
    println!(
        "Created session in {} ({} Hz, {} channel(s))",
        dir.display(),
        sample_rate,
        channels
    );
    manager.shutdown();
    Ok(())
}

#[derive(Serialize)]
struct SessionSummary {
    directory: PathBuf,
    saved_at: String,
    sample_rate: Option<u32>,
    channels: u16,
    zones: usize,
    selected_zones: usize,
    dry_samples: usize,
    wet_samples: usize,
    participants: Vec<ParticipantSummary>,
    effects: Vec<String>,
    targets: Vec<String>,
    sampler: Option<String>,
}

#[derive(Serialize)]
struct ParticipantSummary {
    id: String,
    active: bool,
}

fn run_info(dir: &Path, format: OutputFormat) -> Result<()> {
    let doc = SessionDocument::read(dir)
        .with_context(|| format!("Failed to read session in {}", dir.display()))?;

    let summary = SessionSummary {
        directory: dir.to_path_buf(),
        saved_at: doc.saved_at.to_rfc3339(),
        sample_rate: doc.sample_rate.map(|r| r.hz()),
        channels: doc.sample_channel_count,
        zones: doc.zones.len(),
        selected_zones: doc.zones.iter().filter(|z| z.selected).count(),
        dry_samples: doc.zones.iter().filter(|z| z.dry_sample.is_some()).count(),
        wet_samples: doc.zones.iter().filter(|z| z.wet_sample.is_some()).count(),
        participants: doc
            .participants
            .iter()
            .map(|p| ParticipantSummary {
                id: p.id.to_string(),
                active: p.active,
            })
            .collect(),
        effects: doc.effects.iter().map(|r| r.participant.to_string()).collect(),
        targets: doc.targets.iter().map(|r| r.participant.to_string()).collect(),
        sampler: doc.sampler.as_ref().map(|r| r.participant.to_string()),
    };

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        OutputFormat::Text => print_summary(&summary),
    }
    Ok(())
}

fn print_summary(summary: &SessionSummary) {
    println!();
    println!("{}", "─".repeat(60));
    println!(" {}", summary.directory.display());
    println!(" Saved {}", summary.saved_at);
    match summary.sample_rate {
        Some(rate) => println!(" {} Hz, {} channel(s)", rate, summary.channels),
        None => println!(" Sample rate not set, {} channel(s)", summary.channels),
    }
    println!("{}", "─".repeat(60));
    println!();

    println!(
        "Zones: {} ({} selected, {} dry, {} wet)",
        summary.zones, summary.selected_zones, summary.dry_samples, summary.wet_samples
    );

    if !summary.participants.is_empty() {
        println!();
        println!("Participants:");
        for p in &summary.participants {
            let marker = if p.active { "active" } else { "inactive" };
            println!("  {:<48} {}", p.id, marker);
        }
    }

    for (title, creators) in [("Effects", &summary.effects), ("Targets", &summary.targets)] {
        if creators.is_empty() {
            continue;
        }
        println!();
        println!("{title}:");
        for (i, creator) in creators.iter().enumerate() {
            println!("  {:>3}. {}", i + 1, creator);
        }
    }

    if let Some(sampler) = &summary.sampler {
        println!();
        println!("Sampler: {sampler}");
    }
}

struct GenerateArgs {
    first_note: Option<u8>,
    last_note: Option<u8>,
    total_notes: Option<u8>,
    velocity_layers: Option<u8>,
    channel: Option<u8>,
}

fn run_generate(host: HostConfig, dir: &Path, args: GenerateArgs) -> Result<()> {
    if host.is_disabled(ZONE_GENERATOR_ID) {
        bail!("The zone generator is disabled in the host configuration");
    }

    let session = Session::new();
    let errors = collect_errors(&session);
    let mut manager = PluginManager::new(session.clone(), host);
    let generator_plugin = ZoneGeneratorPlugin::new();
    let generator = generator_plugin.generator();
    manager.register_plugin(Box::new(generator_plugin))?;
    manager.register_all([Box::new(TrimmerPlugin::new()) as Box<dyn Plugin>]);

    session
        .load_session(dir)
        .with_context(|| format!("Failed to load session in {}", dir.display()))?;
    manager.activate_plugin(ZONE_GENERATOR_ID)?;

    // Flags apply on top of the settings saved with the session.
    let mut settings = generator.settings();
    if let Some(note) = args.first_note {
        settings.set_first_note(note)?;
    }
    if let Some(note) = args.last_note {
        settings.set_last_note(note)?;
    }
    if let Some(total) = args.total_notes {
        settings.set_total_notes(total)?;
    }
    if let Some(layers) = args.velocity_layers {
        settings.set_velocity_layers(layers)?;
    }
    if let Some(channel) = args.channel {
        settings.set_channel(channel)?;
    }
    tracing::debug!(?settings, zones = settings.zone_count(), "zone generator settings");
    generator.set_settings(settings);

    let added = generator.generate()?;
    session.save_session().context("Failed to save session")?;

    print_errors(&errors);
    println!(
        "Added {added} zone(s); the session now has {}",
        session.zone_count()
    );
    manager.shutdown();
    Ok(())
}

fn run_plugins(host: HostConfig) {
    let mut manager = PluginManager::new(Session::new(), host.clone());
    let plugins = builtin_plugins();
    let ids: Vec<String> = plugins.iter().map(|p| p.id().to_string()).collect();
    manager.register_all(plugins);

    for id in ids {
        match manager.plugin(&id) {
            Some(plugin) => {
                println!("{}  {}", plugin.id, plugin.metadata.version);
                println!("    {}", plugin.metadata.name);
                if !plugin.metadata.summary.is_empty() {
                    println!("    {}", plugin.metadata.summary);
                }
            }
            None if host.is_disabled(&id) => println!("{id}  (disabled)"),
            None => println!("{id}  (failed to register)"),
        }
    }
}
