use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use sweepsync::config::DisambiguatorConfig;
use sweepsync::dispatcher::Disambiguator;
use sweepsync::event::LightRecord;
use sweepsync::replay;
use sweepsync::status::DisambiguatorStatus;
use sweepsync::traits::LightSink;

/// Replay a recorded pulse capture through the disambiguator and report what
/// it decodes. Mostly useful for debugging captures from the field.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Capture file (.rec/.bin raw, anything else text)
    file: PathBuf,

    /// Sensors per tracked object
    #[arg(long, default_value_t = 32)]
    sensors: usize,

    /// JSON config file overriding the built-in defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the final status snapshot to this file as JSON
    #[arg(long)]
    status_out: Option<PathBuf>,

    /// Print every decoded record, not just the summary
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

struct PrintSink {
    verbose: bool,
    syncs: u64,
    sweeps: u64,
}

impl LightSink for PrintSink {
    fn record(&mut self, object: u32, rec: LightRecord) {
        if rec.is_sweep() {
            self.sweeps += 1;
        } else {
            self.syncs += 1;
        }
        if self.verbose {
            println!(
                "obj {} lh {} sensor {:3} acode {} offset {:6} ts {:10} len {}",
                object, rec.lh, rec.sensor_id, rec.acode, rec.offset_in_phase, rec.timestamp,
                rec.length
            );
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<DisambiguatorConfig> {
    match path {
        Some(p) => {
            let content = std::fs::read_to_string(p)
                .with_context(|| format!("read config {}", p.display()))?;
            serde_json::from_str(&content).with_context(|| format!("parse config {}", p.display()))
        }
        None => Ok(DisambiguatorConfig::default()),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::from_default_env()
        .filter_level(if args.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .init();

    let config = load_config(args.config.as_deref())?;
    let records = replay::read_capture(&args.file)?;
    info!("replaying {} events from {}", records.len(), args.file.display());

    let status = Arc::new(RwLock::new(DisambiguatorStatus::default()));
    let sink = PrintSink { verbose: args.verbose, syncs: 0, sweeps: 0 };
    let mut disambiguator = Disambiguator::new(sink, status, config);

    let mut seen = HashSet::new();
    for record in &records {
        if seen.insert(record.object) {
            disambiguator.set_sensor_count(record.object as u32, args.sensors);
        }
        disambiguator.push_event(record.object as u32, record.event);
    }
    disambiguator.update_status();

    let snapshot = disambiguator.snapshot();
    for object in &snapshot.objects {
        println!(
            "obj {}: {} confidence {} drift warnings {}",
            object.object,
            if object.locked {
                format!("locked on phase {}", object.phase)
            } else {
                "unlocked".to_string()
            },
            object.confidence,
            object.drift_warnings
        );
    }
    println!(
        "{} events -> {} sync records, {} sweep records ({})",
        records.len(),
        disambiguator.sink().syncs,
        disambiguator.sink().sweeps,
        if snapshot.single_60hz_mode { "60 Hz single-station" } else { "dual-station" }
    );

    if let Some(path) = &args.status_out {
        let json = serde_json::to_string_pretty(&snapshot)?;
        std::fs::write(path, json).with_context(|| format!("write {}", path.display()))?;
    }

    Ok(())
}
