// gancube — offline frame decoder for GAN smart cubes and timers
//
// Feeds captured notification frames (hex, one per line) through the same
// protocol stack a live session uses, without any BLE hardware attached.

mod config;
mod render;

use std::io::{BufRead, BufReader, Read};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;

use gancube_core::crypto::{key_pair_for_name, AesCbcEnvelope};
use gancube_core::cube::{fit_timestamps, skew_percent};
use gancube_core::event::MoveEvent;
use gancube_core::protocol::driver_for;
use gancube_core::transport::mac_to_salt;
use gancube_core::Generation;

use config::Config;

const EXIT_BAD_ARGS: u8 = 1;
const EXIT_INPUT: u8 = 2;
const EXIT_CRYPTO: u8 = 3;
const EXIT_DESYNC: u8 = 4;

#[derive(Parser)]
#[command(name = "gancube")]
#[command(about = "GAN smart-cube and smart-timer frame decoder", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum GenerationArg {
    Gen2,
    Gen3,
    Gen4,
    Timer,
}

impl From<GenerationArg> for Generation {
    fn from(value: GenerationArg) -> Self {
        match value {
            GenerationArg::Gen2 => Generation::Gen2,
            GenerationArg::Gen3 => Generation::Gen3,
            GenerationArg::Gen4 => Generation::Gen4,
            GenerationArg::Timer => Generation::Timer,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Decode captured notification frames into events
    Decode {
        /// Protocol generation (falls back to the config file)
        #[arg(short, long, value_enum)]
        generation: Option<GenerationArg>,
        /// Device MAC address, for AES envelope salting
        #[arg(short, long)]
        mac: Option<String>,
        /// Device name, for key-pair selection
        #[arg(short, long)]
        name: Option<String>,
        /// Frames are already decrypted
        #[arg(long)]
        plaintext: bool,
        /// Emit events as JSON lines instead of human-readable text
        #[arg(long)]
        json: bool,
        /// Input file with one hex frame per line (stdin when omitted)
        file: Option<String>,
    },
    /// Show the effective AES key and IV for a device
    Keys {
        #[arg(short, long)]
        mac: Option<String>,
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Fit a recorded move log and report the cube clock skew
    Skew {
        /// JSON file with an array of move events (stdin when omitted)
        file: Option<String>,
        /// Print the corrected move log as JSON
        #[arg(long)]
        fit: bool,
    },
    /// Store default device parameters
    Configure {
        #[arg(short, long)]
        mac: Option<String>,
        #[arg(short, long)]
        name: Option<String>,
        #[arg(short, long)]
        generation: Option<String>,
    },
}

fn main() -> ExitCode {
    // Initialize tracing (idempotent)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // Help and version are not argument errors.
            if err.use_stderr() {
                eprintln!("{err}");
                return ExitCode::from(EXIT_BAD_ARGS);
            }
            let _ = err.print();
            return ExitCode::SUCCESS;
        }
    };

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {err:#}", "error:".red().bold());
            ExitCode::from(EXIT_INPUT)
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let config = Config::load().unwrap_or_default();

    match cli.command {
        Commands::Decode {
            generation,
            mac,
            name,
            plaintext,
            json,
            file,
        } => decode(&config, generation, mac, name, plaintext, json, file),
        Commands::Keys { mac, name } => {
            let (mac, name) = resolve_device(&config, mac, name)?;
            let pair = key_pair_for_name(&name).salted(&mac_to_salt(&mac)?);
            println!("device: {name} ({mac})");
            println!("key: {}", hex::encode(pair.key));
            println!("iv:  {}", hex::encode(pair.iv));
            Ok(ExitCode::SUCCESS)
        }
        Commands::Skew { file, fit } => skew(file, fit),
        Commands::Configure {
            mac,
            name,
            generation,
        } => {
            let mut config = config;
            if mac.is_some() {
                config.device_mac = mac;
            }
            if name.is_some() {
                config.device_name = name;
            }
            if generation.is_some() {
                config.generation = generation;
            }
            config.save()?;
            println!("saved to {}", Config::config_file()?.display());
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn resolve_device(
    config: &Config,
    mac: Option<String>,
    name: Option<String>,
) -> Result<(String, String)> {
    let mac = mac
        .or_else(|| config.device_mac.clone())
        .context("no device MAC given (pass --mac or run `gancube configure`)")?;
    let name = name
        .or_else(|| config.device_name.clone())
        .unwrap_or_else(|| "GAN".to_string());
    Ok((mac, name))
}

fn open_input(file: Option<&str>) -> Result<Box<dyn Read>> {
    Ok(match file {
        Some(path) => {
            Box::new(std::fs::File::open(path).with_context(|| format!("cannot open {path}"))?)
        }
        None => Box::new(std::io::stdin()),
    })
}

fn decode(
    config: &Config,
    generation: Option<GenerationArg>,
    mac: Option<String>,
    name: Option<String>,
    plaintext: bool,
    json: bool,
    file: Option<String>,
) -> Result<ExitCode> {
    let generation: Generation = match generation {
        Some(arg) => arg.into(),
        None => match config.generation.as_deref() {
            Some("gen2") => Generation::Gen2,
            Some("gen3") => Generation::Gen3,
            Some("gen4") => Generation::Gen4,
            Some("timer") => Generation::Timer,
            Some(other) => bail!("unknown generation {other:?} in config"),
            None => bail!("no generation given (pass --generation or run `gancube configure`)"),
        },
    };

    let envelope = if generation.encrypted() && !plaintext {
        let (mac, name) = resolve_device(config, mac, name)?;
        Some(AesCbcEnvelope::new(
            &key_pair_for_name(&name),
            &mac_to_salt(&mac)?,
        ))
    } else {
        None
    };

    let mut driver = driver_for(generation);
    let reader = BufReader::new(open_input(file.as_deref())?);

    let mut crypto_failures = 0usize;
    let mut event_index = 0usize;
    let mut now_ms = 0u64;

    for (line_no, line) in reader.lines().enumerate() {
        let line = line.context("failed to read input")?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let raw = match hex::decode(line.replace([' ', ':'], "")) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(line = line_no + 1, %err, "skipping unparsable line");
                crypto_failures += 1;
                continue;
            }
        };
        let frame = match &envelope {
            Some(envelope) => match envelope.decrypt(&raw) {
                Ok(frame) => frame,
                Err(err) => {
                    tracing::warn!(line = line_no + 1, %err, "frame failed decryption");
                    crypto_failures += 1;
                    continue;
                }
            },
            None => raw,
        };

        // Captured frames carry no timing; approximate with a fixed
        // inter-frame gap so debounce logic behaves deterministically.
        now_ms += 50;
        let output = driver.handle_state(&frame, now_ms);
        for command in &output.commands {
            tracing::info!(?command, "driver would issue command");
        }
        for event in &output.events {
            if json {
                println!("{}", serde_json::to_string(event)?);
            } else {
                render::print_event(event_index, event);
            }
            event_index += 1;
        }
        if output.disconnect {
            eprintln!("{}", "protocol desynchronized, stopping".red().bold());
            return Ok(ExitCode::from(EXIT_DESYNC));
        }
    }

    if event_index == 0 && crypto_failures > 0 {
        return Ok(ExitCode::from(EXIT_CRYPTO));
    }
    Ok(ExitCode::SUCCESS)
}

fn skew(file: Option<String>, fit: bool) -> Result<ExitCode> {
    let mut input = String::new();
    open_input(file.as_deref())?
        .read_to_string(&mut input)
        .context("failed to read move log")?;
    let moves: Vec<MoveEvent> =
        serde_json::from_str(&input).context("move log is not a JSON array of moves")?;

    let skew = skew_percent(&moves);
    println!("{} moves, cube clock skew {skew:+.3}%", moves.len());

    if fit {
        let fitted = fit_timestamps(&moves);
        println!("{}", serde_json::to_string_pretty(&fitted)?);
    }
    Ok(ExitCode::SUCCESS)
}
