use memsched::*;
use anyhow::{bail, Context, Result};
use std::io::Write;

/// Tick-by-tick memory allocation and round-robin scheduling simulator
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// JSON file with base settings; flags below override it
    #[arg(short, long, value_parser = clap::value_parser!(PathBuf))]
    config:         Option<PathBuf>,

    /// Total memory (KB)
    #[arg(short, long)]
    memory:         Option<Kilobytes>,

    /// Block size (KB)
    #[arg(short, long)]
    block:          Option<Kilobytes>,

    /// Placement strategy
    #[arg(short, long, value_enum)]
    strategy:       Option<Strategy>,

    /// Round-robin quantum (ticks)
    #[arg(short, long)]
    quantum:        Option<Ticks>,

    /// Ticks lost per context switch
    #[arg(long)]
    switch_cost:    Option<Ticks>,

    /// Chance per executed tick of blocking on I/O
    #[arg(long)]
    #[arg(value_parser = clap::value_parser!(f64))]
    io_probability: Option<f64>,

    /// Shortest I/O wait (ticks)
    #[arg(long)]
    io_min:         Option<Ticks>,

    /// Longest I/O wait (ticks)
    #[arg(long)]
    io_max:         Option<Ticks>,

    /// Ticks per second
    #[arg(long)]
    speed:          Option<u32>,

    /// Generate processes automatically
    #[arg(short, long)]
    auto:           bool,

    /// Process to create before the first tick, as SIZE_KB:DURATION (repeatable)
    #[arg(long = "spawn", value_parser = parse_request)]
    spawn:          Vec<(Kilobytes, Ticks)>,

    /// Number of ticks to simulate
    #[arg(short, long, default_value_t = 50)]
    ticks:          Ticks,

    /// Seed for reproducible runs
    #[arg(long)]
    seed:           Option<u64>,

    /// Pace ticks in wall-clock time according to the speed
    #[arg(long)]
    realtime:       bool,

    /// Print the final state as JSON instead of text
    #[arg(long)]
    json:           bool,
}

fn parse_request(s: &str) -> Result<(Kilobytes, Ticks), String> {
    let (size, duration) = s
        .split_once(':')
        .ok_or_else(|| format!("expected SIZE:DURATION, got {s:?}"))?;
    let size = size.trim().parse().map_err(|e| format!("bad size {size:?}: {e}"))?;
    let duration = duration.trim().parse().map_err(|e| format!("bad duration {duration:?}: {e}"))?;

    Ok((size, duration))
}

impl Args {
    fn to_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path)  => Config::from_json_path(path)?,
            None        => Config::default(),
        };
        if let Some(v) = self.memory { config.memory_kb = v; }
        if let Some(v) = self.block { config.block_kb = v; }
        if let Some(v) = self.strategy { config.strategy = v; }
        if let Some(v) = self.quantum { config.quantum = v; }
        if let Some(v) = self.switch_cost { config.switch_cost = v; }
        if let Some(v) = self.io_probability { config.io_probability = v; }
        if let Some(v) = self.io_min { config.io_block_min = v; }
        if let Some(v) = self.io_max { config.io_block_max = v; }
        if let Some(v) = self.speed { config.speed = v; }
        config.auto_generate |= self.auto;
        config.validate().context("invalid settings")?;

        Ok(config)
    }
}

/// Writes every log entry from `seen` on and returns the next unseen seq.
fn flush_log<E: Entropy>(sim: &Simulation<E>, seen: u64, out: &mut impl Write) -> Result<u64> {
    for entry in sim.log().since(seen) {
        writeln!(out, "{entry}")?;
    }

    Ok(sim.log().next_seq())
}

/// Builds the simulation and admits the requested processes. Their log
/// lines are written before giving up, so every rejection is explained.
fn start(cli: &Args, out: &mut impl Write) -> Result<(Simulation, u64)> {
    let config = cli.to_config()?;
    let entropy = match cli.seed {
        Some(seed)  => StdEntropy::seeded(seed),
        None        => StdEntropy::from_os(),
    };
    let mut sim = Simulation::new(config, entropy)?;
    for &(size_kb, duration) in &cli.spawn {
        // Rejections are logged like any other outcome.
        let _ = sim.spawn(size_kb, duration);
    }
    let seen = flush_log(&sim, 0, out)?;
    if sim.processes().next().is_none() && !sim.config().auto_generate {
        bail!("nothing to simulate: pass --spawn SIZE:DURATION or --auto");
    }

    Ok((sim, seen))
}

// One character per block: '.' when free, else the owner in base 36.
fn block_map(blocks: &[Pid]) -> String {
    blocks
        .iter()
        .map(|&pid| {
            if pid == FREE { '.' }
            else { std::char::from_digit(pid % 36, 36).unwrap_or('#') }
        })
        .chunks(32)
        .into_iter()
        .map(|row| row.collect::<String>())
        .join("\n")
}

fn print_summary<E: Entropy>(sim: &Simulation<E>) {
    println!();
    println!("tick {} | {} | free {}KB / {}KB",
        sim.now(), sim.config().strategy, sim.free_kb(), sim.total_kb());
    println!("{}", block_map(sim.blocks()));
    println!();
    println!("{:>5} {:>8} {:<10} {:>7} {:>9}", "PID", "SIZE", "STATE", "BASE", "PROGRESS");
    for p in sim.processes() {
        let base = p.address.map_or_else(|| "-".to_string(), |a| a.to_string());
        println!("{:>5} {:>6}KB {:<10} {:>7} {:>5}/{:<3}",
            p.id, p.size_kb, p.state(), base, p.progress, p.duration);
    }
}

fn main() -> Result<()> {
    let cli = Args::parse();
    // With --json, stdout carries only the snapshot.
    let mut out: Box<dyn Write> = if cli.json {
        Box::new(std::io::stderr())
    } else {
        Box::new(std::io::stdout())
    };
    let (mut sim, mut seen) = start(&cli, &mut out)?;

    let pause = std::time::Duration::from_millis(20.max(1000 / u64::from(sim.config().speed)));
    for _ in 0..cli.ticks {
        sim.tick();
        seen = flush_log(&sim, seen, &mut out)?;
        if cli.realtime {
            std::thread::sleep(pause);
        }
    }

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&sim.snapshot())?);
    } else {
        print_summary(&sim);
    }

    Ok(())
}
