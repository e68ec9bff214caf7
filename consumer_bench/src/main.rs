use std::error::Error;
use std::process;
use std::thread;
use std::time::Instant;

use clap::Parser;
use signal_hook::consts::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::Signals;
use tracing::{info, warn};

use dqueue::{DurableQueue, QueueConfig};

const END_MARKER: &[u8] = " 🐓 🏰 🥕 ".as_bytes();

#[derive(clap::Parser)]
#[clap()]
struct Opts {
    #[clap(short = 'c', long = "config", default_value = "dqueue-consumer.toml")]
    config: String,
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt().init();

    let opts: Opts = Opts::parse();
    let cfg: QueueConfig = confy::load_path(&opts.config)?;
    let queue = DurableQueue::open(&cfg)?;
    exit_on_signal()?;

    let result = run(&queue);
    queue.close()?;
    result
}

/// `pop` has no timeout, so a consumer parked on an empty queue can only be
/// stopped by ending the process. Everything acknowledged so far is durable.
fn exit_on_signal() -> Result<(), Box<dyn Error>> {
    let mut signals = Signals::new(&[SIGHUP, SIGINT, SIGQUIT, SIGTERM])?;
    thread::spawn(move || {
        if let Some(signal) = signals.forever().next() {
            warn!(signal, "interrupted while consuming");
            process::exit(128 + signal);
        }
    });
    Ok(())
}

fn run(queue: &DurableQueue) -> Result<(), Box<dyn Error>> {
    let (read, write) = queue.positions()?;
    info!(read, write, "draining until end marker");

    let start = Instant::now();
    let mut called = 0usize;
    let mut skipped = 0usize;
    loop {
        match queue.pop()? {
            Some(payload) if payload == END_MARKER => break,
            Some(payload) => {
                if called % 10_000 == 0 {
                    info!(called, current = %String::from_utf8_lossy(&payload), "popping");
                }
                called += 1;
            }
            None => skipped += 1,
        }
    }

    let duration = start.elapsed();
    let ops = (called as f64) / duration.as_secs_f64().max(f64::EPSILON);
    info!(
        called,
        skipped,
        ops_per_sec = ops as u64,
        elapsed = ?duration,
        "finished at end marker"
    );
    info!(stats = %queue.diagnostics()?, "storage");
    Ok(())
}
