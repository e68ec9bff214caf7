use std::error::Error;
use std::io::{self, BufRead};
use std::time::Instant;

use clap::Parser;
use tracing::{error, info};

use dqueue::{DurableQueue, QueueConfig};

const END_MARKER: &str = " 🐓 🏰 🥕 ";

#[derive(clap::Parser)]
#[clap()]
struct Opts {
    #[clap(short = 'c', long = "config", default_value = "dqueue-producer.toml")]
    config: String,
    #[clap(short = 'n', long = "count", default_value = "100000")]
    count: usize,
    /// Pop everything back in the same process and check the order.
    #[clap(long)]
    read_after_write: bool,
    #[clap(long = "pause-after-write")]
    pause_after_write: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt().init();

    let opts: Opts = Opts::parse();
    let cfg: QueueConfig = confy::load_path(&opts.config)?;
    info!(data_dir = %cfg.storage.data_dir.display(), durability = ?cfg.storage.durability, "loaded config");
    let queue = DurableQueue::open(&cfg)?;
    let result = run(&queue, &opts);
    queue.close()?;
    result
}

fn run(queue: &DurableQueue, opts: &Opts) -> Result<(), Box<dyn Error>> {
    let (_, first_position) = queue.positions()?;
    let start = Instant::now();

    for called in 0..opts.count {
        let position = queue.push(called.to_string().as_bytes())?;
        if called % 10_000 == 0 {
            info!(called, position, "pushing");
        }
    }
    // A consumer_bench run stops at the marker; a read-after-write run
    // checks the payloads itself.
    if !opts.read_after_write {
        queue.push(END_MARKER.as_bytes())?;
    }

    let duration = start.elapsed();
    let ops = (opts.count as f64) / duration.as_secs_f64().max(f64::EPSILON);
    info!(
        count = opts.count,
        ops_per_sec = ops as u64,
        elapsed = ?duration,
        "write phase finished"
    );

    if opts.read_after_write {
        verify(queue, first_position, opts.count)?;
    }

    info!(stats = %queue.diagnostics()?, "storage");

    if opts.pause_after_write {
        info!("operations finished, press Enter to exit");
        io::stdin().lock().read_line(&mut String::new())?;
    }
    Ok(())
}

/// Pops back the messages this run wrote and compares them with what was sent.
fn verify(queue: &DurableQueue, first_position: u64, count: usize) -> Result<(), Box<dyn Error>> {
    let (read, _) = queue.positions()?;
    if read != first_position {
        error!(read, first_position, "queue held older messages, cannot verify");
        return Err("queue was not empty before the write phase".into());
    }

    let start = Instant::now();
    let mut mismatches = 0usize;
    for expected in 0..count {
        let expected = expected.to_string();
        match queue.pop()? {
            Some(payload) if payload == expected.as_bytes() => {}
            Some(payload) => {
                error!(expected = %expected, got = %String::from_utf8_lossy(&payload), "mismatch");
                mismatches += 1;
            }
            None => {
                error!(expected = %expected, "record missing");
                mismatches += 1;
            }
        }
    }

    let duration = start.elapsed();
    let ops = (count as f64) / duration.as_secs_f64().max(f64::EPSILON);
    info!(count, ops_per_sec = ops as u64, elapsed = ?duration, mismatches, "read phase finished");
    if mismatches > 0 {
        return Err(format!("{} messages did not match", mismatches).into());
    }
    Ok(())
}
