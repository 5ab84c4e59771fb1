//! cellreg walkthrough client
//!
//! Run with: `cellreg-demo [--verbose] [--skip-dumps]`

use std::ptr::NonNull;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cellreg::{CellBuffer, CellId, CellRegistry, Decrement, ExternalBuffer, RegistryConfig};

static DIGITS: &[u8] = b"0123456789\0";
static LETTERS: &[u8] = b"!ABCDEF\0";

#[derive(Parser)]
#[command(name = "cellreg-demo")]
#[command(about = "Drive a cell registry through a fixed walkthrough")]
#[command(version)]
struct Cli {
    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Do not print registry dumps between steps
    #[arg(long)]
    skip_dumps: bool,
}

struct Walkthrough {
    registry: CellRegistry,
    dumps: bool,
}

impl Walkthrough {
    fn dump(&self, step: &str) {
        println!("-- {}", step);
        if self.dumps {
            print!("{}", self.registry.dump());
        } else {
            println!("cell count={}", self.registry.len());
        }
    }

    fn decrement(&mut self, id: CellId) -> Result<()> {
        match self.registry.decrement(id) {
            Decrement::Missing => bail!("cell {} vanished before its last release", id),
            Decrement::Retained(refs) => info!(cell = %id, refs, "released one reference"),
            Decrement::Released => info!(cell = %id, "released cell"),
        }
        Ok(())
    }

    fn remove(&mut self, id: CellId) -> Result<()> {
        if !self.registry.remove(id) {
            bail!("cell {} is not registered", id);
        }
        Ok(())
    }
}

/// Wrap caller-held bytes without handing them to the registry.
///
/// # Safety
///
/// `bytes` must outlive every cell that wraps it.
unsafe fn lend(bytes: &mut [u8]) -> Result<ExternalBuffer> {
    let ptr = NonNull::new(bytes.as_mut_ptr()).context("lent storage has no address")?;
    Ok(ExternalBuffer::from_raw_parts(ptr, bytes.len()))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = RegistryConfig::from_env();

    // Initialize logging
    let filter = if cli.verbose {
        "debug"
    } else {
        config.log.level.as_str()
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    config.validate().context("invalid CELLREG_* configuration")?;
    info!(version = cellreg::VERSION, "starting walkthrough");

    // Caller-owned storage lives in `main` and outlives the registry below.
    let mut number = 100i32.to_ne_bytes();
    let mut vectors = [[0u8; 12]; 4];

    let mut demo = Walkthrough {
        registry: CellRegistry::with_config(config),
        dumps: !cli.skip_dumps,
    };
    demo.dump("empty registry");

    let array = demo
        .registry
        .append_zeroed(8 * 100, -1)
        .context("failed to allocate the array cell")?;
    demo.registry.data_mut(array)?[..8].copy_from_slice(&123.45f64.to_ne_bytes());
    let head = demo.registry.head().context("registry has no head")?;
    let first = f64::from_ne_bytes(demo.registry.data(head)?[..8].try_into()?);
    println!("first element of the head cell: {}", first);
    demo.dump("array appended");

    demo.registry
        .append_external(ExternalBuffer::from_static(DIGITS), 0)?;
    let tail = demo.registry.tail().context("registry has no tail")?;
    println!(
        "tail cell holds {:?}",
        String::from_utf8_lossy(demo.registry.data(tail)?)
    );

    // Safety: `number` outlives the registry.
    let number_cell = demo
        .registry
        .append_external(unsafe { lend(&mut number)? }, 1)?;
    demo.dump("three cells");

    demo.remove(number_cell)?;
    demo.registry
        .append_external(ExternalBuffer::from_static(LETTERS), 0)?;
    demo.dump("number swapped for letters");

    let released = demo.registry.release_all(true);
    info!(released, "forced release");
    println!("caller-owned number is still {}", i32::from_ne_bytes(number));
    demo.dump("after forced release");

    // The declared size overstates the 64 bytes actually handed over.
    let mut text = vec![0x40u8; 64];
    text[63] = 0;
    let text = demo.registry.append(Some(CellBuffer::from(text)), 100, -1)?;
    demo.dump("string appended");
    demo.remove(text)?;
    demo.dump("string removed");

    let mut cells = Vec::with_capacity(vectors.len());
    for bytes in vectors.iter_mut() {
        // Safety: `vectors` outlives the registry.
        cells.push(demo.registry.append_external(unsafe { lend(bytes)? }, 0)?);
    }
    let [v1, v2, v3, v4] = cells[..] else {
        bail!("expected four vector cells, got {}", cells.len());
    };
    demo.registry.increment(v1)?;
    demo.registry.increment(v3)?;
    demo.registry.increment(v3)?;
    demo.dump("four vectors");

    demo.remove(v4)?;
    demo.remove(v2)?;
    demo.dump("v4 and v2 removed");

    demo.decrement(v1)?;
    demo.decrement(v1)?;
    demo.dump("v1 released twice");

    let released = demo.registry.release_all(false);
    info!(released, "released unshared cells");
    demo.dump("after unshared release");

    demo.decrement(v3)?;
    let released = demo.registry.release_all(true);
    info!(released, "forced release");
    demo.dump("final state");

    let stats = demo.registry.stats();
    println!(
        "appended={}, removed={}, peak={}, owned bytes released={}",
        stats.appended, stats.removed, stats.peak_len, stats.owned_bytes_released
    );
    Ok(())
}
