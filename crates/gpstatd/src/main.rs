//! gpstatd - Greenplum metrics agent.
//!
//! Connects to the cluster coordinator, runs every registered scraper once
//! per interval and writes the resulting measurements to stdout.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;
#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod output;

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::thread;
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use gpstat_core::ScraperConfig;
use gpstat_core::collector::{
    Connector, DatabaseSizeScraper, Measurement, PgConnection, PgConnector, Scraper, TlsMode,
};

use output::OutputFormat;

/// TLS policy for all cluster connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum TlsArg {
    Disable,
    Require,
    RequireInsecure,
}

impl From<TlsArg> for TlsMode {
    fn from(arg: TlsArg) -> Self {
        match arg {
            TlsArg::Disable => TlsMode::Disable,
            TlsArg::Require => TlsMode::Require,
            TlsArg::RequireInsecure => TlsMode::RequireInsecure,
        }
    }
}

/// Greenplum metrics agent.
#[derive(Parser)]
#[command(name = "gpstatd", about = "Greenplum metrics agent", version)]
struct Args {
    /// Connection string of the coordinator, e.g.
    /// postgres://gpadmin@mdw:5432/postgres. Per-database connections reuse
    /// it with the database name substituted.
    #[arg(long, env = "GPDB_DATA_SOURCE_URL", hide_env_values = true)]
    dsn: String,

    /// Scrape interval in seconds.
    #[arg(short, long, default_value = "15")]
    interval: u64,

    /// Run a single scrape cycle and exit (non-zero if it reported errors).
    #[arg(long)]
    once: bool,

    /// Output measurements as JSON lines.
    #[arg(long)]
    json: bool,

    /// TLS mode for coordinator and per-database connections.
    #[arg(long, value_enum, default_value = "disable")]
    tls: TlsArg,

    /// Connect timeout in seconds (unless the connection string sets one).
    #[arg(long, default_value = "5")]
    connect_timeout: u64,

    /// Deadline for the database enumeration query, in milliseconds.
    #[arg(long, default_value = "2000")]
    primary_deadline_ms: u64,

    /// Deadline for per-database and aggregate queries, in milliseconds.
    /// Unset means no deadline.
    #[arg(long)]
    target_deadline_ms: Option<u64>,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

/// Initializes the tracing subscriber with the appropriate log level.
/// Logs go to stderr; stdout carries the measurements.
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let mut filter = EnvFilter::from_default_env();
    for target in ["gpstatd", "gpstat_core"] {
        match format!("{}={}", target, level).parse() {
            Ok(directive) => filter = filter.add_directive(directive),
            Err(e) => eprintln!("invalid log directive for {}: {}", target, e),
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

/// Primary connection to the coordinator, re-established when broken.
struct Primary {
    connector: PgConnector,
    dsn: String,
    conn: Option<PgConnection>,
}

impl Primary {
    fn get(&mut self) -> Option<&mut PgConnection> {
        if self.conn.as_mut().is_some_and(|c| c.is_broken()) {
            warn!("coordinator connection lost, reconnecting");
            self.conn = None;
        }

        if self.conn.is_none() {
            match self.connector.connect(&self.dsn) {
                Ok(conn) => {
                    info!("connected to coordinator");
                    self.conn = Some(conn);
                }
                Err(e) => {
                    error!(error = %e, "failed to connect to coordinator");
                    return None;
                }
            }
        }
        self.conn.as_mut()
    }
}

/// Runs every scraper once. Returns true if all of them succeeded.
fn run_cycle(
    primary: &mut Primary,
    scrapers: &[Box<dyn Scraper>],
    sink: &mut Sender<Measurement>,
) -> bool {
    let Some(conn) = primary.get() else {
        return false;
    };
    let server_version = conn.server_version_num().unwrap_or(0);
    debug!(server_version, "coordinator version");

    let mut ok = true;
    for scraper in scrapers {
        let started = Instant::now();
        match scraper.scrape(&mut *conn, &mut *sink, server_version) {
            Ok(()) => info!(
                scraper = scraper.name(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "scrape completed"
            ),
            Err(e) => {
                ok = false;
                warn!(
                    scraper = scraper.name(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    failures = e.failure_count(),
                    error = %e,
                    "scrape completed with errors"
                );
            }
        }
    }
    ok
}

fn main() {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet);

    info!("gpstatd {} starting", gpstat_core::BUILD_VERSION);
    info!(
        "Config: interval={}s, tls={:?}, primary_deadline={}ms, target_deadline={:?}",
        args.interval, args.tls, args.primary_deadline_ms, args.target_deadline_ms
    );

    let config = match ScraperConfig::new(args.dsn.clone()) {
        Ok(c) => c
            .with_primary_deadline(Duration::from_millis(args.primary_deadline_ms))
            .with_target_deadline(args.target_deadline_ms.map(Duration::from_millis)),
        Err(e) => {
            error!("{}", e);
            std::process::exit(2);
        }
    };

    let connector = match PgConnector::new(args.tls.into()) {
        Ok(c) => c.with_connect_timeout(Duration::from_secs(args.connect_timeout)),
        Err(e) => {
            error!("{}", e);
            std::process::exit(2);
        }
    };

    let scrapers: Vec<Box<dyn Scraper>> = vec![Box::new(DatabaseSizeScraper::new(
        config.clone(),
        connector.clone(),
    ))];

    let mut primary = Primary {
        connector,
        dsn: config.base_dsn().to_string(),
        conn: None,
    };

    // Setup graceful shutdown
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    }) {
        warn!("Failed to set Ctrl-C handler: {}", e);
    }

    let format = if args.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };
    let (mut sink, rx) = mpsc::channel::<Measurement>();
    let printer = thread::spawn(move || output::write_all(rx, format, io::stdout().lock()));

    let interval = Duration::from_secs(args.interval);
    let mut cycle: u64 = 0;
    let mut last_ok = true;

    info!("Starting scrape loop");

    while running.load(Ordering::SeqCst) {
        cycle += 1;
        debug!(cycle, "scrape cycle starting");
        last_ok = run_cycle(&mut primary, &scrapers, &mut sink);

        if args.once {
            break;
        }

        // Sleep with periodic checks for shutdown signal
        let sleep_interval = Duration::from_millis(100);
        let mut remaining = interval;
        while remaining > Duration::ZERO && running.load(Ordering::SeqCst) {
            let sleep_time = remaining.min(sleep_interval);
            thread::sleep(sleep_time);
            remaining = remaining.saturating_sub(sleep_time);
        }
    }

    info!("Shutting down...");

    drop(sink);
    match printer.join() {
        Ok(Ok(lines)) => debug!(lines, "output closed"),
        Ok(Err(e)) => error!("Failed to write measurements: {}", e),
        Err(_) => error!("Output thread panicked"),
    }

    info!("Shutdown complete after {} cycles", cycle);

    if args.once && !last_ok {
        std::process::exit(1);
    }
}
