use std::error::Error;
use std::process;
use std::thread;

use clap::Parser;
use env_logger::Builder;
use log::{debug, error, info, warn, LevelFilter};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use tokio::io::{stdin, BufReader};
use tokio_util::sync::CancellationToken;

use bgpcfgd::config::ConfigError;
use bgpcfgd::feed;
use bgpcfgd::sink::{ConfigBackend, LogBackend, VtyshBackend};
use bgpcfgd::transport::ChannelTransport;
use bgpcfgd::{ConfigSink, DaemonConfig, Directory, ManagerContext, Runner, SinkBackend};

#[derive(Parser, Debug)]
#[clap(name = "bgpcfgd", rename_all = "kebab-case")]
/// Translate BGP table changes into routing daemon configuration.
/// Change events are read from stdin, one JSON object per line.
struct Args {
    /// Path to bgpcfgd config. If not provided, defaults are used
    config_path: Option<String>,
    /// Log the generated commands instead of applying them
    #[clap(long)]
    dry_run: bool,
    /// Show debug logs (additive for trace logs)
    #[clap(short, parse(from_occurrences))]
    verbose: u8,
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let (bgpcfgd_level, other_level) = match args.verbose {
        0 => (LevelFilter::Info, LevelFilter::Warn),
        1 => (LevelFilter::Debug, LevelFilter::Warn),
        2 => (LevelFilter::Trace, LevelFilter::Warn),
        _ => (LevelFilter::Trace, LevelFilter::Trace),
    };
    Builder::new()
        .filter(Some("bgpcfgd"), bgpcfgd_level)
        .filter(None, other_level)
        .init();
    info!("Logging at levels {}/{}", bgpcfgd_level, other_level);

    let config = match &args.config_path {
        Some(path) => DaemonConfig::from_file(path),
        None => Ok(DaemonConfig::default()),
    }
    .map_err(|err: ConfigError| {
        error!("{}", err);
        err
    })?;
    debug!("Using config {:?}", config);

    let shutdown = CancellationToken::new();
    let mut signals = Signals::new(&[SIGINT, SIGTERM])?;
    let token = shutdown.clone();
    thread::spawn(move || {
        for signal in signals.forever() {
            if !on_signal(&token, signal) {
                process::exit(1);
            }
        }
    });

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run(config, args.dry_run, shutdown))
}

/// The first signal stops the event loop once its cycle completes. A second
/// one means that cycle is stuck (e.g. on a hung commit): returns false so
/// the caller exits right away.
fn on_signal(shutdown: &CancellationToken, signal: i32) -> bool {
    if shutdown.is_cancelled() {
        warn!("Received signal {} again, exiting immediately", signal);
        return false;
    }
    info!("Received signal {}, stopping bgpcfgd...", signal);
    shutdown.cancel();
    true
}

async fn run(
    config: DaemonConfig,
    dry_run: bool,
    shutdown: CancellationToken,
) -> Result<(), Box<dyn Error>> {
    let backend: Box<dyn ConfigBackend> = if dry_run || config.sink.backend == SinkBackend::Log {
        info!("Commands will only be logged");
        Box::new(LogBackend::new())
    } else {
        Box::new(VtyshBackend::new(config.sink.vtysh_path.clone()))
    };
    let sink = ConfigSink::from_boxed(backend);
    let ctx = ManagerContext::new(Directory::new(), sink.clone());

    // Managers declare their dependencies at construction, before the runner
    // subscribes to anything
    let managers = config.build_managers(&ctx);
    let (transport, publisher) = ChannelTransport::new();
    let mut runner = Runner::new(transport, &ctx).with_timeout(config.select_timeout);
    for manager in managers {
        runner.add_manager(manager);
    }

    // Keep one publisher here so the loop outlives the end of stdin
    let _publisher = publisher.clone();
    tokio::spawn(async move {
        if let Err(err) = feed::forward(BufReader::new(stdin()), publisher).await {
            error!("Event feed stopped: {}", err);
        }
    });

    let result = runner.run(shutdown).await;
    info!("{}", sink.stats());
    result.map_err(|err| {
        error!("{}", err);
        err.into()
    })
}
