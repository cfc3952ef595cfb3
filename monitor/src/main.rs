use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;

use lib_pvcore::configs::{build_connection, load_config, CsWebConfig};
use lib_pvcore::loggers::setup_logging;
use lib_pvcore::store::pv_state_comparator;
use lib_pvcore::pv::DEFAULT_PROTOCOL;
use lib_pvcore::{PvName, Store, SubscriptionType};

mod report;

const COMPONENT_ID: &str = "pv_monitor";

#[derive(Parser, Debug)]
#[clap(about = "Subscribe to process variables and print every change", version)]
struct Cli {
    #[clap(flatten)]
    config: CsWebConfig,

    #[clap(long = "pv", required = true, help = "PV to monitor, e.g. sim://sine or loc://x(1). Bare names use ca://. Repeatable.")]
    pvs: Vec<String>,

    #[clap(long, value_parser = report::parse_write, help = "Write pv=value once the subscriptions are in place.")]
    write: Option<(String, String)>,

    #[clap(long, help = "Stop after this many seconds instead of waiting for Ctrl-C.")]
    duration_secs: Option<u64>,
}

async fn terminate_signal() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut term_signal) => {
                term_signal.recv().await;
                log::info!("SIGTERM received, initiating shutdown.");
            }
            Err(e) => {
                log::warn!("Cannot listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        std::future::pending::<()>().await;
    }
}

async fn deadline(duration_secs: Option<u64>) {
    match duration_secs {
        Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
        None => std::future::pending::<()>().await,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Explicitly install the default crypto provider for rustls
    let _ = rustls::crypto::ring::default_provider().install_default();
    dotenvy::dotenv().ok();

    let mut cli = Cli::parse();
    cli.pvs = cli
        .pvs
        .iter()
        .map(|pv| PvName::parse(pv, DEFAULT_PROTOCOL).qualified_name())
        .collect();
    let config = load_config(cli.config);
    let log_path = setup_logging(&config.log_dir(), COMPONENT_ID, config.log_level())?;
    log::info!("Logging to {}", log_path.display());

    let connection = build_connection(&config)?;
    let store = Store::new(connection, config.throttle());
    let sender = store.sender();
    let mut reader = store.reader();

    let shutdown = CancellationToken::new();
    let store_handle = tokio::spawn(store.run(shutdown.clone()));

    let sub_type = SubscriptionType {
        string: true,
        double: true,
    };
    for pv in &cli.pvs {
        sender.subscribe(COMPONENT_ID, pv, Some(sub_type));
    }
    if let Some((pv, value)) = &cli.write {
        log::info!("Writing '{value}' to {pv}");
        sender.write_pv(pv, report::parse_value(value));
    }

    let stop = deadline(cli.duration_secs);
    tokio::pin!(stop);
    let mut last = reader.select_pv_states(cli.pvs.as_slice());

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                log::info!("Ctrl-C received, initiating shutdown.");
                break;
            }
            _ = terminate_signal() => break,
            _ = &mut stop => {
                log::info!("Monitoring period elapsed.");
                break;
            }
            changed = reader.changed() => {
                if !changed {
                    log::warn!("Store stopped unexpectedly.");
                    break;
                }
                let current = reader.select_pv_states(cli.pvs.as_slice());
                if !pv_state_comparator(&last, &current) {
                    for line in report::changed_lines(&cli.pvs, &last, &current) {
                        println!("{line}");
                    }
                    last = current;
                }
            }
        }
    }

    for pv in &cli.pvs {
        sender.unsubscribe(COMPONENT_ID, pv);
    }
    shutdown.cancel();
    let store = store_handle.await?;
    log::debug!(
        "Store stopped with {} cached PVs",
        store.reader().with_state(|s| s.value_cache.len())
    );

    log::info!("Shutdown complete.");
    Ok(())
}
