use anyhow::Context;
use clap::Parser;
use mission_controller::cli::MainArgs;
use mission_controller::{inbound, server, ControllerConfig, LinkAutopilot, TickLoop};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::metadata::LevelFilter;
use tracing::{debug, info};
use tracing_subscriber::filter::{EnvFilter, Targets};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};
use vehicle_link::Vehicle;

const INBOUND_CAPACITY: usize = 64;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let args = MainArgs::parse();

    let console_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env()
        .context("invalid RUST_LOG")?;

    let (writer, _guard) = tracing_appender::non_blocking(tracing_appender::rolling::hourly(
        &args.log_dir,
        "mission-controller",
    ));

    tracing_subscriber::registry()
        // console
        .with(tracing_subscriber::fmt::layer().with_filter(console_filter))
        // files
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(Targets::new().with_targets(vec![
                    ("mission_controller", LevelFilter::DEBUG),
                    ("mission_core", LevelFilter::DEBUG),
                    ("vehicle_link", LevelFilter::DEBUG),
                ])),
        )
        .init();

    debug!("reading config from {:?}", &args.config);
    let mut config =
        ControllerConfig::load(args.config.as_deref()).context("failed to read config")?;
    args.apply(&mut config);
    config.validate().context("invalid config")?;

    run_tasks(config).await
}

async fn run_tasks(config: ControllerConfig) -> anyhow::Result<()> {
    let cancellation_token = CancellationToken::new();

    ctrlc::set_handler({
        let cancellation_token = cancellation_token.clone();
        move || {
            info!("received interrupt, shutting down");
            cancellation_token.cancel();
        }
    })
    .context("could not set ctrl+c handler")?;

    info!("connecting to vehicle at {}", config.link.address);
    let vehicle = Vehicle::connect_with_cancel(
        &config.link.address,
        config.vehicle_config(),
        cancellation_token.clone(),
    )
    .await
    .context("failed to connect to vehicle")?;

    let (handle, queue) = inbound::channel(INBOUND_CAPACITY);
    let tick_loop = TickLoop::new(LinkAutopilot::new(vehicle.clone()), queue, &config);

    let mut join_set = JoinSet::new();
    join_set.spawn(tick_loop.run(cancellation_token.clone()));
    join_set.spawn(server::serve(
        config.server.bind,
        handle,
        cancellation_token.clone(),
    ));

    let mut result = Ok(());
    while let Some(res) = join_set.join_next().await {
        // Some(Err) if the task panicked, Some(Ok(Err)) if it returned an error
        match res {
            Err(err) => {
                cancellation_token.cancel();
                result = Err(err).context("task failed");
                break;
            }
            Ok(Err(err)) => {
                cancellation_token.cancel();
                result = Err(err).context("task terminated with error");
                break;
            }
            Ok(Ok(())) => {
                info!("exited task");
            }
        }
    }
    join_set.shutdown().await;

    if let Err(err) = vehicle.disconnect().await {
        debug!("disconnect: {err}");
    }
    result
}
