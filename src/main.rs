//! rcolorhug - ColorHug colorimeter tool
//!
//! Command-line front end for the `rcolorhug-queue` command engine.
//!
//! # Architecture
//!
//! Each subcommand opens one device through the `Device` capability:
//! - **USB** (`rcolorhug-usb`) - real ColorHug and ColorHug2 hardware
//! - **Dummy** (`rcolorhug-dummy`) - in-memory emulator, selected with
//!   `--device dummy`
//!
//! and then runs a queue batch or a flash workflow against it. Ctrl-C
//! cancels the running batch.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands, DeviceArgs};
use commands::{device, flash, list, measure, CmdResult, Context};
use rcolorhug_core::config::Config;
use rcolorhug_core::types::Leds;
use tokio_util::sync::CancellationToken;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run(cli.command, config))
}

async fn run(command: Commands, config: Config) -> CmdResult {
    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted, cancelling");
            interrupt.cancel();
        }
    });

    match command {
        Commands::List => list::run_list().await,
        Commands::Info { device } => {
            let (ctx, opened) = setup(&config, &device, &cancel).await?;
            measure::run_info(&ctx, &opened).await
        }
        Commands::GetCalibration { device, slot } => {
            let (ctx, opened) = setup(&config, &device, &cancel).await?;
            measure::run_get_calibration(&ctx, &opened, slot).await
        }
        Commands::SetLeds {
            device,
            red,
            green,
            repeat,
            on_time,
            off_time,
        } => {
            let mut leds = Leds::empty();
            leds.set(Leds::RED, red);
            leds.set(Leds::GREEN, green);
            let (ctx, opened) = setup(&config, &device, &cancel).await?;
            measure::run_set_leds(&ctx, &opened, leds, repeat, on_time, off_time).await
        }
        Commands::TakeReading { device, slot } => {
            let (ctx, opened) = setup(&config, &device, &cancel).await?;
            measure::run_take_reading(&ctx, &opened, slot).await
        }
        Commands::ReadFlash {
            device,
            addr,
            len,
            output,
        } => {
            let (ctx, opened) = setup(&config, &device, &cancel).await?;
            flash::run_read_flash(&ctx, &opened, addr, len, &output).await
        }
        Commands::WriteFlash {
            device,
            addr,
            input,
            chunk_size,
        } => {
            let (ctx, opened) = setup(&config, &device, &cancel).await?;
            flash::run_write_flash(&ctx, &opened, addr, &input, chunk_size).await
        }
        Commands::Upgrade { device, input } => {
            let (ctx, opened) = setup(&config, &device, &cancel).await?;
            flash::run_upgrade(&ctx, &opened, &input).await
        }
        Commands::SelfTest { device } => {
            let (ctx, opened) = setup(&config, &device, &cancel).await?;
            measure::run_self_test(&ctx, &opened).await
        }
    }
}

/// Apply command-line overrides and open the selected device
async fn setup(
    config: &Config,
    args: &DeviceArgs,
    cancel: &CancellationToken,
) -> Result<(Context, device::Opened), Box<dyn std::error::Error>> {
    let ctx = Context::new(config.clone(), args, cancel.clone());
    let opened = device::open(args.device.as_deref()).await?;
    Ok((ctx, opened))
}
