//! Batch execution with progress display

use indicatif::{ProgressBar, ProgressStyle};
use rcolorhug_queue::{CommandQueue, FlashEvent, ProcessEvent, ProcessOptions};
use tokio::sync::mpsc::{self, UnboundedReceiver};

use super::Context;

fn create_bar(message: String) -> ProgressBar {
    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3}% {msg}")
            .map(|style| style.progress_chars("#>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    pb.set_message(message);
    pb
}

/// Run a small batch without a progress bar, logging failures as they happen
pub async fn run(queue: &mut CommandQueue<'_>, ctx: &Context) -> rcolorhug_queue::Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let report = async {
        while let Some(event) = rx.recv().await {
            if let ProcessEvent::DeviceFailed { device, message } = event {
                log::warn!("{}: {}", device, message);
            }
        }
    };
    let (result, ()) = tokio::join!(queue.process_with(options(ctx).with_events(tx)), report);
    result
}

/// Run a batch with a progress bar
pub async fn run_with_bar(
    queue: &mut CommandQueue<'_>,
    ctx: &Context,
    message: &str,
) -> rcolorhug_queue::Result<()> {
    let pb = create_bar(message.to_string());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let display = async {
        while let Some(event) = rx.recv().await {
            match event {
                ProcessEvent::Progress(percent) => pb.set_position(percent.into()),
                ProcessEvent::DeviceFailed { device, message } => {
                    pb.println(format!("{}: {}", device, message))
                }
            }
        }
    };
    let (result, ()) = tokio::join!(queue.process_with(options(ctx).with_events(tx)), display);

    match result {
        Ok(()) => pb.finish_with_message(format!("{} complete", message)),
        Err(_) => pb.abandon(),
    }
    result
}

/// Draw flash workflow events until the sender goes away
pub async fn show_flash_events(mut rx: UnboundedReceiver<FlashEvent>) {
    let pb = create_bar(String::new());
    while let Some(event) = rx.recv().await {
        match event {
            FlashEvent::Step(step) => {
                pb.set_position(0);
                pb.set_message(step.to_string());
            }
            FlashEvent::Progress(percent) => pb.set_position(percent.into()),
        }
    }
    pb.finish_and_clear();
}

fn options(ctx: &Context) -> ProcessOptions {
    ProcessOptions::new(ctx.flags).with_cancel(ctx.cancel.clone())
}
