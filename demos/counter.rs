//! # Example: Counter
//!
//! A `Mutable` counter feeds a repository that renders it as text. The repository is
//! named and wired to a bus so every run shows up in the `tracing` output.
//!
//! Run with: `RUST_LOG=trace cargo run --example counter`

use std::sync::Arc;
use std::time::Duration;

use reflow::{Bus, FlowPolicy, Home, LogWriter, Mutable, Observable, Repository, Updatable};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let home = Home::current();
    let bus = Bus::default();
    let logger = LogWriter::new().spawn(&bus, home.handle());

    let counter = Mutable::new(&home, 0u32);
    let c = counter.clone();
    let label = Repository::builder(&home, String::from("(nothing yet)"))
        .observe(counter.clone())
        .named("label")
        .with_bus(bus.clone())
        .flow()
        .get_from(move || *c.get())
        .check(|n: &u32| n % 2 == 0)
        .or_skip()
        .then_transform(|n: &u32| format!("even count: {n}"))
        .notify_if_changed()
        .on_deactivation(FlowPolicy::RESET_TO_INITIAL_VALUE)
        .compile()?;

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let printer: Arc<dyn Updatable> = Arc::new(move || {
        let _ = tx.send(());
    });
    label.add_updatable(Arc::clone(&printer))?;

    let ticker = tokio::spawn(async move {
        for _ in 0..6 {
            tokio::time::sleep(Duration::from_millis(50)).await;
            counter.modify(|n| n + 1);
        }
    });

    while let Ok(Some(())) = tokio::time::timeout(Duration::from_millis(300), rx.recv()).await {
        println!("[label] {}", label.get());
    }
    ticker.await?;

    label.remove_updatable(&printer)?;
    home.flush().await;
    home.flush().await;
    println!("[label] after deactivation: {}", label.get());

    drop(label);
    drop(bus);
    logger.abort();
    Ok(())
}
