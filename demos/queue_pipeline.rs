//! # Example: Queue Pipeline
//!
//! Jobs are pushed into a `Reservoir`. A repository pulls one job per run, hashes it on
//! the blocking pool, then scores it with an async operator. Under `CANCEL_FLOW` a job
//! arriving mid-run cancels the current one; the cancelled job is dropped, as the
//! disposer reports.
//!
//! Run with: `RUST_LOG=debug cargo run --example queue_pipeline`

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use reflow::{
    Blocking, Bus, FlowPolicy, Home, LogWriter, Observable, OperatorFn, Repository, Reservoir,
    Spawned, Updatable,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, PartialEq)]
struct Scored {
    job: String,
    score: u64,
}

fn hash(job: &str) -> u64 {
    job.bytes()
        .fold(0xcbf2_9ce4_8422_2325u64, |h, b| (h ^ u64::from(b)).wrapping_mul(0x100_0000_01b3))
}

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let home = Home::current();
    let bus = Bus::default();
    let logger = LogWriter::new().spawn(&bus, home.handle());

    let inbox: Reservoir<String> = Reservoir::new(&home);
    let scorer = OperatorFn::arc("scorer", |h: Arc<(String, u64)>, token: CancellationToken| async move {
        tokio::select! {
            _ = token.cancelled() => Scored { job: h.0.clone(), score: 0 },
            _ = tokio::time::sleep(Duration::from_millis(80)) => Scored { job: h.0.clone(), score: h.1 % 1000 },
        }
    });

    let queue = inbox.clone();
    let latest = Repository::builder(&home, Scored { job: String::new(), score: 0 })
        .observe(inbox.clone())
        .named("latest")
        .with_bus(bus.clone())
        .flow()
        .get_from(move || queue.pull())
        .check(Option::is_some)
        .or_skip()
        .go_to(Blocking::current())
        .transform(|job: &Option<String>| {
            let job = job.clone().unwrap_or_default();
            let h = hash(&job);
            (job, h)
        })
        .async_transform(Spawned::current(scorer))
        .then_transform(|s: &Scored| s.clone())
        .notify_if_changed()
        .on_concurrent_update(FlowPolicy::CANCEL_FLOW)
        .dispose_with(|dropped| {
            if let Some(pair) = dropped.downcast_ref::<(String, u64)>() {
                println!("[disposed] {}", pair.0);
            }
        })
        .compile()?;

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let printer: Arc<dyn Updatable> = Arc::new(move || {
        let _ = tx.send(());
    });
    latest.add_updatable(Arc::clone(&printer))?;

    for job in ["alpha", "beta", "gamma", "delta"] {
        inbox.push(job.to_string());
        tokio::time::sleep(Duration::from_millis(30)).await;
    }

    while let Ok(Some(())) = tokio::time::timeout(Duration::from_millis(500), rx.recv()).await {
        let scored = latest.get();
        println!("[latest] {} → {}", scored.job, scored.score);
    }
    println!("[inbox] {} left", inbox.len());

    latest.remove_updatable(&printer)?;
    drop(latest);
    drop(bus);
    logger.abort();
    Ok(())
}
