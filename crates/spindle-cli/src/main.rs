use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use serde::{Deserialize, Serialize};
use serde_json::json;
use spindle_core::{
    ExecutionContext, ExecutorError, Handler, Priority, QueueConfig, QueueEvent, TaskOptions,
    TaskPayload, TaskQueue, executor_fn,
};
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

/// Run a demo workload through the task queue and print its events.
#[derive(Debug, Parser)]
#[command(name = "spindle", version)]
struct Args {
    /// TOML file with queue settings. Defaults are used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override `max_concurrent` from the config.
    #[arg(long)]
    max_concurrent: Option<usize>,

    /// How many times `gui.action` fails before succeeding.
    #[arg(long, default_value_t = 2)]
    gui_failures: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct GuiAction {
    target: String,
}

impl TaskPayload for GuiAction {
    const TYPE: &'static str = "gui.action";
}

/// gui.action: 指定回数だけ失敗してから成功する
struct GuiActionHandler {
    remaining_failures: AtomicU32,
}

impl GuiActionHandler {
    fn new(n: u32) -> Self {
        Self {
            remaining_failures: AtomicU32::new(n),
        }
    }
}

#[async_trait]
impl Handler<GuiAction> for GuiActionHandler {
    type Output = serde_json::Value;

    async fn handle(
        &self,
        action: GuiAction,
        ctx: ExecutionContext,
    ) -> Result<serde_json::Value, ExecutorError> {
        let left = self.remaining_failures.load(Ordering::Relaxed);
        if left > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::Relaxed);
            return Err(ExecutorError::failed(format!(
                "intentional failure (left={left})"
            )));
        }

        ctx.info(format_args!("clicked {}", action.target));
        Ok(json!({ "clicked": action.target }))
    }
}

fn build_config(args: &Args) -> Result<QueueConfig> {
    let mut config = match &args.config {
        Some(path) => QueueConfig::load(path)
            .with_context(|| format!("loading queue config from {}", path.display()))?,
        None => QueueConfig::default()
            .with_retry_backoff(200, 2_000)
            .with_idle_timeout(Duration::from_millis(500)),
    };
    if let Some(n) = args.max_concurrent {
        config = config.with_max_concurrent(n);
    }
    config.validate().context("invalid queue config")?;
    Ok(config)
}

fn register_demo_executors(queue: &TaskQueue, gui_failures: u32) {
    queue.register_executor(
        "ai.request",
        executor_fn(|task, ctx| async move {
            let prompt = task.data["prompt"].as_str().unwrap_or_default().to_string();
            for step in 1..=4u32 {
                if ctx.is_cancelled() {
                    return Err(ExecutorError::Cancelled);
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
                ctx.report_progress(step * 25);
            }
            let tokens = prompt.split_whitespace().count();
            Ok(json!({ "prompt": prompt, "tokens": tokens }))
        }),
    );

    queue.register_executor(
        "perception.capture",
        executor_fn(|task, ctx| async move {
            let display = task.data["display"].as_u64().unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(30)).await;
            ctx.debug(format_args!("captured display {display}"));
            Ok::<_, ExecutorError>(json!({ "display": display, "width": 1920, "height": 1080 }))
        }),
    );

    queue.register_executor(
        "perception.describe",
        executor_fn(|task, ctx| async move {
            let frames: Vec<_> = task
                .dependencies
                .iter()
                .filter_map(|id| ctx.dependency_result(*id))
                .filter_map(|r| r.data)
                .collect();
            Ok::<_, ExecutorError>(json!({ "frames": frames.len() }))
        }),
    );

    queue.register_handler::<GuiAction, _>(GuiActionHandler::new(gui_failures));
}

/// Print every event as one JSON line until the channel closes.
async fn print_events(mut rx: broadcast::Receiver<QueueEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!(error = %e, "event not serializable"),
            },
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!(skipped = n, "event printer lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = build_config(&args)?;
    let queue = TaskQueue::new(config).context("building task queue")?;
    register_demo_executors(&queue, args.gui_failures);

    let printer = tokio::spawn(print_events(queue.subscribe()));

    // (A) 依存関係: describe は capture の成功後に走る
    let capture = queue
        .enqueue("perception.capture", json!({ "display": 0 }), TaskOptions::new())
        .context("capture was deduplicated")?;
    let describe = queue
        .enqueue(
            "perception.describe",
            json!(null),
            TaskOptions::new()
                .with_priority(Priority::Critical)
                .depends_on(capture),
        )
        .context("describe was deduplicated")?;

    // (B) 重複投入: 同じ dedup_key の 2 件目は None
    let mut ids = vec![capture, describe];
    for _ in 0..2 {
        let admitted = queue.enqueue(
            "ai.request",
            json!({ "prompt": "summarize the screen" }),
            TaskOptions::new()
                .with_dedup_key("summarize")
                .with_tag("demo"),
        );
        match admitted {
            Some(id) => ids.push(id),
            None => tracing::info!("duplicate ai.request suppressed"),
        }
    }

    // (C) 失敗してリトライされる型付きタスク
    let gui = queue
        .enqueue_typed(
            &GuiAction {
                target: "submit-button".into(),
            },
            TaskOptions::new().with_priority(Priority::High).with_max_retries(3),
        )
        .context("encoding gui.action payload")?
        .context("gui.action was deduplicated")?;
    ids.push(gui);

    for id in ids {
        let result = queue
            .wait_for_task(id, Some(Duration::from_secs(60)))
            .await
            .with_context(|| format!("waiting for {id}"))?;
        tracing::info!(task_id = %id, status = %result.status, retries = result.retries, "task settled");
    }

    let status = queue.status();
    println!(
        "{}",
        serde_json::to_string_pretty(&status).context("serializing queue status")?
    );

    queue.destroy();
    printer.await.context("event printer panicked")?;
    Ok(())
}
