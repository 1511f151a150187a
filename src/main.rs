//! Stepwise CLI
//!
//! 入口：初始化日志、加载配置并构建引擎，为命令行给出的任务逐步执行 Step，
//! 直到模型声明 last_step 或达到 `[app] max_steps`。

use anyhow::Context;
use stepwise::core::builder::create_engine_builder;
use stepwise::observability;
use stepwise::task::{StepRequest, TaskRequest};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let input = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if input.trim().is_empty() {
        anyhow::bail!("usage: stepwise <task description>");
    }

    let builder = create_engine_builder(None).context("Failed to prepare engine")?;
    let max_steps = builder.config().app.max_steps;
    let engine = builder.build();

    let task = engine
        .create_task(TaskRequest::new(input))
        .await
        .context("Failed to create task")?;
    println!("task {}", task.task_id);

    let mut finished = false;
    for n in 1..=max_steps {
        let step = engine
            .execute_step(&task.task_id, StepRequest::default())
            .await
            .with_context(|| format!("Step {n} failed"))?;
        println!("[step {n}] {}", step.output.unwrap_or_default());
        if step.is_last {
            finished = true;
            break;
        }
    }
    if !finished {
        println!("stopped after {max_steps} steps without last_step");
    }

    let (prompt, completion, total) = engine.token_usage();
    tracing::info!(prompt, completion, total, "token usage");
    Ok(())
}
