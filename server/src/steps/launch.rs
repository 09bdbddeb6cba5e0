// nfviz/server/src/steps/launch.rs

//! `launch-pipeline`: runs the pipeline process and turns its output into log
//! lines and task transitions as it happens.

use crate::errors::AppError;
use crate::steps::contexts::{LaunchCtxData, StepEnv};
use nfviz::classify::{classify, line_severity};
use nfviz::{Pipeline, SkipCondition, StatusMap, StepContext, StepControl, StepRegistry, StepRequest, TaskId, TaskStatus};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{event, instrument, Level};

pub const STEP_ID: &str = "launch-pipeline";

pub fn register_launch_pipeline(registry: &StepRegistry, env: &StepEnv) {
  let force_complete_disabled: SkipCondition<LaunchCtxData> =
    Arc::new(|ctx: &StepContext<LaunchCtxData>| !ctx.read().env.settings.force_complete_on_success);

  let mut p = Pipeline::<LaunchCtxData, AppError>::new(&[
    ("run_pipeline", false, None),
    ("force_complete_tasks", false, Some(force_complete_disabled)),
    ("report_success", false, None),
  ]);

  p.on_step("run_pipeline", |ctx: StepContext<LaunchCtxData>| run_pipeline(ctx));

  // A zero exit status means every task finished even if its final line was
  // never printed.
  p.on_step("force_complete_tasks", |ctx: StepContext<LaunchCtxData>| async move {
    let mut forced = Vec::new();
    {
      let mut guard = ctx.write();
      for task in TaskId::ALL {
        // Tasks that already failed keep their error.
        if !guard.tasks.get(task).is_terminal() && guard.tasks.observe(task, TaskStatus::Complete) {
          forced.push(task);
        }
      }
    }
    event!(Level::DEBUG, ?forced, "Marked unfinished tasks complete after a clean exit.");
    for task in forced {
      ctx
        .events()
        .task_update(task, TaskStatus::Complete, "Pipeline completed");
    }
    Ok::<_, AppError>(StepControl::Continue)
  });

  p.on_step("report_success", |ctx: StepContext<LaunchCtxData>| async move {
    ctx.events().success("Pipeline completed successfully!");
    Ok::<_, AppError>(StepControl::Continue)
  });

  let env = env.clone();
  registry.register(STEP_ID, p, move |_req: &StepRequest| LaunchCtxData {
    env: env.clone(),
    tasks: StatusMap::new(),
    lines_seen: 0,
    exit_code: None,
  });
}

#[instrument(name = "steps::run_pipeline", skip(ctx), err(Display))]
async fn run_pipeline(ctx: StepContext<LaunchCtxData>) -> Result<StepControl, AppError> {
  let settings = ctx.read().env.settings.clone();
  let Some((program, args)) = settings.pipeline_command.split_first() else {
    return Err(AppError::Config("pipeline command is empty".to_string()));
  };

  ctx
    .events()
    .info("Launching Nextflow RNAseq pipeline on Google Cloud Batch...");
  ctx
    .events()
    .info(format!("Command: {}", settings.pipeline_command.join(" ")));

  let mut child = Command::new(program)
    .args(args)
    .current_dir(&settings.pipeline_workdir)
    .env("NXF_ANSI_LOG", "false")
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    // A disconnected client does not stop the run; it keeps going like any
    // other effect already issued.
    .kill_on_drop(false)
    .spawn()
    .map_err(|e| AppError::Pipeline(format!("Failed to start {program}: {e}")))?;
  event!(Level::INFO, pid = ?child.id(), %program, "Pipeline process started.");

  // stdout and stderr feed one channel so lines keep their arrival order.
  let (tx, mut lines) = mpsc::unbounded_channel::<String>();
  if let Some(stdout) = child.stdout.take() {
    forward_lines(stdout, tx.clone());
  }
  if let Some(stderr) = child.stderr.take() {
    forward_lines(stderr, tx.clone());
  }
  drop(tx);

  while let Some(line) = lines.recv().await {
    handle_output_line(&ctx, &line);
  }

  let status = child.wait().await?;
  ctx.write().exit_code = status.code();
  event!(Level::INFO, ?status, lines = ctx.read().lines_seen, "Pipeline process exited.");
  match status.code() {
    Some(0) => Ok(StepControl::Continue),
    Some(code) => Err(AppError::Pipeline(format!("Pipeline failed with exit code {code}"))),
    None => Err(AppError::Pipeline("Pipeline was terminated by a signal".to_string())),
  }
}

/// Reads raw lines so a stray non-UTF-8 byte is replaced instead of ending
/// the reader. The pipe is drained to EOF even after the step is dropped; a
/// closed read end would kill the pipeline with SIGPIPE.
fn forward_lines<R>(reader: R, tx: mpsc::UnboundedSender<String>)
where
  R: AsyncRead + Unpin + Send + 'static,
{
  tokio::spawn(async move {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
      buf.clear();
      match reader.read_until(b'\n', &mut buf).await {
        Ok(0) => break,
        Ok(_) => {
          let line = String::from_utf8_lossy(&buf);
          // Nobody is listening once the step is gone; keep draining.
          let _ = tx.send(line.trim_end_matches(['\r', '\n']).to_string());
        }
        Err(e) => {
          event!(Level::WARN, error = %e, "Stopped reading pipeline output.");
          break;
        }
      }
    }
  });
}

/// Forwards one output line and applies the transition it implies, if any.
fn handle_output_line(ctx: &StepContext<LaunchCtxData>, raw: &str) {
  let line = raw.trim_end();
  if line.is_empty() {
    return;
  }
  ctx.write().lines_seen += 1;
  ctx.events().log(line_severity(line), line);

  let Some(classification) = classify(line) else {
    return;
  };
  let (changed, results) = {
    let mut guard = ctx.write();
    let changed = guard.tasks.observe(classification.task, classification.status);
    (changed, guard.tasks.derive_results())
  };
  if changed {
    ctx
      .events()
      .task_update(classification.task, classification.status, classification.message);
  }
  if let Some(status) = results {
    ctx
      .events()
      .task_update(TaskId::Results, status, format!("results {status}"));
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::StepSettings;
  use crate::testing::{collect, messages, step_env, terminal_status, FakeCloud};
  use futures_util::StreamExt;
  use nfviz::{Event, TerminalStatus};

  fn shell(script: &str) -> StepSettings {
    StepSettings {
      pipeline_command: vec!["sh".to_string(), "-c".to_string(), script.to_string()],
      pipeline_workdir: std::env::temp_dir(),
      ..StepSettings::default()
    }
  }

  fn task_updates(events: &[Event]) -> Vec<(TaskId, TaskStatus)> {
    events
      .iter()
      .filter_map(|ev| match ev {
        Event::TaskUpdate { task, status, .. } => Some((*task, *status)),
        _ => None,
      })
      .collect()
  }

  async fn launch(settings: StepSettings) -> Vec<Event> {
    let registry = StepRegistry::new();
    register_launch_pipeline(&registry, &step_env(FakeCloud::shared(), settings));
    collect(registry.execute(StepRequest::new(STEP_ID).with_phase("pipeline"))).await
  }

  #[tokio::test]
  async fn output_lines_become_logs_and_task_updates() {
    let events = launch(shell(
      "echo 'Submitted process > RNASEQ:FASTQC (ggal_gut)'; \
       echo '[ab/12cd34] RNASEQ:INDEX (ggal) [100%] 1 of 1 ✔' >&2; \
       echo 'unrelated chatter'",
    ))
    .await;

    let updates = task_updates(&events);
    assert!(updates.contains(&(TaskId::Fastqc, TaskStatus::Running)));
    assert!(updates.contains(&(TaskId::Index, TaskStatus::Complete)));
    assert!(events.iter().any(
      |ev| matches!(ev, Event::Log { message, .. } if message == "unrelated chatter")
    ));
    // Clean exit forces the rest to complete.
    for task in [TaskId::Fastqc, TaskId::Quant, TaskId::Multiqc, TaskId::Results] {
      assert!(updates.contains(&(task, TaskStatus::Complete)), "{task} not completed");
    }
    assert!(matches!(
      events.last(),
      Some(Event::Terminal { status: TerminalStatus::Complete, .. })
    ));
  }

  #[tokio::test]
  async fn non_zero_exit_fails_without_completing_tasks() {
    let events = launch(shell("echo 'Submitted process > RNASEQ:QUANT (1)'; exit 3")).await;

    let updates = task_updates(&events);
    assert!(updates.contains(&(TaskId::Quant, TaskStatus::Running)));
    assert!(!updates.iter().any(|(_, s)| *s == TaskStatus::Complete));
    match events.last() {
      Some(Event::Terminal { status, message }) => {
        assert_eq!(*status, TerminalStatus::Error);
        assert_eq!(message, "✗ Pipeline failed with exit code 3");
      }
      other => panic!("expected terminal event, got {other:?}"),
    }
  }

  #[tokio::test]
  async fn force_complete_can_be_disabled() {
    let settings = StepSettings {
      force_complete_on_success: false,
      ..shell("echo 'Submitted process > RNASEQ:MULTIQC'")
    };
    let events = launch(settings).await;
    let updates = task_updates(&events);
    assert!(updates.contains(&(TaskId::Multiqc, TaskStatus::Running)));
    assert!(!updates.contains(&(TaskId::Multiqc, TaskStatus::Complete)));
    assert!(matches!(
      events.last(),
      Some(Event::Terminal { status: TerminalStatus::Complete, .. })
    ));
  }

  #[tokio::test]
  async fn invalid_utf8_output_does_not_stop_the_stream() {
    let settings = StepSettings {
      force_complete_on_success: false,
      ..shell("printf 'caf\\351\\n'; sleep 0.2; echo 'Submitted process > RNASEQ:FASTQC'")
    };
    let events = launch(settings).await;

    assert!(messages(&events).iter().any(|m| m.starts_with("caf") && m.contains('\u{FFFD}')));
    assert!(task_updates(&events).contains(&(TaskId::Fastqc, TaskStatus::Running)));
    assert_eq!(terminal_status(&events), Some(TerminalStatus::Complete));
  }

  #[tokio::test]
  async fn dropped_stream_leaves_the_pipeline_running() {
    let marker = std::env::temp_dir().join(format!("nfviz-launch-{}.done", std::process::id()));
    let _ = std::fs::remove_file(&marker);
    let script = format!(
      "echo started; sleep 0.3; echo 'still writing after the client left'; echo ok > '{}'",
      marker.display()
    );

    let registry = StepRegistry::new();
    register_launch_pipeline(&registry, &step_env(FakeCloud::shared(), shell(&script)));
    let mut stream = registry.execute(StepRequest::new(STEP_ID).with_phase("pipeline"));
    while let Some(ev) = stream.next().await {
      if matches!(&ev, Event::Log { message, .. } if message == "started") {
        break;
      }
    }
    drop(stream);

    tokio::time::sleep(std::time::Duration::from_millis(1500)).await;
    let written = std::fs::read_to_string(&marker);
    let _ = std::fs::remove_file(&marker);
    assert_eq!(written.expect("pipeline finished after the drop").trim(), "ok");
  }

  #[tokio::test]
  async fn missing_program_is_a_terminal_error() {
    let settings = StepSettings {
      pipeline_command: vec!["/nonexistent/nextflow".to_string()],
      ..StepSettings::default()
    };
    let events = launch(settings).await;
    assert_eq!(events.iter().filter(|ev| ev.is_terminal()).count(), 1);
    assert!(matches!(
      events.last(),
      Some(Event::Terminal { status: TerminalStatus::Error, .. })
    ));
  }
}
