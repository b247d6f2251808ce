//! Single-threaded event loop. Input lines and remote outcomes are handled
//! one at a time on the thread that owns the [`Shell`]; remote writes run as
//! local tasks and report back over a channel.

use std::io::Write;
use std::rc::Rc;

use chrono::Utc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument};

use crate::commands::{Flow, Shell};
use crate::controller::Controller;
use crate::render::Renderer;
use crate::sync::{self, DataService, SyncOp, SyncOutcome};

/// Performs the initial load and opens `path`.
#[instrument(skip(service))]
pub async fn load_controller<S: DataService>(service: &S, path: &str) -> Controller {
    let load = sync::initial_load(service).await;
    let mut controller = Controller::new();
    controller.apply_initial_load(load);
    controller.navigate(path);
    controller
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Print prompts and the start screen.
    Interactive,
    /// Read commands without echoing prompts.
    Batch,
}

/// Runs the shell until `quit` or end of input, then waits for every remote
/// write that is still in flight. Must run inside a [`tokio::task::LocalSet`].
#[instrument(skip_all, fields(mode = ?mode))]
pub async fn run<S, R, W>(
    service: Rc<S>,
    renderer: Renderer,
    controller: Controller,
    input: R,
    out: &mut W,
    mode: Mode,
) -> anyhow::Result<Shell>
where
    S: DataService + 'static,
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<SyncOutcome>();
    let mut shell = Shell::new(controller, renderer);
    let mut lines = input.lines();
    let mut outstanding = 0usize;

    if mode == Mode::Interactive {
        shell.handle_line(out, "show", Utc::now())?;
    }

    loop {
        if mode == Mode::Interactive {
            write!(out, "{}", shell.prompt_text())?;
            out.flush()?;
        }

        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    debug!("end of input");
                    break;
                };
                let flow = shell.handle_line(out, &line, Utc::now())?;
                outstanding += dispatch(&service, &tx, shell.take_outbox());
                if flow == Flow::Quit {
                    break;
                }
            }
            Some(outcome) = rx.recv() => {
                outstanding = outstanding.saturating_sub(1);
                if mode == Mode::Interactive {
                    writeln!(out)?;
                }
                shell.apply_outcome(out, outcome)?;
            }
        }
    }

    if outstanding > 0 {
        info!(outstanding, "waiting for remote writes");
    }
    while outstanding > 0 {
        let Some(outcome) = rx.recv().await else {
            break;
        };
        outstanding -= 1;
        shell.apply_outcome(out, outcome)?;
    }
    out.flush()?;
    Ok(shell)
}

fn dispatch<S>(
    service: &Rc<S>,
    tx: &mpsc::UnboundedSender<SyncOutcome>,
    ops: Vec<SyncOp>,
) -> usize
where
    S: DataService + 'static,
{
    let count = ops.len();
    for op in ops {
        let service = Rc::clone(service);
        let tx = tx.clone();
        debug!(seq = op.seq, task = op.task_id, "spawning remote write");
        tokio::task::spawn_local(async move {
            let outcome = sync::execute(service.as_ref(), op).await;
            if tx.send(outcome).is_err() {
                debug!("session ended before the outcome arrived");
            }
        });
    }
    count
}
