use std::io::Write;

use anyhow::{Context, anyhow};
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};

use crate::controller::{
    Confirmation, Controller, EditTaskPrompt, RemoveTaskPrompt, RenameListPrompt,
};
use crate::datetime::parse_date_expr;
use crate::filter::Toggle;
use crate::model::{List, ListId, Task, TaskId};
use crate::render::Renderer;
use crate::route::{ROOT_PATH, Route};
use crate::sync::{SyncOp, SyncOutcome};

pub fn known_command_names() -> Vec<&'static str> {
    vec![
        "help",
        "lists",
        "colors",
        "show",
        "all",
        "open",
        "go",
        "toggle",
        "filters",
        "chart",
        "add-list",
        "add-task",
        "edit",
        "rename",
        "remove",
        "done",
        "reopen",
        "drop-list",
        "sync",
        "retry",
        "quit",
    ]
}

pub fn expand_command_abbrev<'a>(token: &'a str, known: &[&'a str]) -> Option<&'a str> {
    if known.contains(&token) {
        return Some(token);
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

/// A question the shell is waiting on. The next input line answers it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prompt {
    EditTask(EditTaskPrompt),
    RemoveTask(RemoveTaskPrompt),
    RenameList(RenameListPrompt),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Line-oriented front end over the [`Controller`]. Remote writes produced
/// by commands are collected in an outbox for the session to send.
#[derive(Debug)]
pub struct Shell {
    controller: Controller,
    renderer: Renderer,
    prompt: Option<Prompt>,
    outbox: Vec<SyncOp>,
}

impl Shell {
    pub fn new(controller: Controller, renderer: Renderer) -> Self {
        Self {
            controller,
            renderer,
            prompt: None,
            outbox: vec![],
        }
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    pub fn pending_prompt(&self) -> Option<&Prompt> {
        self.prompt.as_ref()
    }

    pub fn prompt_text(&self) -> String {
        match &self.prompt {
            None => "tally> ".to_string(),
            Some(Prompt::EditTask(p)) => format!("Task text [{}]: ", p.current_text),
            Some(Prompt::RemoveTask(p)) => format!("Remove task \"{}\"? [y/N] ", p.text),
            Some(Prompt::RenameList(p)) => format!("List title [{}]: ", p.current_name),
        }
    }

    pub fn take_outbox(&mut self) -> Vec<SyncOp> {
        std::mem::take(&mut self.outbox)
    }

    /// Feeds a remote outcome back and prints any alert it raised.
    pub fn apply_outcome<W: Write>(&mut self, out: &mut W, outcome: SyncOutcome) -> anyhow::Result<()> {
        self.controller.apply_outcome(outcome);
        for alert in self.controller.take_alerts() {
            self.renderer.print_alert(out, &alert)?;
        }
        Ok(())
    }

    /// Handles one input line. Mistakes in the input are reported on `out`
    /// and do not end the session; only write failures are returned.
    #[instrument(skip(self, out, now))]
    pub fn handle_line<W: Write>(
        &mut self,
        out: &mut W,
        line: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Flow> {
        if let Some(prompt) = self.prompt.take() {
            return self.answer(out, prompt, line).map(|()| Flow::Continue);
        }

        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some((head, args)) = tokens.split_first() else {
            return Ok(Flow::Continue);
        };

        let known = known_command_names();
        let Some(command) = expand_command_abbrev(head, &known) else {
            writeln!(out, "error: unknown command: {head} (try `help`)")?;
            return Ok(Flow::Continue);
        };

        debug!(command, args = ?args, "dispatching command");
        match self.dispatch(out, command, args, now) {
            Ok(flow) => Ok(flow),
            Err(err) => {
                writeln!(out, "error: {err:#}")?;
                Ok(Flow::Continue)
            }
        }
    }

    fn dispatch<W: Write>(
        &mut self,
        out: &mut W,
        command: &str,
        args: &[&str],
        now: DateTime<Utc>,
    ) -> anyhow::Result<Flow> {
        match command {
            "help" => cmd_help(out)?,
            "lists" => self.renderer.print_sidebar(out, &self.controller)?,
            "colors" => self.renderer.print_colors(out, self.controller.colors())?,
            "show" => self.cmd_show(out, now)?,
            "all" => self.cmd_go(out, ROOT_PATH, now)?,
            "open" => {
                let id = parse_id(args.first(), "list id")?;
                self.cmd_go(out, &Route::list_path(id), now)?;
            }
            "go" => {
                let path = args.first().copied().unwrap_or(ROOT_PATH);
                self.cmd_go(out, path, now)?;
            }
            "toggle" => self.cmd_toggle(out, args, now)?,
            "filters" => self.renderer.print_filters(out, &self.controller, now)?,
            "chart" => {
                let points = self.controller.chart().to_vec();
                self.renderer.print_chart(out, &points)?;
            }
            "add-list" => self.cmd_add_list(out, args)?,
            "add-task" => self.cmd_add_task(out, args, now)?,
            "edit" => {
                let (list_id, task_id) = self.owner_of(args.first())?;
                let prompt = self.controller.request_edit_task(list_id, task_id)?;
                self.prompt = Some(Prompt::EditTask(prompt));
            }
            "rename" => {
                let list_id = parse_id(args.first(), "list id")?;
                let prompt = self.controller.request_rename_list(list_id)?;
                self.prompt = Some(Prompt::RenameList(prompt));
            }
            "remove" => {
                let (list_id, task_id) = self.owner_of(args.first())?;
                let prompt = self.controller.request_remove_task(list_id, task_id)?;
                self.prompt = Some(Prompt::RemoveTask(prompt));
            }
            "done" | "reopen" => {
                let (list_id, task_id) = self.owner_of(args.first())?;
                let completed = command == "done";
                let op = self
                    .controller
                    .set_task_completed(list_id, task_id, completed)?;
                self.outbox.push(op);
                let verb = if completed { "Completed" } else { "Reopened" };
                writeln!(out, "{verb} task {task_id}.")?;
            }
            "drop-list" => {
                let list_id = parse_id(args.first(), "list id")?;
                self.controller.remove_list(list_id)?;
                writeln!(out, "Removed list {list_id}.")?;
            }
            "sync" => self.renderer.print_sync(out, &self.controller)?,
            "retry" => {
                let ops = self.controller.retry_failed();
                writeln!(out, "Retrying {} change(s).", ops.len())?;
                self.outbox.extend(ops);
            }
            "quit" => return Ok(Flow::Quit),
            other => return Err(anyhow!("unknown command: {other}")),
        }
        Ok(Flow::Continue)
    }

    fn answer<W: Write>(&mut self, out: &mut W, prompt: Prompt, line: &str) -> anyhow::Result<()> {
        let text = line.trim();
        let reply = (!text.is_empty()).then(|| line.to_string());

        let result = match prompt {
            Prompt::EditTask(prompt) => {
                let task_id = prompt.task_id;
                self.controller
                    .resolve_edit_task(prompt, reply)
                    .map(|op| match op {
                        Some(op) => {
                            self.outbox.push(op);
                            format!("Updated task {task_id}.")
                        }
                        None => "Edit cancelled.".to_string(),
                    })
            }
            Prompt::RemoveTask(prompt) => {
                let task_id = prompt.task_id;
                let answer = if matches!(text.to_ascii_lowercase().as_str(), "y" | "yes") {
                    Confirmation::Confirmed
                } else {
                    Confirmation::Declined
                };
                self.controller
                    .resolve_remove_task(prompt, answer)
                    .map(|op| match op {
                        Some(op) => {
                            self.outbox.push(op);
                            format!("Removed task {task_id}.")
                        }
                        None => "Kept task.".to_string(),
                    })
            }
            Prompt::RenameList(prompt) => {
                let list_id = prompt.list_id;
                self.controller
                    .resolve_rename_list(prompt, reply)
                    .map(|renamed| {
                        if renamed {
                            format!("Renamed list {list_id}.")
                        } else {
                            "Rename cancelled.".to_string()
                        }
                    })
            }
        };

        match result {
            Ok(message) => writeln!(out, "{message}")?,
            Err(err) => writeln!(out, "error: {err:#}")?,
        }
        Ok(())
    }

    fn cmd_show<W: Write>(&self, out: &mut W, now: DateTime<Utc>) -> anyhow::Result<()> {
        self.renderer.print_sidebar(out, &self.controller)?;
        writeln!(out)?;
        self.renderer.print_view(out, &self.controller, now)
    }

    fn cmd_go<W: Write>(&mut self, out: &mut W, path: &str, now: DateTime<Utc>) -> anyhow::Result<()> {
        self.controller.navigate(path);
        self.cmd_show(out, now)
    }

    fn cmd_toggle<W: Write>(
        &mut self,
        out: &mut W,
        args: &[&str],
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let name = args
            .first()
            .ok_or_else(|| anyhow!("toggle requires completed, incomplete or overdue"))?;
        let toggle: Toggle = name.parse()?;
        self.controller.toggle(toggle);
        self.renderer.print_filters(out, &self.controller, now)
    }

    fn cmd_add_list<W: Write>(&mut self, out: &mut W, args: &[&str]) -> anyhow::Result<()> {
        let color_id = parse_id(args.first(), "color id")?;
        let name = args.get(1..).unwrap_or_default().join(" ");
        if name.trim().is_empty() {
            return Err(anyhow!("list name is empty"));
        }
        let color = self
            .controller
            .store()
            .color(color_id)
            .cloned()
            .ok_or_else(|| anyhow!("unknown color: {color_id} (see `colors`)"))?;

        let id = self.controller.store().next_list_id();
        self.controller.add_list(List::new(id, name, Some(color)))?;
        info!(list = id, "list created");
        writeln!(out, "Created list {id}.")?;
        Ok(())
    }

    fn cmd_add_task<W: Write>(
        &mut self,
        out: &mut W,
        args: &[&str],
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let list_id = parse_id(args.first(), "list id")?;
        let mut due = None;
        let mut words = Vec::new();
        for arg in args.get(1..).unwrap_or_default() {
            if let Some(raw) = arg.strip_prefix("due:") {
                due = Some(
                    parse_date_expr(raw, now).with_context(|| format!("invalid due date: {raw}"))?,
                );
            } else {
                words.push(*arg);
            }
        }
        let text = words.join(" ");
        if text.trim().is_empty() {
            return Err(anyhow!("task text is empty"));
        }

        let id = self.controller.store().next_task_id();
        let mut task = Task::new(id, list_id, text);
        task.due = due;
        self.controller.add_task(list_id, task)?;
        info!(task = id, list = list_id, "task created");
        writeln!(out, "Created task {id}.")?;
        Ok(())
    }

    fn owner_of(&self, arg: Option<&&str>) -> anyhow::Result<(ListId, TaskId)> {
        let task_id = parse_id(arg, "task id")?;
        let task = self
            .controller
            .store()
            .task(task_id)
            .ok_or_else(|| anyhow!("task not found: {task_id}"))?;
        Ok((task.list_id, task_id))
    }
}

fn parse_id(arg: Option<&&str>, what: &str) -> anyhow::Result<u64> {
    let raw = arg.ok_or_else(|| anyhow!("missing {what}"))?;
    raw.parse()
        .with_context(|| format!("invalid {what}: {raw}"))
}

fn cmd_help<W: Write>(out: &mut W) -> anyhow::Result<()> {
    writeln!(
        out,
        "\
lists                          list sidebar
colors                         colors available for new lists
show                           tasks of the current view
all | open <list> | go <path>  switch view (`/` or `/lists/<id>`)
toggle completed|incomplete|overdue
filters                        completed/incomplete and overdue tasks
chart                          completed tasks per list
add-list <color> <name...>     create a list
add-task <list> [due:<date>] <text...>
edit <task>                    change task text
rename <list>                  change list title
remove <task>                  delete a task (asks first)
done <task> | reopen <task>    mark task completed / not completed
drop-list <list>               remove a list
sync                           changes not yet saved remotely
retry                          resend failed changes
quit"
    )?;
    Ok(())
}
