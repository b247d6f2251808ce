use std::io::Write;

use chrono::{DateTime, Local, Utc};
use unicode_width::UnicodeWidthStr;

use crate::chart::{ChartPoint, DATASET_LABEL, Rgb};
use crate::config::Config;
use crate::controller::{Controller, View};
use crate::filter::Toggle;
use crate::model::{Color, List, Task};
use crate::route::ROOT_PATH;
use crate::sync::{SyncAction, SyncOp, SyncStatus};

const BAR_WIDTH: usize = 30;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    /// `terminal` says whether the output is an interactive terminal; colors
    /// are only emitted when it is and the `color` setting is on.
    pub fn new(cfg: &Config, terminal: bool) -> anyhow::Result<Self> {
        Ok(Self {
            color: terminal && cfg.color_enabled()?,
        })
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    #[tracing::instrument(skip_all)]
    pub fn print_sidebar<W: Write>(&self, out: &mut W, controller: &Controller) -> anyhow::Result<()> {
        let all_marker = if controller.path() == ROOT_PATH { ">" } else { " " };
        writeln!(out, "{all_marker} All tasks")?;

        if !controller.store().lists_loaded() {
            writeln!(out, "  Loading...")?;
            return Ok(());
        }

        let active = controller.active().id();
        for list in controller.lists() {
            let marker = if Some(list.id) == active { ">" } else { " " };
            let swatch = list
                .color
                .as_ref()
                .map(|c| self.paint_hex(&c.hex, "●"))
                .unwrap_or_else(|| " ".to_string());
            writeln!(
                out,
                "{marker} {swatch} {} {} ({})",
                self.paint(&list.id.to_string(), "33"),
                list.name,
                list.task_ids.len()
            )?;
        }
        Ok(())
    }

    pub fn print_colors<W: Write>(&self, out: &mut W, colors: &[Color]) -> anyhow::Result<()> {
        if colors.is_empty() {
            writeln!(out, "No colors.")?;
            return Ok(());
        }
        for color in colors {
            writeln!(
                out,
                "{} {} {} {}",
                self.paint(&color.id.to_string(), "33"),
                self.paint_hex(&color.hex, "●"),
                color.hex,
                color.name
            )?;
        }
        Ok(())
    }

    #[tracing::instrument(skip_all)]
    pub fn print_filters<W: Write>(
        &self,
        out: &mut W,
        controller: &Controller,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let toggles = controller.toggles();
        let panel: Vec<String> = [
            (Toggle::Completed, "completed"),
            (Toggle::Incomplete, "incomplete"),
            (Toggle::Overdue, "overdue"),
        ]
        .into_iter()
        .map(|(toggle, label)| format!("[{}] {label}", check(toggles.get(toggle))))
        .collect();
        writeln!(out, "{}", panel.join("  "))?;

        writeln!(out)?;
        writeln!(out, "Completed / incomplete")?;
        for task in controller.filtered_tasks() {
            writeln!(out, "  {}", task.text)?;
        }

        writeln!(out)?;
        writeln!(out, "Overdue tasks")?;
        for task in controller.overdue_tasks(now) {
            writeln!(out, "  {}", task.text)?;
        }
        Ok(())
    }

    pub fn print_chart<W: Write>(&self, out: &mut W, points: &[ChartPoint]) -> anyhow::Result<()> {
        writeln!(out, "{DATASET_LABEL}")?;
        if points.is_empty() {
            writeln!(out, "  (no lists)")?;
            return Ok(());
        }

        let max = points.iter().map(|p| p.value).max().unwrap_or(0).max(1);
        let label_width = points
            .iter()
            .map(|p| UnicodeWidthStr::width(p.label.as_str()))
            .max()
            .unwrap_or(0);

        for point in points {
            let len = point.value * BAR_WIDTH / max;
            let bar = self.paint_rgb(point.color, &"█".repeat(len));
            let padding = label_width.saturating_sub(UnicodeWidthStr::width(point.label.as_str()));
            writeln!(
                out,
                "  {}{} {} {} {}",
                point.label,
                " ".repeat(padding),
                point.value,
                bar,
                point.color
            )?;
        }
        Ok(())
    }

    #[tracing::instrument(skip_all)]
    pub fn print_view<W: Write>(
        &self,
        out: &mut W,
        controller: &Controller,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        match controller.view() {
            View::AllLists(sections) => {
                if sections.is_empty() {
                    writeln!(out, "No tasks.")?;
                }
                for (list, tasks) in sections {
                    self.print_list(out, controller, list, &tasks, now)?;
                }
            }
            View::Single(list, tasks) => {
                self.print_list(out, controller, list, &tasks, now)?;
                if tasks.is_empty() {
                    writeln!(out, "No tasks.")?;
                }
            }
            View::Nothing => {}
        }
        Ok(())
    }

    fn print_list<W: Write>(
        &self,
        out: &mut W,
        controller: &Controller,
        list: &List,
        tasks: &[&Task],
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let title = match &list.color {
            Some(color) => self.paint_hex(&color.hex, &list.name),
            None => list.name.clone(),
        };
        writeln!(out, "{title}")?;
        if tasks.is_empty() {
            return Ok(());
        }

        let headers = vec![
            "ID".to_string(),
            "Done".to_string(),
            "Due".to_string(),
            "Text".to_string(),
            "Sync".to_string(),
        ];

        let mut rows = Vec::with_capacity(tasks.len());
        for task in tasks {
            let due = task
                .due
                .map(|date| date.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_default();
            let due = if task.is_overdue(now) {
                self.paint(&due, "31")
            } else {
                due
            };

            let sync = match controller.sync_status(task.id) {
                Some(SyncStatus::Pending) => "pending".to_string(),
                Some(SyncStatus::Failed(_)) => self.paint("failed", "31"),
                None => String::new(),
            };

            rows.push(vec![
                self.paint(&task.id.to_string(), "33"),
                (if task.completed { "x" } else { " " }).to_string(),
                due,
                task.text.clone(),
                sync,
            ]);
        }

        write_table(out, headers, rows)
    }

    pub fn print_sync<W: Write>(&self, out: &mut W, controller: &Controller) -> anyhow::Result<()> {
        let unsettled = controller.sync().unsettled();
        if unsettled.is_empty() {
            writeln!(out, "All changes saved.")?;
            return Ok(());
        }
        for (op, status) in unsettled {
            let state = match status {
                SyncStatus::Pending => "pending".to_string(),
                SyncStatus::Failed(err) => format!("failed: {err}"),
            };
            writeln!(out, "#{} task {} {}: {}", op.seq, op.task_id, describe(op), state)?;
        }
        Ok(())
    }

    pub fn print_alert<W: Write>(&self, out: &mut W, message: &str) -> anyhow::Result<()> {
        writeln!(out, "{}", self.paint(&format!("! {message}"), "31"))?;
        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }

    fn paint_rgb(&self, rgb: Rgb, text: &str) -> String {
        self.paint(text, &format!("38;2;{};{};{}", rgb.0, rgb.1, rgb.2))
    }

    fn paint_hex(&self, hex: &str, text: &str) -> String {
        match parse_hex(hex) {
            Some(rgb) => self.paint_rgb(rgb, text),
            None => text.to_string(),
        }
    }
}

fn check(on: bool) -> char {
    if on { 'x' } else { ' ' }
}

fn describe(op: &SyncOp) -> String {
    match &op.action {
        SyncAction::Patch(patch) => format!("update {patch:?}"),
        SyncAction::Delete => "delete".to_string(),
    }
}

fn parse_hex(hex: &str) -> Option<Rgb> {
    let digits = hex.trim().strip_prefix('#')?;
    if digits.len() != 6 {
        return None;
    }
    let channel = |at: usize| u8::from_str_radix(digits.get(at..at + 2)?, 16).ok();
    Some(Rgb(channel(0)?, channel(2)?, channel(4)?))
}

fn write_table<W: Write>(
    writer: &mut W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "  {:width$}", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for row in rows {
        for idx in 0..column_count {
            let cell = &row[idx];
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "  {}{}", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
