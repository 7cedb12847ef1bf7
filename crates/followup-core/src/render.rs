use std::io::{self, IsTerminal, Write};

use chrono::{DateTime, Datelike, Utc};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::config::Config;
use crate::timestamp::ScheduledEvent;
use crate::transition::SweepReport;
use crate::view::{DayGrid, MonthCell, MonthGrid, WeekGrid, weekday_labels};

const MONTH_CELL_WIDTH: usize = 22;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> Self {
        Self {
            color: cfg.color && io::stdout().is_terminal(),
        }
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    #[tracing::instrument(skip(self, out, entries, now))]
    pub fn print_event_table<W: Write>(
        &self,
        mut out: W,
        entries: &[ScheduledEvent<'_>],
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        if entries.is_empty() {
            writeln!(out, "No follow-ups.")?;
            return Ok(());
        }

        let headers = vec![
            "ID".to_string(),
            "When".to_string(),
            "Type".to_string(),
            "Status".to_string(),
            "Contact".to_string(),
            "Email".to_string(),
        ];

        let rows = entries
            .iter()
            .map(|entry| {
                let when = entry.local.format("%Y-%m-%d %H:%M").to_string();
                let when = if entry.at < now { self.paint(&when, "31") } else { when };
                vec![
                    entry.event.id.to_string(),
                    when,
                    entry.event.follow_up_type.as_str().to_string(),
                    entry.event.follow_up_status.to_string(),
                    entry.event.contact_name.clone(),
                    entry.event.contact_email.clone(),
                ]
            })
            .collect();

        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    #[tracing::instrument(skip_all)]
    pub fn print_month<W: Write>(&self, mut out: W, title: &str, grid: &MonthGrid<'_>) -> anyhow::Result<()> {
        writeln!(out, "{title}")?;
        for label in weekday_labels() {
            write!(out, "{label:<width$}", width = MONTH_CELL_WIDTH)?;
        }
        writeln!(out)?;

        for row in grid.rows() {
            let mut lines: Vec<String> = vec![String::new(); 2 + crate::view::MONTH_CELL_VISIBLE];
            for cell in row {
                let mut column = vec![String::new(); lines.len()];
                if let MonthCell::Day(day) = cell {
                    column[0] = format!("{:>2} ({})", day.date.day(), day.total);
                    for (idx, entry) in day.visible.iter().enumerate() {
                        column[idx + 1] = format!("{} {}", entry.local.format("%H:%M"), entry.event.contact_name);
                    }
                    if let Some(more) = day.more_label() {
                        column[lines.len() - 1] = more;
                    }
                }
                for (line, text) in lines.iter_mut().zip(column) {
                    line.push_str(&pad(&truncate(&text, MONTH_CELL_WIDTH - 1), MONTH_CELL_WIDTH));
                }
            }
            for line in lines {
                writeln!(out, "{}", line.trim_end())?;
            }
        }
        Ok(())
    }

    #[tracing::instrument(skip_all)]
    pub fn print_week<W: Write>(&self, mut out: W, title: &str, grid: &WeekGrid<'_>) -> anyhow::Result<()> {
        writeln!(out, "{title}")?;
        let mut headers = vec!["Hour".to_string()];
        headers.extend(grid.days.iter().map(|column| column.date.format("%a %d").to_string()));

        let hours = grid.days.first().map(|column| column.slots.len()).unwrap_or_default();
        let rows = (0..hours)
            .map(|idx| {
                let mut row = Vec::with_capacity(grid.days.len() + 1);
                let hour = grid.days.first().map(|column| column.slots[idx].hour).unwrap_or_default();
                row.push(format!("{hour:02}:00"));
                for column in &grid.days {
                    row.push(slot_summary(&column.slots[idx].events));
                }
                row
            })
            .collect();

        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    #[tracing::instrument(skip_all)]
    pub fn print_day<W: Write>(&self, mut out: W, title: &str, grid: &DayGrid<'_>) -> anyhow::Result<()> {
        writeln!(out, "{title}")?;
        for slot in &grid.slots {
            let names = slot
                .events
                .iter()
                .map(|entry| {
                    format!(
                        "{} {} ({})",
                        entry.local.format("%H:%M"),
                        entry.event.contact_name,
                        entry.event.follow_up_type.as_str()
                    )
                })
                .collect::<Vec<_>>()
                .join(", ");
            writeln!(out, "{:02}:00  {}", slot.hour, names)?;
        }
        Ok(())
    }

    pub fn print_sweep<W: Write>(&self, mut out: W, report: &SweepReport) -> anyhow::Result<()> {
        writeln!(out, "Marked {} follow-up(s) overdue.", report.transitioned.len())?;
        for failure in &report.failed {
            let line = format!("failed {}: {}", failure.id, failure.reason);
            writeln!(out, "{}", self.paint(&line, "31"))?;
        }
        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn slot_summary(events: &[ScheduledEvent<'_>]) -> String {
    match events {
        [] => String::new(),
        [only] => only.event.contact_name.clone(),
        [first, rest @ ..] => format!("{} +{}", first.event.contact_name, rest.len()),
    }
}

fn truncate(text: &str, max_width: usize) -> String {
    if UnicodeWidthStr::width(text) <= max_width {
        return text.to_string();
    }
    let mut out = String::new();
    let mut width = 0;
    for ch in text.chars() {
        let ch_width = UnicodeWidthChar::width(ch).unwrap_or(0);
        if width + ch_width + 1 > max_width {
            break;
        }
        width += ch_width;
        out.push(ch);
    }
    out.push('…');
    out
}

fn pad(text: &str, width: usize) -> String {
    let visible = UnicodeWidthStr::width(text);
    format!("{text}{}", " ".repeat(width.saturating_sub(visible)))
}

fn write_table<W: Write>(mut writer: W, headers: Vec<String>, rows: Vec<Vec<String>>) -> anyhow::Result<()> {
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
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for width in &widths {
        write!(writer, "{:-<width$} ", "", width = *width)?;
    }
    writeln!(writer)?;

    for row in rows {
        for (idx, cell) in row.iter().enumerate() {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
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
