use chrono::{DateTime, Local};
use crossterm::event::KeyCode;
use itertools::Itertools;
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table},
    Frame,
};
use time_humanize::HumanTime;

use crate::App;
use dahdit::{clock::Clock, history::CharSummary, source::CharacterSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum SortBy {
    Character,
    #[strum(to_string = "Avg Latency")]
    AvgLatency,
    #[strum(to_string = "Miss Rate")]
    MissRate,
    Attempts,
}

#[derive(Debug)]
pub struct HistoryState {
    pub scroll_offset: usize,
    pub sort_by: SortBy,
    pub sort_ascending: bool,
}

impl Default for HistoryState {
    fn default() -> Self {
        Self {
            scroll_offset: 0,
            sort_by: SortBy::Character,
            sort_ascending: true,
        }
    }
}

impl HistoryState {
    pub fn on_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Up => self.scroll_offset = self.scroll_offset.saturating_sub(1),
            // clamped against the row count at render time
            KeyCode::Down => self.scroll_offset += 1,
            KeyCode::PageUp => self.scroll_offset = self.scroll_offset.saturating_sub(10),
            KeyCode::PageDown => self.scroll_offset += 10,
            KeyCode::Home => self.scroll_offset = 0,
            KeyCode::Char('1') => self.sort(SortBy::Character),
            KeyCode::Char('2') => self.sort(SortBy::AvgLatency),
            KeyCode::Char('3') => self.sort(SortBy::MissRate),
            KeyCode::Char('4') => self.sort(SortBy::Attempts),
            KeyCode::Char(' ') => {
                self.sort_ascending = !self.sort_ascending;
                self.scroll_offset = 0;
            }
            _ => {}
        }
    }

    fn sort(&mut self, sort_by: SortBy) {
        self.sort_by = sort_by;
        self.scroll_offset = 0;
    }
}

/// Rows in display order; characters never answered correctly sort as slowest
pub fn sorted_rows(rows: &[CharSummary], sort_by: SortBy, ascending: bool) -> Vec<&CharSummary> {
    rows.iter()
        .sorted_by(|a, b| {
            let cmp = match sort_by {
                SortBy::Character => a.character.cmp(&b.character),
                SortBy::AvgLatency => a
                    .avg_latency_ms
                    .unwrap_or(f64::INFINITY)
                    .total_cmp(&b.avg_latency_ms.unwrap_or(f64::INFINITY)),
                SortBy::MissRate => a.miss_rate.total_cmp(&b.miss_rate),
                SortBy::Attempts => a.attempts.cmp(&b.attempts),
            };
            if ascending {
                cmp
            } else {
                cmp.reverse()
            }
        })
        .collect()
}

/// "5 minutes ago" style text for a past moment
pub fn humanize_since(then: DateTime<Local>, now: DateTime<Local>) -> String {
    let secs = (now - then).num_seconds().max(0);
    HumanTime::from_seconds(-secs).to_string()
}

/// Pure presenter for a single history row
pub fn present_row(data: &CharSummary, now: DateTime<Local>) -> Row<'static> {
    let latency_color = match data.avg_latency_ms {
        Some(ms) if ms < 500.0 => Color::Green,
        Some(ms) if ms < 1000.0 => Color::Yellow,
        _ => Color::Red,
    };

    let miss_color = if data.miss_rate == 0.0 {
        Color::Green
    } else if data.miss_rate < 10.0 {
        Color::Yellow
    } else {
        Color::Red
    };

    let latency_display = data
        .avg_latency_ms
        .map(|ms| format!("{ms:.0}"))
        .unwrap_or_else(|| "-".to_string());

    Row::new(vec![
        Cell::from(data.character.to_string()).style(Style::default().add_modifier(Modifier::BOLD)),
        Cell::from(latency_display).style(Style::default().fg(latency_color)),
        Cell::from(format!("{:.1}", data.miss_rate)).style(Style::default().fg(miss_color)),
        Cell::from(data.attempts.to_string()),
        Cell::from(
            data.last_seen
                .map(|seen| humanize_since(seen, now))
                .unwrap_or_else(|| "-".to_string()),
        ),
    ])
}

/// Render the lifetime per-character table
pub fn render_history<C: Clock, S: CharacterSource>(app: &mut App<C, S>, f: &mut Frame) {
    let area = f.area();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(2)
        .constraints([
            Constraint::Length(3), // title
            Constraint::Min(0),    // table
            Constraint::Length(2), // instructions
        ])
        .split(area);

    let state = &mut app.history_state;
    let sort_direction = if state.sort_ascending { "↑" } else { "↓" };
    let title = Paragraph::new(format!(
        "Character History (Sort: {} {sort_direction})",
        state.sort_by
    ))
    .block(Block::default().borders(Borders::ALL).title("History"))
    .style(
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD),
    )
    .alignment(Alignment::Center);
    f.render_widget(title, chunks[0]);

    if app.history.is_none() {
        let unavailable = Paragraph::new("History is unavailable: the database could not be opened.")
            .alignment(Alignment::Center)
            .style(Style::default().fg(Color::Gray));
        f.render_widget(unavailable, chunks[1]);
    } else if app.history_rows.is_empty() {
        let no_data = Paragraph::new("No history yet. Finish a session to collect data.")
            .alignment(Alignment::Center)
            .style(Style::default().fg(Color::Gray));
        f.render_widget(no_data, chunks[1]);
    } else {
        let rows = sorted_rows(&app.history_rows, state.sort_by, state.sort_ascending);

        let table_height = chunks[1].height.saturating_sub(3) as usize; // borders + header
        let max_scroll = rows.len().saturating_sub(table_height);
        state.scroll_offset = state.scroll_offset.min(max_scroll);

        let indicator = |col: SortBy| {
            if state.sort_by == col {
                sort_direction
            } else {
                ""
            }
        };
        let header = Row::new(vec![
            Cell::from(format!("Char {}", indicator(SortBy::Character))),
            Cell::from(format!("Avg Latency (ms) {}", indicator(SortBy::AvgLatency))),
            Cell::from(format!("Miss Rate (%) {}", indicator(SortBy::MissRate))),
            Cell::from(format!("Attempts {}", indicator(SortBy::Attempts))),
            Cell::from("Last Seen"),
        ])
        .style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        );

        let now = Local::now();
        let visible_rows: Vec<Row> = rows
            .iter()
            .skip(state.scroll_offset)
            .take(table_height)
            .map(|row| present_row(row, now))
            .collect();

        let widths = [
            Constraint::Length(6),
            Constraint::Length(20),
            Constraint::Length(16),
            Constraint::Length(10),
            Constraint::Min(12),
        ];

        let table = Table::new(visible_rows, widths)
            .header(header)
            .block(Block::default().borders(Borders::ALL).title("Characters"))
            .column_spacing(2);

        f.render_widget(table, chunks[1]);
    }

    let instructions =
        Paragraph::new("(↑/↓) scroll  (PgUp/PgDn) page  (1-4) sort  (space) direction  (esc) back")
            .alignment(Alignment::Center)
            .wrap(ratatui::widgets::Wrap { trim: true });
    f.render_widget(instructions, chunks[2]);
}
