pub mod charting;
pub mod history;

use chrono::Local;
use itertools::Itertools;
use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Paragraph, Widget, Wrap},
    Frame,
};
use unicode_width::UnicodeWidthStr;

use crate::{App, FeedLine, Notice, Screen};
use dahdit::{
    clock::Clock,
    engine::SessionState,
    playback::AudioStatus,
    source::CharacterSource,
    stats::SessionStats,
};

const HORIZONTAL_MARGIN: u16 = 5;
const VERTICAL_MARGIN: u16 = 2;

/// Entry point for a frame: the history table needs mutable scroll state
pub fn draw<C: Clock, S: CharacterSource>(app: &mut App<C, S>, f: &mut Frame) {
    match app.screen {
        Screen::History => history::render_history(app, f),
        _ => f.render_widget(&*app, f.area()),
    }
}

/// Text for one entry of the recent results list
pub fn feed_text(line: &FeedLine) -> String {
    match line {
        FeedLine::Correct {
            character,
            latency_ms,
            replays: 0,
        } => format!("{character}  {latency_ms:>5.0} ms"),
        FeedLine::Correct {
            character,
            latency_ms,
            replays,
        } => format!("{character}  {latency_ms:>5.0} ms  ({replays}x replayed)"),
        FeedLine::Wrong { played, pressed } => {
            format!("ERROR - played {played}, pressed {pressed}")
        }
    }
}

/// Summary line shown under the results chart
pub fn summary_text(stats: &SessionStats) -> String {
    if stats.is_empty() {
        return "no answers this session".to_string();
    }
    let mut parts = vec![
        format!("{}/{} correct", stats.total_correct(), stats.total_attempts()),
        format!("{}% acc", stats.accuracy()),
    ];
    if let Some(avg) = stats.avg_latency_ms() {
        parts.push(format!("{avg:.0} ms avg"));
    }
    if let Some(best) = stats.best_latency_ms() {
        parts.push(format!("{best:.0} ms best"));
    }
    if let Some(sd) = stats.latency_std_dev_ms() {
        parts.push(format!("{sd:.0} sd"));
    }
    parts.join("   ")
}

/// Up to `n` characters with the highest average latency this session
pub fn slowest_characters(stats: &SessionStats, n: usize) -> String {
    stats
        .per_character
        .iter()
        .filter_map(|(c, tally)| tally.avg_latency().map(|avg| (*c, avg)))
        .sorted_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)))
        .take(n)
        .map(|(c, avg)| format!("{c} {}ms", avg.as_millis()))
        .join("  ")
}

/// Horizontally centre a block of lines as a unit so they stay left-aligned
fn centered_column(lines: &[String], area: Rect) -> Rect {
    let width = lines.iter().map(|l| l.width()).max().unwrap_or(0) as u16;
    let width = width.min(area.width);
    Rect {
        x: area.x + (area.width - width) / 2,
        width,
        ..area
    }
}

impl<C: Clock, S: CharacterSource> Widget for &App<C, S> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let bold_style = Style::default().add_modifier(Modifier::BOLD);
        let dim_bold_style = Style::default()
            .patch(bold_style)
            .add_modifier(Modifier::DIM);
        let italic_style = Style::default().add_modifier(Modifier::ITALIC);
        let magenta_style = Style::default().fg(Color::Magenta);
        let red_style = Style::default().fg(Color::Red);

        let notice = match &self.notice {
            Some(Notice::Info(text)) => Span::styled(text.clone(), italic_style),
            Some(Notice::Error(text)) => Span::styled(text.clone(), red_style),
            None => match self.engine.audio_status() {
                AudioStatus::Unavailable(e) => Span::styled(e.to_string(), red_style),
                AudioStatus::Available => Span::raw(""),
            },
        };

        match self.screen {
            Screen::Ready | Screen::History => {
                let chunks = Layout::default()
                    .direction(Direction::Vertical)
                    .horizontal_margin(HORIZONTAL_MARGIN)
                    .constraints([
                        Constraint::Percentage(35),
                        Constraint::Length(2), // title
                        Constraint::Length(2), // settings
                        Constraint::Length(2), // last session
                        Constraint::Length(1), // notice
                        Constraint::Min(0),
                        Constraint::Length(1), // legend
                    ])
                    .split(area);

                Paragraph::new(Span::styled(
                    "dahdit",
                    bold_style.fg(Color::Cyan),
                ))
                .alignment(Alignment::Center)
                .render(chunks[1], buf);

                let cfg = &self.config;
                let settings = format!(
                    "{} s   {:.0} wpm   {:.0} Hz   {}",
                    cfg.session_secs,
                    cfg.wpm,
                    cfg.frequency_hz,
                    if cfg.include_digits {
                        "letters + digits"
                    } else {
                        "letters"
                    }
                );
                Paragraph::new(Span::styled(settings, bold_style))
                    .alignment(Alignment::Center)
                    .render(chunks[2], buf);

                if let Some(last) = self.recent_sessions.first() {
                    let when = history::humanize_since(last.started_at, Local::now());
                    let mut text = format!(
                        "last session {when}: {}/{} correct",
                        last.correct, last.attempts
                    );
                    if let Some(avg) = last.avg_latency_ms {
                        text.push_str(&format!(", {avg:.0} ms avg"));
                    }
                    Paragraph::new(Span::styled(text, dim_bold_style))
                        .alignment(Alignment::Center)
                        .render(chunks[3], buf);
                }

                Paragraph::new(notice)
                    .alignment(Alignment::Center)
                    .render(chunks[4], buf);

                Paragraph::new(Span::styled(
                    "(enter) start / (+/-) speed / (h)istory / (esc)ape",
                    italic_style,
                ))
                .render(chunks[6], buf);
            }
            Screen::Running => {
                let chunks = Layout::default()
                    .direction(Direction::Vertical)
                    .horizontal_margin(HORIZONTAL_MARGIN)
                    .vertical_margin(VERTICAL_MARGIN)
                    .constraints([
                        Constraint::Length(1), // status
                        Constraint::Length(2), // countdown
                        Constraint::Length(2), // prompt state
                        Constraint::Length(self.feed.len().max(1) as u16 + 1),
                        Constraint::Min(1),    // chart
                        Constraint::Length(1), // notice
                        Constraint::Length(1), // legend
                    ])
                    .split(area);

                let wpm = self
                    .engine
                    .timing()
                    .map(|t| t.wpm())
                    .unwrap_or(self.config.wpm);
                let status = format!(
                    "{wpm:.0} wpm   {:.0} Hz   {} correct",
                    self.engine.tone_spec().frequency_hz,
                    self.engine.stats().total_correct()
                );
                Paragraph::new(Span::styled(status, dim_bold_style))
                    .alignment(Alignment::Center)
                    .render(chunks[0], buf);

                if let Some(remaining) = self.engine.remaining() {
                    Paragraph::new(Span::styled(
                        format!("{:.1}", remaining.as_secs_f64()),
                        bold_style,
                    ))
                    .alignment(Alignment::Center)
                    .render(chunks[1], buf);
                }

                let prompt = match (self.engine.state(), self.engine.current_round()) {
                    (SessionState::LeadIn, _) => Span::styled("get ready", italic_style),
                    (SessionState::AwaitingResponse, Some(round)) if round.replay_count > 0 => {
                        Span::styled(
                            format!("listen ({}x replayed)", round.replay_count),
                            bold_style.fg(Color::Yellow),
                        )
                    }
                    (SessionState::AwaitingResponse, _) => {
                        Span::styled("listen", bold_style.fg(Color::Yellow))
                    }
                    (SessionState::Resolved, _) => Span::styled("ok", bold_style.fg(Color::Green)),
                    _ => Span::raw(""),
                };
                Paragraph::new(prompt)
                    .alignment(Alignment::Center)
                    .render(chunks[2], buf);

                let feed: Vec<String> = self.feed.iter().map(feed_text).collect();
                let lines: Vec<Line> = self
                    .feed
                    .iter()
                    .zip(&feed)
                    .map(|(entry, text)| {
                        let style = match entry {
                            FeedLine::Correct { .. } => Style::default().fg(Color::Green),
                            FeedLine::Wrong { .. } => red_style,
                        };
                        Line::from(Span::styled(text.clone(), style))
                    })
                    .collect();
                Paragraph::new(lines).render(centered_column(&feed, chunks[3]), buf);

                let points = charting::latency_points(&self.engine.stats().average_latency_series());
                if points.len() > 1 {
                    charting::latency_chart(&points, magenta_style).render(chunks[4], buf);
                }

                Paragraph::new(notice)
                    .alignment(Alignment::Center)
                    .render(chunks[5], buf);

                Paragraph::new(Span::styled("(esc) stop / (+/-) speed", italic_style))
                    .render(chunks[6], buf);
            }
            Screen::Results => {
                let chunks = Layout::default()
                    .direction(Direction::Vertical)
                    .horizontal_margin(HORIZONTAL_MARGIN)
                    .vertical_margin(VERTICAL_MARGIN)
                    .constraints([
                        Constraint::Min(1),    // chart
                        Constraint::Length(1), // stats
                        Constraint::Length(1), // slowest characters
                        Constraint::Length(1), // notice
                        Constraint::Length(1), // padding
                        Constraint::Length(1), // legend
                    ])
                    .split(area);

                let empty = SessionStats::default();
                let stats = self.last_result.as_ref().unwrap_or(&empty);

                let points = charting::latency_points(&stats.average_latency_series());
                charting::latency_chart(&points, magenta_style).render(chunks[0], buf);

                Paragraph::new(Span::styled(summary_text(stats), bold_style))
                    .alignment(Alignment::Center)
                    .render(chunks[1], buf);

                let slowest = slowest_characters(stats, 3);
                if !slowest.is_empty() {
                    Paragraph::new(Span::styled(
                        format!("slowest: {slowest}"),
                        Style::default()
                            .fg(Color::Cyan)
                            .add_modifier(Modifier::ITALIC),
                    ))
                    .alignment(Alignment::Center)
                    .wrap(Wrap { trim: true })
                    .render(chunks[2], buf);
                }

                Paragraph::new(notice)
                    .alignment(Alignment::Center)
                    .render(chunks[3], buf);

                Paragraph::new(Span::styled(
                    "(r)estart / (h)istory / (+/-) speed / (esc)ape",
                    italic_style,
                ))
                .render(chunks[5], buf);
            }
        }
    }
}
