//! Full-screen wall view.
//!
//! Layout:
//! - header: event title, tag line, push/poll status
//! - left column: agenda with past/active/upcoming colouring
//! - right pane: the current post card
//! - footer: position pill with countdown, and a progress bar for the tick
//!
//! Key bindings: `q`, `Esc` or `Ctrl-C` quit.

use std::io::{self, Stdout};
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, FixedOffset, Offset, Utc};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode};
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, List, ListItem, Paragraph, Wrap},
};
use xwall_core::agenda::{AgendaRow, AgendaStatus, classify, venue_minutes};
use xwall_core::config::DisplayConfig;
use xwall_core::playback::{Frame as PlaybackFrame, Tick};
use xwall_core::wall::{Flow, Surface, WallView};

/// Redraw often enough for a smooth countdown and responsive keys.
const REDRAW_INTERVAL: Duration = Duration::from_millis(200);

/// Static content of the screen, fixed for the whole run.
#[derive(Debug, Clone)]
pub struct ScreenModel {
    pub display: DisplayConfig,
    pub agenda: Vec<AgendaRow>,
    pub store: String,
}

pub struct WallScreen {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    model: ScreenModel,
    active: bool,
}

impl WallScreen {
    /// Switch the terminal to raw mode and the alternate screen.
    ///
    /// # Errors
    ///
    /// Returns an error if the terminal cannot be configured.
    pub fn enter(model: ScreenModel) -> Result<Self> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        crossterm::execute!(&mut stdout, EnterAlternateScreen)?;
        let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;
        terminal.hide_cursor()?;
        Ok(Self {
            terminal,
            model,
            active: true,
        })
    }

    /// Restore the terminal. Safe to call more than once.
    ///
    /// # Errors
    ///
    /// Returns an error if the terminal cannot be restored.
    pub fn leave(&mut self) -> Result<()> {
        if !self.active {
            return Ok(());
        }
        self.active = false;
        disable_raw_mode()?;
        crossterm::execute!(self.terminal.backend_mut(), LeaveAlternateScreen)?;
        self.terminal.show_cursor()?;
        Ok(())
    }

    fn quit_requested() -> Result<bool> {
        while event::poll(Duration::ZERO)? {
            if matches!(event::read()?, Event::Key(key) if is_quit_key(key)) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl Surface for WallScreen {
    fn show(&mut self, view: &WallView<'_>) -> Result<Flow> {
        if Self::quit_requested()? {
            return Ok(Flow::Stop);
        }
        let model = &self.model;
        let now = Utc::now();
        self.terminal
            .draw(|frame| render_wall(frame, model, view, now))?;
        Ok(Flow::Continue)
    }

    fn redraw_interval(&self) -> Option<Duration> {
        Some(REDRAW_INTERVAL)
    }
}

impl Drop for WallScreen {
    fn drop(&mut self) {
        let _ = self.leave();
    }
}

fn is_quit_key(key: KeyEvent) -> bool {
    if key.kind != KeyEventKind::Press {
        return false;
    }
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => true,
        KeyCode::Char('c') => key.modifiers.contains(KeyModifiers::CONTROL),
        _ => false,
    }
}

/// Draw the whole wall into `frame`.
pub fn render_wall(frame: &mut Frame<'_>, model: &ScreenModel, view: &WallView<'_>, now: DateTime<Utc>) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(6),
            Constraint::Length(3),
        ])
        .split(frame.area());

    render_header(frame, rows[0], model, view, now);

    let body = if model.agenda.is_empty() {
        vec![rows[1]]
    } else {
        Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(35), Constraint::Percentage(65)])
            .split(rows[1])
            .to_vec()
    };
    if let [agenda_area, post_area] = body.as_slice() {
        render_agenda(frame, *agenda_area, model, now);
        render_post(frame, *post_area, model, view);
    } else {
        render_post(frame, rows[1], model, view);
    }

    render_footer(frame, rows[2], view);
}

fn venue_offset(display: &DisplayConfig) -> FixedOffset {
    FixedOffset::east_opt(display.utc_offset_minutes.saturating_mul(60)).unwrap_or_else(|| Utc.fix())
}

fn render_header(
    frame: &mut Frame<'_>,
    area: Rect,
    model: &ScreenModel,
    view: &WallView<'_>,
    now: DateTime<Utc>,
) {
    let title_style = Style::default().fg(Color::White).add_modifier(Modifier::BOLD);
    let dim = Style::default().fg(Color::DarkGray);
    let (dot, dot_style) = if view.push_connected {
        ("●", Style::default().fg(Color::Green))
    } else {
        ("○", Style::default().fg(Color::Yellow))
    };

    let mut spans = vec![Span::styled(model.display.title.clone(), title_style)];
    if let Some(tag_line) = &model.display.tag_line {
        spans.push(Span::styled(format!("  {tag_line}"), Style::default().fg(Color::Cyan)));
    }
    spans.push(Span::raw("   "));
    spans.push(Span::styled(dot, dot_style));
    spans.push(Span::styled(
        format!(
            " live  {} posts  {}",
            view.log_len,
            now.with_timezone(&venue_offset(&model.display)).format("%H:%M")
        ),
        dim,
    ));

    let header = Paragraph::new(Line::from(spans)).block(
        Block::default()
            .borders(Borders::BOTTOM)
            .title(Span::styled(model.store.clone(), dim)),
    );
    frame.render_widget(header, area);
}

fn render_agenda(frame: &mut Frame<'_>, area: Rect, model: &ScreenModel, now: DateTime<Utc>) {
    let minutes = venue_minutes(now, model.display.utc_offset_minutes);
    let statuses = classify(&model.agenda, minutes);

    let items: Vec<ListItem<'_>> = model
        .agenda
        .iter()
        .zip(statuses)
        .map(|(row, status)| {
            let (marker, style) = match status {
                AgendaStatus::Past => ("  ", Style::default().fg(Color::DarkGray)),
                AgendaStatus::Active => (
                    "▶ ",
                    Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
                ),
                AgendaStatus::Upcoming => ("  ", Style::default().fg(Color::White)),
            };
            let mut lines = vec![Line::from(vec![
                Span::styled(marker, style),
                Span::styled(format!("{:<6}", row.time), style),
                Span::styled(row.title.clone(), style),
            ])];
            if let Some(speaker) = &row.speaker {
                lines.push(Line::from(Span::styled(
                    format!("        {speaker}"),
                    Style::default().fg(Color::DarkGray),
                )));
            }
            ListItem::new(lines)
        })
        .collect();

    let list = List::new(items).block(Block::default().borders(Borders::RIGHT).title("Agenda"));
    frame.render_widget(list, area);
}

fn render_post(frame: &mut Frame<'_>, area: Rect, model: &ScreenModel, view: &WallView<'_>) {
    let block = Block::default().borders(Borders::NONE);
    let Some(post_frame) = view.tick.frame() else {
        let message = placeholder(view);
        let placeholder = Paragraph::new(message)
            .style(Style::default().fg(Color::DarkGray))
            .alignment(Alignment::Center)
            .block(block);
        frame.render_widget(placeholder, centered_line(area));
        return;
    };

    let card = Paragraph::new(post_lines(post_frame, &model.display))
        .wrap(Wrap { trim: true })
        .block(block);
    frame.render_widget(card, area);
}

/// Text shown in place of the card when the tick produced no post.
const fn placeholder(view: &WallView<'_>) -> &'static str {
    if view.loading {
        "Loading posts..."
    } else if matches!(view.tick, Tick::Resynced) {
        "Catching up..."
    } else {
        "Waiting for posts..."
    }
}

fn post_lines(post_frame: &PlaybackFrame, display: &DisplayConfig) -> Vec<Line<'static>> {
    let post = &post_frame.post;
    let dim = Style::default().fg(Color::DarkGray);
    let posted = post.created_at.with_timezone(&venue_offset(display)).format("%H:%M");

    let mut lines = vec![
        Line::from(vec![
            Span::styled(
                format!("({}) ", post.initial()),
                Style::default().fg(Color::Cyan),
            ),
            Span::styled(
                post.author_name.clone(),
                Style::default().add_modifier(Modifier::BOLD),
            ),
            Span::styled(format!(" {} · {posted}", post.handle_label()), dim),
        ]),
        Line::raw(""),
    ];
    lines.extend(post.content.lines().map(|line| Line::raw(line.to_string())));
    if let Some(media) = &post.media_url {
        lines.push(Line::raw(""));
        lines.push(Line::from(Span::styled(
            format!("[media] {media}"),
            Style::default().fg(Color::Blue),
        )));
    }

    let e = &post_frame.engagement;
    lines.push(Line::raw(""));
    lines.push(Line::from(Span::styled(
        format!(
            "↩ {}   ⟲ {}   ♥ {}   ◉ {}",
            e.replies,
            e.retweets,
            e.likes,
            e.views_label()
        ),
        dim,
    )));
    lines
}

fn render_footer(frame: &mut Frame<'_>, area: Rect, view: &WallView<'_>) {
    let pill = match view.tick {
        Tick::Show(post_frame) => format!(
            "{}  ·  next in {}s",
            post_frame.label(),
            view.next_tick_in.as_secs()
        ),
        Tick::Empty | Tick::Resynced => format!("{} posts", view.log_len),
    };

    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::TOP))
        .gauge_style(Style::default().fg(Color::Cyan).bg(Color::Black))
        .ratio(view.tick_progress.clamp(0.0, 1.0))
        .label(pill);
    frame.render_widget(gauge, area);
}

/// A one-line rect in the vertical middle of `area`.
fn centered_line(area: Rect) -> Rect {
    Rect {
        y: area.y + area.height / 2,
        height: area.height.min(1),
        ..area
    }
}
