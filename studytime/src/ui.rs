use crate::app::{App, AppMode};
use chrono::Local;
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Clear, Gauge, List, ListItem, Paragraph},
    Frame,
};
use studytime_ipc::{format_clock, TimerMode, TimerState};

const NORMAL_HINTS: &str = "space:start/pause │ r:reset │ m:mode │ d:duration │ a:alarm │ s:subject │ t:topic │ n/N:session │ ?:help │ q:quit";

pub fn draw(f: &mut Frame, app: &App) {
    let area = f.area();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(6),
            Constraint::Min(5),
            Constraint::Length(1),
        ])
        .split(area);

    draw_header(f, chunks[0], app);
    draw_timer(f, chunks[1], app);
    draw_session(f, chunks[2], app);
    draw_status_bar(f, chunks[3], app);

    match app.mode {
        AppMode::EditingDuration => {
            draw_input_overlay(f, "Duration (MM or MM:SS)", &app.input_buffer, app)
        }
        AppMode::EditingTopic => draw_input_overlay(f, "Topic", &app.input_buffer, app),
        AppMode::EditingSubject => {
            draw_input_overlay(f, "Subject id (empty clears)", &app.input_buffer, app)
        }
        AppMode::SelectingAlarm => draw_alarm_overlay(f, app),
        AppMode::Help => draw_help_overlay(f, app),
        AppMode::Normal => {}
    }
}

fn draw_header(f: &mut Frame, area: Rect, app: &App) {
    let theme = &app.config.theme;
    let text = Line::from(vec![Span::styled(
        "STUDYTIME",
        Style::default().fg(theme.blue).add_modifier(Modifier::BOLD),
    )]);
    f.render_widget(
        Paragraph::new(text).alignment(Alignment::Center).block(
            Block::default()
                .borders(Borders::BOTTOM)
                .border_style(Style::default().fg(theme.black)),
        ),
        area,
    );
}

fn draw_timer(f: &mut Frame, area: Rect, app: &App) {
    let theme = &app.config.theme;
    let (mode, state, seconds) = match &app.status {
        Some(status) => (status.mode, status.state, status.seconds),
        None => (TimerMode::Countdown, TimerState::Idle, 0),
    };
    let (state_text, state_color) = match state {
        TimerState::Running => ("running", theme.green),
        TimerState::Paused => ("paused", theme.yellow),
        TimerState::Idle => ("idle", theme.gray),
    };
    let title = match mode {
        TimerMode::Countdown => " Timer ",
        TimerMode::Stopwatch => " Stopwatch ",
    };
    let block = Block::default()
        .title(Span::styled(title, Style::default().fg(theme.gray)))
        .title(
            Line::from(Span::styled(
                format!(" {} ", state_text),
                Style::default().fg(state_color),
            ))
            .alignment(Alignment::Right),
        )
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(state_color));
    let inner_area = block.inner(area);
    f.render_widget(block, area);
    let v_chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([Constraint::Length(1), Constraint::Length(1)])
        .split(inner_area);
    f.render_widget(
        Paragraph::new(format_clock(seconds))
            .style(
                Style::default()
                    .fg(theme.foreground)
                    .add_modifier(Modifier::BOLD),
            )
            .alignment(Alignment::Center),
        v_chunks[0],
    );
    f.render_widget(
        Gauge::default()
            .gauge_style(Style::default().fg(theme.accent).bg(theme.black))
            .ratio(app.progress().clamp(0.0, 1.0)),
        v_chunks[1],
    );
}

fn draw_session(f: &mut Frame, area: Rect, app: &App) {
    let theme = &app.config.theme;
    let block = Block::default()
        .title(Span::styled(" Session ", Style::default().fg(theme.gray)))
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(theme.green));
    let inner_area = block.inner(area);
    f.render_widget(block, area);

    let Some(status) = &app.status else {
        f.render_widget(
            Paragraph::new("Waiting for the timer service...")
                .style(Style::default().fg(theme.gray))
                .alignment(Alignment::Center),
            inner_area,
        );
        return;
    };

    let subject = status
        .subject_id
        .map(|id| format!("#{}", id))
        .unwrap_or_else(|| "none".to_string());
    let topic = if status.topic.is_empty() {
        "none".to_string()
    } else {
        status.topic.clone()
    };
    let session_start = status
        .session_start
        .map(|at| at.with_timezone(&Local).format("%H:%M").to_string())
        .unwrap_or_else(|| "not set".to_string());
    let rows = [
        ("Subject", subject),
        ("Topic", topic),
        ("Alarm", app.alarm_label()),
        ("Length", format_clock(status.initial_seconds)),
        ("Session started", session_start),
    ];
    let lines: Vec<Line> = rows
        .into_iter()
        .map(|(label, value)| {
            Line::from(vec![
                Span::styled(format!("{:>16} ", label), Style::default().fg(theme.gray)),
                Span::styled(value, Style::default().fg(theme.foreground)),
            ])
        })
        .collect();
    f.render_widget(Paragraph::new(lines), inner_area);
}

fn draw_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let theme = &app.config.theme;
    let (mode_text, mode_color) = match app.mode {
        AppMode::Normal => ("NORMAL", theme.green),
        AppMode::EditingDuration | AppMode::EditingTopic | AppMode::EditingSubject => {
            ("INSERT", theme.yellow)
        }
        AppMode::SelectingAlarm => ("ALARM", theme.blue),
        AppMode::Help => ("HELP", theme.accent),
    };
    let help = match (&app.message, app.mode) {
        (Some(message), _) => Span::styled(message.clone(), Style::default().fg(theme.red)),
        (None, AppMode::Normal) => Span::raw(NORMAL_HINTS),
        (None, _) => Span::raw("enter:confirm │ esc:cancel"),
    };
    f.render_widget(
        Paragraph::new(Line::from(vec![
            Span::styled(
                format!(" {} ", mode_text),
                Style::default()
                    .bg(mode_color)
                    .fg(theme.background)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::raw(" "),
            help,
        ]))
        .block(Block::default().style(Style::default().bg(theme.black).fg(theme.gray))),
        area,
    );
}

fn draw_input_overlay(f: &mut Frame, title: &str, input: &str, app: &App) {
    let theme = &app.config.theme;
    let area = centered_rect(60, 20, f.area());
    f.render_widget(Clear, area);
    let block = Block::default()
        .title(format!(" {} ", title))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.yellow))
        .border_type(BorderType::Double)
        .style(Style::default().bg(theme.background));
    let inner_area = block.inner(area);
    f.render_widget(block, area);
    f.render_widget(
        Paragraph::new(Line::from(vec![
            Span::styled("▸ ", Style::default().fg(theme.foreground)),
            Span::styled(input, Style::default().fg(theme.foreground)),
            Span::styled(
                "█",
                Style::default()
                    .fg(theme.foreground)
                    .add_modifier(Modifier::SLOW_BLINK),
            ),
        ])),
        inner_area,
    );
}

fn draw_alarm_overlay(f: &mut Frame, app: &App) {
    let theme = &app.config.theme;
    let area = centered_rect(50, 40, f.area());
    f.render_widget(Clear, area);
    let items: Vec<ListItem> = app
        .alarms()
        .into_iter()
        .enumerate()
        .map(|(i, alarm)| {
            let style = if i == app.alarm_cursor {
                Style::default().fg(theme.background).bg(theme.accent)
            } else {
                Style::default().fg(theme.foreground)
            };
            ListItem::new(Line::from(vec![
                Span::styled(format!("{}. ", i + 1), Style::default().fg(theme.blue)),
                Span::styled(alarm.label, style),
            ]))
        })
        .collect();
    f.render_widget(
        List::new(items).block(
            Block::default()
                .title(" Select Alarm ")
                .borders(Borders::ALL)
                .border_type(BorderType::Double)
                .border_style(Style::default().fg(theme.blue))
                .style(Style::default().bg(theme.background)),
        ),
        area,
    );
}

fn draw_help_overlay(f: &mut Frame, app: &App) {
    let theme = &app.config.theme;
    let area = centered_rect(60, 70, f.area());
    f.render_widget(Clear, area);

    let shortcuts = [
        ("space", "Start, pause or resume"),
        ("r", "Reset"),
        ("m", "Switch timer/stopwatch"),
        ("d", "Set duration"),
        ("a", "Choose alarm"),
        ("s", "Set subject"),
        ("t", "Set topic"),
        ("n / N", "Mark / clear session start"),
        ("?", "Toggle help"),
        ("q", "Quit"),
    ];
    let lines: Vec<Line> = shortcuts
        .iter()
        .map(|(key, action)| {
            Line::from(vec![
                Span::styled(format!("{:>8}  ", key), Style::default().fg(theme.accent)),
                Span::styled(*action, Style::default().fg(theme.foreground)),
            ])
        })
        .collect();
    f.render_widget(
        Paragraph::new(lines).block(
            Block::default()
                .title(" Help ")
                .borders(Borders::ALL)
                .border_type(BorderType::Double)
                .border_style(Style::default().fg(theme.accent))
                .style(Style::default().bg(theme.background)),
        ),
        area,
    );
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
