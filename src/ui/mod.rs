use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Row, Table, Wrap},
    Frame,
};

use crate::app::App;

// Catppuccin-ish palette
fn accent() -> Color { Color::Rgb(250, 179, 135) }
fn inactive() -> Color { Color::Rgb(88, 91, 112) }
fn success() -> Color { Color::Rgb(166, 218, 149) }
fn warning() -> Color { Color::Rgb(250, 179, 135) }
fn danger() -> Color { Color::Rgb(243, 139, 168) }
fn text() -> Color { Color::Rgb(205, 214, 244) }
fn text_dim() -> Color { Color::Rgb(147, 153, 178) }
fn bg_selected() -> Color { Color::Rgb(69, 71, 90) }
fn header() -> Color { Color::Rgb(243, 139, 168) }

pub fn draw(f: &mut Frame, app: &App) {
    let area = f.area();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),  // Info line
            Constraint::Length(9),  // Status box
            Constraint::Min(4),     // Profiles box
            Constraint::Length(1),  // Footer
        ])
        .split(area);

    draw_info_line(f, app, chunks[0]);
    draw_status_box(f, app, chunks[1]);
    draw_profiles_box(f, app, chunks[2]);
    draw_footer(f, chunks[3]);
}

fn draw_info_line(f: &mut Frame, app: &App, area: Rect) {
    // Priority: running action > status message > rotation info
    let line = if let Some(ref busy) = app.busy {
        Line::from(vec![
            Span::styled("󰔟 ", Style::default().fg(accent())),
            Span::styled(format!("{}...", busy), Style::default().fg(text())),
        ])
    } else if let Some(ref message) = app.status_message {
        let color = if message.starts_with("Error") { danger() } else { warning() };
        Line::from(Span::styled(message.as_str(), Style::default().fg(color)))
    } else if let Some(every) = app.rotate_every {
        Line::from(Span::styled(
            format!("Rotating every {}", format_period(every.as_secs())),
            Style::default().fg(text_dim()),
        ))
    } else {
        Line::from(Span::styled("Auto-rotation off", Style::default().fg(text_dim())))
    };

    f.render_widget(Paragraph::new(line).alignment(Alignment::Center), area);
}

fn draw_status_box(f: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .title(Span::styled(" Status ", Style::default().fg(accent()).add_modifier(Modifier::BOLD)))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(inactive()));

    let Some(snapshot) = app.snapshot.as_ref() else {
        let waiting = Paragraph::new(Span::styled("Checking connection...", Style::default().fg(text_dim())))
            .block(block);
        f.render_widget(waiting, area);
        return;
    };

    let status_color = if snapshot.is_connected() {
        success()
    } else if snapshot.status.starts_with("Error") {
        danger()
    } else {
        text_dim()
    };

    let row = |label: &'static str, value: &str, color: Color| {
        Row::new(vec![
            Span::styled(label, Style::default().fg(header())),
            Span::styled(value.to_string(), Style::default().fg(color)),
        ])
    };
    let rows = vec![
        row("Status", &snapshot.status, status_color),
        row("Config", &snapshot.current_config, text()),
        row("Local IP", &snapshot.local_ip, text()),
        row("Public IP", &snapshot.public_ip, text()),
        row("Location", &format!("{}, {}", snapshot.city, snapshot.country), text()),
        row("Updated", snapshot.timestamp.get(11..19).unwrap_or(&snapshot.timestamp), text_dim()),
    ];

    let table = Table::new(rows, [Constraint::Length(11), Constraint::Min(10)]).block(block);
    f.render_widget(table, area);
}

fn draw_profiles_box(f: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .title(Span::styled(" Profiles ", Style::default().fg(accent()).add_modifier(Modifier::BOLD)))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(accent()));

    if app.profiles.is_empty() {
        let empty = Paragraph::new(vec![
            Line::from(Span::styled("No .conf files found.", Style::default().fg(text_dim()))),
            Line::from(Span::styled(
                "Drop WireGuard configs into the profile directory and press r.",
                Style::default().fg(text_dim()),
            )),
        ])
        .wrap(Wrap { trim: true })
        .block(block);
        f.render_widget(empty, area);
        return;
    }

    // Keep the selection visible in short terminals
    let visible = area.height.saturating_sub(2).max(1) as usize;
    let offset = app.selected.saturating_sub(visible - 1);

    let rows: Vec<Row> = app
        .profiles
        .iter()
        .enumerate()
        .skip(offset)
        .take(visible)
        .map(|(i, profile)| {
            let current = app.is_current(profile);
            let marker = if current { "●" } else { " " };
            let style = if i == app.selected {
                Style::default().fg(text()).bg(bg_selected()).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(text())
            };
            Row::new(vec![
                Span::styled(marker, Style::default().fg(success())),
                Span::styled(profile.name.clone(), style),
                Span::styled(profile.path.display().to_string(), Style::default().fg(text_dim())),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [Constraint::Length(2), Constraint::Percentage(35), Constraint::Min(10)],
    )
    .block(block);
    f.render_widget(table, area);
}

fn draw_footer(f: &mut Frame, area: Rect) {
    let hints = [
        ("↑↓", "Nav"),
        ("Enter", "Connect"),
        ("n", "Next"),
        ("d", "Disconnect"),
        ("r", "Refresh"),
        ("q", "Quit"),
    ];

    // Responsive: show fewer hints on narrow terminals
    let max_hints = if area.width < 60 { 4 } else { hints.len() };

    let spans: Vec<Span> = hints
        .iter()
        .take(max_hints)
        .flat_map(|(key, action)| {
            vec![
                Span::styled(*key, Style::default().fg(accent())),
                Span::styled(format!(" {} │ ", action), Style::default().fg(text_dim())),
            ]
        })
        .collect();

    f.render_widget(Paragraph::new(Line::from(spans)).alignment(Alignment::Center), area);
}

fn format_period(secs: u64) -> String {
    match (secs / 60, secs % 60) {
        (0, s) => format!("{}s", s),
        (m, 0) => format!("{}m", m),
        (m, s) => format!("{}m {}s", m, s),
    }
}
