pub mod components;
mod renderfns;
mod views;

use crate::app::{App, Mode};
use crate::notify::{Notification, Variant};
use crate::tasks::KeyValueStore;
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};

const OFFLINE_MESSAGE: &str = "You are currently offline. Some features may not be available.";

/// Main draw function
pub fn draw<K: KeyValueStore>(frame: &mut Frame, app: &App<K>) {
  let banner_height = if app.is_online() { 0 } else { 1 };
  let form_height = if app.form().is_some() { 5 } else { 0 };

  let chunks = Layout::default()
    .direction(Direction::Vertical)
    .constraints([
      Constraint::Length(banner_height), // Offline banner
      Constraint::Length(form_height),   // Add/edit form
      Constraint::Min(1),                // Task list
      Constraint::Length(1),             // Status bar
    ])
    .split(frame.area());

  if !app.is_online() {
    let banner = Paragraph::new(OFFLINE_MESSAGE)
      .alignment(Alignment::Center)
      .style(Style::default().fg(Color::Red));
    frame.render_widget(banner, chunks[0]);
  }

  if let Some(form) = app.form() {
    views::task_form::draw_task_form(frame, chunks[1], form);
  }

  views::task_list::draw_task_list(frame, chunks[2], app.tasks(), app.selected());

  if app.mode() == Mode::Command {
    draw_suggestions(frame, chunks[2], app);
  }

  if let Some(toast) = app.toast() {
    draw_toast(frame, chunks[2], &toast.notification);
  }

  // Draw status bar
  draw_status_bar(frame, chunks[3], app);
}

fn draw_status_bar<K: KeyValueStore>(frame: &mut Frame, area: Rect, app: &App<K>) {
  let (content, style) = match app.mode() {
    Mode::Normal => {
      let hint = " :command  a:add  e:edit  space:toggle  d:delete  j/k:nav  q:quit";
      (hint.to_string(), Style::default().fg(Color::DarkGray))
    }
    Mode::Command => {
      let cmd = format!(":{}", app.command_input().value());
      (cmd, Style::default().fg(Color::Yellow))
    }
    Mode::Form => {
      let hint = " Tab:switch field  Enter:save  Esc:cancel";
      (hint.to_string(), Style::default().fg(Color::Cyan))
    }
  };

  let paragraph = Paragraph::new(content).style(style);
  frame.render_widget(paragraph, area);

  if app.mode() == Mode::Command {
    let x = area.x + 1 + app.command_input().cursor_position() as u16;
    frame.set_cursor_position((x.min(area.right().saturating_sub(1)), area.y));
  }
}

/// Autocomplete popup anchored to the bottom of the list area
fn draw_suggestions<K: KeyValueStore>(frame: &mut Frame, area: Rect, app: &App<K>) {
  let suggestions = app.suggestions();
  if suggestions.is_empty() {
    return;
  }

  let height = (suggestions.len() as u16 + 2).min(area.height);
  let popup = Rect {
    x: area.x,
    y: area.bottom().saturating_sub(height),
    width: area.width.min(60),
    height,
  };

  let lines: Vec<Line> = suggestions
    .iter()
    .map(|cmd| {
      Line::from(vec![
        Span::styled(format!("{:<8}", cmd.name), Style::default().fg(Color::Yellow)),
        Span::styled(cmd.description, Style::default().fg(Color::DarkGray)),
      ])
    })
    .collect();

  frame.render_widget(Clear, popup);
  frame.render_widget(
    Paragraph::new(lines).block(Block::default().borders(Borders::ALL)),
    popup,
  );
}

/// Transient notification in the top-right corner
fn draw_toast(frame: &mut Frame, area: Rect, notification: &Notification) {
  let width = area.width.min(48);
  let height = area.height.min(4);
  let popup = Rect {
    x: area.right().saturating_sub(width),
    y: area.y,
    width,
    height,
  };

  let color = match notification.variant {
    Variant::Default => Color::Green,
    Variant::Destructive => Color::Red,
  };

  let paragraph = Paragraph::new(notification.description.clone())
    .wrap(Wrap { trim: true })
    .block(
      Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(color))
        .title(Span::styled(
          notification.title.clone(),
          Style::default().fg(color).bold(),
        )),
    );

  frame.render_widget(Clear, popup);
  frame.render_widget(paragraph, popup);
}
