use ratatui::prelude::{Color, Modifier, Style};

/// Truncate a string to a maximum number of characters, adding "..." if truncated
pub fn truncate(s: &str, max_len: usize) -> String {
  if s.chars().count() <= max_len {
    s.to_string()
  } else {
    let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
    format!("{}...", kept)
  }
}

/// Style for a task title; completed tasks are struck through and dimmed
pub fn title_style(completed: bool) -> Style {
  if completed {
    Style::default()
      .fg(Color::DarkGray)
      .add_modifier(Modifier::CROSSED_OUT)
  } else {
    Style::default().fg(Color::White).add_modifier(Modifier::BOLD)
  }
}

/// Checkbox glyph for a task
pub fn checkbox(completed: bool) -> &'static str {
  if completed {
    "[x]"
  } else {
    "[ ]"
  }
}
