use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph};

use crate::app::{FormField, TaskForm};
use crate::ui::components::TextInput;

/// Draw the add/edit form with its two inputs
pub fn draw_task_form(frame: &mut Frame, area: Rect, form: &TaskForm) {
  let title = if form.editing.is_some() {
    " Update Task "
  } else {
    " Add Task "
  };
  let block = Block::default().borders(Borders::ALL).title(title);
  let inner = block.inner(area);
  frame.render_widget(block, area);

  let rows = Layout::default()
    .direction(Direction::Vertical)
    .constraints([Constraint::Length(1), Constraint::Length(1), Constraint::Length(1)])
    .split(inner);

  draw_field(
    frame,
    rows[0],
    "Title",
    "Enter Task Title",
    &form.title,
    form.focus == FormField::Title,
  );
  draw_field(
    frame,
    rows[2],
    "Description",
    "Enter Task Description",
    &form.description,
    form.focus == FormField::Description,
  );
}

fn draw_field(
  frame: &mut Frame,
  area: Rect,
  label: &str,
  placeholder: &str,
  input: &TextInput,
  focused: bool,
) {
  let label_width = 13u16;
  let label_style = if focused {
    Style::default().fg(Color::Cyan).bold()
  } else {
    Style::default().fg(Color::Gray)
  };

  let value = if input.is_empty() {
    Span::styled(placeholder.to_string(), Style::default().fg(Color::DarkGray))
  } else {
    Span::raw(input.value().to_string())
  };

  let line = Line::from(vec![
    Span::styled(format!("{:<width$}", label, width = label_width as usize), label_style),
    value,
  ]);
  frame.render_widget(Paragraph::new(line), area);

  if focused {
    let x = area.x + label_width + input.cursor_position() as u16;
    frame.set_cursor_position((x.min(area.right().saturating_sub(1)), area.y));
  }
}
