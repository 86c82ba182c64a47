use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};

use crate::tasks::Task;
use crate::ui::renderfns::utils::{checkbox, title_style, truncate};

/// Draw the task list view
pub fn draw_task_list(frame: &mut Frame, area: Rect, tasks: &[Task], selected: usize) {
  let done = tasks.iter().filter(|t| t.completed).count();
  let title = format!(" Todo List ({}/{}) ", done, tasks.len());
  let block = Block::default().borders(Borders::ALL).title(title);

  if tasks.is_empty() {
    let paragraph = Paragraph::new("No todos available")
      .alignment(Alignment::Center)
      .style(Style::default().fg(Color::DarkGray))
      .block(block);
    frame.render_widget(paragraph, area);
    return;
  }

  let description_width = (area.width as usize).saturating_sub(10);
  let items: Vec<ListItem> = tasks
    .iter()
    .map(|task| {
      let mut lines = vec![Line::from(vec![
        Span::raw(format!("{} ", checkbox(task.completed))),
        Span::styled(task.title.clone(), title_style(task.completed)),
      ])];
      if !task.description.is_empty() {
        let style = if task.completed {
          Style::default()
            .fg(Color::DarkGray)
            .add_modifier(Modifier::CROSSED_OUT)
        } else {
          Style::default().fg(Color::Gray)
        };
        lines.push(Line::from(Span::styled(
          format!("    {}", truncate(&task.description, description_width)),
          style,
        )));
      }
      ListItem::new(lines)
    })
    .collect();

  let list = List::new(items)
    .block(block)
    .highlight_style(Style::default().bg(Color::DarkGray))
    .highlight_symbol("> ");

  let mut state = ListState::default();
  state.select(Some(selected));

  frame.render_stateful_widget(list, area, &mut state);
}
