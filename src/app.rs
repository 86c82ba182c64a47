use crate::commands::{self, Action, Command};
use crate::config::Config;
use crate::connectivity::ConnectivityObserver;
use crate::event::{Event, EventHandler};
use crate::notify::Notification;
use crate::tasks::{KeyValueStore, Task, TaskId, TaskStore};
use crate::ui;
use crate::ui::components::{InputResult, TextInput};
use color_eyre::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{
  disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::prelude::*;
use std::io::stdout;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};

/// Input mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
  Normal,
  Command,
  /// Add/edit form is open
  Form,
}

/// Which form field has focus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormField {
  Title,
  Description,
}

/// Add/edit form state
#[derive(Debug, Clone)]
pub struct TaskForm {
  /// Task being edited; `None` when adding
  pub editing: Option<TaskId>,
  pub title: TextInput,
  pub description: TextInput,
  pub focus: FormField,
}

impl TaskForm {
  fn new() -> Self {
    Self {
      editing: None,
      title: TextInput::new(),
      description: TextInput::new(),
      focus: FormField::Title,
    }
  }

  fn edit(task: &Task) -> Self {
    Self {
      editing: Some(task.id),
      title: TextInput::with_value(&task.title),
      description: TextInput::with_value(&task.description),
      focus: FormField::Title,
    }
  }

  fn focused(&mut self) -> &mut TextInput {
    match self.focus {
      FormField::Title => &mut self.title,
      FormField::Description => &mut self.description,
    }
  }

  fn switch_focus(&mut self) {
    self.focus = match self.focus {
      FormField::Title => FormField::Description,
      FormField::Description => FormField::Title,
    };
  }
}

/// A notification currently on screen
#[derive(Debug, Clone)]
pub struct Toast {
  pub notification: Notification,
  shown_at: Instant,
}

/// Main application state
pub struct App<K: KeyValueStore> {
  /// Task list, notifying through the event channel
  store: TaskStore<K, mpsc::UnboundedSender<Event>>,

  /// Index of the highlighted task
  selected: usize,

  /// Current input mode
  mode: Mode,

  /// Command input buffer (after pressing :)
  command_input: TextInput,

  /// Open add/edit form
  form: Option<TaskForm>,

  toast: Option<Toast>,
  toast_ttl: Duration,

  /// Online/offline flag for the banner; `None` means always online
  connectivity: Option<ConnectivityObserver>,

  /// Whether to quit
  should_quit: bool,
}

/// Run the terminal UI until the user quits
pub async fn run<K: KeyValueStore>(
  config: &Config,
  kv: K,
  connectivity: Option<ConnectivityObserver>,
) -> Result<()> {
  let mut events = EventHandler::new(Duration::from_millis(250));
  let store = TaskStore::load(kv, events.sender())?;
  let mut app = App::new(store, connectivity, Duration::from_secs(config.ui.toast_secs));

  // Setup terminal
  enable_raw_mode()?;
  stdout().execute(EnterAlternateScreen)?;
  let result = app.event_loop(&mut events).await;

  // Cleanup terminal, even when the loop failed
  disable_raw_mode()?;
  stdout().execute(LeaveAlternateScreen)?;

  result
}

async fn connectivity_changed(rx: &mut Option<watch::Receiver<bool>>) {
  if let Some(rx) = rx {
    if rx.changed().await.is_ok() {
      return;
    }
  }
  // No observer, or it is gone: never wake
  std::future::pending::<()>().await
}

impl<K: KeyValueStore> App<K> {
  pub fn new(
    store: TaskStore<K, mpsc::UnboundedSender<Event>>,
    connectivity: Option<ConnectivityObserver>,
    toast_ttl: Duration,
  ) -> Self {
    Self {
      store,
      selected: 0,
      mode: Mode::Normal,
      command_input: TextInput::new(),
      form: None,
      toast: None,
      toast_ttl,
      connectivity,
      should_quit: false,
    }
  }

  async fn event_loop(&mut self, events: &mut EventHandler) -> Result<()> {
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    let mut online = self.connectivity.as_ref().map(ConnectivityObserver::subscribe);

    // Main loop
    while !self.should_quit {
      // Draw UI
      terminal.draw(|frame| ui::draw(frame, self))?;

      // Handle events; a connectivity change just redraws the banner
      tokio::select! {
        event = events.next() => match event {
          Some(event) => self.handle_event(event),
          None => break,
        },
        _ = connectivity_changed(&mut online) => {}
      }
    }

    Ok(())
  }

  pub fn handle_event(&mut self, event: Event) {
    match event {
      Event::Key(key) => self.handle_key(key),
      Event::Tick => self.expire_toast(),
      Event::Notify(notification) => {
        self.toast = Some(Toast {
          notification,
          shown_at: Instant::now(),
        });
      }
    }
  }

  fn expire_toast(&mut self) {
    if let Some(toast) = &self.toast {
      if toast.shown_at.elapsed() >= self.toast_ttl {
        self.toast = None;
      }
    }
  }

  fn handle_key(&mut self, key: KeyEvent) {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
      self.should_quit = true;
      return;
    }

    match self.mode {
      Mode::Normal => self.handle_normal_mode_key(key),
      Mode::Command => self.handle_command_mode_key(key),
      Mode::Form => self.handle_form_key(key),
    }
  }

  fn handle_normal_mode_key(&mut self, key: KeyEvent) {
    match key.code {
      KeyCode::Char('q') => self.should_quit = true,
      KeyCode::Char('j') | KeyCode::Down => self.move_selection(1),
      KeyCode::Char('k') | KeyCode::Up => self.move_selection(-1),
      KeyCode::Char('g') | KeyCode::Home => self.selected = 0,
      KeyCode::Char('G') | KeyCode::End => {
        self.selected = self.store.len().saturating_sub(1);
      }
      KeyCode::Char('a') => self.run_action(Action::Add, ""),
      KeyCode::Char('e') | KeyCode::Enter => self.run_action(Action::Edit, ""),
      KeyCode::Char('d') | KeyCode::Delete => self.run_action(Action::Delete, ""),
      KeyCode::Char(' ') | KeyCode::Char('x') => self.run_action(Action::Toggle, ""),
      KeyCode::Char(':') => {
        self.mode = Mode::Command;
        self.command_input.clear();
      }
      _ => {}
    }
  }

  fn handle_command_mode_key(&mut self, key: KeyEvent) {
    if key.code == KeyCode::Tab {
      // Complete the command word, keeping any argument
      let input = self.command_input.value().trim_start().to_string();
      let (word, rest) = input.split_once(' ').unwrap_or((input.as_str(), ""));
      if let Some(cmd) = commands::get_suggestions(word).first() {
        let completed = if rest.is_empty() {
          format!("{} ", cmd.name)
        } else {
          format!("{} {}", cmd.name, rest)
        };
        self.command_input = TextInput::with_value(&completed);
      }
      return;
    }

    match self.command_input.handle_key(key) {
      InputResult::Submitted(input) => {
        self.mode = Mode::Normal;
        self.command_input.clear();
        if let Some((cmd, arg)) = commands::parse(&input) {
          self.run_action(cmd.action, arg);
        }
      }
      InputResult::Cancelled => {
        self.mode = Mode::Normal;
        self.command_input.clear();
      }
      InputResult::Consumed | InputResult::NotHandled => {}
    }
  }

  fn handle_form_key(&mut self, key: KeyEvent) {
    let Some(form) = self.form.as_mut() else {
      self.mode = Mode::Normal;
      return;
    };

    match key.code {
      KeyCode::Tab | KeyCode::BackTab | KeyCode::Down | KeyCode::Up => {
        form.switch_focus();
        return;
      }
      _ => {}
    }

    let result = form.focused().handle_key(key);
    match result {
      InputResult::Submitted(_) => self.submit_form(),
      InputResult::Cancelled => self.close_form(),
      InputResult::Consumed | InputResult::NotHandled => {}
    }
  }

  /// Add or update from the form. A blank title keeps the form open.
  fn submit_form(&mut self) {
    let Some(form) = self.form.as_ref() else {
      return;
    };
    let title = form.title.value().to_string();
    let description = form.description.value().to_string();

    let accepted = match form.editing {
      Some(id) => self.store.update(id, &title, &description),
      None => match self.store.add(&title, &description) {
        Some(_) => {
          self.selected = self.store.len() - 1;
          true
        }
        None => false,
      },
    };

    if accepted {
      self.close_form();
    }
  }

  fn close_form(&mut self) {
    self.form = None;
    self.mode = Mode::Normal;
  }

  fn run_action(&mut self, action: Action, arg: &str) {
    match action {
      Action::Add if !arg.is_empty() => {
        if self.store.add(arg, "").is_some() {
          self.selected = self.store.len() - 1;
        }
      }
      Action::Add => {
        self.form = Some(TaskForm::new());
        self.mode = Mode::Form;
      }
      Action::Edit => {
        if let Some(form) = self.selected_task().map(TaskForm::edit) {
          self.form = Some(form);
          self.mode = Mode::Form;
        }
      }
      Action::Delete => {
        if let Some(id) = self.selected_task().map(|t| t.id) {
          self.store.delete(id);
          self.clamp_selection();
        }
      }
      Action::Toggle => {
        if let Some(id) = self.selected_task().map(|t| t.id) {
          self.store.toggle_complete(id);
        }
      }
      Action::Quit => self.should_quit = true,
    }
  }

  fn move_selection(&mut self, delta: isize) {
    let len = self.store.len();
    if len == 0 {
      self.selected = 0;
      return;
    }
    self.selected = self.selected.saturating_add_signed(delta).min(len - 1);
  }

  fn clamp_selection(&mut self) {
    self.selected = self.selected.min(self.store.len().saturating_sub(1));
  }

  fn selected_task(&self) -> Option<&Task> {
    self.store.tasks().get(self.selected)
  }

  // Accessors for UI rendering

  pub fn tasks(&self) -> &[Task] {
    self.store.tasks()
  }

  pub fn selected(&self) -> usize {
    self.selected
  }

  pub fn mode(&self) -> Mode {
    self.mode
  }

  pub fn command_input(&self) -> &TextInput {
    &self.command_input
  }

  /// Commands matching the word typed so far
  pub fn suggestions(&self) -> Vec<&'static Command> {
    let input = self.command_input.value().trim_start();
    let word = input.split_whitespace().next().unwrap_or("");
    commands::get_suggestions(word)
  }

  pub fn form(&self) -> Option<&TaskForm> {
    self.form.as_ref()
  }

  pub fn toast(&self) -> Option<&Toast> {
    self.toast.as_ref()
  }

  pub fn is_online(&self) -> bool {
    self
      .connectivity
      .as_ref()
      .map_or(true, ConnectivityObserver::is_online)
  }

  pub fn should_quit(&self) -> bool {
    self.should_quit
  }
}
