/// Available commands and autocomplete logic

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
  Add,
  Edit,
  Delete,
  Toggle,
  Quit,
}

#[derive(Debug, Clone)]
pub struct Command {
  pub name: &'static str,
  pub aliases: &'static [&'static str],
  pub description: &'static str,
  pub action: Action,
}

/// All available commands
pub const COMMANDS: &[Command] = &[
  Command {
    name: "add",
    aliases: &["a", "new"],
    description: "Add a task (`:add <title>` adds it directly)",
    action: Action::Add,
  },
  Command {
    name: "edit",
    aliases: &["e"],
    description: "Edit the selected task",
    action: Action::Edit,
  },
  Command {
    name: "delete",
    aliases: &["d", "rm", "remove"],
    description: "Delete the selected task",
    action: Action::Delete,
  },
  Command {
    name: "toggle",
    aliases: &["t", "done", "x"],
    description: "Toggle completion of the selected task",
    action: Action::Toggle,
  },
  Command {
    name: "quit",
    aliases: &["q", "exit"],
    description: "Exit tasklet",
    action: Action::Quit,
  },
];

/// Commands matching `input`, best match first.
///
/// Ranking: exact name, exact alias, name prefix, alias prefix, then
/// substring of name or alias. Empty input lists every command.
pub fn get_suggestions(input: &str) -> Vec<&'static Command> {
  let input = input.to_lowercase();
  if input.is_empty() {
    return COMMANDS.iter().collect();
  }

  let mut ranked: Vec<(u8, &'static Command)> = COMMANDS
    .iter()
    .filter_map(|cmd| rank(cmd, &input).map(|r| (r, cmd)))
    .collect();
  // Stable, so ties keep table order
  ranked.sort_by_key(|(r, _)| *r);

  ranked.into_iter().map(|(_, cmd)| cmd).collect()
}

fn rank(cmd: &Command, input: &str) -> Option<u8> {
  let any_alias = |f: &dyn Fn(&str) -> bool| cmd.aliases.iter().any(|a| f(a));

  if cmd.name == input {
    Some(0)
  } else if any_alias(&|a| a == input) {
    Some(1)
  } else if cmd.name.starts_with(input) {
    Some(2)
  } else if any_alias(&|a| a.starts_with(input)) {
    Some(3)
  } else if cmd.name.contains(input) {
    Some(4)
  } else if any_alias(&|a| a.contains(input)) {
    Some(5)
  } else {
    None
  }
}

/// Split command-line input into the best matching command and its argument
pub fn parse(input: &str) -> Option<(&'static Command, &str)> {
  let input = input.trim();
  let (word, rest) = input.split_once(char::is_whitespace).unwrap_or((input, ""));
  if word.is_empty() {
    return None;
  }
  get_suggestions(word)
    .first()
    .map(|cmd| (*cmd, rest.trim()))
}
