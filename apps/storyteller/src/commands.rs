//! Line commands typed at the storyteller prompt.

use anyhow::{anyhow, bail, Result};
use shared::domain::{StoryForm, StoryId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormEntry {
    Genre,
    Age,
    Choices,
    Pages,
    Seed,
}

impl FormEntry {
    fn parse(raw: &str) -> Result<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "genre" => Ok(FormEntry::Genre),
            "age" => Ok(FormEntry::Age),
            "choices" | "choice_count" => Ok(FormEntry::Choices),
            "pages" | "page_count" => Ok(FormEntry::Pages),
            "seed" | "idea" | "key_moments" => Ok(FormEntry::Seed),
            other => bail!("unknown form field '{other}' (genre, age, choices, pages, seed)"),
        }
    }

    pub fn apply(self, form: &mut StoryForm, value: String) {
        match self {
            FormEntry::Genre => form.genre = value,
            FormEntry::Age => form.age = value,
            FormEntry::Choices => form.choice_count = value,
            FormEntry::Pages => form.page_count = value,
            FormEntry::Seed => form.seed_text = value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Set { entry: FormEntry, value: String },
    Form,
    Start,
    Input(String),
    Continue(Option<String>),
    Save,
    Retry,
    Dismiss,
    Show,
    List,
    View(StoryId),
    Delete(StoryId),
    New,
    Help,
    Quit,
}

/// Parses one prompt line. Blank lines yield `None`.
pub fn parse(line: &str) -> Result<Option<Command>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let command = match word.to_ascii_lowercase().as_str() {
        "set" => {
            let (field, value) = rest
                .split_once(char::is_whitespace)
                .map(|(field, value)| (field, value.trim()))
                .unwrap_or((rest, ""));
            if field.is_empty() {
                bail!("usage: set <genre|age|choices|pages|seed> <value>");
            }
            Command::Set {
                entry: FormEntry::parse(field)?,
                value: value.to_string(),
            }
        }
        "form" => Command::Form,
        "start" => Command::Start,
        "input" => Command::Input(rest.to_string()),
        "continue" | "next" => {
            Command::Continue((!rest.is_empty()).then(|| rest.to_string()))
        }
        "save" => Command::Save,
        "retry" => Command::Retry,
        "dismiss" => Command::Dismiss,
        "show" => Command::Show,
        "list" | "history" => Command::List,
        "view" => Command::View(parse_story_id(rest)?),
        "delete" => Command::Delete(parse_story_id(rest)?),
        "new" => Command::New,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => bail!("unknown command '{other}'; type `help`"),
    };
    Ok(Some(command))
}

fn parse_story_id(raw: &str) -> Result<StoryId> {
    raw.parse::<i64>()
        .map(StoryId)
        .map_err(|_| anyhow!("expected a story id, got '{raw}'"))
}

pub const HELP: &str = "\
commands:
  set <genre|age|choices|pages|seed> <value>   edit the new-story form
  form                                         show the form
  start                                        start a story from the form
  input <text>                                 compose the next continuation
  continue [text]                              continue the story
  save                                         save the story
  retry | dismiss                              retry or drop a failed operation
  show                                         show the current story
  list | view <id> | delete <id>               browse saved stories
  new                                          abandon this story and begin another
  quit";
