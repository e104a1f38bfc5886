use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// The three directive kinds a simulation script understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum DirectiveKind {
    Start,
    Interact,
    End,
}

/// Prompt payload carried by `start` and `interact` directives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    pub prompt: String,
}

/// Empty payload of an `end` directive, serialized as `{}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EndMarker {}

/// What a directive does, externally tagged on the wire:
/// `"start": {"prompt": ...}`, `"interact": {"prompt": ...}` or `"end": {}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Start(Prompt),
    Interact(Prompt),
    End(EndMarker),
}

/// A single timestamped scene directive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneDirective {
    pub timestamp_ms: u64,
    #[serde(flatten)]
    pub action: Action,
}

impl SceneDirective {
    pub fn start(timestamp_ms: u64, prompt: impl Into<String>) -> Self {
        Self {
            timestamp_ms,
            action: Action::Start(Prompt { prompt: prompt.into() }),
        }
    }

    pub fn interact(timestamp_ms: u64, prompt: impl Into<String>) -> Self {
        Self {
            timestamp_ms,
            action: Action::Interact(Prompt { prompt: prompt.into() }),
        }
    }

    pub fn end(timestamp_ms: u64) -> Self {
        Self {
            timestamp_ms,
            action: Action::End(EndMarker {}),
        }
    }

    pub fn kind(&self) -> DirectiveKind {
        match self.action {
            Action::Start(_) => DirectiveKind::Start,
            Action::Interact(_) => DirectiveKind::Interact,
            Action::End(_) => DirectiveKind::End,
        }
    }

    /// Prompt text; `None` for `end` directives.
    pub fn prompt(&self) -> Option<&str> {
        match &self.action {
            Action::Start(p) | Action::Interact(p) => Some(&p.prompt),
            Action::End(_) => None,
        }
    }
}

/// An ordered, validated sequence of scene directives.
///
/// A `Script` can only be obtained through [`Script::new`] (or by
/// deserializing, which runs the same checks), so every value upholds:
/// - exactly one `start`, and it is the first directive
/// - exactly one `end`, and it is the last directive
/// - only `interact` directives in between
/// - strictly increasing `timestamp_ms`
/// - non-empty prompts on `start` / `interact`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<SceneDirective>", into = "Vec<SceneDirective>")]
pub struct Script {
    directives: Vec<SceneDirective>,
}

impl Script {
    pub fn new(directives: Vec<SceneDirective>) -> Result<Self, ScriptError> {
        validate(&directives)?;
        Ok(Self { directives })
    }

    pub fn directives(&self) -> &[SceneDirective] {
        &self.directives
    }

    pub fn len(&self) -> usize {
        self.directives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.directives.is_empty()
    }

    /// Timestamp of the closing `end` directive.
    pub fn duration_ms(&self) -> u64 {
        self.directives.last().map(|d| d.timestamp_ms).unwrap_or(0)
    }
}

impl TryFrom<Vec<SceneDirective>> for Script {
    type Error = ScriptError;

    fn try_from(directives: Vec<SceneDirective>) -> Result<Self, Self::Error> {
        Self::new(directives)
    }
}

impl From<Script> for Vec<SceneDirective> {
    fn from(script: Script) -> Self {
        script.directives
    }
}

fn validate(directives: &[SceneDirective]) -> Result<(), ScriptError> {
    let (first, last) = match (directives.first(), directives.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return Err(ScriptError::Empty),
    };

    if first.kind() != DirectiveKind::Start {
        return Err(ScriptError::MissingStart { found: first.kind() });
    }
    if directives.len() < 2 || last.kind() != DirectiveKind::End {
        return Err(ScriptError::MissingEnd { found: last.kind() });
    }

    let last_index = directives.len() - 1;
    for (index, directive) in directives.iter().enumerate() {
        let kind = directive.kind();
        let misplaced = match kind {
            DirectiveKind::Start => index != 0,
            DirectiveKind::End => index != last_index,
            DirectiveKind::Interact => false,
        };
        if misplaced {
            return Err(ScriptError::Misplaced { index, kind });
        }

        if let Action::Start(prompt) | Action::Interact(prompt) = &directive.action {
            if prompt.prompt.trim().is_empty() {
                return Err(ScriptError::EmptyPrompt { index });
            }
        }

        if index > 0 {
            let previous = directives[index - 1].timestamp_ms;
            if directive.timestamp_ms <= previous {
                return Err(ScriptError::NonIncreasingTimestamp {
                    index,
                    previous,
                    current: directive.timestamp_ms,
                });
            }
        }
    }

    Ok(())
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScriptError {
    #[error("script has no directives")]
    Empty,

    #[error("script must open with a start directive, found {found}")]
    MissingStart { found: DirectiveKind },

    #[error("script must close with an end directive, found {found}")]
    MissingEnd { found: DirectiveKind },

    #[error("{kind} directive at position {index} is out of place")]
    Misplaced { index: usize, kind: DirectiveKind },

    #[error("directive at position {index} has an empty prompt")]
    EmptyPrompt { index: usize },

    #[error("timestamp at position {index} ({current} ms) must be greater than the previous one ({previous} ms)")]
    NonIncreasingTimestamp {
        index: usize,
        previous: u64,
        current: u64,
    },
}
