//! PR status documents and their aggregate rollup.
//!
//! The rollup arrives as a single object, a list of entries, or not at all.
//! [`RollupState`] makes those shapes explicit and reconciles them into one state.

use serde_json::Value;

/// Reported when a rollup exists but carries no usable state.
pub const UNKNOWN_STATE: &str = "UNKNOWN";

/// The shapes an aggregate rollup is reported in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollupState {
    Absent,
    Single(Option<String>),
    Multiple(Vec<Option<String>>),
    /// Present but of a type no provider is known to send.
    Unrecognized,
}

fn entry_state(entry: &Value) -> Option<String> {
    entry.get("state").and_then(Value::as_str).map(str::to_string)
}

impl RollupState {
    pub fn from_value(value: Option<&Value>) -> Self {
        match value {
            None | Some(Value::Null) => Self::Absent,
            Some(Value::Object(map)) if map.is_empty() => Self::Absent,
            Some(obj @ Value::Object(_)) => Self::Single(entry_state(obj)),
            Some(Value::Array(items)) => Self::Multiple(items.iter().map(entry_state).collect()),
            Some(Value::Bool(false)) => Self::Absent,
            Some(Value::String(s)) if s.is_empty() => Self::Absent,
            Some(_) => Self::Unrecognized,
        }
    }

    /// The state the rollup resolves to. A list resolves to its first entry.
    pub fn resolve(&self) -> Option<&str> {
        match self {
            Self::Single(state) => state.as_deref(),
            Self::Multiple(states) => states.first().and_then(|s| s.as_deref()),
            Self::Absent | Self::Unrecognized => None,
        }
    }

    /// Rollup resolves to one of `terminal_states`.
    pub fn is_terminal(&self, terminal_states: &[String]) -> bool {
        self.resolve()
            .is_some_and(|state| terminal_states.iter().any(|t| t == state))
    }

    /// Overall status recorded in an analysis: absent when there is no rollup,
    /// `UNKNOWN` when there is one but it cannot be read.
    pub fn overall_status(&self) -> Option<String> {
        match self {
            Self::Absent | Self::Single(None) => None,
            Self::Multiple(states) if states.is_empty() => None,
            Self::Single(Some(state)) => Some(state.clone()),
            Self::Multiple(states) => Some(
                states
                    .first()
                    .cloned()
                    .flatten()
                    .unwrap_or_else(|| UNKNOWN_STATE.to_string()),
            ),
            Self::Unrecognized => Some(UNKNOWN_STATE.to_string()),
        }
    }

    /// One-line description for poll logging.
    pub fn describe(&self) -> String {
        match self {
            Self::Absent => "PENDING (no rollup data yet)".to_string(),
            Self::Single(state) => state.as_deref().unwrap_or(UNKNOWN_STATE).to_string(),
            Self::Multiple(states) if states.is_empty() => {
                "PENDING (rollup list is empty)".to_string()
            }
            Self::Multiple(states) => format!(
                "{} (from rollup list of {})",
                states
                    .first()
                    .and_then(|s| s.as_deref())
                    .unwrap_or(UNKNOWN_STATE),
                states.len()
            ),
            Self::Unrecognized => "UNKNOWN (unexpected rollup type)".to_string(),
        }
    }
}

/// A PR status document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawStatus {
    pub number: Option<u64>,
    pub title: Option<String>,
    pub state: Option<String>,
    pub url: Option<String>,
    pub rollup: RollupState,
}

impl RawStatus {
    /// Read a status document; `None` when it is not an object.
    pub fn from_value(value: &Value) -> Option<Self> {
        if !value.is_object() {
            return None;
        }

        let number = match value.get("number") {
            Some(Value::Number(n)) => n.as_u64(),
            Some(Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        };
        let text = |key: &str| value.get(key).and_then(Value::as_str).map(str::to_string);

        Some(Self {
            number,
            title: text("title"),
            state: text("state"),
            url: text("url"),
            rollup: RollupState::from_value(value.get("statusCheckRollup")),
        })
    }
}
