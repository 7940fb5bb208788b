//! Scenario identity recovery.
//!
//! Log writers name the active scenario in several places. Each place has its
//! own pure strategy; [`identify`] tries them in a fixed order and the first
//! that yields a name wins.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use simverdict_types::{FieldValue, LogEvent};

/// Where a scenario name was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioSource {
    /// Top-level `scenario` key or `fields.scenario`.
    Payload,
    /// `span.scenario`.
    Span,
    /// `scenario: <name>` inside the message text.
    Message,
    /// Target mentions `scenario`; name taken from a `name` field.
    Target,
}

impl ScenarioSource {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Payload => "payload",
            Self::Span => "span",
            Self::Message => "message",
            Self::Target => "target",
        }
    }
}

impl fmt::Display for ScenarioSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type Strategy = fn(&LogEvent) -> Option<String>;

const STRATEGIES: [(ScenarioSource, Strategy); 4] = [
    (ScenarioSource::Payload, from_payload),
    (ScenarioSource::Span, from_span),
    (ScenarioSource::Message, from_message),
    (ScenarioSource::Target, from_target),
];

/// Recover the scenario name an event belongs to, if any.
#[must_use]
pub fn identify(event: &LogEvent) -> Option<(ScenarioSource, String)> {
    STRATEGIES
        .iter()
        .find_map(|(source, strategy)| strategy(event).map(|name| (*source, name)))
}

/// Name-only view of [`identify`].
#[must_use]
pub fn scenario_name(event: &LogEvent) -> Option<String> {
    identify(event).map(|(_, name)| name)
}

fn non_empty(value: Option<&FieldValue>) -> Option<String> {
    value.map(FieldValue::to_text).filter(|name| !name.is_empty())
}

fn from_payload(event: &LogEvent) -> Option<String> {
    event
        .scenario
        .clone()
        .filter(|name| !name.is_empty())
        .or_else(|| non_empty(event.fields.get("scenario")))
}

fn from_span(event: &LogEvent) -> Option<String> {
    non_empty(event.span.get("scenario"))
}

fn scenario_message_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)scenario[:\s]+([A-Za-z0-9_-]+)").ok())
        .as_ref()
}

fn from_message(event: &LogEvent) -> Option<String> {
    let captures = scenario_message_regex()?.captures(&event.message)?;
    captures.get(1).map(|m| m.as_str().to_owned())
}

fn from_target(event: &LogEvent) -> Option<String> {
    if !event.target.contains("scenario") {
        return None;
    }
    Some(non_empty(event.field("name")).unwrap_or_else(|| "unknown".to_owned()))
}
