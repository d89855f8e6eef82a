//! Command validation.
//!
//! Commands are checked against a rule table keyed on (command, field).
//! Each rule names the JSON type the field must have and whether it is
//! required. Fields without a rule are accepted as-is.
//!
//! Issues carry a path rooted at `<root>`: a one-segment path means the
//! command object itself is at fault, a two-segment path names the
//! offending field.

use crate::error::{CommandError, ErrorReason};
use crate::protocol::Command;
use serde_json::{Map, Value};

const ROOT: &str = "<root>";

/// JSON type a field is constrained to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Object,
    Array,
}

impl FieldType {
    fn matches(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
        }
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
        };
        write!(f, "{}", s)
    }
}

/// One typed constraint on a command field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRule {
    pub command: &'static str,
    pub field: &'static str,
    pub ty: FieldType,
    pub required: bool,
}

/// What went wrong with a validated document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssueKind {
    /// The command is not a JSON object.
    NotAnObject,
    /// A required property is absent.
    MissingProperty(String),
    /// A property has the wrong JSON type.
    WrongType(FieldType),
}

/// A single structural validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub path: Vec<String>,
    pub kind: IssueKind,
    pub description: String,
}

impl ValidationIssue {
    fn at_root(kind: IssueKind, description: String) -> Self {
        Self {
            path: vec![ROOT.to_string()],
            kind,
            description,
        }
    }

    fn at_field(field: &str, kind: IssueKind, description: String) -> Self {
        Self {
            path: vec![ROOT.to_string(), field.to_string()],
            kind,
            description,
        }
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path.join("."), self.description)
    }
}

impl CommandError {
    /// Translates a validation issue into the client-facing error.
    ///
    /// Root-level issues name an argument only when a property is missing;
    /// anything else at the root is `unknown`. Field-level issues blame the
    /// field with `bad-value`.
    pub fn from_issue(command: &str, issue: &ValidationIssue) -> Self {
        let err = if issue.path.len() < 2 {
            match &issue.kind {
                IssueKind::MissingProperty(property) => {
                    CommandError::new(command, ErrorReason::MissingArgument)
                        .with_argument(property.as_str())
                }
                _ => CommandError::new(command, ErrorReason::Unknown),
            }
        } else {
            CommandError::new(command, ErrorReason::BadValue).with_argument(issue.path[1].as_str())
        };
        err.with_description(issue.description.as_str())
    }
}

/// Rules the server registers at startup.
const DEFAULT_RULES: &[FieldRule] = &[FieldRule {
    command: "Sync",
    field: "slot",
    ty: FieldType::String,
    required: false,
}];

/// Validates packets and the commands inside them.
#[derive(Debug, Clone)]
pub struct CommandValidator {
    rules: Vec<FieldRule>,
}

impl Default for CommandValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandValidator {
    /// Creates a validator with the built-in command schemas.
    pub fn new() -> Self {
        Self {
            rules: DEFAULT_RULES.to_vec(),
        }
    }

    /// Checks the packet shape: an array of objects with a string `cmd`.
    pub fn validate_packet(&self, packet: Value) -> Result<Vec<Command>, ValidationIssue> {
        let items = match packet {
            Value::Array(items) => items,
            other => {
                return Err(ValidationIssue::at_root(
                    IssueKind::WrongType(FieldType::Array),
                    format!("Packet must be an array, got {}", type_name(&other)),
                ))
            }
        };

        items
            .into_iter()
            .enumerate()
            .map(|(index, item)| {
                let path = format!("[{}]", index);
                let fields = match item {
                    Value::Object(fields) => fields,
                    other => {
                        return Err(ValidationIssue::at_field(
                            &path,
                            IssueKind::NotAnObject,
                            format!("Item {} must be an object, got {}", index, type_name(&other)),
                        ))
                    }
                };
                let name = match fields.get("cmd") {
                    Some(Value::String(name)) => name.clone(),
                    Some(other) => {
                        return Err(ValidationIssue::at_field(
                            &path,
                            IssueKind::WrongType(FieldType::String),
                            format!(
                                "Item {} property 'cmd' must be a string, got {}",
                                index,
                                type_name(other)
                            ),
                        ))
                    }
                    None => {
                        return Err(ValidationIssue::at_field(
                            &path,
                            IssueKind::MissingProperty("cmd".into()),
                            format!("Item {} is missing required property 'cmd'", index),
                        ))
                    }
                };
                Ok(Command { name, fields })
            })
            .collect()
    }

    /// Checks one command against the rules for its name.
    ///
    /// Returns every issue found, in rule order.
    pub fn validate(&self, command: &str, document: &Map<String, Value>) -> Vec<ValidationIssue> {
        self.rules
            .iter()
            .filter(|rule| rule.command == command)
            .filter_map(|rule| match document.get(rule.field) {
                None if rule.required => Some(ValidationIssue::at_root(
                    IssueKind::MissingProperty(rule.field.to_string()),
                    format!("Missing required property '{}'.", rule.field),
                )),
                None => None,
                Some(value) if rule.ty.matches(value) => None,
                Some(value) => Some(ValidationIssue::at_field(
                    rule.field,
                    IssueKind::WrongType(rule.ty),
                    format!("Expected {}, got {}.", rule.ty, type_name(value)),
                )),
            })
            .collect()
    }

    /// Validates a command and translates the first issue, if any.
    pub fn check(&self, command: &Command) -> Result<(), CommandError> {
        match self.validate(&command.name, &command.fields).first() {
            Some(issue) => Err(CommandError::from_issue(&command.name, issue)),
            None => Ok(()),
        }
    }

    #[cfg(test)]
    fn with_rule(mut self, rule: FieldRule) -> Self {
        self.rules.push(rule);
        self
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
