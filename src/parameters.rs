//! Scoped parameter declarations used for `$name` substitution.
//!
//! Declarations form a stack: the most recently declared binding of a name
//! shadows older ones. Scopes (a story, a maneuver, a catalog reference) take
//! a [`Checkpoint`] on entry and [`ParameterDeclarations::restore`] on exit,
//! which drops every binding pushed since.

use std::fmt;
use std::str::FromStr;

use log::debug;

/// Declared type of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterType {
    Integer,
    Double,
    String,
    Boolean,
    UnsignedInt,
    UnsignedShort,
    DateTime,
}

impl FromStr for ParameterType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "integer" | "int" => Ok(ParameterType::Integer),
            "double" => Ok(ParameterType::Double),
            "string" => Ok(ParameterType::String),
            "boolean" => Ok(ParameterType::Boolean),
            "unsignedInt" => Ok(ParameterType::UnsignedInt),
            "unsignedShort" => Ok(ParameterType::UnsignedShort),
            "dateTime" => Ok(ParameterType::DateTime),
            other => Err(format!("unknown parameter type '{}'", other)),
        }
    }
}

impl fmt::Display for ParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ParameterType::Integer => "integer",
            ParameterType::Double => "double",
            ParameterType::String => "string",
            ParameterType::Boolean => "boolean",
            ParameterType::UnsignedInt => "unsignedInt",
            ParameterType::UnsignedShort => "unsignedShort",
            ParameterType::DateTime => "dateTime",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    /// Name without the leading `$`.
    pub name: String,
    pub parameter_type: ParameterType,
    pub value: String,
}

/// Opaque stack height captured on scope entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint(usize);

/// The declaration stack. Lookups search innermost (newest) first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterDeclarations {
    stack: Vec<Parameter>,
}

/// Parameter names are compared without the reference sigil.
pub fn bare_name(name: &str) -> &str {
    name.strip_prefix('$').unwrap_or(name)
}

impl ParameterDeclarations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Declare a parameter, shadowing any outer declaration of the same name.
    pub fn declare(&mut self, name: &str, parameter_type: ParameterType, value: impl Into<String>) {
        let parameter = Parameter {
            name: bare_name(name).to_string(),
            parameter_type,
            value: value.into(),
        };
        debug!(
            "Declared parameter {} ({}) = {}",
            parameter.name, parameter.parameter_type, parameter.value
        );
        self.stack.push(parameter);
    }

    /// Value of the innermost declaration of `name` (with or without `$`).
    pub fn lookup(&self, name: &str) -> Option<&str> {
        let name = bare_name(name);
        self.stack
            .iter()
            .rev()
            .find(|p| p.name == name)
            .map(|p| p.value.as_str())
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint(self.stack.len())
    }

    /// Drop every declaration made after `checkpoint` was taken.
    pub fn restore(&mut self, checkpoint: Checkpoint) {
        if checkpoint.0 < self.stack.len() {
            debug!(
                "Restoring parameter declarations: {} -> {}",
                self.stack.len(),
                checkpoint.0
            );
            self.stack.truncate(checkpoint.0);
        }
    }

    /// Innermost-first view, mainly for diagnostics.
    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.stack.iter().rev()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_innermost_declaration_wins() {
        let mut params = ParameterDeclarations::new();
        params.declare("$Speed", ParameterType::Double, "10");
        params.declare("Speed", ParameterType::Double, "20");
        assert_eq!(params.lookup("$Speed"), Some("20"));
        assert_eq!(params.lookup("Speed"), Some("20"));
        assert_eq!(params.lookup("$Missing"), None);
    }

    #[test]
    fn test_parameter_type_parsing() {
        assert_eq!("double".parse::<ParameterType>(), Ok(ParameterType::Double));
        assert!("vector".parse::<ParameterType>().is_err());
    }

    proptest! {
        #[test]
        fn prop_lookup_returns_innermost(values in proptest::collection::vec(0u32..1000, 1..20)) {
            let mut params = ParameterDeclarations::new();
            for v in &values {
                params.declare("X", ParameterType::Integer, v.to_string());
            }
            let last = values.last().unwrap().to_string();
            prop_assert_eq!(params.lookup("$X"), Some(last.as_str()));
        }

        #[test]
        fn prop_restore_returns_to_checkpoint(
            outer in proptest::collection::vec("[a-z]{1,4}", 0..10),
            inner in proptest::collection::vec("[a-z]{1,4}", 0..10),
        ) {
            let mut params = ParameterDeclarations::new();
            for name in &outer {
                params.declare(name, ParameterType::String, "outer");
            }
            let before = params.len();
            let checkpoint = params.checkpoint();
            for name in &inner {
                params.declare(name, ParameterType::String, "inner");
            }
            params.restore(checkpoint);
            prop_assert_eq!(params.len(), before);
            for name in &outer {
                prop_assert_eq!(params.lookup(name), Some("outer"));
            }
        }
    }
}
