//! Error types for scenario document parsing.
//!
//! Every variant here is fatal for the load that produced it: the reader
//! never exposes a partial graph. Recoverable anomalies are logged instead.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// A fatal error raised while reading a scenario or catalog document.
#[derive(Debug, Error)]
pub enum ParseError {
    /// IO error occurred while reading the file.
    #[error("IO error reading file: {0}")]
    Io(#[from] std::io::Error),

    /// XML syntax error (malformed document structure).
    #[error("XML parsing error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("XML attribute error: {0}")]
    Attr(#[from] quick_xml::events::attributes::AttrError),

    #[error("Unexpected end of XML")]
    UnexpectedEof,

    #[error("Unexpected element: expected {expected}, found {found}")]
    UnexpectedElement { expected: String, found: String },

    #[error("Missing required element: {0}")]
    MissingElement(String),

    #[error("Missing required attribute: {0}")]
    MissingAttribute(String),

    /// A `$name` reference with no declaration in scope.
    #[error("Failed to resolve parameter {0}")]
    UnresolvedParameter(String),

    #[error("Failed to find entity {0}")]
    UnknownEntity(String),

    #[error("Invalid value for {field}: '{value}' ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to parse position: {0}")]
    Position(String),

    /// Route and maneuver references have no safe default.
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// Any of the above, annotated with where it happened.
    #[error("{source}{context}")]
    WithContext {
        source: Box<ParseError>,
        context: ErrorContext,
    },
}

impl ParseError {
    /// Attach location context, merging with an existing context if present.
    pub fn in_context(self, context: ErrorContext) -> Self {
        match self {
            ParseError::WithContext {
                source,
                context: inner,
            } => ParseError::WithContext {
                source,
                context: inner.merged_with(context),
            },
            other => ParseError::WithContext {
                source: Box::new(other),
                context,
            },
        }
    }

    /// The underlying error with any context stripped.
    pub fn root(&self) -> &ParseError {
        match self {
            ParseError::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    pub(crate) fn invalid(field: &str, value: &str, reason: impl fmt::Display) -> Self {
        ParseError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Alias for `Result<T, ParseError>`.
pub type ParseResult<T> = Result<T, ParseError>;

/// Context information for error reporting.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ErrorContext {
    /// The file path where the error occurred (if available).
    pub file_path: Option<PathBuf>,
    /// The line number where the error occurred (if available).
    pub line: Option<usize>,
    /// The column number where the error occurred (if available).
    pub column: Option<usize>,
    /// Additional context about what was being parsed.
    pub parsing: Option<String>,
}

impl ErrorContext {
    /// Create a new empty error context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an error context with file path.
    pub fn with_file_path<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            file_path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Create an error context with line number.
    pub fn with_line(line: usize) -> Self {
        Self {
            line: Some(line),
            ..Self::default()
        }
    }

    /// Add parsing context information.
    pub fn with_parsing<S: Into<String>>(mut self, parsing: S) -> Self {
        self.parsing = Some(parsing.into());
        self
    }

    /// Add column information.
    pub fn with_column(mut self, column: usize) -> Self {
        self.column = Some(column);
        self
    }

    /// Fill the gaps in `self` from `outer`. Inner information wins.
    fn merged_with(mut self, outer: ErrorContext) -> Self {
        if self.file_path.is_none() {
            self.file_path = outer.file_path;
        }
        if self.line.is_none() {
            self.line = outer.line;
            self.column = outer.column;
        }
        self.parsing = match (self.parsing, outer.parsing) {
            (Some(inner), Some(outer)) => Some(format!("{}/{}", outer, inner)),
            (inner, outer) => inner.or(outer),
        };
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();

        if let Some(ref path) = self.file_path {
            parts.push(format!(" in file '{}'", path.display()));
        }

        if let Some(line) = self.line {
            if let Some(column) = self.column {
                parts.push(format!(" at line {}, column {}", line, column));
            } else {
                parts.push(format!(" at line {}", line));
            }
        }

        if let Some(ref parsing) = self.parsing {
            parts.push(format!(" while parsing {}", parsing));
        }

        if parts.is_empty() {
            return Ok(());
        }

        write!(f, "{}", parts.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_context_display() {
        let context = ErrorContext::with_file_path("cut_in.xosc")
            .with_parsing("Storyboard/Story");
        let msg = context.to_string();
        assert!(msg.contains("cut_in.xosc"));
        assert!(msg.contains("Storyboard/Story"));
    }

    #[test]
    fn test_in_context_nests_parsing_paths() {
        let err = ParseError::UnknownEntity("Ego".to_string())
            .in_context(ErrorContext::new().with_parsing("Act"))
            .in_context(ErrorContext::with_file_path("a.xosc").with_parsing("Story"));

        assert!(matches!(err.root(), ParseError::UnknownEntity(name) if name == "Ego"));
        let msg = err.to_string();
        assert!(msg.contains("Story/Act"), "{}", msg);
        assert!(msg.contains("a.xosc"), "{}", msg);
    }
}
