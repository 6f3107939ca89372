/// The outcome of a post-parse validation pass.
///
/// Validation never aborts a scenario load: warnings are logged and the run
/// proceeds. `Invalid` is reserved for graphs that cannot be executed at all.
///
/// # Examples
///
/// ```rust
/// use xosc::types::ValidationResult;
///
/// let result: ValidationResult = ValidationResult::Warnings((), vec!["unused event".to_string()]);
/// assert!(result.is_valid());
/// assert_eq!(result.warnings().len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationResult<T = ()> {
    /// Nothing to report.
    Valid(T),
    /// Usable, with diagnostics.
    Warnings(T, Vec<String>),
    /// Not usable: warnings first, then errors.
    Invalid(Vec<String>, Vec<String>),
}

impl<T> ValidationResult<T> {
    /// True for `Valid` and `Warnings`.
    pub fn is_valid(&self) -> bool {
        !matches!(self, ValidationResult::Invalid(_, _))
    }

    /// All warnings, regardless of variant.
    pub fn warnings(&self) -> &[String] {
        match self {
            ValidationResult::Valid(_) => &[],
            ValidationResult::Warnings(_, warnings) => warnings,
            ValidationResult::Invalid(warnings, _) => warnings,
        }
    }

    /// All errors; empty unless `Invalid`.
    pub fn errors(&self) -> &[String] {
        match self {
            ValidationResult::Invalid(_, errors) => errors,
            _ => &[],
        }
    }
}

pub trait Validate {
    fn validate(&self) -> ValidationResult;
}
