use std::collections::HashMap;
use std::hash::Hash;

use crate::types::ValidationResult;

pub fn _chain<T>(
    result: ValidationResult<T>,
    warnings: &mut Vec<String>,
    errors: &mut Vec<String>,
) {
    match result {
        ValidationResult::Valid(_) => {}
        ValidationResult::Warnings(_, warns) => {
            warnings.extend(warns);
        }
        ValidationResult::Invalid(warns, errs) => {
            warnings.extend(warns);
            errors.extend(errs);
        }
    }
}

pub fn _return(warnings: Vec<String>, errors: Vec<String>) -> ValidationResult {
    if !errors.is_empty() {
        ValidationResult::Invalid(warnings, errors)
    } else if !warnings.is_empty() {
        ValidationResult::Warnings((), warnings)
    } else {
        ValidationResult::Valid(())
    }
}

/// Report every key that occurs more than once, in first-seen order.
pub fn find_duplicates<K, I>(keys: I) -> Vec<K>
where
    K: Eq + Hash + Clone,
    I: IntoIterator<Item = K>,
{
    let mut counts: HashMap<K, usize> = HashMap::new();
    let mut order = Vec::new();
    for key in keys {
        let count = counts.entry(key.clone()).or_insert(0);
        if *count == 1 {
            order.push(key);
        }
        *count += 1;
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_return_prefers_errors() {
        let result = _return(vec!["w".to_string()], vec!["e".to_string()]);
        assert!(!result.is_valid());
        assert_eq!(result.errors(), ["e".to_string()]);
    }

    #[test]
    fn test_find_duplicates() {
        let dups = find_duplicates(vec!["a", "b", "a", "c", "b", "a"]);
        assert_eq!(dups, vec!["a", "b"]);
    }
}
