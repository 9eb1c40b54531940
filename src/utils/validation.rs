use crate::utils::error::{GenError, Result};

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

fn invalid(field_name: &str, value: &str, reason: impl Into<String>) -> GenError {
    GenError::InvalidConfigValueError {
        field: field_name.to_string(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(invalid(field_name, path, "Path cannot be empty"));
    }

    if path.contains('\0') {
        return Err(invalid(field_name, path, "Path contains null bytes"));
    }

    Ok(())
}

/// Output files are written next to the service sources, so they must be
/// plain `.go` file names.
pub fn validate_go_file_name(field_name: &str, name: &str) -> Result<()> {
    validate_path(field_name, name)?;

    if name.contains('/') || name.contains('\\') {
        return Err(invalid(field_name, name, "File name must not contain a directory"));
    }

    if !name.ends_with(".go") || name.ends_with("_test.go") {
        return Err(invalid(
            field_name,
            name,
            "File name must end with .go and must not be a test file",
        ));
    }

    Ok(())
}

/// Accepts `import/path.Name` references such as `context.Context`.
pub fn validate_qualified_name(field_name: &str, value: &str) -> Result<()> {
    validate_non_empty_string(field_name, value)?;

    match value.rsplit_once('.') {
        Some((path, name)) if !path.is_empty() && !name.is_empty() && !name.contains('/') => {
            if name.chars().all(|c| c.is_alphanumeric() || c == '_') {
                Ok(())
            } else {
                Err(invalid(field_name, value, "Type name must be an identifier"))
            }
        }
        _ => Err(invalid(
            field_name,
            value,
            "Expected an import path and a type name, e.g. context.Context",
        )),
    }
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(invalid(
            field_name,
            value,
            "Value cannot be empty or whitespace-only",
        ));
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(invalid(
            field_name,
            &value.to_string(),
            format!("Value must be between {} and {}", min, max),
        ));
    }
    Ok(())
}
