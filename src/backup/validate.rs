//! Validation functions for plan and command-line values.
//!
//! Host keys and target names end up inside artifact file names, commands end
//! up on a remote shell, so both are checked before any host is contacted.

use sanitize_filename::{is_sanitized, sanitize};
use validator::ValidationError;

use std::path::Path;

pub fn validate_dir_exist<P: AsRef<Path>>(dir: P) -> Result<(), ValidationError> {
    let dir = dir.as_ref();
    if dir.exists() {
        if !dir.is_dir() {
            return Err(ValidationError::new("InvalidDirectory")
                .with_message(format!("{:?} is not a directory", dir).into()));
        }
    } else {
        return Err(ValidationError::new("InvalidDirectory")
            .with_message(format!("{:?} not found", dir).into()));
    }

    Ok(())
}

pub fn validate_writable_dir<P: AsRef<Path>>(dir: P) -> Result<(), ValidationError> {
    let dir = dir.as_ref();
    validate_dir_exist(dir)?;
    let md = std::fs::metadata(dir).map_err(|e| {
        ValidationError::new("InvalidDirectory")
            .with_message(format!("cannot access metadata for {:?}: {}", dir, e).into())
    })?;
    if md.permissions().readonly() {
        Err(ValidationError::new("InvalidDirectory")
            .with_message(format!("cannot write to dir {:?}", dir).into()))
    } else {
        Ok(())
    }
}

/// The name must survive as one component of an artifact file name once `/`
/// has been replaced by `-`.
pub fn validate_artifact_component<S: AsRef<str>>(name: S) -> Result<(), ValidationError> {
    let name = name.as_ref();
    if name.trim().is_empty() {
        return Err(ValidationError::new("InvalidName").with_message("name is empty".into()));
    }
    let component = name.trim_start_matches('/').replace('/', "-");
    if !is_sanitized(&component) {
        return Err(ValidationError::new("InvalidName").with_message(
            format!(
                "{:?} is not usable in a file name, try sanitizing like {:?}",
                name,
                sanitize(&component)
            )
            .into(),
        ));
    }

    Ok(())
}

pub fn validate_argv(argv: &[String]) -> Result<(), ValidationError> {
    match argv.first() {
        None => Err(ValidationError::new("EmptyCommand").with_message("command is empty".into())),
        Some(program) if program.trim().is_empty() => Err(ValidationError::new("EmptyCommand")
            .with_message("command program is blank".into())),
        Some(_) => Ok(()),
    }
}

pub fn validate_positive_days(days: f64) -> Result<(), ValidationError> {
    if days.is_finite() && days > 0.0 {
        Ok(())
    } else {
        Err(ValidationError::new("InvalidWindow")
            .with_message(format!("days must be a positive number, got {days}").into()))
    }
}
