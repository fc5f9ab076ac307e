use thiserror::Error;

/// Errors raised while resolving configuration from the environment
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {variable}: {message}")]
    InvalidValue { variable: String, message: String },

    #[error("failed to read {path} referenced by {variable}: {message}")]
    FileIndirection {
        variable: String,
        path: String,
        message: String,
    },
}

/// Read an environment variable with `_FILE` indirection
///
/// Returns the value of `name` when set. Otherwise, when `<name>_FILE` is
/// set, reads that file and returns its trimmed contents. Returns `None`
/// when neither variable is present.
pub fn read_env_indirect(name: &str) -> Result<Option<String>, ConfigError> {
    if let Ok(value) = std::env::var(name) {
        return Ok(Some(value));
    }

    let file_var = format!("{name}_FILE");
    let Ok(path) = std::env::var(&file_var) else {
        return Ok(None);
    };

    let contents = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileIndirection {
        variable: file_var,
        path,
        message: e.to_string(),
    })?;

    Ok(Some(contents.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn direct_value_is_returned() {
        temp_env::with_var("CANOPY_TEST_DIRECT", Some("value"), || {
            assert_eq!(read_env_indirect("CANOPY_TEST_DIRECT").unwrap(), Some("value".to_string()));
        });
    }

    #[test]
    fn missing_variable_yields_none() {
        temp_env::with_vars_unset(["CANOPY_TEST_MISSING", "CANOPY_TEST_MISSING_FILE"], || {
            assert_eq!(read_env_indirect("CANOPY_TEST_MISSING").unwrap(), None);
        });
    }

    #[test]
    fn file_indirection_reads_and_trims() {
        let mut file = tempfile_path();
        writeln!(file.1, "  secret-from-file  ").unwrap();

        temp_env::with_vars(
            [
                ("CANOPY_TEST_SECRET", None),
                ("CANOPY_TEST_SECRET_FILE", Some(file.0.as_str())),
            ],
            || {
                assert_eq!(
                    read_env_indirect("CANOPY_TEST_SECRET").unwrap(),
                    Some("secret-from-file".to_string())
                );
            },
        );

        std::fs::remove_file(&file.0).ok();
    }

    #[test]
    fn direct_value_wins_over_file() {
        temp_env::with_vars(
            [
                ("CANOPY_TEST_BOTH", Some("direct")),
                ("CANOPY_TEST_BOTH_FILE", Some("/nonexistent/path")),
            ],
            || {
                assert_eq!(read_env_indirect("CANOPY_TEST_BOTH").unwrap(), Some("direct".to_string()));
            },
        );
    }

    #[test]
    fn unreadable_file_is_an_error() {
        temp_env::with_vars(
            [
                ("CANOPY_TEST_BAD", None),
                ("CANOPY_TEST_BAD_FILE", Some("/nonexistent/canopy-secret")),
            ],
            || {
                assert!(read_env_indirect("CANOPY_TEST_BAD").is_err());
            },
        );
    }

    fn tempfile_path() -> (String, std::fs::File) {
        let path = std::env::temp_dir().join(format!("canopy-env-test-{}", std::process::id()));
        let file = std::fs::File::create(&path).unwrap();
        (path.to_string_lossy().into_owned(), file)
    }
}
