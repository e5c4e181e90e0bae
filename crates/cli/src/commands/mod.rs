//! CLI subcommands

pub mod batch;
pub mod health;
pub mod model;
pub mod predict;

use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::path::Path;

/// Read applications from a JSON file holding either an array or an
/// object with an `applications` array
pub fn read_applications(path: &Path) -> Result<Vec<Value>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let value: Value = serde_json::from_str(&content)
        .with_context(|| format!("{} is not valid JSON", path.display()))?;

    match value {
        Value::Array(items) => Ok(items),
        Value::Object(mut object) => match object.remove("applications") {
            Some(Value::Array(items)) => Ok(items),
            _ => bail!("{} has no `applications` array", path.display()),
        },
        _ => bail!("{} must hold a JSON array of applications", path.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn file_with(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_reads_bare_array() {
        let file = file_with(r#"[{"income": 1}, {"income": 2}]"#);
        assert_eq!(read_applications(file.path()).unwrap().len(), 2);
    }

    #[test]
    fn test_reads_wrapped_array() {
        let file = file_with(r#"{"applications": [{"income": 1}]}"#);
        assert_eq!(read_applications(file.path()).unwrap().len(), 1);
    }

    #[test]
    fn test_rejects_scalar() {
        let file = file_with("42");
        assert!(read_applications(file.path()).is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = read_applications(Path::new("/nonexistent/apps.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to read"));
    }
}
