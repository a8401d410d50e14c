//! Model definition files.

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::error::PatternError;
use crate::models::ModelDescriptor;

/// Read and parse a model definition file.
///
/// An unreadable file is an I/O error; anything that reads but does not parse
/// is a malformed definition.
pub fn read_model_definition(path: &Path) -> Result<ModelDescriptor, PatternError> {
    let text = fs::read_to_string(path).map_err(|e| PatternError::io(path, e))?;
    debug!(path = %path.display(), bytes = text.len(), "read model definition");
    ModelDescriptor::from_json_str(&text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ModelFamily;

    #[test]
    fn reads_definition_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("iris.json");
        fs::write(
            &path,
            r#"{"family":"TreeModel","target":"species","fields":["petal_length"],
                "model":{"nodes":[{"id":"root","score":"setosa"}]}}"#,
        )
        .unwrap();
        let descriptor = read_model_definition(&path).unwrap();
        assert_eq!(descriptor.family, ModelFamily::Tree);
        assert_eq!(descriptor.target, "species");
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_model_definition(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, PatternError::Io { .. }));
        assert_eq!(err.exit_code(), 2);
    }
}
