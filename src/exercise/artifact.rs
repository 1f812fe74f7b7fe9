//! Synthetic data files referenced by generated code.
//!
//! Each attempt gets its own scratch directory; the materializer writes the
//! CSV artifact there so the syntax check runs against the current attempt's
//! data and nothing leaks between attempts or concurrent requests.

use std::path::{Component, Path, PathBuf};

use tempfile::TempDir;

use crate::error::{ExerciseError, ExerciseResult};

/// Writes artifacts into a single working directory.
#[derive(Debug, Clone)]
pub struct ArtifactMaterializer {
    dir: PathBuf,
}

impl ArtifactMaterializer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes `csv_content` verbatim to `<dir>/<csv_name>`, replacing any
    /// earlier file with that name.
    ///
    /// Returns `Ok(None)` without touching the filesystem when no name is given.
    /// A name without content produces an empty file, so code that opens it
    /// still passes an import-level check.
    pub async fn materialize(
        &self,
        csv_name: Option<&str>,
        csv_content: Option<&str>,
    ) -> ExerciseResult<Option<PathBuf>> {
        let Some(name) = csv_name.map(str::trim).filter(|n| !n.is_empty()) else {
            return Ok(None);
        };

        validate_artifact_name(name)?;

        let path = self.dir.join(name);
        tokio::fs::write(&path, csv_content.unwrap_or_default())
            .await
            .map_err(|e| ExerciseError::ArtifactWrite {
                name: name.to_string(),
                reason: e.to_string(),
            })?;

        tracing::debug!(path = %path.display(), "Artifact written");
        Ok(Some(path))
    }
}

/// Artifact names must be a single relative path component so the file stays
/// inside the attempt's directory.
fn validate_artifact_name(name: &str) -> ExerciseResult<()> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !name.contains(['/', '\\']) => Ok(()),
        _ => Err(ExerciseError::ArtifactWrite {
            name: name.to_string(),
            reason: "artifact name must be a plain file name".to_string(),
        }),
    }
}

/// Scratch directory owned by one attempt; removed on drop.
#[derive(Debug)]
pub struct AttemptWorkspace {
    dir: TempDir,
}

impl AttemptWorkspace {
    /// Creates a fresh, uniquely named directory under `root`, or under the
    /// system temp directory when `root` is `None`.
    pub fn create(root: Option<&Path>) -> ExerciseResult<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("exercise-attempt-");
        let dir = match root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(|e| ExerciseError::ArtifactWrite {
            name: "<workspace>".to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn materializer(&self) -> ArtifactMaterializer {
        ArtifactMaterializer::new(self.dir.path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_no_name_is_noop() {
        let dir = TempDir::new().expect("tempdir");
        let materializer = ArtifactMaterializer::new(dir.path());

        assert_eq!(materializer.materialize(None, Some("a,b")).await.expect("ok"), None);
        assert_eq!(materializer.materialize(Some("  "), Some("a,b")).await.expect("ok"), None);
        assert_eq!(std::fs::read_dir(dir.path()).expect("read_dir").count(), 0);
    }

    #[tokio::test]
    async fn test_writes_verbatim() {
        let dir = TempDir::new().expect("tempdir");
        let materializer = ArtifactMaterializer::new(dir.path());

        let path = materializer
            .materialize(Some("scores.csv"), Some("name,score\nann,3\n"))
            .await
            .expect("write")
            .expect("path");

        assert_eq!(path, dir.path().join("scores.csv"));
        assert_eq!(std::fs::read_to_string(&path).expect("read"), "name,score\nann,3\n");
    }

    #[tokio::test]
    async fn test_padded_name_is_trimmed_on_write() {
        let dir = TempDir::new().expect("tempdir");
        let materializer = ArtifactMaterializer::new(dir.path());

        let path = materializer
            .materialize(Some(" data.csv \n"), Some("a,b"))
            .await
            .expect("write")
            .expect("path");

        assert_eq!(path, dir.path().join("data.csv"));
    }

    #[tokio::test]
    async fn test_second_write_overwrites_first() {
        let dir = TempDir::new().expect("tempdir");
        let materializer = ArtifactMaterializer::new(dir.path());

        materializer
            .materialize(Some("data.csv"), Some("first,attempt\n1,2\n3,4\n"))
            .await
            .expect("first write");
        let path = materializer
            .materialize(Some("data.csv"), Some("second\n"))
            .await
            .expect("second write")
            .expect("path");

        assert_eq!(std::fs::read_to_string(path).expect("read"), "second\n");
    }

    #[tokio::test]
    async fn test_name_without_content_creates_empty_file() {
        let dir = TempDir::new().expect("tempdir");
        let materializer = ArtifactMaterializer::new(dir.path());

        let path = materializer
            .materialize(Some("empty.csv"), None)
            .await
            .expect("write")
            .expect("path");
        assert_eq!(std::fs::read_to_string(path).expect("read"), "");
    }

    #[tokio::test]
    async fn test_rejects_escaping_names() {
        let dir = TempDir::new().expect("tempdir");
        let materializer = ArtifactMaterializer::new(dir.path());

        for name in ["../evil.csv", "/etc/passwd", "sub/dir.csv", "..", "."] {
            let err = materializer
                .materialize(Some(name), Some("x"))
                .await
                .expect_err(name);
            assert!(matches!(err, ExerciseError::ArtifactWrite { .. }), "{}", name);
        }
    }

    #[tokio::test]
    async fn test_missing_directory_is_write_error() {
        let dir = TempDir::new().expect("tempdir");
        let materializer = ArtifactMaterializer::new(dir.path().join("gone"));

        let err = materializer
            .materialize(Some("data.csv"), Some("x"))
            .await
            .expect_err("directory does not exist");
        assert!(matches!(err, ExerciseError::ArtifactWrite { .. }));
    }

    #[test]
    fn test_workspaces_are_distinct_and_cleaned_up() {
        let root = TempDir::new().expect("tempdir");
        let first = AttemptWorkspace::create(Some(root.path())).expect("first");
        let second = AttemptWorkspace::create(Some(root.path())).expect("second");

        assert_ne!(first.path(), second.path());
        assert_eq!(first.materializer().dir(), first.path());

        let first_path = first.path().to_path_buf();
        drop(first);
        assert!(!first_path.exists());
        assert!(second.path().exists());
    }
}
