//! Syntax validation of generated code.
//!
//! Validation is check-only: the code is parsed and compiled by an external
//! interpreter, and its imports are resolved without being executed. A code
//! sample that fails the check is a `passed: false` result, never an error;
//! errors are reserved for an interpreter that cannot be started.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::{ExerciseError, ExerciseResult};

use super::types::ValidationResult;

/// Default time allowed for one check.
pub const DEFAULT_SYNTAX_TIMEOUT: Duration = Duration::from_secs(20);

/// Python program run by [`PythonSyntaxValidator`]. Reads the code from stdin,
/// exits 1 on a syntax error and 2 on an unresolvable import.
const PYTHON_CHECK_SCRIPT: &str = r#"
import ast
import importlib.util
import sys

source = sys.stdin.read()
try:
    tree = ast.parse(source, "<exercise>")
    compile(tree, "<exercise>", "exec")
except (SyntaxError, ValueError) as exc:
    line = getattr(exc, "lineno", None)
    print(f"{type(exc).__name__}: {exc} (line {line})", file=sys.stderr)
    sys.exit(1)

if "--imports" in sys.argv:
    missing = set()
    for node in ast.walk(tree):
        if isinstance(node, ast.Import):
            names = [alias.name for alias in node.names]
        elif isinstance(node, ast.ImportFrom) and node.level == 0 and node.module:
            names = [node.module]
        else:
            continue
        for name in names:
            root = name.split(".")[0]
            try:
                found = importlib.util.find_spec(root) is not None
            except (ImportError, ValueError):
                found = False
            if not found:
                missing.add(root)
    if missing:
        print("ModuleNotFoundError: " + ", ".join(sorted(missing)), file=sys.stderr)
        sys.exit(2)
"#;

/// Checks generated code without running it.
#[async_trait]
pub trait SyntaxValidator: Send + Sync {
    /// Validates `code` with `workdir` as the working directory, where any
    /// artifact the code reads has already been written.
    async fn validate(&self, code: &str, workdir: &Path) -> ExerciseResult<ValidationResult>;
}

/// Validator backed by a Python interpreter.
#[derive(Debug, Clone)]
pub struct PythonSyntaxValidator {
    interpreter: PathBuf,
    timeout: Duration,
    check_imports: bool,
}

impl Default for PythonSyntaxValidator {
    fn default() -> Self {
        Self {
            interpreter: PathBuf::from("python3"),
            timeout: DEFAULT_SYNTAX_TIMEOUT,
            check_imports: true,
        }
    }
}

impl PythonSyntaxValidator {
    pub fn new(interpreter: impl Into<PathBuf>) -> Self {
        Self {
            interpreter: interpreter.into(),
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Whether unresolvable imports fail the check (default: true).
    pub fn with_import_check(mut self, check_imports: bool) -> Self {
        self.check_imports = check_imports;
        self
    }

    pub fn interpreter(&self) -> &Path {
        &self.interpreter
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Whether the interpreter can be started at all.
    pub async fn is_available(&self) -> bool {
        Command::new(&self.interpreter)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    fn command(&self, workdir: &Path) -> Command {
        let mut cmd = Command::new(&self.interpreter);
        cmd.arg("-B").arg("-c").arg(PYTHON_CHECK_SCRIPT);
        if self.check_imports {
            cmd.arg("--imports");
        }
        cmd.current_dir(workdir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl SyntaxValidator for PythonSyntaxValidator {
    async fn validate(&self, code: &str, workdir: &Path) -> ExerciseResult<ValidationResult> {
        let mut child = self.command(workdir).spawn().map_err(|e| {
            ExerciseError::ValidationTool(format!(
                "Failed to spawn {}: {}",
                self.interpreter.display(),
                e
            ))
        })?;

        let mut stdin = child.stdin.take();
        let check = async move {
            if let Some(ref mut stdin) = stdin {
                stdin.write_all(code.as_bytes()).await?;
                stdin.shutdown().await?;
            }
            drop(stdin);
            child.wait_with_output().await
        };

        match tokio::time::timeout(self.timeout, check).await {
            Ok(Ok(output)) if output.status.success() => Ok(ValidationResult::pass()),
            Ok(Ok(output)) => {
                let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                let diagnostic = if stderr.is_empty() {
                    format!("checker exited with {}", output.status)
                } else {
                    stderr
                };
                Ok(ValidationResult::fail(diagnostic))
            }
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => Ok(ValidationResult::fail(
                "checker closed its input before reading the code",
            )),
            Ok(Err(e)) => Err(ExerciseError::ValidationTool(format!("Process error: {}", e))),
            Err(_) => {
                tracing::warn!(timeout_secs = self.timeout.as_secs_f64(), "Syntax check timed out");
                Ok(ValidationResult::fail(format!(
                    "syntax check timed out after {:?}",
                    self.timeout
                )))
            }
        }
    }
}
