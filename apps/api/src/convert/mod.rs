/// Markdown to DOCX upgrade through an external pandoc binary.
use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::pipeline::ports::{ConversionError, FormatConverter};

const SOURCE_FILE: &str = "letter.md";
const TARGET_FILE: &str = "letter.docx";

pub struct PandocConverter {
    program: PathBuf,
}

impl PandocConverter {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl FormatConverter for PandocConverter {
    /// Runs pandoc in a scratch directory. The caller bounds the call with its
    /// own timeout; the child is killed if this future is dropped.
    async fn convert(&self, markdown: &str) -> Result<Bytes, ConversionError> {
        let scratch = tempfile::tempdir()
            .map_err(|e| ConversionError::Failed(format!("scratch dir: {e}")))?;
        let source = scratch.path().join(SOURCE_FILE);
        let target = scratch.path().join(TARGET_FILE);

        tokio::fs::write(&source, markdown)
            .await
            .map_err(|e| ConversionError::Failed(format!("write source: {e}")))?;

        let output = Command::new(&self.program)
            .arg(&source)
            .arg("-o")
            .arg(&target)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound | ErrorKind::PermissionDenied => {
                    ConversionError::Unavailable(format!("{}: {e}", self.program.display()))
                }
                _ => ConversionError::Failed(format!("spawn: {e}")),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(status = %output.status, "pandoc exited unsuccessfully");
            return Err(ConversionError::Failed(format!(
                "pandoc exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let bytes = tokio::fs::read(&target)
            .await
            .map_err(|e| ConversionError::Failed(format!("read output: {e}")))?;
        debug!(size_bytes = bytes.len(), "pandoc conversion finished");
        Ok(Bytes::from(bytes))
    }
}
