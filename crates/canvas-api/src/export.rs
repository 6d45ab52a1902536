use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use async_trait::async_trait;
use canvas_types::models::ExportFormat;
use tracing::info;

use crate::error::ApiError;

/// Renders a URL to a static artifact on disk.
#[async_trait]
pub trait BoardRenderer: Send + Sync {
    async fn render(&self, url: &str, format: ExportFormat, output: &Path) -> anyhow::Result<()>;
}

/// Headless Chromium driven through its command-line printing and
/// screenshot modes.
pub struct ChromiumRenderer {
    binary: String,
}

impl ChromiumRenderer {
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }

    fn args(url: &str, format: ExportFormat, output: &Path) -> Vec<String> {
        let mut args = vec![
            "--headless".to_string(),
            "--disable-gpu".to_string(),
            "--no-sandbox".to_string(),
            "--hide-scrollbars".to_string(),
            "--window-size=1400,900".to_string(),
            // Settle delay for client-side layout before capture
            "--virtual-time-budget=2000".to_string(),
        ];
        match format {
            ExportFormat::Pdf => {
                args.push("--no-pdf-header-footer".to_string());
                args.push(format!("--print-to-pdf={}", output.display()));
            }
            ExportFormat::Png => args.push(format!("--screenshot={}", output.display())),
        }
        args.push(url.to_string());
        args
    }
}

#[async_trait]
impl BoardRenderer for ChromiumRenderer {
    async fn render(&self, url: &str, format: ExportFormat, output: &Path) -> anyhow::Result<()> {
        let result = tokio::process::Command::new(&self.binary)
            .args(Self::args(url, format, output))
            .output()
            .await
            .with_context(|| format!("failed to launch {}", self.binary))?;

        if !result.status.success() {
            bail!(
                "{} exited with {}: {}",
                self.binary,
                result.status,
                String::from_utf8_lossy(&result.stderr).trim()
            );
        }
        if !output.is_file() {
            bail!("{} produced no output at {}", self.binary, output.display());
        }
        Ok(())
    }
}

/// Turns a share into a file under the export work area, named
/// `export_{share_id}.{ext}`.
pub struct Exporter {
    renderer: Arc<dyn BoardRenderer>,
    export_dir: PathBuf,
    public_url: String,
}

impl Exporter {
    pub fn new(renderer: Arc<dyn BoardRenderer>, export_dir: impl Into<PathBuf>, public_url: impl Into<String>) -> Self {
        Self {
            renderer,
            export_dir: export_dir.into(),
            public_url: public_url.into(),
        }
    }

    pub fn share_url(&self, share_id: &str) -> String {
        format!("{}/s/{}", self.public_url.trim_end_matches('/'), share_id)
    }

    pub fn output_path(&self, share_id: &str, format: ExportFormat) -> PathBuf {
        self.export_dir
            .join(format!("export_{}.{}", share_id, format.extension()))
    }

    pub async fn export(&self, share_id: &str, format: ExportFormat) -> Result<PathBuf, ApiError> {
        tokio::fs::create_dir_all(&self.export_dir).await?;
        let output = self.output_path(share_id, format);
        let url = self.share_url(share_id);

        info!(share_id = %share_id, format = %format.extension(), "Exporting board");
        self.renderer
            .render(&url, format, &output)
            .await
            .map_err(|e| ApiError::Upstream(format!("export failed: {:#}", e)))?;
        info!(path = %output.display(), "Export finished");

        Ok(output)
    }
}
