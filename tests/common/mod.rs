#![allow(dead_code)]

use async_trait::async_trait;
use docmill::config::Config;
use docmill::engine::{BatchConverter, ConvertRequest, Converter, Engine, ToolError};
use docmill::orchestrator::Orchestrator;
use docmill::registry::{EngineRegistry, Toolset};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Copies the input to `result.<target>` and leaves the output for the registry to find.
pub struct CopyInput;

#[async_trait]
impl Converter for CopyInput {
    async fn convert(&self, req: &ConvertRequest<'_>) -> Result<Option<PathBuf>, ToolError> {
        let out = req.work_dir.join(format!("result.{}", req.target_format));
        tokio::fs::copy(req.input, &out).await?;
        Ok(None)
    }
}

/// Writes the options it was handed, as `key=value` lines, to a named output.
pub struct EchoOptions;

#[async_trait]
impl Converter for EchoOptions {
    async fn convert(&self, req: &ConvertRequest<'_>) -> Result<Option<PathBuf>, ToolError> {
        let mut lines = Vec::new();
        for key in ["operation", "angle", "order"] {
            if let Some(value) = req.options.get(key) {
                lines.push(format!("{key}={value}"));
            }
        }
        let out = req.work_dir.join(format!("echo.{}", req.target_format));
        tokio::fs::write(&out, lines.join("\n")).await?;
        Ok(Some(out))
    }
}

/// A tool that prints a diagnostic and exits with status 1.
pub struct ExitsWithOne;

#[async_trait]
impl Converter for ExitsWithOne {
    async fn convert(&self, _req: &ConvertRequest<'_>) -> Result<Option<PathBuf>, ToolError> {
        docmill::engine::command::run_tool("sh", ["-c", "echo 'boom: corrupt input' >&2; exit 1"])
            .await?;
        Ok(None)
    }
}

/// Claims success without writing anything.
pub struct WritesNothing;

#[async_trait]
impl Converter for WritesNothing {
    async fn convert(&self, _req: &ConvertRequest<'_>) -> Result<Option<PathBuf>, ToolError> {
        Ok(None)
    }
}

/// Names an output that lives outside the job's work dir.
pub struct NamesOutside(pub PathBuf);

#[async_trait]
impl Converter for NamesOutside {
    async fn convert(&self, _req: &ConvertRequest<'_>) -> Result<Option<PathBuf>, ToolError> {
        tokio::fs::write(&self.0, b"stray").await?;
        Ok(Some(self.0.clone()))
    }
}

pub struct Sleeps(pub Duration);

#[async_trait]
impl Converter for Sleeps {
    async fn convert(&self, req: &ConvertRequest<'_>) -> Result<Option<PathBuf>, ToolError> {
        tokio::time::sleep(self.0).await;
        let out = req.work_dir.join(format!("late.{}", req.target_format));
        tokio::fs::write(&out, b"late").await?;
        Ok(Some(out))
    }
}

pub struct Panics;

#[async_trait]
impl Converter for Panics {
    async fn convert(&self, _req: &ConvertRequest<'_>) -> Result<Option<PathBuf>, ToolError> {
        panic!("converter bug");
    }
}

/// Panics on inputs whose name contains the marker and copies everything else.
pub struct PanicsOn(pub &'static str);

#[async_trait]
impl Converter for PanicsOn {
    async fn convert(&self, req: &ConvertRequest<'_>) -> Result<Option<PathBuf>, ToolError> {
        let name = req.input.file_name().unwrap_or_default().to_string_lossy();
        if name.contains(self.0) {
            panic!("converter bug");
        }
        CopyInput.convert(req).await
    }
}

/// Writes `<label>:<input count>` to the output.
pub struct CountInputs(pub &'static str);

#[async_trait]
impl BatchConverter for CountInputs {
    async fn convert_many(&self, inputs: &[PathBuf], output: &Path) -> Result<(), ToolError> {
        tokio::fs::write(output, format!("{}:{}", self.0, inputs.len())).await?;
        Ok(())
    }
}

/// Fails the way a tool does when it dumps a huge log before exiting.
pub struct FailsLoudly;

#[async_trait]
impl BatchConverter for FailsLoudly {
    async fn convert_many(&self, _inputs: &[PathBuf], _output: &Path) -> Result<(), ToolError> {
        Err(ToolError::Failed {
            program: "pdfunite".to_string(),
            status: "exit status: 1".to_string(),
            output: "x".repeat(100_000),
        })
    }
}

pub struct BatchWritesNothing;

#[async_trait]
impl BatchConverter for BatchWritesNothing {
    async fn convert_many(&self, _inputs: &[PathBuf], _output: &Path) -> Result<(), ToolError> {
        Ok(())
    }
}

pub struct BatchSleeps(pub Duration);

#[async_trait]
impl BatchConverter for BatchSleeps {
    async fn convert_many(&self, _inputs: &[PathBuf], output: &Path) -> Result<(), ToolError> {
        tokio::time::sleep(self.0).await;
        tokio::fs::write(output, b"late").await?;
        Ok(())
    }
}

pub fn test_config(root: &Path) -> Config {
    let mut cfg = Config::default();
    cfg.paths.work_dir = root.join("work").display().to_string();
    cfg.pools.workers_per_engine = 2;
    cfg.pools.batch_permits = 2;
    cfg
}

/// Every engine gets `CopyInput` unless overridden afterwards.
pub fn fake_toolset(cfg: &Config) -> Toolset {
    let mut toolset = Toolset::from_config(&cfg.tools)
        .with_pdf_merger(CountInputs("pdf"))
        .with_image_binder(CountInputs("images"));
    for engine in Engine::ALL {
        toolset = toolset.with_converter(engine, CopyInput);
    }
    toolset
}

pub struct Harness {
    pub orchestrator: Arc<Orchestrator>,
    pub registry: Arc<EngineRegistry>,
    pub shutdown: CancellationToken,
    pub work_root: PathBuf,
}

impl Harness {
    pub fn new(cfg: &Config, toolset: Toolset) -> Self {
        let registry = Arc::new(EngineRegistry::with_toolset(cfg, toolset));
        let shutdown = CancellationToken::new();
        registry.start(&shutdown);
        let orchestrator = Arc::new(Orchestrator::new(registry.clone(), cfg));
        Self {
            orchestrator,
            registry,
            shutdown,
            work_root: PathBuf::from(&cfg.paths.work_dir),
        }
    }

    /// Workspaces currently on disk.
    pub fn live_workspaces(&self) -> usize {
        match std::fs::read_dir(&self.work_root) {
            Ok(entries) => entries.filter_map(Result::ok).count(),
            Err(_) => 0,
        }
    }

    pub async fn stop(self) {
        self.shutdown.cancel();
        self.registry.drain().await;
    }
}
