//! One worker pool per engine, each wired to that engine's converter.

use crate::config::{Config, Tools};
use crate::engine::tools::{
    Ghostscript, ImageMagick, LibreOffice, PageTools, Pandoc, PdfUnite, Poppler, resolve_soffice,
};
use crate::engine::{BatchConverter, ConvertRequest, Converter, Engine, ToolError};
use crate::job::{Job, JobResult};
use crate::pool::{JobHandler, WorkerPool};
use crate::util::{bound_diagnostic, extension_of};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// The converters behind each engine plus the two batch collaborators.
pub struct Toolset {
    converters: BTreeMap<Engine, Arc<dyn Converter>>,
    pdf_merger: Arc<dyn BatchConverter>,
    image_binder: Arc<dyn BatchConverter>,
}

impl Toolset {
    pub fn from_config(tools: &Tools) -> Self {
        let image = Arc::new(ImageMagick::new(tools.imagemagick.clone()));
        let mut converters: BTreeMap<Engine, Arc<dyn Converter>> = BTreeMap::new();
        converters.insert(
            Engine::OfficeSuite,
            Arc::new(LibreOffice::new(resolve_soffice(tools))),
        );
        converters.insert(
            Engine::Raster,
            Arc::new(Poppler::new(
                &tools.pdftoppm,
                &tools.pdftotext,
                &tools.pdfimages,
            )),
        );
        converters.insert(Engine::Image, image.clone());
        converters.insert(Engine::Markup, Arc::new(Pandoc::new(tools.pandoc.clone())));
        converters.insert(
            Engine::Compression,
            Arc::new(Ghostscript::new(tools.ghostscript.clone())),
        );
        converters.insert(
            Engine::Page,
            Arc::new(PageTools::new(&tools.qpdf, &tools.pdfseparate)),
        );

        Self {
            converters,
            pdf_merger: Arc::new(PdfUnite::new(tools.pdfunite.clone())),
            image_binder: image,
        }
    }

    pub fn with_converter(mut self, engine: Engine, converter: impl Converter + 'static) -> Self {
        self.converters.insert(engine, Arc::new(converter));
        self
    }

    pub fn with_pdf_merger(mut self, merger: impl BatchConverter + 'static) -> Self {
        self.pdf_merger = Arc::new(merger);
        self
    }

    pub fn with_image_binder(mut self, binder: impl BatchConverter + 'static) -> Self {
        self.image_binder = Arc::new(binder);
        self
    }
}

struct EngineHandler {
    engine: Engine,
    converter: Arc<dyn Converter>,
    deadline: Option<Duration>,
    max_diagnostic_bytes: usize,
}

#[async_trait]
impl JobHandler for EngineHandler {
    async fn handle(&self, job: Job) {
        info!(
            job_id = %job.id,
            engine = %self.engine,
            "worker starting: {} -> {}",
            job.source_format,
            job.target_format
        );

        let result = match self.execute(&job).await {
            Ok(output) => {
                info!(job_id = %job.id, engine = %self.engine, output = %output.display(), "worker finished");
                JobResult::Success { output }
            }
            Err(err) => {
                warn!(job_id = %job.id, engine = %self.engine, "worker failed: {err}");
                JobResult::Failure {
                    error: bound_diagnostic(&err.to_string(), self.max_diagnostic_bytes),
                }
            }
        };
        job.complete(result);
    }
}

impl EngineHandler {
    async fn execute(&self, job: &Job) -> Result<PathBuf, ToolError> {
        let req = ConvertRequest {
            input: &job.input_path,
            work_dir: &job.work_dir,
            target_format: &job.target_format,
            options: &job.options,
        };

        let named = match self.deadline {
            Some(limit) => tokio::time::timeout(limit, self.converter.convert(&req))
                .await
                .map_err(|_| ToolError::TimedOut {
                    what: format!("{} engine", self.engine),
                    after: limit,
                })??,
            None => self.converter.convert(&req).await?,
        };

        let output = match named {
            Some(path) => path,
            None => locate_output(&job.work_dir, &job.target_format, &job.input_path).await?,
        };
        ensure_inside(&job.work_dir, &output).await?;
        Ok(output)
    }
}

/// First file directly under `work_dir` (by name) with the target extension that
/// is not the input itself.
async fn locate_output(work_dir: &Path, format: &str, input: &Path) -> Result<PathBuf, ToolError> {
    let input_name = input.file_name();
    let mut matches = Vec::new();
    let mut entries = tokio::fs::read_dir(work_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !entry.file_type().await?.is_file() {
            continue;
        }
        if Some(entry.file_name().as_os_str()) == input_name {
            continue;
        }
        if extension_of(&path) == format {
            matches.push(path);
        }
    }
    matches.sort();
    matches
        .into_iter()
        .next()
        .ok_or_else(|| ToolError::MissingOutput {
            dir: work_dir.to_path_buf(),
            format: format.to_string(),
        })
}

async fn ensure_inside(work_dir: &Path, output: &Path) -> Result<(), ToolError> {
    let root = tokio::fs::canonicalize(work_dir).await?;
    let resolved = tokio::fs::canonicalize(output)
        .await
        .map_err(|_| ToolError::MissingOutput {
            dir: work_dir.to_path_buf(),
            format: extension_of(output),
        })?;
    if resolved.starts_with(&root) && resolved != root {
        Ok(())
    } else {
        Err(ToolError::OutsideWorkDir(output.to_path_buf()))
    }
}

pub struct EngineRegistry {
    pools: BTreeMap<Engine, WorkerPool>,
    pdf_merger: Arc<dyn BatchConverter>,
    image_binder: Arc<dyn BatchConverter>,
    batch_permits: Semaphore,
    batch_deadline: Option<Duration>,
}

impl EngineRegistry {
    pub fn new(cfg: &Config) -> Self {
        Self::with_toolset(cfg, Toolset::from_config(&cfg.tools))
    }

    pub fn with_toolset(cfg: &Config, toolset: Toolset) -> Self {
        let mut pools = BTreeMap::new();
        for (engine, converter) in toolset.converters {
            let handler = EngineHandler {
                engine,
                converter,
                deadline: cfg.timeouts.for_engine(engine),
                max_diagnostic_bytes: cfg.limits.max_diagnostic_bytes,
            };
            let pool = WorkerPool::with_capacity(
                engine,
                cfg.pools.workers_for(engine),
                cfg.pools.queue_capacity,
                handler,
            );
            pools.insert(engine, pool);
        }

        Self {
            pools,
            pdf_merger: toolset.pdf_merger,
            image_binder: toolset.image_binder,
            batch_permits: Semaphore::new(cfg.pools.batch_permits()),
            batch_deadline: cfg.timeouts.for_batch(),
        }
    }

    /// Launch every pool's executors under one shutdown token.
    pub fn start(&self, shutdown: &CancellationToken) {
        for pool in self.pools.values() {
            pool.start(shutdown);
        }
    }

    pub fn pool(&self, engine: Engine) -> Option<&WorkerPool> {
        self.pools.get(&engine)
    }

    /// Merge PDFs directly, outside the pools.
    pub async fn merge_pdfs(&self, inputs: &[PathBuf], output: &Path) -> Result<(), ToolError> {
        self.run_batch(self.pdf_merger.as_ref(), inputs, output, "pdf merge")
            .await
    }

    /// Bind images into one PDF directly, outside the pools.
    pub async fn images_to_pdf(&self, inputs: &[PathBuf], output: &Path) -> Result<(), ToolError> {
        self.run_batch(self.image_binder.as_ref(), inputs, output, "image binding")
            .await
    }

    async fn run_batch(
        &self,
        converter: &dyn BatchConverter,
        inputs: &[PathBuf],
        output: &Path,
        what: &str,
    ) -> Result<(), ToolError> {
        let _permit = self
            .batch_permits
            .acquire()
            .await
            .map_err(|e| ToolError::Io(std::io::Error::other(e)))?;

        match self.batch_deadline {
            Some(limit) => tokio::time::timeout(limit, converter.convert_many(inputs, output))
                .await
                .map_err(|_| ToolError::TimedOut {
                    what: what.to_string(),
                    after: limit,
                })?,
            None => converter.convert_many(inputs, output).await,
        }
    }

    /// Close every queue and wait for all executors to exit.
    pub async fn drain(&self) {
        for pool in self.pools.values() {
            pool.drain().await;
        }
    }
}
