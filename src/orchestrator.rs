//! A request's workspace is removed when it is dropped; on success it travels inside
//! the returned [`Artifact`] until the bytes have been handed over.

use crate::config::Config;
use crate::engine::Engine;
use crate::error::{ConvertError, Result};
use crate::job::{Job, JobOptions, JobResult};
use crate::registry::EngineRegistry;
use crate::router::{self, Operation, normalize_format};
use crate::util::{
    bound_diagnostic, expand_tilde, extension_of, normalize_angle, normalize_page_order,
};
use bytes::Bytes;
use futures::Stream;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

const IMAGE_FORMATS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Debug)]
pub struct Workspace {
    id: Uuid,
    dir: PathBuf,
}

impl Workspace {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn stage_bytes(&self, name: &str, data: &[u8]) -> Result<PathBuf> {
        let path = self.dir.join(sanitize_file_name(name));
        tokio::fs::write(&path, data).await?;
        debug!(job_id = %self.id, path = %path.display(), bytes = data.len(), "staged input");
        Ok(path)
    }

    pub async fn stage_file(&self, src: &Path) -> Result<PathBuf> {
        let name = src
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let path = self.dir.join(sanitize_file_name(&name));
        tokio::fs::copy(src, &path).await?;
        debug!(job_id = %self.id, path = %path.display(), "staged input");
        Ok(path)
    }

    fn contains(&self, path: &Path) -> bool {
        path.starts_with(&self.dir) && path != self.dir
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        // Removal stays synchronous so the directory is gone once the owner is; on a
        // multi-thread runtime the worker hands its other tasks off while it blocks.
        let multi_thread = Handle::try_current()
            .map(|h| h.runtime_flavor() == RuntimeFlavor::MultiThread)
            .unwrap_or(false);
        if multi_thread {
            tokio::task::block_in_place(|| remove_workspace(self.id, &self.dir));
        } else {
            remove_workspace(self.id, &self.dir);
        }
    }
}

fn remove_workspace(id: Uuid, dir: &Path) {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => debug!(job_id = %id, "workspace removed"),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => {
            warn!(job_id = %id, dir = %dir.display(), "failed to remove workspace: {err}")
        }
    }
}

fn sanitize_file_name(name: &str) -> String {
    let base = Path::new(name.trim())
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "input".to_string()
    } else {
        cleaned.to_string()
    }
}

#[derive(Debug)]
pub struct Artifact {
    path: PathBuf,
    workspace: Workspace,
}

impl Artifact {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn job_id(&self) -> Uuid {
        self.workspace.id
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string())
    }

    pub fn format(&self) -> String {
        extension_of(&self.path)
    }

    /// Open the artifact for streaming. The workspace lives as long as the stream.
    pub async fn into_stream(self) -> Result<ArtifactStream> {
        let file = tokio::fs::File::open(&self.path).await?;
        Ok(ArtifactStream {
            inner: ReaderStream::new(file),
            _workspace: self.workspace,
        })
    }

    pub async fn save_to(self, dest: &Path) -> Result<u64> {
        if let Some(parent) = dest.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let written = tokio::fs::copy(&self.path, dest).await?;
        info!(job_id = %self.workspace.id, dest = %dest.display(), bytes = written, "artifact saved");
        Ok(written)
    }
}

pub struct ArtifactStream {
    inner: ReaderStream<tokio::fs::File>,
    _workspace: Workspace,
}

impl Stream for ArtifactStream {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

pub struct Orchestrator {
    registry: Arc<EngineRegistry>,
    work_root: PathBuf,
    max_diagnostic_bytes: usize,
}

impl Orchestrator {
    pub fn new(registry: Arc<EngineRegistry>, cfg: &Config) -> Self {
        Self {
            registry,
            work_root: expand_tilde(&cfg.paths.work_dir),
            max_diagnostic_bytes: cfg.limits.max_diagnostic_bytes,
        }
    }

    pub fn registry(&self) -> &EngineRegistry {
        &self.registry
    }

    pub async fn workspace(&self) -> Result<Workspace> {
        let id = Uuid::new_v4();
        tokio::fs::create_dir_all(&self.work_root).await?;
        let root = tokio::fs::canonicalize(&self.work_root).await?;
        let dir = root.join(id.to_string());
        tokio::fs::create_dir(&dir).await?;
        debug!(job_id = %id, dir = %dir.display(), "workspace created");
        Ok(Workspace { id, dir })
    }

    /// An empty `from` is taken from the input's extension.
    pub async fn convert(
        &self,
        workspace: Workspace,
        input: &Path,
        from: &str,
        to: &str,
        options: JobOptions,
    ) -> Result<Artifact> {
        let from = match normalize_format(from) {
            f if f.is_empty() => extension_of(input),
            f => f,
        };
        let to = normalize_format(to);
        let Some(engine) = router::route(&from, &to) else {
            info!(job_id = %workspace.id, "unsupported conversion {from} -> {to}");
            return Err(ConvertError::Unsupported { from, to });
        };
        self.dispatch(workspace, engine, input, &from, &to, options)
            .await
    }

    pub async fn run_operation(
        &self,
        workspace: Workspace,
        input: &Path,
        op: Operation,
        mut options: JobOptions,
    ) -> Result<Artifact> {
        match op {
            Operation::Rotate => {
                let raw = options.get("angle").map(str::to_string);
                let angle = normalize_angle(raw.as_deref()).ok_or_else(|| {
                    ConvertError::InvalidRequest(format!(
                        "angle must be a multiple of 90, got {}",
                        raw.unwrap_or_default()
                    ))
                })?;
                options.insert("angle", angle.to_string());
            }
            Operation::Reorder => {
                let raw = options.get("order").unwrap_or_default().to_string();
                if raw.trim().is_empty() {
                    return Err(ConvertError::InvalidRequest(
                        "order is required".to_string(),
                    ));
                }
                let order = normalize_page_order(&raw).ok_or_else(|| {
                    ConvertError::InvalidRequest(format!("invalid page order: {raw}"))
                })?;
                options.insert("order", order);
            }
            _ => {}
        }
        options.insert("operation", op.as_str());

        let engine = router::route_operation(op);
        self.dispatch(workspace, engine, input, "", op.target_format(), options)
            .await
    }

    pub async fn merge(&self, workspace: Workspace, inputs: &[PathBuf]) -> Result<Artifact> {
        if inputs.len() < 2 {
            return Err(ConvertError::InvalidRequest(
                "at least 2 files are required to merge".to_string(),
            ));
        }
        if let Some(stray) = inputs.iter().find(|p| !workspace.contains(p)) {
            return Err(ConvertError::InvalidRequest(format!(
                "input {} is not staged in the workspace",
                stray.display()
            )));
        }

        let output = workspace.dir.join("merged.pdf");
        let has_images = inputs
            .iter()
            .any(|p| IMAGE_FORMATS.contains(&extension_of(p).as_str()));

        info!(
            job_id = %workspace.id,
            inputs = inputs.len(),
            images = has_images,
            "merging"
        );
        let outcome = if has_images {
            self.registry.images_to_pdf(inputs, &output).await
        } else {
            self.registry.merge_pdfs(inputs, &output).await
        };
        if let Err(err) = outcome {
            warn!(job_id = %workspace.id, "merge failed: {err}");
            return Err(ConvertError::Engine(bound_diagnostic(
                &err.to_string(),
                self.max_diagnostic_bytes,
            )));
        }
        if !tokio::fs::try_exists(&output).await? {
            return Err(ConvertError::Engine(format!(
                "merge reported success but {} was not written",
                output.display()
            )));
        }
        Ok(Artifact {
            path: output,
            workspace,
        })
    }

    async fn dispatch(
        &self,
        workspace: Workspace,
        engine: Engine,
        input: &Path,
        from: &str,
        to: &str,
        options: JobOptions,
    ) -> Result<Artifact> {
        if !workspace.contains(input) {
            return Err(ConvertError::InvalidRequest(format!(
                "input {} is not staged in the workspace",
                input.display()
            )));
        }
        let pool = self
            .registry
            .pool(engine)
            .ok_or(ConvertError::PoolClosed(engine))?;

        let id = workspace.id;
        let (job, result) = Job::new(
            id,
            input.to_path_buf(),
            from,
            to,
            workspace.dir.clone(),
            options,
        );
        debug!(job_id = %id, %engine, queued = pool.queued(), "enqueueing");
        pool.enqueue(job).await?;

        match result.await {
            Ok(JobResult::Success { output }) => Ok(Artifact {
                path: output,
                workspace,
            }),
            Ok(JobResult::Failure { error }) => Err(ConvertError::Engine(error)),
            Err(_) => {
                warn!(job_id = %id, %engine, "result channel dropped without a result");
                Err(ConvertError::ResultLost(id))
            }
        }
    }
}
