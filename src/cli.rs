use crate::{
    config::Config,
    engine::tools::tool_programs,
    job::JobOptions,
    orchestrator::{Artifact, Orchestrator},
    registry::EngineRegistry,
    router::{Operation, supported_pairs},
    util::{ensure_dir, find_program, now_rfc3339},
};
use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "docmill")]
#[command(about = "Document conversion dispatcher (per-engine worker pools over external tools)")]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Path to config TOML. If omitted, uses ./docmill.toml if present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace/debug/info/warn/error).
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP server until SIGINT/SIGTERM.
    Serve {
        /// Overrides `server.bind`.
        #[arg(long)]
        bind: Option<String>,
    },
    Convert {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        to: String,
        /// Defaults to the input's extension.
        #[arg(long)]
        from: Option<String>,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    Merge {
        #[arg(long, num_args = 1.., required = true)]
        input: Vec<PathBuf>,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    Split {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    Rotate {
        #[arg(long)]
        input: PathBuf,
        /// Degrees, a multiple of 90.
        #[arg(long, default_value_t = 90, allow_hyphen_values = true)]
        angle: i32,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    Reorder {
        #[arg(long)]
        input: PathBuf,
        /// Page range such as `3,1,2` or `2-z,1`.
        #[arg(long)]
        order: String,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    Compress {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    ExtractText {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    ExtractImages {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// List supported conversions and operations.
    Formats {},
    /// Report which external tools are reachable.
    Doctor {},
}

/// A one-off request run through a private set of pools.
enum LocalRequest {
    Convert {
        input: PathBuf,
        from: String,
        to: String,
    },
    Merge {
        inputs: Vec<PathBuf>,
    },
    Operation {
        input: PathBuf,
        op: Operation,
        options: JobOptions,
    },
}

pub fn dispatch(args: Args) -> Result<()> {
    let cfg = match resolve_config_path(args.config.as_deref()) {
        Some(path) => Config::load(&path)?,
        None => Config::default(),
    };
    let log_path = resolve_log_path(&cfg);
    let _guard = init_logging(&args, &cfg, log_path.as_deref())?;

    match &args.cmd {
        Command::Formats {} => formats(),
        Command::Doctor {} => doctor(&cfg),
        Command::Serve { bind } => {
            let mut cfg = cfg.clone();
            if let Some(bind) = bind {
                cfg.server.bind = bind.clone();
            }
            runtime()?.block_on(serve(&cfg))
        }
        cmd => {
            let (request, out) = local_request(cmd)?;
            runtime()?.block_on(run_local(&cfg, request, out))
        }
    }
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")
}

fn resolve_config_path(user: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = user {
        return Some(p.to_path_buf());
    }
    ["docmill.toml", "docmill.example.toml"]
        .into_iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
}

fn resolve_log_path(cfg: &Config) -> Option<PathBuf> {
    if !cfg.logging.write_to_file {
        return None;
    }

    if !cfg.logging.file_path.is_empty() {
        return Some(PathBuf::from(&cfg.logging.file_path));
    }

    Some(PathBuf::from(&cfg.paths.work_dir).join("docmill.log"))
}

fn init_logging(args: &Args, cfg: &Config, file_path: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let level = args
        .log_level
        .as_deref()
        .unwrap_or(cfg.logging.level.as_str());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stdout carries the command's JSON output; logs go to stderr.
    let console_layer = if cfg.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    };

    let (file_layer, guard) = if let Some(path) = file_path {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        ensure_dir(parent)?;
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open log file: {}", path.display()))?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    Ok(guard)
}

fn formats() -> Result<()> {
    let operations: Vec<_> = Operation::ALL
        .iter()
        .map(|op| {
            serde_json::json!({
                "operation": op,
                "engine": crate::router::route_operation(*op),
                "target": op.target_format(),
            })
        })
        .collect();
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "conversions": supported_pairs(),
            "operations": operations,
        }))?
    );
    Ok(())
}

fn doctor(cfg: &Config) -> Result<()> {
    let tools: Vec<_> = tool_programs(&cfg.tools)
        .into_iter()
        .map(|(tool, program)| {
            let found = find_program(&program);
            serde_json::json!({
                "tool": tool,
                "program": program,
                "found": found.is_some(),
                "path": found,
            })
        })
        .collect();
    let engines: Vec<_> = crate::engine::Engine::ALL
        .iter()
        .map(|&engine| {
            serde_json::json!({
                "engine": engine,
                "workers": cfg.pools.workers_for(engine),
                "timeout_secs": cfg.timeouts.for_engine(engine).map(|d| d.as_secs()),
            })
        })
        .collect();
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "tools": tools,
            "engines": engines,
            "queue_capacity": cfg.pools.queue_capacity,
            "batch_permits": cfg.pools.batch_permits(),
            "work_dir": cfg.paths.work_dir,
        }))?
    );
    Ok(())
}

async fn serve(cfg: &Config) -> Result<()> {
    ensure_dir(Path::new(&cfg.paths.work_dir))?;
    let shutdown = crate::shutdown::install_shutdown_handler()
        .context("installing signal handlers")?;

    let registry = Arc::new(EngineRegistry::new(cfg));
    registry.start(&shutdown);
    let orchestrator = Arc::new(Orchestrator::new(registry, cfg));

    crate::server::serve(cfg, orchestrator, shutdown).await
}

fn local_request(cmd: &Command) -> Result<(LocalRequest, PathBuf)> {
    let operation = |input: &Path, op: Operation, options: JobOptions, out: &Option<PathBuf>| {
        let out = out
            .clone()
            .unwrap_or_else(|| sibling(input, &format!("-{op}"), op.target_format()));
        let request = LocalRequest::Operation {
            input: input.to_path_buf(),
            op,
            options,
        };
        (request, out)
    };

    let planned = match cmd {
        Command::Convert {
            input,
            to,
            from,
            out,
        } => {
            let out = out.clone().unwrap_or_else(|| sibling(input, "", to));
            let request = LocalRequest::Convert {
                input: input.clone(),
                from: from.clone().unwrap_or_default(),
                to: to.clone(),
            };
            (request, out)
        }
        Command::Merge { input, out } => {
            let out = out.clone().unwrap_or_else(|| PathBuf::from("merged.pdf"));
            let request = LocalRequest::Merge {
                inputs: input.clone(),
            };
            (request, out)
        }
        Command::Split { input, out } => operation(input, Operation::Split, JobOptions::new(), out),
        Command::Rotate { input, angle, out } => operation(
            input,
            Operation::Rotate,
            JobOptions::new().with("angle", angle.to_string()),
            out,
        ),
        Command::Reorder { input, order, out } => operation(
            input,
            Operation::Reorder,
            JobOptions::new().with("order", order.clone()),
            out,
        ),
        Command::Compress { input, out } => operation(input, Operation::Compress, JobOptions::new(), out),
        Command::ExtractText { input, out } => {
            operation(input, Operation::ExtractText, JobOptions::new(), out)
        }
        Command::ExtractImages { input, out } => {
            operation(input, Operation::ExtractImages, JobOptions::new(), out)
        }
        Command::Serve { .. } | Command::Formats {} | Command::Doctor {} => {
            return Err(anyhow!("not a conversion command"));
        }
    };
    Ok(planned)
}

/// `<dir>/<stem><suffix>.<ext>` next to `input`.
fn sibling(input: &Path, suffix: &str, ext: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let ext = crate::router::normalize_format(ext);
    input.with_file_name(format!("{stem}{suffix}.{ext}"))
}

async fn run_local(cfg: &Config, request: LocalRequest, out: PathBuf) -> Result<()> {
    let started = now_rfc3339();
    let registry = Arc::new(EngineRegistry::new(cfg));
    let shutdown = CancellationToken::new();
    registry.start(&shutdown);
    let orchestrator = Orchestrator::new(registry.clone(), cfg);

    let outcome = execute(&orchestrator, request).await;
    shutdown.cancel();
    registry.drain().await;

    let artifact = outcome?;
    let job_id = artifact.job_id();
    let bytes = artifact
        .save_to(&out)
        .await
        .with_context(|| format!("writing {}", out.display()))?;
    info!("job_id={job_id} out={}", out.display());

    if cfg.global.print_summary {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "job_id": job_id,
                "output": out,
                "bytes": bytes,
                "started": started,
                "finished": now_rfc3339(),
                "status": "ok"
            }))?
        );
    }
    Ok(())
}

async fn execute(orchestrator: &Orchestrator, request: LocalRequest) -> Result<Artifact> {
    let workspace = orchestrator.workspace().await?;
    let artifact = match request {
        LocalRequest::Convert { input, from, to } => {
            let staged = workspace
                .stage_file(&input)
                .await
                .with_context(|| format!("staging {}", input.display()))?;
            orchestrator
                .convert(workspace, &staged, &from, &to, JobOptions::new())
                .await?
        }
        LocalRequest::Merge { inputs } => {
            let mut staged = Vec::with_capacity(inputs.len());
            for (idx, input) in inputs.iter().enumerate() {
                let name = input
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let data = tokio::fs::read(input)
                    .await
                    .with_context(|| format!("reading {}", input.display()))?;
                staged.push(
                    workspace
                        .stage_bytes(&format!("{idx:03}-{name}"), &data)
                        .await?,
                );
            }
            orchestrator.merge(workspace, &staged).await?
        }
        LocalRequest::Operation { input, op, options } => {
            let staged = workspace
                .stage_file(&input)
                .await
                .with_context(|| format!("staging {}", input.display()))?;
            orchestrator
                .run_operation(workspace, &staged, op, options)
                .await?
        }
    };
    Ok(artifact)
}
