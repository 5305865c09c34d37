use crate::engine::Engine;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub global: Global,
    #[serde(default)]
    pub server: Server,
    #[serde(default)]
    pub paths: Paths,
    #[serde(default)]
    pub pools: Pools,
    #[serde(default)]
    pub timeouts: Timeouts,
    #[serde(default)]
    pub tools: Tools,
    #[serde(default)]
    pub limits: Limits,
    #[serde(default)]
    pub logging: Logging,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw).with_context(|| "parsing TOML")?;
        Ok(cfg)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Global {
    pub print_summary: bool,
}
impl Default for Global {
    fn default() -> Self {
        Self {
            print_summary: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Server {
    pub bind: String,
    pub convert_limit_bytes: usize,
    pub merge_limit_bytes: usize,
    pub operation_limit_bytes: usize,
}
impl Default for Server {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".into(),
            convert_limit_bytes: 20 * 1024 * 1024,
            merge_limit_bytes: 50 * 1024 * 1024,
            operation_limit_bytes: 25 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Paths {
    pub work_dir: String,
}
impl Default for Paths {
    fn default() -> Self {
        Self {
            work_dir: ".docmill-work".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Pools {
    /// 0 means one executor per available CPU.
    pub workers_per_engine: usize,
    pub queue_capacity: usize,
    /// Concurrent merge / image-binding runs; 0 means one per available CPU.
    pub batch_permits: usize,
    /// Per-engine overrides keyed by engine name (e.g. `office_suite = 2`).
    #[serde(default)]
    pub workers: BTreeMap<String, usize>,
}
impl Default for Pools {
    fn default() -> Self {
        Self {
            workers_per_engine: 0,
            queue_capacity: crate::pool::DEFAULT_QUEUE_CAPACITY,
            batch_permits: 0,
            workers: Default::default(),
        }
    }
}

impl Pools {
    pub fn workers_for(&self, engine: Engine) -> usize {
        if let Some(&n) = self.workers.get(engine.as_str()) {
            if n > 0 {
                return n;
            }
        }
        if self.workers_per_engine > 0 {
            return self.workers_per_engine;
        }
        available_cpus()
    }

    pub fn batch_permits(&self) -> usize {
        if self.batch_permits > 0 {
            self.batch_permits
        } else {
            available_cpus()
        }
    }
}

fn available_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Deadlines in seconds per engine; 0 disables the deadline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub office_suite: u64,
    pub raster: u64,
    pub image: u64,
    pub markup: u64,
    pub compression: u64,
    pub page: u64,
    pub batch: u64,
}
impl Default for Timeouts {
    fn default() -> Self {
        Self {
            office_suite: 300,
            raster: 120,
            image: 120,
            markup: 120,
            compression: 300,
            page: 120,
            batch: 300,
        }
    }
}

impl Timeouts {
    pub fn for_engine(&self, engine: Engine) -> Option<Duration> {
        let secs = match engine {
            Engine::OfficeSuite => self.office_suite,
            Engine::Raster => self.raster,
            Engine::Image => self.image,
            Engine::Markup => self.markup,
            Engine::Compression => self.compression,
            Engine::Page => self.page,
        };
        to_deadline(secs)
    }

    pub fn for_batch(&self) -> Option<Duration> {
        to_deadline(self.batch)
    }
}

fn to_deadline(secs: u64) -> Option<Duration> {
    if secs > 0 {
        Some(Duration::from_secs(secs))
    } else {
        None
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Tools {
    /// Path to soffice, or "auto" to try `soffice_candidates` then PATH.
    pub soffice: String,
    pub soffice_candidates: Vec<String>,
    pub pandoc: String,
    pub pdftoppm: String,
    pub pdftotext: String,
    pub pdfimages: String,
    pub pdfunite: String,
    pub pdfseparate: String,
    pub imagemagick: String,
    pub ghostscript: String,
    pub qpdf: String,
}
impl Default for Tools {
    fn default() -> Self {
        Self {
            soffice: "auto".into(),
            soffice_candidates: vec![
                "/opt/homebrew/bin/soffice".into(),
                "/Applications/LibreOffice.app/Contents/MacOS/soffice".into(),
                "/usr/bin/libreoffice".into(),
                "/usr/bin/soffice".into(),
            ],
            pandoc: "pandoc".into(),
            pdftoppm: "pdftoppm".into(),
            pdftotext: "pdftotext".into(),
            pdfimages: "pdfimages".into(),
            pdfunite: "pdfunite".into(),
            pdfseparate: "pdfseparate".into(),
            imagemagick: "convert".into(),
            ghostscript: "gs".into(),
            qpdf: "qpdf".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Upper bound on diagnostic text returned to callers.
    pub max_diagnostic_bytes: usize,
}
impl Default for Limits {
    fn default() -> Self {
        Self {
            max_diagnostic_bytes: 4096,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Logging {
    pub level: String,
    pub json: bool,
    pub write_to_file: bool,
    pub file_path: String,
}
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            write_to_file: false,
            file_path: "".into(),
        }
    }
}
