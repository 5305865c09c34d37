pub mod command;
pub mod tools;
pub mod types;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub use types::{ConvertRequest, ToolError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Engine {
    OfficeSuite,
    Raster,
    Image,
    Markup,
    Compression,
    Page,
}

impl Engine {
    pub const ALL: [Engine; 6] = [
        Engine::OfficeSuite,
        Engine::Raster,
        Engine::Image,
        Engine::Markup,
        Engine::Compression,
        Engine::Page,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Engine::OfficeSuite => "office_suite",
            Engine::Raster => "raster",
            Engine::Image => "image",
            Engine::Markup => "markup",
            Engine::Compression => "compression",
            Engine::Page => "page",
        }
    }
}

impl std::fmt::Display for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `Ok(None)` means the tool picked its own output name inside `req.work_dir`.
#[async_trait]
pub trait Converter: Send + Sync {
    async fn convert(&self, req: &ConvertRequest<'_>) -> Result<Option<PathBuf>, ToolError>;
}

#[async_trait]
pub trait BatchConverter: Send + Sync {
    async fn convert_many(&self, inputs: &[PathBuf], output: &Path) -> Result<(), ToolError>;
}
