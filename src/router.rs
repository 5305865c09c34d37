use crate::engine::Engine;
use serde::Serialize;
use std::str::FromStr;

struct Rule {
    sources: &'static [&'static str],
    targets: &'static [&'static str],
    engine: Engine,
}

// First match wins. Document-class rules sit above the generic text/html fallbacks.
const RULES: &[Rule] = &[
    Rule {
        sources: &["jpg", "jpeg", "png"],
        targets: &["pdf"],
        engine: Engine::Image,
    },
    Rule {
        sources: &["pdf"],
        targets: &["jpg", "jpeg", "png"],
        engine: Engine::Raster,
    },
    Rule {
        sources: &["docx", "ppt", "xlsx", "csv", "html", "txt"],
        targets: &["pdf"],
        engine: Engine::OfficeSuite,
    },
    Rule {
        sources: &["pdf"],
        targets: &["docx", "xlsx", "ppt"],
        engine: Engine::OfficeSuite,
    },
    Rule {
        sources: &["md", "markdown", "epub"],
        targets: &["pdf"],
        engine: Engine::Markup,
    },
    Rule {
        sources: &["pdf"],
        targets: &["txt"],
        engine: Engine::Raster,
    },
];

/// Lowercase a format token and strip a leading dot.
pub fn normalize_format(raw: &str) -> String {
    raw.trim().trim_start_matches('.').to_ascii_lowercase()
}

/// Engine able to turn `source` into `target`, if any.
pub fn route(source: &str, target: &str) -> Option<Engine> {
    let source = normalize_format(source);
    let target = normalize_format(target);
    RULES
        .iter()
        .find(|r| r.sources.contains(&source.as_str()) && r.targets.contains(&target.as_str()))
        .map(|r| r.engine)
}

#[derive(Debug, Clone, Serialize)]
pub struct SupportedPair {
    pub source: &'static str,
    pub target: &'static str,
    pub engine: Engine,
}

/// Every (source, target) pair the table accepts, in rule order.
pub fn supported_pairs() -> Vec<SupportedPair> {
    let mut out = Vec::new();
    for rule in RULES {
        for &source in rule.sources {
            for &target in rule.targets {
                out.push(SupportedPair {
                    source,
                    target,
                    engine: rule.engine,
                });
            }
        }
    }
    out
}

/// Single-format transforms that are not a (source, target) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    Compress,
    ExtractText,
    ExtractImages,
    Rotate,
    Reorder,
    Split,
}

impl Operation {
    pub const ALL: [Operation; 6] = [
        Operation::Compress,
        Operation::ExtractText,
        Operation::ExtractImages,
        Operation::Rotate,
        Operation::Reorder,
        Operation::Split,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Compress => "compress",
            Operation::ExtractText => "extract-text",
            Operation::ExtractImages => "extract-images",
            Operation::Rotate => "rotate",
            Operation::Reorder => "reorder",
            Operation::Split => "split",
        }
    }

    /// Format of the artifact the operation produces.
    pub fn target_format(&self) -> &'static str {
        match self {
            Operation::Compress | Operation::Rotate | Operation::Reorder => "pdf",
            Operation::ExtractText => "txt",
            Operation::ExtractImages | Operation::Split => "zip",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| format!("unknown operation: {s}"))
    }
}

pub fn route_operation(op: Operation) -> Engine {
    match op {
        Operation::Compress => Engine::Compression,
        Operation::ExtractText | Operation::ExtractImages => Engine::Raster,
        Operation::Rotate | Operation::Reorder | Operation::Split => Engine::Page,
    }
}
