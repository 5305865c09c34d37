//! Converters backed by the command-line tools each engine wraps.

use super::command::run_tool;
use super::{BatchConverter, ConvertRequest, Converter, ToolError};
use crate::config::Tools;
use crate::package::zip_files_async;
use crate::router::Operation;
use crate::util::{expand_tilde, extension_of};
use async_trait::async_trait;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use tracing::debug;

fn operation_of(req: &ConvertRequest<'_>) -> Result<Option<Operation>, ToolError> {
    req.options
        .get("operation")
        .map(|raw| raw.parse::<Operation>().map_err(ToolError::Unsupported))
        .transpose()
}

/// Files directly under `dir` whose name starts with `prefix` and whose extension is
/// one of `exts` (any extension when empty), in natural page order.
async fn outputs_with_prefix(
    dir: &Path,
    prefix: &str,
    exts: &[&str],
) -> Result<Vec<PathBuf>, ToolError> {
    let mut found = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.starts_with(prefix) {
            continue;
        }
        if !exts.is_empty() && !exts.contains(&extension_of(&path).as_str()) {
            continue;
        }
        found.push(path);
    }
    // page-2 before page-10
    found.sort_by_key(|p| {
        let name = p.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        (name.len(), name)
    });
    Ok(found)
}

pub fn resolve_soffice(tools: &Tools) -> String {
    let raw = tools.soffice.trim();
    if !raw.is_empty() && !raw.eq_ignore_ascii_case("auto") {
        return expand_tilde(raw).display().to_string();
    }
    for candidate in &tools.soffice_candidates {
        let p = expand_tilde(candidate);
        if p.exists() {
            return p.display().to_string();
        }
    }
    "soffice".to_string()
}

/// Every external program the engines may invoke, keyed by a short label.
pub fn tool_programs(tools: &Tools) -> Vec<(&'static str, String)> {
    vec![
        ("soffice", resolve_soffice(tools)),
        ("pandoc", tools.pandoc.clone()),
        ("pdftoppm", tools.pdftoppm.clone()),
        ("pdftotext", tools.pdftotext.clone()),
        ("pdfimages", tools.pdfimages.clone()),
        ("pdfunite", tools.pdfunite.clone()),
        ("pdfseparate", tools.pdfseparate.clone()),
        ("imagemagick", tools.imagemagick.clone()),
        ("ghostscript", tools.ghostscript.clone()),
        ("qpdf", tools.qpdf.clone()),
    ]
}

/// LibreOffice headless conversion. soffice names the output after the input, so
/// the output path is left for the caller to discover.
pub struct LibreOffice {
    program: String,
}

impl LibreOffice {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl Converter for LibreOffice {
    async fn convert(&self, req: &ConvertRequest<'_>) -> Result<Option<PathBuf>, ToolError> {
        let work_dir = std::path::absolute(req.work_dir)?;
        let input = std::path::absolute(req.input)?;

        // A private profile per job; concurrent soffice runs sharing one profile lock up.
        let profile = work_dir.join("soffice_user");
        tokio::fs::create_dir_all(&profile).await?;

        let mut args: Vec<OsString> = vec![
            format!("-env:UserInstallation=file://{}", profile.display()).into(),
            "--headless".into(),
        ];
        if extension_of(&input) == "pdf" && req.target_format == "docx" {
            args.push("--infilter=writer_pdf_import".into());
        }
        args.push("--convert-to".into());
        args.push(req.target_format.into());
        args.push("--outdir".into());
        args.push(work_dir.into_os_string());
        args.push(input.into_os_string());

        run_tool(&self.program, &args).await?;
        Ok(None)
    }
}

pub struct Pandoc {
    program: String,
}

impl Pandoc {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl Converter for Pandoc {
    async fn convert(&self, req: &ConvertRequest<'_>) -> Result<Option<PathBuf>, ToolError> {
        let output = req.work_dir.join(format!("output.{}", req.target_format));
        run_tool(
            &self.program,
            [req.input.as_os_str(), OsStr::new("-o"), output.as_os_str()],
        )
        .await?;
        Ok(Some(output))
    }
}

/// Poppler utilities: page rendering, text extraction, embedded image extraction.
pub struct Poppler {
    pdftoppm: String,
    pdftotext: String,
    pdfimages: String,
}

impl Poppler {
    pub fn new(pdftoppm: &str, pdftotext: &str, pdfimages: &str) -> Self {
        Self {
            pdftoppm: pdftoppm.to_string(),
            pdftotext: pdftotext.to_string(),
            pdfimages: pdfimages.to_string(),
        }
    }

    async fn render(&self, req: &ConvertRequest<'_>) -> Result<PathBuf, ToolError> {
        let (flag, exts): (&str, &[&str]) = match req.target_format {
            "jpg" | "jpeg" => ("-jpeg", &["jpg", "jpeg"][..]),
            "png" => ("-png", &["png"][..]),
            other => {
                return Err(ToolError::Unsupported(format!("image format: {other}")));
            }
        };
        let prefix = req.work_dir.join("output");
        run_tool(
            &self.pdftoppm,
            [OsStr::new(flag), req.input.as_os_str(), prefix.as_os_str()],
        )
        .await?;

        // pdftoppm appends the page number; the first page is the artifact.
        outputs_with_prefix(req.work_dir, "output", exts)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ToolError::MissingOutput {
                dir: req.work_dir.to_path_buf(),
                format: req.target_format.to_string(),
            })
    }

    async fn extract_text(&self, req: &ConvertRequest<'_>) -> Result<PathBuf, ToolError> {
        let output = req.work_dir.join("output.txt");
        run_tool(
            &self.pdftotext,
            [req.input.as_os_str(), output.as_os_str()],
        )
        .await?;
        Ok(output)
    }

    async fn extract_images(&self, req: &ConvertRequest<'_>) -> Result<PathBuf, ToolError> {
        let images_dir = req.work_dir.join("images");
        tokio::fs::create_dir_all(&images_dir).await?;
        let prefix = images_dir.join("img");
        run_tool(
            &self.pdfimages,
            [OsStr::new("-all"), req.input.as_os_str(), prefix.as_os_str()],
        )
        .await?;

        let images = outputs_with_prefix(&images_dir, "img", &[]).await?;
        if images.is_empty() {
            return Err(ToolError::MissingOutput {
                dir: images_dir,
                format: "image".to_string(),
            });
        }
        debug!(count = images.len(), "packaging extracted images");

        let zip_path = req.work_dir.join("images.zip");
        zip_files_async(zip_path.clone(), images).await?;
        Ok(zip_path)
    }
}

#[async_trait]
impl Converter for Poppler {
    async fn convert(&self, req: &ConvertRequest<'_>) -> Result<Option<PathBuf>, ToolError> {
        let output = match operation_of(req)? {
            Some(Operation::ExtractImages) => self.extract_images(req).await?,
            Some(Operation::ExtractText) => self.extract_text(req).await?,
            Some(other) => {
                return Err(ToolError::Unsupported(format!("raster engine cannot {other}")));
            }
            None if req.target_format == "txt" => self.extract_text(req).await?,
            None => self.render(req).await?,
        };
        Ok(Some(output))
    }
}

/// ImageMagick `convert`: one or many images into a single PDF.
pub struct ImageMagick {
    program: String,
}

impl ImageMagick {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl Converter for ImageMagick {
    async fn convert(&self, req: &ConvertRequest<'_>) -> Result<Option<PathBuf>, ToolError> {
        let output = req.work_dir.join(format!("output.{}", req.target_format));
        self.convert_many(&[req.input.to_path_buf()], &output).await?;
        Ok(Some(output))
    }
}

#[async_trait]
impl BatchConverter for ImageMagick {
    async fn convert_many(&self, inputs: &[PathBuf], output: &Path) -> Result<(), ToolError> {
        let mut args: Vec<&OsStr> = inputs.iter().map(|p| p.as_os_str()).collect();
        args.push(output.as_os_str());
        run_tool(&self.program, args).await?;
        Ok(())
    }
}

/// Ghostscript re-distill at screen quality.
pub struct Ghostscript {
    program: String,
}

impl Ghostscript {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl Converter for Ghostscript {
    async fn convert(&self, req: &ConvertRequest<'_>) -> Result<Option<PathBuf>, ToolError> {
        let output = req.work_dir.join("compressed.pdf");
        let args: Vec<OsString> = vec![
            "-sDEVICE=pdfwrite".into(),
            "-dCompatibilityLevel=1.4".into(),
            "-dPDFSETTINGS=/screen".into(),
            "-dNOPAUSE".into(),
            "-dQUIET".into(),
            "-dBATCH".into(),
            format!("-sOutputFile={}", output.display()).into(),
            req.input.as_os_str().to_owned(),
        ];
        run_tool(&self.program, &args).await?;
        Ok(Some(output))
    }
}

/// Page-level edits: qpdf for rotate/reorder, pdfseparate for split.
pub struct PageTools {
    qpdf: String,
    pdfseparate: String,
}

impl PageTools {
    pub fn new(qpdf: &str, pdfseparate: &str) -> Self {
        Self {
            qpdf: qpdf.to_string(),
            pdfseparate: pdfseparate.to_string(),
        }
    }

    async fn rotate(&self, req: &ConvertRequest<'_>) -> Result<PathBuf, ToolError> {
        let angle: i32 = match req.options.get("angle") {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| ToolError::Unsupported(format!("rotation angle: {raw}")))?,
            None => 90,
        };
        let output = req.work_dir.join("rotated.pdf");
        let rotate = if angle >= 0 {
            format!("--rotate=+{angle}")
        } else {
            format!("--rotate={angle}")
        };
        run_tool(
            &self.qpdf,
            [req.input.as_os_str(), OsStr::new(&rotate), output.as_os_str()],
        )
        .await?;
        Ok(output)
    }

    async fn reorder(&self, req: &ConvertRequest<'_>) -> Result<PathBuf, ToolError> {
        let order = req
            .options
            .get("order")
            .ok_or_else(|| ToolError::Unsupported("reorder without a page order".to_string()))?;
        let output = req.work_dir.join("reordered.pdf");
        run_tool(
            &self.qpdf,
            [
                req.input.as_os_str(),
                OsStr::new("--pages"),
                OsStr::new("."),
                OsStr::new(order),
                OsStr::new("--"),
                output.as_os_str(),
            ],
        )
        .await?;
        Ok(output)
    }

    async fn split(&self, req: &ConvertRequest<'_>) -> Result<PathBuf, ToolError> {
        let pages_dir = req.work_dir.join("pages");
        tokio::fs::create_dir_all(&pages_dir).await?;
        let pattern = pages_dir.join("page-%d.pdf");
        run_tool(
            &self.pdfseparate,
            [req.input.as_os_str(), pattern.as_os_str()],
        )
        .await?;

        let pages = outputs_with_prefix(&pages_dir, "page-", &["pdf"]).await?;
        if pages.is_empty() {
            return Err(ToolError::MissingOutput {
                dir: pages_dir,
                format: "pdf".to_string(),
            });
        }
        let zip_path = req.work_dir.join("pages.zip");
        zip_files_async(zip_path.clone(), pages).await?;
        Ok(zip_path)
    }
}

#[async_trait]
impl Converter for PageTools {
    async fn convert(&self, req: &ConvertRequest<'_>) -> Result<Option<PathBuf>, ToolError> {
        let output = match operation_of(req)? {
            Some(Operation::Rotate) => self.rotate(req).await?,
            Some(Operation::Reorder) => self.reorder(req).await?,
            Some(Operation::Split) => self.split(req).await?,
            Some(other) => {
                return Err(ToolError::Unsupported(format!("page engine cannot {other}")));
            }
            None => {
                return Err(ToolError::Unsupported(
                    "page engine needs an operation".to_string(),
                ));
            }
        };
        Ok(Some(output))
    }
}

/// Poppler `pdfunite`.
pub struct PdfUnite {
    program: String,
}

impl PdfUnite {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl BatchConverter for PdfUnite {
    async fn convert_many(&self, inputs: &[PathBuf], output: &Path) -> Result<(), ToolError> {
        let mut args: Vec<&OsStr> = inputs.iter().map(|p| p.as_os_str()).collect();
        args.push(output.as_os_str());
        run_tool(&self.program, args).await?;
        Ok(())
    }
}
