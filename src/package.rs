use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use zip::CompressionMethod;
use zip::write::SimpleFileOptions;

/// Write `files` into a flat zip archive at `zip_path`, each under its file name.
pub fn zip_files(zip_path: &Path, files: &[PathBuf]) -> io::Result<()> {
    let out = File::create(zip_path)?;
    let mut zip = zip::ZipWriter::new(out);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for path in files {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| io::Error::other(format!("bad file name: {}", path.display())))?;
        zip.start_file(name, options).map_err(io::Error::other)?;
        let mut src = File::open(path)?;
        io::copy(&mut src, &mut zip)?;
    }

    zip.finish().map_err(io::Error::other)?;
    Ok(())
}

/// `zip_files` on the blocking pool.
pub async fn zip_files_async(zip_path: PathBuf, files: Vec<PathBuf>) -> io::Result<()> {
    tokio::task::spawn_blocking(move || zip_files(&zip_path, &files))
        .await
        .map_err(io::Error::other)?
}
