//! Archive and compressed-file handling for ODB++ jobs.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use flate2::read::GzDecoder;

/// Returns true when `path` names a gzip-compressed tarball by extension.
/// Anything else must already be an extracted directory.
pub fn is_gzip_tar(path: &Path) -> bool {
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("");
    let lower = name.to_ascii_lowercase();
    lower.ends_with(".tgz") || lower.ends_with(".tar.gz")
}

/// Base name of an input with its `.tgz`/`.tar.gz` suffix stripped.
pub fn base_name(path: &Path) -> String {
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("");
    let lower = name.to_ascii_lowercase();
    if lower.ends_with(".tar.gz") {
        name[..name.len() - ".tar.gz".len()].to_string()
    } else if lower.ends_with(".tgz") {
        name[..name.len() - ".tgz".len()].to_string()
    } else {
        name.to_string()
    }
}

/// Unpack a `.tgz`/`.tar.gz` archive into `target_dir`. The tar reader
/// refuses entries that would escape the target directory.
pub fn unpack_tar_gz(archive: &Path, target_dir: &Path) -> std::io::Result<()> {
    log::debug!(
        "Unpacking {} into {}",
        archive.display(),
        target_dir.display()
    );
    let file = File::open(archive)?;
    let decoder = GzDecoder::new(BufReader::new(file));
    let mut tar = tar::Archive::new(decoder);
    std::fs::create_dir_all(target_dir)?;
    tar.unpack(target_dir)?;
    log::debug!("Extracted archive to {}", target_dir.display());
    Ok(())
}

/// Read a text file that may or may not be gzip-compressed on disk.
///
/// Jobs mix plain and compressed members freely, so a failed gzip decode
/// falls back to interpreting the raw bytes as UTF-8.
pub fn read_text_maybe_gzip(path: &Path) -> std::io::Result<String> {
    let data = std::fs::read(path)?;
    let mut decoder = GzDecoder::new(data.as_slice());
    let mut text = String::new();
    match decoder.read_to_string(&mut text) {
        Ok(_) => Ok(text),
        Err(_) => Ok(String::from_utf8_lossy(&data).into_owned()),
    }
}
