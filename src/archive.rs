//! Archive container packaging: wraps a finalized staging directory into a
//! single `.atls` file.
//!
//! Every member (manifest, schemas, dataset parts, provenance, blobs) is
//! already Zstandard-compressed by the component that wrote it; the
//! container layer stores them verbatim rather than compressing twice.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use zip::write::FileOptions;
use zip::ZipWriter;

use crate::AtlasError;

/// Packages every file under `staging_dir` into a zip container at
/// `archive_path`, preserving relative paths and sizes. Writes to a
/// temporary file in the same directory as `archive_path` and renames into
/// place, so a crash mid-write never leaves a partial `.atls` at the final
/// path.
pub fn package(staging_dir: &Path, archive_path: &Path) -> Result<(), AtlasError> {
    if let Some(parent) = archive_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let tmp_path = tmp_path_for(archive_path);
    let file = File::create(&tmp_path)?;
    let mut writer = ZipWriter::new(file);
    let options = FileOptions::default().compression_method(zip::CompressionMethod::Stored);

    let mut entries = collect_entries(staging_dir)?;
    entries.sort();

    let mut buf = Vec::new();
    for relative in &entries {
        let absolute = staging_dir.join(relative);
        let name = relative.to_string_lossy().replace('\\', "/");
        writer
            .start_file(name, options)
            .map_err(zip_error_to_atlas)?;
        buf.clear();
        File::open(&absolute)?.read_to_end(&mut buf)?;
        writer.write_all(&buf)?;
    }
    writer.finish().map_err(zip_error_to_atlas)?;

    fs::rename(&tmp_path, archive_path)?;
    Ok(())
}

/// Opens an archive and returns the relative paths of every member, for a
/// downstream consumer (or a test) to verify against the manifest.
pub fn list_members(archive_path: &Path) -> Result<Vec<String>, AtlasError> {
    let file = File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(file).map_err(zip_error_to_atlas)?;
    let mut names = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let entry = archive.by_index(i).map_err(zip_error_to_atlas)?;
        names.push(entry.name().to_string());
    }
    Ok(names)
}

fn tmp_path_for(archive_path: &Path) -> PathBuf {
    let mut tmp = archive_path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

fn collect_entries(root: &Path) -> io::Result<Vec<PathBuf>> {
    let mut entries = Vec::new();
    walk(root, root, &mut entries)?;
    Ok(entries)
}

fn walk(root: &Path, dir: &Path, out: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            walk(root, &path, out)?;
        } else {
            out.push(path.strip_prefix(root).unwrap().to_path_buf());
        }
    }
    Ok(())
}

fn zip_error_to_atlas(e: zip::result::ZipError) -> AtlasError {
    AtlasError::FatalUnknown(format!("archive packaging error: {}", e))
}
