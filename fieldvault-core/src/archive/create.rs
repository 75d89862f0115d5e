use super::{asset_record, list_assets, thumbnail_set, Compression};
use crate::fs::walker::AssetFile;
use crate::model::{AssetManifest, AssetRecord};
use crate::progress::{self, fraction, ProgressEvent};
use crate::utils::errors::{BackupError, Result};
use futures_util::Stream;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq)]
pub enum ArchiveProgress {
    FileArchived {
        current: usize,
        total: usize,
        file_name: String,
        fraction: f64,
    },
    Completed {
        path: PathBuf,
        file_count: usize,
        manifest: AssetManifest,
    },
    Error {
        message: String,
    },
}

impl ProgressEvent for ArchiveProgress {
    fn failure(message: String) -> Self {
        ArchiveProgress::Error { message }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, ArchiveProgress::Completed { .. } | ArchiveProgress::Error { .. })
    }
}

enum State {
    Pending,
    Writing {
        zip: ZipWriter<File>,
        files: Vec<AssetFile>,
        thumbnails: HashSet<String>,
        records: Vec<AssetRecord>,
    },
    Done,
}

/// Archive creation, one file per `next()`.
///
/// The zip is written to `<output>.tmp` and renamed over the output only
/// after the last entry is flushed.
pub struct CreateTask {
    source_root: PathBuf,
    output_path: PathBuf,
    tmp_path: PathBuf,
    include_thumbnails: bool,
    options: SimpleFileOptions,
    cancel: CancellationToken,
    state: State,
}

impl CreateTask {
    pub(super) fn new(
        source_root: PathBuf,
        output_path: PathBuf,
        include_thumbnails: bool,
        compression: Compression,
        cancel: CancellationToken,
    ) -> Self {
        let mut tmp_name = output_path.clone().into_os_string();
        tmp_name.push(".tmp");
        Self {
            source_root,
            tmp_path: PathBuf::from(tmp_name),
            output_path,
            include_thumbnails,
            options: SimpleFileOptions::default().compression_method(compression.method()),
            cancel,
            state: State::Pending,
        }
    }

    /// Run the task on the blocking pool.
    pub fn into_stream(self) -> impl Stream<Item = ArchiveProgress> + Send {
        progress::blocking_stream(self)
    }

    /// Drain the task, returning the manifest of the finished archive.
    pub fn run(mut self) -> Result<(PathBuf, AssetManifest)> {
        while let Some(event) = self.advance() {
            if let ArchiveProgress::Completed { path, manifest, .. } = event? {
                return Ok((path, manifest));
            }
        }
        Err(BackupError::Cancelled)
    }

    /// Next step with its typed error; `None` once finished.
    pub(crate) fn advance(&mut self) -> Option<Result<ArchiveProgress>> {
        if matches!(self.state, State::Done) {
            return None;
        }
        let result = self.step();
        if let Err(e) = &result {
            self.abort(e);
        }
        Some(result)
    }

    fn start(&mut self) -> Result<()> {
        let files = list_assets(&self.source_root, self.include_thumbnails)?;
        if let Some(parent) = self.output_path.parent() {
            fs::create_dir_all(parent).map_err(|e| BackupError::storage(parent, e))?;
        }
        let file = File::create(&self.tmp_path).map_err(|e| BackupError::storage(&self.tmp_path, e))?;
        info!(
            "Archiving {} files from {}",
            files.len(),
            self.source_root.display()
        );
        self.state = State::Writing {
            zip: ZipWriter::new(file),
            thumbnails: thumbnail_set(&files),
            records: Vec::with_capacity(files.len()),
            files,
        };
        Ok(())
    }

    fn step(&mut self) -> Result<ArchiveProgress> {
        if matches!(self.state, State::Pending) {
            self.start()?;
        }
        if self.cancel.is_cancelled() {
            return Err(BackupError::Cancelled);
        }
        if matches!(&self.state, State::Writing { files, records, .. } if files.len() == records.len()) {
            return self.finish();
        }

        let State::Writing {
            zip,
            files,
            thumbnails,
            records,
        } = &mut self.state
        else {
            return Err(BackupError::Integrity("archive task already finished".to_string()));
        };

        let total = files.len();
        let file = &files[records.len()];
        let (size, sha256) = write_entry(zip, file, self.options)?;
        records.push(asset_record(file, size, sha256, thumbnails));
        let current = records.len();
        debug!("Archived {} ({} bytes)", file.relative_path, size);

        Ok(ArchiveProgress::FileArchived {
            current,
            total,
            file_name: file.file_name.clone(),
            fraction: fraction(current, total),
        })
    }

    fn finish(&mut self) -> Result<ArchiveProgress> {
        let State::Writing { zip, records, .. } = std::mem::replace(&mut self.state, State::Done) else {
            return Err(BackupError::Integrity("archive task already finished".to_string()));
        };
        let out = zip.finish()?;
        out.sync_all().map_err(|e| BackupError::storage(&self.tmp_path, e))?;
        drop(out);
        fs::rename(&self.tmp_path, &self.output_path)
            .map_err(|e| BackupError::storage(&self.output_path, e))?;

        let file_count = records.len();
        let manifest = AssetManifest::from_records(records, self.include_thumbnails);
        info!(
            "Archive {} complete: {} files",
            self.output_path.display(),
            file_count
        );
        Ok(ArchiveProgress::Completed {
            path: self.output_path.clone(),
            file_count,
            manifest,
        })
    }

    fn abort(&mut self, err: &BackupError) {
        self.state = State::Done;
        if self.tmp_path.exists() {
            if let Err(e) = fs::remove_file(&self.tmp_path) {
                warn!("Failed to remove {}: {}", self.tmp_path.display(), e);
            }
        }
        warn!("Archive {} aborted: {}", self.output_path.display(), err);
    }
}

impl Iterator for CreateTask {
    type Item = ArchiveProgress;

    fn next(&mut self) -> Option<ArchiveProgress> {
        self.advance().map(|result| {
            result.unwrap_or_else(|e| ArchiveProgress::Error {
                message: e.to_string(),
            })
        })
    }
}

/// Stream one file into the archive, hashing as it goes.
fn write_entry(
    zip: &mut ZipWriter<File>,
    file: &AssetFile,
    options: SimpleFileOptions,
) -> Result<(u64, String)> {
    let source = File::open(&file.path).map_err(|e| BackupError::storage(&file.path, e))?;
    let mut reader = BufReader::with_capacity(CHUNK_SIZE, source);
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];
    let mut size = 0u64;

    zip.start_file(file.relative_path.as_str(), options)?;
    loop {
        let read = reader
            .read(&mut buffer)
            .map_err(|e| BackupError::storage(&file.path, e))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
        zip.write_all(&buffer[..read])?;
        size += read as u64;
    }

    Ok((size, format!("{:x}", hasher.finalize())))
}
