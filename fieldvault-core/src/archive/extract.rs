use crate::progress::{self, fraction, ProgressEvent};
use crate::utils::errors::{BackupError, Result};
use futures_util::Stream;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zip::ZipArchive;

#[derive(Debug, Clone, PartialEq)]
pub enum ExtractProgress {
    FileExtracted {
        current: usize,
        total: usize,
        file_name: String,
        fraction: f64,
    },
    Completed {
        output_dir: PathBuf,
        extracted: usize,
    },
    Error {
        message: String,
    },
}

impl ProgressEvent for ExtractProgress {
    fn failure(message: String) -> Self {
        ExtractProgress::Error { message }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, ExtractProgress::Completed { .. } | ExtractProgress::Error { .. })
    }
}

enum State {
    Pending,
    Reading {
        archive: ZipArchive<File>,
        entries: Vec<usize>,
        extracted: usize,
    },
    Done,
}

/// Archive extraction, one entry per `next()`.
///
/// Each file is written to `<name>.part` and renamed once complete, so files
/// already extracted when the task stops are always whole.
pub struct ExtractTask {
    archive_path: PathBuf,
    output_dir: PathBuf,
    cancel: CancellationToken,
    state: State,
}

impl ExtractTask {
    pub(super) fn new(archive_path: PathBuf, output_dir: PathBuf, cancel: CancellationToken) -> Self {
        Self {
            archive_path,
            output_dir,
            cancel,
            state: State::Pending,
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = ExtractProgress> + Send {
        progress::blocking_stream(self)
    }

    /// Drain the task, returning the number of files extracted.
    pub fn run(mut self) -> Result<usize> {
        while let Some(event) = self.advance() {
            if let ExtractProgress::Completed { extracted, .. } = event? {
                return Ok(extracted);
            }
        }
        Err(BackupError::Cancelled)
    }

    /// Next step with its typed error; `None` once finished.
    pub(crate) fn advance(&mut self) -> Option<Result<ExtractProgress>> {
        if matches!(self.state, State::Done) {
            return None;
        }
        let result = self.step();
        if let Err(e) = &result {
            self.state = State::Done;
            warn!("Extraction of {} stopped: {}", self.archive_path.display(), e);
        }
        Some(result)
    }

    fn start(&mut self) -> Result<()> {
        let file = File::open(&self.archive_path).map_err(|e| BackupError::storage(&self.archive_path, e))?;
        let mut archive = ZipArchive::new(file)?;
        let mut entries = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            if !archive.by_index(i)?.is_dir() {
                entries.push(i);
            }
        }
        fs::create_dir_all(&self.output_dir).map_err(|e| BackupError::storage(&self.output_dir, e))?;
        info!(
            "Extracting {} files from {} into {}",
            entries.len(),
            self.archive_path.display(),
            self.output_dir.display()
        );
        self.state = State::Reading {
            archive,
            entries,
            extracted: 0,
        };
        Ok(())
    }

    fn step(&mut self) -> Result<ExtractProgress> {
        if matches!(self.state, State::Pending) {
            self.start()?;
        }

        let State::Reading {
            archive,
            entries,
            extracted,
        } = &mut self.state
        else {
            return Err(BackupError::Integrity("extraction already finished".to_string()));
        };

        let total = entries.len();
        if self.cancel.is_cancelled() {
            info!("Extraction cancelled after {} of {} files", extracted, total);
            return Err(BackupError::Cancelled);
        }

        let Some(&index) = entries.get(*extracted) else {
            let extracted = *extracted;
            self.state = State::Done;
            info!("Extracted {} files into {}", extracted, self.output_dir.display());
            return Ok(ExtractProgress::Completed {
                output_dir: self.output_dir.clone(),
                extracted,
            });
        };

        let mut entry = archive.by_index(index)?;
        let relative = entry.enclosed_name().ok_or_else(|| {
            BackupError::Integrity(format!("entry '{}' escapes the output directory", entry.name()))
        })?;
        let destination = self.output_dir.join(&relative);
        write_atomically(&destination, &mut entry)?;

        *extracted += 1;
        let current = *extracted;
        let file_name = relative
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        debug!("Extracted {}", relative.display());

        Ok(ExtractProgress::FileExtracted {
            current,
            total,
            file_name,
            fraction: fraction(current, total),
        })
    }
}

impl Iterator for ExtractTask {
    type Item = ExtractProgress;

    fn next(&mut self) -> Option<ExtractProgress> {
        self.advance().map(|result| {
            result.unwrap_or_else(|e| ExtractProgress::Error {
                message: e.to_string(),
            })
        })
    }
}

fn write_atomically(destination: &Path, reader: &mut impl io::Read) -> Result<()> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent).map_err(|e| BackupError::storage(parent, e))?;
    }
    let mut part_name = OsString::from(destination.as_os_str());
    part_name.push(".part");
    let part = PathBuf::from(part_name);

    let written = File::create(&part).and_then(|mut out| {
        io::copy(reader, &mut out)?;
        out.sync_all()
    });
    if let Err(e) = written {
        let _ = fs::remove_file(&part);
        return Err(BackupError::storage(&part, e));
    }
    fs::rename(&part, destination).map_err(|e| BackupError::storage(destination, e))
}

#[cfg(test)]
mod tests {
    use super::super::AssetArchiver;
    use super::*;
    use crate::fs::walker::{walk_assets, WalkOptions};
    use crate::testutil::{photo_bytes, sample_photo_manifest, write_sample_photos};
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    fn sample_archive(dir: &Path) -> PathBuf {
        let src = dir.join("src");
        write_sample_photos(&src);
        let output = dir.join("photos.zip");
        AssetArchiver::default()
            .create_archive(&src, &output, true, CancellationToken::new())
            .run()
            .unwrap();
        output
    }

    fn all_files(root: &Path) -> Vec<String> {
        let options = WalkOptions {
            exclude_names: vec![],
            ..WalkOptions::default()
        };
        walk_assets(root, &options)
            .unwrap()
            .into_iter()
            .map(|f| f.relative_path)
            .collect()
    }

    #[test]
    fn test_extracts_every_file() {
        let dir = TempDir::new().unwrap();
        let archive = sample_archive(dir.path());
        let out = dir.path().join("restored");

        let events: Vec<ExtractProgress> = AssetArchiver::default()
            .extract_archive(&archive, &out, CancellationToken::new())
            .collect();

        assert_eq!(events.len(), 6);
        assert!(matches!(
            &events[1],
            ExtractProgress::FileExtracted { current: 2, total: 5, file_name, .. } if file_name == "photo_2.jpg"
        ));
        assert_eq!(
            events[5],
            ExtractProgress::Completed {
                output_dir: out.clone(),
                extracted: 5
            }
        );
        let report = AssetArchiver::default().validate_integrity(&sample_photo_manifest(), &out);
        assert!(report.is_valid(), "{:?}", report.errors);
    }

    #[test]
    fn test_cancel_after_two_files_leaves_two_whole_files() {
        let dir = TempDir::new().unwrap();
        let archive = sample_archive(dir.path());
        let out = dir.path().join("restored");
        let cancel = CancellationToken::new();

        let mut task = AssetArchiver::default().extract_archive(&archive, &out, cancel.clone());
        assert!(matches!(task.next(), Some(ExtractProgress::FileExtracted { current: 1, .. })));
        assert!(matches!(task.next(), Some(ExtractProgress::FileExtracted { current: 2, .. })));
        cancel.cancel();
        assert!(matches!(task.next(), Some(ExtractProgress::Error { .. })));
        assert!(task.next().is_none());

        let files = all_files(&out);
        assert_eq!(files, vec!["report-1/photo_1.jpg", "report-1/photo_2.jpg"]);
        assert_eq!(fs::read(out.join("report-1/photo_1.jpg")).unwrap(), photo_bytes(1));
        assert_eq!(fs::read(out.join("report-1/photo_2.jpg")).unwrap(), photo_bytes(2));
    }

    #[test]
    fn test_cancelled_extraction_returns_cancelled() {
        let dir = TempDir::new().unwrap();
        let archive = sample_archive(dir.path());
        let out = dir.path().join("restored");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = AssetArchiver::default()
            .extract_archive(&archive, &out, cancel)
            .run()
            .unwrap_err();
        assert!(matches!(err, BackupError::Cancelled), "{err:?}");
        assert!(all_files(&out).is_empty());
    }

    #[test]
    fn test_rejects_entries_escaping_output() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("evil.zip");
        let mut zip = zip::ZipWriter::new(File::create(&archive).unwrap());
        zip.start_file("../escaped.txt", SimpleFileOptions::default()).unwrap();
        zip.write_all(b"gotcha").unwrap();
        zip.finish().unwrap();

        let out = dir.path().join("out");
        let events: Vec<ExtractProgress> = AssetArchiver::default()
            .extract_archive(&archive, &out, CancellationToken::new())
            .collect();

        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], ExtractProgress::Error { message } if message.contains("escapes")));
        assert!(!dir.path().join("escaped.txt").exists());
    }

    #[test]
    fn test_missing_archive_is_error() {
        let dir = TempDir::new().unwrap();
        let result = AssetArchiver::default()
            .extract_archive(&dir.path().join("none.zip"), dir.path(), CancellationToken::new())
            .run();
        assert!(result.is_err());
    }
}
