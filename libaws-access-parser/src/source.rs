use std::fs;
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

use flate2::read::MultiGzDecoder;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("failed to read object {bucket}/{key}: {source}")]
    Read {
        bucket: String,
        key: String,
        #[source]
        source: io::Error,
    },

    #[error("object key escapes its bucket: {key}")]
    InvalidKey { key: String },

    #[error("failed to decompress object {key}: {source}")]
    Decompress {
        key: String,
        #[source]
        source: io::Error,
    },
}

/// Storage that log files are fetched from.
///
/// `Ok(None)` means the object exists in name only: it is missing or has no
/// content.
pub trait ObjectSource {
    fn get_object(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>, SourceError>;
}

impl<T: ObjectSource + ?Sized> ObjectSource for &T {
    fn get_object(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>, SourceError> {
        (**self).get_object(bucket, key)
    }
}

/// Serves objects from `<root>/<bucket>/<key>` on the local filesystem.
#[derive(Clone, Debug)]
pub struct FsObjectSource {
    root: PathBuf,
}

impl FsObjectSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, SourceError> {
        let relative = Path::new(bucket).join(key);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(SourceError::InvalidKey {
                key: format!("{bucket}/{key}"),
            });
        }
        Ok(self.root.join(relative))
    }
}

impl ObjectSource for FsObjectSource {
    fn get_object(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>, SourceError> {
        let path = self.object_path(bucket, key)?;
        match fs::read(&path) {
            Ok(bytes) if bytes.is_empty() => Ok(None),
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(SourceError::Read {
                bucket: bucket.to_string(),
                key: key.to_string(),
                source,
            }),
        }
    }
}

/// Turns a fetched object into log text. ALB writes `.log.gz` objects, which
/// are gunzipped first.
pub fn read_log_blob(bytes: &[u8], key: &str) -> Result<String, SourceError> {
    if !key.ends_with(".gz") {
        return Ok(String::from_utf8_lossy(bytes).into_owned());
    }

    let mut decoded = Vec::new();
    MultiGzDecoder::new(bytes)
        .read_to_end(&mut decoded)
        .map_err(|source| SourceError::Decompress {
            key: key.to_string(),
            source,
        })?;
    Ok(String::from_utf8_lossy(&decoded).into_owned())
}

#[test]
fn test_fs_object_source() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("logs/elb")).unwrap();
    fs::write(dir.path().join("logs/elb/a.log"), "hello").unwrap();
    fs::write(dir.path().join("logs/elb/empty.log"), "").unwrap();

    let source = FsObjectSource::new(dir.path());
    assert_eq!(
        source.get_object("logs", "elb/a.log").unwrap(),
        Some(b"hello".to_vec())
    );
    assert_eq!(source.get_object("logs", "elb/empty.log").unwrap(), None);
    assert_eq!(source.get_object("logs", "elb/missing.log").unwrap(), None);
    assert!(matches!(
        source.get_object("logs", "../secret"),
        Err(SourceError::InvalidKey { .. })
    ));
}

#[test]
fn test_read_log_blob() {
    use flate2::{write::GzEncoder, Compression};
    use std::io::Write;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(b"line one\nline two\n").unwrap();
    let gz = encoder.finish().unwrap();

    assert_eq!(read_log_blob(&gz, "a.log.gz").unwrap(), "line one\nline two\n");
    assert_eq!(read_log_blob(b"plain", "a.log").unwrap(), "plain");
    assert!(matches!(
        read_log_blob(b"not gzip", "a.log.gz"),
        Err(SourceError::Decompress { .. })
    ));
}
