//! Gzip compression of rotated-out files.

use std::io;
use std::path::{Path, PathBuf};

/// Path the compressed copy of `path` is written to.
pub fn gz_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".gz");
    PathBuf::from(name)
}

/// Compress `path` into `<path>.gz` and remove the original.
///
/// The original is only removed once the compressed copy has been fully
/// written. A partial `.gz` left behind by a failed attempt is removed.
#[cfg(feature = "compress")]
pub fn compress_file(path: &Path) -> io::Result<PathBuf> {
    use flate2::{Compression, write::GzEncoder};
    use std::fs::File;

    let target = gz_path(path);
    let result = (|| -> io::Result<()> {
        let mut source = File::open(path)?;
        let mut encoder = GzEncoder::new(File::create(&target)?, Compression::default());
        io::copy(&mut source, &mut encoder)?;
        encoder.finish()?.sync_all()
    })();

    if let Err(e) = result {
        let _ = std::fs::remove_file(&target);
        return Err(e);
    }

    std::fs::remove_file(path)?;
    Ok(target)
}

/// Compression is compiled out.
#[cfg(not(feature = "compress"))]
pub fn compress_file(path: &Path) -> io::Result<PathBuf> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        format!(
            "cannot compress {}: built without the `compress` feature",
            path.display()
        ),
    ))
}
