use crate::types::{DriftError, DriftResult};
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use std::fs::File;
use std::path::{Path, PathBuf};
use zip::ZipArchive;

/// Name of the per-scene metadata document inside a delivery
pub const METADATA_FILENAME: &str = "metadata.xml";

/// XML element holding the scene's tile identifier
const TILE_ID_ELEMENT: &[u8] = b"TILE_ID";

/// A zipped per-scene band delivery.
///
/// The archive holds N single-band `B*.tif` rasters plus a `metadata.xml`
/// document. It is consumed (deleted) by the band merger on success and
/// retained on any failure so the delivery can be inspected or retried.
pub struct SceneArchive {
    zip_path: PathBuf,
}

impl SceneArchive {
    /// Create a reader for a scene delivery zip
    pub fn new<P: AsRef<Path>>(zip_path: P) -> DriftResult<Self> {
        let zip_path = zip_path.as_ref().to_path_buf();

        if !zip_path.exists() {
            return Err(DriftError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("File not found: {}", zip_path.display()),
            )));
        }

        Ok(Self { zip_path })
    }

    pub fn zip_path(&self) -> &Path {
        &self.zip_path
    }

    /// Sibling directory the archive extracts into (extension stripped)
    pub fn extraction_dir(&self) -> PathBuf {
        self.zip_path.with_extension("")
    }

    /// List all entries in the archive without extracting
    pub fn list_files(&self) -> DriftResult<Vec<String>> {
        let file = File::open(&self.zip_path)?;
        let mut archive = ZipArchive::new(file)
            .map_err(|e| DriftError::ArchiveIo(format!("Failed to open ZIP: {}", e)))?;

        let mut files = Vec::new();
        for i in 0..archive.len() {
            let entry = archive
                .by_index(i)
                .map_err(|e| DriftError::ArchiveIo(format!("Failed to access entry {}: {}", i, e)))?;
            files.push(entry.name().to_string());
        }

        Ok(files)
    }

    /// Extract the full archive into [`Self::extraction_dir`]
    pub fn extract(&self) -> DriftResult<PathBuf> {
        let target = self.extraction_dir();
        log::debug!(
            "Extracting {} into {}",
            self.zip_path.display(),
            target.display()
        );

        let file = File::open(&self.zip_path)?;
        let mut archive = ZipArchive::new(file)
            .map_err(|e| DriftError::ArchiveIo(format!("Failed to open ZIP: {}", e)))?;

        archive.extract(&target).map_err(|e| {
            DriftError::ArchiveIo(format!(
                "Failed to extract {}: {}",
                self.zip_path.display(),
                e
            ))
        })?;

        Ok(target)
    }
}

/// Discover `B*.tif` band rasters in an extraction directory.
///
/// Files are sorted lexicographically; the sort order fixes output band index
/// = spectral band identity and must not be changed.
pub fn band_files(extract_dir: &Path) -> DriftResult<Vec<PathBuf>> {
    let pattern = Regex::new(r"^B.*\.tif$")
        .map_err(|e| DriftError::ArchiveIo(format!("band pattern: {}", e)))?;

    let mut bands = Vec::new();
    for entry in std::fs::read_dir(extract_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if pattern.is_match(&name) {
            bands.push(entry.path());
        }
    }

    if bands.is_empty() {
        return Err(DriftError::MissingBands(format!(
            "no B*.tif rasters in {}",
            extract_dir.display()
        )));
    }

    bands.sort();
    Ok(bands)
}

/// Locate the metadata document in an extraction directory.
///
/// Deliveries usually place `metadata.xml` at the extraction root, but some
/// nest a single product folder; one subdirectory level is searched as well.
pub fn metadata_file(extract_dir: &Path) -> DriftResult<PathBuf> {
    let direct = extract_dir.join(METADATA_FILENAME);
    if direct.is_file() {
        return Ok(direct);
    }

    for entry in std::fs::read_dir(extract_dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            let nested = entry.path().join(METADATA_FILENAME);
            if nested.is_file() {
                return Ok(nested);
            }
        }
    }

    Err(DriftError::MissingMetadata(format!(
        "{} not found in {}",
        METADATA_FILENAME,
        extract_dir.display()
    )))
}

/// Extract the tile identifier from a metadata document.
///
/// The identifier is the text content of the `TILE_ID` element; attributes on
/// the element are ignored. A document without the element is a fatal error
/// for the owning archive.
pub fn read_tile_id(metadata_path: &Path) -> DriftResult<String> {
    let content = std::fs::read_to_string(metadata_path)?;
    tile_id_from_xml(&content).ok_or_else(|| {
        DriftError::MissingMetadata(format!(
            "TILE_ID not found in {}",
            metadata_path.display()
        ))
    })
}

fn tile_id_from_xml(content: &str) -> Option<String> {
    let mut reader = Reader::from_str(content);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut in_tile_id = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) if e.local_name().as_ref() == TILE_ID_ELEMENT => {
                in_tile_id = true;
            }
            Ok(Event::Text(ref t)) if in_tile_id => {
                let text = t.unescape().ok()?.trim().to_string();
                if !text.is_empty() {
                    return Some(text);
                }
            }
            Ok(Event::End(ref e)) if e.local_name().as_ref() == TILE_ID_ELEMENT => {
                // Element closed without text content
                return None;
            }
            Ok(Event::Eof) => return None,
            Ok(_) => {}
            Err(_) => return None,
        }
        buf.clear();
    }
}
