/// Chunked N-Triples archive (`.tar.gz`)
///
/// Layout:
///   triples/chunk-00000.nt
///   triples/chunk-00001.nt
///   ...
///   manifest.json   (always the last entry)
///
/// Entries carry fixed metadata so the same triples produce identical bytes.
use crate::graph::triple::Triple;
use crate::{FloraError, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tar::{Archive, Builder, Header};
use tracing::{debug, info};

pub const ARCHIVE_FORMAT: &str = "florakb-ntriples";
pub const ARCHIVE_VERSION: u32 = 1;
pub const MANIFEST_NAME: &str = "manifest.json";
const CHUNK_DIR: &str = "triples";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkEntry {
    pub name: String,
    pub triples: u64,
    pub sha256: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveManifest {
    pub format: String,
    pub version: u32,
    pub base_uri: String,
    pub chunks: Vec<ChunkEntry>,
    pub total_triples: u64,
}

/// Streams triples into size-bounded chunk entries
pub struct ArchiveWriter {
    target: PathBuf,
    partial: PathBuf,
    builder: Builder<GzEncoder<BufWriter<File>>>,
    max_triples_per_chunk: usize,
    buffer: Vec<u8>,
    buffered: u64,
    manifest: ArchiveManifest,
}

impl ArchiveWriter {
    pub fn create<P: AsRef<Path>>(path: P, base_uri: &str, max_triples_per_chunk: usize) -> Result<Self> {
        if max_triples_per_chunk == 0 {
            return Err(FloraError::Config(
                "max_triples_per_chunk must be greater than zero".to_string(),
            ));
        }
        let target = path.as_ref().to_path_buf();
        if let Some(parent) = target.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut partial = target.clone().into_os_string();
        partial.push(".partial");
        let partial = PathBuf::from(partial);

        let file = BufWriter::new(File::create(&partial)?);
        let encoder = GzEncoder::new(file, Compression::default());

        Ok(Self {
            target,
            partial,
            builder: Builder::new(encoder),
            max_triples_per_chunk,
            buffer: Vec::new(),
            buffered: 0,
            manifest: ArchiveManifest {
                format: ARCHIVE_FORMAT.to_string(),
                version: ARCHIVE_VERSION,
                base_uri: base_uri.to_string(),
                chunks: Vec::new(),
                total_triples: 0,
            },
        })
    }

    pub fn push(&mut self, triple: &Triple) -> Result<()> {
        writeln!(self.buffer, "{}", triple)?;
        self.buffered += 1;
        if self.buffered as usize >= self.max_triples_per_chunk {
            self.flush_chunk()?;
        }
        Ok(())
    }

    fn flush_chunk(&mut self) -> Result<()> {
        if self.buffered == 0 {
            return Ok(());
        }
        let name = format!("{}/chunk-{:05}.nt", CHUNK_DIR, self.manifest.chunks.len());
        let sha256 = format!("{:x}", Sha256::digest(&self.buffer));
        append_entry(&mut self.builder, &name, &self.buffer)?;
        debug!(chunk = %name, triples = self.buffered, "Wrote chunk");

        self.manifest.total_triples += self.buffered;
        self.manifest.chunks.push(ChunkEntry {
            name,
            triples: self.buffered,
            sha256,
        });
        self.buffer.clear();
        self.buffered = 0;
        Ok(())
    }

    /// Write the manifest and move the archive into place
    pub fn finish(mut self) -> Result<ArchiveManifest> {
        self.flush_chunk()?;
        let manifest_json = serde_json::to_vec_pretty(&self.manifest)?;
        append_entry(&mut self.builder, MANIFEST_NAME, &manifest_json)?;

        let encoder = self.builder.into_inner()?;
        let mut file = encoder.finish()?;
        file.flush()?;
        drop(file);
        fs::rename(&self.partial, &self.target)?;

        info!(
            path = %self.target.display(),
            chunks = self.manifest.chunks.len(),
            triples = self.manifest.total_triples,
            "Archive written"
        );
        Ok(self.manifest)
    }

    /// Drop the partially written file
    pub fn abort(self) {
        let partial = self.partial.clone();
        drop(self.builder);
        let _ = fs::remove_file(partial);
    }
}

fn append_entry<W: Write>(builder: &mut Builder<W>, name: &str, data: &[u8]) -> Result<()> {
    let mut header = Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(0);
    header.set_uid(0);
    header.set_gid(0);
    builder.append_data(&mut header, name, data)?;
    Ok(())
}

/// Write every triple of `triples` into a new archive at `path`
pub fn write_archive<I, P>(
    triples: I,
    path: P,
    base_uri: &str,
    max_triples_per_chunk: usize,
    mut on_triple: impl FnMut(u64),
) -> Result<ArchiveManifest>
where
    I: IntoIterator<Item = Result<Triple>>,
    P: AsRef<Path>,
{
    let mut writer = ArchiveWriter::create(path, base_uri, max_triples_per_chunk)?;
    let mut written = 0u64;
    for triple in triples {
        let pushed = triple.and_then(|t| writer.push(&t));
        if let Err(err) = pushed {
            writer.abort();
            return Err(err);
        }
        written += 1;
        on_triple(written);
    }
    writer.finish()
}

/// Two-pass reader: the manifest first, then digest-verified chunks
pub struct ArchiveReader {
    path: PathBuf,
    manifest: ArchiveManifest,
}

impl ArchiveReader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut archive = open_tar(&path)?;

        let mut manifest = None;
        for entry in archive.entries()? {
            let mut entry = entry?;
            if entry.path()?.to_string_lossy() == MANIFEST_NAME {
                let mut data = Vec::new();
                entry.read_to_end(&mut data)?;
                manifest = Some(serde_json::from_slice::<ArchiveManifest>(&data)?);
            }
        }

        let manifest = manifest.ok_or_else(|| {
            FloraError::Archive(format!("{} has no {}", path.display(), MANIFEST_NAME))
        })?;
        if manifest.format != ARCHIVE_FORMAT || manifest.version > ARCHIVE_VERSION {
            return Err(FloraError::Archive(format!(
                "Unsupported archive format {} v{}",
                manifest.format, manifest.version
            )));
        }
        Ok(Self { path, manifest })
    }

    pub fn manifest(&self) -> &ArchiveManifest {
        &self.manifest
    }

    /// Hand each chunk's triples to `handle` in archive order
    pub fn for_each_chunk<F>(&self, mut handle: F) -> Result<()>
    where
        F: FnMut(&ChunkEntry, Vec<Triple>) -> Result<()>,
    {
        let mut archive = open_tar(&self.path)?;
        let mut seen = 0usize;

        for entry in archive.entries()? {
            let mut entry = entry?;
            let name = entry.path()?.to_string_lossy().into_owned();
            if name == MANIFEST_NAME {
                continue;
            }
            let chunk = self
                .manifest
                .chunks
                .iter()
                .find(|c| c.name == name)
                .ok_or_else(|| FloraError::Archive(format!("Entry {} is not in the manifest", name)))?;

            let mut data = Vec::new();
            entry.read_to_end(&mut data)?;
            let actual = format!("{:x}", Sha256::digest(&data));
            if actual != chunk.sha256 {
                return Err(FloraError::Archive(format!(
                    "Checksum mismatch for {}: expected {}, got {}",
                    name, chunk.sha256, actual
                )));
            }

            let text = String::from_utf8(data)
                .map_err(|e| FloraError::Archive(format!("{} is not UTF-8: {}", name, e)))?;
            let triples = text
                .lines()
                .filter(|line| !line.trim().is_empty() && !line.starts_with('#'))
                .map(Triple::parse)
                .collect::<Result<Vec<_>>>()?;
            if triples.len() as u64 != chunk.triples {
                return Err(FloraError::Archive(format!(
                    "{} holds {} triples, manifest says {}",
                    name,
                    triples.len(),
                    chunk.triples
                )));
            }

            seen += 1;
            handle(chunk, triples)?;
        }

        if seen != self.manifest.chunks.len() {
            return Err(FloraError::Archive(format!(
                "Archive holds {} of {} chunks listed in the manifest",
                seen,
                self.manifest.chunks.len()
            )));
        }
        Ok(())
    }
}

fn open_tar(path: &Path) -> Result<Archive<GzDecoder<File>>> {
    if !path.exists() {
        return Err(FloraError::NotFound(format!(
            "Archive file not found: {}",
            path.display()
        )));
    }
    Ok(Archive::new(GzDecoder::new(File::open(path)?)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::triple::Term;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn sample(n: usize) -> Vec<Triple> {
        (0..n)
            .map(|i| {
                Triple::new(
                    format!("https://example.org/taxon/{}", i),
                    "https://example.org/relation#name",
                    Term::string(format!("Taxon {}", i)),
                )
            })
            .collect()
    }

    fn write(path: &Path, triples: &[Triple], max: usize) -> ArchiveManifest {
        write_archive(
            triples.iter().cloned().map(Ok),
            path,
            "https://example.org",
            max,
            |_| {},
        )
        .unwrap()
    }

    #[test]
    fn test_chunking_and_manifest() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.tar.gz");
        let triples = sample(5);

        let manifest = write(&path, &triples, 2);
        assert_eq!(manifest.total_triples, 5);
        let counts: Vec<u64> = manifest.chunks.iter().map(|c| c.triples).collect();
        assert_eq!(counts, vec![2, 2, 1]);
        assert_eq!(manifest.chunks[0].name, "triples/chunk-00000.nt");
        assert!(!dir.path().join("out.tar.gz.partial").exists());

        let reader = ArchiveReader::open(&path).unwrap();
        assert_eq!(reader.manifest(), &manifest);
        let mut read = Vec::new();
        reader
            .for_each_chunk(|_, chunk| {
                read.extend(chunk);
                Ok(())
            })
            .unwrap();
        assert_eq!(read, triples);
    }

    #[test]
    fn test_archive_bytes_are_deterministic() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.tar.gz");
        let b = dir.path().join("b.tar.gz");
        write(&a, &sample(7), 3);
        write(&b, &sample(7), 3);
        assert_eq!(fs::read(&a).unwrap(), fs::read(&b).unwrap());
    }

    #[test]
    fn test_empty_export_has_manifest_only() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.tar.gz");
        let manifest = write(&path, &[], 10);
        assert!(manifest.chunks.is_empty());
        ArchiveReader::open(&path)
            .unwrap()
            .for_each_chunk(|_, _| panic!("no chunks expected"))
            .unwrap();
    }

    #[test]
    fn test_checksum_mismatch_is_fatal() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tampered.tar.gz");

        // Hand-build an archive whose manifest digest does not match
        let body = format!("{}\n", sample(1)[0]);
        let manifest = ArchiveManifest {
            format: ARCHIVE_FORMAT.to_string(),
            version: ARCHIVE_VERSION,
            base_uri: "https://example.org".to_string(),
            chunks: vec![ChunkEntry {
                name: "triples/chunk-00000.nt".to_string(),
                triples: 1,
                sha256: "0".repeat(64),
            }],
            total_triples: 1,
        };
        let file = File::create(&path).unwrap();
        let mut builder = Builder::new(GzEncoder::new(file, Compression::default()));
        append_entry(&mut builder, "triples/chunk-00000.nt", body.as_bytes()).unwrap();
        append_entry(
            &mut builder,
            MANIFEST_NAME,
            &serde_json::to_vec(&manifest).unwrap(),
        )
        .unwrap();
        builder.into_inner().unwrap().finish().unwrap();

        let err = ArchiveReader::open(&path)
            .unwrap()
            .for_each_chunk(|_, _| Ok(()))
            .unwrap_err();
        assert!(err.to_string().contains("Checksum mismatch"));
    }

    #[test]
    fn test_missing_archive() {
        let err = ArchiveReader::open("/nonexistent/export.tar.gz").err().unwrap();
        assert!(matches!(err, FloraError::NotFound(_)));
    }
}
