/// Dataset acquisition: fetch the WCVP archive and unpack it
use crate::core::config::{DownloadConfig, NetworkConfig};
use crate::resilience::retry::{with_retry, RetryPolicy};
use crate::utils::progress;
use crate::{FloraError, Result};
use reqwest::blocking::Client;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, Serialize)]
pub struct DownloadOutcome {
    pub path: PathBuf,
    pub bytes: u64,
    pub sha256: String,
    /// The file was already present and not fetched again
    pub reused: bool,
    pub extracted: Vec<PathBuf>,
}

pub struct Downloader {
    client: Client,
    retry: RetryPolicy,
    show_progress: bool,
}

impl Downloader {
    pub fn new(network: &NetworkConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(network.timeout())
            .connect_timeout(network.timeout().min(std::time::Duration::from_secs(30)))
            .build()?;
        Ok(Self {
            client,
            retry: network.retry_policy(),
            show_progress: false,
        })
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Download `config.url` into `dir` and unpack it when it is a zip
    pub fn fetch_dataset(&self, config: &DownloadConfig, dir: &Path, force: bool) -> Result<DownloadOutcome> {
        let file_name = config
            .url
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| FloraError::Config(format!("Cannot derive a file name from {}", config.url)))?;
        let target = dir.join(file_name);

        let mut outcome = self.fetch(&config.url, &target, force)?;
        if target.extension().and_then(|e| e.to_str()) == Some("zip") {
            outcome.extracted = extract_zip(&target, dir)?;
        }
        Ok(outcome)
    }

    /// Fetch `url` to `target`, skipping the request when the file exists
    pub fn fetch(&self, url: &str, target: &Path, force: bool) -> Result<DownloadOutcome> {
        if target.exists() && !force {
            info!(path = %target.display(), "Using existing download");
            return Ok(DownloadOutcome {
                path: target.to_path_buf(),
                bytes: fs::metadata(target)?.len(),
                sha256: sha256_file(target)?,
                reused: true,
                extracted: Vec::new(),
            });
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut partial = target.as_os_str().to_owned();
        partial.push(".partial");
        let partial = PathBuf::from(partial);

        info!(url, path = %target.display(), "Downloading");
        let (bytes, sha256) = with_retry(
            || self.fetch_once(url, &partial),
            &self.retry,
            "dataset download",
        )?;
        fs::rename(&partial, target)?;
        info!(bytes, sha256 = %sha256, "Download complete");

        Ok(DownloadOutcome {
            path: target.to_path_buf(),
            bytes,
            sha256,
            reused: false,
            extracted: Vec::new(),
        })
    }

    fn fetch_once(&self, url: &str, partial: &Path) -> Result<(u64, String)> {
        let mut response = self.client.get(url).send()?.error_for_status()?;
        let bar = progress::spinner("downloading", self.show_progress);

        let mut out = BufWriter::new(File::create(partial)?);
        let mut hasher = Sha256::new();
        let mut buffer = [0u8; 64 * 1024];
        let mut total = 0u64;
        loop {
            let n = response.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
            out.write_all(&buffer[..n])?;
            total += n as u64;
            bar.set_position(total);
        }
        out.flush()?;
        bar.finish_and_clear();

        Ok((total, format!("{:x}", hasher.finalize())))
    }
}

/// Hex SHA-256 of a file
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Unpack every file of a zip archive into `dir`
pub fn extract_zip(archive: &Path, dir: &Path) -> Result<Vec<PathBuf>> {
    let mut zip = zip::ZipArchive::new(File::open(archive)?)?;
    let mut extracted = Vec::new();

    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        let Some(relative) = entry.enclosed_name().map(Path::to_path_buf) else {
            return Err(FloraError::Archive(format!(
                "Unsafe path in {}: {}",
                archive.display(),
                entry.name()
            )));
        };
        let out_path = dir.join(relative);
        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = BufWriter::new(File::create(&out_path)?);
        io::copy(&mut entry, &mut out)?;
        debug!(path = %out_path.display(), "Extracted");
        extracted.push(out_path);
    }
    info!(files = extracted.len(), archive = %archive.display(), "Archive unpacked");
    Ok(extracted)
}

/// Unpack the single entry `name` of a zip archive into `dir`
pub fn extract_zip_entry(archive: &Path, name: &str, dir: &Path) -> Result<PathBuf> {
    let mut zip = zip::ZipArchive::new(File::open(archive)?)?;
    let mut entry = zip.by_name(name).map_err(|_| {
        FloraError::NotFound(format!("{} in {}", name, archive.display()))
    })?;
    let Some(relative) = entry.enclosed_name().map(Path::to_path_buf) else {
        return Err(FloraError::Archive(format!(
            "Unsafe path in {}: {}",
            archive.display(),
            entry.name()
        )));
    };
    let out_path = dir.join(relative);
    if let Some(parent) = out_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut out = BufWriter::new(File::create(&out_path)?);
    io::copy(&mut entry, &mut out)?;
    out.flush()?;
    debug!(path = %out_path.display(), "Extracted");
    Ok(out_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use zip::write::FileOptions;

    #[test]
    fn test_existing_file_is_reused() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("wcvp.zip");
        fs::write(&target, b"abc").unwrap();

        let downloader = Downloader::new(&NetworkConfig::default()).unwrap();
        let outcome = downloader
            .fetch("http://127.0.0.1:9/wcvp.zip", &target, false)
            .unwrap();
        assert!(outcome.reused);
        assert_eq!(outcome.bytes, 3);
        assert_eq!(
            outcome.sha256,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_extract_zip() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("wcvp.zip");
        {
            let mut zip = zip::ZipWriter::new(File::create(&archive).unwrap());
            zip.start_file("wcvp_names.csv", FileOptions::default()).unwrap();
            zip.write_all(b"plant_name_id|family\n1|Oxalidaceae\n").unwrap();
            zip.finish().unwrap();
        }

        let out = dir.path().join("out");
        let files = extract_zip(&archive, &out).unwrap();
        assert_eq!(files, vec![out.join("wcvp_names.csv")]);
        assert!(fs::read_to_string(&files[0]).unwrap().contains("Oxalidaceae"));
    }

    #[test]
    fn test_extract_single_entry() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("taxdmp.zip");
        {
            let mut zip = zip::ZipWriter::new(File::create(&archive).unwrap());
            zip.start_file("nodes.dmp", FileOptions::default()).unwrap();
            zip.write_all(b"1\t|\t1\t|\n").unwrap();
            zip.start_file("names.dmp", FileOptions::default()).unwrap();
            zip.write_all(b"3702\t|\tArabidopsis thaliana\t|\t\t|\tscientific name\t|\n").unwrap();
            zip.finish().unwrap();
        }

        let out = dir.path().join("ncbi");
        let path = extract_zip_entry(&archive, "names.dmp", &out).unwrap();
        assert_eq!(path, out.join("names.dmp"));
        assert!(!out.join("nodes.dmp").exists());
        assert!(extract_zip_entry(&archive, "merged.dmp", &out).is_err());
    }
}
