use std::{
    io::Read,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use futures_util::stream::{self, StreamExt};
use sha1::Digest;

const DOWNLOAD_ATTEMPTS: u32 = 3;
const DEFAULT_CONCURRENCY: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DownloadEntry {
    pub url: String,
    pub dest: PathBuf,
    pub sha1: Option<String>,
}

/// Fetches files with retry and SHA-1 verification. Files already present
/// with a matching hash (or no known hash) are skipped.
#[derive(Clone)]
pub(crate) struct Downloader {
    client: reqwest::Client,
    concurrency: usize,
}

pub(crate) fn sha1_hex(bytes: &[u8]) -> String {
    hex::encode(sha1::Sha1::digest(bytes))
}

impl Downloader {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    pub async fn fetch_bytes(&self, url: &str) -> anyhow::Result<Vec<u8>> {
        let mut last_err: Option<anyhow::Error> = None;
        for attempt in 1..=DOWNLOAD_ATTEMPTS {
            let res: anyhow::Result<Vec<u8>> = async {
                let resp = self
                    .client
                    .get(url)
                    .send()
                    .await
                    .with_context(|| format!("GET {url}"))?
                    .error_for_status()
                    .with_context(|| format!("GET {url} (status)"))?;
                Ok(resp.bytes().await.context("read body")?.to_vec())
            }
            .await;

            match res {
                Ok(b) => return Ok(b),
                Err(e) => {
                    tracing::debug!(url, attempt, error = %e, "download attempt failed");
                    last_err = Some(e);
                    if attempt < DOWNLOAD_ATTEMPTS {
                        tokio::time::sleep(Duration::from_millis(200_u64 << (attempt - 1))).await;
                    }
                }
            }
        }
        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("download failed: {url}")))
    }

    pub async fn fetch_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> anyhow::Result<(T, String)> {
        let bytes = self.fetch_bytes(url).await?;
        let raw = String::from_utf8(bytes).with_context(|| format!("{url} is not UTF-8"))?;
        let value = serde_json::from_str(&raw).with_context(|| format!("parse {url}"))?;
        Ok((value, raw))
    }

    pub async fn download(&self, entry: &DownloadEntry) -> anyhow::Result<()> {
        if tokio::fs::try_exists(&entry.dest).await.unwrap_or(false) {
            let Some(expected) = entry.sha1.as_deref() else {
                return Ok(());
            };
            let existing = tokio::fs::read(&entry.dest).await?;
            if sha1_hex(&existing) == expected {
                return Ok(());
            }
            tracing::info!(path = %entry.dest.display(), "re-downloading corrupt file");
        }

        let bytes = self.fetch_bytes(&entry.url).await?;
        if let Some(expected) = entry.sha1.as_deref() {
            let got = sha1_hex(&bytes);
            if got != expected {
                anyhow::bail!(
                    "sha1 mismatch: expected {expected}, got {got} (url={} path={})",
                    entry.url,
                    entry.dest.display()
                );
            }
        }
        write_atomic(&entry.dest, &bytes).await
    }

    /// Downloads everything, `concurrency` at a time. Fails if any file failed.
    pub async fn download_all(&self, entries: Vec<DownloadEntry>) -> anyhow::Result<()> {
        let total = entries.len();
        let failures: Vec<(DownloadEntry, anyhow::Error)> = stream::iter(entries)
            .map(|entry| async move {
                let res = self.download(&entry).await;
                (entry, res)
            })
            .buffer_unordered(self.concurrency)
            .filter_map(|(entry, res)| async move { res.err().map(|e| (entry, e)) })
            .collect()
            .await;

        if let Some((entry, err)) = failures.into_iter().next() {
            return Err(err.context(format!(
                "failed to download {} (one of {total} files)",
                entry.dest.display()
            )));
        }
        Ok(())
    }
}

pub(crate) async fn write_atomic(dest: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("create {}", parent.display()))?;
    }
    let tmp = dest.with_extension("part");
    tokio::fs::write(&tmp, bytes)
        .await
        .with_context(|| format!("write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, dest)
        .await
        .with_context(|| format!("rename into {}", dest.display()))?;
    Ok(())
}

/// Unpacks a natives jar, skipping `META-INF` and any entry that would
/// escape `out_dir`.
pub(crate) fn extract_natives(jar: &Path, out_dir: &Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(out_dir)?;
    let f = std::fs::File::open(jar).with_context(|| format!("open {}", jar.display()))?;
    let mut archive = zip::ZipArchive::new(f).with_context(|| format!("read {}", jar.display()))?;

    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        if file.is_dir() {
            continue;
        }
        let Some(rel) = file.enclosed_name() else {
            tracing::warn!(entry = file.name(), "skipping unsafe natives entry");
            continue;
        };
        if rel.starts_with("META-INF") {
            continue;
        }
        let dest = out_dir.join(rel);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut buf = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut buf)?;
        std::fs::write(&dest, buf)?;
    }
    Ok(())
}
