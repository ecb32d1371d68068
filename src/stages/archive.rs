//! Downloads repository archives and expands them into per-file records.

use crate::Result;
use crate::model::{FileRecord, ResolvedRepository};
use crate::pipeline::{Outlet, Stage, StageName};
use bytes::Bytes;
use ohno::{IntoAppError, bail};
use std::io::{Cursor, Read};
use tokio::sync::mpsc;
use tokio::task::spawn_blocking;
use zip::ZipArchive;

const LOG_TARGET: &str = "   archive";

/// Records decoded ahead of the stage's outlet.
const EXPANSION_BUFFER: usize = 16;

type Archive = ZipArchive<Cursor<Bytes>>;

/// Fetches the ZIP archive of each repository at its resolved ref.
///
/// Every regular file in the archive becomes one [`FileRecord`]. An entry that cannot be
/// read still produces a record, with the error set and no source. A repository whose
/// archive cannot be downloaded or opened produces nothing and is counted as skipped.
#[derive(Debug, Clone)]
pub struct ArchiveFetcher {
    client: reqwest::Client,
    web_url: String,
}

impl ArchiveFetcher {
    #[must_use]
    pub fn new(client: reqwest::Client, web_url: &str) -> Self {
        Self {
            client,
            web_url: web_url.trim_end_matches('/').to_string(),
        }
    }

    #[must_use]
    pub fn archive_url(&self, repository: &ResolvedRepository) -> String {
        format!(
            "{}/{}/{}/archive/{}.zip",
            self.web_url,
            repository.org_name(),
            repository.repo_name(),
            repository.git_ref
        )
    }

    async fn download(&self, repository: &ResolvedRepository) -> Result<Archive> {
        let url = self.archive_url(repository);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .into_app_err_with(|| format!("downloading '{url}'"))?;

        let status = resp.status();
        if !status.is_success() {
            bail!("archive '{url}' returned HTTP status {status}");
        }

        let body = resp.bytes().await.into_app_err_with(|| format!("reading '{url}'"))?;
        log::debug!(target: LOG_TARGET, "Downloaded {} bytes for '{repository}'", body.len());

        ZipArchive::new(Cursor::new(body)).into_app_err_with(|| format!("opening archive '{url}'"))
    }
}

impl Stage for ArchiveFetcher {
    type In = ResolvedRepository;
    type Out = FileRecord;

    fn name(&self) -> StageName {
        StageName::Archive
    }

    async fn process(&mut self, repository: ResolvedRepository, outlet: &Outlet<FileRecord>) -> Result<()> {
        let mut archive = match self.download(&repository).await {
            Ok(archive) => archive,
            Err(e) => {
                log::warn!(target: LOG_TARGET, "Skipping '{repository}': {e:#}");
                outlet.record_skip();
                return Ok(());
            }
        };

        // Decompression runs on the blocking pool; records come back in archive order.
        let (tx, mut rx) = mpsc::channel(EXPANSION_BUFFER);
        let owner = repository.clone();
        let expander = spawn_blocking(move || {
            let mut files = 0_usize;
            for index in 0..archive.len() {
                if let Some(record) = read_entry(&mut archive, index, &owner) {
                    files += 1;
                    if tx.blocking_send(record).is_err() {
                        break;
                    }
                }
            }
            files
        });

        while let Some(record) = rx.recv().await {
            outlet.send(record).await?;
        }

        let files = expander
            .await
            .into_app_err_with(|| format!("expanding the archive of '{repository}'"))?;

        log::debug!(target: LOG_TARGET, "Expanded {files} files from '{repository}'");
        Ok(())
    }
}

/// Read one entry, or `None` for directories.
fn read_entry(archive: &mut Archive, index: usize, repository: &ResolvedRepository) -> Option<FileRecord> {
    let name = archive.name_for_index(index).unwrap_or_default().to_string();
    if name.ends_with('/') {
        return None;
    }

    let mut entry = match archive.by_index(index) {
        Ok(entry) => entry,
        Err(e) => return Some(FileRecord::failed(name, repository.clone(), e.to_string())),
    };

    let mut buf = Vec::new();
    if let Err(e) = entry.read_to_end(&mut buf) {
        return Some(FileRecord::failed(name, repository.clone(), e.to_string()));
    }

    let source = String::from_utf8_lossy(&buf).into_owned();
    Some(FileRecord::decoded(name, source, repository.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DependentRepository;
    use crate::pipeline::{NoopObserver, bounded};
    use std::io::Write;
    use std::sync::Arc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};
    use zip::write::SimpleFileOptions;

    fn resolved() -> ResolvedRepository {
        ResolvedRepository {
            repository: DependentRepository {
                org_name: "acme".into(),
                repo_name: "shop".into(),
                stars: 5,
                forks: 0,
            },
            git_ref: "abc123".into(),
        }
    }

    fn zip_of(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        for (name, contents) in entries {
            if name.ends_with('/') {
                writer.add_directory(*name, options).unwrap();
            } else {
                writer.start_file(*name, options).unwrap();
                writer.write_all(contents).unwrap();
            }
        }
        writer.finish().unwrap().into_inner()
    }

    async fn collect(fetcher: &mut ArchiveFetcher) -> (Vec<FileRecord>, u64) {
        let (outlet, mut inlet) = bounded(StageName::Archive, 64, Arc::new(NoopObserver));
        fetcher.process(resolved(), &outlet).await.unwrap();
        let skipped = outlet.counts().skipped;
        drop(outlet);

        let mut records = Vec::new();
        while let Some(record) = inlet.recv().await {
            records.push(record);
        }
        (records, skipped)
    }

    #[test]
    fn test_archive_url() {
        let fetcher = ArchiveFetcher::new(reqwest::Client::new(), "https://github.com/");
        assert_eq!(
            fetcher.archive_url(&resolved()),
            "https://github.com/acme/shop/archive/abc123.zip"
        );
    }

    #[tokio::test]
    #[cfg_attr(miri, ignore = "Miri cannot call tokio runtime")]
    async fn test_emits_one_record_per_regular_file() {
        let server = MockServer::start().await;
        let body = zip_of(&[
            ("shop-abc123/", b""),
            ("shop-abc123/src/", b""),
            ("shop-abc123/src/App.js", b"import x from 'y';"),
            ("shop-abc123/README.md", b"# shop"),
            ("shop-abc123/logo.bin", &[0xff, 0xfe, 0x41]),
        ]);

        Mock::given(method("GET"))
            .and(path("/acme/shop/archive/abc123.zip"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
            .mount(&server)
            .await;

        let mut fetcher = ArchiveFetcher::new(reqwest::Client::new(), &server.uri());
        let (records, skipped) = collect(&mut fetcher).await;

        assert_eq!(skipped, 0);
        let names: Vec<_> = records.iter().map(|r| r.file_name.as_str()).collect();
        assert_eq!(
            names,
            vec!["shop-abc123/src/App.js", "shop-abc123/README.md", "shop-abc123/logo.bin"]
        );
        assert_eq!(records[0].source, "import x from 'y';");
        assert!(records.iter().all(|r| r.error.is_none()));
        assert!(records[2].source.ends_with('A'));
    }

    #[tokio::test]
    #[cfg_attr(miri, ignore = "Miri cannot call tokio runtime")]
    async fn test_unreadable_entry_still_produces_a_record() {
        let server = MockServer::start().await;
        let mut body = zip_of(&[("shop-abc123/a.js", b"bad!"), ("shop-abc123/b.js", b"good")]);

        // Stored entries keep their bytes verbatim, so this breaks a.js's checksum only.
        let at = body.windows(4).position(|w| w == b"bad!").unwrap();
        body[at..at + 4].copy_from_slice(b"BAD?");

        Mock::given(method("GET"))
            .and(path("/acme/shop/archive/abc123.zip"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
            .mount(&server)
            .await;

        let mut fetcher = ArchiveFetcher::new(reqwest::Client::new(), &server.uri());
        let (records, skipped) = collect(&mut fetcher).await;

        assert_eq!(skipped, 0);
        assert_eq!(records.len(), 2);

        assert_eq!(records[0].file_name, "shop-abc123/a.js");
        assert!(records[0].error.is_some());
        assert!(records[0].source.is_empty());

        assert_eq!(records[1].file_name, "shop-abc123/b.js");
        assert_eq!(records[1].source, "good");
        assert!(records[1].error.is_none());
    }

    #[tokio::test]
    #[cfg_attr(miri, ignore = "Miri cannot call tokio runtime")]
    async fn test_missing_archive_is_skipped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let mut fetcher = ArchiveFetcher::new(reqwest::Client::new(), &server.uri());
        let (records, skipped) = collect(&mut fetcher).await;

        assert!(records.is_empty());
        assert_eq!(skipped, 1);
    }

    #[tokio::test]
    #[cfg_attr(miri, ignore = "Miri cannot call tokio runtime")]
    async fn test_corrupt_archive_is_skipped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"definitely not a zip".to_vec()))
            .mount(&server)
            .await;

        let mut fetcher = ArchiveFetcher::new(reqwest::Client::new(), &server.uri());
        let (records, skipped) = collect(&mut fetcher).await;

        assert!(records.is_empty());
        assert_eq!(skipped, 1);
    }
}
