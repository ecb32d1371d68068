//! Streams records into a JSON array on disk.

use crate::Result;
use crate::pipeline::{Inlet, Sink, StageName};
use camino::{Utf8Path, Utf8PathBuf};
use core::marker::PhantomData;
use ohno::IntoAppError;
use serde::Serialize;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

const LOG_TARGET: &str = "      sink";

const OPEN: &[u8] = b"[\n";
const SEPARATOR: &[u8] = b"\n,";
const CLOSE: &[u8] = b"\n]\n";

/// Writes every record it receives as one element of a JSON array.
///
/// Records are serialized as they arrive, so memory use does not grow with the stream.
/// The array is closed whenever the inlet closes, including when the pipeline is torn
/// down after a failure, which leaves a valid JSON document behind.
#[derive(Debug)]
pub struct JsonArraySink<T> {
    path: Utf8PathBuf,
    writer: BufWriter<File>,
    _records: PhantomData<fn(T)>,
}

impl<T> JsonArraySink<T> {
    /// Create (or truncate) the output file.
    pub async fn create(path: impl AsRef<Utf8Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .into_app_err_with(|| format!("unable to create directory '{parent}'"))?;
        }

        let file = File::create(&path)
            .await
            .into_app_err_with(|| format!("unable to create output file '{path}'"))?;

        Ok(Self {
            path,
            writer: BufWriter::new(file),
            _records: PhantomData,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

impl<T: Serialize + Send + 'static> JsonArraySink<T> {
    async fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer
            .write_all(bytes)
            .await
            .into_app_err_with(|| format!("unable to write to '{}'", self.path))
    }

    async fn drain(&mut self, inlet: &mut Inlet<T>) -> Result<u64> {
        let mut written = 0_u64;
        while let Some(record) = inlet.recv().await {
            let json = serde_json::to_vec(&record).into_app_err("unable to serialize record")?;
            if written > 0 {
                self.write(SEPARATOR).await?;
            }
            self.write(&json).await?;
            written += 1;
        }
        Ok(written)
    }
}

impl<T: Serialize + Send + 'static> Sink for JsonArraySink<T> {
    type In = T;

    fn name(&self) -> StageName {
        StageName::Sink
    }

    async fn consume(mut self, mut inlet: Inlet<T>) -> Result<u64> {
        self.write(OPEN).await?;
        let written = self.drain(&mut inlet).await?;
        self.write(CLOSE).await?;

        self.writer
            .flush()
            .await
            .into_app_err_with(|| format!("unable to flush '{}'", self.path))?;

        log::info!(target: LOG_TARGET, "Wrote {written} record(s) to '{}'", self.path);
        Ok(written)
    }
}
