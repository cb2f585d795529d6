//! Streamed model sources delivered to the sandbox frame by frame

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;

use crate::error::{Error, Result};

/// A model payload of known size read as a sequence of frames
#[async_trait]
pub trait ModelSource: Send {
    /// Total payload size in bytes
    fn size(&self) -> u64;

    /// Next frame, or `None` once the payload is exhausted
    async fn next_frame(&mut self) -> Result<Option<Bytes>>;

    /// Human-readable origin for logging
    fn describe(&self) -> String;
}

/// Model file on local disk
pub struct FileSource {
    path: PathBuf,
    file: tokio::fs::File,
    size: u64,
    frame_size: usize,
}

impl FileSource {
    /// Open a local model file
    pub async fn open(path: impl AsRef<Path>, frame_size: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = tokio::fs::File::open(&path).await?;
        let size = file.metadata().await?.len();

        Ok(Self {
            path,
            file,
            size,
            frame_size: frame_size.max(1),
        })
    }
}

#[async_trait]
impl ModelSource for FileSource {
    fn size(&self) -> u64 {
        self.size
    }

    async fn next_frame(&mut self) -> Result<Option<Bytes>> {
        let mut frame = Vec::with_capacity(self.frame_size);
        (&mut self.file)
            .take(self.frame_size as u64)
            .read_to_end(&mut frame)
            .await?;

        Ok((!frame.is_empty()).then(|| Bytes::from(frame)))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// In-memory payload split into frames without copying
pub struct BytesSource {
    data: Bytes,
    size: u64,
    frame_size: usize,
}

impl BytesSource {
    pub fn new(data: impl Into<Bytes>, frame_size: usize) -> Self {
        let data = data.into();
        Self {
            size: data.len() as u64,
            data,
            frame_size: frame_size.max(1),
        }
    }
}

#[async_trait]
impl ModelSource for BytesSource {
    fn size(&self) -> u64 {
        self.size
    }

    async fn next_frame(&mut self) -> Result<Option<Bytes>> {
        if self.data.is_empty() {
            return Ok(None);
        }
        let n = self.frame_size.min(self.data.len());
        Ok(Some(self.data.split_to(n)))
    }

    fn describe(&self) -> String {
        format!("memory ({} bytes)", self.size)
    }
}

/// Model streamed from an HTTP download
pub struct HttpSource {
    url: String,
    size: u64,
    body: BoxStream<'static, reqwest::Result<Bytes>>,
}

impl HttpSource {
    /// Start the download; the server must announce a Content-Length
    pub async fn fetch(client: &reqwest::Client, url: &str) -> Result<Self> {
        let response = client.get(url).send().await?.error_for_status()?;
        let size = response
            .content_length()
            .ok_or_else(|| Error::load("model source", format!("{} sent no Content-Length", url)))?;

        tracing::info!("Downloading model from {} ({} bytes)", url, size);

        Ok(Self {
            url: url.to_string(),
            size,
            body: response.bytes_stream().boxed(),
        })
    }
}

#[async_trait]
impl ModelSource for HttpSource {
    fn size(&self) -> u64 {
        self.size
    }

    async fn next_frame(&mut self) -> Result<Option<Bytes>> {
        match self.body.next().await {
            Some(frame) => Ok(Some(frame?)),
            None => Ok(None),
        }
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

/// Open a model from a local path or an http(s) URL
pub async fn open_source(location: &str, frame_size: usize) -> Result<Box<dyn ModelSource>> {
    if location.starts_with("http://") || location.starts_with("https://") {
        let client = reqwest::Client::new();
        Ok(Box::new(HttpSource::fetch(&client, location).await?))
    } else {
        Ok(Box::new(FileSource::open(location, frame_size).await?))
    }
}
