//! Replay of raw byte captures from a file
//!
//! A capture recorded from the optical port (e.g. with `cat /dev/ttyUSB0 > dump.bin`)
//! is streamed through the same pipeline as a live device. EOF ends the session
//! like a device disconnect.

use crate::error::{DlmsError, DlmsResult};
use crate::stream::{IoStream, LinkConnector, StreamAccessor};
use async_trait::async_trait;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct ReplayConnector {
    path: PathBuf,
}

impl ReplayConnector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl LinkConnector for ReplayConnector {
    async fn connect(&self) -> DlmsResult<Box<dyn StreamAccessor>> {
        let file = tokio::fs::File::open(&self.path)
            .await
            .map_err(DlmsError::Connection)?;
        Ok(Box::new(IoStream::new(file)))
    }

    fn describe(&self) -> String {
        format!("replay of {}", self.path.display())
    }

    fn ends_at_eof(&self) -> bool {
        true
    }
}
