// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Scan targets and the sources that stream them into the scheduler.

use std::collections::VecDeque;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::sync::mpsc;
use url::Url;

use crate::errors::EngineError;

/// One target as given by the user: a URL, `host:port` or a bare host.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScanTarget {
    raw: String,
}

impl ScanTarget {
    pub fn new<S: Into<String>>(raw: S) -> Self {
        Self {
            raw: raw.into().trim().to_string(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The target as a URL; targets without a scheme are treated as `http://`.
    pub fn url(&self) -> Option<Url> {
        if self.raw.contains("://") {
            Url::parse(&self.raw).ok()
        } else {
            Url::parse(&format!("http://{}", self.raw)).ok()
        }
        .filter(|url| url.host_str().is_some())
    }

    /// Host and port for raw socket protocols.
    pub fn host_port(&self) -> Option<(String, u16)> {
        let url = self.url()?;
        let host = url.host_str()?.to_string();
        let port = url.port_or_known_default()?;
        Some((host, port))
    }

    /// Key used by the host-errors cache: `host:port`, falling back to the raw text.
    pub fn host_key(&self) -> String {
        match self.host_port() {
            Some((host, port)) => format!("{}:{}", host, port),
            None => self.raw.clone(),
        }
    }
}

impl Display for ScanTarget {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

impl From<&str> for ScanTarget {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

/// A possibly streaming source of targets.
#[async_trait]
pub trait InputProvider: Send {
    /// Next target, `None` once exhausted.
    async fn next_target(&mut self) -> Result<Option<ScanTarget>, EngineError>;
}

fn is_target_line(line: &str) -> bool {
    let line = line.trim();
    !line.is_empty() && !line.starts_with('#')
}

/// Targets known up front.
#[derive(Debug, Default)]
pub struct ListInput {
    targets: VecDeque<ScanTarget>,
}

impl ListInput {
    pub fn new<I, S>(targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            targets: targets
                .into_iter()
                .map(Into::into)
                .filter(|raw| is_target_line(raw))
                .map(ScanTarget::new)
                .collect(),
        }
    }

    /// Splits a comma-separated list.
    pub fn parse(list: &str) -> Self {
        Self::new(list.split(','))
    }
}

#[async_trait]
impl InputProvider for ListInput {
    async fn next_target(&mut self) -> Result<Option<ScanTarget>, EngineError> {
        Ok(self.targets.pop_front())
    }
}

/// Targets read line by line from a file, without loading it whole.
pub struct FileInput {
    path: PathBuf,
    lines: Lines<BufReader<File>>,
}

impl FileInput {
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, EngineError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)
            .await
            .map_err(|e| EngineError::InputSource(format!("{}: {}", path.display(), e)))?;
        Ok(Self {
            path,
            lines: BufReader::new(file).lines(),
        })
    }
}

#[async_trait]
impl InputProvider for FileInput {
    async fn next_target(&mut self) -> Result<Option<ScanTarget>, EngineError> {
        loop {
            let line = self
                .lines
                .next_line()
                .await
                .map_err(|e| EngineError::InputSource(format!("{}: {}", self.path.display(), e)))?;
            match line {
                Some(line) if is_target_line(&line) => return Ok(Some(ScanTarget::new(line))),
                Some(_) => continue,
                None => return Ok(None),
            }
        }
    }
}

/// Targets pushed by another task; ends when every sender is dropped.
pub struct ChannelInput {
    receiver: mpsc::Receiver<ScanTarget>,
}

impl ChannelInput {
    pub fn new(capacity: usize) -> (mpsc::Sender<ScanTarget>, Self) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (sender, Self { receiver })
    }
}

#[async_trait]
impl InputProvider for ChannelInput {
    async fn next_target(&mut self) -> Result<Option<ScanTarget>, EngineError> {
        Ok(self.receiver.recv().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_host_key_normalizes_ports() {
        assert_eq!(ScanTarget::new("https://example.com/a").host_key(), "example.com:443");
        assert_eq!(ScanTarget::new("http://example.com").host_key(), "example.com:80");
        assert_eq!(ScanTarget::new("example.com:8080").host_key(), "example.com:8080");
        assert_eq!(ScanTarget::new("10.0.0.1").host_key(), "10.0.0.1:80");
    }

    #[test]
    fn test_host_port_for_raw_targets() {
        assert_eq!(
            ScanTarget::new("127.0.0.1:9000").host_port(),
            Some(("127.0.0.1".to_string(), 9000))
        );
    }

    #[tokio::test]
    async fn test_list_input_skips_blank_and_comment_lines() {
        let mut input = ListInput::parse("a.com, ,#skip,b.com");
        assert_eq!(input.next_target().await.unwrap(), Some(ScanTarget::new("a.com")));
        assert_eq!(input.next_target().await.unwrap(), Some(ScanTarget::new("b.com")));
        assert_eq!(input.next_target().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_input_streams_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "http://one.test\n\n# comment\nhttp://two.test").unwrap();

        let mut input = FileInput::open(file.path()).await.unwrap();
        let mut seen = Vec::new();
        while let Some(target) = input.next_target().await.unwrap() {
            seen.push(target.to_string());
        }
        assert_eq!(seen, vec!["http://one.test", "http://two.test"]);
    }

    #[tokio::test]
    async fn test_file_input_missing_file_is_input_error() {
        let result = FileInput::open("/definitely/not/here.txt").await;
        assert!(matches!(result, Err(EngineError::InputSource(_))));
    }

    #[tokio::test]
    async fn test_channel_input_ends_when_senders_drop() {
        let (sender, mut input) = ChannelInput::new(2);
        sender.send(ScanTarget::new("x.test")).await.unwrap();
        drop(sender);
        assert!(input.next_target().await.unwrap().is_some());
        assert!(input.next_target().await.unwrap().is_none());
    }
}
