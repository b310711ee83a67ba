// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Loading the job description, from the control server or a local file

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tk_core::{ConfigError, JobConfig};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("GET {url} returned {status}")]
    Status { url: String, status: u16 },
    #[error("GET {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Where the job description comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    JobStep(String),
    SnapshotImage(String),
    File(PathBuf),
}

fn endpoint(server: &str, collection: &str, id: &str) -> String {
    format!("{}/{collection}/{id}/", server.trim_end_matches('/'))
}

/// Fetches job descriptions, retrying transient failures at a fixed pace.
pub struct ConfigLoader {
    client: reqwest::Client,
    attempts: u32,
    retry_delay: Duration,
}

impl ConfigLoader {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            attempts: crate::env::CONFIG_ATTEMPTS,
            retry_delay: crate::env::config_retry_delay(),
        })
    }

    pub fn with_retries(mut self, attempts: u32, retry_delay: Duration) -> Self {
        self.attempts = attempts.max(1);
        self.retry_delay = retry_delay;
        self
    }

    /// Load and validate the job description named by `source`.
    pub async fn load(&self, source: &ConfigSource, server: &str) -> Result<JobConfig, LoadError> {
        let body = match source {
            ConfigSource::JobStep(id) => self.fetch(&endpoint(server, "jobsteps", id)).await?,
            ConfigSource::SnapshotImage(id) => {
                self.fetch(&endpoint(server, "snapshotimages", id)).await?
            }
            ConfigSource::File(path) => {
                tokio::fs::read(path).await.map_err(|source| LoadError::Read {
                    path: path.clone(),
                    source,
                })?
            }
        };
        Ok(JobConfig::from_json(server, &body)?)
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, LoadError> {
        let mut attempt = 1;
        loop {
            let err = match self.client.get(url).send().await {
                Ok(resp) if resp.status().is_success() => match resp.bytes().await {
                    Ok(body) => return Ok(body.to_vec()),
                    Err(source) => LoadError::Http {
                        url: url.to_string(),
                        source,
                    },
                },
                Ok(resp) => LoadError::Status {
                    url: url.to_string(),
                    status: resp.status().as_u16(),
                },
                Err(source) => LoadError::Http {
                    url: url.to_string(),
                    source,
                },
            };
            if attempt >= self.attempts {
                return Err(err);
            }
            tracing::warn!(attempt, error = %err, "job config fetch failed, retrying");
            attempt += 1;
            tokio::time::sleep(self.retry_delay).await;
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
