//! Confluent Schema Registry REST client.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::{AvroCodec, ResolveError, SchemaEntry, SchemaResolver};

/// Used when no registry host is configured.
pub const DEFAULT_REGISTRY_URL: &str = "http://localhost:8081";

const ACCEPT: &str = "application/vnd.schemaregistry.v1+json";

#[derive(Debug, Deserialize)]
struct SubjectVersion {
    id: u32,
    #[serde(default)]
    version: Option<i32>,
    schema: String,
    #[serde(default, rename = "schemaType")]
    schema_type: Option<String>,
}

/// Uncached client for `GET /subjects/{subject}/versions/latest`.
///
/// Hosts are tried in order; a host that cannot be reached hands over to
/// the next one. Any HTTP answer from a host is final.
#[derive(Debug, Clone)]
pub struct ConfluentClient {
    http: reqwest::Client,
    hosts: Arc<[Url]>,
}

impl ConfluentClient {
    #[instrument(skip_all)]
    pub fn new(hosts: &[String], timeout: Duration) -> anyhow::Result<Self> {
        let hosts: Vec<Url> = if hosts.is_empty() {
            vec![Url::parse(DEFAULT_REGISTRY_URL)?]
        } else {
            hosts
                .iter()
                .map(|h| {
                    Url::parse(h)
                        .with_context(|| format!("invalid registry url {h}"))
                })
                .collect::<anyhow::Result<_>>()?
        };

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building schema registry http client")?;

        Ok(Self {
            http,
            hosts: hosts.into(),
        })
    }

    pub fn hosts(&self) -> &[Url] {
        &self.hosts
    }

    fn latest_url(host: &Url, subject: &str) -> Result<Url, ResolveError> {
        let mut url = host.clone();
        url.path_segments_mut()
            .map_err(|_| ResolveError::Unavailable {
                details: format!("registry url {host} cannot be a base").into(),
            })?
            .pop_if_empty()
            .extend(["subjects", subject, "versions", "latest"]);
        Ok(url)
    }

    async fn fetch(
        &self,
        host: &Url,
        subject: &str,
    ) -> Result<Result<SubjectVersion, ResolveError>, reqwest::Error> {
        let url = Self::latest_url(host, subject);
        let url = match url {
            Ok(url) => url,
            Err(e) => return Ok(Err(e)),
        };

        let resp = self
            .http
            .get(url)
            .header(reqwest::header::ACCEPT, ACCEPT)
            .send()
            .await?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(Err(ResolveError::UnknownSubject(subject.to_string())));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Ok(Err(ResolveError::Unavailable {
                details: format!("{host} answered {status}: {body}").into(),
            }));
        }

        Ok(resp.json::<SubjectVersion>().await.map_err(|e| {
            ResolveError::Unavailable {
                details: format!("malformed registry response: {e}").into(),
            }
        }))
    }
}

#[async_trait]
impl SchemaResolver for ConfluentClient {
    async fn resolve(
        &self,
        subject: &str,
    ) -> Result<Arc<SchemaEntry>, ResolveError> {
        let mut last_err = None;

        for host in self.hosts.iter() {
            match self.fetch(host, subject).await {
                Ok(result) => {
                    let found = result?;
                    let kind = found.schema_type.as_deref().unwrap_or("AVRO");
                    if !kind.eq_ignore_ascii_case("AVRO") {
                        return Err(ResolveError::InvalidSchema {
                            subject: subject.to_string(),
                            details: format!("unsupported schema type {kind}")
                                .into(),
                        });
                    }

                    let codec = AvroCodec::parse(&found.schema).map_err(|e| {
                        ResolveError::InvalidSchema {
                            subject: subject.to_string(),
                            details: e.to_string().into(),
                        }
                    })?;
                    debug!(
                        %subject,
                        %host,
                        schema_id = found.id,
                        version = ?found.version,
                        "fetched latest schema"
                    );
                    return Ok(Arc::new(SchemaEntry {
                        id: found.id,
                        codec: Arc::new(codec),
                    }));
                }
                Err(e) => {
                    warn!(%host, %subject, error = %e, "schema registry host unreachable");
                    last_err = Some(e);
                }
            }
        }

        Err(ResolveError::Unavailable {
            details: match last_err {
                Some(e) => e.to_string().into(),
                None => "no schema registry hosts configured".into(),
            },
        })
    }
}
