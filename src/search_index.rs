use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde_json::Value;

use crate::config::{IndexAuth, IndexConfig};
use crate::error::Error;

/// Raw hits and exact total from one `_search` call.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHits {
    pub hits: Vec<Value>,
    pub total: u64,
}

/// Thin Elasticsearch REST client: bounded timeout, retries on timeout only.
#[derive(Debug, Clone)]
pub struct SearchIndex {
    client: Client,
    base_url: Url,
    index: String,
    auth: IndexAuth,
    max_retries: u32,
}

impl SearchIndex {
    pub fn new(config: &IndexConfig) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        let base_url = Url::parse(&config.url)?;
        Ok(Self {
            client,
            base_url,
            index: config.index.clone(),
            auth: config.auth.clone(),
            max_retries: config.max_retries,
        })
    }

    fn url(&self, segments: &[&str]) -> Result<Url, Error> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Internal(format!("cannot use {} as a base URL", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth {
            IndexAuth::None => request,
            IndexAuth::ApiKey(key) => request.header("Authorization", format!("ApiKey {key}")),
            IndexAuth::Basic { username, password } => request.basic_auth(username, Some(password)),
        }
    }

    async fn send(&self, build: impl Fn() -> RequestBuilder) -> Result<Response, Error> {
        let mut attempt = 0;
        loop {
            match self.authorize(build()).send().await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_timeout() && attempt < self.max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        attempt,
                        max = self.max_retries,
                        "search index timed out, retrying"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn error_for_status(response: Response) -> Error {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let detail = format!("search index returned {status}: {body}");
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            Error::BackendUnavailable(detail)
        } else {
            Error::Internal(detail)
        }
    }

    pub async fn search(&self, body: &Value) -> Result<SearchHits, Error> {
        let url = self.url(&[self.index.as_str(), "_search"])?;
        let response = self
            .send(|| self.client.post(url.clone()).json(body))
            .await?;
        if !response.status().is_success() {
            return Err(Self::error_for_status(response).await);
        }

        let result: Value = response.json().await?;
        let hits = result
            .pointer("/hits/hits")
            .and_then(Value::as_array)
            .cloned()
            .ok_or_else(|| Error::Internal("search response has no hits array".to_string()))?;
        // older clusters report a bare number
        let total = match result.pointer("/hits/total") {
            Some(Value::Number(n)) => n.as_u64(),
            Some(total) => total.get("value").and_then(Value::as_u64),
            None => None,
        }
        .unwrap_or(0);

        Ok(SearchHits { hits, total })
    }

    /// Selected `_source` fields of one document, `None` when it does not exist.
    pub async fn get_source(&self, id: &str, fields: &[&str]) -> Result<Option<Value>, Error> {
        // dot segments are dropped from the path, so they would address the index itself
        if id == "." || id == ".." {
            return Ok(None);
        }
        let mut url = self.url(&[self.index.as_str(), "_doc", id])?;
        url.query_pairs_mut()
            .append_pair("_source_includes", &fields.join(","));
        let response = self.send(|| self.client.get(url.clone())).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Self::error_for_status(response).await);
        }
        let doc: Value = response.json().await?;
        if doc.get("found").and_then(Value::as_bool) == Some(false) {
            return Ok(None);
        }
        Ok(Some(doc.get("_source").cloned().unwrap_or(Value::Null)))
    }

    pub async fn ping(&self) -> Result<(), Error> {
        let url = self.url(&[self.index.as_str()])?;
        let response = self.send(|| self.client.head(url.clone())).await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Error::BackendUnavailable(format!(
                "index {} answered {}",
                self.index,
                response.status()
            )))
        }
    }
}
