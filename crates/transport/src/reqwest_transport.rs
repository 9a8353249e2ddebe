//! reqwest-backed transport
//!
//! Resolves request paths against the configured API base URL and forwards
//! method, query, headers and body as-is. The response is returned verbatim,
//! including error statuses; only a missing response is an `Err`.

use std::time::Duration;

use tracing::{debug, instrument};

use crate::error::{Error, Result};
use crate::request::{ApiRequest, ApiResponse, FormPart, MultipartForm};
use crate::{SendFuture, Transport};

/// Production transport over a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            timeout,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build the full URL for a request path.
    ///
    /// Absolute `http(s)://` paths are used untouched; everything else is
    /// joined to the base URL with exactly one `/` between them.
    pub fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    #[instrument(skip_all, fields(method = %request.method, path = %request.path))]
    async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let url = self.url_for(&request.path);

        let mut headers = request.headers.clone();
        if request.form.is_some() {
            headers.remove(reqwest::header::CONTENT_TYPE);
        }
        let mut builder = self
            .client
            .request(request.method.clone(), &url)
            .headers(headers)
            .timeout(self.timeout);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(form) = &request.form {
            builder = builder.multipart(encode_form(form)?);
        } else if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(Error::from)?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::Body(e.to_string()))?;

        debug!(status = status.as_u16(), bytes = body.len(), "response received");
        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }
}

/// Build a fresh reqwest form; each send gets its own boundary.
fn encode_form(form: &MultipartForm) -> Result<reqwest::multipart::Form> {
    let mut encoded = reqwest::multipart::Form::new();
    for part in form.parts() {
        encoded = match part {
            FormPart::Text { name, value } => encoded.text(name.clone(), value.clone()),
            FormPart::File {
                name,
                file_name,
                mime,
                data,
            } => {
                let mut file = reqwest::multipart::Part::bytes(data.to_vec()).file_name(file_name.clone());
                if let Some(mime) = mime {
                    file = file
                        .mime_str(mime)
                        .map_err(|e| Error::Encode(format!("form part {name}: {e}")))?;
                }
                encoded.part(name.clone(), file)
            }
        };
    }
    Ok(encoded)
}

impl Transport for ReqwestTransport {
    fn id(&self) -> &str {
        "reqwest"
    }

    fn send<'a>(&'a self, request: &'a ApiRequest) -> SendFuture<'a> {
        Box::pin(self.execute(request))
    }
}
