//! Command execution
//!
//! Each command returns the text to print on stdout; errors carry the
//! client's error category so scripts can tell a 404 from an expired session.

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use marketplace_client::{
    ApiClient, ApiRequest, ApiResponse, CancellationToken, Error, MultipartForm,
};
use tracing::info;

use crate::cli::Command;
use crate::config;

pub async fn run(client: &ApiClient, command: Command, cancel: &CancellationToken) -> Result<String> {
    match command {
        Command::Login {
            username,
            password_file,
        } => {
            let password = config::resolve_password(password_file.as_deref())?;
            client
                .login(&username, password.expose())
                .await
                .map_err(describe)?;
            Ok(format!("logged in as {username}"))
        }
        Command::Logout => {
            client.logout().await;
            Ok("logged out".to_string())
        }
        Command::Whoami => match client.hydrate().await.map_err(describe)? {
            Some(profile) => {
                serde_json::to_string_pretty(&profile).context("failed to render profile")
            }
            None => Ok("not logged in".to_string()),
        },
        Command::Verify => {
            if !client.is_authenticated().await {
                return Ok("not logged in".to_string());
            }
            let valid = client.verify_access().await.map_err(describe)?;
            Ok(if valid {
                "access token is valid".to_string()
            } else {
                "access token is invalid or expired".to_string()
            })
        }
        Command::Get { path, query } => {
            let request = query
                .into_iter()
                .fold(ApiRequest::get(path), |req, (k, v)| req.query(k, v));
            send(client, request, cancel).await
        }
        Command::Request {
            method,
            path,
            data,
            form,
            file,
        } => {
            let mut request = ApiRequest::new(method, path);
            if let Some(data) = data {
                let body: serde_json::Value =
                    serde_json::from_str(&data).context("--data must be valid JSON")?;
                request = request.json(&body)?;
            } else if !form.is_empty() || !file.is_empty() {
                request = request.multipart(build_form(form, file).await?);
            }
            send(client, request, cancel).await
        }
    }
}

async fn send(client: &ApiClient, request: ApiRequest, cancel: &CancellationToken) -> Result<String> {
    let response = client
        .request(request, Some(cancel))
        .await
        .map_err(describe)?;
    info!(status = response.status.as_u16(), "request completed");
    Ok(render(&response))
}

/// Text fields first, then files read from disk, each in argument order.
async fn build_form(fields: Vec<(String, String)>, files: Vec<(String, PathBuf)>) -> Result<MultipartForm> {
    let mut form = fields
        .into_iter()
        .fold(MultipartForm::new(), |form, (name, value)| form.text(name, value));
    for (name, path) in files {
        let data = tokio::fs::read(&path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| name.clone());
        form = form.file(name, file_name, data);
    }
    Ok(form)
}

/// Pretty JSON when the body parses, raw text otherwise.
fn render(response: &ApiResponse) -> String {
    match response.json::<serde_json::Value>() {
        Ok(value) => serde_json::to_string_pretty(&value).unwrap_or_else(|_| response.text()),
        Err(_) => response.text(),
    }
}

fn describe(err: Error) -> anyhow::Error {
    match err.status() {
        Some(status) => anyhow!("{} ({}): {}", err.code(), status.as_u16(), err.message()),
        None => anyhow!("{}: {}", err.code(), err.message()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Json;
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use marketplace_auth::CredentialStore;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use transport::ReqwestTransport;

    async fn start_backend() -> String {
        let app = axum::Router::new()
            .route(
                "/api/auth/me/",
                get(|headers: axum::http::HeaderMap| async move {
                    match headers.get("authorization").and_then(|v| v.to_str().ok()) {
                        Some("Bearer A1") => (
                            StatusCode::OK,
                            Json(json!({"user": {"username": "thandi"}, "roles": ["buyer"]})),
                        ),
                        _ => (
                            StatusCode::UNAUTHORIZED,
                            Json(json!({"detail": "Authentication credentials were not provided."})),
                        ),
                    }
                }),
            )
            .route(
                "/api/auth/token/verify/",
                post(|Json(body): Json<serde_json::Value>| async move {
                    if body["token"] == "A1" {
                        (StatusCode::OK, Json(json!({})))
                    } else {
                        (StatusCode::UNAUTHORIZED, Json(json!({"detail": "invalid"})))
                    }
                }),
            )
            .route(
                "/api/products/",
                get(|uri: axum::http::Uri| async move {
                    Json(json!({"query": uri.query().unwrap_or_default()}))
                }),
            )
            .route(
                "/api/me/cart/items/",
                post(|Json(body): Json<serde_json::Value>| async move {
                    (StatusCode::CREATED, Json(json!({"added": body})))
                }),
            )
            .route(
                "/api/vendor/products/",
                post(|headers: axum::http::HeaderMap, body: axum::body::Bytes| async move {
                    let content_type = headers
                        .get("content-type")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    Json(json!({
                        "content_type": content_type,
                        "body": String::from_utf8_lossy(&body),
                    }))
                }),
            )
            .route(
                "/api/products/999/",
                get(|| async { (StatusCode::NOT_FOUND, Json(json!({"detail": "Not found."}))) }),
            );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/api")
    }

    async fn client_for(base_url: &str, access: Option<&str>) -> ApiClient {
        let store = Arc::new(CredentialStore::in_memory());
        store.set_access(access.map(str::to_string)).await;
        let transport = ReqwestTransport::new(reqwest::Client::new(), base_url, Duration::from_secs(5));
        ApiClient::new(Arc::new(transport), store)
    }

    #[tokio::test]
    async fn whoami_prints_profile_or_not_logged_in() {
        let base = start_backend().await;
        let cancel = CancellationToken::new();

        let anonymous = client_for(&base, None).await;
        assert_eq!(run(&anonymous, Command::Whoami, &cancel).await.unwrap(), "not logged in");

        let signed_in = client_for(&base, Some("A1")).await;
        let output = run(&signed_in, Command::Whoami, &cancel).await.unwrap();
        let profile: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(profile["user"]["username"], "thandi");
        assert_eq!(profile["roles"], json!(["buyer"]));
    }

    #[tokio::test]
    async fn verify_reports_validity() {
        let base = start_backend().await;
        let cancel = CancellationToken::new();

        let client = client_for(&base, Some("A1")).await;
        assert_eq!(
            run(&client, Command::Verify, &cancel).await.unwrap(),
            "access token is valid"
        );
        let client = client_for(&base, Some("stale")).await;
        assert_eq!(
            run(&client, Command::Verify, &cancel).await.unwrap(),
            "access token is invalid or expired"
        );
    }

    #[tokio::test]
    async fn get_sends_query_and_renders_json() {
        let base = start_backend().await;
        let client = client_for(&base, None).await;

        let output = run(
            &client,
            Command::Get {
                path: "/products/".into(),
                query: vec![("vendor".into(), "12".into())],
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert!(output.contains(r#""query": "vendor=12""#), "got: {output}");
    }

    #[tokio::test]
    async fn request_posts_json_data() {
        let base = start_backend().await;
        let client = client_for(&base, None).await;

        let output = run(
            &client,
            Command::Request {
                method: transport::Method::POST,
                path: "/me/cart/items/".into(),
                data: Some(r#"{"product":5}"#.into()),
                form: Vec::new(),
                file: Vec::new(),
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        let body: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(body["added"]["product"], 5);
    }

    #[tokio::test]
    async fn request_sends_form_fields_and_files() {
        let base = start_backend().await;
        let client = client_for(&base, None).await;
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("mug.jpg");
        std::fs::write(&image, "JPEG-BYTES").unwrap();

        let output = run(
            &client,
            Command::Request {
                method: transport::Method::POST,
                path: "/vendor/products/".into(),
                data: None,
                form: vec![("name".into(), "Red mug".into())],
                file: vec![("images".into(), image)],
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        let echoed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert!(
            echoed["content_type"]
                .as_str()
                .unwrap()
                .starts_with("multipart/form-data")
        );
        let body = echoed["body"].as_str().unwrap();
        assert!(body.contains("Red mug"));
        assert!(body.contains(r#"name="images"; filename="mug.jpg""#));
        assert!(body.contains("JPEG-BYTES"));
    }

    #[tokio::test]
    async fn missing_upload_file_is_reported() {
        let client = client_for("http://127.0.0.1:9/api", None).await;
        let err = run(
            &client,
            Command::Request {
                method: transport::Method::POST,
                path: "/vendor/products/".into(),
                data: None,
                form: Vec::new(),
                file: vec![("images".into(), PathBuf::from("/nonexistent/mug.jpg"))],
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("failed to read /nonexistent/mug.jpg"));
    }

    #[tokio::test]
    async fn errors_carry_category_and_message() {
        let base = start_backend().await;
        let client = client_for(&base, None).await;

        let err = run(
            &client,
            Command::Get {
                path: "/products/999/".into(),
                query: Vec::new(),
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "NOT_FOUND (404): Not found.");
    }

    #[tokio::test]
    async fn invalid_data_is_rejected_before_sending() {
        let client = client_for("http://127.0.0.1:9/api", None).await;
        let err = run(
            &client,
            Command::Request {
                method: transport::Method::POST,
                path: "/me/cart/items/".into(),
                data: Some("{not json".into()),
                form: Vec::new(),
                file: Vec::new(),
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("--data must be valid JSON"));
    }

    #[test]
    fn render_falls_back_to_text() {
        let response = ApiResponse::new(marketplace_client::StatusCode::OK, "plain text");
        assert_eq!(render(&response), "plain text");
    }
}
