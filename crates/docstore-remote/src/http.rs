use std::time::Duration;

use async_trait::async_trait;
use docstore_core::{
    Ack, Backend, BackendStatus, Credential, RemoteFile, RemoteListing, RemoteRepository,
    StorageError,
};
use reqwest::Client as HttpClient;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument};

/// The four remote procedures every networked backend exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RpcOp {
    List,
    Get,
    Upload,
    Delete,
}

/// JSON body shared by every RPC.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RpcRequest<'a> {
    token: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    file_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    file_content: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    is_password_protected: Option<bool>,
}

/// Adapter for a networked backend reached through authenticated RPC calls.
///
/// Each operation is exactly one `POST {base_url}/{rpc}` carrying the bearer
/// token both as an `Authorization` header and in the JSON body. RPC names
/// are derived from the backend tag:
/// ```text
/// listS3Files   getS3File   uploadS3File   deleteS3File
/// ```
#[derive(Debug, Clone)]
pub struct HttpRepository {
    backend: Backend,
    http_client: HttpClient,
    base_url: String,
}

impl HttpRepository {
    /// Create an adapter for `backend` served under `base_url`.
    pub fn new(backend: Backend, base_url: impl Into<String>) -> Result<Self, StorageError> {
        Self::with_client(backend, base_url, HttpClient::new())
    }

    /// Create an adapter whose client applies a request timeout.
    pub fn with_timeout(
        backend: Backend,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, StorageError> {
        let client = HttpClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StorageError::Transport(format!("Failed to build HTTP client: {}", e)))?;
        Self::with_client(backend, base_url, client)
    }

    pub fn with_client(
        backend: Backend,
        base_url: impl Into<String>,
        http_client: HttpClient,
    ) -> Result<Self, StorageError> {
        if !backend.requires_credential() {
            return Err(StorageError::InvalidArgument(format!(
                "{} is not a networked backend",
                backend
            )));
        }
        Ok(Self {
            backend,
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn rpc_name(&self, op: RpcOp) -> String {
        let tag = self.backend.rpc_tag();
        match op {
            RpcOp::List => format!("list{}Files", tag),
            RpcOp::Get => format!("get{}File", tag),
            RpcOp::Upload => format!("upload{}File", tag),
            RpcOp::Delete => format!("delete{}File", tag),
        }
    }

    fn token<'a>(&self, credential: Option<&'a Credential>) -> Result<&'a str, StorageError> {
        credential
            .map(Credential::token)
            .filter(|t| !t.is_empty())
            .ok_or(StorageError::AuthRequired(self.backend))
    }

    /// Issue one RPC and return the decoded JSON body.
    async fn call(&self, op: RpcOp, request: &RpcRequest<'_>) -> Result<Value, StorageError> {
        let url = format!("{}/{}", self.base_url, self.rpc_name(op));

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(request.token)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                StorageError::Transport(format!("{} {:?} request failed: {}", self.backend, op, e))
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            StorageError::Transport(format!("Failed to read {} response: {}", self.backend, e))
        })?;

        if !status.is_success() {
            return Err(StorageError::Backend {
                backend: self.backend,
                status: BackendStatus::from_code(status.as_u16()),
                message: error_message(&text),
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| {
            StorageError::Serialization(format!("Invalid {} response: {}", self.backend, e))
        })
    }

    fn decode<T: DeserializeOwned>(&self, value: Value) -> Result<T, StorageError> {
        serde_json::from_value(value).map_err(|e| {
            StorageError::Serialization(format!("Unexpected {} response: {}", self.backend, e))
        })
    }

    fn ack(&self, value: Value) -> Result<Ack, StorageError> {
        if value.is_null() {
            return Ok(Ack {
                success: true,
                message: None,
            });
        }
        let ack: Ack = self.decode(value)?;
        if !ack.success {
            return Err(StorageError::Backend {
                backend: self.backend,
                status: BackendStatus::Other(200),
                message: ack.message.unwrap_or_else(|| "operation rejected".to_string()),
            });
        }
        Ok(ack)
    }
}

/// Best-effort human message from an error body.
fn error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        for field in ["message", "error"] {
            if let Some(msg) = value.get(field).and_then(Value::as_str) {
                return msg.to_string();
            }
        }
    }
    if body.trim().is_empty() {
        "no response body".to_string()
    } else {
        body.trim().to_string()
    }
}

/// Normalize the `get` response.
///
/// Backends disagree on the shape: some return the content as a bare JSON
/// string, others `{content, fileName}`, `{fileContent}` or a `content`
/// object wrapping one of those fields.
pub(crate) fn normalize_get_response(
    value: Value,
    requested_name: &str,
) -> Result<RemoteFile, StorageError> {
    fn content_of(value: &Value) -> Option<String> {
        match value {
            Value::String(s) => Some(s.clone()),
            Value::Object(map) => map
                .get("content")
                .or_else(|| map.get("fileContent"))
                .and_then(content_of),
            _ => None,
        }
    }

    let file_name = value
        .get("fileName")
        .and_then(Value::as_str)
        .unwrap_or(requested_name)
        .to_string();

    let content = content_of(&value).ok_or_else(|| {
        StorageError::Serialization(format!("No content in response for {}", requested_name))
    })?;

    Ok(RemoteFile { file_name, content })
}

#[async_trait]
impl RemoteRepository for HttpRepository {
    fn backend(&self) -> Backend {
        self.backend
    }

    #[instrument(skip(self, credential), level = "debug")]
    async fn list_all(&self, credential: Option<&Credential>) -> Result<RemoteListing, StorageError> {
        let token = self.token(credential)?;
        let request = RpcRequest {
            token,
            file_name: None,
            file_content: None,
            is_password_protected: None,
        };
        let value = self.call(RpcOp::List, &request).await?;
        let listing: RemoteListing = if value.is_null() {
            RemoteListing::default()
        } else {
            self.decode(value)?
        };
        debug!(
            "Listed {} files ({} protected) on {}",
            listing.files.len(),
            listing.password_protected_files.len(),
            self.backend
        );
        Ok(listing)
    }

    #[instrument(skip(self, credential), level = "debug")]
    async fn get_file(
        &self,
        credential: Option<&Credential>,
        file_name: &str,
        is_password_protected: bool,
    ) -> Result<RemoteFile, StorageError> {
        let token = self.token(credential)?;
        let request = RpcRequest {
            token,
            file_name: Some(file_name),
            file_content: None,
            is_password_protected: Some(is_password_protected),
        };
        let value = self.call(RpcOp::Get, &request).await?;
        let file = normalize_get_response(value, file_name)?;
        debug!("Fetched {} from {} ({} bytes)", file_name, self.backend, file.content.len());
        Ok(file)
    }

    #[instrument(skip(self, credential, content), level = "debug", fields(content_len = content.len()))]
    async fn upload_file(
        &self,
        credential: Option<&Credential>,
        file_name: &str,
        content: &str,
        is_password_protected: bool,
    ) -> Result<Ack, StorageError> {
        let token = self.token(credential)?;
        let request = RpcRequest {
            token,
            file_name: Some(file_name),
            file_content: Some(content),
            is_password_protected: Some(is_password_protected),
        };
        let value = self.call(RpcOp::Upload, &request).await?;
        let ack = self.ack(value)?;
        debug!("Uploaded {} to {} ({} bytes)", file_name, self.backend, content.len());
        Ok(ack)
    }

    #[instrument(skip(self, credential), level = "debug")]
    async fn delete_file(
        &self,
        credential: Option<&Credential>,
        file_name: &str,
        is_password_protected: bool,
    ) -> Result<Ack, StorageError> {
        let token = self.token(credential)?;
        let request = RpcRequest {
            token,
            file_name: Some(file_name),
            file_content: None,
            is_password_protected: Some(is_password_protected),
        };
        let value = self.call(RpcOp::Delete, &request).await?;
        let ack = self.ack(value)?;
        debug!("Deleted {} from {}", file_name, self.backend);
        Ok(ack)
    }
}
