use crate::interface_adapters::protocol::{
    ApiErrorResponse, RegisterRequest, RegisterResponse, UploadResponse,
};
use reqwest::{
    Client, StatusCode,
    multipart::{Form, Part},
};
use serde::de::DeserializeOwned;
use std::fmt;
use std::path::Path;
use std::time::Duration;

// A file to send in a multipart upload.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub file_name: String,
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

// Content type inferred from the file extension; unknown extensions get none.
pub fn mime_type_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension().and_then(|ext| ext.to_str())?;

    match ext.to_ascii_lowercase().as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "svg" => Some("image/svg+xml"),
        "pdf" => Some("application/pdf"),
        "json" => Some("application/json"),
        "zip" => Some("application/zip"),
        "doc" => Some("application/msword"),
        "docx" => Some("application/vnd.openxmlformats-officedocument.wordprocessingml.document"),
        "xls" => Some("application/vnd.ms-excel"),
        "xlsx" => Some("application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"),
        "ppt" => Some("application/vnd.ms-powerpoint"),
        "pptx" => Some("application/vnd.openxmlformats-officedocument.presentationml.presentation"),
        "txt" | "log" => Some("text/plain"),
        "csv" => Some("text/csv"),
        "html" | "htm" => Some("text/html"),
        "md" => Some("text/markdown"),
        "mp3" => Some("audio/mpeg"),
        "mp4" => Some("video/mp4"),
        _ => None,
    }
}

#[derive(Debug)]
pub enum PortalClientError {
    Transport(reqwest::Error),
    Upstream {
        status: StatusCode,
        message: Option<String>,
    },
    Decode(reqwest::Error),
    // 2xx response that reported `success: false`.
    Rejected(String),
}

impl PortalClientError {
    // One line suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            PortalClientError::Transport(_) => {
                "Could not reach the server. Check your connection and try again.".to_string()
            }
            PortalClientError::Upstream {
                message: Some(message),
                ..
            } => message.clone(),
            PortalClientError::Upstream {
                status,
                message: None,
            } => format!("The server returned an error ({status})."),
            PortalClientError::Decode(_) => "The server sent an unexpected response.".to_string(),
            PortalClientError::Rejected(message) => message.clone(),
        }
    }
}

impl fmt::Display for PortalClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortalClientError::Transport(err) => write!(f, "portal transport error: {err}"),
            PortalClientError::Upstream { status, message } => {
                if let Some(message) = message {
                    write!(f, "portal upstream error {status}: {message}")
                } else {
                    write!(f, "portal upstream error {status}")
                }
            }
            PortalClientError::Decode(err) => write!(f, "portal response decode error: {err}"),
            PortalClientError::Rejected(message) => write!(f, "portal rejected request: {message}"),
        }
    }
}

impl std::error::Error for PortalClientError {}

// Thin reqwest client for the remote upload and registration endpoints.
#[derive(Clone)]
pub struct PortalClient {
    http: Client,
    pub base_url: String,
}

impl PortalClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub async fn register(
        &self,
        req: &RegisterRequest,
    ) -> Result<RegisterResponse, PortalClientError> {
        let url = format!("{}/api/auth/register", self.base_url);
        let res = self
            .http
            .post(url)
            .json(req)
            .send()
            .await
            .map_err(PortalClientError::Transport)?;

        let body: RegisterResponse = decode(res).await?;
        if !body.success {
            return Err(PortalClientError::Rejected(
                body.error
                    .unwrap_or_else(|| "Registration failed.".to_string()),
            ));
        }
        Ok(body)
    }

    pub async fn upload(&self, files: Vec<UploadFile>) -> Result<UploadResponse, PortalClientError> {
        let mut form = Form::new();
        for file in files {
            let mut part = Part::bytes(file.bytes).file_name(file.file_name);
            if let Some(mime_type) = file.mime_type {
                part = part
                    .mime_str(&mime_type)
                    .map_err(PortalClientError::Transport)?;
            }
            form = form.part("files", part);
        }

        let url = format!("{}/api/upload", self.base_url);
        let res = self
            .http
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(PortalClientError::Transport)?;

        let body: UploadResponse = decode(res).await?;
        if !body.success {
            return Err(PortalClientError::Rejected(
                body.error
                    .or(body.message)
                    .unwrap_or_else(|| "Upload failed.".to_string()),
            ));
        }
        Ok(body)
    }
}

// Keep upstream status/message so callers can show the server's own wording.
async fn decode<T: DeserializeOwned>(res: reqwest::Response) -> Result<T, PortalClientError> {
    let status = res.status();
    if !status.is_success() {
        let message = res
            .json::<ApiErrorResponse>()
            .await
            .ok()
            .and_then(|payload| payload.error.or(payload.message));
        return Err(PortalClientError::Upstream { status, message });
    }

    res.json::<T>().await.map_err(PortalClientError::Decode)
}
