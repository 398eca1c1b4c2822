use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::config::MeshConfig;
use crate::endpoint::{self, EndpointCandidates};
use crate::types::{GenerationTask, ImageTaskRequest, TaskSource, TaskStatus, TextTaskRequest};
use crate::{Result, VitaError};

const DEFAULT_MODE: &str = "preview";
const DEFAULT_TOPOLOGY: &str = "triangle";
const HTTP_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(300);

/// Status-fetch seam between the mesh client and the polling loop. Lets tests
/// drive the poller with a scripted implementation.
#[async_trait]
pub trait TaskService: Send + Sync {
    async fn poll_task(
        &self,
        task_id: &str,
        source: TaskSource,
        endpoint_hint: Option<&str>,
    ) -> Result<GenerationTask>;
}

/// Client for the text/image-to-3D mesh provider.
#[derive(Clone)]
pub struct MeshClient {
    http: reqwest::Client,
    api_key: String,
    preferred_base: Option<String>,
    fallback_bases: Vec<String>,
}

impl MeshClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            http,
            api_key: api_key.into(),
            preferred_base: None,
            fallback_bases: crate::config::DEFAULT_MESH_BASES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    pub fn from_config(config: &MeshConfig) -> Self {
        let mut client = Self::new(config.api_key.clone());
        client.preferred_base = config.preferred_base.clone();
        client.fallback_bases = config.fallback_bases.clone();
        client
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn with_preferred_base(mut self, base: impl Into<String>) -> Self {
        self.preferred_base = Some(base.into());
        self
    }

    pub fn with_fallback_bases(mut self, bases: Vec<String>) -> Self {
        self.fallback_bases = bases;
        self
    }

    fn candidates(&self, hint: Option<&str>) -> EndpointCandidates {
        EndpointCandidates::build(hint, self.preferred_base.as_deref(), &self.fallback_bases)
    }

    fn authed(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request.bearer_auth(&self.api_key)
    }

    /// Submits a text-driven mesh job. Fails fast on an empty prompt before
    /// any network call.
    pub async fn submit_text(&self, request: TextTaskRequest) -> Result<GenerationTask> {
        if request.prompt.trim().is_empty() {
            return Err(VitaError::InvalidSubmission(
                "a text prompt is required to generate a 3D model".to_string(),
            ));
        }

        let mut body = Map::<String, Value>::new();
        body.insert(
            "mode".to_string(),
            Value::String(request.mode.clone().unwrap_or_else(|| DEFAULT_MODE.to_string())),
        );
        body.insert("prompt".to_string(), Value::String(request.prompt.clone()));
        if let Some(style) = request.style.clone() {
            body.insert("style".to_string(), Value::String(style));
        }
        body.insert(
            "topology".to_string(),
            Value::String(
                request
                    .topology
                    .clone()
                    .unwrap_or_else(|| DEFAULT_TOPOLOGY.to_string()),
            ),
        );

        let candidates = self.candidates(None);
        let path = format!("/{}", TaskSource::Text.route());
        let (response, accepted_base) = endpoint::attempt(&candidates, &path, |base| {
            Ok(self
                .authed(self.http.post(format!("{base}{path}")))
                .json(&body))
        })
        .await?;

        self.task_from_created(response, TaskSource::Text, accepted_base)
            .await
    }

    /// Submits an image-driven mesh job. The image travels as a multipart
    /// file part; the form is rebuilt for every fallback attempt.
    pub async fn submit_image(&self, request: ImageTaskRequest) -> Result<GenerationTask> {
        if request.image.is_empty() {
            return Err(VitaError::InvalidSubmission(
                "image bytes are required for an image-to-3d job".to_string(),
            ));
        }
        if request.image_mime_type.trim().is_empty() {
            return Err(VitaError::InvalidSubmission(
                "an image mime type is required for an image-to-3d job".to_string(),
            ));
        }

        let candidates = self.candidates(None);
        let path = format!("/{}", TaskSource::Image.route());
        let (response, accepted_base) = endpoint::attempt(&candidates, &path, |base| {
            let form = image_form(&request)?;
            Ok(self
                .authed(self.http.post(format!("{base}{path}")))
                .multipart(form))
        })
        .await?;

        self.task_from_created(response, TaskSource::Image, accepted_base)
            .await
    }

    /// Fetches a task snapshot, preferring the base that accepted the
    /// submission so the poll lands on the shard that holds the task.
    pub async fn poll(
        &self,
        task_id: &str,
        source: TaskSource,
        endpoint_hint: Option<&str>,
    ) -> Result<GenerationTask> {
        let candidates = self.candidates(endpoint_hint);
        let path = format!("/{}/{task_id}", source.route());
        let (response, accepted_base) = endpoint::attempt(&candidates, &path, |base| {
            Ok(self.authed(self.http.get(format!("{base}{path}"))))
        })
        .await?;

        let reply = response.json::<TaskStatusReply>().await?;
        debug!(task_id, status = ?reply.status, "task snapshot refreshed");

        Ok(GenerationTask {
            task_id: task_id.to_string(),
            source,
            status: status_or_pending(reply.status.as_deref()),
            accepted_endpoint: Some(accepted_base),
            mesh_url: reply.model_urls.glb,
            preview_url: reply.preview_image_url,
        })
    }

    async fn task_from_created(
        &self,
        response: reqwest::Response,
        source: TaskSource,
        accepted_base: String,
    ) -> Result<GenerationTask> {
        let created = response.json::<TaskCreated>().await?;
        let task_id = created
            .task_id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| {
                VitaError::InvalidResponse("provider reply is missing task_id".to_string())
            })?;

        Ok(GenerationTask {
            task_id,
            source,
            status: status_or_pending(created.status.as_deref()),
            accepted_endpoint: Some(accepted_base),
            mesh_url: None,
            preview_url: None,
        })
    }
}

#[async_trait]
impl TaskService for MeshClient {
    async fn poll_task(
        &self,
        task_id: &str,
        source: TaskSource,
        endpoint_hint: Option<&str>,
    ) -> Result<GenerationTask> {
        self.poll(task_id, source, endpoint_hint).await
    }
}

#[derive(Debug, Deserialize)]
struct TaskCreated {
    task_id: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TaskStatusReply {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    model_urls: ModelUrls,
    #[serde(default)]
    preview_image_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ModelUrls {
    #[serde(default)]
    glb: Option<String>,
}

fn status_or_pending(raw: Option<&str>) -> TaskStatus {
    raw.map(TaskStatus::from_provider)
        .unwrap_or(TaskStatus::Pending)
}

fn image_form(request: &ImageTaskRequest) -> Result<Form> {
    let filename = format!("reference.{}", extension_for_mime(&request.image_mime_type));
    let image_part = Part::stream(reqwest::Body::from(request.image.clone()))
        .file_name(filename)
        .mime_str(&request.image_mime_type)?;

    let mut form = Form::new().part("image", image_part);
    if let Some(prompt) = request.prompt.clone() {
        form = form.text("prompt", prompt);
    }
    if let Some(style) = request.style.clone() {
        form = form.text("style", style);
    }
    if let Some(mode) = request.mode.clone() {
        form = form.text("mode", mode);
    }
    if let Some(topology) = request.topology.clone() {
        form = form.text("topology", topology);
    }
    Ok(form)
}

fn extension_for_mime(mime_type: &str) -> &'static str {
    match mime_type {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        _ => "png",
    }
}
