use std::sync::Arc;
use std::time::Duration;

use reqwest::blocking::{multipart, Client};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::pipeline::catalog::join_endpoint;
use crate::pipeline::image_data::{EncodedImage, OriginalImage};
use crate::pipeline::parameters::ParameterValues;

const FIRST_STEP_PATH: &str = "process-image";
const CHAINED_STEP_PATH: &str = "process-workflow-image";

/// Image fed into a processing call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    Original(OriginalImage),
    PriorResult(EncodedImage),
}

impl ImageSource {
    pub fn endpoint_path(&self) -> &'static str {
        match self {
            Self::Original(_) => FIRST_STEP_PATH,
            Self::PriorResult(_) => CHAINED_STEP_PATH,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Original(_) => "original",
            Self::PriorResult(_) => "prior_result",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessImageRequest {
    pub source: ImageSource,
    pub filter_name: String,
    pub params: ParameterValues,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessImageResponse {
    pub image: EncodedImage,
    pub code: String,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProcessingError {
    #[error("processing request failed: {0}")]
    Request(String),
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed processing response: {0}")]
    MalformedResponse(String),
}

pub trait ImageProcessingOps: Send + Sync + 'static {
    fn process(&self, request: &ProcessImageRequest)
        -> Result<ProcessImageResponse, ProcessingError>;
}

pub type SharedImageProcessingOps = Arc<dyn ImageProcessingOps>;

#[derive(Debug, Deserialize)]
struct ProcessImageWireResponse {
    image: String,
    code: String,
}

/// Parses the `{image, code}` body shared by both processing endpoints.
pub fn parse_process_response(raw: &str) -> Result<ProcessImageResponse, ProcessingError> {
    let payload: ProcessImageWireResponse = serde_json::from_str(raw)
        .map_err(|e| ProcessingError::MalformedResponse(format!("JSON decode failed: {e}")))?;
    let image = EncodedImage::from_base64(payload.image.as_str())
        .map_err(|e| ProcessingError::MalformedResponse(e.to_string()))?;
    Ok(ProcessImageResponse {
        image,
        code: payload.code,
    })
}

#[derive(Debug, Clone)]
pub struct HttpImageProcessing {
    base_url: Url,
    timeout: Duration,
}

impl HttpImageProcessing {
    pub fn new(base_url: Url, timeout: Duration) -> Self {
        Self { base_url, timeout }
    }

    pub fn endpoint_for(&self, source: &ImageSource) -> Result<Url, ProcessingError> {
        join_endpoint(&self.base_url, source.endpoint_path()).map_err(ProcessingError::Request)
    }

    fn build_form(request: &ProcessImageRequest) -> Result<multipart::Form, ProcessingError> {
        let params = serde_json::to_string(&request.params)
            .map_err(|e| ProcessingError::Request(format!("params encode failed: {e}")))?;
        let form = multipart::Form::new()
            .text("filter_name", request.filter_name.clone())
            .text("params", params);

        match &request.source {
            ImageSource::Original(original) => {
                let part = multipart::Part::bytes(original.bytes().to_vec())
                    .file_name(original.file_name().to_string())
                    .mime_str(original.mime())
                    .map_err(|e| {
                        ProcessingError::Request(format!(
                            "invalid mime '{}': {e}",
                            original.mime()
                        ))
                    })?;
                Ok(form.part("file", part))
            }
            ImageSource::PriorResult(previous) => {
                Ok(form.text("previous_image", previous.to_data_url()))
            }
        }
    }
}

impl ImageProcessingOps for HttpImageProcessing {
    fn process(
        &self,
        request: &ProcessImageRequest,
    ) -> Result<ProcessImageResponse, ProcessingError> {
        let endpoint = self.endpoint_for(&request.source)?;
        let form = Self::build_form(request)?;

        let client = Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| ProcessingError::Request(format!("http client init failed: {e}")))?;
        debug!(
            endpoint = %endpoint,
            filter = %request.filter_name,
            source = request.source.label(),
            "sending processing request"
        );
        let resp = client
            .post(endpoint.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .multipart(form)
            .send()
            .map_err(|e| ProcessingError::Request(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            warn!(endpoint = %endpoint, status = status.as_u16(), "processing service returned an error");
            return Err(ProcessingError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let body = resp
            .text()
            .map_err(|e| ProcessingError::MalformedResponse(format!("HTTP body read failed: {e}")))?;
        parse_process_response(body.as_str())
    }
}
