//! Model invocation against an Ollama server.
//!
//! The evaluator only sees the [`ModelInvoker`] trait: a prompt goes in, the
//! model's raw text comes out. Transport failures are returned as errors and
//! never turned into answers.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors that can occur while calling a model
#[derive(Error, Debug)]
pub enum InvokerError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Model server returned HTTP {code}: {body}")]
    Status { code: u16, body: String },

    #[error("Invalid response from model server: {0}")]
    InvalidResponse(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Something that can answer a prompt with text
pub trait ModelInvoker {
    /// Model identifier, used for error context and logging
    fn model(&self) -> &str;

    /// Send one prompt and return the raw response text
    ///
    /// # Errors
    ///
    /// Returns an error if the model cannot be reached or its reply cannot
    /// be read.
    fn invoke(&self, prompt: &str) -> Result<String, InvokerError>;
}

impl<T: ModelInvoker + ?Sized> ModelInvoker for &T {
    fn model(&self) -> &str {
        (**self).model()
    }

    fn invoke(&self, prompt: &str) -> Result<String, InvokerError> {
        (**self).invoke(prompt)
    }
}

impl<T: ModelInvoker + ?Sized> ModelInvoker for Box<T> {
    fn model(&self) -> &str {
        (**self).model()
    }

    fn invoke(&self, prompt: &str) -> Result<String, InvokerError> {
        (**self).invoke(prompt)
    }
}

/// Body of `POST /api/generate`
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GenerateRequest<'a> {
    pub model: &'a str,
    pub prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<&'a str>,
    pub stream: bool,
    #[serde(skip_serializing_if = "GenerateOptions::is_empty")]
    pub options: GenerateOptions,
}

/// Sampling options; unset fields use the server defaults
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq)]
pub struct GenerateOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

impl GenerateOptions {
    const fn is_empty(&self) -> bool {
        self.temperature.is_none()
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Blocking client for the Ollama HTTP API
#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: String,
    timeout: Duration,
}

impl OllamaClient {
    /// Create a client for the server at `base_url`
    #[must_use]
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    /// Server root URL without trailing slash
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Run a non-streaming completion
    ///
    /// # Errors
    ///
    /// Returns `Transport` on connection failure or timeout, `Status` on a
    /// non-success HTTP status, and `InvalidResponse` if the body is not the
    /// expected JSON.
    pub fn generate(&self, request: &GenerateRequest<'_>) -> Result<String, InvokerError> {
        let url = format!("{}/api/generate", self.base_url);
        let start = Instant::now();

        let response = ureq::post(&url)
            .timeout(self.timeout)
            .set("Content-Type", "application/json")
            .send_json(request);

        let response = match response {
            Ok(resp) => resp,
            Err(ureq::Error::Status(code, resp)) => {
                let body = resp.into_string().unwrap_or_default();
                return Err(InvokerError::Status { code, body });
            }
            Err(e) => return Err(InvokerError::Transport(e.to_string())),
        };

        let body: GenerateResponse = response
            .into_json()
            .map_err(|e| InvokerError::InvalidResponse(e.to_string()))?;

        tracing::trace!(
            model = request.model,
            latency_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Ollama generate completed"
        );
        Ok(body.response)
    }
}

/// Deterministic answerer: one model, temperature 0
#[derive(Debug, Clone)]
pub struct OllamaInvoker {
    client: OllamaClient,
    model: String,
}

impl OllamaInvoker {
    /// Create an invoker for `model` on the given client
    #[must_use]
    pub fn new(client: OllamaClient, model: &str) -> Self {
        Self {
            client,
            model: model.to_string(),
        }
    }
}

impl ModelInvoker for OllamaInvoker {
    fn model(&self) -> &str {
        &self.model
    }

    fn invoke(&self, prompt: &str) -> Result<String, InvokerError> {
        self.client.generate(&GenerateRequest {
            model: &self.model,
            prompt,
            system: None,
            stream: false,
            options: GenerateOptions {
                temperature: Some(0.0),
            },
        })
    }
}
