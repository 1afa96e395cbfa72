use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{ScraperError, ScraperResult};

/// External capability turning a challenge image into its text.
#[async_trait]
pub trait CaptchaSolver: Send + Sync {
    async fn solve(&self, image_url: &Url) -> ScraperResult<String>;
}

/// Used when no solver is configured. Every challenge stays unsolved.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCaptchaSolver;

#[async_trait]
impl CaptchaSolver for NoCaptchaSolver {
    async fn solve(&self, image_url: &Url) -> ScraperResult<String> {
        Err(ScraperError::CaptchaError(format!(
            "no solver configured for {}",
            image_url
        )))
    }
}

#[derive(Serialize)]
struct SolveRequest<'a> {
    image_url: &'a str,
}

#[derive(Deserialize)]
struct SolveResponse {
    solution: Option<String>,
}

/// Delegates to a solving service over HTTP.
#[derive(Debug, Clone)]
pub struct RemoteCaptchaSolver {
    client: Client,
    endpoint: Url,
}

impl RemoteCaptchaSolver {
    pub fn new(endpoint: Url) -> Self {
        Self {
            client: Client::new(),
            endpoint,
        }
    }
}

#[async_trait]
impl CaptchaSolver for RemoteCaptchaSolver {
    async fn solve(&self, image_url: &Url) -> ScraperResult<String> {
        debug!("Requesting captcha solution for {}", image_url);
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&SolveRequest {
                image_url: image_url.as_str(),
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ScraperError::CaptchaError(format!(
                "solver answered {}",
                response.status()
            )));
        }

        let body: SolveResponse = response.json().await?;
        match body.solution.map(|s| s.trim().to_string()) {
            Some(solution) if !solution.is_empty() => Ok(solution),
            _ => Err(ScraperError::CaptchaError(
                "solver returned no solution".to_string(),
            )),
        }
    }
}
