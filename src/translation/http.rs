//! External translation API client.
//!
//! # Wire Format
//! ```text
//! POST <url>
//! Authorization: Bearer <api_key>
//! {"q": "...", "source": "en", "target": "de", "format": "text"}
//!
//! 200 {"data": {"translations": [{"translatedText": "..."}]}}
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::ExternalApiConfig;
use crate::translation::{TranslateError, Translator};

#[derive(Serialize)]
struct TranslateBody<'a> {
    q: &'a str,
    source: &'a str,
    target: &'a str,
    format: &'static str,
}

#[derive(Deserialize)]
struct TranslateResponse {
    data: ResponseData,
}

#[derive(Deserialize)]
struct ResponseData {
    #[serde(default)]
    translations: Vec<ResponseTranslation>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponseTranslation {
    translated_text: String,
}

/// Translator calling an external HTTP API.
#[derive(Debug, Clone)]
pub struct HttpTranslator {
    name: String,
    endpoint: Url,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpTranslator {
    pub fn new(config: &ExternalApiConfig) -> Result<Self, url::ParseError> {
        Self::with_client(config, reqwest::Client::new())
    }

    /// Use a preconfigured HTTP client (proxies, TLS roots).
    pub fn with_client(
        config: &ExternalApiConfig,
        client: reqwest::Client,
    ) -> Result<Self, url::ParseError> {
        let endpoint = Url::parse(&config.url)?;
        if config.api_key.is_none() {
            tracing::warn!(endpoint = %endpoint, "No API key configured for external translation service");
        }

        Ok(Self {
            name: config.name.clone(),
            endpoint,
            api_key: config.api_key.clone(),
            client,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl Translator for HttpTranslator {
    fn name(&self) -> &str {
        &self.name
    }

    async fn translate(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> Result<String, TranslateError> {
        let body = TranslateBody {
            q: text,
            source: source_lang,
            target: target_lang,
            format: "text",
        };

        let mut request = self
            .client
            .post(self.endpoint.clone())
            .header(reqwest::header::USER_AGENT, "translation-coordinator")
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| TranslateError::Failure(format!("connection error: {}", e)))?;

        let status = response.status();
        tracing::debug!(endpoint = %self.endpoint, status = %status, "External API responded");

        if !status.is_success() {
            return Err(TranslateError::Failure(format!("HTTP {}", status)));
        }

        let parsed: TranslateResponse = response
            .json()
            .await
            .map_err(|e| TranslateError::Failure(format!("malformed response: {}", e)))?;

        parsed
            .data
            .translations
            .into_iter()
            .next()
            .map(|t| t.translated_text)
            .ok_or_else(|| TranslateError::Failure("response contained no translations".into()))
    }
}
