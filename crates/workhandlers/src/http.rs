use async_trait::async_trait;
use std::collections::HashMap;
use workcore::{
    FailureSignal, HandlerError, HandlerMetadata, HandlerOutcome, HandlingStrategy,
    ParameterDefinition, Results, Value, WorkItemContext, WorkItemHandler,
};

/// Calls a REST endpoint.
///
/// Server errors and transport failures ask for a retry; client errors
/// abort the item.
pub struct HttpRequestHandler {
    client: reqwest::Client,
}

impl HttpRequestHandler {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpRequestHandler {
    fn default() -> Self {
        Self::new()
    }
}

/// How a non-success status should be handled; `None` means success.
pub fn status_strategy(status: u16) -> Option<HandlingStrategy> {
    match status {
        200..=399 => None,
        408 | 429 => Some(HandlingStrategy::Retry),
        400..=499 => Some(HandlingStrategy::Abort),
        _ => Some(HandlingStrategy::Retry),
    }
}

#[async_trait]
impl WorkItemHandler for HttpRequestHandler {
    fn work_item_type(&self) -> &str {
        "http.request"
    }

    async fn execute(&self, ctx: WorkItemContext) -> Result<HandlerOutcome, HandlerError> {
        let url = ctx.require_str("url")?;
        let method_value = ctx.parameter_or("method", Value::from("GET"));
        let method = method_value.as_str().unwrap_or("GET").to_uppercase();
        let body = ctx.item.parameter("body");

        ctx.events.info(format!("{} {}", method, url));

        let request = match method.as_str() {
            "GET" => self.client.get(url),
            "DELETE" => self.client.delete(url),
            "POST" | "PUT" => {
                let mut req = if method == "POST" {
                    self.client.post(url)
                } else {
                    self.client.put(url)
                };
                match body {
                    Some(Value::String(text)) => req = req.body(text.clone()),
                    Some(value) => req = req.json(&value.to_json()),
                    None => {}
                }
                req
            }
            _ => {
                return Err(HandlerError::Configuration(format!(
                    "Unsupported method: {}",
                    method
                )))
            }
        };

        let request = match ctx.item.parameter("headers").and_then(Value::as_object) {
            Some(headers) => headers.iter().fold(request, |req, (key, value)| match value.as_str() {
                Some(v) => req.header(key, v),
                None => req,
            }),
            None => request,
        };

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(work_item_id = %ctx.item.id, "HTTP request failed: {}", e);
                return Ok(HandlerOutcome::failed(
                    FailureSignal::retry("http_transport", format!("HTTP request failed: {}", url))
                        .with_cause(e.to_string()),
                ));
            }
        };

        let status = response.status().as_u16();
        let headers: HashMap<String, Value> = response
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), Value::from(v.to_str().unwrap_or(""))))
            .collect();
        let text = response
            .text()
            .await
            .map_err(|e| HandlerError::ExecutionFailed(format!("Failed to read response: {}", e)))?;

        ctx.events.info(format!("Response status: {}", status));

        if let Some(strategy) = status_strategy(status) {
            let message = format!("{} {} returned {}", method, url, status);
            return Ok(HandlerOutcome::failed(
                FailureSignal::new(format!("http_{}", status), strategy, message).with_cause(text),
            ));
        }

        let mut results = Results::new();
        results.insert("status".to_string(), Value::from(status as f64));
        if let Ok(json) = serde_json::from_str::<serde_json::Value>(&text) {
            results.insert("json".to_string(), Value::from(json));
        }
        results.insert("body".to_string(), Value::from(text));
        results.insert("headers".to_string(), Value::Object(headers));
        Ok(HandlerOutcome::completed(results))
    }

    fn metadata(&self) -> HandlerMetadata {
        HandlerMetadata {
            description: "Make HTTP requests".to_string(),
            category: "http".to_string(),
            parameters: vec![
                ParameterDefinition::required("url", "Target URL"),
                ParameterDefinition::optional("method", "GET, POST, PUT or DELETE"),
                ParameterDefinition::optional("body", "Request body; objects are sent as JSON"),
                ParameterDefinition::optional("headers", "Header name to value"),
            ],
        }
    }
}
