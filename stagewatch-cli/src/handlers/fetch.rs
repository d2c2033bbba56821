//! `http_fetch`: call the task's endpoint and return the decoded JSON body.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Method;
use serde_json::Value;
use stagewatch::{HandlerError, TaskHandler, TaskSpec};

/// Performs the request described by a task's `url`, `method` and
/// `headers`. Header values may reference environment variables as
/// `${NAME}`.
#[derive(Debug, Clone)]
pub struct HttpFetch {
    client: reqwest::Client,
}

impl HttpFetch {
    /// Creates a handler whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl TaskHandler for HttpFetch {
    async fn call(&self, task: &TaskSpec, _prior: Option<&Value>) -> Result<Value, HandlerError> {
        let request = task.request.as_ref().ok_or_else(|| HandlerError::InvalidTask {
            task: task.name.clone(),
            reason: "missing url".to_string(),
        })?;

        let method = Method::from_bytes(request.method.to_ascii_uppercase().as_bytes()).map_err(
            |_| HandlerError::InvalidTask {
                task: task.name.clone(),
                reason: format!("unsupported method '{}'", request.method),
            },
        )?;

        let mut builder = self.client.request(method.clone(), &request.url);
        for header in &request.headers {
            let value = expand_vars(&header.value, |name| std::env::var(name).ok()).map_err(
                |missing| HandlerError::InvalidTask {
                    task: task.name.clone(),
                    reason: format!(
                        "header '{}' references unset variable '{missing}'",
                        header.name
                    ),
                },
            )?;
            builder = builder.header(header.name.as_str(), value);
        }

        let target = format!("{method} {}", request.url);
        let response = builder
            .send()
            .await
            .map_err(|e| HandlerError::transport(target.clone(), e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(HandlerError::Transport {
                message: format!("{target} returned {status}"),
                source: None,
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| HandlerError::Decode(format!("{target}: {e}")))?;

        tracing::debug!(task = %task.name, %status, "fetched");
        Ok(body)
    }
}

fn env_reference() -> Result<&'static Regex, HandlerError> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    if let Some(pattern) = PATTERN.get() {
        return Ok(pattern);
    }
    let pattern = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").map_err(HandlerError::other)?;
    Ok(PATTERN.get_or_init(|| pattern))
}

/// Replaces every `${NAME}` in `input` with `lookup(NAME)`.
///
/// Returns the name of the first variable `lookup` cannot resolve.
///
/// # Examples
///
/// ```
/// use stagewatch_cli::handlers::expand_vars;
///
/// let lookup = |name: &str| (name == "TOKEN").then(|| "s3cret".to_string());
/// assert_eq!(expand_vars("Bearer ${TOKEN}", lookup).unwrap(), "Bearer s3cret");
/// assert_eq!(expand_vars("${NOPE}", lookup).unwrap_err(), "NOPE");
/// assert_eq!(expand_vars("no refs", lookup).unwrap(), "no refs");
/// ```
pub fn expand_vars<F>(input: &str, lookup: F) -> Result<String, String>
where
    F: Fn(&str) -> Option<String>,
{
    let Ok(pattern) = env_reference() else {
        return Ok(input.to_string());
    };

    let mut out = String::with_capacity(input.len());
    let mut last = 0;
    for captures in pattern.captures_iter(input) {
        let (Some(whole), Some(name)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        out.push_str(&input[last..whole.start()]);
        let value = lookup(name.as_str()).ok_or_else(|| name.as_str().to_string())?;
        out.push_str(&value);
        last = whole.end();
    }
    out.push_str(&input[last..]);
    Ok(out)
}
