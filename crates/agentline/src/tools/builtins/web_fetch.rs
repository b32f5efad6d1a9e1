//! Web fetch tool returning the readable text of a page.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use regex::Regex;

use crate::tools::error::ToolError;
use crate::tools::tool::Tool;

/// Maximum characters of page text returned to the model.
const MAX_OUTPUT_CHARS: usize = 2000;

/// Maximum bytes read from the response body (1 MB).
const MAX_BODY_BYTES: usize = 1_048_576;

/// Whole-request deadline, connect through last body byte.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Fetches a URL and strips markup. Body is the URL.
pub struct WebFetchTool {
    client: reqwest::Client,
    stripper: HtmlStripper,
    timeout: Duration,
}

impl WebFetchTool {
    pub fn new(client: reqwest::Client) -> Result<Self, regex::Error> {
        Ok(Self {
            client,
            stripper: HtmlStripper::new()?,
            timeout: DEFAULT_FETCH_TIMEOUT,
        })
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Tool for WebFetchTool {
    fn name(&self) -> &str {
        "web_fetch"
    }

    fn description(&self) -> &str {
        "Fetch a web page and return its text content. Body: the http(s) URL."
    }

    async fn execute(&self, body: &str) -> Result<String, ToolError> {
        let url = body.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ToolError::InvalidInput(format!(
                "unsupported URL: {url}. Only http and https are allowed."
            )));
        }

        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::ExecutionFailed(format!("HTTP error: {status}")));
        }

        let body = read_limited_body(response, MAX_BODY_BYTES)
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("failed to read response: {e}")))?;

        let html = String::from_utf8_lossy(&body);
        let text = self.stripper.strip(&html);
        let truncated: String = text.chars().take(MAX_OUTPUT_CHARS).collect();
        Ok(format!(
            "URL: {url}\nContent (first {MAX_OUTPUT_CHARS} chars):\n\n{truncated}"
        ))
    }
}

/// Read the response body, stopping once `limit` bytes are in hand.
async fn read_limited_body(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, reqwest::Error> {
    let mut stream = response.bytes_stream();
    let mut body = Vec::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        let take = chunk.len().min(limit - body.len());
        body.extend_from_slice(&chunk[..take]);
        if body.len() == limit {
            break;
        }
    }

    Ok(body)
}

/// Regex-based markup removal.
struct HtmlStripper {
    script: Regex,
    style: Regex,
    tags: Regex,
    spaces: Regex,
    blank_lines: Regex,
}

impl HtmlStripper {
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            script: Regex::new(r"(?is)<script\b.*?</script\s*>")?,
            style: Regex::new(r"(?is)<style\b.*?</style\s*>")?,
            tags: Regex::new(r"<[^>]+>")?,
            spaces: Regex::new(r"[ \t]+")?,
            blank_lines: Regex::new(r"\n\s*\n(\s*\n)*")?,
        })
    }

    fn strip(&self, html: &str) -> String {
        let s = self.script.replace_all(html, "");
        let s = self.style.replace_all(&s, "");
        let s = self.tags.replace_all(&s, " ");
        let s = self.spaces.replace_all(&s, " ");
        let s = self.blank_lines.replace_all(&s, "\n\n");
        s.trim().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn strips_scripts_styles_and_tags() {
        let stripper = HtmlStripper::new().unwrap();
        let html = "<html><head><style>p{color:red}</style>\
                    <script>alert(1)</script></head>\
                    <body><p>Hello</p>   <b>world</b></body></html>";
        assert_eq!(stripper.strip(html), "Hello world");
    }

    #[tokio::test]
    async fn fetches_and_truncates() {
        let server = MockServer::start().await;
        let long = "a".repeat(5000);
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!("<p>{long}</p>")))
            .mount(&server)
            .await;

        let tool = WebFetchTool::new(reqwest::Client::new()).unwrap();
        let out = tool.execute(&format!("{}/page", server.uri())).await.unwrap();

        let content = out.split("\n\n").nth(1).unwrap();
        assert_eq!(content.len(), MAX_OUTPUT_CHARS);
    }

    #[tokio::test]
    async fn body_read_stops_at_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/huge"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![b'x'; 3 * MAX_BODY_BYTES]))
            .mount(&server)
            .await;

        let response = reqwest::get(format!("{}/huge", server.uri())).await.unwrap();
        let body = read_limited_body(response, 1024).await.unwrap();
        assert_eq!(body.len(), 1024);

        let tool = WebFetchTool::new(reqwest::Client::new()).unwrap();
        let out = tool.execute(&format!("{}/huge", server.uri())).await.unwrap();
        let content = out.split("\n\n").nth(1).unwrap();
        assert_eq!(content.len(), MAX_OUTPUT_CHARS);
    }

    #[tokio::test]
    async fn slow_server_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("late")
                    .set_delay(Duration::from_secs(30)),
            )
            .mount(&server)
            .await;

        let tool = WebFetchTool::new(reqwest::Client::new())
            .unwrap()
            .with_timeout(Duration::from_millis(100));
        let started = std::time::Instant::now();
        let err = tool.execute(&server.uri()).await.unwrap_err();

        assert!(matches!(err, ToolError::ExecutionFailed(_)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn http_error_is_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let tool = WebFetchTool::new(reqwest::Client::new()).unwrap();
        let err = tool.execute(&server.uri()).await.unwrap_err();
        assert!(err.to_string().contains("404"));
    }

    #[tokio::test]
    async fn rejects_non_http_urls() {
        let tool = WebFetchTool::new(reqwest::Client::new()).unwrap();
        let err = tool.execute("file:///etc/passwd").await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidInput(_)));
    }
}
