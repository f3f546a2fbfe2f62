use std::process::Stdio;
use std::time::Duration;

use anyhow::Context;
use anyhow::Result;
use anyhow::bail;
use serde::Deserialize;
use tokio::io::AsyncWriteExt as _;
use tokio::process::Command;

const USER_AGENT: &str = "User-Agent: autobranch";

/// How requests authenticate.
#[derive(Clone)]
pub enum CurlAuth {
    /// `Authorization: Bearer <token>`
    Bearer(String),
    /// An arbitrary header, e.g. `api-key: <key>`.
    Header { name: String, value: String },
    /// HTTP basic auth handled by curl (`--user user:password`).
    Basic { user: String, password: String },
}

/// HTTP client shelling out to curl for JSON APIs.
pub struct CurlClient {
    auth: CurlAuth,
    max_time: Duration,
}

/// Error payloads of the APIs we talk to. GitHub uses `message`, Azure DevOps
/// `message` as well, OpenAI nests it under `error`.
#[derive(Debug, Deserialize)]
struct ApiError {
    message: Option<String>,
    error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: Option<String>,
}

impl CurlClient {
    pub fn new(auth: CurlAuth, max_time: Duration) -> Self {
        Self { auth, max_time }
    }

    /// Make a GET request
    pub async fn get(&self, url: &str, accept: &str) -> Result<String> {
        let mut command = self.command(url);
        command.args(["-H", &format!("Accept: {accept}")]);

        let output = command
            .output()
            .await
            .context("Failed to execute curl command")?;

        if !output.status.success() {
            bail!(
                "curl command failed: {}",
                String::from_utf8_lossy(&output.stderr)
            );
        }

        parse_response(output.stdout)
    }

    /// Make a POST request with a JSON body.
    ///
    /// The body is streamed through stdin: snapshots easily exceed the size
    /// limit of a single command-line argument.
    pub async fn post_json(&self, url: &str, json_data: &str) -> Result<String> {
        let mut command = self.command(url);
        command
            .args([
                "-X",
                "POST",
                "-H",
                "Accept: application/json",
                "-H",
                "Content-Type: application/json",
                "--data-binary",
                "@-",
            ])
            .stdin(Stdio::piped());

        let mut child = command.spawn().context("Failed to execute curl command")?;
        let mut stdin = child.stdin.take().context("curl stdin unavailable")?;
        stdin.write_all(json_data.as_bytes()).await?;
        drop(stdin);
        let output = child
            .wait_with_output()
            .await
            .context("Failed to wait for curl command")?;

        if !output.status.success() {
            bail!(
                "curl command failed: {}",
                String::from_utf8_lossy(&output.stderr)
            );
        }

        parse_response(output.stdout)
    }

    fn command(&self, url: &str) -> Command {
        let mut command = Command::new("curl");
        command
            .args([
                "-s",
                "-S",
                "-w",
                "\n%{http_code}",
                "--max-time",
                &self.max_time.as_secs().max(1).to_string(),
                "-H",
                USER_AGENT,
            ])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        match &self.auth {
            CurlAuth::Bearer(token) => {
                command.args(["-H", &format!("Authorization: Bearer {token}")]);
            }
            CurlAuth::Header { name, value } => {
                command.args(["-H", &format!("{name}: {value}")]);
            }
            CurlAuth::Basic { user, password } => {
                command.args(["--user", &format!("{user}:{password}")]);
            }
        }
        command.arg(url);
        command
    }
}

/// Split the status code curl appends after the body and turn HTTP errors
/// into `Err`.
fn parse_response(stdout: Vec<u8>) -> Result<String> {
    let output_str = String::from_utf8(stdout)?;
    let (response, status) = output_str
        .rsplit_once('\n')
        .unwrap_or(("", output_str.as_str()));
    let status_code = status.trim().parse::<u16>().unwrap_or(0);

    if status_code == 0 {
        bail!("No HTTP response received");
    }

    if status_code >= 400 {
        if let Ok(error) = serde_json::from_str::<ApiError>(response)
            && let Some(message) = error
                .message
                .or_else(|| error.error.and_then(|detail| detail.message))
        {
            bail!("API error ({status_code}): {message}");
        }
        bail!("API request failed with status {status_code}: {response}");
    }

    Ok(response.to_string())
}
