//! Best-effort rotation of the stored session cookie into a GitHub Actions
//! secret.
//!
//! Two strategies, tried in order: the `gh` CLI when it is installed, then
//! the REST API directly. The REST path fetches the repository public key
//! and seals the value (libsodium sealed-box semantics) before upload.
//! There is deliberately no plaintext fallback: if sealing is impossible the
//! rotation fails and the caller logs it.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use crypto_box::PublicKey;
use crypto_box::aead::OsRng;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Destination for rotated secret values.
#[async_trait]
pub trait SecretSink: Send + Sync {
    async fn update(&self, name: &str, value: &str) -> Result<()>;
}

/// Rotates secrets in a GitHub repository.
#[derive(Debug)]
pub struct GithubSecrets {
    token: String,
    repo: String,
    api_base: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct RepoPublicKey {
    key_id: String,
    key: String,
}

impl GithubSecrets {
    pub fn new(token: String, repo: String) -> Result<Self> {
        Self::with_api_base(token, repo, "https://api.github.com".to_string())
    }

    pub fn with_api_base(token: String, repo: String, api_base: String) -> Result<Self> {
        if !repo.contains('/') {
            return Err(Error::Config(format!(
                "GITHUB_REPOSITORY must be owner/name, got {repo:?}"
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("gpanel-keeper")
            .build()
            .map_err(|e| Error::Rotation(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            token,
            repo,
            api_base,
            client,
        })
    }

    /// Pushes the value through `gh secret set`, piping it on stdin so it
    /// never shows up in the process list.
    async fn update_via_gh(&self, name: &str, value: &str) -> Result<()> {
        let gh = which::which("gh")
            .map_err(|_| Error::Rotation("gh executable not found".into()))?;

        let mut child = Command::new(gh)
            .args(["secret", "set", name, "--repo", &self.repo, "--body", "-"])
            .env("GH_TOKEN", &self.token)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::Rotation(format!("failed to spawn gh: {e}")))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(value.as_bytes())
                .await
                .map_err(|e| Error::Rotation(format!("failed to write secret to gh: {e}")))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| Error::Rotation(format!("gh did not exit cleanly: {e}")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Rotation(format!(
                "gh secret set exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }

    /// Direct REST rotation: fetch the repo public key, seal, upload.
    async fn update_via_api(&self, name: &str, value: &str) -> Result<()> {
        let key_url = format!(
            "{}/repos/{}/actions/secrets/public-key",
            self.api_base, self.repo
        );
        let response = self
            .client
            .get(&key_url)
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
            .send()
            .await
            .map_err(|e| Error::Rotation(format!("public key fetch failed: {e}")))?;
        if !response.status().is_success() {
            return Err(Error::Rotation(format!(
                "public key fetch returned {}",
                response.status()
            )));
        }
        let public_key: RepoPublicKey = response
            .json()
            .await
            .map_err(|e| Error::Rotation(format!("invalid public key payload: {e}")))?;

        let encrypted_value = seal_for_repo(&public_key.key, value)?;

        let secret_url = format!(
            "{}/repos/{}/actions/secrets/{}",
            self.api_base, self.repo, name
        );
        let response = self
            .client
            .put(&secret_url)
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
            .json(&serde_json::json!({
                "encrypted_value": encrypted_value,
                "key_id": public_key.key_id,
            }))
            .send()
            .await
            .map_err(|e| Error::Rotation(format!("secret upload failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::Rotation(format!(
                "secret upload returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl SecretSink for GithubSecrets {
    async fn update(&self, name: &str, value: &str) -> Result<()> {
        match self.update_via_gh(name, value).await {
            Ok(()) => {
                debug!(secret = name, "rotated via gh");
                return Ok(());
            }
            Err(e) => warn!(secret = name, error = %e, "gh strategy failed, trying the API"),
        }
        self.update_via_api(name, value).await
    }
}

/// Seals `value` for the repository public key (base64-encoded X25519 key).
///
/// Sealed-box output is `epk(32) || box(value || tag(16))`, base64-encoded
/// the way the secrets API expects it. Any key or sealing problem is an
/// error; the value is never uploaded unencrypted.
fn seal_for_repo(key_b64: &str, value: &str) -> Result<String> {
    let key_bytes = BASE64
        .decode(key_b64)
        .map_err(|e| Error::Rotation(format!("repository public key is not base64: {e}")))?;
    let key_bytes: [u8; 32] = key_bytes.try_into().map_err(|_| {
        Error::Rotation("repository public key is not 32 bytes; refusing to encrypt".into())
    })?;
    let public_key = PublicKey::from(key_bytes);

    let sealed = public_key
        .seal(&mut OsRng, value.as_bytes())
        .map_err(|_| Error::Rotation("sealed-box encryption failed; refusing to upload".into()))?;
    Ok(BASE64.encode(sealed))
}
