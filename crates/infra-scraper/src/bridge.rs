// Scraper subprocess bridge
//
// Each unit of work is one invocation of the external scraper executable
// with a stage-specific subcommand. The child gets an allowlisted
// environment and a hard wall-clock timeout (killed on expiry); results
// come back as a single JSON document on stdout.

use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info};

use leadharvest_core::domain::{Stage, WorkItem, WorkStatus};
use leadharvest_core::port::{
    DiscoveredItem, PostcodePage, PostcodeSource, ProcessError, ProcessOutcome, SiteProcessor,
};

/// Bridge configuration
#[derive(Debug, Clone)]
pub struct ScraperBridgeConfig {
    /// Scraper executable name or path
    pub program: String,
    /// Environment variables passed through to the child
    pub env_allowlist: Vec<String>,
    /// Hard per-unit wall-clock timeout
    pub unit_timeout: Duration,
    /// Business category filter forwarded to discovery invocations
    pub category: Option<String>,
}

impl Default for ScraperBridgeConfig {
    fn default() -> Self {
        Self {
            program: "leadharvest-scraper".to_string(),
            env_allowlist: vec![
                "PATH".to_string(),
                "HOME".to_string(),
                "LANG".to_string(),
                "DISPLAY".to_string(),
            ],
            unit_timeout: Duration::from_secs(120),
            category: None,
        }
    }
}

/// Subprocess bridge to the scraper collaborator
pub struct ScraperBridge {
    config: ScraperBridgeConfig,
}

impl ScraperBridge {
    pub fn new(config: ScraperBridgeConfig) -> Self {
        Self { config }
    }

    /// Environment passed to the child, filtered to the allowlist
    fn filtered_env(&self) -> HashMap<String, String> {
        std::env::vars()
            .filter(|(k, _)| self.config.env_allowlist.contains(k))
            .collect()
    }

    /// Subcommand and arguments for one work item
    fn unit_args(&self, item: &WorkItem) -> Vec<String> {
        match item.stage {
            Stage::BusinessDiscovery => {
                let mut args = vec![
                    "discover".to_string(),
                    "--target".to_string(),
                    item.target.clone(),
                ];
                if let Some(category) = &self.config.category {
                    args.push("--category".to_string());
                    args.push(category.clone());
                }
                args
            }
            Stage::EmailHarvest => vec![
                "harvest".to_string(),
                "--target".to_string(),
                item.target.clone(),
            ],
        }
    }

    /// Spawn the scraper and collect stdout, killing it on timeout
    async fn invoke(&self, args: &[String]) -> Result<String, ProcessError> {
        debug!(program = %self.config.program, args = ?args, "Invoking scraper");

        let child = Command::new(&self.config.program)
            .args(args)
            .env_clear()
            .envs(self.filtered_env())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ProcessError::SpawnFailed(e.to_string()))?;

        let output = match timeout(self.config.unit_timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(ProcessError::Crashed(e.to_string())),
            // kill_on_drop reaps the child when the future is dropped here
            Err(_) => return Err(ProcessError::Timeout(self.config.unit_timeout.as_millis() as i64)),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProcessError::Crashed(format!(
                "exit {:?}: {}",
                output.status.code(),
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

/// Stdout contract for `discover` / `harvest`
#[derive(Debug, Deserialize)]
struct UnitOutput {
    status: String,
    #[serde(default)]
    emails: Vec<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    discovered: Vec<DiscoveredOutput>,
}

#[derive(Debug, Deserialize)]
struct DiscoveredOutput {
    target: String,
    #[serde(default)]
    label: Option<String>,
}

/// Stdout contract for `postcodes`
#[derive(Debug, Deserialize)]
struct PostcodesOutput {
    subsectors: Vec<String>,
    #[serde(default)]
    has_more: bool,
}

fn parse_unit_output(raw: &str) -> Result<ProcessOutcome, ProcessError> {
    let parsed: UnitOutput = serde_json::from_str(raw)
        .map_err(|e| ProcessError::InvalidOutput(format!("{}: {:.200}", e, raw)))?;

    let status: WorkStatus = parsed
        .status
        .parse()
        .map_err(|e| ProcessError::InvalidOutput(format!("bad status: {}", e)))?;
    if !status.is_terminal() {
        return Err(ProcessError::InvalidOutput(format!(
            "non-terminal status from scraper: {}",
            status
        )));
    }

    Ok(ProcessOutcome {
        status,
        result_payload: serde_json::json!(parsed.emails),
        error_detail: parsed.error,
        discovered: parsed
            .discovered
            .into_iter()
            .map(|d| DiscoveredItem {
                target: d.target,
                label: d.label,
            })
            .collect(),
    })
}

#[async_trait]
impl SiteProcessor for ScraperBridge {
    async fn process(&self, item: &WorkItem) -> Result<ProcessOutcome, ProcessError> {
        let args = self.unit_args(item);
        let stdout = self.invoke(&args).await?;
        let outcome = parse_unit_output(&stdout)?;

        info!(
            item_id = %item.id,
            stage = %item.stage,
            status = %outcome.status,
            discovered = outcome.discovered.len(),
            "Scraper unit finished"
        );
        Ok(outcome)
    }
}

#[async_trait]
impl PostcodeSource for ScraperBridge {
    async fn fetch_page(&self, area: &str, page: u32) -> Result<PostcodePage, ProcessError> {
        let args = vec![
            "postcodes".to_string(),
            "--area".to_string(),
            area.to_string(),
            "--page".to_string(),
            page.to_string(),
        ];
        let stdout = self.invoke(&args).await?;
        let parsed: PostcodesOutput = serde_json::from_str(&stdout)
            .map_err(|e| ProcessError::InvalidOutput(format!("{}: {:.200}", e, stdout)))?;

        Ok(PostcodePage {
            subsectors: parsed.subsectors,
            has_more: parsed.has_more,
        })
    }
}
