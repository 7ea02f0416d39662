use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;

use super::{Descriptor, ExecutionResult, ExploitModule, TargetType};
use crate::core::options::{OptionSet, OPT_THREADS, OPT_TIMEOUT, OPT_URL};

pub fn descriptor() -> Descriptor {
    Descriptor {
        name: "HTTP header probe".to_string(),
        module_name: "http/header_probe".to_string(),
        description: "Fetches a URL and reports server-identifying response headers".to_string(),
        author: "pocket".to_string(),
        disclosure_date: NaiveDate::from_ymd_opt(2023, 9, 4).unwrap(),
        service_name: "http".to_string(),
        service_version: "any".to_string(),
        check: true,
    }
}

/// Headers worth reporting when fingerprinting a web server.
const INTERESTING_HEADERS: &[&str] = &["server", "x-powered-by", "x-aspnet-version", "via"];

/// Built-in http module: probes a URL and surfaces identifying headers.
pub struct HeaderProbeModule {
    options: OptionSet,
}

impl HeaderProbeModule {
    pub fn new() -> Self {
        let mut options = OptionSet::new();
        options
            .define(OPT_URL, true, "Target URL")
            .define_with_default(OPT_THREADS, false, "Concurrent workers", Some("10"))
            .define_with_default(OPT_TIMEOUT, false, "Request timeout in seconds", Some("10"));
        Self { options }
    }

    fn request_target(&self) -> Result<(String, Duration)> {
        let raw = self
            .options
            .get_option(OPT_URL)?
            .context("URL is not set")?;
        let url = if raw.starts_with("http://") || raw.starts_with("https://") {
            raw.to_string()
        } else {
            format!("http://{raw}")
        };
        let seconds: u64 = self
            .options
            .get_option(OPT_TIMEOUT)?
            .unwrap_or("10")
            .parse()
            .context("TIMEOUT is not a valid number of seconds")?;
        Ok((url, Duration::from_secs(seconds)))
    }

    async fn fetch(&self) -> Result<reqwest::Response> {
        let (url, wait) = self.request_target()?;

        let client = reqwest::Client::builder()
            .timeout(wait)
            .danger_accept_invalid_certs(true)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("failed to build HTTP client")?;

        client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))
    }
}

impl Default for HeaderProbeModule {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExploitModule for HeaderProbeModule {
    fn options(&self) -> &OptionSet {
        &self.options
    }

    fn options_mut(&mut self) -> &mut OptionSet {
        &mut self.options
    }

    fn target_type(&self) -> TargetType {
        TargetType::Http
    }

    fn info(&self) -> BTreeMap<String, String> {
        let d = descriptor();
        BTreeMap::from([
            ("name".to_string(), d.name),
            ("module_name".to_string(), d.module_name),
            ("description".to_string(), d.description),
            ("author".to_string(), d.author),
            ("disclosure_date".to_string(), d.disclosure_date.to_string()),
        ])
    }

    async fn check(&self) -> Result<Option<ExecutionResult>> {
        let response = self.fetch().await?;
        let status = response.status();
        Ok(Some(if status.is_server_error() {
            ExecutionResult::failure(format!("target answered with {status}"))
        } else {
            ExecutionResult::success(format!("target is responsive ({status})"))
        }))
    }

    async fn exploit(&self) -> Result<ExecutionResult> {
        let response = self.fetch().await?;
        let status = response.status();

        let mut reported = Vec::new();
        for name in INTERESTING_HEADERS {
            if let Some(value) = response.headers().get(*name) {
                reported.push(format!("{name}: {}", value.to_str().unwrap_or("<binary>")));
            }
        }

        if reported.is_empty() {
            Ok(ExecutionResult::failure(format!(
                "no identifying headers exposed ({status})"
            )))
        } else {
            Ok(ExecutionResult::success(format!(
                "[{status}] {}",
                reported.join("; ")
            )))
        }
    }
}
