use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::time::timeout;

use super::{Descriptor, ExecutionResult, ExploitModule, TargetType};
use crate::core::options::{OptionSet, OPT_HOST, OPT_PORT, OPT_THREADS, OPT_TIMEOUT};

pub fn descriptor() -> Descriptor {
    Descriptor {
        name: "TCP service banner grab".to_string(),
        module_name: "tcp/banner_grab".to_string(),
        description: "Connects to a TCP service and captures its greeting banner".to_string(),
        author: "pocket".to_string(),
        disclosure_date: NaiveDate::from_ymd_opt(2023, 6, 12).unwrap(),
        service_name: "tcp".to_string(),
        service_version: "any".to_string(),
        check: true,
    }
}

/// Built-in tcp module: grabs whatever the service sends on connect.
pub struct BannerGrabModule {
    options: OptionSet,
}

impl BannerGrabModule {
    pub fn new() -> Self {
        let mut options = OptionSet::new();
        options
            .define(OPT_HOST, true, "Target host")
            .define_with_default(OPT_PORT, true, "Target port", Some("80"))
            .define_with_default(OPT_THREADS, false, "Concurrent workers", Some("10"))
            .define_with_default(OPT_TIMEOUT, false, "Connect/read timeout in seconds", Some("10"));
        Self { options }
    }

    fn endpoint(&self) -> Result<(String, u16, Duration)> {
        let host = self
            .options
            .get_option(OPT_HOST)?
            .context("HOST is not set")?
            .to_string();
        let port: u16 = self
            .options
            .get_option(OPT_PORT)?
            .context("PORT is not set")?
            .parse()
            .context("PORT is not a valid port number")?;
        let seconds: u64 = self
            .options
            .get_option(OPT_TIMEOUT)?
            .unwrap_or("10")
            .parse()
            .context("TIMEOUT is not a valid number of seconds")?;
        Ok((host, port, Duration::from_secs(seconds)))
    }

    async fn grab(&self) -> Result<Option<String>> {
        let (host, port, wait) = self.endpoint()?;
        let addr = format!("{host}:{port}");

        let mut stream = timeout(wait, TcpStream::connect(&addr))
            .await
            .with_context(|| format!("connect to {addr} timed out"))?
            .with_context(|| format!("connect to {addr} failed"))?;

        let mut buf = [0u8; 512];
        let read = match timeout(wait, stream.read(&mut buf)).await {
            Ok(Ok(n)) => n,
            // Services that wait for the client to speak first simply have
            // no greeting to capture.
            _ => 0,
        };

        if read == 0 {
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&buf[..read]).trim().to_string()))
    }
}

impl Default for BannerGrabModule {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExploitModule for BannerGrabModule {
    fn options(&self) -> &OptionSet {
        &self.options
    }

    fn options_mut(&mut self) -> &mut OptionSet {
        &mut self.options
    }

    fn target_type(&self) -> TargetType {
        TargetType::Tcp
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
        let (host, port, wait) = self.endpoint()?;
        let addr = format!("{host}:{port}");
        tracing::debug!("Checking reachability of {}", addr);

        match timeout(wait, TcpStream::connect(&addr)).await {
            Ok(Ok(_)) => Ok(Some(ExecutionResult::success(format!(
                "{addr} accepts TCP connections"
            )))),
            _ => Ok(Some(ExecutionResult::failure(format!(
                "{addr} is unreachable"
            )))),
        }
    }

    async fn exploit(&self) -> Result<ExecutionResult> {
        match self.grab().await? {
            Some(banner) => Ok(ExecutionResult::success(format!("banner: {banner}"))),
            None => Ok(ExecutionResult::failure(
                "service sent no greeting banner".to_string(),
            )),
        }
    }
}
