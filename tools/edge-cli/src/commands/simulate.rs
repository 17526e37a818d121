//! Replay a request timeline against an in-memory cache.
//!
//! A scenario file lists steps; each step advances the clock, describes what
//! the origin would answer at that moment and sends one request. Background
//! work is drained after every step.
//!
//! ```toml
//! key = "GET http://localhost/products"
//!
//! [[step]]
//! at_secs = 0
//! cache_control = "s-maxage=60,stale-while-revalidate"
//! body = "v1"
//!
//! [[step]]
//! at_secs = 90
//! status = 500
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use http::{HeaderValue, Method, StatusCode};
use serde::{Deserialize, Serialize};

use edge_cache::header_names::{CACHE_CONTROL, EDGE_CACHE_STATUS};
use edge_cache::{CacheKey, FnOrigin, InMemoryStore, OriginError, SwrCache, SwrRequest};
use edge_core::{EdgeResponse, ManualClock, SwrConfig};
use edge_executor::{DeferredTasks, TaskKind};
use edge_observability::MetricsSnapshot;

use super::SimulateArgs;
use crate::config::SimulateConfig;
use crate::context::Context;
use crate::output::status_badge;

/// A scenario file.
#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    /// Cache key for every step.
    #[serde(default)]
    pub key: Option<String>,

    /// Engine switches; falls back to the CLI config.
    #[serde(default)]
    pub swr: Option<SwrConfig>,

    /// Requests, in order.
    #[serde(default, rename = "step")]
    pub steps: Vec<Step>,
}

impl Scenario {
    /// Parse a scenario from TOML.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse scenario")
    }
}

/// One request and the origin answer it would get.
#[derive(Debug, Clone, Deserialize)]
pub struct Step {
    /// Seconds since the start of the scenario.
    pub at_secs: u64,

    #[serde(default = "default_method")]
    pub method: String,

    /// Origin status code.
    #[serde(default = "default_status")]
    pub status: u16,

    /// Origin Cache-Control header.
    #[serde(default)]
    pub cache_control: Option<String>,

    /// Origin body.
    #[serde(default)]
    pub body: String,

    /// Origin cannot be reached at all.
    #[serde(default)]
    pub unreachable: bool,
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_status() -> u16 {
    200
}

/// Validated origin answer for one step.
#[derive(Debug, Clone)]
struct OriginScript {
    status: StatusCode,
    cache_control: Option<HeaderValue>,
    body: String,
    unreachable: bool,
}

impl OriginScript {
    fn from_step(step: &Step) -> Result<Self> {
        let status = StatusCode::from_u16(step.status)
            .with_context(|| format!("Invalid status at {}s: {}", step.at_secs, step.status))?;
        let cache_control = step
            .cache_control
            .as_deref()
            .map(HeaderValue::from_str)
            .transpose()
            .with_context(|| format!("Invalid cache_control at {}s", step.at_secs))?;

        Ok(Self {
            status,
            cache_control,
            body: step.body.clone(),
            unreachable: step.unreachable,
        })
    }

    fn respond(&self) -> Result<EdgeResponse, OriginError> {
        if self.unreachable {
            return Err(OriginError::Unreachable("scenario".to_string()));
        }
        let mut response = EdgeResponse::new(self.status).with_body(self.body.as_str());
        if let Some(value) = &self.cache_control {
            response = response.with_header(CACHE_CONTROL, value.clone());
        }
        Ok(response)
    }
}

/// What happened at one step.
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub at_secs: u64,
    pub method: String,
    /// HTTP status sent to the client, if any response was produced.
    pub status: Option<u16>,
    /// `x-edge-cache-status` as served (requires debug for bypassed requests).
    pub served: Option<String>,
    pub body: Option<String>,
    pub error: Option<String>,
    /// Origin calls made while handling the step, background included.
    pub origin_calls: usize,
    pub revalidations: usize,
    /// Status of the stored entry after background work finished.
    pub stored: Option<String>,
}

/// Outcome of a whole scenario.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub key: String,
    pub steps: Vec<StepReport>,
    pub metrics: MetricsSnapshot,
}

/// Run a scenario to completion.
pub async fn simulate(scenario: &Scenario, config: SwrConfig, defaults: &SimulateConfig) -> Result<SimulationReport> {
    let key = CacheKey::new(scenario.key.clone().unwrap_or_else(|| defaults.key.clone()));
    let store = Arc::new(InMemoryStore::new());
    let clock = Arc::new(ManualClock::new(defaults.start_ms));
    let cache = SwrCache::with_shared_store(Arc::clone(&store))
        .with_clock(clock.clone())
        .with_config(scenario.swr.unwrap_or(config));
    let tasks = DeferredTasks::new();

    let mut steps = Vec::with_capacity(scenario.steps.len());
    for step in &scenario.steps {
        let method = Method::from_bytes(step.method.as_bytes())
            .with_context(|| format!("Invalid method at {}s: {}", step.at_secs, step.method))?;
        let script = OriginScript::from_step(step)?;

        clock.set(defaults.start_ms.saturating_add(step.at_secs.saturating_mul(1000)));

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let origin = Arc::new(FnOrigin(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            let answer = script.respond();
            async move { answer }
        }));

        let revalidations_before = tasks.scheduled(TaskKind::Revalidate);
        let result = cache
            .handle(&SwrRequest::new(method.clone(), key.clone()), origin, &tasks)
            .await;
        tasks.drain().await;

        let mut report = StepReport {
            at_secs: step.at_secs,
            method: method.to_string(),
            status: None,
            served: None,
            body: None,
            error: None,
            origin_calls: calls.load(Ordering::SeqCst),
            revalidations: tasks.scheduled(TaskKind::Revalidate) - revalidations_before,
            stored: store
                .get(&key)
                .and_then(|r| r.header(EDGE_CACHE_STATUS).map(str::to_string)),
        };
        match result {
            Ok(response) => {
                report.status = Some(response.status.as_u16());
                report.served = response.header(EDGE_CACHE_STATUS).map(str::to_string);
                report.body = Some(response.text());
            }
            Err(err) => report.error = Some(err.to_string()),
        }
        steps.push(report);
    }

    Ok(SimulationReport {
        key: key.to_string(),
        steps,
        metrics: cache.metrics().snapshot(),
    })
}

/// Run the simulate command.
pub async fn run(args: SimulateArgs, ctx: &Context) -> Result<()> {
    let path = ctx.resolve_path(&args.scenario);
    ctx.output.debug(&format!("Loading scenario: {}", path.display()));

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read scenario: {}", path.display()))?;
    let scenario = Scenario::from_toml(&content)?;

    let mut config = ctx.config.swr;
    if args.debug {
        config.debug = true;
    }
    let report = simulate(&scenario, config, &ctx.config.simulate).await?;

    if ctx.output.is_json() {
        ctx.output.json(&report);
        return Ok(());
    }

    ctx.output.header(&format!("Simulating {}", report.key));
    let widths = [8, 7, 7, 12, 7, 8, 12];
    ctx.output.table_row(&["AT", "METHOD", "STATUS", "SERVED", "ORIGIN", "REVAL", "STORED"], &widths);

    for step in &report.steps {
        let at = format!("{}s", step.at_secs);
        let status = step.status.map(|s| s.to_string()).unwrap_or_else(|| "-".to_string());
        let served = step.served.as_deref().unwrap_or("-");
        let origin = step.origin_calls.to_string();
        let reval = step.revalidations.to_string();
        let stored = step.stored.as_deref().unwrap_or("-");

        // Pad before styling so escape codes don't break alignment.
        let served_col = status_badge(&format!("{:12}", served));
        let stored_col = status_badge(&format!("{:12}", stored));
        ctx.output.table_row(
            &[
                at.as_str(),
                step.method.as_str(),
                status.as_str(),
                served_col.as_str(),
                origin.as_str(),
                reval.as_str(),
                stored_col.as_str(),
            ],
            &widths,
        );

        if let Some(error) = &step.error {
            ctx.output.warn(&format!("{}: {}", at, error));
        } else if args.bodies {
            ctx.output.debug(&format!("{}: {:?}", at, step.body.as_deref().unwrap_or_default()));
        }
    }

    let metrics = &report.metrics;
    ctx.output.header("Metrics");
    ctx.output.kv("origin fetches", &metrics.origin_fetches.to_string());
    ctx.output.kv("store writes", &metrics.store_writes.to_string());
    ctx.output.kv("cache ratio", &format!("{:.0}%", metrics.cache_ratio() * 100.0));

    Ok(())
}
