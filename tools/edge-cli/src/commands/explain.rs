//! Explain how a Cache-Control value drives the cache.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

use edge_cache::{Directive, DirectiveName, DirectiveSet, Expirations, Timestamp};
use edge_core::{Clock, SystemClock};

use super::ExplainArgs;
use crate::context::Context;
use crate::output::format_duration;

#[derive(Debug, Serialize)]
struct Explanation {
    input: String,
    now_ms: u64,
    normalized: String,
    directives: DirectiveSet,
    edge_cacheable: bool,
    edge_cache_control: String,
    edge_error_cache_control: String,
    client_cache_control: String,
    expirations: Expirations,
}

impl Explanation {
    fn new(input: &str, now_ms: u64) -> Self {
        let directives = DirectiveSet::parse(Some(input));
        Self {
            input: input.to_string(),
            now_ms,
            normalized: directives.to_string(),
            edge_cacheable: directives.is_edge_cacheable(),
            edge_cache_control: directives.edge_cache_control(),
            edge_error_cache_control: directives.edge_error_cache_control(),
            client_cache_control: directives.client_cache_control(),
            expirations: Expirations::compute(&directives, now_ms),
            directives,
        }
    }
}

/// Run the explain command.
pub async fn run(args: ExplainArgs, ctx: &Context) -> Result<()> {
    let now_ms = args.now.unwrap_or_else(|| SystemClock.now_ms());
    let explanation = Explanation::new(&args.cache_control, now_ms);

    if ctx.output.is_json() {
        ctx.output.json(&explanation);
        return Ok(());
    }

    ctx.output.header("Directives");
    for name in DirectiveName::ALL {
        ctx.output.kv(name.as_str(), &describe_directive(explanation.directives.get(name)));
    }
    ctx.output.kv("normalized", &explanation.normalized);

    ctx.output.header("Generated Cache-Control");
    ctx.output.kv("stored (success)", &explanation.edge_cache_control);
    ctx.output.kv("stored (origin error)", &explanation.edge_error_cache_control);
    ctx.output.kv("client", &explanation.client_cache_control);
    if explanation.edge_cacheable {
        ctx.output.success("Response will be stored at the edge");
    } else {
        ctx.output.warn("No s-maxage value: response will not be stored");
    }

    ctx.output.header("Expiries");
    let expirations = &explanation.expirations;
    ctx.output.kv("fresh until", &describe_timestamp(&expirations.primary, now_ms));
    ctx.output.kv(
        "stale-while-revalidate until",
        &describe_timestamp(&expirations.stale_while_revalidate, now_ms),
    );
    ctx.output.kv(
        "stale-if-error until",
        &describe_timestamp(&expirations.stale_if_error, now_ms),
    );

    Ok(())
}

fn describe_directive(directive: &Directive) -> String {
    match directive {
        Directive::Absent => "-".to_string(),
        Directive::Present => "present".to_string(),
        Directive::Value(v) => match directive.seconds() {
            Some(_) => v.clone(),
            None => format!("{:?} (not a number)", v),
        },
    }
}

fn describe_timestamp(timestamp: &Timestamp, now_ms: u64) -> String {
    match timestamp {
        Timestamp::Immediate => "already expired".to_string(),
        Timestamp::Forever => "forever".to_string(),
        Timestamp::At(at) => {
            let when = i64::try_from(*at)
                .ok()
                .and_then(DateTime::<Utc>::from_timestamp_millis)
                .map(|dt| dt.to_rfc3339())
                .unwrap_or_else(|| at.to_string());
            let secs = at.saturating_sub(now_ms) / 1000;
            format!("{} (in {})", when, format_duration(secs))
        }
    }
}
