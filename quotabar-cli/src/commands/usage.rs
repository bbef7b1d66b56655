//! The `usage` subcommand.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail};
use quotabar_core::ProviderKind;
use quotabar_fetch::{FetchContext, KeychainCredentialStore, SourceMode};
use quotabar_providers::Orchestrator;

use crate::output;

/// Arguments for one usage fetch.
pub struct UsageArgs {
    pub provider: String,
    pub source: String,
    pub timeout: u64,
    pub cookie_header: Option<String>,
    pub token: Option<String>,
    pub json: bool,
}

pub async fn run(args: UsageArgs) -> anyhow::Result<()> {
    let provider: ProviderKind = args
        .provider
        .parse()
        .map_err(|e| anyhow!("{e}; known providers: {}", known_providers()))?;
    let source = SourceMode::parse(&args.source)
        .ok_or_else(|| anyhow!("unknown source mode '{}'", args.source))?;

    let mut builder = FetchContext::builder()
        .source_mode(source)
        .timeout(Duration::from_secs(args.timeout))
        .credentials(Arc::new(KeychainCredentialStore::new(
            provider.cli_name(),
            "",
        )));
    if let Some(header) = args.cookie_header {
        builder = builder.manual_cookie_header(header);
    }
    if let Some(token) = args.token {
        builder = builder.manual_token(token);
    }
    let ctx = builder.build();

    let outcome = Orchestrator::new().fetch(provider, &ctx).await;
    match outcome.result {
        Ok(result) => {
            if args.json {
                println!("{}", output::usage_json(provider, &result)?);
            } else {
                print!("{}", output::usage_text(provider, &result));
            }
            Ok(())
        }
        Err(error) => {
            for attempt in &outcome.attempts {
                eprintln!(
                    "  {} [{}]: {}",
                    attempt.strategy_id,
                    attempt.kind.source_label(),
                    attempt.error.as_deref().unwrap_or("ok")
                );
            }
            bail!("{} fetch failed: {error}", provider.display_name());
        }
    }
}

fn known_providers() -> String {
    ProviderKind::all()
        .iter()
        .map(|k| k.cli_name())
        .collect::<Vec<_>>()
        .join(", ")
}
