//! The `providers` subcommand.

use quotabar_core::ProviderKind;
use quotabar_fetch::FetchContext;
use quotabar_providers::Orchestrator;
use serde_json::json;

pub fn run(as_json: bool) -> anyhow::Result<()> {
    let ctx = FetchContext::new();
    let orchestrator = Orchestrator::new();

    if as_json {
        let entries: Vec<_> = ProviderKind::all()
            .iter()
            .map(|kind| {
                json!({
                    "provider": kind.cli_name(),
                    "display_name": kind.display_name(),
                    "strategies": orchestrator.strategy_ids(*kind, &ctx),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    for kind in ProviderKind::all() {
        let ids = orchestrator.strategy_ids(*kind, &ctx);
        println!("{:<14} {}", kind.cli_name(), ids.join(" -> "));
    }
    Ok(())
}
