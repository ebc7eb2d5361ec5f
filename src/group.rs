//! Launching several catalog entries at once.

use std::fmt;

use crate::catalog::{Catalog, CatalogEntry, ToolKind};
use crate::context::LauncherContext;
use crate::error::LaunchError;
use crate::launcher::{launch, LaunchReport};

/// Which entries a group launch covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupSelector {
    All,
    StaticOnly,
    DevServersOnly,
    Production,
}

impl fmt::Display for GroupSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            GroupSelector::All => "all tools",
            GroupSelector::StaticOnly => "static tools",
            GroupSelector::DevServersOnly => "dev servers",
            GroupSelector::Production => "production tools",
        };
        f.write_str(label)
    }
}

#[derive(Debug)]
pub struct GroupItem {
    pub id: String,
    pub result: Result<LaunchReport, LaunchError>,
}

#[derive(Debug)]
pub enum GroupOutcome {
    /// Confirmation was required and not given; nothing happened.
    Aborted,
    Completed(Vec<GroupItem>),
}

/// Entries covered by `selector`: static pages, then Vite, then Next.js,
/// catalog order within each kind.
pub fn resolve(catalog: &Catalog, selector: GroupSelector) -> Vec<CatalogEntry> {
    let mut entries: Vec<CatalogEntry> = match selector {
        GroupSelector::All => catalog.iter().cloned().collect(),
        GroupSelector::StaticOnly => catalog.of_kind(ToolKind::Static).cloned().collect(),
        GroupSelector::DevServersOnly => catalog
            .iter()
            .filter(|e| e.kind.is_dev_server())
            .cloned()
            .collect(),
        GroupSelector::Production => catalog.production().cloned().collect(),
    };
    // Stable sort keeps catalog order within a kind.
    entries.sort_by_key(|e| e.kind.launch_rank());
    entries
}

/// A set is heavy when it spans both dev-server kinds or is the whole
/// catalog.
pub fn requires_confirmation(catalog: &Catalog, entries: &[CatalogEntry]) -> bool {
    let vite = entries.iter().any(|e| e.kind == ToolKind::Vite);
    let next = entries.iter().any(|e| e.kind == ToolKind::Next);
    (vite && next) || entries.len() == catalog.len()
}

/// Launches every entry of `selector` in order, sleeping the stagger delay
/// between dev servers. One failure never stops the rest.
pub async fn launch_group(
    ctx: &mut LauncherContext,
    selector: GroupSelector,
    confirmed: bool,
) -> GroupOutcome {
    let entries = resolve(&ctx.catalog, selector);
    if requires_confirmation(&ctx.catalog, &entries) && !confirmed {
        tracing::info!(%selector, "group launch not confirmed");
        return GroupOutcome::Aborted;
    }
    tracing::info!(%selector, count = entries.len(), "launching group");

    let mut items = Vec::with_capacity(entries.len());
    let mut launched_dev_server = false;
    for entry in entries {
        if entry.kind.is_dev_server() {
            if launched_dev_server && !ctx.config.stagger_delay.is_zero() {
                tokio::time::sleep(ctx.config.stagger_delay).await;
            }
            launched_dev_server = true;
        }
        ctx.console.line(format!("\n   {}:", entry.name));
        let result = launch(ctx, &entry.id, None).await;
        report_result(ctx, &entry, &result);
        items.push(GroupItem {
            id: entry.id,
            result,
        });
    }
    GroupOutcome::Completed(items)
}

/// Prints one launch outcome.
pub fn report_result(
    ctx: &mut LauncherContext,
    entry: &CatalogEntry,
    result: &Result<LaunchReport, LaunchError>,
) {
    match result {
        Ok(report) if report.is_ready() => ctx.console.ok(report.to_string()),
        Ok(report) => ctx.console.warn(report.to_string()),
        Err(err) => {
            tracing::warn!(id = %entry.id, error = %err, "launch failed");
            ctx.console.error(err.to_string());
        }
    }
}
