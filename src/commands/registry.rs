//! Registry inspection commands

use crate::cli::{OutputFormat, PruneArgs, RegistryArgs};
use crate::commands::CommandContext;
use crate::error::{PinstreamError, Result};
use crate::registry::{ConnectionRegistry, SqliteConnectionRegistry};

fn open_existing(args: &RegistryArgs) -> Result<SqliteConnectionRegistry> {
    if !args.db.exists() {
        return Err(PinstreamError::Registry {
            message: format!("no registry at {}", args.db.display()),
        });
    }
    SqliteConnectionRegistry::open(&args.db)
}

/// Print the registered connection ids
pub fn run_connections(args: &RegistryArgs, ctx: &CommandContext) -> Result<String> {
    let registry = open_existing(args)?;
    let ids = registry.list_all()?;

    match ctx.format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "registry": args.db.display().to_string(),
                "count": ids.len(),
                "connections": ids,
            });
            Ok(format!("{}\n", serde_json::to_string_pretty(&json)?))
        }
        OutputFormat::Text => {
            let mut out = String::new();
            for id in &ids {
                out.push_str(id);
                out.push('\n');
            }
            if ctx.verbose {
                out.push_str(&format!("{} connection(s) in {}\n", ids.len(), args.db.display()));
            }
            Ok(out)
        }
    }
}

/// Remove the given ids. Ids that are not registered are skipped.
pub fn run_prune(args: &PruneArgs, ctx: &CommandContext) -> Result<String> {
    let registry = open_existing(&args.registry)?;

    let mut removed = Vec::new();
    for id in &args.ids {
        if registry.contains(id)? {
            registry.remove(id)?;
            removed.push(id.clone());
        }
    }
    tracing::info!("Pruned {} of {} connection(s)", removed.len(), args.ids.len());

    match ctx.format {
        OutputFormat::Json => {
            let json = serde_json::json!({ "removed": removed });
            Ok(format!("{}\n", serde_json::to_string_pretty(&json)?))
        }
        OutputFormat::Text => Ok(format!("removed {} connection(s)\n", removed.len())),
    }
}
