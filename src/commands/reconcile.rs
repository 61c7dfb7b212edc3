//! `inspect`, `apply` and `validate`

use anyhow::{Context as AnyhowContext, Result};
use declarative::{AutoDecline, ExecuteOptions as CycleOptions, NoReport, PrivilegeContext};
use manifest::FileManifest;
use std::path::PathBuf;

use crate::Context;
use crate::cli::{ApplyArgs, ConfigArg, DisplayArgs, InspectArgs};
use crate::config;
use crate::deployment::DeploymentSpec;
use crate::engine::{self, ExecuteOptions};
use crate::paths;
use crate::privilege::SystemPrivilege;
use crate::resource::{InspectOptions, ScriptDeployment};
use crate::rewrite::ambiguous_names;
use crate::ui;

/// Inspect only: never writes files or runs the script in apply mode
pub fn inspect(ctx: &Context, args: InspectArgs) -> Result<()> {
    let (spec, manifest) = load(&args.config, ctx.quiet || args.json)?;
    let unit = ScriptDeployment::new(
        spec,
        manifest,
        &SystemPrivilege,
        inspect_options(&args.display),
    )?;

    if args.json {
        let summary = declarative::reconcile(
            &unit,
            &CycleOptions { dry_run: true },
            &mut NoReport,
            &mut AutoDecline,
        )?;
        let json = serde_json::to_string_pretty(&summary)
            .context("Failed to serialize inspection result")?;
        println!("{json}");
        return Ok(());
    }

    engine::execute(
        &unit,
        &ExecuteOptions {
            dry_run: true,
            yes: false,
            quiet: ctx.quiet,
            verbose: ctx.verbose > 0,
        },
    )?;
    Ok(())
}

/// Full cycle, committing after confirmation
pub fn apply(ctx: &Context, args: ApplyArgs) -> Result<()> {
    let (spec, manifest) = load(&args.config, ctx.quiet)?;
    let unit = ScriptDeployment::new(
        spec,
        manifest,
        &SystemPrivilege,
        inspect_options(&args.display),
    )?;

    if !ctx.quiet {
        ui::header(&format!("scriptdeploy apply: {}", unit.spec().name));
        ui::dim(&declarative::Reconciler::description(&unit));
    }

    engine::execute(
        &unit,
        &ExecuteOptions {
            dry_run: args.dry_run,
            yes: args.yes,
            quiet: ctx.quiet,
            verbose: ctx.verbose > 0,
        },
    )?;
    Ok(())
}

/// Load, validate and summarize a configuration
pub fn validate(ctx: &Context, args: ConfigArg) -> Result<()> {
    let path = config_path(&args)?;
    let (spec, manifest) = load(&args, ctx.quiet)?;

    if ctx.quiet {
        return Ok(());
    }

    ui::header(&format!("Deployment {}", spec.name));
    ui::kv("config", &path.display().to_string());
    ui::kv("deploy path", &spec.deploy_path.display().to_string());
    ui::kv("script", &spec.script_name);
    ui::kv("timeout", &format!("{}s", spec.timeout_seconds));
    ui::kv("audit", &spec.audit_params.join(" "));
    ui::kv("apply", &spec.apply_params.join(" "));
    ui::kv("change codes", &join_codes(&spec.change_codes));
    ui::kv("warning codes", &join_codes(&spec.warning_codes));

    match SystemPrivilege.resolve_identity(&spec.owner) {
        Ok(identity) => ui::kv("owner", &identity.to_string()),
        Err(e) => ui::warn(&format!("owner `{}` cannot be resolved here: {e:#}", spec.owner)),
    }

    ui::section("Files");
    for entry in manifest.entries() {
        ui::dim(&format!("{}  {}", entry.intended_digest().short(), entry.path));
    }

    println!();
    ui::success("Configuration is valid");
    Ok(())
}

fn inspect_options(display: &DisplayArgs) -> InspectOptions {
    InspectOptions {
        show_diff: display.show_diff,
        keep_sandbox: display.keep_sandbox,
    }
}

fn config_path(arg: &ConfigArg) -> Result<PathBuf> {
    match &arg.config {
        Some(path) => Ok(paths::expand(&path.to_string_lossy())),
        None => paths::default_config_path(),
    }
}

fn load(arg: &ConfigArg, quiet: bool) -> Result<(DeploymentSpec, FileManifest)> {
    let path = config_path(arg)?;
    log::info!("Loading deployment from {}", path.display());
    let (spec, manifest) = config::load_deployment(&path)?;

    for (short, long) in ambiguous_names(&manifest) {
        log::warn!("managed name `{short}` is contained in `{long}`");
        if !quiet {
            ui::warn(&format!(
                "`{short}` is part of `{long}`: absolute-path parameters resolve to the first declared"
            ));
        }
    }

    Ok((spec, manifest))
}

fn join_codes(codes: &std::collections::BTreeSet<i32>) -> String {
    if codes.is_empty() {
        return "-".to_string();
    }
    codes
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
