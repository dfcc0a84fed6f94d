//! Apply, plan and destroy commands
//!
//! All three drive the `azure_orchestrated_vmss` module with a parameter file;
//! they differ only in the desired state and whether check mode is on.

use super::{load_params, CommandContext};
use anyhow::Result;
use clap::Parser;
use rustible_vmss::error::Error;
use rustible_vmss::modules::cloud::azure::vmss::RESOURCE_TYPE;
use rustible_vmss::modules::{ModuleContext, ModuleParams};
use serde_json::Value;
use std::path::PathBuf;

/// Arguments for the apply command
#[derive(Parser, Debug, Clone)]
pub struct ApplyArgs {
    /// Parameter file (YAML or JSON)
    #[arg(required = true)]
    pub file: PathBuf,

    /// Delete and recreate the scale set when an attribute that cannot be
    /// updated in place has changed
    #[arg(long)]
    pub allow_replace: bool,
}

/// Arguments for the plan command
#[derive(Parser, Debug, Clone)]
pub struct PlanArgs {
    /// Parameter file (YAML or JSON)
    #[arg(required = true)]
    pub file: PathBuf,

    /// Plan a replacement instead of failing when one is needed
    #[arg(long)]
    pub allow_replace: bool,
}

/// Arguments for the destroy command
#[derive(Parser, Debug, Clone)]
pub struct DestroyArgs {
    /// Parameter file (YAML or JSON); only `name` and `resource_group_name` are used
    #[arg(required = true)]
    pub file: PathBuf,

    /// Only report what would be deleted
    #[arg(long = "check")]
    pub check_mode: bool,
}

impl ApplyArgs {
    /// Execute the apply command
    pub async fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        let mut params = load_params(&self.file)?;
        if self.allow_replace {
            params.insert("allow_replace".to_string(), Value::Bool(true));
        }

        ctx.output.banner("APPLY");
        run_module(ctx, params, ModuleContext::new().with_diff_mode(true))
    }
}

impl PlanArgs {
    /// Execute the plan command
    pub async fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        let mut params = load_params(&self.file)?;
        if self.allow_replace {
            params.insert("allow_replace".to_string(), Value::Bool(true));
        }

        ctx.output.banner("PLAN");
        run_module(
            ctx,
            params,
            ModuleContext::new().with_check_mode(true).with_diff_mode(true),
        )
    }
}

impl DestroyArgs {
    /// Execute the destroy command
    pub async fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        let mut params = load_params(&self.file)?;
        params.insert("state".to_string(), Value::String("absent".to_string()));

        ctx.output.banner("DESTROY");
        run_module(
            ctx,
            params,
            ModuleContext::new()
                .with_check_mode(self.check_mode)
                .with_diff_mode(true),
        )
    }
}

/// Run the scale set module and report its outcome
fn run_module(ctx: &CommandContext, params: ModuleParams, context: ModuleContext) -> Result<i32> {
    let label = resource_label(&params);
    let registry = ctx.registry()?;

    ctx.output.info(&format!(
        "Running {} against {}{}",
        RESOURCE_TYPE,
        label,
        if context.check_mode { " (check mode)" } else { "" }
    ));

    // The module blocks on the runtime from a scoped thread; keep this
    // worker out of the scheduler while it does
    let result = tokio::task::block_in_place(|| registry.execute(RESOURCE_TYPE, &params, &context));

    let output = result.map_err(Error::from)?;
    ctx.output.module_result(&label, &output);
    ctx.output.flush();

    Ok(0)
}

fn resource_label(params: &ModuleParams) -> String {
    let get = |key: &str| {
        params
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or("?")
            .to_string()
    };
    format!("{}/{}", get("resource_group_name"), get("name"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resource_label() {
        let params: ModuleParams = [
            ("name".to_string(), json!("vmss1")),
            ("resource_group_name".to_string(), json!("rg")),
        ]
        .into_iter()
        .collect();
        assert_eq!(resource_label(&params), "rg/vmss1");
        assert_eq!(resource_label(&ModuleParams::new()), "?/?");
    }
}
