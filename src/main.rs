use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use plansql::capability::{default_profiles_path, load_profiles, resolve_profile, Capabilities};
use plansql::sql::check_syntax;
use plansql::template::MarkerId;
use plansql::{compile, ParameterContext, Plan, ResolutionConfiguration, Value};
use tracing_subscriber::EnvFilter;

/// Compile relational plans into parameterized SQL templates
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile a JSON plan and resolve it once
    Compile {
        /// Plan file (JSON)
        #[arg(long)]
        plan: PathBuf,

        /// Target dialect profile
        #[arg(long, default_value = "postgres")]
        dialect: String,

        /// Custom dialect profiles (TOML)
        #[arg(long)]
        profiles: Option<PathBuf>,

        /// Runtime parameter as name=<json value>
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<(String, Value)>,

        /// Force the main branch of a variant marker
        #[arg(long = "select-variant")]
        variants: Vec<u32>,

        /// Placeholder fragment as name=text
        #[arg(long = "placeholder", value_parser = parse_placeholder)]
        placeholders: Vec<(String, String)>,

        /// Parse the resolved SQL before printing it
        #[arg(long)]
        check: bool,
    },
    /// List built-in and custom dialect profiles
    Dialects {
        #[arg(long)]
        profiles: Option<PathBuf>,
    },
}

fn parse_param(s: &str) -> Result<(String, Value), String> {
    let (name, json) = s
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got {:?}", s))?;
    let value = serde_json::from_str(json).map_err(|e| format!("bad value for {}: {}", name, e))?;
    Ok((name.to_string(), value))
}

fn parse_placeholder(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected name=text, got {:?}", s))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::Compile {
            plan,
            dialect,
            profiles,
            params,
            variants,
            placeholders,
            check,
        } => {
            let caps = profile(&dialect, profiles)?;
            let text = std::fs::read_to_string(&plan)
                .with_context(|| format!("failed to read plan {}", plan.display()))?;
            let plan: Plan = serde_json::from_str(&text).context("failed to parse plan JSON")?;
            let template = compile(&plan, &caps).context("compilation failed")?;

            println!("-- template ({})", caps.dialect);
            println!("{}", template);

            let mut ctx = ParameterContext::new();
            for (name, value) in params {
                ctx.set(name, value);
            }
            let mut config = ResolutionConfiguration::prepare(&template, &ctx)
                .context("failed to derive marker values")?;
            for id in variants {
                config = config.select_variant(MarkerId::new(id));
            }
            for (name, fragment) in placeholders {
                config = config.with_placeholder(name, fragment);
            }

            let command = template
                .resolve(&config, &ctx)
                .context("failed to resolve template")?;
            if check {
                check_syntax(&command.text, caps.dialect)
                    .with_context(|| format!("resolved SQL does not parse as {}", caps.dialect))?;
            }
            println!("-- resolved");
            println!("{}", command.text);
            for parameter in &command.parameters {
                println!(
                    "--   {} = {:?} ({})",
                    parameter.marker,
                    parameter.value,
                    parameter.ty.name()
                );
            }
        }
        Command::Dialects { profiles } => {
            for name in Capabilities::builtin_names() {
                println!("{} (built-in)", name);
            }
            let path = profiles.unwrap_or_else(default_profiles_path);
            let custom = load_profiles(&path)
                .with_context(|| format!("failed to load profiles from {}", path.display()))?;
            for (name, caps) in custom {
                println!("{} ({})", name, caps.dialect);
            }
        }
    }
    Ok(())
}

fn profile(name: &str, path: Option<PathBuf>) -> Result<Capabilities> {
    let path = path.unwrap_or_else(default_profiles_path);
    let custom = load_profiles(&path)
        .with_context(|| format!("failed to load profiles from {}", path.display()))?;
    resolve_profile(name, &custom).ok_or_else(|| anyhow!("unknown dialect profile `{}`", name))
}
