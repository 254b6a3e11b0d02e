use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use http::Method;
use tracing::info;

use crate::config::EngineConfig;
use crate::dispatcher::Dispatcher;
use crate::echo::register_echo_controllers;
use crate::output::OutputRegistry;
use crate::router::RouteTable;
use crate::server::{Http1Writer, Request};
use crate::spec::{build_routes, load_schema, BuildOptions};

/// Command-line interface for brrtdispatch
#[derive(Debug, Parser)]
#[command(name = "brrtdispatch")]
#[command(about = "Inspect and probe schema-driven route tables", long_about = None)]
pub struct Cli {
    /// Engine configuration file (YAML or TOML)
    #[arg(short, long, global = true, env = "BRRTD_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Print the route table derived from a schema, in match order
    Routes {
        /// Path to the OpenAPI/Swagger document (YAML or JSON)
        #[arg(short, long)]
        spec: PathBuf,
    },
    /// Dispatch one request against echo controllers and print the HTTP/1.1 response
    Probe {
        /// Path to the OpenAPI/Swagger document (YAML or JSON)
        #[arg(short, long)]
        spec: PathBuf,

        #[arg(short, long, default_value = "GET")]
        method: String,

        /// Request target, optionally with a query string
        #[arg(short, long)]
        path: String,

        /// Accept header
        #[arg(short, long)]
        accept: Option<String>,

        /// Extra header as `Name: value`; repeatable
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,

        /// Request body
        #[arg(short, long)]
        body: Option<String>,
    },
}

fn load_config(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    let mut config = match path {
        Some(p) => EngineConfig::from_file(p)?,
        None => EngineConfig::default(),
    };
    config.apply_env()?;
    Ok(config)
}

fn route_table(spec: &Path, config: &EngineConfig) -> anyhow::Result<RouteTable> {
    let document = load_schema(spec)?;
    let table = build_routes(
        &document,
        &BuildOptions::from(config),
        &OutputRegistry::with_defaults(),
    )
    .with_context(|| format!("building routes from {}", spec.display()))?;
    Ok(table)
}

/// Run `cli`, writing command output to `out`.
pub fn run_cli_with_output(cli: Cli, out: &mut dyn Write) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref())?;
    match cli.command {
        Commands::Routes { spec } => {
            let table = route_table(&spec, &config)?;
            for line in table.dump() {
                writeln!(out, "{line}")?;
            }
        }
        Commands::Probe {
            spec,
            method,
            path,
            accept,
            headers,
            body,
        } => {
            let table = route_table(&spec, &config)?;
            let mut dispatcher = Dispatcher::from_table(&table)?;
            dispatcher.configure(&config)?;
            let types = register_echo_controllers(dispatcher.handlers_mut(), &table);
            info!(controllers = ?types, "Echo controllers registered");

            let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
                .with_context(|| format!("invalid method '{method}'"))?;
            let mut request = Request::new(method, &path);
            if let Some(accept) = accept {
                request = request.with_header("Accept", &accept);
            }
            for header in &headers {
                let (name, value) = header
                    .split_once(':')
                    .with_context(|| format!("header '{header}' is not 'Name: value'"))?;
                request = request.with_header(name.trim(), value.trim());
            }
            if let Some(body) = body {
                request = request.with_body(body.into_bytes());
            }

            let mut writer = Http1Writer::new(Vec::new());
            let outcome = dispatcher.handle(request, &mut writer);
            out.write_all(&writer.into_inner())?;
            writeln!(out)?;
            info!(status = outcome.status, handler = ?outcome.handler, "Probe finished");
        }
    }
    Ok(())
}

/// Run `cli` against stdout.
pub fn run_cli(cli: Cli) -> anyhow::Result<()> {
    let stdout = std::io::stdout();
    let mut lock = stdout.lock();
    run_cli_with_output(cli, &mut lock)
}
