//! Command-line front end: explains and runs list requests against a graph fixture.
#![forbid(unsafe_code)]

mod ui;

use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};
use crm_query::config::QueryConfig;
use crm_query::error::QueryErrorWithCode;
use crm_query::memory::MemoryGraph;
use crm_query::{execute_read, telemetry, FieldRegistry, ListRequest, QueryError, QueryPlan, View};
use tracing::info;

use ui::{Theme, Ui};

#[derive(Parser, Debug)]
#[command(
    name = "crm-query",
    version,
    about = "Compile and run CRM list requests as paginated graph queries",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(long, global = true, value_name = "FILE", help = "Configuration file to load")]
    config: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format for structured responses"
    )]
    format: OutputFormat,

    #[arg(long, global = true, value_enum, default_value_t = Theme::Auto, help = "Color theme")]
    theme: Theme,

    #[arg(
        long,
        global = true,
        env = "CRM_QUERY_TENANT",
        default_value = "default",
        help = "Tenant every query is scoped to"
    )]
    tenant: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the count and page statements for a request
    Explain(RequestArgs),
    /// Execute a request against a JSON graph fixture
    Run(RunCmd),
    /// List the filterable and sortable fields of a view
    Fields(FieldsCmd),
    /// Print the effective configuration
    Config,
}

#[derive(Args, Debug)]
struct RequestArgs {
    #[arg(long, default_value = "organizations", help = "List view (organizations, contacts)")]
    view: View,

    #[arg(long, value_name = "FILE", help = "JSON request with where/sort/pagination")]
    request: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct RunCmd {
    #[command(flatten)]
    request: RequestArgs,

    #[arg(long, value_name = "FILE", help = "JSON graph fixture with nodes and edges")]
    graph: PathBuf,
}

#[derive(Args, Debug)]
struct FieldsCmd {
    #[arg(long, default_value = "organizations", help = "List view (organizations, contacts)")]
    view: View,
}

fn main() {
    let cli = Cli::parse();
    let ui = Ui::new(cli.theme);
    if let Err(err) = run(&cli, &ui) {
        ui.error(&err.to_string());
        std::process::exit(1);
    }
}

fn run(cli: &Cli, ui: &Ui) -> Result<(), Box<dyn Error>> {
    let config = QueryConfig::load(cli.config.clone())?;
    telemetry::init(&config.log_filter);
    let registry = FieldRegistry::standard()?;

    match &cli.command {
        Command::Explain(args) => {
            let plan = build_plan(cli, &config, &registry, args)?;
            match cli.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&plan)?),
                OutputFormat::Text => print_plan(ui, &plan),
            }
        }
        Command::Run(cmd) => {
            let plan = build_plan(cli, &config, &registry, &cmd.request)?;
            let graph = MemoryGraph::from_json(&read(&cmd.graph)?)?;
            info!(nodes = graph.node_count(), view = %cmd.request.view, "graph fixture loaded");
            let page = execute_read(&graph, &plan).map_err(coded)?;
            match cli.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&page)?),
                OutputFormat::Text => {
                    ui.section(
                        "Result",
                        [
                            ("totalCount", page.total_count.to_string()),
                            ("returned", page.items.len().to_string()),
                            ("pages", page.total_pages(plan.limit).to_string()),
                        ],
                    );
                    ui.list("Items", page.items.iter().map(|node| node.key.clone()));
                }
            }
        }
        Command::Fields(cmd) => {
            let entity = cmd.view.entity();
            let names = registry.exposed_names(entity);
            match cli.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&names)?),
                OutputFormat::Text => {
                    let mut rows = Vec::with_capacity(names.len());
                    for name in names {
                        let meta = registry.resolve(entity, name).map_err(coded)?;
                        let case = if meta.case_sensitivity_capable { ", case-insensitive" } else { "" };
                        rows.push((name, format!("{} ({:?}{case})", meta.property, meta.kind)));
                    }
                    ui.section(&format!("{entity} fields"), rows);
                }
            }
        }
        Command::Config => match cli.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&config)?),
            OutputFormat::Text => print!("{}", config.to_toml()?),
        },
    }
    Ok(())
}

fn build_plan(
    cli: &Cli,
    config: &QueryConfig,
    registry: &FieldRegistry,
    args: &RequestArgs,
) -> Result<QueryPlan, Box<dyn Error>> {
    let request: ListRequest = match &args.request {
        Some(path) => serde_json::from_str(&read(path)?)
            .map_err(|err| format!("invalid request {}: {err}", path.display()))?,
        None => ListRequest::default(),
    };
    let plan = args
        .view
        .plan(registry, &cli.tenant, &request, &config.view_options())
        .map_err(coded)?;
    Ok(plan)
}

fn print_plan(ui: &Ui, plan: &QueryPlan) {
    ui.section(
        "Plan",
        [
            ("entity", plan.entity.to_string()),
            ("skip", plan.skip.to_string()),
            ("limit", plan.limit.to_string()),
        ],
    );
    ui.statement("Count", &plan.count_query_text);
    ui.statement("Page", &plan.page_query_text);
    ui.list("Joins", plan.required_aliases.iter().cloned());
    ui.section(
        "Parameters",
        plan.parameters.iter().map(|(name, value)| (name.as_str(), value)),
    );
}

fn read(path: &Path) -> Result<String, Box<dyn Error>> {
    fs::read_to_string(path).map_err(|err| format!("failed to read {}: {err}", path.display()).into())
}

fn coded(err: QueryError) -> Box<dyn Error> {
    QueryErrorWithCode(&err).to_string().into()
}
