//! Website scout: finds local businesses in a category, audits their
//! websites, and reports redesign leads.
//!
//! Template wiring for the hiveflow engine: three event-loop nodes
//! (discovery → audit → report) joined by ON_SUCCESS edges, a weighted
//! goal rubric, and a `tools.json` document (discovered in the working
//! directory) declaring the hosted `web_search`/`web_scrape` capabilities
//! the nodes use.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use rustc_hash::FxHashMap;
use serde_json::json;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use hiveflow::event_bus::EventBus;
use hiveflow::executor::{ExecutionStatus, GraphExecutor};
use hiveflow::goal::{Constraint, Goal, SuccessCriterion};
use hiveflow::graph::{EdgeCondition, EdgeSpec, GraphSpec, LoopConfig, NodeSpec};
use hiveflow::llm::OpenAiProvider;
use hiveflow::runtime::Runtime;
use hiveflow::tools::ToolRegistry;
use hiveflow::utils::id_generator::IdGenerator;

#[derive(Parser)]
#[command(
    name = "scout",
    about = "Run the website scout workflow for a business category"
)]
struct Args {
    /// Category of businesses to search for.
    #[arg(long, default_value = "Law firms in Lusaka")]
    category: String,

    /// Model identifier for the OpenAI-compatible provider.
    #[arg(long, env = "HIVEFLOW_MODEL", default_value = "gpt-4o-mini")]
    model: String,

    /// Base URL override for the provider.
    #[arg(long, env = "HIVEFLOW_API_BASE")]
    api_base: Option<String>,

    /// Storage root for durable run state.
    #[arg(long)]
    storage: Option<PathBuf>,

    /// Resume (or name) a specific run.
    #[arg(long)]
    run_id: Option<String>,

    /// Tool configuration document declaring hosted capabilities.
    #[arg(long, default_value = "tools.json")]
    tools: PathBuf,
}

fn scout_goal() -> Goal {
    Goal {
        id: "website-scout".to_string(),
        name: "Website Scout".to_string(),
        description: "Find local businesses in a category, audit their websites for design \
                      flaws, and report high-priority leads."
            .to_string(),
        success_criteria: vec![
            SuccessCriterion {
                id: "business-discovery".to_string(),
                description: "Identifies at least 5 local businesses with website URLs"
                    .to_string(),
                metric: "discovery_count".to_string(),
                target: ">= 5 businesses".to_string(),
                weight: 0.3,
            },
            SuccessCriterion {
                id: "quality-audit".to_string(),
                description: "Provides a qualitative audit for each website found".to_string(),
                metric: "audit_depth".to_string(),
                target: "Audit for every found site".to_string(),
                weight: 0.4,
            },
            SuccessCriterion {
                id: "actionable-reporting".to_string(),
                description: "Delivers a report with clear sales-pitch tips for the worst sites"
                    .to_string(),
                metric: "report_quality".to_string(),
                target: "Actionable insights provided".to_string(),
                weight: 0.3,
            },
        ],
        constraints: vec![Constraint {
            id: "local-focus".to_string(),
            description: "Focus strictly on businesses located in Lusaka, Zambia".to_string(),
            constraint_type: "safety".to_string(),
            category: "location".to_string(),
        }],
    }
}

fn scout_graph(model: &str) -> GraphSpec {
    let mut entry_points = FxHashMap::default();
    entry_points.insert("start".to_string(), "discovery".to_string());

    GraphSpec {
        id: "website-scout-graph".to_string(),
        goal_id: "website-scout".to_string(),
        version: "0.1.0".to_string(),
        entry_node: "discovery".to_string(),
        entry_points,
        terminal_nodes: vec!["report".to_string()],
        pause_nodes: vec![],
        nodes: vec![
            NodeSpec::new("discovery", "Business Discovery")
                .with_description("Search for local businesses and find their website URLs")
                .with_system_prompt(
                    "You are a local business researcher. Use web_search to find at least 5 \
                     businesses in the requested category with their website URLs, then record \
                     the list (name, URL, short note) as the business_list output.",
                )
                .with_input_keys(&["business_category"])
                .with_output_keys(&["business_list"])
                .with_tools(&["web_search"]),
            NodeSpec::new("audit", "Website Audit")
                .with_description("Visit each website and evaluate design and technical quality")
                .with_system_prompt(
                    "You are a senior web designer auditing sites for redesign leads. Use \
                     web_scrape on each business in business_list, classify each site as \
                     CRITICAL, POOR, or GOOD, and record the full audit as the audit_results \
                     output.",
                )
                .with_input_keys(&["business_list"])
                .with_output_keys(&["audit_results"])
                .with_tools(&["web_scrape"]),
            NodeSpec::new("report", "Lead Report")
                .with_description("Present the audited lead list with actionable insights")
                .with_system_prompt(
                    "You are a sales coordinator. Summarize the audit into a lead sheet, \
                     CRITICAL and POOR sites first, with a sales-pitch tip for each lead, and \
                     record the text as the final_report output.",
                )
                .with_input_keys(&["audit_results"])
                .with_output_keys(&["final_report"])
                .client_facing(),
        ],
        edges: vec![
            EdgeSpec::new(
                "discovery-to-audit",
                "discovery",
                "audit",
                EdgeCondition::OnSuccess,
                1,
            ),
            EdgeSpec::new(
                "audit-to-report",
                "audit",
                "report",
                EdgeCondition::OnSuccess,
                1,
            ),
        ],
        default_model: Some(model.to_string()),
        max_tokens: 8192,
        loop_config: LoopConfig {
            max_iterations: 30,
            max_tool_calls_per_turn: 10,
            max_history_tokens: 64_000,
        },
    }
}

fn default_storage() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".hive")
        .join("website_scout")
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_error::ErrorLayer::default())
        .init();

    let args = Args::parse();

    let registry = Arc::new(ToolRegistry::new());
    match registry.load_config(&args.tools) {
        Ok(0) => tracing::warn!(path = %args.tools.display(), "no tool config found"),
        Ok(count) => tracing::info!(count, "registered hosted tools"),
        Err(e) => return Err(e.into()),
    }

    let mut provider = OpenAiProvider::from_env(&args.model);
    if let Some(base) = &args.api_base {
        provider = provider.with_base_url(base);
    }

    let storage = args.storage.unwrap_or_else(default_storage);
    let event_bus = EventBus::default();
    event_bus.listen_for_events();

    let executor = GraphExecutor::new(
        Arc::new(Runtime::new(storage)),
        Arc::new(provider),
        registry,
        &event_bus,
    );

    let goal = scout_goal();
    let graph = scout_graph(&args.model);
    let run_id = args
        .run_id
        .unwrap_or_else(|| IdGenerator::new().generate_run_id());

    println!("Starting website scout for category: {}", args.category);

    let mut input = FxHashMap::default();
    input.insert("business_category".to_string(), json!(args.category));

    let result = executor.execute(&graph, &goal, &run_id, input).await?;
    event_bus.stop_listener().await;

    match &result.status {
        ExecutionStatus::Completed => {
            println!("Scout finished successfully.");
            if let Some(report) = result.context.get("final_report") {
                println!("\n{report}");
            }
            Ok(())
        }
        ExecutionStatus::Paused { node } => {
            println!("Scout paused at '{node}'; rerun with --run-id {run_id} to resume.");
            Ok(())
        }
        ExecutionStatus::Failed(_) => {
            let reason = result.error.as_deref().unwrap_or("unknown failure");
            eprintln!("Scout failed: {reason}");
            std::process::exit(1);
        }
    }
}
