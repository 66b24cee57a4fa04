use super::{load_controller, publish_data};
use crate::config::Config;
use crate::http::ApiClient;
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use pages_editor::Mode;
use pages_evaluator::{PageRuntime, SourceState};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Args, Debug)]
pub struct RenderArgs {
    /// Page document to render
    pub input: PathBuf,

    /// JSON object of query results keyed by query id
    #[arg(short, long)]
    pub data: Option<PathBuf>,

    /// Fetch remaining queries from the configured base URL
    #[arg(long)]
    pub fetch: bool,

    /// Mode to render in (code, edit, live)
    #[arg(short, long, default_value = "live")]
    pub mode: Mode,

    /// Page parameter as KEY=VALUE (repeatable, overrides config)
    #[arg(short, long = "param")]
    pub params: Vec<String>,
}

pub async fn render(args: RenderArgs, cwd: &str) -> Result<()> {
    let config = Config::load(cwd)?;
    let mut controller = load_controller(&args.input, &config, &args.params)?;
    controller.set_mode(args.mode)?;

    if let Some(data) = &args.data {
        publish_data(controller.runtime_mut(), data)?;
    }

    if args.fetch {
        let client = ApiClient::new(&config.base_url)?;
        fetch_queries(controller.runtime_mut(), &client).await;
    }

    // Code mode renders nothing; show the text the page is edited as
    if args.mode == Mode::Code {
        println!("{}", controller.document().source()?);
        return Ok(());
    }

    let tree = controller.tree();
    println!("{}", serde_json::to_string_pretty(tree)?);

    let errors = tree_errors(controller.runtime());
    if errors > 0 {
        eprintln!("{} {} error region(s) rendered", "!".yellow(), errors);
    }
    Ok(())
}

/// Answer queued queries until the page stops asking for more. Queries nested
/// in other queries are only requested once their parent has data.
async fn fetch_queries(runtime: &mut PageRuntime, client: &ApiClient) {
    loop {
        let requests = runtime.take_query_requests();
        if requests.is_empty() {
            break;
        }

        for request in requests {
            let state = match client.fetch(&request.endpoint).await {
                Ok(value) => {
                    info!(id = %request.id, endpoint = %request.endpoint, "Query loaded");
                    SourceState::Ready(value)
                }
                Err(failure) => {
                    warn!(id = %request.id, error = %failure, "Query failed");
                    SourceState::Failed(failure.to_string())
                }
            };
            runtime.publish(request.id, state);
        }
        runtime.flush();
    }
}

fn tree_errors(runtime: &PageRuntime) -> usize {
    let mut errors = 0;
    runtime.tree().walk(|node| {
        if node.kind() == "error" {
            errors += 1;
        }
    });
    errors
}
