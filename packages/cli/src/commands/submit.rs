use super::{load_controller, publish_data, read_id_map};
use crate::config::Config;
use crate::http::ApiClient;
use anyhow::{anyhow, Result};
use clap::Args;
use colored::Colorize;
use pages_common::BlockIndex;
use pages_editor::{Mode, ModeController};
use pages_evaluator::{MutationExecutor, MutationOutcome, MutationRequest};
use pages_schema::{BlockPath, Id};
use serde_json::Value;
use std::path::PathBuf;
use tracing::warn;

#[derive(Args, Debug)]
pub struct SubmitArgs {
    /// Page document containing the form
    pub input: PathBuf,

    /// Block path of the form (e.g. 2.0 or [2, 0])
    #[arg(short, long)]
    pub form: BlockPath,

    /// JSON object of field values keyed by field id
    #[arg(short, long)]
    pub values: Option<PathBuf>,

    /// JSON object of query results keyed by query id
    #[arg(short, long)]
    pub data: Option<PathBuf>,

    /// Print the request that would be sent without sending it
    #[arg(long)]
    pub dry_run: bool,

    /// Page parameter as KEY=VALUE (repeatable, overrides config)
    #[arg(short, long = "param")]
    pub params: Vec<String>,
}

pub async fn submit(args: SubmitArgs, cwd: &str) -> Result<()> {
    let config = Config::load(cwd)?;
    let mut controller = load_controller(&args.input, &config, &args.params)?;
    // Edit mode renders the form but the executor only previews
    controller.set_mode(if args.dry_run { Mode::Edit } else { Mode::Live })?;

    if let Some(data) = &args.data {
        publish_data(controller.runtime_mut(), data)?;
    }
    if let Some(values) = &args.values {
        fill_form(&mut controller, &args.form, read_id_map(values)?)?;
    }

    let executor = MutationExecutor::new(ApiClient::new(&config.base_url)?);
    let outcome = controller.trigger(&args.form, &executor).await?;

    match outcome {
        MutationOutcome::Submitted { request, response } => {
            print_request("Submitted", &request);
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }
        MutationOutcome::Inert { request: Some(request) } => {
            print_request("Would send", &request);
            Ok(())
        }
        MutationOutcome::Inert { request: None } => {
            Err(anyhow!("The request for form {} could not be built", args.form))
        }
        MutationOutcome::ValidationBlocked { missing_fields } => {
            let names = missing_fields
                .iter()
                .map(Id::as_str)
                .collect::<Vec<_>>()
                .join(", ");
            Err(anyhow!("Form is invalid; fix these fields: {}", names))
        }
        MutationOutcome::Failed { failure, .. } => Err(anyhow!("Mutation failed: {}", failure)),
        other => Err(anyhow!("Mutation was not sent ({})", other.kind())),
    }
}

/// Set every field of the form that has an entry in `values`.
///
/// Only fields that report into this form count; a field of a form nested
/// inside it belongs to the inner form's scope.
fn fill_form(controller: &mut ModeController, form: &BlockPath, values: Vec<(Id, Value)>) -> Result<()> {
    let index = BlockIndex::build(controller.page());
    for (id, value) in values {
        let path = form_field(&index, form, &id);

        match path {
            Some(path) => {
                let state = controller.runtime_mut().set_field_value(&path, value)?;
                if let Some(message) = state.message {
                    warn!(field = %id, %message, "Field is invalid");
                }
            }
            None => warn!(field = %id, "Form has no such field"),
        }
    }
    Ok(())
}

fn form_field(index: &BlockIndex, form: &BlockPath, id: &Id) -> Option<BlockPath> {
    index
        .fields
        .iter()
        .find(|(path, field)| field == id && index.enclosing_form(path) == Some(form))
        .map(|(path, _)| path.clone())
}

fn print_request(label: &str, request: &MutationRequest) {
    println!(
        "{} {} {}",
        label.green().bold(),
        request.method.as_str().bold(),
        request.endpoint
    );
    if let Some(body) = &request.body {
        println!("{}", serde_json::to_string_pretty(body).unwrap_or_default());
    }
}
