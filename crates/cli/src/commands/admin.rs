//! Administrative commands: deletion through the command table, queue and
//! table inspection

use anyhow::{bail, Result};
use colored::Colorize;
use serde::Serialize;
use serde_json::{json, Value};
use tabled::Tabled;

use crate::client::{ApiClient, Statement, StatementOutcome};
use crate::output::{
    color_status, format_cell, format_timestamp, print_info, print_success, print_table,
    OutputFormat,
};

pub const COMMANDS_TABLE: &str = "commands";

/// Command text deleting a predictor
pub fn delete_command(name: &str, force: bool) -> Result<String> {
    if name.is_empty() || name.contains(char::is_whitespace) {
        bail!("invalid predictor name '{}'", name);
    }
    Ok(if force {
        format!("delete predictor {} force", name)
    } else {
        format!("delete predictor {}", name)
    })
}

/// Enqueue a command; the server processes it in the background
pub async fn enqueue(client: &ApiClient, command: &str, format: OutputFormat) -> Result<()> {
    let statement = Statement::Insert {
        table: COMMANDS_TABLE.to_string(),
        columns: vec!["command".into()],
        values: vec![json!(command)],
    };
    client.execute(&statement).await?;

    match format {
        OutputFormat::Json => println!("{}", json!({"command": command, "status": "pending"})),
        OutputFormat::Table => {
            print_success(&format!("Queued: {}", command));
            print_info("Check the outcome with `ptq commands`");
        }
    }
    Ok(())
}

/// Row for the commands table
#[derive(Tabled, Serialize)]
struct CommandRow {
    #[tabled(rename = "Seq")]
    seq: String,
    #[tabled(rename = "Command")]
    command: String,
    #[tabled(rename = "Enqueued")]
    enqueued_at: String,
    #[tabled(rename = "Outcome")]
    outcome: String,
    #[tabled(rename = "Message")]
    message: String,
}

/// Show the command log
pub async fn list_commands(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let statement = Statement::Select {
        table: COMMANDS_TABLE.to_string(),
        projection: vec![
            "seq".into(),
            "command".into(),
            "enqueued_at".into(),
            "outcome".into(),
            "message".into(),
        ],
        conditions: Vec::new(),
    };
    let rows = match client.execute(&statement).await? {
        StatementOutcome::Rows { rows, .. } => rows,
        other => bail!("unexpected response to commands query: {:?}", other),
    };

    let text = |v: Option<&Value>| match v {
        Some(Value::Null) | None => String::new(),
        Some(v) => format_cell(v),
    };
    let commands: Vec<CommandRow> = rows
        .iter()
        .map(|row| {
            let outcome = text(row.get(3));
            CommandRow {
                seq: text(row.first()),
                command: text(row.get(1)),
                enqueued_at: format_timestamp(&text(row.get(2))),
                outcome: match format {
                    OutputFormat::Table => color_status(&outcome),
                    OutputFormat::Json => outcome,
                },
                message: text(row.get(4)),
            }
        })
        .collect();

    print_table(&commands, format);
    Ok(())
}

/// List the tables of the virtual database
pub async fn list_tables(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let tables = client.tables().await?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&tables)?),
        OutputFormat::Table => {
            println!("{}", format!("Tables in {}", tables.database).bold());
            for table in &tables.tables {
                println!("  {}", table);
            }
        }
    }
    Ok(())
}
