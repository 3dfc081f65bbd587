//! SimplDB - CLI Client

use anyhow::{Context, Result};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::env;
use std::io::{self, Write};
use tracing_subscriber::EnvFilter;

use simpldb::sql;
use simpldb::storage::Record;
use simpldb::{Database, DatabaseConfig, QueryResult};

/// Print welcome banner
fn print_banner(db: &Database) {
    let info = db.database_info();
    println!(
        r#"
 SimplDB v{}
 A small relational database engine in Rust
 Database '{}' in {} ({} tables)
 Type '.help' for help, '.quit' to exit
"#,
        env!("CARGO_PKG_VERSION"),
        info.name,
        info.data_dir.display(),
        info.table_count
    );
}

/// Print help message
fn print_help() {
    println!(
        r#"
Commands:
  .help              Show this help message
  .quit              Exit SimplDB
  .tables            List all tables
  .schema [table]    Show CREATE statements
  .info              Show database summary
  .clear             Clear screen

SQL Commands:
  CREATE TABLE ...   Create a new table
  DROP TABLE ...     Drop a table
  CREATE INDEX ...   Create an index
  DROP INDEX ...     Drop an index
  INSERT INTO ...    Insert rows
  SELECT ...         Query data
  UPDATE ...         Update rows
  DELETE FROM ...    Delete rows
  BEGIN / COMMIT / ROLLBACK

Examples:
  CREATE TABLE users (id INTEGER PRIMARY KEY, name VARCHAR(100));
  INSERT INTO users VALUES (1, 'Alice'), (2, 'Bob');
  SELECT * FROM users WHERE id = 1;
"#
    );
}

/// Format query results as a table
fn format_results(columns: &[String], rows: &[Record]) -> String {
    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            columns
                .iter()
                .map(|c| row.get(c).map(|v| v.to_string()).unwrap_or_default())
                .collect()
        })
        .collect();

    // Calculate column widths
    let mut widths: Vec<usize> = columns.iter().map(|c| c.chars().count()).collect();
    for row in &cells {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let separator: String = widths
        .iter()
        .map(|w| "-".repeat(*w + 2))
        .collect::<Vec<_>>()
        .join("+");
    let separator = format!("+{}+\n", separator);

    let mut output = String::new();
    output.push_str(&separator);
    let header: String = columns
        .iter()
        .zip(&widths)
        .map(|(c, w)| format!(" {:^width$} ", c, width = *w))
        .collect::<Vec<_>>()
        .join("|");
    output.push_str(&format!("|{}|\n", header));
    output.push_str(&separator);

    for row in &cells {
        let line: String = row
            .iter()
            .zip(&widths)
            .map(|(v, w)| format!(" {:<width$} ", v, width = *w))
            .collect::<Vec<_>>()
            .join("|");
        output.push_str(&format!("|{}|\n", line));
    }

    if !cells.is_empty() {
        output.push_str(&separator);
    }

    output
}

fn print_result(result: &QueryResult) {
    if !result.success {
        match result.error_kind {
            Some(kind) => eprintln!("Error ({:?}): {}", kind, result.message),
            None => eprintln!("Error: {}", result.message),
        }
        return;
    }

    if !result.columns.is_empty() {
        print!("{}", format_results(&result.columns, &result.rows));
    }
    println!("{}", result.message);
}

/// Execute every statement in the buffer
fn execute_sql(db: &Database, input: &str) {
    for statement in sql::split_statements(input) {
        print_result(&db.execute(&statement));
    }
}

fn print_schema(db: &Database, table: &str) {
    match db.describe_table(table) {
        Some(desc) => {
            println!("{};", desc.ddl);
            for index in desc.indexes.iter().filter(|i| !i.automatic) {
                let unique = if index.unique { "UNIQUE " } else { "" };
                println!(
                    "CREATE {}INDEX {} ON {} ({});",
                    unique, index.name, desc.name, index.column
                );
            }
        }
        None => eprintln!("Error: table '{}' not found", table),
    }
}

/// Handle special dot commands. Returns `false` when the REPL should stop.
fn handle_special_command(cmd: &str, db: &Database) -> bool {
    let parts: Vec<&str> = cmd.split_whitespace().collect();

    match parts.first().copied() {
        Some(".help") => print_help(),
        Some(".quit") | Some(".exit") => return false,
        Some(".tables") => {
            let tables = db.list_tables();
            if tables.is_empty() {
                println!("No tables found.");
            } else {
                println!("Tables:");
                for table in tables {
                    println!("  {}", table);
                }
            }
        }
        Some(".schema") => match parts.get(1) {
            Some(table) => print_schema(db, table),
            None => {
                for table in db.list_tables() {
                    print_schema(db, &table);
                }
            }
        },
        Some(".info") => {
            let info = db.database_info();
            println!("Name:                {}", info.name);
            println!("Data directory:      {}", info.data_dir.display());
            println!("Catalog version:     {}", info.version);
            println!("Created:             {}", info.created_at);
            println!("Tables:              {}", info.table_count);
            println!("Rows:                {}", info.total_rows);
            println!("Indexes:             {}", info.index_count);
            println!("Active transactions: {}", info.active_transactions);
        }
        Some(".clear") => {
            // ANSI clear screen
            print!("\x1B[2J\x1B[1;1H");
            let _ = io::stdout().flush();
        }
        Some(cmd) => {
            eprintln!("Unknown command: {}", cmd);
            eprintln!("Type '.help' for available commands.");
        }
        None => {}
    }
    true
}

/// Main REPL loop
fn run_repl(db: &Database) -> Result<()> {
    let mut editor = DefaultEditor::new().context("failed to initialise line editor")?;
    print_banner(db);

    let mut buffer = String::new();
    loop {
        let prompt = if buffer.is_empty() { "simpldb> " } else { "   ...> " };
        match editor.readline(prompt) {
            Ok(line) => {
                let trimmed = line.trim();

                if buffer.is_empty() && trimmed.starts_with('.') {
                    let _ = editor.add_history_entry(trimmed);
                    if !handle_special_command(trimmed, db) {
                        break;
                    }
                    continue;
                }
                if trimmed.is_empty() && buffer.is_empty() {
                    continue;
                }

                buffer.push_str(&line);
                buffer.push('\n');

                if sql::is_complete(&buffer) {
                    let _ = editor.add_history_entry(buffer.trim());
                    execute_sql(db, &buffer);
                    buffer.clear();
                }
            }
            Err(ReadlineError::Interrupted) => {
                // Ctrl-C drops the pending statement
                buffer.clear();
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e).context("failed to read input"),
        }
    }

    println!("Goodbye!");
    Ok(())
}

fn parse_args() -> DatabaseConfig {
    let args: Vec<String> = env::args().collect();
    let mut config = DatabaseConfig::new();

    // Simple argument parsing
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--data-dir" | "-d" => {
                if let Some(dir) = args.get(i + 1) {
                    config = config.data_dir(dir);
                    i += 1;
                }
            }
            "--name" | "-n" => {
                if let Some(name) = args.get(i + 1) {
                    config = config.name(name.as_str());
                    i += 1;
                }
            }
            other => eprintln!("Ignoring unknown argument: {}", other),
        }
        i += 1;
    }
    config
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("simpldb=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn main() -> Result<()> {
    init_logging();

    let config = parse_args();
    let data_dir = config.data_dir.clone();
    let db = Database::open(config)
        .with_context(|| format!("failed to open database in {}", data_dir.display()))?;

    run_repl(&db)?;
    db.close().context("failed to close database")?;
    Ok(())
}
