use anyhow::Result;
use clap::Parser;

use asubox::cli::{Cli, Commands};
use asubox::fetch::VersionPin;
use asubox::service::App;
use asubox::sweeper;
use asubox_core::observability;
use asubox_store::DEFAULT_LOG_PAGE_SIZE;

fn main() -> Result<()> {
    observability::init_tracing();
    let cli = Cli::parse();
    let app = App::from_env()?;

    match cli.command {
        Commands::Create {
            url,
            branch,
            commit,
            no_validate,
        } => {
            let pin = match (branch, commit) {
                (Some(b), _) => Some(VersionPin::Branch(b)),
                (None, Some(c)) => Some(VersionPin::Commit(c)),
                (None, None) => None,
            };
            let record = app.create(&url, pin, !no_validate)?;
            println!("{}", record.id);
        }
        Commands::Info { id, json } => {
            let (record, executions) = app.info(&id)?;
            if json {
                let doc = serde_json::json!({
                    "container": record,
                    "executions": executions,
                });
                println!("{}", serde_json::to_string_pretty(&doc)?);
            } else {
                println!("id:         {}", record.id);
                println!("source:     {}", record.source.url);
                if let Some(v) = &record.source.version {
                    println!("version:    {} {}", v.kind, v.value);
                }
                println!("status:     {}", record.status.as_str());
                println!("size:       {} bytes", record.size_bytes);
                println!("created:    {}", record.created_at);
                println!(
                    "accessed:   {}",
                    record.last_accessed.as_deref().unwrap_or("never")
                );
                println!("expires:    {}", record.expires_at);
                println!("executions: {}", executions.len());
                for e in executions.iter().take(10) {
                    println!(
                        "  {} {} (exit {})",
                        e.executed_at, e.command, e.exit_code
                    );
                }
            }
        }
        Commands::List { json } => {
            let records = app.list()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else if records.is_empty() {
                println!("no active containers");
            } else {
                for r in records {
                    println!("{}  {}  expires {}", r.id, r.source.url, r.expires_at);
                }
            }
        }
        Commands::Exec {
            id,
            command,
            args,
            timeout,
            no_bootstrap,
        } => {
            let output = app.execute(&id, &command, &args, timeout, !no_bootstrap)?;
            print!("{}", output.stdout);
            eprint!("{}", output.stderr);
            std::process::exit(output.exit_code);
        }
        Commands::Stop { id } => {
            if app.executor.stop(&id) {
                println!("stop requested for {id}");
            } else {
                println!("no running command for {id}");
            }
        }
        Commands::Status { id } => match app.executor.status(&id) {
            Some(pid) => println!("{id}: running (pid {pid})"),
            None => println!("{id}: idle"),
        },
        Commands::Delete { id } => {
            app.delete(&id)?;
            println!("deleted {id}");
        }
        Commands::EnvSet { id, name, value } => {
            app.set_env(&id, &name, &value)?;
            println!("{name} set for {id}");
        }
        Commands::EnvList { id } => {
            let vars = app.store.get_env_vars(&id)?;
            let mut names: Vec<_> = vars.keys().collect();
            names.sort();
            for name in names {
                println!("{name}={}", vars[name]);
            }
        }
        Commands::Logs { id, page } => {
            let entries = app.store.get_logs(&id, page, DEFAULT_LOG_PAGE_SIZE)?;
            for e in entries {
                print!("{} [{}] {}", e.timestamp, e.stream, e.message);
                if !e.message.ends_with('\n') {
                    println!();
                }
            }
        }
        Commands::Sweep => {
            let (swept, failed) = sweeper::sweep_once(&app.store, &app.archives)?;
            println!("expired {swept} container(s), {failed} failure(s)");
        }
        Commands::Maintain => {
            app.store.maintain()?;
            println!("maintenance completed");
        }
        Commands::Daemon => {
            tracing::info!(
                sweep_period_secs = app.retention.sweep_period_secs,
                "sweeper running, press Ctrl-C to exit"
            );
            // The binding must outlive the loop: dropping the handle
            // raises the sweeper's stop flag.
            let _sweeper = sweeper::Sweeper::start(
                app.store.clone(),
                app.archives.clone(),
                app.retention,
            );
            // Nothing unparks this thread; termination comes from the
            // OS, which tears the whole process down.
            loop {
                std::thread::park();
            }
        }
    }

    Ok(())
}
