//! `glink` - CLI for groundlink
//!
//! This binary provides the command-line interface for running the telemetry
//! relay and inspecting its durable log and configuration.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use groundlink::broadcast::{BroadcastServer, ViewerRegistry};
use groundlink::cli::{Cli, Command, ConfigCommand, DirectCommand, ServeCommand};
use groundlink::pipeline::{self, PipelineOutputs, PipelineReport};
use groundlink::sink;
use groundlink::source::{open_source, Backoff};
use groundlink::storage::Storage;
use groundlink::store::TelemetryStore;
use groundlink::{init_logging, Config, Error};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    // Load configuration
    let config = Config::load_from(cli.config.clone())?;

    // Execute the command
    match cli.command {
        Command::Serve(serve_cmd) => handle_serve(config, &serve_cmd),
        Command::Direct(direct_cmd) => handle_direct(&config, &direct_cmd),
        Command::Status(status_cmd) => handle_status(&config, status_cmd.json),
        Command::Config(config_cmd) => handle_config(&config, config_cmd),
    }
}

/// Run the full relay: ingestion, durable log, sink, and broadcast server.
fn handle_serve(
    mut config: Config,
    cmd: &ServeCommand,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(bind) = &cmd.bind {
        config.server.bind.clone_from(bind);
    }

    // Fail fast before spinning anything up: initial connect and log open
    // faults go straight to the operator.
    let source = open_source(&config.source)?;
    let storage = Storage::open(config.database_path())?;
    info!(
        "durable log at {}, source {}",
        config.database_path().display(),
        source.description()
    );

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let store = Arc::new(TelemetryStore::new(config.store.cache_capacity));
        let registry = Arc::new(ViewerRegistry::new(config.server.viewer_queue_capacity));
        let (sink_handle, sink_task) = sink::spawn(storage, &config.sink);
        let sink_status = sink_handle.status();

        let listener = tokio::net::TcpListener::bind(&config.server.bind)
            .await
            .map_err(|e| Error::connection(&config.server.bind, e.to_string()))?;

        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
        let server = BroadcastServer::new(
            Arc::clone(&registry),
            Arc::clone(&store),
            config.server.snapshot_len,
        );
        let server_task = tokio::spawn(server.run(listener, shutdown_rx.clone()));

        let outputs = PipelineOutputs {
            store: Arc::clone(&store),
            sink: Some(sink_handle),
            registry: Some(Arc::clone(&registry)),
            echo: false,
        };
        let backoff = Backoff::from_config(&config.source);
        let pipeline_shutdown = shutdown_rx.clone();
        let mut ingestion = tokio::task::spawn_blocking(move || {
            pipeline::run(source, backoff, &outputs, &pipeline_shutdown)
        });

        let joined = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
                let _ = shutdown_tx.send(true);
                (&mut ingestion).await
            }
            joined = &mut ingestion => {
                // The ingestion loop only exits on its own for a fatal fault
                let _ = shutdown_tx.send(true);
                joined
            }
        };

        // Sink handle dropped with the pipeline outputs; the sink drains its
        // buffer and exits, then the server notifies viewers and stops.
        let report = finish_ingestion(joined);
        if let Err(e) = sink_task.await {
            error!("sink task failed: {e}");
        }
        if let Err(e) = server_task.await {
            error!("server task failed: {e}");
        }
        if sink_status.is_failed() {
            error!("durable log fell behind: sink failed closed during this run");
        }

        report.map(|_| ())
    })?;
    Ok(())
}

/// Capture directly to the durable log without a broadcast server.
fn handle_direct(
    config: &Config,
    cmd: &DirectCommand,
) -> Result<(), Box<dyn std::error::Error>> {
    let source = open_source(&config.source)?;
    let storage = Storage::open(config.database_path())?;
    info!(
        "direct capture from {} into {}",
        source.description(),
        config.database_path().display()
    );

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let store = Arc::new(TelemetryStore::new(config.store.cache_capacity));
        let (sink_handle, sink_task) = sink::spawn(storage, &config.sink);

        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
        let outputs = PipelineOutputs {
            store,
            sink: Some(sink_handle),
            registry: None,
            echo: !cmd.no_echo,
        };
        let backoff = Backoff::from_config(&config.source);
        let mut ingestion = tokio::task::spawn_blocking(move || {
            pipeline::run(source, backoff, &outputs, &shutdown_rx)
        });

        let joined = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
                let _ = shutdown_tx.send(true);
                (&mut ingestion).await
            }
            joined = &mut ingestion => joined,
        };

        let report = finish_ingestion(joined);
        if let Err(e) = sink_task.await {
            error!("sink task failed: {e}");
        }
        report.map(|_| ())
    })?;
    Ok(())
}

/// Unwrap the joined ingestion thread, logging its final counters.
fn finish_ingestion(
    joined: Result<groundlink::Result<PipelineReport>, tokio::task::JoinError>,
) -> groundlink::Result<PipelineReport> {
    match joined {
        Ok(Ok(report)) => {
            info!(
                "relay stopped: {} records accepted, {} malformed frames",
                report.accepted, report.malformed
            );
            Ok(report)
        }
        Ok(Err(e)) => Err(e),
        Err(e) => Err(Error::internal(format!("ingestion thread panicked: {e}"))),
    }
}

fn handle_status(config: &Config, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let path = config.database_path();
    if !path.exists() {
        if json {
            println!(
                "{}",
                serde_json::json!({ "database_path": path, "exists": false })
            );
        } else {
            println!("No durable log at {}", path.display());
        }
        return Ok(());
    }

    let storage = Storage::open(&path)?;
    let stats = storage.stats()?;

    if json {
        let status = serde_json::json!({
            "database_path": path,
            "exists": true,
            "total_records": stats.total_records,
            "first_sequence": stats.first_sequence,
            "last_sequence": stats.last_sequence,
            "newest_received_at": stats.newest_received_at,
            "db_size_bytes": stats.db_size_bytes,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("glink status");
        println!("------------");
        println!("Database:       {}", path.display());
        println!("Total records:  {}", stats.total_records);
        match (stats.first_sequence, stats.last_sequence) {
            (Some(first), Some(last)) => println!("Sequences:      {first}..={last}"),
            _ => println!("Sequences:      (empty)"),
        }
        match stats.newest_received_at {
            Some(at) => println!("Newest record:  {at}"),
            None => println!("Newest record:  (none)"),
        }
        println!("Size:           {} bytes", stats.db_size_bytes);
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Source]");
                println!("  Mode:               {}", config.source.mode);
                println!("  Serial port:        {}", config.source.port);
                println!("  Baud rate:          {}", config.source.baudrate);
                println!(
                    "  Loopback:           {}:{}",
                    config.source.host, config.source.listen_port
                );
                println!(
                    "  Reconnect backoff:  {}ms..{}ms, {} attempts",
                    config.source.reconnect_initial_ms,
                    config.source.reconnect_max_ms,
                    config.source.reconnect_max_attempts
                );
                println!();
                println!("[Store]");
                println!("  Cache capacity:     {}", config.store.cache_capacity);
                println!("  Database path:      {}", config.database_path().display());
                println!();
                println!("[Sink]");
                println!("  Flush every:        {} records", config.sink.flush_every);
                println!("  Flush interval:     {}ms", config.sink.flush_interval_ms);
                println!();
                println!("[Server]");
                println!("  Bind address:       {}", config.server.bind);
                println!(
                    "  Viewer queue:       {} records",
                    config.server.viewer_queue_capacity
                );
                println!("  Snapshot length:    {}", config.server.snapshot_len);
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}
