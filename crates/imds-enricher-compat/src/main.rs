// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::{env, sync::Arc};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use imds_enricher::{
    config::ProcessorConfig, constants::SAMPLE_CONFIG, metric::Metric, processor::ImdsProcessor,
};

#[tokio::main]
pub async fn main() {
    let log_level = env::var("DD_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());

    let env_filter = format!("h2=off,hyper=off,rustls=off,reqwest=off,{}", log_level);

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_writer(std::io::stderr)
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    if env::args().any(|arg| arg == "--sample-config") {
        print!("{SAMPLE_CONFIG}");
        return;
    }

    let config = ProcessorConfig::from_env();
    debug!("Loaded configuration: {config:?}");

    let mut processor = ImdsProcessor::new(config);
    if let Err(e) = processor.init() {
        error!("Error initializing AWS IMDS processor: {e}");
        return;
    }

    let (metrics_tx, mut metrics_rx) = mpsc::unbounded_channel::<Metric>();
    if let Err(e) = processor.start(Arc::new(metrics_tx)).await {
        error!("Error starting AWS IMDS processor: {e}");
        return;
    }
    info!(
        "AWS IMDS processor started on instance {}",
        processor.instance_id().unwrap_or("unknown")
    );

    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(metric) = metrics_rx.recv().await {
            let mut line = match serde_json::to_string(&metric) {
                Ok(line) => line,
                Err(e) => {
                    error!("Failed to encode metric {}: {e}", metric.name);
                    continue;
                }
            };
            line.push('\n');
            if let Err(e) = stdout.write_all(line.as_bytes()).await {
                error!("Failed to write metric: {e}");
                break;
            }
        }
        if let Err(e) = stdout.flush().await {
            error!("Failed to flush stdout: {e}");
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = tokio::signal::ctrl_c() => {
                info!("Received interrupt, draining in-flight metrics");
                break;
            }
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!("Failed to read from stdin: {e}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Metric>(&line) {
            Ok(metric) => {
                // in ordered mode a full reorder queue blocks here
                tokio::select! {
                    added = processor.add(metric) => {
                        if let Err(e) = added {
                            error!("Failed to queue metric: {e}");
                            break;
                        }
                    }
                    _ = tokio::signal::ctrl_c() => {
                        info!("Received interrupt, draining in-flight metrics");
                        break;
                    }
                }
            }
            Err(e) => warn!("Failed to parse metric: {e}"),
        }
    }

    processor.stop().await;
    // the accumulator held by the pool is gone now, the writer drains and exits
    if let Err(e) = writer.await {
        error!("Writer task failed: {e}");
    }
    debug!("AWS IMDS processor shut down");
}
