// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::env;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info};

use logship::{logger, Config, LogPipeline, LogSink};

#[tokio::main]
pub async fn main() {
    let log_level = env::var("LOGSHIP_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());

    let pipeline = match Config::from_env().and_then(LogPipeline::new) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            // stderr only, there is no pipeline to ship to
            if logger::init(&log_level, None).is_ok() {
                error!("Unable to start log forwarder: {}", e);
            }
            std::process::exit(1);
        }
    };
    pipeline.start();

    if let Err(e) = logger::init(&log_level, Some(pipeline.sink())) {
        eprintln!("Unable to install logger: {e}");
    }
    debug!("Logging subsystem enabled");
    info!(
        logs_url = %pipeline.config().logs_url,
        "Forwarding stdin to log intake"
    );

    let sink = pipeline.sink();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => forward_line(&sink, &line),
                Ok(None) => {
                    debug!("stdin closed");
                    break;
                }
                Err(e) => {
                    error!("Failed to read stdin: {}", e);
                    break;
                }
            },
            _ = &mut ctrl_c => {
                info!("Received Ctrl-C, shutting down");
                break;
            }
        }
    }

    pipeline.shutdown().await;
    info!("Log forwarder stopped: {}", pipeline.stats());
}

/// JSON object lines are shipped as they are, anything else becomes the
/// message of a new record.
fn forward_line(sink: &LogSink, line: &str) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }
    if is_json_object(line) {
        // rejections are counted by the pipeline
        if let Err(e) = sink.write(line.as_bytes()) {
            debug!("Dropped stdin line: {}", e);
        }
    } else {
        info!(target: "stdin", "{}", line);
    }
}

fn is_json_object(line: &str) -> bool {
    line.starts_with('{')
        && serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(line).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_json_object() {
        assert!(is_json_object(r#"{"msg":"x","level":"INFO"}"#));
        assert!(!is_json_object(r#"["not","an","object"]"#));
        assert!(!is_json_object("{broken"));
        assert!(!is_json_object("plain text"));
    }
}
