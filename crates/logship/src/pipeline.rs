// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Lifecycle of one log pipeline.
//!
//! A [`LogPipeline`] owns the queue, the counters and the batch service. The
//! host builds it once, hands [`LogSink`] clones to every producer, calls
//! [`LogPipeline::start`] (any number of times, the consumer is spawned once)
//! and awaits [`LogPipeline::shutdown`] before exiting.
//!
//! Independent pipelines do not share state, so tests can run several side by
//! side.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::config::Config;
use crate::error::ConfigError;
use crate::logs::flusher::{Flusher, HttpFlusher};
use crate::logs::service::BatchService;
use crate::logs::sink::LogSink;
use crate::logs::stats::{PipelineCounters, PipelineSnapshot};

enum Lifecycle<F: Flusher> {
    /// Built, consumer not spawned yet. Entries written now wait in the queue.
    Idle(BatchService<F>),
    Running(JoinHandle<()>),
    Stopped,
}

pub struct LogPipeline<F: Flusher + 'static = HttpFlusher> {
    config: Arc<Config>,
    sink: LogSink,
    shutdown_token: CancellationToken,
    counters: Arc<PipelineCounters>,
    state: Mutex<Lifecycle<F>>,
    /// Set once the final flush has completed.
    stopped: watch::Sender<bool>,
}

impl LogPipeline<HttpFlusher> {
    /// Builds a pipeline delivering to `config.logs_url` over HTTP.
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        config.validate()?;
        let flusher = HttpFlusher::new(&config)?;
        Self::with_flusher(config, flusher)
    }
}

impl<F: Flusher + 'static> LogPipeline<F> {
    pub fn with_flusher(config: Config, flusher: F) -> Result<Self, ConfigError> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.queue_capacity);
        let shutdown_token = CancellationToken::new();
        let counters = Arc::new(PipelineCounters::default());
        let sink = LogSink::new(tx, config.max_log_size_bytes, Arc::clone(&counters));
        let service = BatchService::new(
            rx,
            &config,
            flusher,
            shutdown_token.clone(),
            Arc::clone(&counters),
        );

        Ok(LogPipeline {
            config: Arc::new(config),
            sink,
            shutdown_token,
            counters,
            state: Mutex::new(Lifecycle::Idle(service)),
            stopped: watch::channel(false).0,
        })
    }

    /// Spawns the batch service on the current tokio runtime.
    ///
    /// Only the first call spawns; later calls, including calls after
    /// shutdown, do nothing. Called outside a runtime, the pipeline stays idle
    /// and [`LogPipeline::shutdown`] delivers the queued entries inline.
    pub fn start(&self) {
        let mut state = self.lock_state();
        if !matches!(*state, Lifecycle::Idle(_)) {
            return;
        }
        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                error!("LOGS | Unable to start log pipeline: {}", e);
                return;
            }
        };
        if let Lifecycle::Idle(service) = std::mem::replace(&mut *state, Lifecycle::Stopped) {
            debug!("LOGS | Starting log pipeline for {}", self.config.logs_url);
            *state = Lifecycle::Running(runtime.spawn(service.run()));
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        match &*self.lock_state() {
            Lifecycle::Running(handle) => !handle.is_finished(),
            Lifecycle::Idle(_) | Lifecycle::Stopped => false,
        }
    }

    /// Returns a new producer handle.
    #[must_use]
    pub fn sink(&self) -> LogSink {
        self.sink.clone()
    }

    /// Token that stops the pipeline when cancelled, e.g. from a signal handler.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn stats(&self) -> PipelineSnapshot {
        self.counters.snapshot()
    }

    /// Stops the pipeline and waits for the final flush.
    ///
    /// A pipeline that was never started still delivers whatever was written
    /// to it, inline on the caller's task. Every caller returns only once the
    /// final flush is done, whichever of them performs it.
    pub async fn shutdown(&self) {
        self.shutdown_token.cancel();

        let previous = std::mem::replace(&mut *self.lock_state(), Lifecycle::Stopped);
        match previous {
            Lifecycle::Idle(service) => service.run().await,
            Lifecycle::Running(handle) => {
                if let Err(e) = handle.await {
                    error!("LOGS | Batch service task failed: {}", e);
                }
            }
            Lifecycle::Stopped => {
                let mut stopped = self.stopped.subscribe();
                // the sender lives as long as `self`
                let _ = stopped.wait_for(|done| *done).await;
                return;
            }
        }

        debug!("LOGS | Log pipeline stopped: {}", self.counters.snapshot());
        self.stopped.send_replace(true);
    }

    fn lock_state(&self) -> MutexGuard<'_, Lifecycle<F>> {
        // the state is only swapped, never left half-updated
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
