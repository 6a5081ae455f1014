//! Concurrent source → mapper → filter → sink run
//!
//! Each stage is its own task, linked by channels of capacity 1 so records
//! leave the sink in the order the source read their lines. Shutdown uses
//! three tokens:
//!
//! - `stop` asks the upstream stages to wind down. The filter fires it when
//!   the record limit is reached.
//! - `abort`, the parent of `stop`, also tells the sink not to finalize
//!   because the run failed.
//! - `source_failed` is set by the source before it closes its channel. The
//!   failure therefore sits at the end of the line stream, and the filter
//!   only turns it into an abort if it reaches end of input before the limit.
//!   Whether a run fails depends on the input alone, not on task timing.

use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;

use sherlog_types::{Entry, Line};

use crate::error::{PipelineError, ProcessorError};
use crate::filter::Predicate;
use crate::mapper::{MapperState, RegexMapper};
use crate::processor::Processor;
use crate::reader::LineSource;

/// Send `item` unless `cancel` fires first; false means stop producing
pub(crate) async fn forward<T>(out: &mpsc::Sender<T>, cancel: &CancellationToken, item: T) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        sent = out.send(item) => sent.is_ok(),
    }
}

/// A configured run: how lines become records and which records reach the sink
#[derive(Clone, Debug)]
pub struct Pipeline {
    mapper: RegexMapper,
    predicate: Predicate,
    max: Option<u64>,
    scan_continuations: bool,
}

impl Pipeline {
    /// Accept every record, no limit, exceptions taken from the message only
    pub fn new(mapper: RegexMapper) -> Self {
        Self {
            mapper,
            predicate: Predicate::All,
            max: None,
            scan_continuations: false,
        }
    }

    pub fn with_filter(mut self, predicate: Predicate) -> Self {
        self.predicate = predicate;
        self
    }

    /// Stop after `max` accepted records; `None` means unlimited
    pub fn with_max(mut self, max: Option<u64>) -> Self {
        self.max = max;
        self
    }

    /// Also look for exceptions in continuation lines
    pub fn scan_continuations(mut self, enabled: bool) -> Self {
        self.scan_continuations = enabled;
        self
    }

    /// Run to completion and hand the processor back
    ///
    /// Returns once every stage has exited. On success the processor's
    /// `after` has run exactly once. On failure it has not run, and the
    /// first error (source before sink) is returned.
    ///
    /// A source error that comes after the record limit was reached does not
    /// fail the run: those lines would never have been used.
    pub async fn execute<S, P>(self, source: S, processor: P) -> Result<P, PipelineError>
    where
        S: LineSource,
        P: Processor + 'static,
    {
        let abort = CancellationToken::new();
        let stop = abort.child_token();
        let source_failed = CancellationToken::new();

        let (line_tx, line_rx) = mpsc::channel::<Line>(1);
        let (entry_tx, entry_rx) = mpsc::channel::<Entry>(1);
        let (accepted_tx, accepted_rx) = mpsc::channel::<Entry>(1);

        let source_task = tokio::spawn({
            let stop = stop.clone();
            let failed = source_failed.clone();
            async move {
                let result = source.read(&line_tx, &stop).await;
                if let Err(e) = &result {
                    tracing::debug!(error = %e, "source failed, closing input");
                    // Flag before the sender drops so the filter sees it at end of input
                    failed.cancel();
                }
                drop(line_tx);
                result
            }
        });
        let mapper_task = tokio::spawn(map_records(
            self.mapper.start(self.scan_continuations),
            line_rx,
            entry_tx,
            stop.clone(),
        ));
        let filter_task = tokio::spawn(filter_records(
            self.predicate,
            self.max,
            entry_rx,
            accepted_tx,
            FilterSignals {
                stop,
                abort: abort.clone(),
                source_failed,
            },
        ));
        let sink_task = tokio::spawn(drain(processor, accepted_rx, abort));

        let (source, mapper, filter, sink) =
            tokio::join!(source_task, mapper_task, filter_task, sink_task);

        let source = source.map_err(stage_failed("source"))?;
        let mapped = mapper.map_err(stage_failed("mapper"))?;
        let filtered = filter.map_err(stage_failed("filter"))?;
        let sink = sink.map_err(stage_failed("sink"))?;

        match source {
            Err(e) if filtered.limit_reached => {
                tracing::debug!(error = %e, "ignoring source error after record limit");
            }
            result => result?,
        }
        let processor = sink?.ok_or(PipelineError::Aborted)?;
        tracing::info!(
            records = mapped,
            accepted = filtered.accepted,
            "pipeline finished"
        );
        Ok(processor)
    }
}

fn stage_failed(stage: &'static str) -> impl FnOnce(JoinError) -> PipelineError {
    move |source| PipelineError::Stage { stage, source }
}

async fn map_records(
    mut state: MapperState,
    mut lines: mpsc::Receiver<Line>,
    out: mpsc::Sender<Entry>,
    stop: CancellationToken,
) -> u64 {
    let mut records = 0;
    loop {
        let line = tokio::select! {
            biased;
            _ = stop.cancelled() => return records,
            line = lines.recv() => line,
        };
        let Some(line) = line else { break };

        if let Some(entry) = state.push(line) {
            records += 1;
            if !forward(&out, &stop, entry).await {
                return records;
            }
        }
    }

    if let Some(entry) = state.finish() {
        records += 1;
        forward(&out, &stop, entry).await;
    }
    tracing::debug!(records, "mapper finished");
    records
}

struct FilterSignals {
    stop: CancellationToken,
    abort: CancellationToken,
    source_failed: CancellationToken,
}

struct FilterOutcome {
    accepted: u64,
    limit_reached: bool,
}

async fn filter_records(
    predicate: Predicate,
    max: Option<u64>,
    mut records: mpsc::Receiver<Entry>,
    out: mpsc::Sender<Entry>,
    signals: FilterSignals,
) -> FilterOutcome {
    let mut accepted = 0;
    if max == Some(0) {
        signals.stop.cancel();
        return FilterOutcome {
            accepted,
            limit_reached: true,
        };
    }

    loop {
        let entry = tokio::select! {
            biased;
            _ = signals.stop.cancelled() => break,
            entry = records.recv() => entry,
        };
        let Some(entry) = entry else {
            if signals.source_failed.is_cancelled() {
                tracing::warn!(accepted, "input failed before the record limit, aborting pipeline");
                // Cancel before `out` drops so the sink sees the abort
                signals.abort.cancel();
            }
            break;
        };
        if !predicate.matches(&entry) {
            continue;
        }

        if out.send(entry).await.is_err() {
            break;
        }
        accepted += 1;
        if max.is_some_and(|max| accepted >= max) {
            tracing::debug!(accepted, "record limit reached, stopping upstream");
            signals.stop.cancel();
            return FilterOutcome {
                accepted,
                limit_reached: true,
            };
        }
    }
    FilterOutcome {
        accepted,
        limit_reached: false,
    }
}

/// Feed the sink; `None` means the run was aborted and `after` was skipped
async fn drain<P: Processor>(
    mut processor: P,
    mut records: mpsc::Receiver<Entry>,
    abort: CancellationToken,
) -> Result<Option<P>, PipelineError> {
    let result = feed(&mut processor, &mut records, &abort).await;
    match result {
        Ok(true) => Ok(Some(processor)),
        Ok(false) => Ok(None),
        Err(e) => {
            tracing::warn!(error = %e, "processor failed, aborting pipeline");
            abort.cancel();
            Err(e.into())
        }
    }
}

async fn feed<P: Processor>(
    processor: &mut P,
    records: &mut mpsc::Receiver<Entry>,
    abort: &CancellationToken,
) -> Result<bool, ProcessorError> {
    processor.before()?;
    loop {
        let entry = tokio::select! {
            biased;
            _ = abort.cancelled() => return Ok(false),
            entry = records.recv() => entry,
        };
        match entry {
            Some(entry) => processor.execute(&entry)?,
            None => break,
        }
    }

    if abort.is_cancelled() {
        return Ok(false);
    }
    processor.after()?;
    Ok(true)
}
