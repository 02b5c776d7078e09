//! Consumer loop: parse, form events, publish.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use evform_algorithms::EventBuilder;
use evform_core::trace::{targets, Trace};
use evform_core::{Hit, ReducedEvent};
use log::Level;

use crate::config::ShutdownMode;
use crate::dump::DumpWriter;
use crate::readout::HitParser;
use crate::rx::RxConsumer;
use crate::stats::{bump, RxStats};
use crate::writer::CsvEventWriter;
use crate::Result;

/// Destination of reduced events.
pub trait EventSink {
    /// Accepts one event.
    ///
    /// # Errors
    /// Returns an error if the event cannot be delivered.
    fn publish(&mut self, event: &ReducedEvent) -> Result<()>;

    /// Delivers anything buffered.
    ///
    /// # Errors
    /// Returns an error if buffered events cannot be delivered.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

impl EventSink for Vec<ReducedEvent> {
    fn publish(&mut self, event: &ReducedEvent) -> Result<()> {
        self.push(*event);
        Ok(())
    }
}

impl EventSink for CsvEventWriter {
    fn publish(&mut self, event: &ReducedEvent) -> Result<()> {
        self.write_event(event)
    }

    fn flush(&mut self) -> Result<()> {
        CsvEventWriter::flush(self)
    }
}

/// Processing side of the rx channel.
///
/// Runs the formation pipeline on every popped datagram. [`run`](Self::run)
/// never flushes the pipeline; call [`finish`](Self::finish) afterwards to
/// close in-flight clusters and events.
pub struct Processor<P, S> {
    consumer: RxConsumer,
    parser: P,
    builder: EventBuilder,
    sink: S,
    stats: Arc<RxStats>,
    dump: Option<DumpWriter>,
    trace: Trace,
    hits: Vec<Hit>,
}

impl<P: HitParser, S: EventSink> Processor<P, S> {
    /// Creates a processor publishing into `sink`.
    #[must_use]
    pub fn new(
        consumer: RxConsumer,
        parser: P,
        builder: EventBuilder,
        sink: S,
        stats: Arc<RxStats>,
    ) -> Self {
        Self {
            consumer,
            parser,
            builder,
            sink,
            stats,
            dump: None,
            trace: Trace::new(targets::PROCESSING),
            hits: Vec::new(),
        }
    }

    /// Also writes every parsed hit to `dump`.
    #[must_use]
    pub fn with_dump(mut self, dump: DumpWriter) -> Self {
        self.dump = Some(dump);
        self
    }

    /// Replaces the logging context.
    #[must_use]
    pub fn with_trace(mut self, trace: Trace) -> Self {
        self.trace = trace;
        self
    }

    #[must_use]
    pub fn builder(&self) -> &EventBuilder {
        &self.builder
    }

    fn publish(&mut self, events: &[ReducedEvent]) -> Result<()> {
        for event in events {
            self.sink.publish(event)?;
        }
        self.stats.record_formation(&self.builder.statistics());
        Ok(())
    }

    /// Appends the parsed hits to the dump, if any.
    ///
    /// A failed write is counted and disables the dump; formation goes on.
    fn write_dump(&mut self) {
        let Some(dump) = &mut self.dump else {
            return;
        };
        if let Err(err) = dump.write_hits(&self.hits) {
            bump(&self.stats.dump_errors, 1);
            if self.trace.enabled(Level::Error) {
                log::error!(target: self.trace.target(), "dump disabled: {err}");
            }
            self.dump = None;
        }
    }

    /// Processes one queued slot. Returns false if the queue was empty.
    ///
    /// # Errors
    /// Returns an error if the sink fails.
    pub fn step(&mut self) -> Result<bool> {
        let Some(datagram) = self.consumer.pop() else {
            return Ok(false);
        };
        self.hits.clear();
        let report = self.parser.parse(datagram.data, &mut self.hits);
        if report.errors > 0 {
            bump(&self.stats.readout_errors, report.errors as u64);
            if self.trace.enabled(Level::Debug) {
                log::debug!(
                    target: self.trace.target(),
                    "slot {}: {} undecodable records",
                    datagram.index,
                    report.errors
                );
            }
        }
        self.write_dump();
        for hit in &self.hits {
            self.builder.insert(*hit);
        }
        let events = self.builder.process();
        self.publish(&events)?;
        Ok(true)
    }

    /// Processes slots until `keep_running` is cleared.
    ///
    /// On an empty queue the idle counter is bumped and the thread yields.
    /// After the stop request, [`ShutdownMode::Drain`] processes whatever is
    /// still queued.
    ///
    /// # Errors
    /// Returns an error if the sink fails.
    pub fn run(&mut self, keep_running: &AtomicBool, mode: ShutdownMode) -> Result<()> {
        while keep_running.load(Ordering::Acquire) {
            if !self.step()? {
                bump(&self.stats.processing_idle, 1);
                thread::yield_now();
            }
        }
        if mode == ShutdownMode::Drain {
            let mut drained = 0u64;
            while self.step()? {
                drained += 1;
            }
            if self.trace.enabled(Level::Debug) {
                log::debug!(target: self.trace.target(), "drained {drained} slots");
            }
        }
        Ok(())
    }

    /// Flushes the pipeline, the sink and the dump, and returns the sink.
    ///
    /// # Errors
    /// Returns an error if the sink fails.
    pub fn finish(mut self) -> Result<S> {
        let events = self.builder.flush();
        self.publish(&events)?;
        self.sink.flush()?;
        match self.dump.take().map(DumpWriter::finish) {
            Some(Ok(paths)) => {
                if self.trace.enabled(Level::Info) {
                    log::info!(
                        target: self.trace.target(),
                        "dump written to {} chunks",
                        paths.len()
                    );
                }
            }
            Some(Err(err)) => {
                bump(&self.stats.dump_errors, 1);
                if self.trace.enabled(Level::Error) {
                    log::error!(target: self.trace.target(), "dump not flushed: {err}");
                }
            }
            None => {}
        }
        if self.trace.enabled(Level::Info) {
            log::info!(
                target: self.trace.target(),
                "processing finished: {:?}",
                self.stats.snapshot()
            );
        }
        Ok(self.sink)
    }
}
