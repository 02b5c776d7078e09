//! evform-io: Receive path and file I/O for evform.
//!
//! This crate moves raw datagrams from a UDP socket to the formation
//! pipeline through a lock-free slot buffer, decodes the reference hit
//! record, and reads and writes dump and CSV files.
//!

mod config;
pub mod consumer;
pub mod dump;
mod error;
pub mod generator;
pub mod handoff;
pub mod readout;
mod receiver;
mod ring;
pub mod rx;
mod slot_buffer;
mod stats;
mod writer;

pub use config::{RxConfig, ShutdownMode};
pub use consumer::{EventSink, Processor};
pub use dump::{chunk_paths, read_dump, DumpReader, DumpWriter};
pub use error::{Error, Result, SlotError};
pub use generator::{generate_hits, GeneratorConfig};
pub use handoff::{HandoffQueue, QueueConsumer, QueueProducer};
pub use readout::{FixedHitParser, HitParser, ParseReport};
pub use receiver::Receiver;
pub use ring::{RingSize, SlotIndex};
pub use rx::{rx_channel, Datagram, Received, RxConsumer, RxProducer};
pub use slot_buffer::{SlotBuffer, GUARD, GUARD_LEN};
pub use stats::{RxStats, RxStatsSnapshot};
pub use writer::{CsvEventWriter, CSV_HEADER};
