//! # Delegated indexing over a local TCP stream
//!
//! In delegated mode the converter does not touch the sidecar. Its
//! [`RemoteIndexSink`] pushes every batch to a long-running [`IndexServer`],
//! which feeds the entries to its own batched [`Indexer`] backed by a
//! [`RedbIndexStore`].
//!
//! Wire format
//! -----------------
//! A stream of frames, each a `u32` little-endian payload length followed by
//! a `bincode`-encoded [`IndexFrame`]. A connection ends with
//! [`IndexFrame::Close`] or at end of stream.
//!
//! Delivery is push-only with no acknowledgement. A batch delivered twice is
//! harmless: the store never appends an offset already recorded under a key.
//!
//! Per-client commit
//! -----------------
//! The server holds the entries of a connection until the client sends
//! `Close { complete: true }`. Only then are they fed to the indexer, and the
//! sidecar is republished with every committed client included. A client
//! that aborts, disconnects without `Close`, or sends a broken frame leaves
//! no trace in the index, whichever clients come before or after it.
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use super::redb_store::RedbIndexStore;
use super::{IndexColumn, IndexEntry, IndexReport, IndexSettings, IndexSink, Indexer};
use crate::constants::{sidecar_path, SERVER_PROGRESS_EVERY};
use crate::observability::{log_debug, log_info, log_warn};
use crate::ssfiletable_errors::SsTableError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IndexFrame {
    Batch(Vec<IndexEntry>),
    /// Sent by the client when it is done. `complete` is false when the
    /// conversion failed and the index must not be published.
    Close { complete: bool },
}

pub fn write_frame<W: Write>(writer: &mut W, frame: &IndexFrame) -> Result<(), SsTableError> {
    let payload = bincode::serialize(frame)?;
    let len = u32::try_from(payload.len())
        .map_err(|_| SsTableError::IndexTransport("frame larger than 4 GiB".into()))?;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    Ok(())
}

/// Read the next frame; `None` at a clean end of stream.
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Option<IndexFrame>, SsTableError> {
    let mut len = [0u8; 4];
    match reader.read_exact(&mut len) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let mut payload = vec![0u8; u32::from_le_bytes(len) as usize];
    reader
        .read_exact(&mut payload)
        .map_err(|e| SsTableError::IndexTransport(format!("truncated frame: {e}")))?;
    Ok(Some(bincode::deserialize(&payload)?))
}

/// Client side of the delegated index.
pub struct RemoteIndexSink {
    endpoint: String,
    stream: BufWriter<TcpStream>,
}

impl RemoteIndexSink {
    pub fn connect(endpoint: &str) -> Result<Self, SsTableError> {
        let stream = TcpStream::connect(endpoint)
            .map_err(|e| SsTableError::IndexTransport(format!("cannot reach {endpoint}: {e}")))?;
        log_debug!(component = "indexer", event = "connected", endpoint);
        Ok(RemoteIndexSink {
            endpoint: endpoint.to_string(),
            stream: BufWriter::new(stream),
        })
    }
}

impl IndexSink for RemoteIndexSink {
    fn write_batch(&mut self, batch: &[IndexEntry]) -> Result<(), SsTableError> {
        write_frame(&mut self.stream, &IndexFrame::Batch(batch.to_vec()))?;
        self.stream.flush()?;
        Ok(())
    }

    fn close(self: Box<Self>, complete: bool) -> Result<(), SsTableError> {
        let RemoteIndexSink {
            endpoint,
            mut stream,
        } = *self;
        write_frame(&mut stream, &IndexFrame::Close { complete })?;
        stream.flush()?;
        let stream = stream
            .into_inner()
            .map_err(|e| SsTableError::IndexTransport(e.to_string()))?;
        stream.shutdown(Shutdown::Write)?;
        log_debug!(
            component = "indexer",
            event = "disconnected",
            endpoint = %endpoint,
            complete,
        );
        Ok(())
    }
}

/// What became of one client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientOutcome {
    /// The client closed cleanly; its entries are in the published sidecar.
    Committed { entries: u64 },
    /// The client aborted or went away; its entries were dropped.
    Aborted { entries: u64 },
}

/// The process persisting index entries on behalf of converters.
pub struct IndexServer {
    listener: TcpListener,
    indexer: Indexer,
    sidecar: Utf8PathBuf,
    received: u64,
    committed: usize,
    aborted: usize,
}

impl IndexServer {
    /// Listen on `endpoint` and prepare the sidecar of `output`.
    ///
    /// Arguments
    /// -----------------
    /// * `endpoint`: local address, e.g. [`DEFAULT_INDEX_ENDPOINT`](crate::constants::DEFAULT_INDEX_ENDPOINT).
    ///   Port `0` picks a free port, see [`Self::local_addr`].
    /// * `output`: output file whose `<output>.sidecar` is built.
    /// * `index_columns`: cardinality of each column the clients will send.
    pub fn bind(
        endpoint: &str,
        output: &Utf8Path,
        index_columns: &[IndexColumn],
        settings: IndexSettings,
    ) -> Result<Self, SsTableError> {
        let sidecar = sidecar_path(output);
        let store = RedbIndexStore::create(&sidecar, index_columns)?;
        let indexer = Indexer::for_entries(Box::new(store), settings)?;
        let listener = TcpListener::bind(endpoint)?;
        log_info!(component = "server", event = "listening", endpoint, sidecar = %sidecar);
        Ok(IndexServer {
            listener,
            indexer,
            sidecar,
            received: 0,
            committed: 0,
            aborted: 0,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, SsTableError> {
        Ok(self.listener.local_addr()?)
    }

    /// Entries received over all connections, committed or not.
    pub fn received(&self) -> u64 {
        self.received
    }

    pub fn committed_clients(&self) -> usize {
        self.committed
    }

    pub fn aborted_clients(&self) -> usize {
        self.aborted
    }

    /// Accept one client, consume its frames until it closes and commit or
    /// drop its entries.
    ///
    /// A misbehaving client only costs its own entries. The error cases are
    /// a failing listener and a failing index store.
    pub fn serve_one(&mut self) -> Result<ClientOutcome, SsTableError> {
        let (stream, peer) = self.listener.accept()?;
        log_debug!(component = "server", event = "client_connected", peer = %peer);
        let mut reader = BufReader::new(stream);

        let mut held: Vec<IndexEntry> = Vec::new();
        let complete = loop {
            match read_frame(&mut reader) {
                Ok(Some(IndexFrame::Batch(entries))) => {
                    for entry in entries {
                        held.push(entry);
                        self.received += 1;
                        if self.received % SERVER_PROGRESS_EVERY == 0 {
                            log_info!(
                                component = "server",
                                event = "progress",
                                received = self.received,
                            );
                        }
                    }
                }
                Ok(Some(IndexFrame::Close { complete })) => break complete,
                Ok(None) => break false,
                Err(e) => {
                    log_warn!(component = "server", event = "client_broken", peer = %peer, error = %e);
                    break false;
                }
            }
        };

        let entries = held.len() as u64;
        if !complete {
            self.aborted += 1;
            log_warn!(component = "server", event = "client_aborted", peer = %peer, dropped = entries);
            return Ok(ClientOutcome::Aborted { entries });
        }

        for entry in held {
            self.indexer.insert_entry(entry)?;
        }
        let published = self.indexer.checkpoint()?;
        self.committed += 1;
        log_info!(
            component = "server",
            event = "client_committed",
            peer = %peer,
            entries,
            published,
        );
        Ok(ClientOutcome::Committed { entries })
    }

    /// Serve clients one after the other until the listener or the store
    /// fails. Every committed client is published as it closes.
    pub fn serve(&mut self) -> Result<(), SsTableError> {
        loop {
            self.serve_one()?;
        }
    }

    /// Flush and publish the sidecar if at least one client committed;
    /// otherwise drop the staged index.
    pub fn finish(self) -> Result<IndexReport, SsTableError> {
        let report = if self.committed > 0 {
            self.indexer.finish()?
        } else {
            self.indexer.discard()
        };
        log_info!(
            component = "server",
            event = "finished",
            sidecar = %self.sidecar,
            received = self.received,
            committed = self.committed,
            aborted = self.aborted,
            published = self.committed > 0 && !report.abandoned,
        );
        Ok(report)
    }
}
