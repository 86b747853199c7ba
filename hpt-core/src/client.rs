// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Consumer-side client.
//!
//! `Hpt` opens a handle, creates the endpoint, maps it and builds ring views
//! over the mapped span. Writes go into the inbound ring; reads drain the
//! outbound ring. `split` hands the two directions to separate threads or
//! tasks.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::unix::AsyncFd;

use crate::device::{Device, DeviceHandle};
use crate::doorbell::Doorbell;
use crate::endpoint::EndpointInfo;
use crate::error::{HptError, HptResult, RingError};
use crate::shm::{MappedSpan, Ring, RingLayout};
use crate::stats::StatsSnapshot;
use crate::types::{Direction, EndpointName};

/// State shared by both halves of a client.
struct Session {
    info: EndpointInfo,
    doorbell: Arc<Doorbell>,
    // Drop order: the handle destroys the endpoint, then the span unmaps.
    handle: DeviceHandle,
    _span: MappedSpan,
}

/// Full-duplex consumer connection to one endpoint.
pub struct Hpt {
    reader: HptReader,
    writer: HptWriter,
}

impl Hpt {
    /// Create an endpoint named `name` on `device` and map it.
    pub fn alloc(device: &Device, name: &str, capacity: usize) -> HptResult<Self> {
        let mut handle = device.open();
        let info = handle.create(name, capacity)?;

        let layout = RingLayout::new(info.capacity);
        let mapping = handle.map(layout.region_size())?;
        let (span, _, doorbell) = mapping.into_parts();

        // SAFETY: both rings are stored next to an Arc<Session> that owns
        // the span, so the span outlives them.
        let (rx, tx) = unsafe {
            (
                Ring::from_span(&span, &layout, Direction::Outbound)?,
                Ring::from_span(&span, &layout, Direction::Inbound)?,
            )
        };

        for (ring, direction) in [(&rx, Direction::Outbound), (&tx, Direction::Inbound)] {
            let found = ring.header_info().capacity;
            if found != layout.capacity() as u64 {
                return Err(HptError::HeaderMismatch {
                    direction,
                    expected: layout.capacity() as u64,
                    found,
                });
            }
        }

        tracing::debug!(endpoint = %info.name, size = span.len(), "Client attached");

        let session = Arc::new(Session {
            info,
            doorbell,
            handle,
            _span: span,
        });

        Ok(Self {
            reader: HptReader {
                ring: rx,
                session: session.clone(),
                async_fd: None,
            },
            writer: HptWriter { ring: tx, session },
        })
    }

    pub fn name(&self) -> &EndpointName {
        self.writer.name()
    }

    pub fn info(&self) -> &EndpointInfo {
        &self.writer.session.info
    }

    /// Queue one packet for the network stack.
    pub fn write(&mut self, packet: &[u8]) -> Result<(), RingError> {
        self.writer.write(packet)
    }

    /// Drain what the stack has sent; see `HptReader::drain`.
    pub fn drain<F: FnMut(&[u8])>(&mut self, on_packet: F) -> usize {
        self.reader.drain(on_packet)
    }

    /// Block until a packet is waiting or `timeout` passes.
    pub fn poll_readable(&self, timeout: Option<Duration>) -> HptResult<bool> {
        self.reader.poll_readable(timeout)
    }

    /// Wait asynchronously until a packet is waiting.
    pub async fn readable(&mut self) -> HptResult<()> {
        self.reader.readable().await
    }

    pub fn stats(&self) -> HptResult<StatsSnapshot> {
        self.writer.stats()
    }

    /// Split into independently owned read and write halves.
    pub fn split(self) -> (HptReader, HptWriter) {
        (self.reader, self.writer)
    }
}

/// Consumer of the outbound ring.
pub struct HptReader {
    ring: Ring,
    session: Arc<Session>,
    async_fd: Option<AsyncFd<Arc<Doorbell>>>,
}

impl HptReader {
    pub fn name(&self) -> &EndpointName {
        &self.session.info.name
    }

    /// Packets currently waiting.
    pub fn pending(&self) -> usize {
        self.ring.occupancy()
    }

    /// Hand every packet present at entry to `on_packet`, in order.
    ///
    /// Corrupt slots are skipped without a callback. Returns the number of
    /// packets delivered to the callback.
    pub fn drain<F: FnMut(&[u8])>(&mut self, mut on_packet: F) -> usize {
        let pending = self.ring.occupancy();
        let mut delivered = 0;

        for _ in 0..pending {
            match self.ring.peek() {
                Ok(payload) => {
                    on_packet(payload);
                    delivered += 1;
                }
                Err(RingError::Empty) => break,
                Err(e) => {
                    tracing::trace!(endpoint = %self.session.info.name, error = %e, "Skipping slot");
                }
            }
            if self.ring.pop().is_err() {
                break;
            }
        }

        delivered
    }

    /// Level-triggered wait: returns as soon as the ring is non-empty.
    pub fn poll_readable(&self, timeout: Option<Duration>) -> HptResult<bool> {
        let doorbell = &self.session.doorbell;
        doorbell.drain();
        if self.ring.occupancy() > 0 {
            return Ok(true);
        }

        doorbell.wait(timeout).map_err(|e| HptError::Io {
            context: "waiting on doorbell",
            source: e,
        })?;

        Ok(self.ring.occupancy() > 0)
    }

    /// Async form of `poll_readable` without a timeout. Must be called from
    /// within a tokio runtime.
    pub async fn readable(&mut self) -> HptResult<()> {
        let fd = match self.async_fd.take() {
            Some(fd) => fd,
            None => AsyncFd::new(self.session.doorbell.clone()).map_err(|e| HptError::Io {
                context: "registering doorbell",
                source: e,
            })?,
        };
        let fd = &*self.async_fd.insert(fd);

        loop {
            self.session.doorbell.drain();
            if self.ring.occupancy() > 0 {
                return Ok(());
            }

            let mut guard = fd.readable().await.map_err(|e| HptError::Io {
                context: "waiting on doorbell",
                source: e,
            })?;
            guard.clear_ready();
        }
    }
}

/// Producer of the inbound ring.
pub struct HptWriter {
    ring: Ring,
    session: Arc<Session>,
}

impl HptWriter {
    pub fn name(&self) -> &EndpointName {
        &self.session.info.name
    }

    /// Queue one packet. `Full` and `OversizedPayload` are returned to the
    /// caller; nothing is retried.
    pub fn write(&mut self, packet: &[u8]) -> Result<(), RingError> {
        self.ring.push(packet)
    }

    /// Free slots in the inbound ring.
    pub fn free_space(&self) -> usize {
        self.ring.free_space()
    }

    pub fn stats(&self) -> HptResult<StatsSnapshot> {
        self.session
            .handle
            .device()
            .endpoint_stats(&self.session.info.name)
    }
}
