//! # In-Memory Pipes
//!
//! ## Purpose
//!
//! A pipe is the one-way conduit every unix socket sends through. Connected
//! sockets hold one pipe per direction; a datagram socket owns a bound pipe that
//! peers write into.
//!
//! ## How it works
//!
//! The buffer lives behind a `parking_lot::Mutex` shared by a `PipeReader` and any
//! number of `PipeWriter` clones. Stream pipes move bytes and may write partially;
//! packet pipes keep record boundaries and accept a record only if it fits whole.
//! Each end has its own `Pollee`, recomputed under the pipe lock after every
//! change so listeners always see transitions in order:
//!
//! - reader: `IN` while data is queued, `HUP` once no writer is left
//! - writer: `OUT` while a reader exists and there is room, `ERR` once the reader is gone
//!
//! Listeners run with the pipe lock held and must not call back into the pipe.

use crate::error::{Result, SockError};
use crate::pollee::{Events, Pollee};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

struct PipeState {
    bytes: VecDeque<u8>,
    records: VecDeque<Vec<u8>>,
    used: usize,
    readers: usize,
    writers: usize,
}

struct Pipe {
    state: Mutex<PipeState>,
    capacity: usize,
    packet: bool,
    read_ev: Pollee,
    write_ev: Pollee,
}

pub struct PipeReader {
    pipe: Arc<Pipe>,
}

pub struct PipeWriter {
    pipe: Arc<Pipe>,
}

/// Creates a pipe holding up to `capacity` bytes. With `packet` set, writes are
/// kept as separate records.
pub fn pipe(capacity: usize, packet: bool) -> (PipeReader, PipeWriter) {
    let pipe = Arc::new(Pipe {
        state: Mutex::new(PipeState {
            bytes: VecDeque::new(),
            records: VecDeque::new(),
            used: 0,
            readers: 1,
            writers: 1,
        }),
        capacity,
        packet,
        read_ev: Pollee::new(Events::empty()),
        write_ev: Pollee::new(Events::OUT),
    });
    (PipeReader { pipe: pipe.clone() }, PipeWriter { pipe })
}

impl Pipe {
    fn refresh(&self, state: &PipeState) {
        let mut rd = Events::empty();
        if state.used > 0 || !state.records.is_empty() {
            rd |= Events::IN;
        }
        if state.writers == 0 {
            rd |= Events::HUP;
        }
        self.read_ev.update(Events::IN | Events::HUP, rd);

        let mut wr = Events::empty();
        if state.readers == 0 {
            wr |= Events::ERR;
        } else if state.used < self.capacity {
            wr |= Events::OUT;
        }
        self.write_ev.update(Events::OUT | Events::ERR, wr);
    }
}

impl PipeReader {
    /// Reads into `buf`. Returns 0 at end of stream, `WouldBlock` while writers
    /// remain but nothing is queued. A record longer than `buf` is truncated.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let mut state = self.pipe.state.lock();
        let n = if self.pipe.packet {
            match state.records.pop_front() {
                Some(record) => {
                    state.used -= record.len();
                    let n = record.len().min(buf.len());
                    buf[..n].copy_from_slice(&record[..n]);
                    n
                }
                None if state.writers == 0 => return Ok(0),
                None => return Err(SockError::WouldBlock),
            }
        } else {
            if state.bytes.is_empty() {
                return if state.writers == 0 {
                    Ok(0)
                } else {
                    Err(SockError::WouldBlock)
                };
            }
            let n = state.bytes.len().min(buf.len());
            for (dst, src) in buf.iter_mut().zip(state.bytes.drain(..n)) {
                *dst = src;
            }
            state.used -= n;
            n
        };
        self.pipe.refresh(&state);
        Ok(n)
    }

    /// Bytes queued, records included.
    pub fn available(&self) -> usize {
        self.pipe.state.lock().used
    }

    pub fn pollee(&self) -> &Pollee {
        &self.pipe.read_ev
    }

    pub fn is_packet(&self) -> bool {
        self.pipe.packet
    }

    /// Whether `writer` feeds this reader.
    pub fn is_fed_by(&self, writer: &PipeWriter) -> bool {
        Arc::ptr_eq(&self.pipe, &writer.pipe)
    }
}

impl Drop for PipeReader {
    fn drop(&mut self) {
        let mut state = self.pipe.state.lock();
        state.readers -= 1;
        // nobody will read what is left
        state.bytes.clear();
        state.records.clear();
        state.used = 0;
        self.pipe.refresh(&state);
    }
}

impl PipeWriter {
    /// Writes from `buf`. A stream pipe takes as much as fits; a packet pipe takes
    /// the whole record or nothing. An empty record is queued like any other.
    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        let mut state = self.pipe.state.lock();
        if state.readers == 0 {
            return Err(SockError::BrokenPipe);
        }
        if buf.is_empty() && !self.pipe.packet {
            return Ok(0);
        }
        let free = self.pipe.capacity - state.used;
        let n = if self.pipe.packet {
            if buf.len() > self.pipe.capacity {
                return Err(SockError::MessageTooLarge);
            }
            if buf.len() > free {
                return Err(SockError::WouldBlock);
            }
            state.records.push_back(buf.to_vec());
            buf.len()
        } else {
            if free == 0 {
                return Err(SockError::WouldBlock);
            }
            let n = free.min(buf.len());
            state.bytes.extend(&buf[..n]);
            n
        };
        state.used += n;
        self.pipe.refresh(&state);
        Ok(n)
    }

    pub fn pollee(&self) -> &Pollee {
        &self.pipe.write_ev
    }

    pub fn has_reader(&self) -> bool {
        self.pipe.state.lock().readers > 0
    }
}

impl Clone for PipeWriter {
    fn clone(&self) -> Self {
        self.pipe.state.lock().writers += 1;
        PipeWriter {
            pipe: self.pipe.clone(),
        }
    }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        let mut state = self.pipe.state.lock();
        state.writers -= 1;
        self.pipe.refresh(&state);
    }
}
