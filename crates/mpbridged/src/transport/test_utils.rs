//! Test helpers for the transport module.

use std::collections::VecDeque;
use std::io::{self, Read};
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};
use std::time::Duration;

use super::{ConnectionHandler, ConnectionStream, ReadTimeout};

pub(crate) struct CountingHandler {
    count: Arc<AtomicUsize>,
}

impl CountingHandler {
    pub(crate) fn new() -> (Arc<AtomicUsize>, Arc<Self>) {
        let count = Arc::new(AtomicUsize::new(0));
        let handler = Arc::new(Self {
            count: Arc::clone(&count),
        });
        (count, handler)
    }
}

impl ConnectionHandler for CountingHandler {
    fn handle(&self, _stream: ConnectionStream) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}

/// In-memory stream replaying a fixed script of reads.
///
/// Once the script is exhausted every read reports end-of-stream.
pub(crate) struct ScriptedStream {
    script: VecDeque<Result<Vec<u8>, io::ErrorKind>>,
    timeout: Option<Duration>,
}

impl ScriptedStream {
    pub(crate) fn new(script: Vec<Result<Vec<u8>, io::ErrorKind>>) -> Self {
        Self {
            script: script.into(),
            timeout: None,
        }
    }

    pub(crate) fn from_chunks(chunks: Vec<Vec<u8>>) -> Self {
        Self::new(chunks.into_iter().map(Ok).collect())
    }

    pub(crate) fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub(crate) fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl Read for ScriptedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.script.pop_front() {
            None => Ok(0),
            Some(Err(kind)) => Err(io::Error::from(kind)),
            Some(Ok(mut chunk)) => {
                let len = chunk.len().min(buf.len());
                buf[..len].copy_from_slice(&chunk[..len]);
                if len < chunk.len() {
                    self.script.push_front(Ok(chunk.split_off(len)));
                }
                Ok(len)
            }
        }
    }
}

impl ReadTimeout for ScriptedStream {
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.timeout = timeout;
        Ok(())
    }
}
