//! Scripted in-memory transport for driver tests.
//!
//! A script is a queue of steps: `Data` bytes the device "sends", and
//! `Gap` markers standing in for a read timeout with nothing received.
//! Bounded reads stop at a gap; the drain-style read consumes at most one
//! leading gap and returns the next contiguous data run. The handle is cloneable so
//! a test can keep scripting and inspecting after the session has taken
//! ownership.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::errors::Result;
use crate::transport::{Transport, DEFAULT_TIMEOUT};

enum Step {
    Data(Vec<u8>),
    Gap,
}

struct Inner {
    steps: VecDeque<Step>,
    written: Vec<u8>,
    timeout: Duration,
    timeouts_set: Vec<Duration>,
}

#[derive(Clone)]
pub(crate) struct MockTransport {
    inner: Arc<Mutex<Inner>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                steps: VecDeque::new(),
                written: Vec::new(),
                timeout: DEFAULT_TIMEOUT,
                timeouts_set: Vec::new(),
            })),
        }
    }

    /// Queue bytes for the device to "send".
    pub fn push_data(&self, data: &[u8]) {
        self.lock().steps.push_back(Step::Data(data.to_vec()));
    }

    /// Queue a read timeout.
    pub fn push_gap(&self) {
        self.lock().steps.push_back(Step::Gap);
    }

    /// Everything written to the device so far.
    pub fn written(&self) -> Vec<u8> {
        self.lock().written.clone()
    }

    /// Timeouts applied via `set_timeout`, in order.
    pub fn timeouts_set(&self) -> Vec<Duration> {
        self.lock().timeouts_set.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    /// Pull up to `n` bytes, stopping early at `stop_at`, a gap, or the
    /// end of the script.
    fn take(&self, n: usize, stop_at: Option<u8>) -> Vec<u8> {
        let mut inner = self.lock();
        let mut out = Vec::new();
        while out.len() < n {
            let Some(step) = inner.steps.pop_front() else {
                break;
            };
            let mut data = match step {
                Step::Gap => break,
                Step::Data(data) => data,
            };
            let mut idx = 0;
            let mut hit = false;
            while idx < data.len() && out.len() < n {
                let b = data[idx];
                out.push(b);
                idx += 1;
                if stop_at == Some(b) {
                    hit = true;
                    break;
                }
            }
            if idx < data.len() {
                inner.steps.push_front(Step::Data(data.split_off(idx)));
            }
            if hit {
                break;
            }
        }
        out
    }
}

impl Transport for MockTransport {
    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.lock().written.extend_from_slice(data);
        Ok(())
    }

    fn read_up_to(&mut self, n: usize) -> Result<Vec<u8>> {
        Ok(self.take(n, None))
    }

    fn read_until(&mut self, delim: u8, max: usize) -> Result<Vec<u8>> {
        Ok(self.take(max, Some(delim)))
    }

    fn read_available(&mut self) -> Result<Vec<u8>> {
        let mut inner = self.lock();
        // One drain call consumes at most one gap: a leading gap models an
        // empty receive buffer left over from the previous exchange.
        if matches!(inner.steps.front(), Some(Step::Gap)) {
            inner.steps.pop_front();
        }
        let mut out = Vec::new();
        while matches!(inner.steps.front(), Some(Step::Data(_))) {
            let Some(Step::Data(mut data)) = inner.steps.pop_front() else {
                break;
            };
            out.append(&mut data);
        }
        Ok(out)
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        let mut inner = self.lock();
        inner.timeout = timeout;
        inner.timeouts_set.push(timeout);
        Ok(())
    }

    fn timeout(&self) -> Duration {
        self.lock().timeout
    }
}
