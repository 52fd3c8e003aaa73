//! Per-stream debounce: only the last value scheduled within the window fires.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

struct PendingFire {
    generation: u64,
    token: CancellationToken,
}

struct Streams<K> {
    latest_generation: u64,
    pending: HashMap<K, PendingFire>,
}

/// Debounce scheduler keyed by stream id.
///
/// Each `schedule` supersedes the stream's previous timer: its token is cancelled
/// and its generation is no longer current, so a timer that already woke up but
/// has not yet claimed the slot still will not fire. Dropping the scheduler
/// cancels everything.
pub struct Debouncer<K> {
    streams: Arc<Mutex<Streams<K>>>,
}

impl<K> Default for Debouncer<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> Debouncer<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            streams: Arc::new(Mutex::new(Streams {
                latest_generation: 0,
                pending: HashMap::new(),
            })),
        }
    }

    /// Arm (or re-arm) the timer for `stream`. Must be called inside a tokio runtime.
    ///
    /// Returns the generation assigned to this schedule.
    pub fn schedule<V, F>(&self, stream: K, value: V, delay: Duration, on_fire: F) -> u64
    where
        V: Send + 'static,
        F: FnOnce(V) + Send + 'static,
    {
        let token = CancellationToken::new();
        let generation = {
            let mut streams = self.streams.lock();
            streams.latest_generation = streams.latest_generation.wrapping_add(1);
            let generation = streams.latest_generation;
            let fire = PendingFire {
                generation,
                token: token.clone(),
            };
            if let Some(previous) = streams.pending.insert(stream.clone(), fire) {
                previous.token.cancel();
            }
            generation
        };

        let streams = Arc::clone(&self.streams);
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            let still_current = {
                let mut streams = streams.lock();
                match streams.pending.get(&stream) {
                    Some(p) if p.generation == generation && !p.token.is_cancelled() => {
                        streams.pending.remove(&stream);
                        true
                    }
                    _ => false,
                }
            };
            if still_current {
                on_fire(value);
            }
        });
        generation
    }

    /// Cancel the stream's pending timer, if any. Returns whether one was pending.
    pub fn cancel(&self, stream: &K) -> bool {
        match self.streams.lock().pending.remove(stream) {
            Some(p) => {
                p.token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) {
        let mut streams = self.streams.lock();
        for (_, p) in streams.pending.drain() {
            p.token.cancel();
        }
    }

    pub fn is_pending(&self, stream: &K) -> bool {
        self.streams.lock().pending.contains_key(stream)
    }
}

impl<K> Drop for Debouncer<K> {
    fn drop(&mut self) {
        let mut streams = self.streams.lock();
        for (_, p) in streams.pending.drain() {
            p.token.cancel();
        }
    }
}
