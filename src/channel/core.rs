use std::collections::VecDeque;
use std::fmt;
use std::sync::{Condvar, Mutex};

/// Error returned by [`Channel::send`] when the channel is closed.
///
/// Carries the value that could not be delivered so the caller can recover it.
pub struct SendError<T>(pub T);

impl<T> fmt::Debug for SendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SendError(..)")
    }
}

impl<T> fmt::Display for SendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("sending on a closed channel")
    }
}

impl<T> std::error::Error for SendError<T> {}

/// Error returned by [`Channel::try_send`].
pub enum TrySendError<T> {
    /// The buffer is full (bounded mode) or no receiver is waiting
    /// (rendezvous mode). The value is handed back.
    Full(T),
    /// The channel is closed. The value is handed back.
    Closed(T),
}

impl<T> fmt::Debug for TrySendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrySendError::Full(_) => f.write_str("Full(..)"),
            TrySendError::Closed(_) => f.write_str("Closed(..)"),
        }
    }
}

impl<T> fmt::Display for TrySendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrySendError::Full(_) => f.write_str("sending on a full channel"),
            TrySendError::Closed(_) => f.write_str("sending on a closed channel"),
        }
    }
}

impl<T> std::error::Error for TrySendError<T> {}

/// Error returned by [`Channel::try_recv`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryRecvError {
    /// The channel is empty but still open.
    Empty,
    /// The channel is closed and fully drained.
    Closed,
}

impl fmt::Display for TryRecvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TryRecvError::Empty => f.write_str("receiving on an empty channel"),
            TryRecvError::Closed => f.write_str("receiving on a closed channel"),
        }
    }
}

impl std::error::Error for TryRecvError {}

struct State<T> {
    queue: VecDeque<T>,
    closed: bool,
    /// Receivers currently blocked in `recv` (rendezvous mode only).
    recv_waiting: usize,
}

/// A thread-safe FIFO channel with optional capacity.
///
/// With `capacity > 0` the channel buffers values and `send` blocks only while
/// the buffer is full. With `capacity == 0` every `send` rendezvouses with a
/// `recv`: the sender is released only once a receiver has taken its value.
///
/// Share between threads via `Arc<Channel<T>>`; all operations take `&self`.
pub struct Channel<T> {
    capacity: usize,
    state: Mutex<State<T>>,
    /// Senders wait here for buffer space, or for a waiting receiver.
    send_cv: Condvar,
    /// Receivers wait here for a value, or for the close.
    recv_cv: Condvar,
    /// Rendezvous senders wait here until their value has been taken.
    ack_cv: Condvar,
}

impl<T> Channel<T> {
    /// Create a channel buffering up to `capacity` values.
    ///
    /// A capacity of zero produces a rendezvous channel, identical to
    /// [`Channel::rendezvous`].
    pub fn bounded(capacity: usize) -> Self {
        Channel {
            capacity,
            state: Mutex::new(State {
                queue: VecDeque::new(),
                closed: false,
                recv_waiting: 0,
            }),
            send_cv: Condvar::new(),
            recv_cv: Condvar::new(),
            ack_cv: Condvar::new(),
        }
    }

    /// Create a zero-capacity channel where every send hands off directly to
    /// a receiver.
    pub fn rendezvous() -> Self {
        Self::bounded(0)
    }

    /// Send a value, blocking while the channel cannot accept it.
    ///
    /// In bounded mode this blocks while the buffer is full. In rendezvous
    /// mode it blocks until a receiver is waiting and has taken the value.
    ///
    /// # Errors
    ///
    /// Returns [`SendError`] holding the value if the channel is closed
    /// before delivery completes.
    pub fn send(&self, value: T) -> Result<(), SendError<T>> {
        let mut state = self.state.lock().unwrap();
        loop {
            if state.closed {
                return Err(SendError(value));
            }
            let can_send = if self.capacity > 0 {
                state.queue.len() < self.capacity
            } else {
                state.recv_waiting > 0
            };
            if can_send {
                break;
            }
            state = self.send_cv.wait(state).unwrap();
        }

        state.queue.push_back(value);
        self.recv_cv.notify_one();

        if self.capacity == 0 {
            // Hold until a receiver has taken the value or the channel closes
            // underneath us.
            while !state.queue.is_empty() && !state.closed {
                state = self.ack_cv.wait(state).unwrap();
            }
            if state.closed {
                // Closed with values still queued: each failing sender
                // reclaims one undelivered value.
                if let Some(orphan) = state.queue.pop_front() {
                    return Err(SendError(orphan));
                }
            }
        }
        Ok(())
    }

    /// Receive a value, blocking while the channel is empty and open.
    ///
    /// Returns `None` once the channel is closed and drained.
    pub fn recv(&self) -> Option<T> {
        let mut state = self.state.lock().unwrap();
        if self.capacity == 0 {
            state.recv_waiting += 1;
            self.send_cv.notify_one();
        }

        while state.queue.is_empty() && !state.closed {
            state = self.recv_cv.wait(state).unwrap();
        }

        let taken = state.queue.pop_front();
        if self.capacity == 0 {
            state.recv_waiting -= 1;
            if taken.is_some() {
                self.ack_cv.notify_one();
            }
        }
        if taken.is_some() {
            self.send_cv.notify_one();
        }
        taken
    }

    /// Send without blocking on buffer space or a missing receiver.
    ///
    /// In rendezvous mode a waiting receiver must already be present; the
    /// call still synchronizes with that receiver taking the value.
    ///
    /// # Errors
    ///
    /// [`TrySendError::Full`] if the channel cannot accept the value right
    /// now, [`TrySendError::Closed`] if it is closed. Both return the value.
    pub fn try_send(&self, value: T) -> Result<(), TrySendError<T>> {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return Err(TrySendError::Closed(value));
        }

        if self.capacity == 0 {
            if state.recv_waiting == 0 {
                return Err(TrySendError::Full(value));
            }
            state.queue.push_back(value);
            self.recv_cv.notify_one();
            while !state.queue.is_empty() && !state.closed {
                state = self.ack_cv.wait(state).unwrap();
            }
            if state.closed {
                if let Some(orphan) = state.queue.pop_front() {
                    return Err(TrySendError::Closed(orphan));
                }
            }
            return Ok(());
        }

        if state.queue.len() < self.capacity {
            state.queue.push_back(value);
            self.recv_cv.notify_one();
            Ok(())
        } else {
            Err(TrySendError::Full(value))
        }
    }

    /// Receive without blocking.
    ///
    /// # Errors
    ///
    /// [`TryRecvError::Empty`] while the channel is open with nothing
    /// buffered, [`TryRecvError::Closed`] once it is closed and drained.
    pub fn try_recv(&self) -> Result<T, TryRecvError> {
        let mut state = self.state.lock().unwrap();
        match state.queue.pop_front() {
            Some(value) => {
                if self.capacity == 0 {
                    self.ack_cv.notify_one();
                }
                self.send_cv.notify_one();
                Ok(value)
            }
            None if state.closed => Err(TryRecvError::Closed),
            None => Err(TryRecvError::Empty),
        }
    }

    /// Close the channel. Idempotent.
    ///
    /// Wakes every blocked sender and receiver. Subsequent sends fail;
    /// receivers drain the remaining buffer and then observe the close.
    pub fn close(&self) {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return;
        }
        state.closed = true;
        drop(state);
        self.send_cv.notify_all();
        self.recv_cv.notify_all();
        self.ack_cv.notify_all();
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    /// Number of values currently buffered.
    pub fn len(&self) -> usize {
        self.state.lock().unwrap().queue.len()
    }

    /// Whether the buffer is currently empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The configured capacity. Zero means rendezvous.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_bounded_fifo_order() {
        let ch = Channel::bounded(8);
        for i in 0..5 {
            ch.send(i).unwrap();
        }
        for i in 0..5 {
            assert_eq!(ch.recv(), Some(i));
        }
    }

    #[test]
    fn test_bounded_queue_never_exceeds_capacity() {
        let ch = Arc::new(Channel::bounded(2));
        let tx = ch.clone();
        let producer = thread::spawn(move || {
            for i in 0..20 {
                tx.send(i).unwrap();
            }
        });
        let mut received = 0;
        while received < 20 {
            assert!(ch.len() <= 2);
            if ch.try_recv().is_ok() {
                received += 1;
            } else {
                thread::yield_now();
            }
        }
        producer.join().unwrap();
    }

    #[test]
    fn test_send_after_close_fails() {
        let ch = Channel::bounded(1);
        ch.close();
        let err = ch.send(7).unwrap_err();
        assert_eq!(err.0, 7);
    }

    #[test]
    fn test_close_drains_then_reports_closed() {
        let ch = Channel::bounded(4);
        ch.send(1).unwrap();
        ch.send(2).unwrap();
        ch.close();
        assert_eq!(ch.recv(), Some(1));
        assert_eq!(ch.recv(), Some(2));
        assert_eq!(ch.recv(), None);
        assert_eq!(ch.recv(), None);
    }

    #[test]
    fn test_close_is_idempotent() {
        let ch: Channel<u8> = Channel::bounded(1);
        ch.close();
        ch.close();
        assert!(ch.is_closed());
    }

    #[test]
    fn test_rendezvous_handoff() {
        let ch = Arc::new(Channel::rendezvous());
        let tx = ch.clone();
        let sender = thread::spawn(move || {
            tx.send(10).unwrap();
            tx.send(20).unwrap();
            tx.close();
        });
        assert_eq!(ch.recv(), Some(10));
        assert_eq!(ch.recv(), Some(20));
        assert_eq!(ch.recv(), None);
        sender.join().unwrap();
    }

    #[test]
    fn test_rendezvous_send_completes_after_receive() {
        let ch = Arc::new(Channel::rendezvous());
        let flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let tx = ch.clone();
        let tx_flag = flag.clone();
        let sender = thread::spawn(move || {
            tx.send(99).unwrap();
            tx_flag.store(true, std::sync::atomic::Ordering::SeqCst);
        });
        // Sender must still be parked: nobody has received yet.
        thread::sleep(Duration::from_millis(50));
        assert!(!flag.load(std::sync::atomic::Ordering::SeqCst));
        assert_eq!(ch.recv(), Some(99));
        sender.join().unwrap();
        assert!(flag.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[test]
    fn test_rendezvous_close_releases_parked_sender() {
        let ch: Arc<Channel<u32>> = Arc::new(Channel::rendezvous());
        let tx = ch.clone();
        let sender = thread::spawn(move || tx.send(1));
        thread::sleep(Duration::from_millis(50));
        ch.close();
        assert!(sender.join().unwrap().is_err());
    }

    #[test]
    fn test_try_send_full_and_closed() {
        let ch = Channel::bounded(1);
        ch.try_send(1).unwrap();
        match ch.try_send(2) {
            Err(TrySendError::Full(v)) => assert_eq!(v, 2),
            other => panic!("expected Full, got {:?}", other),
        }
        ch.close();
        match ch.try_send(3) {
            Err(TrySendError::Closed(v)) => assert_eq!(v, 3),
            other => panic!("expected Closed, got {:?}", other),
        }
    }

    #[test]
    fn test_try_recv_empty_then_closed() {
        let ch: Channel<u8> = Channel::bounded(1);
        assert_eq!(ch.try_recv(), Err(TryRecvError::Empty));
        ch.close();
        assert_eq!(ch.try_recv(), Err(TryRecvError::Closed));
    }

    #[test]
    fn test_rendezvous_try_send_without_receiver() {
        let ch = Channel::rendezvous();
        match ch.try_send(5) {
            Err(TrySendError::Full(v)) => assert_eq!(v, 5),
            other => panic!("expected Full, got {:?}", other),
        }
    }

    #[test]
    fn test_many_producers_one_consumer() {
        let ch = Arc::new(Channel::bounded(4));
        let mut producers = Vec::new();
        for p in 0..4 {
            let tx = ch.clone();
            producers.push(thread::spawn(move || {
                for i in 0..25 {
                    tx.send(p * 100 + i).unwrap();
                }
            }));
        }
        let mut seen = Vec::new();
        for _ in 0..100 {
            seen.push(ch.recv().unwrap());
        }
        for producer in producers {
            producer.join().unwrap();
        }
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), 100);
    }
}
