use parking_lot::{Condvar, Mutex};

/// Admission counters. Only ever touched under the lock's mutex.
#[derive(Default)]
struct State {
    /// Readers waiting to enter.
    wait_rd: usize,
    /// Writers waiting to enter.
    wait_wr: usize,
    /// Readers currently inside.
    work_rd: usize,
    /// Writers currently inside; 0 or 1.
    work_wr: usize,
    /// Size of the reader batch currently being admitted. Frozen at the
    /// moment of the wake signal; each admitted reader takes one slot.
    /// While nonzero, arriving readers and writers queue behind the
    /// batch, so a reader that turned up after a waiting writer cannot
    /// sneak in ahead of it.
    cascade: usize,
}

/// A writer-preferring reader/writer lock with cascade wake-up.
///
/// Unlike [`std::sync::RwLock`], this lock is detached from the data it
/// protects and is released by explicit calls rather than by guard
/// drops. The tree's traversal interleaves acquisitions and releases of
/// *different* nodes' locks (hand-over-hand), which lexically scoped
/// guards cannot express.
///
/// Writers take priority over newly arriving readers, but a releasing
/// writer hands the lock to the whole batch of readers waiting at that
/// instant, so neither side is starved. There is no try-lock and no
/// timeout, and the lock is not reentrant.
pub(crate) struct RwLock {
    state: Mutex<State>,
    to_read: Condvar,
    to_write: Condvar,
}

impl RwLock {
    pub(crate) fn new() -> RwLock {
        RwLock {
            state: Mutex::new(State::default()),
            to_read: Condvar::new(),
            to_write: Condvar::new(),
        }
    }

    /// Acquires the lock in read mode, blocking while a writer is inside,
    /// a writer is waiting, or an earlier reader batch is still being
    /// admitted.
    pub(crate) fn read(&self) {
        let mut state = self.state.lock();
        state.wait_rd += 1;
        if state.work_wr > 0 || state.wait_wr > 0 || state.cascade > 0 {
            while !(state.work_wr == 0 && state.cascade > 0) {
                self.to_read.wait(&mut state);
            }
            state.cascade -= 1;
        }
        state.wait_rd -= 1;
        state.work_rd += 1;
    }

    /// Releases a read acquisition.
    pub(crate) fn read_unlock(&self) {
        let mut state = self.state.lock();
        debug_assert!(state.work_rd > 0 && state.work_wr == 0);
        state.work_rd -= 1;
        if state.work_rd > 0 {
            return;
        }
        if state.wait_wr > 0 {
            self.to_write.notify_one();
        } else if state.wait_rd > 0 {
            state.cascade = state.wait_rd;
            self.to_read.notify_all();
        }
    }

    /// Acquires the lock in write mode, blocking while anyone is inside
    /// or a reader batch is still being admitted.
    pub(crate) fn write(&self) {
        let mut state = self.state.lock();
        state.wait_wr += 1;
        while state.work_rd > 0 || state.work_wr > 0 || state.cascade > 0 {
            self.to_write.wait(&mut state);
        }
        state.wait_wr -= 1;
        state.work_wr = 1;
    }

    /// Releases a write acquisition. Yields to any batch of waiting
    /// readers before the next writer.
    pub(crate) fn write_unlock(&self) {
        let mut state = self.state.lock();
        debug_assert!(state.work_wr == 1 && state.work_rd == 0);
        state.work_wr = 0;
        if state.wait_rd > 0 {
            state.cascade = state.wait_rd;
            self.to_read.notify_all();
        } else if state.wait_wr > 0 {
            self.to_write.notify_one();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::RwLock;
    use rand::{Rng, SeedableRng};
    use std::cell::UnsafeCell;
    use std::sync::{Arc, Barrier};
    use std::thread;

    /// A pair kept equal by writers; readers use it to observe torn
    /// state if exclusion were ever violated.
    struct Paired {
        lock: RwLock,
        value: UnsafeCell<(u64, u64)>,
    }

    // The tests only touch `value` under `lock`.
    unsafe impl Sync for Paired {}

    impl Paired {
        fn new() -> Paired {
            Paired {
                lock: RwLock::new(),
                value: UnsafeCell::new((0, 0)),
            }
        }
    }

    #[test]
    fn writers_are_exclusive() {
        const THREADS: usize = 4;
        const WRITES: u64 = 1000;

        let paired = Arc::new(Paired::new());
        let threads: Vec<_> = (0..THREADS)
            .map(|_| {
                let paired = Arc::clone(&paired);
                thread::spawn(move || {
                    for _ in 0..WRITES {
                        paired.lock.write();
                        let value = unsafe { &mut *paired.value.get() };
                        value.0 += 1;
                        thread::yield_now();
                        value.1 += 1;
                        paired.lock.write_unlock();
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }

        paired.lock.read();
        assert_eq!(
            unsafe { *paired.value.get() },
            (THREADS as u64 * WRITES, THREADS as u64 * WRITES)
        );
        paired.lock.read_unlock();
    }

    #[test]
    fn readers_run_concurrently() {
        const READERS: usize = 8;

        let lock = Arc::new(RwLock::new());
        let barrier = Arc::new(Barrier::new(READERS));
        let threads: Vec<_> = (0..READERS)
            .map(|_| {
                let lock = Arc::clone(&lock);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    lock.read();
                    // Rendezvous while all readers hold the lock; if the
                    // lock did not admit them together this would hang.
                    barrier.wait();
                    lock.read_unlock();
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }
    }

    #[test]
    fn randomized_reader_writer_mix() {
        const THREADS: u64 = 8;
        const ROUNDS: usize = 500;

        let paired = Arc::new(Paired::new());
        let threads: Vec<_> = (0..THREADS)
            .map(|seed| {
                let paired = Arc::clone(&paired);
                thread::spawn(move || {
                    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
                    for _ in 0..ROUNDS {
                        if rng.gen_bool(0.3) {
                            paired.lock.write();
                            let value = unsafe { &mut *paired.value.get() };
                            value.0 += 1;
                            thread::yield_now();
                            value.1 += 1;
                            paired.lock.write_unlock();
                        } else {
                            paired.lock.read();
                            let value = unsafe { *paired.value.get() };
                            assert_eq!(value.0, value.1);
                            paired.lock.read_unlock();
                        }
                        if rng.gen_bool(0.1) {
                            thread::yield_now();
                        }
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }

        paired.lock.read();
        let value = unsafe { *paired.value.get() };
        assert_eq!(value.0, value.1);
        paired.lock.read_unlock();
    }
}
