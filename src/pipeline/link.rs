// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Single-slot, newest-wins frame handoff.
//!
//! A link is a bounded(1) crossbeam channel. The writer half also keeps a
//! receiver on the same channel so that a `put` into an occupied slot can
//! evict the stale frame instead of blocking. The reader half is the only
//! consumer that ever hands frames to a stage.

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};

use crate::frame::Frame;

/// Create a connected writer/reader pair.
pub fn frame_link() -> (FrameWriter, FrameReader) {
    let (tx, rx) = crossbeam_channel::bounded(1);
    (
        FrameWriter {
            tx,
            evict: rx.clone(),
        },
        FrameReader { rx },
    )
}

/// Every writer half has been dropped; no frame will ever arrive again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("frame link closed")]
pub struct LinkClosed;

/// Producing half. Cloning hands the writer role to another owner (the mode
/// controller lends its writer to each secondary camera it creates).
#[derive(Clone)]
pub struct FrameWriter {
    tx: Sender<Frame>,
    evict: Receiver<Frame>,
}

impl FrameWriter {
    /// Publish `frame`, replacing any unread one. Never blocks.
    ///
    /// Returns `true` when an unread frame was overwritten.
    pub fn put(&self, mut frame: Frame) -> bool {
        let mut replaced = false;
        loop {
            match self.tx.try_send(frame) {
                Ok(()) => return replaced,
                Err(TrySendError::Full(back)) => {
                    // the reader may win the race for the stale frame; either way the slot frees up
                    if self.evict.try_recv().is_ok() {
                        replaced = true;
                    }
                    frame = back;
                }
                // unreachable while `evict` is alive, kept total anyway
                Err(TrySendError::Disconnected(_)) => return replaced,
            }
        }
    }

    /// Drop the unread frame, if any. Returns whether one was dropped.
    pub fn discard(&self) -> bool {
        self.evict.try_recv().is_ok()
    }
}

/// Consuming half. Deliberately not `Clone`: one reader per link.
pub struct FrameReader {
    rx: Receiver<Frame>,
}

impl FrameReader {
    /// Block until a frame is available.
    pub fn get(&self) -> Result<Frame, LinkClosed> {
        self.rx.recv().map_err(|_| LinkClosed)
    }

    /// Like [`get`](Self::get) but gives up after `timeout` with `Ok(None)`.
    pub fn get_timeout(&self, timeout: Duration) -> Result<Option<Frame>, LinkClosed> {
        match self.rx.recv_timeout(timeout) {
            Ok(frame) => Ok(Some(frame)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(LinkClosed),
        }
    }

    pub fn try_get(&self) -> Result<Option<Frame>, LinkClosed> {
        match self.rx.try_recv() {
            Ok(frame) => Ok(Some(frame)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(LinkClosed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use std::time::Instant;

    fn frame(seq: u64) -> Frame {
        Frame::filled(4, 4, Rgb([0, 0, 0]), seq)
    }

    #[test]
    fn test_newest_wins() {
        let (tx, rx) = frame_link();
        assert!(!tx.put(frame(1)));
        assert!(tx.put(frame(2)));
        assert!(tx.put(frame(3)));

        assert_eq!(rx.get().unwrap().sequence(), 3);
        assert_eq!(rx.try_get().unwrap().map(|f| f.sequence()), None);
    }

    #[test]
    fn test_put_never_blocks_without_reader() {
        let (tx, _rx) = frame_link();
        let start = Instant::now();
        for seq in 0..10_000 {
            tx.put(frame(seq));
        }
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_get_blocks_until_put() {
        let (tx, rx) = frame_link();
        let producer = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            tx.put(frame(7));
            tx
        });
        let start = Instant::now();
        let got = rx.get().unwrap();
        assert_eq!(got.sequence(), 7);
        assert!(start.elapsed() >= Duration::from_millis(40));
        drop(producer.join().unwrap());
    }

    #[test]
    fn test_get_timeout_and_closed() {
        let (tx, rx) = frame_link();
        assert_eq!(
            rx.get_timeout(Duration::from_millis(10)).unwrap().map(|f| f.sequence()),
            None
        );
        tx.put(frame(1));
        drop(tx);
        // a frame already in the slot is still delivered after the writer goes away
        assert_eq!(rx.get().unwrap().sequence(), 1);
        assert_eq!(rx.get().unwrap_err(), LinkClosed);
        assert!(rx.get_timeout(Duration::from_millis(10)).is_err());
    }

    #[test]
    fn test_discard_clears_slot() {
        let (tx, rx) = frame_link();
        assert!(!tx.discard());
        tx.put(frame(1));
        assert!(tx.discard());
        assert!(rx.try_get().unwrap().is_none());
    }

    #[test]
    fn test_cloned_writer_shares_slot() {
        let (tx, rx) = frame_link();
        let lent = tx.clone();
        tx.put(frame(1));
        lent.put(frame(2));
        assert_eq!(rx.get().unwrap().sequence(), 2);
    }
}
