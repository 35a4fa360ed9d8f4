use crate::engine::{EngineContext, RawChannel, RawReceive};
use crate::error::{EngineError, Error};
use crate::payload::Payload;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{oneshot, Notify};

/// Capacity used for signal channels, which never block the signaler
pub(crate) const UNBOUNDED: usize = usize::MAX;

/// FIFO channel shared by the coroutines of one execution
///
/// A value is accepted without suspending when a buffer slot is free or a
/// receiver is already parked waiting for it. Otherwise the sender parks
/// until a receiver takes its value.
pub(crate) struct LocalChannel {
    state: Mutex<ChannelState>,
    wake: Arc<Notify>,
}

struct ChannelState {
    buffer: VecDeque<Payload>,
    capacity: usize,
    closed: bool,
    blocked_senders: VecDeque<BlockedSender>,
    waiting_receivers: usize,
}

struct BlockedSender {
    value: Payload,
    delivered: oneshot::Sender<()>,
}

impl ChannelState {
    fn can_accept(&self) -> bool {
        self.buffer.len() < self.capacity || self.waiting_receivers > self.buffer.len()
    }

    fn take(&mut self) -> RawReceive {
        if let Some(value) = self.buffer.pop_front() {
            if self.buffer.len() < self.capacity {
                if let Some(sender) = self.blocked_senders.pop_front() {
                    self.buffer.push_back(sender.value);
                    let _ = sender.delivered.send(());
                }
            }
            return RawReceive::Value(value);
        }
        if let Some(sender) = self.blocked_senders.pop_front() {
            let _ = sender.delivered.send(());
            return RawReceive::Value(sender.value);
        }
        if self.closed {
            RawReceive::Closed
        } else {
            RawReceive::Empty
        }
    }
}

/// Keeps a receiver counted as parked for as long as it waits
pub(crate) struct ParkedReceiver<'a> {
    channel: &'a dyn RawChannel,
}

impl<'a> ParkedReceiver<'a> {
    pub(crate) fn new(channel: &'a dyn RawChannel) -> Self {
        channel.park_receiver();
        Self { channel }
    }
}

impl Drop for ParkedReceiver<'_> {
    fn drop(&mut self) {
        self.channel.unpark_receiver();
    }
}

impl LocalChannel {
    pub(crate) fn new(capacity: usize, wake: Arc<Notify>) -> Self {
        Self {
            state: Mutex::new(ChannelState {
                buffer: VecDeque::new(),
                capacity,
                closed: false,
                blocked_senders: VecDeque::new(),
                waiting_receivers: 0,
            }),
            wake,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ChannelState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl RawChannel for LocalChannel {
    async fn send(&self, _ctx: &dyn EngineContext, value: Payload) -> Result<(), Error> {
        let delivered = {
            let mut state = self.lock();
            if state.closed {
                return Err(EngineError::ChannelClosed.into());
            }
            if state.can_accept() {
                state.buffer.push_back(value);
                drop(state);
                self.wake.notify_waiters();
                return Ok(());
            }
            let (tx, rx) = oneshot::channel();
            state.blocked_senders.push_back(BlockedSender {
                value,
                delivered: tx,
            });
            rx
        };
        self.wake.notify_waiters();
        delivered
            .await
            .map_err(|_| Error::from(EngineError::ChannelClosed))
    }

    fn try_send(&self, value: &Payload) -> Result<bool, Error> {
        let mut state = self.lock();
        if state.closed {
            return Err(EngineError::ChannelClosed.into());
        }
        if !state.can_accept() {
            return Ok(false);
        }
        state.buffer.push_back(value.clone());
        drop(state);
        self.wake.notify_waiters();
        Ok(true)
    }

    async fn receive(&self, _ctx: &dyn EngineContext) -> Option<Payload> {
        let mut parked: Option<ParkedReceiver<'_>> = None;
        loop {
            let notified = self.wake.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.try_receive() {
                RawReceive::Value(value) => return Some(value),
                RawReceive::Closed => return None,
                RawReceive::Empty => {
                    if parked.is_none() {
                        parked = Some(ParkedReceiver::new(self));
                    }
                }
            }
            notified.await;
        }
    }

    fn try_receive(&self) -> RawReceive {
        let received = self.lock().take();
        if matches!(received, RawReceive::Value(_)) {
            self.wake.notify_waiters();
        }
        received
    }

    fn park_receiver(&self) {
        self.lock().waiting_receivers += 1;
        self.wake.notify_waiters();
    }

    fn unpark_receiver(&self) {
        let mut state = self.lock();
        state.waiting_receivers = state.waiting_receivers.saturating_sub(1);
    }

    fn close(&self) {
        {
            let mut state = self.lock();
            state.closed = true;
            // Dropping the acks wakes parked senders with ChannelClosed
            state.blocked_senders.clear();
        }
        self.wake.notify_waiters();
    }

    fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn len(&self) -> usize {
        self.lock().buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(capacity: usize) -> LocalChannel {
        LocalChannel::new(capacity, Arc::new(Notify::new()))
    }

    #[test]
    fn test_buffered_try_send_respects_capacity() {
        let ch = channel(2);
        assert!(ch.try_send(&Payload::encode(&1).unwrap()).unwrap());
        assert!(ch.try_send(&Payload::encode(&2).unwrap()).unwrap());
        assert!(!ch.try_send(&Payload::encode(&3).unwrap()).unwrap());
        assert_eq!(ch.len(), 2);
        assert_eq!(ch.try_receive(), RawReceive::Value(Payload::encode(&1).unwrap()));
    }

    #[test]
    fn test_unbuffered_try_send_without_receiver_would_block() {
        let ch = channel(0);
        assert!(!ch.try_send(&Payload::unit()).unwrap());
        assert_eq!(ch.try_receive(), RawReceive::Empty);
    }

    #[test]
    fn test_parked_receiver_lets_unbuffered_send_through() {
        let ch = channel(0);
        {
            let _parked = ParkedReceiver::new(&ch);
            assert!(ch.try_send(&Payload::unit()).unwrap());
            assert!(!ch.try_send(&Payload::unit()).unwrap());
        }
        assert_eq!(ch.try_receive(), RawReceive::Value(Payload::unit()));
        assert!(!ch.try_send(&Payload::unit()).unwrap());
    }

    #[test]
    fn test_closed_channel_drains_then_reports_closed() {
        let ch = channel(1);
        ch.try_send(&Payload::unit()).unwrap();
        ch.close();
        assert!(ch.try_send(&Payload::unit()).is_err());
        assert_eq!(ch.try_receive(), RawReceive::Value(Payload::unit()));
        assert_eq!(ch.try_receive(), RawReceive::Closed);
    }
}
