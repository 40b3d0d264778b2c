//! Generic listener fan-out: a dedicated task folds a stream of events plus
//! late subscribers into broadcast sends, dropping subscribers whose
//! receiver has gone away. Grounds the "listener" requirements in
//! `spec.md` §4.7/§4.8/§4.9 (GATT notification listeners, HCI status
//! listeners, adapter-added/removed callbacks) uniformly.

use tokio::sync::{mpsc, oneshot};

pub trait Event: Clone + Send + 'static {
    type EventItem: Clone + Send + 'static;
}

pub struct SubscriptionReq<E: Event> {
    pub tx: mpsc::UnboundedSender<E::EventItem>,
    pub ready_tx: oneshot::Sender<()>,
}

struct Subscriber<E: Event> {
    tx: mpsc::UnboundedSender<E::EventItem>,
}

/// Runs until `msg_rx` closes. Call this as a spawned task; subscribe via
/// the returned `sub_tx`.
pub async fn handle_events<E: Event>(
    mut msg_rx: mpsc::UnboundedReceiver<E::EventItem>,
    mut sub_rx: mpsc::UnboundedReceiver<SubscriptionReq<E>>,
) {
    let mut subs: Vec<Subscriber<E>> = Vec::new();
    loop {
        tokio::select! {
            msg = msg_rx.recv() => {
                match msg {
                    Some(evt) => {
                        subs.retain(|sub| sub.tx.send(evt.clone()).is_ok());
                    }
                    None => break,
                }
            }
            req = sub_rx.recv() => {
                match req {
                    Some(req) => {
                        subs.push(Subscriber { tx: req.tx });
                        let _ = req.ready_tx.send(());
                    }
                    None => break,
                }
            }
        }
    }
}

pub async fn subscribe<E: Event>(
    sub_tx: &mpsc::UnboundedSender<SubscriptionReq<E>>,
) -> mpsc::UnboundedReceiver<E::EventItem> {
    let (tx, rx) = mpsc::unbounded_channel();
    let (ready_tx, ready_rx) = oneshot::channel();
    let _ = sub_tx.send(SubscriptionReq { tx, ready_tx });
    let _ = ready_rx.await;
    rx
}

/// Generates a non-generic fan-out for a concrete event enum, matching the
/// pattern above without the trait machinery — used where only one event
/// type is ever dispatched on a given channel pair.
#[macro_export]
macro_rules! setup_event {
    ($name:ident, $item:ty) => {
        pub struct $name {
            sub_tx: ::tokio::sync::mpsc::UnboundedSender<$crate::event::SubscriptionReq<$name>>,
        }

        impl $crate::event::Event for $name {
            type EventItem = $item;
        }

        impl $name {
            pub fn spawn() -> (Self, ::tokio::sync::mpsc::UnboundedSender<$item>) {
                let (msg_tx, msg_rx) = ::tokio::sync::mpsc::unbounded_channel();
                let (sub_tx, sub_rx) = ::tokio::sync::mpsc::unbounded_channel();
                ::tokio::spawn($crate::event::handle_events::<$name>(msg_rx, sub_rx));
                (Self { sub_tx }, msg_tx)
            }

            pub async fn subscribe(&self) -> ::tokio::sync::mpsc::UnboundedReceiver<$item> {
                $crate::event::subscribe(&self.sub_tx).await
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone)]
    struct TestEvent;
    impl Event for TestEvent {
        type EventItem = u32;
    }

    #[tokio::test]
    async fn subscribers_receive_events_in_order_and_dead_ones_are_dropped() {
        let (msg_tx, msg_rx) = mpsc::unbounded_channel();
        let (sub_tx, sub_rx) = mpsc::unbounded_channel::<SubscriptionReq<TestEvent>>();
        tokio::spawn(handle_events::<TestEvent>(msg_rx, sub_rx));

        let mut rx1 = subscribe(&sub_tx).await;
        {
            let mut rx2 = subscribe(&sub_tx).await;
            msg_tx.send(1).unwrap();
            assert_eq!(rx2.recv().await, Some(1));
        }
        msg_tx.send(2).unwrap();
        assert_eq!(rx1.recv().await, Some(1));
        assert_eq!(rx1.recv().await, Some(2));
    }
}
