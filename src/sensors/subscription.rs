use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Removes a subscription. Cloneable and idempotent.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionHandle {
    token: CancellationToken,
}

impl SubscriptionHandle {
    pub fn remove(&self) {
        self.token.cancel();
    }

    pub fn is_removed(&self) -> bool {
        self.token.is_cancelled()
    }
}

pub struct SubscriptionSender<T> {
    tx: mpsc::UnboundedSender<T>,
    handle: SubscriptionHandle,
}

impl<T> SubscriptionSender<T> {
    /// Returns false once the consumer has removed or dropped the subscription.
    pub fn send(&self, value: T) -> bool {
        if self.handle.is_removed() {
            return false;
        }
        self.tx.send(value).is_ok()
    }

    pub fn is_live(&self) -> bool {
        !self.handle.is_removed() && !self.tx.is_closed()
    }
}

pub struct Subscription<T> {
    rx: mpsc::UnboundedReceiver<T>,
    handle: SubscriptionHandle,
}

impl<T> Subscription<T> {
    /// Next value in delivery order, or `None` once removed or the producer is gone.
    pub async fn recv(&mut self) -> Option<T> {
        tokio::select! {
            biased;
            _ = self.handle.token.cancelled() => None,
            value = self.rx.recv() => value,
        }
    }

    pub fn handle(&self) -> SubscriptionHandle {
        self.handle.clone()
    }

    pub fn remove(&self) {
        self.handle.remove();
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.handle.remove();
    }
}

pub fn subscription_channel<T>() -> (SubscriptionSender<T>, Subscription<T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = SubscriptionHandle::default();
    (
        SubscriptionSender {
            tx,
            handle: handle.clone(),
        },
        Subscription { rx, handle },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_in_order_until_removed() {
        let (sender, mut subscription) = subscription_channel();
        assert!(sender.send(1));
        assert!(sender.send(2));

        assert_eq!(subscription.recv().await, Some(1));
        assert_eq!(subscription.recv().await, Some(2));

        subscription.handle().remove();
        assert!(!sender.send(3));
        assert_eq!(subscription.recv().await, None);
    }

    #[tokio::test]
    async fn dropping_subscription_stops_sender() {
        let (sender, subscription) = subscription_channel::<u32>();
        drop(subscription);
        assert!(!sender.is_live());
        assert!(!sender.send(5));
    }

    #[test]
    fn remove_is_idempotent() {
        let (_sender, subscription) = subscription_channel::<u32>();
        let handle = subscription.handle();
        handle.remove();
        handle.remove();
        assert!(handle.is_removed());
    }
}
