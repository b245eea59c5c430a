use std::{
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use futures::channel::oneshot::Receiver;
use pin_project_lite::pin_project;

use crate::promise::{Fault, PromiseError};

pin_project! {
    /// A future that resolves with the outcome of a [`Promise`](crate::Promise).
    ///
    /// Created by [`Promise::wait`](crate::Promise::wait). It is woken when the
    /// promise's subscribers are dispatched on the scheduler thread, so it can be
    /// awaited on any executor as long as the scheduler keeps ticking.
    #[must_use = "futures do nothing unless polled or .awaited"]
    pub struct Wait<T> {
        #[pin]
        receiver: Receiver<Result<T, Fault>>,
    }
}

impl<T> Wait<T> {
    pub(crate) fn new(receiver: Receiver<Result<T, Fault>>) -> Self {
        Wait { receiver }
    }
}

impl<T> Future for Wait<T> {
    type Output = Result<T, Fault>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        this.receiver.poll(cx).map(|outcome| {
            outcome.unwrap_or_else(|_canceled| {
                let abandoned: Fault = Arc::new(PromiseError::Abandoned);
                Err(abandoned)
            })
        })
    }
}
