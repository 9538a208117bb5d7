use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::channel::mpsc;
use futures::{Stream, StreamExt};

use crate::{Observable, Subscription};

/// `Stream` view over an observable.
///
/// Holds the underlying subscription, so dropping the stream detaches it. The
/// stream ends only when the producer side closes the channel.
pub struct ObservableStream<T> {
	rx: mpsc::UnboundedReceiver<T>,
	_subscription: Subscription,
}

impl<T> ObservableStream<T> {
	/// Pairs a receiver with the subscription feeding it.
	pub fn from_parts(rx: mpsc::UnboundedReceiver<T>, subscription: Subscription) -> Self {
		Self {
			rx,
			_subscription: subscription,
		}
	}
}

/// Collects values pushed by `source` into a stream.
pub fn to_stream<T, O>(source: &O) -> ObservableStream<T>
where
	T: Clone + Send + 'static,
	O: Observable<T> + ?Sized,
{
	let (tx, rx) = mpsc::unbounded();
	let subscription = source.observe(Arc::new(move |value: &T| {
		let _ = tx.unbounded_send(value.clone());
	}));
	ObservableStream::from_parts(rx, subscription)
}

impl<T> Stream for ObservableStream<T> {
	type Item = T;

	fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
		self.get_mut().rx.poll_next_unpin(cx)
	}
}
