// nfviz/src/core/stream.rs

//! `EventStream`: the read side of a step execution.
//!
//! The stream owns the future that drives the step. Nothing runs until the
//! stream is first polled, and dropping the stream drops (cancels) the step.
//! Events emitted by handlers are yielded in emission order, followed by
//! exactly one terminal event produced when the driver future resolves.

use super::event::Event;
use futures_util::future::BoxFuture;
use futures_util::stream::Stream;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

pub struct EventStream {
  driver: Option<BoxFuture<'static, Event>>,
  events: mpsc::UnboundedReceiver<Event>,
  terminal: Option<Event>,
  finished: bool,
}

impl EventStream {
  /// `driver` must resolve to the terminal event; `events` receives everything
  /// emitted before it.
  pub(crate) fn new(driver: BoxFuture<'static, Event>, events: mpsc::UnboundedReceiver<Event>) -> Self {
    Self {
      driver: Some(driver),
      events,
      terminal: None,
      finished: false,
    }
  }
}

impl Stream for EventStream {
  type Item = Event;

  fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Event>> {
    let this = &mut *self;
    if this.finished {
      return Poll::Ready(None);
    }

    if let Some(driver) = this.driver.as_mut() {
      if let Poll::Ready(Some(event)) = this.events.poll_recv(cx) {
        return Poll::Ready(Some(event));
      }
      match driver.as_mut().poll(cx) {
        Poll::Ready(terminal) => {
          this.driver = None;
          this.terminal = Some(terminal);
        }
        Poll::Pending => {
          // The driver may have emitted while it was being polled.
          return match this.events.try_recv() {
            Ok(event) => Poll::Ready(Some(event)),
            Err(_) => Poll::Pending,
          };
        }
      }
    }

    // Driver finished: flush whatever is buffered, then the terminal event.
    if let Ok(event) = this.events.try_recv() {
      return Poll::Ready(Some(event));
    }
    this.finished = true;
    Poll::Ready(this.terminal.take())
  }
}

impl std::fmt::Debug for EventStream {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("EventStream")
      .field("running", &self.driver.is_some())
      .field("finished", &self.finished)
      .finish()
  }
}
