use tokio::sync::mpsc;

use catscope_types::{CatscopeError, Message};

/// Receiver of capture output
///
/// Both hooks run on the capture worker, never on the thread that called
/// `register`. Do not log to the captured stream from inside `on_new_message`,
/// or every delivered message will produce another one.
pub trait Subscriber: Send + Sync + 'static {
    /// Called once per accepted message, in stream order
    fn on_new_message(&self, message: Message);

    /// Called at most once per registration when capture fails
    fn on_exception(&self, error: CatscopeError) {
        let _ = error;
    }
}

/// Forwards messages (and optionally errors) into channels
pub struct ChannelSubscriber {
    messages: mpsc::UnboundedSender<Message>,
    errors: Option<mpsc::UnboundedSender<CatscopeError>>,
}

impl ChannelSubscriber {
    pub fn new(messages: mpsc::UnboundedSender<Message>) -> Self {
        Self {
            messages,
            errors: None,
        }
    }

    pub fn with_errors(mut self, errors: mpsc::UnboundedSender<CatscopeError>) -> Self {
        self.errors = Some(errors);
        self
    }
}

impl Subscriber for ChannelSubscriber {
    fn on_new_message(&self, message: Message) {
        // Receiver gone means nobody is listening any more
        let _ = self.messages.send(message);
    }

    fn on_exception(&self, error: CatscopeError) {
        match &self.errors {
            Some(errors) => {
                let _ = errors.send(error);
            }
            None => tracing::warn!(%error, "capture failed"),
        }
    }
}

/// Subscriber built from closures
pub struct FnSubscriber<M, E> {
    on_message: M,
    on_error: E,
}

impl<M> FnSubscriber<M, fn(CatscopeError)>
where
    M: Fn(Message) + Send + Sync + 'static,
{
    pub fn new(on_message: M) -> Self {
        Self {
            on_message,
            on_error: |_| {},
        }
    }
}

impl<M, E> FnSubscriber<M, E> {
    pub fn on_exception<E2>(self, on_error: E2) -> FnSubscriber<M, E2>
    where
        E2: Fn(CatscopeError) + Send + Sync + 'static,
    {
        FnSubscriber {
            on_message: self.on_message,
            on_error,
        }
    }
}

impl<M, E> Subscriber for FnSubscriber<M, E>
where
    M: Fn(Message) + Send + Sync + 'static,
    E: Fn(CatscopeError) + Send + Sync + 'static,
{
    fn on_new_message(&self, message: Message) {
        (self.on_message)(message)
    }

    fn on_exception(&self, error: CatscopeError) {
        (self.on_error)(error)
    }
}
