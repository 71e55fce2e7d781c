use std::any::Any;

/// Maps a concrete payload type onto the intent type tag the dispatcher
/// routes on and the output type its operation produces.
///
/// Implemented once per intent, usually next to the payload struct itself:
///
/// ```ignore
/// pub struct OpenProject { pub path: PathBuf }
/// impl IntentKind for OpenProject {
///     type Output = ProjectHandle;
///     const TAG: &'static str = "project:open";
/// }
/// ```
pub trait IntentKind: Send + 'static {
    type Output: Send + 'static;
    const TAG: &'static str;
}

/// A dispatched intent with its payload type erased.
///
/// Interceptors operate on `Intent` rather than a concrete payload type
/// because a single interceptor (logging, idempotency) runs ahead of every
/// operation regardless of which one it is. Operations themselves never see
/// an `Intent` — the dispatcher downcasts back to the concrete payload
/// before calling `Operation::execute`.
pub struct Intent {
    pub type_tag: &'static str,
    payload: Box<dyn Any + Send>,
}

impl Intent {
    pub fn new<T: Send + 'static>(type_tag: &'static str, payload: T) -> Self {
        Self { type_tag, payload: Box::new(payload) }
    }

    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.payload.downcast_ref()
    }

    pub fn downcast_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.payload.downcast_mut()
    }

    pub(crate) fn into_payload<T: 'static>(self) -> anyhow::Result<T> {
        self.payload
            .downcast::<T>()
            .map(|boxed| *boxed)
            .map_err(|_| anyhow::anyhow!("intent `{}` payload did not match its registered operation", self.type_tag))
    }
}
