use std::fmt;

/// Handle returned by [`ListenerRegistry::add`], used to remove that
/// registration again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Callback<S> = Box<dyn FnMut(&S) + Send>;

/// Ordered callbacks run after every acquisition.
///
/// Callbacks run synchronously, in registration order, on the thread that
/// performed the acquisition. Registering the same closure twice gives two
/// independent entries.
pub struct ListenerRegistry<S> {
    listeners: Vec<(ListenerId, Callback<S>)>,
    next_id: u64,
}

impl<S> Default for ListenerRegistry<S> {
    fn default() -> Self {
        Self {
            listeners: Vec::new(),
            next_id: 0,
        }
    }
}

impl<S> fmt::Debug for ListenerRegistry<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl<S> ListenerRegistry<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, listener: impl FnMut(&S) + Send + 'static) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Returns `false` if `id` was not registered.
    pub fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(candidate, _)| *candidate != id);
        self.listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn notify(&mut self, subject: &S) {
        for (_, listener) in &mut self.listeners {
            listener(subject);
        }
    }
}
