use std::ops::{Deref, DerefMut};

/// Where one operation is in the dispatch state machine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DispatchState {
    #[default]
    NotDispatched,
    ModelPath,
    SqlPath,
    Bypassed,
    Rewritten,
    Failed,
}

impl DispatchState {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Bypassed | Self::Rewritten | Self::Failed)
    }
}

/// Per-operation scratch state. Owned by one in-flight operation.
#[derive(Debug, Default)]
pub struct DispatchContext {
    ignore_sharding: bool,
    state: DispatchState,
    suffix: Option<String>,
    physical_table: Option<String>,
}

impl DispatchContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub const fn ignore_sharding(&self) -> bool {
        self.ignore_sharding
    }

    pub const fn state(&self) -> DispatchState {
        self.state
    }

    pub fn suffix(&self) -> Option<&str> {
        self.suffix.as_deref()
    }

    pub fn physical_table(&self) -> Option<&str> {
        self.physical_table.as_deref()
    }

    pub(crate) const fn set_state(&mut self, state: DispatchState) {
        self.state = state;
    }

    pub(crate) fn set_target(&mut self, physical_table: String, suffix: String) {
        self.physical_table = Some(physical_table);
        self.suffix = Some(suffix);
    }

    /// Marks the context as ignored until the guard drops.
    ///
    /// The previous flag is restored on every exit path, panics included.
    pub fn ignore_guard(&mut self) -> IgnoreGuard<'_> {
        let previous = std::mem::replace(&mut self.ignore_sharding, true);
        IgnoreGuard { ctx: self, previous }
    }

    /// Runs `f` with sharding suppressed for statements issued on this context.
    pub fn with_ignore<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        let mut guard = self.ignore_guard();
        f(&mut guard)
    }
}

/// Scoped "sharding ignore" flag; see [`DispatchContext::ignore_guard`].
#[derive(Debug)]
pub struct IgnoreGuard<'a> {
    ctx: &'a mut DispatchContext,
    previous: bool,
}

impl Deref for IgnoreGuard<'_> {
    type Target = DispatchContext;

    fn deref(&self) -> &Self::Target {
        self.ctx
    }
}

impl DerefMut for IgnoreGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.ctx
    }
}

impl Drop for IgnoreGuard<'_> {
    fn drop(&mut self) {
        self.ctx.ignore_sharding = self.previous;
    }
}
