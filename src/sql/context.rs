use crate::memory::QueryArena;
use crate::storage::Storage;

/// Everything an operator needs at run time besides its own state: the
/// statement's arena and the storage collaborator. Operators hold no
/// references, so the same tree can be driven from a nested arena scope.
#[derive(Clone, Copy)]
pub struct ExecutionContext<'a, 'buf> {
    pub arena: &'a QueryArena<'buf>,
    pub storage: &'a dyn Storage,
}

impl<'a, 'buf> ExecutionContext<'a, 'buf> {
    pub fn new(arena: &'a QueryArena<'buf>, storage: &'a dyn Storage) -> Self {
        Self { arena, storage }
    }
}
