use super::error::EngineError;
use std::collections::HashMap;

/// Densely stored items addressed by caller-chosen integer ids.
///
/// Items live in a `Vec` so they can be iterated in a stable order; removal
/// moves the last item into the hole and redirects its id.
#[derive(Debug)]
pub(crate) struct IdRegistry<T> {
    items: Vec<T>,
    ids: Vec<i32>,
    index_of: HashMap<i32, usize>,
    id_type: &'static str,
}

impl<T> IdRegistry<T> {
    pub(crate) fn new(id_type: &'static str) -> Self {
        Self {
            items: Vec::new(),
            ids: Vec::new(),
            index_of: HashMap::new(),
            id_type,
        }
    }

    fn missing(&self, id: i32, caller: &str) -> EngineError {
        EngineError::InvalidOperation(format!(
            "{caller} error: {} {id} does not exist.",
            self.id_type
        ))
    }

    pub(crate) fn reserve(&mut self, additional: usize) {
        self.items.reserve(additional);
        self.ids.reserve(additional);
    }

    pub(crate) fn insert(&mut self, id: i32, item: T, caller: &str) -> Result<usize, EngineError> {
        if self.index_of.contains_key(&id) {
            return Err(EngineError::InvalidOperation(format!(
                "{caller} error: {} {id} already exists.",
                self.id_type
            )));
        }
        let index = self.items.len();
        self.items.push(item);
        self.ids.push(id);
        self.index_of.insert(id, index);
        Ok(index)
    }

    pub(crate) fn index(&self, id: i32, caller: &str) -> Result<usize, EngineError> {
        self.index_of
            .get(&id)
            .copied()
            .ok_or_else(|| self.missing(id, caller))
    }

    pub(crate) fn get_mut(&mut self, id: i32, caller: &str) -> Result<&mut T, EngineError> {
        let index = self.index(id, caller)?;
        Ok(&mut self.items[index])
    }

    pub(crate) fn remove(&mut self, id: i32, caller: &str) -> Result<T, EngineError> {
        let index = self.index(id, caller)?;
        self.index_of.remove(&id);
        self.ids.swap_remove(index);
        if let Some(&moved) = self.ids.get(index) {
            self.index_of.insert(moved, index);
        }
        Ok(self.items.swap_remove(index))
    }

    pub(crate) fn items(&self) -> &[T] {
        &self.items
    }

    pub(crate) fn items_mut(&mut self) -> &mut [T] {
        &mut self.items
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
