//! Change-set groups.
//!
//! A [`Group`] backs one multi-valued field of one entity. It holds three
//! logical sets: the `saved` baseline as last loaded from the store, and
//! the pending `add` and `remove` queues. The visible membership is always
//! computed, never stored:
//!
//! ```text
//! all() = (saved ++ add) with one identity-equal member elided per remove entry
//! ```
//!
//! The baseline is loaded lazily through a [`BaselineSource`] and cached
//! until invalidated. Queues are consumed by the store at save time.

mod source;

use std::fmt;
use std::sync::Weak;

use docmap_schema::AliasTable;
use tracing::debug;

use crate::entity::{Entity, EntityRef};
use crate::error::DocumentResult;

pub use source::{BaselineSource, EmbeddedSource, PolymorphicReferenceSource, ReferenceSource};

/// Change-set over a lazily loaded baseline.
pub struct Group {
    field: String,
    owner: Weak<Entity>,
    source: Box<dyn BaselineSource>,
    /// `None` until loaded; `Some(vec![])` is a loaded, empty baseline.
    saved: Option<Vec<EntityRef>>,
    add: Vec<EntityRef>,
    remove: Vec<EntityRef>,
}

impl Group {
    pub fn new(field: impl Into<String>, source: Box<dyn BaselineSource>) -> Self {
        Self {
            field: field.into(),
            owner: Weak::new(),
            source,
            saved: None,
            add: Vec::new(),
            remove: Vec::new(),
        }
    }

    pub fn with_owner(mut self, owner: Weak<Entity>) -> Self {
        self.owner = owner;
        self
    }

    /// The owning entity, if it is still alive.
    pub fn owner(&self) -> Option<EntityRef> {
        self.owner.upgrade()
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    /// Discriminator field name of a polymorphic reference group.
    pub fn discriminator_field(&self) -> Option<&str> {
        self.source.discriminator_field()
    }

    /// Alias table of a polymorphic reference group.
    pub fn discriminator_map(&self) -> Option<&AliasTable> {
        self.source.discriminator_map()
    }

    // ---------------------------------------------------------------
    // Pending queues
    // ---------------------------------------------------------------

    /// Queue a member for addition. Duplicates are kept.
    pub fn add(&mut self, document: EntityRef) {
        self.add.push(document);
    }

    pub fn add_many(&mut self, documents: impl IntoIterator<Item = EntityRef>) {
        self.add.extend(documents);
    }

    /// Queue a member for removal.
    pub fn remove(&mut self, document: EntityRef) {
        self.remove.push(document);
    }

    pub fn remove_many(&mut self, documents: impl IntoIterator<Item = EntityRef>) {
        self.remove.extend(documents);
    }

    pub fn get_add(&self) -> &[EntityRef] {
        &self.add
    }

    pub fn get_remove(&self) -> &[EntityRef] {
        &self.remove
    }

    pub fn clear_add(&mut self) {
        self.add.clear();
    }

    pub fn clear_remove(&mut self) {
        self.remove.clear();
    }

    // ---------------------------------------------------------------
    // Baseline
    // ---------------------------------------------------------------

    /// The saved baseline, loading it on first use.
    ///
    /// Load failures propagate unchanged and leave the baseline unloaded.
    pub fn saved(&mut self) -> DocumentResult<&[EntityRef]> {
        let saved = match self.saved.take() {
            Some(saved) => saved,
            None => {
                let loaded = self.source.load_saved()?;
                debug!(field = %self.field, members = loaded.len(), "loaded group baseline");
                loaded
            }
        };
        Ok(self.saved.insert(saved).as_slice())
    }

    /// Reload the baseline unconditionally.
    ///
    /// On failure the previously cached baseline, if any, is kept.
    pub fn refresh_saved(&mut self) -> DocumentResult<&[EntityRef]> {
        let loaded = self.source.load_saved()?;
        debug!(field = %self.field, members = loaded.len(), "reloaded group baseline");
        Ok(self.saved.insert(loaded).as_slice())
    }

    /// Drop the cached baseline; the next read reloads it.
    pub fn clear_saved(&mut self) {
        self.saved = None;
    }

    pub fn is_saved_initialized(&self) -> bool {
        self.saved.is_some()
    }

    // ---------------------------------------------------------------
    // Reconciled view
    // ---------------------------------------------------------------

    /// Current membership: saved members, then added ones, with each
    /// remove entry eliding the first identity-equal member in place.
    ///
    /// A remove entry that matches nothing is ignored.
    pub fn all(&mut self) -> DocumentResult<Vec<EntityRef>> {
        let mut members = self.saved()?.to_vec();
        members.extend(self.add.iter().cloned());
        for removed in &self.remove {
            if let Some(position) = members.iter().position(|member| member == removed) {
                members.remove(position);
            }
        }
        Ok(members)
    }

    pub fn count(&mut self) -> DocumentResult<usize> {
        Ok(self.all()?.len())
    }

    /// Iterate the reconciled view. Loading the baseline may fail, so
    /// iteration starts with a `Result`.
    pub fn iter(&mut self) -> DocumentResult<std::vec::IntoIter<EntityRef>> {
        Ok(self.all()?.into_iter())
    }

    /// Declare the full desired membership.
    ///
    /// Every saved member is queued for removal and every given document
    /// for addition, so that `all()` yields exactly `documents`.
    pub fn replace(&mut self, documents: impl IntoIterator<Item = EntityRef>) -> DocumentResult<()> {
        self.clear_add();
        self.clear_remove();
        let saved = self.saved()?.to_vec();
        self.remove_many(saved);
        self.add_many(documents);
        Ok(())
    }

    /// Clear both queues. The baseline is only invalidated when something
    /// was pending.
    pub fn reset(&mut self) {
        if !self.add.is_empty() || !self.remove.is_empty() {
            self.clear_saved();
        }
        self.clear_add();
        self.clear_remove();
    }
}

impl fmt::Debug for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Group")
            .field("field", &self.field)
            .field("saved", &self.saved.as_ref().map(Vec::len))
            .field("add", &self.add.len())
            .field("remove", &self.remove.len())
            .finish()
    }
}
