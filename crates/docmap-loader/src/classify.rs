//! Embedded type classification.
//!
//! An embedded type is *promoted* when the loader has to build it like a
//! top-level record (under a synthetic key) instead of assigning it as
//! plain data. That is the case when it has references, inherited ones included, or
//! when it embeds, directly or through other embedded types, a type that
//! is promoted.
//!
//! The walk is a depth-first descent over the embedding graph with an
//! explicit stack. Embedding cycles are cut at the first repeated type; the
//! types between the two occurrences are recorded as deferred dependants of
//! the repeated type and are promoted with it once its status is known.

use std::collections::HashMap;

use docmap_schema::{MetadataSource, SchemaResult, TypeMetadata};
use indexmap::IndexMap;
use tracing::debug;

/// Promotion status of every embedded type reached from a set of roots.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Classification {
    entries: IndexMap<String, bool>,
}

impl Classification {
    fn status(&self, type_name: &str) -> Option<bool> {
        self.entries.get(type_name).copied()
    }

    fn mark(&mut self, type_name: &str, promoted: bool) {
        match self.entries.get_mut(type_name) {
            Some(status) => *status = promoted,
            None => {
                self.entries.insert(type_name.to_string(), promoted);
            }
        }
    }

    /// Whether `type_name` was reached by the walk.
    pub fn is_classified(&self, type_name: &str) -> bool {
        self.entries.contains_key(type_name)
    }

    pub fn is_promoted(&self, type_name: &str) -> bool {
        self.status(type_name).unwrap_or(false)
    }

    /// Promoted types, in discovery order.
    pub fn promoted(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(|(_, promoted)| **promoted)
            .map(|(name, _)| name.as_str())
    }

    /// Every classified type with its status, in discovery order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.entries
            .iter()
            .map(|(name, promoted)| (name.as_str(), *promoted))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Classify every embedded type reachable from `roots`.
pub fn classify_embeddings<'a>(
    schema: &dyn MetadataSource,
    roots: impl IntoIterator<Item = &'a str>,
) -> SchemaResult<Classification> {
    let mut classifier = Classifier {
        schema,
        classification: Classification::default(),
        deferred: HashMap::new(),
    };

    for root in roots {
        let metadata = schema.require(root)?;
        classifier.descend(&metadata, &mut Vec::new())?;
    }
    classifier.settle()?;

    let classification = classifier.classification;
    debug!(
        classified = classification.len(),
        promoted = classification.promoted().count(),
        "classified embedded types"
    );
    Ok(classification)
}

struct Classifier<'s> {
    schema: &'s dyn MetadataSource,
    classification: Classification,
    /// Revisited type -> stack entries that sat above it in the cycle.
    deferred: HashMap<String, Vec<String>>,
}

impl Classifier<'_> {
    fn mark_all<'n>(&mut self, names: impl IntoIterator<Item = &'n String>) {
        for name in names {
            self.classification.mark(name, true);
        }
    }

    fn descend(&mut self, metadata: &TypeMetadata, stack: &mut Vec<String>) -> SchemaResult<()> {
        for decl in metadata.embeddeds() {
            let target = decl.target.as_str();

            if let Some(promoted) = self.classification.status(target) {
                if promoted {
                    let parents = stack.clone();
                    self.mark_all(&parents);
                }
                continue;
            }

            if let Some(index) = stack.iter().position(|name| name == target) {
                let delegated = &stack[index + 1..];
                if !delegated.is_empty() {
                    self.deferred
                        .entry(target.to_string())
                        .or_default()
                        .extend(delegated.iter().cloned());
                }
                continue;
            }

            let embedded = self.schema.require(target)?;
            if self.schema.has_references(target)? {
                self.classification.mark(target, true);
                let parents = stack.clone();
                self.mark_all(&parents);
            }

            stack.push(target.to_string());
            self.descend(&embedded, stack)?;
            stack.pop();

            match self.classification.status(target) {
                None => self.classification.mark(target, false),
                Some(_) => {
                    if let Some(dependants) = self.deferred.get(target).cloned() {
                        self.mark_all(&dependants);
                    }
                }
            }
        }
        Ok(())
    }

    /// Promote every classified type that embeds a promoted one, directly
    /// or through other classified types. Covers statuses decided after a
    /// dependant was already settled.
    fn settle(&mut self) -> SchemaResult<()> {
        let mut embedders: HashMap<String, Vec<String>> = HashMap::new();
        for name in self.classification.entries.keys() {
            let metadata = self.schema.require(name)?;
            for decl in metadata.embeddeds() {
                if self.classification.is_classified(&decl.target) {
                    embedders
                        .entry(decl.target.clone())
                        .or_default()
                        .push(name.clone());
                }
            }
        }

        let mut pending: Vec<String> = self.classification.promoted().map(String::from).collect();
        while let Some(promoted) = pending.pop() {
            for embedder in embedders.remove(&promoted).unwrap_or_default() {
                if !self.classification.is_promoted(&embedder) {
                    self.classification.mark(&embedder, true);
                    pending.push(embedder);
                }
            }
        }
        Ok(())
    }
}
