//! Row-to-object materialization.
//!
//! A [`Materializer`] lives for exactly one query execution. Its identity
//! cache guarantees that every (entity, key) pair maps to a single shared
//! instance for that execution, so rows that repeat a parent hand back the
//! same `Arc`, not an equal copy.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::statement::{JoinLink, SelectStatement};
use crate::catalog::EntityDescriptor;
use crate::error::Error;
use crate::model::{AnyEntity, EntityFactory, FieldReader};
use crate::value::{IdentityKey, Value};

struct Segment {
    descriptor: Arc<EntityDescriptor>,
    factory: Arc<dyn EntityFactory>,
    offset: usize,
    key_position: Option<usize>,
}

/// Column layout of a select: one segment per entity, root first.
pub(crate) struct MaterializePlan {
    segments: Vec<Segment>,
    links: Vec<JoinLink>,
    width: usize,
}

impl MaterializePlan {
    pub(crate) fn for_select(select: &SelectStatement) -> Result<Self, Error> {
        let mut segments = Vec::new();
        let mut offset = 0;
        for descriptor in select.entities() {
            let key_position = descriptor
                .primary_key
                .as_ref()
                .and_then(|pk| descriptor.field_position(&pk.field));
            segments.push(Segment {
                descriptor: Arc::clone(descriptor),
                factory: Arc::clone(descriptor.factory()?),
                offset,
                key_position,
            });
            offset += descriptor.fields.len();
        }
        let links = select.joins.iter().filter_map(|j| j.link.clone()).collect();
        Ok(Self {
            segments,
            links,
            width: offset,
        })
    }
}

/// Per-execution map from (entity, key) to the materialized instance.
#[derive(Default)]
pub(crate) struct IdentityCache {
    // Keyed by descriptor identity rather than name.
    entries: HashMap<(usize, IdentityKey), AnyEntity>,
}

impl IdentityCache {
    fn get_or_build(
        &mut self,
        descriptor: &Arc<EntityDescriptor>,
        key: IdentityKey,
        build: impl FnOnce() -> Result<AnyEntity, Error>,
    ) -> Result<(AnyEntity, bool), Error> {
        let slot = (Arc::as_ptr(descriptor) as usize, key);
        if let Some(existing) = self.entries.get(&slot) {
            return Ok((Arc::clone(existing), false));
        }
        let entity = build()?;
        self.entries.insert(slot, Arc::clone(&entity));
        Ok((entity, true))
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

fn identity(entity: &AnyEntity) -> usize {
    Arc::as_ptr(entity) as *const () as usize
}

/// Turns rows of one select into root entities.
pub(crate) struct Materializer {
    plan: MaterializePlan,
    cache: IdentityCache,
    /// (owner, link, target) triples already attached.
    attached: HashSet<(usize, usize, usize)>,
}

impl Materializer {
    pub(crate) fn new(plan: MaterializePlan) -> Self {
        Self {
            plan,
            cache: IdentityCache::default(),
            attached: HashSet::new(),
        }
    }

    /// Process one row; returns the root entity the first time it is seen.
    pub(crate) fn process_row(&mut self, row: &[Value]) -> Result<Option<AnyEntity>, Error> {
        if row.len() < self.plan.width {
            return Err(Error::Materialize {
                entity: self.plan.segments[0].descriptor.name.clone(),
                field: String::new(),
                reason: format!("row has {} columns, expected {}", row.len(), self.plan.width),
            });
        }

        let mut instances: Vec<Option<AnyEntity>> = Vec::with_capacity(self.plan.segments.len());
        let mut root_is_new = false;
        for (index, segment) in self.plan.segments.iter().enumerate() {
            let values = &row[segment.offset..segment.offset + segment.descriptor.fields.len()];
            let build = || segment.factory.build(&FieldReader::new(&segment.descriptor, values));

            let instance = match segment.key_position {
                Some(position) => match values[position].identity_key() {
                    // A null key means the row carries no entity (unmatched left join).
                    None => None,
                    Some(key) => {
                        let (entity, fresh) =
                            self.cache.get_or_build(&segment.descriptor, key, build)?;
                        if index == 0 {
                            root_is_new = fresh;
                        }
                        Some(entity)
                    }
                },
                // Without a key there is no identity to share.
                None if values.iter().all(Value::is_null) => None,
                None => {
                    if index == 0 {
                        root_is_new = true;
                    }
                    Some(build()?)
                }
            };
            instances.push(instance);
        }

        // Attach after the whole row is built; collections grow by append,
        // so a later row for the same parent extends the same list.
        let mut pending: Vec<(usize, &AnyEntity, &AnyEntity)> = Vec::new();
        for (link_index, link) in self.plan.links.iter().enumerate() {
            let (Some(Some(owner)), Some(Some(target))) =
                (instances.get(link.owner), instances.get(link.target))
            else {
                continue;
            };
            if self.attached.insert((identity(owner), link_index, identity(target))) {
                pending.push((link_index, owner, target));
            }
        }
        pending.sort_by_key(|(link_index, owner, _)| (identity(owner), *link_index));
        for (link_index, owner, target) in pending {
            let link = &self.plan.links[link_index];
            self.plan.segments[link.owner]
                .factory
                .attach(owner, &link.reference, target)?;
        }

        let root = instances.into_iter().next().flatten();
        Ok(root.filter(|_| root_is_new))
    }

    pub(crate) fn cached(&self) -> usize {
        self.cache.len()
    }
}
