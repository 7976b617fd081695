//! Expanding a pack item's seeds and rules into its ordered member list.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::models::{FileId, SourceFile};
use crate::pattern::{PatternSet, matches_any};
use crate::store::FileStore;

use super::context::PackContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Seed,
    Pattern,
    Dependency,
}

struct Admission<'a, 'c, S: FileStore> {
    ctx: &'a PackContext<'c, S>,
    target: &'a SourceFile,
    patterns: &'a PatternSet,
    seen: HashSet<FileId>,
}

impl<S: FileStore> Admission<'_, '_, S> {
    fn admit(&mut self, id: FileId, origin: Origin) -> bool {
        if !self.seen.insert(id) || self.ctx.is_bundle_target(id) {
            return false;
        }

        let file = self.ctx.store.file(id);
        if file.release_ext != self.target.release_ext {
            self.report_mismatch(file, origin);
            return false;
        }

        let ctx = self.ctx;
        if self
            .patterns
            .is_ignored(&file.subpath, &|pack_id| ctx.is_in_pack(id, pack_id))
        {
            debug!("{} excluded from {}", file.subpath, self.target.subpath);
            return false;
        }
        true
    }

    fn report_mismatch(&self, file: &SourceFile, origin: Origin) {
        let target = &self.target.subpath;
        match origin {
            Origin::Dependency | Origin::Pattern => {
                debug!("{} does not match the type of {target}", file.subpath);
            }
            Origin::Seed if file.class() == self.target.class() => {
                warn!(
                    "{} is released as {} but {target} expects {}, likely not yet compiled",
                    file.subpath, file.release_ext, self.target.release_ext
                );
            }
            Origin::Seed => {
                warn!("{} cannot be packed into {target}: type mismatch", file.subpath);
            }
        }
    }

    fn resolve(&self, owner: &SourceFile, dep: &str) -> Option<FileId> {
        let found = self.ctx.store.find_by_id(dep);
        if found.is_none() {
            warn!("{}: required resource {dep} is not found", owner.subpath);
        }
        found
    }
}

/// Compute the member list of the item at `index`.
///
/// Members are, in discovery order: the seeds, the non-script requirements of
/// the seed modules (when `pack_dep_resource` is set), files matching the
/// include rules, then the transitive requirements of all of them (when
/// `pack_deps` is set). Every candidate must share the target's release
/// extension and escape the ignore rules. The result is stably sorted by
/// `pack_order` and recorded as the item's membership.
pub fn select_merge_files<S: FileStore>(ctx: &mut PackContext<'_, S>, index: usize) -> Vec<FileId> {
    let members = {
        let item = &ctx.items[index];
        let mut admission = Admission {
            ctx: &*ctx,
            target: ctx.store.file(item.target),
            patterns: &item.patterns,
            seen: HashSet::new(),
        };

        let seed_origin = if item.pack_dep_resource {
            Origin::Dependency
        } else {
            Origin::Seed
        };
        let mut members: Vec<FileId> = item
            .raw_combines
            .iter()
            .copied()
            .filter(|id| admission.admit(*id, seed_origin))
            .collect();

        if item.pack_dep_resource {
            for resource in script_closure_resources(&admission, &item.raw_combines) {
                if admission.admit(resource, Origin::Dependency) {
                    members.push(resource);
                }
            }
        }

        if !item.patterns.include.is_empty() {
            for id in ctx.store.file_ids() {
                let file = ctx.store.file(id);
                if file.release_ext != admission.target.release_ext {
                    continue;
                }
                let in_pack = |pack_id: &str| ctx.is_in_pack(id, pack_id);
                if matches_any(&item.patterns.include, &file.subpath, &in_pack)
                    && admission.admit(id, Origin::Pattern)
                {
                    members.push(id);
                }
            }
        }

        if item.pack_deps {
            let mut cursor = 0;
            while cursor < members.len() {
                let owner = ctx.store.file(members[cursor]);
                cursor += 1;
                for dep in &owner.requires {
                    if let Some(found) = admission.resolve(owner, dep) {
                        if admission.admit(found, Origin::Dependency) {
                            members.push(found);
                        }
                    }
                }
            }
        }

        members.sort_by_key(|id| ctx.store.file(*id).pack_order);
        members
    };

    let pack_id = ctx.items[index].id.clone();
    ctx.set_members(&pack_id, &members);
    ctx.items[index].to_merge_files = members.clone();
    members
}

/// Non-script requirements of the scripts reachable from `seeds`.
fn script_closure_resources<S: FileStore>(
    admission: &Admission<'_, '_, S>,
    seeds: &[FileId],
) -> Vec<FileId> {
    let store = &admission.ctx.store;
    let mut visited: HashSet<FileId> = HashSet::new();
    let mut queue: Vec<FileId> = seeds
        .iter()
        .copied()
        .filter(|id| store.file(*id).is_script_like() && visited.insert(*id))
        .collect();
    let mut resources = Vec::new();

    let mut cursor = 0;
    while cursor < queue.len() {
        let module = store.file(queue[cursor]);
        cursor += 1;
        for dep in &module.requires {
            let Some(found) = admission.resolve(module, dep) else {
                continue;
            };
            if store.file(found).is_script_like() {
                if visited.insert(found) {
                    queue.push(found);
                }
            } else if !resources.contains(&found) {
                resources.push(found);
            }
        }
    }
    resources
}
