//! Post-load reference checks

use crate::error::LoadError;
use crate::sim::{Entity, EntityId, World};

fn describe(id: EntityId, entity: &Entity) -> String {
    format!("{} {id}", entity.object_type().name())
}

/// Check every stored link of a freshly loaded world.
///
/// Weak links (owners, targets, occupants) may point at entities that were
/// freed before the save; those simply stop resolving. A link that does
/// resolve must reach the expected kind of entity. Subscriptions are
/// removed when their subscriber dies, so they must always resolve.
pub fn validate_references(world: &World) -> Result<(), LoadError> {
    for (handle, entity) in world.entities.iter() {
        let id = EntityId(handle);

        for (target, expected) in entity.kind.references() {
            let Some(found) = world.object_type(target) else {
                continue;
            };
            if !expected.accepts(found) {
                return Err(LoadError::TypeMismatch {
                    owner: describe(id, entity),
                    target,
                    expected: expected.label(),
                    found,
                });
            }
        }

        if let Some(n) = entity
            .notify
            .live()
            .find(|n| world.entity(n.subscriber).is_none())
        {
            return Err(LoadError::DanglingReference {
                owner: describe(id, entity),
                target: n.subscriber,
            });
        }
    }

    Ok(())
}
