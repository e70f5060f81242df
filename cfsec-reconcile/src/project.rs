//! Projection of remote associations into relation pairs.

use tracing::warn;

use crate::relation::{Relation, RelationSet};
use crate::store::RawAssociation;

/// Flatten remote security groups into one relation per
/// (security group, related entity) combination.
///
/// A group with no related entities contributes nothing. Entries with an empty
/// GUID on either side are skipped with a warning rather than failing the read.
pub fn project<'a, I>(associations: I) -> RelationSet
where
    I: IntoIterator<Item = &'a RawAssociation>,
{
    let mut observed = RelationSet::new();
    for association in associations {
        for related in &association.related_guids {
            match Relation::new(association.security_group_guid.as_str(), related.as_str()) {
                Ok(relation) => {
                    observed.insert(relation);
                }
                Err(e) => {
                    warn!(
                        security_group = %association.security_group_guid,
                        "Skipping malformed remote association: {}", e
                    );
                }
            }
        }
    }
    observed
}
