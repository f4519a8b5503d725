//! Three-way set difference between local groups and a provider listing.

use std::collections::{HashMap, HashSet};

use crate::error::{Result, SecGroupError};
use crate::model::SecurityGroupData;
use crate::provider::RemoteSecurityGroup;

/// Local and remote groups split by external identity.
///
/// `common_local[i]` and `common_remote[i]` always describe the same
/// resource. Common pairs and `added` follow the provider's listing order.
#[derive(Debug, Default)]
pub struct Partition {
    /// Local groups whose external id the provider no longer reports.
    pub removed: Vec<SecurityGroupData>,
    pub common_local: Vec<SecurityGroupData>,
    pub common_remote: Vec<RemoteSecurityGroup>,
    /// Provider groups with no local counterpart.
    pub added: Vec<RemoteSecurityGroup>,
}

/// Partition `local` against `remote`.
///
/// Local groups without an external id are purely local and take no part.
/// An external id held by two local groups, or listed twice by the
/// provider, fails the whole comparison.
pub fn compare_sets(
    local: &[SecurityGroupData],
    remote: &[RemoteSecurityGroup],
) -> Result<Partition> {
    let mut by_external_id: HashMap<&str, &SecurityGroupData> = HashMap::new();
    for sg in local {
        let Some(ext) = sg.external_id.as_deref() else {
            continue;
        };
        if let Some(existing) = by_external_id.insert(ext, sg) {
            return Err(SecGroupError::IdentityConflict {
                external_id: ext.to_string(),
                detail: format!("claimed by local groups {} and {}", existing.id, sg.id),
            });
        }
    }

    let mut partition = Partition::default();
    let mut seen: HashSet<&str> = HashSet::with_capacity(remote.len());

    for r in remote {
        if !seen.insert(r.global_id.as_str()) {
            return Err(SecGroupError::IdentityConflict {
                external_id: r.global_id.clone(),
                detail: "listed more than once by the provider".to_string(),
            });
        }

        match by_external_id.get(r.global_id.as_str()) {
            Some(sg) => {
                partition.common_local.push((*sg).clone());
                partition.common_remote.push(r.clone());
            }
            None => partition.added.push(r.clone()),
        }
    }

    partition.removed = local
        .iter()
        .filter(|sg| {
            sg.external_id
                .as_deref()
                .is_some_and(|ext| !seen.contains(ext))
        })
        .cloned()
        .collect();

    Ok(partition)
}
