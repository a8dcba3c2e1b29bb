//! 🏗️ Index Manager — tear it down, build it back up.
//!
//! 🎬 *[an index sits in the cluster. it has a mapping from 2017. it has documents
//! from a Kibana that no longer exists. it has seen things.]*
//!
//! We don't migrate schemas. We don't diff mappings. Every cycle the target index is
//! either created fresh or deleted and created fresh. It costs a few writes and buys us
//! the guarantee that nothing stale survives from an older mapping.
//!
//! | `index_exists` | calls made                       |
//! |----------------|----------------------------------|
//! | `true`         | `delete_index`, `create_index`   |
//! | `false`        | `create_index`                   |
//! | `Err`          | none, the cycle is over          |
//!
//! `acknowledged: false` is a warning, not a failure. Only transport/protocol errors end
//! the cycle. A failed delete has no plan B. 🦆

use tracing::{error, info, warn};

use crate::backends::SearchEngine;
use crate::errors::SidecarError;
use crate::mapping::IndexMapping;

/// 📋 What `ensure_index` ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexAction {
    /// It existed, so it was deleted and created again.
    Recreated,
    /// It did not exist, so it was created.
    Created,
}

/// 🚀 Make `index_name` exist, empty, with exactly `mapping`.
pub async fn ensure_index<E: SearchEngine + ?Sized>(
    handle: &E,
    index_name: &str,
    mapping: &IndexMapping,
) -> Result<IndexAction, SidecarError> {
    let exists = handle.index_exists(index_name).await.map_err(|err| {
        error!("💀 Could not determine whether index '{index_name}' exists, skipping this cycle: {err}");
        SidecarError::index_state(format!(
            "could not determine whether index '{index_name}' exists: {err}"
        ))
    })?;

    let action = if exists {
        info!("🗑️ Index '{index_name}' already exists, deleting it before recreating");
        let acknowledged = handle.delete_index(index_name).await.map_err(|err| {
            error!("💀 Could not delete index '{index_name}' that was already there: {err}");
            SidecarError::index_state(format!("could not delete index '{index_name}': {err}"))
        })?;
        if !acknowledged {
            warn!("⚠️ Deletion of index '{index_name}' was not acknowledged. Keeping fingers crossed.");
        }
        IndexAction::Recreated
    } else {
        IndexAction::Created
    };

    info!("🏗️ Creating index '{index_name}'");
    let acknowledged = handle
        .create_index(index_name, mapping.as_str())
        .await
        .map_err(|err| {
            error!("💀 Could not create index '{index_name}': {err}");
            SidecarError::index_state(format!("could not create index '{index_name}': {err}"))
        })?;
    if !acknowledged {
        warn!("⚠️ Creation of index '{index_name}' was not acknowledged. Let's see...");
    }

    Ok(action)
}
