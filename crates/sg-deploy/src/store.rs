use std::collections::HashMap;
use std::sync::RwLock;

use sg_types::{DeploymentId, SiteId};

use crate::error::{DeployError, DeployResult};
use crate::record::Deployment;

/// Storage capability for deployment records.
///
/// `update` is an atomic read-modify-write: the closure sees the current
/// record and its changes are stored only if it returns `Ok`, so two writers
/// can never interleave a status check with a status change.
pub trait DeploymentStore: Send + Sync {
    /// Insert a new record. Fails if the id is taken.
    fn insert(&self, deployment: &Deployment) -> DeployResult<()>;

    fn get(&self, id: &DeploymentId) -> DeployResult<Option<Deployment>>;

    /// Apply `f` to the stored record and return the updated record.
    fn update(
        &self,
        id: &DeploymentId,
        f: &mut dyn FnMut(&mut Deployment) -> DeployResult<()>,
    ) -> DeployResult<Deployment>;

    /// Deployments of a site, oldest first.
    fn list_by_site(&self, site_id: &SiteId) -> DeployResult<Vec<Deployment>>;

    /// Deployments whose build request never reached the stream, oldest first.
    fn list_unpublished(&self) -> DeployResult<Vec<Deployment>>;
}

/// HashMap-backed [`DeploymentStore`].
#[derive(Debug, Default)]
pub struct InMemoryDeploymentStore {
    records: RwLock<HashMap<DeploymentId, Deployment>>,
}

impl InMemoryDeploymentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn poisoned(e: impl std::fmt::Display) -> DeployError {
        DeployError::Unavailable(format!("lock poisoned: {e}"))
    }

    fn collect_sorted(&self, keep: impl Fn(&Deployment) -> bool) -> DeployResult<Vec<Deployment>> {
        let records = self.records.read().map_err(Self::poisoned)?;
        let mut out: Vec<Deployment> = records.values().filter(|d| keep(d)).cloned().collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(out)
    }
}

impl DeploymentStore for InMemoryDeploymentStore {
    fn insert(&self, deployment: &Deployment) -> DeployResult<()> {
        let mut records = self.records.write().map_err(Self::poisoned)?;
        if records.contains_key(&deployment.id) {
            return Err(DeployError::AlreadyExists(deployment.id));
        }
        records.insert(deployment.id, deployment.clone());
        Ok(())
    }

    fn get(&self, id: &DeploymentId) -> DeployResult<Option<Deployment>> {
        let records = self.records.read().map_err(Self::poisoned)?;
        Ok(records.get(id).cloned())
    }

    fn update(
        &self,
        id: &DeploymentId,
        f: &mut dyn FnMut(&mut Deployment) -> DeployResult<()>,
    ) -> DeployResult<Deployment> {
        let mut records = self.records.write().map_err(Self::poisoned)?;
        let current = records.get_mut(id).ok_or(DeployError::NotFound(*id))?;
        let mut draft = current.clone();
        f(&mut draft)?;
        *current = draft.clone();
        Ok(draft)
    }

    fn list_by_site(&self, site_id: &SiteId) -> DeployResult<Vec<Deployment>> {
        self.collect_sorted(|d| d.site_id == *site_id)
    }

    fn list_unpublished(&self) -> DeployResult<Vec<Deployment>> {
        self.collect_sorted(|d| !d.event_published)
    }
}
