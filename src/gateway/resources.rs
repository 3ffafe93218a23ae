//! Resource mutations.
//!
//! Every mutation persists first, then republishes the whole document.
//! The persisted change is never rolled back; a failed publish becomes the
//! `warning` on the returned [`Mutation`].

use std::sync::Arc;

use serde::Serialize;

use crate::gateway::error::{GatewayError, GatewayResult};
use crate::gateway::publisher::{PublishOutcome, Publisher};
use crate::model::{Clock, NewResource, Resource, ResourceId, ResourcePatch};
use crate::store::ResourceRegistry;

/// A persisted record plus an optional staleness warning.
#[derive(Debug, Clone, Serialize)]
pub struct Mutation<T> {
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl<T> Mutation<T> {
    pub fn clean(data: T) -> Self {
        Self {
            data,
            warning: None,
        }
    }

    pub fn published(data: T, outcome: &PublishOutcome) -> Self {
        Self {
            data,
            warning: outcome.warning(),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Mutation<U> {
        Mutation {
            data: f(self.data),
            warning: self.warning,
        }
    }
}

pub struct ResourceManager {
    registry: Arc<dyn ResourceRegistry>,
    publisher: Arc<Publisher>,
    clock: Arc<dyn Clock>,
}

impl ResourceManager {
    pub fn new(
        registry: Arc<dyn ResourceRegistry>,
        publisher: Arc<Publisher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            publisher,
            clock,
        }
    }

    pub fn get(&self, id: ResourceId) -> GatewayResult<Resource> {
        self.registry.get(id).ok_or(GatewayError::NotFound {
            kind: "resource",
            id,
        })
    }

    pub fn get_by_slug(&self, slug: &str) -> Option<Resource> {
        self.registry.get_by_slug(slug)
    }

    pub fn list(&self, include_inactive: bool) -> Vec<Resource> {
        if include_inactive {
            self.registry.list_all()
        } else {
            self.registry.list_active()
        }
    }

    pub async fn create(&self, new: NewResource) -> GatewayResult<Mutation<Resource>> {
        let new = new.normalized();
        new.validate()?;

        let resource = self.registry.create(new, self.clock.now())?;
        tracing::info!(resource_id = resource.id, slug = %resource.slug, "Resource created");
        Ok(self.republish(resource, "resource created").await)
    }

    pub async fn update(
        &self,
        id: ResourceId,
        patch: ResourcePatch,
    ) -> GatewayResult<Mutation<Resource>> {
        let patch = patch.normalized();
        patch.validate()?;

        let resource = self.registry.update(id, &patch, self.clock.now())?;
        tracing::info!(resource_id = id, slug = %resource.slug, "Resource updated");
        Ok(self.republish(resource, "resource updated").await)
    }

    /// Deactivate; the record stays and can be reactivated.
    pub async fn soft_delete(&self, id: ResourceId) -> GatewayResult<Mutation<Resource>> {
        let resource = self.registry.soft_delete(id, self.clock.now())?;
        tracing::info!(resource_id = id, slug = %resource.slug, "Resource deactivated");
        Ok(self.republish(resource, "resource deactivated").await)
    }

    pub async fn activate(&self, id: ResourceId) -> GatewayResult<Mutation<Resource>> {
        let resource = self
            .registry
            .update(id, &ResourcePatch::activate(), self.clock.now())?;
        tracing::info!(resource_id = id, slug = %resource.slug, "Resource activated");
        Ok(self.republish(resource, "resource activated").await)
    }

    pub async fn hard_delete(&self, id: ResourceId) -> GatewayResult<Mutation<Resource>> {
        let resource = self.registry.hard_delete(id)?;
        tracing::info!(resource_id = id, slug = %resource.slug, "Resource deleted");
        Ok(self.republish(resource, "resource deleted").await)
    }

    async fn republish(&self, resource: Resource, reason: &str) -> Mutation<Resource> {
        let outcome = self.publisher.publish(reason).await;
        Mutation::published(resource, &outcome)
    }
}
