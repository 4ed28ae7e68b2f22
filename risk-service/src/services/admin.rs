//! Identity administration: the user-CRUD collaborator's create and delete,
//! plus the startup bootstrap of the first Superadmin.

use std::sync::Arc;
use uuid::Uuid;

use crate::config::BootstrapAdmin;
use crate::models::capability::USER_MANAGE;
use crate::models::{CapabilitySet, Identity, Role};
use crate::services::{PermissionGate, ServiceError, Store};
use crate::utils::{hash_password, Password};

/// Fields for a new identity.
#[derive(Debug, Clone)]
pub struct NewIdentity {
    pub username: String,
    pub email: String,
    pub password: Password,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Role,
    pub capabilities: CapabilitySet,
}

#[derive(Clone)]
pub struct AdminService {
    store: Arc<dyn Store>,
}

impl AdminService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    #[tracing::instrument(skip(self, actor, new), fields(actor = %actor.identity_id))]
    pub async fn create_identity(
        &self,
        actor: &Identity,
        new: NewIdentity,
    ) -> Result<Identity, ServiceError> {
        PermissionGate::check(actor, USER_MANAGE)?;

        // Only a Superadmin may mint another one
        if new.role == Role::Superadmin && !PermissionGate::is_superuser(actor) {
            return Err(ServiceError::Forbidden(Role::Superadmin.as_str().to_string()));
        }
        PermissionGate::check_delegation(actor, &new.capabilities)?;

        let identity = self.insert(new).await?;
        tracing::info!(identity_id = %identity.identity_id, "Identity created");
        Ok(identity)
    }

    #[tracing::instrument(skip(self, actor), fields(actor = %actor.identity_id))]
    pub async fn delete_identity(
        &self,
        actor: &Identity,
        identity_id: Uuid,
    ) -> Result<(), ServiceError> {
        PermissionGate::check(actor, USER_MANAGE)?;

        if actor.identity_id == identity_id {
            return Err(ServiceError::Validation(
                "You cannot delete your own account".to_string(),
            ));
        }

        if !self.store.delete_identity(identity_id).await? {
            return Err(ServiceError::NotFound("User".to_string()));
        }

        tracing::info!(identity_id = %identity_id, "Identity deleted");
        Ok(())
    }

    /// Creates the configured Superadmin unless that username already exists.
    /// Returns whether an identity was created.
    pub async fn bootstrap(&self, admin: &BootstrapAdmin) -> Result<bool, ServiceError> {
        if self
            .store
            .find_identity_by_username(&admin.username)
            .await?
            .is_some()
        {
            tracing::debug!(username = %admin.username, "Bootstrap admin already present");
            return Ok(false);
        }

        let identity = self
            .insert(NewIdentity {
                username: admin.username.clone(),
                email: admin.email.clone(),
                password: Password::new(admin.password.clone()),
                first_name: None,
                last_name: None,
                role: Role::Superadmin,
                capabilities: CapabilitySet::from_strings(["*"]),
            })
            .await?;

        tracing::info!(identity_id = %identity.identity_id, "Bootstrap admin created");
        Ok(true)
    }

    async fn insert(&self, new: NewIdentity) -> Result<Identity, ServiceError> {
        let username = new.username.trim().to_string();
        let email = new.email.trim().to_lowercase();
        if username.is_empty() || email.is_empty() {
            return Err(ServiceError::Validation(
                "username and email are required".to_string(),
            ));
        }

        let hash = hash_password(&new.password)?;

        let mut identity = Identity::new(
            username,
            email,
            hash.into_string(),
            new.role,
            &new.capabilities,
        );
        identity.first_name = new.first_name;
        identity.last_name = new.last_name;

        self.store.insert_identity(&identity).await?;
        Ok(identity)
    }
}
