use crate::models::{CapabilitySet, Grant, Identity, Role};
use crate::services::ServiceError;

/// Capability check guarding every gated operation.
pub struct PermissionGate;

impl PermissionGate {
    pub fn is_superuser(identity: &Identity) -> bool {
        identity.role() == Role::Superadmin
    }

    pub fn allows(identity: &Identity, capability: &str) -> bool {
        Self::is_superuser(identity) || identity.capabilities().allows(capability)
    }

    pub fn check(identity: &Identity, capability: &str) -> Result<(), ServiceError> {
        if Self::allows(identity, capability) {
            return Ok(());
        }
        tracing::warn!(
            identity_id = %identity.identity_id,
            required = %capability,
            "Capability check failed"
        );
        Err(ServiceError::Forbidden(capability.to_string()))
    }

    /// Fails unless `actor` may hand out every grant in `grants`: named
    /// grants the actor holds itself, the universal grant only from a
    /// superuser.
    pub fn check_delegation(actor: &Identity, grants: &CapabilitySet) -> Result<(), ServiceError> {
        if Self::is_superuser(actor) {
            return Ok(());
        }

        let held = actor.capabilities();
        for grant in grants.iter() {
            let permitted = match grant {
                Grant::Universal => false,
                Grant::Named(name) => held.allows(name),
            };
            if !permitted {
                tracing::warn!(
                    identity_id = %actor.identity_id,
                    grant = %grant.as_str(),
                    "Attempt to delegate a capability not held"
                );
                return Err(ServiceError::Forbidden(grant.as_str().to_string()));
            }
        }
        Ok(())
    }
}
