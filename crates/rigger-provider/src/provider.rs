use async_trait::async_trait;
use rigger_domain::{DbParameter, HealthCheck};

use crate::error::ProviderError;
use crate::model::*;

/// The resource APIs convergence is driven through.
///
/// Every describe call reads the provider's live state. Lookups that target a
/// single named resource return an error satisfying
/// [`ProviderError::is_not_found`] when it doesn't exist; callers decide from
/// that whether to create it.
#[async_trait]
pub trait Provider: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    // ── Security groups ───────────────────────────────────────────────────────

    async fn describe_security_group(&self, name: &str) -> Result<SecurityGroup, ProviderError>;

    async fn create_security_group(&self, name: &str, description: &str)
        -> Result<(), ProviderError>;

    async fn authorize_ingress(&self, group: &str, rule: &IngressRule) -> Result<(), ProviderError>;

    // ── Instances ─────────────────────────────────────────────────────────────

    async fn describe_instances(&self) -> Result<Vec<Instance>, ProviderError>;

    async fn run_instance(&self, req: &RunInstanceRequest) -> Result<Instance, ProviderError>;

    async fn terminate_instances(&self, instance_ids: &[String]) -> Result<(), ProviderError>;

    // ── Load balancers ────────────────────────────────────────────────────────

    async fn describe_load_balancers(&self) -> Result<Vec<LoadBalancer>, ProviderError>;

    /// Returns the DNS name assigned to the balancer.
    async fn create_load_balancer(
        &self,
        req: &CreateLoadBalancerRequest,
    ) -> Result<String, ProviderError>;

    async fn configure_health_check(
        &self,
        name: &str,
        check: &HealthCheck,
    ) -> Result<(), ProviderError>;

    /// Returns every instance id registered after the call.
    async fn register_instances(
        &self,
        name: &str,
        instance_ids: &[String],
    ) -> Result<Vec<String>, ProviderError>;

    async fn delete_load_balancer(&self, name: &str) -> Result<(), ProviderError>;

    async fn describe_instance_health(&self, name: &str)
        -> Result<Vec<InstanceHealth>, ProviderError>;

    // ── Databases ─────────────────────────────────────────────────────────────

    async fn describe_db_instances(&self) -> Result<Vec<DbInstance>, ProviderError>;

    async fn create_db_instance(
        &self,
        req: &CreateDbInstanceRequest,
    ) -> Result<DbInstance, ProviderError>;

    async fn delete_db_instance(
        &self,
        identifier: &str,
        final_snapshot: &str,
    ) -> Result<(), ProviderError>;

    async fn reboot_db_instance(&self, identifier: &str) -> Result<(), ProviderError>;

    async fn describe_db_parameter_group(&self, name: &str)
        -> Result<DbParameterGroup, ProviderError>;

    async fn create_db_parameter_group(
        &self,
        name: &str,
        family: &str,
        description: &str,
    ) -> Result<(), ProviderError>;

    /// Parameters set explicitly on the group (source `user`).
    async fn describe_db_parameters(&self, name: &str) -> Result<Vec<DbParameter>, ProviderError>;

    /// Applies at most [`MAX_PARAMETERS_PER_MODIFY`] parameters with the
    /// `pending-reboot` apply method.
    async fn modify_db_parameter_group(
        &self,
        name: &str,
        parameters: &[DbParameter],
    ) -> Result<(), ProviderError>;

    async fn describe_db_security_group(&self, name: &str)
        -> Result<DbSecurityGroup, ProviderError>;

    async fn create_db_security_group(&self, name: &str, description: &str)
        -> Result<(), ProviderError>;

    async fn authorize_db_security_group(
        &self,
        name: &str,
        ec2_group: &str,
        ec2_owner: &str,
    ) -> Result<(), ProviderError>;

    // ── Addresses ─────────────────────────────────────────────────────────────

    async fn describe_address(&self, public_ip: &str) -> Result<Address, ProviderError>;

    async fn associate_address(&self, public_ip: &str, instance_id: &str)
        -> Result<(), ProviderError>;

    async fn disassociate_address(&self, public_ip: &str) -> Result<(), ProviderError>;

    // ── Volumes ───────────────────────────────────────────────────────────────

    async fn describe_volume(&self, volume_id: &str) -> Result<Volume, ProviderError>;

    async fn attach_volume(
        &self,
        volume_id: &str,
        instance_id: &str,
        device: &str,
    ) -> Result<(), ProviderError>;

    async fn detach_volume(&self, volume_id: &str) -> Result<(), ProviderError>;
}

/// Private object storage for the assets bundle and node descriptors.
#[async_trait]
pub trait AssetStore: Send + Sync + 'static {
    /// Create the bucket if it doesn't exist. Returns true when it was created.
    async fn ensure_bucket(&self, bucket: &str) -> Result<bool, ProviderError>;

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), ProviderError>;

    /// A GET URL that works without credentials until `expires_secs` elapse.
    fn presigned_url(
        &self,
        bucket: &str,
        key: &str,
        expires_secs: u64,
    ) -> Result<String, ProviderError>;
}
