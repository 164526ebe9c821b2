use converge_core::{ConfigProperties, ConfigPid, RegisteredResource};
use tracing::{debug, info};

use super::{Cycle, TaskResult};
use crate::context::ExecutionContext;
use crate::error::TaskError;

/// Property recording the URL a configuration was installed from.
pub const URL_PROPERTY: &str = "_converge_url";

/// Property recording the digest a configuration was installed from.
pub const DIGEST_PROPERTY: &str = "_converge_digest";

/// Creates or updates a configuration record.
#[derive(Debug, Clone)]
pub struct ConfigInstallTask {
    pub(crate) resource: RegisteredResource,
}

impl ConfigInstallTask {
    pub fn new(resource: RegisteredResource) -> Self {
        Self { resource }
    }

    pub fn resource(&self) -> &RegisteredResource {
        &self.resource
    }

    pub(crate) async fn execute(&mut self, ctx: &ExecutionContext) -> Result<TaskResult, TaskError> {
        let (pid, properties) = config_payload(&self.resource)?;

        let Some(admin) = ctx.config_admin() else {
            debug!(
                "Configuration service unavailable, deferring install of {}",
                pid
            );
            return Ok(TaskResult::retry(Cycle::Next));
        };

        let mut desired = properties.clone();
        desired.insert(URL_PROPERTY.to_string(), self.resource.url.clone().into());
        desired.insert(DIGEST_PROPERTY.to_string(), self.resource.digest.clone().into());

        match admin.get(pid).await? {
            Some(record) if record_matches(&record.properties, &self.resource) => {
                debug!("Configuration {} is up to date", pid);
                return Ok(TaskResult::no_action());
            }
            Some(_) => {
                admin.update(pid, desired).await?;
                info!("Updated configuration {} from {}", pid, self.resource.url);
            }
            None => {
                admin.create(pid, desired).await?;
                info!("Created configuration {} from {}", pid, self.resource.url);
            }
        }
        ctx.record_operation();
        Ok(TaskResult::success())
    }
}

/// Whether a stored record already holds the resource's data.
///
/// Records written by the installer are compared by digest, others by their
/// properties.
pub fn record_matches(stored: &ConfigProperties, resource: &RegisteredResource) -> bool {
    if let Some(digest) = stored.get(DIGEST_PROPERTY) {
        return digest.as_str() == Some(resource.digest.as_str());
    }
    let Some(properties) = resource.properties() else {
        return false;
    };
    let foreign: ConfigProperties = stored
        .iter()
        .filter(|(key, _)| key.as_str() != URL_PROPERTY)
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    &foreign == properties
}

pub(super) fn config_payload(
    resource: &RegisteredResource,
) -> Result<(&ConfigPid, &ConfigProperties), TaskError> {
    match (resource.config_pid(), resource.properties()) {
        (Some(pid), Some(properties)) => Ok((pid, properties)),
        _ => Err(TaskError::InvalidResource(resource.url.clone())),
    }
}
