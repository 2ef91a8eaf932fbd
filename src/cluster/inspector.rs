//! `kube`-backed [`ClusterInspector`].

use super::{ClusterInspector, Condition, ObjectRef};
use crate::constants::{ESO_API_GROUP, ESO_API_VERSION};
use crate::error::{Error, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{ApiResource, ListParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::core::{DynamicObject, GroupVersionKind};
use kube::{Api, Client, Config};
use std::path::Path;
use tracing::debug;

/// Build a client from an explicit kubeconfig and/or context, or the usual inference
///
/// # Errors
/// `Error::ClusterRead` if the kubeconfig cannot be loaded.
pub async fn kube_client(kubeconfig: Option<&Path>, context: Option<&str>) -> Result<Client> {
    let options = KubeConfigOptions {
        context: context.map(ToString::to_string),
        ..KubeConfigOptions::default()
    };

    let config = match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path)
                .map_err(|e| Error::cluster_read(format!("read kubeconfig {}", path.display()), e))?;
            Config::from_custom_kubeconfig(kubeconfig, &options)
                .await
                .map_err(|e| Error::cluster_read("load kubeconfig", e))?
        }
        None if context.is_some() => Config::from_kubeconfig(&options)
            .await
            .map_err(|e| Error::cluster_read("load kubeconfig", e))?,
        None => Config::infer()
            .await
            .map_err(|e| Error::cluster_read("infer cluster config", e))?,
    };

    Client::try_from(config).map_err(|e| Error::cluster_read("create client", e))
}

fn external_secret_resource() -> ApiResource {
    let gvk = GroupVersionKind {
        group: ESO_API_GROUP.to_string(),
        version: ESO_API_VERSION.to_string(),
        kind: "ExternalSecret".to_string(),
    };
    ApiResource::from_gvk(&gvk)
}

#[derive(Clone)]
pub struct KubeInspector {
    client: Client,
    resource: ApiResource,
}

impl std::fmt::Debug for KubeInspector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeInspector")
            .field("resource", &self.resource.plural)
            .finish_non_exhaustive()
    }
}

impl KubeInspector {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            client,
            resource: external_secret_resource(),
        }
    }
}

#[async_trait]
impl ClusterInspector for KubeInspector {
    async fn list_external_secrets(&self) -> Result<Vec<ObjectRef>> {
        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &self.resource);
        let list = api
            .list(&ListParams::default())
            .await
            .map_err(|e| Error::cluster_read("list ExternalSecrets", e))?;

        Ok(list
            .items
            .into_iter()
            .filter_map(|item| {
                Some(ObjectRef {
                    namespace: item.metadata.namespace?,
                    name: item.metadata.name?,
                })
            })
            .collect())
    }

    async fn external_secret_conditions(&self, object: &ObjectRef) -> Result<Option<Vec<Condition>>> {
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), &object.namespace, &self.resource);
        let Some(item) = api.get_opt(&object.name).await.map_err(|e| {
            Error::cluster_read(
                format!("get ExternalSecret {}/{}", object.namespace, object.name),
                e,
            )
        })?
        else {
            return Ok(None);
        };

        let conditions = item
            .data
            .pointer("/status/conditions")
            .cloned()
            .map(serde_json::from_value::<Vec<Condition>>)
            .transpose()
            .unwrap_or_else(|e| {
                debug!(name = %object.name, "Unreadable conditions: {e}");
                None
            })
            .unwrap_or_default();
        Ok(Some(conditions))
    }

    async fn secret_exists(&self, object: &ObjectRef) -> Result<bool> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), &object.namespace);
        api.get_metadata_opt(&object.name)
            .await
            .map(|m| m.is_some())
            .map_err(|e| {
                Error::cluster_read(format!("get Secret {}/{}", object.namespace, object.name), e)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_external_secret_resource() {
        let resource = external_secret_resource();
        assert_eq!(resource.group, "external-secrets.io");
        assert_eq!(resource.version, "v1beta1");
        assert_eq!(resource.plural, "externalsecrets");
        assert_eq!(resource.api_version, "external-secrets.io/v1beta1");
    }
}
