use kube::{
    Api, Client,
    api::{Patch, PatchParams, Resource},
    core::NamespaceResourceScope,
};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::json;
use std::{clone::Clone, fmt::Debug};

use super::Error;
use crate::kinds::Benchmark;
use crate::settings::Settings;

pub trait Object<S> {
    /// Returns a mutable reference to the status object, initializing
    /// it with the default value if it does not exist.
    fn mut_status(&mut self) -> &mut S;
}

/// Applies the benchmark's status through the status subresource using
/// server-side apply.
///
/// The observed resource version is included so that a concurrent write
/// surfaces as a 409 rather than being silently clobbered.
pub async fn apply_status<B: Benchmark>(
    client: &Client,
    settings: &Settings,
    benchmark: &B,
) -> Result<B, Error> {
    let name = benchmark
        .meta()
        .name
        .as_deref()
        .ok_or_else(|| Error::UserInput("benchmark is missing metadata.name".to_string()))?;
    let namespace = benchmark
        .meta()
        .namespace
        .as_deref()
        .ok_or_else(|| Error::UserInput("benchmark is missing metadata.namespace".to_string()))?;
    let status = benchmark.status().cloned().unwrap_or_default();
    let patch = json!({
        "apiVersion": B::api_version(&()),
        "kind": B::kind(&()),
        "metadata": {
            "name": name,
            "resourceVersion": benchmark.meta().resource_version,
        },
        "status": serde_json::to_value(&status)?,
    });
    let api: Api<B> = Api::namespaced(client.clone(), namespace);
    let applied = api
        .patch_status(
            name,
            &PatchParams::apply(&settings.field_manager),
            &Patch::Apply(patch),
        )
        .await?;
    Ok(applied)
}

/// Patch the resource's status object with the provided function.
/// The function is passed a mutable reference to the status object,
/// which is to be mutated in-place. Move closures are supported.
pub async fn patch_status<S, T>(
    client: Client,
    field_manager: &str,
    instance: &T,
    f: impl FnOnce(&mut S),
) -> Result<T, kube::Error>
where
    <T as Resource>::DynamicType: Default,
    T: Clone
        + Resource
        + Object<S>
        + Serialize
        + DeserializeOwned
        + Debug
        + Resource<Scope = NamespaceResourceScope>,
{
    let patch = Patch::Json::<T>({
        let mut modified = instance.clone();
        let status = modified.mut_status();
        f(status);
        json_patch::diff(
            &serde_json::to_value(instance).unwrap(),
            &serde_json::to_value(&modified).unwrap(),
        )
    });
    let name = instance.meta().name.as_deref().unwrap();
    let namespace = instance.meta().namespace.as_deref().unwrap();
    let api: Api<T> = Api::namespaced(client, namespace);
    api.patch_status(name, &PatchParams::apply(field_manager), &patch)
        .await
}
