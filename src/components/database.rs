//! Database credentials
//!
//! Ensures a `<name>-database` Secret holding connection details and a
//! generated password. The password is created once and reused on every later
//! pass.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use kube::ResourceExt;
use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::{info, instrument};

use super::conditions::{set_condition, CONDITION_TYPE_DATABASE_READY};
use super::resources::{apply_object, namespace_of, owner_reference, resource_name, standard_labels};
use crate::crd::{AppInstance, AppInstanceStatus, DatabaseStatus};
use crate::engine::{Component, ComponentResult, ReconcileContext, StatusModifier, WatchKind};
use crate::error::{Error, Result};
use crate::store::{ObjectKey, StoreExt};

const PASSWORD_LENGTH: usize = 32;
pub const PASSWORD_KEY: &str = "password";

pub struct Database;

fn generate_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(PASSWORD_LENGTH)
        .map(char::from)
        .collect()
}

fn build_secret(instance: &AppInstance, password: ByteString) -> Result<Secret> {
    let db = instance
        .spec
        .database
        .as_ref()
        .ok_or_else(|| Error::ValidationError("spec.database is not set".to_string()))?;

    let entry = |v: &str| ByteString(v.as_bytes().to_vec());
    let mut data = BTreeMap::new();
    data.insert("host".to_string(), entry(&db.host));
    data.insert("port".to_string(), entry(&db.port.to_string()));
    data.insert(
        "database".to_string(),
        entry(db.database_name.as_deref().unwrap_or_default()),
    );
    data.insert(
        "username".to_string(),
        entry(db.username.as_deref().unwrap_or_default()),
    );
    data.insert(PASSWORD_KEY.to_string(), password);

    Ok(Secret {
        metadata: ObjectMeta {
            name: Some(resource_name(instance, "database")),
            namespace: Some(namespace_of(instance)),
            labels: Some(standard_labels(instance)),
            owner_references: Some(vec![owner_reference(instance)]),
            ..Default::default()
        },
        type_: Some("Opaque".to_string()),
        data: Some(data),
        ..Default::default()
    })
}

#[async_trait]
impl Component<AppInstance> for Database {
    fn name(&self) -> &'static str {
        "database"
    }

    fn watch_types(&self) -> Vec<WatchKind> {
        vec![WatchKind::of::<Secret>()]
    }

    fn is_reconcilable(&self, ctx: &ReconcileContext<AppInstance>) -> bool {
        ctx.root().spec.database.is_some()
    }

    #[instrument(skip(self, ctx), fields(name = %ctx.name(), namespace = %ctx.namespace()))]
    async fn reconcile(
        &self,
        ctx: &mut ReconcileContext<AppInstance>,
    ) -> Result<ComponentResult<AppInstanceStatus>> {
        let instance = ctx.root();
        let secret_name = resource_name(instance, "database");
        let key = ObjectKey::namespaced(namespace_of(instance), &secret_name);

        let existing_password = match ctx.store().get_as::<Secret>(&key).await {
            Ok(secret) => secret
                .data
                .and_then(|mut data| data.remove(PASSWORD_KEY)),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e.into()),
        };
        let password = match existing_password {
            Some(password) => password,
            None => {
                info!("Generating database credentials for {}", instance.name_any());
                ByteString(generate_password().into_bytes())
            }
        };

        let secret = build_secret(instance, password)?;
        apply_object(ctx.store(), &secret).await?;

        let db = instance.spec.database.clone().unwrap_or_default();
        let database_status = DatabaseStatus {
            ready: true,
            secret_name,
            database_name: db.database_name.unwrap_or_default(),
            username: db.username.unwrap_or_default(),
        };
        let newly_ready = !ctx.status().is_some_and(|s| s.database_ready());
        let generation = instance.metadata.generation;
        let now = Utc::now().to_rfc3339();

        let modifier = StatusModifier::infallible("database-ready", move |s: &mut AppInstanceStatus| {
            s.database = Some(database_status.clone());
            set_condition(
                &mut s.conditions,
                CONDITION_TYPE_DATABASE_READY,
                true,
                "CredentialsProvisioned",
                "Database credentials are available",
                &now,
                generation,
            );
        });

        let result = ComponentResult::with_status(modifier);
        Ok(if newly_ready {
            ComponentResult {
                requeue: true,
                ..result
            }
        } else {
            result
        })
    }
}
