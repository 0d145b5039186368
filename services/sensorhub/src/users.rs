//! User accounts, permission management and role lookup

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::access::RoleResolver;
use crate::api::ApiClient;
use crate::session::Session;

/// A dashboard user as stored by the backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct User {
    pub user_id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: String,
    /// "false" when no cloud account exists, "pending" while requested,
    /// otherwise the identity id of the provisioned account
    pub aws_account_status: String,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAccount {
    pub user_id: String,
    pub role: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeleteAccount<'a> {
    user_id: &'a str,
    identity_id: &'a str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdatePermission<'a> {
    user_id: &'a str,
    user_role: &'a str,
    user_pool_id: &'a str,
    identity_id: &'a str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct RequestAccount<'a> {
    user_id: &'a str,
}

impl ApiClient {
    /// GET users/list
    pub async fn list_users(&self) -> crate::Result<Vec<User>> {
        let value = self.get_value("users/list", &[]).await?;
        // The permissions view tolerates a non-array body as "no users"
        if !value.is_array() {
            tracing::debug!("users/list returned a non-array body");
            return Ok(Vec::new());
        }
        Ok(serde_json::from_value(value)?)
    }

    /// GET users/get?userId=
    pub async fn get_user(&self, user_id: &str) -> crate::Result<Option<User>> {
        if user_id.is_empty() {
            return Ok(None);
        }
        let value = self.get_value("users/get", &[("userId", user_id)]).await?;
        if value.is_null() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(value)?))
    }

    /// POST users/account/create (approve a pending account)
    pub async fn create_account(&self, account: &NewAccount) -> crate::Result<Value> {
        tracing::debug!("Approving account for '{}'", account.user_id);
        self.post_json("users/account/create", account).await
    }

    /// POST users/account/delete (revoke cloud access)
    pub async fn delete_account(&self, user_id: &str, identity_id: &str) -> crate::Result<Value> {
        tracing::debug!("Revoking account for '{}'", user_id);
        self.post_json(
            "users/account/delete",
            &DeleteAccount {
                user_id,
                identity_id,
            },
        )
        .await
    }

    /// POST users/permission/update
    pub async fn update_permission(
        &self,
        user_id: &str,
        role: &str,
        identity_id: &str,
    ) -> crate::Result<Value> {
        let user_pool_id = self.config().identity.user_pool_id.as_str();
        if user_pool_id.is_empty() {
            return Err(crate::SensorhubError::Config(
                "identity.user_pool_id is required to change permissions".to_string(),
            ));
        }
        tracing::debug!("Setting role of '{}' to '{}'", user_id, role);
        self.post_json(
            "users/permission/update",
            &UpdatePermission {
                user_id,
                user_role: role,
                user_pool_id,
                identity_id,
            },
        )
        .await
    }

    /// POST users/account/request (a user asks for cloud access)
    pub async fn request_account(&self, user_id: &str) -> crate::Result<Value> {
        self.post_json("users/account/request", &RequestAccount { user_id })
            .await
    }
}

/// Case-insensitive search over the permissions table columns
pub fn filter_users<'a>(users: &'a [User], term: &str) -> Vec<&'a User> {
    let term = term.to_lowercase();
    users
        .iter()
        .filter(|user| {
            [
                &user.first_name,
                &user.last_name,
                &user.user_id,
                &user.role,
                &user.aws_account_status,
            ]
            .iter()
            .any(|field| field.to_lowercase().contains(&term))
        })
        .collect()
}

/// Resolves roles from the caller's own user record
#[derive(Debug, Clone)]
pub struct BackendRoleResolver {
    api: ApiClient,
}

impl BackendRoleResolver {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl RoleResolver for BackendRoleResolver {
    async fn resolve(&self, session: &Session) -> crate::Result<String> {
        let api = self.api.with_tokens(std::sync::Arc::new(session.clone()));
        let user = api.get_user(&session.user_id).await?.ok_or_else(|| {
            crate::SensorhubError::Auth(format!("no user record for '{}'", session.user_id))
        })?;
        Ok(user.role)
    }
}
