use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::auth::Role;
use crate::collaborators::UserDirectory;
use crate::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub role: Role,
    pub devices: Vec<String>,
    pub available: bool,
}

/// Process-local user registry holding roles, push tokens and driver availability.
#[derive(Default)]
pub struct InMemoryUserDirectory {
    users: DashMap<String, UserRecord>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, user_id: impl Into<String>, role: Role, devices: Vec<String>) {
        self.users.insert(
            user_id.into(),
            UserRecord {
                role,
                devices,
                available: true,
            },
        );
    }

    pub fn get(&self, user_id: &str) -> Option<UserRecord> {
        self.users.get(user_id).map(|entry| entry.value().clone())
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn get_user_devices(
        &self,
        user_ids: &[String],
        role: Role,
    ) -> Result<Vec<String>, AppError> {
        let devices = user_ids
            .iter()
            .filter_map(|id| self.users.get(id))
            .filter(|user| user.role == role)
            .filter(|user| role != Role::Driver || user.available)
            .flat_map(|user| user.devices.clone())
            .collect();

        Ok(devices)
    }

    async fn set_availability(&self, user_id: &str, available: bool) -> Result<(), AppError> {
        let mut user = self
            .users
            .get_mut(user_id)
            .ok_or_else(|| AppError::NotFound(format!("user {user_id} not found")))?;

        user.available = available;
        Ok(())
    }

    async fn register_device(
        &self,
        user_id: &str,
        role: Role,
        token: &str,
    ) -> Result<(), AppError> {
        if token.is_empty() {
            return Err(AppError::InvalidInput("device token is required".to_string()));
        }

        let mut user = self
            .users
            .entry(user_id.to_string())
            .or_insert_with(|| UserRecord {
                role,
                devices: Vec::new(),
                available: true,
            });
        if user.role != role {
            return Err(AppError::AccessDenied(format!(
                "user {user_id} is registered as {}",
                user.role
            )));
        }
        if !user.devices.iter().any(|device| device == token) {
            user.devices.push(token.to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn devices_are_filtered_by_role_and_availability() {
        let users = InMemoryUserDirectory::new();
        users.register("d1", Role::Driver, vec!["tok-d1".into()]);
        users.register("d2", Role::Driver, vec!["tok-d2a".into(), "tok-d2b".into()]);
        users.register("r1", Role::Rider, vec!["tok-r1".into()]);
        users.set_availability("d2", false).await.unwrap();

        let ids = vec!["d1".to_string(), "d2".to_string(), "r1".to_string()];
        let devices = users.get_user_devices(&ids, Role::Driver).await.unwrap();
        assert_eq!(devices, vec!["tok-d1".to_string()]);

        let riders = users.get_user_devices(&ids, Role::Rider).await.unwrap();
        assert_eq!(riders, vec!["tok-r1".to_string()]);
    }

    #[tokio::test]
    async fn registering_a_device_creates_the_user_once() {
        let users = InMemoryUserDirectory::new();
        users.register_device("d1", Role::Driver, "tok").await.unwrap();
        users.register_device("d1", Role::Driver, "tok").await.unwrap();
        assert_eq!(users.get("d1").unwrap().devices, vec!["tok".to_string()]);

        let err = users
            .register_device("d1", Role::Rider, "other")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AccessDenied(_)));
    }

    #[tokio::test]
    async fn availability_of_unknown_user_is_not_found() {
        let users = InMemoryUserDirectory::new();
        let err = users.set_availability("ghost", true).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
