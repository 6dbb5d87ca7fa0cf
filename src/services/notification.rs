use std::sync::Arc;

use color_eyre::eyre::{Result, WrapErr};
use sea_orm::{
    ActiveModelBehavior, ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};

use crate::database::Database;
use crate::entities;
use crate::entities::notification::NotificationKind;
use crate::services::error::ServiceError;

/// One event to fan out, one notification row per affected user.
#[derive(Debug, Clone)]
pub struct NotificationEvent {
    pub kind: NotificationKind,
    pub actor_user_id: i64,
    pub affected_user_ids: Vec<i64>,
    pub payload: serde_json::Value,
}

pub struct NotificationService {
    db: Arc<Database>,
}

impl NotificationService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Deliver one notification per affected user, excluding the actor.
    ///
    /// Delivery is at-least-once and per-recipient: one failed insert is
    /// logged and skipped, the rest still go through. Duplicate events are
    /// not suppressed.
    pub async fn notify(&self, event: NotificationEvent) -> Result<Vec<entities::notification::Model>> {
        let payload =
            serde_json::to_string(&event.payload).wrap_err("Failed to serialize payload")?;

        let mut delivered = Vec::new();
        for recipient_id in event.affected_user_ids {
            if recipient_id == event.actor_user_id {
                continue;
            }

            let notification = entities::notification::ActiveModel {
                kind: Set(event.kind),
                sender_id: Set(event.actor_user_id),
                recipient_id: Set(recipient_id),
                payload: Set(payload.clone()),
                ..entities::notification::ActiveModel::new()
            };

            match notification.insert(&self.db.conn).await {
                Ok(model) => delivered.push(model),
                Err(error) => {
                    log::error!(
                        "Failed to persist notification for user {recipient_id}: {error}"
                    );
                }
            }
        }

        Ok(delivered)
    }

    /// All notifications for the user, newest first.
    pub async fn list_for_user(&self, user_id: i64) -> Result<Vec<entities::notification::Model>> {
        entities::notification::Entity::find()
            .filter(entities::notification::Column::RecipientId.eq(user_id))
            .order_by_desc(entities::notification::Column::CreatedAt)
            .order_by_desc(entities::notification::Column::Id)
            .all(&self.db.conn)
            .await
            .wrap_err("Failed to fetch notifications")
    }

    pub async fn mark_read(&self, user_id: i64, notification_id: i64) -> Result<()> {
        let notification = self.owned_by(user_id, notification_id).await?;

        let mut active: entities::notification::ActiveModel = notification.into();
        active.read = Set(true);
        active
            .update(&self.db.conn)
            .await
            .wrap_err("Failed to mark notification as read")?;
        Ok(())
    }

    pub async fn mark_all_read(&self, user_id: i64) -> Result<()> {
        let unread = entities::notification::Entity::find()
            .filter(entities::notification::Column::RecipientId.eq(user_id))
            .filter(entities::notification::Column::Read.eq(false))
            .all(&self.db.conn)
            .await
            .wrap_err("Failed to fetch unread notifications")?;

        for notification in unread {
            let mut active: entities::notification::ActiveModel = notification.into();
            active.read = Set(true);
            active
                .update(&self.db.conn)
                .await
                .wrap_err("Failed to mark notification as read")?;
        }
        Ok(())
    }

    pub async fn delete(&self, user_id: i64, notification_id: i64) -> Result<()> {
        let notification = self.owned_by(user_id, notification_id).await?;

        entities::notification::Entity::delete_by_id(notification.id)
            .exec(&self.db.conn)
            .await
            .wrap_err("Failed to delete notification")?;
        Ok(())
    }

    async fn owned_by(
        &self,
        user_id: i64,
        notification_id: i64,
    ) -> Result<entities::notification::Model> {
        let notification = entities::notification::Entity::find_by_id(notification_id)
            .one(&self.db.conn)
            .await
            .wrap_err("Failed to fetch notification")?
            .ok_or(ServiceError::not_found("Notification not found"))?;

        if notification.recipient_id != user_id {
            return Err(
                ServiceError::forbidden("You can only manage your own notifications").into(),
            );
        }
        Ok(notification)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{seed_user, test_db};

    #[tokio::test]
    async fn fan_out_excludes_the_actor() {
        let db = test_db().await;
        let sharer = seed_user(&db, "sharer").await;
        let friend_a = seed_user(&db, "friend_a").await;
        let friend_b = seed_user(&db, "friend_b").await;

        let service = NotificationService::new(db.clone());
        let delivered = service
            .notify(NotificationEvent {
                kind: NotificationKind::PlaylistShared,
                actor_user_id: sharer.id,
                affected_user_ids: vec![friend_a.id, friend_b.id, sharer.id],
                payload: serde_json::json!({ "playlistId": 1, "playlistName": "Mix" }),
            })
            .await
            .unwrap();

        assert_eq!(delivered.len(), 2);
        let recipients: Vec<i64> = delivered.iter().map(|n| n.recipient_id).collect();
        assert!(recipients.contains(&friend_a.id));
        assert!(recipients.contains(&friend_b.id));
        assert!(!recipients.contains(&sharer.id));
    }

    #[tokio::test]
    async fn same_event_twice_produces_two_notifications() {
        let db = test_db().await;
        let actor = seed_user(&db, "actor").await;
        let recipient = seed_user(&db, "recipient").await;

        let service = NotificationService::new(db.clone());
        let event = NotificationEvent {
            kind: NotificationKind::PlaylistUpdated,
            actor_user_id: actor.id,
            affected_user_ids: vec![recipient.id],
            payload: serde_json::json!({ "playlistId": 7 }),
        };
        service.notify(event.clone()).await.unwrap();
        service.notify(event).await.unwrap();

        let listed = service.list_for_user(recipient.id).await.unwrap();
        assert_eq!(listed.len(), 2);
    }

    #[tokio::test]
    async fn read_lifecycle_is_recipient_only() {
        let db = test_db().await;
        let actor = seed_user(&db, "actor").await;
        let recipient = seed_user(&db, "recipient").await;
        let outsider = seed_user(&db, "outsider").await;

        let service = NotificationService::new(db.clone());
        let delivered = service
            .notify(NotificationEvent {
                kind: NotificationKind::PlaylistExported,
                actor_user_id: actor.id,
                affected_user_ids: vec![recipient.id],
                payload: serde_json::json!({}),
            })
            .await
            .unwrap();
        let notification_id = delivered[0].id;

        let error = service.mark_read(outsider.id, notification_id).await.unwrap_err();
        assert!(matches!(
            error.downcast_ref::<ServiceError>(),
            Some(ServiceError::Forbidden(_))
        ));

        service.mark_read(recipient.id, notification_id).await.unwrap();
        let listed = service.list_for_user(recipient.id).await.unwrap();
        assert!(listed[0].read);

        service.delete(recipient.id, notification_id).await.unwrap();
        assert!(service.list_for_user(recipient.id).await.unwrap().is_empty());
    }
}
