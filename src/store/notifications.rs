use super::{new_row_id, sql, Store, StoreError};
use crate::shared::TenantId;
use rusqlite::params;
use serde::Serialize;
use serde_json::Value;

/// User-facing alert raised for a failed outcome. Consumed by a surface
/// outside this crate.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureNotification {
    pub notification_id: String,
    pub tenant_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub message: String,
    pub data: Value,
    pub read: bool,
    pub created_at: String,
}

impl Store {
    pub fn insert_notification(
        &self,
        mut notification: FailureNotification,
    ) -> Result<FailureNotification, StoreError> {
        if notification.notification_id.is_empty() {
            notification.notification_id = new_row_id()?;
        }
        let data = serde_json::to_string(&notification.data)
            .map_err(|source| StoreError::Encode { source })?;

        let connection = self.connect()?;
        connection
            .execute(
                "INSERT INTO notifications (
                    notification_id, tenant_id, kind, title, message, data, read, created_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    notification.notification_id,
                    notification.tenant_id,
                    notification.kind,
                    notification.title,
                    notification.message,
                    data,
                    i64::from(notification.read),
                    notification.created_at,
                ],
            )
            .map_err(sql)?;
        Ok(notification)
    }

    pub fn list_notifications(
        &self,
        tenant_id: &TenantId,
        unread_only: bool,
    ) -> Result<Vec<FailureNotification>, StoreError> {
        let connection = self.connect()?;
        let mut statement = connection
            .prepare(
                "SELECT notification_id, tenant_id, kind, title, message, data, read, created_at
                 FROM notifications
                 WHERE tenant_id = ?1 AND (?2 = 0 OR read = 0)
                 ORDER BY rowid ASC",
            )
            .map_err(sql)?;
        let rows = statement
            .query_map(params![tenant_id.as_str(), i64::from(unread_only)], |row| {
                Ok((
                    FailureNotification {
                        notification_id: row.get(0)?,
                        tenant_id: row.get(1)?,
                        kind: row.get(2)?,
                        title: row.get(3)?,
                        message: row.get(4)?,
                        data: Value::Null,
                        read: row.get::<_, i64>(6)? != 0,
                        created_at: row.get(7)?,
                    },
                    row.get::<_, String>(5)?,
                ))
            })
            .map_err(sql)?;

        let mut out = Vec::new();
        for row in rows {
            let (mut notification, data_raw) = row.map_err(sql)?;
            notification.data =
                serde_json::from_str(&data_raw).map_err(|_| StoreError::InvalidValue {
                    column: "notifications.data",
                    value: data_raw.clone(),
                })?;
            out.push(notification);
        }
        Ok(out)
    }

    pub fn mark_notification_read(
        &self,
        tenant_id: &TenantId,
        notification_id: &str,
    ) -> Result<bool, StoreError> {
        let connection = self.connect()?;
        let changed = connection
            .execute(
                "UPDATE notifications SET read = 1
                 WHERE tenant_id = ?1 AND notification_id = ?2",
                params![tenant_id.as_str(), notification_id],
            )
            .map_err(sql)?;
        Ok(changed > 0)
    }
}
