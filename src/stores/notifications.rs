//! 通知ストア

use std::sync::Arc;

use crate::features::notifications::{Notification, NotificationForm, NotificationService};

/// 通知一覧と未読数のクライアントサイドキャッシュ
pub struct NotificationsStore {
    service: Arc<NotificationService>,
    notifications: Vec<Notification>,
    unread_count: usize,
    last_error: Option<String>,
}

impl NotificationsStore {
    pub fn new(service: Arc<NotificationService>) -> Self {
        Self {
            service,
            notifications: Vec::new(),
            unread_count: 0,
            last_error: None,
        }
    }

    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    pub fn unread_count(&self) -> usize {
        self.unread_count
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// ユーザーに見える通知を読み直す
    pub async fn refresh(&mut self, user_id: &str, limit: Option<usize>) -> bool {
        match self.service.user_notifications(user_id, limit).await {
            Ok(notifications) => {
                self.notifications = notifications;
                self.last_error = None;
                true
            }
            Err(e) => {
                self.last_error = Some(e.user_message());
                false
            }
        }
    }

    /// 未読数を読み直す（失敗時は0に回復するためエラーにならない）
    pub async fn refresh_unread(&mut self, user_id: &str) {
        self.unread_count = self.service.unread_count(user_id).await;
    }

    /// 通知を作成し、キャッシュの先頭に追加する（管理者向け）
    pub async fn create(&mut self, form: NotificationForm) -> bool {
        match self.service.create(form).await {
            Ok(notification) => {
                self.notifications.insert(0, notification);
                self.last_error = None;
                true
            }
            Err(e) => {
                self.last_error = Some(e.user_message());
                false
            }
        }
    }

    /// 通知を既読にし、キャッシュの既読マップを更新する
    pub async fn mark_read(&mut self, notification_id: &str, user_id: &str) -> bool {
        match self.service.mark_read(notification_id, user_id).await {
            Ok(_) => {
                if let Some(cached) = self
                    .notifications
                    .iter_mut()
                    .find(|n| n.id == notification_id)
                {
                    cached.mark_read_locally(user_id);
                }
                if self.unread_count > 0 {
                    self.unread_count -= 1;
                }
                self.last_error = None;
                true
            }
            Err(e) => {
                self.last_error = Some(e.user_message());
                false
            }
        }
    }

    /// 見える通知をすべて既読にする
    ///
    /// # 戻り値
    /// 全件成功した場合のみtrue（部分的な失敗はfalse）
    pub async fn mark_all_read(&mut self, user_id: &str) -> bool {
        match self.service.mark_all_read(user_id).await {
            Ok(outcome) => {
                if outcome.is_complete() {
                    for cached in self.notifications.iter_mut() {
                        cached.mark_read_locally(user_id);
                    }
                    self.unread_count = 0;
                } else {
                    // どの通知が失敗したか特定できないため、未読数は数え直す
                    self.unread_count = self.service.unread_count(user_id).await;
                }
                self.last_error = None;
                outcome.is_complete()
            }
            Err(e) => {
                self.last_error = Some(e.user_message());
                false
            }
        }
    }

    /// 通知を削除し、キャッシュからも取り除く（管理者向け）
    pub async fn delete(&mut self, notification_id: &str) -> bool {
        match self.service.delete(notification_id).await {
            Ok(()) => {
                self.notifications.retain(|n| n.id != notification_id);
                self.last_error = None;
                true
            }
            Err(e) => {
                self.last_error = Some(e.user_message());
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::shared::config::BackendConfig;

    fn store() -> NotificationsStore {
        let backend = Arc::new(MemoryBackend::new());
        let config = Arc::new(BackendConfig::in_memory());
        let service = Arc::new(NotificationService::new(backend, config));
        NotificationsStore::new(service)
    }

    fn form(target_users: Option<Vec<&str>>) -> NotificationForm {
        NotificationForm {
            title: "aviso".to_string(),
            content: "conteúdo".to_string(),
            priority: None,
            target_users: target_users.map(|t| t.iter().map(|s| s.to_string()).collect()),
            expires_at: None,
        }
    }

    #[tokio::test]
    async fn test_refresh_and_unread() {
        let mut store = store();
        store.create(form(None)).await;
        store.create(form(Some(vec!["u2"]))).await;

        assert!(store.refresh("u1", None).await);
        assert_eq!(store.notifications().len(), 1);

        store.refresh_unread("u1").await;
        assert_eq!(store.unread_count(), 1);
    }

    #[tokio::test]
    async fn test_mark_read_patches_cache() {
        let mut store = store();
        store.create(form(None)).await;
        store.refresh("u1", None).await;
        store.refresh_unread("u1").await;

        let id = store.notifications()[0].id.clone();
        assert!(store.mark_read(&id, "u1").await);
        assert!(!store.notifications()[0].is_unread_for("u1"));
        assert_eq!(store.unread_count(), 0);
    }

    #[tokio::test]
    async fn test_mark_all_read() {
        let mut store = store();
        store.create(form(None)).await;
        store.create(form(None)).await;
        store.refresh("u1", None).await;
        store.refresh_unread("u1").await;
        assert_eq!(store.unread_count(), 2);

        assert!(store.mark_all_read("u1").await);
        assert_eq!(store.unread_count(), 0);
        assert!(store
            .notifications()
            .iter()
            .all(|n| !n.is_unread_for("u1")));
    }

    #[tokio::test]
    async fn test_mark_all_read_partial_failure_keeps_unread() {
        let backend = Arc::new(MemoryBackend::new());
        let config = Arc::new(BackendConfig::in_memory());
        let service = Arc::new(NotificationService::new(backend.clone(), config));
        let mut store = NotificationsStore::new(service);

        store.create(form(None)).await;
        store.create(form(None)).await;
        store.refresh("u1", None).await;
        store.refresh_unread("u1").await;
        assert_eq!(store.unread_count(), 2);

        let failing = store.notifications()[0].id.clone();
        backend.fail_updates_for(&failing);

        assert!(!store.mark_all_read("u1").await);
        // 失敗した1件は未読のまま数え直される
        assert_eq!(store.unread_count(), 1);
    }
}
