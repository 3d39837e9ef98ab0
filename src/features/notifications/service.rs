//! 通知サービス
//!
//! クエリ層は「リストが値を含む」を表現できないため、宛先指定の通知は
//! 広めに取得してクライアント側で絞り込む2段階読み取りになる。

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use log::{info, warn};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::models::{Notification, NotificationForm, Priority};
use crate::backend::{BackendClient, Query};
use crate::features::expenses::{ExpenseCategory, ExpenseStatus};
use crate::shared::config::BackendConfig;
use crate::shared::errors::{AppError, AppResult};
use crate::shared::outcome::BatchOutcome;
use crate::shared::utils::format_eur;

/// 宛先絞り込み前の過剰取得倍率
///
/// クライアント側フィルタで件数が目減りする分を補う経験則で、
/// 要求件数を必ず満たす保証はない。
pub const TARGET_OVER_FETCH: usize = 2;

pub struct NotificationService {
    backend: Arc<dyn BackendClient>,
    config: Arc<BackendConfig>,
}

impl NotificationService {
    pub fn new(backend: Arc<dyn BackendClient>, config: Arc<BackendConfig>) -> Self {
        Self { backend, config }
    }

    fn collection(&self) -> &str {
        &self.config.collections.notifications
    }

    /// 通知を作成する
    ///
    /// 宛先リストはJSONエンコードして保存し、既読マップは空で初期化する。
    pub async fn create(&self, form: NotificationForm) -> AppResult<Notification> {
        if form.title.trim().is_empty() {
            return Err(AppError::invalid_input("タイトルを入力してください"));
        }

        let mut data = Map::new();
        data.insert("title".to_string(), Value::String(form.title));
        data.insert("content".to_string(), Value::String(form.content));
        data.insert(
            "priority".to_string(),
            Value::String(
                form.priority
                    .unwrap_or(Priority::Medium)
                    .as_str()
                    .to_string(),
            ),
        );
        data.insert(
            "targetUsers".to_string(),
            match form.target_users {
                Some(targets) => Value::String(serde_json::to_string(&targets).map_err(|e| {
                    AppError::unexpected(format!("宛先リストのエンコードに失敗しました: {e}"))
                })?),
                None => Value::Null,
            },
        );
        data.insert("readBy".to_string(), Value::String("{}".to_string()));
        data.insert("date".to_string(), Value::String(Utc::now().to_rfc3339()));
        data.insert(
            "expiresAt".to_string(),
            form.expires_at
                .map(|t| Value::String(t.to_rfc3339()))
                .unwrap_or(Value::Null),
        );

        let document = self
            .backend
            .create_document(self.collection(), &Uuid::new_v4().to_string(), data)
            .await?;
        info!("通知を作成しました: notification_id={}", document.id);
        Ok(document.deserialize()?)
    }

    /// ユーザーに見える通知を取得する
    ///
    /// 全ユーザー宛（宛先リストなし）を1クエリで取得し、別途
    /// `TARGET_OVER_FETCH` 倍の広いページを取得して宛先リストに
    /// 含まれるものをクライアント側で選別、和集合を日付降順に並べる。
    pub async fn user_notifications(
        &self,
        user_id: &str,
        limit: Option<usize>,
    ) -> AppResult<Vec<Notification>> {
        let mut global = vec![Query::is_null("targetUsers"), Query::order_desc("date")];
        let mut all = vec![Query::order_desc("date")];
        if let Some(limit) = limit {
            global.push(Query::limit(limit));
            all.push(Query::limit(limit * TARGET_OVER_FETCH));
        }

        let collection = self.collection();
        let (global, all) = tokio::try_join!(
            self.backend.list_documents(collection, &global),
            self.backend.list_documents(collection, &all),
        )?;

        let mut notifications: Vec<Notification> = global
            .documents
            .iter()
            .map(|d| d.deserialize().map_err(AppError::from))
            .collect::<AppResult<_>>()?;

        // 宛先指定分はクライアント側で選別する
        for document in &all.documents {
            let notification: Notification = document.deserialize()?;
            if !notification.is_global() && notification.is_visible_to(user_id) {
                notifications.push(notification);
            }
        }

        dedupe_by_date_desc(&mut notifications);
        if let Some(limit) = limit {
            notifications.truncate(limit);
        }
        Ok(notifications)
    }

    /// すべての通知を取得する（管理者向け）
    pub async fn all_notifications(&self, limit: Option<usize>) -> AppResult<Vec<Notification>> {
        let mut queries = vec![Query::order_desc("date")];
        if let Some(limit) = limit {
            queries.push(Query::limit(limit));
        }

        let list = self
            .backend
            .list_documents(self.collection(), &queries)
            .await?;
        list.documents
            .iter()
            .map(|d| d.deserialize().map_err(AppError::from))
            .collect()
    }

    /// 未読通知数を取得する
    ///
    /// ユーザーに見える通知を読み込み、既読マップに真値のエントリが
    /// ないものを数える。失敗時は0に回復する。
    pub async fn unread_count(&self, user_id: &str) -> usize {
        match self.user_notifications(user_id, None).await {
            Ok(notifications) => notifications
                .iter()
                .filter(|n| n.is_unread_for(user_id))
                .count(),
            Err(e) => {
                warn!("未読通知数を取得できませんでした: {e}");
                0
            }
        }
    }

    /// 通知を既読にする
    ///
    /// 既読マップの read-modify-write。同じ通知を同時に既読化すると
    /// 後勝ちで片方の更新が失われうる（低並行度の前提で許容している）。
    pub async fn mark_read(&self, notification_id: &str, user_id: &str) -> AppResult<Notification> {
        let document = self
            .backend
            .get_document(self.collection(), notification_id)
            .await?;
        let notification: Notification = document.deserialize()?;

        let mut state = notification.read_state();
        state.insert(user_id.to_string(), Value::Bool(true));
        let encoded = serde_json::to_string(&state).map_err(|e| {
            AppError::unexpected(format!("既読マップのエンコードに失敗しました: {e}"))
        })?;

        let mut data = Map::new();
        data.insert("readBy".to_string(), Value::String(encoded));

        let document = self
            .backend
            .update_document(self.collection(), notification_id, data)
            .await?;
        Ok(document.deserialize()?)
    }

    /// ユーザーに見える通知をすべて既読にする
    ///
    /// 未読のものにだけ更新を発行し、既読済みは成功として数える。
    /// 各更新は独立で、一部の失敗が残りを止めることはない。
    pub async fn mark_all_read(&self, user_id: &str) -> AppResult<BatchOutcome> {
        let notifications = self.user_notifications(user_id, None).await?;
        let total = notifications.len();

        let pending: Vec<&Notification> = notifications
            .iter()
            .filter(|n| n.is_unread_for(user_id))
            .collect();
        let updates = pending.iter().map(|n| self.mark_read(&n.id, user_id));
        let results = join_all(updates).await;

        let failed = results.iter().filter(|r| r.is_err()).count();
        for (notification, result) in pending.iter().zip(&results) {
            if let Err(e) = result {
                warn!(
                    "通知の既読化に失敗しました: notification_id={} error={e}",
                    notification.id
                );
            }
        }
        Ok(BatchOutcome::new(total - failed, total))
    }

    /// 優先度で通知を絞り込む
    ///
    /// `user_id` を指定すると、全ユーザー宛と宛先リストに含まれるものだけ
    /// をクライアント側で選別する。
    pub async fn by_priority(
        &self,
        priority: Priority,
        user_id: Option<&str>,
        limit: Option<usize>,
    ) -> AppResult<Vec<Notification>> {
        let mut queries = vec![
            Query::equal("priority", priority.as_str()),
            Query::order_desc("date"),
        ];
        if let Some(limit) = limit {
            queries.push(Query::limit(limit));
        }

        let list = self
            .backend
            .list_documents(self.collection(), &queries)
            .await?;
        let mut notifications: Vec<Notification> = list
            .documents
            .iter()
            .map(|d| d.deserialize().map_err(AppError::from))
            .collect::<AppResult<_>>()?;

        if let Some(user_id) = user_id {
            notifications.retain(|n| n.is_visible_to(user_id));
        }
        Ok(notifications)
    }

    /// 通知を削除する
    pub async fn delete(&self, notification_id: &str) -> AppResult<()> {
        self.backend
            .delete_document(self.collection(), notification_id)
            .await?;
        info!("通知を削除しました: notification_id={notification_id}");
        Ok(())
    }

    /// 経費の審査結果を本人に通知する
    ///
    /// 文面を組み立てて `create` に委譲するだけのテンプレートヘルパー。
    /// 却下は高優先度になる。
    pub async fn send_expense_status_notification(
        &self,
        user_id: &str,
        status: ExpenseStatus,
        category: ExpenseCategory,
        amount: f64,
        rejection_reason: Option<&str>,
    ) -> AppResult<Notification> {
        let (title, content, priority) = match status {
            ExpenseStatus::Approved => (
                "経費が承認されました",
                format!(
                    "{}の経費（{}）が承認されました。",
                    category.label(),
                    format_eur(amount)
                ),
                Priority::Medium,
            ),
            ExpenseStatus::Rejected => (
                "経費が却下されました",
                match rejection_reason {
                    Some(reason) => format!(
                        "{}の経費（{}）が却下されました。理由: {}",
                        category.label(),
                        format_eur(amount),
                        reason
                    ),
                    None => format!(
                        "{}の経費（{}）が却下されました。",
                        category.label(),
                        format_eur(amount)
                    ),
                },
                Priority::High,
            ),
            ExpenseStatus::Pending => {
                return Err(AppError::invalid_input(
                    "審査前の経費に結果通知は送れません",
                ))
            }
        };

        self.create(NotificationForm {
            title: title.to_string(),
            content,
            priority: Some(priority),
            target_users: Some(vec![user_id.to_string()]),
            expires_at: None,
        })
        .await
    }

    /// 全体アナウンスを送信する
    pub async fn send_announcement(
        &self,
        title: &str,
        content: &str,
        priority: Option<Priority>,
    ) -> AppResult<Notification> {
        self.create(NotificationForm {
            title: title.to_string(),
            content: content.to_string(),
            priority,
            target_users: None,
            expires_at: None,
        })
        .await
    }
}

/// IDで重複排除（後勝ち）し、日付降順に整列する
fn dedupe_by_date_desc(notifications: &mut Vec<Notification>) {
    let mut unique: std::collections::HashMap<String, Notification> =
        std::collections::HashMap::new();
    for notification in notifications.drain(..) {
        unique.insert(notification.id.clone(), notification);
    }
    notifications.extend(unique.into_values());
    notifications.sort_by(|a, b| b.date.cmp(&a.date));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;

    fn service_with_backend() -> (NotificationService, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new());
        let config = Arc::new(BackendConfig::in_memory());
        let service = NotificationService::new(backend.clone(), config);
        (service, backend)
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
    async fn test_create_initializes_read_state() {
        let (service, _) = service_with_backend();

        let notification = service.create(form(None)).await.unwrap();
        assert!(notification.is_global());
        assert_eq!(notification.read_by.as_deref(), Some("{}"));
        assert_eq!(notification.priority, Priority::Medium);
        assert!(notification.is_unread_for("u1"));
    }

    #[tokio::test]
    async fn test_user_notifications_two_phase() {
        let (service, _) = service_with_backend();

        service.create(form(None)).await.unwrap();
        service.create(form(Some(vec!["u1"]))).await.unwrap();
        service.create(form(Some(vec!["u2"]))).await.unwrap();

        let visible = service.user_notifications("u1", None).await.unwrap();
        assert_eq!(visible.len(), 2);
        assert!(visible.iter().all(|n| n.is_visible_to("u1")));

        // 日付降順
        for pair in visible.windows(2) {
            assert!(pair[0].date >= pair[1].date);
        }
    }

    #[tokio::test]
    async fn test_user_notifications_limit_truncates_after_merge() {
        let (service, _) = service_with_backend();

        // 古い順に作成する
        let old_targeted = service.create(form(Some(vec!["u1"]))).await.unwrap();
        service.create(form(None)).await.unwrap();
        let newer_global = service.create(form(None)).await.unwrap();
        service.create(form(Some(vec!["u2"]))).await.unwrap();
        let newest_targeted = service.create(form(Some(vec!["u1"]))).await.unwrap();

        // 宛先指定分は limit * TARGET_OVER_FETCH 件の広いページから選別され、
        // 和集合はlimit件に切り詰められる
        let visible = service.user_notifications("u1", Some(2)).await.unwrap();
        assert_eq!(visible.len(), 2);
        assert_eq!(visible[0].id, newest_targeted.id);
        assert_eq!(visible[1].id, newer_global.id);
        assert!(visible.iter().all(|n| n.id != old_targeted.id));
    }

    #[tokio::test]
    async fn test_mark_read_is_independent_per_user() {
        let (service, _) = service_with_backend();
        let notification = service.create(form(None)).await.unwrap();

        let updated = service.mark_read(&notification.id, "u1").await.unwrap();
        assert!(!updated.is_unread_for("u1"));
        // 他ユーザーの未読状態は変わらない
        assert!(updated.is_unread_for("u2"));

        assert_eq!(service.unread_count("u1").await, 0);
        assert_eq!(service.unread_count("u2").await, 1);
    }

    #[tokio::test]
    async fn test_mark_all_read_counts_already_read() {
        let (service, _) = service_with_backend();
        let n1 = service.create(form(None)).await.unwrap();
        service.create(form(Some(vec!["u1"]))).await.unwrap();
        service.mark_read(&n1.id, "u1").await.unwrap();

        // 既読済みの1件も成功として数える
        let outcome = service.mark_all_read("u1").await.unwrap();
        assert_eq!(outcome.successful, 2);
        assert_eq!(outcome.total, 2);
        assert_eq!(service.unread_count("u1").await, 0);
    }

    #[tokio::test]
    async fn test_mark_all_read_partial_failure() {
        let (service, backend) = service_with_backend();
        service.create(form(None)).await.unwrap();
        let n2 = service.create(form(None)).await.unwrap();
        service.create(form(None)).await.unwrap();
        backend.fail_updates_for(&n2.id);

        let outcome = service.mark_all_read("u1").await.unwrap();
        assert_eq!(outcome.successful, 2);
        assert_eq!(outcome.total, 3);
    }

    #[tokio::test]
    async fn test_by_priority_with_membership_filter() {
        let (service, _) = service_with_backend();
        service
            .create(NotificationForm {
                priority: Some(Priority::High),
                ..form(None)
            })
            .await
            .unwrap();
        service
            .create(NotificationForm {
                priority: Some(Priority::High),
                ..form(Some(vec!["u2"]))
            })
            .await
            .unwrap();

        let all_high = service.by_priority(Priority::High, None, None).await.unwrap();
        assert_eq!(all_high.len(), 2);

        let u1_high = service
            .by_priority(Priority::High, Some("u1"), None)
            .await
            .unwrap();
        assert_eq!(u1_high.len(), 1);
        assert!(u1_high[0].is_global());
    }

    #[tokio::test]
    async fn test_expense_status_notification_templates() {
        let (service, _) = service_with_backend();

        let approved = service
            .send_expense_status_notification(
                "u1",
                ExpenseStatus::Approved,
                ExpenseCategory::Meal,
                12.5,
                None,
            )
            .await
            .unwrap();
        assert_eq!(approved.priority, Priority::Medium);
        assert!(approved.content.contains("€12.50"));
        assert!(approved.is_visible_to("u1"));
        assert!(!approved.is_visible_to("u2"));

        let rejected = service
            .send_expense_status_notification(
                "u1",
                ExpenseStatus::Rejected,
                ExpenseCategory::Hotel,
                80.0,
                Some("領収書がありません"),
            )
            .await
            .unwrap();
        assert_eq!(rejected.priority, Priority::High);
        assert!(rejected.content.contains("領収書がありません"));

        // 審査前の経費には送れない
        assert!(matches!(
            service
                .send_expense_status_notification(
                    "u1",
                    ExpenseStatus::Pending,
                    ExpenseCategory::Meal,
                    1.0,
                    None,
                )
                .await,
            Err(AppError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_announcement_is_global() {
        let (service, _) = service_with_backend();
        let announcement = service
            .send_announcement("manutenção", "sistema indisponível às 22h", None)
            .await
            .unwrap();
        assert!(announcement.is_global());
        assert!(announcement.is_visible_to("qualquer"));
    }
}
