//! メッセージストア

use std::sync::Arc;

use crate::features::messages::{Message, MessageForm, MessageService};
use crate::shared::outcome::BatchOutcome;

/// メッセージ一覧と未読数のクライアントサイドキャッシュ
pub struct MessagesStore {
    service: Arc<MessageService>,
    messages: Vec<Message>,
    unread_count: usize,
    last_error: Option<String>,
}

impl MessagesStore {
    pub fn new(service: Arc<MessageService>) -> Self {
        Self {
            service,
            messages: Vec::new(),
            unread_count: 0,
            last_error: None,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn unread_count(&self) -> usize {
        self.unread_count
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// ユーザーに見えるメッセージを読み直す
    pub async fn refresh(&mut self, user_id: &str, limit: Option<usize>) -> bool {
        match self.service.user_messages(user_id, limit).await {
            Ok(messages) => {
                self.messages = messages;
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

    /// メッセージを送信し、キャッシュの先頭に追加する
    pub async fn send(&mut self, sender_id: &str, form: MessageForm) -> bool {
        match self.service.send(sender_id, form).await {
            Ok(message) => {
                self.messages.insert(0, message);
                self.last_error = None;
                true
            }
            Err(e) => {
                self.last_error = Some(e.user_message());
                false
            }
        }
    }

    /// メッセージを既読にし、キャッシュのフラグを立てる
    pub async fn mark_read(&mut self, message_id: &str) -> bool {
        match self.service.mark_read(message_id).await {
            Ok(_) => {
                if let Some(cached) = self.messages.iter_mut().find(|m| m.id == message_id) {
                    cached.read = true;
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

    /// 複数メッセージを既読にする
    ///
    /// 部分的な失敗を許容し、集計を返す。キャッシュは成功扱いの分だけ
    /// 近似的にフラグを立てる。
    pub async fn mark_many_read(&mut self, message_ids: &[String]) -> BatchOutcome {
        let outcome = self.service.mark_many_read(message_ids).await;

        if outcome.successful > 0 {
            for cached in self
                .messages
                .iter_mut()
                .filter(|m| message_ids.contains(&m.id))
            {
                cached.read = true;
            }
            self.unread_count = self.unread_count.saturating_sub(outcome.successful);
        }
        outcome
    }

    /// メッセージを削除し、キャッシュからも取り除く
    pub async fn delete(&mut self, message_id: &str) -> bool {
        match self.service.delete(message_id).await {
            Ok(()) => {
                self.messages.retain(|m| m.id != message_id);
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

    fn store_with_backend() -> (MessagesStore, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new());
        let config = Arc::new(BackendConfig::in_memory());
        let service = Arc::new(MessageService::new(backend.clone(), config));
        (MessagesStore::new(service), backend)
    }

    fn form(receiver_id: Option<&str>, content: &str) -> MessageForm {
        MessageForm {
            receiver_id: receiver_id.map(String::from),
            content: content.to_string(),
            attachments: None,
        }
    }

    #[tokio::test]
    async fn test_send_prepends_to_cache() {
        let (mut store, _) = store_with_backend();

        assert!(store.send("a", form(Some("b"), "primeira")).await);
        assert!(store.send("a", form(Some("b"), "segunda")).await);
        assert_eq!(store.messages().len(), 2);
        assert_eq!(store.messages()[0].content, "segunda");
    }

    #[tokio::test]
    async fn test_mark_read_flips_cache_flag() {
        let (mut store, _) = store_with_backend();
        store.send("b", form(Some("a"), "olá")).await;
        store.refresh("a", None).await;
        store.refresh_unread("a").await;
        assert_eq!(store.unread_count(), 1);

        let id = store.messages()[0].id.clone();
        assert!(store.mark_read(&id).await);
        assert!(store.messages()[0].read);
        assert_eq!(store.unread_count(), 0);
    }

    #[tokio::test]
    async fn test_mark_many_read_partial() {
        let (mut store, backend) = store_with_backend();
        store.send("b", form(Some("a"), "um")).await;
        store.send("b", form(Some("a"), "dois")).await;
        store.refresh("a", None).await;

        let ids: Vec<String> = store.messages().iter().map(|m| m.id.clone()).collect();
        backend.fail_updates_for(&ids[0]);

        let outcome = store.mark_many_read(&ids).await;
        assert_eq!(outcome.successful, 1);
        assert_eq!(outcome.total, 2);
    }

    #[tokio::test]
    async fn test_delete_removes_from_cache() {
        let (mut store, _) = store_with_backend();
        store.send("a", form(None, "aviso")).await;
        let id = store.messages()[0].id.clone();

        assert!(store.delete(&id).await);
        assert!(store.messages().is_empty());
    }
}
