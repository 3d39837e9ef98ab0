//! メッセージサービス
//!
//! クエリプリミティブはフィールド横断のORやNULL-or-equalsを表現できない
//! ため、会話ビューは複数クエリの和集合から組み立てる。読み取り
//! ファンアウトは並行に発行して合流する。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use log::{info, warn};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::models::{Message, MessageForm};
use crate::backend::{BackendClient, Document, Query};
use crate::shared::config::BackendConfig;
use crate::shared::errors::{AppError, AppResult};
use crate::shared::outcome::BatchOutcome;

/// 最近の連絡先を抽出する際に走査する直近メッセージ数（片方向あたり）
pub const RECENT_CONTACT_WINDOW: usize = 50;

pub struct MessageService {
    backend: Arc<dyn BackendClient>,
    config: Arc<BackendConfig>,
}

impl MessageService {
    pub fn new(backend: Arc<dyn BackendClient>, config: Arc<BackendConfig>) -> Self {
        Self { backend, config }
    }

    fn collection(&self) -> &str {
        &self.config.collections.messages
    }

    /// メッセージを送信する
    ///
    /// # 引数
    /// * `sender_id` - 送信者のユーザーID
    /// * `form` - 送信フォーム（受信者なしでブロードキャスト）
    pub async fn send(&self, sender_id: &str, form: MessageForm) -> AppResult<Message> {
        if form.content.trim().is_empty() {
            return Err(AppError::invalid_input("本文を入力してください"));
        }

        let mut data = Map::new();
        data.insert("senderId".to_string(), Value::String(sender_id.to_string()));
        data.insert(
            "receiverId".to_string(),
            form.receiver_id.map(Value::String).unwrap_or(Value::Null),
        );
        data.insert("content".to_string(), Value::String(form.content));
        data.insert(
            "attachments".to_string(),
            match form.attachments {
                Some(names) => Value::String(serde_json::to_string(&names).map_err(|e| {
                    AppError::unexpected(format!("添付リストのエンコードに失敗しました: {e}"))
                })?),
                None => Value::Null,
            },
        );
        data.insert("read".to_string(), Value::Bool(false));
        data.insert(
            "timestamp".to_string(),
            Value::String(Utc::now().to_rfc3339()),
        );

        let document = self
            .backend
            .create_document(self.collection(), &Uuid::new_v4().to_string(), data)
            .await?;
        info!("メッセージを送信しました: message_id={}", document.id);
        Ok(document.deserialize()?)
    }

    /// ユーザーに見えるメッセージを取得する
    ///
    /// 送信分・受信分・ブロードキャストの3クエリを並行発行し、和集合を
    /// IDで重複排除（後勝ち）してタイムスタンプ降順に並べ直す。
    /// `limit` は各クエリに独立に適用され、和集合後の再切り詰めは行わない。
    pub async fn user_messages(
        &self,
        user_id: &str,
        limit: Option<usize>,
    ) -> AppResult<Vec<Message>> {
        let mut sent = vec![
            Query::equal("senderId", user_id),
            Query::order_desc("timestamp"),
        ];
        let mut received = vec![
            Query::equal("receiverId", user_id),
            Query::order_desc("timestamp"),
        ];
        let mut broadcast = vec![
            Query::is_null("receiverId"),
            Query::order_desc("timestamp"),
        ];
        if let Some(limit) = limit {
            sent.push(Query::limit(limit));
            received.push(Query::limit(limit));
            broadcast.push(Query::limit(limit));
        }

        let collection = self.collection();
        let (sent, received, broadcast) = tokio::try_join!(
            self.backend.list_documents(collection, &sent),
            self.backend.list_documents(collection, &received),
            self.backend.list_documents(collection, &broadcast),
        )?;

        let mut documents = sent.documents;
        documents.extend(received.documents);
        documents.extend(broadcast.documents);
        merge_messages(documents, None)
    }

    /// 2ユーザー間の会話を取得する
    ///
    /// 各方向を `ceil(limit/2)` 件ずつ独立に取得して合流する。一方向に
    /// 偏った会話では、もう一方の枠を使い切れず要求件数を下回ることがある
    /// （この半分割ポリシーは仕様として固定されている）。
    pub async fn conversation(
        &self,
        user_a: &str,
        user_b: &str,
        limit: Option<usize>,
    ) -> AppResult<Vec<Message>> {
        let half = limit.map(|n| n.div_ceil(2));

        let mut a_to_b = vec![
            Query::equal("senderId", user_a),
            Query::equal("receiverId", user_b),
            Query::order_desc("timestamp"),
        ];
        let mut b_to_a = vec![
            Query::equal("senderId", user_b),
            Query::equal("receiverId", user_a),
            Query::order_desc("timestamp"),
        ];
        if let Some(half) = half {
            a_to_b.push(Query::limit(half));
            b_to_a.push(Query::limit(half));
        }

        let collection = self.collection();
        let (forward, backward) = tokio::try_join!(
            self.backend.list_documents(collection, &a_to_b),
            self.backend.list_documents(collection, &b_to_a),
        )?;

        let mut documents = forward.documents;
        documents.extend(backward.documents);
        merge_messages(documents, limit)
    }

    /// すべてのメッセージを取得する（管理者向け）
    pub async fn all_messages(&self, limit: Option<usize>) -> AppResult<Vec<Message>> {
        let mut queries = vec![Query::order_desc("timestamp")];
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

    /// 未読メッセージ数を取得する
    ///
    /// 受信分とブロードキャストの未読件数（制限前のマッチ総数）の和。
    /// 失敗時は0に回復し、呼び出し側にエラーを見せない。
    pub async fn unread_count(&self, user_id: &str) -> usize {
        let received = [
            Query::equal("receiverId", user_id),
            Query::equal("read", false),
        ];
        let broadcast = [Query::is_null("receiverId"), Query::equal("read", false)];

        let collection = self.collection();
        let counts = tokio::try_join!(
            self.backend.list_documents(collection, &received),
            self.backend.list_documents(collection, &broadcast),
        );

        match counts {
            Ok((received, broadcast)) => received.total + broadcast.total,
            Err(e) => {
                warn!("未読メッセージ数を取得できませんでした: {e}");
                0
            }
        }
    }

    /// メッセージを既読にする
    pub async fn mark_read(&self, message_id: &str) -> AppResult<Message> {
        let mut data = Map::new();
        data.insert("read".to_string(), Value::Bool(true));

        let document = self
            .backend
            .update_document(self.collection(), message_id, data)
            .await?;
        Ok(document.deserialize()?)
    }

    /// 複数メッセージを既読にする
    ///
    /// 各更新は独立に発行され、一部が失敗しても残りは続行する。
    /// 結果は成功数と総数の集計で、全体としてのエラーにはならない。
    pub async fn mark_many_read(&self, message_ids: &[String]) -> BatchOutcome {
        let updates = message_ids.iter().map(|id| self.mark_read(id));
        let results = join_all(updates).await;

        let successful = results.iter().filter(|r| r.is_ok()).count();
        for (id, result) in message_ids.iter().zip(&results) {
            if let Err(e) = result {
                warn!("既読化に失敗しました: message_id={id} error={e}");
            }
        }
        BatchOutcome::new(successful, message_ids.len())
    }

    /// メッセージを削除する
    pub async fn delete(&self, message_id: &str) -> AppResult<()> {
        self.backend
            .delete_document(self.collection(), message_id)
            .await?;
        info!("メッセージを削除しました: message_id={message_id}");
        Ok(())
    }

    /// 最近やり取りした相手のIDを抽出する
    ///
    /// 送信・受信それぞれ直近 `RECENT_CONTACT_WINDOW` 件だけを走査する
    /// 近似で、網羅的ではない。
    pub async fn recent_contacts(&self, user_id: &str, limit: usize) -> AppResult<Vec<String>> {
        let sent = [
            Query::equal("senderId", user_id),
            Query::order_desc("timestamp"),
            Query::limit(RECENT_CONTACT_WINDOW),
        ];
        let received = [
            Query::equal("receiverId", user_id),
            Query::order_desc("timestamp"),
            Query::limit(RECENT_CONTACT_WINDOW),
        ];

        let collection = self.collection();
        let (sent, received) = tokio::try_join!(
            self.backend.list_documents(collection, &sent),
            self.backend.list_documents(collection, &received),
        )?;

        let mut seen = HashSet::new();
        let mut contacts = Vec::new();
        let documents = sent.documents.into_iter().chain(received.documents);
        for document in documents {
            let message: Message = document.deserialize()?;
            for party in [Some(message.sender_id), message.receiver_id]
                .into_iter()
                .flatten()
            {
                if party != user_id && seen.insert(party.clone()) {
                    contacts.push(party);
                }
            }
        }

        contacts.truncate(limit);
        Ok(contacts)
    }

    /// メッセージを全文検索する
    ///
    /// 送信分・受信分を `ceil(limit/2)` 件ずつ検索して合流する
    /// （ブロードキャストは対象外）。
    pub async fn search(
        &self,
        user_id: &str,
        text: &str,
        limit: Option<usize>,
    ) -> AppResult<Vec<Message>> {
        let half = limit.map(|n| n.div_ceil(2));

        let mut sent = vec![
            Query::equal("senderId", user_id),
            Query::search("content", text),
            Query::order_desc("timestamp"),
        ];
        let mut received = vec![
            Query::equal("receiverId", user_id),
            Query::search("content", text),
            Query::order_desc("timestamp"),
        ];
        if let Some(half) = half {
            sent.push(Query::limit(half));
            received.push(Query::limit(half));
        }

        let collection = self.collection();
        let (sent, received) = tokio::try_join!(
            self.backend.list_documents(collection, &sent),
            self.backend.list_documents(collection, &received),
        )?;

        let mut documents = sent.documents;
        documents.extend(received.documents);
        merge_messages(documents, limit)
    }
}

/// ドキュメントの和集合をメッセージの一覧に仕上げる
///
/// IDで重複排除（後勝ち）し、タイムスタンプ降順に整列する。
/// `limit` が与えられた場合のみ最後に切り詰める。
fn merge_messages(documents: Vec<Document>, limit: Option<usize>) -> AppResult<Vec<Message>> {
    let mut unique: HashMap<String, Message> = HashMap::new();
    for document in documents {
        let message: Message = document.deserialize()?;
        unique.insert(message.id.clone(), message);
    }

    let mut messages: Vec<Message> = unique.into_values().collect();
    messages.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    if let Some(limit) = limit {
        messages.truncate(limit);
    }
    Ok(messages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;

    fn service_with_backend() -> (MessageService, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new());
        let config = Arc::new(BackendConfig::in_memory());
        let service = MessageService::new(backend.clone(), config);
        (service, backend)
    }

    fn form(receiver_id: Option<&str>, content: &str) -> MessageForm {
        MessageForm {
            receiver_id: receiver_id.map(String::from),
            content: content.to_string(),
            attachments: None,
        }
    }

    #[tokio::test]
    async fn test_send_rejects_blank_content() {
        let (service, _) = service_with_backend();
        assert!(matches!(
            service.send("a", form(Some("b"), "   ")).await,
            Err(AppError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_user_messages_union() {
        let (service, _) = service_with_backend();

        // Aが2通送信、3通受信、ブロードキャスト1通
        service.send("a", form(Some("b"), "enviada 1")).await.unwrap();
        service.send("a", form(Some("c"), "enviada 2")).await.unwrap();
        service.send("b", form(Some("a"), "recebida 1")).await.unwrap();
        service.send("c", form(Some("a"), "recebida 2")).await.unwrap();
        service.send("d", form(Some("a"), "recebida 3")).await.unwrap();
        service.send("b", form(None, "aviso geral")).await.unwrap();
        // Aと無関係なメッセージは含まれない
        service.send("b", form(Some("c"), "alheia")).await.unwrap();

        let messages = service.user_messages("a", None).await.unwrap();
        assert_eq!(messages.len(), 6);

        // 重複IDなし
        let ids: HashSet<&str> = messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids.len(), 6);

        // タイムスタンプ降順
        for pair in messages.windows(2) {
            assert!(pair[0].timestamp >= pair[1].timestamp);
        }
    }

    #[tokio::test]
    async fn test_conversation_half_split() {
        let (service, _) = service_with_backend();

        // 一方向に4通、逆方向は0通
        for i in 0..4 {
            service
                .send("a", form(Some("b"), &format!("mensagem {i}")))
                .await
                .unwrap();
        }

        // limit=4 でも各方向は ceil(4/2)=2 件しか取得しないため
        // 結果は2件に留まる（アンダーフィルは仕様どおり）
        let messages = service.conversation("a", "b", Some(4)).await.unwrap();
        assert_eq!(messages.len(), 2);

        // 奇数のlimitは切り上げで分割される
        let messages = service.conversation("a", "b", Some(3)).await.unwrap();
        assert_eq!(messages.len(), 2);

        let all = service.conversation("a", "b", None).await.unwrap();
        assert_eq!(all.len(), 4);
    }

    #[tokio::test]
    async fn test_unread_count_uses_totals() {
        let (service, _) = service_with_backend();

        service.send("b", form(Some("a"), "não lida")).await.unwrap();
        service.send("c", form(Some("a"), "não lida 2")).await.unwrap();
        let broadcast = service.send("b", form(None, "aviso")).await.unwrap();
        // 自分の送信分は数えない
        service.send("a", form(Some("b"), "minha")).await.unwrap();

        assert_eq!(service.unread_count("a").await, 3);

        service.mark_read(&broadcast.id).await.unwrap();
        assert_eq!(service.unread_count("a").await, 2);
    }

    #[tokio::test]
    async fn test_mark_many_read_partial_failure() {
        let (service, backend) = service_with_backend();

        let m1 = service.send("b", form(Some("a"), "um")).await.unwrap();
        let m2 = service.send("b", form(Some("a"), "dois")).await.unwrap();
        let m3 = service.send("b", form(Some("a"), "três")).await.unwrap();
        backend.fail_updates_for(&m2.id);

        let outcome = service
            .mark_many_read(&[m1.id, m2.id, m3.id])
            .await;
        assert_eq!(outcome.successful, 2);
        assert_eq!(outcome.total, 3);
        assert!(!outcome.is_complete());
    }

    #[tokio::test]
    async fn test_recent_contacts_window_and_dedupe() {
        let (service, _) = service_with_backend();

        service.send("a", form(Some("b"), "1")).await.unwrap();
        service.send("a", form(Some("b"), "2")).await.unwrap();
        service.send("c", form(Some("a"), "3")).await.unwrap();

        let contacts = service.recent_contacts("a", 10).await.unwrap();
        assert_eq!(contacts.len(), 2);
        assert!(contacts.contains(&"b".to_string()));
        assert!(contacts.contains(&"c".to_string()));

        let limited = service.recent_contacts("a", 1).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn test_search_excludes_broadcast() {
        let (service, _) = service_with_backend();

        service
            .send("a", form(Some("b"), "relatório mensal"))
            .await
            .unwrap();
        service
            .send("b", form(Some("a"), "sobre o relatório"))
            .await
            .unwrap();
        service
            .send("c", form(None, "relatório geral"))
            .await
            .unwrap();

        let found = service.search("a", "relatório", None).await.unwrap();
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|m| !m.is_broadcast()));
    }
}
