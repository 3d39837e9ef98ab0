//! インメモリバックエンド
//!
//! プラットフォーム全体をプロセス内で再現する偽実装。サービス層のテストと
//! ローカル開発で使用する。クエリ評価は本物と同じ意味論（AND結合、
//! 制限適用前のマッチ総数）を持たせている。

use super::{
    Account, AccountApi, DatabasesApi, Document, DocumentList, FileMeta, PlatformError,
    PlatformResult, Query, Session, StorageApi,
};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use uuid::Uuid;

struct AccountRecord {
    id: String,
    name: String,
    email: String,
    password: String,
}

struct StoredFile {
    meta: FileMeta,
    #[allow(dead_code)]
    data: Vec<u8>,
}

#[derive(Default)]
struct State {
    accounts: Vec<AccountRecord>,
    /// 単一クライアントセッション（1プロセス1ユーザーのモデル）
    session: Option<Session>,
    recovery_secrets: HashMap<String, String>,
    collections: HashMap<String, Vec<Document>>,
    files: Vec<StoredFile>,
    failing_document_ids: HashSet<String>,
}

/// インメモリのバックエンドプラットフォーム
#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<State>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// 指定ドキュメントの更新を失敗させる（故障注入、テスト用）
    ///
    /// # 引数
    /// * `document_id` - 更新を失敗させるドキュメントID
    pub fn fail_updates_for(&self, document_id: &str) {
        let mut state = self.state.lock().unwrap();
        state.failing_document_ids.insert(document_id.to_string());
    }

    /// コレクション内のドキュメント数を返す（テスト用）
    pub fn document_count(&self, collection_id: &str) -> usize {
        let state = self.state.lock().unwrap();
        state
            .collections
            .get(collection_id)
            .map(|docs| docs.len())
            .unwrap_or(0)
    }

    fn no_session() -> PlatformError {
        PlatformError::Unauthorized("セッションがありません".to_string())
    }
}

/// フィールド値を取り出す（`$createdAt` / `$updatedAt` はメタデータを参照）
fn field_value(document: &Document, field: &str) -> Value {
    match field {
        "$createdAt" => Value::String(document.created_at.to_rfc3339()),
        "$updatedAt" => Value::String(document.updated_at.to_rfc3339()),
        _ => document.data.get(field).cloned().unwrap_or(Value::Null),
    }
}

/// フィルタ条件（Equal / IsNull / Search）をすべて満たすか判定する
fn matches_filters(document: &Document, queries: &[Query]) -> bool {
    queries.iter().all(|query| match query {
        Query::Equal { field, value } => &field_value(document, field) == value,
        Query::IsNull { field } => field_value(document, field).is_null(),
        Query::Search { field, text } => match field_value(document, field) {
            Value::String(content) => content.to_lowercase().contains(&text.to_lowercase()),
            _ => false,
        },
        Query::OrderDesc { .. } | Query::Limit(_) => true,
    })
}

/// ソートキーの比較（数値は数値として、それ以外は文字列表現で比較する）
fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

#[async_trait]
impl AccountApi for MemoryBackend {
    async fn create_account(
        &self,
        account_id: &str,
        email: &str,
        password: &str,
        name: &str,
    ) -> PlatformResult<Account> {
        let mut state = self.state.lock().unwrap();

        if state.accounts.iter().any(|a| a.email == email) {
            return Err(PlatformError::Conflict(
                "このメールアドレスは既に使用されています".to_string(),
            ));
        }

        state.accounts.push(AccountRecord {
            id: account_id.to_string(),
            name: name.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        });

        Ok(Account {
            id: account_id.to_string(),
            name: name.to_string(),
            email: email.to_string(),
        })
    }

    async fn create_email_session(&self, email: &str, password: &str) -> PlatformResult<Session> {
        let mut state = self.state.lock().unwrap();

        let account_id = state
            .accounts
            .iter()
            .find(|a| a.email == email && a.password == password)
            .map(|a| a.id.clone())
            .ok_or_else(|| {
                PlatformError::Unauthorized(
                    "メールアドレスまたはパスワードが違います".to_string(),
                )
            })?;

        let session = Session {
            id: Uuid::new_v4().to_string(),
            account_id,
            created_at: Utc::now(),
        };
        state.session = Some(session.clone());
        Ok(session)
    }

    async fn current_account(&self) -> PlatformResult<Account> {
        let state = self.state.lock().unwrap();
        let session = state.session.as_ref().ok_or_else(Self::no_session)?;

        state
            .accounts
            .iter()
            .find(|a| a.id == session.account_id)
            .map(|a| Account {
                id: a.id.clone(),
                name: a.name.clone(),
                email: a.email.clone(),
            })
            .ok_or_else(|| PlatformError::NotFound("アカウントが存在しません".to_string()))
    }

    async fn current_session(&self) -> PlatformResult<Session> {
        let state = self.state.lock().unwrap();
        state.session.clone().ok_or_else(Self::no_session)
    }

    async fn delete_current_session(&self) -> PlatformResult<()> {
        let mut state = self.state.lock().unwrap();
        match state.session.take() {
            Some(_) => Ok(()),
            None => Err(Self::no_session()),
        }
    }

    async fn delete_all_sessions(&self) -> PlatformResult<()> {
        let mut state = self.state.lock().unwrap();
        match state.session.take() {
            Some(_) => Ok(()),
            None => Err(Self::no_session()),
        }
    }

    async fn update_password(
        &self,
        new_password: &str,
        current_password: Option<&str>,
    ) -> PlatformResult<()> {
        let mut state = self.state.lock().unwrap();
        let account_id = state
            .session
            .as_ref()
            .map(|s| s.account_id.clone())
            .ok_or_else(Self::no_session)?;

        let account = state
            .accounts
            .iter_mut()
            .find(|a| a.id == account_id)
            .ok_or_else(|| PlatformError::NotFound("アカウントが存在しません".to_string()))?;

        if let Some(current) = current_password {
            if account.password != current {
                return Err(PlatformError::Unauthorized(
                    "現在のパスワードが違います".to_string(),
                ));
            }
        }

        account.password = new_password.to_string();
        Ok(())
    }

    async fn update_name(&self, name: &str) -> PlatformResult<()> {
        let mut state = self.state.lock().unwrap();
        let account_id = state
            .session
            .as_ref()
            .map(|s| s.account_id.clone())
            .ok_or_else(Self::no_session)?;

        let account = state
            .accounts
            .iter_mut()
            .find(|a| a.id == account_id)
            .ok_or_else(|| PlatformError::NotFound("アカウントが存在しません".to_string()))?;
        account.name = name.to_string();
        Ok(())
    }

    async fn create_recovery(&self, email: &str, _redirect_url: &str) -> PlatformResult<()> {
        let mut state = self.state.lock().unwrap();
        let account_id = state
            .accounts
            .iter()
            .find(|a| a.email == email)
            .map(|a| a.id.clone())
            .ok_or_else(|| {
                PlatformError::NotFound("このメールアドレスのアカウントがありません".to_string())
            })?;

        state
            .recovery_secrets
            .insert(account_id, Uuid::new_v4().to_string());
        Ok(())
    }

    async fn complete_recovery(
        &self,
        account_id: &str,
        secret: &str,
        new_password: &str,
    ) -> PlatformResult<()> {
        let mut state = self.state.lock().unwrap();

        match state.recovery_secrets.get(account_id) {
            Some(stored) if stored == secret => {}
            _ => {
                return Err(PlatformError::BadRequest(
                    "回復コードが不正です".to_string(),
                ))
            }
        }

        state.recovery_secrets.remove(account_id);
        if let Some(account) = state.accounts.iter_mut().find(|a| a.id == account_id) {
            account.password = new_password.to_string();
        }
        Ok(())
    }
}

#[async_trait]
impl DatabasesApi for MemoryBackend {
    async fn create_document(
        &self,
        collection_id: &str,
        document_id: &str,
        data: Map<String, Value>,
    ) -> PlatformResult<Document> {
        let mut state = self.state.lock().unwrap();
        let collection = state
            .collections
            .entry(collection_id.to_string())
            .or_default();

        if collection.iter().any(|d| d.id == document_id) {
            return Err(PlatformError::Conflict(format!(
                "ドキュメントが既に存在します: {document_id}"
            )));
        }

        let now = Utc::now();
        let document = Document {
            id: document_id.to_string(),
            created_at: now,
            updated_at: now,
            data,
        };
        collection.push(document.clone());
        Ok(document)
    }

    async fn get_document(
        &self,
        collection_id: &str,
        document_id: &str,
    ) -> PlatformResult<Document> {
        let state = self.state.lock().unwrap();
        state
            .collections
            .get(collection_id)
            .and_then(|docs| docs.iter().find(|d| d.id == document_id))
            .cloned()
            .ok_or_else(|| {
                PlatformError::NotFound(format!("ドキュメントがありません: {document_id}"))
            })
    }

    async fn update_document(
        &self,
        collection_id: &str,
        document_id: &str,
        data: Map<String, Value>,
    ) -> PlatformResult<Document> {
        let mut state = self.state.lock().unwrap();

        if state.failing_document_ids.contains(document_id) {
            return Err(PlatformError::Internal(format!(
                "注入された更新失敗: {document_id}"
            )));
        }

        let document = state
            .collections
            .get_mut(collection_id)
            .and_then(|docs| docs.iter_mut().find(|d| d.id == document_id))
            .ok_or_else(|| {
                PlatformError::NotFound(format!("ドキュメントがありません: {document_id}"))
            })?;

        for (key, value) in data {
            document.data.insert(key, value);
        }
        document.updated_at = Utc::now();
        Ok(document.clone())
    }

    async fn delete_document(&self, collection_id: &str, document_id: &str) -> PlatformResult<()> {
        let mut state = self.state.lock().unwrap();
        let collection = state.collections.get_mut(collection_id).ok_or_else(|| {
            PlatformError::NotFound(format!("ドキュメントがありません: {document_id}"))
        })?;

        let before = collection.len();
        collection.retain(|d| d.id != document_id);
        if collection.len() == before {
            return Err(PlatformError::NotFound(format!(
                "ドキュメントがありません: {document_id}"
            )));
        }
        Ok(())
    }

    async fn list_documents(
        &self,
        collection_id: &str,
        queries: &[Query],
    ) -> PlatformResult<DocumentList> {
        let state = self.state.lock().unwrap();
        let mut matched: Vec<Document> = state
            .collections
            .get(collection_id)
            .map(|docs| {
                docs.iter()
                    .filter(|d| matches_filters(d, queries))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        // 制限適用前のマッチ総数（未読カウントが依存している）
        let total = matched.len();

        if let Some(Query::OrderDesc { field }) = queries
            .iter()
            .find(|q| matches!(q, Query::OrderDesc { .. }))
        {
            matched.sort_by(|a, b| {
                compare_values(&field_value(b, field), &field_value(a, field))
            });
        }

        if let Some(Query::Limit(count)) =
            queries.iter().find(|q| matches!(q, Query::Limit(_)))
        {
            matched.truncate(*count);
        }

        Ok(DocumentList {
            total,
            documents: matched,
        })
    }
}

#[async_trait]
impl StorageApi for MemoryBackend {
    async fn create_file(
        &self,
        file_id: &str,
        name: &str,
        mime_type: &str,
        data: Vec<u8>,
    ) -> PlatformResult<FileMeta> {
        let mut state = self.state.lock().unwrap();

        if state.files.iter().any(|f| f.meta.id == file_id) {
            return Err(PlatformError::Conflict(format!(
                "ファイルが既に存在します: {file_id}"
            )));
        }

        let meta = FileMeta {
            id: file_id.to_string(),
            name: name.to_string(),
            mime_type: mime_type.to_string(),
            size: data.len() as u64,
            created_at: Utc::now(),
        };
        state.files.push(StoredFile {
            meta: meta.clone(),
            data,
        });
        Ok(meta)
    }

    async fn get_file(&self, file_id: &str) -> PlatformResult<FileMeta> {
        let state = self.state.lock().unwrap();
        state
            .files
            .iter()
            .find(|f| f.meta.id == file_id)
            .map(|f| f.meta.clone())
            .ok_or_else(|| PlatformError::NotFound(format!("ファイルがありません: {file_id}")))
    }

    async fn delete_file(&self, file_id: &str) -> PlatformResult<()> {
        let mut state = self.state.lock().unwrap();
        let before = state.files.len();
        state.files.retain(|f| f.meta.id != file_id);
        if state.files.len() == before {
            return Err(PlatformError::NotFound(format!(
                "ファイルがありません: {file_id}"
            )));
        }
        Ok(())
    }

    async fn list_files(&self) -> PlatformResult<Vec<FileMeta>> {
        let state = self.state.lock().unwrap();
        Ok(state.files.iter().map(|f| f.meta.clone()).collect())
    }

    fn file_view_url(&self, file_id: &str) -> String {
        format!("memory://files/{file_id}/view")
    }

    fn file_download_url(&self, file_id: &str) -> String {
        format!("memory://files/{file_id}/download")
    }

    fn file_preview_url(&self, file_id: &str, width: Option<u32>, height: Option<u32>) -> String {
        let mut url = format!("memory://files/{file_id}/preview");
        let mut separator = '?';
        if let Some(width) = width {
            url.push_str(&format!("{separator}width={width}"));
            separator = '&';
        }
        if let Some(height) = height {
            url.push_str(&format!("{separator}height={height}"));
        }
        url
    }
}
