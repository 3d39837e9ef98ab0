//! バックエンドプラットフォームの抽象化
//!
//! アカウント・セッション管理、ドキュメントコレクション、ブロブストレージを
//! 提供するBaaSへのポート。クエリプリミティブは等価・NULL判定・降順ソート・
//! 件数制限・全文検索のみで、フィールド横断のORやリスト所属判定は表現できない。
//! その制約を前提にした集計ロジックが各サービスに実装されている。

pub mod http;
pub mod memory;

pub use http::HttpBackend;
pub use memory::MemoryBackend;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

/// プラットフォームが返すエラー種別
///
/// HTTPステータスコードに対応する。ドメイン層では `AppError` に正規化される。
#[derive(Debug, Error)]
pub enum PlatformError {
    /// 401: セッションなし・認証情報不正
    #[error("認証されていません: {0}")]
    Unauthorized(String),

    /// 403: アクセス権限なし
    #[error("アクセスが拒否されました: {0}")]
    Forbidden(String),

    /// 404: リソースなし
    #[error("見つかりません: {0}")]
    NotFound(String),

    /// 409: 重複
    #[error("競合しています: {0}")]
    Conflict(String),

    /// 400: リクエスト不正
    #[error("不正なリクエスト: {0}")]
    BadRequest(String),

    /// 429: レート制限
    #[error("レート制限を超過しました: {0}")]
    RateLimited(String),

    /// 通信エラー
    #[error("ネットワークエラー: {0}")]
    Network(String),

    /// プラットフォーム内部エラー
    #[error("内部エラー: {0}")]
    Internal(String),
}

impl PlatformError {
    /// HTTPステータスコードからエラーを構築する
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            400 => PlatformError::BadRequest(message),
            401 => PlatformError::Unauthorized(message),
            403 => PlatformError::Forbidden(message),
            404 => PlatformError::NotFound(message),
            409 => PlatformError::Conflict(message),
            429 => PlatformError::RateLimited(message),
            _ => PlatformError::Internal(format!("status={status}: {message}")),
        }
    }
}

/// Result型のエイリアス（バックエンド層で使用）
pub type PlatformResult<T> = Result<T, PlatformError>;

/// プラットフォームが発行するIDを持つスキーマレスなレコード
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub data: Map<String, Value>,
}

impl Document {
    /// ドキュメントを型付きレコードに変換する
    ///
    /// サービス境界での明示的なパース・検証ステップ。形式が合わない場合は
    /// `BadRequest` を返す（未検証のキャストは行わない）。
    /// `createdAt` / `updatedAt` はデータ側に同名フィールドがあればそちらを
    /// 優先し、なければプラットフォームのメタデータを注入する。
    ///
    /// # 戻り値
    /// 型付きレコード、または形式不一致時はエラー
    pub fn deserialize<T: DeserializeOwned>(&self) -> PlatformResult<T> {
        let mut object = self.data.clone();
        object.insert("id".to_string(), Value::String(self.id.clone()));
        object
            .entry("createdAt")
            .or_insert_with(|| Value::String(self.created_at.to_rfc3339()));
        object
            .entry("updatedAt")
            .or_insert_with(|| Value::String(self.updated_at.to_rfc3339()));

        serde_json::from_value(Value::Object(object)).map_err(|e| {
            PlatformError::BadRequest(format!("ドキュメントの形式が不正です: {e}"))
        })
    }

    /// データフィールドを参照する
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.data.get(name)
    }
}

/// `list_documents` の結果
///
/// `total` は件数制限を適用する前のマッチ総数。未読件数の算出は
/// この値に依存している。
#[derive(Debug, Clone)]
pub struct DocumentList {
    pub total: usize,
    pub documents: Vec<Document>,
}

/// クエリプリミティブ
///
/// プラットフォームが提供するもののみ。複数指定した場合はAND結合される。
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    /// フィールドの等価比較
    Equal { field: String, value: Value },
    /// フィールドが未設定（NULL）
    IsNull { field: String },
    /// フィールドの降順ソート（`$createdAt` / `$updatedAt` はメタデータを指す）
    OrderDesc { field: String },
    /// 結果件数の上限
    Limit(usize),
    /// フィールドに対する全文検索
    Search { field: String, text: String },
}

impl Query {
    pub fn equal(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Query::Equal {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn is_null(field: impl Into<String>) -> Self {
        Query::IsNull {
            field: field.into(),
        }
    }

    pub fn order_desc(field: impl Into<String>) -> Self {
        Query::OrderDesc {
            field: field.into(),
        }
    }

    pub fn limit(count: usize) -> Self {
        Query::Limit(count)
    }

    pub fn search(field: impl Into<String>, text: impl Into<String>) -> Self {
        Query::Search {
            field: field.into(),
            text: text.into(),
        }
    }
}

/// 認証アカウント（プラットフォームが所有・管理する）
#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub id: String,
    pub name: String,
    pub email: String,
}

/// 認証済みセッション
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub id: String,
    pub account_id: String,
    pub created_at: DateTime<Utc>,
}

/// アップロード済みファイルのメタデータ
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMeta {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub size: u64,
    pub created_at: DateTime<Utc>,
}

/// アカウント・セッション操作
#[async_trait]
pub trait AccountApi: Send + Sync {
    /// アカウントを作成する（メール重複時はConflict）
    async fn create_account(
        &self,
        account_id: &str,
        email: &str,
        password: &str,
        name: &str,
    ) -> PlatformResult<Account>;

    /// メール・パスワードでセッションを開く
    async fn create_email_session(&self, email: &str, password: &str) -> PlatformResult<Session>;

    /// 現在のセッションのアカウントを取得する
    async fn current_account(&self) -> PlatformResult<Account>;

    /// 現在のセッションを取得する
    async fn current_session(&self) -> PlatformResult<Session>;

    /// 現在のセッションを破棄する
    async fn delete_current_session(&self) -> PlatformResult<()>;

    /// すべてのセッションを破棄する
    async fn delete_all_sessions(&self) -> PlatformResult<()>;

    /// パスワードを変更する
    async fn update_password(
        &self,
        new_password: &str,
        current_password: Option<&str>,
    ) -> PlatformResult<()>;

    /// アカウントの表示名を変更する
    async fn update_name(&self, name: &str) -> PlatformResult<()>;

    /// パスワード回復フローを開始する（回復メール送信）
    async fn create_recovery(&self, email: &str, redirect_url: &str) -> PlatformResult<()>;

    /// パスワード回復フローを完了する
    async fn complete_recovery(
        &self,
        account_id: &str,
        secret: &str,
        new_password: &str,
    ) -> PlatformResult<()>;
}

/// ドキュメントコレクション操作
#[async_trait]
pub trait DatabasesApi: Send + Sync {
    async fn create_document(
        &self,
        collection_id: &str,
        document_id: &str,
        data: Map<String, Value>,
    ) -> PlatformResult<Document>;

    async fn get_document(&self, collection_id: &str, document_id: &str)
        -> PlatformResult<Document>;

    /// 指定フィールドのみを上書きする部分更新
    async fn update_document(
        &self,
        collection_id: &str,
        document_id: &str,
        data: Map<String, Value>,
    ) -> PlatformResult<Document>;

    async fn delete_document(&self, collection_id: &str, document_id: &str) -> PlatformResult<()>;

    async fn list_documents(
        &self,
        collection_id: &str,
        queries: &[Query],
    ) -> PlatformResult<DocumentList>;
}

/// ブロブストレージ操作（バケットはバックエンド構築時に固定される）
#[async_trait]
pub trait StorageApi: Send + Sync {
    async fn create_file(
        &self,
        file_id: &str,
        name: &str,
        mime_type: &str,
        data: Vec<u8>,
    ) -> PlatformResult<FileMeta>;

    async fn get_file(&self, file_id: &str) -> PlatformResult<FileMeta>;

    async fn delete_file(&self, file_id: &str) -> PlatformResult<()>;

    async fn list_files(&self) -> PlatformResult<Vec<FileMeta>>;

    /// 閲覧用URLを構築する
    fn file_view_url(&self, file_id: &str) -> String;

    /// ダウンロード用URLを構築する
    fn file_download_url(&self, file_id: &str) -> String;

    /// プレビュー用URLを構築する（画像の縮小表示向け）
    fn file_preview_url(&self, file_id: &str, width: Option<u32>, height: Option<u32>) -> String;
}

/// プラットフォーム全体のクライアント
pub trait BackendClient: AccountApi + DatabasesApi + StorageApi {}

impl<T: AccountApi + DatabasesApi + StorageApi> BackendClient for T {}
