//! HTTPバックエンド
//!
//! ホスティング型BaaSのREST APIを話す実装。すべてのリクエストに
//! プロジェクトヘッダーを付与し、ログイン後はセッションシークレットを
//! 引き回す。タイムアウトはクライアント構築時に設定から固定される。

use super::{
    Account, AccountApi, DatabasesApi, Document, DocumentList, FileMeta, PlatformError,
    PlatformResult, Query, Session, StorageApi,
};
use crate::shared::config::BackendConfig;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, StatusCode};
use serde_json::{json, Map, Value};
use std::sync::{Arc, Mutex};
use url::Url;

/// REST APIバックエンドクライアント
pub struct HttpBackend {
    http: reqwest::Client,
    config: Arc<BackendConfig>,
    /// 現在のセッションシークレット（ログインで取得、ログアウトで破棄）
    session_secret: Mutex<Option<String>>,
}

impl HttpBackend {
    /// 設定からクライアントを構築する
    ///
    /// # 引数
    /// * `config` - エンドポイント・プロジェクトID・タイムアウトを含む設定
    pub fn new(config: Arc<BackendConfig>) -> PlatformResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| {
                PlatformError::Network(format!("HTTPクライアントの構築に失敗しました: {e}"))
            })?;

        Ok(Self {
            http,
            config,
            session_secret: Mutex::new(None),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.endpoint.trim_end_matches('/'), path)
    }

    fn documents_path(&self, collection_id: &str) -> String {
        format!(
            "databases/{}/collections/{}/documents",
            self.config.database_id, collection_id
        )
    }

    fn apply_headers(&self, mut request: RequestBuilder) -> RequestBuilder {
        request = request.header("X-Appwrite-Project", &self.config.project_id);
        if let Some(key) = &self.config.api_key {
            request = request.header("X-Appwrite-Key", key);
        }
        if let Some(secret) = self.session_secret.lock().unwrap().clone() {
            request = request.header("X-Appwrite-Session", secret);
        }
        request
    }

    /// リクエストを送信し、レスポンスボディをJSONとして返す
    ///
    /// 2xx以外はステータスコードに応じた `PlatformError` に変換する。
    /// 204 No Content は `Null` を返す。
    async fn send(&self, request: RequestBuilder) -> PlatformResult<Value> {
        let response = self
            .apply_headers(request)
            .send()
            .await
            .map_err(|e| PlatformError::Network(format!("リクエストに失敗しました: {e}")))?;

        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }

        let body = response
            .text()
            .await
            .map_err(|e| PlatformError::Network(format!("レスポンスの読み取りに失敗しました: {e}")))?;

        if !status.is_success() {
            let message = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| v.get("message").and_then(Value::as_str).map(String::from))
                .unwrap_or_else(|| body.clone());
            debug!("バックエンドエラー: status={} message={}", status, message);
            return Err(PlatformError::from_status(status.as_u16(), message));
        }

        if body.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| {
            PlatformError::Internal(format!("レスポンスの形式が不正です: {e}"))
        })
    }

    async fn send_object(&self, request: RequestBuilder) -> PlatformResult<Map<String, Value>> {
        match self.send(request).await? {
            Value::Object(object) => Ok(object),
            other => Err(PlatformError::Internal(format!(
                "オブジェクトを期待しましたが別の形式でした: {other}"
            ))),
        }
    }
}

/// クエリをワイヤ形式（JSON文字列）に変換する
fn encode_query(query: &Query) -> String {
    let wire = match query {
        Query::Equal { field, value } => {
            json!({"method": "equal", "attribute": field, "values": [value]})
        }
        Query::IsNull { field } => json!({"method": "isNull", "attribute": field}),
        Query::OrderDesc { field } => json!({"method": "orderDesc", "attribute": field}),
        Query::Limit(count) => json!({"method": "limit", "values": [count]}),
        Query::Search { field, text } => {
            json!({"method": "search", "attribute": field, "values": [text]})
        }
    };
    wire.to_string()
}

fn take_string(object: &Map<String, Value>, key: &str) -> PlatformResult<String> {
    object
        .get(key)
        .and_then(Value::as_str)
        .map(String::from)
        .ok_or_else(|| {
            PlatformError::Internal(format!("レスポンスにフィールドがありません: {key}"))
        })
}

fn parse_timestamp(object: &Map<String, Value>, key: &str) -> PlatformResult<DateTime<Utc>> {
    let text = take_string(object, key)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            PlatformError::Internal(format!("タイムスタンプの形式が不正です ({key}): {e}"))
        })
}

/// ワイヤ形式のドキュメント（`$`プレフィックスのメタデータ付き）をパースする
fn parse_document(mut object: Map<String, Value>) -> PlatformResult<Document> {
    let id = take_string(&object, "$id")?;
    let created_at = parse_timestamp(&object, "$createdAt")?;
    let updated_at = parse_timestamp(&object, "$updatedAt")?;
    object.retain(|key, _| !key.starts_with('$'));

    Ok(Document {
        id,
        created_at,
        updated_at,
        data: object,
    })
}

fn parse_account(object: &Map<String, Value>) -> PlatformResult<Account> {
    Ok(Account {
        id: take_string(object, "$id")?,
        name: take_string(object, "name")?,
        email: take_string(object, "email")?,
    })
}

fn parse_session(object: &Map<String, Value>) -> PlatformResult<Session> {
    Ok(Session {
        id: take_string(object, "$id")?,
        account_id: take_string(object, "userId")?,
        created_at: parse_timestamp(object, "$createdAt")?,
    })
}

fn parse_file(object: &Map<String, Value>) -> PlatformResult<FileMeta> {
    Ok(FileMeta {
        id: take_string(object, "$id")?,
        name: take_string(object, "name")?,
        mime_type: take_string(object, "mimeType")?,
        size: object
            .get("sizeOriginal")
            .and_then(Value::as_u64)
            .unwrap_or(0),
        created_at: parse_timestamp(object, "$createdAt")?,
    })
}

#[async_trait]
impl AccountApi for HttpBackend {
    async fn create_account(
        &self,
        account_id: &str,
        email: &str,
        password: &str,
        name: &str,
    ) -> PlatformResult<Account> {
        let body = json!({
            "userId": account_id,
            "email": email,
            "password": password,
            "name": name,
        });
        let object = self
            .send_object(self.http.post(self.url("account")).json(&body))
            .await?;
        parse_account(&object)
    }

    async fn create_email_session(&self, email: &str, password: &str) -> PlatformResult<Session> {
        let body = json!({"email": email, "password": password});
        let object = self
            .send_object(
                self.http
                    .post(self.url("account/sessions/email"))
                    .json(&body),
            )
            .await?;

        // 以後のリクエストで使うセッションシークレットを保持する
        if let Some(secret) = object.get("secret").and_then(Value::as_str) {
            if !secret.is_empty() {
                *self.session_secret.lock().unwrap() = Some(secret.to_string());
            }
        }
        parse_session(&object)
    }

    async fn current_account(&self) -> PlatformResult<Account> {
        let object = self.send_object(self.http.get(self.url("account"))).await?;
        parse_account(&object)
    }

    async fn current_session(&self) -> PlatformResult<Session> {
        let object = self
            .send_object(self.http.get(self.url("account/sessions/current")))
            .await?;
        parse_session(&object)
    }

    async fn delete_current_session(&self) -> PlatformResult<()> {
        self.send(self.http.delete(self.url("account/sessions/current")))
            .await?;
        *self.session_secret.lock().unwrap() = None;
        Ok(())
    }

    async fn delete_all_sessions(&self) -> PlatformResult<()> {
        self.send(self.http.delete(self.url("account/sessions")))
            .await?;
        *self.session_secret.lock().unwrap() = None;
        Ok(())
    }

    async fn update_password(
        &self,
        new_password: &str,
        current_password: Option<&str>,
    ) -> PlatformResult<()> {
        let mut body = json!({"password": new_password});
        if let Some(current) = current_password {
            body["oldPassword"] = Value::String(current.to_string());
        }
        self.send(self.http.patch(self.url("account/password")).json(&body))
            .await?;
        Ok(())
    }

    async fn update_name(&self, name: &str) -> PlatformResult<()> {
        let body = json!({"name": name});
        self.send(self.http.patch(self.url("account/name")).json(&body))
            .await?;
        Ok(())
    }

    async fn create_recovery(&self, email: &str, redirect_url: &str) -> PlatformResult<()> {
        let body = json!({"email": email, "url": redirect_url});
        self.send(self.http.post(self.url("account/recovery")).json(&body))
            .await?;
        Ok(())
    }

    async fn complete_recovery(
        &self,
        account_id: &str,
        secret: &str,
        new_password: &str,
    ) -> PlatformResult<()> {
        let body = json!({
            "userId": account_id,
            "secret": secret,
            "password": new_password,
        });
        self.send(self.http.put(self.url("account/recovery")).json(&body))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl DatabasesApi for HttpBackend {
    async fn create_document(
        &self,
        collection_id: &str,
        document_id: &str,
        data: Map<String, Value>,
    ) -> PlatformResult<Document> {
        let body = json!({"documentId": document_id, "data": data});
        let object = self
            .send_object(
                self.http
                    .post(self.url(&self.documents_path(collection_id)))
                    .json(&body),
            )
            .await?;
        parse_document(object)
    }

    async fn get_document(
        &self,
        collection_id: &str,
        document_id: &str,
    ) -> PlatformResult<Document> {
        let path = format!("{}/{}", self.documents_path(collection_id), document_id);
        let object = self.send_object(self.http.get(self.url(&path))).await?;
        parse_document(object)
    }

    async fn update_document(
        &self,
        collection_id: &str,
        document_id: &str,
        data: Map<String, Value>,
    ) -> PlatformResult<Document> {
        let path = format!("{}/{}", self.documents_path(collection_id), document_id);
        let body = json!({"data": data});
        let object = self
            .send_object(self.http.patch(self.url(&path)).json(&body))
            .await?;
        parse_document(object)
    }

    async fn delete_document(&self, collection_id: &str, document_id: &str) -> PlatformResult<()> {
        let path = format!("{}/{}", self.documents_path(collection_id), document_id);
        self.send(self.http.delete(self.url(&path))).await?;
        Ok(())
    }

    async fn list_documents(
        &self,
        collection_id: &str,
        queries: &[Query],
    ) -> PlatformResult<DocumentList> {
        let params: Vec<(String, String)> = queries
            .iter()
            .map(|q| ("queries[]".to_string(), encode_query(q)))
            .collect();

        let object = self
            .send_object(
                self.http
                    .get(self.url(&self.documents_path(collection_id)))
                    .query(&params),
            )
            .await?;

        let total = object
            .get("total")
            .and_then(Value::as_u64)
            .unwrap_or(0) as usize;
        let documents = object
            .get("documents")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.as_object().cloned())
                    .map(parse_document)
                    .collect::<PlatformResult<Vec<_>>>()
            })
            .transpose()?
            .unwrap_or_default();

        Ok(DocumentList { total, documents })
    }
}

#[async_trait]
impl StorageApi for HttpBackend {
    async fn create_file(
        &self,
        file_id: &str,
        name: &str,
        mime_type: &str,
        data: Vec<u8>,
    ) -> PlatformResult<FileMeta> {
        let part = Part::bytes(data)
            .file_name(name.to_string())
            .mime_str(mime_type)
            .map_err(|e| PlatformError::BadRequest(format!("MIMEタイプが不正です: {e}")))?;
        let form = Form::new()
            .text("fileId", file_id.to_string())
            .part("file", part);

        let path = format!("storage/buckets/{}/files", self.config.bucket_id);
        let request = self.http.post(self.url(&path)).multipart(form);
        let object = self.send_object(request).await?;
        parse_file(&object)
    }

    async fn get_file(&self, file_id: &str) -> PlatformResult<FileMeta> {
        let path = format!("storage/buckets/{}/files/{}", self.config.bucket_id, file_id);
        let object = self.send_object(self.http.get(self.url(&path))).await?;
        parse_file(&object)
    }

    async fn delete_file(&self, file_id: &str) -> PlatformResult<()> {
        let path = format!("storage/buckets/{}/files/{}", self.config.bucket_id, file_id);
        self.send(self.http.delete(self.url(&path))).await?;
        Ok(())
    }

    async fn list_files(&self) -> PlatformResult<Vec<FileMeta>> {
        let path = format!("storage/buckets/{}/files", self.config.bucket_id);
        let object = self.send_object(self.http.get(self.url(&path))).await?;

        object
            .get("files")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.as_object())
                    .map(parse_file)
                    .collect()
            })
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    fn file_view_url(&self, file_id: &str) -> String {
        self.file_url(file_id, "view", &[])
    }

    fn file_download_url(&self, file_id: &str) -> String {
        self.file_url(file_id, "download", &[])
    }

    fn file_preview_url(&self, file_id: &str, width: Option<u32>, height: Option<u32>) -> String {
        let mut params = Vec::new();
        if let Some(width) = width {
            params.push(("width".to_string(), width.to_string()));
        }
        if let Some(height) = height {
            params.push(("height".to_string(), height.to_string()));
        }
        self.file_url(file_id, "preview", &params)
    }
}

impl HttpBackend {
    /// ファイル操作URLを構築する（直接アクセスにはプロジェクトパラメータが必要）
    fn file_url(&self, file_id: &str, kind: &str, extra: &[(String, String)]) -> String {
        let base = self.url(&format!(
            "storage/buckets/{}/files/{}/{}",
            self.config.bucket_id, file_id, kind
        ));
        let mut params: Vec<(&str, &str)> = vec![("project", self.config.project_id.as_str())];
        params.extend(extra.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        match Url::parse_with_params(&base, params) {
            Ok(url) => url.to_string(),
            Err(_) => base,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_query_wire_format() {
        let wire = encode_query(&Query::equal("status", "pending"));
        let value: Value = serde_json::from_str(&wire).unwrap();
        assert_eq!(value["method"], "equal");
        assert_eq!(value["attribute"], "status");
        assert_eq!(value["values"][0], "pending");

        let wire = encode_query(&Query::limit(25));
        let value: Value = serde_json::from_str(&wire).unwrap();
        assert_eq!(value["method"], "limit");
        assert_eq!(value["values"][0], 25);

        let wire = encode_query(&Query::is_null("receiverId"));
        let value: Value = serde_json::from_str(&wire).unwrap();
        assert_eq!(value["method"], "isNull");
    }

    #[test]
    fn test_parse_document_strips_metadata() {
        let object: Map<String, Value> = serde_json::from_str(
            r#"{
                "$id": "doc-1",
                "$createdAt": "2025-03-01T09:00:00+00:00",
                "$updatedAt": "2025-03-02T09:00:00+00:00",
                "$collectionId": "expenses",
                "$permissions": [],
                "amount": 12.5
            }"#,
        )
        .unwrap();

        let document = parse_document(object).unwrap();
        assert_eq!(document.id, "doc-1");
        assert_eq!(document.field("amount"), Some(&serde_json::json!(12.5)));
        // メタデータはデータ側に残さない
        assert!(document.field("$collectionId").is_none());
        assert!(document.field("$permissions").is_none());
    }

    #[test]
    fn test_parse_document_missing_id() {
        let object: Map<String, Value> =
            serde_json::from_str(r#"{"amount": 1}"#).unwrap();
        assert!(parse_document(object).is_err());
    }

    #[test]
    fn test_file_urls_carry_project() {
        let config = Arc::new(BackendConfig::in_memory());
        let backend = HttpBackend::new(config).unwrap();

        let view = backend.file_view_url("f1");
        assert!(view.contains("/files/f1/view"));
        assert!(view.contains("project="));

        let preview = backend.file_preview_url("f1", Some(480), None);
        assert!(preview.contains("width=480"));
        assert!(!preview.contains("height="));
    }
}
