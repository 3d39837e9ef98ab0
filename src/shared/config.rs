use crate::shared::errors::{AppError, AppResult};
use log::{info, warn};
use std::env;
use std::time::Duration;

/// デフォルトのリクエストタイムアウト（秒）
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// ドキュメントコレクションの識別子一覧
#[derive(Debug, Clone)]
pub struct CollectionIds {
    pub users: String,
    pub expenses: String,
    pub messages: String,
    pub notifications: String,
}

impl Default for CollectionIds {
    fn default() -> Self {
        Self {
            users: "users".to_string(),
            expenses: "expenses".to_string(),
            messages: "messages".to_string(),
            notifications: "notifications".to_string(),
        }
    }
}

/// バックエンドプラットフォームへの接続設定
///
/// プロセス起動時に一度だけ構築し、`Arc` で各サービスに注入する。
/// グローバルなシングルトンは持たない（テストで偽バックエンドに
/// 差し替えられるようにするため）。
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// プラットフォームAPIのエンドポイントURL
    pub endpoint: String,
    /// プロジェクト識別子
    pub project_id: String,
    /// データベース識別子
    pub database_id: String,
    /// コレクション識別子
    pub collections: CollectionIds,
    /// ブロブバケット識別子
    pub bucket_id: String,
    /// サーバー専用APIキー（クライアント環境では設定しない）
    pub api_key: Option<String>,
    /// HTTPリクエストのタイムアウト
    pub request_timeout: Duration,
}

impl BackendConfig {
    /// 環境変数から設定を読み込む
    ///
    /// `.env` ファイルがあれば先に読み込む。コレクション識別子は
    /// 未指定ならコレクション名をそのまま使用する。
    ///
    /// # 戻り値
    /// 検証済みの設定、または失敗時はエラー
    pub fn from_env() -> AppResult<Self> {
        if dotenv::dotenv().is_err() {
            warn!(".envファイルが見つかりません。環境変数が直接設定されていることを確認してください。");
        } else {
            info!(".envファイルを読み込みました");
        }

        let require = |key: &str| -> AppResult<String> {
            env::var(key)
                .map_err(|_| AppError::invalid_input(format!("環境変数 {key} が設定されていません")))
        };

        let timeout_secs = env::var("EXPENSE_HUB_REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);

        let config = Self {
            endpoint: require("EXPENSE_HUB_ENDPOINT")?,
            project_id: require("EXPENSE_HUB_PROJECT_ID")?,
            database_id: require("EXPENSE_HUB_DATABASE_ID")?,
            collections: CollectionIds {
                users: env::var("EXPENSE_HUB_USERS_COLLECTION")
                    .unwrap_or_else(|_| "users".to_string()),
                expenses: env::var("EXPENSE_HUB_EXPENSES_COLLECTION")
                    .unwrap_or_else(|_| "expenses".to_string()),
                messages: env::var("EXPENSE_HUB_MESSAGES_COLLECTION")
                    .unwrap_or_else(|_| "messages".to_string()),
                notifications: env::var("EXPENSE_HUB_NOTIFICATIONS_COLLECTION")
                    .unwrap_or_else(|_| "notifications".to_string()),
            },
            bucket_id: require("EXPENSE_HUB_BUCKET_ID")?,
            api_key: env::var("EXPENSE_HUB_API_KEY").ok(),
            request_timeout: Duration::from_secs(timeout_secs),
        };

        config.validate()?;
        info!(
            "バックエンド設定を読み込みました: endpoint={}, project={}",
            config.endpoint, config.project_id
        );
        Ok(config)
    }

    /// インメモリバックエンド用の設定を作成する（テスト・ローカル開発向け）
    pub fn in_memory() -> Self {
        Self {
            endpoint: "memory://localhost".to_string(),
            project_id: "local".to_string(),
            database_id: "main".to_string(),
            collections: CollectionIds::default(),
            bucket_id: "files".to_string(),
            api_key: None,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }

    /// 設定を検証する
    ///
    /// # 戻り値
    /// 成功時はOk(())、識別子が空の場合はエラー
    pub fn validate(&self) -> AppResult<()> {
        let identifiers = [
            ("endpoint", &self.endpoint),
            ("project_id", &self.project_id),
            ("database_id", &self.database_id),
            ("users", &self.collections.users),
            ("expenses", &self.collections.expenses),
            ("messages", &self.collections.messages),
            ("notifications", &self.collections.notifications),
            ("bucket_id", &self.bucket_id),
        ];

        for (name, value) in identifiers {
            if value.trim().is_empty() {
                return Err(AppError::invalid_input(format!("設定 {name} が空です")));
            }
        }

        if let Some(key) = &self.api_key {
            if key.trim().is_empty() {
                return Err(AppError::invalid_input("APIキーが空です"));
            }
        }

        Ok(())
    }
}
