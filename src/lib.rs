//! 経費管理アプリケーションのコアライブラリ
//!
//! BaaSプラットフォーム（認証・ドキュメントDB・ブロブストレージ)の
//! 上に載る薄いドメインサービス群と、その結果をキャッシュする
//! クライアント状態ストアを提供する。
//!
//! 構成:
//! - `backend`: プラットフォームへのポート（HTTP実装とインメモリ偽実装）
//! - `features`: エンティティごとのサービスとデータモデル
//! - `stores`: UI層が所有するクライアントサイドキャッシュ
//! - `shared`: エラー・設定・ユーティリティ

pub mod backend;
pub mod features;
pub mod shared;
pub mod stores;

use std::sync::Arc;

use log::info;

use backend::BackendClient;
use features::auth::AuthService;
use features::expenses::ExpenseService;
use features::files::FileService;
use features::messages::MessageService;
use features::notifications::NotificationService;
use shared::config::BackendConfig;

/// ログシステムを初期化
///
/// `EXPENSE_HUB_LOG_LEVEL` でレベルを指定する（未設定時はinfo）。
pub fn init_logging() {
    let log_level = match std::env::var("EXPENSE_HUB_LOG_LEVEL")
        .unwrap_or_default()
        .to_lowercase()
        .as_str()
    {
        "error" => log::LevelFilter::Error,
        "warn" => log::LevelFilter::Warn,
        "debug" => log::LevelFilter::Debug,
        "trace" => log::LevelFilter::Trace,
        _ => log::LevelFilter::Info,
    };

    // env_loggerを初期化
    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .format_timestamp_secs()
        .format_module_path(false)
        .format_target(false)
        .init();

    info!("ログシステムを初期化しました: level={log_level}");
}

/// すべてのドメインサービスの束
///
/// プロセス起動時に一度構築し、設定とバックエンドを各サービスに
/// 注入する。グローバルなシングルトンは持たない。
pub struct ServiceHub {
    pub auth: Arc<AuthService>,
    pub expenses: Arc<ExpenseService>,
    pub messages: Arc<MessageService>,
    pub notifications: Arc<NotificationService>,
    pub files: Arc<FileService>,
}

impl ServiceHub {
    /// バックエンドと設定からサービス一式を構築する
    pub fn new(backend: Arc<dyn BackendClient>, config: Arc<BackendConfig>) -> Self {
        Self {
            auth: Arc::new(AuthService::new(backend.clone(), config.clone())),
            expenses: Arc::new(ExpenseService::new(backend.clone(), config.clone())),
            messages: Arc::new(MessageService::new(backend.clone(), config.clone())),
            notifications: Arc::new(NotificationService::new(backend.clone(), config)),
            files: Arc::new(FileService::new(backend)),
        }
    }
}
