/// 共有エラー型とエラーハンドリング
pub mod errors;

/// 共有設定管理
pub mod config;

/// 共有ユーティリティ関数
pub mod utils;

/// バッチ操作の集約結果
pub mod outcome;

// 便利な再エクスポート
pub use config::{BackendConfig, CollectionIds};
pub use errors::{AppError, AppResult};
pub use outcome::BatchOutcome;
