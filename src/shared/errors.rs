use crate::backend::PlatformError;
use thiserror::Error;

/// アプリケーション全体で使用される統一エラー型
///
/// バックエンドプラットフォームのエラーコードをドメインのエラー種別に
/// 正規化したもの。読み取り系の「データなし」はエラーにせず、各サービスが
/// `None` / `0` に回復する（伝播ポリシーは各サービスのドキュメントを参照）。
#[derive(Debug, Error)]
pub enum AppError {
    /// セッションがない、または期限切れ
    #[error("認証エラー: {0}")]
    Unauthenticated(String),

    /// ロール・所有権チェックに失敗
    #[error("権限エラー: {0}")]
    Unauthorized(String),

    /// リソースが見つからない場合のエラー
    #[error("リソースが見つかりません: {0}")]
    NotFound(String),

    /// 重複（メールアドレスの再登録など）
    #[error("重複エラー: {0}")]
    Conflict(String),

    /// バリデーション・形式不正
    #[error("入力エラー: {0}")]
    InvalidInput(String),

    /// プラットフォームのレート制限超過
    #[error("レート制限エラー: {0}")]
    RateLimited(String),

    /// 上記以外（ネットワーク障害・プラットフォーム内部エラーを含む）
    #[error("予期しないエラー: {0}")]
    Unexpected(String),
}

impl AppError {
    /// ユーザーに表示するためのフレンドリーなメッセージを取得
    ///
    /// # 戻り値
    /// ユーザーに表示可能なエラーメッセージ
    pub fn user_message(&self) -> String {
        match self {
            AppError::Unauthenticated(_) => "ログインし直してください".to_string(),
            AppError::Unauthorized(_) => "この操作を行う権限がありません".to_string(),
            AppError::NotFound(msg) => msg.clone(),
            AppError::Conflict(msg) => msg.clone(),
            AppError::InvalidInput(msg) => msg.clone(),
            AppError::RateLimited(_) => {
                "試行回数が多すぎます。しばらく待ってからお試しください".to_string()
            }
            AppError::Unexpected(_) => {
                "サーバーとの通信でエラーが発生しました。接続を確認してください".to_string()
            }
        }
    }

    /// 認証エラーを作成するヘルパー関数
    pub fn unauthenticated<S: Into<String>>(message: S) -> Self {
        AppError::Unauthenticated(message.into())
    }

    /// リソース未発見エラーを作成するヘルパー関数
    ///
    /// # 引数
    /// * `resource` - 見つからなかったリソース名
    pub fn not_found<S: Into<String>>(resource: S) -> Self {
        AppError::NotFound(format!("{}が見つかりません", resource.into()))
    }

    /// 重複エラーを作成するヘルパー関数
    pub fn conflict<S: Into<String>>(message: S) -> Self {
        AppError::Conflict(message.into())
    }

    /// 入力エラーを作成するヘルパー関数
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        AppError::InvalidInput(message.into())
    }

    /// 予期しないエラーを作成するヘルパー関数
    pub fn unexpected<S: Into<String>>(message: S) -> Self {
        AppError::Unexpected(message.into())
    }
}

/// プラットフォームエラーからドメインエラーへの正規化
///
/// 401はセッション不在として扱う。サービス層はロールチェックを行わない
/// 設計のため、`Unauthorized` はプラットフォーム側のACL拒否からのみ発生する。
impl From<PlatformError> for AppError {
    fn from(error: PlatformError) -> Self {
        match error {
            PlatformError::Unauthorized(msg) => AppError::Unauthenticated(msg),
            PlatformError::Forbidden(msg) => AppError::Unauthorized(msg),
            PlatformError::NotFound(msg) => AppError::NotFound(msg),
            PlatformError::Conflict(msg) => AppError::Conflict(msg),
            PlatformError::BadRequest(msg) => AppError::InvalidInput(msg),
            PlatformError::RateLimited(msg) => AppError::RateLimited(msg),
            PlatformError::Network(msg) => AppError::Unexpected(msg),
            PlatformError::Internal(msg) => AppError::Unexpected(msg),
        }
    }
}

/// Result型のエイリアス（アプリケーション全体で使用）
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_helper_functions() {
        // ヘルパー関数のテスト
        let not_found = AppError::not_found("経費");
        assert!(matches!(not_found, AppError::NotFound(_)));
        assert_eq!(not_found.user_message(), "経費が見つかりません");

        let invalid = AppError::invalid_input("金額が不正です");
        assert!(matches!(invalid, AppError::InvalidInput(_)));
        assert_eq!(invalid.user_message(), "金額が不正です");
    }

    #[test]
    fn test_platform_error_mapping() {
        // プラットフォームエラーコードの正規化テスト
        let unauthenticated: AppError =
            PlatformError::Unauthorized("セッションなし".to_string()).into();
        assert!(matches!(unauthenticated, AppError::Unauthenticated(_)));

        let conflict: AppError = PlatformError::Conflict("重複".to_string()).into();
        assert!(matches!(conflict, AppError::Conflict(_)));

        let rate_limited: AppError = PlatformError::RateLimited("429".to_string()).into();
        assert!(matches!(rate_limited, AppError::RateLimited(_)));

        let unexpected: AppError = PlatformError::Network("接続失敗".to_string()).into();
        assert!(matches!(unexpected, AppError::Unexpected(_)));
    }

    #[test]
    fn test_user_message_hides_details() {
        // 内部詳細がユーザーメッセージに漏れないことを確認
        let error = AppError::unexpected("connection reset by peer");
        assert!(!error.user_message().contains("connection reset"));
    }
}
